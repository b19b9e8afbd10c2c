//! Lifecycle supervision: startup, the checkpoint ticker, and shutdown.
//!
//! The supervisor owns the process-level choreography around the
//! service:
//!
//! - **Startup**: construct the filter, run recovery (snapshot, source,
//!   or empty per the decision table), mark the service ready, start
//!   the ticker.
//! - **Steady state**: one checkpoint attempt per tick. Ticks that
//!   arrive while a checkpoint is still running are dropped, never
//!   queued.
//! - **Shutdown** (SIGINT/SIGTERM): let the transport drain within the
//!   grace period, stop the ticker, take a final checkpoint, release
//!   transport resources. A watchdog forces the process down 3s past
//!   the grace period if any of that wedges. SIGHUP is reserved for
//!   configuration reload and never checkpoints.
//!
//! The transport layer is out of scope here; it plugs in through
//! [`ShutdownHook`].

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{debug, error, info, warn};

use crate::bootstrap::BootstrapProgress;
use crate::config::Config;
use crate::error::Result;
use crate::persist::CheckpointOutcome;
use crate::service::FilterService;

/// Extra time the watchdog grants past the grace period before forcing
/// process exit.
const HARD_EXIT_SLACK: Duration = Duration::from_secs(3);

/// Capacity of the advisory bootstrap progress channel.
const PROGRESS_CHANNEL_CAP: usize = 64;

/// Seam for the (out-of-scope) transport layer.
///
/// `drain` must stop accepting new requests and wait for in-flight ones
/// up to the deadline; `cleanup` releases listening resources such as a
/// unix socket path.
pub trait ShutdownHook: Send + Sync {
    /// Stop intake and wait for in-flight requests, bounded by
    /// `deadline`.
    fn drain(&self, deadline: Duration);

    /// Release transport resources. Called after the final checkpoint.
    fn cleanup(&self) {}
}

/// Hook for running without a transport (tests, offline rebuilds).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransport;

impl ShutdownHook for NoTransport {
    fn drain(&self, _deadline: Duration) {}
}

/// Drives the service through its process lifetime.
pub struct Supervisor {
    service: Arc<FilterService>,
    grace: Duration,
    ticker: Option<JoinHandle<()>>,
    progress_consumer: Option<JoinHandle<()>>,
    stop_tx: Sender<()>,
    finished: Arc<AtomicBool>,
}

impl Supervisor {
    /// Construct the service, run bootstrap, mark it ready, and start
    /// the checkpoint ticker.
    ///
    /// Blocks until bootstrap completes; the caller typically hands the
    /// returned service to the transport and then parks in
    /// [`Supervisor::run`].
    ///
    /// # Errors
    ///
    /// Configuration and construction errors; thread spawn failures
    /// surface as [`crate::BloomGateError::Io`].
    pub fn start(config: &Config) -> Result<(Arc<FilterService>, Self)> {
        let service = Arc::new(FilterService::new(config)?);

        let (progress_tx, progress_rx) = bounded::<BootstrapProgress>(PROGRESS_CHANNEL_CAP);
        let progress_consumer = thread::Builder::new()
            .name("bootstrap-progress".into())
            .spawn(move || {
                for event in progress_rx {
                    info!(
                        scanned = event.scanned,
                        added = event.added,
                        total = event.total_lines,
                        "bootstrap progress"
                    );
                }
            })?;

        service.initialize(config.source_path(), config.force, Some(&progress_tx));
        // Closing our end lets the consumer thread finish once the
        // remaining events are logged.
        drop(progress_tx);

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let interval = config.checkpoint_interval();
        let ticker_service = Arc::clone(&service);
        let in_flight = Arc::new(AtomicBool::new(false));
        let ticker_guard = Arc::clone(&in_flight);
        let ticker = thread::Builder::new()
            .name("checkpoint-ticker".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        tick_checkpoint(&ticker_service, &ticker_guard);
                    }
                }
            })?;

        let supervisor = Self {
            service: Arc::clone(&service),
            grace: config.shutdown_grace(),
            ticker: Some(ticker),
            progress_consumer: Some(progress_consumer),
            stop_tx,
            finished: Arc::new(AtomicBool::new(false)),
        };
        Ok((service, supervisor))
    }

    /// The supervised service handle.
    #[must_use]
    pub fn service(&self) -> Arc<FilterService> {
        Arc::clone(&self.service)
    }

    /// Block on the signal loop until SIGINT or SIGTERM, then shut
    /// down through `hook`.
    ///
    /// # Errors
    ///
    /// Signal registration failures surface as
    /// [`crate::BloomGateError::Io`].
    pub fn run(mut self, hook: &dyn ShutdownHook) -> Result<()> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
        for signal in signals.forever() {
            match signal {
                SIGHUP => {
                    // Reserved for configuration reload; explicitly not
                    // a checkpoint trigger.
                    info!("SIGHUP received, reload is handled by the deployment layer");
                }
                SIGINT | SIGTERM => {
                    info!(signal, "termination signal received, shutting down");
                    self.shutdown(hook);
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Quiesce the transport, stop the ticker, take a final checkpoint,
    /// and release resources.
    ///
    /// Idempotent; the second call finds a clean filter and a stopped
    /// ticker.
    pub fn shutdown(&mut self, hook: &dyn ShutdownHook) {
        let finished = Arc::clone(&self.finished);
        let deadline = self.grace + HARD_EXIT_SLACK;
        // Best-effort watchdog: if drain or the final checkpoint wedge,
        // the process still dies.
        let _ = thread::Builder::new()
            .name("shutdown-watchdog".into())
            .spawn(move || {
                thread::sleep(deadline);
                if !finished.load(Ordering::Acquire) {
                    error!("shutdown deadline exceeded, forcing exit");
                    process::exit(1);
                }
            });

        hook.drain(self.grace);

        let _ = self.stop_tx.try_send(());
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }

        match self.service.checkpoint() {
            Ok(CheckpointOutcome::Wrote { bytes }) => {
                info!(bytes, "final checkpoint written");
            }
            Ok(CheckpointOutcome::NotNecessary) => {
                debug!("final checkpoint not necessary");
            }
            Err(e) => warn!(error = %e, "final checkpoint failed"),
        }

        hook.cleanup();
        if let Some(consumer) = self.progress_consumer.take() {
            let _ = consumer.join();
        }

        self.finished.store(true, Ordering::Release);
        info!("shutdown complete");
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Unpark the ticker so it does not outlive the supervisor when
        // shutdown was never called.
        let _ = self.stop_tx.try_send(());
    }
}

/// One ticker firing: skip if a checkpoint is already in flight,
/// otherwise attempt one and log the outcome. Failures are not fatal;
/// the dirty flag stays set and the next tick retries.
fn tick_checkpoint(service: &FilterService, in_flight: &AtomicBool) {
    if in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        debug!("checkpoint still running, tick dropped");
        return;
    }

    match service.checkpoint() {
        Ok(CheckpointOutcome::Wrote { bytes }) => {
            info!(bytes, "periodic checkpoint written");
        }
        Ok(CheckpointOutcome::NotNecessary) => {
            debug!("periodic checkpoint skipped, state clean");
        }
        Err(e) => warn!(error = %e, "periodic checkpoint failed, retrying next tick"),
    }

    in_flight.store(false, Ordering::Release);
}
