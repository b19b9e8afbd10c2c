//! Filter facade: the one object the transport layer holds.
//!
//! Coordinates three things the engine itself does not know about:
//!
//! - **Readiness**: a monotonic flag, `false` from construction until
//!   startup recovery finishes. Until then every operation returns
//!   [`BloomGateError::NotReady`].
//! - **Locking**: the cell array and the dirty flag live together under
//!   one `parking_lot::RwLock`. Queries share the lock; every mutation,
//!   the bootstrap, and checkpoints take it exclusively. Snapshots
//!   therefore always see a consistent point-in-time view.
//! - **Input policy**: values must be longer than `min_value_len`
//!   bytes. The rule applies to `test`/`add`/`bulk_add` but never to
//!   the bootstrap corpus.
//!
//! # Examples
//!
//! ```
//! use bloomgate::config::Config;
//! use bloomgate::service::{AddOutcome, FilterService, Membership};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config {
//!     cells: 100_000,
//!     fp_rate: 0.01,
//!     checkpoint_path: dir.path().join("cells.sbf"),
//!     ..Config::default()
//! };
//!
//! let service = FilterService::new(&config).unwrap();
//! service.initialize(None, false, None);
//!
//! assert_eq!(service.test("mercury").unwrap(), Membership::Absent);
//! assert_eq!(service.add("mercury").unwrap(), AddOutcome::Added);
//! assert_eq!(service.test("mercury").unwrap(), Membership::Present);
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::bootstrap::BootstrapProgress;
use crate::config::Config;
use crate::error::{BloomGateError, Result};
use crate::filters::StableBloomFilter;
use crate::persist::{CheckpointOutcome, Persistence};

/// Cell array plus dirty flag, guarded together.
///
/// The dirty flag answers one question: has anything mutated since the
/// last successful checkpoint? Keeping it under the same lock as the
/// cells is what makes the answer exact.
#[derive(Debug)]
pub struct FilterState {
    /// The engine.
    pub filter: StableBloomFilter,
    /// Set by any mutation, cleared only by a successful checkpoint.
    pub dirty: bool,
}

impl FilterState {
    /// Wrap a freshly constructed filter; clean until proven otherwise.
    #[must_use]
    pub fn new(filter: StableBloomFilter) -> Self {
        Self {
            filter,
            dirty: false,
        }
    }
}

/// Result of a membership query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Membership {
    /// All probed cells are set; the value was probably seen before.
    Present,
    /// At least one probed cell is zero; the value was definitely not
    /// seen recently.
    Absent,
}

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddOutcome {
    /// The value was new and is now recorded.
    Added,
    /// The value was already present (or collided with one that was).
    AlreadyPresent,
}

/// Tallies of a bulk insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BulkOutcome {
    /// Values that were new.
    pub added: usize,
    /// Values already present or shorter than the minimum length.
    pub skipped: usize,
}

/// Read-only filter properties for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilterStats {
    /// Number of cells (m).
    pub cells: u64,
    /// Probe positions per operation (k).
    pub k: u16,
    /// Cells decremented per insert (p).
    pub p: u32,
    /// Counter width in bits (d).
    pub counter_bits: u8,
    /// Limiting fraction of zero cells.
    pub stable_point: f64,
    /// Expected false-positive rate at the stable point.
    pub fp_rate: f64,
}

/// The membership service facade.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct FilterService {
    state: RwLock<FilterState>,
    ready: AtomicBool,
    persistence: Persistence,
    min_value_len: usize,
}

impl FilterService {
    /// Construct the filter from configuration. The service starts not
    /// ready; call [`FilterService::initialize`] to run recovery and
    /// open the gate.
    ///
    /// # Errors
    ///
    /// Returns [`BloomGateError::InvalidParameters`] for out-of-bounds
    /// configuration.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let filter = StableBloomFilter::new(
            config.cells,
            config.k,
            config.fp_rate,
            config.counter_bits,
        )?;
        info!(
            cells = filter.cells(),
            k = filter.k(),
            p = filter.p(),
            counter_bits = filter.counter_bits(),
            stable_point = filter.stable_point(),
            fp_rate = filter.false_positive_rate(),
            "filter constructed"
        );

        Ok(Self {
            state: RwLock::new(FilterState::new(filter)),
            ready: AtomicBool::new(false),
            persistence: Persistence::new(&config.checkpoint_path),
            min_value_len: config.min_value_len,
        })
    }

    /// Run startup recovery (decision table over force/source/snapshot)
    /// and mark the service ready.
    ///
    /// Holds the exclusive lock for the whole load, so no request
    /// observes a half-bootstrapped filter even if the transport is
    /// already listening.
    pub fn initialize(
        &self,
        source: Option<&Path>,
        force: bool,
        progress: Option<&Sender<BootstrapProgress>>,
    ) {
        {
            let mut state = self.state.write();
            let dirty = self
                .persistence
                .recover(&mut state.filter, source, force, progress);
            state.dirty = dirty;
        }
        self.ready.store(true, Ordering::Release);
        info!("filter ready");
    }

    /// Whether bootstrap has completed. Transitions once, to `true`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Query a value. Shared lock; many tests run in parallel.
    ///
    /// # Errors
    ///
    /// [`BloomGateError::NotReady`] before initialization,
    /// [`BloomGateError::ValueTooShort`] for inputs at or below the
    /// configured minimum length.
    pub fn test(&self, value: &str) -> Result<Membership> {
        self.ensure_ready()?;
        self.ensure_len(value)?;

        let state = self.state.read();
        if state.filter.test(value.as_bytes()) {
            Ok(Membership::Present)
        } else {
            Ok(Membership::Absent)
        }
    }

    /// Insert a value. Exclusive lock.
    ///
    /// # Errors
    ///
    /// Same preconditions as [`FilterService::test`].
    pub fn add(&self, value: &str) -> Result<AddOutcome> {
        self.ensure_ready()?;
        self.ensure_len(value)?;

        let mut state = self.state.write();
        let was_new = state.filter.test_and_add(value.as_bytes());
        // Every insert mutates cells (the decay step runs even for
        // already-present values), so the state is dirty either way.
        state.dirty = true;

        Ok(if was_new {
            AddOutcome::Added
        } else {
            AddOutcome::AlreadyPresent
        })
    }

    /// Insert a batch under a single exclusive lock acquisition.
    ///
    /// Too-short values are counted as skipped rather than failing the
    /// batch. An empty batch returns zeroes and touches nothing.
    ///
    /// # Errors
    ///
    /// [`BloomGateError::NotReady`] before initialization.
    pub fn bulk_add<I, S>(&self, values: I) -> Result<BulkOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_ready()?;

        let mut state = self.state.write();
        let mut outcome = BulkOutcome::default();
        for value in values {
            let value = value.as_ref();
            if value.len() <= self.min_value_len {
                outcome.skipped += 1;
                continue;
            }
            if state.filter.test_and_add(value.as_bytes()) {
                outcome.added += 1;
            } else {
                outcome.skipped += 1;
            }
            state.dirty = true;
        }
        Ok(outcome)
    }

    /// Write a snapshot if anything changed since the last one.
    ///
    /// # Errors
    ///
    /// [`BloomGateError::NotReady`] before initialization,
    /// [`BloomGateError::CheckpointIo`] when the destination is
    /// unwritable (the dirty flag is left set).
    pub fn checkpoint(&self) -> Result<CheckpointOutcome> {
        self.ensure_ready()?;
        let mut state = self.state.write();
        self.persistence.checkpoint(&mut state)
    }

    /// Size of the persisted snapshot in bytes; 0 when missing.
    #[must_use]
    pub fn dump_size(&self) -> u64 {
        self.persistence.dump_size()
    }

    /// Filter parameters and derived properties. Constant for the
    /// lifetime of the instance.
    #[must_use]
    pub fn stats(&self) -> FilterStats {
        let state = self.state.read();
        let f = &state.filter;
        FilterStats {
            cells: f.cells(),
            k: f.k(),
            p: f.p(),
            counter_bits: f.counter_bits(),
            stable_point: f.stable_point(),
            fp_rate: f.false_positive_rate(),
        }
    }

    /// The configured minimum value length (exclusive bound).
    #[must_use]
    pub fn min_value_len(&self) -> usize {
        self.min_value_len
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(BloomGateError::NotReady)
        }
    }

    fn ensure_len(&self, value: &str) -> Result<()> {
        if value.len() <= self.min_value_len {
            Err(BloomGateError::value_too_short(
                value.len(),
                self.min_value_len,
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir) -> Config {
        Config {
            cells: 100_000,
            k: 3,
            fp_rate: 0.01,
            checkpoint_path: dir.path().join("cells.sbf"),
            ..Config::default()
        }
    }

    fn ready_service(dir: &tempfile::TempDir) -> FilterService {
        let service = FilterService::new(&config(dir)).unwrap();
        service.initialize(None, false, None);
        service
    }

    #[test]
    fn test_gated_until_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let service = FilterService::new(&config(&dir)).unwrap();

        assert!(!service.is_ready());
        assert!(matches!(
            service.test("value"),
            Err(BloomGateError::NotReady)
        ));
        assert!(matches!(service.add("value"), Err(BloomGateError::NotReady)));
        assert!(matches!(
            service.bulk_add(["value"]),
            Err(BloomGateError::NotReady)
        ));
        assert!(matches!(
            service.checkpoint(),
            Err(BloomGateError::NotReady)
        ));

        service.initialize(None, false, None);
        assert!(service.is_ready());
        assert!(service.test("value").is_ok());
    }

    #[test]
    fn test_min_length_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let service = ready_service(&dir);

        // Default minimum is 2: two bytes or fewer is rejected.
        assert!(matches!(
            service.test("ab"),
            Err(BloomGateError::ValueTooShort { len: 2, min: 2 })
        ));
        assert!(matches!(
            service.add(""),
            Err(BloomGateError::ValueTooShort { .. })
        ));
        assert_eq!(service.test("abc").unwrap(), Membership::Absent);
    }

    #[test]
    fn test_add_then_test() {
        let dir = tempfile::tempdir().unwrap();
        let service = ready_service(&dir);

        assert_eq!(service.add("hello-world").unwrap(), AddOutcome::Added);
        assert_eq!(service.test("hello-world").unwrap(), Membership::Present);
        assert_eq!(
            service.add("hello-world").unwrap(),
            AddOutcome::AlreadyPresent
        );
    }

    #[test]
    fn test_bulk_add_counts() {
        let dir = tempfile::tempdir().unwrap();
        let service = ready_service(&dir);

        let outcome = service
            .bulk_add(["abc", "abcd", "abc", "xyz"])
            .unwrap();
        assert_eq!(outcome, BulkOutcome { added: 3, skipped: 1 });
    }

    #[test]
    fn test_bulk_add_filters_short_values() {
        let dir = tempfile::tempdir().unwrap();
        let service = ready_service(&dir);

        let outcome = service.bulk_add(["ok-value", "ab", ""]).unwrap();
        assert_eq!(outcome, BulkOutcome { added: 1, skipped: 2 });
        // Short values never reached the filter.
        assert!(matches!(
            service.test("ab"),
            Err(BloomGateError::ValueTooShort { .. })
        ));
    }

    #[test]
    fn test_bulk_add_empty() {
        let dir = tempfile::tempdir().unwrap();
        let service = ready_service(&dir);

        let outcome = service.bulk_add(Vec::<String>::new()).unwrap();
        assert_eq!(outcome, BulkOutcome::default());
        // Nothing mutated: a checkpoint is unnecessary.
        assert_eq!(
            service.checkpoint().unwrap(),
            CheckpointOutcome::NotNecessary
        );
    }

    #[test]
    fn test_dirty_flag_law() {
        let dir = tempfile::tempdir().unwrap();
        let service = ready_service(&dir);

        // Clean start: nothing to write.
        assert_eq!(
            service.checkpoint().unwrap(),
            CheckpointOutcome::NotNecessary
        );

        service.add("make-it-dirty").unwrap();
        assert!(matches!(
            service.checkpoint().unwrap(),
            CheckpointOutcome::Wrote { .. }
        ));

        // Clean again after the write.
        assert_eq!(
            service.checkpoint().unwrap(),
            CheckpointOutcome::NotNecessary
        );

        // An AlreadyPresent insert still decays cells, so it dirties.
        service.add("make-it-dirty").unwrap();
        assert!(matches!(
            service.checkpoint().unwrap(),
            CheckpointOutcome::Wrote { .. }
        ));
    }

    #[test]
    fn test_failed_checkpoint_keeps_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.checkpoint_path = dir.path().join("no-such-dir").join("cells.sbf");
        let service = FilterService::new(&cfg).unwrap();
        service.initialize(None, false, None);

        service.add("unsaved-value").unwrap();
        assert!(matches!(
            service.checkpoint(),
            Err(BloomGateError::CheckpointIo { .. })
        ));

        // Still dirty: once the destination is fixed the data would be
        // written, which we can observe as the flag surviving the error.
        assert!(matches!(
            service.checkpoint(),
            Err(BloomGateError::CheckpointIo { .. })
        ));
    }

    #[test]
    fn test_stats_constant() {
        let dir = tempfile::tempdir().unwrap();
        let service = ready_service(&dir);

        let before = service.stats();
        assert_eq!(before.cells, 100_000);
        assert_eq!(before.k, 3);
        assert!(before.p >= 1);
        assert!(before.stable_point > 0.0 && before.stable_point < 1.0);

        for i in 0..500 {
            service.add(&format!("item-{i}")).unwrap();
        }
        assert_eq!(service.stats(), before);
    }

    #[test]
    fn test_dump_size_zero_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let service = ready_service(&dir);
        assert_eq!(service.dump_size(), 0);

        service.add("persist-me").unwrap();
        service.checkpoint().unwrap();
        assert!(service.dump_size() > 0);
    }

    #[test]
    fn test_initialize_with_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("corpus.txt");
        std::fs::write(&source, b"foo\nbar\nfoo\n").unwrap();

        let service = FilterService::new(&config(&dir)).unwrap();
        service.initialize(Some(&source), true, None);

        assert_eq!(service.test("foo").unwrap(), Membership::Present);
        assert_eq!(service.test("bar").unwrap(), Membership::Present);
        assert_eq!(service.test("baz").unwrap(), Membership::Absent);
        // Source loads leave the state dirty so the first tick persists.
        assert!(matches!(
            service.checkpoint().unwrap(),
            CheckpointOutcome::Wrote { .. }
        ));
    }
}
