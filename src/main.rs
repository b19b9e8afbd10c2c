//! bloomgate service binary.
//!
//! Parses flags, installs logging, verifies file permissions up front,
//! then hands the process to the lifecycle supervisor. The transport
//! adapter (HTTP / unix socket) is deployed separately and attaches to
//! the service handle; running this binary standalone still bootstraps,
//! checkpoints on a timer, and shuts down cleanly on SIGINT/SIGTERM.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use bloomgate::config::{Config, DEFAULT_CHECKPOINT_PATH};
use bloomgate::lifecycle::{NoTransport, Supervisor};

#[derive(Parser, Debug)]
#[command(
    name = "bloomgate",
    version,
    about = "Stable Bloom Filter membership service"
)]
struct Cli {
    /// Path to the bootstrap corpus; a .gz suffix enables gzip
    #[arg(short = 's', long, default_value = "")]
    source: String,

    /// Ignore any existing snapshot and rebuild from the source
    #[arg(short = 'f', long)]
    force: bool,

    /// Checkpoint ticker period in seconds
    #[arg(short = 'i', long, default_value_t = 600)]
    checkpoint_interval: u64,

    /// Snapshot destination
    #[arg(short = 'o', long, default_value = DEFAULT_CHECKPOINT_PATH)]
    checkpoint_path: PathBuf,

    /// Number of cells (m)
    #[arg(long, default_value_t = 1_000_000_000)]
    cells: u64,

    /// Probe positions per operation (k); 0 derives a default from the
    /// false-positive rate
    #[arg(long, default_value_t = 0)]
    k: u16,

    /// Target false-positive rate
    #[arg(long, default_value_t = 0.0001)]
    fp_rate: f64,

    /// Cell counter width in bits (1..=8)
    #[arg(long, default_value_t = 1)]
    counter_bits: u8,

    /// Reject values of this byte length or shorter
    #[arg(long, default_value_t = 2)]
    min_value_len: usize,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            source: self.source,
            force: self.force,
            checkpoint_path: self.checkpoint_path,
            checkpoint_interval: self.checkpoint_interval,
            cells: self.cells,
            k: self.k,
            fp_rate: self.fp_rate,
            counter_bits: self.counter_bits,
            min_value_len: self.min_value_len,
            ..Config::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = Level::from_str(&cli.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install log subscriber")?;

    let config = cli.into_config();
    config.validate()?;
    assert_permissions(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        cells = config.cells,
        fp_rate = config.fp_rate,
        checkpoint_path = %config.checkpoint_path.display(),
        checkpoint_interval_secs = config.checkpoint_interval,
        "starting"
    );

    let (_service, supervisor) = Supervisor::start(&config)?;
    supervisor.run(&NoTransport)?;
    Ok(())
}

/// Fail fast on misconfigured paths instead of discovering them at the
/// first checkpoint tick, ten minutes in.
fn assert_permissions(config: &Config) -> Result<()> {
    if let Some(source) = config.source_path() {
        File::open(source)
            .with_context(|| format!("source {} is not readable", source.display()))?;
    }

    let path = &config.checkpoint_path;
    if File::open(path).is_err() {
        // No snapshot yet: prove we could create one, then remove the
        // probe so the bootstrap decision table still sees "no snapshot".
        OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)
            .with_context(|| format!("checkpoint path {} is not writable", path.display()))?;
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove probe file {}", path.display()))?;
    }

    Ok(())
}
