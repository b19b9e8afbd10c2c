//! Service configuration.
//!
//! One flat struct with serde support so deployments can deserialize it
//! from their config layer; the binary fills it from CLI flags. Every
//! field has a production-oriented default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BloomGateError, Result};

/// Default checkpoint destination.
pub const DEFAULT_CHECKPOINT_PATH: &str = "/var/lib/bloomgate/cells.sbf";

/// Default checkpoint ticker period in seconds (ten minutes).
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 600;

/// Runtime configuration for the filter service.
///
/// # Examples
///
/// ```
/// use bloomgate::config::Config;
///
/// let config = Config {
///     cells: 1_000_000,
///     fp_rate: 0.01,
///     ..Config::default()
/// };
/// assert!(config.validate().is_ok());
/// assert!(config.source_path().is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the bootstrap corpus; empty means no source. A `.gz`
    /// suffix enables gzip decompression.
    pub source: String,

    /// Ignore any existing snapshot at startup and rebuild from the
    /// source (or start empty when no source is set).
    pub force: bool,

    /// Destination of snapshot writes.
    pub checkpoint_path: PathBuf,

    /// Period of the background checkpoint ticker, in seconds.
    pub checkpoint_interval: u64,

    /// Number of cells (`m`). Immutable for a filter instance; changing
    /// it invalidates existing snapshots.
    pub cells: u64,

    /// Probe positions per operation (`k`); 0 derives a default from
    /// `fp_rate`.
    pub k: u16,

    /// Target false-positive rate, in (0, 1). Determines the decay
    /// width.
    pub fp_rate: f64,

    /// Cell counter width in bits, 1..=8.
    pub counter_bits: u8,

    /// Reject values whose byte length is less than or equal to this.
    pub min_value_len: usize,

    /// Seconds granted to in-flight work at shutdown before the final
    /// checkpoint; the hard-exit watchdog fires 3s after this.
    pub shutdown_grace: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: String::new(),
            force: false,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL_SECS,
            cells: 1_000_000_000,
            k: 0,
            fp_rate: 0.0001,
            counter_bits: 1,
            min_value_len: 2,
            shutdown_grace: 3,
        }
    }
}

impl Config {
    /// Check parameter bounds. Filter construction re-validates; this
    /// catches misconfiguration before any allocation happens.
    ///
    /// # Errors
    ///
    /// Returns [`BloomGateError::InvalidParameters`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<()> {
        if self.cells == 0 {
            return Err(BloomGateError::invalid_parameters("cells must be > 0"));
        }
        if self.fp_rate <= 0.0 || self.fp_rate >= 1.0 {
            return Err(BloomGateError::invalid_parameters(format!(
                "fp_rate {} must be in (0, 1)",
                self.fp_rate
            )));
        }
        if self.counter_bits < 1 || self.counter_bits > 8 {
            return Err(BloomGateError::invalid_parameters(format!(
                "counter_bits {} must be in 1..=8",
                self.counter_bits
            )));
        }
        if u64::from(self.k) > self.cells {
            return Err(BloomGateError::invalid_parameters(format!(
                "k {} exceeds cell count {}",
                self.k, self.cells
            )));
        }
        if self.checkpoint_interval == 0 {
            return Err(BloomGateError::invalid_parameters(
                "checkpoint_interval must be > 0 seconds",
            ));
        }
        if self.checkpoint_path.as_os_str().is_empty() {
            return Err(BloomGateError::invalid_parameters(
                "checkpoint_path must not be empty",
            ));
        }
        Ok(())
    }

    /// The bootstrap source as a path, `None` when unset.
    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        if self.source.is_empty() {
            None
        } else {
            Some(Path::new(&self.source))
        }
    }

    /// Checkpoint ticker period.
    #[must_use]
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval)
    }

    /// Shutdown grace period.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.checkpoint_interval(), Duration::from_secs(600));
        assert_eq!(config.min_value_len, 2);
        assert_eq!(config.counter_bits, 1);
        assert!(!config.force);
    }

    #[test]
    fn test_empty_source_means_none() {
        let mut config = Config::default();
        assert!(config.source_path().is_none());
        config.source = "/data/corpus.txt.gz".to_string();
        assert_eq!(
            config.source_path(),
            Some(Path::new("/data/corpus.txt.gz"))
        );
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let ok = Config::default();

        let mut c = ok.clone();
        c.cells = 0;
        assert!(c.validate().is_err());

        let mut c = ok.clone();
        c.fp_rate = 1.0;
        assert!(c.validate().is_err());

        let mut c = ok.clone();
        c.counter_bits = 9;
        assert!(c.validate().is_err());

        let mut c = ok.clone();
        c.cells = 4;
        c.k = 5;
        assert!(c.validate().is_err());

        let mut c = ok.clone();
        c.checkpoint_interval = 0;
        assert!(c.validate().is_err());

        let mut c = ok;
        c.checkpoint_path = PathBuf::new();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        // Missing fields fall back to defaults.
        let config: Config =
            serde_json::from_str(r#"{"cells": 1000, "fp_rate": 0.01}"#).unwrap();
        assert_eq!(config.cells, 1000);
        assert_eq!(config.min_value_len, 2);
        assert_eq!(config.checkpoint_interval, 600);
    }
}
