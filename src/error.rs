//! Error types for bloomgate operations.
//!
//! One enum covers the whole crate. Client-facing preconditions
//! (`NotReady`, `ValueTooShort`) and persistence failures share it so the
//! transport adapter can match on a single type.
//!
//! # Error Propagation
//!
//! ```
//! use bloomgate::{BloomGateError, Result};
//!
//! fn validate_rate(fp_rate: f64) -> Result<()> {
//!     if fp_rate <= 0.0 || fp_rate >= 1.0 {
//!         return Err(BloomGateError::invalid_parameters(format!(
//!             "fp_rate {} must be in (0, 1)",
//!             fp_rate
//!         )));
//!     }
//!     Ok(())
//! }
//! # assert!(validate_rate(0.01).is_ok());
//! # assert!(validate_rate(1.5).is_err());
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for bloomgate operations.
pub type Result<T> = std::result::Result<T, BloomGateError>;

/// Errors that can occur while serving, bootstrapping, or persisting the
/// filter.
///
/// I/O-bearing variants keep their `std::io::Error` cause, reachable via
/// [`std::error::Error::source`], so the enum is intentionally not
/// `Clone`/`PartialEq`; tests match on variants instead.
#[derive(Debug)]
pub enum BloomGateError {
    /// The filter is still bootstrapping. Retryable by the client.
    NotReady,

    /// Input violates the minimum-length precondition. Permanent for
    /// that input.
    ValueTooShort {
        /// Length of the rejected value in bytes.
        len: usize,
        /// Values must be strictly longer than this.
        min: usize,
    },

    /// Construction or configuration parameters do not satisfy the
    /// filter's constraints.
    InvalidParameters {
        /// Human-readable description of what's invalid.
        message: String,
    },

    /// The bootstrap source file could not be read. The filter is left
    /// in a usable, possibly partial, state.
    BootstrapIo {
        /// Source path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The checkpoint destination could not be written. The dirty flag
    /// stays set so the next tick retries.
    CheckpointIo {
        /// Checkpoint path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// On-disk snapshot is not usable by this filter instance: bad
    /// magic, unknown version, mismatched parameters, or trailing bytes.
    IncompatibleSnapshot {
        /// Description of the mismatch.
        reason: String,
    },

    /// Snapshot stream ended before the declared cell payload.
    TruncatedSnapshot {
        /// Bytes the header promised.
        expected: u64,
        /// Bytes actually available.
        actual: u64,
    },

    /// Raw I/O failure without path context. Produced by the snapshot
    /// codec over generic streams; the persistence layer re-wraps it
    /// with the file path.
    Io {
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl fmt::Display for BloomGateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => {
                write!(f, "Filter is not ready yet; bootstrap in progress.")
            }
            Self::ValueTooShort { len, min } => {
                write!(
                    f,
                    "Value length {} is too short; must be greater than {}.",
                    len, min
                )
            }
            Self::InvalidParameters { message } => {
                write!(f, "Invalid filter parameters: {}.", message)
            }
            Self::BootstrapIo { path, source } => {
                write!(f, "Bootstrap read from {} failed: {}.", path.display(), source)
            }
            Self::CheckpointIo { path, source } => {
                write!(f, "Checkpoint write to {} failed: {}.", path.display(), source)
            }
            Self::IncompatibleSnapshot { reason } => {
                write!(f, "Snapshot is incompatible with this filter: {}.", reason)
            }
            Self::TruncatedSnapshot { expected, actual } => {
                write!(
                    f,
                    "Snapshot truncated: expected {} bytes of cell data, got {}.",
                    expected, actual
                )
            }
            Self::Io { source } => write!(f, "I/O error: {}.", source),
        }
    }
}

impl std::error::Error for BloomGateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BootstrapIo { source, .. }
            | Self::CheckpointIo { source, .. }
            | Self::Io { source } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for BloomGateError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

impl BloomGateError {
    /// Create an `InvalidParameters` error with a formatted message.
    #[must_use]
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create a `ValueTooShort` error.
    #[must_use]
    pub fn value_too_short(len: usize, min: usize) -> Self {
        Self::ValueTooShort { len, min }
    }

    /// Create a `BootstrapIo` error.
    #[must_use]
    pub fn bootstrap_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::BootstrapIo {
            path: path.into(),
            source,
        }
    }

    /// Create a `CheckpointIo` error.
    #[must_use]
    pub fn checkpoint_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CheckpointIo {
            path: path.into(),
            source,
        }
    }

    /// Create an `IncompatibleSnapshot` error.
    #[must_use]
    pub fn incompatible_snapshot(reason: impl Into<String>) -> Self {
        Self::IncompatibleSnapshot {
            reason: reason.into(),
        }
    }

    /// Create a `TruncatedSnapshot` error.
    #[must_use]
    pub fn truncated_snapshot(expected: u64, actual: u64) -> Self {
        Self::TruncatedSnapshot { expected, actual }
    }

    /// Whether the client may retry the same request later.
    ///
    /// Only [`BloomGateError::NotReady`] clears once bootstrap finishes;
    /// everything else is permanent for the given input or deployment.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}
