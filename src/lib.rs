//! bloomgate: a "seen before?" membership service core.
//!
//! Clients ask whether a string has been seen; if not, it is recorded.
//! The set is probabilistic: a Stable Bloom Filter whose per-insert
//! decay bounds the false-positive rate at a stable point, so the
//! service absorbs effectively unbounded streams (hundreds of millions
//! to billions of distinct values) in fixed memory. False positives are
//! bounded and configurable; recently added values are never reported
//! absent; very old values may fade.
//!
//! # What's Inside
//!
//! - [`filters::StableBloomFilter`]: the engine (decay, probe, query)
//! - [`snapshot`]: the big-endian on-disk image, restart-safe
//! - [`bootstrap`]: one-time corpus load, plain or gzip, with advisory
//!   progress
//! - [`persist::Persistence`]: dirty-flag checkpoints and the startup
//!   decision table
//! - [`service::FilterService`]: the facade a transport holds
//!   (readiness gate, reader/writer lock, input policy)
//! - [`lifecycle::Supervisor`]: startup, the checkpoint ticker, and
//!   signal-driven shutdown
//!
//! The HTTP/unix-socket transport is deliberately not here: it is a
//! thin adapter over [`service::FilterService`] and plugs its drain and
//! cleanup into [`lifecycle::ShutdownHook`].
//!
//! # Quick Start
//!
//! ```
//! use bloomgate::config::Config;
//! use bloomgate::lifecycle::{NoTransport, Supervisor};
//! use bloomgate::service::Membership;
//!
//! # fn main() -> bloomgate::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config {
//!     cells: 1_000_000,
//!     fp_rate: 0.01,
//!     checkpoint_path: dir.path().join("cells.sbf"),
//!     ..Config::default()
//! };
//!
//! let (service, mut supervisor) = Supervisor::start(&config)?;
//!
//! service.add("first-sighting")?;
//! assert_eq!(service.test("first-sighting")?, Membership::Present);
//!
//! // Final checkpoint happens here; a restart would load it back.
//! supervisor.shutdown(&NoTransport);
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency Model
//!
//! Parallel threads, one reader/writer lock. Queries (`test`) share the
//! lock and run in parallel; inserts, bulk loads, bootstrap, and
//! checkpoints serialise. Reads never observe a torn cell or a
//! half-applied insert, and a checkpoint is always a consistent
//! point-in-time image. This deliberately trades write concurrency for
//! snapshot consistency; read traffic dominates the workload this
//! service is built for.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::manual_range_contains)]

pub mod bootstrap;
pub mod config;
pub mod core;
pub mod error;
pub mod filters;
pub mod hash;
pub mod lifecycle;
pub mod persist;
pub mod service;
pub mod snapshot;

pub use config::Config;
pub use error::{BloomGateError, Result};
pub use filters::StableBloomFilter;
pub use lifecycle::{ShutdownHook, Supervisor};
pub use persist::CheckpointOutcome;
pub use service::{AddOutcome, BulkOutcome, FilterService, FilterStats, Membership};

/// Prelude for transport adapters and tools.
///
/// # Examples
///
/// ```
/// use bloomgate::prelude::*;
///
/// let mut filter = StableBloomFilter::new(1000, 3, 0.01, 1).unwrap();
/// assert!(filter.test_and_add(b"value"));
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{BloomGateError, Result};
    pub use crate::filters::StableBloomFilter;
    pub use crate::lifecycle::{NoTransport, ShutdownHook, Supervisor};
    pub use crate::persist::CheckpointOutcome;
    pub use crate::service::{
        AddOutcome, BulkOutcome, FilterService, FilterStats, Membership,
    };
}
