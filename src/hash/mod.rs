//! Hashing for probe index derivation.
//!
//! Two layers, composed by the filter:
//!
//! - [`BloomHasher`] turns a value's bytes into a pair of independent
//!   64-bit hashes.
//! - [`HashStrategy`] (see [`strategies`]) turns that pair into the K
//!   probe indices.
//!
//! Snapshots are portable across runs and hosts, so the whole chain is
//! contractually deterministic: fixed seeds, no per-process
//! randomization, and no algorithm changes without a snapshot version
//! bump.

pub mod strategies;
pub mod xxhash;

pub use strategies::{DoubleHashing, HashStrategy};
pub use xxhash::XxHasher;

/// Base hasher for deriving probe indices from value bytes.
///
/// Implementations must be deterministic across processes and versions:
/// the snapshot format stores cell state keyed by these hashes, and a
/// drifting hash family would silently turn a restored filter into
/// noise.
///
/// # Examples
///
/// ```
/// use bloomgate::hash::{BloomHasher, XxHasher};
///
/// let hasher = XxHasher::default();
/// let (h1, h2) = hasher.hash_pair(b"example.org");
/// assert_ne!(h1, h2);
/// assert_eq!((h1, h2), XxHasher::default().hash_pair(b"example.org"));
/// ```
pub trait BloomHasher: Send + Sync {
    /// Hash arbitrary bytes to a 64-bit value.
    fn hash_bytes(&self, bytes: &[u8]) -> u64;

    /// Two independent 64-bit hashes of the same input, fed to the
    /// double-hashing strategy.
    fn hash_pair(&self, bytes: &[u8]) -> (u64, u64);

    /// Static name, for diagnostics.
    fn name(&self) -> &'static str;
}
