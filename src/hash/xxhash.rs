//! Seeded XXH3 hasher.
//!
//! Wraps the `xxhash-rust` XXH3 implementation with two fixed seeds so
//! that the same value always yields the same `(h1, h2)` pair, in this
//! process and in every other one that ever reads the same snapshot.
//! XXH3 passes SMHasher cleanly and hashes short keys (the common case
//! here: URLs, message ids, lines of a corpus) in a handful of
//! nanoseconds.

use xxhash_rust::xxh3::xxh3_64_with_seed;

use super::BloomHasher;

/// Seed for the first hash of the pair.
const SEED_PRIMARY: u64 = 0x9747_b28c_0aa4_3b1d;

/// Seed for the second hash of the pair.
const SEED_SECONDARY: u64 = 0x2c53_b1f0_85d9_e4a7;

/// XXH3-based [`BloomHasher`] with pinned seeds.
///
/// # Examples
///
/// ```
/// use bloomgate::hash::{BloomHasher, XxHasher};
///
/// let hasher = XxHasher::default();
/// assert_eq!(hasher.hash_bytes(b"abc"), hasher.hash_bytes(b"abc"));
/// assert_ne!(hasher.hash_bytes(b"abc"), hasher.hash_bytes(b"abd"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct XxHasher;

impl XxHasher {
    /// Create a hasher. Equivalent to `XxHasher::default()`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl BloomHasher for XxHasher {
    #[inline]
    fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        xxh3_64_with_seed(bytes, SEED_PRIMARY)
    }

    #[inline]
    fn hash_pair(&self, bytes: &[u8]) -> (u64, u64) {
        (
            xxh3_64_with_seed(bytes, SEED_PRIMARY),
            xxh3_64_with_seed(bytes, SEED_SECONDARY),
        )
    }

    #[inline]
    fn name(&self) -> &'static str {
        "xxh3"
    }
}
