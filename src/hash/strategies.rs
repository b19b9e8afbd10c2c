//! Probe index derivation from a base hash pair.
//!
//! The filter touches K cells per operation. Rather than compute K
//! independent hashes, indices come from the Kirsch-Mitzenmacher
//! double-hashing construction:
//!
//! ```text
//! g_j(x) = (h1(x) + j * h2(x)) mod m      j = 0..k-1
//! ```
//!
//! which is proven to match K independent hash functions asymptotically
//! ("Less Hashing, Same Performance", 2006). Like the hasher, the
//! strategy is part of the snapshot contract and must not change
//! behavior between versions.

/// Derives the j-th probe index from a base hash pair.
pub trait HashStrategy: Send + Sync {
    /// Index of probe `j` into a filter of `m` cells.
    ///
    /// Must be deterministic and uniformly distributed over `[0, m)`.
    fn probe(&self, h1: u64, h2: u64, j: u64, m: u64) -> u64;

    /// Static name, for diagnostics.
    fn name(&self) -> &'static str;
}

/// Standard double hashing: `(h1 + j * h2) mod m`.
///
/// # Examples
///
/// ```
/// use bloomgate::hash::{DoubleHashing, HashStrategy};
///
/// let strategy = DoubleHashing;
/// let m = 1000;
/// for j in 0..7 {
///     assert!(strategy.probe(12345, 67890, j, m) < m);
/// }
/// // Probe 0 is h1 itself, reduced mod m.
/// assert_eq!(strategy.probe(12345, 67890, 0, m), 12345 % m);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleHashing;

impl HashStrategy for DoubleHashing {
    #[inline]
    fn probe(&self, h1: u64, h2: u64, j: u64, m: u64) -> u64 {
        h1.wrapping_add(j.wrapping_mul(h2)) % m
    }

    #[inline]
    fn name(&self) -> &'static str {
        "double-hashing"
    }
}
