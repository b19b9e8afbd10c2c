//! Stable Bloom Filter engine.
//!
//! A Stable Bloom Filter (Deng & Rafiei 2006) extends the classic filter
//! for unbounded streams: every insert first *decays* `p` cells
//! (saturating decrement), then saturates the `k` cells of the new
//! value. The continuous decay drives the fraction of zero cells toward
//! a fixed *stable point* regardless of how many items have passed
//! through, which in turn bounds the long-term false-positive rate.
//!
//! # Properties
//!
//! - **No false negatives for fresh items**: the decay step runs before
//!   saturation, so a value is always reported present immediately after
//!   its own insert.
//! - **Bounded false positives**: at the stable point, the expected rate
//!   is the configured target.
//! - **Bounded memory forever**: unlike a classic filter, saturation
//!   does not accumulate; old items fade instead.
//!
//! # Determinism
//!
//! Two filters constructed with the same parameters and fed the same
//! operation sequence hold byte-identical cell buffers. The decay step's
//! start position comes from a SplitMix64 mix of a running insert
//! counter rather than a process-global RNG, which is what makes corpus
//! bootstrap reproducible and snapshots meaningful.
//!
//! # Examples
//!
//! ```
//! use bloomgate::filters::StableBloomFilter;
//!
//! let mut filter = StableBloomFilter::new(1_000_000, 3, 0.01, 1).unwrap();
//!
//! assert!(!filter.test(b"hello"));
//! assert!(filter.test_and_add(b"hello")); // new
//! assert!(filter.test(b"hello"));
//! assert!(!filter.test_and_add(b"hello")); // seen
//! ```

use crate::core::cells::CellArray;
use crate::core::params;
use crate::error::{BloomGateError, Result};
use crate::hash::{BloomHasher, DoubleHashing, HashStrategy, XxHasher};

/// SplitMix64 finalizer. Maps the running insert counter to the decay
/// start position; any two counters yield uncorrelated positions.
#[inline]
fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Stable Bloom Filter over a packed [`CellArray`].
///
/// # Type Parameters
///
/// * `H` - Hash function (defaults to the pinned-seed [`XxHasher`]; any
///   replacement must be deterministic across processes or snapshots
///   become unreadable)
///
/// # Concurrency
///
/// Queries take `&self`, mutations `&mut self`. The service layer wraps
/// the filter in a reader/writer lock; the engine itself stays free of
/// synchronization so its buffer is a pure function of the operation
/// sequence.
#[derive(Debug)]
pub struct StableBloomFilter<H = XxHasher>
where
    H: BloomHasher,
{
    /// Packed counter storage.
    cells: CellArray,

    /// Number of cells (m).
    m: u64,

    /// Probe positions per operation (k).
    k: u16,

    /// Cells decremented per insert (p).
    p: u32,

    /// Saturation value, `2^d - 1`.
    max: u8,

    /// Target false-positive rate the parameters were derived for.
    target_fp_rate: f64,

    /// Hash function.
    hasher: H,

    /// Probe index derivation.
    strategy: DoubleHashing,

    /// Running insert counter seeding the decay position.
    decay_seq: u64,
}

impl StableBloomFilter<XxHasher> {
    /// Create a filter with the default hasher.
    ///
    /// # Arguments
    ///
    /// * `cells` - Number of cells `m` (immutable for the instance)
    /// * `k` - Probe positions per operation; `0` derives a default from
    ///   `fp_rate`
    /// * `fp_rate` - Target false-positive rate in `(0, 1)`; determines
    ///   the decay width `p`
    /// * `counter_bits` - Cell width `d` in bits, `1..=8`
    ///
    /// # Errors
    ///
    /// Returns [`BloomGateError::InvalidParameters`] when the bounds
    /// above are violated or `cells < k`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bloomgate::filters::StableBloomFilter;
    ///
    /// // k derived from the target rate.
    /// let filter = StableBloomFilter::new(1_000_000, 0, 0.0001, 1).unwrap();
    /// assert_eq!(filter.k(), 7);
    /// assert!(filter.p() >= 1);
    /// ```
    pub fn new(cells: u64, k: u16, fp_rate: f64, counter_bits: u8) -> Result<Self> {
        Self::with_hasher(cells, k, fp_rate, counter_bits, XxHasher::new())
    }
}

impl<H> StableBloomFilter<H>
where
    H: BloomHasher,
{
    /// Create a filter with a custom hasher. See [`StableBloomFilter::new`].
    pub fn with_hasher(cells: u64, k: u16, fp_rate: f64, counter_bits: u8, hasher: H) -> Result<Self> {
        if fp_rate <= 0.0 || fp_rate >= 1.0 {
            return Err(BloomGateError::invalid_parameters(format!(
                "fp_rate {} must be in (0, 1)",
                fp_rate
            )));
        }

        let storage = CellArray::new(cells, counter_bits)?;

        let k = if k == 0 {
            params::default_probe_count(cells, fp_rate)
        } else {
            k
        };
        if u64::from(k) > cells {
            return Err(BloomGateError::invalid_parameters(format!(
                "k {} exceeds cell count {}",
                k, cells
            )));
        }

        let p = params::optimal_decay(cells, k, counter_bits, fp_rate);
        let max = storage.max_value();

        Ok(Self {
            cells: storage,
            m: cells,
            k,
            p,
            max,
            target_fp_rate: fp_rate,
            hasher,
            strategy: DoubleHashing,
            decay_seq: 0,
        })
    }

    /// Test membership: `true` iff every probed cell is non-zero.
    ///
    /// Never mutates; a pure function of the current cell state.
    #[must_use]
    pub fn test(&self, value: &[u8]) -> bool {
        let (h1, h2) = self.hasher.hash_pair(value);
        (0..u64::from(self.k))
            .all(|j| self.cells.get(self.strategy.probe(h1, h2, j, self.m)) != 0)
    }

    /// Insert a value: decay `p` cells, then saturate the value's `k`
    /// cells.
    ///
    /// The order is observable and fixed. Decay first means the value's
    /// own cells cannot be decremented by its own insert, so the value
    /// is present immediately afterwards, always.
    pub fn add(&mut self, value: &[u8]) {
        let (h1, h2) = self.hasher.hash_pair(value);
        self.decay();
        self.saturate_probes(h1, h2);
    }

    /// Combined query and insert.
    ///
    /// Returns `true` when the value was new: at least one of its cells
    /// was zero before this call. The insert (decay plus saturation)
    /// happens regardless of the answer.
    pub fn test_and_add(&mut self, value: &[u8]) -> bool {
        let (h1, h2) = self.hasher.hash_pair(value);
        let was_new = (0..u64::from(self.k))
            .any(|j| self.cells.get(self.strategy.probe(h1, h2, j, self.m)) == 0);
        self.decay();
        self.saturate_probes(h1, h2);
        was_new
    }

    /// Decrement `p` consecutive cells starting at a position derived
    /// from the running insert counter, wrapping at `m`.
    fn decay(&mut self) {
        let start = splitmix64(self.decay_seq) % self.m;
        self.decay_seq = self.decay_seq.wrapping_add(1);
        for i in 0..u64::from(self.p) {
            let idx = (start + i) % self.m;
            self.cells.decrement(idx);
        }
    }

    fn saturate_probes(&mut self, h1: u64, h2: u64) {
        for j in 0..u64::from(self.k) {
            let idx = self.strategy.probe(h1, h2, j, self.m);
            self.cells.saturate(idx);
        }
    }

    /// Number of cells (m).
    #[must_use]
    #[inline]
    pub const fn cells(&self) -> u64 {
        self.m
    }

    /// Probe positions per operation (k).
    #[must_use]
    #[inline]
    pub const fn k(&self) -> u16 {
        self.k
    }

    /// Cells decremented per insert (p).
    #[must_use]
    #[inline]
    pub const fn p(&self) -> u32 {
        self.p
    }

    /// Counter width in bits (d).
    #[must_use]
    #[inline]
    pub fn counter_bits(&self) -> u8 {
        self.cells.counter_bits()
    }

    /// Saturation value, `2^d - 1`.
    #[must_use]
    #[inline]
    pub const fn max_value(&self) -> u8 {
        self.max
    }

    /// Target false-positive rate the parameters were derived for.
    #[must_use]
    #[inline]
    pub const fn target_fp_rate(&self) -> f64 {
        self.target_fp_rate
    }

    /// Limiting fraction of zero cells as inserts go to infinity.
    #[must_use]
    pub fn stable_point(&self) -> f64 {
        params::stable_point(self.m, self.k, self.p, self.max)
    }

    /// Expected false-positive rate at the stable point.
    #[must_use]
    pub fn false_positive_rate(&self) -> f64 {
        params::stable_fp_rate(self.stable_point(), self.k)
    }

    /// The packed cell buffer, as serialised by the snapshot codec.
    #[must_use]
    pub fn cell_bytes(&self) -> &[u8] {
        self.cells.as_bytes()
    }

    /// Replace the cell buffer from a snapshot payload.
    pub(crate) fn load_cell_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.cells.copy_from_bytes(data)
    }

    /// Size of the packed cell buffer in bytes.
    #[must_use]
    pub fn cell_byte_len(&self) -> usize {
        self.cells.byte_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_filter() -> StableBloomFilter {
        StableBloomFilter::new(10_000, 3, 0.01, 1).unwrap()
    }

    #[test]
    fn test_empty_filter_reports_absent() {
        let filter = small_filter();
        assert!(!filter.test(b"anything"));
        assert!(!filter.test(b""));
    }

    #[test]
    fn test_present_immediately_after_add() {
        let mut filter = small_filter();
        filter.add(b"fresh");
        assert!(filter.test(b"fresh"));
    }

    #[test]
    fn test_and_add_returns_was_new() {
        let mut filter = small_filter();
        assert!(filter.test_and_add(b"first"));
        assert!(!filter.test_and_add(b"first"));
    }

    #[test]
    fn test_no_false_negatives_for_recent_inserts() {
        let mut filter = small_filter();
        for i in 0..100u32 {
            let value = format!("value-{i}");
            filter.add(value.as_bytes());
            assert!(filter.test(value.as_bytes()), "lost {value} right after add");
        }
    }

    #[test]
    fn test_query_is_pure() {
        let mut filter = small_filter();
        filter.add(b"pinned");
        let before = filter.cell_bytes().to_vec();
        for _ in 0..10 {
            assert!(filter.test(b"pinned"));
            let _ = filter.test(b"never-added");
        }
        assert_eq!(filter.cell_bytes(), &before[..]);
    }

    #[test]
    fn test_derived_k_from_fp_rate() {
        let filter = StableBloomFilter::new(1_000_000, 0, 0.0001, 1).unwrap();
        assert_eq!(filter.k(), 7);
        let filter = StableBloomFilter::new(1_000_000, 0, 0.01, 1).unwrap();
        assert_eq!(filter.k(), 3);
    }

    #[test]
    fn test_parameters_are_stable() {
        let mut filter = small_filter();
        let (m, k, p, d) = (filter.cells(), filter.k(), filter.p(), filter.counter_bits());
        for i in 0..1000u32 {
            filter.add(i.to_string().as_bytes());
        }
        assert_eq!(filter.cells(), m);
        assert_eq!(filter.k(), k);
        assert_eq!(filter.p(), p);
        assert_eq!(filter.counter_bits(), d);
    }

    #[test]
    fn test_decay_forgets_eventually() {
        // Tiny filter, heavy churn: early values fade. A bounded filter
        // that never forgot anything would have to saturate instead.
        let mut filter = StableBloomFilter::new(64, 2, 0.05, 1).unwrap();
        let early: Vec<String> = (0..20).map(|i| format!("early-{i}")).collect();
        for value in &early {
            filter.add(value.as_bytes());
        }
        for i in 0..10_000u32 {
            filter.add(format!("churn-{i}").as_bytes());
        }
        let survivors = early.iter().filter(|v| filter.test(v.as_bytes())).count();
        assert!(
            survivors < early.len(),
            "all {} early values survived 10k decaying inserts in a 64-cell filter",
            early.len()
        );
    }

    #[test]
    fn test_identical_sequences_identical_buffers() {
        let mut a = small_filter();
        let mut b = small_filter();
        for i in 0..500u32 {
            let value = format!("item-{}", i % 300);
            assert_eq!(a.test_and_add(value.as_bytes()), b.test_and_add(value.as_bytes()));
        }
        assert_eq!(a.cell_bytes(), b.cell_bytes());
    }

    #[test]
    fn test_stable_point_and_fp_rate_sane() {
        let filter = StableBloomFilter::new(1_000_000, 3, 0.01, 1).unwrap();
        let sp = filter.stable_point();
        assert!(sp > 0.0 && sp < 1.0);
        let fp = filter.false_positive_rate();
        assert!(fp > 0.0 && fp < 0.05, "fp {} far from target", fp);
    }

    #[test]
    fn test_wide_counters() {
        let mut filter = StableBloomFilter::new(1000, 2, 0.01, 4).unwrap();
        assert_eq!(filter.max_value(), 15);
        filter.add(b"wide");
        assert!(filter.test(b"wide"));
    }

    #[test]
    fn test_invalid_fp_rate_rejected() {
        assert!(StableBloomFilter::new(100, 1, 0.0, 1).is_err());
        assert!(StableBloomFilter::new(100, 1, 1.0, 1).is_err());
        assert!(StableBloomFilter::new(100, 1, -0.5, 1).is_err());
    }

    #[test]
    fn test_k_exceeding_cells_rejected() {
        assert!(StableBloomFilter::new(4, 5, 0.01, 1).is_err());
    }

    #[test]
    fn test_empty_value_is_a_value() {
        // The bootstrap loader inserts blank lines as-is.
        let mut filter = small_filter();
        assert!(filter.test_and_add(b""));
        assert!(filter.test(b""));
        assert!(!filter.test_and_add(b""));
    }

    #[test]
    fn test_splitmix_spreads_counters() {
        let a = splitmix64(0);
        let b = splitmix64(1);
        let c = splitmix64(2);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
