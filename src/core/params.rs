//! Parameter derivation for the Stable Bloom Filter.
//!
//! Unlike a classic Bloom filter, a stable filter is not sized for an
//! expected item count: it runs forever and converges to a *stable
//! point*, the limiting fraction of zero cells. The knobs are:
//!
//! - `m`: number of cells
//! - `k`: probe positions touched per operation
//! - `p`: cells decremented per insert (the decay width)
//! - `d`: counter width in bits, giving `Max = 2^d - 1`
//!
//! Given a target false-positive rate, this module derives `k` (when the
//! operator leaves it unset) and `p` so that the expected stable-state
//! false-positive rate matches the target.
//!
//! # Mathematical Background
//!
//! From Deng & Rafiei, "Approximately Detecting Duplicates for Streaming
//! Data using Stable Bloom Filters" (SIGMOD 2006):
//!
//! ```text
//! stable_point = (1 / (1 + 1/(p * (1/k - 1/m))))^Max
//! fp_rate      = (1 - stable_point)^k
//! ```
//!
//! Solving the second equation for `p` yields [`optimal_decay`].

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

/// Derive the default number of probe positions for a target
/// false-positive rate.
///
/// Uses half the classic-Bloom optimum `ceil(log2(1/fp))`: a stable
/// filter pays for extra probes twice (query cost and faster cell
/// churn), and half the classic count keeps the decay width `p`
/// reasonable while still meeting the target rate at the stable point.
/// The result is clamped to `[1, m]`.
///
/// # Examples
///
/// ```
/// use bloomgate::core::params::default_probe_count;
///
/// assert_eq!(default_probe_count(1_000_000, 0.01), 3);
/// assert_eq!(default_probe_count(1_000_000, 0.0001), 7);
/// // Degenerate targets still yield at least one probe.
/// assert_eq!(default_probe_count(1_000_000, 0.9), 1);
/// ```
#[must_use]
pub fn default_probe_count(m: u64, fp_rate: f64) -> u16 {
    let optimal = (1.0 / fp_rate).log2().ceil();
    let k = (optimal / 2.0) as u64;
    k.clamp(1, m.min(u64::from(u16::MAX))) as u16
}

/// Derive the decay width `p`: how many cells each insert decrements so
/// that the stable-state false-positive rate meets `fp_rate`.
///
/// Clamped to `[1, m]`; a decay run never needs to visit a cell twice.
///
/// # Examples
///
/// ```
/// use bloomgate::core::params::default_probe_count;
/// use bloomgate::core::params::optimal_decay;
///
/// let m = 1_000_000;
/// let k = default_probe_count(m, 0.01);
/// let p = optimal_decay(m, k, 1, 0.01);
/// assert_eq!(p, 10);
/// ```
#[must_use]
pub fn optimal_decay(m: u64, k: u16, counter_bits: u8, fp_rate: f64) -> u32 {
    let max = (2f64).powi(i32::from(counter_bits)) - 1.0;
    let sub_denom = (1.0 - fp_rate.powf(1.0 / f64::from(k))).powf(1.0 / max);
    let denom = (1.0 / sub_denom - 1.0) * (1.0 / f64::from(k) - 1.0 / (m as f64));

    let p = if denom > 0.0 { (1.0 / denom) as u64 } else { 0 };
    p.clamp(1, m.min(u64::from(u32::MAX))) as u32
}

/// The limit, as insertions go to infinity, of the expected fraction of
/// zero cells.
///
/// # Examples
///
/// ```
/// use bloomgate::core::params::stable_point;
///
/// let sp = stable_point(1_000_000, 3, 10, 1);
/// assert!(sp > 0.0 && sp < 1.0);
/// ```
#[must_use]
pub fn stable_point(m: u64, k: u16, p: u32, max: u8) -> f64 {
    let sub_denom = f64::from(p) * (1.0 / f64::from(k) - 1.0 / (m as f64));
    let denom = 1.0 + 1.0 / sub_denom;
    let base = 1.0 / denom;
    base.powf(f64::from(max))
}

/// Expected false-positive rate once the filter has reached its stable
/// point: `(1 - stable_point)^k`.
#[must_use]
pub fn stable_fp_rate(stable_point: f64, k: u16) -> f64 {
    (1.0 - stable_point).powf(f64::from(k))
}
