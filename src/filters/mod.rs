//! Filter engine implementations.
//!
//! The service runs exactly one engine, the [`StableBloomFilter`]. Its
//! decay step bounds the fraction of saturated cells at a stable point,
//! so the filter absorbs an unbounded stream at a bounded false-positive
//! rate, trading away a small chance of forgetting old items.

pub mod stable;

pub use stable::StableBloomFilter;
