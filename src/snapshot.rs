//! Snapshot codec: the on-disk filter image.
//!
//! A snapshot is a fixed header followed by the packed cell buffer,
//! verbatim. All multi-byte header fields are big-endian:
//!
//! ```text
//! offset  size  field
//! 0       4     magic  "SBF1"
//! 4       1     format version (currently 1)
//! 5       1     d  counter width in bits
//! 6       2     k  probe count
//! 8       4     p  decay width
//! 12      8     m  cell count
//! 20      8     reserved, written as zero
//! 28      ...   packed cells, ceil(m * d / 8) bytes
//! ```
//!
//! The reader refuses anything it cannot faithfully restore: unknown
//! magic or version, parameters that differ from the receiving filter,
//! a payload cut short, or bytes left over after the declared length.
//!
//! # Examples
//!
//! ```
//! use std::io::Cursor;
//! use bloomgate::filters::StableBloomFilter;
//! use bloomgate::snapshot::{read_snapshot, write_snapshot};
//!
//! let mut original = StableBloomFilter::new(10_000, 3, 0.01, 1).unwrap();
//! original.add(b"kept across restarts");
//!
//! let mut buf = Vec::new();
//! write_snapshot(&mut buf, &original).unwrap();
//!
//! let mut restored = StableBloomFilter::new(10_000, 3, 0.01, 1).unwrap();
//! read_snapshot(&mut Cursor::new(buf), &mut restored).unwrap();
//! assert!(restored.test(b"kept across restarts"));
//! assert_eq!(original.cell_bytes(), restored.cell_bytes());
//! ```

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{BloomGateError, Result};
use crate::filters::StableBloomFilter;
use crate::hash::BloomHasher;

/// Leading magic bytes, `"SBF1"`.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"SBF1";

/// Current format version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Header length in bytes; the cell payload starts here.
pub const SNAPSHOT_HEADER_LEN: usize = 28;

/// Write `filter` as a snapshot into `sink`.
///
/// Returns the total number of bytes written. The sink is not flushed
/// or synced; the persistence layer owns durability.
///
/// # Errors
///
/// Propagates sink I/O failures as [`BloomGateError::Io`].
pub fn write_snapshot<W, H>(sink: &mut W, filter: &StableBloomFilter<H>) -> Result<u64>
where
    W: Write,
    H: BloomHasher,
{
    sink.write_all(&SNAPSHOT_MAGIC)?;
    sink.write_u8(SNAPSHOT_VERSION)?;
    sink.write_u8(filter.counter_bits())?;
    sink.write_u16::<BigEndian>(filter.k())?;
    sink.write_u32::<BigEndian>(filter.p())?;
    sink.write_u64::<BigEndian>(filter.cells())?;
    sink.write_u64::<BigEndian>(0)?;
    sink.write_all(filter.cell_bytes())?;

    Ok(SNAPSHOT_HEADER_LEN as u64 + filter.cell_byte_len() as u64)
}

/// Read a snapshot from `source` into `filter`.
///
/// The header must carry the magic, a known version, and exactly the
/// receiving filter's `(m, k, p, d)`; the payload must be exactly the
/// declared length with nothing after it. On any refusal the filter's
/// cells are left untouched.
///
/// Returns the total number of bytes consumed.
///
/// # Errors
///
/// - [`BloomGateError::IncompatibleSnapshot`]: bad magic, unknown
///   version, parameter mismatch, or trailing bytes
/// - [`BloomGateError::TruncatedSnapshot`]: stream ended early
/// - [`BloomGateError::Io`]: other read failures
pub fn read_snapshot<R, H>(source: &mut R, filter: &mut StableBloomFilter<H>) -> Result<u64>
where
    R: Read,
    H: BloomHasher,
{
    let mut header = [0u8; SNAPSHOT_HEADER_LEN];
    let got = read_full(source, &mut header)?;
    if got < SNAPSHOT_HEADER_LEN {
        return Err(BloomGateError::truncated_snapshot(
            SNAPSHOT_HEADER_LEN as u64,
            got as u64,
        ));
    }

    if header[0..4] != SNAPSHOT_MAGIC {
        return Err(BloomGateError::incompatible_snapshot(format!(
            "bad magic {:02x?}",
            &header[0..4]
        )));
    }
    let version = header[4];
    if version != SNAPSHOT_VERSION {
        return Err(BloomGateError::incompatible_snapshot(format!(
            "unsupported format version {}",
            version
        )));
    }

    let d = header[5];
    let k = BigEndian::read_u16(&header[6..8]);
    let p = BigEndian::read_u32(&header[8..12]);
    let m = BigEndian::read_u64(&header[12..20]);

    if m != filter.cells() {
        return Err(BloomGateError::incompatible_snapshot(format!(
            "cells mismatch: snapshot {}, filter {}",
            m,
            filter.cells()
        )));
    }
    if k != filter.k() {
        return Err(BloomGateError::incompatible_snapshot(format!(
            "k mismatch: snapshot {}, filter {}",
            k,
            filter.k()
        )));
    }
    if p != filter.p() {
        return Err(BloomGateError::incompatible_snapshot(format!(
            "p mismatch: snapshot {}, filter {}",
            p,
            filter.p()
        )));
    }
    if d != filter.counter_bits() {
        return Err(BloomGateError::incompatible_snapshot(format!(
            "counter width mismatch: snapshot {} bits, filter {} bits",
            d,
            filter.counter_bits()
        )));
    }

    let expected = filter.cell_byte_len();
    let mut payload = vec![0u8; expected];
    let got = read_full(source, &mut payload)?;
    if got < expected {
        return Err(BloomGateError::truncated_snapshot(
            expected as u64,
            got as u64,
        ));
    }

    let mut probe = [0u8; 1];
    if read_full(source, &mut probe)? != 0 {
        return Err(BloomGateError::incompatible_snapshot(
            "trailing bytes after cell payload",
        ));
    }

    filter.load_cell_bytes(&payload)?;
    Ok(SNAPSHOT_HEADER_LEN as u64 + expected as u64)
}

/// Read into `buf` until full or EOF; returns bytes read.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
