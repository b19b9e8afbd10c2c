//! Corpus bootstrap: one-time load of a line-oriented source file.
//!
//! The source is UTF-8-agnostic text, one value per byte line split on
//! `\n` (a trailing `\r` is stripped, a final unterminated line counts).
//! A `.gz` suffix switches to streaming gzip decompression. Every line,
//! including blank ones, goes through `test_and_add`; the transport
//! layer's minimum-length rule does not apply here.
//!
//! Progress is advisory: events flow through a bounded channel with
//! `try_send`, so a slow consumer loses events, never slows the load.
//! When a progress channel is attached, the loader first streams the
//! file once to count newlines (bytes only, nothing parsed twice) so
//! events can carry a total.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crossbeam_channel::Sender;
use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::error::{BloomGateError, Result};
use crate::filters::StableBloomFilter;
use crate::hash::BloomHasher;

/// Emit a progress event every this many newly added lines.
pub const PROGRESS_EVERY_LINES: u64 = 10_000_000;

/// Read buffer for the newline pre-count.
const COUNT_BUF_LEN: usize = 32 * 1024;

/// Advisory progress event emitted during a source load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapProgress {
    /// Lines read so far.
    pub scanned: u64,
    /// Lines that were new to the filter.
    pub added: u64,
    /// Newline count of the whole source; 0 when the pre-count failed.
    pub total_lines: u64,
}

/// Final tallies of a completed source load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootstrapStats {
    /// Lines read.
    pub scanned: u64,
    /// Lines that were new to the filter.
    pub added: u64,
}

impl BootstrapStats {
    /// Lines already present (scanned minus added).
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.scanned - self.added
    }
}

/// Stream `path` into `filter`, one `test_and_add` per line.
///
/// On an I/O error mid-stream the filter keeps everything loaded so
/// far; the caller decides whether a partial filter is acceptable.
///
/// # Errors
///
/// Returns [`BloomGateError::BootstrapIo`] when the file cannot be
/// opened or the stream fails mid-read.
pub fn load_source<H>(
    path: &Path,
    filter: &mut StableBloomFilter<H>,
    progress: Option<&Sender<BootstrapProgress>>,
) -> Result<BootstrapStats>
where
    H: BloomHasher,
{
    load_source_inner(path, filter, progress, PROGRESS_EVERY_LINES)
}

fn load_source_inner<H>(
    path: &Path,
    filter: &mut StableBloomFilter<H>,
    progress: Option<&Sender<BootstrapProgress>>,
    progress_every: u64,
) -> Result<BootstrapStats>
where
    H: BloomHasher,
{
    // Total is for progress display only; a failed pre-count reports 0
    // rather than aborting the load.
    let total_lines = if progress.is_some() {
        count_lines(path).unwrap_or(0)
    } else {
        0
    };

    let mut reader =
        open_reader(path).map_err(|e| BloomGateError::bootstrap_io(path, e))?;
    if is_gzip(path) {
        info!(path = %path.display(), "gzip source detected");
    }

    let mut stats = BootstrapStats::default();
    let mut line = Vec::with_capacity(256);

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| BloomGateError::bootstrap_io(path, e))?;
        if n == 0 {
            break;
        }

        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        stats.scanned += 1;
        if filter.test_and_add(&line) {
            stats.added += 1;

            // Cadence is keyed to additions, not scans: a rerun over an
            // already-loaded corpus stays quiet.
            if stats.added % progress_every == 0 {
                if let Some(tx) = progress {
                    // Lossy by design.
                    let _ = tx.try_send(BootstrapProgress {
                        scanned: stats.scanned,
                        added: stats.added,
                        total_lines,
                    });
                }
                debug!(
                    scanned = stats.scanned,
                    added = stats.added,
                    total = total_lines,
                    "bootstrap progress"
                );
            }
        }
    }

    info!(
        path = %path.display(),
        scanned = stats.scanned,
        added = stats.added,
        skipped = stats.skipped(),
        "bootstrap complete"
    );
    Ok(stats)
}

/// Whether the path selects gzip decompression.
fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

fn open_reader(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Count `\n` bytes in the source without parsing lines.
///
/// Used only for progress totals; reads the stream once with a fixed
/// buffer.
pub fn count_lines(path: &Path) -> std::io::Result<u64> {
    let file = File::open(path)?;
    if is_gzip(path) {
        count_newlines(GzDecoder::new(file))
    } else {
        count_newlines(file)
    }
}

fn count_newlines<R: Read>(mut reader: R) -> std::io::Result<u64> {
    let mut buf = [0u8; COUNT_BUF_LEN];
    let mut count = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(count);
        }
        count += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }
}
