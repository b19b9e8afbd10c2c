//! Checkpoint persistence and startup recovery.
//!
//! [`Persistence`] owns the checkpoint path and the rules around the
//! dirty flag: a checkpoint writes only when the in-memory state has
//! changed since the last successful write, and a failed write never
//! clears the flag, so the next tick retries.
//!
//! Writes go to a sibling temp file, are fsynced, then renamed over the
//! destination. A crash mid-checkpoint leaves the previous snapshot
//! intact.
//!
//! Startup recovery follows a decision table over `(force, source
//! configured, snapshot exists)`; see [`bootstrap_plan`].

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::bootstrap::{self, BootstrapProgress};
use crate::error::{BloomGateError, Result};
use crate::filters::StableBloomFilter;
use crate::hash::BloomHasher;
use crate::snapshot::{read_snapshot, write_snapshot};
use crate::service::FilterState;

/// Result of a checkpoint request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// A snapshot was written and the dirty flag cleared.
    Wrote {
        /// Total bytes written (header plus cells).
        bytes: u64,
    },
    /// Nothing has changed since the last successful checkpoint.
    NotNecessary,
}

/// Where the filter's initial contents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPlan {
    /// Read the existing snapshot.
    FromSnapshot,
    /// Stream the text corpus.
    FromSource,
    /// Start with zeroed cells.
    Empty,
}

/// Select the bootstrap action.
///
/// `force` means "do not trust persistent state": any snapshot is
/// discarded, and without a source the filter starts empty.
///
/// | force | source | snapshot | action       |
/// |-------|--------|----------|--------------|
/// | true  | yes    | any      | FromSource   |
/// | true  | no     | any      | Empty        |
/// | false | any    | yes      | FromSnapshot |
/// | false | yes    | no       | FromSource   |
/// | false | no     | no       | Empty        |
#[must_use]
pub fn bootstrap_plan(force: bool, has_source: bool, snapshot_exists: bool) -> BootstrapPlan {
    if force {
        if has_source {
            BootstrapPlan::FromSource
        } else {
            BootstrapPlan::Empty
        }
    } else if snapshot_exists {
        BootstrapPlan::FromSnapshot
    } else if has_source {
        BootstrapPlan::FromSource
    } else {
        BootstrapPlan::Empty
    }
}

/// Checkpoint file owner: writes, loads, and startup recovery.
#[derive(Debug, Clone)]
pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    /// Create a controller for the given checkpoint destination.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The checkpoint destination.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a snapshot file currently exists.
    #[must_use]
    pub fn snapshot_exists(&self) -> bool {
        self.path.is_file()
    }

    /// Size of the persisted snapshot in bytes; 0 when missing.
    #[must_use]
    pub fn dump_size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Write a snapshot if the state is dirty.
    ///
    /// The caller must hold the filter's exclusive lock. On success the
    /// dirty flag is cleared; on any failure it keeps its prior value
    /// and the previous snapshot file is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BloomGateError::CheckpointIo`] on any filesystem
    /// failure.
    pub fn checkpoint(&self, state: &mut FilterState) -> Result<CheckpointOutcome> {
        if !state.dirty {
            debug!("checkpoint not necessary, state is clean");
            return Ok(CheckpointOutcome::NotNecessary);
        }

        let bytes = match self.write_to_disk(&state.filter) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(self.tmp_path());
                return Err(e);
            }
        };

        state.dirty = false;
        info!(
            path = %self.path.display(),
            bytes,
            "checkpoint written"
        );
        Ok(CheckpointOutcome::Wrote { bytes })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_owned();
        os.push(".tmp");
        PathBuf::from(os)
    }

    fn write_to_disk(&self, filter: &StableBloomFilter) -> Result<u64> {
        let tmp = self.tmp_path();
        let file = File::create(&tmp).map_err(|e| BloomGateError::checkpoint_io(&self.path, e))?;
        let mut writer = BufWriter::new(file);

        let bytes = write_snapshot(&mut writer, filter).map_err(|e| self.attach_path(e))?;

        let file = writer
            .into_inner()
            .map_err(|e| BloomGateError::checkpoint_io(&self.path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| BloomGateError::checkpoint_io(&self.path, e))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .map_err(|e| BloomGateError::checkpoint_io(&self.path, e))?;
        Ok(bytes)
    }

    /// Load the snapshot into `filter`. Returns bytes consumed.
    ///
    /// # Errors
    ///
    /// [`BloomGateError::CheckpointIo`] for filesystem failures,
    /// [`BloomGateError::IncompatibleSnapshot`] /
    /// [`BloomGateError::TruncatedSnapshot`] for unusable contents.
    pub fn load<H>(&self, filter: &mut StableBloomFilter<H>) -> Result<u64>
    where
        H: BloomHasher,
    {
        let file = File::open(&self.path).map_err(|e| BloomGateError::checkpoint_io(&self.path, e))?;
        let mut reader = BufReader::new(file);
        read_snapshot(&mut reader, filter).map_err(|e| self.attach_path(e))
    }

    /// Re-wrap a codec-level raw I/O error with this file's path.
    fn attach_path(&self, e: BloomGateError) -> BloomGateError {
        match e {
            BloomGateError::Io { source } => BloomGateError::checkpoint_io(&self.path, source),
            other => other,
        }
    }

    /// Populate `filter` at startup per the decision table.
    ///
    /// Returns the initial dirty flag: `true` after a source load (the
    /// loaded state exists nowhere on disk yet), `false` after a
    /// snapshot load or an empty start.
    ///
    /// Failures are absorbed rather than fatal: an unreadable or
    /// incompatible snapshot falls back to the source (or an empty
    /// start), and a source I/O error keeps whatever was loaded before
    /// the failure. The service still becomes ready; operators watch
    /// the log.
    pub fn recover(
        &self,
        filter: &mut StableBloomFilter,
        source: Option<&Path>,
        force: bool,
        progress: Option<&Sender<BootstrapProgress>>,
    ) -> bool {
        let plan = bootstrap_plan(force, source.is_some(), self.snapshot_exists());

        match plan {
            BootstrapPlan::FromSnapshot => {
                info!(path = %self.path.display(), "loading snapshot");
                match self.load(filter) {
                    Ok(bytes) => {
                        info!(bytes, "snapshot loaded");
                        false
                    }
                    Err(e) => {
                        warn!(error = %e, "snapshot unusable");
                        match source {
                            Some(path) => self.load_from_source(filter, path, progress),
                            None => {
                                info!("starting with an empty filter");
                                false
                            }
                        }
                    }
                }
            }
            BootstrapPlan::FromSource => {
                if force && self.snapshot_exists() {
                    info!(path = %self.path.display(), "force set, ignoring existing snapshot");
                }
                // The plan only selects FromSource when a source is set.
                let path = source.expect("bootstrap plan requires a source");
                self.load_from_source(filter, path, progress)
            }
            BootstrapPlan::Empty => {
                if force && self.snapshot_exists() {
                    info!(path = %self.path.display(), "force set without a source, existing snapshot discarded");
                }
                info!("starting with an empty filter");
                false
            }
        }
    }

    fn load_from_source(
        &self,
        filter: &mut StableBloomFilter,
        path: &Path,
        progress: Option<&Sender<BootstrapProgress>>,
    ) -> bool {
        info!(path = %path.display(), "loading source corpus");
        match bootstrap::load_source(path, filter, progress) {
            Ok(_) => true,
            Err(e) => {
                // Partial state may already be in the cells; keep it and
                // let the next checkpoint persist whatever made it in.
                warn!(error = %e, "source load failed, continuing with partial state");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> StableBloomFilter {
        StableBloomFilter::new(10_000, 3, 0.01, 1).unwrap()
    }

    fn dirty_state() -> FilterState {
        let mut state = FilterState::new(filter());
        state.filter.add(b"payload");
        state.dirty = true;
        state
    }

    #[test]
    fn test_bootstrap_plan_table() {
        use BootstrapPlan::*;

        assert_eq!(bootstrap_plan(true, true, true), FromSource);
        assert_eq!(bootstrap_plan(true, true, false), FromSource);
        assert_eq!(bootstrap_plan(true, false, true), Empty);
        assert_eq!(bootstrap_plan(true, false, false), Empty);
        assert_eq!(bootstrap_plan(false, true, true), FromSnapshot);
        assert_eq!(bootstrap_plan(false, false, true), FromSnapshot);
        assert_eq!(bootstrap_plan(false, true, false), FromSource);
        assert_eq!(bootstrap_plan(false, false, false), Empty);
    }

    #[test]
    fn test_checkpoint_clean_state_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("cells.sbf"));

        let mut state = FilterState::new(filter());
        assert_eq!(
            persistence.checkpoint(&mut state).unwrap(),
            CheckpointOutcome::NotNecessary
        );
        assert!(!persistence.snapshot_exists());
        assert_eq!(persistence.dump_size(), 0);
    }

    #[test]
    fn test_checkpoint_writes_and_clears_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("cells.sbf"));

        let mut state = dirty_state();
        let outcome = persistence.checkpoint(&mut state).unwrap();
        match outcome {
            CheckpointOutcome::Wrote { bytes } => {
                assert_eq!(bytes, persistence.dump_size());
            }
            CheckpointOutcome::NotNecessary => panic!("expected a write"),
        }
        assert!(!state.dirty);
        assert!(persistence.snapshot_exists());

        // Second request: clean again.
        assert_eq!(
            persistence.checkpoint(&mut state).unwrap(),
            CheckpointOutcome::NotNecessary
        );
    }

    #[test]
    fn test_checkpoint_failure_keeps_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("missing-dir").join("cells.sbf"));

        let mut state = dirty_state();
        let err = persistence.checkpoint(&mut state).unwrap_err();
        assert!(matches!(err, BloomGateError::CheckpointIo { .. }));
        assert!(state.dirty);
    }

    #[test]
    fn test_checkpoint_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.sbf");
        let persistence = Persistence::new(&path);

        persistence.checkpoint(&mut dirty_state()).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("cells.sbf")]);
    }

    #[test]
    fn test_checkpoint_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("cells.sbf"));

        let mut state = FilterState::new(filter());
        for i in 0..100u32 {
            state.filter.add(format!("item-{i}").as_bytes());
        }
        state.dirty = true;
        persistence.checkpoint(&mut state).unwrap();

        let mut restored = filter();
        persistence.load(&mut restored).unwrap();
        assert_eq!(restored.cell_bytes(), state.filter.cell_bytes());
        assert!(restored.test(b"item-42"));
    }

    #[test]
    fn test_recover_prefers_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("cells.sbf"));

        let mut state = FilterState::new(filter());
        state.filter.add(b"from-snapshot");
        state.dirty = true;
        persistence.checkpoint(&mut state).unwrap();

        let source = dir.path().join("corpus.txt");
        fs::write(&source, b"from-source\n").unwrap();

        let mut restored = filter();
        let dirty = persistence.recover(&mut restored, Some(&source), false, None);
        assert!(!dirty);
        assert!(restored.test(b"from-snapshot"));
        assert!(!restored.test(b"from-source"));
    }

    #[test]
    fn test_recover_force_rebuilds_from_source() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("cells.sbf"));

        let mut state = FilterState::new(filter());
        state.filter.add(b"stale-snapshot-entry");
        state.dirty = true;
        persistence.checkpoint(&mut state).unwrap();

        let source = dir.path().join("corpus.txt");
        fs::write(&source, b"fresh-entry\n").unwrap();

        let mut restored = filter();
        let dirty = persistence.recover(&mut restored, Some(&source), true, None);
        assert!(dirty);
        assert!(restored.test(b"fresh-entry"));
        assert!(!restored.test(b"stale-snapshot-entry"));
    }

    #[test]
    fn test_recover_force_without_source_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("cells.sbf"));

        let mut state = FilterState::new(filter());
        state.filter.add(b"discarded");
        state.dirty = true;
        persistence.checkpoint(&mut state).unwrap();

        let mut restored = filter();
        let dirty = persistence.recover(&mut restored, None, true, None);
        assert!(!dirty);
        assert!(!restored.test(b"discarded"));
    }

    #[test]
    fn test_recover_corrupt_snapshot_falls_back_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("cells.sbf");
        fs::write(&snapshot, b"not a snapshot").unwrap();
        let persistence = Persistence::new(&snapshot);

        let source = dir.path().join("corpus.txt");
        fs::write(&source, b"fallback-entry\n").unwrap();

        let mut restored = filter();
        let dirty = persistence.recover(&mut restored, Some(&source), false, None);
        assert!(dirty);
        assert!(restored.test(b"fallback-entry"));
    }

    #[test]
    fn test_recover_missing_source_continues_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("cells.sbf"));
        let missing = dir.path().join("nope.txt");

        let mut restored = filter();
        let dirty = persistence.recover(&mut restored, Some(&missing), false, None);
        // Conservative: treated as (possibly) partial, so dirty.
        assert!(dirty);
        assert!(!restored.test(b"anything"));
    }

    #[test]
    fn test_dump_size_tracks_file() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("cells.sbf"));
        assert_eq!(persistence.dump_size(), 0);

        persistence.checkpoint(&mut dirty_state()).unwrap();
        let expected = 28 + (10_000f64 / 8.0).ceil() as u64;
        assert_eq!(persistence.dump_size(), expected);
    }
}
