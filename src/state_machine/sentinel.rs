use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MarlinError;

use super::state::{TaskEvent, TaskOutcome, TaskState};

const SUCCESS_EXT: &str = "success";
const FAILED_EXT: &str = "failed";

/// File-backed sentinel state for one partition's task array.
///
/// Each array index owns a pair of empty marker files in the partition's
/// log directory, `<task_name>_<index>.success` and
/// `<task_name>_<index>.failed`. Presence/absence encodes the persisted
/// [`TaskState`]; all mutation goes through [`record`](Self::record) and
/// [`clear`](Self::clear) so at most one marker of the pair exists at any
/// observation point.
#[derive(Debug)]
pub struct SentinelStore {
    dir: PathBuf,
    task_name: String,
}

/// Marker counts for one partition, as shown by `marlin status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SentinelSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl SentinelStore {
    /// Open the store over a partition log directory. A missing directory
    /// is a setup mistake (the release tree was never created), not sparse
    /// coverage, and is reported as a configuration error.
    pub fn open(dir: &Path, task_name: &str) -> Result<Self, MarlinError> {
        if !dir.is_dir() {
            return Err(MarlinError::MissingDir(dir.to_path_buf()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            task_name: task_name.to_string(),
        })
    }

    fn marker(&self, index: usize, ext: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.{}", self.task_name, index, ext))
    }

    /// Read back the persisted state for one array index.
    ///
    /// If both markers exist (manual tampering), the item reads as FAILED
    /// so a rerun picks it up.
    pub fn state(&self, index: usize) -> TaskState {
        let success = self.marker(index, SUCCESS_EXT).is_file();
        let failed = self.marker(index, FAILED_EXT).is_file();
        match (success, failed) {
            (_, true) => TaskState::Failed,
            (true, false) => TaskState::Succeeded,
            (false, false) => TaskState::Unattempted,
        }
    }

    /// Persist a terminal outcome: create one marker, remove the opposite.
    /// The returned state is the transition result, which the on-disk pair
    /// now encodes.
    pub fn record(&self, index: usize, outcome: TaskOutcome) -> Result<TaskState, MarlinError> {
        let prior = self.state(index);
        let (set, clear) = match outcome {
            TaskOutcome::Success => (SUCCESS_EXT, FAILED_EXT),
            TaskOutcome::Failure => (FAILED_EXT, SUCCESS_EXT),
        };
        fs::write(self.marker(index, set), b"")?;
        remove_if_present(&self.marker(index, clear))?;
        Ok(prior.next(TaskEvent::Complete(outcome)))
    }

    /// Remove both markers for one index, returning it to the
    /// unattempted pool.
    pub fn clear(&self, index: usize) -> Result<TaskState, MarlinError> {
        let prior = self.state(index);
        remove_if_present(&self.marker(index, SUCCESS_EXT))?;
        remove_if_present(&self.marker(index, FAILED_EXT))?;
        Ok(prior.next(TaskEvent::Reset))
    }

    /// Remove every marker carrying this task name, whatever its index.
    /// Used by a default-mode relaunch, where stale markers from previous
    /// runs (possibly with a different array size) must not survive.
    pub fn clear_all(&self) -> Result<(), MarlinError> {
        let prefix = format!("{}_", self.task_name);
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(&prefix)
                && (name.ends_with(SUCCESS_EXT) || name.ends_with(FAILED_EXT))
            {
                remove_if_present(&path)?;
            }
        }
        Ok(())
    }

    /// Count markers per outcome across the whole partition.
    pub fn summary(&self) -> Result<SentinelSummary, MarlinError> {
        let prefix = format!("{}_", self.task_name);
        let mut summary = SentinelSummary::default();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }
            if name.ends_with(SUCCESS_EXT) {
                summary.succeeded += 1;
            } else if name.ends_with(FAILED_EXT) {
                summary.failed += 1;
            }
        }
        Ok(summary)
    }
}

fn remove_if_present(path: &Path) -> Result<(), MarlinError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> SentinelStore {
        SentinelStore::open(tmp.path(), "level1b").unwrap()
    }

    #[test]
    fn open_fails_on_missing_dir() {
        let err = SentinelStore::open(Path::new("/no/such/log/dir"), "level1b").unwrap_err();
        assert!(matches!(err, MarlinError::MissingDir(_)));
    }

    #[test]
    fn fresh_index_is_unattempted() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(store(&tmp).state(1), TaskState::Unattempted);
    }

    #[test]
    fn record_success_then_failure_is_mutually_exclusive() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);

        assert_eq!(s.record(3, TaskOutcome::Success).unwrap(), TaskState::Succeeded);
        assert!(tmp.path().join("level1b_3.success").is_file());

        // Rerun fails: failed marker set, success marker gone.
        assert_eq!(s.record(3, TaskOutcome::Failure).unwrap(), TaskState::Failed);
        assert!(tmp.path().join("level1b_3.failed").is_file());
        assert!(!tmp.path().join("level1b_3.success").is_file());
    }

    #[test]
    fn clear_removes_both_markers() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.record(2, TaskOutcome::Failure).unwrap();
        s.clear(2).unwrap();
        assert_eq!(s.state(2), TaskState::Unattempted);
    }

    #[test]
    fn clear_all_only_touches_own_task_name() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.record(1, TaskOutcome::Success).unwrap();
        s.record(2, TaskOutcome::Failure).unwrap();
        // A marker from another level must survive.
        std::fs::write(tmp.path().join("level1c_1.success"), b"").unwrap();

        s.clear_all().unwrap();
        assert_eq!(s.state(1), TaskState::Unattempted);
        assert_eq!(s.state(2), TaskState::Unattempted);
        assert!(tmp.path().join("level1c_1.success").is_file());
    }

    #[test]
    fn tampered_pair_reads_as_failed() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("level1b_5.success"), b"").unwrap();
        std::fs::write(tmp.path().join("level1b_5.failed"), b"").unwrap();
        assert_eq!(store(&tmp).state(5), TaskState::Failed);
    }

    #[test]
    fn summary_counts_markers() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.record(1, TaskOutcome::Success).unwrap();
        s.record(2, TaskOutcome::Success).unwrap();
        s.record(3, TaskOutcome::Failure).unwrap();

        let summary = s.summary().unwrap();
        assert_eq!(summary, SentinelSummary { succeeded: 2, failed: 1 });
    }
}
