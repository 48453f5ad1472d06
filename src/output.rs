//! Per-task output handler, invoked by the scheduler after each array task
//! reaches a terminal state (`marlin output <descriptor> <exit_status>`).
//!
//! Reads the work item identity back from its on-disk input descriptor,
//! relocates the raw scheduler stdout/stderr to their canonical names in the
//! permanent per-partition log directory, and records the outcome through
//! the sentinel state machine.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MarlinError;
use crate::partition::WorkItem;
use crate::state_machine::{SentinelStore, TaskOutcome, TaskState};

/// What the handler did, for reporting and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledOutput {
    pub canonical: String,
    pub log_file: PathBuf,
    pub state: TaskState,
}

/// Read a work item back from its `<index>.input` descriptor.
pub fn read_descriptor(path: &Path) -> Result<(usize, WorkItem), MarlinError> {
    let index = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| MarlinError::Descriptor {
            path: path.to_path_buf(),
            reason: "file name is not `<index>.input`".to_string(),
        })?;
    let contents = fs::read_to_string(path)?;
    let item = serde_json::from_str(&contents).map_err(|e| MarlinError::Descriptor {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok((index, item))
}

/// Write a work item descriptor for one array index.
pub fn write_descriptor(dir: &Path, index: usize, item: &WorkItem) -> Result<PathBuf, MarlinError> {
    let path = dir.join(format!("{index}.input"));
    fs::write(&path, serde_json::to_string_pretty(item)?)?;
    Ok(path)
}

/// Handle one terminal task.
///
/// `exit_status` is the main task's exit code as observed by the scheduler;
/// zero renames stdout to `<canonical>.ok` and sets the success sentinel,
/// anything else renames it to `<canonical>.error` and sets the failed
/// sentinel. The raw stderr becomes `<canonical>.log` either way. Absent
/// raw files are tolerated; the sentinel is recorded regardless.
pub fn handle_output(
    descriptor: &Path,
    exit_status: i32,
    rm_input: bool,
    data_dir: &Path,
) -> Result<HandledOutput, MarlinError> {
    let (index, item) = read_descriptor(descriptor)?;
    let scratch = descriptor.parent().ok_or_else(|| MarlinError::Descriptor {
        path: descriptor.to_path_buf(),
        reason: "descriptor has no parent directory".to_string(),
    })?;

    let log_dir = data_dir
        .join(&item.release)
        .join(&item.dataset)
        .join(&item.target_level)
        .join("log")
        .join(&item.sid_dck);
    let store = SentinelStore::open(&log_dir, &item.target_level)?;

    let canonical = item.canonical_id();
    let (outcome, ext) = if exit_status == 0 {
        (TaskOutcome::Success, "ok")
    } else {
        (TaskOutcome::Failure, "error")
    };

    // A task killed before producing output leaves no raw files; the
    // outcome must still be recorded.
    let log_file = log_dir.join(format!("{canonical}.{ext}"));
    let stdout_raw = scratch.join(format!("{index}.out"));
    if stdout_raw.is_file() {
        relocate(&stdout_raw, &log_file)?;
    }

    let stderr_raw = scratch.join(format!("{index}.err"));
    if stderr_raw.is_file() {
        relocate(&stderr_raw, &log_dir.join(format!("{canonical}.log")))?;
    }

    let state = store.record(index, outcome)?;

    // Keeping the descriptor around helps diagnose stuck reruns.
    if rm_input {
        fs::remove_file(descriptor)?;
    }

    Ok(HandledOutput { canonical, log_file, state })
}

/// Remove the canonical log artifacts of one item before resubmission, so
/// stale output cannot be mistaken for fresh output.
pub fn clean_canonical_logs(log_dir: &Path, canonical: &str) -> Result<(), MarlinError> {
    for ext in ["ok", "error", "log"] {
        let path = log_dir.join(format!("{canonical}.{ext}"));
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

// Scratch and data trees may live on different filesystems, where a plain
// rename fails with EXDEV.
fn relocate(src: &Path, dst: &Path) -> Result<(), MarlinError> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst)?;
    fs::remove_file(src)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Period;
    use tempfile::TempDir;

    fn item() -> WorkItem {
        WorkItem {
            sid_dck: "103-792".into(),
            period: Period::new(2020, 1),
            release: "release_7.0".into(),
            update: "000000".into(),
            dataset: "ICOADS_R3.0.2T".into(),
            source_level: "level1a".into(),
            target_level: "level1b".into(),
        }
    }

    /// Lay out a data tree with the partition log dir, plus a scratch dir
    /// holding the descriptor and raw scheduler output for index 1.
    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let log_dir = data
            .join("release_7.0")
            .join("ICOADS_R3.0.2T")
            .join("level1b")
            .join("log")
            .join("103-792");
        fs::create_dir_all(&log_dir).unwrap();

        let scratch = tmp.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        let descriptor = write_descriptor(&scratch, 1, &item()).unwrap();
        fs::write(scratch.join("1.out"), "stdout of the task\n").unwrap();
        fs::write(scratch.join("1.err"), "stderr of the task\n").unwrap();
        (tmp, data, descriptor)
    }

    #[test]
    fn descriptor_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = write_descriptor(tmp.path(), 7, &item()).unwrap();
        let (index, read_back) = read_descriptor(&path).unwrap();
        assert_eq!(index, 7);
        assert_eq!(read_back, item());
    }

    #[test]
    fn bad_descriptor_name_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notanindex.input");
        fs::write(&path, serde_json::to_string(&item()).unwrap()).unwrap();
        let err = read_descriptor(&path).unwrap_err();
        assert!(matches!(err, MarlinError::Descriptor { .. }));
    }

    #[test]
    fn success_produces_ok_and_log_files() {
        let (_tmp, data, descriptor) = fixture();
        let handled = handle_output(&descriptor, 0, false, &data).unwrap();

        assert_eq!(handled.canonical, "2020-01-release_7.0-000000");
        assert_eq!(handled.state, TaskState::Succeeded);

        let log_dir = handled.log_file.parent().unwrap();
        assert!(log_dir.join("2020-01-release_7.0-000000.ok").is_file());
        assert!(log_dir.join("2020-01-release_7.0-000000.log").is_file());
        assert!(log_dir.join("level1b_1.success").is_file());
        // Raw files were moved, not copied.
        assert!(!descriptor.parent().unwrap().join("1.out").exists());
        // Descriptor kept by default.
        assert!(descriptor.is_file());
    }

    #[test]
    fn failure_over_previous_success_flips_sentinels() {
        let (_tmp, data, descriptor) = fixture();
        let scratch = descriptor.parent().unwrap().to_path_buf();

        handle_output(&descriptor, 0, false, &data).unwrap();

        // The rerun fails.
        fs::write(scratch.join("1.out"), "boom\n").unwrap();
        fs::write(scratch.join("1.err"), "trace\n").unwrap();
        let handled = handle_output(&descriptor, 1, false, &data).unwrap();
        assert_eq!(handled.state, TaskState::Failed);

        let log_dir = handled.log_file.parent().unwrap();
        assert!(log_dir.join("2020-01-release_7.0-000000.error").is_file());
        assert!(log_dir.join("level1b_1.failed").is_file());
        assert!(!log_dir.join("level1b_1.success").is_file());
    }

    #[test]
    fn killed_task_without_output_still_records_failure() {
        let (_tmp, data, descriptor) = fixture();
        let scratch = descriptor.parent().unwrap();
        fs::remove_file(scratch.join("1.out")).unwrap();
        fs::remove_file(scratch.join("1.err")).unwrap();

        let handled = handle_output(&descriptor, 137, false, &data).unwrap();
        assert_eq!(handled.state, TaskState::Failed);

        let log_dir = handled.log_file.parent().unwrap();
        assert!(log_dir.join("level1b_1.failed").is_file());
        assert!(!log_dir.join("2020-01-release_7.0-000000.error").exists());
    }

    #[test]
    fn rm_input_deletes_the_descriptor() {
        let (_tmp, data, descriptor) = fixture();
        handle_output(&descriptor, 0, true, &data).unwrap();
        assert!(!descriptor.exists());
    }

    #[test]
    fn missing_log_dir_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let scratch = tmp.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        let descriptor = write_descriptor(&scratch, 1, &item()).unwrap();
        fs::write(scratch.join("1.out"), "x").unwrap();

        let err = handle_output(&descriptor, 0, false, tmp.path()).unwrap_err();
        assert!(matches!(err, MarlinError::MissingDir(_)));
    }

    #[test]
    fn clean_canonical_logs_removes_stale_artifacts() {
        let tmp = TempDir::new().unwrap();
        for ext in ["ok", "error", "log"] {
            fs::write(tmp.path().join(format!("2020-01-r-0.{ext}")), "old").unwrap();
        }
        clean_canonical_logs(tmp.path(), "2020-01-r-0").unwrap();
        assert!(!tmp.path().join("2020-01-r-0.ok").exists());
        assert!(!tmp.path().join("2020-01-r-0.error").exists());
        // Idempotent on an already-clean directory.
        clean_canonical_logs(tmp.path(), "2020-01-r-0").unwrap();
    }
}
