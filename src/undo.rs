/// Undo functionality for reverting an executed plan.
///
/// Undo works only from the [`ActionLog`] of a run, never from the plan, so it
/// reverses what actually happened. Moves are put back one by one; deletions
/// cannot be reversed and are reported as such.
use crate::error::{ActionError, ActionErrorKind};
use crate::executor::{ActionLog, ActionRecord, Outcome, move_with_retry};
use crate::fs_ops::{Filesystem, StdFilesystem};
use crate::retry::RetryPolicy;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

/// Why a moved item could not be put back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoConflict {
    /// Something now occupies the item's original location.
    DestinationOccupied,
    /// The item is no longer where it was moved to.
    SourceMissing,
}

impl std::fmt::Display for UndoConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DestinationOccupied => write!(f, "original location is occupied"),
            Self::SourceMissing => write!(f, "file not found at expected location"),
        }
    }
}

/// What happened to one record during undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum UndoStatus {
    /// Moved back to its original location.
    Restored,
    /// The file was deleted and cannot be restored.
    NotRestorable,
    /// Left where it is because restoring it would be unsafe.
    Conflict(UndoConflict),
    /// The move back was attempted and failed.
    Failed(ActionError),
}

/// One line of an undo report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoEntry {
    /// Index of the originating action in the plan.
    pub action_index: usize,
    /// The original location of the item.
    pub path: PathBuf,
    /// Where the item was moved to, if it was moved.
    pub moved_to: Option<PathBuf>,
    pub status: UndoStatus,
}

/// Represents the result of an undo operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UndoReport {
    /// One entry per moved or deleted record, in log order.
    pub entries: Vec<UndoEntry>,
    /// Number of failed records, which had nothing to undo.
    pub skipped_failed: usize,
}

impl UndoReport {
    pub fn restored_count(&self) -> usize {
        self.with_status(|s| *s == UndoStatus::Restored).count()
    }

    /// Files that were deleted and are gone for good.
    pub fn not_restorable(&self) -> impl Iterator<Item = &UndoEntry> {
        self.with_status(|s| *s == UndoStatus::NotRestorable)
    }

    /// Moves that could not be reversed, either by conflict or failure.
    pub fn unresolved(&self) -> impl Iterator<Item = &UndoEntry> {
        self.with_status(|s| matches!(s, UndoStatus::Conflict(_) | UndoStatus::Failed(_)))
    }

    /// Returns true if every move was reversed.
    ///
    /// Deleted files do not count against this, see
    /// [`UndoReport::not_restorable`].
    pub fn is_complete_success(&self) -> bool {
        self.unresolved().next().is_none()
    }

    fn with_status<P>(&self, predicate: P) -> impl Iterator<Item = &UndoEntry>
    where
        P: Fn(&UndoStatus) -> bool,
    {
        self.entries
            .iter()
            .filter(move |entry| predicate(&entry.status))
    }
}

/// Reverses executed plans.
#[derive(Debug, Clone)]
pub struct UndoEngine<F = StdFilesystem> {
    fs: F,
    retry: RetryPolicy,
}

impl UndoEngine<StdFilesystem> {
    pub fn new() -> Self {
        Self {
            fs: StdFilesystem,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for UndoEngine<StdFilesystem> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Filesystem> UndoEngine<F> {
    pub fn with_filesystem<G: Filesystem>(self, fs: G) -> UndoEngine<G> {
        UndoEngine {
            fs,
            retry: self.retry,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Undoes the moves recorded in `log`.
    ///
    /// Records are processed in their original order. Nothing here is fatal:
    /// every record ends up in the report with its own status.
    ///
    /// # Edge Cases Handled
    ///
    /// * **File moved away since**: reported as a conflict, nothing touched
    /// * **Original location taken**: reported as a conflict, nothing overwritten
    /// * **Deleted file**: reported as not restorable
    /// * **Failed action**: skipped and counted
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use clipsort::executor::Executor;
    /// use clipsort::plan::{build_plan, PlanOptions};
    /// use clipsort::undo::UndoEngine;
    /// use std::path::Path;
    ///
    /// let plan = build_plan(Path::new("/media/sdcard"), &PlanOptions::new(true, false, None))
    ///     .expect("Directory should be readable");
    /// let log = Executor::new().execute(&plan);
    /// let report = UndoEngine::new().undo(&log);
    /// println!("Restored {} files", report.restored_count());
    /// ```
    pub fn undo(&self, log: &ActionLog) -> UndoReport {
        info!("Undoing {} recorded action(s)", log.len());

        let mut report = UndoReport::default();
        for record in log.records() {
            let status = match &record.outcome {
                Outcome::Moved => self.restore(record),
                Outcome::Deleted => {
                    warn!("{} was deleted and cannot be restored", record.source.display());
                    UndoStatus::NotRestorable
                }
                Outcome::Failed(_) => {
                    report.skipped_failed += 1;
                    continue;
                }
            };

            report.entries.push(UndoEntry {
                action_index: record.action_index,
                path: record.source.clone(),
                moved_to: record.destination.clone(),
                status,
            });
        }

        report
    }

    /// Moves a single item back to where it came from.
    fn restore(&self, record: &ActionRecord) -> UndoStatus {
        let Some(moved_to) = record.destination.as_deref() else {
            return UndoStatus::Failed(ActionError::new(
                ActionErrorKind::Other,
                "moved record has no destination",
            ));
        };

        if !self.fs.exists(moved_to) {
            warn!("Cannot restore {}: it is missing", moved_to.display());
            return UndoStatus::Conflict(UndoConflict::SourceMissing);
        }

        if self.fs.exists(&record.source) {
            warn!(
                "Cannot restore {}: {} is occupied",
                moved_to.display(),
                record.source.display()
            );
            return UndoStatus::Conflict(UndoConflict::DestinationOccupied);
        }

        match move_with_retry(&self.fs, &self.retry, moved_to, &record.source) {
            Ok(()) => {
                info!(
                    "Restored {} -> {}",
                    moved_to.display(),
                    record.source.display()
                );
                UndoStatus::Restored
            }
            Err(e) => {
                warn!("Could not restore {}: {}", moved_to.display(), e);
                UndoStatus::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::plan::{PlanOptions, build_plan};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn run(dir: &Path, delete_thm: bool) -> ActionLog {
        let plan = build_plan(dir, &PlanOptions::new(delete_thm, false, None))
            .expect("Plan should build");
        Executor::new()
            .with_retry_policy(RetryPolicy::immediate())
            .execute(&plan)
    }

    fn undo_engine() -> UndoEngine {
        UndoEngine::new().with_retry_policy(RetryPolicy::immediate())
    }

    #[test]
    fn test_undo_empty_log() {
        let report = undo_engine().undo(&ActionLog::new(PathBuf::from("/footage")));
        assert!(report.entries.is_empty());
        assert!(report.is_complete_success());
    }

    #[test]
    fn test_undo_single_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file_path = temp_dir.path().join("clip.mp4");
        fs::write(&file_path, "frames").expect("Failed to write test file");

        let log = run(temp_dir.path(), false);
        assert!(!file_path.exists());

        let report = undo_engine().undo(&log);

        assert_eq!(report.restored_count(), 1);
        assert!(report.is_complete_success());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "frames");
    }

    #[test]
    fn test_deleted_file_flagged_not_restorable() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("clip.thm"), "thumb").unwrap();
        fs::write(temp_dir.path().join("clip.mp4"), "frames").unwrap();

        let log = run(temp_dir.path(), true);
        let report = undo_engine().undo(&log);

        let lost: Vec<_> = report.not_restorable().collect();
        assert_eq!(lost.len(), 1);
        assert!(lost[0].path.ends_with("clip.thm"));
        assert_eq!(lost[0].moved_to, None);
        assert_eq!(report.restored_count(), 1);
        assert!(report.is_complete_success());
    }

    #[test]
    fn test_undo_with_file_name_conflict() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file_path = temp_dir.path().join("clip.mp4");
        fs::write(&file_path, "original content").unwrap();

        let log = run(temp_dir.path(), false);

        // Simulates a new file appearing at the original location
        fs::write(&file_path, "new content").unwrap();

        let report = undo_engine().undo(&log);

        assert_eq!(
            report.entries[0].status,
            UndoStatus::Conflict(UndoConflict::DestinationOccupied)
        );
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "new content");
        let moved = report.entries[0].moved_to.clone().unwrap();
        assert_eq!(fs::read_to_string(moved).unwrap(), "original content");
        assert!(!report.is_complete_success());
    }

    #[test]
    fn test_undo_with_missing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("a.mp4"), "a").unwrap();
        fs::write(temp_dir.path().join("b.mp4"), "b").unwrap();

        let log = run(temp_dir.path(), false);
        let moved_a = log.records()[0].destination.clone().unwrap();
        fs::remove_file(&moved_a).unwrap();

        let report = undo_engine().undo(&log);

        assert_eq!(
            report.entries[0].status,
            UndoStatus::Conflict(UndoConflict::SourceMissing)
        );
        assert_eq!(report.entries[1].status, UndoStatus::Restored);
        assert_eq!(report.unresolved().count(), 1);
        assert!(temp_dir.path().join("b.mp4").exists());
    }

    #[test]
    fn test_failed_records_skipped() {
        let mut log = ActionLog::new(PathBuf::from("/footage"));
        log.add_record(ActionRecord {
            action_index: 0,
            source: PathBuf::from("/footage/clip.mp4"),
            destination: Some(PathBuf::from("/footage/20240115/clip.mp4")),
            outcome: Outcome::Failed(ActionError::new(ActionErrorKind::Busy, "locked")),
        });

        let report = undo_engine().undo(&log);

        assert!(report.entries.is_empty());
        assert_eq!(report.skipped_failed, 1);
    }

    #[test]
    fn test_bucket_directories_left_in_place() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("clip.mp4"), "frames").unwrap();

        let log = run(temp_dir.path(), false);
        let bucket = log.records()[0]
            .destination
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap();

        undo_engine().undo(&log);

        assert!(bucket.is_dir());
        assert_eq!(fs::read_dir(&bucket).unwrap().count(), 0);
    }

    #[test]
    fn test_report_serializes_statuses() {
        let report = UndoReport {
            entries: vec![UndoEntry {
                action_index: 2,
                path: PathBuf::from("/footage/clip.thm"),
                moved_to: None,
                status: UndoStatus::NotRestorable,
            }],
            skipped_failed: 0,
        };

        let json = serde_json::to_value(&report).expect("Report should serialize");
        assert_eq!(json["entries"][0]["status"]["status"], "not_restorable");
    }
}
