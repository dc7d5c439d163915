/// Execution of reorganization plans.
///
/// The executor walks a [`Plan`] in order and applies each action against the
/// filesystem. Every attempted action leaves exactly one [`ActionRecord`] in
/// the returned [`ActionLog`], whether it worked or not, so the log describes
/// what really happened rather than what was intended.
use crate::classifier::Disposition;
use crate::error::{ActionError, ActionErrorKind};
use crate::fs_ops::{Filesystem, StdFilesystem};
use crate::plan::{Plan, PlanAction};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of one attempted action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The item now lives at the destination and no longer at the source.
    Moved,
    /// The file was removed.
    Deleted,
    /// Nothing changed for this action.
    Failed(ActionError),
}

/// A single entry of the action log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    /// Index of the originating action in the plan.
    pub action_index: usize,
    /// The path the action started from.
    pub source: PathBuf,
    /// The path the item was moved to. `None` for deletions.
    pub destination: Option<PathBuf>,
    pub outcome: Outcome,
}

impl ActionRecord {
    pub fn is_moved(&self) -> bool {
        self.outcome == Outcome::Moved
    }

    pub fn is_deleted(&self) -> bool {
        self.outcome == Outcome::Deleted
    }

    pub fn error(&self) -> Option<&ActionError> {
        match &self.outcome {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Ordered record of everything attempted during one run.
///
/// This is what undo works from.
#[derive(Debug, Clone, Serialize)]
pub struct ActionLog {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// The directory that was organized.
    pub root: PathBuf,
    /// True if the run was interrupted before the end of the plan.
    pub cancelled: bool,
    records: Vec<ActionRecord>,
}

impl ActionLog {
    /// Creates an empty log for a given root.
    pub fn new(root: PathBuf) -> Self {
        Self {
            started_at: Utc::now(),
            root,
            cancelled: false,
            records: Vec::new(),
        }
    }

    /// Appends a record.
    pub fn add_record(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn moved_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_moved()).count()
    }

    pub fn deleted_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_deleted()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records.iter().filter(|r| r.error().is_some())
    }

    /// True if every attempted action succeeded and the run was not cut short.
    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.failures().next().is_none()
    }
}

/// Applies plans to the filesystem.
///
/// # Examples
///
/// ```no_run
/// use clipsort::executor::Executor;
/// use clipsort::plan::{build_plan, PlanOptions};
/// use std::path::Path;
///
/// let plan = build_plan(Path::new("/media/sdcard"), &PlanOptions::new(false, false, None))
///     .expect("Directory should be readable");
/// let log = Executor::new().execute(&plan);
/// println!("{} moved, {} failed", log.moved_count(), log.failures().count());
/// ```
#[derive(Debug, Clone)]
pub struct Executor<F = StdFilesystem> {
    fs: F,
    retry: RetryPolicy,
    cancel: Option<Arc<AtomicBool>>,
}

impl Executor<StdFilesystem> {
    pub fn new() -> Self {
        Self {
            fs: StdFilesystem,
            retry: RetryPolicy::default(),
            cancel: None,
        }
    }
}

impl Default for Executor<StdFilesystem> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Filesystem> Executor<F> {
    /// Replaces the filesystem the executor works on.
    pub fn with_filesystem<G: Filesystem>(self, fs: G) -> Executor<G> {
        Executor {
            fs,
            retry: self.retry,
            cancel: self.cancel,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stops the run between actions once `flag` is set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Applies every action of `plan`, in order.
    ///
    /// Individual failures are recorded and never stop the run.
    pub fn execute(&self, plan: &Plan) -> ActionLog {
        self.execute_with_progress(plan, |_| {})
    }

    /// Like [`Executor::execute`], calling `on_record` after each record is
    /// appended.
    pub fn execute_with_progress<P>(&self, plan: &Plan, mut on_record: P) -> ActionLog
    where
        P: FnMut(&ActionRecord),
    {
        let mut log = ActionLog::new(plan.root().to_path_buf());
        info!(
            "Executing {} planned action(s) in {}",
            plan.len(),
            plan.root().display()
        );

        for (index, action) in plan.actions().iter().enumerate() {
            if self.is_cancelled() {
                warn!(
                    "Cancelled after {} of {} action(s)",
                    index,
                    plan.len()
                );
                log.cancelled = true;
                break;
            }

            if let Some(record) = self.apply(index, action) {
                on_record(&record);
                log.add_record(record);
            }
        }

        log
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn apply(&self, index: usize, action: &PlanAction) -> Option<ActionRecord> {
        let outcome = match &action.disposition {
            Disposition::Relocate(_) => self.relocate(action),
            Disposition::Delete(_) => self.delete(action),
            Disposition::MoveDirectory(_) => self.move_directory(action)?,
        };

        match &outcome {
            Outcome::Moved => info!(
                "Moved {} -> {}",
                action.source.display(),
                action
                    .destination
                    .as_deref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default()
            ),
            Outcome::Deleted => info!("Deleted {}", action.source.display()),
            Outcome::Failed(e) => warn!("Could not process {}: {}", action.source.display(), e),
        }

        Some(ActionRecord {
            action_index: index,
            source: action.source.clone(),
            destination: action.destination.clone(),
            outcome,
        })
    }

    fn relocate(&self, action: &PlanAction) -> Outcome {
        let Some(destination) = action.destination.as_deref() else {
            return Outcome::Failed(ActionError::new(
                ActionErrorKind::Other,
                "relocation has no destination",
            ));
        };

        if !self.fs.exists(&action.source) {
            return Outcome::Failed(ActionError::new(
                ActionErrorKind::NotFound,
                format!("{} no longer exists", action.source.display()),
            ));
        }

        if let Some(bucket_dir) = destination.parent()
            && let Err(e) = self.fs.create_dir_all(bucket_dir)
        {
            return Outcome::Failed(ActionError::from_io(&e));
        }

        self.move_into_place(&action.source, destination)
    }

    fn delete(&self, action: &PlanAction) -> Outcome {
        match self.fs.remove_file(&action.source) {
            Ok(()) => Outcome::Deleted,
            Err(e) => Outcome::Failed(ActionError::from_io(&e)),
        }
    }

    /// Returns `None` when the move is not attempted at all.
    fn move_directory(&self, action: &PlanAction) -> Option<Outcome> {
        let destination = action.destination.as_deref()?;

        if !self.fs.exists(&action.source) {
            debug!(
                "Capture folder {} is gone, nothing to move",
                action.source.display()
            );
            return None;
        }

        if let Some(parent) = destination.parent()
            && let Err(e) = self.fs.create_dir_all(parent)
        {
            return Some(Outcome::Failed(ActionError::from_io(&e)));
        }

        Some(self.move_into_place(&action.source, destination))
    }

    fn move_into_place(&self, source: &Path, destination: &Path) -> Outcome {
        match move_with_retry(&self.fs, &self.retry, source, destination) {
            Ok(()) => Outcome::Moved,
            Err(e) => Outcome::Failed(e),
        }
    }
}

/// Moves `from` to `to` under `retry`, refusing to replace anything at `to`.
pub(crate) fn move_with_retry<F: Filesystem>(
    fs: &F,
    retry: &RetryPolicy,
    from: &Path,
    to: &Path,
) -> Result<(), ActionError> {
    if fs.exists(to) {
        return Err(ActionError::new(
            ActionErrorKind::DestinationExists,
            format!("{} already exists", to.display()),
        ));
    }

    retry
        .run(from, || fs.move_path(from, to))
        .map_err(|e| ActionError::from_io(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanOptions, build_plan};
    use chrono::{Local, TimeZone};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::io;
    use std::time::SystemTime;
    use tempfile::TempDir;

    /// Reports the listed files as locked for a number of move attempts.
    struct LockingFilesystem {
        locks: RefCell<HashMap<PathBuf, u32>>,
    }

    impl LockingFilesystem {
        fn new(locked: &[(PathBuf, u32)]) -> Self {
            Self {
                locks: RefCell::new(locked.iter().cloned().collect()),
            }
        }
    }

    impl Filesystem for LockingFilesystem {
        fn move_path(&self, from: &Path, to: &Path) -> io::Result<()> {
            if let Some(remaining) = self.locks.borrow_mut().get_mut(from)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(io::Error::new(io::ErrorKind::ResourceBusy, "file is locked"));
            }
            StdFilesystem.move_path(from, to)
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            StdFilesystem.remove_file(path)
        }

        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            StdFilesystem.create_dir_all(path)
        }
    }

    fn jan_15() -> SystemTime {
        Local
            .with_ymd_and_hms(2024, 1, 15, 12, 0, 0)
            .single()
            .expect("unambiguous local time")
            .into()
    }

    fn create_clip(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name).expect("Failed to write clip");
        File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(jan_15()))
            .expect("Failed to set mtime");
        path
    }

    fn executor() -> Executor {
        Executor::new().with_retry_policy(RetryPolicy::immediate())
    }

    #[test]
    fn test_relocate_creates_bucket_and_moves() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clip = create_clip(temp_dir.path(), "clip1.mp4");

        let plan = build_plan(temp_dir.path(), &PlanOptions::new(false, false, None)).unwrap();
        let log = executor().execute(&plan);

        assert_eq!(log.len(), 1);
        assert_eq!(log.moved_count(), 1);
        assert!(log.is_complete_success());
        assert!(!clip.exists());
        assert!(temp_dir.path().join("20240115").join("clip1.mp4").exists());
    }

    #[test]
    fn test_delete_records_deleted() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let thm = create_clip(temp_dir.path(), "clip1.thm");

        let plan = build_plan(temp_dir.path(), &PlanOptions::new(true, false, None)).unwrap();
        let log = executor().execute(&plan);

        assert_eq!(log.deleted_count(), 1);
        assert_eq!(log.records()[0].destination, None);
        assert!(!thm.exists());
    }

    #[test]
    fn test_vanished_source_recorded_as_not_found() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let gone = create_clip(temp_dir.path(), "a.mp4");
        create_clip(temp_dir.path(), "b.mp4");

        let plan = build_plan(temp_dir.path(), &PlanOptions::new(false, false, None)).unwrap();
        fs::remove_file(&gone).unwrap();
        let log = executor().execute(&plan);

        assert_eq!(log.len(), 2);
        assert_eq!(
            log.records()[0].error().map(|e| e.kind),
            Some(ActionErrorKind::NotFound)
        );
        assert!(log.records()[1].is_moved());
    }

    #[test]
    fn test_existing_destination_never_overwritten() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clip = create_clip(temp_dir.path(), "clip1.mp4");
        let bucket = temp_dir.path().join("20240115");
        fs::create_dir(&bucket).unwrap();
        fs::write(bucket.join("clip1.mp4"), "older copy").unwrap();

        let plan = build_plan(temp_dir.path(), &PlanOptions::new(false, false, None)).unwrap();
        let log = executor().execute(&plan);

        assert_eq!(
            log.records()[0].error().map(|e| e.kind),
            Some(ActionErrorKind::DestinationExists)
        );
        assert!(clip.exists());
        assert_eq!(
            fs::read_to_string(bucket.join("clip1.mp4")).unwrap(),
            "older copy"
        );
    }

    #[test]
    fn test_busy_file_retried_then_moved() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clip = create_clip(temp_dir.path(), "clip1.mp4");

        let plan = build_plan(temp_dir.path(), &PlanOptions::new(false, false, None)).unwrap();
        let locked = plan.actions()[0].source.clone();
        let log = executor()
            .with_filesystem(LockingFilesystem::new(&[(locked, 1)]))
            .execute(&plan);

        assert_eq!(log.moved_count(), 1);
        assert!(!clip.exists());
    }

    #[test]
    fn test_failure_does_not_stop_later_actions() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = create_clip(temp_dir.path(), "a.mp4");
        create_clip(temp_dir.path(), "b.mp4");
        create_clip(temp_dir.path(), "c.mp4");

        let plan = build_plan(temp_dir.path(), &PlanOptions::new(false, false, None)).unwrap();
        let locked = plan.actions()[0].source.clone();
        let log = executor()
            .with_filesystem(LockingFilesystem::new(&[(locked, 2)]))
            .execute(&plan);

        assert_eq!(log.len(), 3);
        assert_eq!(
            log.records()[0].error().map(|e| e.kind),
            Some(ActionErrorKind::Busy)
        );
        assert!(log.records()[1].is_moved());
        assert!(log.records()[2].is_moved());
        assert!(a.exists());
        assert!(!log.is_complete_success());
    }

    #[test]
    fn test_cancellation_stops_between_actions() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        create_clip(temp_dir.path(), "a.mp4");
        create_clip(temp_dir.path(), "b.mp4");

        let plan = build_plan(temp_dir.path(), &PlanOptions::new(false, false, None)).unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&flag);
        let log = executor()
            .with_cancellation(flag)
            .execute_with_progress(&plan, |_| trigger.store(true, Ordering::SeqCst));

        assert!(log.cancelled);
        assert_eq!(log.len(), 1);
        assert!(temp_dir.path().join("b.mp4").exists());
    }

    #[test]
    fn test_missing_capture_dir_not_recorded() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let archive = TempDir::new().expect("Failed to create archive directory");
        let drone = temp_dir.path().join("100DRONE");
        fs::create_dir(&drone).unwrap();

        let options = PlanOptions::new(false, false, Some(archive.path().to_path_buf()));
        let plan = build_plan(temp_dir.path(), &options).unwrap();
        fs::remove_dir(&drone).unwrap();
        let log = executor().execute(&plan);

        assert!(log.is_empty());
    }

    #[test]
    fn test_action_log_serializes_outcomes() {
        let mut log = ActionLog::new(PathBuf::from("/footage"));
        log.add_record(ActionRecord {
            action_index: 0,
            source: PathBuf::from("/footage/a.thm"),
            destination: None,
            outcome: Outcome::Failed(ActionError::new(ActionErrorKind::Busy, "locked")),
        });

        let json = serde_json::to_value(&log).expect("Log should serialize");
        assert_eq!(json["records"][0]["outcome"]["status"], "failed");
        assert_eq!(json["records"][0]["outcome"]["kind"], "busy");
        assert_eq!(json["cancelled"], false);
    }
}
