/// Reorganization plans built from a single directory snapshot.
///
/// Planning lists the directory once, classifies every entry and records the
/// intended action for each match. Nothing on disk is created, moved or
/// removed while planning, so a plan can be shown to the user and thrown away.
use crate::classifier::{
    self, BucketKey, DEFAULT_CAPTURE_DIR, DeleteReason, DirectoryEntry, Disposition,
};
use crate::config::CompiledFilters;
use crate::error::{OrganizeError, OrganizeResult};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Inputs that shape a plan.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Delete `.thm` files instead of relocating them.
    pub delete_thm: bool,
    /// Delete `.lrv` files instead of relocating them.
    pub delete_lrv: bool,
    /// Where the capture folder goes. Without it the folder stays put.
    pub capture_destination: Option<PathBuf>,
    /// Name of the capture folder, matched ignoring case.
    pub capture_dir_name: String,
    /// Files excluded from planning.
    pub filters: CompiledFilters,
}

impl PlanOptions {
    pub fn new(delete_thm: bool, delete_lrv: bool, capture_destination: Option<PathBuf>) -> Self {
        Self {
            delete_thm,
            delete_lrv,
            capture_destination,
            capture_dir_name: DEFAULT_CAPTURE_DIR.to_string(),
            filters: CompiledFilters::default(),
        }
    }

    pub fn with_capture_dir_name(mut self, name: impl Into<String>) -> Self {
        self.capture_dir_name = name.into();
        self
    }

    pub fn with_filters(mut self, filters: CompiledFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// One intended change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanAction {
    /// Snapshot of the entry this action was derived from.
    pub entry: DirectoryEntry,
    /// What happens to it.
    pub disposition: Disposition,
    /// Where it is now.
    pub source: PathBuf,
    /// Where it goes. `None` for deletions.
    pub destination: Option<PathBuf>,
}

impl PlanAction {
    /// Heading this action is listed under in the grouped preview.
    pub fn group_label(&self) -> String {
        match &self.disposition {
            Disposition::Relocate(_) => self
                .destination
                .as_deref()
                .and_then(Path::parent)
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
            Disposition::Delete(reason) => reason.label().to_string(),
            Disposition::MoveDirectory(name) => format!("Move {} folder", name),
        }
    }
}

/// Actions sharing one heading in the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanGroup<'a> {
    pub label: String,
    pub actions: Vec<&'a PlanAction>,
}

/// Counts describing a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub relocations: usize,
    pub deletions: usize,
    pub directory_moves: usize,
    /// Number of distinct date folders that will receive files.
    pub buckets: usize,
}

/// The full set of actions for one scan, in discovery order.
///
/// A plan cannot be changed once built.
#[derive(Debug, Clone)]
pub struct Plan {
    root: PathBuf,
    options: PlanOptions,
    actions: Vec<PlanAction>,
}

impl Plan {
    /// The scanned directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    pub fn actions(&self) -> &[PlanAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions grouped by destination, groups in order of first appearance.
    pub fn groups(&self) -> Vec<PlanGroup<'_>> {
        let mut groups: Vec<PlanGroup<'_>> = Vec::new();
        for action in &self.actions {
            let label = action.group_label();
            match groups.iter_mut().find(|group| group.label == label) {
                Some(group) => group.actions.push(action),
                None => groups.push(PlanGroup {
                    label,
                    actions: vec![action],
                }),
            }
        }
        groups
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        let mut buckets: BTreeSet<&BucketKey> = BTreeSet::new();
        for action in &self.actions {
            match &action.disposition {
                Disposition::Relocate(bucket) => {
                    summary.relocations += 1;
                    buckets.insert(bucket);
                }
                Disposition::Delete(_) => summary.deletions += 1,
                Disposition::MoveDirectory(_) => summary.directory_moves += 1,
            }
        }
        summary.buckets = buckets.len();
        summary
    }

    /// Number of actions deleting files for the given reason.
    pub fn deletions_for(&self, reason: DeleteReason) -> usize {
        self.actions
            .iter()
            .filter(|action| action.disposition == Disposition::Delete(reason))
            .count()
    }
}

/// Builds a plan for `path`.
///
/// # Errors
///
/// Returns [`OrganizeError::InvalidDirectory`] if the path does not exist, is
/// not a directory, or cannot be listed. This is checked before anything else.
///
/// # Examples
///
/// ```no_run
/// use clipsort::plan::{build_plan, PlanOptions};
/// use std::path::Path;
///
/// let plan = build_plan(Path::new("/media/sdcard"), &PlanOptions::new(true, false, None))
///     .expect("Directory should be readable");
/// for group in plan.groups() {
///     println!("{}: {} item(s)", group.label, group.actions.len());
/// }
/// ```
pub fn build_plan(path: &Path, options: &PlanOptions) -> OrganizeResult<Plan> {
    let invalid = |reason: String| OrganizeError::InvalidDirectory {
        path: path.to_path_buf(),
        reason,
    };

    if !path.exists() {
        return Err(invalid("directory does not exist".to_string()));
    }
    if !path.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }

    let root = std::path::absolute(path).map_err(|e| invalid(e.to_string()))?;
    let listing = fs::read_dir(&root).map_err(|e| invalid(e.to_string()))?;

    let mut entries: Vec<DirectoryEntry> = Vec::new();
    for entry in listing {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", root.display(), e);
                continue;
            }
        };
        match DirectoryEntry::from_dir_entry(&entry) {
            Ok(snapshot) => entries.push(snapshot),
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut actions = Vec::new();
    let mut capture_actions = Vec::new();

    for entry in entries {
        if let Some(disposition) = classifier::classify_capture_dir(
            &entry,
            &options.capture_dir_name,
            options.capture_destination.as_deref(),
        ) {
            let destination = options
                .capture_destination
                .as_ref()
                .map(|dest| dest.join(file_name(&entry)));
            capture_actions.push(PlanAction {
                source: entry.path.clone(),
                entry,
                disposition,
                destination,
            });
            continue;
        }

        if entry.is_file && !options.filters.should_include(&entry.name) {
            debug!("Excluded by filters: {}", entry.name);
            continue;
        }

        let Some(disposition) = classifier::classify(&entry, options.delete_thm, options.delete_lrv)
        else {
            continue;
        };

        let destination = match &disposition {
            Disposition::Relocate(bucket) => {
                Some(root.join(bucket.as_str()).join(file_name(&entry)))
            }
            Disposition::Delete(_) | Disposition::MoveDirectory(_) => None,
        };

        debug!("Planned {:?} for {}", disposition, entry.name);
        actions.push(PlanAction {
            source: entry.path.clone(),
            entry,
            disposition,
            destination,
        });
    }

    if capture_actions.len() > 1 {
        let names: Vec<&str> = capture_actions
            .iter()
            .map(|action| action.entry.name.as_str())
            .collect();
        warn!(
            "Found {} folders matching {}: {}; all of them will be moved",
            names.len(),
            options.capture_dir_name,
            names.join(", ")
        );
    }
    actions.extend(capture_actions);

    Ok(Plan {
        root,
        options: options.clone(),
        actions,
    })
}

fn file_name(entry: &DirectoryEntry) -> PathBuf {
    entry
        .path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&entry.name))
}
