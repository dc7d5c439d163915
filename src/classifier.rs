/// Classification of directory entries into dispositions.
///
/// This module decides, for a single snapshot entry, whether it is a clip to
/// relocate into a date folder, a sidecar to delete, the device capture folder
/// to move elsewhere, or something to leave alone.
///
/// # Examples
///
/// ```
/// use clipsort::classifier::{MediaKind, DeleteReason};
///
/// assert_eq!(MediaKind::from_file_name("CLIP0001.MP4"), Some(MediaKind::Mp4));
/// assert_eq!(MediaKind::from_file_name("clip0001.thm"), Some(MediaKind::Thm));
/// assert_eq!(MediaKind::from_file_name("notes.txt"), None);
/// assert_eq!(DeleteReason::Lrv.label(), "To be deleted (.LRV)");
/// ```
use chrono::{DateTime, Local};
use log::warn;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the folder some drones write their footage into.
pub const DEFAULT_CAPTURE_DIR: &str = "100DRONE";

/// Immutable record of one directory entry, taken when the plan is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// The entry's file name, lossily converted for display and matching.
    pub name: String,
    /// The full path to the entry.
    pub path: PathBuf,
    /// True for regular files. Symlinks are neither files nor directories.
    pub is_file: bool,
    /// True for directories.
    pub is_dir: bool,
    /// Last modification time.
    pub modified: SystemTime,
}

impl DirectoryEntry {
    /// Builds a snapshot record from a `read_dir` entry.
    ///
    /// Symlinks are not followed.
    pub fn from_dir_entry(entry: &fs::DirEntry) -> io::Result<Self> {
        let metadata = entry.metadata()?;
        Ok(Self {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path(),
            is_file: metadata.is_file(),
            is_dir: metadata.is_dir(),
            modified: metadata.modified()?,
        })
    }
}

/// Recognized clip and sidecar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// The video itself.
    Mp4,
    /// Thumbnail sidecar.
    Thm,
    /// Low-resolution preview video.
    Lrv,
}

impl MediaKind {
    /// Detects the kind from a file name, ignoring case.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".mp4") {
            Some(MediaKind::Mp4)
        } else if lower.ends_with(".thm") {
            Some(MediaKind::Thm)
        } else if lower.ends_with(".lrv") {
            Some(MediaKind::Lrv)
        } else {
            None
        }
    }

}

/// Why a file is scheduled for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteReason {
    /// Thumbnail sidecar, removed on request.
    Thm,
    /// Low-resolution preview, removed on request.
    Lrv,
}

impl DeleteReason {
    /// Heading used when the plan is shown grouped by destination.
    pub fn label(&self) -> &'static str {
        match self {
            DeleteReason::Thm => "To be deleted (.THM)",
            DeleteReason::Lrv => "To be deleted (.LRV)",
        }
    }
}

/// Date folder name, `YYYYMMDD` in local time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(String);

impl BucketKey {
    /// Derives the bucket from a modification time, in the local timezone of
    /// the machine at the moment of the call.
    ///
    /// Returns `None` when the time cannot be represented as a calendar date.
    pub fn from_modified(modified: SystemTime) -> Option<Self> {
        let utc = match modified.duration_since(UNIX_EPOCH) {
            Ok(after) => {
                let secs = i64::try_from(after.as_secs()).ok()?;
                DateTime::from_timestamp(secs, after.subsec_nanos())?
            }
            Err(before) => {
                let before = before.duration();
                let secs = i64::try_from(before.as_secs()).ok()?;
                let (secs, nanos) = match before.subsec_nanos() {
                    0 => (-secs, 0),
                    n => (-secs - 1, 1_000_000_000 - n),
                };
                DateTime::from_timestamp(secs, nanos)?
            }
        };
        Some(Self::from_local(&utc.with_timezone(&Local)))
    }

    pub fn from_local(date: &DateTime<Local>) -> Self {
        BucketKey(date.format("%Y%m%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What should happen to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Keep the file and move it into the given date folder.
    Relocate(BucketKey),
    /// Remove the file.
    Delete(DeleteReason),
    /// Move the named capture folder, whole, to a separate destination.
    MoveDirectory(String),
}

/// Classifies a regular file.
///
/// Returns `None` for anything that should be left where it is: directories,
/// symlinks, files that are not `.mp4`, `.thm` or `.lrv`, and files to keep
/// whose modification time has no calendar date.
pub fn classify(entry: &DirectoryEntry, delete_thm: bool, delete_lrv: bool) -> Option<Disposition> {
    if !entry.is_file {
        return None;
    }

    let kind = MediaKind::from_file_name(&entry.name)?;
    let disposition = match kind {
        MediaKind::Thm if delete_thm => Disposition::Delete(DeleteReason::Thm),
        MediaKind::Lrv if delete_lrv => Disposition::Delete(DeleteReason::Lrv),
        _ => match BucketKey::from_modified(entry.modified) {
            Some(bucket) => Disposition::Relocate(bucket),
            None => {
                warn!(
                    "Skipping {}: modification time is out of range",
                    entry.name
                );
                return None;
            }
        },
    };
    Some(disposition)
}

/// Classifies the device capture folder.
///
/// Matches directories named `capture_dir_name`, ignoring case, and only when
/// somewhere to move them was given.
pub fn classify_capture_dir(
    entry: &DirectoryEntry,
    capture_dir_name: &str,
    destination: Option<&Path>,
) -> Option<Disposition> {
    destination?;
    if entry.is_dir && entry.name.eq_ignore_ascii_case(capture_dir_name) {
        Some(Disposition::MoveDirectory(entry.name.clone()))
    } else {
        None
    }
}
