//! The small set of filesystem primitives the engines need.
//!
//! Execution and undo go through [`Filesystem`] instead of calling `std::fs`
//! directly, which lets tests stand in a filesystem that reports locked files.

use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Filesystem operations used while applying or reverting a plan.
pub trait Filesystem {
    /// Moves a file or directory from `from` to `to`. `to` must not exist.
    fn move_path(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes a single file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Creates a directory and its parents. An existing directory is not an
    /// error.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// True if anything, including a dangling symlink, exists at `path`.
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }
}

impl<T: Filesystem + ?Sized> Filesystem for &T {
    fn move_path(&self, from: &Path, to: &Path) -> io::Result<()> {
        (**self).move_path(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        (**self).remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        (**self).create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

/// [`Filesystem`] backed by `std::fs`.
///
/// Moves are a `rename`. When source and destination sit on different
/// volumes the item is copied and the source removed afterwards. A failed
/// copy or a failed removal is rolled back so the source stays whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn move_path(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!(
                    "rename {} -> {} crosses devices, copying instead",
                    from.display(),
                    to.display()
                );
                copy_then_remove(from, to)
            }
            Err(e) => Err(e),
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    copy_then_remove_with(from, to, |path| fs::remove_file(path))
}

/// Copies `from` to `to`, then removes `from` one file at a time through
/// `remove_file`.
///
/// If any removal fails, whatever was already removed is copied back from
/// `to` and the copy is discarded, so `from` is left whole. Only when that
/// restore also fails are both trees kept, reported as a non-transient error.
fn copy_then_remove_with<R>(from: &Path, to: &Path, remove_file: R) -> io::Result<()>
where
    R: Fn(&Path) -> io::Result<()>,
{
    let is_dir = fs::symlink_metadata(from)?.is_dir();

    let copied = if is_dir {
        copy_dir(from, to)
    } else {
        fs::copy(from, to).map(|_| ())
    };
    if let Err(e) = copied {
        discard(to);
        return Err(e);
    }

    let removed = if is_dir {
        remove_tree(from, &remove_file)
    } else {
        remove_file(from)
    };
    let Err(e) = removed else {
        return Ok(());
    };

    warn!(
        "Could not remove {} after copying it to {}: {}; restoring",
        from.display(),
        to.display(),
        e
    );
    match restore_missing(to, from) {
        Ok(()) => {
            discard(to);
            Err(e)
        }
        Err(restore_err) => Err(io::Error::other(format!(
            "removing {} failed ({}) and restoring it from {} failed ({}); both copies were kept",
            from.display(),
            e,
            to.display(),
            restore_err
        ))),
    }
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let target = mirror_path(from, entry.path(), to)?;

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Removes a tree deepest first, files through `remove_file`.
fn remove_tree<R>(root: &Path, remove_file: &R) -> io::Result<()>
where
    R: Fn(&Path) -> io::Result<()>,
{
    for entry in WalkDir::new(root).follow_links(false).contents_first(true) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())?;
        } else {
            remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Copies every item under `copy` that is missing under `original` back into
/// place. Items still present are left untouched.
fn restore_missing(copy: &Path, original: &Path) -> io::Result<()> {
    for entry in WalkDir::new(copy).follow_links(false) {
        let entry = entry?;
        let target = mirror_path(copy, entry.path(), original)?;

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if fs::symlink_metadata(&target).is_err() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Maps `path`, found under `base`, to the same place under `onto`.
fn mirror_path(base: &Path, path: &Path, onto: &Path) -> io::Result<PathBuf> {
    let relative = path
        .strip_prefix(base)
        .map_err(|e| io::Error::other(e.to_string()))?;
    if relative.as_os_str().is_empty() {
        Ok(onto.to_path_buf())
    } else {
        Ok(onto.join(relative))
    }
}

fn discard(path: &Path) {
    let result = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        warn!("Could not remove partial copy {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("clip.mp4");
        let to = temp_dir.path().join("clip-moved.mp4");
        fs::write(&from, "frames").expect("Failed to write file");

        StdFilesystem.move_path(&from, &to).expect("Move failed");

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "frames");
    }

    #[test]
    fn test_copy_dir_preserves_tree() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("100DRONE");
        fs::create_dir_all(from.join("nested")).unwrap();
        fs::write(from.join("a.mp4"), "a").unwrap();
        fs::write(from.join("nested").join("b.mp4"), "b").unwrap();

        let to = temp_dir.path().join("copy");
        copy_then_remove(&from, &to).expect("Copy failed");

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(to.join("a.mp4")).unwrap(), "a");
        assert_eq!(
            fs::read_to_string(to.join("nested").join("b.mp4")).unwrap(),
            "b"
        );
    }

    #[test]
    fn test_create_dir_all_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path().join("20240115");

        StdFilesystem.create_dir_all(&dir).unwrap();
        StdFilesystem.create_dir_all(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_failed_source_removal_restores_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("100DRONE");
        fs::create_dir_all(&from).unwrap();
        for name in ["a.mp4", "b.mp4", "c.mp4", "d.mp4"] {
            fs::write(from.join(name), name).unwrap();
        }
        let to = temp_dir.path().join("archive");

        let result = copy_then_remove_with(&from, &to, |path| {
            if path.file_name().is_some_and(|name| name == "c.mp4") {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "immutable"))
            } else {
                fs::remove_file(path)
            }
        });

        let err = result.expect_err("Removal failure should be reported");
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        for name in ["a.mp4", "b.mp4", "c.mp4", "d.mp4"] {
            assert_eq!(fs::read_to_string(from.join(name)).unwrap(), name);
        }
        assert!(!to.exists());
    }

    #[test]
    fn test_failed_file_removal_discards_copy() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("clip.mp4");
        let to = temp_dir.path().join("elsewhere.mp4");
        fs::write(&from, "frames").unwrap();

        let result = copy_then_remove_with(&from, &to, |_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&from).unwrap(), "frames");
        assert!(!to.exists());
    }
}
