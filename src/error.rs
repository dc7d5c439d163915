//! Error types shared by the planning, execution and undo engines.
//!
//! Two levels exist: [`OrganizeError`] aborts a whole run before anything on
//! disk is touched, while [`ActionError`] describes why a single action failed
//! and is recorded next to the successes.

use crate::config::ConfigError;
use serde::Serialize;
use std::io;
use std::path::PathBuf;

/// Windows `ERROR_SHARING_VIOLATION`.
#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;
/// Windows `ERROR_LOCK_VIOLATION`.
#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Errors that stop an operation as a whole.
#[derive(Debug)]
pub enum OrganizeError {
    /// The directory to organize does not exist, is not a directory, or
    /// cannot be listed.
    InvalidDirectory { path: PathBuf, reason: String },
    /// The configuration could not be loaded.
    Config(ConfigError),
    /// An interactive prompt could not be shown or answered.
    Prompt(String),
}

impl std::fmt::Display for OrganizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDirectory { path, reason } => {
                write!(f, "Invalid directory {}: {}", path.display(), reason)
            }
            Self::Config(e) => write!(f, "{}", e),
            Self::Prompt(msg) => write!(f, "Prompt failed: {}", msg),
        }
    }
}

impl std::error::Error for OrganizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::InvalidDirectory { .. } | Self::Prompt(_) => None,
        }
    }
}

impl From<ConfigError> for OrganizeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Result type for operations that can fail as a whole.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Broad classification of a per-action failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    /// The source vanished after the plan was built.
    NotFound,
    /// The file is held open or locked by another process.
    Busy,
    /// The OS refused access.
    PermissionDenied,
    /// Something already sits at the destination path.
    DestinationExists,
    /// Any other OS-level failure.
    Other,
}

impl std::fmt::Display for ActionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::Busy => "busy",
            Self::PermissionDenied => "permission denied",
            Self::DestinationExists => "destination exists",
            Self::Other => "error",
        };
        f.write_str(label)
    }
}

/// A failure isolated to a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionError {
    pub kind: ActionErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ActionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies an I/O error into an [`ActionError`].
    pub fn from_io(err: &io::Error) -> Self {
        let kind = if is_busy(err) {
            ActionErrorKind::Busy
        } else {
            match err.kind() {
                io::ErrorKind::NotFound => ActionErrorKind::NotFound,
                io::ErrorKind::PermissionDenied => ActionErrorKind::PermissionDenied,
                io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => {
                    ActionErrorKind::DestinationExists
                }
                _ => ActionErrorKind::Other,
            }
        };
        Self::new(kind, err.to_string())
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ActionError {}

/// Returns true if the error means another process holds the file.
pub fn is_busy(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::ResourceBusy || is_lock_violation(err)
}

#[cfg(windows)]
fn is_lock_violation(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(windows))]
fn is_lock_violation(_err: &io::Error) -> bool {
    false
}
