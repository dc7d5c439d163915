//! clipsort - reversible organization of action-camera and drone footage
//!
//! This library classifies clips by extension and modification date, builds a
//! reorganization plan that can be previewed, applies it with retries for
//! locked files, and reverses the applied moves from the resulting action log.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod fs_ops;
pub mod output;
pub mod plan;
pub mod retry;
pub mod signal;
pub mod undo;

pub use classifier::{BucketKey, DeleteReason, DirectoryEntry, Disposition, classify};
pub use config::{AppConfig, CompiledFilters, ConfigError};
pub use error::{ActionError, ActionErrorKind, OrganizeError, OrganizeResult};
pub use executor::{ActionLog, ActionRecord, Executor, Outcome};
pub use plan::{Plan, PlanAction, PlanOptions, build_plan};
pub use retry::RetryPolicy;
pub use undo::{UndoConflict, UndoEngine, UndoReport, UndoStatus};

pub use cli::{Cli, run_cli};
