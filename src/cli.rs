//! Command-line front end for clipsort.
//!
//! This module turns arguments, configuration and interactive answers into a
//! run of the core engines:
//! - Settings resolution (flags override the config file, prompts fill gaps)
//! - Plan preview and confirmation
//! - Execution with progress reporting
//! - Optional in-session undo

use crate::config::{AppConfig, RetrySettings};
use crate::error::{OrganizeError, OrganizeResult};
use crate::executor::{ActionLog, Executor};
use crate::output::OutputFormatter;
use crate::plan::{Plan, PlanOptions, build_plan};
use crate::retry::RetryPolicy;
use crate::signal::setup_shutdown_signal;
use crate::undo::{UndoEngine, UndoReport};
use clap::Parser;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use log::warn;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Sort action-camera and drone clips into date folders.
#[derive(Debug, Clone, Parser)]
#[command(name = "clipsort", version, about)]
pub struct Cli {
    /// Directory to organize. Asked for when omitted.
    pub directory: Option<PathBuf>,

    /// Delete .THM thumbnails instead of moving them (`--delete-thm=false` to keep).
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub delete_thm: Option<bool>,

    /// Delete .LRV previews instead of moving them (`--delete-lrv=false` to keep).
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub delete_lrv: Option<bool>,

    /// Move the capture folder (100DRONE) into this directory.
    #[arg(long, value_name = "PATH")]
    pub capture_dest: Option<PathBuf>,

    /// Name of the capture folder.
    #[arg(long, value_name = "NAME")]
    pub capture_dir: Option<String>,

    /// Show the plan without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not ask anything; execute the plan and skip the undo offer.
    #[arg(short, long)]
    pub yes: bool,

    /// Print the results as JSON.
    #[arg(long)]
    pub json: bool,

    /// Configuration file to use instead of the default locations.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Attempts per move when a file is locked.
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Seconds to wait before retrying a locked file.
    #[arg(long, value_name = "SECS")]
    pub backoff_secs: Option<u64>,
}

/// Everything a run needs, after merging flags, config and answers.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub directory: PathBuf,
    pub options: PlanOptions,
    pub retry: RetryPolicy,
    pub dry_run: bool,
    pub json: bool,
}

impl RunSettings {
    /// Merges command-line flags over the configuration.
    ///
    /// When `interactive` is true, a missing directory or deletion choice is
    /// asked for; otherwise the current directory is used and nothing is
    /// deleted.
    pub fn resolve(cli: &Cli, config: &AppConfig, interactive: bool) -> OrganizeResult<Self> {
        let directory = match &cli.directory {
            Some(dir) => dir.clone(),
            None if interactive => prompt_directory()?,
            None => current_dir()?,
        };

        let delete_thm = match cli.delete_thm.or(config.organize.delete_thm) {
            Some(answer) => answer,
            None if interactive => ask("Do you want to delete .THM files?")?,
            None => false,
        };
        let delete_lrv = match cli.delete_lrv.or(config.organize.delete_lrv) {
            Some(answer) => answer,
            None if interactive => ask("Do you want to delete .LRV files?")?,
            None => false,
        };

        let capture_destination = cli
            .capture_dest
            .clone()
            .or_else(|| config.organize.capture_destination.clone());
        let capture_dir = cli
            .capture_dir
            .clone()
            .unwrap_or_else(|| config.organize.capture_dir.clone());

        let filters = config.filters.compile()?;

        let retry = RetrySettings {
            max_attempts: cli.max_attempts.unwrap_or(config.retry.max_attempts),
            backoff_secs: cli.backoff_secs.unwrap_or(config.retry.backoff_secs),
        }
        .policy();

        Ok(Self {
            directory,
            options: PlanOptions::new(delete_thm, delete_lrv, capture_destination)
                .with_capture_dir_name(capture_dir)
                .with_filters(filters),
            retry,
            dry_run: cli.dry_run,
            json: cli.json,
        })
    }
}

/// Decides whether a plan may be executed, and whether to undo it afterwards.
pub trait PlanApprover {
    /// Called once the plan has been shown.
    fn approve(&self, plan: &Plan) -> bool;

    /// Called after execution with the resulting log.
    fn offer_undo(&self, log: &ActionLog) -> bool;
}

/// Asks on the terminal.
pub struct PromptApprover;

impl PlanApprover for PromptApprover {
    fn approve(&self, _plan: &Plan) -> bool {
        ask_or_decline("Do you want to continue with these changes?")
    }

    fn offer_undo(&self, log: &ActionLog) -> bool {
        if log.moved_count() == 0 && log.deleted_count() == 0 {
            return false;
        }
        ask_or_decline("Would you like to undo the changes?")
    }
}

/// Approves every plan and never undoes. Used for `--yes`.
pub struct AutoApprove;

impl PlanApprover for AutoApprove {
    fn approve(&self, _plan: &Plan) -> bool {
        true
    }

    fn offer_undo(&self, _log: &ActionLog) -> bool {
        false
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The plan had no actions.
    NothingToDo(Plan),
    /// Dry run: the plan was only shown.
    Previewed(Plan),
    /// The user declined the plan.
    Declined(Plan),
    /// The plan was executed, and possibly undone.
    Executed {
        log: ActionLog,
        undo: Option<UndoReport>,
    },
}

/// Runs the CLI application with parsed arguments.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use clipsort::cli::{run_cli, Cli};
///
/// let cli = Cli::parse_from(["clipsort", "/media/sdcard", "--dry-run", "--yes"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> OrganizeResult<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let interactive = !cli.yes;
    let settings = RunSettings::resolve(&cli, &config, interactive)?;

    let cancel = match setup_shutdown_signal() {
        Ok(flag) => Some(flag),
        Err(e) => {
            warn!("Ctrl-C handling unavailable: {}", e);
            None
        }
    };

    let approver: &dyn PlanApprover = if interactive {
        &PromptApprover
    } else {
        &AutoApprove
    };

    organize(&settings, approver, cancel).map(|_| ())
}

/// Plans, previews, executes and optionally undoes one run.
///
/// # Errors
///
/// Only an invalid target directory is an error. Per-file failures are part
/// of the returned [`ActionLog`].
pub fn organize(
    settings: &RunSettings,
    approver: &dyn PlanApprover,
    cancel: Option<Arc<AtomicBool>>,
) -> OrganizeResult<RunOutcome> {
    if !settings.json {
        OutputFormatter::info(&format!(
            "Organizing contents of: {}",
            settings.directory.display()
        ));
    }

    let plan = build_plan(&settings.directory, &settings.options)?;
    if !settings.json {
        OutputFormatter::render_plan(&plan);
    }

    if plan.is_empty() {
        return Ok(RunOutcome::NothingToDo(plan));
    }

    if settings.dry_run {
        if !settings.json {
            OutputFormatter::dry_run_notice("No files were modified.");
        }
        return Ok(RunOutcome::Previewed(plan));
    }

    if !approver.approve(&plan) {
        if !settings.json {
            OutputFormatter::warning("Operation canceled.");
        }
        return Ok(RunOutcome::Declined(plan));
    }

    let mut executor = Executor::new().with_retry_policy(settings.retry);
    if let Some(flag) = cancel {
        executor = executor.with_cancellation(flag);
    }

    let progress = OutputFormatter::create_progress_bar(plan.len() as u64);
    let log = executor.execute_with_progress(&plan, |record| {
        progress.set_message(
            record
                .source
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        progress.inc(1);
    });
    progress.finish_and_clear();

    if settings.json {
        OutputFormatter::json(&log);
    } else {
        OutputFormatter::render_action_log(&log);
        OutputFormatter::success("Organization complete! Files are sorted into their date folders.");
    }

    let undo = if approver.offer_undo(&log) {
        let report = UndoEngine::new()
            .with_retry_policy(settings.retry)
            .undo(&log);
        if settings.json {
            OutputFormatter::json(&report);
        } else {
            OutputFormatter::render_undo_report(&report);
        }
        Some(report)
    } else {
        None
    };

    Ok(RunOutcome::Executed { log, undo })
}

fn current_dir() -> OrganizeResult<PathBuf> {
    std::env::current_dir().map_err(|e| OrganizeError::InvalidDirectory {
        path: PathBuf::from("."),
        reason: e.to_string(),
    })
}

fn prompt_directory() -> OrganizeResult<PathBuf> {
    let current = current_dir()?;
    OutputFormatter::plain(&format!("Detected working folder: {}", current.display()));

    if ask("Is this the target folder?")? {
        return Ok(current);
    }

    let entered: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter the folder to organize")
        .interact_text()
        .map_err(|e| OrganizeError::Prompt(e.to_string()))?;
    let entered = PathBuf::from(entered.trim());

    if !entered.is_dir() {
        return Err(OrganizeError::InvalidDirectory {
            path: entered,
            reason: "directory does not exist".to_string(),
        });
    }
    Ok(entered)
}

fn ask(question: &str) -> OrganizeResult<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(question)
        .default(false)
        .interact()
        .map_err(|e| OrganizeError::Prompt(e.to_string()))
}

fn ask_or_decline(question: &str) -> bool {
    ask(question).unwrap_or_else(|e| {
        warn!("{}", e);
        false
    })
}
