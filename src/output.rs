//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output: colored status lines,
//! the grouped plan preview, progress tracking, and the reports produced by
//! execution and undo.

use crate::executor::{ActionLog, Outcome};
use crate::plan::Plan;
use crate::undo::{UndoReport, UndoStatus};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use clipsort::output::OutputFormatter;
    /// OutputFormatter::success("Organization complete!");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a progress bar for plan execution.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints the plan grouped by destination, followed by what happens to
    /// the sidecar files.
    pub fn render_plan(plan: &Plan) {
        Self::header("--- PREVIEW OF ORGANIZATION ---");

        if plan.is_empty() {
            Self::plain("No clips found to organize.");
            return;
        }

        for group in plan.groups() {
            println!("\n{}", group.label.bold());
            for action in group.actions {
                println!("  - {}", action.entry.name);
            }
        }

        println!();
        let options = plan.options();
        if options.delete_thm {
            Self::warning(".THMs will be deleted.");
        } else {
            Self::plain(".THMs will be kept and moved.");
        }
        if options.delete_lrv {
            Self::warning(".LRVs will be deleted.");
        } else {
            Self::plain(".LRVs will be kept and moved.");
        }

        let summary = plan.summary();
        Self::plain(&format!(
            "{} to move into {} date folder(s), {} to delete, {} folder(s) to relocate",
            summary.relocations, summary.buckets, summary.deletions, summary.directory_moves
        ));
    }

    /// Prints every record of an action log followed by totals.
    pub fn render_action_log(log: &ActionLog) {
        Self::header("RESULTS");

        for record in log.records() {
            let name = record.source.display();
            match &record.outcome {
                Outcome::Moved => {
                    let destination = record
                        .destination
                        .as_deref()
                        .map(|d| d.display().to_string())
                        .unwrap_or_default();
                    Self::success(&format!("{} → {}", name, destination));
                }
                Outcome::Deleted => Self::success(&format!("{} deleted", name)),
                Outcome::Failed(e) => Self::error(&format!("{}: {}", name, e)),
            }
        }

        let failed = log.failures().count();
        Self::summary_table(&[
            ("Moved", log.moved_count()),
            ("Deleted", log.deleted_count()),
            ("Failed", failed),
        ]);

        if log.cancelled {
            Self::warning("Run was interrupted; remaining actions were not attempted.");
        }
        if failed > 0 {
            Self::warning("Some files could not be organized. Please review errors above.");
        }
    }

    /// Prints an undo report, calling out files that cannot be restored.
    pub fn render_undo_report(report: &UndoReport) {
        Self::header("UNDO");

        for entry in &report.entries {
            let name = entry.path.display();
            match &entry.status {
                UndoStatus::Restored => Self::success(&format!("{} restored", name)),
                UndoStatus::NotRestorable => {
                    Self::warning(&format!("{} was deleted and cannot be restored", name))
                }
                UndoStatus::Conflict(conflict) => {
                    Self::error(&format!("{}: {}", name, conflict))
                }
                UndoStatus::Failed(e) => Self::error(&format!("{}: {}", name, e)),
            }
        }

        Self::summary_table(&[
            ("Restored", report.restored_count()),
            ("Not restorable", report.not_restorable().count()),
            ("Unresolved", report.unresolved().count()),
        ]);

        if report.is_complete_success() {
            Self::success("Undo complete!");
        } else {
            Self::warning("Some files could not be put back. Please review errors above.");
        }
    }

    /// Prints a two-column table of labelled counts.
    pub fn summary_table(rows: &[(&str, usize)]) {
        let width = rows
            .iter()
            .map(|(label, _)| label.len())
            .max()
            .unwrap_or(0)
            .max(6);

        println!("{}", "-".repeat(width + 10));
        for (label, count) in rows {
            let count = if *count == 0 {
                count.to_string().normal()
            } else {
                count.to_string().green()
            };
            println!("{:<width$} | {}", label, count, width = width);
        }
        println!("{}", "-".repeat(width + 10));
    }

    /// Prints any serializable report as pretty JSON.
    pub fn json<T: Serialize>(value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => Self::error(&format!("Could not serialize report: {}", e)),
        }
    }
}
