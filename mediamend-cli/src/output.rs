// ============================================================================
// mediamend-cli/src/output.rs
// ============================================================================
//
// TERMINAL OUTPUT: Styled Rendering of Progress Events and Summaries
//
// `ConsoleRenderer` is the human-facing event handler: one progress bar for
// the batch plus a status line per finished item. JSON mode uses the core
// `JsonProgressHandler` instead.

// ---- Internal crate imports ----
use mediamend_core::{
    EventHandler, EventStatus, JobReport, MediaItem, Phase, ProgressEvent, describe_outcome,
};

// ---- External crate imports ----
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

// ---- Standard library imports ----
use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

/// Styling constants for terminal output
pub mod styling {
    pub const SUCCESS_SYMBOL: &str = "✓";
    pub const ERROR_SYMBOL: &str = "✗";
    pub const WARNING_SYMBOL: &str = "⚠";
    pub const SKIP_SYMBOL: &str = "-";
    pub const STATUS_INDENT: &str = "  ";
}

/// Print a section heading
pub fn print_heading(text: &str) {
    println!();
    println!("{}", style(format!("===== {} =====", text)).cyan().bold());
}

/// Print an aligned label/value line
pub fn print_info<T: Display>(label: &str, value: T) {
    println!("{}{:<14} {}", styling::STATUS_INDENT, format!("{}:", label), value);
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Event handler drawing a batch progress bar and per-item status lines.
pub struct ConsoleRenderer {
    bar: ProgressBar,
}

impl ConsoleRenderer {
    pub fn new(total_items: usize) -> Self {
        let bar = ProgressBar::with_draw_target(
            Some(total_items as u64),
            ProgressDrawTarget::stderr(),
        );
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner} [{bar:30}] {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##."),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Removes the bar once the job is over.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn status_line(event: &ProgressEvent) -> Option<String> {
        let name = file_label(&event.source_path);
        let line = match (event.status, event.is_terminal()) {
            (EventStatus::Succeeded, true) => format!(
                "{} {} {}",
                style(styling::SUCCESS_SYMBOL).green().bold(),
                style(name).bold(),
                style(&event.message).dim()
            ),
            (EventStatus::Failed, true) => format!(
                "{} {} {}",
                style(styling::ERROR_SYMBOL).red().bold(),
                style(name).bold(),
                style(&event.message).red()
            ),
            (EventStatus::Skipped, _) => format!(
                "{} {} {}",
                style(styling::SKIP_SYMBOL).dim(),
                name,
                style(&event.message).dim()
            ),
            (EventStatus::Failed, false) => format!(
                "{} {} {}",
                style(styling::WARNING_SYMBOL).yellow().bold(),
                name,
                style(&event.message).yellow()
            ),
            _ => return None,
        };
        Some(format!("{}{}", styling::STATUS_INDENT, line))
    }
}

impl EventHandler for ConsoleRenderer {
    fn handle(&self, event: &ProgressEvent) {
        if event.status == EventStatus::Started {
            if let Phase::Stage(stage) = event.phase {
                self.bar
                    .set_message(format!("{}: {}", file_label(&event.source_path), stage));
            }
        }
        if let Some(line) = Self::status_line(event) {
            self.bar.suspend(|| println!("{}", line));
        }
        if event.is_terminal() {
            self.bar.inc(1);
        }
    }
}

fn failure_details(item: &MediaItem) -> Vec<String> {
    item.errors()
        .iter()
        .map(|error| {
            let stage = error
                .stage
                .map(|stage| stage.to_string())
                .unwrap_or_else(|| "classification".to_string());
            format!("{} (attempt {}): {}", stage, error.attempt, error.message)
        })
        .collect()
}

/// Prints the end-of-job summary and the failed items with their errors.
pub fn print_report(report: &JobReport, dry_run: bool) {
    print_heading(if dry_run { "DRY RUN SUMMARY" } else { "SUMMARY" });
    let summary = &report.summary;
    print_info("Items", summary.total);
    print_info("Completed", style(summary.completed).green().bold());
    print_info(
        "Failed",
        if summary.failed > 0 {
            style(summary.failed).red().bold()
        } else {
            style(summary.failed)
        },
    );
    print_info("Skipped", summary.skipped);
    if summary.cancelled > 0 {
        print_info("Cancelled", style(summary.cancelled).yellow());
    }
    print_info("Elapsed", mediamend_core::format_duration(summary.elapsed));
    if summary.dropped_events > 0 {
        print_info("Dropped", format!("{} progress event(s)", summary.dropped_events));
    }

    let failed: Vec<&MediaItem> = report
        .items
        .iter()
        .filter(|item| matches!(item.phase(), Phase::Failed(_)))
        .collect();
    if !failed.is_empty() {
        print_heading("FAILURES");
        for item in failed {
            println!(
                "{}{} {}",
                styling::STATUS_INDENT,
                style(styling::ERROR_SYMBOL).red().bold(),
                style(item.source_path().display()).bold()
            );
            for detail in failure_details(item) {
                println!("{}{}{}", styling::STATUS_INDENT, styling::STATUS_INDENT, detail);
            }
        }
    }

    if dry_run {
        print_heading("PLANNED CHANGES");
        for item in &report.items {
            println!("{}{}", styling::STATUS_INDENT, style(file_label(item.source_path())).bold());
            let plans = item
                .stage_history()
                .iter()
                .filter_map(|record| record.plan.as_ref())
                .flatten();
            for step in plans {
                println!("{}{}{}", styling::STATUS_INDENT, styling::STATUS_INDENT, step);
            }
            if item.stage_history().iter().all(|record| record.plan.is_none()) {
                println!(
                    "{}{}{}",
                    styling::STATUS_INDENT,
                    styling::STATUS_INDENT,
                    style(describe_outcome(item)).dim()
                );
            }
        }
    }
}
