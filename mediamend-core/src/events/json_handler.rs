//! JSON-lines progress handler for machine-readable output.
//!
//! Every event becomes one JSON object on its own line, so wrapper tools can
//! follow a run without parsing human-oriented text.

use super::{EventHandler, ProgressEvent};
use crate::reporting::JobSummary;

use serde_json::json;

use std::io::{self, Write};
use std::sync::Mutex;

/// Event handler that writes progress events as JSON lines.
pub struct JsonProgressHandler {
    output: Mutex<Box<dyn Write + Send>>,
}

impl JsonProgressHandler {
    /// Writes to stdout.
    pub fn new() -> Self {
        Self {
            output: Mutex::new(Box::new(io::stdout())),
        }
    }

    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            output: Mutex::new(writer),
        }
    }

    fn write_json(&self, value: serde_json::Value) {
        if let Ok(mut output) = self.output.lock() {
            if let Ok(line) = serde_json::to_string(&value) {
                let _ = writeln!(output, "{}", line);
                let _ = output.flush();
            }
        }
    }

    /// Writes the end-of-job summary line.
    pub fn handle_summary(&self, job_id: u64, summary: &JobSummary) {
        self.write_json(json!({
            "type": "job_summary",
            "job_id": job_id,
            "total": summary.total,
            "completed": summary.completed,
            "failed": summary.failed,
            "skipped": summary.skipped,
            "cancelled": summary.cancelled,
            "dropped_events": summary.dropped_events,
            "elapsed_seconds": summary.elapsed.as_secs_f64(),
        }));
    }
}

impl Default for JsonProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for JsonProgressHandler {
    fn handle(&self, event: &ProgressEvent) {
        let event_type = if event.is_terminal() {
            "item_finished"
        } else {
            "item_progress"
        };
        self.write_json(json!({
            "type": event_type,
            "job_id": event.job_id,
            "item_id": event.item_id,
            "source": event.source_path.display().to_string(),
            "kind": event.kind,
            "phase": event.phase.to_string(),
            "status": event.status,
            "message": event.message,
            "timestamp": event.timestamp.to_rfc3339(),
        }));
    }
}
