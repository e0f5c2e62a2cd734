//! Job summary reporting.
//!
//! Counts terminal outcomes of a finished job and renders a one-line
//! description of each item's outcome.

use crate::media::{MediaItem, Phase, SkipReason};
use crate::utils::format_duration;

use serde::{Deserialize, Serialize};

use std::fmt;
use std::time::Duration;

/// Outcome counts of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Skipped for any reason, cancellations included.
    pub skipped: usize,
    pub cancelled: usize,
    /// Intermediate progress events shed under backpressure.
    pub dropped_events: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl JobSummary {
    pub fn from_items(items: &[MediaItem], elapsed: Duration, dropped_events: usize) -> Self {
        let mut summary = Self {
            total: items.len(),
            elapsed,
            dropped_events,
            ..Self::default()
        };
        for item in items {
            match item.phase() {
                Phase::Completed => summary.completed += 1,
                Phase::Failed(_) => summary.failed += 1,
                Phase::Skipped(reason) => {
                    summary.skipped += 1;
                    if reason == SkipReason::Cancelled {
                        summary.cancelled += 1;
                    }
                }
                Phase::Pending | Phase::Stage(_) => {}
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} item(s): {} completed, {} failed, {} skipped ({} cancelled) in {}",
            self.total,
            self.completed,
            self.failed,
            self.skipped,
            self.cancelled,
            format_duration(self.elapsed)
        )
    }
}

/// Human-readable reason for an item's terminal state.
pub fn describe_outcome(item: &MediaItem) -> String {
    match item.phase() {
        Phase::Completed => {
            let stages = item.stage_history().len();
            match item.stage_history().last() {
                Some(last) if last.plan.is_some() => {
                    format!("dry run planned {} stage(s)", stages)
                }
                _ => format!("completed {} stage(s)", stages),
            }
        }
        Phase::Failed(kind) => match item.errors().last() {
            Some(error) => format!("{}: {}", kind, error.message),
            None => kind.to_string(),
        },
        Phase::Skipped(SkipReason::UnclassifiableInput) => match item.note() {
            Some(note) => format!("skipped, unclassifiable ({})", note),
            None => "skipped, unclassifiable".to_string(),
        },
        Phase::Skipped(SkipReason::Cancelled) => format!(
            "cancelled after {} stage(s)",
            item.stage_history().len()
        ),
        Phase::Pending | Phase::Stage(_) => "not finished".to_string(),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
