// ============================================================================
// mediamend-core/src/pipeline/machine.rs
// ============================================================================
//
// PER-ITEM STATE MACHINE: One Stage at a Time, Forward Only
//
// `run_stage` takes the item by value, moves it into the stage, runs the
// stage function and hands the item back either advanced (history appended)
// or failed (error appended). It never retries; that is the scheduler's job.
// Stage panics are caught and reported as permanent failures so one item can
// never take a worker down with it.

use crate::error::{StageError, StageResult};
use crate::media::{ErrorRecord, MediaItem, Phase, SkipReason, Stage, StageRecord};
use crate::stages::{self, StageContext, StageOutput};

use chrono::Utc;
use log::{debug, warn};

use std::panic::{self, AssertUnwindSafe};

/// What happened to an item in one stage invocation.
#[derive(Debug)]
pub enum StageOutcome {
    Advanced(MediaItem),
    Failed(MediaItem, StageError),
}

/// Runs `stage` for `item` as attempt number `attempt` (1-based).
pub fn run_stage(
    mut item: MediaItem,
    stage: Stage,
    attempt: u32,
    ctx: &StageContext<'_>,
) -> StageOutcome {
    if let Err(err) = item.enter_stage(stage) {
        item.push_error(ErrorRecord::from_stage_error(&err, attempt));
        return StageOutcome::Failed(item, err);
    }
    debug!("{}: {} attempt {}", item.display_name(), stage, attempt);

    match guarded_execute(stage, &item, ctx) {
        Ok(output) => {
            let record = StageRecord {
                stage,
                attempt,
                summary: output.summary,
                plan: output.plan,
                finished_at: Utc::now(),
            };
            item.complete_stage(record, output.changes);
            StageOutcome::Advanced(item)
        }
        Err(err) => {
            item.push_error(ErrorRecord::from_stage_error(&err, attempt));
            StageOutcome::Failed(item, err)
        }
    }
}

fn guarded_execute(
    stage: Stage,
    item: &MediaItem,
    ctx: &StageContext<'_>,
) -> StageResult<StageOutput> {
    panic::catch_unwind(AssertUnwindSafe(|| stages::execute(stage, item, ctx))).unwrap_or_else(
        |payload| {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("{} panicked for {}: {}", stage, item.display_name(), detail);
            Err(StageError::permanent(stage, format!("stage panicked: {}", detail)))
        },
    )
}

/// Marks an item whose sequence is exhausted as completed.
pub(crate) fn complete(item: &mut MediaItem) -> bool {
    item.next_stage().is_none() && item.finish(Phase::Completed)
}

pub(crate) fn fail(item: &mut MediaItem, err: &StageError) -> bool {
    item.finish(Phase::Failed(err.kind))
}

pub(crate) fn skip(item: &mut MediaItem, reason: SkipReason) -> bool {
    item.finish(Phase::Skipped(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::external::{ScriptedOutcome, ScriptedTool, ToolKind, ToolSet};
    use crate::media::MediaKind;
    use crate::stages::test_support;
    use std::sync::Arc;

    #[test]
    fn stages_append_history_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let adapter = test_support::adapter(ToolSet::simulated());
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let book = dir.path().join("in").join("Frank Herbert - Dune.m4b");
        std::fs::write(&book, b"a").unwrap();
        let mut item = test_support::item(&book, MediaKind::Audiobook, false);

        while let Some(stage) = item.next_stage() {
            item = match run_stage(item, stage, 1, &ctx) {
                StageOutcome::Advanced(item) => item,
                StageOutcome::Failed(_, err) => panic!("unexpected failure: {}", err),
            };
        }
        assert!(complete(&mut item));
        assert_eq!(item.phase(), Phase::Completed);
        assert_eq!(
            item.completed_stages(),
            vec![Stage::Detect, Stage::FetchMetadata, Stage::Tag, Stage::Trash]
        );
    }

    #[test]
    fn failures_are_recorded_with_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let mut tools = ToolSet::simulated();
        tools.metadata = Arc::new(
            ScriptedTool::new(ToolKind::MetadataLookup)
                .then(ScriptedOutcome::Transient("503".into())),
        );
        let adapter = test_support::adapter(tools);
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let video = dir.path().join("in").join("Heat.1995.mkv");
        std::fs::write(&video, b"v").unwrap();
        let mut item = test_support::item(&video, MediaKind::Movie, false);
        test_support::advance(&mut item, &ctx, Stage::FetchMetadata);

        let (item, err) = match run_stage(item, Stage::FetchMetadata, 2, &ctx) {
            StageOutcome::Failed(item, err) => (item, err),
            StageOutcome::Advanced(_) => panic!("expected failure"),
        };
        assert_eq!(err.kind, ErrorKind::TransientToolError);
        assert_eq!(item.errors().len(), 1);
        assert_eq!(item.errors()[0].attempt, 2);
        assert_eq!(item.phase(), Phase::Stage(Stage::FetchMetadata));

        // Retrying the same stage is allowed; history is untouched.
        let item = match run_stage(item, Stage::FetchMetadata, 3, &ctx) {
            StageOutcome::Advanced(item) => item,
            StageOutcome::Failed(_, err) => panic!("unexpected failure: {}", err),
        };
        assert_eq!(item.stage_history().last().unwrap().attempt, 3);
    }

    #[test]
    fn out_of_order_stage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let adapter = test_support::adapter(ToolSet::simulated());
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let item = test_support::item(&dir.path().join("in/a.mkv"), MediaKind::Movie, false);
        match run_stage(item, Stage::Mux, 1, &ctx) {
            StageOutcome::Failed(item, err) => {
                assert_eq!(err.kind, ErrorKind::PermanentToolError);
                assert!(item.stage_history().is_empty());
            }
            StageOutcome::Advanced(_) => panic!("Mux cannot run first"),
        }
    }
}
