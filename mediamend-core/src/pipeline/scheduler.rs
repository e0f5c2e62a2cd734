// ============================================================================
// mediamend-core/src/pipeline/scheduler.rs
// ============================================================================
//
// JOB SCHEDULER: Submission, Worker Pool, Retries and Cancellation
//
// A submission is validated synchronously, classified, and queued in FIFO
// order. A rayon pool of N workers pops items from the shared queue and
// drives each through the state machine, retrying transient failures with a
// linear backoff. Cancellation drains the queue at once and lets running
// items stop at their next stage boundary.
//
// KEY COMPONENTS:
// - JobScheduler: owns the job registry, the process-wide GPU lock and the
//   destination claims shared by every job
// - JobHandle: job id, event receiver and `wait()` for the final report
// - JobControl: per-job queue, results and cancel flag shared with workers

// ---- Internal crate imports ----
use super::machine::{self, StageOutcome};
use crate::classify::classify;
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::events::{EventPublisher, EventReceiver, EventStatus, ProgressEvent, event_bus};
use crate::external::{Semaphore, ToolAdapter, ToolSet, verify_tools};
use crate::media::{ErrorRecord, MediaItem, MediaKind, Phase, SkipReason};
use crate::reporting::{JobSummary, describe_outcome};
use crate::stages::{DestinationClaims, StageContext};

// ---- External crate imports ----
use chrono::Utc;
use log::{error, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

// ---- Standard library imports ----
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

pub type JobId = u64;

// ============================================================================
// JOB CONTROL
// ============================================================================

struct JobState {
    /// Items not yet started, with their submission index.
    queue: VecDeque<(usize, MediaItem)>,
    /// Terminal snapshots by submission index.
    results: Vec<Option<MediaItem>>,
    /// Dropped when the job finishes so the receiver sees the end.
    publisher: Option<EventPublisher>,
    active_workers: usize,
    finished: bool,
}

struct JobControl {
    id: JobId,
    cancelled: AtomicBool,
    state: Mutex<JobState>,
    done: Condvar,
    started_at: Instant,
}

impl JobControl {
    fn new(
        id: JobId,
        queue: VecDeque<(usize, MediaItem)>,
        results: Vec<Option<MediaItem>>,
        publisher: EventPublisher,
        workers: usize,
    ) -> Self {
        let finished = workers == 0;
        Self {
            id,
            cancelled: AtomicBool::new(false),
            state: Mutex::new(JobState {
                queue,
                results,
                publisher: (!finished).then_some(publisher),
                active_workers: workers,
                finished,
            }),
            done: Condvar::new(),
            started_at: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Pops the next queued item. A worker that finds the queue empty retires;
    /// the last one to retire ends the job.
    fn next_item(&self) -> Option<(usize, MediaItem)> {
        let mut state = self.lock();
        if let Some(next) = state.queue.pop_front() {
            return Some(next);
        }
        state.active_workers = state.active_workers.saturating_sub(1);
        if state.active_workers == 0 && !state.finished {
            state.finished = true;
            state.publisher = None;
            self.done.notify_all();
            info!("Job {} finished", self.id);
        }
        None
    }

    fn store(&self, index: usize, item: MediaItem) {
        let mut state = self.lock();
        if let Some(slot) = state.results.get_mut(index) {
            *slot = Some(item);
        }
    }

    /// Sets the cancel flag and skips everything still queued. Returns
    /// `false` if the job already finished.
    fn cancel(&self) -> bool {
        let mut state = self.lock();
        if state.finished {
            return false;
        }
        self.cancelled.store(true, Ordering::SeqCst);

        let mut drained = 0;
        while let Some((index, mut item)) = state.queue.pop_front() {
            machine::skip(&mut item, SkipReason::Cancelled);
            if let Some(publisher) = &state.publisher {
                publisher.publish(ProgressEvent::for_item(
                    self.id,
                    &item,
                    EventStatus::Skipped,
                    "cancelled before start",
                ));
            }
            if let Some(slot) = state.results.get_mut(index) {
                *slot = Some(item);
            }
            drained += 1;
        }
        info!("Job {} cancelled; {} queued item(s) skipped", self.id, drained);
        true
    }

    /// Blocks until the job has finished and returns the items in submission
    /// order.
    fn wait_for_items(&self) -> Vec<MediaItem> {
        let mut state = self.lock();
        while !state.finished {
            state = self
                .done
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        state.results.iter_mut().filter_map(Option::take).collect()
    }
}

/// Immutable per-job context shared by its workers.
struct JobContext {
    config: CoreConfig,
    adapter: ToolAdapter,
    claims: Arc<DestinationClaims>,
}

// ============================================================================
// HANDLE AND REPORT
// ============================================================================

/// Final state of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    /// Terminal snapshots, in submission order.
    pub items: Vec<MediaItem>,
    pub summary: JobSummary,
}

/// Returned by [`JobScheduler::submit`].
pub struct JobHandle {
    id: JobId,
    events: EventReceiver,
    control: Arc<JobControl>,
    _pool: Option<ThreadPool>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Progress events of this job. Yields `None` once the job has finished
    /// and every event was consumed.
    pub fn events(&self) -> &EventReceiver {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.control.is_finished()
    }

    /// Waits for every item to reach a terminal state.
    pub fn wait(self) -> JobReport {
        let items = self.control.wait_for_items();
        let summary = JobSummary::from_items(
            &items,
            self.control.started_at.elapsed(),
            self.events.dropped_count(),
        );
        JobReport {
            job_id: self.id,
            items,
            summary,
        }
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Accepts submissions and runs them in the background.
pub struct JobScheduler {
    tools: ToolSet,
    gpu_lock: Arc<Semaphore>,
    claims: Arc<DestinationClaims>,
    registry: Mutex<HashMap<JobId, Arc<JobControl>>>,
    next_id: AtomicU64,
}

impl JobScheduler {
    pub fn new(tools: ToolSet) -> Self {
        Self {
            tools,
            gpu_lock: Semaphore::new(1),
            claims: Arc::new(DestinationClaims::new()),
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobControl>>> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validates and schedules a batch. Configuration problems reject the
    /// whole batch before any item is scheduled.
    pub fn submit(&self, paths: &[PathBuf], config: CoreConfig) -> CoreResult<JobHandle> {
        if paths.is_empty() {
            return Err(CoreError::NoFilesFound);
        }
        config.validate()?;

        let items: Vec<MediaItem> = paths
            .iter()
            .map(|path| {
                let mut item = classify(path);
                item.capture_dry_run(config.dry_run);
                item
            })
            .collect();
        let kinds: Vec<MediaKind> = items.iter().map(MediaItem::kind).collect();
        verify_tools(&self.tools, config.allow_transcription, &kinds)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (publisher, receiver) = event_bus(config.event_buffer);

        let mut results: Vec<Option<MediaItem>> = vec![None; items.len()];
        let mut queue = VecDeque::new();
        for (index, mut item) in items.into_iter().enumerate() {
            if item.kind() == MediaKind::Unknown {
                skip_unclassifiable(id, &mut item, &publisher);
                results[index] = Some(item);
            } else {
                queue.push_back((index, item));
            }
        }

        let workers = config.effective_workers().min(queue.len());
        let pool = if workers > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|index| format!("mediamend-worker-{}", index))
                .build()
                .map_err(|e| {
                    CoreError::OperationFailed(format!("failed to start worker pool: {}", e))
                })?;
            Some(pool)
        } else {
            None
        };

        info!(
            "Job {} accepted: {} item(s), {} queued, {} worker(s){}",
            id,
            results.len(),
            queue.len(),
            workers,
            if config.dry_run { ", dry run" } else { "" }
        );

        let adapter = ToolAdapter::new(
            self.tools.clone(),
            Arc::clone(&self.gpu_lock),
            config.effective_tool_concurrency(),
        );
        let job = Arc::new(JobContext {
            config,
            adapter,
            claims: Arc::clone(&self.claims),
        });
        let control = Arc::new(JobControl::new(id, queue, results, publisher.clone(), workers));

        {
            let mut registry = self.registry();
            registry.retain(|_, control| !control.is_finished());
            registry.insert(id, Arc::clone(&control));
        }

        if let Some(pool) = &pool {
            for _ in 0..workers {
                let control = Arc::clone(&control);
                let job = Arc::clone(&job);
                let publisher = publisher.clone();
                pool.spawn(move || worker_loop(&control, &job, &publisher));
            }
        }

        Ok(JobHandle {
            id,
            events: receiver,
            control,
            _pool: pool,
        })
    }

    /// Requests cancellation. Returns `false` for unknown or finished jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        let control = self.registry().get(&id).cloned();
        match control {
            Some(control) => control.cancel(),
            None => {
                warn!("Cancel requested for unknown job {}", id);
                false
            }
        }
    }

    /// Ids of jobs that have not finished yet.
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .registry()
            .iter()
            .filter(|(_, control)| !control.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

fn skip_unclassifiable(job_id: JobId, item: &mut MediaItem, publisher: &EventPublisher) {
    let reason = item.note().unwrap_or("unrecognised input").to_string();
    item.push_error(ErrorRecord {
        stage: None,
        kind: ErrorKind::UnclassifiableInput,
        message: reason,
        attempt: 0,
        at: Utc::now(),
    });
    machine::skip(item, SkipReason::UnclassifiableInput);
    info!("Skipping {}: {}", item.display_name(), describe_outcome(item));
    publisher.publish(ProgressEvent::for_item(
        job_id,
        item,
        EventStatus::Skipped,
        describe_outcome(item),
    ));
}

// ============================================================================
// WORKERS
// ============================================================================

fn worker_loop(control: &JobControl, job: &JobContext, publisher: &EventPublisher) {
    while let Some((index, mut item)) = control.next_item() {
        let item = if control.is_cancelled() {
            machine::skip(&mut item, SkipReason::Cancelled);
            publisher.publish(ProgressEvent::for_item(
                control.id,
                &item,
                EventStatus::Skipped,
                "cancelled before start",
            ));
            item
        } else {
            process_item(item, control, job, publisher)
        };
        job.claims.release_all(item.id());
        control.store(index, item);
    }
}

fn stage_event(
    job_id: JobId,
    item: &MediaItem,
    phase: Phase,
    status: EventStatus,
    message: String,
) -> ProgressEvent {
    let mut event = ProgressEvent::for_item(job_id, item, status, message);
    event.phase = phase;
    event
}

/// Drives one item to a terminal state.
fn process_item(
    mut item: MediaItem,
    control: &JobControl,
    job: &JobContext,
    publisher: &EventPublisher,
) -> MediaItem {
    let ctx = StageContext::new(&job.config, &job.adapter, &job.claims);
    let policy = &job.config.retry;
    let name = item.display_name();
    info!("Processing {} as {}", name, item.kind());

    while let Some(stage) = item.next_stage() {
        if control.is_cancelled() {
            machine::skip(&mut item, SkipReason::Cancelled);
            info!("{}: {}", name, describe_outcome(&item));
            publisher.publish(ProgressEvent::for_item(
                control.id,
                &item,
                EventStatus::Skipped,
                describe_outcome(&item),
            ));
            return item;
        }

        let mut attempt = 1;
        loop {
            publisher.publish(stage_event(
                control.id,
                &item,
                Phase::Stage(stage),
                EventStatus::Started,
                format!("{} attempt {}", stage, attempt),
            ));

            match machine::run_stage(item, stage, attempt, &ctx) {
                StageOutcome::Advanced(advanced) => {
                    item = advanced;
                    let summary = item
                        .stage_history()
                        .last()
                        .map(|record| record.summary.clone())
                        .unwrap_or_default();
                    publisher.publish(stage_event(
                        control.id,
                        &item,
                        Phase::Stage(stage),
                        EventStatus::Succeeded,
                        summary,
                    ));
                    break;
                }
                StageOutcome::Failed(failed, err) => {
                    item = failed;
                    if err.is_retryable() && attempt < policy.max_attempts() {
                        let delay = policy.delay_after(attempt);
                        warn!(
                            "{}: {} (attempt {}/{}), retrying in {:?}",
                            name,
                            err,
                            attempt,
                            policy.max_attempts(),
                            delay
                        );
                        publisher.publish(stage_event(
                            control.id,
                            &item,
                            Phase::Stage(stage),
                            EventStatus::Failed,
                            format!("attempt {} failed: {}; retrying", attempt, err.message),
                        ));
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }

                    error!("{}: {}", name, err);
                    machine::fail(&mut item, &err);
                    publisher.publish(ProgressEvent::for_item(
                        control.id,
                        &item,
                        EventStatus::Failed,
                        err.to_string(),
                    ));
                    return item;
                }
            }
        }
    }

    machine::complete(&mut item);
    info!("{}: {}", name, describe_outcome(&item));
    publisher.publish(ProgressEvent::for_item(
        control.id,
        &item,
        EventStatus::Succeeded,
        describe_outcome(&item),
    ));
    item
}
