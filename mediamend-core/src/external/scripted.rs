// ============================================================================
// mediamend-core/src/external/scripted.rs
// ============================================================================
//
// SCRIPTED TOOL: Deterministic Stand-In for External Tools
//
// Replays a script of outcomes instead of spawning anything. Used by the test
// suites and by the CLI's `--simulate` mode. On success the tool materialises
// the requested output file so downstream stages find what they expect.

use super::{ExternalTool, ToolFailure, ToolKind, ToolRequest};
use crate::error::{CoreError, CoreResult};

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const SIMULATED_SUBTITLE: &str = "1\n00:00:01,000 --> 00:00:03,000\n[simulated transcription]\n";

/// A scripted result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Success(String),
    Transient(String),
    Permanent(String),
    /// Reports a timeout, as a killed subprocess would.
    Timeout,
}

/// Scripted tool. Sticky rules win over the queue; the queue is consumed one
/// outcome per call; once empty every call succeeds with the default output.
#[derive(Debug)]
pub struct ScriptedTool {
    kind: ToolKind,
    name: String,
    available: bool,
    delay: Duration,
    default_output: String,
    rules: Vec<(String, ScriptedOutcome)>,
    queue: Mutex<VecDeque<ScriptedOutcome>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<ToolRequest>>,
}

impl ScriptedTool {
    pub fn new(kind: ToolKind) -> Self {
        let (name, default_output) = match kind {
            ToolKind::Transcription => ("scripted-transcriber", SIMULATED_SUBTITLE),
            ToolKind::MetadataLookup => ("scripted-metadata", "{}"),
            ToolKind::Remux => ("scripted-remuxer", ""),
        };
        Self {
            kind,
            name: name.to_string(),
            available: true,
            delay: Duration::ZERO,
            default_output: default_output.to_string(),
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Makes `check_available` fail.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Sleeps this long on every call before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.default_output = output.into();
        self
    }

    /// Queues an outcome for the next unmatched call.
    pub fn then(self, outcome: ScriptedOutcome) -> Self {
        self.lock_queue().push_back(outcome);
        self
    }

    /// Queues the same outcome `times` times.
    pub fn then_repeat(self, outcome: ScriptedOutcome, times: usize) -> Self {
        {
            let mut queue = self.lock_queue();
            for _ in 0..times {
                queue.push_back(outcome.clone());
            }
        }
        self
    }

    /// Always answers `outcome` when any argument contains `pattern`.
    pub fn when_arg_contains(
        mut self,
        pattern: impl Into<String>,
        outcome: ScriptedOutcome,
    ) -> Self {
        self.rules.push((pattern.into(), outcome));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ToolRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedOutcome>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_outcome(&self, request: &ToolRequest) -> ScriptedOutcome {
        let matched = self.rules.iter().find(|(pattern, _)| {
            request.args.iter().any(|arg| arg.contains(pattern.as_str()))
        });
        if let Some((_, outcome)) = matched {
            return outcome.clone();
        }
        self.lock_queue()
            .pop_front()
            .unwrap_or_else(|| ScriptedOutcome::Success(self.default_output.clone()))
    }

    fn materialise(&self, request: &ToolRequest, output: &str) -> Result<(), ToolFailure> {
        let Some(path) = &request.output else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ToolFailure::permanent(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let contents = if output.is_empty() {
            format!("{} output of {}\n", self.name, request.operation)
        } else {
            output.to_string()
        };
        std::fs::write(path, contents)
            .map_err(|e| ToolFailure::permanent(format!("cannot write {}: {}", path.display(), e)))
    }
}

impl ExternalTool for ScriptedTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check_available(&self) -> CoreResult<()> {
        if self.available {
            Ok(())
        } else {
            Err(CoreError::DependencyNotFound(self.name.clone()))
        }
    }

    fn run(&self, request: &ToolRequest, timeout: Duration) -> Result<String, ToolFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let result = match self.next_outcome(request) {
            ScriptedOutcome::Success(output) => {
                self.materialise(request, &output).map(|()| output)
            }
            ScriptedOutcome::Transient(message) => Err(ToolFailure::transient(message)),
            ScriptedOutcome::Permanent(message) => Err(ToolFailure::permanent(message)),
            ScriptedOutcome::Timeout => Err(ToolFailure::timeout(timeout)),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
