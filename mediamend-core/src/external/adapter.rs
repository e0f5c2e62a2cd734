// ============================================================================
// mediamend-core/src/external/adapter.rs
// ============================================================================
//
// TOOL ADAPTER: Timeout and Concurrency Control Around Tool Calls
//
// `invoke` never retries and never panics. It acquires the permit required by
// the tool kind, runs the tool on its own thread and waits at most `timeout`
// for the answer. The permit travels with the tool thread, so an abandoned
// call keeps holding the GPU slot until it really finishes.

use super::{
    ExternalTool, Permit, Semaphore, ToolFailure, ToolKind, ToolRequest, ToolResult, ToolSet,
};

use log::{debug, warn};

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Wraps a submission's tools with the system-wide GPU lock and the bounded
/// metadata/remux semaphores.
#[derive(Debug, Clone)]
pub struct ToolAdapter {
    tools: ToolSet,
    gpu_lock: Arc<Semaphore>,
    metadata_permits: Arc<Semaphore>,
    remux_permits: Arc<Semaphore>,
}

impl ToolAdapter {
    /// `gpu_lock` must be shared by every adapter in the process;
    /// `tool_concurrency` bounds metadata and remux calls of this adapter.
    pub fn new(tools: ToolSet, gpu_lock: Arc<Semaphore>, tool_concurrency: usize) -> Self {
        Self {
            tools,
            gpu_lock,
            metadata_permits: Semaphore::new(tool_concurrency),
            remux_permits: Semaphore::new(tool_concurrency),
        }
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn invoke(
        &self,
        tool: &Arc<dyn ExternalTool>,
        request: ToolRequest,
        timeout: Duration,
        use_gpu: bool,
    ) -> ToolResult {
        let permit = self.permit_for(tool.kind(), use_gpu);
        let name = tool.name().to_string();
        debug!(
            "Invoking {} tool '{}' ({}) with timeout {:?}",
            tool.kind(),
            name,
            request.operation,
            timeout
        );

        let (tx, rx) = mpsc::channel();
        let runner = Arc::clone(tool);
        let started = Instant::now();
        let spawned = thread::Builder::new()
            .name(format!("mediamend-tool-{}", name))
            .spawn(move || {
                let _permit = permit;
                let outcome = runner.run(&request, timeout);
                // The caller may have given up already.
                let _ = tx.send(outcome);
            });

        if let Err(e) = spawned {
            return ToolResult::failure(ToolFailure::transient(format!(
                "could not start a thread for '{}': {}",
                name, e
            )));
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(output)) => {
                debug!("Tool '{}' finished in {:?}", name, started.elapsed());
                ToolResult::success(output)
            }
            Ok(Err(failure)) => {
                debug!("Tool '{}' failed: {}", name, failure.message);
                ToolResult::failure(failure)
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Tool '{}' did not answer within {:?}", name, timeout);
                ToolResult::failure(ToolFailure::timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => ToolResult::failure(ToolFailure::permanent(
                format!("tool '{}' terminated without a result", name),
            )),
        }
    }

    fn permit_for(&self, kind: ToolKind, use_gpu: bool) -> Option<Permit> {
        match kind {
            ToolKind::Transcription if use_gpu => Some(self.gpu_lock.acquire()),
            ToolKind::Transcription => None,
            ToolKind::MetadataLookup => Some(self.metadata_permits.acquire()),
            ToolKind::Remux => Some(self.remux_permits.acquire()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ScriptedOutcome, ScriptedTool};

    fn adapter_with(transcription: Arc<dyn ExternalTool>, gpu: Arc<Semaphore>) -> ToolAdapter {
        let mut tools = ToolSet::simulated();
        tools.transcription = transcription;
        ToolAdapter::new(tools, gpu, 4)
    }

    #[test]
    fn slow_tool_times_out_and_keeps_gpu_slot_until_done() {
        let tool: Arc<dyn ExternalTool> = Arc::new(
            ScriptedTool::new(ToolKind::Transcription).with_delay(Duration::from_millis(300)),
        );
        let gpu = Semaphore::new(1);
        let adapter = adapter_with(Arc::clone(&tool), Arc::clone(&gpu));

        let result = adapter.invoke(
            &tool,
            ToolRequest::new("transcribe"),
            Duration::from_millis(50),
            true,
        );
        assert!(result.timed_out);
        assert!(result.transient);

        // Still running in the background, so the slot is taken.
        assert_eq!(gpu.available(), 0);
        thread::sleep(Duration::from_millis(500));
        assert_eq!(gpu.available(), 1);
    }

    #[test]
    fn tool_failures_are_normalised() {
        let tool: Arc<dyn ExternalTool> = Arc::new(
            ScriptedTool::new(ToolKind::Transcription)
                .then(ScriptedOutcome::Permanent("bad codec".into())),
        );
        let adapter = adapter_with(Arc::clone(&tool), Semaphore::new(1));

        let result = adapter.invoke(
            &tool,
            ToolRequest::new("transcribe"),
            Duration::from_secs(5),
            false,
        );
        assert!(!result.ok);
        assert!(!result.transient);
        assert_eq!(result.error_message(), "bad codec");
    }

    #[test]
    fn gpu_transcriptions_never_overlap() {
        let scripted = Arc::new(
            ScriptedTool::new(ToolKind::Transcription).with_delay(Duration::from_millis(40)),
        );
        let tool: Arc<dyn ExternalTool> = scripted.clone();
        let adapter = Arc::new(adapter_with(Arc::clone(&tool), Semaphore::new(1)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let adapter = Arc::clone(&adapter);
                let tool = Arc::clone(&tool);
                thread::spawn(move || {
                    adapter.invoke(
                        &tool,
                        ToolRequest::new("transcribe"),
                        Duration::from_secs(5),
                        true,
                    )
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().ok);
        }

        assert_eq!(scripted.call_count(), 4);
        assert_eq!(scripted.peak_concurrency(), 1);
    }
}
