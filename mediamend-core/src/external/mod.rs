// ============================================================================
// mediamend-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: The Only Way Stages Reach Transcription, Metadata and Remux
//
// Every external collaborator sits behind the `ExternalTool` trait so stages
// never spawn processes or talk to providers directly. The `ToolAdapter`
// wraps each invocation with a timeout, the GPU single-slot lock and the
// bounded tool semaphores, and normalises the outcome into a `ToolResult`.
//
// KEY COMPONENTS:
// - ExternalTool trait, ToolRequest/ToolResult/ToolFailure
// - ToolSet: the tools a submission runs with
// - ToolAdapter: timeout + concurrency limits around every call
// - CommandTool, FilenameMetadataTool, ScriptedTool implementations
// - Dependency checking at submission time

// ---- Internal crate imports ----
use crate::error::{CoreError, CoreResult};
use crate::media::MediaKind;

// ---- External crate imports ----
use log::{debug, warn};
use serde::{Deserialize, Serialize};

// ---- Standard library imports ----
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// SUBMODULES
// ============================================================================

mod adapter;
mod command;
mod offline;
mod scripted;
mod semaphore;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use adapter::ToolAdapter;
pub use command::CommandTool;
pub use offline::FilenameMetadataTool;
pub use scripted::{ScriptedOutcome, ScriptedTool};
pub use semaphore::{Permit, Semaphore};

// ============================================================================
// TOOL CONTRACT
// ============================================================================

/// The three black-box collaborators the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    Transcription,
    MetadataLookup,
    Remux,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ToolKind::Transcription => "transcription",
            ToolKind::MetadataLookup => "metadata lookup",
            ToolKind::Remux => "remux",
        };
        f.write_str(label)
    }
}

/// One invocation of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    /// What is asked of the tool (`transcribe`, `movie`, `tv`, `book`, `mux`,
    /// `tag`).
    pub operation: String,
    pub args: Vec<String>,
    /// File the tool is expected to produce, if any.
    pub output: Option<PathBuf>,
}

impl ToolRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: Vec::new(),
            output: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self
    }
}

/// A tool-reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    pub message: String,
    pub transient: bool,
    pub timed_out: bool,
}

impl ToolFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
            timed_out: false,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
            timed_out: false,
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self {
            message: format!("timed out after {:.1}s", timeout.as_secs_f64()),
            transient: true,
            timed_out: true,
        }
    }
}

/// Normalised outcome of an adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub ok: bool,
    pub output: String,
    pub error: Option<String>,
    pub timed_out: bool,
    pub transient: bool,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            ok: true,
            output,
            error: None,
            timed_out: false,
            transient: false,
        }
    }

    pub fn failure(failure: ToolFailure) -> Self {
        Self {
            ok: false,
            output: String::new(),
            error: Some(failure.message),
            timed_out: failure.timed_out,
            transient: failure.transient || failure.timed_out,
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown tool failure")
    }
}

/// A black-box external tool.
///
/// Implementations must be callable from several worker threads at once; the
/// adapter is responsible for limiting concurrency.
pub trait ExternalTool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Submission-time availability check.
    fn check_available(&self) -> CoreResult<()>;

    /// Runs the request. `timeout` is advisory; the adapter enforces it
    /// regardless.
    fn run(&self, request: &ToolRequest, timeout: Duration) -> Result<String, ToolFailure>;
}

// ============================================================================
// TOOL SET
// ============================================================================

/// The tools one submission runs with.
#[derive(Clone)]
pub struct ToolSet {
    pub transcription: Arc<dyn ExternalTool>,
    pub metadata: Arc<dyn ExternalTool>,
    pub remux: Arc<dyn ExternalTool>,
    /// Writes tags into audiobook containers. Shares the remux limits.
    pub tagger: Arc<dyn ExternalTool>,
    /// Reports `width height` of a video. Optional: without it, or when it
    /// fails, movies are labelled with the default aspect.
    pub inspector: Option<Arc<dyn ExternalTool>>,
}

impl ToolSet {
    pub fn new(
        transcription: Arc<dyn ExternalTool>,
        metadata: Arc<dyn ExternalTool>,
        remux: Arc<dyn ExternalTool>,
        tagger: Arc<dyn ExternalTool>,
    ) -> Self {
        Self {
            transcription,
            metadata,
            remux,
            tagger,
            inspector: None,
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn ExternalTool>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    /// Scripted tools that always succeed. Nothing external is spawned.
    pub fn simulated() -> Self {
        Self {
            transcription: Arc::new(ScriptedTool::new(ToolKind::Transcription)),
            metadata: Arc::new(ScriptedTool::new(ToolKind::MetadataLookup)),
            remux: Arc::new(ScriptedTool::new(ToolKind::Remux)),
            tagger: Arc::new(ScriptedTool::new(ToolKind::Remux).named("scripted-tagger")),
            inspector: Some(Arc::new(
                ScriptedTool::new(ToolKind::MetadataLookup)
                    .named("scripted-inspector")
                    .with_output("1920\n1080"),
            )),
        }
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("transcription", &self.transcription.name())
            .field("metadata", &self.metadata.name())
            .field("remux", &self.remux.name())
            .field("tagger", &self.tagger.name())
            .field("inspector", &self.inspector.as_ref().map(|inspector| inspector.name()))
            .finish()
    }
}

// ============================================================================
// DEPENDENCY CHECKING
// ============================================================================

/// Checks that the tools needed for the given media kinds are available.
///
/// Any missing tool is reported as a configuration error so the whole
/// submission is rejected before anything runs.
pub fn verify_tools(
    tools: &ToolSet,
    allow_transcription: bool,
    kinds: &[MediaKind],
) -> CoreResult<()> {
    let has_video = kinds
        .iter()
        .any(|kind| matches!(kind, MediaKind::Movie | MediaKind::TvShow));
    let has_audiobook = kinds.contains(&MediaKind::Audiobook);

    let mut required: Vec<&Arc<dyn ExternalTool>> = Vec::new();
    if has_video || has_audiobook {
        required.push(&tools.metadata);
    }
    if has_video {
        required.push(&tools.remux);
        if allow_transcription {
            required.push(&tools.transcription);
        }
    }
    if has_audiobook {
        required.push(&tools.tagger);
    }

    for tool in required {
        tool.check_available().map_err(|e| {
            CoreError::Configuration(format!(
                "{} tool '{}' is unavailable: {}",
                tool.kind(),
                tool.name(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Checks if a command can be started, by running it with `version_arg`.
pub(crate) fn check_dependency(cmd_name: &str, version_arg: &str) -> CoreResult<()> {
    let result = Command::new(cmd_name)
        .arg(version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            debug!("Found dependency: {}", cmd_name);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Dependency '{}' not found.", cmd_name);
            Err(CoreError::DependencyNotFound(cmd_name.to_string()))
        }
        Err(e) => Err(CoreError::CommandStart(cmd_name.to_string(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_command_is_dependency_not_found() {
        let result = check_dependency("mediamend-definitely-not-installed", "--version");
        assert!(matches!(result, Err(CoreError::DependencyNotFound(_))));
    }

    #[test]
    fn verify_tools_only_checks_what_the_batch_needs() {
        let missing: Arc<dyn ExternalTool> =
            Arc::new(ScriptedTool::new(ToolKind::Transcription).unavailable());
        let mut tools = ToolSet::simulated();
        tools.transcription = missing;

        // Audiobooks never transcribe.
        assert!(verify_tools(&tools, true, &[MediaKind::Audiobook]).is_ok());
        // Videos do, unless transcription is disabled.
        assert!(verify_tools(&tools, false, &[MediaKind::Movie]).is_ok());
        let err = verify_tools(&tools, true, &[MediaKind::Movie]).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn timeouts_are_transient_results() {
        let result = ToolResult::failure(ToolFailure::timeout(Duration::from_secs(2)));
        assert!(!result.ok);
        assert!(result.timed_out);
        assert!(result.transient);
        assert!(result.error_message().contains("timed out"));
    }
}
