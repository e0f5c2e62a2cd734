// ============================================================================
// mediamend-core/src/external/command.rs
// ============================================================================
//
// COMMAND TOOL: External Tools Backed by a Subprocess
//
// Spawns the configured program, collects stdout/stderr on reader threads and
// polls the child until it exits or the timeout expires, in which case the
// child is killed and the call reported as timed out.

use super::{ExternalTool, ToolFailure, ToolKind, ToolRequest, check_dependency};
use crate::error::CoreResult;

use log::{debug, error};

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fragments of stderr that point at a failure worth retrying.
const TRANSIENT_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "temporarily",
    "connection reset",
    "connection refused",
    "too many requests",
    "429",
    "503",
    "out of memory",
    "cuda error",
];

#[derive(Debug, Clone)]
pub struct CommandTool {
    kind: ToolKind,
    name: String,
    program: String,
    base_args: Vec<String>,
    version_arg: String,
    pass_operation: bool,
}

impl CommandTool {
    pub fn new(kind: ToolKind, program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            kind,
            name: program.clone(),
            program,
            base_args: Vec::new(),
            version_arg: "--version".to_string(),
            pass_operation: false,
        }
    }

    /// Arguments placed before the request's own arguments.
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Argument used by the availability check (`--version` by default).
    pub fn with_version_arg(mut self, arg: impl Into<String>) -> Self {
        self.version_arg = arg.into();
        self
    }

    /// Passes the request operation as the first argument, for wrapper scripts
    /// that serve several operations.
    pub fn passing_operation(mut self) -> Self {
        self.pass_operation = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn build_command(&self, request: &ToolRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args);
        if self.pass_operation {
            cmd.arg(&request.operation);
        }
        cmd.args(&request.args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl ExternalTool for CommandTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check_available(&self) -> CoreResult<()> {
        check_dependency(&self.program, &self.version_arg)
    }

    fn run(&self, request: &ToolRequest, timeout: Duration) -> Result<String, ToolFailure> {
        let mut cmd = self.build_command(request);
        debug!("Running command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn '{}': {}", self.program, e);
            ToolFailure::permanent(format!("failed to start '{}': {}", self.program, e))
        })?;

        let stdout = collect_stream(child.stdout.take());
        let stderr = collect_stream(child.stderr.take());

        let status = wait_with_timeout(&mut child, timeout)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        let Some(status) = status else {
            return Err(ToolFailure::timeout(timeout));
        };

        if status.success() {
            return Ok(stdout);
        }

        let message = format!(
            "'{}' exited with code {}: {}",
            self.program,
            status.code().unwrap_or(-1),
            last_line(&stderr)
        );
        if looks_transient(&stderr) {
            Err(ToolFailure::transient(message))
        } else {
            Err(ToolFailure::permanent(message))
        }
    }
}

fn collect_stream<R: Read + Send + 'static>(stream: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let Some(mut stream) = stream else {
            return String::new();
        };
        let mut bytes = Vec::new();
        if let Err(e) = stream.read_to_end(&mut bytes) {
            debug!("Stopped reading tool output: {}", e);
        }
        // Tools are not bound to UTF-8 (Latin-1 titles, raw subtitles).
        String::from_utf8_lossy(&bytes)
            .lines()
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// Returns `Ok(None)` when the child was killed because of the timeout.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<ExitStatus>, ToolFailure> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(ToolFailure::transient(format!(
                    "error waiting for process: {}",
                    e
                )));
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
    Ok(None)
}

fn looks_transient(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no error output")
}
