//! Configuration snapshot for a pipeline submission.
//!
//! A [`CoreConfig`] is captured once when a batch is submitted and passed by
//! value (or shared immutably) through every stage. Changing preferences
//! afterwards never affects jobs already in flight.

mod builder;

pub use builder::CoreConfigBuilder;

use crate::error::{CoreError, CoreResult};
use crate::external::ToolKind;

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// DEFAULT CONSTANTS
// ============================================================================

/// Default capacity of the progress event bus.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Extra attempts granted to a stage that failed transiently.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay of the linear retry backoff, in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Worker cap applied when GPU-bound transcription dominates and no explicit
/// worker count was given.
pub const GPU_WORKER_CAP: usize = 2;

pub const DEFAULT_TRANSCRIPTION_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REMUX_TIMEOUT_SECS: u64 = 10 * 60;

/// Language used for subtitle tracks when no preference is configured.
pub const DEFAULT_SUBTITLE_LANGUAGE: &str = "eng";

/// Directory under the output path holding per-item working artifacts.
pub const WORK_DIR_NAME: &str = ".mediamend-work";

// ============================================================================
// NESTED SETTINGS
// ============================================================================

/// Per-tool invocation timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolTimeouts {
    pub transcription_secs: u64,
    pub metadata_secs: u64,
    pub remux_secs: u64,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            transcription_secs: DEFAULT_TRANSCRIPTION_TIMEOUT_SECS,
            metadata_secs: DEFAULT_METADATA_TIMEOUT_SECS,
            remux_secs: DEFAULT_REMUX_TIMEOUT_SECS,
        }
    }
}

impl ToolTimeouts {
    /// The same timeout for every tool. Mostly useful in tests.
    pub fn uniform(timeout: Duration) -> Self {
        let secs = timeout.as_secs().max(1);
        Self {
            transcription_secs: secs,
            metadata_secs: secs,
            remux_secs: secs,
        }
    }

    pub fn for_tool(&self, kind: ToolKind) -> Duration {
        let secs = match kind {
            ToolKind::Transcription => self.transcription_secs,
            ToolKind::MetadataLookup => self.metadata_secs,
            ToolKind::Remux => self.remux_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Retry policy for transiently failing stages: up to `max_retries` extra
/// attempts, waiting `backoff_ms * attempt` between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before attempt `failed_attempt + 1`.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(failed_attempt)))
    }
}

// ============================================================================
// CORE CONFIGURATION
// ============================================================================

/// Immutable configuration snapshot consumed by the pipeline.
///
/// # Examples
///
/// ```rust,no_run
/// use mediamend_core::config::CoreConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = CoreConfigBuilder::new()
///     .input_path(PathBuf::from("/media/incoming"))
///     .output_path(PathBuf::from("/media/library"))
///     .trash_path(PathBuf::from("/media/trash"))
///     .dry_run(true)
///     .subtitle_languages(vec!["eng".to_string()])
///     .build();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    // ---- Paths ----
    /// Root the submitted files were picked from, if any.
    pub input_path: Option<PathBuf>,

    /// Library root where final containers are written.
    pub output_path: PathBuf,

    /// Where consumed sources and intermediate artifacts are relocated.
    pub trash_path: PathBuf,

    /// Roots under which Trash may move files. Defaults to `input_path`.
    pub safe_roots: Vec<PathBuf>,

    // ---- Behaviour ----
    /// Plan Tag/Mux/Trash instead of touching the filesystem.
    pub dry_run: bool,

    /// Transcription runs on the GPU; serialises transcription system-wide.
    pub use_gpu: bool,

    /// Allow falling back to transcription when no subtitles exist.
    pub allow_transcription: bool,

    /// Preferred subtitle languages, most preferred first (ISO 639-2).
    pub subtitle_languages: Vec<String>,

    // ---- Resources ----
    /// Worker pool size. `None` picks a size from the host.
    pub max_workers: Option<usize>,

    /// Concurrent metadata/remux invocations. `None` uses the pool size.
    pub tool_concurrency: Option<usize>,

    /// Capacity of the progress event bus.
    pub event_buffer: usize,

    pub tool_timeouts: ToolTimeouts,

    pub retry: RetryPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            output_path: PathBuf::new(),
            trash_path: PathBuf::new(),
            safe_roots: Vec::new(),
            dry_run: false,
            use_gpu: false,
            allow_transcription: true,
            subtitle_languages: vec![DEFAULT_SUBTITLE_LANGUAGE.to_string()],
            max_workers: None,
            tool_concurrency: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
            tool_timeouts: ToolTimeouts::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl CoreConfig {
    /// Creates a configuration with the required paths and defaults elsewhere.
    pub fn new(output_path: PathBuf, trash_path: PathBuf) -> Self {
        Self {
            output_path,
            trash_path,
            ..Self::default()
        }
    }

    /// Loads a preferences snapshot from a JSON file. Missing fields take their
    /// defaults.
    pub fn from_json_file(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::PathError(format!(
                "Failed to read preferences file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Number of workers the scheduler will start.
    pub fn effective_workers(&self) -> usize {
        let workers = match self.max_workers {
            Some(n) => n,
            None if self.use_gpu => num_cpus::get().min(GPU_WORKER_CAP),
            None => num_cpus::get(),
        };
        workers.max(1)
    }

    /// Bound on concurrent metadata and remux invocations.
    pub fn effective_tool_concurrency(&self) -> usize {
        self.tool_concurrency
            .unwrap_or_else(|| self.effective_workers())
            .max(1)
    }

    /// Primary subtitle language.
    pub fn primary_language(&self) -> &str {
        self.subtitle_languages
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_SUBTITLE_LANGUAGE)
    }

    /// Roots under which trashing is allowed.
    pub fn effective_safe_roots(&self) -> Vec<PathBuf> {
        if !self.safe_roots.is_empty() {
            return self.safe_roots.clone();
        }
        self.input_path.iter().cloned().collect()
    }

    /// Working directory for one item's intermediate artifacts.
    pub fn work_dir_for(&self, item_id: &str) -> PathBuf {
        self.output_path.join(WORK_DIR_NAME).join(item_id)
    }

    /// Checks the snapshot before anything is scheduled.
    pub fn validate(&self) -> CoreResult<()> {
        if self.output_path.as_os_str().is_empty() {
            return Err(CoreError::Configuration("output path is not set".into()));
        }
        if self.trash_path.as_os_str().is_empty() {
            return Err(CoreError::Configuration("trash path is not set".into()));
        }
        if self.output_path == self.trash_path {
            return Err(CoreError::Configuration(format!(
                "output and trash paths must differ (both are '{}')",
                self.output_path.display()
            )));
        }

        for (label, path) in [("output", &self.output_path), ("trash", &self.trash_path)] {
            if path.exists() && !path.is_dir() {
                return Err(CoreError::Configuration(format!(
                    "{} path '{}' exists but is not a directory",
                    label,
                    path.display()
                )));
            }
        }

        if let Some(input) = &self.input_path {
            if !input.is_dir() {
                return Err(CoreError::Configuration(format!(
                    "input path '{}' is not an existing directory",
                    input.display()
                )));
            }
            if *input == self.output_path || *input == self.trash_path {
                return Err(CoreError::Configuration(format!(
                    "input path '{}' must differ from the output and trash paths",
                    input.display()
                )));
            }
        }

        if self.max_workers == Some(0) {
            return Err(CoreError::Configuration("max_workers must be at least 1".into()));
        }
        if self.tool_concurrency == Some(0) {
            return Err(CoreError::Configuration(
                "tool_concurrency must be at least 1".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(CoreError::Configuration("event_buffer must be at least 1".into()));
        }

        let timeouts = &self.tool_timeouts;
        if timeouts.transcription_secs == 0
            || timeouts.metadata_secs == 0
            || timeouts.remux_secs == 0
        {
            return Err(CoreError::Configuration("tool timeouts must be non-zero".into()));
        }

        if let Some(bad) = self
            .subtitle_languages
            .iter()
            .find(|lang| lang.is_empty() || !lang.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(CoreError::Configuration(format!(
                "invalid subtitle language code '{}'",
                bad
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CoreConfig {
        CoreConfig::new(PathBuf::from("/tmp/mm-out"), PathBuf::from("/tmp/mm-trash"))
    }

    #[test]
    fn defaults_validate() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn missing_paths_are_rejected() {
        let config = CoreConfig::default();
        assert!(matches!(config.validate(), Err(CoreError::Configuration(_))));
    }

    #[test]
    fn identical_output_and_trash_are_rejected() {
        let config = CoreConfig::new(PathBuf::from("/tmp/same"), PathBuf::from("/tmp/same"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_are_rejected() {
        let mut config = valid();
        config.max_workers = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_language_codes_are_rejected() {
        let mut config = valid();
        config.subtitle_languages = vec!["en-US".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn gpu_caps_default_workers() {
        let mut config = valid();
        config.use_gpu = true;
        assert!(config.effective_workers() <= GPU_WORKER_CAP);
        config.max_workers = Some(6);
        assert_eq!(config.effective_workers(), 6);
    }

    #[test]
    fn retry_backoff_is_linear() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_ms: 100,
        };
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    }

    #[test]
    fn huge_retry_budget_from_preferences_does_not_overflow() {
        let json = r#"{ "max_retries": 4294967295, "backoff_ms": 18446744073709551615 }"#;
        let policy: RetryPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.max_attempts(), u32::MAX);
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn preferences_json_fills_defaults() {
        let json = r#"{ "output_path": "/lib", "trash_path": "/trash", "dry_run": true }"#;
        let config: CoreConfig = serde_json::from_str(json).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.primary_language(), DEFAULT_SUBTITLE_LANGUAGE);
    }
}
