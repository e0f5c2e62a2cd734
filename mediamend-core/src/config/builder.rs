// ============================================================================
// mediamend-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for CoreConfig
//
// Fluent construction of a CoreConfig snapshot. Anything not set keeps the
// value from CoreConfig::default(); call `validate()` on the result before
// submitting it.

// ---- Standard library imports ----
use std::path::PathBuf;

// ---- Internal crate imports ----
use super::{CoreConfig, RetryPolicy, ToolTimeouts};

/// Builder for creating CoreConfig instances.
///
/// # Examples
///
/// ```rust
/// use mediamend_core::config::CoreConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = CoreConfigBuilder::new()
///     .output_path(PathBuf::from("/path/to/library"))
///     .trash_path(PathBuf::from("/path/to/trash"))
///     .use_gpu(true)
///     .max_workers(2)
///     .max_retries(3)
///     .build();
/// assert_eq!(config.retry.max_retries, 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing snapshot, e.g. one loaded from a preferences
    /// file, so individual flags can override it.
    pub fn from_config(config: CoreConfig) -> Self {
        Self { config }
    }

    pub fn input_path(mut self, input_path: PathBuf) -> Self {
        self.config.input_path = Some(input_path);
        self
    }

    pub fn output_path(mut self, output_path: PathBuf) -> Self {
        self.config.output_path = output_path;
        self
    }

    pub fn trash_path(mut self, trash_path: PathBuf) -> Self {
        self.config.trash_path = trash_path;
        self
    }

    pub fn safe_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.safe_roots = roots;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn use_gpu(mut self, use_gpu: bool) -> Self {
        self.config.use_gpu = use_gpu;
        self
    }

    pub fn allow_transcription(mut self, allow: bool) -> Self {
        self.config.allow_transcription = allow;
        self
    }

    pub fn subtitle_languages(mut self, languages: Vec<String>) -> Self {
        self.config.subtitle_languages = languages;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = Some(workers);
        self
    }

    pub fn tool_concurrency(mut self, permits: usize) -> Self {
        self.config.tool_concurrency = Some(permits);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.config.event_buffer = capacity;
        self
    }

    pub fn tool_timeouts(mut self, timeouts: ToolTimeouts) -> Self {
        self.config.tool_timeouts = timeouts;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.config.retry.backoff_ms = backoff_ms;
        self
    }

    pub fn build(self) -> CoreConfig {
        self.config
    }
}
