//! Core library of the MediaMend media pipeline.
//!
//! Classifies downloaded media (movies, TV episodes, audiobooks), then drives
//! each item through a fixed stage sequence on a bounded worker pool: detect,
//! fetch metadata, clean subtitles, name the library destination, mux, and
//! move the originals to a trash folder. Long-running work is delegated to
//! external tools behind the [`external::ExternalTool`] trait.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use mediamend_core::{CoreConfigBuilder, JobScheduler, ToolSet};
//! use std::path::PathBuf;
//!
//! let config = CoreConfigBuilder::new()
//!     .input_path(PathBuf::from("/downloads"))
//!     .output_path(PathBuf::from("/library"))
//!     .trash_path(PathBuf::from("/trash"))
//!     .dry_run(true)
//!     .build();
//!
//! let scheduler = JobScheduler::new(ToolSet::simulated());
//! let inputs = mediamend_core::collect_inputs(&[PathBuf::from("/downloads")]).unwrap();
//! let handle = scheduler.submit(&inputs, config).unwrap();
//!
//! while let Some(event) = handle.events().recv() {
//!     println!("{} {} {}", event.source_path.display(), event.phase, event.status);
//! }
//! let report = handle.wait();
//! println!("{}", report.summary);
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod external;
pub mod media;
pub mod pipeline;
pub mod reporting;
pub mod safety;
pub mod stages;
pub mod utils;

// Re-exports for public API
pub use classify::{classify, collect_inputs, parse_filename};
pub use config::{CoreConfig, CoreConfigBuilder, RetryPolicy, ToolTimeouts};
pub use error::{CoreError, CoreResult, ErrorKind, StageError};
pub use events::json_handler::JsonProgressHandler;
pub use events::{EventDispatcher, EventHandler, EventReceiver, EventStatus, ProgressEvent};
pub use external::{CommandTool, ExternalTool, ToolKind, ToolSet, verify_tools};
pub use media::{MediaItem, MediaKind, Phase, SkipReason, Stage};
pub use pipeline::{JobHandle, JobId, JobReport, JobScheduler};
pub use reporting::{JobSummary, describe_outcome};
pub use utils::format_duration;
