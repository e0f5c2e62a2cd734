// ============================================================================
// mediamend-core/src/stages/mod.rs
// ============================================================================
//
// STAGES: The Discrete Transformations Applied to a Media Item
//
// Each stage reads the item snapshot and the immutable configuration and
// returns what it learned (metadata, subtitle tracks, artifacts) or a
// StageError. Stages never mutate the item themselves; the state machine
// applies the returned changes. External tools are reached only through the
// ToolAdapter in the context.
//
// KEY COMPONENTS:
// - StageContext / StageOutput: the stage calling convention
// - execute(): dispatch from Stage to its implementation
// - DestinationClaims: output paths reserved across concurrent items
// - Shared helpers for tool invocation, output reservation and file lookup

// ---- Internal crate imports ----
use crate::classify;
use crate::config::CoreConfig;
use crate::error::{StageError, StageResult};
use crate::external::{ExternalTool, ToolAdapter, ToolRequest};
use crate::media::{MediaItem, Stage, StageChanges};

// ---- External crate imports ----
use log::debug;

// ---- Standard library imports ----
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// SUBMODULES
// ============================================================================

mod claims;
mod detect;
mod metadata;
mod mux;
mod subtitles;
mod tag;
mod trash;

pub use claims::{Claim, DestinationClaims};
pub use subtitles::{clean_subtitle_text, is_branding_line};
pub use tag::library_path;

/// Metadata keys written by the stages.
pub mod keys {
    pub const MEDIA_FILE: &str = "media_file";
    pub const TITLE: &str = "title";
    pub const YEAR: &str = "year";
    pub const SHOW: &str = "show";
    pub const SEASON: &str = "season";
    pub const EPISODE: &str = "episode";
    pub const EPISODE_TITLE: &str = "episode_title";
    pub const AUTHOR: &str = "author";
    pub const SERIES: &str = "series";
    pub const SERIES_INDEX: &str = "series_index";
    pub const SOURCE_FORMAT: &str = "source_format";
    pub const ASPECT: &str = "aspect";
    pub const SUFFIX: &str = "suffix";
    pub const OUTPUT_PATH: &str = "output_path";
    pub const MUXED_PATH: &str = "muxed_path";
}

// ============================================================================
// CALLING CONVENTION
// ============================================================================

/// What a stage may read besides the item.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a CoreConfig,
    pub adapter: &'a ToolAdapter,
    pub claims: &'a DestinationClaims,
}

impl<'a> StageContext<'a> {
    pub fn new(
        config: &'a CoreConfig,
        adapter: &'a ToolAdapter,
        claims: &'a DestinationClaims,
    ) -> Self {
        Self {
            config,
            adapter,
            claims,
        }
    }

    /// Runs `request` on `tool` with the configured timeout for its kind and
    /// maps a failure onto the stage error taxonomy.
    pub(crate) fn invoke(
        &self,
        stage: Stage,
        tool: &Arc<dyn ExternalTool>,
        request: ToolRequest,
    ) -> StageResult<String> {
        let timeout = self.config.tool_timeouts.for_tool(tool.kind());
        let result = self
            .adapter
            .invoke(tool, request, timeout, self.config.use_gpu);
        if result.ok {
            return Ok(result.output);
        }

        let message = format!("{} ({}): {}", tool.name(), tool.kind(), result.error_message());
        if result.transient {
            Err(StageError::transient(stage, message))
        } else {
            Err(StageError::permanent(stage, message))
        }
    }
}

/// Result of one successful stage.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub summary: String,
    /// Set by dry-run variants: what would have happened.
    pub plan: Option<Vec<String>>,
    pub changes: StageChanges,
}

impl StageOutput {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    pub fn with_plan(mut self, plan: Vec<String>) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_changes(mut self, changes: StageChanges) -> Self {
        self.changes = changes;
        self
    }
}

/// Runs the implementation of `stage` against `item`.
pub fn execute(stage: Stage, item: &MediaItem, ctx: &StageContext<'_>) -> StageResult<StageOutput> {
    match stage {
        Stage::Detect => detect::run(item, ctx),
        Stage::CleanSubtitles => subtitles::run(item, ctx),
        Stage::FetchMetadata => metadata::run(item, ctx),
        Stage::Tag => tag::run(item, ctx),
        Stage::Mux => mux::run(item, ctx),
        Stage::Trash => trash::run(item, ctx),
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// The media file recorded by Detect, falling back to the source path.
pub(crate) fn media_file(item: &MediaItem) -> PathBuf {
    item.metadata_value(keys::MEDIA_FILE)
        .map(PathBuf::from)
        .unwrap_or_else(|| item.source_path().to_path_buf())
}

/// Audio files making up an audiobook item, in playback order.
pub(crate) fn audiobook_parts(item: &MediaItem, stage: Stage) -> StageResult<Vec<PathBuf>> {
    let source = item.source_path();
    if !source.is_dir() {
        return Ok(vec![source.to_path_buf()]);
    }
    let parts: Vec<PathBuf> = classify::folder_files(source)
        .map_err(|e| StageError::io(stage, &format!("cannot read {}", source.display()), e))?
        .into_iter()
        .filter(|path| classify::is_audio_file(path))
        .collect();
    if parts.is_empty() {
        return Err(StageError::permanent(
            stage,
            format!("no audio files left in {}", source.display()),
        ));
    }
    Ok(parts)
}

/// Reserves `destination` for the item before anything is written there.
///
/// A file left by one of the item's own earlier attempts is removed; a file
/// the item did not produce, or a path another item holds, is a permanent
/// error.
pub(crate) fn reserve_output(
    item: &MediaItem,
    ctx: &StageContext<'_>,
    destination: &Path,
    stage: Stage,
) -> StageResult<()> {
    match ctx.claims.claim(destination, item.id()) {
        Err(holder) => Err(StageError::permanent(
            stage,
            format!(
                "{} is already being produced by item {}",
                destination.display(),
                holder
            ),
        )),
        Ok(Claim::Fresh) if destination.exists() => {
            ctx.claims.release(destination, item.id());
            Err(StageError::permanent(
                stage,
                format!("{} already exists in the library", destination.display()),
            ))
        }
        Ok(Claim::Fresh) => Ok(()),
        Ok(Claim::Held) => {
            if destination.exists() {
                debug!("Removing leftover {} from an earlier attempt", destination.display());
                std::fs::remove_file(destination).map_err(|e| {
                    StageError::io(
                        stage,
                        &format!("cannot remove leftover {}", destination.display()),
                        e,
                    )
                })?;
            }
            Ok(())
        }
    }
}

/// Removes whatever a failed tool call left at `destination`.
pub(crate) fn discard_output(destination: &Path) {
    if destination.is_file() && std::fs::remove_file(destination).is_ok() {
        debug!("Discarded partial output {}", destination.display());
    }
}

pub(crate) fn create_parent_dir(path: &Path, stage: Stage) -> StageResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            StageError::io(stage, &format!("cannot create {}", parent.display()), e)
        })?;
    }
    Ok(())
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
