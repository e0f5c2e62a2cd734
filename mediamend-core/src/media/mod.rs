//! Media item model: kinds, stages, phases and the per-file unit of work.
//!
//! A [`MediaItem`] is created by classification, owned by a single worker while
//! it runs, and handed to the presentation layer only as a cloned snapshot.

mod item;

pub use item::{
    ErrorRecord, MediaItem, StageChanges, StageRecord, SubtitleSource, SubtitleTrack,
    SubtitleVariant,
};

use crate::error::ErrorKind;

use serde::{Deserialize, Serialize};

use std::fmt;

// ============================================================================
// MEDIA KIND
// ============================================================================

/// The media kind assigned once by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Movie,
    TvShow,
    Audiobook,
    Unknown,
}

const VIDEO_SEQUENCE: &[Stage] = &[
    Stage::Detect,
    Stage::CleanSubtitles,
    Stage::FetchMetadata,
    Stage::Tag,
    Stage::Mux,
    Stage::Trash,
];

const AUDIOBOOK_SEQUENCE: &[Stage] = &[
    Stage::Detect,
    Stage::FetchMetadata,
    Stage::Tag,
    Stage::Trash,
];

impl MediaKind {
    /// Fixed stage sequence for this kind. Unknown items run no stage at all.
    pub fn stage_sequence(self) -> &'static [Stage] {
        match self {
            MediaKind::Movie | MediaKind::TvShow => VIDEO_SEQUENCE,
            MediaKind::Audiobook => AUDIOBOOK_SEQUENCE,
            MediaKind::Unknown => &[],
        }
    }

    pub fn runs(self, stage: Stage) -> bool {
        self.stage_sequence().contains(&stage)
    }

    /// Name used for the library folder and for metadata provider queries.
    pub fn library_folder(self) -> Option<&'static str> {
        match self {
            MediaKind::Movie => Some("Movies"),
            MediaKind::TvShow => Some("Shows"),
            MediaKind::Audiobook => Some("Audiobooks"),
            MediaKind::Unknown => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MediaKind::Movie => "Movie",
            MediaKind::TvShow => "TV Show",
            MediaKind::Audiobook => "Audiobook",
            MediaKind::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

// ============================================================================
// STAGES AND PHASES
// ============================================================================

/// One discrete transformation in the pipeline.
///
/// The derived ordering is the pipeline order and is used to reject backwards
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Detect,
    CleanSubtitles,
    FetchMetadata,
    Tag,
    Mux,
    Trash,
}

impl Stage {
    /// Stages that touch the filesystem destructively and therefore have a
    /// plan-only variant in dry-run mode.
    pub fn is_dry_run_gated(self) -> bool {
        matches!(self, Stage::Tag | Stage::Mux | Stage::Trash)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Detect => "Detect",
            Stage::CleanSubtitles => "CleanSubtitles",
            Stage::FetchMetadata => "FetchMetadata",
            Stage::Tag => "Tag",
            Stage::Mux => "Mux",
            Stage::Trash => "Trash",
        };
        f.write_str(label)
    }
}

/// Why an item ended without running its full sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    UnclassifiableInput,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnclassifiableInput => f.write_str("UnclassifiableInput"),
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Where an item currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Stage(Stage),
    Completed,
    Failed(ErrorKind),
    Skipped(SkipReason),
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed(_) | Phase::Skipped(_))
    }

    pub fn stage(self) -> Option<Stage> {
        match self {
            Phase::Stage(stage) => Some(stage),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pending => f.write_str("Pending"),
            Phase::Stage(stage) => write!(f, "{}", stage),
            Phase::Completed => f.write_str("Completed"),
            Phase::Failed(kind) => write!(f, "Failed({})", kind),
            Phase::Skipped(reason) => write!(f, "Skipped({})", reason),
        }
    }
}
