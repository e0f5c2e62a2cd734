// ============================================================================
// mediamend-core/src/media/item.rs
// ============================================================================
//
// MEDIA ITEM: The Per-File Unit of Work
//
// A MediaItem accumulates everything the pipeline learns about one source
// path. Identity fields (id, source path, kind, dry-run flag) are fixed at
// construction; history and errors are append-only; once the item reaches a
// terminal phase only those two lists may still grow.

use super::{MediaKind, Phase, Stage};
use crate::error::{ErrorKind, StageError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// RECORDS
// ============================================================================

/// A completed stage, as stored in the item's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    /// 1-based attempt number that succeeded.
    pub attempt: u32,
    pub summary: String,
    /// Actions a dry-run stage would have performed.
    pub plan: Option<Vec<String>>,
    pub finished_at: DateTime<Utc>,
}

/// A failure captured for an item. `stage` is `None` for failures that
/// happened before any stage ran (classification).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: Option<Stage>,
    pub kind: ErrorKind,
    pub message: String,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn from_stage_error(err: &StageError, attempt: u32) -> Self {
        Self {
            stage: Some(err.stage),
            kind: err.kind,
            message: err.message.clone(),
            attempt,
            at: Utc::now(),
        }
    }
}

/// Subtitle flavour, derived from the sidecar name or the transcription mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubtitleVariant {
    Normal,
    Forced,
    Sdh,
}

/// Where a subtitle track came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubtitleSource {
    Sidecar,
    Transcribed,
}

/// Descriptor of one subtitle track destined for the final container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// File the muxer will read (cleaned copy, or the planned path in dry-run).
    pub path: PathBuf,
    /// Original sidecar file, if any.
    pub origin: Option<PathBuf>,
    pub language: String,
    pub forced: bool,
    pub variant: SubtitleVariant,
    pub source: SubtitleSource,
    /// Number of branding lines removed during cleanup.
    pub removed_lines: usize,
}

// ============================================================================
// MEDIA ITEM
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    id: String,
    source_path: PathBuf,
    kind: MediaKind,
    dry_run: bool,
    phase: Phase,
    /// Classification remark (e.g. why the kind is Unknown).
    note: Option<String>,
    stage_history: Vec<StageRecord>,
    metadata: BTreeMap<String, String>,
    subtitle_tracks: Vec<SubtitleTrack>,
    /// Intermediate files produced by stages, relocated by Trash.
    artifacts: Vec<PathBuf>,
    errors: Vec<ErrorRecord>,
}

impl MediaItem {
    /// Creates a pending item. Only classification should call this.
    pub fn new(source_path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        let source_path = source_path.into();
        Self {
            id: item_id_for(&source_path),
            source_path,
            kind,
            dry_run: false,
            phase: Phase::Pending,
            note: None,
            stage_history: Vec::new(),
            metadata: BTreeMap::new(),
            subtitle_tracks: Vec::new(),
            artifacts: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Captures the submission's dry-run flag. Ignored once the item left
    /// `Pending`.
    pub(crate) fn capture_dry_run(&mut self, dry_run: bool) {
        if self.phase == Phase::Pending {
            self.dry_run = dry_run;
        }
    }

    // ---- Accessors ----

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn stage_history(&self) -> &[StageRecord] {
        &self.stage_history
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn subtitle_tracks(&self) -> &[SubtitleTrack] {
        &self.subtitle_tracks
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn display_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }

    /// Stages completed so far, in order.
    pub fn completed_stages(&self) -> Vec<Stage> {
        self.stage_history.iter().map(|record| record.stage).collect()
    }

    /// The next stage of this item's sequence, or `None` when the sequence is
    /// exhausted or the item is terminal.
    pub fn next_stage(&self) -> Option<Stage> {
        if self.is_terminal() {
            return None;
        }
        let last = self.stage_history.last().map(|record| record.stage);
        self.kind
            .stage_sequence()
            .iter()
            .copied()
            .find(|stage| last.is_none_or(|done| *stage > done))
    }

    // ---- Transitions ----

    /// Moves the item into `stage`. Rejects terminal items, stages outside the
    /// kind's sequence and anything that is not strictly after the last
    /// completed stage.
    pub(crate) fn enter_stage(&mut self, stage: Stage) -> Result<(), StageError> {
        if self.is_terminal() {
            return Err(StageError::permanent(
                stage,
                format!("item is already terminal ({})", self.phase),
            ));
        }
        if self.next_stage() != Some(stage) {
            return Err(StageError::permanent(
                stage,
                format!(
                    "illegal transition from {} for a {} item",
                    self.phase, self.kind
                ),
            ));
        }
        self.phase = Phase::Stage(stage);
        Ok(())
    }

    /// Appends a successful stage record and applies the stage's changes.
    pub(crate) fn complete_stage(&mut self, record: StageRecord, changes: StageChanges) {
        self.merge_metadata(changes.metadata);
        if let Some(tracks) = changes.subtitle_tracks {
            self.subtitle_tracks = tracks;
        }
        self.artifacts.extend(changes.artifacts);
        self.stage_history.push(record);
    }

    /// Merges key/value pairs into the metadata map. Existing keys not present
    /// in `updates` are kept; empty values never erase existing ones.
    pub(crate) fn merge_metadata(&mut self, updates: BTreeMap<String, String>) {
        for (key, value) in updates {
            if value.trim().is_empty() {
                continue;
            }
            self.metadata.insert(key, value);
        }
    }

    pub(crate) fn push_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    /// Moves the item into a terminal phase. Returns `false` (and changes
    /// nothing) if it already was terminal.
    pub(crate) fn finish(&mut self, phase: Phase) -> bool {
        debug_assert!(phase.is_terminal());
        if self.is_terminal() || !phase.is_terminal() {
            return false;
        }
        self.phase = phase;
        true
    }
}

/// Changes a successful stage contributes to the item.
#[derive(Debug, Clone, Default)]
pub struct StageChanges {
    pub metadata: BTreeMap<String, String>,
    pub subtitle_tracks: Option<Vec<SubtitleTrack>>,
    pub artifacts: Vec<PathBuf>,
}

/// Stable identifier for a source path: first 16 hex digits of the SHA-256 of
/// its absolute form.
fn item_id_for(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(stage: Stage) -> StageRecord {
        StageRecord {
            stage,
            attempt: 1,
            summary: String::new(),
            plan: None,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn id_is_stable_for_the_same_path() {
        let a = MediaItem::new("/media/in/Movie.2010.mkv", MediaKind::Movie);
        let b = MediaItem::new("/media/in/Movie.2010.mkv", MediaKind::Movie);
        let c = MediaItem::new("/media/in/Other.mkv", MediaKind::Movie);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.id().len(), 16);
    }

    #[test]
    fn stages_advance_forward_only() {
        let mut item = MediaItem::new("/x/book.m4b", MediaKind::Audiobook);
        assert_eq!(item.next_stage(), Some(Stage::Detect));
        item.enter_stage(Stage::Detect).unwrap();
        item.complete_stage(record(Stage::Detect), StageChanges::default());
        assert_eq!(item.next_stage(), Some(Stage::FetchMetadata));

        // CleanSubtitles is not part of the audiobook sequence.
        assert!(item.enter_stage(Stage::CleanSubtitles).is_err());
        // Detect cannot run twice.
        assert!(item.enter_stage(Stage::Detect).is_err());
        assert!(item.enter_stage(Stage::FetchMetadata).is_ok());
    }

    #[test]
    fn terminal_items_reject_transitions_but_accept_errors() {
        let mut item = MediaItem::new("/x/a.mkv", MediaKind::Movie);
        assert!(item.finish(Phase::Completed));
        assert!(!item.finish(Phase::Failed(ErrorKind::PermanentToolError)));
        assert_eq!(item.phase(), Phase::Completed);
        assert!(item.enter_stage(Stage::Detect).is_err());

        let err = StageError::permanent(Stage::Detect, "late");
        item.push_error(ErrorRecord::from_stage_error(&err, 1));
        assert_eq!(item.errors().len(), 1);
    }

    #[test]
    fn metadata_merge_keeps_existing_keys() {
        let mut item = MediaItem::new("/x/a.mkv", MediaKind::Movie);
        item.merge_metadata(BTreeMap::from([
            ("title".to_string(), "Heat".to_string()),
            ("year".to_string(), "1995".to_string()),
        ]));
        item.merge_metadata(BTreeMap::from([
            ("title".to_string(), "Heat (1995)".to_string()),
            ("year".to_string(), "  ".to_string()),
            ("tmdb_id".to_string(), "949".to_string()),
        ]));
        assert_eq!(item.metadata_value("title"), Some("Heat (1995)"));
        assert_eq!(item.metadata_value("year"), Some("1995"));
        assert_eq!(item.metadata_value("tmdb_id"), Some("949"));
    }

    #[test]
    fn dry_run_is_fixed_after_pending() {
        let mut item = MediaItem::new("/x/a.mkv", MediaKind::Movie);
        item.capture_dry_run(true);
        item.enter_stage(Stage::Detect).unwrap();
        item.capture_dry_run(false);
        assert!(item.dry_run());
    }
}
