//! Classification router: decides the media kind of each submitted path.
//!
//! Classification never fails. Anything that cannot be recognised becomes a
//! [`MediaKind::Unknown`] item carrying a note with the reason, which the
//! scheduler then skips without running any stage.

use crate::error::{CoreError, CoreResult};
use crate::media::{MediaItem, MediaKind};

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use std::path::{Path, PathBuf};

// ============================================================================
// EXTENSION TABLES
// ============================================================================

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "m4v", "wmv", "ts", "webm", "mpg", "mpeg",
];

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "m4b", "aac", "flac", "ogg", "opus", "wav", "wma",
];

pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt", "sub"];

/// Files below this size may be samples.
const SAMPLE_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// A sibling this many times larger marks the smaller file as a sample.
const SAMPLE_SIBLING_FACTOR: u64 = 3;

static EPISODE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bs(\d{1,2})e(\d{1,3})\b").expect("valid episode regex"));

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid year regex"));

static TRAILING_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]]+)\]\s*$").expect("valid suffix regex"));

static RELEASE_JUNK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(bluray|blu ray|brrip|bdrip|webrip|web dl|webdl|hdrip|xvid|x264|x265|h264|h265",
        r"|10bit|aac|ac3|dts|hevc|dvdrip|hdtv|proper|repack|subs|eng|mp3|flac|remux|\d{3,4}p)\b",
    ))
    .expect("valid junk regex")
});

static EMPTY_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\)|\[\s*\]|\{\s*\}").expect("valid bracket regex"));

// ============================================================================
// FILENAME PARSING
// ============================================================================

/// What a filename tells us before any provider is asked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilenameInfo {
    /// Movie title, show name or book title.
    pub title: Option<String>,
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Text after the episode marker, if any.
    pub episode_title: Option<String>,
    /// Trailing bracket group such as `Bluray Ultrawide`.
    pub suffix: Option<String>,
}

impl FilenameInfo {
    pub fn is_episode(&self) -> bool {
        self.season.is_some() && self.episode.is_some()
    }
}

/// Parses title, year, episode marker and trailing suffix out of a file name.
pub fn parse_filename(path: &Path) -> FilenameInfo {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    parse_name(&stem)
}

fn parse_name(stem: &str) -> FilenameInfo {
    let mut info = FilenameInfo::default();
    let mut name = stem.trim().to_string();

    if let Some(caps) = TRAILING_SUFFIX.captures(&name) {
        info.suffix = Some(caps[1].trim().to_string());
        let start = caps.get(0).map_or(name.len(), |m| m.start());
        name.truncate(start);
    }

    let spaced = name.replace(['.', '_'], " ");

    let (before, after) = match EPISODE_MARKER.captures(&spaced) {
        Some(caps) => {
            info.season = caps[1].parse().ok();
            info.episode = caps[2].parse().ok();
            let marker = caps.get(0).map_or(0..0, |m| m.range());
            (
                spaced[..marker.start].to_string(),
                Some(spaced[marker.end..].to_string()),
            )
        }
        None => (spaced, None),
    };

    let mut before = before;
    if let Some(caps) = YEAR.captures(&before) {
        info.year = caps[1].parse().ok();
        let range = caps.get(1).map_or(0..0, |m| m.range());
        before.replace_range(range, " ");
    }

    info.title = clean_title(&before);
    info.episode_title = after.as_deref().and_then(clean_title);
    info
}

fn clean_title(raw: &str) -> Option<String> {
    let without_junk = RELEASE_JUNK.replace_all(raw, " ");
    let without_brackets = EMPTY_BRACKETS.replace_all(&without_junk, " ");
    let title = without_brackets
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|token| !token.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_video_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_audio_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_subtitle_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SUBTITLE_EXTENSIONS.contains(&ext.as_str()))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Whether `path` looks like a release sample: sample-like name, under
/// 100 MiB, and a sibling with the same extension at least three times
/// larger.
pub fn is_likely_sample(path: &Path) -> bool {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let named_sample = stem == "sample"
        || stem.starts_with("sample_")
        || stem.ends_with("_sample")
        || stem.ends_with("-sample");
    if !named_sample {
        return false;
    }

    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!("Could not stat {}: {}", path.display(), e);
            return false;
        }
    };
    if size >= SAMPLE_MAX_BYTES {
        return false;
    }

    let Some(parent) = path.parent() else {
        return false;
    };
    let extension = extension_of(path);
    let Ok(entries) = std::fs::read_dir(parent) else {
        return false;
    };

    entries.filter_map(Result::ok).any(|entry| {
        let sibling = entry.path();
        sibling != path
            && sibling.is_file()
            && extension_of(&sibling) == extension
            && entry
                .metadata()
                .is_ok_and(|meta| meta.len() >= size.saturating_mul(SAMPLE_SIBLING_FACTOR).max(1))
    })
}

/// Tags a path with its media kind. Never fails: unrecognised input becomes
/// an `Unknown` item with a note.
pub fn classify(path: &Path) -> MediaItem {
    let (kind, note) = classify_kind(path);
    debug!("Classified {} as {}", path.display(), kind);
    let item = MediaItem::new(path, kind);
    match note {
        Some(note) => item.with_note(note),
        None => item,
    }
}

fn classify_kind(path: &Path) -> (MediaKind, Option<String>) {
    if !path.exists() {
        return (MediaKind::Unknown, Some("path does not exist".into()));
    }
    if path.is_dir() {
        return classify_folder(path);
    }
    if is_video_file(path) {
        if is_likely_sample(path) {
            return (MediaKind::Unknown, Some("sample".into()));
        }
        if parse_filename(path).is_episode() {
            return (MediaKind::TvShow, None);
        }
        return (MediaKind::Movie, None);
    }
    if is_audio_file(path) {
        return (MediaKind::Audiobook, None);
    }
    if is_subtitle_file(path) {
        return (
            MediaKind::Unknown,
            Some("subtitle files are processed with their video".into()),
        );
    }
    (MediaKind::Unknown, Some("unsupported file type".into()))
}

fn classify_folder(path: &Path) -> (MediaKind, Option<String>) {
    let files = match folder_files(path) {
        Ok(files) => files,
        Err(e) => return (MediaKind::Unknown, Some(format!("unreadable folder: {}", e))),
    };

    let videos: Vec<&PathBuf> = files
        .iter()
        .filter(|f| is_video_file(f) && !is_likely_sample(f))
        .collect();
    let has_audio = files.iter().any(|f| is_audio_file(f));

    if videos.is_empty() {
        if has_audio {
            return (MediaKind::Audiobook, None);
        }
        return (MediaKind::Unknown, Some("folder holds no media files".into()));
    }

    let episodes = videos
        .iter()
        .filter(|f| parse_filename(f).is_episode())
        .count();
    if episodes == videos.len() && videos.len() == 1 {
        return (MediaKind::TvShow, None);
    }
    if episodes > 0 {
        return (
            MediaKind::Unknown,
            Some("folder holds several episodes; submit them individually".into()),
        );
    }
    if videos.len() == 1 {
        return (MediaKind::Movie, None);
    }
    (
        MediaKind::Unknown,
        Some(format!("folder holds {} unrelated videos", videos.len())),
    )
}

/// Non-hidden regular files directly inside `dir`, sorted by name.
pub fn folder_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && !is_hidden(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Expands submission roots into individual inputs.
///
/// Files are kept as they are. Directories are expanded: folders that hold a
/// single title (one video, or audio only) become one input, anything else is
/// searched recursively. Hidden entries and loose subtitle files are skipped.
pub fn collect_inputs(roots: &[PathBuf]) -> CoreResult<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for root in roots {
        if !root.exists() {
            return Err(CoreError::PathError(format!(
                "Input path '{}' does not exist",
                root.display()
            )));
        }
        if root.is_dir() {
            expand_dir(root, &mut inputs)?;
        } else {
            inputs.push(root.clone());
        }
    }
    if inputs.is_empty() {
        return Err(CoreError::NoFilesFound);
    }
    Ok(inputs)
}

fn expand_dir(dir: &Path, inputs: &mut Vec<PathBuf>) -> CoreResult<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| !is_hidden(p))
        .collect();
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            match classify_folder(&entry).0 {
                MediaKind::Unknown => expand_dir(&entry, inputs)?,
                _ => inputs.push(entry),
            }
        } else if is_video_file(&entry) || is_audio_file(&entry) {
            inputs.push(entry);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path, bytes: usize) {
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn parses_movie_names() {
        let info = parse_name("The.Matrix.1999.1080p.BluRay.x264 [Bluray Ultrawide]");
        assert_eq!(info.title.as_deref(), Some("The Matrix"));
        assert_eq!(info.year, Some(1999));
        assert_eq!(info.suffix.as_deref(), Some("Bluray Ultrawide"));
        assert!(!info.is_episode());
    }

    #[test]
    fn parses_episode_names() {
        let info = parse_name("breaking_bad_S01E03_and_the_bag's_in_the_river");
        assert_eq!(info.title.as_deref(), Some("Breaking Bad"));
        assert_eq!(info.season, Some(1));
        assert_eq!(info.episode, Some(3));
        assert_eq!(
            info.episode_title.as_deref(),
            Some("And The Bag's In The River")
        );
    }

    #[test]
    fn junk_is_only_removed_as_whole_words() {
        let info = parse_name("Avengers.Endgame.2019.WEBRip");
        assert_eq!(info.title.as_deref(), Some("Avengers Endgame"));
    }

    #[test]
    fn classifies_files_by_extension_and_marker() {
        let dir = tempdir().unwrap();
        let movie = dir.path().join("Heat.1995.mkv");
        let episode = dir.path().join("Show.S02E05.mkv");
        let book = dir.path().join("Dune.m4b");
        let subs = dir.path().join("Heat.1995.srt");
        let other = dir.path().join("notes.txt");
        for path in [&movie, &episode, &book, &subs, &other] {
            touch(path, 8);
        }

        assert_eq!(classify(&movie).kind(), MediaKind::Movie);
        assert_eq!(classify(&episode).kind(), MediaKind::TvShow);
        assert_eq!(classify(&book).kind(), MediaKind::Audiobook);
        assert_eq!(classify(&subs).kind(), MediaKind::Unknown);
        let unknown = classify(&other);
        assert_eq!(unknown.kind(), MediaKind::Unknown);
        assert_eq!(unknown.note(), Some("unsupported file type"));
        assert_eq!(
            classify(&dir.path().join("missing.mkv")).kind(),
            MediaKind::Unknown
        );
    }

    #[test]
    fn samples_are_unknown() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("movie-sample.mkv"), 10);
        touch(&dir.path().join("movie.mkv"), 100);

        let sample = dir.path().join("movie-sample.mkv");
        assert!(is_likely_sample(&sample));
        let item = classify(&sample);
        assert_eq!(item.kind(), MediaKind::Unknown);
        assert_eq!(item.note(), Some("sample"));
    }

    #[test]
    fn sample_name_without_larger_sibling_is_kept() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("sample.mkv"), 10);
        assert!(!is_likely_sample(&dir.path().join("sample.mkv")));
    }

    #[test]
    fn classifies_folders() {
        let dir = tempdir().unwrap();

        let book = dir.path().join("Some Book");
        fs::create_dir(&book).unwrap();
        touch(&book.join("01.mp3"), 4);
        touch(&book.join("02.mp3"), 4);
        assert_eq!(classify(&book).kind(), MediaKind::Audiobook);

        let movie = dir.path().join("Heat (1995)");
        fs::create_dir(&movie).unwrap();
        touch(&movie.join("Heat.1995.mkv"), 4);
        touch(&movie.join("Heat.1995.srt"), 4);
        assert_eq!(classify(&movie).kind(), MediaKind::Movie);

        let season = dir.path().join("Show Season 1");
        fs::create_dir(&season).unwrap();
        touch(&season.join("Show.S01E01.mkv"), 4);
        touch(&season.join("Show.S01E02.mkv"), 4);
        assert_eq!(classify(&season).kind(), MediaKind::Unknown);

        let empty = dir.path().join("empty");
        fs::create_dir(&empty).unwrap();
        assert_eq!(classify(&empty).kind(), MediaKind::Unknown);
    }

    #[test]
    fn collect_inputs_expands_season_folders() {
        let dir = tempdir().unwrap();
        let season = dir.path().join("Show");
        fs::create_dir(&season).unwrap();
        touch(&season.join("Show.S01E01.mkv"), 4);
        touch(&season.join("Show.S01E02.mkv"), 4);
        touch(&season.join("Show.S01E01.srt"), 4);
        touch(&dir.path().join(".hidden.mkv"), 4);
        let book = dir.path().join("Book");
        fs::create_dir(&book).unwrap();
        touch(&book.join("part1.m4a"), 4);

        let inputs = collect_inputs(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            inputs,
            vec![
                book,
                season.join("Show.S01E01.mkv"),
                season.join("Show.S01E02.mkv"),
            ]
        );
    }

    #[test]
    fn collect_inputs_rejects_missing_roots() {
        let result = collect_inputs(&[PathBuf::from("/definitely/not/here")]);
        assert!(matches!(result, Err(CoreError::PathError(_))));
    }
}
