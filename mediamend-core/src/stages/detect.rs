//! Detect: confirms the source is still there and records what its name says.

use super::{StageContext, StageOutput, keys, path_arg};
use crate::classify::{self, FilenameInfo};
use crate::error::{StageError, StageResult};
use crate::external::ToolRequest;
use crate::media::{MediaItem, MediaKind, Stage, StageChanges};

use log::{debug, warn};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// DVD, Bluray or Temp, from the bracket tags in a name.
pub(crate) fn detect_source_format(name: &str) -> &'static str {
    let name = name.to_lowercase();
    if name.contains("[dvd") {
        "DVD"
    } else if name.contains("[bluray") || name.contains("[blu-ray") {
        "Bluray"
    } else {
        "Temp"
    }
}

/// Label used when the dimensions cannot be read.
pub(crate) const DEFAULT_ASPECT: &str = "Widescreen";

/// Fullscreen below 1.6:1, Ultrawide from 2:1, Widescreen in between. Reads
/// the `width` and `height` an inspector prints, in that order.
pub(crate) fn aspect_label(dimensions: &str) -> Option<&'static str> {
    let mut numbers = dimensions.split_whitespace().map(str::parse::<u32>);
    let width = f64::from(numbers.next()?.ok()?);
    let height = f64::from(numbers.next()?.ok()?);
    if width == 0.0 || height == 0.0 {
        return None;
    }
    let ratio = width / height;
    Some(if ratio < 1.6 {
        "Fullscreen"
    } else if ratio < 2.0 {
        "Widescreen"
    } else {
        "Ultrawide"
    })
}

fn detect_aspect(video: &Path, ctx: &StageContext<'_>) -> &'static str {
    let Some(inspector) = &ctx.adapter.tools().inspector else {
        return DEFAULT_ASPECT;
    };
    let request = ToolRequest::new("inspect").arg(path_arg(video));
    match ctx.invoke(Stage::Detect, inspector, request) {
        Ok(output) => aspect_label(&output).unwrap_or_else(|| {
            warn!("Unreadable dimensions for {}: {:?}", video.display(), output);
            DEFAULT_ASPECT
        }),
        Err(err) => {
            warn!("Aspect ratio detection failed for {}: {}", video.display(), err.message);
            DEFAULT_ASPECT
        }
    }
}

pub(super) fn run(item: &MediaItem, ctx: &StageContext<'_>) -> StageResult<StageOutput> {
    let source = item.source_path();
    if !source.exists() {
        return Err(StageError::permanent(
            Stage::Detect,
            format!("source {} no longer exists", source.display()),
        ));
    }

    let media_file = locate_media_file(source, item.kind())?;
    // Folder sources are named after the title; loose files carry it themselves.
    let named = if source.is_dir() { source } else { media_file.as_path() };
    let info = classify::parse_filename(named);
    let file_name = named
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut metadata = BTreeMap::new();
    metadata.insert(keys::MEDIA_FILE.to_string(), media_file.to_string_lossy().into_owned());
    metadata.insert(
        keys::SOURCE_FORMAT.to_string(),
        detect_source_format(&file_name).to_string(),
    );
    if let Some(suffix) = &info.suffix {
        metadata.insert(keys::SUFFIX.to_string(), suffix.clone());
    }
    if let Some(year) = info.year {
        metadata.insert(keys::YEAR.to_string(), year.to_string());
    }
    if item.kind() == MediaKind::Movie {
        let aspect = detect_aspect(&media_file, ctx);
        metadata.insert(keys::ASPECT.to_string(), aspect.to_string());
    }

    let summary = match item.kind() {
        MediaKind::TvShow => describe_episode(&info, &mut metadata),
        MediaKind::Audiobook => describe_book(named, &info, &mut metadata),
        _ => describe_movie(&info, &mut metadata, item),
    };
    debug!("Detect {}: {}", item.display_name(), summary);

    Ok(StageOutput::new(summary).with_changes(StageChanges {
        metadata,
        ..StageChanges::default()
    }))
}

fn locate_media_file(source: &Path, kind: MediaKind) -> StageResult<PathBuf> {
    if source.is_file() {
        return Ok(source.to_path_buf());
    }
    let files = classify::folder_files(source).map_err(|e| {
        StageError::io(Stage::Detect, &format!("cannot read {}", source.display()), e)
    })?;

    let found = if kind == MediaKind::Audiobook {
        files.into_iter().find(|f| classify::is_audio_file(f))
    } else {
        files
            .into_iter()
            .filter(|f| classify::is_video_file(f) && !classify::is_likely_sample(f))
            .max_by_key(|f| std::fs::metadata(f).map(|m| m.len()).unwrap_or(0))
    };

    found.ok_or_else(|| {
        StageError::permanent(
            Stage::Detect,
            format!("no media file found in {}", source.display()),
        )
    })
}

fn describe_movie(
    info: &FilenameInfo,
    metadata: &mut BTreeMap<String, String>,
    item: &MediaItem,
) -> String {
    let title = info.title.clone().unwrap_or_else(|| item.display_name());
    let summary = match info.year {
        Some(year) => format!("Movie '{}' ({})", title, year),
        None => format!("Movie '{}'", title),
    };
    metadata.insert(keys::TITLE.to_string(), title);
    summary
}

fn describe_episode(info: &FilenameInfo, metadata: &mut BTreeMap<String, String>) -> String {
    let show = info.title.clone().unwrap_or_else(|| "Unknown Show".to_string());
    let season = info.season.unwrap_or(1);
    let episode = info.episode.unwrap_or(1);
    metadata.insert(keys::SHOW.to_string(), show.clone());
    metadata.insert(keys::SEASON.to_string(), season.to_string());
    metadata.insert(keys::EPISODE.to_string(), episode.to_string());
    if let Some(title) = &info.episode_title {
        metadata.insert(keys::EPISODE_TITLE.to_string(), title.clone());
    }
    format!("{} S{:02}E{:02}", show, season, episode)
}

/// Audiobook names are commonly `Author - Title`.
fn describe_book(
    named: &Path,
    info: &FilenameInfo,
    metadata: &mut BTreeMap<String, String>,
) -> String {
    let stem = if named.is_dir() {
        named.file_name()
    } else {
        named.file_stem()
    }
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();

    let (author, title) = match stem.split_once(" - ") {
        Some((author, title)) => (Some(author.trim().to_string()), title.trim().to_string()),
        None => (None, info.title.clone().unwrap_or_else(|| stem.trim().to_string())),
    };

    metadata.insert(keys::TITLE.to_string(), title.clone());
    match author {
        Some(author) => {
            let summary = format!("Audiobook '{}' by {}", title, author);
            metadata.insert(keys::AUTHOR.to_string(), author);
            summary
        }
        None => format!("Audiobook '{}'", title),
    }
}
