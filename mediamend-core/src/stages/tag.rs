//! Tag: decides where the item lands in the library and, for audiobooks,
//! writes the tagged output copy.

use super::{
    StageContext, StageOutput, audiobook_parts, create_parent_dir, discard_output, keys, path_arg,
    reserve_output,
};
use crate::error::{StageError, StageResult};
use super::detect::DEFAULT_ASPECT;
use crate::external::ToolRequest;
use crate::media::{MediaItem, MediaKind, Stage, StageChanges};
use crate::utils::sanitize_filename;

use log::info;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn value<'a>(metadata: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn number(metadata: &BTreeMap<String, String>, key: &str) -> Option<u32> {
    value(metadata, key).and_then(|v| v.parse().ok())
}

/// Bracket tag: the original suffix when present, otherwise the source
/// format, followed by the aspect label for movies.
fn source_tag(kind: MediaKind, metadata: &BTreeMap<String, String>) -> String {
    if let Some(suffix) = value(metadata, keys::SUFFIX) {
        return suffix.to_string();
    }
    let source = value(metadata, keys::SOURCE_FORMAT).unwrap_or("Temp");
    if kind == MediaKind::Movie {
        let aspect = value(metadata, keys::ASPECT).unwrap_or(DEFAULT_ASPECT);
        format!("{} {}", source, aspect)
    } else {
        source.to_string()
    }
}

/// Library-relative destination for an item with the given kind and
/// metadata:
///
/// - `Movies/Title (Year) [Source Aspect].mkv`
/// - `Shows/Show/Season NN/Show SxxEyy - Episode [Source].mkv`
/// - `Audiobooks/Series Book N, Title - Author.m4b`
pub fn library_path(kind: MediaKind, metadata: &BTreeMap<String, String>) -> Option<PathBuf> {
    let folder = kind.library_folder()?;
    let mut path = PathBuf::from(folder);

    match kind {
        MediaKind::Movie => {
            let title = value(metadata, keys::TITLE)?;
            let mut name = sanitize_filename(title);
            if let Some(year) = value(metadata, keys::YEAR) {
                name.push_str(&format!(" ({})", year));
            }
            let tag = source_tag(kind, metadata);
            name.push_str(&format!(" [{}].mkv", sanitize_filename(&tag)));
            path.push(name);
        }
        MediaKind::TvShow => {
            let show = sanitize_filename(value(metadata, keys::SHOW)?);
            let season = number(metadata, keys::SEASON).unwrap_or(1);
            let episode = number(metadata, keys::EPISODE).unwrap_or(1);
            let mut name = format!("{} S{:02}E{:02}", show, season, episode);
            if let Some(title) = value(metadata, keys::EPISODE_TITLE) {
                name.push_str(&format!(" - {}", sanitize_filename(title)));
            }
            let tag = source_tag(kind, metadata);
            name.push_str(&format!(" [{}].mkv", sanitize_filename(&tag)));
            path.push(&show);
            path.push(format!("Season {:02}", season));
            path.push(name);
        }
        MediaKind::Audiobook => {
            let title = sanitize_filename(value(metadata, keys::TITLE)?);
            let mut name = String::new();
            if let (Some(series), Some(index)) =
                (value(metadata, keys::SERIES), value(metadata, keys::SERIES_INDEX))
            {
                name.push_str(&format!("{} Book {}, ", sanitize_filename(series), index));
            }
            name.push_str(&title);
            if let Some(author) = value(metadata, keys::AUTHOR) {
                name.push_str(&format!(" - {}", sanitize_filename(author)));
            }
            name.push_str(".m4b");
            path.push(name);
        }
        MediaKind::Unknown => return None,
    }
    Some(path)
}

pub(super) fn run(item: &MediaItem, ctx: &StageContext<'_>) -> StageResult<StageOutput> {
    let relative = library_path(item.kind(), item.metadata()).ok_or_else(|| {
        StageError::permanent(Stage::Tag, "not enough metadata to name the output")
    })?;
    let destination = ctx.config.output_path.join(&relative);

    if !item.dry_run() {
        reserve_output(item, ctx, &destination, Stage::Tag)?;
    }

    let mut metadata = BTreeMap::new();
    metadata.insert(
        keys::OUTPUT_PATH.to_string(),
        destination.to_string_lossy().into_owned(),
    );
    let changes = StageChanges {
        metadata,
        ..StageChanges::default()
    };

    if item.kind() != MediaKind::Audiobook {
        let summary = format!("output named {}", relative.display());
        let output = StageOutput::new(summary).with_changes(changes);
        return Ok(if item.dry_run() {
            output.with_plan(vec![format!("name output {}", destination.display())])
        } else {
            output
        });
    }

    let request = tag_request(item, &destination)?;
    if item.dry_run() {
        let plan = vec![
            format!("tag {} -> {}", item.source_path().display(), destination.display()),
            format!("args: {}", request.args.join(" ")),
        ];
        return Ok(StageOutput::new(format!("would tag as {}", relative.display()))
            .with_plan(plan)
            .with_changes(changes));
    }

    create_parent_dir(&destination, Stage::Tag)?;
    if let Err(err) = ctx.invoke(Stage::Tag, &ctx.adapter.tools().tagger, request) {
        discard_output(&destination);
        return Err(err);
    }
    if !destination.exists() {
        return Err(StageError::permanent(
            Stage::Tag,
            format!("tagger reported success but {} is missing", destination.display()),
        ));
    }
    info!("{}: tagged into {}", item.display_name(), destination.display());

    Ok(StageOutput::new(format!("tagged as {}", relative.display())).with_changes(changes))
}

/// ffmpeg-style arguments: every part as input, concatenated, stream copy,
/// tags as `-metadata key=value`.
fn tag_request(item: &MediaItem, destination: &Path) -> StageResult<ToolRequest> {
    let parts = audiobook_parts(item, Stage::Tag)?;
    let mut request = ToolRequest::new("tag");
    for part in &parts {
        request = request.arg("-i").arg(path_arg(part));
    }
    if parts.len() > 1 {
        request = request
            .arg("-filter_complex")
            .arg(format!("concat=n={}:v=0:a=1", parts.len()));
    } else {
        request = request.args(["-c", "copy"]);
    }

    let tags = [
        ("title", keys::TITLE),
        ("artist", keys::AUTHOR),
        ("album", keys::SERIES),
        ("track", keys::SERIES_INDEX),
    ];
    for (tag, key) in tags {
        if let Some(v) = value(item.metadata(), key) {
            request = request.arg("-metadata").arg(format!("{}={}", tag, v));
        }
    }
    Ok(request.arg(path_arg(destination)).output(destination.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn movie_layout() {
        let m = meta(&[
            ("title", "Heat"),
            ("year", "1995"),
            ("suffix", "Bluray Ultrawide"),
            ("source_format", "Bluray"),
        ]);
        assert_eq!(
            library_path(MediaKind::Movie, &m).unwrap(),
            PathBuf::from("Movies/Heat (1995) [Bluray Ultrawide].mkv")
        );
    }

    #[test]
    fn movie_without_suffix_gets_source_and_aspect() {
        let m = meta(&[("title", "Ronin"), ("year", "1998"), ("source_format", "DVD")]);
        assert_eq!(
            library_path(MediaKind::Movie, &m).unwrap(),
            PathBuf::from("Movies/Ronin (1998) [DVD Widescreen].mkv")
        );

        let m = meta(&[("title", "Ronin"), ("source_format", "Temp"), ("aspect", "Fullscreen")]);
        assert_eq!(
            library_path(MediaKind::Movie, &m).unwrap(),
            PathBuf::from("Movies/Ronin [Temp Fullscreen].mkv")
        );
    }

    #[test]
    fn show_layout() {
        let m = meta(&[
            ("show", "Breaking Bad"),
            ("season", "1"),
            ("episode", "3"),
            ("episode_title", "And the Bag's in the River"),
            ("source_format", "DVD"),
        ]);
        assert_eq!(
            library_path(MediaKind::TvShow, &m).unwrap(),
            PathBuf::from("Shows/Breaking Bad/Season 01")
                .join("Breaking Bad S01E03 - And the Bag's in the River [DVD].mkv")
        );
    }

    #[test]
    fn audiobook_layout() {
        let m = meta(&[
            ("title", "Dune Messiah"),
            ("author", "Frank Herbert"),
            ("series", "Dune"),
            ("series_index", "2"),
        ]);
        assert_eq!(
            library_path(MediaKind::Audiobook, &m).unwrap(),
            PathBuf::from("Audiobooks/Dune Book 2, Dune Messiah - Frank Herbert.m4b")
        );
    }

    #[test]
    fn missing_title_or_unknown_kind_has_no_layout() {
        assert!(library_path(MediaKind::Movie, &meta(&[("year", "1995")])).is_none());
        assert!(library_path(MediaKind::Unknown, &meta(&[("title", "x")])).is_none());
    }
}
