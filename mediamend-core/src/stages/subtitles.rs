//! CleanSubtitles: finds sidecar subtitles, strips branding lines and falls
//! back to transcription when nothing usable exists.

use super::{StageContext, StageOutput, media_file, path_arg};
use crate::classify;
use crate::error::{StageError, StageResult};
use crate::external::ToolRequest;
use crate::media::{MediaItem, Stage, StageChanges, SubtitleSource, SubtitleTrack, SubtitleVariant};

use log::{debug, info};
use strsim::normalized_levenshtein;

use std::path::{Path, PathBuf};

/// Minimum name similarity between a video and its sidecar.
const MATCH_THRESHOLD: f64 = 0.75;

/// Word groups that mark a line as release-group branding when all of the
/// group's words appear in it.
const BRANDING_PATTERNS: &[&[&str]] = &[
    &["sync", "by"],
    &["addic7ed"],
    &["subscene"],
    &["corrected", "by"],
    &["downloaded", "from"],
    &["yts"],
    &["opensubtitle"],
    &["ripped", "by"],
    &["encoded", "by"],
    &["provided", "by"],
    &["captioned", "by"],
    &["www"],
    &["com"],
    &["subtitle", "by"],
    &["subtitled", "by"],
    &["improved", "by"],
    &["explosiveskull"],
    &["©"],
];

/// Two-letter codes seen in sidecar names and their three-letter forms.
const LANGUAGE_CODES: &[(&str, &str)] = &[
    ("en", "eng"),
    ("es", "spa"),
    ("fr", "fre"),
    ("de", "ger"),
    ("it", "ita"),
    ("pt", "por"),
    ("nl", "dut"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("zh", "chi"),
    ("ru", "rus"),
    ("sv", "swe"),
];

fn normalize_line(line: &str) -> String {
    line.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect::<String>()
}

/// Whether a subtitle line is release-group branding.
pub fn is_branding_line(line: &str) -> bool {
    let normalized = normalize_line(line);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }
    BRANDING_PATTERNS.iter().any(|group| {
        group.iter().all(|needle| {
            // Short needles match whole words only ("by" vs "baby").
            if needle.chars().count() <= 3 {
                words.contains(needle)
            } else {
                normalized.contains(needle)
            }
        })
    })
}

/// Removes branding lines. Returns the cleaned text and how many lines went.
pub fn clean_subtitle_text(text: &str) -> (String, usize) {
    let mut removed = 0;
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let branding = is_branding_line(line);
            if branding {
                removed += 1;
            }
            !branding
        })
        .collect();
    let mut cleaned = kept.join("\n");
    if text.ends_with('\n') {
        cleaned.push('\n');
    }
    (cleaned, removed)
}

/// Language and variant from the dotted tokens after the video stem, e.g.
/// `Movie.en.forced.srt`.
fn describe_sidecar(sidecar: &Path, default_language: &str) -> (String, SubtitleVariant) {
    let name = sidecar
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let tokens: Vec<&str> = name.split(['.', '_', '-', ' ']).collect();

    let variant = if tokens.contains(&"forced") {
        SubtitleVariant::Forced
    } else if tokens.iter().any(|t| *t == "sdh" || *t == "hi" || *t == "cc") {
        SubtitleVariant::Sdh
    } else {
        SubtitleVariant::Normal
    };

    let language = tokens
        .iter()
        .rev()
        .find_map(|token| language_code(token))
        .unwrap_or_else(|| default_language.to_string());

    (language, variant)
}

fn language_code(token: &str) -> Option<String> {
    if let Some((_, long)) = LANGUAGE_CODES.iter().find(|(short, _)| *short == token) {
        return Some((*long).to_string());
    }
    LANGUAGE_CODES
        .iter()
        .find(|(_, long)| *long == token)
        .map(|(_, long)| (*long).to_string())
}

/// Sidecar stem with language/variant tokens removed, for fuzzy matching.
fn base_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mut parts: Vec<&str> = stem.split('.').collect();
    while parts.len() > 1 {
        let last = parts[parts.len() - 1];
        let is_tag =
            matches!(last, "forced" | "sdh" | "hi" | "cc") || language_code(last).is_some();
        if !is_tag {
            break;
        }
        parts.pop();
    }
    parts.join(".")
}

/// Sidecars next to `video` whose names match it closely enough, smallest
/// first.
pub(crate) fn find_sidecars(video: &Path) -> Vec<PathBuf> {
    let Some(folder) = video.parent() else {
        return Vec::new();
    };
    let video_stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let Ok(files) = classify::folder_files(folder) else {
        return Vec::new();
    };
    let mut candidates: Vec<PathBuf> = files
        .into_iter()
        .filter(|f| classify::is_subtitle_file(f))
        .filter(|f| !f.to_string_lossy().to_lowercase().contains("sample"))
        .filter(|f| normalized_levenshtein(&video_stem, &base_stem(f)) >= MATCH_THRESHOLD)
        .collect();
    candidates.sort_by_key(|f| std::fs::metadata(f).map(|m| m.len()).unwrap_or(0));
    candidates
}

pub(super) fn run(item: &MediaItem, ctx: &StageContext<'_>) -> StageResult<StageOutput> {
    let video = media_file(item);
    let languages = &ctx.config.subtitle_languages;
    let primary = ctx.config.primary_language().to_string();
    let work_dir = ctx.config.work_dir_for(item.id());

    let mut tracks: Vec<SubtitleTrack> = Vec::new();
    let mut artifacts = Vec::new();
    let mut plan = Vec::new();

    for sidecar in find_sidecars(&video) {
        let (language, variant) = describe_sidecar(&sidecar, &primary);
        if !languages.is_empty() && !languages.contains(&language) {
            debug!("Ignoring {} sidecar {}", language, sidecar.display());
            continue;
        }
        if tracks.iter().any(|t| t.language == language && t.variant == variant) {
            continue;
        }

        let raw = std::fs::read(&sidecar).map_err(|e| {
            StageError::io(Stage::CleanSubtitles, &format!("cannot read {}", sidecar.display()), e)
        })?;
        let (cleaned, removed) = clean_subtitle_text(&String::from_utf8_lossy(&raw));
        let file_name = sidecar.file_name().map(PathBuf::from).unwrap_or_default();
        let cleaned_path = work_dir.join(file_name);

        if item.dry_run() {
            plan.push(format!(
                "clean {} ({} branding line(s)) -> {}",
                sidecar.display(),
                removed,
                cleaned_path.display()
            ));
        } else {
            super::create_parent_dir(&cleaned_path, Stage::CleanSubtitles)?;
            std::fs::write(&cleaned_path, cleaned).map_err(|e| {
                StageError::io(
                    Stage::CleanSubtitles,
                    &format!("cannot write {}", cleaned_path.display()),
                    e,
                )
            })?;
            artifacts.push(cleaned_path.clone());
        }

        tracks.push(SubtitleTrack {
            path: cleaned_path,
            origin: Some(sidecar),
            language,
            forced: variant == SubtitleVariant::Forced,
            variant,
            source: SubtitleSource::Sidecar,
            removed_lines: removed,
        });
    }

    if tracks.is_empty() && ctx.config.allow_transcription {
        let track = transcribe(item, ctx, &video, &work_dir, &primary, &mut plan, &mut artifacts)?;
        tracks.push(track);
    }

    let summary = match tracks.len() {
        0 => "no subtitles found".to_string(),
        n => {
            let removed: usize = tracks.iter().map(|t| t.removed_lines).sum();
            format!("{} subtitle track(s), {} branding line(s) removed", n, removed)
        }
    };
    info!("{}: {}", item.display_name(), summary);

    let output = StageOutput::new(summary).with_changes(StageChanges {
        subtitle_tracks: Some(tracks),
        artifacts,
        ..StageChanges::default()
    });
    Ok(if item.dry_run() { output.with_plan(plan) } else { output })
}

fn transcribe(
    item: &MediaItem,
    ctx: &StageContext<'_>,
    video: &Path,
    work_dir: &Path,
    language: &str,
    plan: &mut Vec<String>,
    artifacts: &mut Vec<PathBuf>,
) -> StageResult<SubtitleTrack> {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| item.id().to_string());
    let target = work_dir.join(format!("{}.srt", stem));

    let track = SubtitleTrack {
        path: target.clone(),
        origin: None,
        language: language.to_string(),
        forced: false,
        variant: SubtitleVariant::Normal,
        source: SubtitleSource::Transcribed,
        removed_lines: 0,
    };

    if item.dry_run() {
        plan.push(format!("transcribe {} -> {}", video.display(), target.display()));
        return Ok(track);
    }

    super::create_parent_dir(&target, Stage::CleanSubtitles)?;
    let request = ToolRequest::new("transcribe")
        .args([
            path_arg(video),
            "--language".to_string(),
            language.to_string(),
            "--output_format".to_string(),
            "srt".to_string(),
            "--output_dir".to_string(),
            path_arg(work_dir),
        ])
        .output(target.clone());
    let tools = ctx.adapter.tools();
    let stdout = ctx.invoke(Stage::CleanSubtitles, &tools.transcription, request)?;

    // Some transcribers print the subtitles instead of writing them.
    if !target.exists() {
        if !stdout.contains("-->") {
            return Err(StageError::permanent(
                Stage::CleanSubtitles,
                format!("transcription produced no subtitles for {}", video.display()),
            ));
        }
        std::fs::write(&target, stdout).map_err(|e| {
            StageError::io(Stage::CleanSubtitles, &format!("cannot write {}", target.display()), e)
        })?;
    }
    artifacts.push(target);
    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ScriptedOutcome, ScriptedTool, ToolKind, ToolSet};
    use crate::media::MediaKind;
    use crate::stages::test_support;
    use std::fs;
    use std::sync::Arc;

    #[test]
    fn branding_lines_are_detected() {
        assert!(is_branding_line("Sync & corrected by explosiveskull"));
        assert!(is_branding_line("Downloaded from YTS.MX"));
        assert!(is_branding_line("www.addic7ed.com"));
        assert!(!is_branding_line("Welcome home, John."));
        assert!(!is_branding_line("By the river."));
        assert!(!is_branding_line(""));
    }

    #[test]
    fn cleaning_counts_removed_lines() {
        let text = concat!(
            "1\n00:00:01,000 --> 00:00:02,000\nHello.\n\n",
            "2\n00:00:03,000 --> 00:00:04,000\nSubtitles by OpenSubtitles.org\n",
        );
        let (cleaned, removed) = clean_subtitle_text(text);
        assert_eq!(removed, 1);
        assert!(cleaned.contains("Hello."));
        assert!(!cleaned.contains("OpenSubtitles"));
        assert!(cleaned.ends_with('\n'));
    }

    #[test]
    fn sidecar_descriptions() {
        assert_eq!(
            describe_sidecar(Path::new("Movie.en.forced.srt"), "eng"),
            ("eng".to_string(), SubtitleVariant::Forced)
        );
        assert_eq!(
            describe_sidecar(Path::new("Movie.spa.sdh.srt"), "eng"),
            ("spa".to_string(), SubtitleVariant::Sdh)
        );
        assert_eq!(
            describe_sidecar(Path::new("Movie.srt"), "eng"),
            ("eng".to_string(), SubtitleVariant::Normal)
        );
    }

    #[test]
    fn sidecars_are_matched_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        fs::write(dir.path().join("Heat.1995.en.srt"), b"s").unwrap();
        fs::write(dir.path().join("Heat.1995.forced.srt"), b"s").unwrap();
        fs::write(dir.path().join("Completely Different.srt"), b"s").unwrap();

        let found = find_sidecars(&video);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn sidecars_are_cleaned_into_the_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let adapter = test_support::adapter(ToolSet::simulated());
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let input = dir.path().join("in");
        let video = input.join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        fs::write(input.join("Heat.1995.srt"), "Hi.\nSync by someone\n").unwrap();

        let item = test_support::item(&video, MediaKind::Movie, false);
        let output = run(&item, &ctx).unwrap();

        let tracks = output.changes.subtitle_tracks.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].removed_lines, 1);
        assert_eq!(tracks[0].source, SubtitleSource::Sidecar);
        assert!(tracks[0].path.starts_with(config.work_dir_for(item.id())));
        assert_eq!(fs::read_to_string(&tracks[0].path).unwrap(), "Hi.\n");
        assert_eq!(output.changes.artifacts, vec![tracks[0].path.clone()]);
    }

    #[test]
    fn missing_subtitles_fall_back_to_transcription() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let adapter = test_support::adapter(ToolSet::simulated());
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let video = dir.path().join("in").join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        let item = test_support::item(&video, MediaKind::Movie, false);

        let tracks = run(&item, &ctx).unwrap().changes.subtitle_tracks.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].source, SubtitleSource::Transcribed);
        assert!(tracks[0].path.exists());
    }

    #[test]
    fn transcription_timeout_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let mut tools = ToolSet::simulated();
        tools.transcription = Arc::new(
            ScriptedTool::new(ToolKind::Transcription).then(ScriptedOutcome::Timeout),
        );
        let adapter = test_support::adapter(tools);
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let video = dir.path().join("in").join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        let item = test_support::item(&video, MediaKind::Movie, false);

        let err = run(&item, &ctx).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let adapter = test_support::adapter(ToolSet::simulated());
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let input = dir.path().join("in");
        let video = input.join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        fs::write(input.join("Heat.1995.srt"), "Hi.\n").unwrap();

        let item = test_support::item(&video, MediaKind::Movie, true);
        let output = run(&item, &ctx).unwrap();
        assert!(output.plan.is_some());
        assert!(output.changes.artifacts.is_empty());
        assert!(!config.output_path.exists());
    }
}
