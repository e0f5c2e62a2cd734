//! Mux: remuxes the video and its subtitle tracks into the final container.

use super::{
    StageContext, StageOutput, create_parent_dir, discard_output, keys, media_file, path_arg,
    reserve_output,
};
use crate::error::{StageError, StageResult};
use crate::external::ToolRequest;
use crate::media::{MediaItem, Stage, StageChanges, SubtitleTrack, SubtitleVariant};

use log::info;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn track_name(track: &SubtitleTrack) -> String {
    match track.variant {
        SubtitleVariant::Normal => track.language.clone(),
        SubtitleVariant::Forced => format!("{} (Forced)", track.language),
        SubtitleVariant::Sdh => format!("{} (SDH)", track.language),
    }
}

/// mkvmerge-style arguments for the final container.
fn mux_request(item: &MediaItem, video: &Path, destination: &Path) -> ToolRequest {
    let mut request = ToolRequest::new("mux").arg("-o").arg(path_arg(destination));
    if let Some(title) = item.metadata_value(keys::TITLE).or(item.metadata_value(keys::SHOW)) {
        request = request.arg("--title").arg(title);
    }
    request = request.arg(path_arg(video));

    for (index, track) in item.subtitle_tracks().iter().enumerate() {
        request = request
            .arg("--language")
            .arg(format!("0:{}", track.language))
            .arg("--track-name")
            .arg(format!("0:{}", track_name(track)))
            .arg("--forced-display-flag")
            .arg(format!("0:{}", if track.forced { "yes" } else { "no" }))
            .arg("--default-track-flag")
            .arg(format!("0:{}", if index == 0 && !track.forced { "yes" } else { "no" }))
            .arg(path_arg(&track.path));
    }
    request.output(destination.to_path_buf())
}

pub(super) fn run(item: &MediaItem, ctx: &StageContext<'_>) -> StageResult<StageOutput> {
    let destination = item
        .metadata_value(keys::OUTPUT_PATH)
        .map(PathBuf::from)
        .ok_or_else(|| StageError::permanent(Stage::Mux, "no output path was decided"))?;
    let video = media_file(item);
    let request = mux_request(item, &video, &destination);
    let tracks = item.subtitle_tracks().len();

    if item.dry_run() {
        let plan = vec![
            format!(
                "mux {} + {} subtitle track(s) -> {}",
                video.display(),
                tracks,
                destination.display()
            ),
            format!("args: {}", request.args.join(" ")),
        ];
        return Ok(StageOutput::new(format!("would mux into {}", destination.display()))
            .with_plan(plan));
    }

    if !video.exists() {
        return Err(StageError::permanent(
            Stage::Mux,
            format!("{} disappeared before muxing", video.display()),
        ));
    }
    if let Some(missing) = item.subtitle_tracks().iter().find(|t| !t.path.exists()) {
        return Err(StageError::permanent(
            Stage::Mux,
            format!("subtitle track {} is missing", missing.path.display()),
        ));
    }

    reserve_output(item, ctx, &destination, Stage::Mux)?;
    create_parent_dir(&destination, Stage::Mux)?;
    if let Err(err) = ctx.invoke(Stage::Mux, &ctx.adapter.tools().remux, request) {
        discard_output(&destination);
        return Err(err);
    }
    if !destination.exists() {
        return Err(StageError::permanent(
            Stage::Mux,
            format!("remuxer reported success but {} is missing", destination.display()),
        ));
    }
    info!("{}: muxed into {}", item.display_name(), destination.display());

    let mut metadata = BTreeMap::new();
    metadata.insert(
        keys::MUXED_PATH.to_string(),
        destination.to_string_lossy().into_owned(),
    );
    Ok(
        StageOutput::new(format!("muxed with {} subtitle track(s)", tracks)).with_changes(
            StageChanges {
                metadata,
                ..StageChanges::default()
            },
        ),
    )
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
    fn forced_tracks_are_flagged_in_args() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let adapter = test_support::adapter(ToolSet::simulated());
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let input = dir.path().join("in");
        let video = input.join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        fs::write(input.join("Heat.1995.forced.srt"), "1\n").unwrap();

        let mut item = test_support::item(&video, MediaKind::Movie, false);
        test_support::advance(&mut item, &ctx, Stage::Mux);

        let request = mux_request(&item, &video, Path::new("/lib/out.mkv"));
        let args = request.args.join(" ");
        assert!(args.starts_with("-o /lib/out.mkv --title Heat"));
        assert!(args.contains("--forced-display-flag 0:yes"));
        assert!(args.contains("--track-name 0:eng (Forced)"));
    }

    #[test]
    fn remux_failure_is_permanent_and_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let mut tools = ToolSet::simulated();
        tools.remux = Arc::new(
            ScriptedTool::new(ToolKind::Remux)
                .then(ScriptedOutcome::Permanent("bad stream".into())),
        );
        let adapter = test_support::adapter(tools);
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let video = dir.path().join("in").join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        let mut item = test_support::item(&video, MediaKind::Movie, false);
        test_support::advance(&mut item, &ctx, Stage::Mux);

        let err = run(&item, &ctx).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.message.contains("bad stream"));
        let destination = item.metadata_value(keys::OUTPUT_PATH).unwrap();
        assert!(!Path::new(destination).exists());
    }
}
