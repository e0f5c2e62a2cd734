//! Trash: relocates the consumed source, its sidecars and the item's working
//! artifacts into the trash directory.

use super::{StageContext, StageOutput};
use crate::config::WORK_DIR_NAME;
use crate::error::{StageError, StageResult};
use crate::media::{MediaItem, Stage};
use crate::safety;
use crate::utils::unique_destination;

use log::{debug, info};

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Paths the item leaves behind, in move order. Every one has passed the
/// safety check for its zone.
fn trash_candidates(item: &MediaItem, ctx: &StageContext<'_>) -> StageResult<Vec<PathBuf>> {
    let config = ctx.config;
    let source_roots = config.effective_safe_roots();
    let work_roots = vec![config.output_path.join(WORK_DIR_NAME)];

    let mut candidates: Vec<(PathBuf, &[PathBuf])> =
        vec![(item.source_path().to_path_buf(), source_roots.as_slice())];
    for track in item.subtitle_tracks() {
        if let Some(origin) = &track.origin {
            // Sidecars inside a trashed folder travel with it.
            if !origin.starts_with(item.source_path()) {
                candidates.push((origin.clone(), source_roots.as_slice()));
            }
        }
    }
    for artifact in item.artifacts() {
        candidates.push((artifact.clone(), work_roots.as_slice()));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for (path, roots) in candidates {
        if paths.contains(&path) {
            continue;
        }
        if !path.exists() {
            debug!("Nothing to trash at {}", path.display());
            continue;
        }
        if let Some(reason) = safety::rejection_reason(&path, roots) {
            return Err(StageError::permanent(
                Stage::Trash,
                format!("refusing to trash {}: {}", path.display(), reason),
            ));
        }
        paths.push(path);
    }
    Ok(paths)
}

fn file_name(path: &Path) -> StageResult<PathBuf> {
    path.file_name().map(PathBuf::from).ok_or_else(|| {
        StageError::permanent(Stage::Trash, format!("{} has no file name", path.display()))
    })
}

/// Moves `from` to `to` without ever replacing an existing `to`. Files go
/// through a hard link, or a create-new copy on another filesystem.
fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_dir() {
        if to.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", to.display()),
            ));
        }
        return fs::rename(from, to);
    }

    match fs::hard_link(from, to) {
        Ok(()) => fs::remove_file(from),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            debug!("Linking {} failed ({}), copying instead", from.display(), e);
            let mut source = File::open(from)?;
            let mut target = OpenOptions::new().write(true).create_new(true).open(to)?;
            io::copy(&mut source, &mut target)?;
            target.set_permissions(source.metadata()?.permissions())?;
            drop(target);
            fs::remove_file(from)
        }
    }
}

pub(super) fn run(item: &MediaItem, ctx: &StageContext<'_>) -> StageResult<StageOutput> {
    let sources = trash_candidates(item, ctx)?;
    let trash = &ctx.config.trash_path;

    if item.dry_run() {
        let mut planned: Vec<PathBuf> = Vec::new();
        let mut plan = Vec::new();
        for source in &sources {
            let to = unique_destination(trash, &file_name(source)?, |p| {
                planned.iter().any(|taken| taken.as_path() == p)
            });
            plan.push(format!("trash {} -> {}", source.display(), to.display()));
            planned.push(to);
        }
        let summary = format!("would trash {} path(s)", sources.len());
        return Ok(StageOutput::new(summary).with_plan(plan));
    }

    fs::create_dir_all(trash).map_err(|e| {
        StageError::io(Stage::Trash, &format!("cannot create {}", trash.display()), e)
    })?;

    let mut moved = 0;
    for source in &sources {
        let to = ctx.claims.claim_unique(trash, &file_name(source)?, item.id());
        relocate(source, &to).map_err(|e| {
            StageError::io(
                Stage::Trash,
                &format!("cannot move {} to {}", source.display(), to.display()),
                e,
            )
        })?;
        debug!("Trashed {} -> {}", source.display(), to.display());
        moved += 1;
    }

    // Leftover empty working directory; failure here is harmless.
    let _ = fs::remove_dir(ctx.config.work_dir_for(item.id()));

    info!("{}: moved {} path(s) to trash", item.display_name(), moved);
    Ok(StageOutput::new(format!("moved {} path(s) to trash", moved)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ToolSet;
    use crate::media::MediaKind;
    use crate::stages::test_support;
    use std::fs;

    #[test]
    fn source_sidecars_and_artifacts_are_moved() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let adapter = test_support::adapter(ToolSet::simulated());
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let input = dir.path().join("in");
        let video = input.join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        fs::write(input.join("Heat.1995.srt"), "Hi.\n").unwrap();
        // A previous run left a same-named file in the trash.
        fs::create_dir_all(&config.trash_path).unwrap();
        fs::write(config.trash_path.join("Heat.1995.mkv"), b"old").unwrap();

        let mut item = test_support::item(&video, MediaKind::Movie, false);
        test_support::advance(&mut item, &ctx, Stage::Trash);
        run(&item, &ctx).unwrap();

        assert!(!video.exists());
        assert!(!input.join("Heat.1995.srt").exists());
        assert!(config.trash_path.join("Heat.1995_1.mkv").exists());
        assert!(config.trash_path.join("Heat.1995.srt").exists());
        // Cleaned copy collides with the sidecar's name.
        assert!(config.trash_path.join("Heat.1995_1.srt").exists());
        assert!(!config.work_dir_for(item.id()).exists());
    }

    #[test]
    fn paths_outside_safe_roots_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_support::config(dir.path());
        let elsewhere = tempfile::tempdir().unwrap();
        config.safe_roots = vec![elsewhere.path().to_path_buf()];
        let adapter = test_support::adapter(ToolSet::simulated());
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let video = dir.path().join("in").join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        let item = test_support::item(&video, MediaKind::Movie, false);

        let err = run(&item, &ctx).unwrap_err();
        assert!(!err.is_retryable());
        assert!(video.exists());
    }

    #[test]
    fn dry_run_plans_without_moving() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let adapter = test_support::adapter(ToolSet::simulated());
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let video = dir.path().join("in").join("Heat.1995.mkv");
        fs::write(&video, b"v").unwrap();
        let item = test_support::item(&video, MediaKind::Movie, true);

        let output = run(&item, &ctx).unwrap();
        let plan = output.plan.unwrap();
        assert_eq!(plan.len(), 1);
        assert!(plan[0].starts_with("trash "));
        assert!(video.exists());
        assert!(!config.trash_path.exists());
    }
}
