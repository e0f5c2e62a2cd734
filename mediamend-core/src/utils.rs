//! Utility functions for formatting and file naming.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Formats a duration as HH:MM:SS (e.g., 3725s -> "01:02:05").
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Removes characters that are illegal in file names on common filesystems
/// and collapses runs of whitespace.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Picks a destination for `file_name` inside `dir` that does not exist yet,
/// appending `_1`, `_2`, ... to the stem on collision. `is_taken` reports
/// destinations already claimed but not yet written.
#[must_use]
pub fn unique_destination(
    dir: &Path,
    file_name: &Path,
    is_taken: impl Fn(&Path) -> bool,
) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() && !is_taken(&candidate) {
        return candidate;
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() && !is_taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(format_duration(Duration::ZERO), "00:00:00");
    }

    #[test]
    fn sanitize_strips_illegal_characters() {
        assert_eq!(sanitize_filename("AC/DC: Live?  "), "ACDC Live");
        assert_eq!(sanitize_filename("Heat (1995)"), "Heat (1995)");
    }

    #[test]
    fn unique_destination_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("movie.mkv"), b"x").unwrap();

        let first = unique_destination(dir.path(), Path::new("movie.mkv"), |_| false);
        assert_eq!(first, dir.path().join("movie_1.mkv"));

        let second =
            unique_destination(dir.path(), Path::new("movie.mkv"), |p| p == first.as_path());
        assert_eq!(second, dir.path().join("movie_2.mkv"));

        let fresh = unique_destination(dir.path(), Path::new("other.srt"), |_| false);
        assert_eq!(fresh, dir.path().join("other.srt"));
    }
}
