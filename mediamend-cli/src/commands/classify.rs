//! Implementation of the 'classify' subcommand.

use crate::cli::ClassifyArgs;
use crate::output::styling;

use mediamend_core::{MediaKind, classify, parse_filename};

use console::style;
use serde_json::json;

/// One line (or JSON object) per path describing its classification.
pub fn describe(path: &std::path::Path, as_json: bool) -> String {
    let item = classify(path);
    let info = parse_filename(path);

    if as_json {
        return json!({
            "path": path.display().to_string(),
            "kind": item.kind(),
            "note": item.note(),
            "filename": info,
        })
        .to_string();
    }

    let mut details = Vec::new();
    if let Some(title) = &info.title {
        details.push(format!("title={}", title));
    }
    if let Some(year) = info.year {
        details.push(format!("year={}", year));
    }
    if let (Some(season), Some(episode)) = (info.season, info.episode) {
        details.push(format!("S{:02}E{:02}", season, episode));
    }
    if let Some(note) = item.note() {
        details.push(format!("({})", note));
    }

    let kind = format!("{:<9}", item.kind().to_string());
    let kind = if item.kind() == MediaKind::Unknown {
        style(kind).yellow()
    } else {
        style(kind).green()
    };
    format!(
        "{}{} {} {}",
        styling::STATUS_INDENT,
        kind,
        style(path.display()).bold(),
        style(details.join(" ")).dim()
    )
}

pub fn run_classify(args: &ClassifyArgs) {
    for path in &args.paths {
        println!("{}", describe(path, args.json));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_description_carries_kind_and_filename_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Show.Name.S01E02.mkv");
        std::fs::write(&path, b"v").unwrap();

        let value: serde_json::Value = serde_json::from_str(&describe(&path, true)).unwrap();
        assert_eq!(value["kind"], "TvShow");
        assert_eq!(value["filename"]["season"], 1);
        assert_eq!(value["filename"]["episode"], 2);
    }

    #[test]
    fn missing_paths_are_unknown() {
        let line = describe(std::path::Path::new("/definitely/not/here.mkv"), false);
        assert!(console::strip_ansi_codes(&line).contains("Unknown"));
    }
}
