//! FetchMetadata: asks the metadata provider about the item and merges the
//! answer into the item's metadata.

use super::{StageContext, StageOutput, keys};
use crate::error::{StageError, StageResult};
use crate::external::ToolRequest;
use crate::media::{MediaItem, MediaKind, Stage, StageChanges};

use log::{debug, info};
use serde_json::Value;

use std::collections::BTreeMap;

const MOVIE_QUERY: &[&str] = &[keys::TITLE, keys::YEAR];
const TV_QUERY: &[&str] = &[
    keys::SHOW,
    keys::SEASON,
    keys::EPISODE,
    keys::EPISODE_TITLE,
    keys::YEAR,
];
const BOOK_QUERY: &[&str] = &[keys::TITLE, keys::AUTHOR, keys::SERIES];

/// Lookup operation and query keys for each kind.
fn query_keys(kind: MediaKind) -> (&'static str, &'static [&'static str]) {
    match kind {
        MediaKind::TvShow => ("tv", TV_QUERY),
        MediaKind::Audiobook => ("book", BOOK_QUERY),
        _ => ("movie", MOVIE_QUERY),
    }
}

/// Flattens a provider answer into string metadata. Nested values are
/// ignored; string lists are joined.
fn flatten_answer(answer: &str) -> StageResult<BTreeMap<String, String>> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Ok(BTreeMap::new());
    }
    let value: Value = serde_json::from_str(answer).map_err(|e| {
        StageError::permanent(
            Stage::FetchMetadata,
            format!("metadata provider returned malformed JSON: {}", e),
        )
    })?;
    let Value::Object(map) = value else {
        return Err(StageError::permanent(
            Stage::FetchMetadata,
            "metadata provider did not return an object",
        ));
    };

    let mut flat = BTreeMap::new();
    for (key, value) in map {
        let text = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Null | Value::Object(_) => continue,
        };
        flat.insert(key, text);
    }
    Ok(flat)
}

pub(super) fn run(item: &MediaItem, ctx: &StageContext<'_>) -> StageResult<StageOutput> {
    let (operation, query) = query_keys(item.kind());
    let args: Vec<String> = query
        .iter()
        .filter_map(|key| {
            item.metadata_value(key)
                .map(|value| format!("{}={}", key, value))
        })
        .collect();
    if args.is_empty() {
        return Err(StageError::permanent(
            Stage::FetchMetadata,
            "nothing to look up: the item has no title",
        ));
    }

    debug!("Looking up {} {:?}", operation, args);
    let request = ToolRequest::new(operation).args(args);
    let answer = ctx.invoke(Stage::FetchMetadata, &ctx.adapter.tools().metadata, request)?;
    let metadata = flatten_answer(&answer)?;

    let summary = if metadata.is_empty() {
        "no provider match, keeping filename metadata".to_string()
    } else {
        format!("{} field(s) from provider", metadata.len())
    };
    info!("{}: {}", item.display_name(), summary);

    Ok(StageOutput::new(summary).with_changes(StageChanges {
        metadata,
        ..StageChanges::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{FilenameMetadataTool, ScriptedOutcome, ScriptedTool, ToolKind, ToolSet};
    use crate::stages::test_support;
    use std::sync::Arc;

    #[test]
    fn answers_are_flattened() {
        let flat = flatten_answer(
            r#"{"title":"Heat","year":1995,"genres":["Crime","Drama"],
                "cast":{"lead":"x"},"tmdb":null}"#,
        )
        .unwrap();
        assert_eq!(flat["title"], "Heat");
        assert_eq!(flat["year"], "1995");
        assert_eq!(flat["genres"], "Crime, Drama");
        assert!(!flat.contains_key("cast"));
        assert!(!flat.contains_key("tmdb"));
        assert!(flatten_answer("").unwrap().is_empty());
    }

    #[test]
    fn malformed_answers_are_permanent() {
        assert!(!flatten_answer("not json").unwrap_err().is_retryable());
        assert!(flatten_answer("[1,2]").is_err());
    }

    fn movie_item(dir: &std::path::Path, ctx: &StageContext<'_>) -> MediaItem {
        let video = dir.join("in").join("heat.1995.mkv");
        std::fs::write(&video, b"v").unwrap();
        let mut item = test_support::item(&video, MediaKind::Movie, false);
        test_support::advance(&mut item, ctx, Stage::FetchMetadata);
        item
    }

    #[test]
    fn provider_answer_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let mut tools = ToolSet::simulated();
        tools.metadata = Arc::new(FilenameMetadataTool::new());
        let adapter = test_support::adapter(tools);
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let item = movie_item(dir.path(), &ctx);
        let output = run(&item, &ctx).unwrap();
        assert_eq!(output.changes.metadata["title"], "Heat");
        assert_eq!(output.changes.metadata["provider"], "filename-metadata");
    }

    #[test]
    fn provider_timeout_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path());
        let mut tools = ToolSet::simulated();
        tools.metadata = Arc::new(
            ScriptedTool::new(ToolKind::MetadataLookup).then(ScriptedOutcome::Timeout),
        );
        let adapter = test_support::adapter(tools);
        let ctx = StageContext::new(&config, &adapter, test_support::claims());

        let item = movie_item(dir.path(), &ctx);
        let err = run(&item, &ctx).unwrap_err();
        assert_eq!(err.stage, Stage::FetchMetadata);
        assert!(err.is_retryable());
    }
}
