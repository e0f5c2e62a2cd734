// ============================================================================
// mediamend-core/src/external/offline.rs
// ============================================================================
//
// OFFLINE METADATA: Lookup That Needs No Network Provider
//
// Answers metadata queries from the query itself: names are normalised to
// title case and echoed back. Used when no metadata command is configured.

use super::{ExternalTool, ToolFailure, ToolKind, ToolRequest};
use crate::error::CoreResult;

use serde_json::{Map, Value};

use std::time::Duration;

/// Query keys whose values are names and get title-cased.
const NAME_KEYS: &[&str] = &["title", "show", "episode_title", "author", "series"];

const SUPPORTED_OPERATIONS: &[&str] = &["movie", "tv", "book"];

#[derive(Debug, Clone, Default)]
pub struct FilenameMetadataTool;

impl FilenameMetadataTool {
    pub fn new() -> Self {
        Self
    }
}

impl ExternalTool for FilenameMetadataTool {
    fn kind(&self) -> ToolKind {
        ToolKind::MetadataLookup
    }

    fn name(&self) -> &str {
        "filename-metadata"
    }

    fn check_available(&self) -> CoreResult<()> {
        Ok(())
    }

    fn run(&self, request: &ToolRequest, _timeout: Duration) -> Result<String, ToolFailure> {
        if !SUPPORTED_OPERATIONS.contains(&request.operation.as_str()) {
            return Err(ToolFailure::permanent(format!(
                "unsupported lookup '{}'",
                request.operation
            )));
        }

        let mut answer = Map::new();
        for arg in &request.args {
            let Some((key, value)) = arg.split_once('=') else {
                continue;
            };
            let value = if NAME_KEYS.contains(&key) {
                title_case(value)
            } else {
                value.trim().to_string()
            };
            if !value.is_empty() {
                answer.insert(key.to_string(), Value::String(value));
            }
        }
        answer.insert("provider".to_string(), Value::String(self.name().to_string()));

        Ok(Value::Object(answer).to_string())
    }
}

/// Capitalises each word, keeping short joining words lower-case except at
/// the start.
fn title_case(text: &str) -> String {
    const SMALL_WORDS: &[&str] = &["a", "an", "and", "of", "the", "in", "on", "at", "to"];

    text.split_whitespace()
        .enumerate()
        .map(|(index, word)| {
            let lower = word.to_lowercase();
            if index > 0 && SMALL_WORDS.contains(&lower.as_str()) {
                return lower;
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_normalised_query() {
        let tool = FilenameMetadataTool::new();
        let request = ToolRequest::new("movie").args(["title=the lord OF the rings", "year=2001"]);
        let output = tool.run(&request, Duration::from_secs(1)).unwrap();

        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["title"], "The Lord of the Rings");
        assert_eq!(value["year"], "2001");
        assert_eq!(value["provider"], "filename-metadata");
    }

    #[test]
    fn rejects_unknown_operations() {
        let tool = FilenameMetadataTool::new();
        let failure = tool
            .run(&ToolRequest::new("podcast"), Duration::from_secs(1))
            .unwrap_err();
        assert!(!failure.transient);
    }
}
