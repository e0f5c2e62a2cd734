// ============================================================================
// mediamend-cli/src/tools.rs
// ============================================================================
//
// TOOL SELECTION: Maps command-line tool options to a core ToolSet

use crate::cli::ProcessArgs;

use mediamend_core::external::{
    CommandTool, ExternalTool, FilenameMetadataTool, ToolKind, ToolSet,
};

use std::sync::Arc;

/// ffprobe arguments printing the first video stream's width and height.
const INSPECT_ARGS: &[&str] = &[
    "-v",
    "error",
    "-select_streams",
    "v:0",
    "-show_entries",
    "stream=width,height",
    "-of",
    "default=noprint_wrappers=1:nokey=1",
];

/// Builds the tools a `process` run will use.
pub fn tool_set(args: &ProcessArgs) -> ToolSet {
    if args.simulate {
        return ToolSet::simulated();
    }

    let transcription = CommandTool::new(ToolKind::Transcription, args.transcriber.clone())
        .with_version_arg("--help");
    let remux = CommandTool::new(ToolKind::Remux, args.remuxer.clone());
    let tagger = CommandTool::new(ToolKind::Remux, args.tagger.clone())
        .with_base_args(["-y", "-loglevel", "error"])
        .with_version_arg("-version");

    let inspector = CommandTool::new(ToolKind::MetadataLookup, args.inspector.clone())
        .with_base_args(INSPECT_ARGS.iter().copied())
        .with_version_arg("-version");

    let metadata: Arc<dyn ExternalTool> = match &args.metadata_cmd {
        Some(cmd) => {
            Arc::new(CommandTool::new(ToolKind::MetadataLookup, cmd.clone()).passing_operation())
        }
        None => Arc::new(FilenameMetadataTool::new()),
    };

    ToolSet::new(Arc::new(transcription), metadata, Arc::new(remux), Arc::new(tagger))
        .with_inspector(Arc::new(inspector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn process_args(extra: &[&str]) -> ProcessArgs {
        let mut argv = vec!["mediamend", "process", "x.mkv", "-o", "out", "-t", "trash"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Process(args) => args,
            Commands::Classify(_) => unreachable!(),
        }
    }

    #[test]
    fn default_tools_are_commands_with_offline_metadata() {
        let tools = tool_set(&process_args(&[]));
        assert_eq!(tools.transcription.name(), "whisper");
        assert_eq!(tools.remux.name(), "mkvmerge");
        assert_eq!(tools.tagger.name(), "ffmpeg");
        assert_eq!(tools.metadata.name(), "filename-metadata");
        assert_eq!(tools.inspector.as_ref().map(|p| p.name()), Some("ffprobe"));
    }

    #[test]
    fn metadata_command_overrides_offline_provider() {
        let tools = tool_set(&process_args(&["--metadata-cmd", "lookup.sh"]));
        assert_eq!(tools.metadata.name(), "lookup.sh");
        assert_eq!(tools.metadata.kind(), ToolKind::MetadataLookup);
    }

    #[test]
    fn simulate_uses_scripted_tools() {
        let tools = tool_set(&process_args(&["--simulate"]));
        assert_eq!(tools.transcription.name(), "scripted-transcriber");
    }
}
