// ============================================================================
// mediamend-cli/src/cli.rs
// ============================================================================
//
// COMMAND LINE: Argument Definitions
//
// Defines the command-line argument structures using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

// --- CLI Argument Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "MediaMend: media library processing pipeline",
    long_about = "Classifies downloaded movies, TV episodes and audiobooks, then detects, \
                  tags, cleans subtitles, muxes and files them into a library."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging on the console and in the run log
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs the pipeline over files and folders
    Process(ProcessArgs),
    /// Prints how each path would be classified, without running anything
    Classify(ClassifyArgs),
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Files or folders to process. Folders holding several items are expanded.
    #[arg(required = true, value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Library root where finished items are written
    #[arg(short = 'o', long = "output", value_name = "DIR", env = "MEDIAMEND_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Folder consumed sources are moved to
    #[arg(short = 't', long = "trash", value_name = "DIR", env = "MEDIAMEND_TRASH")]
    pub trash: Option<PathBuf>,

    /// Download root; only files under it may be trashed
    #[arg(short = 'i', long = "input", value_name = "DIR")]
    pub input: Option<PathBuf>,

    /// Preferences snapshot (JSON). Flags override its values.
    #[arg(long = "prefs", value_name = "FILE")]
    pub prefs: Option<PathBuf>,

    /// Plan Tag, Mux and Trash without touching the filesystem
    #[arg(long)]
    pub dry_run: bool,

    /// Transcription runs on the GPU (one transcription at a time)
    #[arg(long = "gpu")]
    pub use_gpu: bool,

    /// Worker pool size (default: number of CPUs, or 2 with --gpu)
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Preferred subtitle languages, most preferred first
    #[arg(long = "sub-lang", value_delimiter = ',', value_name = "LANGS")]
    pub subtitle_languages: Option<Vec<String>>,

    /// Never fall back to transcription when subtitles are missing
    #[arg(long = "no-transcribe")]
    pub no_transcribe: bool,

    /// Retries for transient tool failures
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    // --- Tools ---
    /// Transcription command
    #[arg(long, value_name = "CMD", default_value = "whisper")]
    pub transcriber: String,

    /// Remux command
    #[arg(long, value_name = "CMD", default_value = "mkvmerge")]
    pub remuxer: String,

    /// Command used to write audiobook tags
    #[arg(long, value_name = "CMD", default_value = "ffmpeg")]
    pub tagger: String,

    /// Command reporting video dimensions, used for the aspect label
    #[arg(long, value_name = "CMD", default_value = "ffprobe")]
    pub inspector: String,

    /// Metadata lookup command; the offline filename provider is used if unset
    #[arg(long = "metadata-cmd", value_name = "CMD")]
    pub metadata_cmd: Option<String>,

    /// Use scripted tools that always succeed; nothing external is run
    #[arg(long)]
    pub simulate: bool,

    // --- Output ---
    /// Print progress as JSON lines instead of styled text
    #[arg(long)]
    pub json: bool,

    /// Directory for a timestamped run log; no log file is written without it
    #[arg(short = 'l', long = "log-dir", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Files or folders to classify
    #[arg(required = true, value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Print one JSON object per path
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process_basic_args() {
        let cli = Cli::parse_from([
            "mediamend",
            "process",
            "/downloads/Heat.1995.mkv",
            "--output",
            "/library",
            "--trash",
            "/trash",
        ]);
        match cli.command {
            Commands::Process(args) => {
                assert_eq!(args.paths, vec![PathBuf::from("/downloads/Heat.1995.mkv")]);
                assert_eq!(args.output, Some(PathBuf::from("/library")));
                assert_eq!(args.trash, Some(PathBuf::from("/trash")));
                assert!(!args.dry_run);
                assert_eq!(args.transcriber, "whisper");
                assert_eq!(args.remuxer, "mkvmerge");
                assert_eq!(args.tagger, "ffmpeg");
                assert_eq!(args.inspector, "ffprobe");
                assert!(args.metadata_cmd.is_none());
            }
            Commands::Classify(_) => panic!("Expected Process command"),
        }
    }

    #[test]
    fn test_parse_process_with_options() {
        let cli = Cli::parse_from([
            "mediamend",
            "--verbose",
            "process",
            "a",
            "b",
            "-o",
            "out",
            "-t",
            "trash",
            "--dry-run",
            "--gpu",
            "--workers",
            "3",
            "--sub-lang",
            "eng,spa",
            "--no-transcribe",
            "--json",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Process(args) => {
                assert_eq!(args.paths.len(), 2);
                assert!(args.dry_run);
                assert!(args.use_gpu);
                assert_eq!(args.workers, Some(3));
                assert_eq!(
                    args.subtitle_languages,
                    Some(vec!["eng".to_string(), "spa".to_string()])
                );
                assert!(args.no_transcribe);
                assert!(args.json);
            }
            Commands::Classify(_) => panic!("Expected Process command"),
        }
    }

    #[test]
    fn test_parse_classify() {
        let cli = Cli::parse_from(["mediamend", "classify", "x.mkv", "--json"]);
        match cli.command {
            Commands::Classify(args) => {
                assert_eq!(args.paths, vec![PathBuf::from("x.mkv")]);
                assert!(args.json);
            }
            Commands::Process(_) => panic!("Expected Classify command"),
        }
    }
}
