// ============================================================================
// mediamend-cli/src/main.rs
// ============================================================================
//
// MEDIAMEND CLI: Entry Point
//
// Parses arguments, sets up logging and dispatches to the command
// implementations. Exits non-zero when the submission is rejected or any item
// of the batch failed.

use mediamend_cli::{Cli, Commands, logging, run_classify, run_process};

use anyhow::Context;
use clap::Parser;
use console::style;
use log::{debug, info};

use std::process;

fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => {
            let level = logging::console_level(cli.verbose, args.json);
            let log_path = logging::init(level, args.log_dir.as_deref())
                .context("Failed to initialise logging")?;
            if let Some(path) = log_path {
                info!("Run log: {}", path.display());
            }
            debug!("Arguments: {:?}", args);

            let report = run_process(args).context("Processing failed")?;
            Ok(!report.summary.has_failures())
        }
        Commands::Classify(args) => {
            let level = logging::console_level(cli.verbose, args.json);
            logging::init(level, None).context("Failed to initialise logging")?;
            run_classify(&args);
            Ok(true)
        }
    }
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            process::exit(1);
        }
    }
}
