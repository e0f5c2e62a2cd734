//! Implementation of the 'process' subcommand.
//!
//! Expands the given paths into inputs, builds the configuration snapshot,
//! submits the batch and renders its events until the job is over.

use crate::cli::ProcessArgs;
use crate::error::{CliErrorContext, CliResult};
use crate::output::{self, ConsoleRenderer};
use crate::tools::tool_set;

use mediamend_core::{
    CoreConfig, CoreConfigBuilder, CoreError, EventDispatcher, JobReport, JobScheduler,
    JsonProgressHandler, collect_inputs,
};

use log::{info, warn};

use std::sync::Arc;

/// Builds the configuration snapshot: preferences file first, flags on top.
pub fn build_config(args: &ProcessArgs) -> CliResult<CoreConfig> {
    let base = match &args.prefs {
        Some(path) => CoreConfig::from_json_file(path)
            .cli_with_context(|| format!("Failed to load preferences '{}'", path.display()))?,
        None => CoreConfig::default(),
    };

    let mut builder = CoreConfigBuilder::from_config(base);
    if let Some(output) = &args.output {
        builder = builder.output_path(output.clone());
    }
    if let Some(trash) = &args.trash {
        builder = builder.trash_path(trash.clone());
    }
    if let Some(input) = &args.input {
        builder = builder.input_path(input.clone());
    }
    if args.dry_run {
        builder = builder.dry_run(true);
    }
    if args.use_gpu {
        builder = builder.use_gpu(true);
    }
    if args.no_transcribe {
        builder = builder.allow_transcription(false);
    }
    if let Some(workers) = args.workers {
        builder = builder.max_workers(workers);
    }
    if let Some(languages) = &args.subtitle_languages {
        builder = builder.subtitle_languages(languages.clone());
    }
    if let Some(retries) = args.retries {
        builder = builder.max_retries(retries);
    }

    let config = builder.build();
    if config.output_path.as_os_str().is_empty() {
        return Err(CoreError::Configuration(
            "no output directory; pass --output or set MEDIAMEND_OUTPUT".into(),
        ));
    }
    if config.trash_path.as_os_str().is_empty() {
        return Err(CoreError::Configuration(
            "no trash directory; pass --trash or set MEDIAMEND_TRASH".into(),
        ));
    }
    Ok(config)
}

/// Runs the pipeline and returns the final report.
pub fn run_process(args: ProcessArgs) -> CliResult<JobReport> {
    let config = build_config(&args)?;
    let inputs = collect_inputs(&args.paths)?;
    info!("Found {} input(s)", inputs.len());

    let scheduler = Arc::new(JobScheduler::new(tool_set(&args)));
    let handle = scheduler.submit(&inputs, config.clone())?;
    let job_id = handle.id();

    {
        let scheduler = Arc::clone(&scheduler);
        ctrlc::set_handler(move || {
            warn!("Received Ctrl+C, cancelling job {}...", job_id);
            scheduler.cancel(job_id);
        })
        .map_err(|e| {
            CoreError::OperationFailed(format!("Failed to install Ctrl+C handler: {}", e))
        })?;
    }

    if args.json {
        let json = Arc::new(JsonProgressHandler::new());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.add_handler(json.clone());
        dispatcher.drain(handle.events());

        let report = handle.wait();
        json.handle_summary(report.job_id, &report.summary);
        return Ok(report);
    }

    output::print_heading("MEDIAMEND");
    output::print_info("Inputs", inputs.len());
    output::print_info("Output", config.output_path.display());
    output::print_info("Trash", config.trash_path.display());
    output::print_info("Workers", config.effective_workers());
    if config.dry_run {
        output::print_info("Mode", "dry run");
    }
    output::print_heading("PROCESSING");

    let renderer = Arc::new(ConsoleRenderer::new(inputs.len()));
    let mut dispatcher = EventDispatcher::new();
    dispatcher.add_handler(renderer.clone());
    dispatcher.drain(handle.events());
    renderer.finish();

    let report = handle.wait();
    info!("Job {} finished: {}", report.job_id, report.summary);
    output::print_report(&report, config.dry_run);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::path::PathBuf;

    fn process_args(argv: &[&str]) -> ProcessArgs {
        let mut full = vec!["mediamend", "process"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Process(args) => args,
            Commands::Classify(_) => unreachable!(),
        }
    }

    #[test]
    fn flags_override_preferences_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = dir.path().join("prefs.json");
        std::fs::write(
            &prefs,
            r#"{"output_path": "/from/prefs", "trash_path": "/trash",
                "max_workers": 8, "subtitle_languages": ["spa"]}"#,
        )
        .unwrap();

        let args = process_args(&[
            "x.mkv",
            "--prefs",
            prefs.to_str().unwrap(),
            "--output",
            "/from/flag",
            "--workers",
            "2",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.output_path, PathBuf::from("/from/flag"));
        assert_eq!(config.trash_path, PathBuf::from("/trash"));
        assert_eq!(config.max_workers, Some(2));
        assert_eq!(config.subtitle_languages, vec!["spa".to_string()]);
    }

    #[test]
    fn missing_trash_is_a_configuration_error() {
        let args = process_args(&["x.mkv", "--output", "/library"]);
        if std::env::var_os("MEDIAMEND_TRASH").is_none() {
            assert!(matches!(
                build_config(&args),
                Err(CoreError::Configuration(_))
            ));
        }
    }

    #[test]
    fn unreadable_preferences_carry_context() {
        let args = process_args(&["x.mkv", "--prefs", "/no/such/prefs.json"]);
        let err = build_config(&args).unwrap_err();
        assert!(err.to_string().contains("Failed to load preferences"));
    }
}
