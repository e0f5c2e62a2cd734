// ============================================================================
// mediamend-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: Console and Run Log File
//
// Logging goes through the `log` facade everywhere; this module wires it to
// fern with two outputs: a styled console stream on stderr and a plain,
// timestamped run log file.
//
// - Console: INFO by default, DEBUG with --verbose; WARN only in JSON mode so
//   stdout stays machine-readable and stderr stays quiet.
// - File: always DEBUG, one file per run.

// ---- External crate imports ----
use console::style;
use log::LevelFilter;

// ---- Standard library imports ----
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the current local timestamp formatted as "YYYYMMDD_HHMMSS".
///
/// ```
/// let name = format!("mediamend_run_{}.log", mediamend_cli::logging::get_timestamp());
/// assert!(name.starts_with("mediamend_run_"));
/// ```
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Console level for the given flags.
pub fn console_level(verbose: bool, json: bool) -> LevelFilter {
    match (verbose, json) {
        (true, _) => LevelFilter::Debug,
        (false, true) => LevelFilter::Warn,
        (false, false) => LevelFilter::Info,
    }
}

fn styled_level(level: log::Level) -> String {
    let label = format!("{:<5}", level);
    match level {
        log::Level::Error => style(label).red().bold().to_string(),
        log::Level::Warn => style(label).yellow().to_string(),
        log::Level::Info => style(label).green().to_string(),
        log::Level::Debug => style(label).blue().to_string(),
        log::Level::Trace => style(label).magenta().to_string(),
    }
}

/// Installs the global logger. Returns the run log path when a log directory
/// was given.
pub fn init(
    console: LevelFilter,
    log_dir: Option<&Path>,
) -> Result<Option<PathBuf>, fern::InitError> {
    let console_dispatch = fern::Dispatch::new()
        .level(console)
        .format(|out, message, record| {
            out.finish(format_args!("{} {}", styled_level(record.level()), message))
        })
        .chain(std::io::stderr());

    let mut dispatch = fern::Dispatch::new()
        .level(LevelFilter::Debug)
        .chain(console_dispatch);

    let mut log_path = None;
    if let Some(dir) = log_dir {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("mediamend_run_{}.log", get_timestamp()));
        let file_dispatch = fern::Dispatch::new()
            .level(LevelFilter::Debug)
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} [{}] {}: {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .chain(fern::log_file(&path)?);
        dispatch = dispatch.chain(file_dispatch);
        log_path = Some(path);
    }

    dispatch.apply()?;
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_has_expected_shape() {
        let ts = get_timestamp();
        assert_eq!(ts.len(), 15);
        assert_eq!(&ts[8..9], "_");
    }

    #[test]
    fn json_mode_quiets_the_console() {
        assert_eq!(console_level(false, false), LevelFilter::Info);
        assert_eq!(console_level(false, true), LevelFilter::Warn);
        assert_eq!(console_level(true, true), LevelFilter::Debug);
    }
}
