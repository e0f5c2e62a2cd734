// mediamend-cli/src/lib.rs
//
// Library portion of the MediaMend CLI application.
// Contains argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod tools;

// Re-export items needed by the binary or integration tests
pub use cli::{ClassifyArgs, Cli, Commands, ProcessArgs};
pub use commands::classify::run_classify;
pub use commands::process::run_process;
