//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of a specific command.

/// `classify`: reports how inputs would be routed without running anything.
pub mod classify;

/// `process`: runs the pipeline and renders its progress.
pub mod process;
