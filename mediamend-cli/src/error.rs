// ============================================================================
// mediamend-cli/src/error.rs
// ============================================================================
//
// CLI ERROR HANDLING: Core errors, labelled with what the CLI was doing
//
// Commands return the core error type so `main` can render a rejected
// submission the same way whether it came from the flags, the preferences
// file or the scheduler.

// ---- Internal crate imports ----
use mediamend_core::{CoreError, CoreResult};

// ---- Standard library imports ----
use std::fmt;

pub type CliResult<T> = CoreResult<T>;

/// Prefixes an error with the step that produced it.
///
/// Configuration problems stay configuration errors so they are still
/// reported as a rejected submission; everything else becomes
/// `OperationFailed`.
pub trait CliErrorContext<T> {
    fn cli_with_context<C, F>(self, f: F) -> CliResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C;
}

impl<T, E> CliErrorContext<T> for Result<T, E>
where
    E: Into<CoreError>,
{
    fn cli_with_context<C, F>(self, f: F) -> CliResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C,
    {
        self.map_err(|e| match e.into() {
            CoreError::Configuration(message) => {
                CoreError::Configuration(format!("{}: {}", f(), message))
            }
            other => CoreError::OperationFailed(format!("{}: {}", f(), other)),
        })
    }
}
