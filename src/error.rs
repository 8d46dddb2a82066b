use std::path::PathBuf;
use thiserror::Error;

/// Errors that can abort a launch before control reaches the application.
///
/// Failures inside the application itself are never represented here: once
/// the child process is running, its exit status and stderr pass through
/// this layer untouched.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The application directory could not be determined or does not exist.
    #[error("could not resolve application directory: {reason}")]
    PathResolution { reason: String },

    /// The configured `module:callable` entry string is malformed.
    #[error("invalid entry point '{spec}': {reason}")]
    InvalidEntrySpec { spec: String, reason: String },

    /// The entry module does not exist under any search root.
    #[error("module '{module}' not found under {}", format_roots(.searched))]
    ModuleNotFound {
        module: String,
        searched: Vec<PathBuf>,
    },

    /// The entry module exists but could not be imported: syntax error,
    /// missing dependency, or a crash at import time.
    #[error("module '{module}' failed to import: {detail}")]
    ModuleImport { module: String, detail: String },

    /// The module imported cleanly but the named attribute is missing or
    /// not callable.
    #[error("entry point '{entry}' is not callable: {detail}")]
    EntryPointNotCallable { entry: String, detail: String },

    /// The configured runner executable is missing or cannot be spawned.
    #[error("runner unavailable: {0}")]
    RunnerUnavailable(String),

    /// Filesystem failure while preparing the launch (shim, log dir).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_roots(roots: &[PathBuf]) -> String {
    if roots.is_empty() {
        return "(no search roots)".to_string();
    }
    roots
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
