//! CLI command implementations.

pub mod codes;
pub mod repair;
pub mod snapshot;

use std::io;
use std::path::PathBuf;

use docsync_engine::ReplicateError;
use docsync_storage::StorageError;
use thiserror::Error;

/// Errors a command can end with.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The config file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The config file is not valid.
    #[error("invalid config {}: {source}", path.display())]
    Config {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Unknown `--format` value.
    #[error("unknown output format: {0} (expected text or json)")]
    Format(String),

    /// A store could not be built or saved.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The pass failed or left unresolved entries.
    #[error(transparent)]
    Replicate(#[from] ReplicateError),

    /// The report could not be rendered.
    #[error("cannot render report: {0}")]
    Render(#[from] serde_json::Error),
}

/// How reports are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per entry plus a summary.
    Text,
    /// The report as pretty JSON.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CommandError::Format(other.to_string())),
        }
    }
}
