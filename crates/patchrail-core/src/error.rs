//! Error types for core operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Command `{command}` exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Git error: {0}")]
    Git(String),

    #[error("Tracker error: {0}")]
    Tracker(String),

    #[error("Mail error: {0}")]
    Mail(String),
}

impl Error {
    /// The captured error stream of a failed command, or the display form
    /// for errors that carry no stream.
    pub fn output_text(&self) -> String {
        match self {
            Error::CommandFailed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
