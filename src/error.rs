use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, CompressorError>;

#[derive(Debug, thiserror::Error)]
pub enum CompressorError {
    #[error("{tool} is not installed or not executable.")]
    ToolMissing { tool: String },

    #[error("Error probing {path:?}: {message}")]
    ProbeFailed { path: PathBuf, message: String },

    #[error("Error parsing {path:?}: {message}")]
    ProbeParse { path: PathBuf, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{path:?} does not exist.")]
    InputNotFound { path: PathBuf },

    #[error("Declined to overwrite {path:?}.")]
    UserDeclinedOverwrite { path: PathBuf },

    #[error("Interrupted by user.")]
    Interrupted,

    #[error("ffmpeg exited with {}", describe_exit(.code))]
    EncoderFailed { code: Option<i32> },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CompressorError {
    pub fn tool_missing(tool: impl Into<String>) -> Self {
        CompressorError::ToolMissing { tool: tool.into() }
    }

    pub fn probe_failed(path: &Path, message: &str) -> Self {
        CompressorError::ProbeFailed {
            path: PathBuf::from(path),
            message: String::from(message),
        }
    }

    pub fn probe_parse(path: &Path, message: &str) -> Self {
        CompressorError::ProbeParse {
            path: PathBuf::from(path),
            message: String::from(message),
        }
    }

    /// Errors that end a job without anything having gone wrong.
    pub fn is_benign(&self) -> bool {
        matches!(self, CompressorError::UserDeclinedOverwrite { .. })
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => String::from("a signal"),
    }
}
