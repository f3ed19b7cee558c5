//! Error types for the commit workflow using thiserror.
//!
//! Every variant except [`WorkflowError::UserQuit`] and the fatal ones is
//! recoverable: the component that can offer a meaningful menu catches it,
//! and anything left over is turned into a continue-or-quit prompt by the
//! session loop.

use crate::backends::BackendKind;
use crate::diff_guard::SensitiveMatch;
use thiserror::Error;

/// Failures of the HTTP transport, before any backend has looked at them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("host not found")]
    HostNotFound,

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Other(String),
}

/// Errors and control signals raised while producing a commit.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("No staged changes")]
    EmptyDiff,

    #[error("Possible sensitive data found in {} staged line(s)", .matches.len())]
    SensitiveDataDetected { matches: Vec<SensitiveMatch> },

    #[error("{backend} backend unreachable: {detail}")]
    BackendUnreachable { backend: BackendKind, detail: String },

    #[error("{backend} backend request failed (HTTP {status}): {detail}")]
    BackendRequestFailed {
        backend: BackendKind,
        status: u16,
        detail: String,
    },

    #[error("{backend} backend returned an unexpected response: {detail}")]
    InvalidResponse { backend: BackendKind, detail: String },

    #[error("The model returned an empty commit message")]
    EmptyGeneration,

    #[error("Cannot generate a message from an empty diff")]
    BlankDiff,

    #[error("No models installed on the local backend. Pull one with `ollama pull <model>` first")]
    NoLocalModels,

    #[error("git commit failed: {0}")]
    CommitFailed(String),

    #[error("git error: {0}")]
    Vcs(String),

    #[error("Backend switch requested")]
    SwitchRequested,

    #[error("Quit requested")]
    UserQuit,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Errors that end the process instead of returning to the session loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkflowError::NoLocalModels)
    }

    /// Cloud failures for which switching to another backend or model is a
    /// sensible recovery: rate limiting, connectivity problems and timeouts.
    pub fn allows_switch(&self) -> bool {
        match self {
            WorkflowError::BackendUnreachable {
                backend: BackendKind::Cloud,
                ..
            } => true,
            WorkflowError::BackendRequestFailed {
                backend: BackendKind::Cloud,
                status,
                ..
            } => matches!(*status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
