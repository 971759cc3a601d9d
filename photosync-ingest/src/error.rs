//! Error types for photosync-ingest
//!
//! Every error maps to an [`ErrorKind`]. The retry policy retries
//! `Transient` errors only; the coordinator's classifier uses the kind to
//! decide whether an error counts against the run's tolerance.

use thiserror::Error;

/// Ingest result type
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error classes that drive retries and the run's tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 5xx, timeouts, connection resets
    Transient,
    /// 4xx and policy rejections
    Permanent,
    /// File open or archive read failure for one asset
    SourceAccess,
    /// Malformed sidecar, the asset proceeds with partial metadata
    SidecarParse,
    Cancelled,
    /// Broken internal contract, aborts the run
    Invariant,
}

/// Ingest error type
#[derive(Debug, Error)]
pub enum IngestError {
    /// Server answered with an error status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Request never got an answer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Per-call timeout elapsed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Asset file could not be read
    #[error("Can't access file {file}: {message}")]
    FileAccess { file: String, message: String },

    /// Sidecar could not be parsed
    #[error("Can't parse sidecar {file}: {message}")]
    Sidecar { file: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Fatal source-side failure
    #[error("Source error: {0}")]
    Source(String),

    /// photosync-common error
    #[error("Common error: {0}")]
    Common(#[from] photosync_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors collected across the assets of one group
    #[error("{}", join_messages(.0))]
    Joined(Vec<IngestError>),
}

fn join_messages(errors: &[IngestError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl IngestError {
    /// Classify the error
    ///
    /// A joined error takes the most severe kind of its members: invariant,
    /// then cancellation, then the first server-side failure, then the first
    /// member's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Server { status, .. } => {
                if *status >= 500 || *status == 408 || *status == 429 {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            IngestError::Transport(_) | IngestError::Timeout(_) => ErrorKind::Transient,
            IngestError::FileAccess { .. } | IngestError::Io(_) => ErrorKind::SourceAccess,
            IngestError::Sidecar { .. } => ErrorKind::SidecarParse,
            IngestError::Cancelled => ErrorKind::Cancelled,
            IngestError::Invariant(_) | IngestError::Source(_) => ErrorKind::Invariant,
            IngestError::Common(photosync_common::Error::Cancelled) => ErrorKind::Cancelled,
            IngestError::Common(photosync_common::Error::Io(_)) => ErrorKind::SourceAccess,
            IngestError::Common(_) => ErrorKind::Permanent,
            IngestError::Joined(errors) => {
                let kinds: Vec<ErrorKind> = errors.iter().map(|e| e.kind()).collect();
                if kinds.contains(&ErrorKind::Invariant) {
                    ErrorKind::Invariant
                } else if kinds.contains(&ErrorKind::Cancelled) {
                    ErrorKind::Cancelled
                } else if let Some(kind) = kinds
                    .iter()
                    .find(|k| matches!(k, ErrorKind::Transient | ErrorKind::Permanent))
                {
                    *kind
                } else {
                    kinds.first().copied().unwrap_or(ErrorKind::Permanent)
                }
            }
        }
    }

    /// Whether the retry policy should try again
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Fold a list of errors into one, `None` when the list is empty
    pub fn join(mut errors: Vec<IngestError>) -> Option<IngestError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(IngestError::Joined(errors)),
        }
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IngestError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            IngestError::Server {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            IngestError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Server {
            status: 0,
            message: format!("Invalid response body: {}", err),
        }
    }
}
