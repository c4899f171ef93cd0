use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the export pipeline.
///
/// Every variant is a distinct terminal outcome; "not ready" poll responses
/// are never reported here.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Bad input shape, detected before any request is sent.
    #[error("invalid export request: {0}")]
    Validation(String),

    /// The service answered with a success status but an unexpected body.
    #[error("unexpected response from {url}: {message}")]
    Protocol { url: String, message: String },

    /// The service answered with a terminal error status.
    #[error("{0}")]
    Remote(ErrorDetail),

    /// The caller's cancel token fired while polling or downloading.
    #[error("export cancelled")]
    Cancelled,

    /// The configured poll bound ran out before the export became ready.
    #[error("export not ready after {attempts} poll attempt(s)")]
    PollLimitExceeded { attempts: usize },

    /// The request never produced a response (DNS, connect, TLS, timeout...).
    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn protocol(url: &str, msg: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.to_string(),
            message: msg.into(),
        }
    }

    pub(crate) fn network(
        url: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Network {
            url: url.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The structured remote failure, if this is a [`ExportError::Remote`].
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Remote(detail) => Some(detail),
            _ => None,
        }
    }
}

/// How a terminal response body was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// XML error document, flattened into its leaf elements.
    XmlStructured,
    /// Anything else: status, reason and whatever the body carried.
    Transport,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::XmlStructured => "xml-structured",
            Self::Transport => "transport",
        }
    }
}

/// Uniform view of a terminal remote failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub status: u16,
    /// `(field, message)` pairs in the order the body produced them.
    pub pairs: Vec<(String, String)>,
}

impl ErrorDetail {
    /// Looks up the first value recorded under `field`.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Pairs rendered as `name: value` lines.
    pub fn message(&self) -> String {
        self.pairs
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "export service error (HTTP {}, {})",
            self.status,
            self.kind.as_str()
        )?;
        let message = self.message();
        if !message.is_empty() {
            write!(f, "\n{}", message)?;
        }
        Ok(())
    }
}

pub type Result<T, E = ExportError> = std::result::Result<T, E>;
