use strum::Display;
use thiserror::Error;

/// Everything that can make a generation fail.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Image not found or invalid: {0}")]
    ImageNotFound(String),

    #[error("Missing API key, pass one or set GPTSAPI_API_KEY")]
    MissingCredential,

    #[error("Missing polling URL in response")]
    MissingPollingUrl,

    #[error("{0}")]
    NoImageData(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Canceled")]
    Canceled,

    /// Non-success status, body kept verbatim.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// An `error` object inside an otherwise successful response.
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ImageNotFound,
    MissingCredential,
    MissingPollingUrl,
    NoImageData,
    Timeout,
    Canceled,
    Http,
    Upstream,
    InvalidResponse,
    Network,
    Io,
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ImageNotFound(_) => ErrorKind::ImageNotFound,
            Self::MissingCredential => ErrorKind::MissingCredential,
            Self::MissingPollingUrl => ErrorKind::MissingPollingUrl,
            Self::NoImageData(_) => ErrorKind::NoImageData,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Canceled => ErrorKind::Canceled,
            Self::Http { .. } => ErrorKind::Http,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Self::Network { .. } => ErrorKind::Network,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }

    pub(crate) fn from_reqwest(context: impl Into<String>, source: reqwest::Error) -> Self {
        let context = context.into();
        if source.is_timeout() {
            Self::Timeout(format!("{context}: {source}"))
        } else {
            Self::Network { context, source }
        }
    }
}

pub type Result<T, E = GenerationError> = std::result::Result<T, E>;
