use imgsrc_model::AssetId;
use thiserror::Error;

/// Errors raised synchronously while resolving a descriptor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(
        "Image: asset with ID \"{0}\" could not be found. Please check the image source or packager."
    )]
    AssetNotFound(AssetId),
}

/// Errors that can terminate a load request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {uri}")]
    Status { uri: String, status: u16 },

    #[error("Unsupported URI: {0}")]
    UnsupportedUri(String),

    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("Invalid request header: {0}")]
    InvalidHeader(String),

    #[error("Not a decodable image: {0}")]
    Decode(String),

    #[error("No natural size reported for {0}")]
    SizeUnavailable(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("No async runtime available to drive image loads")]
    RuntimeUnavailable,

    #[error("Cancelled")]
    Aborted,
}

impl LoadError {
    /// Cancellation initiated by the loader itself. Never reported to
    /// `on_error`.
    pub fn is_aborted(&self) -> bool {
        matches!(self, LoadError::Aborted)
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => LoadError::Status {
                uri: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            },
            None => LoadError::Network(err.to_string()),
        }
    }
}

/// Errors raised while building a [`LoaderConfig`](crate::LoaderConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("invalid config document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoadError>;
