use http::StatusCode;
use thiserror::Error;

/// Unified error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    // Request errors
    #[error("unsupport protocol scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),

    #[error("Client address unavailable")]
    ClientAddressUnavailable,

    // Upstream errors
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Get the HTTP status code reported to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RelayError::UnsupportedScheme(_)
            | RelayError::InvalidTarget(_) => StatusCode::BAD_REQUEST,

            // 500 Internal Server Error
            RelayError::ClientAddressUnavailable
            | RelayError::InvalidConfig(_)
            | RelayError::Upstream(_)
            | RelayError::Io(_)
            | RelayError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Convert from hyper errors
impl From<hyper::Error> for RelayError {
    fn from(err: hyper::Error) -> Self {
        RelayError::Http(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for RelayError {
    fn from(err: url::ParseError) -> Self {
        RelayError::InvalidTarget(err.to_string())
    }
}
