//! WolfGate Error Types

use thiserror::Error;

/// Result type alias for WolfGate operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfGate error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Request errors
    #[error("Unauthorized: {0}")]
    AuthRejected(&'static str),

    #[error("Invalid request: {0}")]
    ValidationFailed(String),

    #[error("Client not found: {0}")]
    NotFound(String),

    #[error("Client already exists: {0}")]
    AlreadyExists(String),

    #[error("Address pool exhausted: no free address in {0}")]
    PoolExhausted(String),

    // Collaborator errors
    #[error("{command} failed: {reason}")]
    ExternalCapabilityFailed { command: String, reason: String },

    #[error("Client store error for {name}: {reason}")]
    StoreFailed { name: String, reason: String },

    #[error("Malformed client configuration {name}: {reason}")]
    ParseFailed { name: String, reason: String },

    #[error("QR code rendering failed: {0}")]
    QrRender(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a failed `wg` invocation
    pub fn external(command: impl Into<String>, reason: impl ToString) -> Self {
        Error::ExternalCapabilityFailed {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a failed store operation on a client file
    pub fn store(name: impl Into<String>, reason: impl ToString) -> Self {
        Error::StoreFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status code reported for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::AuthRejected(_) => 401,
            Error::ValidationFailed(_) => 400,
            Error::NotFound(_) => 404,
            Error::AlreadyExists(_) => 409,
            Error::PoolExhausted(_) => 503,
            _ => 500,
        }
    }

    /// Machine-readable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG_ERROR",
            Error::AuthRejected(_) => "UNAUTHORIZED",
            Error::ValidationFailed(_) => "VALIDATION_FAILED",
            Error::NotFound(_) => "CLIENT_NOT_FOUND",
            Error::AlreadyExists(_) => "CLIENT_EXISTS",
            Error::PoolExhausted(_) => "POOL_EXHAUSTED",
            Error::ExternalCapabilityFailed { .. } => "EXTERNAL_COMMAND_FAILED",
            Error::StoreFailed { .. } | Error::Io(_) => "STORE_FAILED",
            Error::ParseFailed { .. } => "PARSE_FAILED",
            Error::QrRender(_) => "QR_FAILED",
            Error::Network(_) => "NETWORK_ERROR",
        }
    }

    /// Check if this error was caused by the caller rather than the host
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
