use log::error;
use thiserror::Error;

/// Everything that can go wrong between the client and the notice-board API.
///
/// None of these are fatal: each one belongs to the single operation that
/// raised it and leaves previously fetched state untouched.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure or a response body that could not be decoded
    #[error("network error: {0}")]
    Network(String),

    /// The server answered 401; credentials must be cleared by the caller
    #[error("Session expired")]
    Auth,

    /// The server (or a local pre-check) rejected the request
    #[error("{message}")]
    Validation { message: String },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation {
            message: message.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth)
    }

    /// A response body that does not match the expected shape.
    pub fn malformed(err: serde_json::Error) -> Self {
        ClientError::Network(format!("malformed response body: {}", err))
    }

    /// A value that could not be encoded for local storage.
    pub fn encoding(err: serde_json::Error) -> Self {
        ClientError::Storage(sqlx::Error::Encode(Box::new(err)))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        error!("HTTP transport error: {:?}", err);
        ClientError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
