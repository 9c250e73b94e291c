use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or timed out; callers retry on their next cycle.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend answered but refused the operation.
    #[error("storage rejected the request: {message}")]
    Rejected { message: String },
    /// The backend answered with a payload we could not interpret.
    #[error("unexpected storage response: {message}")]
    Decode { message: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Construct a rejection error carrying the backend message.
    pub fn rejected(message: impl Into<String>) -> Self {
        StorageError::Rejected {
            message: message.into(),
        }
    }

    /// Construct a decode error for an unparseable response.
    pub fn decode(message: impl Into<String>) -> Self {
        StorageError::Decode {
            message: message.into(),
        }
    }

    /// Whether the failure is transient and worth retrying on the next natural cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}
