//! Error types shared by the REST storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`RestDaoError`] failures.
pub type RestResult<T> = Result<T, RestDaoError>;

/// Failures that can occur while interacting with the REST store.
#[derive(Debug, Error)]
pub enum RestDaoError {
    /// Required environment variable is missing.
    #[error("missing REST store environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build REST store client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent or timed out.
    #[error("failed to send REST store request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The store answered with an unexpected status code.
    #[error("unexpected REST store response status {status} for `{path}`: {message}")]
    RequestStatus {
        path: String,
        status: StatusCode,
        message: String,
    },
    /// Response payload could not be parsed into the expected model.
    #[error("failed to decode REST store response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// An insert returned no representation of the stored row.
    #[error("REST store returned no row for `{path}`")]
    EmptyRepresentation { path: String },
}

impl From<RestDaoError> for StorageError {
    fn from(err: RestDaoError) -> Self {
        if let RestDaoError::RequestStatus {
            status, message, ..
        } = &err
        {
            let retryable = status.is_server_error()
                || *status == StatusCode::REQUEST_TIMEOUT
                || *status == StatusCode::TOO_MANY_REQUESTS;
            if !retryable {
                return StorageError::rejected(format!("{message} ({})", status.as_u16()));
            }
        }

        match err {
            RestDaoError::DecodeResponse { .. } | RestDaoError::EmptyRepresentation { .. } => {
                StorageError::decode(err.to_string())
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
