//! Error taxonomy for the client controller.

use shared::domain::{DocumentId, TurnId};
use thiserror::Error;

pub const SERVER_WAKING_UP: &str = "Server is waking up. Please try again in a moment.";

/// Failure of a single remote call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{}", SERVER_WAKING_UP)]
    Timeout { endpoint: String },
    #[error("network error while calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },
    #[error("{detail}")]
    Rejected { status: u16, detail: String },
    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("failed to read '{name}': {message}")]
    LocalFile { name: String, message: String },
}

impl GatewayError {
    pub fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else if err.is_decode() {
            Self::Decode {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Network {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Timeouts and connectivity failures; the user should simply retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => ErrorKind::TransientNetwork,
            Self::Rejected { .. } | Self::Decode { .. } => ErrorKind::RemoteRejection,
            Self::LocalFile { .. } => ErrorKind::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad user text; shown inline, never sent remotely.
    Validation,
    TransientNetwork,
    RemoteRejection,
    /// Some items of an upload or delete batch failed.
    PartialBatchFailure,
    /// Local precondition or storage problem.
    Local,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Finish or undo the pending document removal first")]
    UndoWindowOpen,
    #[error("Another request is still in progress")]
    Busy,
    #[error("Documents are being deleted")]
    DeletionInProgress,
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("unknown document {0:?}")]
    UnknownDocument(DocumentId),
    #[error("unknown or already resolved turn {0:?}")]
    TurnNotPending(TurnId),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Gateway(err) => err.kind(),
            Self::AuthenticationFailed => ErrorKind::RemoteRejection,
            _ => ErrorKind::Local,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_reads_as_server_waking_up() {
        let err = GatewayError::Timeout {
            endpoint: "/api/documents".into(),
        };
        assert_eq!(err.to_string(), SERVER_WAKING_UP);
        assert!(err.is_transient());
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    }

    #[test]
    fn rejection_surfaces_detail_verbatim() {
        let err = ClientError::from(GatewayError::Rejected {
            status: 400,
            detail: "Document limit reached".into(),
        });
        assert_eq!(err.to_string(), "Document limit reached");
        assert_eq!(err.kind(), ErrorKind::RemoteRejection);
    }

    #[test]
    fn local_preconditions_are_not_remote_failures() {
        assert_eq!(ClientError::Busy.kind(), ErrorKind::Local);
        assert_eq!(
            ClientError::Validation("Please enter a question".into()).kind(),
            ErrorKind::Validation
        );
    }
}
