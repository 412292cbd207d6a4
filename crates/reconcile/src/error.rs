//! Error types for reconciliation.
//!
//! Every error names the entity it refers to, so a failure deep inside
//! interface reconciliation is still traceable to the owning system.

use crate::types::Target;
use thiserror::Error;

/// Errors that can occur while reconciling an entity.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed desired state. Local, never retried.
    #[error("invalid {target}: {message}")]
    Validation {
        /// Entity whose desired state is invalid
        target: Target,
        /// What is wrong with it
        message: String,
    },

    /// Entity already exists on create
    #[error("{target} already exists on the remote service")]
    Conflict {
        /// Entity that already exists
        target: Target,
    },

    /// Entity is absent remotely
    #[error("{target} not found on the remote service")]
    NotFound {
        /// Entity that could not be found
        target: Target,
    },

    /// Opaque transport or API failure
    #[error("{target}: {operation} failed: {message}")]
    RemoteCall {
        /// Entity the call was made for
        target: Target,
        /// Operation that failed, e.g. `update` or `delete interface 'eth1'`
        operation: String,
        /// Underlying message from the client
        message: String,
    },
}

impl Error {
    pub fn validation(target: Target, message: impl Into<String>) -> Self {
        Self::Validation {
            target,
            message: message.into(),
        }
    }

    /// Map a client failure onto the taxonomy.
    pub fn from_client(target: Target, operation: impl Into<String>, err: ClientError) -> Self {
        match err {
            ClientError::NotFound => Self::NotFound { target },
            ClientError::AlreadyExists => Self::Conflict { target },
            ClientError::Call(message) => Self::RemoteCall {
                target,
                operation: operation.into(),
                message,
            },
        }
    }

    /// The entity this error refers to
    pub fn target(&self) -> &Target {
        match self {
            Self::Validation { target, .. }
            | Self::Conflict { target }
            | Self::NotFound { target }
            | Self::RemoteCall { target, .. } => target,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Error returned by a [`RemoteClient`](crate::RemoteClient).
///
/// Only a missing entity and a duplicate are distinguished; everything
/// else is an opaque call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("{0}")]
    Call(String),
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, Error>;
