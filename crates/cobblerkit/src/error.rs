//! Error types for Cobbler API calls.
//!
//! Errors are categorized so the retry loop can tell a dropped connection
//! from a server-side fault, and so the reconciler can tell a missing
//! entity from everything else.

use reconcile::ClientError;
use thiserror::Error;

/// Categories of Cobbler errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, TLS or HTTP gateway errors (transient, retryable)
    Network,
    /// The server raised an XML-RPC fault
    Fault,
    /// The named entity does not exist
    NotFound,
    /// An entity with the same name already exists
    AlreadyExists,
    /// Login failed or the token was rejected
    Auth,
    /// The response could not be decoded
    Decode,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Fault => "Cobbler rejected the request",
            Self::NotFound => "Not found",
            Self::AlreadyExists => "Already exists",
            Self::Auth => "Authentication failed",
            Self::Decode => "Unexpected response",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check that the Cobbler API URL is reachable and try again",
            Self::Fault => "Check the Cobbler server log for details",
            Self::NotFound => "Verify the name, or drop it from the state file",
            Self::AlreadyExists => "Remove the existing entity or import it into the state",
            Self::Auth => "Check the username and password",
            Self::Decode => "Check that the URL points at the Cobbler XML-RPC endpoint",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while talking to Cobbler.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-level failure
    #[error("network error: {message}")]
    Network {
        /// Message from the HTTP client
        message: String,
    },

    /// Non-success HTTP status
    #[error("HTTP {status} from Cobbler API")]
    Http {
        /// Status code returned by the server
        status: u16,
    },

    /// XML-RPC fault raised by the server
    #[error("fault {code}: {message}")]
    Fault {
        /// Fault code
        code: i64,
        /// Fault string
        message: String,
    },

    /// Entity does not exist
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Wire name of the entity kind
        kind: String,
        /// Entity name
        name: String,
    },

    /// Entity with this name already exists
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Wire name of the entity kind
        kind: String,
        /// Entity name
        name: String,
    },

    /// Login failed or the session token was rejected
    #[error("authentication failed: {message}")]
    Auth {
        /// Details from the server
        message: String,
    },

    /// Malformed or unexpected response
    #[error("cannot decode response: {message}")]
    Decode {
        /// What could not be decoded
        message: String,
    },

    /// TLS setup failed
    #[error("invalid TLS configuration: {message}")]
    Tls {
        /// Details about the certificate problem
        message: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::Http { status } if *status >= 500 => ErrorCategory::Network,
            Error::Http { status: 401 | 403 } | Error::Auth { .. } => ErrorCategory::Auth,
            Error::Fault { .. } => ErrorCategory::Fault,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Error::Decode { .. } => ErrorCategory::Decode,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
        }
    }

    /// Create an error from an XML-RPC fault.
    ///
    /// Cobbler reports every failure as a generic fault, so the fault
    /// string is inspected to recover the category.
    pub fn from_fault(code: i64, message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("login failed") || lower.contains("invalid token") {
            return Error::Auth {
                message: message.trim().to_string(),
            };
        }

        Error::Fault {
            code,
            message: message.trim().to_string(),
        }
    }

    /// Whether a fault means the requested entity is missing.
    pub(crate) fn is_missing_fault(&self) -> bool {
        let Error::Fault { message, .. } = self else {
            return false;
        };
        let lower = message.to_lowercase();
        (lower.contains("unknown") && lower.contains("name"))
            || lower.contains("not found")
            || lower.contains("does not exist")
            || lower.contains("no such file")
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => Self::Http { status },
            other => Self::Network {
                message: other.to_string(),
            },
        }
    }
}

impl From<Error> for ClientError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { .. } => ClientError::NotFound,
            Error::AlreadyExists { .. } => ClientError::AlreadyExists,
            other => ClientError::Call(other.to_string()),
        }
    }
}

/// Result type for Cobbler operations.
pub type Result<T> = std::result::Result<T, Error>;
