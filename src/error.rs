//! Error types for the bpfd agent

use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Call to the local bpfd daemon failed
    #[error("bpfd {operation} failed: {message}")]
    Daemon {
        /// Daemon operation that failed (list, load, unload, connect)
        operation: String,
        /// Error message reported by the transport or the daemon
        message: String,
        /// Whether the failure looks like the daemon being unreachable
        /// rather than a rejection of the request
        transient: bool,
    },

    /// Validation error for program resources
    #[error("validation error: {0}")]
    Validation(String),

    /// Node selector could not be parsed
    #[error("invalid node selector: {0}")]
    Selector(String),

    /// Network interface could not be resolved on this node
    #[error("interface resolution failed: {0}")]
    Interface(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a node selector error with the given message
    pub fn selector(msg: impl Into<String>) -> Self {
        Self::Selector(msg.into())
    }

    /// Create an interface resolution error with the given message
    pub fn interface(msg: impl Into<String>) -> Self {
        Self::Interface(msg.into())
    }

    /// Create a daemon error for a request the daemon rejected
    pub fn daemon_rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Daemon {
            operation: operation.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Create a daemon error for a daemon that could not be reached
    pub fn daemon_unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Daemon {
            operation: operation.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Map a gRPC status returned by the daemon
    ///
    /// Unavailable, deadline and cancellation codes mean the request never
    /// got a verdict from the daemon; everything else is a rejection.
    pub fn from_status(operation: &str, status: &tonic::Status) -> Self {
        use tonic::Code;

        let transient = matches!(
            status.code(),
            Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled | Code::ResourceExhausted
        );
        Self::Daemon {
            operation: operation.to_string(),
            message: status.message().to_string(),
            transient,
        }
    }

    /// Returns true if retrying the operation later may succeed
    ///
    /// Kubernetes client errors (4xx) are permanent except for conflicts and
    /// throttling. Validation failures never heal on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(kube::Error::Api(ae)) => {
                !(400..500).contains(&ae.code) || ae.code == 409 || ae.code == 429
            }
            Self::Kube(_) => true,
            Self::Daemon { transient, .. } => *transient,
            Self::Validation(_) | Self::Selector(_) => false,
            Self::Interface(_) => true,
        }
    }

    /// Returns true if this is a Kubernetes "not found" response
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }

    /// Returns true if this is a Kubernetes optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Self::daemon_unavailable("connect", e.to_string())
    }
}
