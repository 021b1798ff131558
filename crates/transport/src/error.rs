use std::time::Duration;

/// Crate-wide result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures of the bus itself, as opposed to failures reported by a remote
/// resolver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No reply arrived before the deadline.
    #[error("request on {subject} timed out after {after:?}")]
    Timeout { subject: String, after: Duration },

    /// Nobody is subscribed to the request subject.
    #[error("no responders for {subject}")]
    NoResponders { subject: String },

    /// The connection or the subscription was closed.
    #[error("transport closed: {reason}")]
    Closed { reason: String },

    /// Payload exceeds the bus limit.
    #[error("payload of {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Implementation-specific failure.
    #[error("transport failure: {message}")]
    Other { message: String },
}

impl TransportError {
    #[must_use]
    pub fn closed(reason: impl std::fmt::Display) -> Self {
        Self::Closed {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn other(message: impl std::fmt::Display) -> Self {
        Self::Other {
            message: message.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
