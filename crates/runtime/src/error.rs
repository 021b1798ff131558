use {
    gqlbus_codec::CodecError,
    gqlbus_protocol::GraphQlError,
    gqlbus_transport::TransportError,
};

pub type Result<T> = std::result::Result<T, ClientError>;

/// The remote resolver ran and reported at least one GraphQL error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteOperationError {
    /// Message of the first reported error.
    pub message: String,
    /// Every error from the envelope, in order.
    pub errors: Vec<GraphQlError>,
}

impl RemoteOperationError {
    /// Returns `None` when `errors` is empty.
    pub fn from_errors(errors: Vec<GraphQlError>) -> Option<Self> {
        let message = errors.first()?.message.clone();
        Some(Self { message, errors })
    }
}

/// Failure of a single generated operation call.
///
/// `Remote` means the remote ran and failed, `Transport` means it never
/// answered; callers match on the variant to tell them apart.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("remote operation failed: {0}")]
    Remote(#[from] RemoteOperationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("call cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    pub fn remote(&self) -> Option<&RemoteOperationError> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}
