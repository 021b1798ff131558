//! Client runtime for generated bus bindings.
//!
//! Generated packages hold a [`RemoteService`] and call
//! [`RemoteService::execute`] for queries and mutations or
//! [`RemoteService::subscribe`] for subscriptions. Both encode a
//! [`gqlbus_protocol::WireRequest`] with the service's codec and decode the
//! [`gqlbus_protocol::ResponseEnvelope`] that comes back.

pub mod context;
pub mod error;
pub mod service;
pub mod stream;

pub use {
    context::CallContext,
    error::{ClientError, RemoteOperationError, Result},
    gqlbus_codec::Codec,
    gqlbus_protocol::{GraphQlError, OperationKind},
    gqlbus_transport::{MemoryBus, Transport, TransportError},
    service::{ClientOptions, Operation, RemoteService, decode_envelope},
    stream::{CancelHandle, StreamHandle},
    tokio_util::sync::CancellationToken,
};

/// Re-exported so generated code only depends on this crate.
pub use {serde, serde_json};
