//! Serve an `async_graphql` schema over the bus.
//!
//! [`BusServer`] is the counterpart of the generated client bindings: it
//! listens on `{path}/*`, answers catalogue requests with the schema SDL and
//! executes every other request through an [`OperationExecutor`].

pub mod context;
pub mod error;
pub mod executor;
pub mod server;

pub use {
    context::{BusRequestInfo, Credentials},
    error::{Error, Result, envelope_from_response, wire_error},
    executor::OperationExecutor,
    gqlbus_codec::Codec,
    gqlbus_transport::{MemoryBus, Transport},
    server::{BusServer, ServerOptions},
    tokio_util::sync::CancellationToken,
};
