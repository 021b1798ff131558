//! Bus transport abstraction.
//!
//! A [`Transport`] exposes the three primitives the runtime needs from a
//! publish/subscribe connection: fire-and-forget publish (optionally carrying a
//! reply subject), request/reply with a deadline, and subject subscription.
//! Implementations must be safe to share across tasks; the runtime holds them
//! behind an `Arc<dyn Transport>`.
//!
//! [`MemoryBus`] is an in-process implementation with NATS-style wildcards.

pub mod error;
pub mod memory;
mod subscription;

use std::time::Duration;

use {async_trait::async_trait, bytes::Bytes};

pub use {
    error::{Result, TransportError},
    memory::{MemoryBus, MemoryBusOptions},
    subscription::{Message, Subscription},
};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` on `subject`. `reply` names the subject the receiver
    /// should answer on.
    ///
    /// Fails with [`TransportError::NoResponders`] when nobody received a
    /// message that expects an answer (`reply` is set) or that was addressed
    /// to a reply inbox whose owner has gone away.
    async fn publish(&self, subject: &str, reply: Option<&str>, payload: Bytes) -> Result<()>;

    /// Publish `payload` and wait for exactly one reply.
    ///
    /// Fails with [`TransportError::Timeout`] when no reply arrives within
    /// `timeout`. The deadline covers delivery as well, so a responder that
    /// stops draining its queue cannot hold the caller past it. Dropping the
    /// returned future abandons the request.
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes>;

    /// Subscribe to `subject`. Dropping the [`Subscription`] unsubscribes.
    async fn subscribe(&self, subject: &str) -> Result<Subscription>;
}
