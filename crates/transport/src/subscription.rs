use std::{
    pin::Pin,
    task::{Context, Poll},
};

use {bytes::Bytes, futures::Stream, tokio::sync::mpsc};

/// A message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Bytes,
}

type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// An open subscription on the bus.
///
/// Yields messages in the order the bus delivered them. Ends when the bus
/// closes the subject. Dropping it (or calling [`Subscription::unsubscribe`])
/// releases the bus-side registration.
pub struct Subscription {
    subject: String,
    rx: mpsc::Receiver<Message>,
    on_drop: Option<Unsubscribe>,
}

impl Subscription {
    /// Build a subscription from a receiving channel and an unsubscribe hook
    /// that runs exactly once.
    pub fn new(
        subject: impl Into<String>,
        rx: mpsc::Receiver<Message>,
        unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            subject: subject.into(),
            rx,
            on_drop: Some(Box::new(unsubscribe)),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Next message, or `None` once the subject is closed.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.rx.close();
        if let Some(hook) = self.on_drop.take() {
            hook();
        }
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}
