//! Subscription streams.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use {
    bytes::Bytes,
    futures::Stream,
    gqlbus_codec::Codec,
    gqlbus_protocol::{cancel_subject, is_end_of_stream},
    gqlbus_transport::{Subscription, Transport, TransportError},
    serde::de::DeserializeOwned,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::{error::ClientError, service::decode_envelope};

/// Cloneable cancellation capability for an open subscription.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Stop forwarding and unsubscribe from the bus. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// An open subscription: decoded results in bus order plus cancellation.
///
/// Remote errors are delivered as `Err` items and the stream keeps going; it
/// ends when the remote completes the stream, the bus closes the inbox or the
/// handle is cancelled.
/// After cancellation no further item is yielded. Dropping the handle cancels.
pub struct StreamHandle<T> {
    subject: String,
    rx: mpsc::Receiver<Result<T, ClientError>>,
    cancel: CancelHandle,
}

impl<T> StreamHandle<T> {
    /// Inbox subject the remote publishes results on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Stream for StreamHandle<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for StreamHandle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T> std::fmt::Debug for StreamHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("subject", &self.subject)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Spawn the task that decodes messages from `sub` and forwards them.
///
/// The output channel has capacity one and the task reserves its slot before
/// it reads the next bus message, so at most one decoded item exists at a
/// time. The task owns the bus subscription; it drops it on exit, which
/// unsubscribes, and sends a cancel notice when the caller cancelled.
pub(crate) fn spawn_forwarder<T>(
    sub: Subscription,
    codec: Codec,
    transport: Arc<dyn Transport>,
    token: CancellationToken,
) -> StreamHandle<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let subject = sub.subject().to_string();
    let (tx, rx) = mpsc::channel(1);
    let task_token = token.clone();
    let inbox = subject.clone();

    tokio::spawn(async move {
        let mut sub = sub;
        let mut forwarded: u64 = 0;
        loop {
            let permit = tokio::select! {
                biased;
                () = task_token.cancelled() => break,
                permit = tx.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let msg = tokio::select! {
                biased;
                () = task_token.cancelled() => break,
                msg = sub.next_message() => msg,
            };
            let Some(msg) = msg else {
                debug!(inbox = %inbox, forwarded, "subscription closed by bus");
                break;
            };
            if is_end_of_stream(&msg.payload) {
                debug!(inbox = %inbox, forwarded, "subscription completed by remote");
                break;
            }
            permit.send(decode_envelope::<T>(codec, &msg.payload));
            forwarded += 1;
        }
        drop(sub);

        if task_token.is_cancelled() {
            debug!(inbox = %inbox, forwarded, "subscription cancelled");
            match transport
                .publish(&cancel_subject(&inbox), None, Bytes::new())
                .await
            {
                Ok(()) => {},
                // The remote has not started watching yet; it stops at its
                // next publish into the dropped inbox.
                Err(TransportError::NoResponders { .. }) => {
                    debug!(inbox = %inbox, "no cancel watcher yet");
                },
                Err(e) => warn!(inbox = %inbox, error = %e, "failed to publish cancel notice"),
            }
        }
    });

    StreamHandle {
        subject,
        rx,
        cancel: CancelHandle { token },
    }
}
