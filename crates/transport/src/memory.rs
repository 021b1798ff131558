//! In-process message bus.
//!
//! Subjects are `/`-separated tokens. Subscription patterns may use `*` to
//! match exactly one token and a trailing `>` to match one or more tokens.
//! Every subscriber gets its own bounded channel; a slow subscriber applies
//! backpressure to publishers of matching subjects.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    bytes::Bytes,
    gqlbus_protocol::{MAX_PAYLOAD_BYTES, SUBJECT_SEPARATOR, inbox_subject, is_inbox_subject},
    tokio::sync::mpsc,
    tracing::{debug, trace},
};

use crate::{Message, Result, Subscription, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct MemoryBusOptions {
    /// Per-subscriber channel capacity.
    pub channel_capacity: usize,
    /// Largest payload accepted by `publish`.
    pub max_payload: usize,
}

impl Default for MemoryBusOptions {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            max_payload: MAX_PAYLOAD_BYTES,
        }
    }
}

struct Subscriber {
    pattern: String,
    tx: mpsc::Sender<Message>,
}

struct Inner {
    options: MemoryBusOptions,
    subscribers: RwLock<BTreeMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

/// Cheaply cloneable handle to a shared in-process bus.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_options(MemoryBusOptions::default())
    }

    pub fn with_options(options: MemoryBusOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                subscribers: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Number of live subscriptions on the bus.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Number of live subscriptions whose pattern matches `subject`.
    pub fn interest(&self, subject: &str) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| subject_matches(&s.pattern, subject))
            .count()
    }

    /// Close every subscription registered with exactly `pattern`. Their
    /// streams end after draining buffered messages.
    pub fn close(&self, pattern: &str) -> usize {
        let mut subs = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|_, s| s.pattern != pattern);
        let closed = before - subs.len();
        debug!(pattern, closed, "closed subject");
        closed
    }

    /// Deliver to all matching subscribers and return how many received it.
    async fn deliver(&self, subject: &str, reply: Option<&str>, payload: Bytes) -> Result<usize> {
        let max = self.inner.options.max_payload;
        if payload.len() > max {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let targets: Vec<mpsc::Sender<Message>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| subject_matches(&s.pattern, subject))
            .map(|s| s.tx.clone())
            .collect();

        let mut delivered = 0;
        for tx in targets {
            let msg = Message {
                subject: subject.to_string(),
                reply: reply.map(str::to_string),
                payload: payload.clone(),
            };
            if tx.send(msg).await.is_ok() {
                delivered += 1;
            }
        }
        trace!(subject, delivered, bytes = payload.len(), "published");
        Ok(delivered)
    }

    fn register(&self, pattern: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.options.channel_capacity.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Subscriber {
                pattern: pattern.to_string(),
                tx,
            });
        debug!(subject = pattern, id, "subscribed");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Subscription::new(pattern, rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .subscribers
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id);
                debug!(id, "unsubscribed");
            }
        })
    }
}

#[async_trait]
impl Transport for MemoryBus {
    async fn publish(&self, subject: &str, reply: Option<&str>, payload: Bytes) -> Result<()> {
        let delivered = self.deliver(subject, reply, payload).await?;
        if delivered == 0 && (reply.is_some() || is_inbox_subject(subject)) {
            return Err(TransportError::NoResponders {
                subject: subject.to_string(),
            });
        }
        Ok(())
    }

    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        let inbox = inbox_subject(&uuid::Uuid::new_v4().simple().to_string());
        let mut sub = self.register(&inbox);

        let exchange = async {
            if self.deliver(subject, Some(&inbox), payload).await? == 0 {
                return Err(TransportError::NoResponders {
                    subject: subject.to_string(),
                });
            }
            match sub.next_message().await {
                Some(msg) => Ok(msg.payload),
                None => Err(TransportError::closed(format!("reply inbox for {subject}"))),
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                subject: subject.to_string(),
                after: timeout,
            }),
        }
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        if subject.is_empty() {
            return Err(TransportError::other("empty subject"));
        }
        Ok(self.register(subject))
    }
}

/// Match a subject against a subscription pattern.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pat = pattern.split(SUBJECT_SEPARATOR);
    let mut sub = subject.split(SUBJECT_SEPARATOR);
    loop {
        match (pat.next(), sub.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {},
            (Some(p), Some(s)) if p == s => {},
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, futures::StreamExt};

    #[test]
    fn wildcard_matching() {
        assert!(subject_matches("svc/GetUser", "svc/GetUser"));
        assert!(subject_matches("svc/*", "svc/GetUser"));
        assert!(!subject_matches("svc/*", "svc/a/b"));
        assert!(subject_matches("svc/>", "svc/a/b"));
        assert!(!subject_matches("svc/>", "svc"));
        assert!(!subject_matches("svc/GetUser", "svc/GetUsers"));
        assert!(!subject_matches("svc", "svc/GetUser"));
    }

    #[tokio::test]
    async fn publish_reaches_matching_subscribers_in_order() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("svc/*").await.unwrap();
        for i in 0..3u8 {
            bus.publish("svc/op", None, Bytes::from(vec![i]))
                .await
                .unwrap();
        }
        for i in 0..3u8 {
            let msg = sub.next().await.unwrap();
            assert_eq!(msg.subject, "svc/op");
            assert_eq!(&msg.payload[..], &[i]);
        }
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe("a/b").await.unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn request_without_responder_fails_fast() {
        let bus = MemoryBus::new();
        let err = bus
            .request("nobody/home", Bytes::new(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::NoResponders {
            subject: "nobody/home".into()
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn request_times_out_when_nobody_replies() {
        let bus = MemoryBus::new();
        let _silent = bus.subscribe("svc/slow").await.unwrap();
        let err = bus
            .request("svc/slow", Bytes::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn request_receives_reply() {
        let bus = MemoryBus::new();
        let mut server = bus.subscribe("svc/echo").await.unwrap();
        let responder = bus.clone();
        tokio::spawn(async move {
            if let Some(msg) = server.next().await {
                let reply = msg.reply.unwrap();
                responder.publish(&reply, None, msg.payload).await.unwrap();
            }
        });
        let out = bus
            .request("svc/echo", Bytes::from_static(b"ping"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(&out[..], b"ping");
    }

    #[tokio::test]
    async fn request_deadline_covers_a_full_responder_queue() {
        let bus = MemoryBus::with_options(MemoryBusOptions {
            channel_capacity: 1,
            ..MemoryBusOptions::default()
        });
        let _stuck = bus.subscribe("svc/slow").await.unwrap();
        bus.publish("svc/slow", None, Bytes::from_static(b"fill"))
            .await
            .unwrap();

        let err = tokio::time::timeout(
            Duration::from_secs(1),
            bus.request("svc/slow", Bytes::new(), Duration::from_millis(20)),
        )
        .await
        .expect("request must honour its own deadline")
        .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[tokio::test]
    async fn publish_reports_missing_receivers_only_when_expected() {
        let bus = MemoryBus::new();
        bus.publish("events/created", None, Bytes::new())
            .await
            .unwrap();

        let err = bus
            .publish("svc/op", Some("_INBOX/abc"), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::NoResponders {
            subject: "svc/op".into()
        });

        let err = bus
            .publish("_INBOX/gone", None, Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoResponders { .. }));

        let _owner = bus.subscribe("_INBOX/here").await.unwrap();
        bus.publish("_INBOX/here", None, Bytes::new()).await.unwrap();
    }

    #[tokio::test]
    async fn close_ends_stream() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("feed").await.unwrap();
        assert_eq!(bus.close("feed"), 1);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn oversized_payload_rejected() {
        let bus = MemoryBus::with_options(MemoryBusOptions {
            channel_capacity: 4,
            max_payload: 2,
        });
        let err = bus
            .publish("x", None, Bytes::from_static(b"abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { size: 3, max: 2 }));
    }
}
