//! Serve an [`OperationExecutor`] on the bus.

use std::sync::Arc;

use {
    bytes::Bytes,
    futures::StreamExt,
    gqlbus_codec::Codec,
    gqlbus_protocol::{
        CATALOGUE_OPERATION, GraphQlError, ResponseEnvelope, WireRequest, cancel_subject,
        error_codes,
        subject::{last_token, normalize, service_wildcard},
    },
    gqlbus_transport::{Message, Transport, TransportError},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, instrument, warn},
};

use crate::{context::BusRequestInfo, error::Result, executor::OperationExecutor};

/// Options for a [`BusServer`].
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Subject prefix to serve on. Defaults to the service name.
    pub path: Option<String>,
    /// Must match the codec configured on calling clients.
    pub codec: Codec,
}

struct ServerInner {
    service: String,
    path: String,
    codec: Codec,
    executor: Arc<dyn OperationExecutor>,
    transport: Arc<dyn Transport>,
}

/// Answers GraphQL operations addressed to `{path}/{operation}`.
///
/// Catalogue requests get the schema SDL. Queries and mutations get a single
/// reply; subscriptions stream envelopes to the reply inbox until the stream
/// ends, the subscriber cancels or the server shuts down. Every request runs
/// on its own task.
#[derive(Clone)]
pub struct BusServer {
    inner: Arc<ServerInner>,
}

impl BusServer {
    pub fn new(
        service: impl Into<String>,
        executor: impl OperationExecutor,
        transport: Arc<dyn Transport>,
        options: ServerOptions,
    ) -> Self {
        let service = service.into();
        let path = normalize(options.path.as_deref().unwrap_or(&service));
        Self {
            inner: Arc::new(ServerInner {
                service,
                path,
                codec: options.codec,
                executor: Arc::new(executor),
                transport,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Serve until `shutdown` is cancelled or the bus closes the subscription.
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<()> {
        let pattern = service_wildcard(&self.inner.path);
        let mut sub = self.inner.transport.subscribe(&pattern).await?;
        info!(service = %self.inner.service, subject = %pattern, codec = %self.inner.codec, "bus server listening");

        loop {
            let msg = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                msg = sub.next_message() => msg,
            };
            let Some(msg) = msg else {
                warn!(service = %self.inner.service, "bus closed the server subscription");
                break;
            };
            let this = self.clone();
            let token = shutdown.child_token();
            tokio::spawn(async move { this.handle(msg, token).await });
        }

        info!(service = %self.inner.service, "bus server stopped");
        Ok(())
    }

    #[instrument(skip_all, fields(service = %self.inner.service, subject = %msg.subject))]
    async fn handle(&self, msg: Message, shutdown: CancellationToken) {
        let Some(reply) = msg.reply.clone() else {
            debug!("dropping request without reply subject");
            return;
        };
        let operation = last_token(&msg.subject);

        if operation == CATALOGUE_OPERATION {
            let sdl = self.inner.executor.sdl();
            self.respond(&reply, &ResponseEnvelope::ok(serde_json::json!({ "sdl": sdl })))
                .await;
            return;
        }

        let request: WireRequest = match self.inner.codec.decode(&msg.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "undecodable request");
                let err = GraphQlError::with_code(error_codes::BAD_REQUEST, e.to_string());
                self.respond(&reply, &ResponseEnvelope::err(vec![err])).await;
                return;
            },
        };
        if request.operation_name != operation {
            let err = GraphQlError::with_code(
                error_codes::UNKNOWN_OPERATION,
                format!(
                    "operation '{}' was sent to subject for '{operation}'",
                    request.operation_name
                ),
            );
            self.respond(&reply, &ResponseEnvelope::err(vec![err])).await;
            return;
        }

        let info = BusRequestInfo {
            service: self.inner.service.clone(),
            subject: msg.subject.clone(),
        };
        if request.kind.is_streaming() {
            self.stream(request, info, &reply, shutdown).await;
        } else {
            debug!(kind = %request.kind, "executing");
            let envelope = self.inner.executor.execute(request, info).await;
            self.respond(&reply, &envelope).await;
        }
    }

    async fn stream(
        &self,
        request: WireRequest,
        info: BusRequestInfo,
        inbox: &str,
        shutdown: CancellationToken,
    ) {
        let mut cancel = match self.inner.transport.subscribe(&cancel_subject(inbox)).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(inbox, error = %e, "cannot watch for cancellation, refusing subscription");
                let err = GraphQlError::with_code(error_codes::INTERNAL, e.to_string());
                self.respond(inbox, &ResponseEnvelope::err(vec![err])).await;
                return;
            },
        };

        let mut results = self.inner.executor.execute_stream(request, info);
        let mut sent: u64 = 0;
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    self.end_stream(inbox).await;
                    break;
                },
                _ = cancel.next_message() => {
                    debug!(inbox, sent, "subscriber cancelled");
                    break;
                },
                next = results.next() => match next {
                    Some(envelope) => {
                        if !self.respond(inbox, &envelope).await {
                            break;
                        }
                        sent += 1;
                    },
                    None => {
                        debug!(inbox, sent, "subscription completed");
                        self.end_stream(inbox).await;
                        break;
                    },
                },
            }
        }
    }

    async fn end_stream(&self, inbox: &str) {
        if let Err(e) = self.inner.transport.publish(inbox, None, Bytes::new()).await {
            debug!(inbox, error = %e, "failed to publish end of stream");
        }
    }

    /// Encode and publish one envelope. Returns `false` if it could not be sent,
    /// including when the caller's inbox no longer exists.
    async fn respond(&self, subject: &str, envelope: &ResponseEnvelope) -> bool {
        let payload = match self.inner.codec.encode(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                let fallback = ResponseEnvelope::err(vec![GraphQlError::with_code(
                    error_codes::INTERNAL,
                    "response could not be encoded",
                )]);
                match self.inner.codec.encode(&fallback) {
                    Ok(payload) => payload,
                    Err(_) => return false,
                }
            },
        };
        match self.inner.transport.publish(subject, None, payload).await {
            Ok(()) => true,
            Err(TransportError::NoResponders { .. }) => {
                debug!(subject, "reply inbox is gone");
                false
            },
            Err(e) => {
                warn!(subject, error = %e, "failed to publish response");
                false
            },
        }
    }
}

impl std::fmt::Debug for BusServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusServer")
            .field("service", &self.inner.service)
            .field("path", &self.inner.path)
            .field("codec", &self.inner.codec)
            .finish_non_exhaustive()
    }
}
