//! Remote service handle shared by every generated binding of one client.

use std::{sync::Arc, time::Duration};

use {
    gqlbus_codec::Codec,
    gqlbus_protocol::{
        DEFAULT_TIMEOUT_MS, OperationKind, ResponseEnvelope, WireRequest, inbox_subject,
        operation_subject,
    },
    gqlbus_transport::{Transport, TransportError},
    serde::{Serialize, de::DeserializeOwned},
    tracing::{debug, instrument},
};

use crate::{
    context::CallContext,
    error::{ClientError, RemoteOperationError, Result},
    stream::{StreamHandle, spawn_forwarder},
};

/// Static description of one GraphQL operation, emitted by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub kind: OperationKind,
    /// Full GraphQL document, fragments included.
    pub document: &'static str,
}

/// Connection options for a generated client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Subject prefix of the remote service. Defaults to the service name.
    pub path: Option<String>,
    pub codec: Codec,
    /// Used when the call context carries no deadline.
    pub timeout: Duration,
    /// Opaque credentials forwarded with every request.
    pub credentials: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            path: None,
            codec: Codec::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            credentials: None,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }
}

struct ServiceInner {
    name: String,
    path: String,
    transport: Arc<dyn Transport>,
    codec: Codec,
    timeout: Duration,
    credentials: Option<String>,
}

/// A remote GraphQL service reachable over the bus.
///
/// The codec is fixed for the lifetime of the handle. Clones share the same
/// transport connection; calls on different clones run independently.
#[derive(Clone)]
pub struct RemoteService {
    inner: Arc<ServiceInner>,
}

impl RemoteService {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        let name = name.into();
        let path = options.path.unwrap_or_else(|| name.clone());
        Self {
            inner: Arc::new(ServiceInner {
                name,
                path: gqlbus_protocol::subject::normalize(&path),
                transport,
                codec: options.codec,
                timeout: options.timeout,
                credentials: options.credentials,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn codec(&self) -> Codec {
        self.inner.codec
    }

    /// Subject a given operation is addressed to.
    pub fn subject_for(&self, operation: &Operation) -> String {
        operation_subject(&self.inner.path, operation.name)
    }

    fn wire_request<V: Serialize>(&self, operation: &Operation, variables: &V) -> Result<WireRequest> {
        let variables = serde_json::to_value(variables).map_err(gqlbus_codec::CodecError::JsonEncode)?;
        Ok(WireRequest::new(operation.kind, operation.name, operation.document, variables)
            .with_credentials(self.inner.credentials.clone()))
    }

    /// Run a query or mutation as a single request/reply exchange.
    #[instrument(skip_all, fields(service = %self.inner.name, operation = operation.name))]
    pub async fn execute<V, R>(&self, ctx: &CallContext, operation: &Operation, variables: &V) -> Result<R>
    where
        V: Serialize,
        R: DeserializeOwned,
    {
        let subject = self.subject_for(operation);
        let payload = self.inner.codec.encode(&self.wire_request(operation, variables)?)?;
        let budget = ctx.budget(self.inner.timeout);
        if budget.is_zero() {
            return Err(TransportError::Timeout {
                subject,
                after: budget,
            }
            .into());
        }

        debug!(subject = %subject, kind = %operation.kind, timeout = ?budget, "sending request");
        let reply = tokio::select! {
            biased;
            () = ctx.cancellation().cancelled() => return Err(ClientError::Cancelled),
            reply = self.inner.transport.request(&subject, payload, budget) => reply?,
        };
        decode_envelope(self.inner.codec, &reply)
    }

    /// Start a subscription. Results arrive on the returned handle until it is
    /// cancelled, dropped, the context is cancelled or the remote closes.
    ///
    /// Fails with [`TransportError::NoResponders`] when nothing serves the
    /// operation subject.
    #[instrument(skip_all, fields(service = %self.inner.name, operation = operation.name))]
    pub async fn subscribe<V, R>(
        &self,
        ctx: &CallContext,
        operation: &Operation,
        variables: &V,
    ) -> Result<StreamHandle<R>>
    where
        V: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        if ctx.cancellation().is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let subject = self.subject_for(operation);
        let payload = self.inner.codec.encode(&self.wire_request(operation, variables)?)?;

        let inbox = inbox_subject(&uuid::Uuid::new_v4().simple().to_string());
        let sub = self.inner.transport.subscribe(&inbox).await?;
        self.inner
            .transport
            .publish(&subject, Some(&inbox), payload)
            .await?;
        debug!(subject = %subject, inbox = %inbox, "subscription started");

        Ok(spawn_forwarder(
            sub,
            self.inner.codec,
            Arc::clone(&self.inner.transport),
            ctx.cancellation().child_token(),
        ))
    }
}

impl std::fmt::Debug for RemoteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteService")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .field("codec", &self.inner.codec)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

/// Decode a reply payload into the operation result.
///
/// A non-empty `errors` list wins over any `data` that came with it.
pub fn decode_envelope<R: DeserializeOwned>(codec: Codec, payload: &[u8]) -> Result<R> {
    let envelope: ResponseEnvelope = codec.decode(payload)?;
    if let Some(remote) = RemoteOperationError::from_errors(envelope.errors) {
        return Err(remote.into());
    }
    Ok(gqlbus_codec::from_value(envelope.data)?)
}
