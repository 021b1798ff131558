//! Bus wire protocol definitions.
//!
//! Every GraphQL operation travels over the bus as a [`WireRequest`] published
//! on an operation subject, and every result comes back as a
//! [`ResponseEnvelope`]. Payloads are encoded with the codec negotiated for the
//! remote service.
//!
//! Subjects:
//! - `{service_path}/{operation}` : request/reply and subscription start
//! - `{service_path}/__catalogue` : schema SDL for the generator
//! - `_INBOX/{id}` : reply inbox for streamed subscription results
//! - `_INBOX/{id}/cancel` : cancellation notice from the subscriber
//!
//! An empty payload on a reply inbox marks the end of a subscription stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod subject;

pub use subject::{
    SUBJECT_SEPARATOR, cancel_subject, catalogue_subject, inbox_subject, is_inbox_subject,
    operation_subject,
};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PAYLOAD_BYTES: usize = 1_048_576; // 1 MB
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000; // 10s
/// Reserved operation name answered with the remote schema SDL.
pub const CATALOGUE_OPERATION: &str = "__catalogue";
pub const INBOX_PREFIX: &str = "_INBOX";
pub const CANCEL_SUFFIX: &str = "cancel";

/// Returns `true` if `payload` is the end-of-stream marker.
pub fn is_end_of_stream(payload: &[u8]) -> bool {
    payload.is_empty()
}

// ── Error codes ──────────────────────────────────────────────────────────────

/// Values placed under `extensions.code` for errors raised by the bus layer
/// rather than by a resolver.
pub mod error_codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const UNKNOWN_OPERATION: &str = "UNKNOWN_OPERATION";
    pub const INTERNAL: &str = "INTERNAL";
}

// ── Operations ───────────────────────────────────────────────────────────────

/// The three GraphQL operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }

    /// Subscriptions are streamed, everything else is request/reply.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Subscription)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client → server operation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub kind: OperationKind,
    #[serde(rename = "operationName")]
    pub operation_name: String,
    pub query: String,
    #[serde(default)]
    pub variables: serde_json::Value,
    /// Opaque credentials forwarded to resolvers untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl WireRequest {
    pub fn new(
        kind: OperationKind,
        operation_name: impl Into<String>,
        query: impl Into<String>,
        variables: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            operation_name: operation_name.into(),
            query: query.into(),
            variables,
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<String>) -> Self {
        self.credentials = credentials;
        self
    }
}

// ── Error shape ──────────────────────────────────────────────────────────────

/// One segment of a GraphQL error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(u64),
    Field(String),
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        Self::Field(value.to_string())
    }
}

impl From<u64> for PathSegment {
    fn from(value: u64) -> Self {
        Self::Index(value)
    }
}

/// A single GraphQL error as reported by the remote resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, serde_json::Value>>,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    /// Error raised by the bus layer, tagged with `extensions.code`.
    pub fn with_code(code: &str, message: impl Into<String>) -> Self {
        let mut ext = BTreeMap::new();
        ext.insert("code".to_string(), serde_json::Value::String(code.to_string()));
        Self {
            message: message.into(),
            path: None,
            extensions: Some(ext),
        }
    }

    #[must_use]
    pub fn at_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(|v| v.as_str())
    }
}

impl std::fmt::Display for GraphQlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Server → client operation result.
///
/// Field order is part of the wire contract: `errors` is always written before
/// `extensions` and `data` so a consumer reading a stream can see a failure
/// before it buffers the body. `data` is always written, even when null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<D = serde_json::Value> {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlError>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
    pub data: D,
}

impl<D> ResponseEnvelope<D> {
    pub fn ok(data: D) -> Self {
        Self {
            errors: Vec::new(),
            extensions: BTreeMap::new(),
            data,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

impl ResponseEnvelope<serde_json::Value> {
    pub fn err(errors: Vec<GraphQlError>) -> Self {
        Self {
            errors,
            extensions: BTreeMap::new(),
            data: serde_json::Value::Null,
        }
    }
}
