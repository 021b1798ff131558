//! Payload codecs for bus messages.
//!
//! - [`Codec::Json`]: structured text, the default
//! - [`Codec::MsgPack`]: compact binary via `rmp-serde`
//!
//! A codec is picked once per remote service and used for both the request
//! and the response envelope. MessagePack always uses named (map) encoding so
//! struct field order and `skip_serializing_if` behave exactly like JSON.

use std::str::FromStr;

use {
    bytes::Bytes,
    serde::{Deserialize, Serialize, de::DeserializeOwned},
};

/// Codec failure on encode or decode.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("json encode failed: {0}")]
    JsonEncode(#[source] serde_json::Error),

    #[error("json decode failed: {0}")]
    JsonDecode(#[source] serde_json::Error),

    #[error("msgpack encode failed: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode failed: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// The payload decoded but does not fit the requested type.
    #[error("payload does not match {target}: {source}")]
    Shape {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown codec: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Json,
    #[serde(alias = "messagepack")]
    MsgPack,
}

impl Codec {
    pub const ALL: [Codec; 2] = [Codec::Json, Codec::MsgPack];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MsgPack => "msgpack",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::MsgPack => "application/msgpack",
        }
    }

    /// Encode a value into a bus payload.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes> {
        let buf = match self {
            Self::Json => serde_json::to_vec(value).map_err(CodecError::JsonEncode)?,
            Self::MsgPack => rmp_serde::to_vec_named(value)?,
        };
        Ok(Bytes::from(buf))
    }

    /// Decode a bus payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Self::Json => serde_json::from_slice(bytes).map_err(CodecError::JsonDecode),
            Self::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
        }
    }
}

/// Convert an already decoded dynamic value into `T`.
///
/// Envelope `data` is first decoded as a dynamic value so errors can be
/// inspected before the body is interpreted; this is the second step.
pub fn from_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|source| CodecError::Shape {
        target: std::any::type_name::<T>(),
        source,
    })
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" => Ok(Self::MsgPack),
            other => Err(CodecError::Unknown(other.to_string())),
        }
    }
}
