//! Error mapping from execution results to wire errors.

use std::collections::BTreeMap;

use gqlbus_protocol::{GraphQlError, PathSegment, ResponseEnvelope};

/// Failures that stop the server loop itself. Per-request failures never
/// surface here; they are answered with an error envelope.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] gqlbus_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Convert an `async_graphql::ServerError` into a wire error.
pub fn wire_error(err: async_graphql::ServerError) -> GraphQlError {
    let path = (!err.path.is_empty()).then(|| {
        err.path
            .iter()
            .map(|seg| match seg {
                async_graphql::PathSegment::Field(name) => PathSegment::Field(name.clone()),
                async_graphql::PathSegment::Index(idx) => PathSegment::Index(*idx as u64),
            })
            .collect()
    });
    let extensions = err
        .extensions
        .as_ref()
        .and_then(|ext| serde_json::to_value(ext).ok())
        .and_then(|value| match value {
            serde_json::Value::Object(map) if !map.is_empty() => {
                Some(map.into_iter().collect::<BTreeMap<_, _>>())
            },
            _ => None,
        });
    GraphQlError {
        message: err.message,
        path,
        extensions,
    }
}

/// Convert a full execution response into the wire envelope.
pub fn envelope_from_response(response: async_graphql::Response) -> ResponseEnvelope {
    let errors = response.errors.into_iter().map(wire_error).collect();
    let extensions = response
        .extensions
        .into_iter()
        .filter_map(|(key, value)| value.into_json().ok().map(|v| (key, v)))
        .collect();
    let data = response.data.into_json().unwrap_or(serde_json::Value::Null);
    ResponseEnvelope {
        errors,
        extensions,
        data,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, async_graphql::ErrorExtensions, serde_json::json};

    #[test]
    fn server_error_keeps_path_and_extensions() {
        let mut err = async_graphql::ServerError::new("denied", None);
        err.path = vec![
            async_graphql::PathSegment::Field("users".into()),
            async_graphql::PathSegment::Index(1),
        ];
        err.extensions = async_graphql::Error::new("denied")
            .extend_with(|_, e| e.set("code", "FORBIDDEN"))
            .extensions;

        let wire = wire_error(err);
        assert_eq!(wire.message, "denied");
        assert_eq!(wire.path, Some(vec!["users".into(), PathSegment::Index(1)]));
        assert_eq!(wire.code(), Some("FORBIDDEN"));
    }

    #[test]
    fn empty_path_is_omitted() {
        let wire = wire_error(async_graphql::ServerError::new("boom", None));
        assert!(wire.path.is_none());
        assert!(wire.extensions.is_none());
    }

    #[test]
    fn response_data_and_errors_carry_over() {
        let data = async_graphql::Value::from_json(json!({ "n": 1 })).unwrap();
        let mut response = async_graphql::Response::new(data);
        response.errors.push(async_graphql::ServerError::new("partial", None));
        let env = envelope_from_response(response);
        assert_eq!(env.data, json!({ "n": 1 }));
        assert_eq!(env.errors.len(), 1);
        assert!(env.extensions.is_empty());
    }
}
