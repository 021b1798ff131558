use std::path::{Path, PathBuf};

use gqlbus_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A generator option is missing or invalid. Only the client being
    /// registered is affected.
    #[error("invalid client option `{option}`: {message}")]
    Configuration {
        option: &'static str,
        message: String,
    },

    /// A local operation selects something the remote schema does not have.
    #[error("operation `{operation}` does not match the remote schema: {field}")]
    SchemaMismatch { operation: String, field: String },

    #[error("failed to parse {}: {message}", file.display())]
    Parse { file: PathBuf, message: String },

    #[error("failed to fetch the catalogue of `{service}`: {message}")]
    Catalogue { service: String, message: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render error: {0}")]
    Render(String),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    pub fn config(option: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            option,
            message: message.into(),
        }
    }

    pub fn mismatch(operation: impl Into<String>, field: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            operation: operation.into(),
            field: field.into(),
        }
    }

    pub fn parse(file: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.to_string(),
        }
    }

    pub fn catalogue(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Catalogue {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Map an I/O error on `path`, for use with `map_err`.
    pub fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

gqlbus_common::impl_context!();
