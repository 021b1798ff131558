//! Shared error definitions and naming helpers used across all gqlbus crates.

pub mod error;
pub mod naming;

pub use error::FromMessage;
