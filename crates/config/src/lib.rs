//! Generator configuration: loading, env substitution and validation.
//!
//! Config files: `gqlbus.toml`, `gqlbus.yaml`, `gqlbus.yml` or `gqlbus.json`.
//! Searched in `./` then `~/.config/gqlbus/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{base_dir, config_dir, discover, find_config_file, load_config},
    schema::{
        CatalogueSection, ClientSection, DEFAULT_QUERY_GLOB, DEFAULT_RENDERER, GeneratorConfig,
        ServerSection, StaleBindings,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
