//! Config schema types for `gqlbus.toml`.

use std::path::PathBuf;

use {
    gqlbus_codec::Codec,
    serde::{Deserialize, Serialize},
};

/// Query files picked up when a client sets no `query_glob`.
pub const DEFAULT_QUERY_GLOB: &str = "**/*.graphql";
pub const DEFAULT_RENDERER: &str = "rust";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// One entry per remote service to generate bindings for (`[[clients]]`).
    pub clients: Vec<ClientSection>,
    /// Optional server entrypoint scaffold (`[server]`).
    pub server: Option<ServerSection>,
}

/// What to do with generated files whose operation no longer exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleBindings {
    /// Leave them on disk.
    #[default]
    Preserve,
    /// Delete them. Only files carrying the generated header are touched.
    Prune,
}

/// Where the generator reads the remote schema from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogueSection {
    /// HTTP(S) URL returning schema SDL.
    Url(String),
    /// Local SDL file, relative to the config file.
    File(PathBuf),
}

/// A `[[clients]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSection {
    /// Remote service name.
    pub service: String,
    /// Rust module name of the generated package.
    pub package: String,
    /// Directory the package is written to, relative to the config file.
    pub output_dir: PathBuf,
    pub catalogue: CatalogueSection,
    /// Glob selecting query documents, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_glob: Option<String>,
    /// Subject prefix override. Defaults to the service name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub codec: Codec,
    #[serde(default)]
    pub stale: StaleBindings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,
}

impl ClientSection {
    pub fn query_glob(&self) -> &str {
        self.query_glob.as_deref().unwrap_or(DEFAULT_QUERY_GLOB)
    }

    pub fn renderer(&self) -> &str {
        self.renderer.as_deref().unwrap_or(DEFAULT_RENDERER)
    }
}

/// The `[server]` section driving `gqlbus init-server`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    pub service: String,
    /// Target `main.rs`, relative to the config file.
    pub output: PathBuf,
    /// Module path of the resolver roots, e.g. `crate::graph`.
    pub resolver_module: String,
    /// Module path of the generated executable schema.
    pub exec_module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub codec: Codec,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults() {
        let cfg: GeneratorConfig = toml::from_str(
            r#"
            [[clients]]
            service = "ms-users"
            package = "users"
            output_dir = "src/users"
            catalogue = { file = "users.graphql" }
            "#,
        )
        .unwrap();
        let client = &cfg.clients[0];
        assert_eq!(client.query_glob(), DEFAULT_QUERY_GLOB);
        assert_eq!(client.renderer(), "rust");
        assert_eq!(client.codec, Codec::Json);
        assert_eq!(client.stale, StaleBindings::Preserve);
        assert_eq!(client.catalogue, CatalogueSection::File("users.graphql".into()));
        assert!(cfg.server.is_none());
    }

    #[test]
    fn full_client_and_server() {
        let cfg: GeneratorConfig = toml::from_str(
            r#"
            [[clients]]
            service = "ms-users"
            package = "users"
            output_dir = "src/users"
            query_glob = "graphql/users/*.graphql"
            path = "graph/users"
            codec = "msgpack"
            stale = "prune"
            catalogue = { url = "http://localhost:8080/sdl" }

            [server]
            service = "ms-users"
            output = "src/main.rs"
            resolver_module = "crate::graph"
            exec_module = "crate::graph::generated"
            "#,
        )
        .unwrap();
        let client = &cfg.clients[0];
        assert_eq!(client.codec, Codec::MsgPack);
        assert_eq!(client.stale, StaleBindings::Prune);
        assert_eq!(client.path.as_deref(), Some("graph/users"));
        assert!(matches!(client.catalogue, CatalogueSection::Url(_)));
        assert_eq!(cfg.server.unwrap().resolver_module, "crate::graph");
    }

    #[test]
    fn empty_file_is_empty_config() {
        let cfg: GeneratorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, GeneratorConfig::default());
    }
}
