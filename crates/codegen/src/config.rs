//! Client registration options.

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    gqlbus_codec::Codec,
    gqlbus_config::{CatalogueSection, ClientSection, DEFAULT_QUERY_GLOB, DEFAULT_RENDERER},
    gqlbus_protocol::DEFAULT_TIMEOUT_MS,
    gqlbus_transport::Transport,
};

pub use gqlbus_config::StaleBindings;

/// Where the remote schema is read from during generation.
#[derive(Clone)]
pub enum CatalogueSource {
    /// Ask the running service on `{path}/__catalogue`.
    Bus(Arc<dyn Transport>),
    /// HTTP GET returning schema SDL.
    Http(String),
    /// Local SDL file, relative to the client's base directory.
    File(PathBuf),
}

impl std::fmt::Debug for CatalogueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bus(_) => f.write_str("Bus"),
            Self::Http(url) => f.debug_tuple("Http").field(url).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Options for one generated client package.
///
/// `service`, `connection`, `package` and `output_dir` are required;
/// [`crate::Generator::add_client`] rejects the config otherwise.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub service: String,
    pub connection: Option<CatalogueSource>,
    /// Rust module name of the generated package.
    pub package: Option<String>,
    pub output_dir: Option<PathBuf>,
    /// Defaults to `**/*.graphql`.
    pub query_glob: Option<String>,
    /// Relative paths (query glob, output dir, schema file) resolve here.
    pub base_dir: PathBuf,
    /// Subject prefix of the remote service. Defaults to the service name.
    pub path: Option<String>,
    pub codec: Codec,
    pub stale: StaleBindings,
    pub renderer: String,
    /// Bound on the catalogue request when fetching over the bus.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            connection: None,
            package: None,
            output_dir: None,
            query_glob: None,
            base_dir: PathBuf::from("."),
            path: None,
            codec: Codec::default(),
            stale: StaleBindings::default(),
            renderer: DEFAULT_RENDERER.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Build from a `[[clients]]` config section whose relative paths are
    /// anchored at `base_dir`.
    pub fn from_section(section: &ClientSection, base_dir: impl Into<PathBuf>) -> Self {
        let connection = match &section.catalogue {
            CatalogueSection::Url(url) => CatalogueSource::Http(url.clone()),
            CatalogueSection::File(path) => CatalogueSource::File(path.clone()),
        };
        Self {
            connection: Some(connection),
            package: Some(section.package.clone()),
            output_dir: Some(section.output_dir.clone()),
            query_glob: section.query_glob.clone(),
            base_dir: base_dir.into(),
            path: section.path.clone(),
            codec: section.codec,
            stale: section.stale,
            renderer: section.renderer().to_string(),
            ..Self::new(section.service.clone())
        }
    }

    #[must_use]
    pub fn with_connection(mut self, connection: CatalogueSource) -> Self {
        self.connection = Some(connection);
        self
    }

    #[must_use]
    pub fn with_package(
        mut self,
        package: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        self.package = Some(package.into());
        self.output_dir = Some(output_dir.into());
        self
    }

    #[must_use]
    pub fn with_query_glob(mut self, glob: impl Into<String>) -> Self {
        self.query_glob = Some(glob.into());
        self
    }

    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

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
    pub fn with_stale(mut self, stale: StaleBindings) -> Self {
        self.stale = stale;
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: impl Into<String>) -> Self {
        self.renderer = renderer.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn query_glob(&self) -> &str {
        self.query_glob.as_deref().unwrap_or(DEFAULT_QUERY_GLOB)
    }
}
