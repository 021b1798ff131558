//! The loaded `gqlbus.toml` and the objects built from it.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result, bail},
    gqlbus_codegen::{ClientConfig, Generator, ServerScaffold},
    gqlbus_config::GeneratorConfig,
    tracing::debug,
};

pub struct ProjectConfig {
    pub path: PathBuf,
    /// Relative paths in the config resolve against this directory.
    pub base_dir: PathBuf,
    pub config: GeneratorConfig,
}

impl ProjectConfig {
    /// Load `path`, or discover a config file when none is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, config) = match path {
            Some(path) => (path.to_path_buf(), gqlbus_config::load_config(path)?),
            None => match gqlbus_config::discover()? {
                Some(found) => found,
                None => bail!("no gqlbus.toml found in the current directory or the user config dir"),
            },
        };
        let base_dir = gqlbus_config::base_dir(&path);
        debug!(path = %path.display(), clients = config.clients.len(), "config loaded");
        Ok(Self {
            path,
            base_dir,
            config,
        })
    }

    /// A generator with every configured client, or only those named in
    /// `only` when it is non-empty.
    pub fn generator(&self, only: &[String]) -> Result<Generator> {
        for name in only {
            if !self.config.clients.iter().any(|c| &c.service == name) {
                bail!("no client for service `{name}` in {}", self.path.display());
            }
        }
        let mut generator = Generator::new();
        for section in &self.config.clients {
            if !only.is_empty() && !only.contains(&section.service) {
                continue;
            }
            generator
                .add_client(ClientConfig::from_section(section, &self.base_dir))
                .with_context(|| format!("client `{}`", section.service))?;
        }
        Ok(generator)
    }

    pub fn scaffold(&self) -> Result<ServerScaffold> {
        let section = self
            .config
            .server
            .as_ref()
            .with_context(|| format!("no [server] section in {}", self.path.display()))?;
        Ok(ServerScaffold::from_section(section, &self.base_dir))
    }
}
