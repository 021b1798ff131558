//! Client registration and package generation.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    globset::{GlobBuilder, GlobMatcher},
    gqlbus_common::naming::is_valid_module_name,
    tracing::{debug, info, warn},
    walkdir::{DirEntry, WalkDir},
};

use crate::{
    analysis::{self, QuerySource},
    catalogue::{Catalogue, fetch_sdl},
    config::{CatalogueSource, ClientConfig, StaleBindings},
    error::{Error, Result},
    model::PackageModel,
    render::{RenderedFile, Renderer, RendererRegistry},
};

/// Directories never searched for query documents.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// What one `generate` run did for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientReport {
    pub service: String,
    pub output_dir: PathBuf,
    pub operations: usize,
    /// Paths relative to `output_dir`.
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    /// Stale bindings removed under [`StaleBindings::Prune`].
    pub pruned: Vec<PathBuf>,
    /// Stale bindings left in place under [`StaleBindings::Preserve`].
    pub stale: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateReport {
    pub clients: Vec<ClientReport>,
}

impl GenerateReport {
    pub fn files_written(&self) -> usize {
        self.clients.iter().map(|c| c.written.len()).sum()
    }
}

/// A validated client registration.
struct ClientPlan {
    config: ClientConfig,
    connection: CatalogueSource,
    package: String,
    output_dir: PathBuf,
    path: String,
    renderer: Arc<dyn Renderer>,
}

/// Generates typed client packages for remote bus services.
///
/// Clients are validated as they are added; [`Generator::generate`] then
/// fetches each catalogue, analyses the local query documents and writes one
/// package per client.
pub struct Generator {
    registry: RendererRegistry,
    clients: Vec<ClientPlan>,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    pub fn new() -> Self {
        Self::with_registry(RendererRegistry::default())
    }

    pub fn with_registry(registry: RendererRegistry) -> Self {
        Self {
            registry,
            clients: Vec::new(),
        }
    }

    pub fn services(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.config.service.as_str()).collect()
    }

    /// Register a client. A rejected config leaves the generator unchanged.
    pub fn add_client(&mut self, config: ClientConfig) -> Result<()> {
        let service = config.service.trim();
        if service.is_empty() {
            return Err(Error::config("service", "a service name is required"));
        }
        if self.clients.iter().any(|c| c.config.service == service) {
            return Err(Error::config(
                "service",
                format!("`{service}` is already registered"),
            ));
        }
        let connection = config.connection.clone().ok_or_else(|| {
            Error::config("connection", format!("no catalogue source for `{service}`"))
        })?;
        let package = config
            .package
            .clone()
            .ok_or_else(|| Error::config("package", format!("no package name for `{service}`")))?;
        if !is_valid_module_name(&package) {
            return Err(Error::config(
                "package",
                format!("`{package}` is not a valid Rust module name"),
            ));
        }
        let output_dir = config
            .output_dir
            .as_ref()
            .map(|dir| config.base_dir.join(dir))
            .ok_or_else(|| {
                Error::config("output_dir", format!("no output directory for `{service}`"))
            })?;
        let renderer = self.registry.get(&config.renderer).ok_or_else(|| {
            Error::config(
                "renderer",
                format!(
                    "unknown renderer `{}` (available: {})",
                    config.renderer,
                    self.registry.names().join(", ")
                ),
            )
        })?;

        let queries = discover_queries(&config.base_dir, config.query_glob())?;
        if queries.is_empty() {
            return Err(Error::config(
                "query_glob",
                format!(
                    "`{}` matches no files under {}",
                    config.query_glob(),
                    config.base_dir.display()
                ),
            ));
        }

        let path = gqlbus_protocol::subject::normalize(config.path.as_deref().unwrap_or(service));
        info!(
            service,
            package = %package,
            queries = queries.len(),
            renderer = renderer.name(),
            "client registered"
        );
        self.clients.push(ClientPlan {
            config: ClientConfig {
                service: service.to_string(),
                ..config
            },
            connection,
            package,
            output_dir,
            path,
            renderer,
        });
        Ok(())
    }

    /// Fetch catalogues and analyse every client without writing anything.
    pub async fn analyse(&self) -> Result<Vec<PackageModel>> {
        let mut packages = Vec::with_capacity(self.clients.len());
        for plan in &self.clients {
            packages.push(self.package_model(plan).await?);
        }
        Ok(packages)
    }

    /// Generate every registered client.
    ///
    /// All clients are analysed and rendered before the first file is
    /// written, so a failure leaves every output directory untouched.
    pub async fn generate(&self) -> Result<GenerateReport> {
        let mut rendered = Vec::with_capacity(self.clients.len());
        for plan in &self.clients {
            let package = self.package_model(plan).await?;
            let files = plan.renderer.render(&package)?;
            check_overwrites(plan, &files)?;
            rendered.push((plan, package.operations.len(), files));
        }

        let mut report = GenerateReport::default();
        for (plan, operations, files) in rendered {
            let client = write_package(plan, operations, &files)?;
            info!(
                service = %client.service,
                written = client.written.len(),
                unchanged = client.unchanged.len(),
                pruned = client.pruned.len(),
                "client generated"
            );
            report.clients.push(client);
        }
        Ok(report)
    }

    async fn package_model(&self, plan: &ClientPlan) -> Result<PackageModel> {
        let config = &plan.config;
        let sdl = fetch_sdl(
            &plan.connection,
            &config.service,
            &plan.path,
            config.codec,
            &config.base_dir,
            config.timeout,
        )
        .await?;
        let catalogue = Catalogue::parse(&sdl).map_err(|e| Error::catalogue(&config.service, e))?;

        let sources = discover_queries(&config.base_dir, config.query_glob())?
            .into_iter()
            .map(|(file, path)| {
                let text = fs::read_to_string(&file).map_err(Error::io(&file))?;
                Ok(QuerySource { path, text })
            })
            .collect::<Result<Vec<_>>>()?;
        if sources.is_empty() {
            return Err(Error::config(
                "query_glob",
                format!("`{}` no longer matches any file", config.query_glob()),
            ));
        }

        let analysis = analysis::analyse(&catalogue, &sources)?;
        debug!(
            service = %config.service,
            operations = analysis.operations.len(),
            enums = analysis.enums.len(),
            inputs = analysis.inputs.len(),
            "queries analysed"
        );
        Ok(PackageModel {
            service: config.service.clone(),
            package: plan.package.clone(),
            path: plan.path.clone(),
            codec: config.codec,
            operations: analysis.operations,
            enums: analysis.enums,
            inputs: analysis.inputs,
        })
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("registry", &self.registry)
            .field("clients", &self.services())
            .finish()
    }
}

// ── Query discovery ─────────────────────────────────────────────────────────

fn matcher(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| Error::config("query_glob", e.to_string()))
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') || SKIPPED_DIRS.contains(&name))
}

/// Files under `base_dir` matching `pattern`, as `(absolute, relative)`
/// pairs sorted by relative path. Relative paths use `/`.
fn discover_queries(base_dir: &Path, pattern: &str) -> Result<Vec<(PathBuf, String)>> {
    let matcher = matcher(pattern)?;
    let mut found = Vec::new();
    for entry in WalkDir::new(base_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
    {
        let entry = entry.map_err(|e| Error::Io {
            path: e.path().unwrap_or(base_dir).to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(base_dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if matcher.is_match(&relative) {
            found.push((entry.path().to_path_buf(), relative));
        }
    }
    found.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(found)
}

// ── Output ──────────────────────────────────────────────────────────────────

/// Refuse to replace files that were not generated.
fn check_overwrites(plan: &ClientPlan, files: &[RenderedFile]) -> Result<()> {
    for file in files {
        let target = plan.output_dir.join(&file.path);
        if let Ok(existing) = fs::read_to_string(&target)
            && !plan.renderer.is_generated(&existing)
        {
            return Err(Error::config(
                "output_dir",
                format!("refusing to overwrite hand-written {}", target.display()),
            ));
        }
    }
    Ok(())
}

fn write_package(plan: &ClientPlan, operations: usize, files: &[RenderedFile]) -> Result<ClientReport> {
    let out = &plan.output_dir;
    fs::create_dir_all(out).map_err(Error::io(out))?;

    let mut report = ClientReport {
        service: plan.config.service.clone(),
        output_dir: out.clone(),
        operations,
        written: Vec::new(),
        unchanged: Vec::new(),
        pruned: Vec::new(),
        stale: Vec::new(),
    };

    for file in files {
        let target = out.join(&file.path);
        if fs::read_to_string(&target).is_ok_and(|existing| existing == file.contents) {
            report.unchanged.push(file.path.clone());
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(Error::io(parent))?;
        }
        fs::write(&target, &file.contents).map_err(Error::io(&target))?;
        debug!(path = %target.display(), "wrote binding");
        report.written.push(file.path.clone());
    }

    let current: BTreeSet<&Path> = files.iter().map(|f| f.path.as_path()).collect();
    let mut stale = Vec::new();
    for entry in fs::read_dir(out).map_err(Error::io(out))? {
        let entry = entry.map_err(Error::io(out))?;
        let name = PathBuf::from(entry.file_name());
        if current.contains(name.as_path()) || !entry.path().is_file() {
            continue;
        }
        if fs::read_to_string(entry.path()).is_ok_and(|text| plan.renderer.is_generated(&text)) {
            stale.push(name);
        }
    }
    stale.sort();

    for name in stale {
        match plan.config.stale {
            StaleBindings::Prune => {
                let target = out.join(&name);
                fs::remove_file(&target).map_err(Error::io(&target))?;
                info!(path = %target.display(), "pruned stale binding");
                report.pruned.push(name);
            },
            StaleBindings::Preserve => {
                warn!(
                    service = %plan.config.service,
                    path = %out.join(&name).display(),
                    "stale binding left in place"
                );
                report.stale.push(name);
            },
        }
    }
    Ok(report)
}
