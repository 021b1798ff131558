//! Pluggable binding renderers.
//!
//! A [`Renderer`] turns one analysed [`PackageModel`] into a set of files. The
//! generator owns a [`RendererRegistry`] and looks renderers up by the name a
//! client asks for; nothing registers itself globally.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use crate::{error::Result, model::PackageModel};

pub mod rust;

pub use rust::RustRenderer;

/// First line of every generated file. Stale-binding pruning only ever
/// touches files that start with it.
pub const GENERATED_HEADER: &str = "// Code generated by gqlbus. DO NOT EDIT.";

/// One output file, relative to the client's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub contents: String,
}

impl RenderedFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

pub trait Renderer: Send + Sync {
    /// Name clients select the renderer by.
    fn name(&self) -> &'static str;

    /// Render the whole package. Output must depend on `package` only.
    fn render(&self, package: &PackageModel) -> Result<Vec<RenderedFile>>;

    /// Whether an existing file in the output directory was produced by this
    /// renderer.
    fn is_generated(&self, contents: &str) -> bool {
        contents.starts_with(GENERATED_HEADER)
    }
}

/// Renderers available to a [`crate::Generator`], keyed by name.
#[derive(Clone)]
pub struct RendererRegistry {
    renderers: BTreeMap<&'static str, Arc<dyn Renderer>>,
}

impl RendererRegistry {
    /// A registry with no renderers at all.
    pub fn empty() -> Self {
        Self {
            renderers: BTreeMap::new(),
        }
    }

    /// Add or replace a renderer under its own name.
    pub fn register(&mut self, renderer: impl Renderer + 'static) {
        self.renderers.insert(renderer.name(), Arc::new(renderer));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Renderer>> {
        self.renderers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.renderers.keys().copied().collect()
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(RustRenderer);
        registry
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("renderers", &self.names())
            .finish()
    }
}
