//! Typed client generation for GraphQL services on the bus.
//!
//! Register clients with [`Generator::add_client`], then call
//! [`Generator::generate`] to fetch each remote catalogue, check the local
//! query documents against it and write one package of bindings per client.
//! [`emit_server_main`] scaffolds the matching server entrypoint.

pub mod analysis;
pub mod catalogue;
pub mod config;
pub mod error;
pub mod generator;
pub mod model;
pub mod render;
pub mod scaffold;

pub use {
    catalogue::Catalogue,
    config::{CatalogueSource, ClientConfig, StaleBindings},
    error::{Error, Result},
    generator::{ClientReport, GenerateReport, Generator},
    model::PackageModel,
    render::{GENERATED_HEADER, RenderedFile, Renderer, RendererRegistry, RustRenderer},
    scaffold::{ScaffoldOutcome, ServerScaffold, emit_server_main, render_server_main},
};
