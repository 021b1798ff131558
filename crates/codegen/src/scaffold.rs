//! One-shot server entrypoint emitter.
//!
//! Writes a `main.rs` that serves the schema built by the exec module over the
//! bus. An existing file is never touched.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {
    askama::Template,
    gqlbus_codec::Codec,
    gqlbus_common::naming::{is_keyword, sanitize_identifier},
    gqlbus_config::ServerSection,
    tracing::{info, warn},
};

use crate::error::{Context, Error, Result};

/// Inputs for [`emit_server_main`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerScaffold {
    pub service: String,
    /// Target file.
    pub output: PathBuf,
    /// Module exposing `Resolver: Default`.
    pub resolver_module: String,
    /// Module exposing `build_schema(Resolver)`.
    pub exec_module: String,
    pub path: Option<String>,
    pub codec: Codec,
}

impl ServerScaffold {
    /// Build from a `[server]` section whose output path is relative to
    /// `base_dir`.
    pub fn from_section(section: &ServerSection, base_dir: &Path) -> Self {
        Self {
            service: section.service.clone(),
            output: base_dir.join(&section.output),
            resolver_module: section.resolver_module.clone(),
            exec_module: section.exec_module.clone(),
            path: section.path.clone(),
            codec: section.codec,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaffoldOutcome {
    Written,
    /// The target already existed.
    Skipped,
}

#[derive(Template)]
#[template(path = "server_main.rs.txt", escape = "none")]
struct ServerMainTemplate<'a> {
    service: &'a str,
    service_literal: String,
    ident: String,
    modules: Vec<String>,
    resolver_module: &'a str,
    exec_module: &'a str,
    path_expr: String,
    codec: &'static str,
}

/// Write the server `main.rs` unless it already exists.
///
/// Not safe against a concurrent run on the same target.
pub fn emit_server_main(scaffold: &ServerScaffold) -> Result<ScaffoldOutcome> {
    if scaffold.output.exists() {
        warn!(
            path = %scaffold.output.display(),
            "server entrypoint already exists, leaving it untouched"
        );
        return Ok(ScaffoldOutcome::Skipped);
    }
    let contents = render_server_main(scaffold)?;
    if let Some(parent) = scaffold.output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(Error::io(parent))?;
    }
    fs::write(&scaffold.output, contents).map_err(Error::io(&scaffold.output))?;
    info!(
        service = %scaffold.service,
        path = %scaffold.output.display(),
        "server entrypoint written"
    );
    Ok(ScaffoldOutcome::Written)
}

/// Render the entrypoint source without touching the file system.
pub fn render_server_main(scaffold: &ServerScaffold) -> Result<String> {
    if scaffold.service.trim().is_empty() {
        return Err(Error::config("service", "a service name is required"));
    }
    check_module_path("resolver_module", &scaffold.resolver_module)?;
    check_module_path("exec_module", &scaffold.exec_module)?;

    let mut modules: Vec<String> = Vec::new();
    for module in [&scaffold.resolver_module, &scaffold.exec_module] {
        if let Some(top) = crate_module(module)
            && !modules.iter().any(|m| m == top)
        {
            modules.push(top.to_string());
        }
    }

    let template = ServerMainTemplate {
        service: &scaffold.service,
        service_literal: format!("{:?}", scaffold.service),
        ident: sanitize_identifier(&scaffold.service),
        modules,
        resolver_module: &scaffold.resolver_module,
        exec_module: &scaffold.exec_module,
        path_expr: match &scaffold.path {
            Some(path) => format!("Some({path:?}.to_string())"),
            None => "None".to_string(),
        },
        codec: match scaffold.codec {
            Codec::Json => "Json",
            Codec::MsgPack => "MsgPack",
        },
    };
    let mut contents = template
        .render()
        .with_context(|| format!("failed to render the `{}` entrypoint", scaffold.service))?;
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    Ok(contents)
}

/// First segment below `crate::`, which `main.rs` has to declare.
fn crate_module(path: &str) -> Option<&str> {
    path.strip_prefix("crate::")?.split("::").next()
}

fn check_module_path(option: &'static str, path: &str) -> Result<()> {
    let valid = !path.is_empty()
        && path.split("::").enumerate().all(|(i, segment)| {
            let path_root = i == 0 && matches!(segment, "crate" | "super" | "self");
            path_root
                || (!segment.is_empty()
                    && !segment.starts_with(|c: char| c.is_ascii_digit())
                    && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && !is_keyword(segment))
        });
    if valid {
        Ok(())
    } else {
        Err(Error::config(option, format!("`{path}` is not a Rust module path")))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn scaffold(output: PathBuf) -> ServerScaffold {
        ServerScaffold {
            service: "ms-users v2".into(),
            output,
            resolver_module: "crate::graph".into(),
            exec_module: "crate::graph::generated".into(),
            path: None,
            codec: Codec::Json,
        }
    }

    #[test]
    fn renders_sanitized_identity_and_modules() {
        let text = render_server_main(&scaffold(PathBuf::from("main.rs"))).unwrap();
        assert!(text.contains("const SERVICE: &str = \"ms-users v2\";"));
        assert!(text.contains("let ms_users_v2_server = BusServer::new("));
        assert!(text.contains("\nmod graph;\n"));
        assert_eq!(text.matches("mod graph;").count(), 1);
        assert!(text.contains("use crate::graph::generated as exec;"));
        assert!(text.contains("use crate::graph as resolvers;"));
        assert!(text.contains("path: None,"));
        assert!(text.contains("codec: Codec::Json,"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn path_override_and_codec() {
        let mut s = scaffold(PathBuf::from("main.rs"));
        s.path = Some("graph/users".into());
        s.codec = Codec::MsgPack;
        let text = render_server_main(&s).unwrap();
        assert!(text.contains("path: Some(\"graph/users\".to_string()),"));
        assert!(text.contains("codec: Codec::MsgPack,"));
    }

    #[test]
    fn invalid_module_paths_are_rejected() {
        let mut s = scaffold(PathBuf::from("main.rs"));
        s.exec_module = "crate::graph::".into();
        assert!(matches!(
            render_server_main(&s),
            Err(Error::Configuration {
                option: "exec_module",
                ..
            })
        ));
        s.exec_module = "crate::graph::generated".into();
        s.resolver_module = "crate::type".into();
        assert!(render_server_main(&s).is_err());
    }

    #[test]
    fn writes_once_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("src/main.rs");
        let s = scaffold(target.clone());

        assert_eq!(emit_server_main(&s).unwrap(), ScaffoldOutcome::Written);
        let first = fs::read_to_string(&target).unwrap();

        fs::write(&target, "fn main() {}\n").unwrap();
        assert_eq!(emit_server_main(&s).unwrap(), ScaffoldOutcome::Skipped);
        assert_eq!(fs::read_to_string(&target).unwrap(), "fn main() {}\n");
        assert!(first.contains("BusServer::new("));
    }
}
