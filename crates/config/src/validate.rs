//! Configuration validation engine.
//!
//! Validates a config file against the known schema, flags unknown or
//! misspelled fields and checks what the generator would otherwise reject late.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use gqlbus_common::naming::is_valid_module_name;

use crate::{
    loader::{base_dir, find_config_file, load_config_value},
    schema::{CatalogueSection, GeneratorConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "duplicate",
    /// "naming", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "clients[0].package"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}]: {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Externally tagged enum: a table with exactly one of these keys.
    OneOf(&'static [&'static str]),
    Array(Box<KnownKeys>),
    Leaf,
}

const CATALOGUE_KINDS: &[&str] = &["url", "file"];

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Array, Leaf, OneOf, Struct};

    let client = Struct(HashMap::from([
        ("service", Leaf),
        ("package", Leaf),
        ("output_dir", Leaf),
        ("catalogue", OneOf(CATALOGUE_KINDS)),
        ("query_glob", Leaf),
        ("path", Leaf),
        ("codec", Leaf),
        ("stale", Leaf),
        ("renderer", Leaf),
    ]));
    let server = Struct(HashMap::from([
        ("service", Leaf),
        ("output", Leaf),
        ("resolver_module", Leaf),
        ("exec_module", Leaf),
        ("path", Leaf),
        ("codec", Leaf),
    ]));

    Struct(HashMap::from([
        ("clients", Array(Box::new(client))),
        ("server", server),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(c, d)| (*d, *c))
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered config file
/// if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(find_config_file);

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found",
            )],
            config_path: None,
        };
    };

    let mut result = match load_config_value(&actual_path) {
        Ok(value) => validate_value(value),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(Severity::Error, "syntax", "", e.to_string())],
            config_path: None,
        },
    };
    if let Ok(config) = crate::loader::load_config(&actual_path) {
        check_file_references(&config, &base_dir(&actual_path), &mut result.diagnostics);
    }
    result.config_path = Some(actual_path);
    result
}

/// Validate TOML text without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    match toml::from_str::<toml::Value>(toml_str) {
        Ok(value) => match serde_json::to_value(value) {
            Ok(value) => validate_value(value),
            Err(e) => syntax_error(format!("TOML conversion error: {e}")),
        },
        Err(e) => syntax_error(format!("TOML syntax error: {e}")),
    }
}

fn syntax_error(message: String) -> ValidationResult {
    ValidationResult {
        diagnostics: vec![Diagnostic::new(Severity::Error, "syntax", "", message)],
        config_path: None,
    }
}

fn validate_value(value: serde_json::Value) -> ValidationResult {
    let mut diagnostics = Vec::new();

    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<GeneratorConfig>(value) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (serde_json::Value::Object(table), KnownKeys::Struct(fields)) => {
            let mut known: Vec<&str> = fields.keys().copied().collect();
            known.sort_unstable();
            for (key, child) in table {
                let path = child_path(prefix, key);
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child, child_schema, &path, diagnostics);
                } else {
                    let message = match suggest(key, &known, 3) {
                        Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                        None => "unknown field".to_string(),
                    };
                    diagnostics.push(Diagnostic::new(
                        Severity::Error,
                        "unknown-field",
                        path,
                        message,
                    ));
                }
            }
        },
        (serde_json::Value::Object(table), KnownKeys::OneOf(kinds)) => {
            for key in table.keys() {
                if !kinds.contains(&key.as_str()) {
                    let hint = suggest(key, kinds, 2)
                        .map(|s| format!(" (did you mean \"{s}\"?)"))
                        .unwrap_or_default();
                    diagnostics.push(Diagnostic::new(
                        Severity::Error,
                        "unknown-field",
                        child_path(prefix, key),
                        format!("expected one of {}{hint}", kinds.join(", ")),
                    ));
                }
            }
            if table.len() > 1 {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "type-error",
                    prefix,
                    format!("set exactly one of {}", kinds.join(", ")),
                ));
            }
        },
        (serde_json::Value::Array(items), KnownKeys::Array(item_schema)) => {
            for (i, item) in items.iter().enumerate() {
                check_unknown_fields(item, item_schema, &format!("{prefix}[{i}]"), diagnostics);
            }
        },
        // Leaf or type mismatch: deserialization reports the latter
        _ => {},
    }
}

fn check_semantics(config: &GeneratorConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.clients.is_empty() && config.server.is_none() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "file-ref",
            "",
            "config defines no [[clients]] and no [server]; nothing to generate",
        ));
    }

    let mut services = HashSet::new();
    let mut outputs = HashSet::new();
    for (i, client) in config.clients.iter().enumerate() {
        let at = |field: &str| format!("clients[{i}].{field}");

        if client.service.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "type-error",
                at("service"),
                "service name must not be empty",
            ));
        } else if !services.insert(client.service.as_str()) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "duplicate",
                at("service"),
                format!("service \"{}\" is configured more than once", client.service),
            ));
        }

        if !is_valid_module_name(&client.package) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "naming",
                at("package"),
                format!("\"{}\" is not a valid Rust module name", client.package),
            ));
        }

        if client.output_dir.as_os_str().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "type-error",
                at("output_dir"),
                "output directory must not be empty",
            ));
        } else if !outputs.insert(client.output_dir.as_path()) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "duplicate",
                at("output_dir"),
                format!(
                    "output directory {} is shared with another client",
                    client.output_dir.display()
                ),
            ));
        }

        if let Err(e) = globset::Glob::new(client.query_glob()) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "type-error",
                at("query_glob"),
                format!("invalid glob: {e}"),
            ));
        }

        if let CatalogueSection::Url(url) = &client.catalogue
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "type-error",
                at("catalogue.url"),
                format!("\"{url}\" is not an http(s) URL"),
            ));
        }
    }

    if let Some(server) = &config.server {
        if server.service.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "type-error",
                "server.service",
                "service name must not be empty",
            ));
        }
        for (field, module) in [
            ("resolver_module", &server.resolver_module),
            ("exec_module", &server.exec_module),
        ] {
            let valid = !module.is_empty()
                && module.split("::").all(|seg| {
                    matches!(seg, "crate" | "self" | "super") || is_valid_module_name(seg)
                });
            if !valid {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "naming",
                    format!("server.{field}"),
                    format!("\"{module}\" is not a Rust module path"),
                ));
            }
        }
    }
}

/// Checks that need the file system, relative to the config file.
fn check_file_references(config: &GeneratorConfig, base: &Path, diagnostics: &mut Vec<Diagnostic>) {
    for (i, client) in config.clients.iter().enumerate() {
        if let CatalogueSection::File(file) = &client.catalogue
            && !base.join(file).is_file()
        {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "file-ref",
                format!("clients[{i}].catalogue.file"),
                format!("schema file {} does not exist", file.display()),
            ));
        }
    }
    if let Some(server) = &config.server
        && base.join(&server.output).exists()
    {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "file-ref",
            "server.output",
            format!(
                "{} already exists and will not be overwritten",
                server.output.display()
            ),
        ));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[[clients]]
service = "ms-users"
package = "users"
output_dir = "src/users"
catalogue = { url = "http://users:8080/sdl" }
"#;

    fn categories(result: &ValidationResult) -> Vec<(&'static str, String)> {
        result
            .diagnostics
            .iter()
            .map(|d| (d.category, d.path.clone()))
            .collect()
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("package", "package"), 0);
        assert_eq!(levenshtein("pakage", "package"), 1);
        assert_eq!(levenshtein("codce", "codec"), 2);
    }

    #[test]
    fn suggest_picks_closest() {
        assert_eq!(suggest("pakage", &["package", "path"], 3), Some("package"));
        assert_eq!(suggest("zzzzzz", &["package", "path"], 3), None);
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let result = validate_toml_str(VALID);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn syntax_error_is_reported() {
        let result = validate_toml_str("[[clients]\nservice =");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn misspelled_field_gets_suggestion() {
        let result = validate_toml_str(&VALID.replace("package =", "pakage ="));
        let unknown = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(unknown.path, "clients[0].pakage");
        assert!(unknown.message.contains("did you mean \"package\""));
        // `package` is now missing too
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "type-error" && d.message.contains("package"))
        );
    }

    #[test]
    fn catalogue_must_name_one_source() {
        let result = validate_toml_str(&VALID.replace(
            r#"{ url = "http://users:8080/sdl" }"#,
            r#"{ url = "http://a/sdl", file = "a.graphql" }"#,
        ));
        assert!(categories(&result).contains(&("type-error", "clients[0].catalogue".into())));

        let result = validate_toml_str(&VALID.replace("url =", "uri ="));
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.path == "clients[0].catalogue.uri")
            .unwrap();
        assert!(d.message.contains("did you mean \"url\""));
    }

    #[test]
    fn duplicate_services_and_bad_package() {
        let twice = format!("{VALID}{}", VALID.replace("src/users", "src/users2"));
        let result = validate_toml_str(&twice);
        assert!(categories(&result).contains(&("duplicate", "clients[1].service".into())));

        let result = validate_toml_str(&VALID.replace("\"users\"", "\"ms-users\""));
        assert!(categories(&result).contains(&("naming", "clients[0].package".into())));
    }

    #[test]
    fn non_http_url_is_rejected() {
        let result = validate_toml_str(&VALID.replace("http://users:8080/sdl", "nats://users"));
        assert!(categories(&result).contains(&("type-error", "clients[0].catalogue.url".into())));
    }

    #[test]
    fn empty_config_warns() {
        let result = validate_toml_str("");
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn server_module_paths_are_checked() {
        let result = validate_toml_str(
            r#"
[server]
service = "ms-users"
output = "src/main.rs"
resolver_module = "crate::graph"
exec_module = "crate::graph-exec"
"#,
        );
        assert_eq!(categories(&result), vec![(
            "naming",
            "server.exec_module".to_string()
        )]);
    }

    #[test]
    fn validate_file_checks_schema_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gqlbus.toml");
        std::fs::write(
            &path,
            VALID.replace(r#"{ url = "http://users:8080/sdl" }"#, r#"{ file = "users.graphql" }"#),
        )
        .unwrap();

        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert!(categories(&result).contains(&("file-ref", "clients[0].catalogue.file".into())));

        std::fs::write(dir.path().join("users.graphql"), "type Query { me: String }").unwrap();
        assert!(!validate(Some(&path)).has_errors());
    }

    #[test]
    fn validate_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gqlbus.yaml");
        std::fs::write(
            &path,
            "clients:\n  - service: ms-users\n    package: users\n    output_dir: out\n    catalogue:\n      url: http://users/sdl\n    codecc: json\n",
        )
        .unwrap();
        let result = validate(Some(&path));
        assert!(categories(&result).contains(&("unknown-field", "clients[0].codecc".into())));
    }
}
