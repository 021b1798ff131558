//! The `rust` renderer: one module per operation, a shared `types` module for
//! enums and input objects, and a package `mod.rs` holding the `Client`.
//!
//! Generated code only depends on `gqlbus-runtime`; serde is reached through
//! its re-export.

use std::{
    collections::HashSet,
    fmt::{self, Write},
};

use {
    gqlbus_codec::Codec,
    gqlbus_common::naming::{is_keyword, rust_field_ident, to_pascal_case},
    gqlbus_protocol::OperationKind,
};

use crate::{
    error::{Error, Result},
    model::{EnumModel, FieldModel, InputModel, PackageModel, QueryDefinition, TypeKind, TypeRef},
    render::{GENERATED_HEADER, RenderedFile, Renderer},
};

const SERDE_CRATE: &str = r#"#[serde(crate = "gqlbus_runtime::serde")]"#;
const SKIP_NONE: &str = r#"#[serde(default, skip_serializing_if = "Option::is_none")]"#;

/// Std names generated code relies on; schema types with these names get a
/// prefix.
const SHADOWED: &[&str] = &["Box", "Option", "Result", "Vec"];

/// Methods `Client` already has.
const RESERVED_METHODS: &[&str] = &["new", "service", "default_options"];

/// Names `mod.rs` already defines or imports.
const MOD_ITEMS: &[&str] = &["Arc", "Client", "ClientOptions", "Codec", "RemoteService", "Transport"];

/// Module holding the package's enums and input objects.
const TYPES_MODULE: &str = "types";

#[derive(Debug, Clone, Copy, Default)]
pub struct RustRenderer;

impl Renderer for RustRenderer {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn render(&self, package: &PackageModel) -> Result<Vec<RenderedFile>> {
        let modules = module_names(&package.operations)?;
        let mut names = StructNames::default();
        for item in MOD_ITEMS {
            names.claim((*item).to_string());
        }
        for op in &package.operations {
            names.claim(data_ident(op));
            names.claim(variables_ident(op));
        }

        let mut files = Vec::new();
        let mut exports = Vec::new();
        for (op, module) in package.operations.iter().zip(&modules) {
            let structs = operation_structs(op, &mut names);
            let contents = render_operation(op, &structs).map_err(render_error)?;
            files.push(RenderedFile::new(format!("{}.rs", module.file), contents));
            exports.push((
                module.ident.clone(),
                structs.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
            ));
        }

        let has_types = !package.enums.is_empty() || !package.inputs.is_empty();
        if has_types {
            let contents = render_types(package).map_err(render_error)?;
            files.push(RenderedFile::new(format!("{TYPES_MODULE}.rs"), contents));
        }
        let contents = render_mod(package, has_types, &exports).map_err(render_error)?;
        files.push(RenderedFile::new("mod.rs", contents));
        Ok(files)
    }
}

fn render_error(e: fmt::Error) -> Error {
    Error::Render(e.to_string())
}

// ── Naming ──────────────────────────────────────────────────────────────────

struct ModuleName {
    /// As written in Rust source, possibly `r#`-prefixed.
    ident: String,
    /// File stem.
    file: String,
}

fn module_names(operations: &[QueryDefinition]) -> Result<Vec<ModuleName>> {
    let mut seen: Vec<(String, &str)> = Vec::new();
    let mut modules = Vec::with_capacity(operations.len());
    for op in operations {
        let ident = rust_field_ident(&op.name);
        let file = ident.trim_start_matches("r#").to_string();
        if file == TYPES_MODULE || RESERVED_METHODS.contains(&file.as_str()) {
            return Err(Error::config(
                "query_glob",
                format!("operation `{}` maps to the reserved name `{file}`", op.name),
            ));
        }
        if let Some((_, first)) = seen.iter().find(|(f, _)| *f == file) {
            return Err(Error::config(
                "query_glob",
                format!(
                    "operations `{first}` and `{}` both map to `{file}`",
                    op.name
                ),
            ));
        }
        seen.push((file.clone(), &op.name));
        modules.push(ModuleName { ident, file });
    }
    Ok(modules)
}

/// Rust name for a schema enum or input object.
fn type_ident(name: &str) -> String {
    if SHADOWED.contains(&name) || is_keyword(name) {
        format!("Gql{name}")
    } else {
        name.to_string()
    }
}

/// Struct names already handed out in this package.
#[derive(Default)]
struct StructNames {
    used: HashSet<String>,
}

impl StructNames {
    fn claim(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Field identifiers for `keys`, deduplicated after snake-casing.
fn field_idents<'k>(keys: impl Iterator<Item = &'k str>) -> Vec<String> {
    let mut used = HashSet::new();
    keys.map(|key| {
        let base = rust_field_ident(key);
        let mut ident = base.clone();
        let mut n = 2;
        while !used.insert(ident.clone()) {
            ident = format!("{}_{n}", base.trim_start_matches("r#"));
            n += 1;
        }
        ident
    })
    .collect()
}

fn rename_attr(ident: &str, key: &str) -> Option<String> {
    (ident.trim_start_matches("r#") != key).then(|| format!(r#"#[serde(rename = "{key}")]"#))
}

fn pascal_segment(key: &str) -> String {
    let pascal = to_pascal_case(key);
    if pascal.is_empty() {
        "Field".to_string()
    } else {
        pascal
    }
}

// ── Types ───────────────────────────────────────────────────────────────────

fn scalar(name: &str) -> &'static str {
    match name {
        "Int" => "i32",
        "Float" => "f64",
        "Boolean" => "bool",
        "String" | "ID" => "String",
        _ => "gqlbus_runtime::serde_json::Value",
    }
}

/// Wrap `leaf` in the list and nullability layers of `ty`.
fn rust_type(ty: &TypeRef, leaf: &str) -> String {
    let (inner, nullable) = match ty {
        TypeRef::Named { nullable, .. } => (leaf.to_string(), *nullable),
        TypeRef::List { of, nullable } => (format!("Vec<{}>", rust_type(of, leaf)), *nullable),
    };
    if nullable {
        format!("Option<{inner}>")
    } else {
        inner
    }
}

/// Leaf type for an input-position type, `prefix` locating the types module.
fn input_leaf(ty: &TypeRef, kind: TypeKind, prefix: &str) -> String {
    match kind {
        TypeKind::Enum | TypeKind::InputObject => {
            format!("{prefix}{}", type_ident(ty.base_name()))
        },
        _ => scalar(ty.base_name()).to_string(),
    }
}

struct StructDef {
    name: String,
    doc: Option<String>,
    derive_default: bool,
    fields: Vec<FieldLine>,
}

struct FieldLine {
    attrs: Vec<String>,
    ident: String,
    ty: String,
}

/// Prefix shared by every struct generated for `op`.
fn type_prefix(op: &QueryDefinition) -> String {
    to_pascal_case(&op.name)
}

fn data_ident(op: &QueryDefinition) -> String {
    format!("{}Data", type_prefix(op))
}

fn variables_ident(op: &QueryDefinition) -> String {
    format!("{}Variables", type_prefix(op))
}

fn operation_structs(op: &QueryDefinition, names: &mut StructNames) -> Vec<StructDef> {
    let idents = field_idents(op.variables.iter().map(|v| v.name.as_str()));
    let fields = op
        .variables
        .iter()
        .zip(idents)
        .map(|(var, ident)| {
            let mut ty = rust_type(&var.ty, &input_leaf(&var.ty, var.kind, "super::types::"));
            let mut attrs: Vec<String> = rename_attr(&ident, &var.name).into_iter().collect();
            if var.is_optional() {
                if !var.ty.is_nullable() {
                    ty = format!("Option<{ty}>");
                }
                attrs.push(SKIP_NONE.to_string());
            }
            FieldLine { attrs, ident, ty }
        })
        .collect::<Vec<_>>();

    let mut structs = vec![StructDef {
        name: variables_ident(op),
        doc: Some(format!("Variables of `{}`.", op.name)),
        derive_default: op.variables.iter().all(|v| v.is_optional()),
        fields,
    }];
    selection_structs(
        names,
        data_ident(op),
        Some(format!("Result of `{}`.", op.name)),
        &type_prefix(op),
        &op.selection,
        &mut structs,
    );
    structs
}

fn selection_structs(
    names: &mut StructNames,
    name: String,
    doc: Option<String>,
    prefix: &str,
    selection: &[FieldModel],
    out: &mut Vec<StructDef>,
) {
    let idents = field_idents(selection.iter().map(|f| f.key.as_str()));
    let mut nested = Vec::new();
    let mut fields = Vec::with_capacity(selection.len());
    for (field, ident) in selection.iter().zip(idents) {
        let leaf = match field.kind {
            kind if kind.is_composite() => {
                let nested_name = names.claim(format!("{prefix}{}", pascal_segment(&field.key)));
                nested.push((nested_name.clone(), &field.selection));
                nested_name
            },
            TypeKind::Enum => format!("super::types::{}", type_ident(field.ty.base_name())),
            _ => scalar(field.ty.base_name()).to_string(),
        };
        let mut ty = rust_type(&field.ty, &leaf);
        let mut attrs: Vec<String> = rename_attr(&ident, &field.key).into_iter().collect();
        if field.conditional {
            if !field.ty.is_nullable() {
                ty = format!("Option<{ty}>");
            }
            attrs.push("#[serde(default)]".to_string());
        }
        fields.push(FieldLine { attrs, ident, ty });
    }
    out.push(StructDef {
        name,
        doc,
        derive_default: false,
        fields,
    });
    for (nested_name, selection) in nested {
        let prefix = nested_name.clone();
        selection_structs(names, nested_name, None, &prefix, selection, out);
    }
}

// ── Writers ─────────────────────────────────────────────────────────────────

fn write_struct(out: &mut String, def: &StructDef) -> fmt::Result {
    writeln!(out)?;
    if let Some(doc) = &def.doc {
        writeln!(out, "/// {doc}")?;
    }
    let default = if def.derive_default { "Default, " } else { "" };
    writeln!(
        out,
        "#[derive(Debug, Clone, {default}PartialEq, Serialize, Deserialize)]"
    )?;
    writeln!(out, "{SERDE_CRATE}")?;
    if def.fields.is_empty() {
        return writeln!(out, "pub struct {} {{}}", def.name);
    }
    writeln!(out, "pub struct {} {{", def.name)?;
    for field in &def.fields {
        for attr in &field.attrs {
            writeln!(out, "    {attr}")?;
        }
        writeln!(out, "    pub {}: {},", field.ident, field.ty)?;
    }
    writeln!(out, "}}")
}

fn render_operation(op: &QueryDefinition, structs: &[StructDef]) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "{GENERATED_HEADER}")?;
    writeln!(out, "// source: {}", op.source)?;
    writeln!(out)?;
    writeln!(out, "use gqlbus_runtime::serde::{{Deserialize, Serialize}};")?;
    writeln!(out)?;
    let kind = match op.kind {
        OperationKind::Query => "Query",
        OperationKind::Mutation => "Mutation",
        OperationKind::Subscription => "Subscription",
    };
    writeln!(out, "pub const OPERATION: gqlbus_runtime::Operation = gqlbus_runtime::Operation {{")?;
    writeln!(out, "    name: {:?},", op.name)?;
    writeln!(out, "    kind: gqlbus_runtime::OperationKind::{kind},")?;
    writeln!(out, "    document: {:?},", op.document)?;
    writeln!(out, "}};")?;

    for def in structs {
        write_struct(&mut out, def)?;
    }

    let method = rust_field_ident(&op.name);
    let (ret, call) = if op.kind.is_streaming() {
        (format!("gqlbus_runtime::StreamHandle<{}>", data_ident(op)), "subscribe")
    } else {
        (data_ident(op), "execute")
    };
    writeln!(out)?;
    writeln!(out, "impl super::Client {{")?;
    writeln!(out, "    /// Runs the `{}` {}.", op.name, op.kind)?;
    writeln!(out, "    pub async fn {method}(")?;
    writeln!(out, "        &self,")?;
    writeln!(out, "        ctx: &gqlbus_runtime::CallContext,")?;
    writeln!(out, "        variables: &{},", variables_ident(op))?;
    writeln!(out, "    ) -> gqlbus_runtime::Result<{ret}> {{")?;
    writeln!(out, "        self.service.{call}(ctx, &OPERATION, variables).await")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    Ok(out)
}

fn write_enum(out: &mut String, model: &EnumModel) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]")?;
    writeln!(out, "{SERDE_CRATE}")?;
    writeln!(out, "pub enum {} {{", type_ident(&model.name))?;
    let mut used = HashSet::new();
    for value in &model.values {
        let mut variant = pascal_segment(value);
        if is_keyword(&variant) {
            variant.push('_');
        }
        let base = variant.clone();
        let mut n = 2;
        while !used.insert(variant.clone()) {
            variant = format!("{base}{n}");
            n += 1;
        }
        if variant != *value {
            writeln!(out, "    #[serde(rename = \"{value}\")]")?;
        }
        writeln!(out, "    {variant},")?;
    }
    writeln!(out, "}}")
}

fn input_struct(model: &InputModel) -> StructDef {
    let idents = field_idents(model.fields.iter().map(|f| f.name.as_str()));
    let fields = model
        .fields
        .iter()
        .zip(idents)
        .map(|(field, ident)| {
            let mut leaf = input_leaf(&field.ty, field.kind, "");
            if field.recursive {
                leaf = format!("Box<{leaf}>");
            }
            let mut attrs: Vec<String> = rename_attr(&ident, &field.name).into_iter().collect();
            if field.ty.is_nullable() {
                attrs.push(SKIP_NONE.to_string());
            }
            FieldLine {
                attrs,
                ident,
                ty: rust_type(&field.ty, &leaf),
            }
        })
        .collect();
    StructDef {
        name: type_ident(&model.name),
        doc: None,
        derive_default: model.fields.iter().all(|f| f.ty.is_nullable()),
        fields,
    }
}

fn render_types(package: &PackageModel) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "{GENERATED_HEADER}")?;
    writeln!(out, "// service: {}", package.service)?;
    writeln!(out)?;
    writeln!(out, "use gqlbus_runtime::serde::{{Deserialize, Serialize}};")?;
    for model in &package.enums {
        write_enum(&mut out, model)?;
    }
    for model in &package.inputs {
        write_struct(&mut out, &input_struct(model))?;
    }
    Ok(out)
}

fn render_mod(
    package: &PackageModel,
    has_types: bool,
    exports: &[(String, Vec<String>)],
) -> std::result::Result<String, fmt::Error> {
    let codec = match package.codec {
        Codec::Json => "Json",
        Codec::MsgPack => "MsgPack",
    };
    let mut out = String::new();
    writeln!(out, "{GENERATED_HEADER}")?;
    writeln!(out, "// service: {}", package.service)?;
    writeln!(out)?;
    writeln!(out, "use std::sync::Arc;")?;
    writeln!(out)?;
    writeln!(out, "use gqlbus_runtime::{{ClientOptions, Codec, RemoteService, Transport}};")?;
    writeln!(out)?;
    if has_types {
        writeln!(out, "pub mod {TYPES_MODULE};")?;
    }
    for (module, _) in exports {
        writeln!(out, "pub mod {module};")?;
    }
    if !exports.is_empty() {
        writeln!(out)?;
    }
    for (module, names) in exports {
        writeln!(out, "pub use {module}::{{{}}};", names.join(", "))?;
    }
    if !exports.is_empty() {
        writeln!(out)?;
    }
    writeln!(out, "/// Remote service name.")?;
    writeln!(out, "pub const SERVICE: &str = {:?};", package.service)?;
    writeln!(out, "/// Subject prefix the service listens on.")?;
    writeln!(out, "pub const SERVICE_PATH: &str = {:?};", package.path)?;
    writeln!(out)?;
    writeln!(out, "/// Client for `{}`.", package.service)?;
    writeln!(out, "#[derive(Debug, Clone)]")?;
    writeln!(out, "pub struct Client {{")?;
    writeln!(out, "    service: RemoteService,")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl Client {{")?;
    writeln!(out, "    /// Options matching the generator configuration.")?;
    writeln!(out, "    pub fn default_options() -> ClientOptions {{")?;
    writeln!(out, "        ClientOptions::default()")?;
    writeln!(out, "            .with_codec(Codec::{codec})")?;
    writeln!(out, "            .with_path(SERVICE_PATH)")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    /// An unset `options.path` falls back to [`SERVICE_PATH`].")?;
    writeln!(out, "    pub fn new(transport: Arc<dyn Transport>, mut options: ClientOptions) -> Self {{")?;
    writeln!(out, "        if options.path.is_none() {{")?;
    writeln!(out, "            options.path = Some(SERVICE_PATH.to_string());")?;
    writeln!(out, "        }}")?;
    writeln!(out, "        Self {{")?;
    writeln!(out, "            service: RemoteService::new(SERVICE, transport, options),")?;
    writeln!(out, "        }}")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    pub fn service(&self) -> &RemoteService {{")?;
    writeln!(out, "        &self.service")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    Ok(out)
}
