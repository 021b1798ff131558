//! Analysis output handed to renderers. Pure data, no I/O.

use {gqlbus_codec::Codec, gqlbus_protocol::OperationKind};

pub use crate::catalogue::{TypeKind, TypeRef};

/// Everything a renderer needs to emit one client package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageModel {
    pub service: String,
    /// Rust module name of the package.
    pub package: String,
    /// Subject prefix the generated client addresses.
    pub path: String,
    pub codec: Codec,
    /// Sorted by name.
    pub operations: Vec<QueryDefinition>,
    /// Enums used by any operation, sorted by name.
    pub enums: Vec<EnumModel>,
    /// Input objects reachable from any variable, sorted by name.
    pub inputs: Vec<InputModel>,
}

/// One named operation from a local query document.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefinition {
    pub name: String,
    pub kind: OperationKind,
    /// Query file the operation came from, relative to the client base dir,
    /// `/`-separated.
    pub source: String,
    /// Normalized document with every fragment inlined.
    pub document: String,
    pub variables: Vec<VariableModel>,
    /// Root selection, resolved against the remote schema.
    pub selection: Vec<FieldModel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableModel {
    pub name: String,
    pub ty: TypeRef,
    pub kind: TypeKind,
    /// A default in the document makes the variable optional.
    pub has_default: bool,
}

impl VariableModel {
    pub fn is_optional(&self) -> bool {
        self.has_default || self.ty.is_nullable()
    }
}

/// A selected field, keyed by its response name (alias or field name).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldModel {
    pub key: String,
    pub ty: TypeRef,
    pub kind: TypeKind,
    /// Only selected under a type condition or `@skip`/`@include`, so it may
    /// be absent from the response.
    pub conditional: bool,
    pub selection: Vec<FieldModel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumModel {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputModel {
    pub name: String,
    pub fields: Vec<InputFieldModel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputFieldModel {
    pub name: String,
    pub ty: TypeRef,
    pub kind: TypeKind,
    /// The field refers back to its owner without a list in between and
    /// must be boxed.
    pub recursive: bool,
}
