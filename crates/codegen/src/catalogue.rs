//! Remote schema catalogue: fetching SDL and indexing its types.

use std::{collections::BTreeMap, path::Path, time::Duration};

use {
    async_graphql::parser::{
        Positioned, parse_schema,
        types::{BaseType, FieldDefinition, Type, TypeKind as AstKind, TypeSystemDefinition},
    },
    bytes::Bytes,
    gqlbus_codec::Codec,
    gqlbus_protocol::{OperationKind, ResponseEnvelope, catalogue_subject},
    tracing::debug,
};

use crate::{
    config::CatalogueSource,
    error::{Error, Result},
};

const BUILTIN_SCALARS: &[&str] = &["Boolean", "Float", "ID", "Int", "String"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

impl TypeKind {
    /// Types whose values need a selection set.
    pub fn is_composite(self) -> bool {
        matches!(self, Self::Object | Self::Interface | Self::Union)
    }

    /// Types allowed as variable types.
    pub fn is_input(self) -> bool {
        matches!(self, Self::Scalar | Self::Enum | Self::InputObject)
    }
}

/// A GraphQL type reference such as `[User!]!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named { name: String, nullable: bool },
    List { of: Box<TypeRef>, nullable: bool },
}

impl TypeRef {
    pub fn named(name: impl Into<String>, nullable: bool) -> Self {
        Self::Named {
            name: name.into(),
            nullable,
        }
    }

    pub(crate) fn from_ast(ty: &Type) -> Self {
        match &ty.base {
            BaseType::Named(name) => Self::Named {
                name: name.to_string(),
                nullable: ty.nullable,
            },
            BaseType::List(inner) => Self::List {
                of: Box::new(Self::from_ast(inner)),
                nullable: ty.nullable,
            },
        }
    }

    /// Innermost named type.
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named { name, .. } => name,
            Self::List { of, .. } => of.base_name(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Named { nullable, .. } | Self::List { nullable, .. } => *nullable,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List { .. })
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nullable = match self {
            Self::Named { name, nullable } => {
                f.write_str(name)?;
                *nullable
            },
            Self::List { of, nullable } => {
                write!(f, "[{of}]")?;
                *nullable
            },
        };
        if !nullable {
            f.write_str("!")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    /// Output fields for objects and interfaces, input fields for input
    /// objects, in schema order.
    pub fields: Vec<FieldDef>,
    /// Enum values, in schema order.
    pub values: Vec<String>,
}

impl TypeDef {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            fields: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Indexed remote schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalogue {
    query: Option<String>,
    mutation: Option<String>,
    subscription: Option<String>,
    types: BTreeMap<String, TypeDef>,
}

impl Catalogue {
    /// Parse schema SDL. `extend type` blocks are merged into their base type.
    pub fn parse(sdl: &str) -> std::result::Result<Self, async_graphql::parser::Error> {
        let document = parse_schema(sdl)?;
        let mut roots: [Option<String>; 3] = [None, None, None];
        let mut types: BTreeMap<String, TypeDef> = BTreeMap::new();

        for definition in document.definitions {
            match definition {
                TypeSystemDefinition::Schema(schema) => {
                    let schema = schema.node;
                    for (slot, name) in roots
                        .iter_mut()
                        .zip([schema.query, schema.mutation, schema.subscription])
                    {
                        if let Some(name) = name {
                            *slot = Some(name.node.to_string());
                        }
                    }
                },
                TypeSystemDefinition::Type(ty) => {
                    let ty = ty.node;
                    let name = ty.name.node.as_str();
                    let (kind, fields, values) = match ty.kind {
                        AstKind::Scalar => (TypeKind::Scalar, Vec::new(), Vec::new()),
                        AstKind::Object(object) => {
                            (TypeKind::Object, output_fields(object.fields), Vec::new())
                        },
                        AstKind::Interface(iface) => {
                            (TypeKind::Interface, output_fields(iface.fields), Vec::new())
                        },
                        AstKind::Union(_) => (TypeKind::Union, Vec::new(), Vec::new()),
                        AstKind::Enum(e) => (
                            TypeKind::Enum,
                            Vec::new(),
                            e.values
                                .into_iter()
                                .map(|v| v.node.value.node.to_string())
                                .collect(),
                        ),
                        AstKind::InputObject(input) => (
                            TypeKind::InputObject,
                            input
                                .fields
                                .into_iter()
                                .map(|f| FieldDef {
                                    name: f.node.name.node.to_string(),
                                    ty: TypeRef::from_ast(&f.node.ty.node),
                                })
                                .collect(),
                            Vec::new(),
                        ),
                    };
                    let entry = types
                        .entry(name.to_string())
                        .or_insert_with(|| TypeDef::new(name, kind));
                    for field in fields {
                        if entry.field(&field.name).is_none() {
                            entry.fields.push(field);
                        }
                    }
                    entry.values.extend(values);
                },
                TypeSystemDefinition::Directive(_) => {},
            }
        }

        for scalar in BUILTIN_SCALARS {
            types
                .entry((*scalar).to_string())
                .or_insert_with(|| TypeDef::new(scalar, TypeKind::Scalar));
        }

        let [query, mutation, subscription] = roots;
        let default_root = |explicit: Option<String>, conventional: &str| {
            explicit.or_else(|| {
                types
                    .contains_key(conventional)
                    .then(|| conventional.to_string())
            })
        };
        let query = default_root(query, "Query");
        let mutation = default_root(mutation, "Mutation");
        let subscription = default_root(subscription, "Subscription");
        Ok(Self {
            query,
            mutation,
            subscription,
            types,
        })
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Root type answering operations of `kind`, if the schema has one.
    pub fn root(&self, kind: OperationKind) -> Option<&TypeDef> {
        let name = match kind {
            OperationKind::Query => self.query.as_deref(),
            OperationKind::Mutation => self.mutation.as_deref(),
            OperationKind::Subscription => self.subscription.as_deref(),
        }?;
        self.types.get(name)
    }

    pub fn is_builtin_scalar(name: &str) -> bool {
        BUILTIN_SCALARS.contains(&name)
    }
}

fn output_fields(
    fields: Vec<Positioned<FieldDefinition>>,
) -> Vec<FieldDef> {
    fields
        .into_iter()
        .map(|f| FieldDef {
            name: f.node.name.node.to_string(),
            ty: TypeRef::from_ast(&f.node.ty.node),
        })
        .collect()
}

/// Fetch the schema SDL of a remote service.
pub(crate) async fn fetch_sdl(
    source: &CatalogueSource,
    service: &str,
    path: &str,
    codec: Codec,
    base_dir: &Path,
    timeout: Duration,
) -> Result<String> {
    match source {
        CatalogueSource::Bus(transport) => {
            let subject = catalogue_subject(path);
            debug!(service, subject = %subject, "fetching catalogue over the bus");
            let reply = transport
                .request(&subject, Bytes::new(), timeout)
                .await
                .map_err(|e| Error::catalogue(service, e))?;
            let envelope: ResponseEnvelope = codec
                .decode(&reply)
                .map_err(|e| Error::catalogue(service, e))?;
            if let Some(first) = envelope.errors.first() {
                return Err(Error::catalogue(service, &first.message));
            }
            envelope
                .data
                .get("sdl")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| Error::catalogue(service, "reply carries no `sdl` string"))
        },
        CatalogueSource::Http(url) => {
            debug!(service, url = %url, "fetching catalogue over http");
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| Error::catalogue(service, e))?;
            let response = client
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| Error::catalogue(service, e))?;
            response
                .text()
                .await
                .map_err(|e| Error::catalogue(service, e))
        },
        CatalogueSource::File(file) => {
            let file = base_dir.join(file);
            debug!(service, path = %file.display(), "reading catalogue file");
            std::fs::read_to_string(&file).map_err(Error::io(&file))
        },
    }
}
