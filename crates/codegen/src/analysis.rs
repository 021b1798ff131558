//! Query document analysis: parse, resolve against the catalogue and
//! normalize into [`crate::model`] data.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use {
    async_graphql::parser::{
        Error as ParseError, Positioned, parse_query,
        types::{
            Directive, DocumentOperations, ExecutableDocument, FragmentDefinition,
            OperationDefinition, OperationType, Selection, SelectionSet,
        },
    },
    gqlbus_protocol::OperationKind,
};

use crate::{
    catalogue::{Catalogue, TypeKind, TypeRef},
    error::{Error, Result},
    model::{EnumModel, FieldModel, InputFieldModel, InputModel, QueryDefinition, VariableModel},
};

/// Appended to documents that hold only fragments, which the parser
/// otherwise rejects.
const FRAGMENT_HOLDER: &str = "__GqlbusFragmentHolder";

/// A query document read from disk.
#[derive(Debug, Clone)]
pub struct QuerySource {
    /// Path relative to the client base dir, `/`-separated.
    pub path: String,
    pub text: String,
}

/// Operations plus the shared types they use.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub operations: Vec<QueryDefinition>,
    pub enums: Vec<EnumModel>,
    pub inputs: Vec<InputModel>,
}

struct Fragment {
    source: String,
    definition: FragmentDefinition,
}

/// Analyse every operation in `sources` against `catalogue`.
pub fn analyse(catalogue: &Catalogue, sources: &[QuerySource]) -> Result<Analysis> {
    let mut fragments: HashMap<String, Fragment> = HashMap::new();
    let mut operations: BTreeMap<String, (String, OperationDefinition)> = BTreeMap::new();

    for source in sources {
        let document = parse_source(source)?;
        for (name, fragment) in document.fragments {
            let name = name.to_string();
            if let Some(first) = fragments.get(&name) {
                return Err(Error::parse(
                    &source.path,
                    format!("fragment `{name}` is already defined in {}", first.source),
                ));
            }
            fragments.insert(name, Fragment {
                source: source.path.clone(),
                definition: fragment.node,
            });
        }

        let ops = match document.operations {
            DocumentOperations::Single(_) => {
                return Err(Error::config(
                    "query_glob",
                    format!(
                        "{}: anonymous operations cannot be bound, give every operation a name",
                        source.path
                    ),
                ));
            },
            DocumentOperations::Multiple(ops) => ops,
        };
        for (name, op) in ops {
            let name = name.to_string();
            if name == FRAGMENT_HOLDER {
                continue;
            }
            if let Some((first, _)) = operations.get(&name) {
                return Err(Error::config(
                    "query_glob",
                    format!(
                        "operation `{name}` is defined in both {first} and {}",
                        source.path
                    ),
                ));
            }
            operations.insert(name, (source.path.clone(), op.node));
        }
    }

    let mut analyzer = Analyzer {
        catalogue,
        fragments: &fragments,
        enums: BTreeSet::new(),
        inputs: BTreeSet::new(),
    };
    let operations = operations
        .iter()
        .map(|(name, (source, op))| analyzer.operation(name, source, op))
        .collect::<Result<Vec<_>>>()?;

    let enums = analyzer
        .enums
        .iter()
        .filter_map(|name| catalogue.get(name))
        .map(|def| EnumModel {
            name: def.name.clone(),
            values: def.values.clone(),
        })
        .collect();
    let inputs = analyzer
        .inputs
        .iter()
        .filter_map(|name| catalogue.get(name))
        .map(|def| InputModel {
            name: def.name.clone(),
            fields: def
                .fields
                .iter()
                .map(|f| InputFieldModel {
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                    kind: analyzer.kind_of(f.ty.base_name()),
                    recursive: !f.ty.is_list()
                        && analyzer.reaches(f.ty.base_name(), &def.name, &mut BTreeSet::new()),
                })
                .collect(),
        })
        .collect();

    Ok(Analysis {
        operations,
        enums,
        inputs,
    })
}

fn parse_source(source: &QuerySource) -> Result<ExecutableDocument> {
    match parse_query(&source.text) {
        Err(ParseError::MissingOperation) => {
            let padded = format!("{}\nquery {FRAGMENT_HOLDER} {{ __typename }}\n", source.text);
            parse_query(padded).map_err(|e| Error::parse(&source.path, e))
        },
        parsed => parsed.map_err(|e| Error::parse(&source.path, e)),
    }
}

fn operation_kind(ty: OperationType) -> OperationKind {
    match ty {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => OperationKind::Subscription,
    }
}

fn is_conditional(directives: &[Positioned<Directive>]) -> bool {
    directives
        .iter()
        .any(|d| matches!(d.node.name.node.as_str(), "skip" | "include"))
}

struct Analyzer<'a> {
    catalogue: &'a Catalogue,
    fragments: &'a HashMap<String, Fragment>,
    enums: BTreeSet<String>,
    inputs: BTreeSet<String>,
}

impl Analyzer<'_> {
    fn kind_of(&self, name: &str) -> TypeKind {
        self.catalogue.get(name).map_or(TypeKind::Scalar, |d| d.kind)
    }

    fn operation(&mut self, name: &str, source: &str, op: &OperationDefinition) -> Result<QueryDefinition> {
        let kind = operation_kind(op.ty);
        let root = self.catalogue.root(kind).ok_or_else(|| {
            Error::mismatch(name, format!("the remote schema has no {kind} root type"))
        })?;
        let root = root.name.clone();

        let variables = op
            .variable_definitions
            .iter()
            .map(|var| {
                let var = &var.node;
                let ty = TypeRef::from_ast(&var.var_type.node);
                let var_name = var.name.node.to_string();
                let kind = match self.catalogue.get(ty.base_name()) {
                    Some(def) if def.kind.is_input() => def.kind,
                    Some(_) => {
                        return Err(Error::mismatch(
                            name,
                            format!("${var_name}: {} is not an input type", ty.base_name()),
                        ));
                    },
                    None => {
                        return Err(Error::mismatch(
                            name,
                            format!("${var_name}: unknown type {}", ty.base_name()),
                        ));
                    },
                };
                self.use_input(ty.base_name());
                Ok(VariableModel {
                    name: var_name,
                    ty,
                    kind,
                    has_default: var.default_value.is_some(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut selection = Vec::new();
        self.collect(
            name,
            &root,
            &op.selection_set.node,
            false,
            &mut Vec::new(),
            &mut selection,
        )?;

        let mut printer = Printer {
            fragments: self.fragments,
            out: String::new(),
        };
        printer.operation(name, op);

        Ok(QueryDefinition {
            name: name.to_string(),
            kind,
            source: source.to_string(),
            document: printer.out,
            variables,
            selection,
        })
    }

    /// Register an input-position type and everything it references.
    fn use_input(&mut self, name: &str) {
        let catalogue = self.catalogue;
        let Some(def) = catalogue.get(name) else {
            return;
        };
        match def.kind {
            TypeKind::Enum => {
                self.enums.insert(name.to_string());
            },
            TypeKind::InputObject if self.inputs.insert(name.to_string()) => {
                for field in &def.fields {
                    self.use_input(field.ty.base_name());
                }
            },
            _ => {},
        }
    }

    /// Does input type `from` reach `target` through non-list fields?
    fn reaches(&self, from: &str, target: &str, seen: &mut BTreeSet<String>) -> bool {
        if from == target {
            return true;
        }
        if !seen.insert(from.to_string()) {
            return false;
        }
        let Some(def) = self.catalogue.get(from) else {
            return false;
        };
        def.kind == TypeKind::InputObject
            && def
                .fields
                .iter()
                .filter(|f| !f.ty.is_list())
                .any(|f| self.reaches(f.ty.base_name(), target, seen))
    }

    fn collect(
        &mut self,
        op: &str,
        parent: &str,
        set: &SelectionSet,
        conditional: bool,
        visiting: &mut Vec<String>,
        out: &mut Vec<FieldModel>,
    ) -> Result<()> {
        let (catalogue, fragments) = (self.catalogue, self.fragments);
        for item in &set.items {
            match &item.node {
                Selection::Field(field) => {
                    let field = &field.node;
                    let name = field.name.node.as_str();
                    let key = field
                        .alias
                        .as_ref()
                        .map_or(name, |alias| alias.node.as_str())
                        .to_string();
                    let conditional = conditional || is_conditional(&field.directives);

                    if name == "__typename" {
                        merge(out, FieldModel {
                            key,
                            ty: TypeRef::named("String", false),
                            kind: TypeKind::Scalar,
                            conditional,
                            selection: Vec::new(),
                        });
                        continue;
                    }

                    let def = catalogue
                        .get(parent)
                        .and_then(|t| t.field(name))
                        .ok_or_else(|| Error::mismatch(op, format!("{parent}.{name}")))?;
                    let target = def.ty.base_name().to_string();
                    let kind = catalogue
                        .get(&target)
                        .map(|t| t.kind)
                        .ok_or_else(|| {
                            Error::mismatch(op, format!("{parent}.{name}: unknown type {target}"))
                        })?;
                    let has_selection = !field.selection_set.node.items.is_empty();
                    if kind.is_composite() != has_selection {
                        let problem = if has_selection {
                            "is a leaf and takes no selection"
                        } else {
                            "needs a selection set"
                        };
                        return Err(Error::mismatch(op, format!("{parent}.{name} {problem}")));
                    }
                    if kind == TypeKind::Enum {
                        self.enums.insert(target.clone());
                    }

                    let mut selection = Vec::new();
                    if has_selection {
                        self.collect(
                            op,
                            &target,
                            &field.selection_set.node,
                            false,
                            visiting,
                            &mut selection,
                        )?;
                    }
                    merge(out, FieldModel {
                        key,
                        ty: def.ty.clone(),
                        kind,
                        conditional,
                        selection,
                    });
                },
                Selection::InlineFragment(fragment) => {
                    let fragment = &fragment.node;
                    let on = fragment
                        .type_condition
                        .as_ref()
                        .map_or(parent, |c| c.node.on.node.as_str())
                        .to_string();
                    self.check_condition(op, &on)?;
                    let conditional =
                        conditional || on != parent || is_conditional(&fragment.directives);
                    self.collect(
                        op,
                        &on,
                        &fragment.selection_set.node,
                        conditional,
                        visiting,
                        out,
                    )?;
                },
                Selection::FragmentSpread(spread) => {
                    let spread = &spread.node;
                    let name = spread.fragment_name.node.to_string();
                    let fragment = fragments.get(&name).ok_or_else(|| {
                        Error::mismatch(op, format!("unknown fragment {name}"))
                    })?;
                    if visiting.contains(&name) {
                        return Err(Error::parse(
                            &fragment.source,
                            format!("fragment `{name}` spreads itself"),
                        ));
                    }
                    let on = fragment
                        .definition
                        .type_condition
                        .node
                        .on
                        .node
                        .to_string();
                    self.check_condition(op, &on)?;
                    let conditional =
                        conditional || on != parent || is_conditional(&spread.directives);
                    visiting.push(name);
                    self.collect(
                        op,
                        &on,
                        &fragment.definition.selection_set.node,
                        conditional,
                        visiting,
                        out,
                    )?;
                    visiting.pop();
                },
            }
        }
        Ok(())
    }

    fn check_condition(&self, op: &str, on: &str) -> Result<()> {
        match self.catalogue.get(on) {
            Some(def) if def.kind.is_composite() => Ok(()),
            Some(_) => Err(Error::mismatch(op, format!("fragment on non-composite type {on}"))),
            None => Err(Error::mismatch(op, format!("fragment on unknown type {on}"))),
        }
    }
}

/// Add `field` to `out`, merging selections that share a response key.
fn merge(out: &mut Vec<FieldModel>, field: FieldModel) {
    if let Some(existing) = out.iter_mut().find(|f| f.key == field.key) {
        existing.conditional &= field.conditional;
        for child in field.selection {
            merge(&mut existing.selection, child);
        }
    } else {
        out.push(field);
    }
}

// ── Printing ────────────────────────────────────────────────────────────────

/// Prints an operation back to GraphQL with fragment spreads replaced by
/// inline fragments, so each binding carries a self-contained document.
struct Printer<'a> {
    fragments: &'a HashMap<String, Fragment>,
    out: String,
}

impl Printer<'_> {
    fn operation(&mut self, name: &str, op: &OperationDefinition) {
        self.out.push_str(operation_kind(op.ty).as_str());
        self.out.push(' ');
        self.out.push_str(name);
        if !op.variable_definitions.is_empty() {
            let vars: Vec<String> = op
                .variable_definitions
                .iter()
                .map(|var| {
                    let var = &var.node;
                    let mut text = format!(
                        "${}: {}",
                        var.name.node,
                        TypeRef::from_ast(&var.var_type.node)
                    );
                    if let Some(default) = &var.default_value {
                        text.push_str(&format!(" = {}", default.node));
                    }
                    text
                })
                .collect();
            self.out.push('(');
            self.out.push_str(&vars.join(", "));
            self.out.push(')');
        }
        self.directives(&op.directives);
        self.out.push(' ');
        self.selection_set(&op.selection_set.node, 0);
    }

    fn directives(&mut self, directives: &[Positioned<Directive>]) {
        for directive in directives {
            let directive = &directive.node;
            self.out.push_str(" @");
            self.out.push_str(directive.name.node.as_str());
            self.arguments(
                directive
                    .arguments
                    .iter()
                    .map(|(n, v)| (n.node.as_str(), v.node.to_string())),
            );
        }
    }

    fn arguments<'s>(&mut self, args: impl Iterator<Item = (&'s str, String)>) {
        let args: Vec<String> = args.map(|(n, v)| format!("{n}: {v}")).collect();
        if !args.is_empty() {
            self.out.push('(');
            self.out.push_str(&args.join(", "));
            self.out.push(')');
        }
    }

    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
    }

    fn selection_set(&mut self, set: &SelectionSet, depth: usize) {
        self.out.push_str("{\n");
        for item in &set.items {
            self.indent(depth + 1);
            match &item.node {
                Selection::Field(field) => {
                    let field = &field.node;
                    if let Some(alias) = &field.alias {
                        self.out.push_str(alias.node.as_str());
                        self.out.push_str(": ");
                    }
                    self.out.push_str(field.name.node.as_str());
                    self.arguments(
                        field
                            .arguments
                            .iter()
                            .map(|(n, v)| (n.node.as_str(), v.node.to_string())),
                    );
                    self.directives(&field.directives);
                    if !field.selection_set.node.items.is_empty() {
                        self.out.push(' ');
                        self.selection_set(&field.selection_set.node, depth + 1);
                    }
                },
                Selection::InlineFragment(fragment) => {
                    let fragment = &fragment.node;
                    self.out.push_str("...");
                    if let Some(cond) = &fragment.type_condition {
                        self.out.push_str(" on ");
                        self.out.push_str(cond.node.on.node.as_str());
                    }
                    self.directives(&fragment.directives);
                    self.out.push(' ');
                    self.selection_set(&fragment.selection_set.node, depth + 1);
                },
                Selection::FragmentSpread(spread) => {
                    let spread = &spread.node;
                    let fragments = self.fragments;
                    if let Some(fragment) = fragments.get(spread.fragment_name.node.as_str()) {
                        self.out.push_str("... on ");
                        self.out
                            .push_str(fragment.definition.type_condition.node.on.node.as_str());
                        self.directives(&spread.directives);
                        self.out.push(' ');
                        self.selection_set(&fragment.definition.selection_set.node, depth + 1);
                    }
                },
            }
            self.out.push('\n');
        }
        self.indent(depth);
        self.out.push('}');
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r#"
        type Query {
            user(id: ID!): User
            search(filter: UserFilter, limit: Int = 10): [SearchHit!]!
            node(id: ID!): Node
        }
        type Mutation { setStatus(id: ID!, status: Status!): User! }
        type Subscription { userStatus(userId: ID!): StatusEvent! }
        interface Node { id: ID! }
        type User implements Node { id: ID!, name: String, status: Status!, friends: [User!]! }
        type Bot implements Node { id: ID!, model: String! }
        union SearchHit = User | Bot
        type StatusEvent { status: Status! }
        enum Status { ONLINE AWAY }
        enum Sort { ASC DESC }
        input UserFilter { name: String, sort: Sort, not: UserFilter, any: [UserFilter!] }
    "#;

    fn source(path: &str, text: &str) -> QuerySource {
        QuerySource {
            path: path.to_string(),
            text: text.to_string(),
        }
    }

    fn run(sources: &[QuerySource]) -> Result<Analysis> {
        analyse(&Catalogue::parse(SDL).unwrap(), sources)
    }

    #[test]
    fn subscription_with_variables() {
        let analysis = run(&[source(
            "users.graphql",
            "subscription WatchUserStatus($userId: ID!) { userStatus(userId: $userId) { status } }",
        )])
        .unwrap();
        let op = &analysis.operations[0];
        assert_eq!(op.kind, OperationKind::Subscription);
        assert_eq!(op.source, "users.graphql");
        assert_eq!(op.variables[0].name, "userId");
        assert_eq!(op.variables[0].ty.to_string(), "ID!");
        assert!(!op.variables[0].is_optional());
        assert_eq!(op.selection[0].key, "userStatus");
        assert_eq!(op.selection[0].selection[0].kind, TypeKind::Enum);
        assert_eq!(
            op.document,
            "subscription WatchUserStatus($userId: ID!) {\n  userStatus(userId: $userId) {\n    status\n  }\n}"
        );
        assert_eq!(analysis.enums, vec![EnumModel {
            name: "Status".into(),
            values: vec!["ONLINE".into(), "AWAY".into()],
        }]);
    }

    #[test]
    fn unknown_root_field_names_the_operation() {
        let err = run(&[source("q.graphql", "query GetOrders { orders { id } }")]).unwrap_err();
        match err {
            Error::SchemaMismatch { operation, field } => {
                assert_eq!(operation, "GetOrders");
                assert_eq!(field, "Query.orders");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_nested_field_is_a_mismatch() {
        let err = run(&[source("q.graphql", "query GetUser { user(id: 1) { email } }")]).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { ref field, .. } if field == "User.email"));
    }

    #[test]
    fn leaf_and_composite_selection_rules() {
        let err = run(&[source("q.graphql", "query A { user(id: 1) }")]).unwrap_err();
        assert!(err.to_string().contains("needs a selection set"));
        let err = run(&[source("q.graphql", "query B { user(id: 1) { name { x } } }")]).unwrap_err();
        assert!(err.to_string().contains("takes no selection"));
    }

    #[test]
    fn anonymous_operation_is_a_configuration_error() {
        let err = run(&[source("q.graphql", "{ user(id: 1) { id } }")]).unwrap_err();
        assert!(matches!(err, Error::Configuration { option: "query_glob", .. }));
    }

    #[test]
    fn duplicate_operation_across_files() {
        let q = "query GetUser { user(id: 1) { id } }";
        let err = run(&[source("a.graphql", q), source("b.graphql", q)]).unwrap_err();
        assert!(err.to_string().contains("defined in both a.graphql and b.graphql"));
    }

    #[test]
    fn fragments_from_other_files_are_inlined() {
        let analysis = run(&[
            source("fragments.graphql", "fragment UserParts on User { id name }"),
            source(
                "q.graphql",
                "query GetUser($id: ID!) { user(id: $id) { ...UserParts status } }",
            ),
        ])
        .unwrap();
        let op = &analysis.operations[0];
        let keys: Vec<_> = op.selection[0].selection.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, ["id", "name", "status"]);
        assert!(op.selection[0].selection.iter().all(|f| !f.conditional));
        assert!(op.document.contains("... on User {\n      id\n      name\n    }"));
        assert!(!op.document.contains("UserParts"));
    }

    #[test]
    fn type_conditions_make_fields_conditional() {
        let analysis = run(&[source(
            "q.graphql",
            r#"query Search { search(limit: 5) { __typename ... on User { id name } ... on Bot { id model } } }"#,
        )])
        .unwrap();
        let hit = &analysis.operations[0].selection[0];
        let flags: Vec<_> = hit
            .selection
            .iter()
            .map(|f| (f.key.as_str(), f.conditional))
            .collect();
        assert_eq!(flags, [
            ("__typename", false),
            ("id", true),
            ("name", true),
            ("model", true)
        ]);
    }

    #[test]
    fn skip_and_include_make_fields_conditional() {
        let analysis = run(&[source(
            "q.graphql",
            "query GetUser($full: Boolean!) { user(id: 1) { id name @include(if: $full) } }",
        )])
        .unwrap();
        let user = &analysis.operations[0].selection[0];
        assert!(!user.selection[0].conditional);
        assert!(user.selection[1].conditional);
        assert!(analysis.operations[0].document.contains("name @include(if: $full)"));
    }

    #[test]
    fn input_types_are_collected_with_recursion_flags() {
        let analysis = run(&[source(
            "q.graphql",
            "query Find($filter: UserFilter) { search(filter: $filter) { __typename } }",
        )])
        .unwrap();
        assert_eq!(analysis.inputs.len(), 1);
        let filter = &analysis.inputs[0];
        let recursive: Vec<_> = filter
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.recursive))
            .collect();
        assert_eq!(recursive, [
            ("name", false),
            ("sort", false),
            ("not", true),
            ("any", false)
        ]);
        let enums: Vec<_> = analysis.enums.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(enums, ["Sort"]);
    }

    #[test]
    fn variable_of_output_type_is_rejected() {
        let err = run(&[source("q.graphql", "query A($u: User) { user(id: 1) { id } }")]).unwrap_err();
        assert!(err.to_string().contains("$u: User is not an input type"));
    }

    #[test]
    fn fragment_cycles_are_reported() {
        let err = run(&[source(
            "q.graphql",
            "fragment A on User { friends { ...B } } fragment B on User { friends { ...A } } query Q { user(id: 1) { ...A } }",
        )])
        .unwrap_err();
        assert!(matches!(err, Error::Parse { .. } | Error::SchemaMismatch { .. }));
    }

    #[test]
    fn operations_are_sorted_by_name() {
        let analysis = run(&[source(
            "q.graphql",
            "query Zed { node(id: 1) { id } } mutation Alpha { setStatus(id: 1, status: AWAY) { id } }",
        )])
        .unwrap();
        let names: Vec<_> = analysis.operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Zed"]);
        assert_eq!(analysis.operations[0].kind, OperationKind::Mutation);
    }

    #[test]
    fn syntax_errors_name_the_file() {
        let err = run(&[source("broken.graphql", "query {")]).unwrap_err();
        assert!(matches!(err, Error::Parse { ref file, .. } if file.to_str() == Some("broken.graphql")));
    }
}
