//! Import/export declaration extraction.
//!
//! A linear pass over the top-level statements of a parsed module. Each
//! `import` becomes one [`ImportDecl`]; each `export` becomes one
//! [`ExportDecl`], with `export … from …` forms also yielding a passthrough
//! [`ImportDecl`]. Every declaration records the offset of the statement
//! that follows it so the body rewriter can delete whole lines.

use tree_sitter::{Node, Tree};

use crate::error::{CompileError, Result};
use crate::parser::node_text;

/// The shape of a single import specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// `import x from 'm'` — binds the default export.
    Default,
    /// `import * as ns from 'm'` — binds the whole namespace.
    Batch,
    /// `import { name as alias } from 'm'`.
    Named,
}

/// One item in an import list. `name` is the name on the exporting side
/// (`default` / `*` for the first two kinds); `as_` is the local alias.
#[derive(Debug, Clone)]
pub struct Specifier {
    pub kind: SpecifierKind,
    pub name: String,
    pub as_: String,
}

/// An import statement, or the import half of an `export … from …` form.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    /// The module path as written in source.
    pub path: String,
    /// Canonical module id, filled in by the graph resolver.
    pub id: Option<String>,
    pub specifiers: Vec<Specifier>,
    /// True when this was synthesised from an `export … from …` form. Its
    /// specifiers use the *exported* names and bind nothing locally.
    pub passthrough: bool,
    pub start: usize,
    pub end: usize,
    /// One past the trailing semicolon/whitespace, through the line end.
    pub next: usize,
}

impl ImportDecl {
    /// `import 'm';` — a bare side-effect import.
    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }
}

/// One item in an `export { … }` list.
#[derive(Debug, Clone)]
pub struct ExportSpecifier {
    /// The local (or source-module) name.
    pub name: String,
    /// The name the outside world sees.
    pub as_: String,
}

/// What kind of export statement this is.
#[derive(Debug, Clone)]
pub enum ExportKind {
    /// `export var x = …` (also let/const).
    VarDeclaration { name: String },
    /// `export function f() {}` / `export default function f() {}`.
    NamedFunction { name: String },
    /// `export class C {}` / `export default class C {}`.
    NamedClass { name: String },
    /// `export { a, b as c }`, locally or re-exported from a source.
    Named { specifiers: Vec<ExportSpecifier> },
    /// `export default function () {}`.
    AnonFunction,
    /// `export default class {}`.
    AnonClass,
    /// `export default <expression>;`.
    Expression,
}

/// An export statement.
#[derive(Debug, Clone)]
pub struct ExportDecl {
    pub kind: ExportKind,
    pub is_default: bool,
    /// Set when combined with an import-from-source side.
    pub passthrough: bool,
    /// Index of the synthesised passthrough import in `Declarations::imports`.
    pub import_index: Option<usize>,
    pub start: usize,
    pub end: usize,
    pub next: usize,
    /// Offset where the declaration or value proper begins (after `export `
    /// or `export default `).
    pub value_start: usize,
}

/// All declarations extracted from one module.
#[derive(Debug, Default)]
pub struct Declarations {
    pub imports: Vec<ImportDecl>,
    pub exports: Vec<ExportDecl>,
    /// Index into `exports` of the default export, if any.
    pub default_export: Option<usize>,
}

/// Extract all import/export declarations from a module. `id` is used in
/// diagnostics only.
pub fn extract(tree: &Tree, source: &str, id: &str) -> Result<Declarations> {
    let bytes = source.as_bytes();
    let mut decls = Declarations::default();

    let root = tree.root_node();
    let mut cursor = root.walk();
    let statements: Vec<Node> = root.children(&mut cursor).collect();
    for statement in statements {
        match statement.kind() {
            "import_statement" => {
                let import = extract_import(statement, source, bytes)?;
                decls.imports.push(import);
            }
            "export_statement" => {
                extract_export(statement, source, bytes, id, &mut decls)?;
            }
            _ => {}
        }
    }

    check_duplicate_aliases(&decls, id)?;
    Ok(decls)
}

/// The exported names of a module, `default` included, in source order.
pub fn exported_names(exports: &[ExportDecl]) -> Vec<String> {
    let mut names = Vec::new();
    for export in exports {
        if export.is_default {
            names.push("default".to_owned());
            continue;
        }
        match &export.kind {
            ExportKind::VarDeclaration { name }
            | ExportKind::NamedFunction { name }
            | ExportKind::NamedClass { name } => names.push(name.clone()),
            ExportKind::Named { specifiers } => {
                for spec in specifiers {
                    names.push(spec.as_.clone());
                }
            }
            _ => {}
        }
    }
    names
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

fn extract_import(node: Node, source: &str, bytes: &[u8]) -> Result<ImportDecl> {
    let path = import_source(node, bytes).unwrap_or_default();
    let mut specifiers = Vec::new();

    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        if child.kind() == "import_clause" {
            extract_import_clause(child, bytes, &mut specifiers);
        }
    }

    Ok(ImportDecl {
        path,
        id: None,
        specifiers,
        passthrough: false,
        start: node.start_byte(),
        end: node.end_byte(),
        next: next_offset(source, node.end_byte()),
    })
}

/// Pull the module path out of a statement's `source` string field.
fn import_source(node: Node, bytes: &[u8]) -> Option<String> {
    let string = node.child_by_field_name("source")?;
    let fragment = string.named_child(0)?;
    Some(node_text(fragment, bytes).to_owned())
}

fn extract_import_clause(clause: Node, bytes: &[u8], specifiers: &mut Vec<Specifier>) {
    let mut cursor = clause.walk();
    for child in clause.children(&mut cursor) {
        match child.kind() {
            "identifier" => {
                // Default import: `import x from …`.
                specifiers.push(Specifier {
                    kind: SpecifierKind::Default,
                    name: "default".to_owned(),
                    as_: node_text(child, bytes).to_owned(),
                });
            }
            "namespace_import" => {
                if let Some(name) = namespace_import_name(child, bytes) {
                    specifiers.push(Specifier {
                        kind: SpecifierKind::Batch,
                        name: "*".to_owned(),
                        as_: name,
                    });
                }
            }
            "named_imports" => {
                let mut inner = child.walk();
                for spec in child.children(&mut inner) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let name_node = spec.child_by_field_name("name");
                    let alias_node = spec.child_by_field_name("alias");
                    if let Some(name_node) = name_node {
                        let name = node_text(name_node, bytes).to_owned();
                        let as_ = alias_node
                            .map(|a| node_text(a, bytes).to_owned())
                            .unwrap_or_else(|| name.clone());
                        specifiers.push(Specifier {
                            kind: SpecifierKind::Named,
                            name,
                            as_,
                        });
                    }
                }
            }
            _ => {}
        }
    }
}

/// The identifier in `* as identifier` — it carries no field name in the
/// grammar, so find it by kind.
fn namespace_import_name(ns_node: Node, bytes: &[u8]) -> Option<String> {
    let mut cursor = ns_node.walk();
    for child in ns_node.children(&mut cursor) {
        if child.kind() == "identifier" {
            return Some(node_text(child, bytes).to_owned());
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

fn extract_export(
    node: Node,
    source: &str,
    bytes: &[u8],
    id: &str,
    decls: &mut Declarations,
) -> Result<()> {
    let start = node.start_byte();
    let end = node.end_byte();
    let next = next_offset(source, end);
    let from_source = import_source(node, bytes);

    // `export * from …` has no representation in the data model; `export * as
    // ns from …` is modelled as a batch passthrough below.
    let has_bare_star = (0..node.child_count()).any(|i| {
        node.child(i as u32)
            .map(|c| c.kind() == "*")
            .unwrap_or(false)
    });
    if has_bare_star {
        return Err(CompileError::UnsupportedSyntax {
            detail: format!("`export * from` in `{id}` (re-export each name explicitly)"),
        });
    }

    if let Some(path) = from_source {
        // Re-export: synthesise the import half, then the export half.
        let mut import_specifiers = Vec::new();
        let mut export_specifiers = Vec::new();

        if let Some(ns) = find_child_of_kind(node, "namespace_export") {
            // `export * as ns from …` — a namespace re-export.
            if let Some(name) = namespace_import_name(ns, bytes) {
                import_specifiers.push(Specifier {
                    kind: SpecifierKind::Batch,
                    name: "*".to_owned(),
                    as_: name.clone(),
                });
                export_specifiers.push(ExportSpecifier {
                    name: name.clone(),
                    as_: name,
                });
            }
        } else if let Some(clause) = find_child_of_kind(node, "export_clause") {
            for spec in export_clause_specifiers(clause, bytes) {
                // The passthrough import's alias is the *exported* name.
                import_specifiers.push(Specifier {
                    kind: SpecifierKind::Named,
                    name: spec.name.clone(),
                    as_: spec.as_.clone(),
                });
                export_specifiers.push(spec);
            }
        }

        decls.imports.push(ImportDecl {
            path,
            id: None,
            specifiers: import_specifiers,
            passthrough: true,
            start,
            end,
            next,
        });
        decls.exports.push(ExportDecl {
            kind: ExportKind::Named {
                specifiers: export_specifiers,
            },
            is_default: false,
            passthrough: true,
            import_index: Some(decls.imports.len() - 1),
            start,
            end,
            next,
            value_start: start,
        });
        return Ok(());
    }

    let is_default = (0..node.child_count()).any(|i| {
        node.child(i as u32)
            .map(|c| c.kind() == "default")
            .unwrap_or(false)
    });

    let export = if let Some(declaration) = node.child_by_field_name("declaration") {
        let value_start = declaration.start_byte();
        let kind = classify_declaration(declaration, bytes, id)?;
        ExportDecl {
            kind,
            is_default,
            passthrough: false,
            import_index: None,
            start,
            end,
            next,
            value_start,
        }
    } else if let Some(value) = node.child_by_field_name("value") {
        let kind = match value.kind() {
            "function_expression" | "generator_function" => {
                match value.child_by_field_name("name") {
                    Some(name) => ExportKind::NamedFunction {
                        name: node_text(name, bytes).to_owned(),
                    },
                    None => ExportKind::AnonFunction,
                }
            }
            "class" => match value.child_by_field_name("name") {
                Some(name) => ExportKind::NamedClass {
                    name: node_text(name, bytes).to_owned(),
                },
                None => ExportKind::AnonClass,
            },
            _ => ExportKind::Expression,
        };
        ExportDecl {
            kind,
            is_default,
            passthrough: false,
            import_index: None,
            start,
            end,
            next,
            value_start: value.start_byte(),
        }
    } else if let Some(clause) = find_child_of_kind(node, "export_clause") {
        ExportDecl {
            kind: ExportKind::Named {
                specifiers: export_clause_specifiers(clause, bytes),
            },
            is_default: false,
            passthrough: false,
            import_index: None,
            start,
            end,
            next,
            value_start: start,
        }
    } else {
        return Err(CompileError::UnsupportedSyntax {
            detail: format!("unrecognised export form in `{id}`"),
        });
    };

    if export.is_default {
        if decls.default_export.is_some() {
            return Err(CompileError::DuplicateDefaultExport { id: id.to_owned() });
        }
        decls.default_export = Some(decls.exports.len());
    }
    decls.exports.push(export);
    Ok(())
}

/// Classify `export <declaration>` / `export default <declaration>`.
fn classify_declaration(declaration: Node, bytes: &[u8], id: &str) -> Result<ExportKind> {
    match declaration.kind() {
        "function_declaration" | "generator_function_declaration" => {
            match declaration.child_by_field_name("name") {
                Some(name) => Ok(ExportKind::NamedFunction {
                    name: node_text(name, bytes).to_owned(),
                }),
                None => Ok(ExportKind::AnonFunction),
            }
        }
        "class_declaration" => match declaration.child_by_field_name("name") {
            Some(name) => Ok(ExportKind::NamedClass {
                name: node_text(name, bytes).to_owned(),
            }),
            None => Ok(ExportKind::AnonClass),
        },
        "variable_declaration" | "lexical_declaration" => {
            let mut cursor = declaration.walk();
            let declarators: Vec<Node> = declaration
                .children(&mut cursor)
                .filter(|c| c.kind() == "variable_declarator")
                .collect();
            if declarators.len() != 1 {
                return Err(CompileError::UnsupportedSyntax {
                    detail: format!(
                        "`{id}` exports a declaration with multiple declarators (split it up)"
                    ),
                });
            }
            let name_node = declarators[0].child_by_field_name("name");
            match name_node {
                Some(n) if n.kind() == "identifier" => Ok(ExportKind::VarDeclaration {
                    name: node_text(n, bytes).to_owned(),
                }),
                _ => Err(CompileError::UnsupportedSyntax {
                    detail: format!("`{id}` exports a destructuring declaration"),
                }),
            }
        }
        other => Err(CompileError::UnsupportedSyntax {
            detail: format!("`{id}` exports a `{other}` declaration"),
        }),
    }
}

fn export_clause_specifiers(clause: Node, bytes: &[u8]) -> Vec<ExportSpecifier> {
    let mut specifiers = Vec::new();
    let mut cursor = clause.walk();
    for child in clause.children(&mut cursor) {
        if child.kind() != "export_specifier" {
            continue;
        }
        if let Some(name_node) = child.child_by_field_name("name") {
            let name = node_text(name_node, bytes).to_owned();
            let as_ = child
                .child_by_field_name("alias")
                .map(|a| node_text(a, bytes).to_owned())
                .unwrap_or_else(|| name.clone());
            specifiers.push(ExportSpecifier { name, as_ });
        }
    }
    specifiers
}

/// Find the first direct child of `node` with the given kind.
fn find_child_of_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            return Some(child);
        }
    }
    None
}

/// Two local bindings may not share a name. Passthrough specifiers bind
/// nothing locally and are exempt.
fn check_duplicate_aliases(decls: &Declarations, id: &str) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for import in decls.imports.iter().filter(|i| !i.passthrough) {
        for spec in &import.specifiers {
            if !seen.insert(spec.as_.clone()) {
                return Err(CompileError::DuplicateImportAlias {
                    alias: spec.as_.clone(),
                    id: id.to_owned(),
                });
            }
        }
    }
    Ok(())
}

/// Offset one past a statement's trailing whitespace and line break, so a
/// deletion removes the whole line without touching the next statement.
fn next_offset(source: &str, end: usize) -> usize {
    let bytes = source.as_bytes();
    let mut i = end;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'\r' {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'\n' {
        i += 1;
    }
    i
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
