//! The body rewriter.
//!
//! One traversal per module over the annotated tree, driven entirely by
//! original byte offsets against the [`EditBuffer`]: rewrite identifier
//! references through `identifier_replacements`, guard against reassignment
//! of imported bindings, mirror reassignments of exported bindings onto the
//! exports object, replace top-level `this` with `undefined`, and delete the
//! module syntax itself.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use crate::edit::EditBuffer;
use crate::error::{CompileError, Result};
use crate::graph::module::Module;
use crate::parser::declarations::{ExportKind, SpecifierKind};
use crate::parser::node_text;

/// How `export default <value>` forms are rewritten.
#[derive(Debug, Clone)]
pub enum DefaultStyle {
    /// Bundle: `var <name> = <value>;`.
    Var(String),
    /// Single-file strict: `exports['default'] = <value>;`.
    ExportsDefault,
    /// Single-file defaults-only CommonJS: `module.exports = <value>;`.
    ModuleExports,
    /// Single-file defaults-only inside a factory: `return <value>;`.
    Return,
}

/// Per-module rewrite inputs. `replacements` is the planner's
/// `identifier_replacements`; `mirrors` maps local binding → output export
/// name for every binding this module is responsible for exporting.
pub struct RewriteOptions<'a> {
    pub replacements: &'a HashMap<String, String>,
    pub mirrors: &'a HashMap<String, String>,
    pub default_style: DefaultStyle,
}

pub struct RewriteResult {
    pub buffer: EditBuffer,
    /// Output export names fully covered by a top-level mirror; the final
    /// export block skips these.
    pub already_exported: HashSet<String>,
}

struct Rewriter<'a> {
    module: &'a Module,
    source: &'a [u8],
    options: &'a RewriteOptions<'a>,
    imported_bindings: HashSet<String>,
    imported_namespaces: HashSet<String>,
    top_level_this: HashSet<(usize, usize)>,
    buffer: EditBuffer,
    already_exported: HashSet<String>,
}

/// Rewrite one module body. The returned buffer still needs the namespace
/// block / export block / wrapper contributed by the emitter.
pub fn rewrite(module: &Module, options: &RewriteOptions) -> Result<RewriteResult> {
    let mut imported_bindings = HashSet::new();
    let mut imported_namespaces = HashSet::new();
    for import in module.imports.iter().filter(|i| !i.passthrough) {
        for spec in &import.specifiers {
            imported_bindings.insert(spec.as_.clone());
            if spec.kind == SpecifierKind::Batch {
                imported_namespaces.insert(spec.as_.clone());
            }
        }
    }

    let mut rewriter = Rewriter {
        module,
        source: module.source.as_bytes(),
        options,
        imported_bindings,
        imported_namespaces,
        top_level_this: module.scopes.top_level_this.iter().copied().collect(),
        buffer: EditBuffer::new(&module.source),
        already_exported: HashSet::new(),
    };

    for &(start, end) in &module.map_comment_spans {
        rewriter.buffer.remove(start, end);
    }

    rewriter.walk(module.tree.root_node(), 0)?;
    rewriter.delete_module_syntax();
    rewriter.buffer.trim();

    Ok(RewriteResult {
        buffer: rewriter.buffer,
        already_exported: rewriter.already_exported,
    })
}

impl Rewriter<'_> {
    fn replacement_of<'b>(&'b self, name: &'b str) -> &'b str {
        self.options
            .replacements
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    fn shadowed(&self, scope: usize, name: &str) -> bool {
        self.module.scopes.contains(scope, name, true)
    }

    fn walk(&mut self, node: Node, scope: usize) -> Result<()> {
        let scope = *self.module.scopes.scope_of.get(&node.id()).unwrap_or(&scope);

        match node.kind() {
            // Import statements are deleted wholesale; export statements keep
            // only their declaration/value side.
            "import_statement" => return Ok(()),
            "export_statement" => {
                if let Some(declaration) = node.child_by_field_name("declaration") {
                    self.walk(declaration, scope)?;
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.walk(value, scope)?;
                }
                return Ok(());
            }
            "identifier" => {
                self.rewrite_identifier(node, scope);
                return Ok(());
            }
            "shorthand_property_identifier" | "shorthand_property_identifier_pattern" => {
                self.rewrite_shorthand(node, scope);
                return Ok(());
            }
            "this" => {
                let span = (node.start_byte(), node.end_byte());
                if self.top_level_this.contains(&span) {
                    self.buffer.replace(span.0, span.1, "undefined");
                }
                return Ok(());
            }
            "assignment_expression" | "augmented_assignment_expression" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.handle_reassignment(node, left, scope, false)?;
                }
            }
            "update_expression" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    self.handle_reassignment(node, argument, scope, true)?;
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.walk(child, scope)?;
        }
        Ok(())
    }

    /// Rewrite a plain identifier reference through the replacement map,
    /// unless an enclosing scope shadows it or it is a scope-local self-name.
    fn rewrite_identifier(&mut self, node: Node, scope: usize) {
        let name = node_text(node, self.source);
        let Some(replacement) = self.options.replacements.get(name) else {
            return;
        };
        if replacement == name || self.shadowed(scope, name) {
            return;
        }
        if let Some(parent) = node.parent() {
            // A function/class expression's own name binds only inside
            // itself and is never rewritten.
            let is_self_name = matches!(
                parent.kind(),
                "function_expression" | "generator_function" | "class"
            ) && parent.child_by_field_name("name") == Some(node);
            if is_self_name {
                return;
            }
        }
        self.buffer
            .replace(node.start_byte(), node.end_byte(), replacement.clone());
    }

    /// `{ x }` with `x` renamed must become `{ x: a__x }`; likewise for the
    /// destructuring pattern form.
    fn rewrite_shorthand(&mut self, node: Node, scope: usize) {
        let name = node_text(node, self.source);
        let Some(replacement) = self.options.replacements.get(name) else {
            return;
        };
        if replacement == name || self.shadowed(scope, name) {
            return;
        }
        self.buffer.replace(
            node.start_byte(),
            node.end_byte(),
            format!("{name}: {replacement}"),
        );
    }

    /// Reassignment guard and export mirroring for one assignment or update
    /// expression.
    fn handle_reassignment(
        &mut self,
        expr: Node,
        target: Node,
        scope: usize,
        is_update: bool,
    ) -> Result<()> {
        match target.kind() {
            "identifier" => {
                let name = node_text(target, self.source);
                if self.shadowed(scope, name) {
                    return Ok(());
                }
                if self.imported_bindings.contains(name) {
                    return Err(CompileError::ReassignImport {
                        name: name.to_owned(),
                    });
                }
                if let Some(export_name) = self.options.mirrors.get(name) {
                    let local = self.replacement_of(name).to_owned();
                    self.mirror(expr, export_name.clone(), &local, is_update, scope);
                }
            }
            "member_expression" | "subscript_expression" => {
                if let Some(object) = target.child_by_field_name("object") {
                    if object.kind() == "identifier" {
                        let name = node_text(object, self.source);
                        if self.imported_namespaces.contains(name)
                            && !self.shadowed(scope, name)
                        {
                            return Err(CompileError::ReassignNamespace {
                                name: name.to_owned(),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Emit the side-effect that keeps `exports.<name>` current:
    /// `x = v` → `exports.x = x = v`; `x++` → `x++, exports.x = x`; an update
    /// inside a declarator initializer instead appends `exports.x = x;` after
    /// the whole declaration (a comma expression would change the value).
    fn mirror(
        &mut self,
        expr: Node,
        export_name: String,
        local: &str,
        is_update: bool,
        scope: usize,
    ) {
        if !is_update {
            self.buffer
                .insert(expr.start_byte(), format!("exports.{export_name} = "));
        } else if let Some(declaration) = enclosing_declaration(expr) {
            let end = declaration.end_byte();
            let ends_with_semicolon = self.source.get(end - 1) == Some(&b';');
            let lead = if ends_with_semicolon { " " } else { "; " };
            self.buffer
                .insert(end, format!("{lead}exports.{export_name} = {local};"));
        } else {
            self.buffer
                .insert(expr.end_byte(), format!(", exports.{export_name} = {local}"));
        }

        if scope == 0 {
            self.already_exported.insert(export_name);
        }
    }

    /// Delete import statements and the `export` keywords, applying the
    /// configured default-export style.
    fn delete_module_syntax(&mut self) {
        for import in self.module.imports.iter().filter(|i| !i.passthrough) {
            self.buffer.remove(import.start, import.next);
        }

        for export in &self.module.exports {
            match &export.kind {
                ExportKind::Named { .. } => {
                    // Local and passthrough lists vanish entirely; the final
                    // export block / chains carry their meaning.
                    self.buffer.remove(export.start, export.next);
                }
                ExportKind::VarDeclaration { .. }
                | ExportKind::NamedFunction { .. }
                | ExportKind::NamedClass { .. } => {
                    self.buffer.remove(export.start, export.value_start);
                }
                ExportKind::AnonFunction | ExportKind::AnonClass | ExportKind::Expression => {
                    let lead = match &self.options.default_style {
                        DefaultStyle::Var(name) => format!("var {name} = "),
                        DefaultStyle::ExportsDefault => "exports['default'] = ".to_owned(),
                        DefaultStyle::ModuleExports => "module.exports = ".to_owned(),
                        DefaultStyle::Return => "return ".to_owned(),
                    };
                    self.buffer.replace(export.start, export.value_start, lead);
                    if self.source.get(export.end - 1) != Some(&b';') {
                        self.buffer.insert(export.end, ";");
                    }
                }
            }
        }
    }
}

/// The `var`/`let`/`const` statement enclosing `node`, if the node sits
/// inside a declarator's initializer.
fn enclosing_declaration(node: Node) -> Option<Node> {
    let mut current = node.parent();
    while let Some(n) = current {
        match n.kind() {
            "variable_declaration" | "lexical_declaration" => return Some(n),
            "statement_block" | "program" | "function_declaration" | "function_expression"
            | "arrow_function" | "method_definition" => return None,
            _ => current = n.parent(),
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
