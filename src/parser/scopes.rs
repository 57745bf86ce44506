//! Lexical scope annotation.
//!
//! A single walk over the syntax tree builds a scope arena: every
//! function-like node gets a scope seeded with its parameter names, every
//! block gets a lexical scope. `var` and function/class declarations land in
//! the nearest function scope, `let`/`const` in the nearest block scope. The
//! walk also collects the bookkeeping the body rewriter needs: top-level
//! function names (early-export candidates), template-literal ranges
//! (indentation exclusion), and top-level `this` spans.

use std::collections::HashMap;

use tree_sitter::{Node, Tree};

use crate::error::{CompileError, Result};
use crate::parser::node_text;

/// One lexical environment: an ordered list of declared names and a link to
/// the enclosing scope. Scope 0 is the module top level.
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<usize>,
    pub names: Vec<String>,
}

/// The result of annotating one module's tree.
#[derive(Debug, Default)]
pub struct ScopeAnnotation {
    pub scopes: Vec<Scope>,
    /// Maps a scope-carrying node's id to its scope index.
    pub scope_of: HashMap<usize, usize>,
    /// Names of top-level function declarations, in source order.
    pub top_level_functions: Vec<String>,
    /// Template literal spans; indentation must not be inserted inside.
    pub template_ranges: Vec<(usize, usize)>,
    /// Spans of top-level `this`, to be replaced with `undefined`.
    pub top_level_this: Vec<(usize, usize)>,
}

impl Default for Scope {
    fn default() -> Self {
        Self { parent: None, names: Vec::new() }
    }
}

impl ScopeAnnotation {
    /// All names declared at the module top level, in declaration order.
    pub fn top_level_names(&self) -> &[String] {
        &self.scopes[0].names
    }

    /// Walk from `scope` outwards looking for `name`. With
    /// `ignore_top_level`, a hit in the root scope counts as *not* found —
    /// this is how the rewriter distinguishes shadowing locals from the
    /// top-level declarations it is busy renaming.
    pub fn contains(&self, scope: usize, name: &str, ignore_top_level: bool) -> bool {
        let mut current = Some(scope);
        while let Some(idx) = current {
            let s = &self.scopes[idx];
            if s.names.iter().any(|n| n == name) {
                if s.parent.is_none() && ignore_top_level {
                    return false;
                }
                return true;
            }
            current = s.parent;
        }
        false
    }
}

struct Annotator<'a> {
    source: &'a [u8],
    out: ScopeAnnotation,
}

/// Annotate a parsed module.
pub fn annotate(tree: &Tree, source: &str) -> Result<ScopeAnnotation> {
    let mut annotator = Annotator {
        source: source.as_bytes(),
        out: ScopeAnnotation {
            scopes: vec![Scope::default()],
            ..ScopeAnnotation::default()
        },
    };
    annotator.walk(tree.root_node(), 0, 0, 0)?;
    Ok(annotator.out)
}

impl Annotator<'_> {
    fn new_scope(&mut self, parent: usize, node: Node) -> usize {
        let idx = self.out.scopes.len();
        self.out.scopes.push(Scope {
            parent: Some(parent),
            names: Vec::new(),
        });
        self.out.scope_of.insert(node.id(), idx);
        idx
    }

    fn declare(&mut self, scope: usize, name: &str) {
        self.out.scopes[scope].names.push(name.to_owned());
    }

    /// `fn_depth` counts enclosing `this`-binding functions; arrow functions
    /// are transparent to `this` and do not bump it.
    fn walk(
        &mut self,
        node: Node,
        func_scope: usize,
        block_scope: usize,
        fn_depth: usize,
    ) -> Result<()> {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(name_node, self.source);
                    self.declare(func_scope, name);
                    if func_scope == 0 {
                        self.out.top_level_functions.push(name.to_owned());
                    }
                }
                let scope = self.new_scope(block_scope, node);
                self.seed_parameters(node, scope);
                return self.walk_children(node, scope, scope, fn_depth + 1);
            }
            "function_expression" | "generator_function" => {
                let scope = self.new_scope(block_scope, node);
                // A function expression's own name binds only inside itself.
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(name_node, self.source).to_owned();
                    self.declare(scope, &name);
                }
                self.seed_parameters(node, scope);
                return self.walk_children(node, scope, scope, fn_depth + 1);
            }
            "method_definition" => {
                let scope = self.new_scope(block_scope, node);
                self.seed_parameters(node, scope);
                return self.walk_children(node, scope, scope, fn_depth + 1);
            }
            "arrow_function" => {
                let scope = self.new_scope(block_scope, node);
                if let Some(param) = node.child_by_field_name("parameter") {
                    let mut names = Vec::new();
                    pattern_names(param, self.source, &mut names);
                    for name in names {
                        self.declare(scope, &name);
                    }
                }
                self.seed_parameters(node, scope);
                // Arrows do not bind `this`.
                return self.walk_children(node, scope, scope, fn_depth);
            }
            "class_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(name_node, self.source).to_owned();
                    self.declare(func_scope, &name);
                }
                return self.walk_children(node, func_scope, block_scope, fn_depth);
            }
            "class" => {
                // Class expression: its name binds only inside the class body.
                let scope = self.new_scope(block_scope, node);
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(name_node, self.source).to_owned();
                    self.declare(scope, &name);
                }
                return self.walk_children(node, func_scope, scope, fn_depth);
            }
            "statement_block" | "for_statement" => {
                let scope = self.new_scope(block_scope, node);
                return self.walk_children(node, func_scope, scope, fn_depth);
            }
            "for_in_statement" => {
                let scope = self.new_scope(block_scope, node);
                // `for (var x in y)` / `for (let x of y)` declare via fields,
                // not via a nested declaration node.
                if let Some(kind_node) = node.child_by_field_name("kind") {
                    if let Some(left) = node.child_by_field_name("left") {
                        let mut names = Vec::new();
                        pattern_names(left, self.source, &mut names);
                        let target = if node_text(kind_node, self.source) == "var" {
                            func_scope
                        } else {
                            scope
                        };
                        for name in names {
                            self.declare(target, &name);
                        }
                    }
                }
                return self.walk_children(node, func_scope, scope, fn_depth);
            }
            "catch_clause" => {
                let scope = self.new_scope(block_scope, node);
                if let Some(param) = node.child_by_field_name("parameter") {
                    let mut names = Vec::new();
                    pattern_names(param, self.source, &mut names);
                    for name in names {
                        self.declare(scope, &name);
                    }
                }
                return self.walk_children(node, func_scope, scope, fn_depth);
            }
            "variable_declaration" | "lexical_declaration" => {
                let target = if node.kind() == "variable_declaration" {
                    func_scope
                } else {
                    block_scope
                };
                let mut cursor = node.walk();
                let declarators: Vec<Node> = node
                    .children(&mut cursor)
                    .filter(|c| c.kind() == "variable_declarator")
                    .collect();
                for declarator in declarators {
                    if let Some(name) = declarator.child_by_field_name("name") {
                        let mut names = Vec::new();
                        pattern_names(name, self.source, &mut names);
                        for n in names {
                            self.declare(target, &n);
                        }
                    }
                }
            }
            "template_string" => {
                self.out
                    .template_ranges
                    .push((node.start_byte(), node.end_byte()));
            }
            "this" => {
                if fn_depth == 0 {
                    if let Some(parent) = node.parent() {
                        let is_member_object = matches!(
                            parent.kind(),
                            "member_expression" | "subscript_expression"
                        ) && parent.child_by_field_name("object") == Some(node);
                        if is_member_object {
                            return Err(CompileError::TopLevelThis);
                        }
                    }
                    self.out
                        .top_level_this
                        .push((node.start_byte(), node.end_byte()));
                }
            }
            _ => {}
        }
        self.walk_children(node, func_scope, block_scope, fn_depth)
    }

    fn walk_children(
        &mut self,
        node: Node,
        func_scope: usize,
        block_scope: usize,
        fn_depth: usize,
    ) -> Result<()> {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.walk(child, func_scope, block_scope, fn_depth)?;
        }
        Ok(())
    }

    fn seed_parameters(&mut self, node: Node, scope: usize) {
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            let children: Vec<Node> = params.children(&mut cursor).collect();
            for param in children {
                let mut names = Vec::new();
                pattern_names(param, self.source, &mut names);
                for name in names {
                    self.declare(scope, &name);
                }
            }
        }
    }
}

/// Collect every identifier bound by a declaration pattern. Covers plain
/// identifiers, object/array destructuring, defaults, and rest parameters.
fn pattern_names(node: Node, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "identifier" => out.push(node_text(node, source).to_owned()),
        "shorthand_property_identifier_pattern" => {
            out.push(node_text(node, source).to_owned());
        }
        "pair_pattern" => {
            if let Some(value) = node.child_by_field_name("value") {
                pattern_names(value, source, out);
            }
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(left) = node.child_by_field_name("left") {
                pattern_names(left, source, out);
            }
        }
        "object_pattern" | "array_pattern" | "rest_pattern" => {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            for child in children {
                pattern_names(child, source, out);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
