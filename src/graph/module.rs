use std::collections::HashMap;
use std::path::PathBuf;

use tree_sitter::Tree;

use crate::error::Result;
use crate::parser;
use crate::parser::declarations::{self, Declarations, ExportDecl, ImportDecl};
use crate::parser::scopes::{self, ScopeAnnotation};

/// A loaded source unit: original text, parsed tree, scope annotation, and
/// the extracted declarations. Created at load time, mutated by the export
/// planner (names and replacements), consumed by the body rewriter.
#[derive(Debug)]
pub struct Module {
    /// Canonical module identifier — path-shaped, no extension.
    pub id: String,
    /// Where the file came from on disk (diagnostics and source maps).
    pub path: PathBuf,
    /// The original text; never mutated.
    pub source: String,
    pub tree: Tree,
    pub scopes: ScopeAnnotation,
    /// Spans of `sourceMappingURL` comments, deleted during rewriting.
    pub map_comment_spans: Vec<(usize, usize)>,
    pub imports: Vec<ImportDecl>,
    pub exports: Vec<ExportDecl>,
    /// Index into `exports` of the default export, if any.
    pub default_export: Option<usize>,
    /// Names this module exports, `default` included, in source order.
    pub does_export: Vec<String>,
    /// local name → final output name, built by the export planner.
    pub identifier_replacements: HashMap<String, String>,
    /// Unique bundle-wide identifier prefix, assigned by the name allocator.
    pub name: String,
    /// The output identifier a default export lands in, set by the planner.
    pub default_name: Option<String>,
    /// True when some other module imports this one as a namespace.
    pub exports_namespace: bool,
    /// Position in the load order; cycle members keep this ordering.
    pub load_index: usize,
}

impl Module {
    pub fn has_default_export(&self) -> bool {
        self.default_export.is_some()
    }

    /// Names this module's exported bindings, without `default`.
    pub fn named_exports(&self) -> impl Iterator<Item = &str> {
        self.does_export
            .iter()
            .map(String::as_str)
            .filter(|n| *n != "default")
    }
}

/// A module that lives outside the bundle: metadata only.
#[derive(Debug, Clone)]
pub struct ExternalModule {
    pub id: String,
    /// Identifier the wrapper binds the external to.
    pub name: String,
    /// Some importer uses its default export.
    pub needs_default: bool,
    /// Some importer uses a named export (or the namespace).
    pub needs_named: bool,
}

impl ExternalModule {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: String::new(),
            needs_default: false,
            needs_named: false,
        }
    }

    /// The identifier importers of the default export reference. When the
    /// external is also used by name, the wrapper binds the namespace and the
    /// default goes through an interop shim variable.
    pub fn default_reference(&self) -> String {
        if self.needs_named {
            format!("{}__default", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Parse, annotate, and extract one file's declarations.
///
/// This is the module loader's per-file half — fetch and path resolution live
/// in the graph resolver so this stays synchronous and deterministic.
pub fn analyze(id: &str, path: PathBuf, source: String) -> Result<Module> {
    let parsed = parser::parse(&source, &path.display().to_string())?;
    let scopes = scopes::annotate(&parsed.tree, &source)?;
    let Declarations {
        imports,
        exports,
        default_export,
    } = declarations::extract(&parsed.tree, &source, id)?;

    let does_export = declarations::exported_names(&exports);

    Ok(Module {
        id: id.to_owned(),
        path,
        source,
        tree: parsed.tree,
        scopes,
        map_comment_spans: parsed.map_comment_spans,
        imports,
        exports,
        default_export,
        does_export,
        identifier_replacements: HashMap::new(),
        name: String::new(),
        default_name: None,
        exports_namespace: false,
        load_index: 0,
    })
}
