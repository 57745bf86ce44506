//! The export planner.
//!
//! For a bundle: decide every module's unique name, compute the cross-module
//! conflict set, fill in each module's `identifier_replacements`, pick the
//! identifier every default export lands in, resolve import specifiers
//! through the re-export chains, and work out which module is responsible
//! for emitting each of the entry's exports (and whether early or late).

use std::collections::{HashMap, HashSet};

use crate::error::{CompileError, Result};
use crate::graph::ModuleGraph;
use crate::graph::module::Module;
use crate::names::{NameAllocator, RESERVED_BUILTINS, sanitize};
use crate::parser::declarations::{ExportKind, SpecifierKind};

/// One output export the wrapper must surface.
#[derive(Debug, Clone)]
pub struct ExportTask {
    /// The name the outside world sees.
    pub export_name: String,
    /// The bundle-local identifier holding the value.
    pub replacement: String,
    /// Index of the owning local module; `None` when the value comes
    /// straight off an external.
    pub owner: Option<usize>,
    /// Emit at the top of the wrapper body (function declarations hoist, so
    /// cyclic dependents see the binding before the bodies run).
    pub early: bool,
    /// The export travelled through a re-export chain; strict mode surfaces
    /// it through a live getter.
    pub chained: bool,
}

/// The bundle-wide emission plan.
#[derive(Debug, Default)]
pub struct EmitPlan {
    pub tasks: Vec<ExportTask>,
    /// module index → (local name → output export name). Assignments to
    /// these locals are mirrored onto the exports object.
    pub mirrors: HashMap<usize, HashMap<String, String>>,
}

/// Assign every module and external its unique name.
///
/// Order of precedence: user-supplied names, then adoption of a default
/// import alias, then names derived from the id's path components.
pub fn assign_names(graph: &mut ModuleGraph, user_names: &HashMap<String, String>) -> Result<()> {
    let mut allocator = NameAllocator::new([]);

    for module in &mut graph.modules {
        if let Some(name) = user_names.get(&module.id) {
            if !allocator.adopt(name) {
                return Err(CompileError::NamingCollision { name: name.clone() });
            }
            module.name = name.clone();
        }
    }
    for external in &mut graph.externals {
        if let Some(name) = user_names.get(&external.id) {
            if !allocator.adopt(name) {
                return Err(CompileError::NamingCollision { name: name.clone() });
            }
            external.name = name.clone();
        }
    }

    // A module imported as a default adopts the alias when it is free.
    let mut adoptions: Vec<(String, String)> = Vec::new();
    for module in &graph.modules {
        for import in module.imports.iter().filter(|i| !i.passthrough) {
            let Some(target_id) = import.id.as_deref() else { continue };
            for spec in &import.specifiers {
                if spec.kind == SpecifierKind::Default {
                    adoptions.push((target_id.to_owned(), spec.as_.clone()));
                }
            }
        }
    }
    for (target_id, alias) in adoptions {
        let unnamed_local = graph
            .lookup
            .get(&target_id)
            .map(|&i| graph.modules[i].name.is_empty());
        let unnamed_external = graph
            .external_lookup
            .get(&target_id)
            .map(|&i| graph.externals[i].name.is_empty());
        let sanitized = sanitize(&alias);
        if unnamed_local == Some(true) && allocator.adopt(&sanitized) {
            let idx = graph.lookup[&target_id];
            graph.modules[idx].name = sanitized;
        } else if unnamed_external == Some(true) && allocator.adopt(&sanitized) {
            let idx = graph.external_lookup[&target_id];
            graph.externals[idx].name = sanitized;
        }
    }

    for module in &mut graph.modules {
        if module.name.is_empty() {
            module.name = allocator.allocate_from_id(&module.id);
        }
    }
    for external in &mut graph.externals {
        if external.name.is_empty() {
            external.name = allocator.allocate_from_id(&external.id);
        }
    }

    Ok(())
}

/// Names that need a module prefix in the combined output: top-level names
/// declared in more than one module, module names shadowed by another
/// module's top-level declaration, anything colliding with a host builtin,
/// and the names of namespace-exporting modules (their name is taken by the
/// generated namespace object).
fn conflict_set(graph: &ModuleGraph) -> HashSet<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for module in &graph.modules {
        for name in module.scopes.top_level_names() {
            *counts.entry(name.as_str()).or_insert(0) += 1;
        }
    }

    let mut conflicts: HashSet<String> = counts
        .iter()
        .filter(|(name, count)| **count > 1 || RESERVED_BUILTINS.contains(*name))
        .map(|(name, _)| (*name).to_owned())
        .collect();

    for module in &graph.modules {
        if module.exports_namespace {
            conflicts.insert(module.name.clone());
        }
        for other in &graph.modules {
            if other.id != module.id
                && other.scopes.top_level_names().iter().any(|n| n == &module.name)
            {
                conflicts.insert(module.name.clone());
            }
        }
    }

    conflicts
}

/// The bundle-local identifier that holds `(id, name)` once chains have been
/// followed to the owning module.
pub fn binding_reference(graph: &ModuleGraph, id: &str, name: &str) -> String {
    if let Some(&idx) = graph.lookup.get(id) {
        let module = &graph.modules[idx];
        return match name {
            "*" => module.name.clone(),
            "default" => module
                .default_name
                .clone()
                .unwrap_or_else(|| module.name.clone()),
            _ => module
                .identifier_replacements
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.to_owned()),
        };
    }
    if let Some(&idx) = graph.external_lookup.get(id) {
        let external = &graph.externals[idx];
        return match name {
            "*" => external.name.clone(),
            "default" => external.default_reference(),
            _ => format!("{}.{}", external.name, name),
        };
    }
    name.to_owned()
}

/// Whether the default export's declaration is intrinsically named.
fn default_intrinsic_name(module: &Module) -> Option<&str> {
    let idx = module.default_export?;
    match &module.exports[idx].kind {
        ExportKind::NamedFunction { name } | ExportKind::NamedClass { name } => Some(name),
        _ => None,
    }
}

/// Build the bundle plan: fills every module's `identifier_replacements` and
/// `default_name`, and returns the export tasks plus mirror sets.
pub fn plan_bundle(graph: &mut ModuleGraph) -> Result<EmitPlan> {
    let conflicts = conflict_set(graph);

    // Top-level renames and default-export landing identifiers.
    for module in &mut graph.modules {
        module.identifier_replacements.clear();
        let prefix = module.name.clone();
        for name in module.scopes.top_level_names().to_vec() {
            if conflicts.contains(&name) {
                module
                    .identifier_replacements
                    .insert(name.clone(), format!("{prefix}__{name}"));
            }
        }
        module.default_name = if module.has_default_export() {
            match default_intrinsic_name(module).map(str::to_owned) {
                Some(n) => Some(
                    module
                        .identifier_replacements
                        .get(&n)
                        .cloned()
                        .unwrap_or(n),
                ),
                None => {
                    // An anonymous default lands in a variable named after the
                    // module; dodge to `<name>__default` whenever the module
                    // itself declares that name or it conflicts bundle-wide.
                    let own = module.scopes.top_level_names().iter().any(|n| n == &prefix);
                    if own || conflicts.contains(&prefix) {
                        Some(format!("{prefix}__default"))
                    } else {
                        Some(prefix.clone())
                    }
                }
            }
        } else {
            None
        };
    }

    // Import aliases resolve through the chains to their owning binding.
    let mut alias_writes: Vec<(usize, String, String)> = Vec::new();
    for (idx, module) in graph.modules.iter().enumerate() {
        for import in module.imports.iter().filter(|i| !i.passthrough) {
            let Some(target_id) = import.id.as_deref() else { continue };
            for spec in &import.specifiers {
                let (owner_id, owner_name) = graph.resolve_chain(target_id, &spec.name);
                let replacement = binding_reference(graph, &owner_id, &owner_name);
                alias_writes.push((idx, spec.as_.clone(), replacement));
            }
        }
    }
    for (idx, alias, replacement) in alias_writes {
        graph.modules[idx]
            .identifier_replacements
            .insert(alias, replacement);
    }

    // Entry exports: walk chains to the owning module and record who emits
    // what, early or late.
    let entry_idx = graph.lookup[&graph.entry_id];
    let mut plan = EmitPlan::default();
    for export_name in graph.entry().does_export.clone() {
        let (owner_id, owner_name) = graph.resolve_chain(&graph.entry_id, &export_name);
        let replacement = binding_reference(graph, &owner_id, &owner_name);

        if let Some(&owner_idx) = graph.lookup.get(&owner_id) {
            let owner = &graph.modules[owner_idx];
            let early = owner
                .scopes
                .top_level_functions
                .iter()
                .any(|f| f == &owner_name)
                || (owner_name == "default" && default_intrinsic_name(owner).is_some_and(|n| {
                    owner.scopes.top_level_functions.iter().any(|f| f == n)
                }));
            plan.tasks.push(ExportTask {
                export_name: export_name.clone(),
                replacement,
                owner: Some(owner_idx),
                early,
                chained: owner_idx != entry_idx,
            });
            if owner_name != "default" {
                plan.mirrors
                    .entry(owner_idx)
                    .or_default()
                    .insert(owner_name, export_name);
            }
        } else {
            plan.tasks.push(ExportTask {
                export_name,
                replacement,
                owner: None,
                early: false,
                chained: true,
            });
        }
    }

    Ok(plan)
}

/// Single-file naming: each import path gets a module name, via the user's
/// hook when provided, derived from the path otherwise. The module's own
/// top-level names are claimed first so a generated name never shadows one.
pub fn assign_import_names(
    module: &Module,
    get_module_name: Option<&dyn Fn(&str) -> Option<String>>,
) -> Result<HashMap<String, String>> {
    let mut allocator = NameAllocator::new(
        module
            .scopes
            .top_level_names()
            .iter()
            .map(String::as_str),
    );
    let mut names: HashMap<String, String> = HashMap::new();

    for import in &module.imports {
        if names.contains_key(&import.path) {
            continue;
        }
        if let Some(hook) = get_module_name {
            if let Some(name) = hook(&import.path) {
                if !allocator.adopt(&name) {
                    return Err(CompileError::NamingCollision { name });
                }
                names.insert(import.path.clone(), name);
                continue;
            }
        }
        let derived = allocator.allocate_from_id(&import.path);
        names.insert(import.path.clone(), derived);
    }

    Ok(names)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LoadOptions, load};
    use std::path::Path;

    fn build_graph(files: &[(&str, &str)], entry: &str) -> ModuleGraph {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }
        load(
            entry,
            &LoadOptions {
                base: dir.path().to_path_buf(),
                skip: &[],
                transform: None,
                resolve_path: None,
            },
        )
        .unwrap()
    }

    fn named_graph(files: &[(&str, &str)], entry: &str) -> ModuleGraph {
        let mut graph = build_graph(files, entry);
        assign_names(&mut graph, &HashMap::new()).unwrap();
        graph
    }

    #[test]
    fn test_conflicting_top_levels_get_prefixed() {
        let mut graph = named_graph(
            &[
                (
                    "b.js",
                    "import { bar } from './a';\nimport { baz } from './c';\nexport default bar() + baz;\n",
                ),
                (
                    "a.js",
                    "export var foo = 1;\nexport function bar() { return foo; }\n",
                ),
                ("c.js", "var foo = 2;\nexport var baz = foo;\n"),
            ],
            "b.js",
        );
        let plan = plan_bundle(&mut graph).unwrap();
        let a = &graph.modules[graph.lookup["a"]];
        assert_eq!(a.identifier_replacements["foo"], "a__foo");
        let c = &graph.modules[graph.lookup["c"]];
        assert_eq!(c.identifier_replacements["foo"], "c__foo");
        // `bar` is unique, so the import alias resolves to the plain name.
        let b = &graph.modules[graph.lookup["b"]];
        assert_eq!(b.identifier_replacements["bar"], "bar");
        assert!(!plan.tasks.is_empty());
    }

    #[test]
    fn test_default_alias_adopted_as_module_name() {
        let mut graph = build_graph(
            &[
                ("main.js", "import helper from './lib/helper';\nexport default helper;\n"),
                ("lib/helper.js", "export default function () {}\n"),
            ],
            "main.js",
        );
        assign_names(&mut graph, &HashMap::new()).unwrap();
        let helper = &graph.modules[graph.lookup["lib/helper"]];
        assert_eq!(helper.name, "helper");
    }

    #[test]
    fn test_user_name_collision_rejected() {
        let mut graph = build_graph(
            &[
                ("main.js", "import { a } from './a';\nimport { b } from './b';\nexport default a + b;\n"),
                ("a.js", "export var a = 1;\n"),
                ("b.js", "export var b = 2;\n"),
            ],
            "main.js",
        );
        let mut names = HashMap::new();
        names.insert("a".to_owned(), "same".to_owned());
        names.insert("b".to_owned(), "same".to_owned());
        let err = assign_names(&mut graph, &names).unwrap_err();
        assert!(matches!(err, CompileError::NamingCollision { name } if name == "same"));
    }

    #[test]
    fn test_namespace_module_conflicts_on_own_name() {
        let mut graph = named_graph(
            &[
                ("main.js", "import * as a from './a';\nexport default a.x;\n"),
                ("a.js", "export var x = 1;\nvar a = 'local';\n"),
            ],
            "main.js",
        );
        plan_bundle(&mut graph).unwrap();
        let a = &graph.modules[graph.lookup["a"]];
        // `a` declares its own name, and the namespace object claims it.
        assert_eq!(a.identifier_replacements["a"], "a__a");
        // Namespace import alias resolves to the module name.
        let main = &graph.modules[graph.lookup["main"]];
        assert_eq!(main.identifier_replacements["a"], "a");
    }

    #[test]
    fn test_chain_task_reads_origin_binding() {
        let mut graph = named_graph(
            &[
                ("c.js", "export { v } from './b';\n"),
                ("b.js", "export { v } from './a';\n"),
                ("a.js", "export var v = 9;\n"),
            ],
            "c.js",
        );
        let plan = plan_bundle(&mut graph).unwrap();
        assert_eq!(plan.tasks.len(), 1);
        let task = &plan.tasks[0];
        assert_eq!(task.export_name, "v");
        assert_eq!(task.owner, Some(graph.lookup["a"]));
        assert!(task.chained);
        assert_eq!(task.replacement, "v");
        // Reassignments of `v` inside a.js must mirror to exports.v.
        assert_eq!(plan.mirrors[&graph.lookup["a"]]["v"], "v");
    }

    #[test]
    fn test_exported_function_is_early() {
        let mut graph = named_graph(
            &[(
                "main.js",
                "export function go() { return 1; }\nexport var x = 2;\n",
            )],
            "main.js",
        );
        let plan = plan_bundle(&mut graph).unwrap();
        let go = plan.tasks.iter().find(|t| t.export_name == "go").unwrap();
        assert!(go.early);
        let x = plan.tasks.iter().find(|t| t.export_name == "x").unwrap();
        assert!(!x.early);
    }

    #[test]
    fn test_anonymous_default_dodges_own_name() {
        let mut graph = named_graph(
            &[("main.js", "var main = 1;\nexport default main + 1;\n")],
            "main.js",
        );
        plan_bundle(&mut graph).unwrap();
        let main = graph.entry();
        assert_eq!(main.default_name.as_deref(), Some("main__default"));
    }

    #[test]
    fn test_external_named_and_default_references() {
        let mut graph = named_graph(
            &[(
                "main.js",
                "import d, { n } from 'ext';\nexport default d + n;\n",
            )],
            "main.js",
        );
        plan_bundle(&mut graph).unwrap();
        let main = graph.entry();
        // Both default and named usage: default goes through the shim.
        assert_eq!(main.identifier_replacements["d"], "ext__default");
        assert_eq!(main.identifier_replacements["n"], "ext.n");
    }

    #[test]
    fn test_single_file_import_names() {
        let module = crate::graph::module::analyze(
            "m",
            Path::new("m.js").to_path_buf(),
            "import { x } from './utils';\nimport y from 'lib/thing';\nvar thing = 1;\nexport default x + y + thing;\n"
                .to_owned(),
        )
        .unwrap();
        let names = assign_import_names(&module, None).unwrap();
        assert_eq!(names["./utils"], "utils");
        // `thing` is taken by a top-level declaration.
        assert_eq!(names["lib/thing"], "lib_thing");
    }

    #[test]
    fn test_single_file_hook_collision() {
        let module = crate::graph::module::analyze(
            "m",
            Path::new("m.js").to_path_buf(),
            "import { x } from './a';\nimport { y } from './b';\nexport default x + y;\n".to_owned(),
        )
        .unwrap();
        let hook = |_path: &str| Some("fixed".to_owned());
        let err = assign_import_names(&module, Some(&hook)).unwrap_err();
        assert!(matches!(err, CompileError::NamingCollision { .. }));
    }
}
