pub mod module;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use petgraph::Directed;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::Graph;
use rayon::prelude::*;

use crate::error::{CompileError, Result};
use crate::graph::module::{ExternalModule, Module, analyze};
use crate::parser::declarations::SpecifierKind;
use crate::resolve::{self, Probe, ResolveHook};

/// A per-module source transform, run before parsing: `(source, id) → source`.
pub type TransformHook = dyn Fn(&str, &str) -> String + Send + Sync;

/// Options steering module loading.
pub struct LoadOptions<'a> {
    /// Directory module ids are resolved against.
    pub base: PathBuf,
    /// Ids to leave out of the bundle; they become externals.
    pub skip: &'a [String],
    pub transform: Option<&'a TransformHook>,
    pub resolve_path: Option<&'a ResolveHook>,
}

/// The loaded module graph: all local modules in topological order
/// (dependencies first, entry last; cycle members keep load order),
/// externals, and the re-export chains.
#[derive(Debug)]
pub struct ModuleGraph {
    pub entry_id: String,
    pub modules: Vec<Module>,
    /// id → index into `modules`. The map owns all cross-module references;
    /// modules never point at each other directly.
    pub lookup: HashMap<String, usize>,
    pub externals: Vec<ExternalModule>,
    pub external_lookup: HashMap<String, usize>,
    /// `(module, exported name) → (source module, source name)`; the source
    /// name is `default` or `*` for default/namespace chains. Followed
    /// transitively by the export planner.
    pub chains: HashMap<(String, String), (String, String)>,
}

impl ModuleGraph {
    pub fn entry(&self) -> &Module {
        &self.modules[self.lookup[&self.entry_id]]
    }

    /// Ids of all external modules, in first-encounter order.
    pub fn external_ids(&self) -> Vec<String> {
        self.externals.iter().map(|e| e.id.clone()).collect()
    }

    /// Follow re-export chains from `(id, name)` to a fixed point.
    pub fn resolve_chain(&self, id: &str, name: &str) -> (String, String) {
        let mut current = (id.to_owned(), name.to_owned());
        while let Some(next) = self.chains.get(&current) {
            current = next.clone();
        }
        current
    }

    fn add_external(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.external_lookup.get(id) {
            return idx;
        }
        let idx = self.externals.len();
        self.externals.push(ExternalModule::new(id));
        self.external_lookup.insert(id.to_owned(), idx);
        idx
    }
}

/// Load the graph rooted at `entry` (a path relative to `options.base`).
///
/// Modules are discovered breadth-first; each wave of newly found files is
/// parsed in parallel on the rayon pool, the graph bookkeeping stays on the
/// calling thread. An unresolvable import becomes an external module; an
/// unresolvable entry is fatal.
pub fn load(entry: &str, options: &LoadOptions) -> Result<ModuleGraph> {
    let entry_id = resolve::strip_extension(entry).replace('\\', "/");

    let mut graph = ModuleGraph {
        entry_id: entry_id.clone(),
        modules: Vec::new(),
        lookup: HashMap::new(),
        externals: Vec::new(),
        external_lookup: HashMap::new(),
        chains: HashMap::new(),
    };

    let (entry_path, entry_source) =
        match resolve::probe(&options.base, &entry_id, options.resolve_path)? {
            Probe::Found(path, source) => (path, source),
            Probe::NotFound => {
                return Err(CompileError::EntryNotFound {
                    entry: entry.to_owned(),
                });
            }
        };

    let mut in_flight: HashSet<String> = HashSet::new();
    in_flight.insert(entry_id.clone());
    let mut pending: Vec<(String, PathBuf, String)> = vec![(entry_id, entry_path, entry_source)];

    while !pending.is_empty() {
        let wave: Vec<Result<Module>> = std::mem::take(&mut pending)
            .into_par_iter()
            .map(|(id, path, source)| {
                let source = match options.transform {
                    Some(transform) => transform(&source, &id),
                    None => source,
                };
                analyze(&id, path, source)
            })
            .collect();

        let mut discovered: Vec<String> = Vec::new();
        for module in wave {
            let mut module = module?;
            module.load_index = graph.modules.len();
            for import in &mut module.imports {
                let resolved = resolve::resolve_id(&import.path, &module.id);
                if resolved == module.id {
                    return Err(CompileError::SelfImport {
                        id: module.id.clone(),
                    });
                }
                import.id = Some(resolved.clone());
                if options.skip.iter().any(|s| s == &resolved) {
                    graph.add_external(&resolved);
                } else if !in_flight.contains(&resolved)
                    && !graph.external_lookup.contains_key(&resolved)
                {
                    discovered.push(resolved);
                }
            }
            graph.lookup.insert(module.id.clone(), graph.modules.len());
            graph.modules.push(module);
        }

        for id in discovered {
            if in_flight.contains(&id) || graph.external_lookup.contains_key(&id) {
                continue;
            }
            match resolve::probe(&options.base, &id, options.resolve_path)? {
                Probe::Found(path, source) => {
                    in_flight.insert(id.clone());
                    pending.push((id, path, source));
                }
                Probe::NotFound => {
                    graph.add_external(&id);
                }
            }
        }
    }

    mark_usage(&mut graph)?;
    build_chains(&mut graph);
    sort_modules(&mut graph);
    Ok(graph)
}

/// Validate every import specifier against its target and record how
/// externals are used. Batch imports of local modules flag the target as
/// namespace-exporting.
fn mark_usage(graph: &mut ModuleGraph) -> Result<()> {
    let mut namespace_targets: Vec<usize> = Vec::new();

    for module in &graph.modules {
        for import in &module.imports {
            let target_id = import.id.as_deref().unwrap_or("");
            if let Some(&target_idx) = graph.lookup.get(target_id) {
                let target = &graph.modules[target_idx];
                for spec in &import.specifiers {
                    match spec.kind {
                        SpecifierKind::Batch => namespace_targets.push(target_idx),
                        SpecifierKind::Default | SpecifierKind::Named => {
                            if !target.does_export.iter().any(|n| n == &spec.name) {
                                return Err(CompileError::MissingExport {
                                    importer: module.id.clone(),
                                    name: spec.name.clone(),
                                    id: target.id.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    for idx in namespace_targets {
        graph.modules[idx].exports_namespace = true;
    }

    // External usage flags (separate pass: externals are disjoint storage).
    let mut default_uses: Vec<usize> = Vec::new();
    let mut named_uses: Vec<usize> = Vec::new();
    for module in &graph.modules {
        for import in &module.imports {
            let target_id = import.id.as_deref().unwrap_or("");
            if let Some(&ext_idx) = graph.external_lookup.get(target_id) {
                for spec in &import.specifiers {
                    match spec.kind {
                        SpecifierKind::Default => default_uses.push(ext_idx),
                        SpecifierKind::Named | SpecifierKind::Batch => named_uses.push(ext_idx),
                    }
                }
            }
        }
    }
    for idx in default_uses {
        graph.externals[idx].needs_default = true;
    }
    for idx in named_uses {
        graph.externals[idx].needs_named = true;
    }

    Ok(())
}

/// Record one chain hop per re-exported name. Passthrough exports chain to
/// their source module; a local `export { x }` of an imported alias chains
/// through the import that bound it.
fn build_chains(graph: &mut ModuleGraph) {
    let mut chains: HashMap<(String, String), (String, String)> = HashMap::new();
    let mut namespace_targets: Vec<String> = Vec::new();

    for module in &graph.modules {
        for export in &module.exports {
            let specifiers = match &export.kind {
                crate::parser::declarations::ExportKind::Named { specifiers } => specifiers,
                _ => continue,
            };

            if export.passthrough {
                let Some(import) = export.import_index.map(|i| &module.imports[i]) else {
                    continue;
                };
                let Some(target_id) = import.id.clone() else { continue };
                for spec in &import.specifiers {
                    if spec.kind == SpecifierKind::Batch {
                        namespace_targets.push(target_id.clone());
                    }
                    chains.insert(
                        (module.id.clone(), spec.as_.clone()),
                        (target_id.clone(), spec.name.clone()),
                    );
                }
                continue;
            }

            // Local re-export of an imported binding.
            for spec in specifiers {
                for import in module.imports.iter().filter(|i| !i.passthrough) {
                    let Some(target_id) = import.id.clone() else { continue };
                    if let Some(bound) = import.specifiers.iter().find(|s| s.as_ == spec.name) {
                        if bound.kind == SpecifierKind::Batch {
                            namespace_targets.push(target_id.clone());
                        }
                        chains.insert(
                            (module.id.clone(), spec.as_.clone()),
                            (target_id, bound.name.clone()),
                        );
                        break;
                    }
                }
            }
        }
    }

    for id in namespace_targets {
        if let Some(&idx) = graph.lookup.get(&id) {
            graph.modules[idx].exports_namespace = true;
        } else if let Some(&idx) = graph.external_lookup.get(&id) {
            graph.externals[idx].needs_named = true;
        }
    }

    graph.chains = chains;
}

/// Topologically sort modules so dependencies precede dependents. Kosaraju's
/// SCC algorithm returns components in reverse topological order of the
/// condensation, which with importer → dependency edges is exactly
/// dependencies-first; members of a cycle keep their load order.
fn sort_modules(graph: &mut ModuleGraph) {
    let mut dep_graph: Graph<usize, (), Directed> = Graph::new();
    let node_indices: Vec<_> = (0..graph.modules.len())
        .map(|i| dep_graph.add_node(i))
        .collect();

    for (idx, module) in graph.modules.iter().enumerate() {
        for import in &module.imports {
            if let Some(target_id) = import.id.as_deref() {
                if let Some(&target_idx) = graph.lookup.get(target_id) {
                    dep_graph.add_edge(node_indices[idx], node_indices[target_idx], ());
                }
            }
        }
    }

    let sccs = kosaraju_scc(&dep_graph);
    let mut order: Vec<usize> = Vec::with_capacity(graph.modules.len());
    for scc in sccs {
        let mut members: Vec<usize> = scc.iter().map(|&n| dep_graph[n]).collect();
        members.sort_by_key(|&i| graph.modules[i].load_index);
        order.extend(members);
    }

    let mut reordered: Vec<Module> = Vec::with_capacity(order.len());
    let mut taken: Vec<Option<Module>> = std::mem::take(&mut graph.modules)
        .into_iter()
        .map(Some)
        .collect();
    for idx in order {
        if let Some(module) = taken[idx].take() {
            reordered.push(module);
        }
    }
    graph.lookup = reordered
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.clone(), i))
        .collect();
    graph.modules = reordered;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
