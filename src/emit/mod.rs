//! Emission: drives planning and rewriting, assembles wrapper + body + source
//! map into the final artifact for each output format.

pub mod amd;
pub mod cjs;
pub mod umd;

use std::collections::HashMap;

use crate::edit::{BundleSegment, Concat, advance, detect_indent};
use crate::error::{CompileError, Result};
use crate::graph::ModuleGraph;
use crate::graph::module::Module;
use crate::parser::declarations::{ExportKind, SpecifierKind};
use crate::plan;
use crate::rewrite::{DefaultStyle, RewriteOptions, rewrite};
use crate::smap::{self, SourceMapMode};

/// The three legacy wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    Amd,
    #[default]
    Cjs,
    Umd,
}

/// A finished artifact.
#[derive(Debug)]
pub struct Output {
    pub code: String,
    pub map: Option<sourcemap::SourceMap>,
}

/// Options shared by single-file transpilation and the bundle emit methods.
#[derive(Default)]
pub struct EmitOptions {
    pub format: Format,
    /// Strict mode: any number of named exports through an `exports` object.
    /// Off (defaults-only) allows at most a single default export.
    pub strict: bool,
    /// Global name for the UMD fallback; required by [`Format::Umd`].
    pub name: Option<String>,
    /// Explicit module id for the `define` call.
    pub amd_name: Option<String>,
    pub banner: Option<String>,
    pub footer: Option<String>,
    /// Emit absolute paths into the source map's `sources`.
    pub absolute_paths: bool,
    pub source_map: SourceMapMode,
    /// Output file the map belongs to; required when maps are on.
    pub source_map_file: Option<String>,
    /// Name of the input file (single-file mode only); required when maps
    /// are on.
    pub source_map_source: Option<String>,
    /// Names external modules, overriding path derivation. Returning a name
    /// already in use is a fatal collision.
    pub get_module_name: Option<Box<dyn Fn(&str) -> Option<String>>>,
}

/// One dependency of the output wrapper.
#[derive(Debug, Clone)]
pub struct Dep {
    /// The path as it appears in the wrapper (`require('<path>')`).
    pub path: String,
    /// Identifier the wrapper binds it to.
    pub name: String,
    /// A bare side-effect import: loaded, never bound.
    pub empty: bool,
}

/// Everything a wrapper template needs to know.
pub struct WrapContext<'a> {
    pub deps: &'a [Dep],
    /// The factory takes an `exports` object (strict mode with exports).
    pub has_exports: bool,
    /// The factory returns the default value (defaults-only mode).
    pub returns_value: bool,
    pub amd_name: Option<&'a str>,
    pub umd_name: Option<&'a str>,
    pub indent: &'a str,
}

/// `exports.x` — except `default`, which needs bracket notation on ancient
/// engines.
fn export_target(name: &str) -> String {
    if name == "default" {
        "exports['default']".to_owned()
    } else {
        format!("exports.{name}")
    }
}

fn validate_options(format: Format, options: &EmitOptions, single_file: bool) -> Result<()> {
    if format == Format::Umd && options.name.is_none() {
        return Err(CompileError::MissingName);
    }
    if options.source_map != SourceMapMode::Off {
        if options.source_map_file.is_none() {
            return Err(CompileError::MissingSourceMapFile);
        }
        if single_file && options.source_map_source.is_none() {
            return Err(CompileError::MissingSourceMapSource);
        }
    }
    Ok(())
}

/// Join prefix + body + suffix, shift the body's mapping segments past the
/// prefix, and finish banner/footer/map handling.
fn finish(
    prefix: String,
    body_code: &str,
    mut segments: Vec<BundleSegment>,
    suffix: &str,
    sources: Vec<(String, String)>,
    options: &EmitOptions,
) -> Result<Output> {
    let mut code = prefix;
    let (offset_line, offset_col) = advance(0, 0, &code);
    for seg in &mut segments {
        if seg.out_line == 0 {
            seg.out_col += offset_col;
        }
        seg.out_line += offset_line;
    }
    code.push_str(body_code);
    code.push_str(suffix);
    if !code.ends_with('\n') {
        code.push('\n');
    }

    if options.source_map == SourceMapMode::Off {
        return Ok(Output { code, map: None });
    }

    let file = options.source_map_file.as_deref().unwrap_or_default();
    let map = smap::build(Some(file), &sources, &segments);
    if let Some(annotation) = smap::annotation(options.source_map, &map, file) {
        code.push_str(&annotation);
    }
    Ok(Output {
        code,
        map: Some(map),
    })
}

fn banner_prefix(options: &EmitOptions) -> String {
    match &options.banner {
        Some(banner) if !banner.is_empty() => format!("{}\n", banner.trim_end_matches('\n')),
        _ => String::new(),
    }
}

fn footer_suffix(options: &EmitOptions) -> String {
    match &options.footer {
        Some(footer) if !footer.is_empty() => format!("\n{}", footer.trim_end_matches('\n')),
        _ => String::new(),
    }
}

/// Source-map source path for a module, honouring `absolute_paths`.
fn map_source_name(module: &Module, options: &EmitOptions) -> String {
    if options.absolute_paths && module.path.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            return cwd.join(&module.path).display().to_string();
        }
    }
    module.path.display().to_string()
}

// ---------------------------------------------------------------------------
// Single-file transpilation
// ---------------------------------------------------------------------------

/// Rewrite one module, leaving its imports as external references.
pub fn transpile_source(source: &str, options: &EmitOptions) -> Result<Output> {
    validate_options(options.format, options, true)?;

    let input_name = options
        .source_map_source
        .clone()
        .unwrap_or_else(|| "module".to_owned());
    let id = crate::resolve::strip_extension(&input_name).to_owned();
    let module = crate::graph::module::analyze(&id, input_name.clone().into(), source.to_owned())?;

    let import_names =
        plan::assign_import_names(&module, options.get_module_name.as_deref())?;

    // Import aliases become references into the external module objects.
    let mut replacements: HashMap<String, String> = HashMap::new();
    for import in module.imports.iter().filter(|i| !i.passthrough) {
        let module_name = &import_names[&import.path];
        for spec in &import.specifiers {
            let reference = match spec.kind {
                SpecifierKind::Default | SpecifierKind::Batch => module_name.clone(),
                SpecifierKind::Named => format!("{module_name}.{}", spec.name),
            };
            replacements.insert(spec.as_.clone(), reference);
        }
    }

    // Mirror assignments for every locally-bound export.
    let mut mirrors: HashMap<String, String> = HashMap::new();
    for export in &module.exports {
        if export.is_default {
            continue;
        }
        match &export.kind {
            ExportKind::VarDeclaration { name }
            | ExportKind::NamedFunction { name }
            | ExportKind::NamedClass { name } => {
                mirrors.insert(name.clone(), name.clone());
            }
            ExportKind::Named { specifiers } if !export.passthrough => {
                for spec in specifiers {
                    mirrors.insert(spec.name.clone(), spec.as_.clone());
                }
            }
            _ => {}
        }
    }

    let default_style = if options.strict {
        DefaultStyle::ExportsDefault
    } else if options.format == Format::Cjs {
        DefaultStyle::ModuleExports
    } else {
        DefaultStyle::Return
    };

    let result = rewrite(
        &module,
        &RewriteOptions {
            replacements: &replacements,
            mirrors: &mirrors,
            default_style,
        },
    )?;
    let mut buffer = result.buffer;

    if !options.strict {
        if module.named_exports().next().is_some() {
            return Err(CompileError::StrictMode {
                detail: "module has named exports".to_owned(),
            });
        }
        let has_named_import = module
            .imports
            .iter()
            .filter(|i| !i.passthrough)
            .flat_map(|i| &i.specifiers)
            .any(|s| s.kind == SpecifierKind::Named);
        if has_named_import {
            return Err(CompileError::StrictMode {
                detail: "module has named imports".to_owned(),
            });
        }
    }

    // Export blocks: functions early, everything else late.
    let mut early: Vec<String> = Vec::new();
    let mut late: Vec<String> = Vec::new();
    for export in &module.exports {
        match &export.kind {
            ExportKind::VarDeclaration { name }
            | ExportKind::NamedFunction { name }
            | ExportKind::NamedClass { name } => {
                let is_function = module
                    .scopes
                    .top_level_functions
                    .iter()
                    .any(|f| f == name);
                if export.is_default {
                    let line = if options.strict {
                        format!("{} = {name};", export_target("default"))
                    } else if options.format == Format::Cjs {
                        format!("module.exports = {name};")
                    } else {
                        format!("return {name};")
                    };
                    late.push(line);
                } else if is_function {
                    early.push(format!("{} = {name};", export_target(name)));
                } else if !result.already_exported.contains(name) {
                    late.push(format!("{} = {name};", export_target(name)));
                }
            }
            ExportKind::Named { specifiers } => {
                for spec in specifiers {
                    if export.passthrough {
                        let import = export
                            .import_index
                            .map(|i| &module.imports[i])
                            .expect("passthrough export carries its import");
                        let module_name = &import_names[&import.path];
                        let reference = match spec.name.as_str() {
                            "default" => module_name.clone(),
                            name => format!("{module_name}.{name}"),
                        };
                        late.push(format!("{} = {reference};", export_target(&spec.as_)));
                    } else if module
                        .scopes
                        .top_level_functions
                        .iter()
                        .any(|f| f == &spec.name)
                    {
                        early.push(format!("{} = {};", export_target(&spec.as_), spec.name));
                    } else if !result.already_exported.contains(&spec.as_) {
                        late.push(format!("{} = {};", export_target(&spec.as_), spec.name));
                    }
                }
            }
            // Anonymous defaults were rewritten inline.
            ExportKind::AnonFunction | ExportKind::AnonClass | ExportKind::Expression => {}
        }
    }
    if !early.is_empty() {
        buffer.prepend(&format!("{}\n\n", early.join("\n")));
    }
    if !late.is_empty() {
        buffer.append(&format!("\n\n{}", late.join("\n")));
    }

    // Dependency list: bound imports first so factory parameters line up,
    // bare side-effect imports trailing.
    let mut deps: Vec<Dep> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for import in &module.imports {
        if !seen.insert(import.path.clone()) {
            continue;
        }
        deps.push(Dep {
            path: crate::resolve::strip_extension(&import.path).to_owned(),
            name: import_names[&import.path].clone(),
            empty: import.is_empty() && !import.passthrough,
        });
    }
    deps.sort_by_key(|d| d.empty);

    let has_exports = options.strict && !module.does_export.is_empty();
    let returns_value = !options.strict && module.has_default_export();
    let indent = detect_indent(&module.source);
    let context = WrapContext {
        deps: &deps,
        has_exports,
        returns_value,
        amd_name: options.amd_name.as_deref(),
        umd_name: options.name.as_deref(),
        indent: &indent,
    };

    let (head, tail) = match options.format {
        Format::Amd => amd::wrap(&context),
        Format::Cjs => cjs::wrap(&context),
        Format::Umd => umd::wrap(&context),
    };
    if options.format != Format::Cjs {
        buffer.indent_with(&indent, &module.scopes.template_ranges);
    }

    let rendered = buffer.render();
    let segments: Vec<BundleSegment> = rendered
        .segments
        .iter()
        .map(|s| BundleSegment {
            out_line: s.out_line,
            out_col: s.out_col,
            part: 0,
            origin: s.origin,
        })
        .collect();

    let sources = vec![(map_source_name(&module, options), module.source.clone())];
    finish(
        format!("{}{head}", banner_prefix(options)),
        &rendered.code,
        segments,
        &format!("{tail}{}", footer_suffix(options)),
        sources,
        options,
    )
}

// ---------------------------------------------------------------------------
// Bundle emission
// ---------------------------------------------------------------------------

/// Emit a loaded bundle in the requested format. The format is explicit —
/// the bundle emit methods share one options value across formats.
pub fn emit_bundle(graph: &mut ModuleGraph, format: Format, options: &EmitOptions) -> Result<Output> {
    validate_options(format, options, false)?;
    let plan = plan::plan_bundle(graph)?;

    let entry_has_named = graph.entry().named_exports().next().is_some();
    let entry_has_default = graph.entry().has_default_export();
    // Without strict mode the default travels through `module.exports` /
    // `return`, which would clobber any named exports sharing the object.
    if !options.strict && entry_has_named && entry_has_default {
        return Err(CompileError::StrictMode {
            detail: "entry module mixes default and named exports".to_owned(),
        });
    }
    // In defaults-safe mode the lone default is emitted at the very end.
    let deferred_default = !options.strict && entry_has_default;

    let indent_body = format != Format::Cjs;

    // Shims and early exports live at the very top of the wrapper body.
    let mut preamble: Vec<String> = Vec::new();
    for external in &graph.externals {
        if external.needs_default && external.needs_named {
            let n = &external.name;
            preamble.push(format!(
                "var {n}__default = ('default' in {n} ? {n}['default'] : {n});"
            ));
        }
    }
    for task in plan.tasks.iter().filter(|t| t.owner.is_some()) {
        if deferred_default && task.export_name == "default" {
            continue;
        }
        if task.early {
            preamble.push(format!(
                "{} = {};",
                export_target(&task.export_name),
                task.replacement
            ));
        } else if options.strict && task.chained {
            preamble.push(format!(
                "Object.defineProperty(exports, '{}', {{ get: function () {{ return {}; }} }});",
                task.export_name, task.replacement
            ));
        }
    }

    let mut concat = Concat::new("\n\n");
    let mut sources: Vec<(String, String)> = Vec::new();
    for (idx, module) in graph.modules.iter().enumerate() {
        // A strict-mode chained export surfaces through a live getter, so the
        // owner must not also assign to the (getter-only) property.
        let mut mirrors = plan.mirrors.get(&idx).cloned().unwrap_or_default();
        if options.strict {
            for task in &plan.tasks {
                if task.owner == Some(idx) && task.chained {
                    mirrors.retain(|_, out| out != &task.export_name);
                }
            }
        }
        let default_name = module
            .default_name
            .clone()
            .unwrap_or_else(|| module.name.clone());
        let result = rewrite(
            module,
            &RewriteOptions {
                replacements: &module.identifier_replacements,
                mirrors: &mirrors,
                default_style: DefaultStyle::Var(default_name),
            },
        )?;
        let mut buffer = result.buffer;

        if module.exports_namespace {
            buffer.prepend(&namespace_block(graph, module));
        }

        let mut late: Vec<String> = Vec::new();
        for task in &plan.tasks {
            if task.owner == Some(idx)
                && !task.early
                && !(options.strict && task.chained)
                && !(deferred_default && task.export_name == "default")
                && !result.already_exported.contains(&task.export_name)
            {
                late.push(format!(
                    "{} = {};",
                    export_target(&task.export_name),
                    task.replacement
                ));
            }
        }
        if !late.is_empty() {
            buffer.append(&format!("\n\n{}", late.join("\n")));
        }

        if indent_body {
            buffer.indent_with(
                &detect_indent(&module.source),
                &module.scopes.template_ranges,
            );
        }
        concat.add(
            &map_source_name(module, options),
            &module.source,
            buffer.render(),
        );
        sources.push((map_source_name(module, options), module.source.clone()));
    }

    let (body_code, segments) = concat.render();

    // Exports read straight off externals, and the defaults-mode ending.
    let mut ending: Vec<String> = Vec::new();
    for task in plan.tasks.iter().filter(|t| t.owner.is_none()) {
        if deferred_default && task.export_name == "default" {
            continue;
        }
        ending.push(format!(
            "{} = {};",
            export_target(&task.export_name),
            task.replacement
        ));
    }
    if deferred_default {
        if let Some(task) = plan.tasks.iter().find(|t| t.export_name == "default") {
            let line = if format == Format::Cjs {
                format!("module.exports = {};", task.replacement)
            } else {
                format!("return {};", task.replacement)
            };
            ending.push(line);
        }
    }

    let deps: Vec<Dep> = graph
        .externals
        .iter()
        .map(|e| Dep {
            path: e.id.clone(),
            name: e.name.clone(),
            empty: false,
        })
        .collect();
    let has_exports = entry_has_named || (options.strict && entry_has_default);
    let returns_value = deferred_default;
    let indent = "\t".to_owned();
    let context = WrapContext {
        deps: &deps,
        has_exports,
        returns_value,
        amd_name: options.amd_name.as_deref(),
        umd_name: options.name.as_deref(),
        indent: &indent,
    };
    let (head, tail) = match format {
        Format::Amd => amd::wrap(&context),
        Format::Cjs => cjs::wrap(&context),
        Format::Umd => umd::wrap(&context),
    };

    let line_indent = if indent_body { indent.as_str() } else { "" };
    let mut prefix = format!("{}{head}", banner_prefix(options));
    if !preamble.is_empty() {
        for line in &preamble {
            prefix.push_str(&format!("{line_indent}{line}\n"));
        }
        prefix.push('\n');
    }
    let mut suffix = String::new();
    if !ending.is_empty() {
        for line in &ending {
            suffix.push_str(&format!("\n\n{line_indent}{line}"));
        }
    }
    suffix.push_str(&tail);
    suffix.push_str(&footer_suffix(options));

    finish(prefix, &body_code, segments, &suffix, sources, options)
}

/// The generated namespace object: one live getter per export.
fn namespace_block(graph: &ModuleGraph, module: &Module) -> String {
    let mut props: Vec<String> = Vec::new();
    for name in &module.does_export {
        let (owner_id, owner_name) = graph.resolve_chain(&module.id, name);
        let reference = plan::binding_reference(graph, &owner_id, &owner_name);
        props.push(format!("\tget {name} () {{ return {reference}; }}"));
    }
    format!("var {} = {{\n{}\n}};\n\n", module.name, props.join(",\n"))
}

// ---------------------------------------------------------------------------
// IIFE concatenation
// ---------------------------------------------------------------------------

/// Options for [`concat_bundle`].
#[derive(Default)]
pub struct ConcatOptions {
    pub intro: Option<String>,
    pub outro: Option<String>,
    pub indent: Option<String>,
    pub banner: Option<String>,
    pub footer: Option<String>,
    pub source_map: SourceMapMode,
    pub source_map_file: Option<String>,
    pub absolute_paths: bool,
}

/// Wrap the bundle body in a bare IIFE. Only legal for self-contained
/// bundles: no external imports, no entry exports.
pub fn concat_bundle(graph: &mut ModuleGraph, options: &ConcatOptions) -> Result<Output> {
    if !graph.externals.is_empty() {
        return Err(CompileError::UnsupportedSyntax {
            detail: "cannot concat a bundle with external imports".to_owned(),
        });
    }
    if !graph.entry().does_export.is_empty() {
        return Err(CompileError::UnsupportedSyntax {
            detail: "cannot concat a bundle with exports".to_owned(),
        });
    }

    let emit_options = EmitOptions {
        format: Format::Cjs,
        strict: true,
        banner: options.banner.clone(),
        footer: options.footer.clone(),
        absolute_paths: options.absolute_paths,
        source_map: options.source_map,
        source_map_file: options.source_map_file.clone(),
        ..EmitOptions::default()
    };
    if options.source_map != SourceMapMode::Off && options.source_map_file.is_none() {
        return Err(CompileError::MissingSourceMapFile);
    }

    // Planning still runs so cross-module renames apply; with no exports the
    // task list is empty.
    let _ = plan::plan_bundle(graph)?;
    let indent = options
        .indent
        .clone()
        .unwrap_or_else(|| detect_indent(&graph.entry().source));
    let empty_mirrors = HashMap::new();

    let mut concat = Concat::new("\n\n");
    let mut sources = Vec::new();
    for module in &graph.modules {
        let default_name = module
            .default_name
            .clone()
            .unwrap_or_else(|| module.name.clone());
        let result = rewrite(
            module,
            &RewriteOptions {
                replacements: &module.identifier_replacements,
                mirrors: &empty_mirrors,
                default_style: DefaultStyle::Var(default_name),
            },
        )?;
        let mut buffer = result.buffer;
        buffer.indent_with(&indent, &module.scopes.template_ranges);
        concat.add(
            &map_source_name(module, &emit_options),
            &module.source,
            buffer.render(),
        );
        sources.push((
            map_source_name(module, &emit_options),
            module.source.clone(),
        ));
    }
    let (body_code, segments) = concat.render();

    let intro = options
        .intro
        .clone()
        .unwrap_or_else(|| "(function () { 'use strict';\n\n".to_owned());
    let outro = options.outro.clone().unwrap_or_else(|| "\n\n})();".to_owned());

    finish(
        format!("{}{intro}", banner_prefix(&emit_options)),
        &body_code,
        segments,
        &format!("{outro}{}", footer_suffix(&emit_options)),
        sources,
        &emit_options,
    )
}
