//! unmodule — rewrite ES-module JavaScript into AMD, CommonJS, or UMD.
//!
//! Two modes:
//!
//! * [`transpile`] rewrites a single module, leaving its imports as external
//!   references.
//! * [`bundle`] starts from an entry file, inlines every local dependency
//!   into one body, and wraps the whole thing once. Modules that cannot be
//!   found on disk stay external.
//!
//! The engine mutates the original text by byte offset instead of
//! regenerating it from a tree, so output stays close to the input and
//! source maps fall out of the edit log.
//!
//! ```no_run
//! use unmodule::{transpile, EmitOptions, Format};
//!
//! let out = transpile("export default 42;", &EmitOptions {
//!     format: Format::Cjs,
//!     ..EmitOptions::default()
//! }).unwrap();
//! assert!(out.code.contains("module.exports = 42;"));
//! ```

mod edit;
mod emit;
mod error;
mod graph;
mod names;
mod parser;
mod plan;
mod resolve;
mod rewrite;
mod smap;

use std::collections::HashMap;
use std::path::PathBuf;

pub use emit::{ConcatOptions, EmitOptions, Format, Output};
pub use error::{CompileError, Result};
pub use graph::TransformHook;
pub use resolve::ResolveHook;
pub use smap::SourceMapMode;

use graph::{LoadOptions, ModuleGraph};

/// Rewrite one module into the format named by `options.format`.
pub fn transpile(source: &str, options: &EmitOptions) -> Result<Output> {
    emit::transpile_source(source, options)
}

/// Options for [`bundle`].
#[derive(Default)]
pub struct BundleOptions {
    /// Entry file, relative to `base`.
    pub entry: String,
    /// Directory module ids resolve against; defaults to the working
    /// directory.
    pub base: Option<PathBuf>,
    /// Module ids to leave out of the bundle (they become externals).
    pub skip: Vec<String>,
    /// Explicit module names, id → name. Collisions are fatal.
    pub names: HashMap<String, String>,
    /// Per-module source transform, applied before parsing.
    pub transform: Option<Box<TransformHook>>,
    /// Custom id → disk path resolver, tried after the standard probes.
    pub resolve_path: Option<Box<ResolveHook>>,
}

/// A loaded, analyzed bundle, ready to emit any number of times.
pub struct Bundle {
    graph: ModuleGraph,
}

/// Load and analyze the module graph rooted at `options.entry`.
pub fn bundle(options: &BundleOptions) -> Result<Bundle> {
    let base = options
        .base
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let mut graph = graph::load(
        &options.entry,
        &LoadOptions {
            base,
            skip: &options.skip,
            transform: options.transform.as_deref(),
            resolve_path: options.resolve_path.as_deref(),
        },
    )?;
    plan::assign_names(&mut graph, &options.names)?;
    Ok(Bundle { graph })
}

impl Bundle {
    /// Ids of the modules that stayed external.
    pub fn imports(&self) -> Vec<String> {
        self.graph.external_ids()
    }

    /// Names the entry module exports (`default` included).
    pub fn exports(&self) -> Vec<String> {
        self.graph.entry().does_export.clone()
    }

    /// Emit as a define-style module.
    pub fn to_amd(&mut self, options: &EmitOptions) -> Result<Output> {
        emit::emit_bundle(&mut self.graph, Format::Amd, options)
    }

    /// Emit as a require/exports module.
    pub fn to_cjs(&mut self, options: &EmitOptions) -> Result<Output> {
        emit::emit_bundle(&mut self.graph, Format::Cjs, options)
    }

    /// Emit as a universal module.
    pub fn to_umd(&mut self, options: &EmitOptions) -> Result<Output> {
        emit::emit_bundle(&mut self.graph, Format::Umd, options)
    }

    /// Wrap the bundle body in a bare IIFE. Fails when the bundle has
    /// external imports or the entry exports anything.
    pub fn concat(&mut self, options: &ConcatOptions) -> Result<Output> {
        emit::concat_bundle(&mut self.graph, options)
    }
}
