use std::path::PathBuf;

use thiserror::Error;

/// Every way a transpile or bundle operation can fail.
///
/// All errors are fatal to the containing operation — there is no partial
/// output. The binary wraps these in `anyhow` for user-facing context.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The source could not be parsed as a JavaScript module.
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },

    /// A module's resolved import id equals its own id.
    #[error("module `{id}` imports itself")]
    SelfImport { id: String },

    /// The entry file of a bundle could not be read.
    #[error("could not find entry module `{entry}`")]
    EntryNotFound { entry: String },

    /// Two import specifiers in one module share a local alias.
    #[error("duplicate import alias `{alias}` in `{id}`")]
    DuplicateImportAlias { alias: String, id: String },

    /// A module has more than one default export.
    #[error("duplicate default export in `{id}`")]
    DuplicateDefaultExport { id: String },

    /// A module imports a name the target module does not export.
    #[error("`{importer}` imports `{name}` from `{id}`, which does not export it")]
    MissingExport {
        importer: String,
        name: String,
        id: String,
    },

    /// An assignment or update expression targets an imported binding.
    #[error("cannot reassign imported binding `{name}`")]
    ReassignImport { name: String },

    /// An assignment targets a property of an imported namespace.
    #[error("cannot reassign imported binding of namespace `{name}`")]
    ReassignNamespace { name: String },

    /// Top-level `this` used as the object of a member expression.
    /// Module top-level `this` is `undefined`; a legacy wrapper would
    /// silently rebind it, so this is rejected outright.
    #[error("`this` at the top of a module is `undefined` and has no properties")]
    TopLevelThis,

    /// Named imports or exports used in defaults-only (non-strict) mode.
    #[error("{detail} (set `strict: true` to enable named imports/exports)")]
    StrictMode { detail: String },

    /// The universal wrapper was requested without a `name` option.
    #[error("a UMD module requires a `name` option")]
    MissingName,

    /// Source maps were requested without naming the output file.
    #[error("source maps require the `source_map_file` option")]
    MissingSourceMapFile,

    /// Single-file source maps were requested without naming the input.
    #[error("source maps require the `source_map_source` option")]
    MissingSourceMapSource,

    /// A user-supplied module-name hook returned a name already in use.
    #[error("module name `{name}` is already in use")]
    NamingCollision { name: String },

    /// Module syntax the rewriter does not model.
    #[error("unsupported syntax: {detail}")]
    UnsupportedSyntax { detail: String },

    /// A module file existed but could not be read.
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CompileError>;
