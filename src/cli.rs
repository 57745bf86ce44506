use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Rewrite ES-module JavaScript into legacy module wrappers.
///
/// unmodule converts `import`/`export` syntax into AMD, CommonJS, or UMD —
/// one file at a time, or as a single self-contained bundle resolved from an
/// entry file.
#[derive(Parser, Debug)]
#[command(
    name = "unmodule",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Output wrapper format.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum FormatArg {
    /// Asynchronous define-style wrapper.
    Amd,
    /// Node-style require/exports wrapper (default).
    #[default]
    Cjs,
    /// Universal wrapper that detects its host at load time.
    Umd,
}

/// How the source map is attached.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SourceMapArg {
    /// Write `<output>.map` next to the output file.
    File,
    /// Embed the map as a base64 data URI.
    Inline,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transpile one module, leaving its imports as external references.
    Convert {
        /// The source file to rewrite.
        input: PathBuf,

        /// Write the artifact here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output wrapper format.
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// Strict mode: named exports through an `exports` object. Without
        /// it only a single default export is allowed.
        #[arg(long)]
        strict: bool,

        /// Global name for the UMD fallback (required with --format umd).
        #[arg(long)]
        name: Option<String>,

        /// Explicit module id for the `define` call.
        #[arg(long)]
        amd_name: Option<String>,

        /// Text prepended to the artifact.
        #[arg(long)]
        banner: Option<String>,

        /// Text appended to the artifact.
        #[arg(long)]
        footer: Option<String>,

        /// Generate a source map (requires --output for `file` mode).
        #[arg(long, value_enum)]
        source_map: Option<SourceMapArg>,
    },

    /// Resolve an entry file's local dependency graph and emit one bundle.
    Bundle {
        /// The entry module, relative to --base.
        entry: PathBuf,

        /// Write the artifact here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output wrapper format.
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// Strict mode: named exports through an `exports` object.
        #[arg(long)]
        strict: bool,

        /// Global name for the UMD fallback (required with --format umd).
        #[arg(long)]
        name: Option<String>,

        /// Explicit module id for the `define` call.
        #[arg(long)]
        amd_name: Option<String>,

        /// Directory module ids resolve against (default: the entry's
        /// directory).
        #[arg(long)]
        base: Option<PathBuf>,

        /// Module ids to keep external (comma-separated).
        #[arg(long, value_delimiter = ',')]
        skip: Vec<String>,

        /// Text prepended to the artifact.
        #[arg(long)]
        banner: Option<String>,

        /// Text appended to the artifact.
        #[arg(long)]
        footer: Option<String>,

        /// Generate a source map (requires --output for `file` mode).
        #[arg(long, value_enum)]
        source_map: Option<SourceMapArg>,
    },
}
