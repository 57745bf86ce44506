mod cli;
mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;

use cli::{Cli, Commands, FormatArg, SourceMapArg};
use config::UnmoduleConfig;
use unmodule::{BundleOptions, EmitOptions, Format, Output, SourceMapMode, bundle, transpile};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = UnmoduleConfig::load(Path::new("."));

    match cli.command {
        Commands::Convert {
            input,
            output,
            format,
            strict,
            name,
            amd_name,
            banner,
            footer,
            source_map,
        } => {
            let source = std::fs::read_to_string(&input)
                .with_context(|| format!("could not read {}", input.display()))?;
            let mode = source_map_mode(source_map);
            if mode != SourceMapMode::Off && output.is_none() {
                bail!("--source-map requires --output");
            }
            let options = EmitOptions {
                format: resolve_format(format, &config)?,
                strict: strict || config.strict.unwrap_or(false),
                name: name.or_else(|| config.name.clone()),
                amd_name: amd_name.or_else(|| config.amd_name.clone()),
                banner: banner.or_else(|| config.banner.clone()),
                footer: footer.or_else(|| config.footer.clone()),
                source_map: mode,
                source_map_file: output.as_ref().map(|p| p.display().to_string()),
                source_map_source: Some(input.display().to_string()),
                ..EmitOptions::default()
            };
            let artifact = transpile(&source, &options)
                .with_context(|| format!("failed to transpile {}", input.display()))?;
            write_artifact(&artifact, output.as_deref(), mode)
        }

        Commands::Bundle {
            entry,
            output,
            format,
            strict,
            name,
            amd_name,
            base,
            skip,
            banner,
            footer,
            source_map,
        } => {
            let base = base.or_else(|| config.base.as_ref().map(PathBuf::from));
            let (base, entry_name) = split_entry(&entry, base);
            let mode = source_map_mode(source_map);
            if mode != SourceMapMode::Off && output.is_none() {
                bail!("--source-map requires --output");
            }
            let mut b = bundle(&BundleOptions {
                entry: entry_name,
                base: Some(base),
                skip,
                names: HashMap::new(),
                transform: None,
                resolve_path: None,
            })
            .with_context(|| format!("failed to bundle {}", entry.display()))?;

            let format = resolve_format(format, &config)?;
            let options = EmitOptions {
                format,
                strict: strict || config.strict.unwrap_or(false),
                name: name.or_else(|| config.name.clone()),
                amd_name: amd_name.or_else(|| config.amd_name.clone()),
                banner: banner.or_else(|| config.banner.clone()),
                footer: footer.or_else(|| config.footer.clone()),
                source_map: mode,
                source_map_file: output.as_ref().map(|p| p.display().to_string()),
                ..EmitOptions::default()
            };
            let artifact = match format {
                Format::Amd => b.to_amd(&options),
                Format::Cjs => b.to_cjs(&options),
                Format::Umd => b.to_umd(&options),
            }
            .with_context(|| format!("failed to bundle {}", entry.display()))?;
            write_artifact(&artifact, output.as_deref(), mode)
        }
    }
}

/// CLI flag wins, then `unmodule.toml`, then CommonJS.
fn resolve_format(arg: Option<FormatArg>, config: &UnmoduleConfig) -> Result<Format> {
    if let Some(arg) = arg {
        return Ok(match arg {
            FormatArg::Amd => Format::Amd,
            FormatArg::Cjs => Format::Cjs,
            FormatArg::Umd => Format::Umd,
        });
    }
    match config.format.as_deref() {
        None => Ok(Format::Cjs),
        Some("amd") => Ok(Format::Amd),
        Some("cjs") => Ok(Format::Cjs),
        Some("umd") => Ok(Format::Umd),
        Some(other) => bail!("unknown format {other:?} in unmodule.toml"),
    }
}

fn source_map_mode(arg: Option<SourceMapArg>) -> SourceMapMode {
    match arg {
        None => SourceMapMode::Off,
        Some(SourceMapArg::File) => SourceMapMode::File,
        Some(SourceMapArg::Inline) => SourceMapMode::Inline,
    }
}

/// Split an entry path into (base directory, entry file relative to it),
/// honouring an explicit --base.
fn split_entry(entry: &Path, base: Option<PathBuf>) -> (PathBuf, String) {
    if let Some(base) = base {
        let relative = entry
            .strip_prefix(&base)
            .unwrap_or(entry)
            .to_string_lossy()
            .into_owned();
        return (base, relative);
    }
    let parent = entry
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file = entry
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    (parent, file)
}

/// Write code to the output file (or stdout) and the map alongside it in
/// `file` mode.
fn write_artifact(artifact: &Output, target: Option<&Path>, mode: SourceMapMode) -> Result<()> {
    match target {
        Some(path) => {
            std::fs::write(path, &artifact.code)
                .with_context(|| format!("could not write {}", path.display()))?;
            if mode == SourceMapMode::File {
                if let Some(map) = &artifact.map {
                    let map_path = PathBuf::from(format!("{}.map", path.display()));
                    let file = std::fs::File::create(&map_path)
                        .with_context(|| format!("could not write {}", map_path.display()))?;
                    map.to_writer(file)
                        .with_context(|| format!("could not write {}", map_path.display()))?;
                }
            }
        }
        None => print!("{}", artifact.code),
    }
    Ok(())
}
