//! Path resolution: import path → canonical module id, and module id → file
//! on disk.
//!
//! Ids are path-shaped, extension-free, `/`-separated keys, canonical within
//! one run. Disk probing tries `base/id.js` then `base/id/index.js`, falling
//! back to a user-supplied resolver hook.

use std::path::{Path, PathBuf};

use crate::error::{CompileError, Result};

/// A user-supplied module resolver: `(id, base) → path`, tried after the
/// standard probes fail.
pub type ResolveHook = dyn Fn(&str, &Path) -> Option<PathBuf> + Send + Sync;

/// Strip a trailing `.js` extension.
pub fn strip_extension(path: &str) -> &str {
    path.strip_suffix(".js").unwrap_or(path)
}

/// The id's directory part ("" for a root-level id).
fn dirname(id: &str) -> &str {
    match id.rfind(['/', '\\']) {
        Some(i) => &id[..i],
        None => "",
    }
}

/// Resolve an import path against the id of the importing module.
///
/// Non-relative paths name external modules and are returned as-is (minus a
/// trailing `.js`). Relative paths are joined onto the importer's directory
/// with `.`/`..` segments collapsed; both `/` and `\` separate segments.
pub fn resolve_id(import_path: &str, importer_id: &str) -> String {
    if !import_path.starts_with('.') {
        return strip_extension(import_path).to_owned();
    }

    let mut segments: Vec<&str> = dirname(importer_id)
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect();

    for segment in strip_extension(import_path).split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// The outcome of probing for a module id on disk.
pub enum Probe {
    /// Found: the file's path and contents.
    Found(PathBuf, String),
    /// Nothing at any candidate location — the id is external.
    NotFound,
}

/// Try `base/id.js`, then `base/id/index.js`, then the hook.
///
/// A missing file is not an error here — the graph resolver decides whether
/// "missing" means external (regular import) or fatal (the entry). Any read
/// failure other than not-found aborts the operation.
pub fn probe(base: &Path, id: &str, hook: Option<&ResolveHook>) -> Result<Probe> {
    let candidates = [
        base.join(format!("{id}.js")),
        base.join(id).join("index.js"),
    ];
    for candidate in &candidates {
        match std::fs::read_to_string(candidate) {
            Ok(source) => return Ok(Probe::Found(candidate.clone(), source)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CompileError::Io {
                    path: candidate.clone(),
                    source: e,
                });
            }
        }
    }

    if let Some(hook) = hook {
        if let Some(path) = hook(id, base) {
            let source = std::fs::read_to_string(&path).map_err(|e| CompileError::Io {
                path: path.clone(),
                source: e,
            })?;
            return Ok(Probe::Found(path, source));
        }
    }

    Ok(Probe::NotFound)
}
