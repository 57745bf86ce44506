//! Source-map assembly: converts the edit buffer's mapping segments into a
//! standard v3 map via `sourcemap::SourceMapBuilder`, plus the trailing
//! `//# sourceMappingURL=` annotation.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sourcemap::{SourceMap, SourceMapBuilder};

use crate::edit::BundleSegment;

/// How the generated map is attached to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMapMode {
    /// No map.
    #[default]
    Off,
    /// Map written alongside the output; annotation points at `<file>.map`.
    File,
    /// Map embedded as a base64 data URI annotation.
    Inline,
}

/// Byte offsets of each line start in `s` (line 0 starts at 0).
pub fn line_starts(s: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in s.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// Translate a byte offset into a 0-based (line, column) pair.
pub fn line_col(starts: &[usize], offset: usize) -> (u32, u32) {
    let line = match starts.binary_search(&offset) {
        Ok(l) => l,
        Err(l) => l - 1,
    };
    (line as u32, (offset - starts[line]) as u32)
}

/// Build a v3 source map from bundle segments.
///
/// `sources` is one `(name, content)` pair per contributing file, indexed by
/// `BundleSegment::part`. Contents are always embedded so the map is
/// self-contained.
pub fn build(
    file: Option<&str>,
    sources: &[(String, String)],
    segments: &[BundleSegment],
) -> SourceMap {
    let mut builder = SourceMapBuilder::new(file);
    let mut starts = Vec::with_capacity(sources.len());
    for (name, content) in sources {
        let id = builder.add_source(name);
        builder.set_source_contents(id, Some(content));
        starts.push(line_starts(content));
    }
    for seg in segments {
        let (line, col) = line_col(&starts[seg.part], seg.origin);
        builder.add(
            seg.out_line,
            seg.out_col,
            line,
            col,
            Some(&sources[seg.part].0),
            None,
            false,
        );
    }
    builder.into_sourcemap()
}

/// Serialize a map to its JSON text.
pub fn to_json(map: &SourceMap) -> String {
    let mut buf = Vec::new();
    if map.to_writer(&mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// The trailing annotation comment for the given mode, or `None` when maps
/// are off. `file` is the output file path the map sits next to.
pub fn annotation(mode: SourceMapMode, map: &SourceMap, file: &str) -> Option<String> {
    match mode {
        SourceMapMode::Off => None,
        SourceMapMode::File => {
            let base = file.rsplit(['/', '\\']).next().unwrap_or(file);
            Some(format!("\n//# sourceMappingURL={base}.map\n"))
        }
        SourceMapMode::Inline => {
            let encoded = BASE64.encode(to_json(map));
            Some(format!(
                "\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{encoded}\n"
            ))
        }
    }
}
