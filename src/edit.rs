//! A mutable text-edit buffer over an immutable original source.
//!
//! Every edit is expressed in *original* byte offsets, so edits commute: the
//! body rewriter can delete an import, rename an identifier, and inject an
//! assignment in any order and the rendered output is the same. Rendering
//! also yields mapping segments (output position → original offset) that the
//! source-map assembly consumes.

/// A single recorded edit. `start == end` is an insertion.
#[derive(Debug, Clone)]
struct Edit {
    start: usize,
    end: usize,
    content: String,
    seq: usize,
}

/// One run of output text during rendering.
#[derive(Debug)]
struct Piece {
    text: String,
    /// Original offset this text maps back to. `None` for intro/outro.
    origin: Option<usize>,
    /// True when the text came from an edit rather than the original source.
    edited: bool,
}

/// A mapping segment: the output position at which original offset `origin`
/// (or edited text standing in for it) begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub out_line: u32,
    pub out_col: u32,
    pub origin: usize,
}

/// The rendered form of a buffer: final text plus ordered mapping segments.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub code: String,
    pub segments: Vec<Segment>,
}

/// The edit buffer itself. Original text is never mutated; edits accumulate
/// and are composed at render time.
#[derive(Debug, Clone)]
pub struct EditBuffer {
    source: String,
    edits: Vec<Edit>,
    intro: String,
    outro: String,
    trimmed: bool,
    indent: Option<String>,
    exclusions: Vec<(usize, usize)>,
}

impl EditBuffer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_owned(),
            edits: Vec::new(),
            intro: String::new(),
            outro: String::new(),
            trimmed: false,
            indent: None,
            exclusions: Vec::new(),
        }
    }

    /// Delete the original span `[start, end)`.
    pub fn remove(&mut self, start: usize, end: usize) {
        self.replace(start, end, "");
    }

    /// Replace the original span `[start, end)` with `content`.
    pub fn replace(&mut self, start: usize, end: usize, content: impl Into<String>) {
        debug_assert!(start <= end && end <= self.source.len());
        let seq = self.edits.len();
        self.edits.push(Edit {
            start,
            end,
            content: content.into(),
            seq,
        });
    }

    /// Insert `content` immediately before original offset `at`. Repeated
    /// insertions at the same offset render in call order.
    pub fn insert(&mut self, at: usize, content: impl Into<String>) {
        self.replace(at, at, content);
    }

    /// Add text before the (trimmed) body.
    pub fn prepend(&mut self, s: &str) {
        self.intro.insert_str(0, s);
    }

    /// Add text after the (trimmed) body.
    pub fn append(&mut self, s: &str) {
        self.outro.push_str(s);
    }

    /// Strip leading and trailing whitespace from the edited body. Intro and
    /// outro text is not affected.
    pub fn trim(&mut self) {
        self.trimmed = true;
    }

    /// Indent every non-empty output line with `indent`, except lines whose
    /// first character falls inside one of `exclusions` (original offsets —
    /// used to keep template literals byte-identical).
    pub fn indent_with(&mut self, indent: &str, exclusions: &[(usize, usize)]) {
        self.indent = Some(indent.to_owned());
        self.exclusions = exclusions.to_vec();
    }

    /// Render the final text without mappings.
    pub fn text(&self) -> String {
        self.render().code
    }

    fn excluded(&self, offset: usize) -> bool {
        self.exclusions.iter().any(|&(a, b)| offset >= a && offset < b)
    }

    fn pieces(&self) -> Vec<Piece> {
        let mut edits = self.edits.clone();
        edits.sort_by_key(|e| (e.start, e.seq));

        let mut pieces = Vec::new();
        let mut cursor = 0usize;
        for edit in &edits {
            if edit.start < cursor {
                // Overlapping edits do not occur in practice; later ones lose.
                continue;
            }
            if edit.start > cursor {
                pieces.push(Piece {
                    text: self.source[cursor..edit.start].to_owned(),
                    origin: Some(cursor),
                    edited: false,
                });
            }
            if !edit.content.is_empty() {
                pieces.push(Piece {
                    text: edit.content.clone(),
                    origin: Some(edit.start),
                    edited: true,
                });
            }
            cursor = cursor.max(edit.end);
        }
        if cursor < self.source.len() {
            pieces.push(Piece {
                text: self.source[cursor..].to_owned(),
                origin: Some(cursor),
                edited: false,
            });
        }

        if self.trimmed {
            while let Some(first) = pieces.first_mut() {
                let stripped = first.text.trim_start();
                let delta = first.text.len() - stripped.len();
                if delta > 0 {
                    if !first.edited {
                        if let Some(o) = first.origin.as_mut() {
                            *o += delta;
                        }
                    }
                    first.text = stripped.to_owned();
                }
                if first.text.is_empty() {
                    pieces.remove(0);
                } else {
                    break;
                }
            }
            while let Some(last) = pieces.last_mut() {
                let stripped = last.text.trim_end();
                if stripped.len() != last.text.len() {
                    last.text = stripped.to_owned();
                }
                if last.text.is_empty() {
                    pieces.pop();
                } else {
                    break;
                }
            }
        }

        if !self.intro.is_empty() {
            pieces.insert(
                0,
                Piece {
                    text: self.intro.clone(),
                    origin: None,
                    edited: true,
                },
            );
        }
        if !self.outro.is_empty() {
            pieces.push(Piece {
                text: self.outro.clone(),
                origin: None,
                edited: true,
            });
        }

        pieces
    }

    /// Compose all edits and produce the output text plus mapping segments.
    pub fn render(&self) -> Rendered {
        let pieces = self.pieces();
        let mut out: Vec<u8> = Vec::with_capacity(self.source.len());
        let mut segments = Vec::new();
        let mut out_line: u32 = 0;
        let mut out_col: u32 = 0;
        let mut at_line_start = true;

        for piece in &pieces {
            let mut line_head = true;
            let mut emitted_head = false;
            for (i, b) in piece.text.bytes().enumerate() {
                if at_line_start && b != b'\n' && b != b'\r' {
                    let skip = match piece.origin {
                        Some(o) if !piece.edited => self.excluded(o + i),
                        _ => false,
                    };
                    if !skip {
                        if let Some(indent) = &self.indent {
                            out.extend_from_slice(indent.as_bytes());
                            out_col += indent.len() as u32;
                        }
                    }
                    at_line_start = false;
                }
                // Emit a segment at the piece head and at each line start of
                // unedited text, once the position of the char is known.
                if let Some(o) = piece.origin {
                    if !emitted_head || (!piece.edited && line_head) {
                        segments.push(Segment {
                            out_line,
                            out_col,
                            origin: o + i,
                        });
                        emitted_head = true;
                    }
                }
                out.push(b);
                if b == b'\n' {
                    out_line += 1;
                    out_col = 0;
                    at_line_start = true;
                    line_head = true;
                } else {
                    out_col += 1;
                    line_head = false;
                }
            }
        }

        // Pieces are sliced at char boundaries, so the byte stream is valid
        // UTF-8 by construction.
        let code = String::from_utf8(out).unwrap_or_default();
        Rendered { code, segments }
    }
}

/// Advance an (line, col) output position across `text`.
pub fn advance(line: u32, col: u32, text: &str) -> (u32, u32) {
    let mut line = line;
    let mut col = col;
    for b in text.bytes() {
        if b == b'\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Guess the indentation unit used by `source`: the leading whitespace of the
/// first indented line, defaulting to a tab.
pub fn detect_indent(source: &str) -> String {
    for line in source.lines() {
        let ws: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
        if !ws.is_empty() && ws.len() < line.len() {
            if ws.starts_with('\t') {
                return "\t".to_owned();
            }
            return ws;
        }
    }
    "\t".to_owned()
}

// ---------------------------------------------------------------------------
// Bundle concatenation
// ---------------------------------------------------------------------------

/// A mapping segment in a concatenated bundle: `part` indexes the
/// contributing source file.
#[derive(Debug, Clone, Copy)]
pub struct BundleSegment {
    pub out_line: u32,
    pub out_col: u32,
    pub part: usize,
    pub origin: usize,
}

/// One rendered module inside a [`Concat`].
#[derive(Debug)]
pub struct ConcatPart {
    pub name: String,
    pub original: String,
    pub rendered: Rendered,
}

/// Joins several rendered buffers with a separator, tracking per-part
/// provenance so the bundle source map can point back into each file.
#[derive(Debug, Default)]
pub struct Concat {
    pub parts: Vec<ConcatPart>,
    separator: String,
}

impl Concat {
    pub fn new(separator: &str) -> Self {
        Self {
            parts: Vec::new(),
            separator: separator.to_owned(),
        }
    }

    pub fn add(&mut self, name: &str, original: &str, rendered: Rendered) {
        self.parts.push(ConcatPart {
            name: name.to_owned(),
            original: original.to_owned(),
            rendered,
        });
    }

    /// Produce the joined text plus bundle-wide mapping segments. Parts that
    /// rendered to nothing (a module that was all import/export syntax)
    /// contribute no separator.
    pub fn render(&self) -> (String, Vec<BundleSegment>) {
        let mut code = String::new();
        let mut segments = Vec::new();
        let mut line: u32 = 0;
        let mut col: u32 = 0;
        let mut written = false;

        for (i, part) in self.parts.iter().enumerate() {
            if part.rendered.code.is_empty() {
                continue;
            }
            if written {
                code.push_str(&self.separator);
                let (l, c) = advance(line, col, &self.separator);
                line = l;
                col = c;
            }
            written = true;
            for seg in &part.rendered.segments {
                let out_col = if seg.out_line == 0 { col + seg.out_col } else { seg.out_col };
                segments.push(BundleSegment {
                    out_line: line + seg.out_line,
                    out_col,
                    part: i,
                    origin: seg.origin,
                });
            }
            code.push_str(&part.rendered.code);
            let (l, c) = advance(line, col, &part.rendered.code);
            line = l;
            col = c;
        }

        (code, segments)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
