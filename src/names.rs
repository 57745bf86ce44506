//! Module name allocation.
//!
//! Every module in a bundle gets a unique identifier prefix; every external
//! module gets the identifier its `require`/factory argument binds. All
//! allocation happens against one "used" set seeded with the host
//! environment's reserved identifiers.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Identifiers the host environment claims: the standard built-in
/// constructors and global functions, the module-system plumbing, and the
/// usual host globals. Module names and deconflicted identifiers must never
/// collide with these.
pub const RESERVED_BUILTINS: &[&str] = &[
    "Array", "ArrayBuffer", "Boolean", "DataView", "Date", "Error", "EvalError", "Float32Array",
    "Float64Array", "Function", "Infinity", "Int8Array", "Int16Array", "Int32Array", "Intl",
    "JSON", "Map", "Math", "NaN", "Number", "Object", "Promise", "Proxy", "RangeError",
    "ReferenceError", "Reflect", "RegExp", "Set", "String", "Symbol", "SyntaxError", "TypeError",
    "URIError", "Uint8Array", "Uint8ClampedArray", "Uint16Array", "Uint32Array", "WeakMap",
    "WeakSet", "arguments", "console", "decodeURI", "decodeURIComponent", "define", "document",
    "encodeURI", "encodeURIComponent", "escape", "eval", "exports", "global", "globalThis",
    "isFinite", "isNaN", "module", "parseFloat", "parseInt", "process", "require", "undefined",
    "unescape", "window",
];

/// JavaScript reserved words. A path component equal to one of these gets an
/// underscore prefix during sanitization.
const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "implements",
    "import", "in", "instanceof", "interface", "let", "new", "null", "package", "private",
    "protected", "public", "return", "static", "super", "switch", "this", "throw", "true", "try",
    "typeof", "var", "void", "while", "with", "yield",
];

static INVALID_CHARS: OnceLock<Regex> = OnceLock::new();

fn invalid_chars() -> &'static Regex {
    INVALID_CHARS.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_$]").expect("invalid identifier regex"))
}

/// Turn one path component into a valid identifier fragment: strip invalid
/// characters, prefix a leading digit or reserved word with `_`.
pub fn sanitize(component: &str) -> String {
    let cleaned = invalid_chars().replace_all(component, "").into_owned();
    if cleaned.is_empty() {
        return "_".to_owned();
    }
    if cleaned.as_bytes()[0].is_ascii_digit() || RESERVED_WORDS.contains(&cleaned.as_str()) {
        return format!("_{cleaned}");
    }
    cleaned
}

/// Allocates unique module names against a shared used set.
pub struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    /// Seed with the host's reserved identifiers plus any user-supplied
    /// overrides (which are claimed immediately).
    pub fn new<'a>(user_names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut used: HashSet<String> =
            RESERVED_BUILTINS.iter().map(|s| (*s).to_owned()).collect();
        for name in user_names {
            used.insert(name.to_owned());
        }
        Self { used }
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Claim `name` if free. Returns false on conflict.
    pub fn adopt(&mut self, name: &str) -> bool {
        if self.used.contains(name) {
            return false;
        }
        self.used.insert(name.to_owned());
        true
    }

    /// Derive a name from a module id: try increasingly long suffixes of its
    /// path components joined by `_`, sanitized; if every suffix collides,
    /// prepend `_` until unique.
    pub fn allocate_from_id(&mut self, id: &str) -> String {
        let components: Vec<String> = crate::resolve::strip_extension(id)
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .map(sanitize)
            .collect();

        for take in 1..=components.len().max(1) {
            let candidate = if components.is_empty() {
                "_".to_owned()
            } else {
                components[components.len() - take..].join("_")
            };
            if self.adopt(&candidate) {
                return candidate;
            }
        }

        let mut candidate = match components.last() {
            Some(_) => components.join("_"),
            None => "_".to_owned(),
        };
        loop {
            candidate.insert(0, '_');
            if self.adopt(&candidate) {
                return candidate;
            }
        }
    }
}
