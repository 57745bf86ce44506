pub mod declarations;
pub mod scopes;

use std::cell::RefCell;
use std::sync::OnceLock;

use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator, Tree};

use crate::error::{CompileError, Result};

// Thread-local Parser instances — one per rayon worker thread, zero lock
// contention. Each Parser is initialised once per thread with the JS grammar.
thread_local! {
    static PARSER_JS: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        p.set_language(&tree_sitter_javascript::LANGUAGE.into()).unwrap();
        p
    });
}

/// The JavaScript grammar.
pub fn language() -> Language {
    tree_sitter_javascript::LANGUAGE.into()
}

/// Tree-sitter query matching every comment node. Source-map annotations are
/// filtered in code.
const COMMENT_QUERY: &str = r#"
    (comment) @comment
"#;

static COMMENT_QUERY_CACHE: OnceLock<Query> = OnceLock::new();

fn comment_query(language: &Language) -> &'static Query {
    COMMENT_QUERY_CACHE
        .get_or_init(|| Query::new(language, COMMENT_QUERY).expect("invalid comment query"))
}

/// Extract the UTF-8 text of a node from the original source bytes.
pub fn node_text<'a>(node: Node<'a>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// The result of parsing one source file.
#[derive(Debug)]
pub struct ParsedSource {
    pub tree: Tree,
    /// Spans of `sourceMappingURL` comments, to be deleted by the rewriter.
    pub map_comment_spans: Vec<(usize, usize)>,
}

/// Parse `source`, reusing the thread-local parser.
///
/// Tree-sitter recovers from syntax errors instead of failing, so a tree
/// containing error or missing nodes is reported as a parse failure with the
/// offending `path` and the position of the first bad node attached.
pub fn parse(source: &str, path: &str) -> Result<ParsedSource> {
    let tree = PARSER_JS
        .with(|p| p.borrow_mut().parse(source.as_bytes(), None))
        .ok_or_else(|| CompileError::Parse {
            path: path.to_owned(),
            detail: "tree-sitter returned no tree".to_owned(),
        })?;

    let root = tree.root_node();
    if root.has_error() {
        let detail = first_error(root)
            .map(|n| {
                let pos = n.start_position();
                format!("syntax error at {}:{}", pos.row + 1, pos.column + 1)
            })
            .unwrap_or_else(|| "syntax error".to_owned());
        return Err(CompileError::Parse {
            path: path.to_owned(),
            detail,
        });
    }

    let map_comment_spans = collect_map_comments(&tree, source.as_bytes());
    Ok(ParsedSource {
        tree,
        map_comment_spans,
    })
}

/// Depth-first search for the first ERROR or missing node.
fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    None
}

/// Find every comment whose body is a `# sourceMappingURL=` annotation.
fn collect_map_comments(tree: &Tree, source: &[u8]) -> Vec<(usize, usize)> {
    let language = language();
    let query = comment_query(&language);
    let comment_idx = query
        .capture_index_for_name("comment")
        .expect("comment query must have @comment");

    let mut spans = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);
    while let Some(m) = matches.next() {
        for capture in m.captures {
            if capture.index != comment_idx {
                continue;
            }
            let text = node_text(capture.node, source);
            let body = text
                .strip_prefix("//")
                .or_else(|| text.strip_prefix("/*"))
                .unwrap_or(text)
                .trim_start();
            if body.starts_with("# sourceMappingURL=") || body.starts_with("#sourceMappingURL=") {
                spans.push((capture.node.start_byte(), capture.node.end_byte()));
            }
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_module() {
        let parsed = parse("import x from './x';\nexport default x;\n", "a.js").unwrap();
        assert_eq!(parsed.tree.root_node().kind(), "program");
        assert!(parsed.map_comment_spans.is_empty());
    }

    #[test]
    fn test_parse_error_names_path() {
        let err = parse("var = ;", "broken.js").unwrap_err();
        match err {
            CompileError::Parse { path, detail } => {
                assert_eq!(path, "broken.js");
                assert!(detail.contains("syntax error"), "{detail}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_source_map_comments_collected() {
        let src = "var a = 1;\n//# sourceMappingURL=a.js.map\n";
        let parsed = parse(src, "a.js").unwrap();
        assert_eq!(parsed.map_comment_spans.len(), 1);
        let (start, end) = parsed.map_comment_spans[0];
        assert_eq!(&src[start..end], "//# sourceMappingURL=a.js.map");
    }

    #[test]
    fn test_plain_comments_not_collected() {
        let parsed = parse("// a comment\nvar a = 1;\n", "a.js").unwrap();
        assert!(parsed.map_comment_spans.is_empty());
    }
}
