//! Integration test suite — exercises the library API end to end for both
//! transpile and bundle modes, plus the compiled `unmodule` binary via
//! subprocess (Cargo sets `CARGO_BIN_EXE_unmodule` during `cargo test`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use unmodule::{
    Bundle, BundleOptions, CompileError, ConcatOptions, EmitOptions, Format, SourceMapMode,
    bundle, transpile,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_unmodule"))
}

fn cjs(strict: bool) -> EmitOptions {
    EmitOptions {
        format: Format::Cjs,
        strict,
        ..EmitOptions::default()
    }
}

fn amd(strict: bool) -> EmitOptions {
    EmitOptions {
        format: Format::Amd,
        strict,
        ..EmitOptions::default()
    }
}

fn umd(strict: bool, name: &str) -> EmitOptions {
    EmitOptions {
        format: Format::Umd,
        strict,
        name: Some(name.to_owned()),
        ..EmitOptions::default()
    }
}

/// Write a module-tree fixture and load it as a bundle.
fn build_bundle(files: &[(&str, &str)], entry: &str) -> (tempfile::TempDir, Bundle) {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
    let b = bundle(&BundleOptions {
        entry: entry.to_owned(),
        base: Some(dir.path().to_path_buf()),
        ..BundleOptions::default()
    })
    .expect("bundle should load");
    (dir, b)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// S1 — a lone default export in defaults-only require/exports mode.
#[test]
fn test_default_export_to_cjs() {
    let out = transpile("export default 42;", &cjs(false)).unwrap();
    assert!(out.code.contains("'use strict';"), "{}", out.code);
    assert!(out.code.contains("module.exports = 42;"), "{}", out.code);
    assert!(!out.code.contains("export"), "{}", out.code);
}

/// S2 — reassignments of an exported binding are mirrored onto `exports`.
#[test]
fn test_reassignment_mirroring() {
    let out = transpile("export var x = 1;\nx = 2;\nx++;\n", &cjs(true)).unwrap();
    assert!(out.code.contains("var x = 1;"), "{}", out.code);
    assert!(out.code.contains("exports.x = x = 2;"), "{}", out.code);
    assert!(out.code.contains("x++, exports.x = x;"), "{}", out.code);
}

/// S3 — assigning to an imported binding is fatal.
#[test]
fn test_illegal_reassignment() {
    let err = transpile("import { x } from 'a';\nx = 1;\n", &cjs(false)).unwrap_err();
    match err {
        CompileError::ReassignImport { name } => assert_eq!(name, "x"),
        other => panic!("expected reassignment error, got {other}"),
    }
}

/// S4 — two-module bundle; the entry default comes from the dependency.
#[test]
fn test_two_module_bundle() {
    let files = [
        (
            "a.js",
            "export var foo = 1;\nexport function bar() { return foo; }\n",
        ),
        ("b.js", "import { bar } from './a';\nexport default bar();\n"),
    ];

    let (_dir, mut b) = build_bundle(&files, "b.js");
    let strict = b.to_cjs(&cjs(true)).unwrap();
    assert!(strict.code.contains("var foo = 1;"), "{}", strict.code);
    assert!(
        strict.code.contains("function bar() { return foo; }"),
        "{}",
        strict.code
    );
    assert!(strict.code.contains("var b = bar();"), "{}", strict.code);
    assert!(
        strict.code.contains("exports['default'] = b;"),
        "{}",
        strict.code
    );
    assert!(!strict.code.contains("import"), "{}", strict.code);

    let (_dir, mut b) = build_bundle(&files, "b.js");
    let defaults = b.to_cjs(&cjs(false)).unwrap();
    assert!(
        defaults.code.contains("module.exports = b;"),
        "{}",
        defaults.code
    );
}

/// Invariant 4 — the same top-level name in two modules is deconflicted.
#[test]
fn test_conflicting_names_renamed() {
    let files = [
        ("a.js", "export var value = 1;\nvar shared = 'a';\nexport function readA() { return shared; }\n"),
        ("c.js", "export var other = 2;\nvar shared = 'c';\nexport function readC() { return shared; }\n"),
        (
            "main.js",
            "import { readA } from './a';\nimport { readC } from './c';\nexport default readA() + readC();\n",
        ),
    ];
    let (_dir, mut b) = build_bundle(&files, "main.js");
    let out = b.to_cjs(&cjs(true)).unwrap();
    assert!(out.code.contains("var a__shared = 'a';"), "{}", out.code);
    assert!(out.code.contains("var c__shared = 'c';"), "{}", out.code);
    assert!(
        out.code.contains("return a__shared;") && out.code.contains("return c__shared;"),
        "{}",
        out.code
    );
}

/// S5 — a namespace import becomes a live getter object.
#[test]
fn test_namespace_import_bundle() {
    let files = [
        ("a.js", "export var x = 1;\nexport var y = 2;\n"),
        ("main.js", "import * as a from './a';\nexport default a.x;\n"),
    ];
    let (_dir, mut b) = build_bundle(&files, "main.js");
    let out = b.to_cjs(&cjs(false)).unwrap();
    assert!(out.code.contains("var a = {"), "{}", out.code);
    assert!(out.code.contains("get x () { return x; }"), "{}", out.code);
    assert!(out.code.contains("get y () { return y; }"), "{}", out.code);
    assert!(out.code.contains("a.x"), "{}", out.code);
}

/// S6 — a re-export chain reads the originating binding.
#[test]
fn test_reexport_chain() {
    let files = [
        ("a.js", "export var v = 9;\n"),
        ("b.js", "export { v } from './a';\n"),
        ("c.js", "export { v } from './b';\n"),
    ];

    // Strict mode surfaces the chain through a live getter.
    let (_dir, mut b) = build_bundle(&files, "c.js");
    let strict = b.to_cjs(&cjs(true)).unwrap();
    assert!(
        strict
            .code
            .contains("Object.defineProperty(exports, 'v', { get: function () { return v; } });"),
        "{}",
        strict.code
    );

    // Defaults-safe mode uses a late assignment in the owning module.
    let (_dir, mut b) = build_bundle(&files, "c.js");
    let defaults = b.to_cjs(&cjs(false)).unwrap();
    assert!(defaults.code.contains("var v = 9;"), "{}", defaults.code);
    assert!(defaults.code.contains("exports.v = v;"), "{}", defaults.code);
}

// ---------------------------------------------------------------------------
// Single-file wrappers
// ---------------------------------------------------------------------------

#[test]
fn test_amd_wrapper_with_imports() {
    let out = transpile(
        "import d from './dep';\nexport default d;\n",
        &amd(false),
    )
    .unwrap();
    assert!(
        out.code.contains("define(['./dep'], function (dep) {"),
        "{}",
        out.code
    );
    assert!(out.code.contains("'use strict';"), "{}", out.code);
    assert!(out.code.contains("return dep;"), "{}", out.code);
    assert!(out.code.trim_end().ends_with("});"), "{}", out.code);
}

#[test]
fn test_amd_strict_threads_exports() {
    let out = transpile(
        "import { x } from './dep';\nexport var y = x;\n",
        &amd(true),
    )
    .unwrap();
    assert!(
        out.code
            .contains("define(['exports', './dep'], function (exports, dep) {"),
        "{}",
        out.code
    );
    assert!(out.code.contains("var y = dep.x;"), "{}", out.code);
    assert!(out.code.contains("exports.y = y;"), "{}", out.code);
}

#[test]
fn test_umd_wrapper_branches() {
    let out = transpile(
        "import d from 'dep';\nexport default d + 1;\n",
        &umd(false, "myMod"),
    )
    .unwrap();
    assert!(
        out.code
            .contains("typeof exports === 'object' && typeof module !== 'undefined'"),
        "{}",
        out.code
    );
    assert!(
        out.code.contains("module.exports = factory(require('dep'))"),
        "{}",
        out.code
    );
    assert!(
        out.code.contains("typeof define === 'function' && define.amd"),
        "{}",
        out.code
    );
    assert!(
        out.code.contains("(global.myMod = factory(global.dep))"),
        "{}",
        out.code
    );
}

#[test]
fn test_umd_requires_name() {
    let options = EmitOptions {
        format: Format::Umd,
        ..EmitOptions::default()
    };
    let err = transpile("export default 1;", &options).unwrap_err();
    assert!(matches!(err, CompileError::MissingName), "{err}");
}

#[test]
fn test_named_exports_require_strict_mode() {
    let err = transpile("export var x = 1;", &cjs(false)).unwrap_err();
    assert!(matches!(err, CompileError::StrictMode { .. }), "{err}");

    let err = transpile("import { x } from 'a';\nvar y = x;\n", &cjs(false)).unwrap_err();
    assert!(matches!(err, CompileError::StrictMode { .. }), "{err}");
}

#[test]
fn test_exported_function_hoisted_early() {
    let out = transpile(
        "export function go() { return 1; }\nexport var x = go();\n",
        &cjs(true),
    )
    .unwrap();
    let early = out.code.find("exports.go = go;").expect("early export");
    let declaration = out.code.find("function go()").unwrap();
    assert!(
        early < declaration,
        "function export precedes the body:\n{}",
        out.code
    );
    assert!(out.code.contains("exports.x = x;"), "{}", out.code);
}

#[test]
fn test_single_file_passthrough_reexport() {
    let out = transpile("export { helper } from './utils';\n", &cjs(true)).unwrap();
    assert!(
        out.code.contains("var utils = require('./utils');"),
        "{}",
        out.code
    );
    assert!(
        out.code.contains("exports.helper = utils.helper;"),
        "{}",
        out.code
    );
}

#[test]
fn test_top_level_this_rewritten() {
    let out = transpile("export default this;\n", &cjs(false)).unwrap();
    assert!(
        out.code.contains("module.exports = undefined;"),
        "{}",
        out.code
    );

    let err = transpile("this.x = 1;\n", &cjs(false)).unwrap_err();
    assert!(matches!(err, CompileError::TopLevelThis), "{err}");
}

#[test]
fn test_banner_and_footer() {
    let options = EmitOptions {
        format: Format::Cjs,
        banner: Some("/* banner */".to_owned()),
        footer: Some("/* footer */".to_owned()),
        ..EmitOptions::default()
    };
    let out = transpile("export default 1;", &options).unwrap();
    assert!(out.code.starts_with("/* banner */\n"), "{}", out.code);
    assert!(out.code.trim_end().ends_with("/* footer */"), "{}", out.code);
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

/// Invariant 2 — a module without module syntax survives byte-identical
/// (modulo trimming).
#[test]
fn test_round_trip_no_module_syntax() {
    let body = "var a = 1;\nfunction inc() { a += 1; }\ninc();";
    let out = transpile(body, &cjs(true)).unwrap();
    assert!(out.code.contains(body), "{}", out.code);
}

/// Invariant 3 — two runs over the same input are byte-identical.
#[test]
fn test_deterministic_output() {
    let files = [
        ("a.js", "export var x = 1;\n"),
        ("b.js", "export { x } from './a';\nexport var y = 2;\n"),
        (
            "main.js",
            "import { x, y } from './b';\nimport * as a from './a';\nexport default x + y + a.x;\n",
        ),
    ];
    let (_dir, mut first) = build_bundle(&files, "main.js");
    let (_dir2, mut second) = build_bundle(&files, "main.js");
    let one = first.to_amd(&amd(true)).unwrap();
    let two = second.to_amd(&amd(true)).unwrap();
    assert_eq!(one.code, two.code);
}

/// Invariant 7 — template literals keep their exact text despite body
/// indentation.
#[test]
fn test_template_literal_untouched_by_indent() {
    let out = transpile(
        "export default `line one\nline two`;\n",
        &amd(false),
    )
    .unwrap();
    assert!(
        out.code.contains("`line one\nline two`"),
        "{}",
        out.code
    );
}

#[test]
fn test_cycle_bundles_in_load_order() {
    let files = [
        (
            "even.js",
            "import { odd } from './odd';\nexport function even(n) { return n === 0 || odd(n - 1); }\n",
        ),
        (
            "odd.js",
            "import { even } from './even';\nexport function odd(n) { return n !== 0 && even(n - 1); }\n",
        ),
        (
            "main.js",
            "import { even } from './even';\nexport default even(10);\n",
        ),
    ];
    let (_dir, mut b) = build_bundle(&files, "main.js");
    let out = b.to_cjs(&cjs(false)).unwrap();
    let even_pos = out.code.find("function even(n)").unwrap();
    let odd_pos = out.code.find("function odd(n)").unwrap();
    assert!(even_pos < odd_pos, "cycle keeps load order:\n{}", out.code);
    assert!(out.code.contains("module.exports = main;"), "{}", out.code);
}

#[test]
fn test_external_interop_shim() {
    let files = [(
        "main.js",
        "import d, { named } from 'other';\nexport default d + named;\n",
    )];
    let (_dir, mut b) = build_bundle(&files, "main.js");
    assert_eq!(b.imports(), vec!["other"]);
    let out = b.to_cjs(&cjs(false)).unwrap();
    assert!(
        out.code
            .contains("var other__default = ('default' in other ? other['default'] : other);"),
        "{}",
        out.code
    );
    assert!(out.code.contains("other__default + other.named"), "{}", out.code);
    assert!(
        out.code.contains("var other = require('other');"),
        "{}",
        out.code
    );
}

#[test]
fn test_bundle_amd_lists_externals() {
    let files = [(
        "main.js",
        "import x from 'ext';\nexport default x;\n",
    )];
    let (_dir, mut b) = build_bundle(&files, "main.js");
    let out = b.to_amd(&amd(false)).unwrap();
    assert!(
        out.code.contains("define(['ext'], function (x) {"),
        "{}",
        out.code
    );
    assert!(out.code.contains("var main = x;"), "{}", out.code);
    assert!(out.code.contains("return main;"), "{}", out.code);
}

// ---------------------------------------------------------------------------
// Concat mode
// ---------------------------------------------------------------------------

#[test]
fn test_concat_wraps_in_iife() {
    let files = [
        ("effects.js", "var level = 1;\nconsole.log(level);\n"),
        ("main.js", "import './effects';\nconsole.log('main');\n"),
    ];
    let (_dir, mut b) = build_bundle(&files, "main.js");
    let out = b.concat(&ConcatOptions::default()).unwrap();
    assert!(
        out.code.starts_with("(function () { 'use strict';"),
        "{}",
        out.code
    );
    assert!(out.code.trim_end().ends_with("})();"), "{}", out.code);
    assert!(out.code.contains("console.log('main');"), "{}", out.code);
}

#[test]
fn test_concat_rejects_imports_and_exports() {
    let files = [("main.js", "import x from 'ext';\nconsole.log(x);\n")];
    let (_dir, mut b) = build_bundle(&files, "main.js");
    assert!(b.concat(&ConcatOptions::default()).is_err());

    let files = [("main.js", "export var x = 1;\n")];
    let (_dir, mut b) = build_bundle(&files, "main.js");
    assert!(b.concat(&ConcatOptions::default()).is_err());
}

// ---------------------------------------------------------------------------
// Source maps
// ---------------------------------------------------------------------------

#[test]
fn test_source_map_requires_configuration() {
    let options = EmitOptions {
        format: Format::Cjs,
        source_map: SourceMapMode::File,
        ..EmitOptions::default()
    };
    let err = transpile("export default 1;", &options).unwrap_err();
    assert!(matches!(err, CompileError::MissingSourceMapFile), "{err}");

    let options = EmitOptions {
        format: Format::Cjs,
        source_map: SourceMapMode::File,
        source_map_file: Some("out.js".to_owned()),
        ..EmitOptions::default()
    };
    let err = transpile("export default 1;", &options).unwrap_err();
    assert!(matches!(err, CompileError::MissingSourceMapSource), "{err}");
}

#[test]
fn test_inline_source_map_annotation() {
    let options = EmitOptions {
        format: Format::Cjs,
        strict: true,
        source_map: SourceMapMode::Inline,
        source_map_file: Some("out.js".to_owned()),
        source_map_source: Some("in.js".to_owned()),
        ..EmitOptions::default()
    };
    let out = transpile("export var x = 1;\n", &options).unwrap();
    assert!(
        out.code
            .contains("//# sourceMappingURL=data:application/json;charset=utf-8;base64,"),
        "{}",
        out.code
    );
    let map = out.map.expect("map present");
    assert_eq!(map.get_source(0), Some("in.js"));
}

#[test]
fn test_file_source_map_tokens_point_home() {
    let source = "var pad = 1;\nexport var x = pad;\n";
    let options = EmitOptions {
        format: Format::Cjs,
        strict: true,
        source_map: SourceMapMode::File,
        source_map_file: Some("dist/out.js".to_owned()),
        source_map_source: Some("in.js".to_owned()),
        ..EmitOptions::default()
    };
    let out = transpile(source, &options).unwrap();
    assert!(
        out.code.contains("//# sourceMappingURL=out.js.map"),
        "{}",
        out.code
    );
    let map = out.map.expect("map present");

    // `var pad = 1;` sits below the 'use strict' preamble but must map back
    // to line 0 of the input.
    let out_line = out
        .code
        .lines()
        .position(|l| l.contains("var pad = 1;"))
        .unwrap() as u32;
    let token = map.lookup_token(out_line, 0).expect("token");
    assert_eq!(token.get_src_line(), 0);
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

fn run_cli(args: &[&str], dir: &Path) -> (String, String, bool) {
    let out = Command::new(binary())
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to invoke unmodule binary");
    (
        String::from_utf8_lossy(&out.stdout).to_string(),
        String::from_utf8_lossy(&out.stderr).to_string(),
        out.status.success(),
    )
}

#[test]
fn test_cli_convert_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.js"), "export default 42;\n").unwrap();
    let (stdout, stderr, ok) = run_cli(&["convert", "in.js"], dir.path());
    assert!(ok, "stderr: {stderr}");
    assert!(stdout.contains("module.exports = 42;"), "{stdout}");
}

#[test]
fn test_cli_convert_amd_to_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.js"), "export default 1;\n").unwrap();
    let (_stdout, stderr, ok) = run_cli(
        &["convert", "in.js", "--format", "amd", "-o", "out.js"],
        dir.path(),
    );
    assert!(ok, "stderr: {stderr}");
    let written = std::fs::read_to_string(dir.path().join("out.js")).unwrap();
    assert!(written.contains("define(function () {"), "{written}");
}

#[test]
fn test_cli_bundle() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("dep.js"), "export var n = 2;\n").unwrap();
    std::fs::write(
        dir.path().join("main.js"),
        "import { n } from './dep';\nexport default n * 2;\n",
    )
    .unwrap();
    let (stdout, stderr, ok) = run_cli(&["bundle", "main.js"], dir.path());
    assert!(ok, "stderr: {stderr}");
    assert!(stdout.contains("var n = 2;"), "{stdout}");
    assert!(stdout.contains("module.exports = main;"), "{stdout}");
}

#[test]
fn test_cli_umd_without_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.js"), "export default 1;\n").unwrap();
    let (_stdout, stderr, ok) = run_cli(&["convert", "in.js", "--format", "umd"], dir.path());
    assert!(!ok);
    assert!(stderr.contains("name"), "{stderr}");
}

#[test]
fn test_cli_reads_config_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("unmodule.toml"),
        "format = \"umd\"\nname = \"fromConfig\"\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("in.js"), "export default 7;\n").unwrap();
    let (stdout, stderr, ok) = run_cli(&["convert", "in.js"], dir.path());
    assert!(ok, "stderr: {stderr}");
    assert!(stdout.contains("global.fromConfig"), "{stdout}");
}

#[test]
fn test_cli_source_map_file_written() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.js"), "export default 1;\n").unwrap();
    let (_stdout, stderr, ok) = run_cli(
        &["convert", "in.js", "-o", "out.js", "--source-map", "file"],
        dir.path(),
    );
    assert!(ok, "stderr: {stderr}");
    let map_text = std::fs::read_to_string(dir.path().join("out.js.map")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&map_text).unwrap();
    assert_eq!(parsed["version"], 3);
    assert!(
        parsed["sources"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s.as_str() == Some("in.js")),
        "{map_text}"
    );
}

// ---------------------------------------------------------------------------
// Bundle option surface
// ---------------------------------------------------------------------------

#[test]
fn test_bundle_reports_imports_and_exports() {
    let files = [
        ("a.js", "export var x = 1;\n"),
        (
            "main.js",
            "import { x } from './a';\nimport ext from 'somewhere';\nexport var out = x;\nexport default ext;\n",
        ),
    ];
    let (_dir, b) = build_bundle(&files, "main.js");
    assert_eq!(b.imports(), vec!["somewhere"]);
    assert_eq!(b.exports(), vec!["out", "default"]);
}

#[test]
fn test_bundle_names_option() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.js"), "import x from 'ext';\nexport default x;\n")
        .unwrap();
    let mut names = HashMap::new();
    names.insert("ext".to_owned(), "renamed".to_owned());
    let mut b = bundle(&BundleOptions {
        entry: "main.js".to_owned(),
        base: Some(dir.path().to_path_buf()),
        names,
        ..BundleOptions::default()
    })
    .unwrap();
    let out = b.to_cjs(&cjs(false)).unwrap();
    assert!(
        out.code.contains("var renamed = require('ext');"),
        "{}",
        out.code
    );
}
