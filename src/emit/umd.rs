//! The universal wrapper: detect CommonJS, then AMD, then fall back to
//! attaching to a global. The global fallback reads each dependency from
//! `global.<depName>` and writes `global.<name>` with the user-provided
//! name — which is why [`crate::error::CompileError::MissingName`] exists.

use crate::emit::WrapContext;

pub fn wrap(context: &WrapContext) -> (String, String) {
    let indent = context.indent;
    let name = context.umd_name.unwrap_or_default();

    let requires: Vec<String> = context
        .deps
        .iter()
        .map(|d| format!("require('{}')", d.path))
        .collect();
    let cjs_branch = if context.has_exports {
        let mut args = vec!["exports".to_owned()];
        args.extend(requires.iter().cloned());
        format!("factory({})", args.join(", "))
    } else if context.returns_value {
        format!("module.exports = factory({})", requires.join(", "))
    } else {
        format!("factory({})", requires.join(", "))
    };

    let mut amd_paths: Vec<String> = Vec::new();
    if context.has_exports {
        amd_paths.push("'exports'".to_owned());
    }
    amd_paths.extend(context.deps.iter().map(|d| format!("'{}'", d.path)));
    let amd_branch = match (context.amd_name, amd_paths.is_empty()) {
        (Some(id), _) => format!("define('{id}', [{}], factory)", amd_paths.join(", ")),
        (None, true) => "define(factory)".to_owned(),
        (None, false) => format!("define([{}], factory)", amd_paths.join(", ")),
    };

    let globals: Vec<String> = context
        .deps
        .iter()
        .map(|d| format!("global.{}", d.name))
        .collect();
    let global_branch = if context.has_exports {
        let mut args = vec![format!("(global.{name} = {{}})")];
        args.extend(globals.iter().cloned());
        format!("(factory({}))", args.join(", "))
    } else if context.returns_value {
        format!("(global.{name} = factory({}))", globals.join(", "))
    } else {
        format!("(factory({}))", globals.join(", "))
    };

    let mut params: Vec<String> = Vec::new();
    if context.has_exports {
        params.push("exports".to_owned());
    }
    params.extend(
        context
            .deps
            .iter()
            .filter(|d| !d.empty)
            .map(|d| d.name.clone()),
    );

    let head = format!(
        "(function (global, factory) {{\n\
         {indent}typeof exports === 'object' && typeof module !== 'undefined' ? {cjs_branch} :\n\
         {indent}typeof define === 'function' && define.amd ? {amd_branch} :\n\
         {indent}{global_branch};\n\
         }}(this, function ({}) {{ 'use strict';\n\n",
        params.join(", ")
    );

    (head, "\n\n}));".to_owned())
}
