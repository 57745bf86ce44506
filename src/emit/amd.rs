//! The define-style wrapper. The dependency array leads with `'exports'`
//! when the module surfaces named exports; bare side-effect dependencies
//! trail the array so factory parameters stay aligned.

use crate::emit::WrapContext;

pub fn wrap(context: &WrapContext) -> (String, String) {
    let mut paths: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();
    if context.has_exports {
        paths.push("'exports'".to_owned());
        params.push("exports".to_owned());
    }
    for dep in context.deps {
        paths.push(format!("'{}'", dep.path));
        if !dep.empty {
            params.push(dep.name.clone());
        }
    }

    let mut head = String::from("define(");
    if let Some(name) = context.amd_name {
        head.push_str(&format!("'{name}', "));
    }
    if !paths.is_empty() {
        head.push_str(&format!("[{}], ", paths.join(", ")));
    }
    head.push_str(&format!("function ({}) {{\n\n", params.join(", ")));
    head.push_str(&format!("{}'use strict';\n\n", context.indent));

    (head, "\n\n});".to_owned())
}
