//! The require/exports wrapper: `'use strict';` plus one `require` per
//! dependency. The exports object is ambient, so the body needs no factory.

use crate::emit::WrapContext;

pub fn wrap(context: &WrapContext) -> (String, String) {
    let mut head = String::from("'use strict';\n\n");

    let requires: Vec<String> = context
        .deps
        .iter()
        .map(|dep| {
            if dep.empty {
                format!("require('{}');", dep.path)
            } else {
                format!("var {} = require('{}');", dep.name, dep.path)
            }
        })
        .collect();
    if !requires.is_empty() {
        head.push_str(&requires.join("\n"));
        head.push_str("\n\n");
    }

    (head, String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::Dep;

    #[test]
    fn test_wrap_with_requires() {
        let deps = vec![
            Dep {
                path: "a".to_owned(),
                name: "a".to_owned(),
                empty: false,
            },
            Dep {
                path: "./side".to_owned(),
                name: "side".to_owned(),
                empty: true,
            },
        ];
        let context = WrapContext {
            deps: &deps,
            has_exports: true,
            returns_value: false,
            amd_name: None,
            umd_name: None,
            indent: "\t",
        };
        let (head, tail) = wrap(&context);
        assert!(head.starts_with("'use strict';\n\n"));
        assert!(head.contains("var a = require('a');"));
        assert!(head.contains("require('./side');"));
        assert!(tail.is_empty());
    }

    #[test]
    fn test_wrap_without_deps() {
        let context = WrapContext {
            deps: &[],
            has_exports: false,
            returns_value: true,
            amd_name: None,
            umd_name: None,
            indent: "\t",
        };
        let (head, _) = wrap(&context);
        assert_eq!(head, "'use strict';\n\n");
    }
}
