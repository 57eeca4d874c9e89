//! Module specifier extraction.
//!
//! This is a lexical scan, not a parser: it finds `require`, `import` and
//! `export ... from` forms with string-literal specifiers and reduces each
//! specifier to the npm package that would satisfy it.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const SPECIFIER_PATTERNS: &[&str] = &[
    // require('x'), require.resolve('x')
    r#"\brequire(?:\.resolve)?\s*\(\s*['"]([^'"\r\n]+)['"]\s*\)"#,
    // import('x')
    r#"\bimport\s*\(\s*['"]([^'"\r\n]+)['"]\s*\)"#,
    // import x from 'x', import { a, b } from 'x', import * as x from 'x', import 'x'
    r#"\bimport\s+(?:[\w*${},\s]+?\s+from\s+)?['"]([^'"\r\n]+)['"]"#,
    // export * from 'x', export { a } from 'x'
    r#"\bexport\s+(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s+from\s+['"]([^'"\r\n]+)['"]"#,
];

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SPECIFIER_PATTERNS
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    log::error!("invalid specifier pattern {pattern}: {err}");
                    None
                }
            })
            .collect()
    })
}

/// Raw module specifiers in source order of discovery (may contain duplicates).
pub fn module_specifiers(source: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for regex in patterns() {
        for captures in regex.captures_iter(source) {
            if let Some(m) = captures.get(1) {
                out.push(m.as_str());
            }
        }
    }
    out
}

/// Package names imported by `source`, built-ins and relative paths excluded.
pub fn imported_packages(source: &str) -> BTreeSet<String> {
    module_specifiers(source)
        .into_iter()
        .filter_map(package_name)
        .collect()
}

/// Reduce a specifier to the package that provides it.
///
/// `lodash/fp` -> `lodash`, `@babel/core/lib/x` -> `@babel/core`.
/// Returns `None` for relative/absolute paths, URLs, protocol-prefixed
/// specifiers (`node:fs`) and Node built-ins.
pub fn package_name(specifier: &str) -> Option<String> {
    let spec = specifier.trim();
    if spec.is_empty()
        || spec.starts_with('.')
        || spec.starts_with('/')
        || spec.starts_with('#')
        || spec.starts_with('~')
        || spec.contains(':')
    {
        return None;
    }

    let mut parts = spec.split('/');
    let first = parts.next().filter(|s| !s.is_empty())?;
    let name = if first.starts_with('@') {
        let second = parts.next().filter(|s| !s.is_empty())?;
        format!("{first}/{second}")
    } else {
        first.to_string()
    };

    if is_builtin(&name) {
        return None;
    }
    Some(name)
}

pub fn is_builtin(name: &str) -> bool {
    NODE_BUILTINS.contains(&name)
}

const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];
