// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path normalization helpers
//!
//! All functions here are pure string manipulation. Paths produced by
//! [`resolve`] are canonical: `/`-rooted, without `.`/`..` segments and
//! without repeated or trailing slashes.

/// Resolve `path` against `cwd` into a canonical absolute path.
///
/// The literal `~` yields `home` unchanged. A leading `~/` is expanded
/// against `home` before normalizing. `..` at the root is a no-op.
pub fn resolve(path: &str, cwd: &str, home: &str) -> String {
    if path == "~" {
        return home.to_string();
    }

    let joined = if let Some(rest) = path.strip_prefix("~/") {
        format!("{}/{}", home, rest)
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", cwd, path)
    };

    normalize(&joined)
}

/// Collapse `.`, `..` and repeated slashes of an absolute path.
pub fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match segment {
            "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    format!("/{}", out.join("/"))
}

/// Non-empty segments of a canonical path; empty for `/`.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Last segment of the path, or `/` for the root.
pub fn basename(path: &str) -> String {
    segments(path)
        .last()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Canonical parent of the path. The parent of `/` is `/`.
pub fn parent_path(path: &str) -> String {
    let normalized = normalize(path);
    let mut parts = segments(&normalized);
    parts.pop();
    format!("/{}", parts.join("/"))
}

/// Append a single name to a canonical directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// True if `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return true;
    }
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}
