//! Guards for destructive filesystem operations.
//!
//! Trash only relocates paths that live inside an explicit safe zone and
//! never touches a filesystem root.

use std::path::{Path, PathBuf};

/// Resolves `path` as far as the filesystem allows.
fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn is_filesystem_root(path: &Path) -> bool {
    path.parent().is_none()
}

/// Explains why `path` may not be moved, or returns `None` if it may.
///
/// With no safe roots configured only the root check applies.
pub fn rejection_reason(path: &Path, safe_roots: &[PathBuf]) -> Option<String> {
    let resolved = resolve(path);
    if is_filesystem_root(&resolved) {
        return Some(format!("'{}' is a filesystem root", resolved.display()));
    }
    if safe_roots.is_empty() {
        return None;
    }

    let inside = safe_roots.iter().any(|root| {
        let root = resolve(root);
        resolved != root && resolved.starts_with(&root)
    });
    if inside {
        None
    } else {
        Some(format!(
            "'{}' is outside the safe zones ({})",
            resolved.display(),
            safe_roots
                .iter()
                .map(|root| root.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}
