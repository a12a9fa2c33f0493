//! Workspace-relative path resolution.
//!
//! Wire paths arrive as `/`-rooted strings and may contain `..` segments.
//! Resolution is purely lexical: `..` is clamped at the logical root before
//! joining, so non-existent paths still resolve safely and no filesystem
//! call is ever made on an unchecked path.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// A wire path that cannot be resolved inside the workspace.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path escapes workspace root: {0}")]
    EscapesRoot(String),

    #[error("path contains NUL: {0:?}")]
    EmbeddedNul(String),
}

/// Lexically clean a wire path against a logical `/` root.
///
/// Collapses `.` and duplicate separators and pops `..` segments, clamping
/// at the root: `../../etc/passwd` cleans to `/etc/passwd`.
pub fn lexical_clean(path: &str) -> PathBuf {
    let mut cleaned = PathBuf::from("/");
    for component in Path::new("/").join(path).components() {
        match component {
            Component::Normal(part) => cleaned.push(part),
            Component::ParentDir => {
                cleaned.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    cleaned
}

/// Maps workspace-relative wire paths to absolute host paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// The root must already be absolute; the host orchestrator
    /// canonicalizes it once at startup.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a wire path to an absolute path under the workspace root.
    pub fn resolve(&self, wire_path: &str) -> Result<PathBuf, PathError> {
        if wire_path.bytes().any(|b| b == 0) {
            return Err(PathError::EmbeddedNul(wire_path.to_string()));
        }

        let cleaned = lexical_clean(wire_path);
        let relative = cleaned.strip_prefix("/").unwrap_or(&cleaned);
        let abs = self.root.join(relative);

        // Component-wise prefix check closes the sibling-confusion hole
        // where root /tmp/app would otherwise match /tmp/app-secrets.
        if abs != self.root && !abs.starts_with(&self.root) {
            return Err(PathError::EscapesRoot(wire_path.to_string()));
        }

        Ok(abs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_dot_and_duplicate_separators() {
        assert_eq!(lexical_clean("a//b/./c"), PathBuf::from("/a/b/c"));
        assert_eq!(lexical_clean("/"), PathBuf::from("/"));
        assert_eq!(lexical_clean(""), PathBuf::from("/"));
    }

    #[test]
    fn clean_clamps_parent_at_root() {
        assert_eq!(lexical_clean("../../etc/passwd"), PathBuf::from("/etc/passwd"));
        assert_eq!(lexical_clean("a/../../b"), PathBuf::from("/b"));
        assert_eq!(lexical_clean(".."), PathBuf::from("/"));
    }

    #[test]
    fn resolve_root() {
        let r = PathResolver::new("/tmp/ws");
        assert_eq!(r.resolve("/").unwrap(), PathBuf::from("/tmp/ws"));
    }

    #[test]
    fn resolve_traversal_is_neutralized() {
        let r = PathResolver::new("/tmp/ws");
        // Cleans to /etc/passwd and joins safely under the root.
        assert_eq!(
            r.resolve("../../etc/passwd").unwrap(),
            PathBuf::from("/tmp/ws/etc/passwd")
        );
    }

    #[test]
    fn resolve_sibling_prefix_stays_inside_root() {
        let r = PathResolver::new("/tmp/app");
        // Must not resolve to the sibling /tmp/app-secrets.
        assert_eq!(
            r.resolve("../app-secrets/key.pem").unwrap(),
            PathBuf::from("/tmp/app/app-secrets/key.pem")
        );
    }

    #[test]
    fn resolve_rejects_embedded_nul() {
        let r = PathResolver::new("/tmp/ws");
        assert!(matches!(
            r.resolve("a\0b"),
            Err(PathError::EmbeddedNul(_))
        ));
    }

    #[test]
    fn resolved_paths_stay_under_root() {
        let r = PathResolver::new("/tmp/ws");
        for p in ["x", "/x/y", "../x", "a/../../..", "....//x", "./."] {
            let abs = r.resolve(p).unwrap();
            assert!(
                abs == Path::new("/tmp/ws") || abs.starts_with("/tmp/ws"),
                "{p:?} resolved outside the root: {abs:?}"
            );
        }
    }
}
