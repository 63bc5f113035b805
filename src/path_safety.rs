//! Path sanitization and confinement to the asset root.
//!
//! Deliberately does **not** percent-decode: the HTTP layer (`server.rs`)
//! hands this module already-decoded path segments, since decoding is a
//! property of the transport, not of path safety. See the module docs on
//! `sanitize` for the exact contract.

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PathSafetyError {
    #[error("path is empty")]
    Empty,
    #[error("path contains a NUL byte")]
    NulByte,
    #[error("path is absolute")]
    Absolute,
    #[error("path contains a parent-directory component")]
    ParentTraversal,
    #[error("path escapes the asset root")]
    Escape,
    #[error("io error resolving path: {0}")]
    Io(String),
}

/// Join `requested` onto `root` and confirm the result cannot escape `root`.
///
/// Rejection rules, checked in this order:
/// 1. empty input is rejected
/// 2. a NUL byte anywhere in the string is rejected
/// 3. an absolute path is rejected (the caller never gets to point
///    outside the tree by supplying a rooted path)
/// 4. a literal `..` component is rejected lexically, before any
///    filesystem access happens
///
/// After those checks, the path is joined onto `root`. The caller may be
/// asking about a file that doesn't exist yet (extension auto-detection
/// tries several candidate suffixes before any of them is known to
/// exist), so this does not require the full joined path to exist: only
/// the existing ancestor prefix is canonicalized (resolving any
/// symlinks along it), and the canonical result must still start with
/// the canonicalized `root` — this is what catches a symlink inside the
/// tree that points outside it. A component that doesn't exist cannot
/// itself be a symlink, so it's safe to append the non-existent tail
/// lexically once the existing prefix has been confined.
pub fn sanitize(root: &Path, requested: &str) -> Result<PathBuf, PathSafetyError> {
    if requested.is_empty() {
        return Err(PathSafetyError::Empty);
    }
    if requested.contains('\0') {
        return Err(PathSafetyError::NulByte);
    }

    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(PathSafetyError::Absolute);
    }

    let mut cleaned = PathBuf::new();
    for component in requested_path.components() {
        match component {
            Component::Normal(part) => cleaned.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(PathSafetyError::ParentTraversal),
            Component::RootDir | Component::Prefix(_) => return Err(PathSafetyError::Absolute),
        }
    }

    let canonical_root = fs::canonicalize(root).map_err(|e| PathSafetyError::Io(e.to_string()))?;
    let canonical = canonicalize_existing_prefix(&canonical_root, &cleaned)?;

    if !canonical.starts_with(&canonical_root) {
        return Err(PathSafetyError::Escape);
    }

    Ok(canonical)
}

/// Walk `relative`'s components onto `canonical_root`, canonicalizing
/// (and thereby resolving symlinks in) every component that exists on
/// disk; once a component is reached that doesn't exist, the remainder
/// is appended lexically without further filesystem access.
fn canonicalize_existing_prefix(
    canonical_root: &Path,
    relative: &Path,
) -> Result<PathBuf, PathSafetyError> {
    let mut current = canonical_root.to_path_buf();
    let mut components = relative.components().peekable();

    while let Some(component) = components.next() {
        let candidate = current.join(component);
        if fs::symlink_metadata(&candidate).is_err() {
            current.push(component);
            for rest in components {
                current.push(rest);
            }
            return Ok(current);
        }
        current = fs::canonicalize(&candidate).map_err(|e| PathSafetyError::Io(e.to_string()))?;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn root_with(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for f in files {
            let path = tmp.path().join(f);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, b"x").unwrap();
        }
        tmp
    }

    #[test]
    fn accepts_simple_relative_path() {
        let tmp = root_with(&["a/b.jpg"]);
        let result = sanitize(tmp.path(), "a/b.jpg").unwrap();
        assert!(result.ends_with("a/b.jpg"));
    }

    #[test]
    fn rejects_empty() {
        let tmp = root_with(&[]);
        assert_eq!(sanitize(tmp.path(), ""), Err(PathSafetyError::Empty));
    }

    #[test]
    fn rejects_nul_byte() {
        let tmp = root_with(&[]);
        assert_eq!(
            sanitize(tmp.path(), "a\0b"),
            Err(PathSafetyError::NulByte)
        );
    }

    #[test]
    fn rejects_absolute_path() {
        let tmp = root_with(&[]);
        assert_eq!(
            sanitize(tmp.path(), "/etc/passwd"),
            Err(PathSafetyError::Absolute)
        );
    }

    #[test]
    fn rejects_parent_traversal() {
        let tmp = root_with(&["a.jpg"]);
        assert_eq!(
            sanitize(tmp.path(), "../a.jpg"),
            Err(PathSafetyError::ParentTraversal)
        );
        assert_eq!(
            sanitize(tmp.path(), "sub/../../a.jpg"),
            Err(PathSafetyError::ParentTraversal)
        );
    }

    #[test]
    fn rejects_symlink_escape() {
        let tmp = root_with(&[]);
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        symlink(outside.path(), tmp.path().join("escape")).unwrap();

        let result = sanitize(tmp.path(), "escape/secret.txt");
        assert_eq!(result, Err(PathSafetyError::Escape));
    }

    #[test]
    fn collapses_current_dir_components() {
        let tmp = root_with(&["a.jpg"]);
        let result = sanitize(tmp.path(), "./a.jpg").unwrap();
        assert!(result.ends_with("a.jpg"));
    }

    #[test]
    fn accepts_a_path_that_does_not_exist_yet() {
        // Extension auto-detection needs to sanitize "profile" before
        // knowing whether "profile.jpg" exists on disk.
        let tmp = root_with(&[]);
        let result = sanitize(tmp.path(), "profile").unwrap();
        assert!(result.ends_with("profile"));
        assert!(!result.exists());
    }

    #[test]
    fn rejects_symlink_escape_even_for_a_nonexistent_child() {
        let tmp = root_with(&[]);
        let outside = TempDir::new().unwrap();
        symlink(outside.path(), tmp.path().join("escape")).unwrap();

        let result = sanitize(tmp.path(), "escape/not-there-yet.jpg");
        assert_eq!(result, Err(PathSafetyError::Escape));
    }
}
