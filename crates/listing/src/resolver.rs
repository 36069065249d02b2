//! Request path resolution with containment checks.
//!
//! Every path that reaches the scanner goes through [`BaseDirectory::resolve`]
//! (or [`BaseDirectory::locate`]). The raw request is stripped of traversal
//! sequences, percent-decoded, stripped again, joined onto the base directory
//! and canonicalized. The canonical result must lie inside the canonical base
//! directory, compared component by component.

use std::fs;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::error::{ListingError, Result};

/// Traversal sequences removed from request paths.
const TRAVERSAL_SEQUENCES: &[&str] = &["../", "..\\"];

/// Canonical root of everything the service may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDirectory {
    path: PathBuf,
}

/// A canonical path known to lie inside a [`BaseDirectory`].
///
/// Only the resolver and the scanner create these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ResolvedPath(PathBuf);

/// What a request path points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A directory inside the base.
    Directory(ResolvedPath),
    /// A regular file inside the base, with its containing directory.
    File {
        /// The file itself.
        path: ResolvedPath,
        /// The directory holding it.
        directory: ResolvedPath,
    },
}

impl Target {
    /// The directory a listing for this target should show.
    pub fn directory(&self) -> &ResolvedPath {
        match self {
            Target::Directory(dir) => dir,
            Target::File { directory, .. } => directory,
        }
    }

    /// Convert into the directory a listing for this target should show.
    pub fn into_directory(self) -> ResolvedPath {
        match self {
            Target::Directory(dir) => dir,
            Target::File { directory, .. } => directory,
        }
    }
}

impl ResolvedPath {
    /// Wrap a path the caller has already proven to be inside the base.
    pub(crate) fn new_unchecked(path: PathBuf) -> Self {
        Self(path)
    }

    /// Borrow the underlying path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Take the underlying path.
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl BaseDirectory {
    /// Canonicalize `path` and make it the listing root.
    ///
    /// Fails if the path does not exist or is not a directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical = fs::canonicalize(path).map_err(|e| ListingError::from_io(path, e))?;
        let metadata = fs::metadata(&canonical).map_err(|e| ListingError::from_io(path, e))?;
        if !metadata.is_dir() {
            return Err(ListingError::NotADirectory(canonical));
        }
        Ok(Self { path: canonical })
    }

    /// The canonical base path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The base directory as a resolved path.
    pub fn root(&self) -> ResolvedPath {
        ResolvedPath(self.path.clone())
    }

    /// Whether a canonical path lies inside (or equals) the base.
    ///
    /// `Path::starts_with` compares whole components, so `/srv/www-evil`
    /// is not inside `/srv/www`.
    pub fn contains(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.path)
    }

    /// Whether `path` is the base directory itself.
    pub fn is_root(&self, path: &Path) -> bool {
        path == self.path
    }

    /// Resolve a request path to the directory that should be listed.
    ///
    /// A regular file resolves to its containing directory; an empty request
    /// resolves to the base itself.
    pub fn resolve(&self, requested: &str) -> Result<ResolvedPath> {
        self.locate(requested).map(Target::into_directory)
    }

    /// Resolve a request path, keeping track of whether it named a file.
    pub fn locate(&self, requested: &str) -> Result<Target> {
        let candidate = self.candidate(requested);

        let canonical = fs::canonicalize(&candidate).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ListingError::PermissionDenied(candidate.clone())
            } else {
                ListingError::PathEscape(requested.to_string())
            }
        })?;

        if !self.contains(&canonical) {
            tracing::warn!(
                "Rejected request path {:?}: resolves to {:?} outside {:?}",
                requested,
                canonical,
                self.path
            );
            return Err(ListingError::PathEscape(requested.to_string()));
        }

        let metadata = fs::metadata(&canonical).map_err(|e| ListingError::from_io(&canonical, e))?;

        if metadata.is_dir() {
            return Ok(Target::Directory(ResolvedPath(canonical)));
        }

        if metadata.is_file() {
            // A file inside the base is never the base itself, so its
            // parent is still inside.
            let directory = canonical
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.path.clone());
            return Ok(Target::File {
                path: ResolvedPath(canonical),
                directory: ResolvedPath(directory),
            });
        }

        Err(ListingError::NotADirectory(canonical))
    }

    /// Build the not-yet-canonical filesystem path for a request.
    fn candidate(&self, requested: &str) -> PathBuf {
        let stripped = strip_traversal(requested);
        let decoded = percent_decode_str(&stripped).decode_utf8_lossy();
        let cleaned = strip_traversal(&decoded);

        // The expansion API hands back absolute paths it received earlier.
        let as_path = Path::new(&cleaned);
        if as_path.is_absolute() && as_path.starts_with(&self.path) {
            return as_path.to_path_buf();
        }

        let relative = cleaned.trim_start_matches(['/', '\\']);
        if relative.is_empty() {
            self.path.clone()
        } else {
            self.path.join(relative)
        }
    }
}

/// Remove `../` and `..\` sequences until none are left.
///
/// A single pass is not enough: removing `../` from `....//` leaves `../`.
pub fn strip_traversal(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = TRAVERSAL_SEQUENCES
            .iter()
            .fold(current.clone(), |acc, seq| acc.replace(seq, ""));
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_structure(dir: &Path) {
        fs::create_dir_all(dir.join("docs/nested")).unwrap();
        fs::create_dir_all(dir.join("my dir")).unwrap();
        fs::write(dir.join("docs/readme.txt"), "hello").unwrap();
        fs::write(dir.join("top.txt"), "top").unwrap();
    }

    fn setup() -> (TempDir, BaseDirectory) {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path().join("base");
        fs::create_dir_all(&base_path).unwrap();
        create_test_structure(&base_path);
        let base = BaseDirectory::new(&base_path).unwrap();
        (temp_dir, base)
    }

    #[test]
    fn test_strip_traversal_single_pass() {
        assert_eq!(strip_traversal("a/../b"), "a/b");
        assert_eq!(strip_traversal("..\\windows"), "windows");
    }

    #[test]
    fn test_strip_traversal_nested_sequences() {
        assert_eq!(strip_traversal("....//etc"), "etc");
        assert_eq!(strip_traversal(".../...//x"), "x");
    }

    #[test]
    fn test_empty_request_resolves_to_base() {
        let (_tmp, base) = setup();
        assert_eq!(base.resolve("").unwrap().as_path(), base.path());
        assert_eq!(base.resolve("/").unwrap().as_path(), base.path());
    }

    #[test]
    fn test_base_path_itself_resolves_to_base() {
        let (_tmp, base) = setup();
        let requested = base.path().to_string_lossy().to_string();
        assert_eq!(base.resolve(&requested).unwrap(), base.root());
    }

    #[test]
    fn test_resolve_subdirectory() {
        let (_tmp, base) = setup();
        let resolved = base.resolve("docs/nested").unwrap();
        assert_eq!(resolved.as_path(), base.path().join("docs/nested"));
    }

    #[test]
    fn test_resolve_percent_encoded_name() {
        let (_tmp, base) = setup();
        let resolved = base.resolve("/my%20dir").unwrap();
        assert_eq!(resolved.as_path(), base.path().join("my dir"));
    }

    #[test]
    fn test_resolve_absolute_path_inside_base() {
        let (_tmp, base) = setup();
        let requested = base.path().join("docs").to_string_lossy().to_string();
        let resolved = base.resolve(&requested).unwrap();
        assert_eq!(resolved.as_path(), base.path().join("docs"));
    }

    #[test]
    fn test_absolute_path_outside_base_is_treated_as_relative() {
        let (_tmp, base) = setup();
        let result = base.resolve("/etc/passwd");
        assert!(matches!(result, Err(ListingError::PathEscape(_))));
    }

    #[test]
    fn test_file_resolves_to_containing_directory() {
        let (_tmp, base) = setup();
        let resolved = base.resolve("docs/readme.txt").unwrap();
        assert_eq!(resolved.as_path(), base.path().join("docs"));

        let target = base.locate("docs/readme.txt").unwrap();
        match target {
            Target::File { path, directory } => {
                assert_eq!(path.as_path(), base.path().join("docs/readme.txt"));
                assert_eq!(directory.as_path(), base.path().join("docs"));
            }
            other => panic!("expected file target, got {:?}", other),
        }
    }

    #[test]
    fn test_traversal_example_is_rejected() {
        let (_tmp, base) = setup();
        let result = base.resolve("a/../../etc/passwd");
        assert!(matches!(result, Err(ListingError::PathEscape(_))));
    }

    #[test]
    fn test_bare_parent_reference_is_rejected() {
        let (_tmp, base) = setup();
        assert!(matches!(base.resolve(".."), Err(ListingError::PathEscape(_))));
        assert!(matches!(base.resolve("%2e%2e"), Err(ListingError::PathEscape(_))));
    }

    #[test]
    fn test_traversal_variants_never_escape() {
        let (tmp, base) = setup();
        // A sibling whose name shares the base's prefix.
        fs::create_dir_all(tmp.path().join("base-evil")).unwrap();
        fs::write(tmp.path().join("base-evil/secret.txt"), "x").unwrap();

        let attempts = [
            "../base-evil",
            "..%2fbase-evil",
            "%2e%2e/base-evil",
            "%2e%2e%2fbase-evil",
            "%252e%252e%252fbase-evil",
            "..%5cbase-evil",
            "....//base-evil",
            "docs/../../base-evil/secret.txt",
            "..",
            "%2e%2e",
            "docs/%2e%2e/%2e%2e",
        ];

        for attempt in attempts {
            match base.resolve(attempt) {
                Ok(resolved) => assert!(
                    base.contains(resolved.as_path()),
                    "{} escaped to {}",
                    attempt,
                    resolved
                ),
                Err(ListingError::PathEscape(_)) => {}
                Err(other) => panic!("unexpected error for {}: {:?}", attempt, other),
            }
        }
    }

    #[test]
    fn test_prefix_sibling_is_not_contained() {
        let (tmp, base) = setup();
        let evil = tmp.path().join("base-evil");
        fs::create_dir_all(&evil).unwrap();
        let evil = fs::canonicalize(evil).unwrap();
        assert!(!base.contains(&evil));
        assert!(base.contains(base.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_base_is_rejected() {
        let (tmp, base) = setup();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, base.path().join("escape")).unwrap();

        assert!(matches!(base.resolve("escape"), Err(ListingError::PathEscape(_))));
    }

    #[test]
    fn test_missing_path_is_path_escape() {
        let (_tmp, base) = setup();
        assert!(matches!(
            base.resolve("does/not/exist"),
            Err(ListingError::PathEscape(_))
        ));
    }

    #[test]
    fn test_base_directory_must_be_directory() {
        let (_tmp, base) = setup();
        let result = BaseDirectory::new(base.path().join("top.txt"));
        assert!(matches!(result, Err(ListingError::NotADirectory(_))));

        let result = BaseDirectory::new(base.path().join("missing"));
        assert!(matches!(result, Err(ListingError::NotFound(_))));
    }
}
