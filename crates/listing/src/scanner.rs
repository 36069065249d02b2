//! Directory scanning.
//!
//! [`DirectoryLister`] ties the pieces together: it owns the base directory,
//! the compiled hiding rules, the category table and the sort order, and
//! produces [`ScanResult`]s and breadcrumb trails for resolved paths.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::{CategoryTable, Entry, EntryClassifier};
use crate::error::{ListingError, Result};
use crate::resolver::{BaseDirectory, ResolvedPath, Target};
use crate::url::entry_url;
use crate::visibility::{HidingRules, VisibilityFilter};

/// Field entries are sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    /// Case-insensitive name.
    #[default]
    Name,
    /// Size in bytes; directories count as zero.
    Size,
    /// Modification time.
    Modified,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Display settings consumed by the scanner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SortOrder {
    /// Sort key for both partitions.
    pub sort_by: SortField,
    /// Ascending or descending.
    pub sort_direction: SortDirection,
}

impl SortOrder {
    /// Compare two entries under this order.
    ///
    /// Descending flips the comparison rather than the list, so equal keys
    /// stay in enumeration order either way.
    pub fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        let ordering = match self.sort_by {
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Size => a.size.unwrap_or(0).cmp(&b.size.unwrap_or(0)),
            SortField::Modified => a.modified.cmp(&b.modified),
        };
        match self.sort_direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    /// Stable in-place sort.
    pub fn sort(&self, entries: &mut [Entry]) {
        entries.sort_by(|a, b| self.compare(a, b));
    }
}

/// Everything the scanner needs besides the base directory.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub order: SortOrder,
    pub filter: VisibilityFilter,
    pub categories: CategoryTable,
}

impl ScanConfig {
    /// Compile hiding rules and assemble a scan configuration.
    pub fn new(order: SortOrder, rules: &HidingRules, categories: CategoryTable) -> Result<Self> {
        Ok(Self {
            order,
            filter: VisibilityFilter::new(rules)?,
            categories,
        })
    }
}

/// The visible contents of one directory.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// Visible subdirectories, sorted.
    pub directories: Vec<Entry>,
    /// Visible non-directories, sorted.
    pub files: Vec<Entry>,
    /// The directory that was scanned.
    pub current_path: ResolvedPath,
    /// `None` when `current_path` is the base directory.
    pub parent_path: Option<ResolvedPath>,
}

/// One step of the breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    /// Display label; [`HOME_LABEL`] for the base.
    pub name: String,
    /// Canonical directory path.
    pub path: PathBuf,
    /// Browse URL of the directory.
    pub url: String,
}

/// Label of the breadcrumb bound to the base directory.
pub const HOME_LABEL: &str = "Home";

/// Scans directories below a fixed base.
#[derive(Debug, Clone)]
pub struct DirectoryLister {
    base: BaseDirectory,
    order: SortOrder,
    filter: VisibilityFilter,
    classifier: EntryClassifier,
}

impl DirectoryLister {
    pub fn new(base: BaseDirectory, config: ScanConfig) -> Self {
        Self {
            base,
            order: config.order,
            filter: config.filter,
            classifier: EntryClassifier::new(config.categories),
        }
    }

    pub fn base(&self) -> &BaseDirectory {
        &self.base
    }

    pub fn filter(&self) -> &VisibilityFilter {
        &self.filter
    }

    /// Resolve a request path to a directory; see [`BaseDirectory::resolve`].
    pub fn resolve(&self, requested: &str) -> Result<ResolvedPath> {
        self.base.resolve(requested)
    }

    /// Resolve a request path keeping file targets; see [`BaseDirectory::locate`].
    pub fn locate(&self, requested: &str) -> Result<Target> {
        self.base.locate(requested)
    }

    /// Whether any component of `path` below the base is hidden.
    ///
    /// Used before serving a file directly: a visible name inside a hidden
    /// directory must stay unreachable.
    pub fn is_path_hidden(&self, path: &Path) -> bool {
        let relative = match path.strip_prefix(self.base.path()) {
            Ok(rel) => rel,
            Err(_) => return true,
        };

        let mut current = self.base.path().to_path_buf();
        for component in relative.components() {
            current.push(component);
            let name = component.as_os_str().to_string_lossy();
            if self.filter.is_hidden(&name, current.is_dir()) {
                return true;
            }
        }
        false
    }

    /// List the visible children of `target`.
    pub fn scan(&self, target: &ResolvedPath) -> Result<ScanResult> {
        let dir = target.as_path();
        let metadata = fs::metadata(dir).map_err(|e| ListingError::from_io(dir, e))?;
        if !metadata.is_dir() {
            return Err(ListingError::NotADirectory(dir.to_path_buf()));
        }

        let read_dir = fs::read_dir(dir).map_err(|e| ListingError::from_io(dir, e))?;

        let mut directories = Vec::new();
        let mut files = Vec::new();

        for entry_result in read_dir {
            let entry = match entry_result {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry in {:?}: {}", dir, e);
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if self.escapes_base(&entry) {
                tracing::debug!("Skipping {:?}: link target outside the base", path);
                continue;
            }

            // Follows symlinks; dangling links have no metadata and are skipped.
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };
            let is_dir = metadata.is_dir();

            if self.filter.is_hidden(&name, is_dir) {
                continue;
            }

            let is_empty = is_dir && self.is_empty_directory(&path);
            let url = entry_url(self.base.path(), &path);
            let item = self.classifier.classify(&name, path, &metadata, url, is_empty);

            if is_dir {
                directories.push(item);
            } else {
                files.push(item);
            }
        }

        self.order.sort(&mut directories);
        self.order.sort(&mut files);

        tracing::debug!(
            "Scanned {:?}: {} directories, {} files",
            dir,
            directories.len(),
            files.len()
        );

        Ok(ScanResult {
            directories,
            files,
            current_path: target.clone(),
            parent_path: self.parent_of(target),
        })
    }

    /// Resolve and scan in one step.
    pub fn scan_path(&self, requested: &str) -> Result<ScanResult> {
        let target = self.resolve(requested)?;
        self.scan(&target)
    }

    /// Parent directory, or `None` at the base.
    pub fn parent_of(&self, target: &ResolvedPath) -> Option<ResolvedPath> {
        if self.base.is_root(target.as_path()) {
            return None;
        }
        target
            .as_path()
            .parent()
            .filter(|p| self.base.contains(p))
            .map(|p| ResolvedPath::new_unchecked(p.to_path_buf()))
    }

    /// Root-first trail from the base directory to `target`.
    pub fn breadcrumbs(&self, target: &ResolvedPath) -> Vec<Breadcrumb> {
        let base = self.base.path();
        let mut trail = Vec::new();
        let mut current = target.as_path();

        while current != base && self.base.contains(current) {
            let name = current
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            trail.push(Breadcrumb {
                name,
                path: current.to_path_buf(),
                url: entry_url(base, current),
            });
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        trail.push(Breadcrumb {
            name: HOME_LABEL.to_string(),
            path: base.to_path_buf(),
            url: "/".to_string(),
        });
        trail.reverse();
        trail
    }

    /// A directory is empty for display when none of its immediate children
    /// are visible. Unreadable directories count as non-empty so the user
    /// can open them and see the real error.
    fn is_empty_directory(&self, path: &Path) -> bool {
        let read_dir = match fs::read_dir(path) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Cannot check emptiness of {:?}: {}", path, e);
                return false;
            }
        };

        !read_dir.filter_map(|e| e.ok()).any(|child| {
            if self.escapes_base(&child) {
                return false;
            }
            let name = child.file_name().to_string_lossy().into_owned();
            let is_dir = child.file_type().map(|t| t.is_dir()).unwrap_or(false)
                || child.path().is_dir();
            !self.filter.is_hidden(&name, is_dir)
        })
    }

    /// Whether `entry` is a symlink whose target lies outside the base.
    /// Dangling links count as escaping.
    fn escapes_base(&self, entry: &fs::DirEntry) -> bool {
        let is_link = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
        if !is_link {
            return false;
        }
        match fs::canonicalize(entry.path()) {
            Ok(target) => !self.base.contains(&target),
            Err(_) => true,
        }
    }
}
