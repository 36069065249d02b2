//! # Lister engine
//!
//! Path resolution, visibility rules, entry classification and directory
//! scanning for the Lister directory listing service. This crate performs no
//! network IO; the `server` crate wraps it in HTTP.
//!
//! ## Overview
//!
//! ```text
//!  request path
//!       │
//!       ▼
//!  BaseDirectory::resolve ──► ResolvedPath (canonical, inside base)
//!       │
//!       ▼
//!  DirectoryLister::scan
//!       ├── VisibilityFilter   (dotfiles, sensitive / OS / app patterns)
//!       ├── EntryClassifier    (size, mtime, mode, category, MIME type)
//!       └── SortOrder          (stable, per partition)
//!       │
//!       ▼
//!  ScanResult { directories, files, current_path, parent_path }
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use listing::{BaseDirectory, CategoryTable, DirectoryLister, HidingRules, ScanConfig, SortOrder};
//!
//! fn main() -> Result<(), listing::ListingError> {
//!     let base = BaseDirectory::new("/srv/www")?;
//!     let config = ScanConfig::new(SortOrder::default(), &HidingRules::default(), CategoryTable::builtin())?;
//!     let lister = DirectoryLister::new(base, config);
//!
//!     let result = lister.scan_path("docs/")?;
//!     for dir in &result.directories {
//!         println!("{}/ -> {}", dir.name, dir.url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod error;
pub mod format;
pub mod resolver;
pub mod scanner;
pub mod url;
pub mod visibility;

pub use classify::{Category, CategoryTable, Entry, EntryClassifier};
pub use error::{ListingError, Result};
pub use resolver::{BaseDirectory, ResolvedPath, Target};
pub use scanner::{
    Breadcrumb, DirectoryLister, ScanConfig, ScanResult, SortDirection, SortField, SortOrder,
};
pub use url::{entry_url, API_SEGMENT};
pub use visibility::{HiddenBy, HidingRules, VisibilityFilter};
