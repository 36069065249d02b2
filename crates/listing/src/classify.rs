//! Entry classification: categories, icons, labels and metadata.

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::format::{format_permissions, format_size, format_timestamp};

/// Content type used when nothing better is known.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Broad file category derived from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Code,
    Image,
    Video,
    Audio,
    Archive,
    Document,
    Text,
    Data,
    Font,
    Executable,
    Web,
    Presentation,
    Spreadsheet,
    Database,
    Cad,
    Ebook,
    Game,
    #[default]
    Unknown,
}

impl Category {
    /// Icon name used by the presentation layer.
    pub fn icon(&self) -> &'static str {
        match self {
            Category::Code => "code",
            Category::Image => "image",
            Category::Video => "video",
            Category::Audio => "audio",
            Category::Archive => "archive",
            Category::Document => "document",
            Category::Text => "text",
            Category::Data => "config",
            Category::Font => "font",
            Category::Executable => "exec",
            Category::Web => "web",
            Category::Presentation => "presentation",
            Category::Spreadsheet => "spreadsheet",
            Category::Database => "database",
            Category::Cad => "cad",
            Category::Ebook => "ebook",
            Category::Game => "game",
            Category::Unknown => "file",
        }
    }

    /// Display label for the category.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Code => "Source code",
            Category::Image => "Image",
            Category::Video => "Video",
            Category::Audio => "Audio",
            Category::Archive => "Archive",
            Category::Document => "Document",
            Category::Text => "Text",
            Category::Data => "Data",
            Category::Font => "Font",
            Category::Executable => "Executable",
            Category::Web => "Web page",
            Category::Presentation => "Presentation",
            Category::Spreadsheet => "Spreadsheet",
            Category::Database => "Database",
            Category::Cad => "CAD drawing",
            Category::Ebook => "E-book",
            Category::Game => "Game data",
            Category::Unknown => "Unknown",
        }
    }
}

/// Built-in extension table.
const BUILTIN_EXTENSIONS: &[(Category, &[&str])] = &[
    (
        Category::Code,
        &[
            "rs", "c", "h", "cpp", "hpp", "cc", "cs", "go", "java", "kt", "swift", "py", "rb",
            "php", "js", "mjs", "ts", "tsx", "jsx", "lua", "pl", "sh", "bash", "zsh", "ps1",
            "scala", "hs", "ex", "exs", "erl", "clj", "dart", "r", "sql", "vue", "svelte",
        ],
    ),
    (
        Category::Image,
        &[
            "jpg", "jpeg", "png", "gif", "svg", "webp", "bmp", "ico", "tif", "tiff", "heic",
            "avif", "psd", "raw",
        ],
    ),
    (
        Category::Video,
        &["mp4", "avi", "mov", "wmv", "mkv", "webm", "flv", "m4v", "mpg", "mpeg"],
    ),
    (
        Category::Audio,
        &["mp3", "wav", "ogg", "m4a", "flac", "aac", "wma", "opus", "mid", "midi"],
    ),
    (
        Category::Archive,
        &["zip", "rar", "7z", "tar", "gz", "tgz", "bz2", "xz", "zst", "lz4", "cab"],
    ),
    (
        Category::Document,
        &["pdf", "doc", "docx", "rtf", "odt", "pages", "tex"],
    ),
    (Category::Text, &["txt", "md", "markdown", "rst", "nfo", "log"]),
    (
        Category::Data,
        &["json", "xml", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "properties"],
    ),
    (Category::Font, &["ttf", "otf", "woff", "woff2", "eot"]),
    (
        Category::Executable,
        &["exe", "msi", "bin", "app", "dmg", "deb", "rpm", "apk", "appimage", "bat", "cmd", "com"],
    ),
    (Category::Web, &["html", "htm", "xhtml", "css", "scss", "sass", "less", "wasm"]),
    (Category::Presentation, &["ppt", "pptx", "odp", "key"]),
    (Category::Spreadsheet, &["xls", "xlsx", "csv", "tsv", "ods", "numbers"]),
    (
        Category::Database,
        &["db", "sqlite", "sqlite3", "mdb", "accdb", "dbf", "parquet"],
    ),
    (Category::Cad, &["dwg", "dxf", "stl", "step", "stp", "iges", "skp", "blend", "obj"]),
    (Category::Ebook, &["epub", "mobi", "azw", "azw3", "fb2", "djvu"]),
    (Category::Game, &["rom", "nes", "sfc", "gba", "nds", "iso", "sav", "pak", "wad"]),
];

/// Extension to category lookup, built once at startup.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    by_extension: HashMap<String, Category>,
}

impl CategoryTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        let mut by_extension = HashMap::new();
        for (category, extensions) in BUILTIN_EXTENSIONS {
            for ext in *extensions {
                by_extension.insert(ext.to_string(), *category);
            }
        }
        Self { by_extension }
    }

    /// The built-in table with configured overrides applied on top.
    pub fn with_overrides(overrides: &HashMap<String, Category>) -> Self {
        let mut table = Self::builtin();
        for (ext, category) in overrides {
            table
                .by_extension
                .insert(ext.trim_start_matches('.').to_lowercase(), *category);
        }
        table
    }

    /// Look up a lowercase extension; unknown or empty yields `Unknown`.
    pub fn category(&self, extension: &str) -> Category {
        self.by_extension
            .get(extension)
            .copied()
            .unwrap_or(Category::Unknown)
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// One visible child of a scanned directory.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    /// File name, no separators.
    pub name: String,
    /// Absolute path inside the base directory.
    pub path: PathBuf,
    /// Link relative to the site root.
    pub url: String,
    pub is_directory: bool,
    /// Size in bytes; `None` for directories.
    pub size: Option<u64>,
    pub size_formatted: String,
    /// Last modification, unix seconds.
    pub modified: i64,
    pub modified_formatted: String,
    /// Permission bits, `0o777` mask.
    pub mode: u32,
    pub permissions: String,
    /// Lowercase extension, empty when there is none.
    pub extension: String,
    pub category: Category,
    pub icon: &'static str,
    pub type_label: String,
    pub mime_type: Option<String>,
    /// Directory with no visible children.
    pub is_empty: bool,
}

/// Lowercased text after the last `.`, or empty.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) => name[idx + 1..].to_lowercase(),
        None => String::new(),
    }
}

/// Best-effort content type for a file name.
pub fn mime_type_of(name: &str) -> String {
    mime_guess::from_path(name)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

/// Human label for a file of the given extension and category.
pub fn type_label(extension: &str, category: Category) -> String {
    match (extension.is_empty(), category) {
        (true, _) => "File".to_string(),
        (false, Category::Unknown) => format!("{} file", extension.to_uppercase()),
        (false, known) => known.label().to_string(),
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Builds [`Entry`] values from filesystem metadata.
#[derive(Debug, Clone, Default)]
pub struct EntryClassifier {
    table: CategoryTable,
}

impl EntryClassifier {
    pub fn new(table: CategoryTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    /// Classify one entry.
    ///
    /// `is_empty` is only meaningful for directories and is computed by the
    /// scanner before the entry is built.
    pub fn classify(
        &self,
        name: &str,
        path: PathBuf,
        metadata: &Metadata,
        url: String,
        is_empty: bool,
    ) -> Entry {
        let is_directory = metadata.is_dir();
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let mode = permission_bits(metadata);

        let (size, size_formatted, extension, category, icon, type_label, mime_type) =
            if is_directory {
                (
                    None,
                    "-".to_string(),
                    String::new(),
                    Category::Unknown,
                    "folder",
                    "Folder".to_string(),
                    None,
                )
            } else {
                let extension = extension_of(name);
                let category = self.table.category(&extension);
                (
                    Some(metadata.len()),
                    format_size(metadata.len()),
                    extension.clone(),
                    category,
                    category.icon(),
                    type_label(&extension, category),
                    Some(mime_type_of(name)),
                )
            };

        Entry {
            name: name.to_string(),
            path,
            url,
            is_directory,
            size,
            size_formatted,
            modified,
            modified_formatted: format_timestamp(modified),
            mode,
            permissions: format_permissions(mode),
            extension,
            category,
            icon,
            type_label,
            mime_type,
            is_empty: is_directory && is_empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.JPG"), "jpg");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of(".bashrc"), "bashrc");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn test_builtin_categories() {
        let table = CategoryTable::builtin();
        assert_eq!(table.category("rs"), Category::Code);
        assert_eq!(table.category("png"), Category::Image);
        assert_eq!(table.category("xlsx"), Category::Spreadsheet);
        assert_eq!(table.category("epub"), Category::Ebook);
        assert_eq!(table.category("qqq"), Category::Unknown);
        assert_eq!(table.category(""), Category::Unknown);
    }

    #[test]
    fn test_overrides_replace_builtin() {
        let mut overrides = HashMap::new();
        overrides.insert(".LOG".to_string(), Category::Data);
        overrides.insert("qqq".to_string(), Category::Game);
        let table = CategoryTable::with_overrides(&overrides);
        assert_eq!(table.category("log"), Category::Data);
        assert_eq!(table.category("qqq"), Category::Game);
        assert_eq!(table.category("rs"), Category::Code);
    }

    #[test]
    fn test_type_label_fallbacks() {
        assert_eq!(type_label("", Category::Unknown), "File");
        assert_eq!(type_label("qqq", Category::Unknown), "QQQ file");
        assert_eq!(type_label("png", Category::Image), "Image");
    }

    #[test]
    fn test_unknown_category_uses_file_icon() {
        assert_eq!(Category::Unknown.icon(), "file");
        assert_eq!(Category::Unknown.label(), "Unknown");
    }

    #[test]
    fn test_mime_type_fallback() {
        assert_eq!(mime_type_of("index.html"), "text/html");
        assert_eq!(mime_type_of("mystery.zzzz"), DEFAULT_MIME_TYPE);
        assert_eq!(mime_type_of("noext"), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_category_serde_lowercase() {
        let json = serde_json::to_string(&Category::Spreadsheet).unwrap();
        assert_eq!(json, "\"spreadsheet\"");
        let parsed: Category = serde_json::from_str("\"cad\"").unwrap();
        assert_eq!(parsed, Category::Cad);
    }

    #[test]
    fn test_classify_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        fs::write(&path, "Hello").unwrap();
        let metadata = fs::metadata(&path).unwrap();

        let classifier = EntryClassifier::default();
        let entry = classifier.classify("notes.txt", path.clone(), &metadata, "/notes.txt".into(), true);

        assert_eq!(entry.name, "notes.txt");
        assert_eq!(entry.path, path);
        assert!(!entry.is_directory);
        assert_eq!(entry.size, Some(5));
        assert_eq!(entry.size_formatted, "5 B");
        assert_eq!(entry.extension, "txt");
        assert_eq!(entry.category, Category::Text);
        assert_eq!(entry.icon, "text");
        assert_eq!(entry.type_label, "Text");
        assert_eq!(entry.mime_type.as_deref(), Some("text/plain"));
        assert!(!entry.is_empty);
        assert!(entry.modified > 0);
        assert_eq!(entry.permissions.len(), 9);
    }

    #[test]
    fn test_classify_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photos.d");
        fs::create_dir(&path).unwrap();
        let metadata = fs::metadata(&path).unwrap();

        let classifier = EntryClassifier::default();
        let entry = classifier.classify("photos.d", path, &metadata, "/photos.d".into(), true);

        assert!(entry.is_directory);
        assert_eq!(entry.size, None);
        assert_eq!(entry.size_formatted, "-");
        assert_eq!(entry.extension, "");
        assert_eq!(entry.icon, "folder");
        assert_eq!(entry.type_label, "Folder");
        assert!(entry.mime_type.is_none());
        assert!(entry.is_empty);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.sh");
        fs::write(&path, "#!/bin/sh").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o750)).unwrap();
        let metadata = fs::metadata(&path).unwrap();

        let entry = EntryClassifier::default().classify("run.sh", path, &metadata, "/run.sh".into(), false);
        assert_eq!(entry.mode, 0o750);
        assert_eq!(entry.permissions, "rwxr-x---");
    }
}
