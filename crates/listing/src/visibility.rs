//! Hiding rules for directory entries.
//!
//! Four independent rule groups decide whether an entry is hidden: dotfiles,
//! sensitive files, operating system cruft and the application's own files.
//! Patterns are compiled once into a [`VisibilityFilter`].
//!
//! Pattern syntax:
//! - `name/` matches a directory called exactly `name` (case-sensitive).
//! - Anything else is a glob where `*` matches any run of characters; all
//!   other characters are literal and matching ignores case.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ListingError, Result};

/// Hiding rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HidingRules {
    /// Hide names starting with `.`.
    pub hide_dotfiles: bool,

    /// Hide names matching `sensitive_patterns`.
    pub hide_sensitive: bool,

    /// Hide names matching `os_patterns`.
    pub hide_os_files: bool,

    /// Hide names matching `app_patterns`.
    pub hide_app_files: bool,

    /// Credentials, keys, dumps and similar.
    pub sensitive_patterns: Vec<String>,

    /// Files the operating system scatters around.
    pub os_patterns: Vec<String>,

    /// Files belonging to the listing service itself.
    pub app_patterns: Vec<String>,
}

impl Default for HidingRules {
    fn default() -> Self {
        Self {
            hide_dotfiles: true,
            hide_sensitive: true,
            hide_os_files: true,
            hide_app_files: true,
            sensitive_patterns: strings(&[
                ".env",
                "*.env",
                ".htaccess",
                ".htpasswd",
                "*.pem",
                "*.key",
                "id_rsa*",
                "id_ed25519*",
                "*.sql",
                "*.sqlite",
                "*.bak",
                "*.swp",
                "*.log",
                "wp-config.php",
                "config.php",
                ".git/",
                ".svn/",
            ]),
            os_patterns: strings(&[
                ".DS_Store",
                "._*",
                "Thumbs.db",
                "ehthumbs.db",
                "desktop.ini",
                ".Spotlight-V100/",
                ".Trashes/",
                ".fseventsd/",
                "$RECYCLE.BIN/",
                "System Volume Information/",
                "lost+found/",
            ]),
            app_patterns: strings(&["lister.toml", "lister/", ".lister/"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// One compiled hiding pattern.
#[derive(Debug, Clone)]
enum Matcher {
    /// `name/`: a directory with exactly this name.
    Directory(String),
    /// A glob compiled to an anchored case-insensitive regex.
    Glob(Regex),
}

impl Matcher {
    fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(ListingError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        if let Some(dir) = pattern.strip_suffix('/') {
            if dir.is_empty() {
                return Err(ListingError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: "directory pattern has no name".to_string(),
                });
            }
            return Ok(Matcher::Directory(dir.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        RegexBuilder::new(&format!("^{}$", body))
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map(Matcher::Glob)
            .map_err(|e| ListingError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    fn matches(&self, name: &str, is_dir: bool) -> bool {
        match self {
            Matcher::Directory(dir) => is_dir && name == dir,
            Matcher::Glob(regex) => regex.is_match(name),
        }
    }
}

/// A named group of compiled patterns that can be switched off.
#[derive(Debug, Clone)]
struct PatternGroup {
    enabled: bool,
    matchers: Vec<Matcher>,
}

impl PatternGroup {
    fn compile(enabled: bool, patterns: &[String]) -> Result<Self> {
        let matchers = patterns
            .iter()
            .map(|p| Matcher::compile(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { enabled, matchers })
    }

    fn matches(&self, name: &str, is_dir: bool) -> bool {
        self.enabled && self.matchers.iter().any(|m| m.matches(name, is_dir))
    }
}

/// Which rule hid an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenBy {
    /// Name starts with `.`.
    Dotfile,
    /// Matched a sensitive pattern.
    Sensitive,
    /// Matched an operating system pattern.
    OsFile,
    /// Matched one of the service's own patterns.
    AppFile,
}

/// Precompiled hiding rules.
#[derive(Debug, Clone)]
pub struct VisibilityFilter {
    hide_dotfiles: bool,
    sensitive: PatternGroup,
    os_files: PatternGroup,
    app_files: PatternGroup,
}

impl VisibilityFilter {
    /// Compile the configured rules.
    pub fn new(rules: &HidingRules) -> Result<Self> {
        Ok(Self {
            hide_dotfiles: rules.hide_dotfiles,
            sensitive: PatternGroup::compile(rules.hide_sensitive, &rules.sensitive_patterns)?,
            os_files: PatternGroup::compile(rules.hide_os_files, &rules.os_patterns)?,
            app_files: PatternGroup::compile(rules.hide_app_files, &rules.app_patterns)?,
        })
    }

    /// A filter that hides nothing.
    pub fn show_all() -> Self {
        Self {
            hide_dotfiles: false,
            sensitive: PatternGroup { enabled: false, matchers: Vec::new() },
            os_files: PatternGroup { enabled: false, matchers: Vec::new() },
            app_files: PatternGroup { enabled: false, matchers: Vec::new() },
        }
    }

    /// Whether an entry with this name must be hidden.
    pub fn is_hidden(&self, name: &str, is_dir: bool) -> bool {
        self.hidden_by(name, is_dir).is_some()
    }

    /// The first rule that hides the entry, in evaluation order.
    pub fn hidden_by(&self, name: &str, is_dir: bool) -> Option<HiddenBy> {
        if self.hide_dotfiles && name.starts_with('.') {
            Some(HiddenBy::Dotfile)
        } else if self.sensitive.matches(name, is_dir) {
            Some(HiddenBy::Sensitive)
        } else if self.os_files.matches(name, is_dir) {
            Some(HiddenBy::OsFile)
        } else if self.app_files.matches(name, is_dir) {
            Some(HiddenBy::AppFile)
        } else {
            None
        }
    }
}
