use crate::error::{InspectError, Result};
use crate::util::parse_date;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "c", "cc", "cif", "cpp", "glsl", "h", "hh", "hpp", "java", "js", "py", "rb", "sql", "ts",
];

/// How lines excluded by author filters, comment or empty-line rules show up
/// in blame output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlameExclusions {
    /// Keep the line, drop its attribution.
    #[default]
    Hide,
    /// Keep the line with its real author.
    Show,
    /// Drop the line.
    Remove,
}

impl FromStr for BlameExclusions {
    type Err = InspectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hide" => Ok(Self::Hide),
            "show" => Ok(Self::Show),
            "remove" => Ok(Self::Remove),
            other => Err(InspectError::Config(format!(
                "unknown blame exclusion mode '{other}' (expected hide, show or remove)"
            ))),
        }
    }
}

/// Copy/move detection aggressiveness, 0 to 4.
///
/// * 0: none, whoever moves lines becomes their author
/// * 1: moves and copies within the same file
/// * 2: also files changed in the same commit
/// * 3: also files of the commit that created the file
/// * 4: all commits; expensive, never a default
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CopyMoveLevel(u8);

impl CopyMoveLevel {
    pub const MAX: u8 = 4;

    pub fn new(level: u8) -> Result<Self> {
        if level > Self::MAX {
            return Err(InspectError::Config(format!(
                "copy-move level must be between 0 and {}, got {level}",
                Self::MAX
            )));
        }
        Ok(Self(level))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn blame_args(self) -> &'static [&'static str] {
        match self.0 {
            0 => &[],
            1 => &["-M"],
            2 => &["-C"],
            3 => &["-C", "-C"],
            _ => &["-C", "-C", "-C"],
        }
    }
}

impl Default for CopyMoveLevel {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for CopyMoveLevel {
    type Error = InspectError;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl From<CopyMoveLevel> for u8 {
    fn from(level: CopyMoveLevel) -> Self {
        level.0
    }
}

impl FromStr for CopyMoveLevel {
    type Err = InspectError;

    fn from_str(s: &str) -> Result<Self> {
        let level = s
            .trim()
            .parse::<u8>()
            .map_err(|_| InspectError::Config(format!("invalid copy-move level '{s}'")))?;
        Self::new(level)
    }
}

impl fmt::Display for CopyMoveLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// When two (name, email) pairs are considered the same person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityPolicy {
    /// Same name or same email, case-insensitive.
    #[default]
    Loose,
    /// Same email, or same name when the email domains also match.
    EmailDomain,
}

impl FromStr for IdentityPolicy {
    type Err = InspectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "loose" => Ok(Self::Loose),
            "email-domain" => Ok(Self::EmailDomain),
            other => Err(InspectError::Config(format!(
                "unknown identity policy '{other}' (expected loose or email-domain)"
            ))),
        }
    }
}

/// Fully resolved analysis configuration, threaded explicitly through every
/// component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub input_paths: Vec<PathBuf>,
    pub search_depth: usize,
    pub subfolder: String,
    pub n_files: usize,
    pub extensions: Vec<String>,
    /// Allow-list of path patterns, matched below `subfolder`. Empty selects all.
    pub include_files: Vec<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub ex_authors: Vec<String>,
    pub ex_emails: Vec<String>,
    pub ex_files: Vec<String>,
    pub ex_messages: Vec<String>,
    pub ex_revisions: Vec<String>,
    pub copy_move_level: CopyMoveLevel,
    pub blame_exclusions: BlameExclusions,
    pub include_comments: bool,
    pub include_empty_lines: bool,
    pub include_whitespace: bool,
    pub show_renames: bool,
    pub include_merges: bool,
    pub rename_threshold: u8,
    pub identity_policy: IdentityPolicy,
    pub blame_history: bool,
    /// History statistics only: no blame, so no line counts.
    pub blame_skip: bool,
    pub ignore_revs_file: Option<PathBuf>,
    pub multithread: bool,
    pub max_workers: usize,
    pub git_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_paths: Vec::new(),
            search_depth: 5,
            subfolder: String::new(),
            n_files: 0,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_files: Vec::new(),
            since: None,
            until: None,
            ex_authors: Vec::new(),
            ex_emails: Vec::new(),
            ex_files: Vec::new(),
            ex_messages: Vec::new(),
            ex_revisions: Vec::new(),
            copy_move_level: CopyMoveLevel::default(),
            blame_exclusions: BlameExclusions::default(),
            include_comments: false,
            include_empty_lines: false,
            include_whitespace: false,
            show_renames: false,
            include_merges: true,
            rename_threshold: 50,
            identity_policy: IdentityPolicy::default(),
            blame_history: false,
            blame_skip: false,
            ignore_revs_file: None,
            multithread: true,
            max_workers: 6,
            git_timeout_secs: 120,
        }
    }
}

impl Settings {
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn workers(&self) -> usize {
        if self.multithread {
            self.max_workers.max(1)
        } else {
            1
        }
    }

    /// Check everything that can be checked without touching git and compile
    /// the exclusion patterns.
    pub fn validate(&self) -> Result<Filters> {
        if self.rename_threshold > 100 {
            return Err(InspectError::Config(format!(
                "rename threshold must be a percentage, got {}",
                self.rename_threshold
            )));
        }
        if self.multithread && self.max_workers == 0 {
            return Err(InspectError::Config("max_workers must be at least 1".to_string()));
        }
        if self.git_timeout_secs == 0 {
            return Err(InspectError::Config("git timeout must be positive".to_string()));
        }
        for path in &self.input_paths {
            if !path.exists() {
                return Err(InspectError::Config(format!(
                    "input path does not exist: {}",
                    path.display()
                )));
            }
        }
        if let Some(file) = &self.ignore_revs_file {
            if !file.is_file() {
                return Err(InspectError::Config(format!(
                    "ignore-revs file does not exist: {}",
                    file.display()
                )));
            }
        }
        // Revisions can only be checked against a repository; plain dates are checked here.
        let since = self.since.as_deref().and_then(parse_date);
        let until = self.until.as_deref().and_then(parse_date);
        if let (Some(s), Some(u)) = (since, until) {
            if s > u {
                return Err(InspectError::InvalidDate(format!(
                    "Invalid range: since ({s}) is after until ({u})"
                )));
            }
        }
        Filters::new(self)
    }
}

/// Compiled exclusion and selection rules.
#[derive(Debug, Clone)]
pub struct Filters {
    ex_authors: GlobSet,
    ex_emails: GlobSet,
    ex_files: GlobSet,
    ex_messages: GlobSet,
    ex_revisions: Vec<String>,
    extensions: Option<HashSet<String>>,
    include_files: Option<GlobSet>,
    subfolder: String,
}

impl Filters {
    pub fn new(settings: &Settings) -> Result<Self> {
        let extensions = if settings.extensions.is_empty()
            || settings.extensions.iter().any(|e| e == "*")
        {
            None
        } else {
            Some(
                settings
                    .extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                    .collect(),
            )
        };

        let subfolder = settings.subfolder.trim_matches('/').to_string();
        let include_files = if settings.include_files.is_empty() {
            None
        } else {
            let patterns: Vec<String> = settings
                .include_files
                .iter()
                .map(|p| {
                    let p = p.trim_start_matches('/');
                    if subfolder.is_empty() {
                        p.to_string()
                    } else {
                        format!("{subfolder}/{p}")
                    }
                })
                .collect();
            Some(build_globset(&patterns)?)
        };

        Ok(Self {
            ex_authors: build_globset(&settings.ex_authors)?,
            ex_emails: build_globset(&settings.ex_emails)?,
            ex_files: build_globset(&settings.ex_files)?,
            ex_messages: build_globset(&settings.ex_messages)?,
            ex_revisions: settings
                .ex_revisions
                .iter()
                .map(|r| r.trim().to_ascii_lowercase())
                .filter(|r| !r.is_empty())
                .collect(),
            extensions,
            include_files,
            subfolder,
        })
    }

    pub fn author_excluded(&self, name: &str) -> bool {
        !name.is_empty() && self.ex_authors.is_match(name)
    }

    pub fn email_excluded(&self, email: &str) -> bool {
        !email.is_empty() && self.ex_emails.is_match(email)
    }

    pub fn message_excluded(&self, message: &str) -> bool {
        self.ex_messages.is_match(message)
    }

    pub fn revision_excluded(&self, sha: &str) -> bool {
        let sha = sha.to_ascii_lowercase();
        self.ex_revisions.iter().any(|rev| sha.starts_with(rev.as_str()))
    }

    /// Subfolder, extension and `include_files` allow-lists, then `ex_files`,
    /// applied to a tracked path.
    pub fn file_selected(&self, path: &str) -> bool {
        if !self.subfolder.is_empty() && !path.starts_with(&format!("{}/", self.subfolder)) {
            return false;
        }
        if let Some(allowed) = &self.extensions {
            let ext = Path::new(path)
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s.to_ascii_lowercase())
                .unwrap_or_default();
            if !allowed.contains(&ext) {
                return false;
            }
        }
        if let Some(included) = &self.include_files {
            if !included.is_match(path) {
                return false;
            }
        }
        !self.ex_files.is_match(path)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| InspectError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| InspectError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.copy_move_level.level(), 1);
        assert_eq!(settings.blame_exclusions, BlameExclusions::Hide);
        assert_eq!(settings.n_files, 0);
        assert!(settings.include_merges);
        assert!(!settings.include_comments);
        assert_eq!(settings.workers(), 6);
    }

    #[test]
    fn copy_move_level_rejects_five() {
        assert!(CopyMoveLevel::new(5).is_err());
        assert_eq!(CopyMoveLevel::new(3).unwrap().blame_args(), &["-C", "-C"]);
        assert!(CopyMoveLevel::new(0).unwrap().blame_args().is_empty());
    }

    #[test]
    fn copy_move_level_deserializes_with_bounds() {
        let ok: Settings = serde_json::from_str(r#"{"copy_move_level": 2}"#).unwrap();
        assert_eq!(ok.copy_move_level.level(), 2);
        assert!(serde_json::from_str::<Settings>(r#"{"copy_move_level": 7}"#).is_err());
    }

    #[test]
    fn exclusion_mode_parses_case_insensitively() {
        assert_eq!("REMOVE".parse::<BlameExclusions>().unwrap(), BlameExclusions::Remove);
        assert!("blank".parse::<BlameExclusions>().is_err());
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let settings = Settings {
            ex_authors: vec!["[unclosed".to_string()],
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn missing_input_path_is_a_config_error() {
        let settings = Settings {
            input_paths: vec![PathBuf::from("/definitely/not/here/at/all")],
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(InspectError::Config(_))));
    }

    #[test]
    fn since_after_until_is_rejected() {
        let settings = Settings {
            since: Some("2024-05-01".to_string()),
            until: Some("2024-01-01".to_string()),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(InspectError::InvalidDate(_))));
    }

    #[test]
    fn filters_match_case_insensitively() {
        let settings = Settings {
            ex_authors: vec!["*bot*".to_string()],
            ex_files: vec!["vendor/*".to_string()],
            ex_revisions: vec!["ABC12".to_string()],
            ..Settings::default()
        };
        let filters = settings.validate().unwrap();
        assert!(filters.author_excluded("Dependa-BOT"));
        assert!(!filters.author_excluded("Alice"));
        assert!(filters.revision_excluded("abc1234567"));
        assert!(!filters.file_selected("vendor/lib.py"));
        assert!(filters.file_selected("src/lib.py"));
        assert!(!filters.file_selected("README.md"));
    }

    #[test]
    fn star_extension_selects_everything() {
        let settings = Settings {
            extensions: vec!["*".to_string()],
            subfolder: "docs/".to_string(),
            ..Settings::default()
        };
        let filters = settings.validate().unwrap();
        assert!(filters.file_selected("docs/README"));
        assert!(!filters.file_selected("src/main.rs"));
    }

    #[test]
    fn include_files_are_matched_below_the_subfolder() {
        let settings = Settings {
            extensions: vec!["*".to_string()],
            subfolder: "app".to_string(),
            include_files: vec!["*.PY".to_string(), "docs/*".to_string()],
            ..Settings::default()
        };
        let filters = settings.validate().unwrap();
        assert!(filters.file_selected("app/main.py"));
        assert!(filters.file_selected("app/core/deep/util.py"));
        assert!(filters.file_selected("app/docs/readme"));
        assert!(!filters.file_selected("app/build.rs"));
        assert!(!filters.file_selected("docs/readme"));
        assert!(!filters.file_selected("lib/main.py"));
    }

    #[test]
    fn include_files_without_subfolder() {
        let settings = Settings {
            include_files: vec!["src/*".to_string()],
            ex_files: vec!["*_test.py".to_string()],
            ..Settings::default()
        };
        let filters = settings.validate().unwrap();
        assert!(filters.file_selected("src/a.py"));
        assert!(!filters.file_selected("src/a_test.py"));
        assert!(!filters.file_selected("tools/a.py"));
    }
}
