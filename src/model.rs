use crate::persons::PersonId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const SCHEMA_VERSION: u32 = 1;

/// One commit of the analysed history.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub sha: String,
    pub author: PersonId,
    pub timestamp: i64,
    pub files: Vec<FileDelta>,
}

/// Insertions and deletions of one commit on one tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDelta {
    /// Path of the file at the analysed head.
    pub path: String,
    pub insertions: u64,
    pub deletions: u64,
}

/// Raw commit metadata as read from `git log`, before identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCommit {
    pub sha: String,
    pub parents: Vec<String>,
    pub timestamp: i64,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
}

/// One numstat entry of a `git log --follow` run for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLogEntry {
    pub sha: String,
    pub path: String,
    pub previous_path: Option<String>,
    pub insertions: u64,
    pub deletions: u64,
}

/// A tracked blob at the analysed head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
}

/// One line of `git blame --porcelain` output, before identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlameLine {
    pub line_nr: u32,
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: i64,
    pub content: String,
}

/// Whether a path exists at a commit, and as what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Absent,
    Binary,
    Text,
}

/// One line of one file as attributed by blame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlameLine {
    pub line_nr: u32,
    pub sha: Option<String>,
    pub author: Option<String>,
    pub email: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub content: String,
    pub is_comment: bool,
    pub is_empty: bool,
    pub excluded: bool,
    #[serde(skip)]
    pub person: Option<PersonId>,
}

/// Blame of a file as of one historical commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlameSnapshot {
    pub sha: String,
    pub lines: Vec<BlameLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBlame {
    pub path: String,
    pub lines: Vec<BlameLine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<BlameSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorRow {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    pub commits: usize,
    pub insertions: u64,
    pub deletions: u64,
    pub files: usize,
    pub lines: u64,
    pub percent_insertions: f64,
    pub percent_deletions: f64,
    pub percent_lines: f64,
    pub percent_scaled: f64,
    pub stability: Option<u32>,
    pub age: String,
    pub age_seconds: i64,
    pub first_commit: Option<DateTime<Utc>>,
    pub last_commit: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRow {
    pub path: String,
    pub previous_paths: Vec<String>,
    pub extension: String,
    pub lines: u64,
    pub commits: usize,
    pub insertions: u64,
    pub deletions: u64,
    pub authors: usize,
    pub percent_lines: f64,
    pub percent_insertions: f64,
    pub stability: Option<u32>,
    pub age: String,
    /// Commits touching the file, newest first.
    pub shas: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorFileRow {
    pub author: String,
    pub path: String,
    pub commits: usize,
    pub insertions: u64,
    pub deletions: u64,
    pub lines: u64,
    pub percent_insertions: f64,
    pub percent_lines: f64,
}

/// Repository-wide denominators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Totals {
    pub commits: usize,
    pub insertions: u64,
    pub deletions: u64,
    pub lines: u64,
    pub authors: usize,
    pub files: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryResult {
    pub name: String,
    pub path: PathBuf,
    pub head: Option<String>,
    pub authors: Vec<AuthorRow>,
    pub files: Vec<FileRow>,
    pub author_files: Vec<AuthorFileRow>,
    pub blames: Vec<FileBlame>,
    pub totals: Totals,
    pub file_failures: Vec<FileFailure>,
    pub cancelled: bool,
}

impl RepositoryResult {
    pub fn empty(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            head: None,
            authors: Vec::new(),
            files: Vec::new(),
            author_files: Vec::new(),
            blames: Vec::new(),
            totals: Totals::default(),
            file_failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn author(&self, name: &str) -> Option<&AuthorRow> {
        self.authors.iter().find(|a| a.name == name)
    }

    pub fn file(&self, path: &str) -> Option<&FileRow> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn blame(&self, path: &str) -> Option<&FileBlame> {
        self.blames.iter().find(|b| b.path == path)
    }
}

/// Result of one repository in a multi-repository run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RepositoryOutcome {
    Success(Box<RepositoryResult>),
    Failed { path: PathBuf, reason: String },
}

impl RepositoryOutcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            RepositoryOutcome::Success(result) => &result.path,
            RepositoryOutcome::Failed { path, .. } => path,
        }
    }

    pub fn result(&self) -> Option<&RepositoryResult> {
        match self {
            RepositoryOutcome::Success(result) => Some(result),
            RepositoryOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub repositories: Vec<RepositoryOutcome>,
}

impl AnalysisReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &RepositoryResult> {
        self.repositories.iter().filter_map(RepositoryOutcome::result)
    }

    pub fn failed(&self) -> impl Iterator<Item = (&PathBuf, &str)> {
        self.repositories.iter().filter_map(|o| match o {
            RepositoryOutcome::Failed { path, reason } => Some((path, reason.as_str())),
            RepositoryOutcome::Success(_) => None,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new() -> Self {
        Self { since: None, until: None }
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if timestamp < &since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if timestamp > &until {
                return false;
            }
        }
        true
    }

    pub fn contains_secs(&self, secs: i64) -> bool {
        crate::util::timestamp_to_datetime(secs)
            .map(|dt| self.contains(&dt))
            .unwrap_or(false)
    }
}
