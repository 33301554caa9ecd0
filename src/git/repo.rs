use crate::cancel::CancelToken;
use crate::error::{InspectError, Result};
use crate::git::command::GitCli;
use crate::model::DateRange;
use crate::util::parse_date;
use chrono::{DateTime, Utc};
use gix::Repository;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A repository opened for analysis.
///
/// Holds the `gix` handle used for metadata (HEAD, revision dates) and a
/// [`GitCli`] for everything else. The `gix` handle stays on the thread that
/// opened it; workers only get clones of the runner.
pub struct GitRepo {
    repo: Repository,
    path: PathBuf,
    git: GitCli,
}

impl GitRepo {
    /// Open the repository rooted at `path`. A directory nested inside a
    /// repository is not itself a repository.
    pub fn open(path: &Path, timeout: Duration, cancel: CancelToken) -> Result<Self> {
        if !is_repository_root(path) {
            return Err(InspectError::NotAGitRepository {
                path: path.to_path_buf(),
            });
        }

        let repo = gix::open(path.canonicalize()?)?;
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();
        let git = GitCli::new(path.clone(), timeout, cancel);

        Ok(Self { repo, path, git })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git(&self) -> &GitCli {
        &self.git
    }

    /// Directory name used to label the repository in reports.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().trim_end_matches(".git").to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Commit id of HEAD, or `None` for a repository without commits.
    pub fn head(&self) -> Result<Option<String>> {
        let mut head = self.repo.head()?;
        if head.is_unborn() {
            return Ok(None);
        }
        let commit = head.peel_to_commit_in_place()?;
        Ok(Some(commit.id.to_string()))
    }

    /// `.git-blame-ignore-revs` at the top of the working tree, if present.
    pub fn blame_ignore_revs_file(&self) -> Option<PathBuf> {
        let file = self.path.join(".git-blame-ignore-revs");
        file.is_file().then_some(file)
    }

    pub fn resolve_range(&self, since: Option<&str>, until: Option<&str>) -> Result<DateRange> {
        let mut range = DateRange::new();

        let since_dt = since.map(|s| self.parse_commit_or_date(s)).transpose()?;
        let until_dt = until.map(|u| self.parse_commit_or_date(u)).transpose()?;

        if let (Some(s), Some(u)) = (since_dt, until_dt) {
            if s > u {
                return Err(InspectError::InvalidDate(format!(
                    "Invalid range: since ({s}) is after until ({u})"
                )));
            }
        }

        if let Some(s) = since_dt {
            range = range.with_since(s);
        }
        if let Some(u) = until_dt {
            range = range.with_until(u);
        }

        Ok(range)
    }

    fn parse_commit_or_date(&self, input: &str) -> Result<DateTime<Utc>> {
        if let Some(dt) = parse_date(input) {
            return Ok(dt);
        }

        // Fallback to a revision: its commit time bounds the range
        let id = self
            .repo
            .rev_parse_single(input)
            .map_err(|e| InspectError::InvalidDate(format!("Invalid commit or date '{input}': {e}")))?;

        let commit = id
            .object()?
            .try_into_commit()
            .map_err(|_| InspectError::InvalidDate(format!("Not a commit: {input}")))?;

        let secs = commit.time()?.seconds;
        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| InspectError::InvalidDate(format!("Invalid timestamp: {secs}")))
    }
}

/// A working tree with a `.git` entry, or a bare repository.
pub fn is_repository_root(path: &Path) -> bool {
    path.is_dir()
        && (path.join(".git").exists()
            || (path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_directory_is_not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitRepo::open(dir.path(), Duration::from_secs(5), CancelToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, InspectError::NotAGitRepository { .. }));
    }

    #[test]
    fn missing_path_is_not_a_repository() {
        let err = GitRepo::open(
            Path::new("/no/such/place/for/a/repo"),
            Duration::from_secs(5),
            CancelToken::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, InspectError::NotAGitRepository { .. }));
    }

    #[test]
    fn dot_git_marks_a_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_repository_root(dir.path()));
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(is_repository_root(dir.path()));
    }
}
