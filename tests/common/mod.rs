#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn has_git() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

/// A throwaway repository whose commits carry explicit authors and dates.
pub struct TestRepo {
    dir: TempDir,
    clock: i64,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Self {
            dir,
            clock: 1_700_000_000,
        };
        repo.git(&["init", "-q"]);
        repo.git(&["config", "core.autocrlf", "false"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.git(&["config", "user.name", "Fixture"]);
        repo.git(&["config", "user.email", "fixture@example.com"]);
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn write(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn write_bytes(&self, name: &str, content: &[u8]) {
        fs::write(self.dir.path().join(name), content).unwrap();
    }

    /// Stage everything and commit as `name <email>`, one day after the
    /// previous commit. Returns the new commit id.
    pub fn commit(&mut self, name: &str, email: &str, message: &str) -> String {
        self.git(&["add", "-A"]);
        self.as_author(name, email, &["commit", "-q", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }

    /// Merge `branch` into the current branch with a merge commit by
    /// `name <email>`.
    pub fn merge(&mut self, name: &str, email: &str, branch: &str) -> String {
        let message = format!("Merge {branch}");
        self.as_author(name, email, &["merge", "-q", "--no-ff", "-m", &message, branch]);
        self.git(&["rev-parse", "HEAD"])
    }

    fn as_author(&mut self, name: &str, email: &str, args: &[&str]) {
        self.clock += 86_400;
        let date = format!("{} +0000", self.clock);
        let output = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_AUTHOR_NAME", name)
            .env("GIT_AUTHOR_EMAIL", email)
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_NAME", name)
            .env("GIT_COMMITTER_EMAIL", email)
            .env("GIT_COMMITTER_DATE", &date)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

/// `count` distinct code lines, long enough for copy detection.
pub fn code_lines(prefix: &str, count: usize) -> String {
    (1..=count)
        .map(|i| format!("{prefix}_value_{i:02} = compute_the_answer({i}, 'payload string {prefix}')\n"))
        .collect()
}
