//! Per-author, per-file and author×file accumulation of commit activity.
//!
//! Commits are first collapsed into [`CommitGroup`]s, then folded into
//! [`Stat`]s. The fold runs on independent partial histories which are merged
//! by key afterwards, so no accumulator is ever shared between threads.

use crate::model::{CommitRecord, FileDelta};
use crate::persons::PersonId;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Aggregate activity of one author, one file or one author×file pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stat {
    pub shas: HashSet<String>,
    pub insertions: u64,
    pub deletions: u64,
    pub first_commit: Option<i64>,
    pub last_commit: Option<i64>,
    /// Lines attributed by blame at the analysed head.
    pub lines: u64,
}

impl Stat {
    pub fn commit_count(&self) -> usize {
        self.shas.len()
    }

    /// Span between the first and the last commit, in seconds.
    pub fn age_seconds(&self) -> i64 {
        match (self.first_commit, self.last_commit) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }

    /// Share of inserted lines that survive in the blame, capped at 100.
    pub fn stability(&self) -> Option<u32> {
        if self.insertions == 0 {
            return None;
        }
        let pct = (self.lines as f64 / self.insertions as f64 * 100.0).round();
        Some(pct.min(100.0) as u32)
    }

    pub fn add_group(&mut self, group: &CommitGroup) {
        self.shas.extend(group.shas.iter().cloned());
        self.insertions += group.insertions;
        self.deletions += group.deletions;
        self.touch(group.first_commit);
        self.touch(group.last_commit);
    }

    pub fn merge(&mut self, other: &Stat) {
        self.shas.extend(other.shas.iter().cloned());
        self.insertions += other.insertions;
        self.deletions += other.deletions;
        self.lines += other.lines;
        if let Some(ts) = other.first_commit {
            self.touch(ts);
        }
        if let Some(ts) = other.last_commit {
            self.touch(ts);
        }
    }

    fn touch(&mut self, timestamp: i64) {
        self.first_commit = Some(self.first_commit.map_or(timestamp, |t| t.min(timestamp)));
        self.last_commit = Some(self.last_commit.map_or(timestamp, |t| t.max(timestamp)));
    }
}

/// Consecutive commits of one author on one file.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitGroup {
    pub author: PersonId,
    pub path: String,
    pub shas: Vec<String>,
    pub insertions: u64,
    pub deletions: u64,
    pub first_commit: i64,
    pub last_commit: i64,
}

impl CommitGroup {
    fn new(commit: &CommitRecord, delta: &FileDelta) -> Self {
        Self {
            author: commit.author,
            path: delta.path.clone(),
            shas: vec![commit.sha.clone()],
            insertions: delta.insertions,
            deletions: delta.deletions,
            first_commit: commit.timestamp,
            last_commit: commit.timestamp,
        }
    }

    fn absorb(&mut self, commit: &CommitRecord, delta: &FileDelta) {
        self.shas.push(commit.sha.clone());
        self.insertions += delta.insertions;
        self.deletions += delta.deletions;
        self.first_commit = self.first_commit.min(commit.timestamp);
        self.last_commit = self.last_commit.max(commit.timestamp);
    }
}

/// Collapse commits into groups, oldest first. A commit id seen twice is
/// only counted once.
pub fn group_commits(commits: &[CommitRecord]) -> Vec<CommitGroup> {
    let mut ordered: Vec<&CommitRecord> = commits.iter().collect();
    ordered.sort_by_key(|c| c.timestamp);

    let mut seen: HashSet<&str> = HashSet::new();
    let mut open: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<CommitGroup> = Vec::new();

    for commit in ordered {
        if !seen.insert(commit.sha.as_str()) {
            continue;
        }
        for delta in &commit.files {
            match open.get(delta.path.as_str()).copied() {
                Some(i) if groups[i].author == commit.author => groups[i].absorb(commit, delta),
                _ => {
                    open.insert(delta.path.as_str(), groups.len());
                    groups.push(CommitGroup::new(commit, delta));
                }
            }
        }
    }
    groups
}

#[derive(Debug, Clone, Default)]
pub struct CommitHistory {
    pub authors: HashMap<PersonId, Stat>,
    pub files: HashMap<String, Stat>,
    pub author_files: HashMap<(PersonId, String), Stat>,
    pub total: Stat,
    seen: HashSet<String>,
}

impl CommitHistory {
    /// Fold a set of commits, in parallel when there are many groups.
    pub fn from_commits(commits: &[CommitRecord]) -> Self {
        let groups = group_commits(commits);
        let mut history = groups
            .par_iter()
            .fold(CommitHistory::default, |mut history, group| {
                history.add_group(group);
                history
            })
            .reduce(CommitHistory::default, CommitHistory::merge);
        history.seen = commits.iter().map(|c| c.sha.clone()).collect();
        history
    }

    /// Fold one commit. Adding an already folded commit is a no-op.
    pub fn add_commit(&mut self, commit: &CommitRecord) {
        if !self.seen.insert(commit.sha.clone()) {
            return;
        }
        for delta in &commit.files {
            self.add_group(&CommitGroup::new(commit, delta));
        }
    }

    pub fn add_group(&mut self, group: &CommitGroup) {
        self.authors.entry(group.author).or_default().add_group(group);
        self.files.entry(group.path.clone()).or_default().add_group(group);
        self.author_files
            .entry((group.author, group.path.clone()))
            .or_default()
            .add_group(group);
        self.total.add_group(group);
    }

    /// Attribute `count` blame lines of `path` to `author`.
    pub fn add_lines(&mut self, author: PersonId, path: &str, count: u64) {
        if count == 0 {
            return;
        }
        self.authors.entry(author).or_default().lines += count;
        self.files.entry(path.to_string()).or_default().lines += count;
        self.author_files
            .entry((author, path.to_string()))
            .or_default()
            .lines += count;
        self.total.lines += count;
    }

    pub fn merge(mut self, other: CommitHistory) -> CommitHistory {
        for (id, stat) in other.authors {
            self.authors.entry(id).or_default().merge(&stat);
        }
        for (path, stat) in other.files {
            self.files.entry(path).or_default().merge(&stat);
        }
        for (key, stat) in other.author_files {
            self.author_files.entry(key).or_default().merge(&stat);
        }
        self.total.merge(&other.total);
        self.seen.extend(other.seen);
        self
    }

    /// Re-key author entries after identity merging; entries whose ids now
    /// resolve to the same person are combined.
    pub fn rekey(self, resolve: impl Fn(PersonId) -> PersonId) -> CommitHistory {
        let mut authors: HashMap<PersonId, Stat> = HashMap::new();
        for (id, stat) in self.authors {
            authors.entry(resolve(id)).or_default().merge(&stat);
        }
        let mut author_files: HashMap<(PersonId, String), Stat> = HashMap::new();
        for ((id, path), stat) in self.author_files {
            author_files.entry((resolve(id), path)).or_default().merge(&stat);
        }
        CommitHistory {
            authors,
            author_files,
            ..self
        }
    }

    /// Drop every file not in `keep`, recomputing the totals.
    pub fn retain_files(&mut self, keep: &HashSet<String>) {
        self.author_files.retain(|(_, path), _| keep.contains(path));
        self.rebuild_from_pairs();
    }

    /// Drop every author for which `keep` is false, recomputing file stats
    /// and totals from what the remaining authors did.
    pub fn retain_authors(&mut self, keep: impl Fn(PersonId) -> bool) {
        self.author_files.retain(|(id, _), _| keep(*id));
        self.rebuild_from_pairs();
    }

    fn rebuild_from_pairs(&mut self) {
        let mut authors: HashMap<PersonId, Stat> = HashMap::new();
        let mut files: HashMap<String, Stat> = HashMap::new();
        let mut total = Stat::default();
        for ((id, path), stat) in &self.author_files {
            authors.entry(*id).or_default().merge(stat);
            files.entry(path.clone()).or_default().merge(stat);
            total.merge(stat);
        }
        self.authors = authors;
        self.files = files;
        self.total = total;
    }
}
