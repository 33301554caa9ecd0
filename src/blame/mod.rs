//! Line attribution for single files, at HEAD or at any historical commit.

pub mod comments;

use crate::config::{BlameExclusions, Settings};
use crate::error::Result;
use crate::git::{BlameOptions, GitCli};
use crate::model::{BlameLine, FileState, RawBlameLine};
use crate::persons::PersonId;
use crate::util::timestamp_to_datetime;
use tracing::debug;

/// Which lines are excluded from attribution and how they appear.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineRules {
    pub include_comments: bool,
    pub include_empty_lines: bool,
    pub mode: BlameExclusions,
}

impl LineRules {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            include_comments: settings.include_comments,
            include_empty_lines: settings.include_empty_lines,
            mode: settings.blame_exclusions,
        }
    }
}

/// Who a raw blame line belongs to, and whether that alone excludes it.
#[derive(Debug, Clone)]
pub struct Attribution {
    /// `None` when the identity is unknown to the persons database.
    pub person: Option<PersonId>,
    pub name: String,
    pub email: String,
    /// Excluded author, or a commit outside the analysed set.
    pub excluded: bool,
}

#[derive(Debug, Clone)]
pub struct BlameEngine {
    git: GitCli,
    options: BlameOptions,
    rules: LineRules,
}

impl BlameEngine {
    pub fn new(git: GitCli, options: BlameOptions, rules: LineRules) -> Self {
        Self { git, options, rules }
    }

    pub fn rules(&self) -> LineRules {
        self.rules
    }

    /// Raw blame of `path` at `commit`. A path that is absent or binary at
    /// that commit yields no lines.
    pub fn blame_raw(&self, path: &str, commit: &str) -> Result<Vec<RawBlameLine>> {
        match self.git.file_state(commit, path)? {
            FileState::Absent => {
                debug!(path, commit, "file absent at commit");
                Ok(Vec::new())
            }
            FileState::Binary => {
                debug!(path, commit, "binary file, no blame");
                Ok(Vec::new())
            }
            FileState::Text => self.git.blame(commit, path, &self.options),
        }
    }

    /// Attributed and filtered blame of `path` at `commit`.
    pub fn compute_blame(
        &self,
        path: &str,
        commit: &str,
        attribute: impl FnMut(&RawBlameLine) -> Attribution,
    ) -> Result<Vec<BlameLine>> {
        let raw = self.blame_raw(path, commit)?;
        Ok(finalize(raw, path, &self.rules, attribute))
    }
}

/// Flag comment, empty and excluded lines, keeping full attribution on all.
pub fn annotate(
    raw: Vec<RawBlameLine>,
    path: &str,
    rules: &LineRules,
    mut attribute: impl FnMut(&RawBlameLine) -> Attribution,
) -> Vec<BlameLine> {
    let comment_flags = comments::comment_lines(
        path,
        &raw.iter().map(|l| l.content.as_str()).collect::<Vec<_>>(),
    );

    raw.into_iter()
        .zip(comment_flags)
        .map(|(line, is_comment)| {
            let who = attribute(&line);
            let is_empty = line.content.trim().is_empty();
            let excluded = who.excluded
                || (is_comment && !rules.include_comments)
                || (is_empty && !rules.include_empty_lines);
            BlameLine {
                line_nr: line.line_nr,
                sha: Some(line.sha),
                author: Some(who.name),
                email: Some(who.email),
                timestamp: timestamp_to_datetime(line.timestamp),
                content: line.content,
                is_comment,
                is_empty,
                excluded,
                person: who.person,
            }
        })
        .collect()
}

/// Shape excluded lines according to the exclusion mode. Line numbers are
/// kept as they were in the file.
pub fn apply_exclusions(lines: Vec<BlameLine>, mode: BlameExclusions) -> Vec<BlameLine> {
    match mode {
        BlameExclusions::Show => lines,
        BlameExclusions::Remove => lines.into_iter().filter(|l| !l.excluded).collect(),
        BlameExclusions::Hide => lines
            .into_iter()
            .map(|mut line| {
                if line.excluded {
                    line.sha = None;
                    line.author = None;
                    line.email = None;
                    line.timestamp = None;
                    line.person = None;
                }
                line
            })
            .collect(),
    }
}

pub fn finalize(
    raw: Vec<RawBlameLine>,
    path: &str,
    rules: &LineRules,
    attribute: impl FnMut(&RawBlameLine) -> Attribution,
) -> Vec<BlameLine> {
    apply_exclusions(annotate(raw, path, rules, attribute), rules.mode)
}

/// Attributed, non-excluded lines per person.
pub fn count_lines(lines: &[BlameLine]) -> Vec<(PersonId, u64)> {
    let mut counts: Vec<(PersonId, u64)> = Vec::new();
    for person in lines.iter().filter(|l| !l.excluded).filter_map(|l| l.person) {
        match counts.iter_mut().find(|(p, _)| *p == person) {
            Some((_, n)) => *n += 1,
            None => counts.push((person, 1)),
        }
    }
    counts
}
