//! Analysis of a single repository.
//!
//! [`RepoAnalyzer`] walks through a fixed sequence of phases:
//!
//! ```text
//! Discovering -> HistoryScanning -> BlameScanning -> IdentityMerging -> Aggregating -> Done
//! ```
//!
//! Any error moves it to `Failed`, which is terminal. Per-file history and
//! blame failures are not errors: they are recorded in the result and the
//! file contributes no data.

use crate::blame::{self, Attribution, BlameEngine, LineRules};
use crate::cancel::CancelToken;
use crate::config::{Filters, Settings};
use crate::error::{InspectError, Result};
use crate::git::{BlameOptions, FileLogOptions, GitCli, GitRepo};
use crate::model::{
    AuthorFileRow, AuthorRow, BlameLine, BlameSnapshot, CommitRecord, DateRange, FileBlame,
    FileDelta, FileFailure, FileLogEntry, FileRow, LogCommit, RawBlameLine, RepositoryResult,
    Totals,
};
use crate::persons::{PersonId, PersonsDb};
use crate::stats::{CommitHistory, Stat};
use crate::util::{format_age, percentage, timestamp_to_datetime};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalysisPhase {
    Discovering,
    HistoryScanning,
    BlameScanning,
    IdentityMerging,
    Aggregating,
    Done,
    Failed,
}

impl fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisPhase::Discovering => "discovering",
            AnalysisPhase::HistoryScanning => "history scanning",
            AnalysisPhase::BlameScanning => "blame scanning",
            AnalysisPhase::IdentityMerging => "identity merging",
            AnalysisPhase::Aggregating => "aggregating",
            AnalysisPhase::Done => "done",
            AnalysisPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything the discovery phase learns about a repository.
struct Discovery {
    name: String,
    head: String,
    git: GitCli,
    log: Vec<LogCommit>,
    numbering: HashMap<String, usize>,
    files: Vec<String>,
    included: HashSet<String>,
    ignore_revs: Vec<String>,
    ignore_revs_file: Option<std::path::PathBuf>,
    authors: HashMap<String, PersonId>,
}

/// Per-file history: renames and the commits that count.
struct Scan {
    history: CommitHistory,
    /// Path of each file at each commit touching it, newest first.
    names: HashMap<String, Vec<(String, String)>>,
    previous_paths: HashMap<String, Vec<String>>,
    failures: Vec<FileFailure>,
}

pub struct RepoAnalyzer<'a> {
    settings: &'a Settings,
    filters: Filters,
    cancel: CancelToken,
    phase: AnalysisPhase,
    failed_during: Option<AnalysisPhase>,
}

impl<'a> RepoAnalyzer<'a> {
    pub fn new(settings: &'a Settings, filters: Filters, cancel: CancelToken) -> Self {
        Self {
            settings,
            filters,
            cancel,
            phase: AnalysisPhase::Discovering,
            failed_during: None,
        }
    }

    pub fn phase(&self) -> AnalysisPhase {
        self.phase
    }

    /// Phase that was running when the analysis failed.
    pub fn failed_during(&self) -> Option<AnalysisPhase> {
        self.failed_during
    }

    fn enter(&mut self, next: AnalysisPhase) {
        debug_assert!(next > self.phase, "phase {next} cannot follow {}", self.phase);
        debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }

    pub fn analyze(&mut self, path: &Path) -> Result<RepositoryResult> {
        match self.run(path) {
            Ok(result) => {
                self.enter(AnalysisPhase::Done);
                info!(
                    repo = %result.name,
                    authors = result.authors.len(),
                    files = result.files.len(),
                    cancelled = result.cancelled,
                    "analysis finished"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(path = %path.display(), phase = %self.phase, error = %err, "analysis failed");
                self.failed_during = Some(self.phase);
                self.phase = AnalysisPhase::Failed;
                Err(err)
            }
        }
    }

    fn run(&mut self, path: &Path) -> Result<RepositoryResult> {
        let repo = GitRepo::open(path, self.settings.git_timeout(), self.cancel.clone())?;
        let Some((discovery, persons)) = self.discover(&repo)? else {
            info!(repo = %repo.name(), "repository has no commits");
            return Ok(RepositoryResult::empty(repo.name(), repo.path().to_path_buf()));
        };

        self.enter(AnalysisPhase::HistoryScanning);
        let scan = self.scan_history(&discovery);
        Ok(self.finish(repo.path(), discovery, persons, scan))
    }

    /// Every phase after the history scan.
    fn finish(&mut self, path: &Path, discovery: Discovery, persons: PersonsDb, scan: Scan) -> RepositoryResult {
        self.enter(AnalysisPhase::BlameScanning);
        let persons = Mutex::new(persons);
        let (blames, blame_failures) = if self.settings.blame_skip {
            debug!("blame skipped");
            (HashMap::new(), Vec::new())
        } else {
            self.scan_blame(
                &discovery.git,
                &discovery.head,
                &discovery.files,
                &discovery.included,
                &discovery.ignore_revs,
                discovery.ignore_revs_file.clone(),
                &persons,
            )
        };

        self.enter(AnalysisPhase::IdentityMerging);
        let persons = persons.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut history = scan.history.rekey(|id| persons.resolve(id));
        history.retain_authors(|id| !persons.is_excluded(id));
        let blames = canonicalize_blames(blames, &persons);

        self.enter(AnalysisPhase::Aggregating);
        let mut result = RepositoryResult::empty(discovery.name.clone(), path.to_path_buf());
        result.head = Some(discovery.head.clone());
        result.cancelled = self.cancel.is_cancelled();
        result.file_failures = scan.failures;
        result.file_failures.extend(blame_failures);

        self.aggregate(&mut result, history, blames, &scan.names, &scan.previous_paths, &discovery, &persons);
        result
    }

    fn discover(&self, repo: &GitRepo) -> Result<Option<(Discovery, PersonsDb)>> {
        let settings = self.settings;
        let Some(head) = repo.head()? else {
            return Ok(None);
        };
        let range = repo.resolve_range(settings.since.as_deref(), settings.until.as_deref())?;
        let git = repo.git().clone();

        let log = git.log(&head)?;
        let numbering = log
            .iter()
            .enumerate()
            .map(|(i, c)| (c.sha.clone(), i + 1))
            .collect();

        let files: Vec<String> = git
            .ls_tree(&head)?
            .into_iter()
            .map(|entry| entry.path)
            .filter(|path| self.filters.file_selected(path))
            .collect();

        let mut persons = PersonsDb::new(settings.identity_policy).with_filters(self.filters.clone());
        let authors = log
            .iter()
            .map(|c| (c.sha.clone(), persons.register(&c.author_name, &c.author_email)))
            .collect();

        let included = included_commits(&log, &range, &self.filters, settings.include_merges);
        let ignore_revs = log
            .iter()
            .filter(|c| self.filters.revision_excluded(&c.sha))
            .map(|c| c.sha.clone())
            .collect();

        info!(
            repo = %repo.name(),
            commits = log.len(),
            included = included.len(),
            files = files.len(),
            "repository discovered"
        );

        let discovery = Discovery {
            name: repo.name(),
            head,
            git,
            log,
            numbering,
            files,
            included,
            ignore_revs,
            ignore_revs_file: settings
                .ignore_revs_file
                .clone()
                .or_else(|| repo.blame_ignore_revs_file()),
            authors,
        };
        Ok(Some((discovery, persons)))
    }

    fn scan_history(&self, d: &Discovery) -> Scan {
        let opts = FileLogOptions {
            rename_threshold: self.settings.rename_threshold,
            include_whitespace: self.settings.include_whitespace,
            include_merges: self.settings.include_merges,
        };

        let logs: Vec<(String, Result<Vec<FileLogEntry>>)> = d
            .files
            .par_iter()
            .map(|path| (path.clone(), d.git.file_log(&d.head, path, &opts)))
            .collect();

        let by_sha: HashMap<&str, &LogCommit> = d.log.iter().map(|c| (c.sha.as_str(), c)).collect();
        let mut deltas: HashMap<String, Vec<FileDelta>> = HashMap::new();
        let mut names = HashMap::new();
        let mut previous_paths = HashMap::new();
        let mut failures = Vec::new();

        for (path, entries) in logs {
            let entries = match entries {
                Ok(entries) => entries,
                Err(InspectError::Cancelled) => continue,
                Err(err) => {
                    warn!(file = %path, error = %err, "history scan failed");
                    failures.push(FileFailure {
                        path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            previous_paths.insert(path.clone(), previous_names(&path, &entries));
            names.insert(
                path.clone(),
                entries.iter().map(|e| (e.sha.clone(), e.path.clone())).collect(),
            );

            for entry in entries {
                if !d.included.contains(&entry.sha) {
                    continue;
                }
                deltas.entry(entry.sha).or_default().push(FileDelta {
                    path: path.clone(),
                    insertions: entry.insertions,
                    deletions: entry.deletions,
                });
            }
        }

        let records: Vec<CommitRecord> = deltas
            .into_iter()
            .filter_map(|(sha, files)| {
                let commit = by_sha.get(sha.as_str())?;
                let author = *d.authors.get(&sha)?;
                Some(CommitRecord {
                    sha,
                    author,
                    timestamp: commit.timestamp,
                    files,
                })
            })
            .collect();
        debug!(commits = records.len(), "history folded");

        Scan {
            history: CommitHistory::from_commits(&records),
            names,
            previous_paths,
            failures,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_blame(
        &self,
        git: &GitCli,
        head: &str,
        files: &[String],
        included: &HashSet<String>,
        ignore_revs: &[String],
        ignore_revs_file: Option<std::path::PathBuf>,
        persons: &Mutex<PersonsDb>,
    ) -> (HashMap<String, Vec<BlameLine>>, Vec<FileFailure>) {
        let engine = BlameEngine::new(
            git.clone(),
            BlameOptions {
                copy_move: self.settings.copy_move_level,
                include_whitespace: self.settings.include_whitespace,
                ignore_revs: ignore_revs.to_vec(),
                ignore_revs_file,
            },
            LineRules::from_settings(self.settings),
        );
        let rules = engine.rules();

        let outcomes: Vec<(String, Option<Result<Vec<BlameLine>>>)> = files
            .par_iter()
            .map(|path| {
                if self.cancel.is_cancelled() {
                    return (path.clone(), None);
                }
                let blamed = engine.blame_raw(path, head).map(|raw| {
                    let mut known: HashMap<(String, String), PersonId> = HashMap::new();
                    blame::annotate(raw, path, &rules, |line| {
                        let person = *known
                            .entry((line.author_name.clone(), line.author_email.clone()))
                            .or_insert_with(|| lock(persons).register(&line.author_name, &line.author_email));
                        Attribution {
                            person: Some(person),
                            name: line.author_name.clone(),
                            email: line.author_email.clone(),
                            excluded: !included.contains(&line.sha),
                        }
                    })
                });
                (path.clone(), Some(blamed))
            })
            .collect();

        let mut blames = HashMap::new();
        let mut failures = Vec::new();
        let mut skipped = 0usize;
        for (path, outcome) in outcomes {
            match outcome {
                Some(Ok(lines)) => {
                    blames.insert(path, lines);
                }
                None | Some(Err(InspectError::Cancelled)) => skipped += 1,
                Some(Err(err)) => {
                    warn!(file = %path, error = %err, "blame failed");
                    failures.push(FileFailure {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }
        if skipped > 0 {
            info!(skipped, "blame scan cancelled");
        }
        (blames, failures)
    }

    #[allow(clippy::too_many_arguments)]
    fn aggregate(
        &self,
        result: &mut RepositoryResult,
        mut history: CommitHistory,
        blames: HashMap<String, Vec<BlameLine>>,
        names: &HashMap<String, Vec<(String, String)>>,
        previous_paths: &HashMap<String, Vec<String>>,
        d: &Discovery,
        persons: &PersonsDb,
    ) {
        let settings = self.settings;
        for (path, lines) in &blames {
            for (person, count) in blame::count_lines(lines) {
                history.add_lines(person, path, count);
            }
        }

        if settings.n_files > 0 {
            let mut ranked: Vec<(&String, u64)> =
                history.files.iter().map(|(path, stat)| (path, stat.lines)).collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            let keep: HashSet<String> = ranked
                .into_iter()
                .take(settings.n_files)
                .map(|(path, _)| path.clone())
                .collect();
            history.retain_files(&keep);
        }

        let total = &history.total;
        let n_authors = history.authors.len();

        let mut authors: Vec<AuthorRow> = history
            .authors
            .iter()
            .map(|(id, stat)| {
                let person = persons.get(*id);
                let pct_ins = percentage(stat.insertions, total.insertions);
                AuthorRow {
                    name: person.name.clone(),
                    email: person.preferred_email(),
                    aliases: if settings.show_renames { person.aliases() } else { Vec::new() },
                    emails: if settings.show_renames {
                        person.emails.iter().cloned().collect()
                    } else {
                        Vec::new()
                    },
                    commits: stat.commit_count(),
                    insertions: stat.insertions,
                    deletions: stat.deletions,
                    files: history.author_files.keys().filter(|(a, _)| a == id).count(),
                    lines: stat.lines,
                    percent_insertions: pct_ins,
                    percent_deletions: percentage(stat.deletions, total.deletions),
                    percent_lines: percentage(stat.lines, total.lines),
                    percent_scaled: pct_ins * n_authors as f64,
                    stability: stat.stability(),
                    age: format_age(stat.age_seconds()),
                    age_seconds: stat.age_seconds(),
                    first_commit: stat.first_commit.and_then(timestamp_to_datetime),
                    last_commit: stat.last_commit.and_then(timestamp_to_datetime),
                }
            })
            .collect();
        authors.sort_by(|a, b| {
            b.insertions
                .cmp(&a.insertions)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });

        let mut files: Vec<FileRow> = history
            .files
            .iter()
            .map(|(path, stat)| FileRow {
                path: path.clone(),
                previous_paths: previous_paths.get(path).cloned().unwrap_or_default(),
                extension: Path::new(path)
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default(),
                lines: stat.lines,
                commits: stat.commit_count(),
                insertions: stat.insertions,
                deletions: stat.deletions,
                authors: history.author_files.keys().filter(|(_, p)| p == path).count(),
                percent_lines: percentage(stat.lines, total.lines),
                percent_insertions: percentage(stat.insertions, total.insertions),
                stability: stat.stability(),
                age: format_age(stat.age_seconds()),
                shas: newest_first(stat, &d.numbering),
            })
            .collect();
        files.sort_by(|a, b| b.lines.cmp(&a.lines).then_with(|| a.path.cmp(&b.path)));

        let mut author_files: Vec<AuthorFileRow> = history
            .author_files
            .iter()
            .map(|((id, path), stat)| AuthorFileRow {
                author: persons.get(*id).name.clone(),
                path: path.clone(),
                commits: stat.commit_count(),
                insertions: stat.insertions,
                deletions: stat.deletions,
                lines: stat.lines,
                percent_insertions: percentage(stat.insertions, total.insertions),
                percent_lines: percentage(stat.lines, total.lines),
            })
            .collect();
        author_files.sort_by(|a, b| a.author.cmp(&b.author).then_with(|| a.path.cmp(&b.path)));

        let kept: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        let mut blames: Vec<FileBlame> = blames
            .into_iter()
            .filter(|(path, _)| kept.contains(path.as_str()))
            .map(|(path, lines)| FileBlame {
                path,
                lines: blame::apply_exclusions(lines, settings.blame_exclusions),
                history: Vec::new(),
            })
            .collect();
        blames.sort_by(|a, b| a.path.cmp(&b.path));

        if settings.blame_history && !self.cancel.is_cancelled() {
            self.blame_history(&mut blames, names, d, persons, &mut result.file_failures);
        }

        result.totals = Totals {
            commits: total.commit_count(),
            insertions: total.insertions,
            deletions: total.deletions,
            lines: total.lines,
            authors: authors.len(),
            files: files.len(),
        };
        result.authors = authors;
        result.files = files;
        result.author_files = author_files;
        result.blames = blames;
    }

    /// Snapshots of every file as of each commit that touched it.
    fn blame_history(
        &self,
        blames: &mut [FileBlame],
        names: &HashMap<String, Vec<(String, String)>>,
        d: &Discovery,
        persons: &PersonsDb,
        failures: &mut Vec<FileFailure>,
    ) {
        let engine = BlameEngine::new(
            d.git.clone(),
            BlameOptions {
                copy_move: self.settings.copy_move_level,
                include_whitespace: self.settings.include_whitespace,
                ignore_revs: d.ignore_revs.clone(),
                ignore_revs_file: d.ignore_revs_file.clone(),
            },
            LineRules::from_settings(self.settings),
        );

        let errors: Vec<FileFailure> = blames
            .par_iter_mut()
            .flat_map_iter(|file| {
                let mut errors = Vec::new();
                for (sha, name) in names.get(&file.path).into_iter().flatten() {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    match engine.compute_blame(name, sha, |line| attribute(persons, &d.included, line)) {
                        Ok(lines) => file.history.push(BlameSnapshot {
                            sha: sha.clone(),
                            lines,
                        }),
                        Err(err) => {
                            warn!(file = %file.path, commit = %sha, error = %err, "historical blame failed");
                            errors.push(FileFailure {
                                path: file.path.clone(),
                                reason: format!("at {sha}: {err}"),
                            });
                        }
                    }
                }
                errors
            })
            .collect();
        failures.extend(errors);
    }
}

/// Analyse one repository with its own worker pool.
pub fn analyze_repository(path: &Path, settings: &Settings) -> Result<RepositoryResult> {
    analyze_repository_with(path, settings, CancelToken::new())
}

pub fn analyze_repository_with(
    path: &Path,
    settings: &Settings,
    cancel: CancelToken,
) -> Result<RepositoryResult> {
    let filters = settings.validate()?;
    let pool = worker_pool(settings)?;
    pool.install(|| RepoAnalyzer::new(settings, filters, cancel).analyze(path))
}

pub(crate) fn worker_pool(settings: &Settings) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(settings.workers())
        .build()
        .map_err(|e| InspectError::Config(format!("cannot start worker pool: {e}")))
}

/// Blame `file` (a path at HEAD) as of `sha`.
///
/// Identities are registered from the full history first, oldest commit
/// first, so lines carry the same names as in an analysis of the repository.
pub fn blame_at(repo_path: &Path, settings: &Settings, file: &str, sha: &str) -> Result<Vec<BlameLine>> {
    let filters = settings.validate()?;
    let repo = GitRepo::open(repo_path, settings.git_timeout(), CancelToken::new())?;
    let git = repo.git().clone();
    let head = repo
        .head()?
        .ok_or_else(|| InspectError::Config("repository has no commits".to_string()))?;

    let mut persons = PersonsDb::new(settings.identity_policy).with_filters(filters.clone());
    for commit in git.log(&head)? {
        persons.register(&commit.author_name, &commit.author_email);
    }
    let log = git.log(sha)?;
    for commit in &log {
        persons.register(&commit.author_name, &commit.author_email);
    }
    let range = repo.resolve_range(settings.since.as_deref(), settings.until.as_deref())?;
    let included = included_commits(&log, &range, &filters, settings.include_merges);

    let name = path_at_commit(&git, &head, file, sha, settings)?;
    let engine = BlameEngine::new(
        git,
        BlameOptions {
            copy_move: settings.copy_move_level,
            include_whitespace: settings.include_whitespace,
            ignore_revs: log
                .iter()
                .filter(|c| filters.revision_excluded(&c.sha))
                .map(|c| c.sha.clone())
                .collect(),
            ignore_revs_file: settings
                .ignore_revs_file
                .clone()
                .or_else(|| repo.blame_ignore_revs_file()),
        },
        LineRules::from_settings(settings),
    );
    engine.compute_blame(&name, sha, |line| attribute(&persons, &included, line))
}

/// Name of `file` at `sha`: the newest of its historical names present there.
fn path_at_commit(git: &GitCli, head: &str, file: &str, sha: &str, settings: &Settings) -> Result<String> {
    let opts = FileLogOptions {
        rename_threshold: settings.rename_threshold,
        include_whitespace: true,
        include_merges: settings.include_merges,
    };
    let mut candidates = vec![file.to_string()];
    for entry in git.file_log(head, file, &opts)? {
        if entry.sha == sha {
            return Ok(entry.path);
        }
        if !candidates.contains(&entry.path) {
            candidates.push(entry.path);
        }
    }
    for name in &candidates {
        if git.file_state(sha, name)? != crate::model::FileState::Absent {
            return Ok(name.clone());
        }
    }
    Ok(file.to_string())
}

/// Commits counted by the statistics: inside the date range, message and
/// revision not excluded, merges only when enabled.
pub fn included_commits(
    log: &[LogCommit],
    range: &DateRange,
    filters: &Filters,
    include_merges: bool,
) -> HashSet<String> {
    log.iter()
        .filter(|c| range.contains_secs(c.timestamp))
        .filter(|c| !filters.message_excluded(&c.message))
        .filter(|c| !filters.revision_excluded(&c.sha))
        .filter(|c| include_merges || c.parents.len() < 2)
        .map(|c| c.sha.clone())
        .collect()
}

/// Renamed-from paths, oldest first, without the current path.
fn previous_names(path: &str, entries: &[FileLogEntry]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for entry in entries.iter().rev() {
        let candidates = entry.previous_path.iter().chain(std::iter::once(&entry.path));
        for name in candidates {
            if name != path && !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

fn newest_first(stat: &Stat, numbering: &HashMap<String, usize>) -> Vec<String> {
    let mut shas: Vec<&String> = stat.shas.iter().collect();
    shas.sort_by_key(|sha| std::cmp::Reverse(numbering.get(*sha).copied().unwrap_or(0)));
    shas.into_iter().cloned().collect()
}

/// Attribution against a settled persons database.
fn attribute(persons: &PersonsDb, included: &HashSet<String>, line: &RawBlameLine) -> Attribution {
    let out_of_range = !included.contains(&line.sha);
    match persons.find(&line.author_name, &line.author_email) {
        Some(id) => {
            let person = persons.get(id);
            Attribution {
                person: Some(id),
                name: person.name.clone(),
                email: person.preferred_email(),
                excluded: person.excluded || out_of_range,
            }
        }
        None => Attribution {
            person: None,
            name: line.author_name.clone(),
            email: line.author_email.clone(),
            excluded: out_of_range,
        },
    }
}

/// Point blame lines at canonical persons and apply author exclusions that
/// only became known once every identity was merged.
fn canonicalize_blames(
    mut blames: HashMap<String, Vec<BlameLine>>,
    persons: &PersonsDb,
) -> HashMap<String, Vec<BlameLine>> {
    for line in blames.values_mut().flatten() {
        let Some(id) = line.person else {
            continue;
        };
        let person = persons.get(id);
        line.person = Some(person.id);
        line.author = Some(person.name.clone());
        line.email = Some(person.preferred_email());
        line.excluded |= person.excluded;
    }
    blames
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sha: &str, path: &str, previous: Option<&str>) -> FileLogEntry {
        FileLogEntry {
            sha: sha.to_string(),
            path: path.to_string(),
            previous_path: previous.map(str::to_string),
            insertions: 1,
            deletions: 0,
        }
    }

    fn log_commit(sha: &str, ts: i64, message: &str, parents: usize) -> LogCommit {
        LogCommit {
            sha: sha.to_string(),
            parents: (0..parents).map(|i| format!("p{i}")).collect(),
            timestamp: ts,
            author_name: "A".to_string(),
            author_email: "a@x.org".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn previous_names_are_oldest_first() {
        let entries = vec![
            entry("3", "src/c.py", Some("src/b.py")),
            entry("2", "src/b.py", Some("a.py")),
            entry("1", "a.py", None),
        ];
        assert_eq!(previous_names("src/c.py", &entries), vec!["a.py", "src/b.py"]);
        assert!(previous_names("a.py", &entries[2..]).is_empty());
    }

    #[test]
    fn included_commits_apply_every_filter() {
        let settings = Settings {
            ex_messages: vec!["*skip-stats*".to_string()],
            ex_revisions: vec!["dead".to_string()],
            ..Settings::default()
        };
        let filters = settings.validate().unwrap();
        let log = vec![
            log_commit("aaa1", 100, "feature", 1),
            log_commit("dead01", 200, "revert", 1),
            log_commit("bbb2", 300, "chore SKIP-STATS", 1),
            log_commit("ccc3", 400, "merge", 2),
            log_commit("ddd4", 5_000, "late", 1),
        ];
        let range = DateRange::new().with_until(timestamp_to_datetime(1_000).unwrap());

        let with_merges = included_commits(&log, &range, &filters, true);
        assert_eq!(
            with_merges,
            HashSet::from(["aaa1".to_string(), "ccc3".to_string()])
        );
        let without = included_commits(&log, &range, &filters, false);
        assert_eq!(without, HashSet::from(["aaa1".to_string()]));
    }

    #[test]
    fn phases_are_ordered() {
        assert!(AnalysisPhase::Discovering < AnalysisPhase::HistoryScanning);
        assert!(AnalysisPhase::Aggregating < AnalysisPhase::Done);
        assert_eq!(AnalysisPhase::BlameScanning.to_string(), "blame scanning");
    }

    #[test]
    fn missing_repository_fails_in_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();
        let filters = settings.validate().unwrap();
        let mut analyzer = RepoAnalyzer::new(&settings, filters, CancelToken::new());
        let err = analyzer.analyze(dir.path()).unwrap_err();
        assert!(matches!(err, InspectError::NotAGitRepository { .. }));
        assert_eq!(analyzer.phase(), AnalysisPhase::Failed);
        assert_eq!(analyzer.failed_during(), Some(AnalysisPhase::Discovering));
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_AUTHOR_NAME", "Alice")
            .env("GIT_AUTHOR_EMAIL", "alice@example.com")
            .env("GIT_COMMITTER_NAME", "Alice")
            .env("GIT_COMMITTER_EMAIL", "alice@example.com")
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn cancellation_after_history_keeps_partial_result() {
        if std::process::Command::new("git").arg("--version").output().is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        std::fs::write(dir.path().join("a.py"), "x = 1\ny = 2\n").unwrap();
        git(dir.path(), &["add", "-A"]);
        git(dir.path(), &["-c", "commit.gpgsign=false", "commit", "-q", "-m", "add"]);

        let settings = Settings::default();
        let filters = settings.validate().unwrap();
        let cancel = CancelToken::new();
        let mut analyzer = RepoAnalyzer::new(&settings, filters, cancel.clone());
        let repo = GitRepo::open(dir.path(), settings.git_timeout(), cancel.clone()).unwrap();
        let (discovery, persons) = analyzer.discover(&repo).unwrap().unwrap();
        analyzer.enter(AnalysisPhase::HistoryScanning);
        let scan = analyzer.scan_history(&discovery);

        cancel.cancel();
        let result = analyzer.finish(dir.path(), discovery, persons, scan);

        assert!(result.cancelled);
        assert_eq!(result.totals.commits, 1);
        assert_eq!(result.totals.insertions, 2);
        assert_eq!(result.totals.lines, 0);
        assert!(result.blames.is_empty());
        assert!(result.file_failures.is_empty());
        assert_eq!(result.author("Alice").unwrap().insertions, 2);
        assert_eq!(analyzer.phase(), AnalysisPhase::Aggregating);
    }
}
