//! Runs the analysis over every repository found under the input paths.

use crate::analyze::{worker_pool, RepoAnalyzer};
use crate::cancel::CancelToken;
use crate::config::Settings;
use crate::error::{InspectError, Result};
use crate::git::is_repository_root;
use crate::model::{AnalysisReport, RepositoryOutcome, SCHEMA_VERSION};
use chrono::Utc;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Repositories at or below `root`, at most `depth` directory levels down.
///
/// With depth 0, or when `root` is itself a repository, `root` is returned
/// as is. Nothing is searched inside a repository. When no repository is
/// found, `root` is returned so that the caller reports it as a failure.
pub fn discover_repositories(root: &Path, depth: usize) -> Vec<PathBuf> {
    if depth == 0 || is_repository_root(root) {
        return vec![root.to_path_buf()];
    }

    let walker = WalkBuilder::new(root)
        .max_depth(Some(depth))
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .filter_entry(|entry| {
            entry.file_name() != ".git" && entry.file_type().is_some_and(|t| t.is_dir())
        })
        .build();

    let mut found: Vec<PathBuf> = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() > 0 && is_repository_root(entry.path()) {
            found.push(entry.path().to_path_buf());
        }
    }

    found.sort();
    let mut repos: Vec<PathBuf> = Vec::new();
    for path in found {
        if !repos.iter().any(|repo| path.starts_with(repo)) {
            repos.push(path);
        }
    }

    if repos.is_empty() {
        debug!(root = %root.display(), depth, "no repository found");
        return vec![root.to_path_buf()];
    }
    repos
}

pub fn run(settings: &Settings) -> Result<AnalysisReport> {
    run_with_cancel(settings, CancelToken::new())
}

/// Analyse every repository under `settings.input_paths`. Settings are
/// validated before anything else; after that, failures are per repository.
pub fn run_with_cancel(settings: &Settings, cancel: CancelToken) -> Result<AnalysisReport> {
    let filters = settings.validate()?;
    if settings.input_paths.is_empty() {
        return Err(InspectError::Config("no input paths given".to_string()));
    }

    let mut repos: Vec<PathBuf> = settings
        .input_paths
        .iter()
        .flat_map(|input| discover_repositories(input, settings.search_depth))
        .collect();
    repos.sort();
    repos.dedup();
    info!(count = repos.len(), "repositories to analyse");

    let pool = worker_pool(settings)?;
    let repositories = pool.install(|| {
        repos
            .par_iter()
            .map(|path| {
                if cancel.is_cancelled() {
                    return RepositoryOutcome::Failed {
                        path: path.clone(),
                        reason: InspectError::Cancelled.to_string(),
                    };
                }
                let mut analyzer = RepoAnalyzer::new(settings, filters.clone(), cancel.clone());
                match analyzer.analyze(path) {
                    Ok(result) => RepositoryOutcome::Success(Box::new(result)),
                    Err(err) => RepositoryOutcome::Failed {
                        path: path.clone(),
                        reason: match analyzer.failed_during() {
                            Some(phase) => format!("{err} (while {phase})"),
                            None => err.to_string(),
                        },
                    },
                }
            })
            .collect()
    });

    Ok(AnalysisReport {
        version: SCHEMA_VERSION,
        generated_at: Utc::now(),
        repositories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_repo(path: &Path) {
        fs::create_dir_all(path.join(".git")).unwrap();
    }

    #[test]
    fn depth_limits_the_search() {
        let root = tempfile::tempdir().unwrap();
        fake_repo(&root.path().join("a"));
        fake_repo(&root.path().join("b/c"));
        fs::create_dir_all(root.path().join("d/e")).unwrap();

        let depth1 = discover_repositories(root.path(), 1);
        assert_eq!(depth1, vec![root.path().join("a")]);

        let depth2 = discover_repositories(root.path(), 2);
        assert_eq!(depth2, vec![root.path().join("a"), root.path().join("b/c")]);
    }

    #[test]
    fn depth_zero_takes_the_input_as_is() {
        let root = tempfile::tempdir().unwrap();
        fake_repo(&root.path().join("a"));
        assert_eq!(discover_repositories(root.path(), 0), vec![root.path().to_path_buf()]);
    }

    #[test]
    fn nested_repositories_are_not_searched() {
        let root = tempfile::tempdir().unwrap();
        fake_repo(&root.path().join("outer"));
        fake_repo(&root.path().join("outer/vendor/inner"));
        assert_eq!(discover_repositories(root.path(), 5), vec![root.path().join("outer")]);
    }

    #[test]
    fn invalid_settings_fail_before_any_repository() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings {
            input_paths: vec![root.path().to_path_buf()],
            ex_files: vec!["{unclosed".to_string()],
            ..Settings::default()
        };
        assert!(run(&settings).unwrap_err().is_config());
    }

    #[test]
    fn plain_directory_is_a_failed_outcome() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings {
            input_paths: vec![root.path().to_path_buf()],
            ..Settings::default()
        };
        let report = run(&settings).unwrap();
        assert_eq!(report.repositories.len(), 1);
        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].1.contains("Not a git repository"));
    }
}
