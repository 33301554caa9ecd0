use crate::config::{BlameExclusions, CopyMoveLevel, IdentityPolicy, Settings};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gitinspect")]
#[command(about = "Per-author and per-file statistics, blame ownership and code age for git repositories")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Start from this commit or date (RFC3339, YYYY-MM-DD, or natural language)")]
    pub since: Option<String>,

    #[arg(long, global = true, help = "End at this commit or date (RFC3339, YYYY-MM-DD, or natural language)")]
    pub until: Option<String>,

    #[arg(long, global = true, help = "Leave merge commits out of the statistics")]
    pub no_merges: bool,

    #[arg(long = "ex-author", global = true, help = "Exclude authors matching this pattern (repeatable)")]
    pub ex_authors: Vec<String>,

    #[arg(long = "ex-email", global = true, help = "Exclude emails matching this pattern (repeatable)")]
    pub ex_emails: Vec<String>,

    #[arg(long = "ex-file", global = true, help = "Exclude files matching this pattern (repeatable)")]
    pub ex_files: Vec<String>,

    #[arg(long = "ex-message", global = true, help = "Exclude commits whose subject matches this pattern (repeatable)")]
    pub ex_messages: Vec<String>,

    #[arg(long = "ex-revision", global = true, help = "Exclude commits by hash prefix (repeatable)")]
    pub ex_revisions: Vec<String>,

    #[arg(long, global = true, default_value = "1", help = "Copy/move detection level, 0 to 4")]
    pub copy_move: CopyMoveLevel,

    #[arg(long, global = true, default_value = "hide", help = "How excluded blame lines appear: hide, show or remove")]
    pub blame_exclusions: BlameExclusions,

    #[arg(long, global = true, help = "Count whole-line comments as lines")]
    pub include_comments: bool,

    #[arg(long, global = true, help = "Count empty lines as lines")]
    pub include_empty_lines: bool,

    #[arg(long, global = true, help = "Do not ignore whitespace changes")]
    pub include_whitespace: bool,

    #[arg(long, global = true, default_value = "loose", help = "Identity merging: loose or email-domain")]
    pub identity_policy: IdentityPolicy,

    #[arg(long, global = true, help = "File with revisions to ignore in blame")]
    pub ignore_revs_file: Option<PathBuf>,

    #[arg(long, global = true, default_value = "2m", value_parser = humantime::parse_duration, help = "Timeout of a single git command")]
    pub git_timeout: Duration,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Log more (-v info, -vv debug)")]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse every repository under the given paths
    Analyze {
        #[arg(help = "Repositories or directories containing repositories", default_value = ".")]
        paths: Vec<PathBuf>,

        #[arg(long, default_value_t = 5, help = "Directory levels searched for repositories")]
        depth: usize,

        #[arg(long = "files", default_value_t = 0, help = "Only report the N files with the most lines (0 = all)")]
        n_files: usize,

        #[arg(long, value_delimiter = ',', help = "File extensions to analyse, '*' for all")]
        extensions: Vec<String>,

        #[arg(long, default_value = "", help = "Only analyse files below this directory")]
        subfolder: String,

        #[arg(long = "include-file", help = "Only analyse files matching this pattern, relative to --subfolder (repeatable)")]
        include_files: Vec<String>,

        #[arg(long, help = "List author aliases and all their emails")]
        show_renames: bool,

        #[arg(long, default_value_t = 50, help = "Rename similarity threshold in percent")]
        rename_threshold: u8,

        #[arg(long, help = "Also blame every file at each commit that touched it")]
        blame_history: bool,

        #[arg(long, conflicts_with = "blame_history", help = "Skip blame: history statistics only, no line counts")]
        blame_skip: bool,

        #[arg(long, default_value_t = 6, help = "Worker threads")]
        workers: usize,

        #[arg(long, help = "Analyse on a single thread")]
        single_thread: bool,

        #[arg(long, help = "Include per-line blame in JSON output")]
        blame_lines: bool,

        #[arg(long, help = "Output as JSON")]
        json: bool,

        #[arg(long, help = "Output as NDJSON")]
        ndjson: bool,
    },
    /// Blame one file as of any commit
    Blame {
        #[arg(help = "Path of the file at HEAD")]
        file: String,

        #[arg(long, help = "Path to git repository", default_value = ".")]
        repo: PathBuf,

        #[arg(long, default_value = "HEAD", help = "Commit to blame at")]
        at: String,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn verbosity(&self) -> u8 {
        self.common.verbose
    }

    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze {
                paths,
                depth,
                n_files,
                extensions,
                subfolder,
                include_files,
                show_renames,
                rename_threshold,
                blame_history,
                blame_skip,
                workers,
                single_thread,
                blame_lines,
                json,
                ndjson,
            } => {
                let mut settings = self.common.settings();
                settings.input_paths = paths;
                settings.search_depth = depth;
                settings.n_files = n_files;
                if !extensions.is_empty() {
                    settings.extensions = extensions;
                }
                settings.subfolder = subfolder;
                settings.include_files = include_files;
                settings.show_renames = show_renames;
                settings.rename_threshold = rename_threshold;
                settings.blame_history = blame_history;
                settings.blame_skip = blame_skip;
                settings.max_workers = workers;
                settings.multithread = !single_thread;

                let format = crate::output::Format::from_flags(json, ndjson);
                crate::output::exec_analyze(&settings, format, blame_lines)
                    .context("Analysis failed")
            }
            Commands::Blame { file, repo, at, json } => {
                let mut settings = self.common.settings();
                settings.input_paths = vec![repo.clone()];
                crate::output::exec_blame(&settings, &repo, &file, &at, json)
                    .with_context(|| format!("Failed to blame {file} at {at}"))
            }
        }
    }
}

impl CommonArgs {
    pub fn settings(&self) -> Settings {
        Settings {
            since: self.since.clone(),
            until: self.until.clone(),
            include_merges: !self.no_merges,
            ex_authors: self.ex_authors.clone(),
            ex_emails: self.ex_emails.clone(),
            ex_files: self.ex_files.clone(),
            ex_messages: self.ex_messages.clone(),
            ex_revisions: self.ex_revisions.clone(),
            copy_move_level: self.copy_move,
            blame_exclusions: self.blame_exclusions,
            include_comments: self.include_comments,
            include_empty_lines: self.include_empty_lines,
            include_whitespace: self.include_whitespace,
            identity_policy: self.identity_policy,
            ignore_revs_file: self.ignore_revs_file.clone(),
            git_timeout_secs: self.git_timeout.as_secs().max(1),
            ..Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_flags_map_to_settings() {
        let cli = Cli::try_parse_from([
            "gitinspect",
            "--copy-move",
            "3",
            "--blame-exclusions",
            "remove",
            "--git-timeout",
            "90s",
            "--ex-author",
            "*bot*",
            "analyze",
            "repo",
            "--extensions",
            "py,rs",
        ])
        .unwrap();
        let settings = cli.common.settings();
        assert_eq!(settings.copy_move_level.level(), 3);
        assert_eq!(settings.blame_exclusions, BlameExclusions::Remove);
        assert_eq!(settings.git_timeout_secs, 90);
        assert_eq!(settings.ex_authors, vec!["*bot*".to_string()]);
        match cli.command {
            Commands::Analyze { paths, extensions, .. } => {
                assert_eq!(paths, vec![PathBuf::from("repo")]);
                assert_eq!(extensions, vec!["py".to_string(), "rs".to_string()]);
            }
            Commands::Blame { .. } => panic!("expected analyze"),
        }
    }

    #[test]
    fn copy_move_above_four_is_rejected() {
        assert!(Cli::try_parse_from(["gitinspect", "--copy-move", "5", "analyze"]).is_err());
    }

    #[test]
    fn include_file_is_repeatable_and_blame_skip_excludes_history() {
        let cli = Cli::try_parse_from([
            "gitinspect",
            "analyze",
            "--include-file",
            "*.py",
            "--include-file",
            "docs/*",
            "--blame-skip",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze { include_files, blame_skip, .. } => {
                assert_eq!(include_files, vec!["*.py".to_string(), "docs/*".to_string()]);
                assert!(blame_skip);
            }
            Commands::Blame { .. } => panic!("expected analyze"),
        }
        assert!(Cli::try_parse_from(["gitinspect", "analyze", "--blame-skip", "--blame-history"]).is_err());
    }
}
