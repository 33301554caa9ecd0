use crate::cancel::CancelToken;
use crate::config::CopyMoveLevel;
use crate::error::{InspectError, Result};
use crate::git::parse;
use crate::model::{FileLogEntry, FileState, LogCommit, RawBlameLine, TreeEntry};
use std::ffi::OsStr;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Object id of the empty tree in SHA-1 repositories.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Options of a per-file `git log --follow` scan.
#[derive(Debug, Clone)]
pub struct FileLogOptions {
    pub rename_threshold: u8,
    pub include_whitespace: bool,
    pub include_merges: bool,
}

/// Options of a `git blame` run.
#[derive(Debug, Clone, Default)]
pub struct BlameOptions {
    pub copy_move: CopyMoveLevel,
    pub include_whitespace: bool,
    /// Full commit ids passed as `--ignore-rev`.
    pub ignore_revs: Vec<String>,
    pub ignore_revs_file: Option<PathBuf>,
}

/// Runs `git` subprocesses in one working tree.
///
/// Cheap to clone and safe to share between worker threads. Every call is
/// bounded by a timeout, retried once when that timeout fires, and killed
/// as soon as the cancel token is set.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
    timeout: Duration,
    cancel: CancelToken,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `git <args>` and return its stdout.
    pub fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<String> {
        match self.run_once(args) {
            Err(err) if err.is_transient() => {
                warn!(error = %err, "retrying git command");
                self.run_once(args)
            }
            other => other,
        }
    }

    fn run_once<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<String> {
        if self.cancel.is_cancelled() {
            return Err(InspectError::Cancelled);
        }

        let command = describe(args);
        debug!(%command, dir = %self.workdir.display(), "spawning git");

        let mut child = Command::new("git")
            .args(["-c", "core.quotepath=off", "--literal-pathspecs"])
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InspectError::GitCommand {
                command: command.clone(),
                stderr: if e.kind() == std::io::ErrorKind::NotFound {
                    "git executable not found".to_string()
                } else {
                    format!("failed to spawn git: {e}")
                },
            })?;

        // Drain both pipes while polling so a chatty child never blocks on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait(&mut child, &command)?;
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            return Err(InspectError::GitCommand {
                command,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn wait(&self, child: &mut Child, command: &str) -> Result<ExitStatus> {
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if self.cancel.is_cancelled() {
                kill(child);
                debug!(command, "git command killed on cancellation");
                return Err(InspectError::Cancelled);
            }
            if start.elapsed() > self.timeout {
                kill(child);
                warn!(command, timeout_secs = self.timeout.as_secs(), "git command timed out");
                return Err(InspectError::GitTimeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// All commits reachable from `head`, oldest first.
    pub fn log(&self, head: &str) -> Result<Vec<LogCommit>> {
        let out = self.run(&["log", "--reverse", parse::LOG_FORMAT, head])?;
        parse::parse_log(&out)
    }

    /// History of one file following renames, newest first.
    ///
    /// Merges are listed without a diff, so lines brought in by a merge stay
    /// with the commits that wrote them.
    pub fn file_log(&self, head: &str, path: &str, opts: &FileLogOptions) -> Result<Vec<FileLogEntry>> {
        let threshold = format!("-M{}%", opts.rename_threshold);
        let mut args = vec![
            "log",
            "-z",
            "--follow",
            threshold.as_str(),
            "--numstat",
            parse::FILE_LOG_FORMAT,
        ];
        if !opts.include_whitespace {
            args.push("-w");
        }
        if !opts.include_merges {
            args.push("--no-merges");
        }
        args.extend([head, "--", path]);

        let out = self.run(&args)?;
        parse::parse_file_log(&out)
    }

    /// Blobs tracked at `commit`.
    pub fn ls_tree(&self, commit: &str) -> Result<Vec<TreeEntry>> {
        let out = self.run(&["ls-tree", "-r", "-z", commit])?;
        parse::parse_ls_tree(&out)
    }

    /// Whether `path` exists at `commit` and whether git treats it as binary.
    pub fn file_state(&self, commit: &str, path: &str) -> Result<FileState> {
        let out = self.run(&["diff", "--numstat", EMPTY_TREE, commit, "--", path])?;
        parse::parse_file_state(&out)
    }

    /// Porcelain blame of `path` as of `commit`.
    pub fn blame(&self, commit: &str, path: &str, opts: &BlameOptions) -> Result<Vec<RawBlameLine>> {
        let mut args: Vec<String> = vec!["blame".into(), "--porcelain".into()];
        args.extend(opts.copy_move.blame_args().iter().map(|a| a.to_string()));
        if !opts.include_whitespace {
            args.push("-w".into());
        }
        for rev in &opts.ignore_revs {
            args.push("--ignore-rev".into());
            args.push(rev.clone());
        }
        if let Some(file) = &opts.ignore_revs_file {
            args.push("--ignore-revs-file".into());
            args.push(file.display().to_string());
        }
        args.extend([commit.to_string(), "--".into(), path.to_string()]);

        let out = self.run(&args)?;
        parse::parse_blame_porcelain(&out)
    }
}

fn describe<S: AsRef<OsStr>>(args: &[S]) -> String {
    let mut command = String::from("git");
    for arg in args {
        command.push(' ');
        command.push_str(&arg.as_ref().to_string_lossy());
    }
    command
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    fn cli(timeout: Duration) -> GitCli {
        GitCli::new(std::env::temp_dir(), timeout, CancelToken::new())
    }

    #[test]
    fn runs_git() {
        if !git_available() {
            return;
        }
        let out = cli(Duration::from_secs(30)).run(&["--version"]).unwrap();
        assert!(out.starts_with("git version"));
    }

    #[test]
    fn non_zero_exit_carries_command_and_stderr() {
        if !git_available() {
            return;
        }
        let err = cli(Duration::from_secs(30))
            .run(&["definitely-not-a-subcommand"])
            .unwrap_err();
        match err {
            InspectError::GitCommand { command, stderr } => {
                assert!(command.contains("definitely-not-a-subcommand"));
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn timeout_is_surfaced_after_retry() {
        if !git_available() {
            return;
        }
        let err = cli(Duration::from_nanos(1)).run(&["--version"]).unwrap_err();
        assert!(matches!(err, InspectError::GitTimeout { .. }));
    }

    #[test]
    fn cancelled_token_stops_before_spawning() {
        let git = cli(Duration::from_secs(30));
        git.cancel_token().cancel();
        assert!(matches!(git.run(&["--version"]), Err(InspectError::Cancelled)));
    }

    #[test]
    fn describe_joins_arguments() {
        assert_eq!(describe(&["log", "--", "a b.py"]), "git log -- a b.py");
    }
}
