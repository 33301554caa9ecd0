//! Parsers for raw git output. Nothing here spawns a process.

use crate::error::{InspectError, Result};
use crate::model::{FileLogEntry, FileState, LogCommit, RawBlameLine, TreeEntry};
use std::collections::HashMap;

pub const RECORD_SEP: char = '\x1e';
pub const FIELD_SEP: char = '\x1f';

/// `--format` argument matching [`parse_log`].
pub const LOG_FORMAT: &str = "--format=%x1e%H%x1f%P%x1f%ct%x1f%aN%x1f%aE%x1f%s";
/// `--format` argument matching [`parse_file_log`].
pub const FILE_LOG_FORMAT: &str = "--format=%x1e%H";

/// Commits as printed by `git log` with [`LOG_FORMAT`].
pub fn parse_log(output: &str) -> Result<Vec<LogCommit>> {
    output
        .split(RECORD_SEP)
        .map(|record| record.trim_end_matches('\n'))
        .filter(|record| !record.trim().is_empty())
        .map(|record| {
            let fields: Vec<&str> = record.splitn(6, FIELD_SEP).collect();
            let [sha, parents, timestamp, name, email, subject] = fields[..] else {
                return Err(InspectError::Parse(format!("malformed log record: {record:?}")));
            };
            let timestamp = timestamp
                .trim()
                .parse::<i64>()
                .map_err(|e| InspectError::Parse(format!("bad commit time '{timestamp}': {e}")))?;
            Ok(LogCommit {
                sha: sha.trim().to_string(),
                parents: parents.split_whitespace().map(str::to_string).collect(),
                timestamp,
                author_name: name.to_string(),
                author_email: email.to_string(),
                message: subject.to_string(),
            })
        })
        .collect()
}

/// Entries of `git log -z --follow --numstat` with [`FILE_LOG_FORMAT`],
/// newest first. Commits without a numstat entry, such as merges, are skipped.
///
/// With `-z` paths are never quoted and a rename is written as
/// `<ins>\t<del>\t\0<old>\0<new>\0`.
pub fn parse_file_log(output: &str) -> Result<Vec<FileLogEntry>> {
    let is_break = |c: char| c == '\n' || c == '\0';
    let mut entries = Vec::new();
    for record in output.split(RECORD_SEP) {
        let record = record.trim_start_matches(is_break);
        let Some((sha, rest)) = record.split_once(is_break) else {
            continue;
        };
        let mut fields = rest.split('\0');
        let Some(stat) = fields
            .by_ref()
            .map(|f| f.trim_start_matches('\n'))
            .find(|f| !f.is_empty())
        else {
            continue;
        };
        let (insertions, deletions, _, path) = parse_numstat_line(stat)?;
        let (previous_path, path) = if path.is_empty() {
            let (Some(old), Some(new)) = (fields.next(), fields.next()) else {
                return Err(InspectError::Parse(format!("truncated rename entry in {sha}")));
            };
            (Some(old.to_string()), new.to_string())
        } else {
            (None, path.to_string())
        };
        entries.push(FileLogEntry {
            sha: sha.trim().to_string(),
            path,
            previous_path,
            insertions,
            deletions,
        });
    }
    Ok(entries)
}

/// `<ins>\t<del>\t<path>`, where `-\t-` marks a binary file.
pub fn parse_numstat_line(line: &str) -> Result<(u64, u64, bool, &str)> {
    let mut parts = line.splitn(3, '\t');
    let (Some(ins), Some(del), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(InspectError::Parse(format!("malformed numstat line: {line:?}")));
    };
    if ins == "-" && del == "-" {
        return Ok((0, 0, true, path));
    }
    let parse = |n: &str| {
        n.parse::<u64>()
            .map_err(|e| InspectError::Parse(format!("bad numstat count '{n}': {e}")))
    };
    Ok((parse(ins)?, parse(del)?, false, path))
}

/// Output of `git blame --porcelain`.
pub fn parse_blame_porcelain(output: &str) -> Result<Vec<RawBlameLine>> {
    #[derive(Default, Clone)]
    struct CommitInfo {
        name: String,
        email: String,
        time: i64,
    }

    let mut commits: HashMap<String, CommitInfo> = HashMap::new();
    let mut lines = Vec::new();
    let mut current: Option<(String, u32)> = None;

    for line in output.lines() {
        if let Some(content) = line.strip_prefix('\t') {
            let Some((sha, line_nr)) = current.take() else {
                return Err(InspectError::Parse("blame content before header".to_string()));
            };
            let info = commits.get(&sha).cloned().unwrap_or_default();
            lines.push(RawBlameLine {
                line_nr,
                sha,
                author_name: info.name,
                author_email: info.email,
                timestamp: info.time,
                content: content.to_string(),
            });
            continue;
        }

        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        if is_object_id(key) {
            // <sha> <orig line> <final line> [<group size>]
            let final_line = value
                .split_whitespace()
                .nth(1)
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| InspectError::Parse(format!("malformed blame header: {line:?}")))?;
            commits.entry(key.to_string()).or_default();
            current = Some((key.to_string(), final_line));
            continue;
        }

        let Some((sha, _)) = &current else {
            continue;
        };
        let Some(info) = commits.get_mut(sha) else {
            continue;
        };
        match key {
            "author" => info.name = value.to_string(),
            "author-mail" => {
                info.email = value.trim_start_matches('<').trim_end_matches('>').to_string()
            }
            "author-time" => info.time = value.trim().parse().unwrap_or_default(),
            _ => {}
        }
    }
    Ok(lines)
}

fn is_object_id(token: &str) -> bool {
    matches!(token.len(), 40 | 64) && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Blobs of `git ls-tree -r -z`. Submodules and symlinks are left out.
pub fn parse_ls_tree(output: &str) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    for record in output.split('\0').filter(|r| !r.is_empty()) {
        let Some((meta, path)) = record.split_once('\t') else {
            return Err(InspectError::Parse(format!("malformed ls-tree entry: {record:?}")));
        };
        let fields: Vec<&str> = meta.split_whitespace().collect();
        let [mode, kind, _object] = fields[..] else {
            return Err(InspectError::Parse(format!("malformed ls-tree entry: {record:?}")));
        };
        if kind != "blob" || mode == "120000" {
            continue;
        }
        entries.push(TreeEntry {
            path: path.to_string(),
        });
    }
    Ok(entries)
}

/// Output of `git diff --numstat <empty tree> <commit> -- <path>`.
pub fn parse_file_state(output: &str) -> Result<FileState> {
    match output.lines().find(|l| !l.trim().is_empty()) {
        None => Ok(FileState::Absent),
        Some(line) => {
            let (_, _, binary, _) = parse_numstat_line(line)?;
            Ok(if binary { FileState::Binary } else { FileState::Text })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHA_A: &str = "1111111111111111111111111111111111111111";
    const SHA_B: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn log_records() {
        let out = format!(
            "\x1e{SHA_B}\x1f{SHA_A}\x1f1700000100\x1fBob\x1fbob@x.org\x1fsecond: a\x1fb\n\
             \x1e{SHA_A}\x1f\x1f1700000000\x1fAlice\x1falice@x.org\x1finitial\n"
        );
        let commits = parse_log(&out).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].parents, vec![SHA_A.to_string()]);
        assert_eq!(commits[0].message, "second: a\x1fb");
        assert!(commits[1].parents.is_empty());
        assert_eq!(commits[1].timestamp, 1_700_000_000);
        assert_eq!(commits[1].author_email, "alice@x.org");
    }

    #[test]
    fn log_rejects_short_record() {
        assert!(parse_log("\x1eabc\x1f\x1f12\n").is_err());
    }

    #[test]
    fn file_log_with_rename_and_binary() {
        let out = format!(
            "\x1e{SHA_B}\0\n0\t0\t\0src/old/lib.py\0src/new/lib.py\0\
             \x1e{SHA_A}\0\n12\t3\tsrc/old/lib.py\0\
             \x1e{SHA_A}\0\n-\t-\timage.png\0\
             \x1e{SHA_B}\0"
        );
        let entries = parse_file_log(&out).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].path, "src/new/lib.py");
        assert_eq!(entries[0].previous_path.as_deref(), Some("src/old/lib.py"));
        assert_eq!((entries[1].insertions, entries[1].deletions), (12, 3));
        assert_eq!((entries[2].path.as_str(), entries[2].insertions), ("image.png", 0));
    }

    #[test]
    fn file_log_keeps_paths_verbatim() {
        let out = format!("\x1e{SHA_A}\0\n3\t0\twe\"ird\\ name.py\0");
        let entries = parse_file_log(&out).unwrap();
        assert_eq!(entries[0].path, "we\"ird\\ name.py");
        assert_eq!(entries[0].previous_path, None);
    }

    #[test]
    fn file_log_rejects_truncated_rename() {
        let out = format!("\x1e{SHA_A}\0\n1\t0\t\0only-old.py");
        assert!(parse_file_log(&out).is_err());
    }

    #[test]
    fn blame_porcelain_uses_final_line_numbers() {
        let out = format!(
            "{SHA_A} 1 1 2\n\
             author Alice\n\
             author-mail <alice@x.org>\n\
             author-time 1700000000\n\
             author-tz +0000\n\
             summary initial\n\
             filename a.py\n\
             \tline one\n\
             {SHA_A} 2 2\n\
             \tline two\n\
             {SHA_B} 7 3 1\n\
             author Bob\n\
             author-mail <bob@x.org>\n\
             author-time 1700000500\n\
             previous {SHA_A} a.py\n\
             filename a.py\n\
             \t\n"
        );
        let lines = parse_blame_porcelain(&out).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].line_nr, 2);
        assert_eq!(lines[1].author_name, "Alice");
        assert_eq!(lines[1].content, "line two");
        assert_eq!(lines[2].line_nr, 3);
        assert_eq!(lines[2].author_email, "bob@x.org");
        assert_eq!(lines[2].timestamp, 1_700_000_500);
        assert_eq!(lines[2].content, "");
    }

    #[test]
    fn ls_tree_skips_submodules_and_links() {
        let out = format!(
            "100644 blob {SHA_A}\tsrc/a.py\0\
             160000 commit {SHA_B}\tvendor/sub\0\
             120000 blob {SHA_B}\tlink.py\0\
             100755 blob {SHA_B}\tsrc/with space.sh\0"
        );
        let entries = parse_ls_tree(&out).unwrap();
        assert_eq!(
            entries,
            vec![
                TreeEntry { path: "src/a.py".into() },
                TreeEntry { path: "src/with space.sh".into() },
            ]
        );
    }

    #[test]
    fn file_state_from_numstat() {
        assert_eq!(parse_file_state("").unwrap(), FileState::Absent);
        assert_eq!(parse_file_state("-\t-\tlogo.png\n").unwrap(), FileState::Binary);
        assert_eq!(parse_file_state("4\t0\ta.py\n").unwrap(), FileState::Text);
    }
}
