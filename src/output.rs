//! Rendering of analysis reports and blames for the command line.

use crate::analyze::blame_at;
use crate::config::Settings;
use crate::model::{AnalysisReport, BlameLine, RepositoryOutcome, RepositoryResult, SCHEMA_VERSION};
use crate::runner;
use anyhow::{bail, Context};
use chrono::Utc;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

const TABLE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Table,
    Json,
    Ndjson,
}

impl Format {
    pub fn from_flags(json: bool, ndjson: bool) -> Self {
        if json {
            Format::Json
        } else if ndjson {
            Format::Ndjson
        } else {
            Format::Table
        }
    }
}

pub fn exec_analyze(settings: &Settings, format: Format, blame_lines: bool) -> anyhow::Result<()> {
    let spinner = (format == Format::Table).then(|| spinner("Analysing repositories..."));
    let report = runner::run(settings);
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let mut report = report.context("Invalid analysis settings")?;

    if !blame_lines {
        for outcome in &mut report.repositories {
            if let RepositoryOutcome::Success(result) = outcome {
                result.blames.clear();
            }
        }
    }

    match format {
        Format::Json => output_json(&report)?,
        Format::Ndjson => output_ndjson(&report)?,
        Format::Table => output_table(&report)?,
    }

    if report.succeeded().next().is_none() {
        bail!("no repository could be analysed");
    }
    Ok(())
}

#[derive(Serialize)]
struct BlameOutput<'a> {
    version: u32,
    generated_at: chrono::DateTime<Utc>,
    repository: &'a Path,
    file: &'a str,
    commit: &'a str,
    lines: &'a [BlameLine],
}

pub fn exec_blame(settings: &Settings, repo: &Path, file: &str, at: &str, json: bool) -> anyhow::Result<()> {
    let spinner = (!json).then(|| spinner("Blaming..."));
    let lines = blame_at(repo, settings, file, at).context("Failed to compute blame");
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let lines = lines?;

    if json {
        let output = BlameOutput {
            version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            repository: repo,
            file,
            commit: at,
            lines: &lines,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        output_blame_table(&lines);
    }
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn output_json(report: &AnalysisReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn output_ndjson(report: &AnalysisReport) -> anyhow::Result<()> {
    for outcome in &report.repositories {
        println!("{}", serde_json::to_string(outcome)?);
    }
    Ok(())
}

fn output_table(report: &AnalysisReport) -> anyhow::Result<()> {
    for outcome in &report.repositories {
        match outcome {
            RepositoryOutcome::Success(result) => output_repository(result),
            RepositoryOutcome::Failed { path, reason } => {
                println!(
                    "{} {}: {}",
                    style("failed").red().bold(),
                    path.display(),
                    reason
                );
                println!();
            }
        }
    }
    Ok(())
}

fn output_repository(result: &RepositoryResult) {
    let head = result.head.as_deref().map(|h| &h[..h.len().min(10)]).unwrap_or("no commits");
    println!(
        "{} {} ({})",
        style("Repository").bold(),
        style(&result.name).cyan(),
        head
    );
    if result.cancelled {
        println!("{}", style("analysis was cancelled, results are partial").yellow());
    }
    println!();

    println!(
        "{:<30} {:>7} {:>9} {:>9} {:>7} {:>8} {:>9} {:>9}",
        style("Author").bold(),
        style("Commits").bold(),
        style("Insert").bold(),
        style("Delete").bold(),
        style("% Ins").bold(),
        style("Lines").bold(),
        style("Stability").bold(),
        style("Age").bold()
    );
    println!("{}", "─".repeat(97));
    for a in result.authors.iter().take(TABLE_LIMIT) {
        println!(
            "{:<30} {:>7} {:>9} {:>9} {:>7.1} {:>8} {:>9} {:>9}",
            truncate(&a.name, 30),
            a.commits,
            a.insertions,
            a.deletions,
            a.percent_insertions,
            a.lines,
            a.stability.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            a.age
        );
        if !a.aliases.is_empty() {
            println!("  {} {}", style("aka").dim(), a.aliases.join(", "));
        }
    }
    if result.authors.len() > TABLE_LIMIT {
        println!("\n... and {} more authors", result.authors.len() - TABLE_LIMIT);
    }
    println!();

    println!(
        "{:<50} {:>8} {:>7} {:>9} {:>7} {:>9}",
        style("File").bold(),
        style("Lines").bold(),
        style("Commits").bold(),
        style("Insert").bold(),
        style("Authors").bold(),
        style("Age").bold()
    );
    println!("{}", "─".repeat(95));
    for f in result.files.iter().take(TABLE_LIMIT) {
        println!(
            "{:<50} {:>8} {:>7} {:>9} {:>7} {:>9}",
            truncate(&f.path, 50),
            f.lines,
            f.commits,
            f.insertions,
            f.authors,
            f.age
        );
    }
    if result.files.len() > TABLE_LIMIT {
        println!("\n... and {} more files", result.files.len() - TABLE_LIMIT);
    }

    println!(
        "\n{} commits, {} insertions, {} deletions, {} lines",
        result.totals.commits, result.totals.insertions, result.totals.deletions, result.totals.lines
    );
    for failure in &result.file_failures {
        println!("{} {}: {}", style("skipped").yellow(), failure.path, failure.reason);
    }
    println!();
}

fn output_blame_table(lines: &[BlameLine]) {
    for line in lines {
        let sha = line.sha.as_deref().map(|s| &s[..s.len().min(8)]).unwrap_or("");
        let author = line.author.as_deref().unwrap_or("");
        let date = line
            .timestamp
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let text = format!(
            "{:>5} {:<8} {:<20} {:<10} {}",
            line.line_nr,
            sha,
            truncate(author, 20),
            date,
            line.content
        );
        if line.excluded {
            println!("{}", style(text).dim());
        } else {
            println!("{text}");
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_prefers_json() {
        assert_eq!(Format::from_flags(true, true), Format::Json);
        assert_eq!(Format::from_flags(false, true), Format::Ndjson);
        assert_eq!(Format::from_flags(false, false), Format::Table);
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 3), "éé…");
    }
}
