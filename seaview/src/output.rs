//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use chrono::DateTime;
use seaview_core::{Commit, FileInfo, RepoInfo, RepoState, RepoStatus};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Check if JSON mode is enabled.
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

/// Render epoch seconds as UTC.
pub fn format_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Repository line for `repos`.
#[derive(Debug, Clone, Serialize)]
pub struct RepoEntry {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub status: RepoStatus,
    pub browsable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepoEntry {
    pub fn new(info: &RepoInfo, state: &RepoState) -> Self {
        let (browsable, head, error) = match state {
            RepoState::Browsable(fs) => (true, Some(fs.commit().commit_id.to_string()), None),
            RepoState::Disabled(_) => (false, None, None),
            RepoState::Unavailable(reason) => (false, None, Some(reason.clone())),
        };
        Self {
            id: info.id.clone(),
            name: info.name.clone(),
            owner: info.owner.clone(),
            status: info.status(),
            browsable,
            head,
            error,
        }
    }

    /// One line of text output. Disabled repositories are marked, not hidden.
    pub fn to_line(&self) -> String {
        let marker = match (self.status, self.browsable) {
            (RepoStatus::Virtual, _) => " [virtual]",
            (RepoStatus::Garbage, _) => " [garbage]",
            (RepoStatus::Normal, false) => " [unavailable]",
            (RepoStatus::Normal, true) => "",
        };
        let name = if self.name.is_empty() { "-" } else { &self.name };
        let owner = if self.owner.is_empty() { "-" } else { &self.owner };
        format!("{}  {}  {}{}\n", self.id, name, owner, marker)
    }
}

/// Output for `repos` command.
#[derive(Debug, Serialize)]
pub struct ReposOutput {
    pub success: bool,
    pub result_code: u8,
    pub snapshot: String,
    pub repos: Vec<RepoEntry>,
}

/// Commit line for `log`.
#[derive(Debug, Clone, Serialize)]
pub struct CommitEntry {
    pub commit_id: String,
    pub root_id: String,
    pub ctime: i64,
    pub ctime_human: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
}

impl From<&Commit> for CommitEntry {
    fn from(commit: &Commit) -> Self {
        Self {
            commit_id: commit.commit_id.to_string(),
            root_id: commit.root_id.to_string(),
            ctime: commit.ctime,
            ctime_human: format_time(commit.ctime),
            description: commit.description.clone(),
            creator: commit.creator_name.clone(),
        }
    }
}

/// Output for `log` command.
#[derive(Debug, Serialize)]
pub struct LogOutput {
    pub success: bool,
    pub result_code: u8,
    pub repo: String,
    pub commits: Vec<CommitEntry>,
}

/// Output for `ls` command.
#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub success: bool,
    pub result_code: u8,
    pub repo: String,
    pub commit: String,
    pub path: String,
    pub entries: Vec<FileInfo>,
}

/// Format one `ls` entry.
pub fn format_entry(entry: &FileInfo, long: bool) -> String {
    let suffix = if entry.is_dir { "/" } else { "" };
    if long {
        format!(
            "{} {:>12} {} {}{}\n",
            if entry.is_dir { 'd' } else { '-' },
            entry.size,
            format_time(entry.mtime),
            entry.name,
            suffix
        )
    } else {
        format!("{}{}\n", entry.name, suffix)
    }
}

/// Output for `stat` command.
#[derive(Debug, Serialize)]
pub struct StatOutput {
    pub success: bool,
    pub result_code: u8,
    pub repo: String,
    pub commit: String,
    pub path: String,
    #[serde(flatten)]
    pub info: FileInfo,
    pub mtime_human: String,
}

/// Output for `snapshots` command.
#[derive(Debug, Serialize)]
pub struct SnapshotsOutput {
    pub success: bool,
    pub result_code: u8,
    pub snapshots: Vec<String>,
}
