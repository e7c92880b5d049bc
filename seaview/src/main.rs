mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, Overrides, Settings};
use output::{
    CommitEntry, LogOutput, LsOutput, OutputWriter, RepoEntry, ReposOutput, SnapshotsOutput,
    StatOutput,
};
use seaview_core::{
    LATEST, LocalSnapshots, LocalStore, MetadataIndex, SnapshotCache, SnapshotFs, Storage,
};
use std::io::{self, Read, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Seaview - browse a Seafile data directory without a server
#[derive(Parser)]
#[command(name = "seaview")]
#[command(about = "Read-only browser for Seafile-style content-addressed stores", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to SEAVIEW_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// seafile-data directory (overrides [location.local] path)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// SQL dump of the seafile database
    #[arg(long, global = true)]
    sql: Option<PathBuf>,

    /// Directory holding one seafile-data copy per snapshot
    #[arg(long, global = true)]
    snapshot_dir: Option<PathBuf>,

    /// Browse this snapshot instead of the live store
    #[arg(short, long, global = true)]
    snapshot: Option<String>,

    /// Browse this commit instead of the latest one
    #[arg(long, global = true)]
    commit: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List repositories
    Repos,

    /// Show commit history of a repository
    Log {
        /// Repository id
        repo: String,

        /// Maximum number of commits
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// List a directory
    Ls {
        /// Repository id
        repo: String,

        /// Directory path (defaults to the root)
        #[arg(default_value = "")]
        path: String,

        /// Show detailed information
        #[arg(short, long)]
        long: bool,
    },

    /// Output file content to stdout
    Cat {
        /// Repository id
        repo: String,

        /// File path
        path: String,

        /// Start reading at this byte
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Read at most this many bytes
        #[arg(long)]
        length: Option<u64>,
    },

    /// Show file or directory metadata
    Stat {
        /// Repository id
        repo: String,

        /// Path inside the repository
        path: String,
    },

    /// List available snapshots
    Snapshots,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let out = OutputWriter::new(cli.json);
    if let Err(e) = run(cli, &out) {
        let code = result_code(&e);
        out.write_error(&e, code);
        std::process::exit(code.into());
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Process exit code for a failed command.
fn result_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<seaview_core::Error>() {
        Some(e) if e.is_policy_rejection() => 3,
        Some(seaview_core::Error::Configuration { .. }) => 4,
        Some(e) if e.is_not_found() => 2,
        _ => 1,
    }
}

fn run(cli: Cli, out: &OutputWriter) -> Result<()> {
    let settings = load_settings(&cli)?;
    let cache = open_cache(&settings)?;
    let snapshot = cli.snapshot.as_deref().unwrap_or(LATEST);
    let target = |repo: &str| Target {
        snapshot,
        repo: repo.to_string(),
        commit: cli.commit.clone(),
    };

    match &cli.command {
        Commands::Repos => cmd_repos(&cache, snapshot, out),
        Commands::Log { repo, limit } => cmd_log(&cache, &target(repo), *limit, out),
        Commands::Ls { repo, path, long } => cmd_ls(&cache, &target(repo), path, *long, out),
        Commands::Cat {
            repo,
            path,
            offset,
            length,
        } => cmd_cat(&cache, &target(repo), path, *offset, *length, out),
        Commands::Stat { repo, path } => cmd_stat(&cache, &target(repo), path, out),
        Commands::Snapshots => cmd_snapshots(&cache, out),
    }
}

/// Which repository to browse, and where.
struct Target<'a> {
    snapshot: &'a str,
    repo: String,
    commit: Option<String>,
}

impl Target<'_> {
    fn storage(&self, cache: &SnapshotCache) -> Result<Storage> {
        Ok(cache.storage(self.snapshot)?)
    }

    fn open_fs(&self, cache: &SnapshotCache) -> Result<SnapshotFs> {
        open_fs(&self.storage(cache)?, &self.repo, self.commit.as_deref())
    }
}

/// Determine locations: CLI flags > config file (--config or SEAVIEW_CONFIG).
fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var("SEAVIEW_CONFIG").ok().map(PathBuf::from));

    let config = match path {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    config.resolve(Overrides {
        data_dir: cli.data_dir.clone(),
        snapshot_dir: cli.snapshot_dir.clone(),
        sql_file: cli.sql.clone(),
    })
}

fn open_cache(settings: &Settings) -> Result<SnapshotCache> {
    let store = LocalStore::open(&settings.data_dir).with_context(|| {
        format!(
            "Failed to open data directory {}",
            settings.data_dir.display()
        )
    })?;

    // An unreadable dump is fatal; a missing setting just means no metadata.
    let index = match &settings.sql_file {
        Some(path) => {
            let index = MetadataIndex::load(path)?;
            debug!(applied = index.stats().lines_applied, "metadata index loaded");
            Some(Arc::new(index))
        }
        None => None,
    };

    let cache = SnapshotCache::new(Arc::new(store), index);
    Ok(match &settings.snapshot_dir {
        Some(dir) => cache.with_snapshots(Arc::new(LocalSnapshots::new(dir))),
        None => cache,
    })
}

/// Filesystem of one repository at `commit`, or at its latest commit.
fn open_fs(storage: &Storage, repo_id: &str, commit: Option<&str>) -> Result<SnapshotFs> {
    let repo = storage.open_repo(repo_id)?;
    let fs = match commit {
        Some(id) => {
            let commit = repo
                .commit(id)
                .with_context(|| format!("Failed to read commit {}", id))?;
            repo.fs_at(commit)?
        }
        None => repo
            .latest_fs()
            .with_context(|| format!("Failed to load repository {}", repo_id))?,
    };
    Ok(fs)
}

fn cmd_repos(cache: &SnapshotCache, snapshot: &str, out: &OutputWriter) -> Result<()> {
    let view = cache.view(snapshot)?;
    let repos: Vec<RepoEntry> = view
        .repos()
        .iter()
        .map(|r| RepoEntry::new(&r.info, &r.state))
        .collect();

    let output = ReposOutput {
        success: true,
        result_code: 0,
        snapshot: view.name().to_string(),
        repos: repos.clone(),
    };

    out.write(&output, || repos.iter().map(RepoEntry::to_line).collect())
}

fn cmd_log(cache: &SnapshotCache, target: &Target, limit: usize, out: &OutputWriter) -> Result<()> {
    let repo = target.storage(cache)?.open_repo(&target.repo)?;

    let commits = match target.commit.as_deref() {
        Some(id) => seaview_core::history(repo.reader(), repo.commit(id)?, Some(limit))?,
        None => repo.history(Some(limit))?,
    };
    let commits: Vec<CommitEntry> = commits.iter().map(CommitEntry::from).collect();

    let output = LogOutput {
        success: true,
        result_code: 0,
        repo: target.repo.clone(),
        commits: commits.clone(),
    };

    out.write(&output, || {
        let mut text = String::new();
        for c in &commits {
            text.push_str(&format!("commit {}\n", c.commit_id));
            if let Some(creator) = &c.creator {
                text.push_str(&format!("Author: {}\n", creator));
            }
            text.push_str(&format!("Date:   {}\n\n    {}\n\n", c.ctime_human, c.description));
        }
        text
    })
}

fn cmd_ls(
    cache: &SnapshotCache,
    target: &Target,
    path: &str,
    long: bool,
    out: &OutputWriter,
) -> Result<()> {
    let fs = target.open_fs(cache)?;
    let entries = fs
        .read_dir(path)
        .with_context(|| format!("Failed to list {}", path))?;

    let output = LsOutput {
        success: true,
        result_code: 0,
        repo: target.repo.clone(),
        commit: fs.commit().commit_id.to_string(),
        path: path.to_string(),
        entries: entries.clone(),
    };

    out.write(&output, || {
        entries
            .iter()
            .map(|e| output::format_entry(e, long))
            .collect()
    })
}

fn cmd_cat(
    cache: &SnapshotCache,
    target: &Target,
    path: &str,
    offset: u64,
    length: Option<u64>,
    out: &OutputWriter,
) -> Result<()> {
    if out.is_json() {
        anyhow::bail!("cat writes raw file content; --json is not supported");
    }

    let fs = target.open_fs(cache)?;
    let mut file = fs
        .open(path)
        .with_context(|| format!("Failed to open {}", path))?;
    if file.is_dir() {
        anyhow::bail!("{} is a directory", path);
    }

    file.seek_to(SeekFrom::Start(offset))?;
    let mut reader = file.take(length.unwrap_or(u64::MAX));
    let mut stdout = io::stdout().lock();
    io::copy(&mut reader, &mut stdout).with_context(|| format!("Failed to read {}", path))?;

    Ok(())
}

fn cmd_stat(cache: &SnapshotCache, target: &Target, path: &str, out: &OutputWriter) -> Result<()> {
    let fs = target.open_fs(cache)?;
    let info = fs
        .stat(path)
        .with_context(|| format!("Failed to stat {}", path))?;

    let output = StatOutput {
        success: true,
        result_code: 0,
        repo: target.repo.clone(),
        commit: fs.commit().commit_id.to_string(),
        path: path.to_string(),
        mtime_human: output::format_time(info.mtime),
        info,
    };

    out.write(&output, || {
        let info = &output.info;
        let mut text = format!("Path: /{}\n", path.trim_start_matches('/'));
        text.push_str(&format!(
            "Type: {}\n",
            if info.is_dir { "directory" } else { "file" }
        ));
        text.push_str(&format!("Size: {} bytes\n", info.size));
        text.push_str(&format!("Mode: {:o}\n", info.mode));
        text.push_str(&format!("Modified: {}\n", output.mtime_human));
        if !info.modifier.is_empty() {
            text.push_str(&format!("Modifier: {}\n", info.modifier));
        }
        text.push_str(&format!("Commit: {}\n", output.commit));
        text
    })
}

fn cmd_snapshots(cache: &SnapshotCache, out: &OutputWriter) -> Result<()> {
    if !cache.has_snapshots() {
        anyhow::bail!("no snapshot directory configured: set snapshot_path or pass --snapshot-dir");
    }
    let snapshots = cache.list_snapshots()?;

    let output = SnapshotsOutput {
        success: true,
        result_code: 0,
        snapshots: snapshots.clone(),
    };

    out.write(&output, || {
        snapshots.iter().map(|s| format!("{}\n", s)).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const REPO: &str = "4d9a7f2c-0000-4000-8000-000000000001";
    const SHARED: &str = "4d9a7f2c-0000-4000-8000-000000000002";

    /// A data directory with two repositories whose head commits point at the
    /// empty directory, plus a dump marking the second one virtual.
    fn fixture() -> (TempDir, Settings) {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("seafile-data");
        let empty_root = "0".repeat(40);

        for repo in [REPO, SHARED] {
            let dir = data.join("storage/commits").join(repo).join("c1");
            fs::create_dir_all(&dir).unwrap();
            let commit = serde_json::json!({
                "commit_id": "c1c1c1",
                "root_id": empty_root,
                "description": "Initial",
                "ctime": 1_700_000_000,
            });
            fs::write(dir.join("c1c1"), commit.to_string()).unwrap();
        }

        let sql = temp_dir.path().join("seafile.sql");
        fs::write(
            &sql,
            format!(
                "INSERT INTO `RepoInfo` VALUES (1,'{REPO}','Docs',0,1,0,'',0,NULL);\n\
                 INSERT INTO `VirtualRepo` VALUES (1,'{SHARED}','{REPO}','/sub','c1c1c1');\n"
            ),
        )
        .unwrap();

        let settings = Settings {
            data_dir: data,
            snapshot_dir: None,
            sql_file: Some(sql),
        };
        (temp_dir, settings)
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "seaview", "ls", REPO, "docs", "-l", "--json", "--commit", "c1c1c1",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.commit.as_deref(), Some("c1c1c1"));
        assert_eq!(cli.snapshot, None);
        assert!(matches!(
            cli.command,
            Commands::Ls { ref path, long: true, .. } if path == "docs"
        ));

        let cli = Cli::try_parse_from(["seaview", "cat", REPO, "a.txt", "--offset", "10"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cat {
                offset: 10,
                length: None,
                ..
            }
        ));
    }

    #[test]
    fn test_open_fs_latest_and_by_commit() {
        let (_temp_dir, settings) = fixture();
        let cache = open_cache(&settings).unwrap();
        let storage = cache.storage(LATEST).unwrap();

        let fs = open_fs(&storage, REPO, None).unwrap();
        assert_eq!(fs.commit().description, "Initial");
        assert!(fs.read_dir("").unwrap().is_empty());

        let fs = open_fs(&storage, REPO, Some("c1c1c1")).unwrap();
        assert_eq!(fs.commit().commit_id.as_str(), "c1c1c1");

        let err = open_fs(&storage, REPO, Some("d2d2d2")).unwrap_err();
        assert_eq!(result_code(&err), 2);
    }

    #[test]
    fn test_result_codes() {
        let (_temp_dir, settings) = fixture();
        let cache = open_cache(&settings).unwrap();
        let storage = cache.storage(LATEST).unwrap();

        let err = open_fs(&storage, SHARED, None).unwrap_err();
        assert_eq!(result_code(&err), 3);

        let err = open_fs(&storage, "no-such-repo", None).unwrap_err();
        assert_eq!(result_code(&err), 2);

        assert_eq!(result_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn test_unreadable_dump_prevents_startup() {
        let (temp_dir, mut settings) = fixture();
        settings.sql_file = Some(temp_dir.path().join("missing.sql"));

        let err = open_cache(&settings).unwrap_err();
        assert_eq!(result_code(&err), 4);
    }

    #[test]
    fn test_repos_view_keeps_disabled() {
        let (_temp_dir, settings) = fixture();
        let cache = open_cache(&settings).unwrap();
        let view = cache.view(LATEST).unwrap();

        let entries: Vec<RepoEntry> = view
            .repos()
            .iter()
            .map(|r| RepoEntry::new(&r.info, &r.state))
            .collect();
        assert_eq!(entries.len(), 2);

        let shared = entries.iter().find(|e| e.id == SHARED).unwrap();
        assert!(!shared.browsable);
        let docs = entries.iter().find(|e| e.id == REPO).unwrap();
        assert!(docs.browsable);
        assert_eq!(docs.head.as_deref(), Some("c1c1c1"));
    }
}
