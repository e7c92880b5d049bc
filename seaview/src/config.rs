//! Configuration file handling.
//!
//! ```toml
//! [location.local]
//! path = "/srv/seafile-data"
//! snapshot_path = "/srv/snapshots"   # optional
//! sql_file_path = "/srv/seafile.sql" # optional
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Default, Deserialize)]
pub struct Location {
    pub local: Option<LocalLocation>,
    /// Remote locations are recognized only to reject them.
    pub sftp: Option<toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalLocation {
    pub path: PathBuf,
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default)]
    pub sql_file_path: Option<PathBuf>,
}

/// Resolved locations after merging the config file with CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub snapshot_dir: Option<PathBuf>,
    pub sql_file: Option<PathBuf>,
}

/// Values given on the command line; these win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
    pub sql_file: Option<PathBuf>,
}

impl Config {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse config file content.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.location.sftp.is_some() {
            bail!("sftp locations are not supported; mount the store locally");
        }
        Ok(config)
    }

    /// Merge with command-line overrides.
    pub fn resolve(self, overrides: Overrides) -> Result<Settings> {
        let local = self.location.local;

        let data_dir = overrides
            .data_dir
            .or_else(|| local.as_ref().map(|l| l.path.clone()))
            .context("no location defined: set [location.local] path or pass --data-dir")?;

        Ok(Settings {
            data_dir,
            snapshot_dir: overrides
                .snapshot_dir
                .or_else(|| local.as_ref().and_then(|l| l.snapshot_path.clone())),
            sql_file: overrides
                .sql_file
                .or_else(|| local.as_ref().and_then(|l| l.sql_file_path.clone())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_local() {
        let config = Config::parse(
            r#"
[location.local]
path = "/srv/seafile-data"
sql_file_path = "/srv/seafile.sql"
"#,
        )
        .unwrap();

        let settings = config.resolve(Overrides::default()).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/srv/seafile-data"));
        assert_eq!(settings.snapshot_dir, None);
        assert_eq!(settings.sql_file, Some(PathBuf::from("/srv/seafile.sql")));
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::parse("[location.local]\npath = \"/a\"\nsnapshot_path = \"/s\"\n").unwrap();
        let settings = config
            .resolve(Overrides {
                data_dir: Some(PathBuf::from("/b")),
                ..Overrides::default()
            })
            .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/b"));
        assert_eq!(settings.snapshot_dir, Some(PathBuf::from("/s")));
    }

    #[test]
    fn test_missing_location() {
        let config = Config::parse("").unwrap();
        assert!(config.resolve(Overrides::default()).is_err());

        let settings = Config::default()
            .resolve(Overrides {
                data_dir: Some(PathBuf::from("/c")),
                ..Overrides::default()
            })
            .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/c"));
    }

    #[test]
    fn test_sftp_rejected() {
        let result = Config::parse("[location.sftp]\nhost = \"example.com:22\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::load(&temp_dir.path().join("seaview.toml")).is_err());

        let path = temp_dir.path().join("seaview.toml");
        std::fs::write(&path, "[location.local]\npath = \"/x\"\n").unwrap();
        assert!(Config::load(&path).is_ok());
    }
}
