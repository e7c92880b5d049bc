//! Metadata index parsed from a SQL dump of the seafile database.
//!
//! Only `INSERT` statements are read, one per line, in the form mysqldump
//! writes them:
//!
//! ```text
//! INSERT INTO `Branch` VALUES (1,'master','<repo_id>','<commit_id>'),(2,...);
//! INSERT INTO `RepoInfo` VALUES (1,'<repo_id>','<name>',...);
//! INSERT INTO `RepoOwner` VALUES (1,'<repo_id>','<owner>');
//! INSERT INTO `VirtualRepo` VALUES (1,'<repo_id>','<origin_repo>',...);
//! INSERT INTO `GarbageRepos` VALUES (1,'<repo_id>');
//! ```
//!
//! Fields are split on `,` and stripped of surrounding single quotes. There
//! is no escape handling, so values containing `,` or `),(` are split
//! wrongly. Lines that do not frame correctly are skipped.

use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Branch whose head is browsed.
pub const MASTER_BRANCH: &str = "master";

/// Tables the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Branch,
    RepoInfo,
    RepoOwner,
    VirtualRepo,
    GarbageRepos,
}

impl Table {
    const ALL: [Table; 5] = [
        Table::Branch,
        Table::RepoInfo,
        Table::RepoOwner,
        Table::VirtualRepo,
        Table::GarbageRepos,
    ];

    fn name(self) -> &'static str {
        match self {
            Table::Branch => "Branch",
            Table::RepoInfo => "RepoInfo",
            Table::RepoOwner => "RepoOwner",
            Table::VirtualRepo => "VirtualRepo",
            Table::GarbageRepos => "GarbageRepos",
        }
    }

    /// Fewest fields a row needs for the columns we read.
    fn min_fields(self) -> usize {
        match self {
            Table::Branch => 3,
            Table::RepoInfo | Table::RepoOwner => 3,
            Table::VirtualRepo | Table::GarbageRepos => 2,
        }
    }

    /// Match `INSERT INTO <table> VALUES ` (quoted or not) and return the rest.
    fn strip_insert(line: &str) -> Option<(Table, &str)> {
        let rest = line.strip_prefix("INSERT INTO ")?;
        Table::ALL.into_iter().find_map(|table| {
            let name = table.name();
            let after = rest
                .strip_prefix('`')
                .and_then(|r| r.strip_prefix(name))
                .and_then(|r| r.strip_prefix('`'))
                .or_else(|| rest.strip_prefix(name))?;
            after.strip_prefix(" VALUES ").map(|values| (table, values))
        })
    }
}

/// Split `(a,'b'),(c,'d');` into rows of unquoted fields.
fn split_rows(values: &str) -> Option<Vec<Vec<&str>>> {
    let inner = values
        .trim_end()
        .strip_suffix(';')?
        .strip_prefix('(')?
        .strip_suffix(')')?;

    Some(
        inner
            .split("),(")
            .map(|tuple| {
                tuple
                    .split(',')
                    .map(|field| field.trim().trim_matches('\''))
                    .collect()
            })
            .collect(),
    )
}

/// Counters from a parse run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Recognized INSERT lines that were applied.
    pub lines_applied: usize,
    /// Recognized INSERT lines that were skipped as malformed.
    pub lines_skipped: usize,
}

/// Read-only lookup tables built from the metadata dump.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    heads: HashMap<String, String>,
    names: HashMap<String, String>,
    owners: HashMap<String, String>,
    virtual_repos: HashSet<String>,
    garbage_repos: HashSet<String>,
    stats: ParseStats,
}

impl MetadataIndex {
    /// Load a dump file. An unreadable file is a configuration error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::configuration(path, format!("cannot open dump: {}", e)))?;

        let index = Self::from_reader(BufReader::new(file))
            .map_err(|e| Error::configuration(path, format!("cannot read dump: {}", e)))?;

        info!(
            path = %path.display(),
            repos = index.names.len(),
            heads = index.heads.len(),
            skipped = index.stats.lines_skipped,
            "metadata index loaded"
        );
        Ok(index)
    }

    /// Parse a dump from a reader. Lines need not be valid UTF-8.
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut index = Self::default();
        for line in reader.split(b'\n') {
            let line = line?;
            index.apply_line(&String::from_utf8_lossy(&line));
        }
        Ok(index)
    }

    /// Parse a dump held in memory.
    pub fn parse(text: &str) -> Self {
        let mut index = Self::default();
        for line in text.lines() {
            index.apply_line(line);
        }
        index
    }

    fn apply_line(&mut self, line: &str) {
        let Some((table, values)) = Table::strip_insert(line) else {
            return;
        };

        let rows = split_rows(values)
            .filter(|rows| rows.iter().all(|row| row.len() >= table.min_fields()));
        let Some(rows) = rows else {
            debug!(table = table.name(), "skipping malformed INSERT line");
            self.stats.lines_skipped += 1;
            return;
        };

        for row in rows {
            self.apply_row(table, &row);
        }
        self.stats.lines_applied += 1;
    }

    fn apply_row(&mut self, table: Table, row: &[&str]) {
        match table {
            Table::Branch => {
                // Older schemas lack the leading id column; read from the end.
                let [name, repo_id, commit_id] = row[row.len() - 3..] else {
                    return;
                };
                if name == MASTER_BRANCH {
                    self.heads.insert(repo_id.to_string(), commit_id.to_string());
                }
            }
            Table::RepoInfo => {
                self.names.insert(row[1].to_string(), row[2].to_string());
            }
            Table::RepoOwner => {
                self.owners.insert(row[1].to_string(), row[2].to_string());
            }
            Table::VirtualRepo => {
                self.virtual_repos.insert(row[1].to_string());
            }
            Table::GarbageRepos => {
                self.garbage_repos.insert(row[1].to_string());
            }
        }
    }

    /// Head commit id of the repository's master branch.
    pub fn head_commit(&self, repo_id: &str) -> Option<&str> {
        self.heads.get(repo_id).map(String::as_str)
    }

    pub fn repo_name(&self, repo_id: &str) -> Option<&str> {
        self.names.get(repo_id).map(String::as_str)
    }

    pub fn repo_owner(&self, repo_id: &str) -> Option<&str> {
        self.owners.get(repo_id).map(String::as_str)
    }

    pub fn is_virtual(&self, repo_id: &str) -> bool {
        self.virtual_repos.contains(repo_id)
    }

    pub fn is_garbage(&self, repo_id: &str) -> bool {
        self.garbage_repos.contains(repo_id)
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const DUMP: &str = "\
-- MySQL dump 10.13
CREATE TABLE `Branch` (
  `id` bigint(20) NOT NULL AUTO_INCREMENT,
  `name` varchar(10) DEFAULT NULL
);
INSERT INTO `Branch` VALUES (1,'master','r1','c1c1c1'),(2,'local','r1','d2d2d2'),(3,'master','r2','e3e3e3');
INSERT INTO `RepoInfo` VALUES (1,'r1','Photos',1700000000,1,0,'alice@example.com',0,NULL),(2,'r2','Shared sub',1700000000,1,0,'bob@example.com',0,NULL);
INSERT INTO `RepoOwner` VALUES (1,'r1','alice@example.com'),(2,'r2','bob@example.com');
INSERT INTO `VirtualRepo` VALUES (1,'r2','r1','/sub','c1c1c1');
INSERT INTO `GarbageRepos` VALUES (1,'r3');
INSERT INTO `SeafileConf` VALUES (1,'x','y','z');
";

    #[test]
    fn test_parse_relations() {
        let index = MetadataIndex::parse(DUMP);

        assert_eq!(index.head_commit("r1"), Some("c1c1c1"));
        assert_eq!(index.head_commit("r2"), Some("e3e3e3"));
        assert_eq!(index.head_commit("r3"), None);

        assert_eq!(index.repo_name("r1"), Some("Photos"));
        assert_eq!(index.repo_name("r2"), Some("Shared sub"));
        assert_eq!(index.repo_owner("r1"), Some("alice@example.com"));

        assert!(index.is_virtual("r2"));
        assert!(!index.is_virtual("r1"));
        assert!(index.is_garbage("r3"));
        assert!(!index.is_garbage("r1"));

        assert_eq!(
            index.stats(),
            ParseStats {
                lines_applied: 5,
                lines_skipped: 0
            }
        );
    }

    #[test]
    fn test_only_master_branch_indexed() {
        let index =
            MetadataIndex::parse("INSERT INTO `Branch` VALUES (1,'local','r1','d2d2d2');\n");
        assert_eq!(index.head_commit("r1"), None);
    }

    #[test]
    fn test_branch_without_id_column() {
        let index = MetadataIndex::parse("INSERT INTO Branch VALUES ('master','r9','f9f9f9');");
        assert_eq!(index.head_commit("r9"), Some("f9f9f9"));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dump = "\
INSERT INTO `RepoOwner` VALUES (1,'r1','alice@example.com');
INSERT INTO `RepoOwner` VALUES (2,'r2','bob@example.com'
INSERT INTO `GarbageRepos` VALUES (1);
INSERT INTO `VirtualRepo` VALUES garbage
INSERT INTO `RepoInfo` VALUES (3,'r3','Docs',0,1,0,'',0,NULL);
";
        let index = MetadataIndex::parse(dump);

        assert_eq!(index.repo_owner("r1"), Some("alice@example.com"));
        assert_eq!(index.repo_owner("r2"), None);
        assert_eq!(index.repo_name("r3"), Some("Docs"));
        assert_eq!(index.stats().lines_applied, 2);
        assert_eq!(index.stats().lines_skipped, 3);
    }

    #[test]
    fn test_indented_or_unknown_lines_ignored() {
        let dump = "  INSERT INTO `GarbageRepos` VALUES (1,'r1');\nINSERT INTO `Other` VALUES (1,'r1');\n";
        let index = MetadataIndex::parse(dump);
        assert!(!index.is_garbage("r1"));
        assert_eq!(index.stats(), ParseStats::default());
    }

    #[test]
    fn test_load_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seafile.sql");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(DUMP.as_bytes()).unwrap();
        // A non-UTF-8 line does not abort the parse.
        file.write_all(b"INSERT INTO `GarbageRepos` VALUES (2,'\xff\xfe');\n")
            .unwrap();
        drop(file);

        let index = MetadataIndex::load(&path).unwrap();
        assert_eq!(index.head_commit("r1"), Some("c1c1c1"));
        assert!(index.is_garbage("r3"));
    }

    #[test]
    fn test_load_unreadable_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = MetadataIndex::load(temp_dir.path().join("missing.sql")).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
