//! Repository catalog.

use crate::backend::ByteStore;
use crate::commit;
use crate::error::{Error, Result};
use crate::fs::SnapshotFs;
use crate::id::ObjectId;
use crate::index::MetadataIndex;
use crate::object::Commit;
use crate::reader::{ObjectReader, STORAGE_DIR};
use serde::Serialize;
use std::sync::Arc;

/// How the metadata index classifies a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Normal,
    /// A sub-folder shared as its own library.
    Virtual,
    /// Deleted and waiting in the trash.
    Garbage,
}

/// Descriptive metadata for a repository. Empty when no index is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoInfo {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub is_virtual: bool,
    pub is_garbage: bool,
}

impl RepoInfo {
    pub fn status(&self) -> RepoStatus {
        if self.is_virtual {
            RepoStatus::Virtual
        } else if self.is_garbage {
            RepoStatus::Garbage
        } else {
            RepoStatus::Normal
        }
    }

    /// Whether the repository can be opened for browsing.
    pub fn is_browsable(&self) -> bool {
        self.status() == RepoStatus::Normal
    }
}

/// Entry point over one seafile-data directory (or one snapshot of it).
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn ByteStore>,
    index: Option<Arc<MetadataIndex>>,
}

impl Storage {
    pub fn new(store: Arc<dyn ByteStore>, index: Option<Arc<MetadataIndex>>) -> Self {
        Self { store, index }
    }

    pub fn index(&self) -> Option<&MetadataIndex> {
        self.index.as_deref()
    }

    /// All repository ids: the directories under `storage/commits`.
    ///
    /// Virtual and garbage repositories are included.
    pub fn list_repo_ids(&self) -> Result<Vec<String>> {
        let commits_root = format!("{}/commits", STORAGE_DIR);
        Ok(self
            .store
            .list_dir(&commits_root)?
            .into_iter()
            .filter(|entry| entry.is_dir)
            .map(|entry| entry.name)
            .collect())
    }

    /// Look up a repository's metadata. Never touches the store.
    pub fn repo_info(&self, repo_id: &str) -> RepoInfo {
        let index = self.index();
        RepoInfo {
            id: repo_id.to_string(),
            name: index
                .and_then(|i| i.repo_name(repo_id))
                .unwrap_or_default()
                .to_string(),
            owner: index
                .and_then(|i| i.repo_owner(repo_id))
                .unwrap_or_default()
                .to_string(),
            is_virtual: index.is_some_and(|i| i.is_virtual(repo_id)),
            is_garbage: index.is_some_and(|i| i.is_garbage(repo_id)),
        }
    }

    /// Metadata for every repository, sorted by name, then owner, then id.
    pub fn list_repo_infos(&self) -> Result<Vec<RepoInfo>> {
        let mut infos: Vec<RepoInfo> = self
            .list_repo_ids()?
            .iter()
            .map(|id| self.repo_info(id))
            .collect();
        sort_for_display(&mut infos);
        Ok(infos)
    }

    /// Open a repository for browsing.
    ///
    /// Virtual and garbage repositories are rejected before any object is
    /// read.
    pub fn open_repo(&self, repo_id: &str) -> Result<Repository> {
        match self.repo_info(repo_id).status() {
            RepoStatus::Virtual => {
                return Err(Error::VirtualRepository {
                    repo_id: repo_id.to_string(),
                });
            }
            RepoStatus::Garbage => {
                return Err(Error::GarbageRepository {
                    repo_id: repo_id.to_string(),
                });
            }
            RepoStatus::Normal => {}
        }

        Ok(Repository {
            reader: ObjectReader::new(Arc::clone(&self.store), repo_id),
            index: self.index.clone(),
        })
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("has_index", &self.index.is_some())
            .finish()
    }
}

/// Display order for repository listings: name, then owner, then id.
pub fn sort_for_display(infos: &mut [RepoInfo]) {
    infos.sort_by(|a, b| {
        (a.name.as_str(), a.owner.as_str(), a.id.as_str()).cmp(&(
            b.name.as_str(),
            b.owner.as_str(),
            b.id.as_str(),
        ))
    });
}

/// An opened, browsable repository.
#[derive(Debug, Clone)]
pub struct Repository {
    reader: ObjectReader,
    index: Option<Arc<MetadataIndex>>,
}

impl Repository {
    pub fn id(&self) -> &str {
        self.reader.repo_id()
    }

    pub fn reader(&self) -> &ObjectReader {
        &self.reader
    }

    /// The commit the repository is browsed at by default.
    pub fn latest_commit(&self) -> Result<Commit> {
        commit::latest_commit(&self.reader, self.index.as_deref())
    }

    /// Any commit by id.
    pub fn commit(&self, commit_id: &str) -> Result<Commit> {
        self.reader.read_commit(&ObjectId::parse(commit_id)?)
    }

    /// Commits reachable from the latest one along first parents.
    pub fn history(&self, limit: Option<usize>) -> Result<Vec<Commit>> {
        let head = self.latest_commit()?;
        commit::history(&self.reader, head, limit)
    }

    /// Filesystem at the latest commit.
    pub fn latest_fs(&self) -> Result<SnapshotFs> {
        self.fs_at(self.latest_commit()?)
    }

    /// Filesystem at an arbitrary commit.
    pub fn fs_at(&self, commit: Commit) -> Result<SnapshotFs> {
        SnapshotFs::new(self.reader.clone(), commit)
    }
}
