//! Object reader: maps ids to sharded store paths and decodes what it finds.

use crate::backend::{ByteStore, StoreEntry, StoreFile};
use crate::error::Result;
use crate::id::ObjectId;
use crate::object::{Commit, FsObject, MODE_DIR};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Root of all object directories inside a seafile-data directory.
pub const STORAGE_DIR: &str = "storage";

/// Default number of decoded fs objects kept per repository.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Reads the objects of a single repository.
///
/// Cloning is cheap; clones share the byte store and the fs object cache.
/// The cache holds at most `cache_capacity` objects and is emptied when full.
#[derive(Clone)]
pub struct ObjectReader {
    store: Arc<dyn ByteStore>,
    repo_id: String,
    cache: Arc<Mutex<HashMap<ObjectId, Arc<FsObject>>>>,
    cache_capacity: usize,
}

impl ObjectReader {
    pub fn new(store: Arc<dyn ByteStore>, repo_id: impl Into<String>) -> Self {
        Self {
            store,
            repo_id: repo_id.into(),
            cache: Arc::new(Mutex::new(HashMap::new())),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Limit the fs object cache to `capacity` entries (0 disables it).
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Directory holding the repository's objects of one kind.
    ///
    /// Returns: `storage/{kind}/{repo_id}`
    fn kind_dir(&self, kind: &str) -> String {
        format!("{}/{}/{}", STORAGE_DIR, kind, self.repo_id)
    }

    /// Directory holding the repository's commit objects.
    pub fn commits_dir(&self) -> String {
        self.kind_dir("commits")
    }

    /// Path of a commit object.
    pub fn commit_path(&self, id: &ObjectId) -> String {
        id.sharded_path(&self.kind_dir("commits"))
    }

    /// Path of an fs object.
    pub fn fs_path(&self, id: &ObjectId) -> String {
        id.sharded_path(&self.kind_dir("fs"))
    }

    /// Path of a block.
    pub fn block_path(&self, id: &ObjectId) -> String {
        id.sharded_path(&self.kind_dir("blocks"))
    }

    /// Resolve an fs object by id.
    ///
    /// `mode` is the mode of the entry that referenced the object (`None` for
    /// a commit's root). The all-zero id with the directory bit set is the
    /// empty directory and never touches the store.
    pub fn resolve(&self, id: &ObjectId, mode: Option<u32>) -> Result<Arc<FsObject>> {
        if id.is_zero() && mode.is_some_and(|m| m & MODE_DIR != 0) {
            return Ok(Arc::new(FsObject::empty_dir()));
        }

        if let Some(obj) = self.cache.lock().get(id) {
            return Ok(Arc::clone(obj));
        }

        let path = self.fs_path(id);
        debug!(repo = %self.repo_id, id = %id.short(), "loading fs object");
        let file = self.store.open(&path)?;
        let obj = Arc::new(FsObject::decode(file, &path)?);

        if self.cache_capacity > 0 {
            let mut cache = self.cache.lock();
            if cache.len() >= self.cache_capacity {
                debug!(repo = %self.repo_id, entries = cache.len(), "fs object cache full, clearing");
                cache.clear();
            }
            cache.insert(id.clone(), Arc::clone(&obj));
        }
        Ok(obj)
    }

    /// Open a raw block.
    pub fn open_block(&self, id: &ObjectId) -> Result<StoreFile> {
        self.store.open(&self.block_path(id))
    }

    /// Read and decode a commit object.
    pub fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        let path = self.commit_path(id);
        let file = self.store.open(&path)?;
        Commit::decode(file, &path)
    }

    /// List a directory of the underlying store.
    pub fn list_dir(&self, path: &str) -> Result<Vec<StoreEntry>> {
        self.store.list_dir(path)
    }

    /// Open a commit object by its store path (used by directory scans).
    pub(crate) fn read_commit_at(&self, path: &str) -> Result<Commit> {
        let file = self.store.open(path)?;
        Commit::decode(file, path)
    }

    /// Number of fs objects currently cached.
    pub fn cached_objects(&self) -> usize {
        self.cache.lock().len()
    }
}

impl std::fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("repo_id", &self.repo_id)
            .finish()
    }
}
