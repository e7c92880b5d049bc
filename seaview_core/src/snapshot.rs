//! Snapshots and the per-snapshot view cache.
//!
//! A snapshot is another copy of the seafile-data directory (e.g. a nightly
//! filesystem snapshot). Browsing one means pointing a [`Storage`] at a
//! different root. The empty snapshot name means the live store.

use crate::backend::{ByteStore, LocalStore};
use crate::error::{Error, Result};
use crate::fs::SnapshotFs;
use crate::index::MetadataIndex;
use crate::repo::{RepoInfo, RepoStatus, Storage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshot name of the live store.
pub const LATEST: &str = "";

/// Where snapshot roots come from.
pub trait SnapshotSource: Send + Sync {
    /// Names of all available snapshots.
    fn list_snapshots(&self) -> Result<Vec<String>>;

    /// Byte store rooted at the named snapshot.
    fn open_snapshot(&self, name: &str) -> Result<Arc<dyn ByteStore>>;
}

/// Snapshots stored as subdirectories of one local directory.
#[derive(Debug, Clone)]
pub struct LocalSnapshots {
    root: PathBuf,
}

impl LocalSnapshots {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl SnapshotSource for LocalSnapshots {
    fn list_snapshots(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_snapshot(&self, name: &str) -> Result<Arc<dyn ByteStore>> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(Error::not_found(format!("snapshot {:?}", name)));
        }
        Ok(Arc::new(LocalStore::open(self.root.join(name))?))
    }
}

/// What a repository looks like inside a snapshot view.
#[derive(Debug, Clone)]
pub enum RepoState {
    /// Ready to browse at its latest commit.
    Browsable(SnapshotFs),
    /// Listed but not navigable (virtual or garbage).
    Disabled(RepoStatus),
    /// The repository could not be loaded.
    Unavailable(String),
}

/// A repository in a snapshot view.
#[derive(Debug, Clone)]
pub struct RepoView {
    pub info: RepoInfo,
    pub state: RepoState,
}

/// Every repository of one snapshot, decoded up front.
#[derive(Debug)]
pub struct SnapshotView {
    name: String,
    storage: Storage,
    repos: Vec<RepoView>,
}

impl SnapshotView {
    /// Load all repositories of `storage`, in display order.
    pub fn build(name: &str, storage: Storage) -> Result<Self> {
        let mut repos = Vec::new();

        for info in storage.list_repo_infos()? {
            let state = if !info.is_browsable() {
                RepoState::Disabled(info.status())
            } else {
                match storage.open_repo(&info.id).and_then(|r| r.latest_fs()) {
                    Ok(fs) => RepoState::Browsable(fs),
                    Err(e) => {
                        warn!(snapshot = %name, repo = %info.id, error = %e, "repository unavailable");
                        RepoState::Unavailable(e.to_string())
                    }
                }
            };
            repos.push(RepoView { info, state });
        }

        info!(snapshot = %name, repos = repos.len(), "snapshot view built");
        Ok(Self {
            name: name.to_string(),
            storage,
            repos,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Repositories in display order.
    pub fn repos(&self) -> &[RepoView] {
        &self.repos
    }

    pub fn repo(&self, repo_id: &str) -> Option<&RepoView> {
        self.repos.iter().find(|r| r.info.id == repo_id)
    }

    /// Filesystem of a browsable repository.
    pub fn fs(&self, repo_id: &str) -> Result<&SnapshotFs> {
        let view = self
            .repo(repo_id)
            .ok_or_else(|| Error::not_found(repo_id))?;

        match &view.state {
            RepoState::Browsable(fs) => Ok(fs),
            RepoState::Disabled(RepoStatus::Virtual) => Err(Error::VirtualRepository {
                repo_id: repo_id.to_string(),
            }),
            RepoState::Disabled(_) => Err(Error::GarbageRepository {
                repo_id: repo_id.to_string(),
            }),
            RepoState::Unavailable(_) => Err(Error::not_found(repo_id)),
        }
    }
}

/// Slot holding the view of one snapshot once it has been built.
type ViewSlot = Arc<Mutex<Option<Arc<SnapshotView>>>>;

/// Memoizes one [`SnapshotView`] per snapshot name.
///
/// Each view is built at most once: the build runs while that snapshot's slot
/// is locked, so callers asking for other snapshots are not held up. Failed
/// builds are not cached.
pub struct SnapshotCache {
    latest: Arc<dyn ByteStore>,
    snapshots: Option<Arc<dyn SnapshotSource>>,
    index: Option<Arc<MetadataIndex>>,
    views: Mutex<HashMap<String, ViewSlot>>,
}

impl SnapshotCache {
    pub fn new(latest: Arc<dyn ByteStore>, index: Option<Arc<MetadataIndex>>) -> Self {
        Self {
            latest,
            snapshots: None,
            index,
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Enable browsing of snapshots from `source`.
    pub fn with_snapshots(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshots = Some(source);
        self
    }

    pub fn has_snapshots(&self) -> bool {
        self.snapshots.is_some()
    }

    /// Names of available snapshots; empty when none are configured.
    pub fn list_snapshots(&self) -> Result<Vec<String>> {
        match &self.snapshots {
            Some(source) => source.list_snapshots(),
            None => Ok(Vec::new()),
        }
    }

    /// A fresh [`Storage`] for the named snapshot ([`LATEST`] for the live
    /// store).
    pub fn storage(&self, name: &str) -> Result<Storage> {
        let store = if name == LATEST {
            Arc::clone(&self.latest)
        } else {
            let source = self
                .snapshots
                .as_ref()
                .ok_or_else(|| Error::not_found(format!("snapshot {:?}", name)))?;
            source.open_snapshot(name)?
        };
        Ok(Storage::new(store, self.index.clone()))
    }

    /// The view of the named snapshot, building it on first use.
    pub fn view(&self, name: &str) -> Result<Arc<SnapshotView>> {
        let slot = Arc::clone(self.views.lock().entry(name.to_string()).or_default());

        let mut built = slot.lock();
        if let Some(view) = built.as_ref() {
            return Ok(Arc::clone(view));
        }

        debug!(snapshot = %name, "building snapshot view");
        let view = Arc::new(SnapshotView::build(name, self.storage(name)?)?);
        *built = Some(Arc::clone(&view));
        Ok(view)
    }

    /// Number of views built so far.
    pub fn cached_views(&self) -> usize {
        let slots: Vec<ViewSlot> = self.views.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("has_snapshots", &self.snapshots.is_some())
            .field("has_index", &self.index.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::object::testutil::*;
    use std::io::Read;
    use tempfile::TempDir;

    const DUMP: &str = "\
INSERT INTO `RepoInfo` VALUES (1,'r1','Photos',0,1,0,'',0,NULL),(2,'r2','Archive',0,1,0,'',0,NULL);
INSERT INTO `VirtualRepo` VALUES (1,'r2','r1','/sub','c1c1c1');
";

    fn put_repo(store: &mut MemoryStore, repo: &str, content: &[u8]) {
        store.insert(
            format!("storage/commits/{}/c1/c1c1", repo),
            commit_object("c1c1c1", "root00", 100, None),
        );
        store.insert(
            format!("storage/fs/{}/ro/ot00", repo),
            dir_object(&[("file00", 0o100644, "f.txt", content.len() as u64)]),
        );
        store.insert(format!("storage/fs/{}/fi/le00", repo), file_object(&["h1h1"], content.len() as u64));
        store.insert(format!("storage/blocks/{}/h1/h1", repo), content.to_vec());
    }

    fn cache() -> SnapshotCache {
        let mut store = MemoryStore::new();
        put_repo(&mut store, "r1", b"live");
        put_repo(&mut store, "r2", b"sub");
        // r3 has a commit directory but no objects.
        store.insert("storage/commits/r3/aa/aaaa", b"{}".to_vec());

        SnapshotCache::new(Arc::new(store), Some(Arc::new(MetadataIndex::parse(DUMP))))
    }

    fn read(fs: &SnapshotFs, path: &str) -> Vec<u8> {
        let mut out = Vec::new();
        fs.open(path).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_view_states() {
        let cache = cache();
        let view = cache.view(LATEST).unwrap();

        let ids: Vec<_> = view.repos().iter().map(|r| r.info.id.as_str()).collect();
        // "" (r3, no index entry) < "Archive" < "Photos"
        assert_eq!(ids, vec!["r3", "r2", "r1"]);

        assert!(matches!(view.repo("r1").unwrap().state, RepoState::Browsable(_)));
        assert!(matches!(
            view.repo("r2").unwrap().state,
            RepoState::Disabled(RepoStatus::Virtual)
        ));
        assert!(matches!(view.repo("r3").unwrap().state, RepoState::Unavailable(_)));

        assert_eq!(read(view.fs("r1").unwrap(), "f.txt"), b"live");
        assert!(matches!(view.fs("r2"), Err(Error::VirtualRepository { .. })));
        assert!(view.fs("r3").unwrap_err().is_not_found());
        assert!(view.fs("zz").unwrap_err().is_not_found());
    }

    #[test]
    fn test_view_built_once() {
        let cache = cache();
        let first = cache.view(LATEST).unwrap();
        let second = cache.view(LATEST).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.cached_views(), 1);
    }

    #[test]
    fn test_view_built_once_across_threads() {
        let cache = Arc::new(cache());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.view(LATEST).unwrap())
            })
            .collect();
        let views: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for view in &views[1..] {
            assert!(Arc::ptr_eq(&views[0], view));
        }
    }

    /// A snapshot source whose first open blocks until released.
    struct GatedSnapshots {
        entered: std::sync::mpsc::Sender<()>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SnapshotSource for GatedSnapshots {
        fn list_snapshots(&self) -> Result<Vec<String>> {
            Ok(vec!["slow".to_string()])
        }

        fn open_snapshot(&self, _name: &str) -> Result<Arc<dyn ByteStore>> {
            let _ = self.entered.send(());
            let _ = self.release.lock().recv();
            let mut store = MemoryStore::new();
            put_repo(&mut store, "r9", b"old");
            Ok(Arc::new(store))
        }
    }

    #[test]
    fn test_slow_build_does_not_block_cached_views() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let source = Arc::new(GatedSnapshots {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        });
        let cache = Arc::new(cache().with_snapshots(source));
        let latest = cache.view(LATEST).unwrap();

        let slow = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.view("slow").map(|v| v.repos().len()))
        };
        entered_rx.recv().unwrap();

        // "slow" is mid-build; the live view is still served.
        assert!(Arc::ptr_eq(&latest, &cache.view(LATEST).unwrap()));

        release_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap().unwrap(), 1);
        assert_eq!(cache.cached_views(), 2);
    }

    #[test]
    fn test_cache_debug() {
        let debug = format!("{:?}", cache());
        assert!(debug.contains("SnapshotCache"));
        assert!(debug.contains("has_index: true"));
    }

    #[test]
    fn test_unknown_snapshot_without_source() {
        let cache = cache();
        assert!(cache.list_snapshots().unwrap().is_empty());
        assert!(cache.view("nightly").unwrap_err().is_not_found());
        assert_eq!(cache.cached_views(), 0);
    }

    #[test]
    fn test_local_snapshots() {
        let temp_dir = TempDir::new().unwrap();
        let snap = temp_dir.path().join("2024-01-01/storage/commits/r9/c1");
        std::fs::create_dir_all(&snap).unwrap();
        std::fs::write(
            snap.join("c1c1"),
            commit_object("c1c1c1", &"0".repeat(40), 1, None),
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"x").unwrap();

        let source = Arc::new(LocalSnapshots::new(temp_dir.path()));
        let cache = cache().with_snapshots(source);
        assert!(cache.has_snapshots());
        assert_eq!(cache.list_snapshots().unwrap(), vec!["2024-01-01"]);

        let view = cache.view("2024-01-01").unwrap();
        assert_eq!(view.name(), "2024-01-01");
        assert_eq!(view.repos().len(), 1);
        assert!(view.fs("r9").unwrap().read_dir("").unwrap().is_empty());

        assert!(cache.view("../etc").is_err());
        assert!(cache.view("missing").is_err());
        assert_eq!(cache.cached_views(), 1);
    }
}
