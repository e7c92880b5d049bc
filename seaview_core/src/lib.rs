//! # Seaview Core
//!
//! Read-only access to a Seafile-style content-addressed store.
//!
//! This library reads a `seafile-data` directory directly, without a running
//! server. Repositories are discovered from the commit store, the latest
//! commit is selected, and its directory tree is exposed as a filesystem whose
//! files are streamed from the chunked block store.
//!
//! ## Layout
//!
//! - `storage/commits/<repo>/<id[0:2]>/<id[2:]>`: commit objects (JSON)
//! - `storage/fs/<repo>/<id[0:2]>/<id[2:]>`: directory and file objects (zlib JSON)
//! - `storage/blocks/<repo>/<id[0:2]>/<id[2:]>`: raw file content
//!
//! An optional SQL dump of the seafile database supplies repository names,
//! owners, master branch heads and virtual/garbage flags.
//!
//! ## Example
//!
//! ```no_run
//! use seaview_core::{LocalStore, MetadataIndex, Storage};
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(LocalStore::open("/srv/seafile-data")?);
//! let index = MetadataIndex::load("/srv/seafile.sql")?;
//! let storage = Storage::new(store, Some(Arc::new(index)));
//!
//! for info in storage.list_repo_infos()? {
//!     println!("{} {} ({})", info.id, info.name, info.owner);
//! }
//!
//! let repo = storage.open_repo("7c0f3a1e-...")?;
//! let fs = repo.latest_fs()?;
//! let mut contents = String::new();
//! fs.open("docs/readme.md")?.read_to_string(&mut contents)?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod commit;
mod error;
mod fs;
mod id;
mod index;
mod object;
mod reader;
mod repo;
mod snapshot;

pub use backend::{ByteStore, LocalStore, MemoryStore, ReadSeek, StoreEntry, StoreFile};
pub use commit::{history, latest_commit, scan_latest_commit};
pub use error::{Error, Result};
pub use fs::{FileHandle, FileInfo, SnapshotFs};
pub use id::ObjectId;
pub use index::{MASTER_BRANCH, MetadataIndex, ParseStats};
pub use object::{Commit, Dirent, FsObject, MODE_DIR, ObjectType};
pub use reader::{DEFAULT_CACHE_CAPACITY, ObjectReader};
pub use repo::{RepoInfo, RepoStatus, Repository, Storage, sort_for_display};
pub use snapshot::{
    LATEST, LocalSnapshots, RepoState, RepoView, SnapshotCache, SnapshotSource, SnapshotView,
};
