//! Byte store adapters.
//!
//! The core never touches the filesystem directly. Everything it reads goes
//! through a [`ByteStore`]: a read-only, hierarchical store addressed by
//! `/`-separated relative paths. [`LocalStore`] serves a directory on disk;
//! [`MemoryStore`] keeps everything in memory.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Readable and seekable byte stream.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// An opened object: its stream plus the size reported by the store.
pub struct StoreFile {
    size: u64,
    reader: Box<dyn ReadSeek>,
}

impl StoreFile {
    pub fn new(size: u64, reader: Box<dyn ReadSeek>) -> Self {
        Self { size, reader }
    }

    /// Size in bytes, as reported when the object was opened.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for StoreFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for StoreFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl std::fmt::Debug for StoreFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreFile").field("size", &self.size).finish()
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read-only hierarchical byte storage.
///
/// Paths are relative and `/`-separated. Missing paths must be reported as
/// [`Error::NotFound`]; any other failure is passed through untouched.
pub trait ByteStore: Send + Sync {
    /// Open a file for reading.
    fn open(&self, path: &str) -> Result<StoreFile>;

    /// Size of a file in bytes.
    fn stat(&self, path: &str) -> Result<u64>;

    /// List a directory.
    fn list_dir(&self, path: &str) -> Result<Vec<StoreEntry>>;
}

/// A byte store backed by a local directory (e.g. `seafile-data`).
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Serve the directory at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(Error::not_found(root.display().to_string()));
        }

        Ok(Self { root })
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store path onto the local filesystem.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut full = self.root.clone();
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(Error::invalid_operation(format!(
                        "Path escapes store root: {}",
                        path
                    )));
                }
                _ => full.push(segment),
            }
        }
        Ok(full)
    }
}

/// Convert an I/O error, keeping NotFound distinct.
fn map_io(err: std::io::Error, path: &str) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::not_found(path)
    } else {
        Error::Io { source: err }
    }
}

impl ByteStore for LocalStore {
    fn open(&self, path: &str) -> Result<StoreFile> {
        let full = self.resolve(path)?;
        let file = fs::File::open(&full).map_err(|e| map_io(e, path))?;
        let size = file.metadata().map_err(|e| map_io(e, path))?.len();
        Ok(StoreFile::new(size, Box::new(file)))
    }

    fn stat(&self, path: &str) -> Result<u64> {
        let full = self.resolve(path)?;
        let metadata = fs::metadata(&full).map_err(|e| map_io(e, path))?;
        Ok(metadata.len())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<StoreEntry>> {
        let full = self.resolve(path)?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(&full).map_err(|e| map_io(e, path))? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let is_dir = entry.file_type()?.is_dir();
            entries.push(StoreEntry { name, is_dir });
        }

        // read_dir order is unspecified; keep listings stable.
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// An in-memory byte store.
///
/// Directories exist implicitly as prefixes of stored file paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: BTreeMap<String, Arc<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` at `path`, replacing any previous content.
    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), Arc::new(data.into()));
    }

    fn normalize(path: &str) -> String {
        path.split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl ByteStore for MemoryStore {
    fn open(&self, path: &str) -> Result<StoreFile> {
        let data = self
            .files
            .get(&Self::normalize(path))
            .ok_or_else(|| Error::not_found(path))?;
        let size = data.len() as u64;
        Ok(StoreFile::new(size, Box::new(Cursor::new(data.as_ref().clone()))))
    }

    fn stat(&self, path: &str) -> Result<u64> {
        self.files
            .get(&Self::normalize(path))
            .map(|data| data.len() as u64)
            .ok_or_else(|| Error::not_found(path))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<StoreEntry>> {
        let dir = Self::normalize(path);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let mut entries: Vec<StoreEntry> = Vec::new();
        for key in self.files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let (name, is_dir) = match rest.split_once('/') {
                Some((head, _)) => (head, true),
                None => (rest, false),
            };
            if entries.iter().any(|e| e.name == name) {
                continue;
            }
            entries.push(StoreEntry {
                name: name.to_string(),
                is_dir,
            });
        }

        if entries.is_empty() {
            return Err(Error::not_found(path));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_open_and_stat() {
        let mut store = MemoryStore::new();
        store.insert("storage/blocks/r1/ab/cdef", b"hello".to_vec());

        let mut file = store.open("storage/blocks/r1/ab/cdef").unwrap();
        assert_eq!(file.size(), 5);
        let mut buf = String::new();
        file.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello");

        assert_eq!(store.stat("storage/blocks/r1/ab/cdef").unwrap(), 5);
        assert!(matches!(
            store.open("storage/blocks/r1/ab/missing"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_memory_store_list_dir() {
        let mut store = MemoryStore::new();
        store.insert("storage/commits/r1/aa/1", b"{}".to_vec());
        store.insert("storage/commits/r1/aa/2", b"{}".to_vec());
        store.insert("storage/commits/r2/bb/3", b"{}".to_vec());
        store.insert("storage/commits/readme", b"x".to_vec());

        let entries = store.list_dir("storage/commits").unwrap();
        assert_eq!(
            entries,
            vec![
                StoreEntry {
                    name: "r1".to_string(),
                    is_dir: true
                },
                StoreEntry {
                    name: "r2".to_string(),
                    is_dir: true
                },
                StoreEntry {
                    name: "readme".to_string(),
                    is_dir: false
                },
            ]
        );

        assert!(matches!(
            store.list_dir("storage/fs"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_local_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("storage/blocks/r1/ab");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cdef"), b"0123456789").unwrap();

        let store = LocalStore::open(temp_dir.path()).unwrap();
        let mut file = store.open("storage/blocks/r1/ab/cdef").unwrap();
        assert_eq!(file.size(), 10);

        file.seek(SeekFrom::Start(4)).unwrap();
        let mut buf = [0u8; 3];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"456");

        let entries = store.list_dir("storage/blocks/r1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "ab");
        assert!(entries[0].is_dir);
    }

    #[test]
    fn test_local_store_not_found_and_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(temp_dir.path()).unwrap();

        assert!(matches!(
            store.open("storage/missing"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            store.list_dir("storage"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            store.open("../outside"),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_local_store_requires_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(LocalStore::open(temp_dir.path().join("nope")).is_err());
    }
}
