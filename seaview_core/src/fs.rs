//! Read-only filesystem view of one commit.
//!
//! A [`SnapshotFs`] is rooted at a commit's root directory object. Paths are
//! resolved lazily, one directory object at a time. Opening a path yields a
//! [`FileHandle`], which streams file content block by block and supports
//! seeking to any byte offset.

use crate::backend::StoreFile;
use crate::error::{Error, Result};
use crate::object::{Commit, Dirent, FsObject, MODE_DIR};
use crate::reader::ObjectReader;
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

/// Metadata of a file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// Entry name; empty for the root.
    pub name: String,
    /// Declared size in bytes (0 for directories).
    pub size: u64,
    pub mode: u32,
    /// Modification time (epoch seconds); 0 for the root.
    pub mtime: i64,
    pub modifier: String,
    pub is_dir: bool,
}

impl FileInfo {
    fn root() -> Self {
        Self {
            name: String::new(),
            size: 0,
            mode: MODE_DIR,
            mtime: 0,
            modifier: String::new(),
            is_dir: true,
        }
    }

    fn from_dirent(dirent: &Dirent) -> Self {
        Self {
            name: dirent.name.clone(),
            size: if dirent.is_dir() { 0 } else { dirent.size },
            mode: dirent.mode,
            mtime: dirent.mtime,
            modifier: dirent.modifier.clone(),
            is_dir: dirent.is_dir(),
        }
    }
}

/// The filesystem of one commit.
#[derive(Debug, Clone)]
pub struct SnapshotFs {
    reader: ObjectReader,
    commit: Commit,
    root: Arc<FsObject>,
}

impl SnapshotFs {
    /// Load the root directory of `commit`.
    pub fn new(reader: ObjectReader, commit: Commit) -> Result<Self> {
        let root = reader.resolve(&commit.root_id, Some(MODE_DIR))?;
        if !root.is_dir() {
            return Err(Error::corrupted_object(
                reader.fs_path(&commit.root_id),
                "commit root is not a directory",
            ));
        }
        Ok(Self {
            reader,
            commit,
            root,
        })
    }

    pub fn commit(&self) -> &Commit {
        &self.commit
    }

    /// Open a path relative to the root. The empty path is the root itself.
    pub fn open(&self, path: &str) -> Result<FileHandle> {
        let mut current = FileHandle::new(self.reader.clone(), Arc::clone(&self.root), None);
        let mut walked = String::new();

        for segment in path.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            if !walked.is_empty() {
                walked.push('/');
            }
            walked.push_str(segment);

            current = current.open_child(segment, &walked)?;
        }

        Ok(current)
    }

    /// Stat a path.
    pub fn stat(&self, path: &str) -> Result<FileInfo> {
        Ok(self.open(path)?.stat())
    }

    /// List all entries of the directory at `path`.
    pub fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        self.open(path)?.read_dir(None)
    }
}

/// An open file or directory.
///
/// Handles carry their own cursor. They are not meant to be shared between
/// threads without external synchronization.
pub struct FileHandle {
    reader: ObjectReader,
    object: Arc<FsObject>,
    dirent: Option<Dirent>,
    closed: bool,

    // Directory listing cursor.
    dirent_idx: usize,

    // File read cursor.
    offset: u64,
    block_idx: usize,
    block_remaining: u64,
    block: Option<StoreFile>,
    // Set after a failed read or seek: the open block no longer matches
    // `offset` and must be located again.
    stale: bool,
}

impl FileHandle {
    fn new(reader: ObjectReader, object: Arc<FsObject>, dirent: Option<Dirent>) -> Self {
        Self {
            reader,
            object,
            dirent,
            closed: false,
            dirent_idx: 0,
            offset: 0,
            block_idx: 0,
            block_remaining: 0,
            block: None,
            stale: false,
        }
    }

    /// Descend into the child named `name`. `walked` is the path so far.
    fn open_child(&self, name: &str, walked: &str) -> Result<FileHandle> {
        if !self.object.is_dir() {
            return Err(Error::not_a_directory(walked));
        }

        let dirent = self
            .object
            .child(name)
            .ok_or_else(|| Error::not_found(walked))?;
        let object = self.reader.resolve(&dirent.id, Some(dirent.mode))?;

        Ok(FileHandle::new(
            self.reader.clone(),
            object,
            Some(dirent.clone()),
        ))
    }

    pub fn is_dir(&self) -> bool {
        self.object.is_dir()
    }

    /// Declared size: the authoritative end of the stream.
    pub fn size(&self) -> u64 {
        match &self.dirent {
            Some(d) if !self.object.is_dir() => d.size,
            _ => 0,
        }
    }

    /// Current read position.
    pub fn position(&self) -> u64 {
        self.offset
    }

    pub fn stat(&self) -> FileInfo {
        match &self.dirent {
            Some(d) => FileInfo::from_dirent(d),
            None => FileInfo::root(),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn check_file(&self, op: &str) -> Result<()> {
        self.check_open()?;
        if self.object.is_dir() {
            return Err(Error::invalid_operation(format!(
                "{} on a directory",
                op
            )));
        }
        Ok(())
    }

    /// Open the block at `block_idx` and make it the current block.
    fn open_current_block(&mut self) -> Result<&mut StoreFile> {
        let id = self.object.block_ids.get(self.block_idx).ok_or_else(|| {
            Error::corrupted_object(
                self.stat().name,
                format!(
                    "block chain ends at block {} before declared size {}",
                    self.block_idx,
                    self.size()
                ),
            )
        })?;
        let block = self.reader.open_block(id)?;
        self.block_remaining = block.size();
        Ok(self.block.insert(block))
    }

    fn close_block(&mut self) {
        self.block = None;
        self.block_remaining = 0;
    }

    /// Read up to `buf.len()` bytes. Returns 0 at end of file.
    ///
    /// If a block fails after some bytes were copied, those bytes are
    /// returned and the failure is reported by the next call.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_file("read")?;

        if self.stale {
            let target = self.offset;
            self.seek_to(SeekFrom::Start(target))?;
        }

        let mut total = 0;
        match self.read_blocks(buf, &mut total) {
            Ok(()) => Ok(total),
            Err(e) => {
                self.close_block();
                self.stale = true;
                if total > 0 { Ok(total) } else { Err(e) }
            }
        }
    }

    fn read_blocks(&mut self, buf: &mut [u8], total: &mut usize) -> Result<()> {
        let size = self.size();

        while *total < buf.len() && self.offset < size {
            if self.block.is_none() {
                self.open_current_block()?;
            }

            let want = (buf.len() - *total) as u64;
            let limit = want.min(size - self.offset).min(self.block_remaining) as usize;

            let n = match self.block.as_mut() {
                Some(block) if limit > 0 => block.read(&mut buf[*total..*total + limit])?,
                _ => 0,
            };

            *total += n;
            self.offset += n as u64;
            self.block_remaining -= n as u64;

            // A short read means the block held less than it claimed.
            if self.block_remaining == 0 || n == 0 {
                self.close_block();
                self.block_idx += 1;
            }
        }

        Ok(())
    }

    /// Move the read position. Returns the new absolute offset.
    ///
    /// Targets past the end are clamped to the declared size; targets before
    /// the start fail. The position is recomputed from the first block every
    /// time.
    pub fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_file("seek")?;

        let size = self.size();
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(self.offset) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(size) + i128::from(delta),
        };
        if target < 0 {
            return Err(Error::invalid_operation(format!(
                "seek to negative offset {}",
                target
            )));
        }
        let target = target.min(i128::from(size)) as u64;

        self.close_block();
        self.offset = 0;
        self.block_idx = 0;

        let result = self.walk_to(target);
        self.stale = result.is_err();
        if self.stale {
            self.close_block();
        }
        result
    }

    fn walk_to(&mut self, target: u64) -> Result<u64> {
        while self.offset < target {
            let distance = target - self.offset;
            let block = self.open_current_block()?;
            let block_size = block.size();

            if block_size > distance {
                block.seek(SeekFrom::Start(distance))?;
                self.block_remaining = block_size - distance;
                self.offset = target;
                break;
            }

            self.offset += block_size;
            self.close_block();
            self.block_idx += 1;
        }

        Ok(self.offset)
    }

    /// List directory entries in stored order.
    ///
    /// With `Some(n)` at most `n` entries are returned and the next call
    /// continues where this one stopped. `None` returns all remaining
    /// entries. An exhausted directory yields an empty vector.
    pub fn read_dir(&mut self, limit: Option<usize>) -> Result<Vec<FileInfo>> {
        self.check_open()?;
        if !self.object.is_dir() {
            return Err(Error::invalid_operation("read_dir on a file"));
        }

        let remaining = &self.object.dirents[self.dirent_idx.min(self.object.dirents.len())..];
        let count = limit.map_or(remaining.len(), |n| n.min(remaining.len()));

        let entries: Vec<FileInfo> = remaining[..count]
            .iter()
            .map(FileInfo::from_dirent)
            .collect();
        self.dirent_idx += count;

        Ok(entries)
    }

    /// Close the handle, releasing any open block.
    pub fn close(&mut self) {
        self.closed = true;
        self.close_block();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        Ok(self.seek_to(pos)?)
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.stat().name)
            .field("offset", &self.offset)
            .field("block_idx", &self.block_idx)
            .field("closed", &self.closed)
            .finish()
    }
}
