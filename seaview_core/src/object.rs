//! Commit and fs object formats.
//!
//! Commit objects are stored as plain JSON:
//!
//! ```text
//! {"commit_id": "...", "root_id": "...", "description": "...",
//!  "ctime": 1700000000, "parent_id": "..." | null, ...}
//! ```
//!
//! Fs objects (directories and file metadata) are zlib-compressed JSON:
//!
//! ```text
//! {"type": 3, "version": 1, "dirents": [
//!     {"id": "...", "mode": 16384, "modifier": "...", "mtime": 0,
//!      "name": "...", "size": 0}, ...]}
//! {"type": 1, "version": 1, "block_ids": ["...", ...], "size": 12}
//! ```

use crate::error::{Error, Result};
use crate::id::ObjectId;
use flate2::read::ZlibDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Directory bit of a dirent's mode.
pub const MODE_DIR: u32 = 0x4000;

/// Fs object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    /// File metadata: the block chain.
    File = 1,
    /// Directory listing.
    Dir = 3,
}

impl ObjectType {
    /// Parse from the on-disk representation.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ObjectType::File),
            3 => Some(ObjectType::Dir),
            _ => None,
        }
    }
}

/// An entry in a directory object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dirent {
    /// Id of the child fs object.
    pub id: ObjectId,
    /// POSIX-style mode; only the directory bit is interpreted.
    pub mode: u32,
    /// Who last modified the entry.
    #[serde(default)]
    pub modifier: String,
    /// Modification time (epoch seconds).
    #[serde(default)]
    pub mtime: i64,
    /// Single path segment.
    pub name: String,
    /// Declared file size in bytes (files only).
    #[serde(default)]
    pub size: u64,
}

impl Dirent {
    pub fn is_dir(&self) -> bool {
        self.mode & MODE_DIR != 0
    }
}

#[derive(Deserialize)]
struct RawFsObject {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    block_ids: Vec<ObjectId>,
    #[serde(default)]
    dirents: Vec<Dirent>,
}

/// A decoded fs object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsObject {
    pub object_type: ObjectType,
    pub version: u32,
    /// Block chain, in content order (files only).
    pub block_ids: Vec<ObjectId>,
    /// Entries in stored order (directories only).
    pub dirents: Vec<Dirent>,
}

impl FsObject {
    /// The object every all-zero directory entry points at.
    pub fn empty_dir() -> Self {
        Self {
            object_type: ObjectType::Dir,
            version: 1,
            block_ids: Vec::new(),
            dirents: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.object_type == ObjectType::Dir
    }

    /// Find a direct child by exact name.
    pub fn child(&self, name: &str) -> Option<&Dirent> {
        self.dirents.iter().find(|d| d.name == name)
    }

    /// Decode a zlib-compressed fs object read from `path`.
    pub fn decode<R: Read>(reader: R, path: &str) -> Result<Self> {
        let mut body = Vec::new();
        ZlibDecoder::new(reader)
            .read_to_end(&mut body)
            .map_err(|e| Error::corrupted_object(path, format!("zlib: {}", e)))?;

        let raw: RawFsObject = serde_json::from_slice(&body)
            .map_err(|e| Error::corrupted_object(path, format!("json: {}", e)))?;

        let object_type = ObjectType::from_u8(raw.kind).ok_or_else(|| {
            Error::corrupted_object(path, format!("Invalid object type: {}", raw.kind))
        })?;

        Ok(Self {
            object_type,
            version: raw.version,
            block_ids: raw.block_ids,
            dirents: raw.dirents,
        })
    }
}

/// A commit: an immutable snapshot of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub commit_id: ObjectId,
    pub root_id: ObjectId,
    #[serde(default)]
    pub description: String,
    /// Creation time (epoch seconds).
    pub ctime: i64,
    #[serde(default)]
    pub parent_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_parent_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
}

impl Commit {
    /// Decode an uncompressed commit object read from `path`.
    pub fn decode<R: Read>(reader: R, path: &str) -> Result<Self> {
        serde_json::from_reader(std::io::BufReader::new(reader))
            .map_err(|e| Error::corrupted_object(path, format!("json: {}", e)))
    }

    /// Whether `self` is newer than `other`: larger ctime, then smaller id.
    pub fn is_newer_than(&self, other: &Commit) -> bool {
        (self.ctime, std::cmp::Reverse(&self.commit_id))
            > (other.ctime, std::cmp::Reverse(&other.commit_id))
    }
}
