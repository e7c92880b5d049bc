//! Object identifiers and their sharded storage layout.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a SHA-1 object id in hex characters.
pub const ID_HEX_LEN: usize = 40;

/// Content hash naming a commit, fs object or block.
///
/// Ids are used verbatim as storage keys: the first two characters pick the
/// shard directory and the rest is the file name. Only ASCII alphanumerics
/// are accepted so an id can never name anything outside its shard.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an id.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() < 3 {
            return Err(Error::invalid_object_id(format!(
                "Expected at least 3 characters, got {}",
                s.len()
            )));
        }

        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::invalid_object_id(format!(
                "Invalid characters in id: {:?}",
                s
            )));
        }

        Ok(ObjectId(s.to_string()))
    }

    /// The all-zero id Seafile stores for every empty directory.
    pub fn empty_dir() -> Self {
        ObjectId(hex::encode([0u8; ID_HEX_LEN / 2]))
    }

    /// Whether this is the all-zero sentinel id.
    pub fn is_zero(&self) -> bool {
        self.0.len() == ID_HEX_LEN && self.0.bytes().all(|b| b == b'0')
    }

    /// Get the first 2 characters (for directory sharding).
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }

    /// Get the remaining characters (for filename).
    pub fn suffix(&self) -> &str {
        &self.0[2..]
    }

    /// Sharded location of this id below `base`: `base/id[0:2]/id[2:]`.
    pub fn sharded_path(&self, base: &str) -> String {
        format!("{}/{}/{}", base, self.prefix(), self.suffix())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl TryFrom<String> for ObjectId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        ObjectId::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}
