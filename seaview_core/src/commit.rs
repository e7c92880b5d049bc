//! Commit resolution: finding the commit a repository should be browsed at.

use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::index::MetadataIndex;
use crate::object::Commit;
use crate::reader::ObjectReader;
use tracing::{debug, warn};

/// Find the latest commit of the reader's repository.
///
/// If `index` records a `master` head for the repository, that commit is
/// used. Any failure to read it falls back to scanning every commit object
/// and keeping the one with the largest ctime (ties go to the smallest
/// commit id).
pub fn latest_commit(reader: &ObjectReader, index: Option<&MetadataIndex>) -> Result<Commit> {
    if let Some(head) = index.and_then(|idx| idx.head_commit(reader.repo_id())) {
        match ObjectId::parse(head).and_then(|id| reader.read_commit(&id)) {
            Ok(commit) => return Ok(commit),
            Err(e) => {
                warn!(
                    repo = %reader.repo_id(),
                    head = %head,
                    error = %e,
                    "indexed head commit unusable; scanning commit objects"
                );
            }
        }
    }

    scan_latest_commit(reader)
}

/// Scan `storage/commits/<repo>/*/*` and return the newest commit.
///
/// Objects that fail to decode are skipped. Store errors other than a
/// missing path are returned as-is.
pub fn scan_latest_commit(reader: &ObjectReader) -> Result<Commit> {
    let commits_dir = reader.commits_dir();
    let mut latest: Option<Commit> = None;
    let mut scanned = 0usize;

    for shard in reader.list_dir(&commits_dir)? {
        if !shard.is_dir {
            continue;
        }

        let shard_dir = format!("{}/{}", commits_dir, shard.name);
        for entry in reader.list_dir(&shard_dir)? {
            if entry.is_dir {
                continue;
            }

            let path = format!("{}/{}", shard_dir, entry.name);
            let commit = match reader.read_commit_at(&path) {
                Ok(commit) => commit,
                Err(e @ Error::CorruptedObject { .. }) => {
                    warn!(path = %path, error = %e, "skipping undecodable commit");
                    continue;
                }
                Err(e) => return Err(e),
            };
            scanned += 1;

            if latest.as_ref().is_none_or(|best| commit.is_newer_than(best)) {
                latest = Some(commit);
            }
        }
    }

    debug!(repo = %reader.repo_id(), scanned, "commit scan complete");
    latest.ok_or_else(|| Error::not_found(commits_dir))
}

/// Walk the first-parent chain starting at `start`, newest first.
///
/// Stops after `limit` commits (if given) or at the first commit without a
/// parent.
pub fn history(reader: &ObjectReader, start: Commit, limit: Option<usize>) -> Result<Vec<Commit>> {
    let mut commits = Vec::new();
    if limit == Some(0) {
        return Ok(commits);
    }
    let mut next = Some(start);

    while let Some(commit) = next.take() {
        let parent = commit.parent_id.clone();
        commits.push(commit);

        if limit.is_some_and(|n| commits.len() >= n) {
            break;
        }
        if let Some(parent) = parent {
            next = Some(reader.read_commit(&parent)?);
        }
    }

    Ok(commits)
}
