// Shard routing
// A student id is hashed with SeaHash over its raw UTF-8 bytes and reduced
// modulo the shard count. Ids are never parsed as numbers, so "007" and "7"
// are different keys. Changing this scheme after data is written would
// misroute every existing record.

use crate::error::{Result, ShardError};
use seahash::hash;
use std::fmt;

/// Position of a shard in `[0, shard_count)`
pub type ShardIndex = usize;

/// A validated routing key (student identifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardKey(String);

impl ShardKey {
    /// Rejects empty and whitespace-only ids
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ShardError::InvalidKey(format!("{:?}", id)));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShardKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Maps routing keys to shard indices
///
/// Pure and deterministic: the same key always lands on the same shard for
/// a given shard count, independent of process, thread or call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Router {
    shard_count: usize,
}

impl Router {
    pub fn new(shard_count: usize) -> Result<Self> {
        if shard_count == 0 {
            return Err(ShardError::InvalidConfiguration(
                "shard count must be at least 1".to_string(),
            ));
        }
        Ok(Self { shard_count })
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn fragment_id(&self, key: &ShardKey) -> ShardIndex {
        (hash(key.as_str().as_bytes()) % self.shard_count as u64) as ShardIndex
    }
}
