// Error types for the sharding layer
// Every routed or scatter-gather operation returns these to its caller;
// nothing in the engine swallows an error it cannot classify.

use crate::sharding::ShardIndex;
use thiserror::Error;

pub type Result<T, E = ShardError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShardError {
    /// Bad shard count or a registry that does not fit it
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Empty or blank routing key
    #[error("invalid shard key: {0}")]
    InvalidKey(String),

    /// No handle registered for the index, or the handle is closed
    #[error("shard {0} is unavailable")]
    ShardUnavailable(ShardIndex),

    /// Point lookup matched no row
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend rejected the data (duplicate key, NULL, wrong type)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),

    /// A row came back without the columns or types the statement promises
    #[error("malformed row: {0}")]
    MalformedRow(String),

    /// One or more shards failed during a scatter-gather call
    #[error(
        "{} of {shard_count} shard(s) failed: {}",
        .failures.len(),
        describe_failures(.failures)
    )]
    PartialFailure {
        failures: Vec<ShardFailure>,
        shard_count: usize,
    },
}

impl ShardError {
    /// Indices of the shards that failed, for a PartialFailure
    pub fn failed_shards(&self) -> Vec<ShardIndex> {
        match self {
            ShardError::PartialFailure { failures, .. } => {
                failures.iter().map(|f| f.shard).collect()
            }
            ShardError::ShardUnavailable(index) => vec![*index],
            _ => Vec::new(),
        }
    }
}

/// Why one shard failed during a scatter-gather call
#[derive(Debug, Clone, PartialEq)]
pub struct ShardFailure {
    pub shard: ShardIndex,
    pub error: Box<ShardError>,
}

impl ShardFailure {
    pub fn new(shard: ShardIndex, error: ShardError) -> Self {
        Self {
            shard,
            error: Box::new(error),
        }
    }
}

impl std::fmt::Display for ShardFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shard {}: {}", self.shard, self.error)
    }
}

fn describe_failures(failures: &[ShardFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_names_every_shard() {
        let err = ShardError::PartialFailure {
            failures: vec![
                ShardFailure::new(1, ShardError::Backend("disk full".to_string())),
                ShardFailure::new(2, ShardError::ShardUnavailable(2)),
            ],
            shard_count: 3,
        };

        assert_eq!(err.failed_shards(), vec![1, 2]);
        assert_eq!(
            err.to_string(),
            "2 of 3 shard(s) failed: shard 1: backend error: disk full; \
             shard 2: shard 2 is unavailable"
        );
    }
}
