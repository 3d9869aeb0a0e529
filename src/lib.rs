// fragdb - a student/grade store sharded by student id
// This is the library root that exposes the public API

pub mod error;
pub mod memory;
pub mod query;
pub mod seed;
pub mod sharding;
pub mod storage;

// Re-export commonly used types for convenience
pub use error::{Result, ShardError, ShardFailure};
pub use memory::{MemoryCluster, MemoryShard};
pub use query::{QueryExecutor, QueryParser, QueryResult};
pub use seed::SeedData;
pub use sharding::{
    Router, RowSet, ShardHandle, ShardIndex, ShardKey, ShardRegistry, ShardStats,
    ShardedQueryEngine, StudentProfile,
};
pub use storage::{Column, DataType, Row, Schema, Value};
