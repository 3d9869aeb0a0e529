// Query module - parses parameterized SQL and executes it against one shard
pub mod executor;
pub mod parser;

pub use executor::{QueryExecutor, QueryResult};
pub use parser::{Query, QueryParser};
