// Sharding module
// Student and grade rows are horizontally partitioned across N shards by
// hashing the student id, so one student's profile and every one of their
// grades live on the same shard.
//
// - Routed operations (insert/update/delete/profile) touch one shard.
// - Aggregates (average per department, students with most courses) are
//   scatter-gather: every shard is queried in parallel and the partial
//   results are merged. Grouping keys are not shard-partitioned, so no
//   single shard can answer them alone.

pub mod engine;
pub mod handle;
pub mod merge;
pub mod router;
pub mod statements;

pub use engine::{ShardStats, ShardedQueryEngine, StudentProfile};
pub use handle::{RowSet, RowView, ShardHandle, ShardRegistry};
pub use merge::{CourseCounts, DepartmentScores, Mergeable, ScoreTally, TopStudents};
pub use router::{Router, ShardIndex, ShardKey};
