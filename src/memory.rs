// In-memory shards
// Each MemoryShard is an independent database instance behind the
// ShardHandle trait. In a real deployment each shard would be a separate
// server; here they all live in one process.

use crate::error::{Result, ShardError};
use crate::query::{QueryExecutor, QueryParser, QueryResult};
use crate::sharding::{
    statements, RowSet, ShardHandle, ShardIndex, ShardRegistry, ShardedQueryEngine,
};
use crate::storage::{StorageError, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// One shard: a query executor guarded for concurrent callers
pub struct MemoryShard {
    index: ShardIndex,
    db: Mutex<QueryExecutor>,
    open: AtomicBool,
}

impl MemoryShard {
    /// An empty shard with no tables
    pub fn new(index: ShardIndex) -> Self {
        Self {
            index,
            db: Mutex::new(QueryExecutor::new()),
            open: AtomicBool::new(true),
        }
    }

    /// A shard carrying the Student, Course and Grade tables
    pub fn with_schema(index: ShardIndex) -> Result<Self> {
        let shard = Self::new(index);
        for ddl in statements::SCHEMA {
            shard.run(ddl)?;
        }
        Ok(shard)
    }

    pub fn index(&self) -> ShardIndex {
        self.index
    }

    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(shard = self.index, "shard closed");
        }
    }

    /// Run one literal SQL statement (no placeholders)
    pub fn run(&self, sql: &str) -> Result<QueryResult> {
        self.run_with_params(sql, &[])
    }

    fn run_with_params(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        if !self.is_open() {
            return Err(ShardError::ShardUnavailable(self.index));
        }
        let query = QueryParser::parse_with_params(sql, params).map_err(|e| self.classify(e))?;
        self.lock()?.execute(query).map_err(|e| self.classify(e))
    }

    /// Live rows in a table, 0 when the table does not exist
    pub fn row_count(&self, table: &str) -> usize {
        self.lock()
            .map(|db| db.get_table(table).map(|t| t.row_count()).unwrap_or(0))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueryExecutor>> {
        self.db
            .lock()
            .map_err(|_| ShardError::Backend(format!("shard {} lock poisoned", self.index)))
    }

    /// Constraint failures from the row store become ConstraintViolation,
    /// everything else is a backend error
    fn classify(&self, error: anyhow::Error) -> ShardError {
        match error.downcast_ref::<StorageError>() {
            Some(storage) if storage.is_constraint() => {
                ShardError::ConstraintViolation(storage.to_string())
            }
            _ => ShardError::Backend(format!("shard {}: {:#}", self.index, error)),
        }
    }
}

impl ShardHandle for MemoryShard {
    fn execute(&self, statement: &str, params: &[Value]) -> Result<usize> {
        match self.run_with_params(statement, params)? {
            QueryResult::Affected(n) => Ok(n),
            QueryResult::Rows { rows, .. } => Ok(rows.len()),
            QueryResult::Message(_) => Ok(0),
        }
    }

    fn query(&self, statement: &str, params: &[Value]) -> Result<RowSet> {
        match self.run_with_params(statement, params)? {
            QueryResult::Rows { rows, column_names } => Ok(RowSet::new(column_names, rows)),
            _ => Err(ShardError::Backend(format!(
                "statement returned no rows: {}",
                statement
            ))),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// N in-memory shards plus the setup/teardown the engine leaves to its caller
pub struct MemoryCluster {
    shards: Vec<Arc<MemoryShard>>,
}

impl MemoryCluster {
    pub fn open(shard_count: usize) -> Result<Self> {
        if shard_count == 0 {
            return Err(ShardError::InvalidConfiguration(
                "must have at least one shard".to_string(),
            ));
        }

        let shards = (0..shard_count)
            .map(Self::open_shard)
            .collect::<Result<Vec<_>>>()?;
        info!(shard_count, "opened in-memory cluster");

        Ok(Self { shards })
    }

    pub fn open_shard(index: ShardIndex) -> Result<Arc<MemoryShard>> {
        Ok(Arc::new(MemoryShard::with_schema(index)?))
    }

    pub fn close_shard(shard: &MemoryShard) {
        shard.close();
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard(&self, index: ShardIndex) -> Option<&Arc<MemoryShard>> {
        self.shards.get(index)
    }

    pub fn registry(&self) -> Result<ShardRegistry<Arc<MemoryShard>>> {
        ShardRegistry::from_handles(self.shards.iter().cloned().enumerate())
    }

    pub fn engine(&self) -> Result<ShardedQueryEngine<Arc<MemoryShard>>> {
        ShardedQueryEngine::new(self.shard_count(), self.registry()?)
    }

    /// Replicate a course row to every shard
    ///
    /// Reference data, not a routed write: every shard needs the course to
    /// join its own grades against. Loading the same course twice is a no-op.
    pub fn load_course(&self, course_id: &str, title: &str, department: &str) -> Result<()> {
        for shard in &self.shards {
            shard.insert_if_absent(
                statements::INSERT_COURSE,
                &[
                    Value::from(course_id),
                    Value::from(title),
                    Value::from(department),
                ],
                statements::COURSE_EXISTS,
                &[Value::from(course_id)],
            )?;
        }
        Ok(())
    }

    pub fn close(&self) {
        for shard in &self.shards {
            Self::close_shard(shard);
        }
        info!(shard_count = self.shards.len(), "closed in-memory cluster");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_errors_are_classified() {
        let shard = MemoryShard::with_schema(0).unwrap();
        let params = [
            Value::from("s1"),
            Value::from("Ada"),
            Value::Integer(20),
            Value::from("a@x"),
        ];
        assert_eq!(shard.execute(statements::INSERT_STUDENT, &params).unwrap(), 1);

        let err = shard.execute(statements::INSERT_STUDENT, &params).unwrap_err();
        assert!(matches!(err, ShardError::ConstraintViolation(_)));

        let err = shard
            .execute("INSERT INTO Nowhere VALUES (?)", &[Value::Integer(1)])
            .unwrap_err();
        assert!(matches!(err, ShardError::Backend(_)));
    }

    #[test]
    fn test_insert_if_absent_is_idempotent_but_keeps_bad_data_errors() {
        let shard = MemoryShard::with_schema(0).unwrap();
        let insert = |name: Value| {
            shard.insert_if_absent(
                statements::INSERT_STUDENT,
                &[Value::from("s1"), name, Value::Integer(20), Value::from("a@x")],
                statements::STUDENT_EXISTS,
                &[Value::from("s1")],
            )
        };

        // NOT NULL name on a fresh key is a real violation
        assert!(matches!(
            insert(Value::Null),
            Err(ShardError::ConstraintViolation(_))
        ));
        assert!(insert(Value::from("Ada")).unwrap());
        assert!(!insert(Value::from("Ada")).unwrap());
        assert_eq!(shard.row_count("student"), 1);
    }

    #[test]
    fn test_closed_shard_is_unavailable() {
        let shard = MemoryShard::with_schema(2).unwrap();
        MemoryCluster::close_shard(&shard);
        assert!(!shard.is_open());
        assert_eq!(
            shard.query(statements::COUNT_GRADES, &[]).unwrap_err(),
            ShardError::ShardUnavailable(2)
        );
    }

    #[test]
    fn test_courses_replicate_to_every_shard() {
        let cluster = MemoryCluster::open(3).unwrap();
        cluster.load_course("c1", "Algorithms", "CS").unwrap();
        cluster.load_course("c1", "Algorithms", "CS").unwrap();

        for index in 0..3 {
            assert_eq!(cluster.shard(index).unwrap().row_count("Course"), 1);
        }
    }

    #[test]
    fn test_zero_shard_cluster_is_rejected() {
        assert!(matches!(
            MemoryCluster::open(0),
            Err(ShardError::InvalidConfiguration(_))
        ));
    }
}
