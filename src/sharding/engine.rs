//! Sharded query engine.
//!
//! Routed operations hash the student id to exactly one shard and report
//! that shard's outcome. Aggregate operations fan out to every shard in
//! parallel and fold the partial results; if any shard fails the whole call
//! fails with a [`ShardError::PartialFailure`] naming each failed shard.

use super::handle::{ShardHandle, ShardRegistry};
use super::merge::{format_averages, CourseCounts, DepartmentScores, Mergeable, TopStudents};
use super::router::{Router, ShardIndex, ShardKey};
use super::statements as sql;
use crate::error::{Result, ShardError, ShardFailure};
use crate::storage::Value;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Name and email of one student
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub name: String,
    pub email: String,
}

impl fmt::Display for StudentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.name, self.email)
    }
}

/// Row counts held by one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardStats {
    pub shard_id: ShardIndex,
    pub students: usize,
    pub grades: usize,
}

impl ShardStats {
    pub fn format(&self) -> String {
        format!(
            "Shard {}: {} student(s), {} grade(s)",
            self.shard_id, self.students, self.grades
        )
    }
}

pub struct ShardedQueryEngine<H> {
    router: Router,
    shards: ShardRegistry<H>,
}

impl<H: ShardHandle> ShardedQueryEngine<H> {
    /// The registry may leave indices out (those shards report
    /// `ShardUnavailable` when used) but may not name one outside
    /// `[0, shard_count)`.
    pub fn new(shard_count: usize, shards: ShardRegistry<H>) -> Result<Self> {
        let router = Router::new(shard_count)?;
        if let Some(index) = shards.indices().find(|&i| i >= shard_count) {
            return Err(ShardError::InvalidConfiguration(format!(
                "shard {} registered but shard count is {}",
                index, shard_count
            )));
        }
        Ok(Self { router, shards })
    }

    pub fn shard_count(&self) -> usize {
        self.router.shard_count()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Release the registry so its owner can close the handles
    pub fn into_registry(self) -> ShardRegistry<H> {
        self.shards
    }

    /// Which shard owns a student's rows
    pub fn shard_for(&self, student_id: &str) -> Result<ShardIndex> {
        Ok(self.router.fragment_id(&ShardKey::new(student_id)?))
    }

    fn handle(&self, index: ShardIndex) -> Result<&H> {
        match self.shards.get(index) {
            Some(handle) if handle.is_open() => Ok(handle),
            _ => Err(ShardError::ShardUnavailable(index)),
        }
    }

    fn route(&self, student_id: &str) -> Result<(ShardIndex, &H)> {
        let index = self.shard_for(student_id)?;
        debug!(student_id, shard = index, "routing");
        Ok((index, self.handle(index)?))
    }

    // -------------------------------------------------------------------
    // Routed single-shard operations
    // -------------------------------------------------------------------

    /// Insert a student unless one with this id already exists
    /// Returns true when a row was written
    pub fn insert_student(&self, id: &str, name: &str, age: i64, email: &str) -> Result<bool> {
        let (_, shard) = self.route(id)?;
        shard.insert_if_absent(
            sql::INSERT_STUDENT,
            &[
                Value::from(id),
                Value::from(name),
                Value::from(age),
                Value::from(email),
            ],
            sql::STUDENT_EXISTS,
            &[Value::from(id)],
        )
    }

    /// Insert a grade unless `(student_id, course_id)` already has one
    /// Returns true when a row was written
    pub fn insert_grade(&self, student_id: &str, course_id: &str, score: i64) -> Result<bool> {
        let (_, shard) = self.route(student_id)?;
        shard.insert_if_absent(
            sql::INSERT_GRADE,
            &[
                Value::from(student_id),
                Value::from(course_id),
                Value::from(score),
            ],
            sql::GRADE_EXISTS,
            &[Value::from(student_id), Value::from(course_id)],
        )
    }

    /// Returns the number of rows changed; 0 when the pair does not exist
    pub fn update_grade(&self, student_id: &str, course_id: &str, new_score: i64) -> Result<usize> {
        let (_, shard) = self.route(student_id)?;
        shard.execute(
            sql::UPDATE_GRADE,
            &[
                Value::from(new_score),
                Value::from(student_id),
                Value::from(course_id),
            ],
        )
    }

    /// Returns the number of rows removed; 0 when the pair does not exist
    pub fn delete_student_from_course(&self, student_id: &str, course_id: &str) -> Result<usize> {
        let (_, shard) = self.route(student_id)?;
        shard.execute(
            sql::DELETE_GRADE,
            &[Value::from(student_id), Value::from(course_id)],
        )
    }

    pub fn get_student_profile(&self, student_id: &str) -> Result<StudentProfile> {
        let (_, shard) = self.route(student_id)?;
        let rows = shard.query(sql::STUDENT_PROFILE, &[Value::from(student_id)])?;

        let row = rows
            .iter()
            .next()
            .ok_or_else(|| ShardError::NotFound(format!("student {}", student_id)))?;

        Ok(StudentProfile {
            name: row.text("name")?.to_string(),
            email: match row.by_name("email") {
                Some(Value::Null) | None => String::new(),
                Some(_) => row.text("email")?.to_string(),
            },
        })
    }

    // -------------------------------------------------------------------
    // Scatter-gather
    // -------------------------------------------------------------------

    /// Run `f` against every shard in parallel
    ///
    /// Results come back in shard order. Every shard runs to completion; if
    /// any failed, all failures are returned together and no result is.
    fn scatter<T, F>(&self, operation: &str, f: F) -> Result<Vec<(ShardIndex, T)>>
    where
        T: Send,
        F: Fn(&H) -> Result<T> + Sync + Send,
    {
        let shard_count = self.shard_count();
        debug!(operation, shard_count, "scatter");

        let outcomes: Vec<(ShardIndex, Result<T>)> = (0..shard_count)
            .into_par_iter()
            .map(|index| (index, self.handle(index).and_then(&f)))
            .collect();

        let mut results = Vec::with_capacity(shard_count);
        let mut failures = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(value) => results.push((index, value)),
                Err(error) => {
                    warn!(operation, shard = index, %error, "shard failed");
                    failures.push(ShardFailure::new(index, error));
                }
            }
        }

        if !failures.is_empty() {
            return Err(ShardError::PartialFailure {
                failures,
                shard_count,
            });
        }
        Ok(results)
    }

    /// Scatter, then fold every partial into one
    fn gather<P, F>(&self, operation: &str, f: F) -> Result<P>
    where
        P: Mergeable,
        F: Fn(&H) -> Result<P> + Sync + Send,
    {
        let mut merged = P::default();
        for (_, partial) in self.scatter(operation, f)? {
            merged.merge(partial);
        }
        Ok(merged)
    }

    /// Average score per department across every shard
    pub fn avg_score_by_department_map(&self) -> Result<BTreeMap<String, f64>> {
        let scores = self.gather("avg_score_by_department", |shard| {
            let rows = shard.query(sql::SCORES_BY_DEPARTMENT, &[])?;
            let mut partial = DepartmentScores::default();
            for row in rows.iter() {
                let graded = row.integer("graded")?;
                let total = row.nullable_integer("total_score")?.unwrap_or(0);
                partial.record(row.text("department")?, total, graded.max(0) as u64);
            }
            Ok(partial)
        })?;
        Ok(scores.averages())
    }

    /// `dept:avg;dept:avg`, sorted by department, one decimal place
    /// Empty string when no shard holds a grade
    pub fn avg_score_by_department(&self) -> Result<String> {
        Ok(format_averages(&self.avg_score_by_department_map()?))
    }

    /// Students tied at the highest number of distinct courses
    pub fn students_with_most_courses_set(&self) -> Result<Option<TopStudents>> {
        let counts = self.gather("students_with_most_courses", |shard| {
            let rows = shard.query(sql::COURSES_PER_STUDENT, &[])?;
            let mut partial = CourseCounts::default();
            for row in rows.iter() {
                let courses = row.integer("course_count")?;
                partial.record(row.text("student_id")?, courses.max(0) as u64);
            }
            Ok(partial)
        })?;
        Ok(counts.top())
    }

    /// Sorted student ids joined by `;`, empty when nobody has a grade
    pub fn students_with_most_courses(&self) -> Result<String> {
        Ok(self
            .students_with_most_courses_set()?
            .map(|top| top.to_string())
            .unwrap_or_default())
    }

    /// Student and grade row counts per shard
    pub fn shard_stats(&self) -> Result<Vec<ShardStats>> {
        let counts = self.scatter("shard_stats", |shard| {
            let count = |statement: &str| -> Result<usize> {
                let rows = shard.query(statement, &[])?;
                let n = match rows.iter().next() {
                    Some(row) => row.integer("n")?.max(0) as usize,
                    None => 0,
                };
                Ok(n)
            };
            Ok((count(sql::COUNT_STUDENTS)?, count(sql::COUNT_GRADES)?))
        })?;

        Ok(counts
            .into_iter()
            .map(|(shard_id, (students, grades))| ShardStats {
                shard_id,
                students,
                grades,
            })
            .collect())
    }
}

impl<H> fmt::Debug for ShardedQueryEngine<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedQueryEngine")
            .field("router", &self.router)
            .field("registered", &self.shards.len())
            .finish()
    }
}
