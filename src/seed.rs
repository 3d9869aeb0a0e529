// Seed files
// A JSON document of courses, students and grades loaded at startup.
// Courses are replicated to every shard; students and grades go through
// the engine so they land on the shard that owns the student.

use crate::memory::{MemoryCluster, MemoryShard};
use crate::sharding::ShardedQueryEngine;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSeed {
    pub course_id: String,
    #[serde(default)]
    pub title: String,
    pub department: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSeed {
    pub student_id: String,
    pub name: String,
    #[serde(default)]
    pub age: i64,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeSeed {
    pub student_id: String,
    pub course_id: String,
    pub score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub courses: Vec<CourseSeed>,
    #[serde(default)]
    pub students: Vec<StudentSeed>,
    #[serde(default)]
    pub grades: Vec<GradeSeed>,
}

/// Courses loaded, plus students and grades actually written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub courses: usize,
    pub students: usize,
    pub grades: usize,
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} course(s), {} student(s), {} grade(s)",
            self.courses, self.students, self.grades
        )
    }
}

impl SeedData {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse seed data")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid seed file {}", path.display()))
    }

    pub fn apply(
        &self,
        cluster: &MemoryCluster,
        engine: &ShardedQueryEngine<Arc<MemoryShard>>,
    ) -> Result<SeedReport> {
        let mut report = SeedReport::default();

        for course in &self.courses {
            cluster
                .load_course(&course.course_id, &course.title, &course.department)
                .with_context(|| format!("course {}", course.course_id))?;
            report.courses += 1;
        }

        for student in &self.students {
            let written = engine
                .insert_student(&student.student_id, &student.name, student.age, &student.email)
                .with_context(|| format!("student {}", student.student_id))?;
            report.students += usize::from(written);
        }

        for grade in &self.grades {
            let written = engine
                .insert_grade(&grade.student_id, &grade.course_id, grade.score)
                .with_context(|| format!("grade {}/{}", grade.student_id, grade.course_id))?;
            report.grades += usize::from(written);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"{
        "courses": [
            {"course_id": "c1", "title": "Algorithms", "department": "CS"},
            {"course_id": "m1", "department": "MATH"}
        ],
        "students": [
            {"student_id": "s1", "name": "Ada", "age": 36, "email": "ada@x"},
            {"student_id": "s2", "name": "Alan"}
        ],
        "grades": [
            {"student_id": "s1", "course_id": "c1", "score": 90},
            {"student_id": "s2", "course_id": "c1", "score": 70},
            {"student_id": "s2", "course_id": "m1", "score": 60}
        ]
    }"#;

    #[test]
    fn test_parse_with_defaults() {
        let seed = SeedData::from_json(SEED).unwrap();
        assert_eq!(seed.courses[1].title, "");
        assert_eq!(seed.students[1].email, "");
        assert_eq!(seed.grades.len(), 3);

        assert_eq!(SeedData::from_json("{}").unwrap(), SeedData::default());
        assert!(SeedData::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let cluster = MemoryCluster::open(3).unwrap();
        let engine = cluster.engine().unwrap();
        let seed = SeedData::from_json(SEED).unwrap();

        let report = seed.apply(&cluster, &engine).unwrap();
        assert_eq!(report.to_string(), "2 course(s), 2 student(s), 3 grade(s)");
        assert_eq!(engine.avg_score_by_department().unwrap(), "CS:80.0;MATH:60.0");
        assert_eq!(engine.students_with_most_courses().unwrap(), "s2");

        let again = seed.apply(&cluster, &engine).unwrap();
        assert_eq!(again.students, 0);
        assert_eq!(again.grades, 0);
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = SeedData::from_path("/nonexistent/seed.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/seed.json"));
    }
}
