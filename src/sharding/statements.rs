//! Statement templates run against each shard.
//!
//! Parameters are positional `?` placeholders. Every student-scoped
//! statement takes the student id as a parameter, never the course id alone,
//! so each one touches exactly the shard that owns the student.

/// Tables every shard carries. `Course` is reference data replicated to all
/// shards so the department join stays shard-local.
pub const SCHEMA: [&str; 3] = [
    "CREATE TABLE Student (student_id TEXT PRIMARY KEY, name TEXT NOT NULL, age INTEGER, email TEXT)",
    "CREATE TABLE Course (course_id TEXT PRIMARY KEY, title TEXT, department TEXT NOT NULL)",
    "CREATE TABLE Grade (student_id TEXT, course_id TEXT, score INTEGER, \
     PRIMARY KEY (student_id, course_id))",
];

pub const INSERT_STUDENT: &str =
    "INSERT INTO Student (student_id, name, age, email) VALUES (?, ?, ?, ?)";

pub const STUDENT_EXISTS: &str = "SELECT COUNT(*) AS n FROM Student WHERE student_id = ?";

pub const INSERT_GRADE: &str = "INSERT INTO Grade (student_id, course_id, score) VALUES (?, ?, ?)";

pub const GRADE_EXISTS: &str =
    "SELECT COUNT(*) AS n FROM Grade WHERE student_id = ? AND course_id = ?";

pub const UPDATE_GRADE: &str = "UPDATE Grade SET score = ? WHERE student_id = ? AND course_id = ?";

pub const DELETE_GRADE: &str = "DELETE FROM Grade WHERE student_id = ? AND course_id = ?";

pub const STUDENT_PROFILE: &str = "SELECT name, email FROM Student WHERE student_id = ?";

pub const INSERT_COURSE: &str =
    "INSERT INTO Course (course_id, title, department) VALUES (?, ?, ?)";

pub const COURSE_EXISTS: &str = "SELECT COUNT(*) AS n FROM Course WHERE course_id = ?";

/// Per-shard partial sums, never partial averages
pub const SCORES_BY_DEPARTMENT: &str = "SELECT c.department, SUM(g.score) AS total_score, \
     COUNT(g.score) AS graded \
     FROM Grade g JOIN Course c ON g.course_id = c.course_id \
     GROUP BY c.department";

pub const COURSES_PER_STUDENT: &str = "SELECT student_id, COUNT(DISTINCT course_id) AS course_count \
     FROM Grade GROUP BY student_id";

pub const COUNT_STUDENTS: &str = "SELECT COUNT(*) AS n FROM Student";

pub const COUNT_GRADES: &str = "SELECT COUNT(*) AS n FROM Grade";
