// Result merging for scatter-gather queries
// Partials fold with `merge`, which is commutative and associative, so the
// order shards answer in never changes the final result.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A partial result that can absorb another partial of the same kind
pub trait Mergeable: Default + Send {
    fn merge(&mut self, other: Self);
}

/// Running sum and count of scores
///
/// Each shard's partial sum fits in an i64; the sum of N of them may not,
/// so the cross-shard total is held in an i128.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreTally {
    pub sum: i128,
    pub count: u64,
}

impl ScoreTally {
    pub fn add(&mut self, other: ScoreTally) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }
}

/// Score tallies keyed by department
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepartmentScores {
    tallies: BTreeMap<String, ScoreTally>,
}

impl DepartmentScores {
    pub fn record(&mut self, department: &str, sum: i64, count: u64) {
        self.tallies
            .entry(department.to_string())
            .or_default()
            .add(ScoreTally {
                sum: i128::from(sum),
                count,
            });
    }

    pub fn tally(&self, department: &str) -> Option<ScoreTally> {
        self.tallies.get(department).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    /// Divide once per department; departments with no scores are left out
    pub fn averages(&self) -> BTreeMap<String, f64> {
        self.tallies
            .iter()
            .filter_map(|(dept, tally)| tally.average().map(|avg| (dept.clone(), avg)))
            .collect()
    }
}

impl Mergeable for DepartmentScores {
    fn merge(&mut self, other: Self) {
        for (department, tally) in other.tallies {
            self.tallies.entry(department).or_default().add(tally);
        }
    }
}

/// `dept:avg` pairs with one decimal, sorted by department, joined by `;`
pub fn format_averages(averages: &BTreeMap<String, f64>) -> String {
    averages
        .iter()
        .map(|(dept, avg)| format!("{}:{:.1}", dept, avg))
        .collect::<Vec<_>>()
        .join(";")
}

/// Course counts keyed by student id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseCounts {
    counts: BTreeMap<String, u64>,
}

impl CourseCounts {
    pub fn record(&mut self, student_id: &str, courses: u64) {
        *self.counts.entry(student_id.to_string()).or_default() += courses;
    }

    pub fn count(&self, student_id: &str) -> u64 {
        self.counts.get(student_id).copied().unwrap_or(0)
    }

    /// Every student at the global maximum, or None when nobody has a grade
    pub fn top(&self) -> Option<TopStudents> {
        let max = self.counts.values().copied().max()?;
        let students = self
            .counts
            .iter()
            .filter(|(_, n)| **n == max)
            .map(|(id, _)| id.clone())
            .collect();
        Some(TopStudents {
            course_count: max,
            students,
        })
    }
}

impl Mergeable for CourseCounts {
    fn merge(&mut self, other: Self) {
        for (student, n) in other.counts {
            *self.counts.entry(student).or_default() += n;
        }
    }
}

/// Students tied at the highest course count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopStudents {
    pub course_count: u64,
    pub students: BTreeSet<String>,
}

impl fmt::Display for TopStudents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.students.iter().map(String::as_str).collect();
        f.write_str(&ids.join(";"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_averages_come_from_raw_sums() {
        // shard A: CS [80, 90]; shard B: CS [70]
        let mut a = DepartmentScores::default();
        a.record("CS", 170, 2);
        let mut b = DepartmentScores::default();
        b.record("CS", 70, 1);

        a.merge(b);
        assert_eq!(a.tally("CS"), Some(ScoreTally { sum: 240, count: 3 }));
        assert_eq!(format_averages(&a.averages()), "CS:80.0");
    }

    #[test]
    fn test_partial_sums_near_i64_max_do_not_overflow() {
        let big = i64::MAX / 2 + 1;
        let mut a = DepartmentScores::default();
        a.record("CS", big, 1);
        let mut b = DepartmentScores::default();
        b.record("CS", big, 1);

        a.merge(b);
        let tally = a.tally("CS").unwrap();
        assert_eq!(tally.sum, 2 * i128::from(big));
        assert!(tally.sum > i128::from(i64::MAX));
        assert_eq!(a.averages()["CS"], big as f64);
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let partial = |pairs: &[(&str, i64, u64)]| {
            let mut p = DepartmentScores::default();
            for (d, s, c) in pairs {
                p.record(d, *s, *c);
            }
            p
        };
        let parts = [
            partial(&[("CS", 170, 2), ("MATH", 55, 1)]),
            partial(&[("CS", 70, 1)]),
            partial(&[("BIO", 91, 1), ("MATH", 100, 2)]),
        ];

        let mut forward = DepartmentScores::default();
        for p in parts.iter().cloned() {
            forward.merge(p);
        }
        let mut backward = DepartmentScores::default();
        for p in parts.iter().rev().cloned() {
            backward.merge(p);
        }

        assert_eq!(forward, backward);
        assert_eq!(
            format_averages(&forward.averages()),
            "BIO:91.0;CS:80.0;MATH:51.7"
        );
    }

    #[test]
    fn test_departments_without_scores_are_skipped() {
        let mut scores = DepartmentScores::default();
        scores.record("ART", 0, 0);
        assert!(scores.averages().is_empty());
        assert_eq!(format_averages(&scores.averages()), "");
    }

    #[test]
    fn test_course_counts_sum_across_shards_and_keep_ties() {
        // X split 2 + 1 across shards, Y has 3 on one shard
        let mut shard0 = CourseCounts::default();
        shard0.record("X", 2);
        let mut shard1 = CourseCounts::default();
        shard1.record("X", 1);
        shard1.record("Y", 3);
        shard1.record("Z", 1);

        shard0.merge(shard1);
        let top = shard0.top().unwrap();
        assert_eq!(top.course_count, 3);
        assert_eq!(top.to_string(), "X;Y");
    }

    #[test]
    fn test_no_counts_means_no_top() {
        assert_eq!(CourseCounts::default().top(), None);
    }
}
