/// Course progress
///
/// Progress is a pure function of stored state:
///
/// ```text
/// units    = lessons + quizzes + assignments
/// credited = completed lessons + quizzes with a passing attempt + submitted assignments
/// progress = floor(credited * 100 / units)        (0 when units == 0)
/// ```
///
/// Completions are never deleted and a quiz stays credited once any attempt
/// passes, so progress never decreases.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::assignment::{Assignment, AssignmentStanding};
use crate::models::lesson_progress::LessonProgress;
use crate::models::quiz::{Quiz, QuizStanding};

/// Everything progress and eligibility are computed from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total_lessons: u32,
    pub completed_lessons: u32,
    pub quizzes: Vec<QuizStanding>,
    pub assignments: Vec<AssignmentStanding>,
}

/// Serializable breakdown returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub percent: u8,
    pub lessons_completed: u32,
    pub lessons_total: u32,
    pub quizzes_passed: u32,
    pub quizzes_total: u32,
    pub assignments_submitted: u32,
    pub assignments_total: u32,
}

impl ProgressSnapshot {
    pub fn units(&self) -> u32 {
        self.total_lessons + self.quizzes.len() as u32 + self.assignments.len() as u32
    }

    pub fn quizzes_passed(&self) -> u32 {
        self.quizzes.iter().filter(|q| q.passed).count() as u32
    }

    pub fn assignments_submitted(&self) -> u32 {
        self.assignments.iter().filter(|a| a.submitted).count() as u32
    }

    pub fn credited(&self) -> u32 {
        self.completed_lessons.min(self.total_lessons)
            + self.quizzes_passed()
            + self.assignments_submitted()
    }

    /// Completion percentage in [0, 100]
    pub fn percent(&self) -> u8 {
        let units = u64::from(self.units());
        if units == 0 {
            return 0;
        }
        let credited = u64::from(self.credited()).min(units);
        (credited * 100 / units).min(100) as u8
    }

    pub fn report(&self) -> ProgressReport {
        ProgressReport {
            percent: self.percent(),
            lessons_completed: self.completed_lessons.min(self.total_lessons),
            lessons_total: self.total_lessons,
            quizzes_passed: self.quizzes_passed(),
            quizzes_total: self.quizzes.len() as u32,
            assignments_submitted: self.assignments_submitted(),
            assignments_total: self.assignments.len() as u32,
        }
    }

    /// Loads the snapshot of one student on one course
    pub async fn load(pool: &PgPool, student_id: Uuid, course_id: Uuid) -> Result<Self, sqlx::Error> {
        let (total_lessons,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM lessons WHERE course_id = $1")
                .bind(course_id)
                .fetch_one(pool)
                .await?;

        let completed = LessonProgress::completed_lesson_ids(pool, student_id, course_id).await?;
        let quizzes = Quiz::standings(pool, student_id, course_id).await?;
        let assignments = Assignment::standings(pool, student_id, course_id).await?;

        Ok(Self {
            total_lessons: u32::try_from(total_lessons).unwrap_or(u32::MAX),
            completed_lessons: completed.len() as u32,
            quizzes,
            assignments,
        })
    }
}

/// Completion percentage of a student on a course
pub async fn compute_progress(
    pool: &PgPool,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<u8, sqlx::Error> {
    Ok(ProgressSnapshot::load(pool, student_id, course_id).await?.percent())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(passed: bool) -> QuizStanding {
        QuizStanding {
            quiz_id: Uuid::new_v4(),
            pass_mark: 50,
            best_score: Some(if passed { 80.0 } else { 20.0 }),
            passed,
        }
    }

    fn assignment(submitted: bool) -> AssignmentStanding {
        AssignmentStanding {
            assignment_id: Uuid::new_v4(),
            max_marks: 20,
            submitted,
            marks_obtained: None,
        }
    }

    fn lessons(total: u32, completed: u32) -> ProgressSnapshot {
        ProgressSnapshot {
            total_lessons: total,
            completed_lessons: completed,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_course_is_zero() {
        assert_eq!(ProgressSnapshot::default().percent(), 0);
    }

    #[test]
    fn test_lessons_only_matches_ratio() {
        assert_eq!(lessons(2, 0).percent(), 0);
        assert_eq!(lessons(2, 1).percent(), 50);
        assert_eq!(lessons(2, 2).percent(), 100);
        assert_eq!(lessons(3, 1).percent(), 33);
        assert_eq!(lessons(3, 2).percent(), 66);
    }

    #[test]
    fn test_mixed_units() {
        let snapshot = ProgressSnapshot {
            total_lessons: 2,
            completed_lessons: 2,
            quizzes: vec![quiz(true), quiz(false)],
            assignments: vec![assignment(true), assignment(false)],
        };
        // 4 credited of 6
        assert_eq!(snapshot.percent(), 66);

        let report = snapshot.report();
        assert_eq!(report.quizzes_passed, 1);
        assert_eq!(report.assignments_submitted, 1);
        assert_eq!(report.lessons_total, 2);
    }

    #[test]
    fn test_always_within_bounds() {
        for total in 0..12u32 {
            for completed in 0..15u32 {
                let p = lessons(total, completed).percent();
                assert!(p <= 100, "{}/{} gave {}", completed, total, p);
            }
        }
    }

    #[test]
    fn test_monotonic_as_units_are_credited() {
        let mut snapshot = ProgressSnapshot {
            total_lessons: 5,
            completed_lessons: 0,
            quizzes: vec![quiz(false), quiz(false)],
            assignments: vec![assignment(false)],
        };

        let mut last = snapshot.percent();
        for step in 0..8 {
            match step {
                0..=4 => snapshot.completed_lessons += 1,
                5 => snapshot.quizzes[0] = quiz(true),
                6 => snapshot.quizzes[1] = quiz(true),
                _ => snapshot.assignments[0] = assignment(true),
            }
            let now = snapshot.percent();
            assert!(now >= last, "progress went from {} to {}", last, now);
            last = now;
        }
        assert_eq!(last, 100);
    }
}
