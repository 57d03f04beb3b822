/// Quiz grading
///
/// A question earns its points only when the set of selected choices equals
/// the set of correct choices exactly. Questions without any correct choice
/// can never be earned. The score is the earned share of all points as a
/// percentage, or 0 for a quiz worth no points.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::quiz::QuestionWithChoices;

/// Outcome of grading one attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub earned_points: i64,
    pub total_points: i64,

    /// Percentage rounded to two decimals
    pub score: f64,

    pub passed: bool,
}

/// Grades selected choice ids against the answer key
///
/// `answers` maps question id to the selected choice ids; unanswered
/// questions earn nothing.
pub fn grade_quiz(
    questions: &[QuestionWithChoices],
    answers: &HashMap<Uuid, Vec<Uuid>>,
    pass_mark: i16,
) -> QuizResult {
    let mut earned: i64 = 0;
    let mut total: i64 = 0;

    for entry in questions {
        let points = i64::from(entry.question.points.max(0));
        total += points;

        let correct: HashSet<Uuid> = entry
            .choices
            .iter()
            .filter(|c| c.is_correct)
            .map(|c| c.id)
            .collect();
        if correct.is_empty() {
            continue;
        }

        let selected: HashSet<Uuid> = answers
            .get(&entry.question.id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        if selected == correct {
            earned += points;
        }
    }

    if total == 0 {
        return QuizResult {
            earned_points: 0,
            total_points: 0,
            score: 0.0,
            passed: pass_mark <= 0,
        };
    }

    let raw = earned as f64 * 100.0 / total as f64;
    let score = ((raw * 100.0).round() / 100.0).clamp(0.0, 100.0);

    // Integer comparison so rounding never flips the verdict
    let passed = earned * 100 >= i64::from(pass_mark) * total;

    QuizResult {
        earned_points: earned,
        total_points: total,
        score,
        passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::{Choice, Question, QuestionKind};

    fn question(points: i32, correct: &[bool]) -> QuestionWithChoices {
        let id = Uuid::new_v4();
        QuestionWithChoices {
            question: Question {
                id,
                quiz_id: Uuid::nil(),
                prompt: "?".into(),
                kind: if correct.iter().filter(|c| **c).count() > 1 {
                    QuestionKind::Multiple
                } else {
                    QuestionKind::Single
                },
                points,
                position: 0,
            },
            choices: correct
                .iter()
                .enumerate()
                .map(|(i, is_correct)| Choice {
                    id: Uuid::new_v4(),
                    question_id: id,
                    label: format!("choice {}", i),
                    is_correct: *is_correct,
                })
                .collect(),
        }
    }

    fn correct_ids(q: &QuestionWithChoices) -> Vec<Uuid> {
        q.choices.iter().filter(|c| c.is_correct).map(|c| c.id).collect()
    }

    #[test]
    fn test_all_correct() {
        let questions = vec![question(1, &[true, false]), question(3, &[true, true, false])];
        let answers: HashMap<Uuid, Vec<Uuid>> = questions
            .iter()
            .map(|q| (q.question.id, correct_ids(q)))
            .collect();

        let result = grade_quiz(&questions, &answers, 50);
        assert_eq!(result.earned_points, 4);
        assert_eq!(result.score, 100.0);
        assert!(result.passed);
    }

    #[test]
    fn test_partial_multiple_choice_earns_nothing() {
        let questions = vec![question(2, &[true, true, false])];
        let first_only = vec![correct_ids(&questions[0])[0]];
        let answers = HashMap::from([(questions[0].question.id, first_only)]);

        let result = grade_quiz(&questions, &answers, 50);
        assert_eq!(result.earned_points, 0);
        assert!(!result.passed);
    }

    #[test]
    fn test_extra_selection_earns_nothing() {
        let questions = vec![question(1, &[true, false])];
        let all: Vec<Uuid> = questions[0].choices.iter().map(|c| c.id).collect();
        let answers = HashMap::from([(questions[0].question.id, all)]);

        assert_eq!(grade_quiz(&questions, &answers, 50).earned_points, 0);
    }

    #[test]
    fn test_question_without_correct_choice_never_scores() {
        let questions = vec![question(1, &[false, false])];
        let answers = HashMap::from([(questions[0].question.id, vec![])]);

        let result = grade_quiz(&questions, &answers, 50);
        assert_eq!(result.earned_points, 0);
        assert_eq!(result.total_points, 1);
    }

    #[test]
    fn test_score_rounding_and_pass_mark() {
        let questions = vec![
            question(1, &[true, false]),
            question(1, &[true, false]),
            question(1, &[true, false]),
        ];
        let answers = HashMap::from([
            (questions[0].question.id, correct_ids(&questions[0])),
            (questions[1].question.id, correct_ids(&questions[1])),
        ]);

        let result = grade_quiz(&questions, &answers, 67);
        assert_eq!(result.score, 66.67);
        assert!(!result.passed);

        let result = grade_quiz(&questions, &answers, 66);
        assert!(result.passed);
    }

    #[test]
    fn test_empty_quiz_scores_zero() {
        let result = grade_quiz(&[], &HashMap::new(), 50);
        assert_eq!(result.score, 0.0);
        assert!(!result.passed);
    }
}
