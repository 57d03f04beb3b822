/// Certificate eligibility and issuance
///
/// # Eligibility
///
/// A student is eligible for a course certificate when, in this order:
///
/// 1. the enrollment exists and is `paid`
/// 2. progress reaches the threshold (course override, else the platform default)
/// 3. if the course sets `min_passing_score`, every quiz's best score and every
///    assignment's graded percentage reach it (ungraded assignments do not)
///
/// [`evaluate_eligibility`] is pure and returns the first failing condition.
///
/// # Issuance
///
/// [`CertificateService::issue_if_eligible`] is idempotent. It is called after
/// every event that can raise progress and on explicit request; an existing
/// certificate is returned untouched and concurrent issuers converge on one
/// row through the table's unique constraints.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::content::certificate_pdf::{render_certificate, CertificateDocument};
use crate::error::{ServiceError, ServiceResult};
use crate::models::certificate::{Certificate, NewCertificate};
use crate::models::course::Course;
use crate::models::enrollment::{Enrollment, EnrollmentStatus};
use crate::models::user::User;
use crate::services::progress::ProgressSnapshot;
use crate::settings::CertificateSettings;

/// Attempts at finding an unused verification code
const CODE_ATTEMPTS: usize = 3;

/// Verdict of an eligibility check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible {
        progress: u8,
    },
    NotEnrolled,
    NotPaid {
        status: EnrollmentStatus,
    },
    BelowThreshold {
        progress: u8,
        threshold: u8,
    },
    QuizBelowMinimum {
        quiz_id: Uuid,
        best_score: Option<f64>,
        required: i16,
    },
    AssignmentNotGraded {
        assignment_id: Uuid,
    },
    AssignmentBelowMinimum {
        assignment_id: Uuid,
        percent: f64,
        required: i16,
    },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }

    /// Human-readable reason for a negative verdict
    pub fn reason(&self) -> String {
        match self {
            Eligibility::Eligible { progress } => format!("eligible at {}%", progress),
            Eligibility::NotEnrolled => "not enrolled in this course".to_string(),
            Eligibility::NotPaid { status } => {
                format!("enrollment is {}, payment required", status.as_str())
            }
            Eligibility::BelowThreshold { progress, threshold } => {
                format!("progress {}% is below the required {}%", progress, threshold)
            }
            Eligibility::QuizBelowMinimum { required, .. } => {
                format!("a quiz score is below the required {}%", required)
            }
            Eligibility::AssignmentNotGraded { .. } => {
                "an assignment has not been graded yet".to_string()
            }
            Eligibility::AssignmentBelowMinimum { required, .. } => {
                format!("an assignment mark is below the required {}%", required)
            }
        }
    }
}

/// Threshold that applies to a course
pub fn effective_threshold(course: &Course, settings: &CertificateSettings) -> u8 {
    course
        .completion_threshold
        .and_then(|t| u8::try_from(t).ok())
        .filter(|t| (1..=100).contains(t))
        .unwrap_or(settings.threshold)
}

/// Decides eligibility from stored state
pub fn evaluate_eligibility(
    enrollment_status: Option<EnrollmentStatus>,
    snapshot: &ProgressSnapshot,
    threshold: u8,
    min_passing_score: Option<i16>,
) -> Eligibility {
    match enrollment_status {
        None => return Eligibility::NotEnrolled,
        Some(EnrollmentStatus::Paid) => {}
        Some(status) => return Eligibility::NotPaid { status },
    }

    let progress = snapshot.percent();
    if progress < threshold {
        return Eligibility::BelowThreshold { progress, threshold };
    }

    if let Some(required) = min_passing_score {
        let minimum = f64::from(required);

        for quiz in &snapshot.quizzes {
            if quiz.best_score.map_or(true, |best| best < minimum) {
                return Eligibility::QuizBelowMinimum {
                    quiz_id: quiz.quiz_id,
                    best_score: quiz.best_score,
                    required,
                };
            }
        }

        for assignment in &snapshot.assignments {
            match assignment.percent() {
                None => {
                    return Eligibility::AssignmentNotGraded {
                        assignment_id: assignment.assignment_id,
                    }
                }
                Some(percent) if percent < minimum => {
                    return Eligibility::AssignmentBelowMinimum {
                        assignment_id: assignment.assignment_id,
                        percent,
                        required,
                    }
                }
                Some(_) => {}
            }
        }
    }

    Eligibility::Eligible { progress }
}

/// Characters of a verification code, without look-alikes (0/O, 1/I)
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// `{PREFIX}-XXXX-XXXX` with random characters from [`CODE_CHARSET`]
pub fn generate_verification_code(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let mut group = || -> String {
        (0..4)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect()
    };

    let first = group();
    let second = group();
    format!("{}-{}-{}", prefix.trim().to_uppercase(), first, second)
}

/// Result of an issuance request
#[derive(Debug, Clone)]
pub enum IssueOutcome {
    /// A new certificate was written by this call
    Issued(Certificate),

    /// The certificate already existed
    AlreadyIssued(Certificate),

    NotEligible(Eligibility),
}

impl IssueOutcome {
    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            IssueOutcome::Issued(c) | IssueOutcome::AlreadyIssued(c) => Some(c),
            IssueOutcome::NotEligible(_) => None,
        }
    }
}

/// Eligibility checks and certificate issuance
#[derive(Debug, Clone)]
pub struct CertificateService {
    pool: PgPool,
    settings: CertificateSettings,
}

impl CertificateService {
    pub fn new(pool: PgPool, settings: CertificateSettings) -> Self {
        Self { pool, settings }
    }

    /// Evaluates eligibility of a student for a course certificate
    pub async fn check_certificate_eligibility(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> ServiceResult<Eligibility> {
        let course = Course::find_by_id(&self.pool, course_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("course {}", course_id)))?;

        let enrollment =
            Enrollment::find_by_student_and_course(&self.pool, student_id, course_id).await?;

        self.evaluate(&course, enrollment.as_ref(), student_id).await
    }

    async fn evaluate(
        &self,
        course: &Course,
        enrollment: Option<&Enrollment>,
        student_id: Uuid,
    ) -> ServiceResult<Eligibility> {
        let status = enrollment.map(|e| e.status);
        if status != Some(EnrollmentStatus::Paid) {
            // No need to load progress for an unpaid enrollment
            return Ok(evaluate_eligibility(
                status,
                &ProgressSnapshot::default(),
                0,
                None,
            ));
        }

        let snapshot = ProgressSnapshot::load(&self.pool, student_id, course.id).await?;

        Ok(evaluate_eligibility(
            status,
            &snapshot,
            effective_threshold(course, &self.settings),
            course.min_passing_score,
        ))
    }

    /// Issues the certificate if the student is eligible
    ///
    /// Safe to call repeatedly and concurrently.
    pub async fn issue_if_eligible(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> ServiceResult<IssueOutcome> {
        if let Some(existing) =
            Certificate::find_by_student_and_course(&self.pool, student_id, course_id).await?
        {
            return Ok(IssueOutcome::AlreadyIssued(existing));
        }

        let course = Course::find_by_id(&self.pool, course_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("course {}", course_id)))?;

        let enrollment =
            Enrollment::find_by_student_and_course(&self.pool, student_id, course_id).await?;

        let verdict = self.evaluate(&course, enrollment.as_ref(), student_id).await?;
        let enrollment = match (verdict.is_eligible(), enrollment) {
            (true, Some(enrollment)) => enrollment,
            _ => {
                debug!(%student_id, %course_id, reason = %verdict.reason(), "Certificate not issued");
                return Ok(IssueOutcome::NotEligible(verdict));
            }
        };

        let student = User::find_by_id(&self.pool, student_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", student_id)))?;

        let instructor_name = match course.instructor_id {
            Some(id) => User::find_by_id(&self.pool, id).await?.map(|u| u.full_name()),
            None => None,
        };

        let issued_at = Utc::now();

        for attempt in 1..=CODE_ATTEMPTS {
            let code = generate_verification_code(&self.settings.code_prefix);

            let document = render_certificate(&CertificateDocument {
                institution: self.settings.institution_name.clone(),
                student_name: student.full_name(),
                course_title: course.title.clone(),
                instructor_name: instructor_name.clone(),
                issued_at,
                verification_code: code.clone(),
            })?;

            let inserted = Certificate::insert_if_absent(
                &self.pool,
                NewCertificate {
                    student_id,
                    course_id,
                    enrollment_id: enrollment.id,
                    verification_code: code.clone(),
                    issued_at,
                    document,
                },
            )
            .await?;

            if let Some(certificate) = inserted {
                info!(
                    %student_id,
                    %course_id,
                    verification_code = %certificate.verification_code,
                    "Certificate issued"
                );
                return Ok(IssueOutcome::Issued(certificate));
            }

            // Lost a race, or the code collided
            if let Some(existing) =
                Certificate::find_by_student_and_course(&self.pool, student_id, course_id).await?
            {
                return Ok(IssueOutcome::AlreadyIssued(existing));
            }

            warn!(attempt, code = %code, "Verification code collision, retrying");
        }

        error!(%student_id, %course_id, attempts = CODE_ATTEMPTS, "Verification codes exhausted");
        Err(codes_exhausted())
    }
}

fn codes_exhausted() -> ServiceError {
    ServiceError::Internal(format!(
        "no unused verification code after {} attempts",
        CODE_ATTEMPTS
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assignment::AssignmentStanding;
    use crate::models::quiz::QuizStanding;

    fn complete_lessons() -> ProgressSnapshot {
        ProgressSnapshot {
            total_lessons: 2,
            completed_lessons: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_not_enrolled_and_unpaid() {
        let snapshot = complete_lessons();
        assert_eq!(
            evaluate_eligibility(None, &snapshot, 100, None),
            Eligibility::NotEnrolled
        );
        assert_eq!(
            evaluate_eligibility(Some(EnrollmentStatus::Pending), &snapshot, 100, None),
            Eligibility::NotPaid {
                status: EnrollmentStatus::Pending
            }
        );
        assert!(!evaluate_eligibility(Some(EnrollmentStatus::Failed), &snapshot, 100, None)
            .is_eligible());
    }

    #[test]
    fn test_threshold() {
        let half = ProgressSnapshot {
            total_lessons: 2,
            completed_lessons: 1,
            ..Default::default()
        };
        assert_eq!(
            evaluate_eligibility(Some(EnrollmentStatus::Paid), &half, 100, None),
            Eligibility::BelowThreshold {
                progress: 50,
                threshold: 100
            }
        );
        assert!(evaluate_eligibility(Some(EnrollmentStatus::Paid), &half, 50, None).is_eligible());
        assert_eq!(
            evaluate_eligibility(Some(EnrollmentStatus::Paid), &complete_lessons(), 100, None),
            Eligibility::Eligible { progress: 100 }
        );
    }

    #[test]
    fn test_min_passing_score_on_quizzes() {
        let mut snapshot = complete_lessons();
        snapshot.quizzes.push(QuizStanding {
            quiz_id: Uuid::new_v4(),
            pass_mark: 50,
            best_score: Some(60.0),
            passed: true,
        });

        assert!(evaluate_eligibility(Some(EnrollmentStatus::Paid), &snapshot, 100, None)
            .is_eligible());
        assert!(evaluate_eligibility(Some(EnrollmentStatus::Paid), &snapshot, 100, Some(60))
            .is_eligible());
        assert!(matches!(
            evaluate_eligibility(Some(EnrollmentStatus::Paid), &snapshot, 100, Some(70)),
            Eligibility::QuizBelowMinimum { required: 70, .. }
        ));
    }

    #[test]
    fn test_min_passing_score_on_assignments() {
        let mut snapshot = complete_lessons();
        snapshot.assignments.push(AssignmentStanding {
            assignment_id: Uuid::new_v4(),
            max_marks: 20,
            submitted: true,
            marks_obtained: None,
        });

        assert!(matches!(
            evaluate_eligibility(Some(EnrollmentStatus::Paid), &snapshot, 100, Some(50)),
            Eligibility::AssignmentNotGraded { .. }
        ));

        snapshot.assignments[0].marks_obtained = Some(8);
        assert!(matches!(
            evaluate_eligibility(Some(EnrollmentStatus::Paid), &snapshot, 100, Some(50)),
            Eligibility::AssignmentBelowMinimum { .. }
        ));

        snapshot.assignments[0].marks_obtained = Some(10);
        assert!(evaluate_eligibility(Some(EnrollmentStatus::Paid), &snapshot, 100, Some(50))
            .is_eligible());
    }

    #[test]
    fn test_verification_code_format() {
        let code = generate_verification_code("ifri");
        let parts: Vec<&str> = code.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "IFRI");
        for part in &parts[1..] {
            assert_eq!(part.len(), 4);
            assert!(part.bytes().all(|b| CODE_CHARSET.contains(&b)));
            assert!(!part.contains('0') && !part.contains('O'));
        }
        assert_ne!(code, generate_verification_code("IFRI"));
    }

    #[test]
    fn test_verdict_serialization() {
        let json = serde_json::to_value(Eligibility::BelowThreshold {
            progress: 50,
            threshold: 100,
        })
        .unwrap();
        assert_eq!(json["verdict"], "below_threshold");
        assert_eq!(json["progress"], 50);
    }

    #[test]
    fn test_exhausted_codes_are_a_server_fault() {
        let err = codes_exhausted();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert!(!err.is_retryable());
    }
}
