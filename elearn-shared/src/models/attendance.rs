/// Attendance register for live sessions
///
/// Instructors mark each paid enrollment once per session date; marking the
/// same date again overwrites the status and notes.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE attendance_status AS ENUM ('present', 'absent', 'late');
///
/// CREATE TABLE attendance (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     enrollment_id UUID NOT NULL REFERENCES enrollments(id) ON DELETE CASCADE,
///     session_date DATE NOT NULL,
///     status attendance_status NOT NULL,
///     notes TEXT NOT NULL DEFAULT '',
///     marked_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     marked_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (enrollment_id, session_date)
/// );
/// ```

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }

    /// Late still counts as attended
    pub fn attended(&self) -> bool {
        !matches!(self, AttendanceStatus::Absent)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendance {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub session_date: NaiveDate,
    pub status: AttendanceStatus,
    pub notes: String,
    pub marked_by: Option<Uuid>,
    pub marked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkAttendance {
    pub enrollment_id: Uuid,
    pub session_date: NaiveDate,
    pub status: AttendanceStatus,
    pub notes: String,
    pub marked_by: Uuid,
}

/// One student's line in a course's register
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RegisterLine {
    pub enrollment_id: Uuid,
    pub student_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub session_date: NaiveDate,
    pub status: AttendanceStatus,
    pub notes: String,
}

/// Share of sessions attended, rounded to a whole percent
pub fn attendance_rate(records: &[Attendance]) -> Option<u8> {
    if records.is_empty() {
        return None;
    }

    let attended = records.iter().filter(|r| r.status.attended()).count();
    let rate = (attended * 100 + records.len() / 2) / records.len();
    u8::try_from(rate).ok()
}

const ATTENDANCE_COLUMNS: &str =
    "id, enrollment_id, session_date, status, notes, marked_by, marked_at";

impl Attendance {
    /// Marks a session, replacing an earlier mark for the same date
    pub async fn mark(pool: &PgPool, data: MarkAttendance) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO attendance (enrollment_id, session_date, status, notes, marked_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (enrollment_id, session_date)
            DO UPDATE SET status = EXCLUDED.status,
                          notes = EXCLUDED.notes,
                          marked_by = EXCLUDED.marked_by,
                          marked_at = NOW()
            RETURNING {}
            "#,
            ATTENDANCE_COLUMNS
        );

        let record = sqlx::query_as::<_, Attendance>(&query)
            .bind(data.enrollment_id)
            .bind(data.session_date)
            .bind(data.status)
            .bind(data.notes)
            .bind(data.marked_by)
            .fetch_one(pool)
            .await?;

        Ok(record)
    }

    pub async fn list_for_enrollment(
        pool: &PgPool,
        enrollment_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM attendance WHERE enrollment_id = $1 ORDER BY session_date DESC",
            ATTENDANCE_COLUMNS
        );

        let records = sqlx::query_as::<_, Attendance>(&query)
            .bind(enrollment_id)
            .fetch_all(pool)
            .await?;

        Ok(records)
    }

    /// Register of a course, optionally for a single session date
    pub async fn register(
        pool: &PgPool,
        course_id: Uuid,
        session_date: Option<NaiveDate>,
    ) -> Result<Vec<RegisterLine>, sqlx::Error> {
        let lines = sqlx::query_as::<_, RegisterLine>(
            r#"
            SELECT a.enrollment_id, u.id AS student_id, u.first_name, u.last_name,
                   a.session_date, a.status, a.notes
            FROM attendance a
            JOIN enrollments e ON e.id = a.enrollment_id
            JOIN users u ON u.id = e.student_id
            WHERE e.course_id = $1
              AND ($2::date IS NULL OR a.session_date = $2)
            ORDER BY a.session_date DESC, u.last_name, u.first_name
            "#,
        )
        .bind(course_id)
        .bind(session_date)
        .fetch_all(pool)
        .await?;

        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: AttendanceStatus) -> Attendance {
        Attendance {
            id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            session_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            status,
            notes: String::new(),
            marked_by: None,
            marked_at: Utc::now(),
        }
    }

    #[test]
    fn test_late_counts_as_attended() {
        assert!(AttendanceStatus::Late.attended());
        assert!(!AttendanceStatus::Absent.attended());
    }

    #[test]
    fn test_attendance_rate() {
        assert_eq!(attendance_rate(&[]), None);

        let records = [
            record(AttendanceStatus::Present),
            record(AttendanceStatus::Late),
            record(AttendanceStatus::Absent),
        ];
        assert_eq!(attendance_rate(&records), Some(67));
        assert_eq!(attendance_rate(&records[2..]), Some(0));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(AttendanceStatus::Late).unwrap();
        assert_eq!(json, "late");
        let status: AttendanceStatus = serde_json::from_str(r#""absent""#).unwrap();
        assert_eq!(status, AttendanceStatus::Absent);
    }
}
