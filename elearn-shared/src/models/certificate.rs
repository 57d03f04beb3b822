/// Certificate model
///
/// Certificates are immutable once written. The table carries three unique
/// constraints: (student, course), enrollment and verification code. Inserts
/// use `ON CONFLICT DO NOTHING` so concurrent issuers converge on one row.
///
/// The rendered PDF lives in the `document` column and is only loaded by
/// [`Certificate::document`].
///
/// # Schema
///
/// ```sql
/// CREATE TABLE certificates (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     student_id UUID NOT NULL REFERENCES users(id),
///     course_id UUID NOT NULL REFERENCES courses(id),
///     enrollment_id UUID NOT NULL REFERENCES enrollments(id),
///     verification_code VARCHAR(64) NOT NULL,
///     issued_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     document BYTEA NOT NULL,
///     UNIQUE (student_id, course_id),
///     UNIQUE (enrollment_id),
///     UNIQUE (verification_code)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Certificate {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub enrollment_id: Uuid,
    pub verification_code: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub enrollment_id: Uuid,
    pub verification_code: String,
    pub issued_at: DateTime<Utc>,

    /// Rendered PDF
    pub document: Vec<u8>,
}

/// Public answer to "is this code genuine?"
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CertificateVerification {
    pub verification_code: String,
    pub first_name: String,
    pub last_name: String,
    pub course_title: String,
    pub issued_at: DateTime<Utc>,
}

/// Certificate joined with its course title, for listings
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CertificateWithCourse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub verification_code: String,
    pub issued_at: DateTime<Utc>,
}

const CERTIFICATE_COLUMNS: &str =
    "id, student_id, course_id, enrollment_id, verification_code, issued_at";

impl Certificate {
    /// Inserts a certificate unless one already conflicts
    ///
    /// Returns `None` when any unique constraint already holds a row; the
    /// caller re-reads by (student, course) to find the winner.
    pub async fn insert_if_absent(
        pool: &PgPool,
        data: NewCertificate,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO certificates (student_id, course_id, enrollment_id, verification_code,
                                      issued_at, document)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            CERTIFICATE_COLUMNS
        );

        let certificate = sqlx::query_as::<_, Certificate>(&query)
            .bind(data.student_id)
            .bind(data.course_id)
            .bind(data.enrollment_id)
            .bind(data.verification_code)
            .bind(data.issued_at)
            .bind(data.document)
            .fetch_optional(pool)
            .await?;

        Ok(certificate)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM certificates WHERE id = $1", CERTIFICATE_COLUMNS);

        let certificate = sqlx::query_as::<_, Certificate>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(certificate)
    }

    pub async fn find_by_student_and_course(
        pool: &PgPool,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM certificates WHERE student_id = $1 AND course_id = $2",
            CERTIFICATE_COLUMNS
        );

        let certificate = sqlx::query_as::<_, Certificate>(&query)
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(pool)
            .await?;

        Ok(certificate)
    }

    pub async fn list_by_student(
        pool: &PgPool,
        student_id: Uuid,
    ) -> Result<Vec<CertificateWithCourse>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CertificateWithCourse>(
            r#"
            SELECT ce.id, ce.course_id, c.title AS course_title, ce.verification_code, ce.issued_at
            FROM certificates ce
            JOIN courses c ON c.id = ce.course_id
            WHERE ce.student_id = $1
            ORDER BY ce.issued_at DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Looks up a certificate by its printed code, ignoring case
    pub async fn verify(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<CertificateVerification>, sqlx::Error> {
        let row = sqlx::query_as::<_, CertificateVerification>(
            r#"
            SELECT ce.verification_code, u.first_name, u.last_name,
                   c.title AS course_title, ce.issued_at
            FROM certificates ce
            JOIN users u ON u.id = ce.student_id
            JOIN courses c ON c.id = ce.course_id
            WHERE ce.verification_code = UPPER($1)
            "#,
        )
        .bind(code.trim())
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Stored PDF bytes
    pub async fn document(pool: &PgPool, id: Uuid) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT document FROM certificates WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|(document,)| document))
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM certificates")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}
