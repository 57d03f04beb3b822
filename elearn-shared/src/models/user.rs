/// User model and database operations
///
/// Every account has exactly one role. Students and instructors register
/// themselves; the manager role is granted by another manager.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE user_role AS ENUM ('student', 'instructor', 'manager');
///
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL,           -- unique on LOWER(email)
///     password_hash VARCHAR(255) NOT NULL,
///     first_name VARCHAR(150) NOT NULL,
///     last_name VARCHAR(150) NOT NULL,
///     phone VARCHAR(32),
///     role user_role NOT NULL DEFAULT 'student',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use elearn_shared::models::user::{CreateUser, Role, User};
/// use elearn_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "ada@example.org".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     first_name: "Ada".to_string(),
///     last_name: "Lovelace".to_string(),
///     phone: None,
///     role: Role::Student,
/// })
/// .await?;
///
/// let found = User::find_by_email(&pool, "ADA@example.org").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Enrolls in and follows courses
    Student,

    /// Authors courses, quizzes and assignments; grades submissions
    Instructor,

    /// Oversees payments, analytics and roles
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Manager => "manager",
        }
    }

    /// Whether this role may create and edit course content
    pub fn can_author(&self) -> bool {
        match self {
            Role::Instructor | Role::Manager => true,
            Role::Student => false,
        }
    }

    /// Whether this role may register itself
    pub fn is_self_service(&self) -> bool {
        match self {
            Role::Student | Role::Instructor => true,
            Role::Manager => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "instructor" | "trainer" => Ok(Role::Instructor),
            "manager" => Ok(Role::Manager),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Stored as given; uniqueness is case-insensitive
    pub email: String,

    /// Argon2id hash, never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// "First Last", falling back to the email when both names are blank
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

/// Role counts for the manager dashboard
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleCounts {
    pub students: i64,
    pub instructors: i64,
    pub managers: i64,
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, role, \
                            created_at, updated_at, last_login_at";

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the email is already taken (unique index violation)
    /// or the database is unreachable.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, phone, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(data.email.trim())
            .bind(data.password_hash)
            .bind(data.first_name.trim())
            .bind(data.last_name.trim())
            .bind(data.phone)
            .bind(data.role)
            .fetch_one(pool)
            .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by email, ignoring case
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(email.trim())
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Changes a user's role
    ///
    /// Returns the updated user, or `None` if no such user exists.
    pub async fn update_role(
        pool: &PgPool,
        id: Uuid,
        role: Role,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(role)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Records a successful login
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users, newest first, optionally filtered by role
    pub async fn list(
        pool: &PgPool,
        role: Option<Role>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {}
            FROM users
            WHERE ($1::user_role IS NULL OR role = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            USER_COLUMNS
        );

        let users = sqlx::query_as::<_, User>(&query)
            .bind(role)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(users)
    }

    /// Counts users per role
    pub async fn count_by_role(pool: &PgPool) -> Result<RoleCounts, sqlx::Error> {
        let rows: Vec<(Role, i64)> =
            sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
                .fetch_all(pool)
                .await?;

        let mut counts = RoleCounts::default();
        for (role, count) in rows {
            match role {
                Role::Student => counts.students = count,
                Role::Instructor => counts.instructors = count,
                Role::Manager => counts.managers = count,
            }
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.org".to_string(),
            password_hash: "hash".to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            phone: None,
            role: Role::Student,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Student".parse::<Role>().unwrap(), Role::Student);
        assert_eq!("trainer".parse::<Role>().unwrap(), Role::Instructor);
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_capabilities() {
        assert!(!Role::Student.can_author());
        assert!(Role::Instructor.can_author());
        assert!(Role::Manager.can_author());
        assert!(!Role::Manager.is_self_service());
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Instructor).unwrap(), "\"instructor\"");
    }

    #[test]
    fn test_full_name() {
        assert_eq!(user("Ada", "Lovelace").full_name(), "Ada Lovelace");
        assert_eq!(user(" ", "").full_name(), "ada@example.org");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(user("Ada", "Lovelace")).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
