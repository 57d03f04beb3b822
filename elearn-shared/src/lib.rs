//! # Elearn Shared Library
//!
//! Domain types, persistence and business logic for the e-learning platform,
//! used by the API server.
//!
//! ## Module Organization
//!
//! - `models`: Database models and queries
//! - `auth`: Passwords, JWTs and role checks
//! - `gateway`: Payment gateway client, webhook events and signatures
//! - `services`: Payments reconciliation, progress, certificates and grading
//! - `content`: Markdown rendering and certificate PDFs
//! - `settings`: Payment and certificate settings
//! - `db`: Connection pool and migrations
//! - `error`: Service error type

pub mod auth;
pub mod content;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod services;
pub mod settings;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
