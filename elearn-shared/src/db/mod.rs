/// Database layer
///
/// - `pool`: PostgreSQL connection pool with a startup health check
/// - `migrations`: embedded migration runner for the root `migrations/` directory
///
/// Models live in the crate-level `models` module.

pub mod migrations;
pub mod pool;
