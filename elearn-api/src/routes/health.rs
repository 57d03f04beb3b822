/// Health check endpoint
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "payment_gateway": "sandbox",
///   "pool": { "active_connections": 1, "idle_connections": 4, "total_connections": 5 }
/// }
/// ```
///
/// Always answers 200; a failing database yields `"status": "degraded"` so
/// load balancers can tell the process is alive.

use axum::{extract::State, Json};
use elearn_shared::db::pool::{get_pool_stats, health_check as database_health, PoolStats};
use serde::Serialize;

use crate::{app::AppState, error::ApiResult};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,

    /// Configured FedaPay environment
    pub payment_gateway: String,

    pub pool: PoolStats,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let connected = match database_health(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            false
        }
    };

    Ok(Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database: if connected { "connected" } else { "disconnected" },
        payment_gateway: state.config.payments.environment.to_string(),
        pool: get_pool_stats(&state.db),
    }))
}
