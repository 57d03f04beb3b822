/// FedaPay webhook and callback endpoints
///
/// Neither endpoint is authenticated with a JWT. The webhook is trusted only
/// through its HMAC signature; the callback is never trusted at all and only
/// triggers a server-side re-check with the gateway.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use elearn_shared::{gateway::SIGNATURE_HEADER, services::ReconcileOutcome};

use crate::{app::AppState, error::ApiResult};

/// Receives a signed gateway event
///
/// The raw body is verified before it is parsed. Invalid signatures get a
/// `400`; everything else, including unknown transactions, is acknowledged
/// with `200` so the gateway stops retrying.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ReconcileOutcome>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.payments().handle_webhook(&body, signature).await?;

    if let Some(enrollment_id) = outcome.enrollment_id() {
        tracing::debug!(%enrollment_id, ?outcome, "Webhook reconciled");
    }

    Ok(Json(outcome))
}

/// Return leg of the hosted checkout
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ReconcileOutcome>> {
    let outcome = state.payments().handle_callback(&params).await?;
    Ok(Json(outcome))
}
