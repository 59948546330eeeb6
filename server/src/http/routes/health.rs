use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relay_core::chain::ChainClient;
use relay_executors::store::RelayStore;

use crate::http::{server::RelayServerState, types::HealthResponse};

#[utoipa::path(
    get,
    operation_id = "health",
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Relay is healthy", body = HealthResponse, content_type = "application/json"),
        (status = 500, description = "Signer balances could not be read", body = HealthResponse, content_type = "application/json"),
    )
)]
/// Health Check
///
/// Reports whether any relayer account currently meets its minimum balance.
pub async fn health<S, C>(State(state): State<RelayServerState<S, C>>) -> Response
where
    S: RelayStore + 'static,
    C: ChainClient + 'static,
{
    match state.signers.has_eligible_signer().await {
        Ok(has_available_signer) => Json(HealthResponse {
            status: "healthy".to_string(),
            has_available_signer: Some(has_available_signer),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            error: None,
        })
        .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    has_available_signer: None,
                    timestamp: None,
                    error: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}
