use axum::{Json, extract::State};
use relay_core::chain::ChainClient;
use relay_executors::store::RelayStore;

use crate::http::{
    error::{ApiRelayError, RelayResult},
    server::RelayServerState,
    types::{SignerView, SignersResponse},
};

#[utoipa::path(
    get,
    operation_id = "listSigners",
    path = "/api/signers",
    tag = "Signers",
    responses(
        (status = 200, description = "Relayer accounts with live balances", body = SignersResponse, content_type = "application/json"),
    )
)]
/// List Signers
///
/// Refreshes and returns the balance of every relayer account.
pub async fn list_signers<S, C>(
    State(state): State<RelayServerState<S, C>>,
) -> Result<Json<SignersResponse>, ApiRelayError>
where
    S: RelayStore + 'static,
    C: ChainClient + 'static,
{
    let accounts = state.signers.all_accounts().await.api_error()?;

    Ok(Json(SignersResponse {
        signers: accounts.into_iter().map(SignerView::from).collect(),
    }))
}
