use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relay_core::{chain::ChainClient, error::RelayError, request::RelayRequest};
use relay_executors::store::RelayStore;

use crate::http::{error::ApiRelayError, server::RelayServerState, types::SubmitResponse};

const VALIDATION_ERROR: &str = "Validation error";

/// Shape checks done before any signature or nonce work.
fn validate(request: &RelayRequest) -> Result<(), RelayError> {
    request.user()?;
    request.contract()?;
    if request.function_name.trim().is_empty() {
        return Err(RelayError::ValidationError {
            message: "functionName must not be empty".to_string(),
        });
    }
    Ok(())
}

fn rejected(details: String) -> Response {
    let body = SubmitResponse {
        details: Some(details),
        ..SubmitResponse::failure(VALIDATION_ERROR)
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

#[utoipa::path(
    post,
    operation_id = "submitTransaction",
    path = "/api/submit",
    tag = "Relay",
    request_body(content = RelayRequest, description = "Pre-signed relay request", content_type = "application/json"),
    responses(
        (status = 200, description = "Transaction submitted", body = SubmitResponse, content_type = "application/json"),
        (status = 400, description = "Request rejected or transaction failed", body = SubmitResponse, content_type = "application/json"),
    )
)]
/// Submit Transaction
///
/// Verifies the user's signature and nonce, then submits the call from a
/// funded relayer account.
pub async fn submit_transaction<S, C>(
    State(state): State<RelayServerState<S, C>>,
    body: Result<Json<RelayRequest>, JsonRejection>,
) -> Result<Response, ApiRelayError>
where
    S: RelayStore + 'static,
    C: ChainClient + 'static,
{
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return Ok(rejected(rejection.body_text())),
    };
    if let Err(err) = validate(&request) {
        return Ok(rejected(err.to_string()));
    }

    tracing::info!(
        user = %request.user_address,
        contract = %request.contract_address,
        function_name = %request.function_name,
        nonce = %request.nonce,
        "Processing relay request"
    );

    let outcome = state.dispatcher.relay(&request).await?;

    if outcome.success {
        return Ok(Json(SubmitResponse {
            success: true,
            tx_hash: outcome.tx_hash,
            transaction_id: outcome.transaction_id,
            message: Some("Transaction submitted successfully".to_string()),
            error: None,
            error_kind: None,
            details: None,
        })
        .into_response());
    }

    let body = SubmitResponse {
        transaction_id: outcome.transaction_id,
        error_kind: outcome.error_kind,
        ..SubmitResponse::failure(outcome.error.unwrap_or_default())
    };
    Ok((StatusCode::BAD_REQUEST, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::request::UserNonce;

    fn request(user: &str, contract: &str, function_name: &str) -> RelayRequest {
        RelayRequest {
            user_address: user.to_string(),
            contract_address: contract.to_string(),
            function_name: function_name.to_string(),
            args: vec![],
            signature: "0x".to_string(),
            nonce: UserNonce::from(1),
        }
    }

    #[test]
    fn validation_checks_addresses_and_function() {
        let user = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        let contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

        assert!(validate(&request(user, contract, "ping()")).is_ok());
        assert!(validate(&request("0x1234", contract, "ping()")).is_err());
        assert!(validate(&request(user, "not-an-address", "ping()")).is_err());
        assert!(validate(&request(user, contract, "  ")).is_err());
    }
}
