use axum::Json;
use relay_core::request::RelayRequest;
use relay_executors::{
    reconciler::{ChainStatus, StatusReport},
    store::{TransactionRecord, TransactionStatus},
};
use utoipa::OpenApi;

use crate::http::{
    routes::{health, signers, submit, transaction},
    types::{
        HealthResponse, SignerView, SignersResponse, SubmitResponse, TransactionResponse,
        UserTransactionsResponse,
    },
};

#[derive(OpenApi)]
#[openapi(
    info(title = "Meta-Transaction Relay", description = "Gas-less relaying of pre-signed contract calls"),
    paths(
        health::health,
        signers::list_signers,
        submit::submit_transaction,
        transaction::get_transaction,
        transaction::list_user_transactions,
    ),
    components(schemas(
        RelayRequest,
        HealthResponse,
        SignerView,
        SignersResponse,
        SubmitResponse,
        TransactionResponse,
        TransactionRecord,
        TransactionStatus,
        UserTransactionsResponse,
        StatusReport,
        ChainStatus,
    ))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
