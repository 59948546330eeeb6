// Transaction lookups

use std::str::FromStr;

use alloy::primitives::B256;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use relay_core::{chain::ChainClient, error::RelayError, request::parse_address};
use relay_executors::store::{RelayStore, TransactionStatus};

use crate::http::{
    error::{ApiRelayError, RelayResult},
    server::RelayServerState,
    types::{TransactionResponse, UserTransactionsQuery, UserTransactionsResponse},
};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[utoipa::path(
    get,
    operation_id = "getTransaction",
    path = "/api/transaction/{tx_hash}",
    tag = "Transactions",
    responses(
        (status = 200, description = "Stored transaction record", body = TransactionResponse, content_type = "application/json"),
        (status = 404, description = "Unknown transaction hash"),
    ),
    params(
        ("tx_hash" = String, Path, description = "Transaction hash returned on submission"),
    )
)]
/// Get Transaction
///
/// Returns the stored record. While it is `submitted`, the chain is
/// consulted and the record finalized if a receipt exists.
pub async fn get_transaction<S, C>(
    State(state): State<RelayServerState<S, C>>,
    Path(tx_hash): Path<String>,
) -> Result<Json<TransactionResponse>, ApiRelayError>
where
    S: RelayStore + 'static,
    C: ChainClient + 'static,
{
    let hash = B256::from_str(&tx_hash).map_err(|_| {
        ApiRelayError(RelayError::ValidationError {
            message: format!("Invalid transaction hash: {tx_hash:?}"),
        })
    })?;

    let record = state
        .store
        .get_transaction_by_hash(hash)
        .await
        .api_error()?
        .ok_or_else(|| ApiRelayError(RelayError::TransactionNotFound { tx_hash: tx_hash.clone() }))?;

    if record.status != TransactionStatus::Submitted {
        return Ok(Json(TransactionResponse {
            record,
            blockchain_status: None,
        }));
    }

    let status = state.reconciler.reconcile(hash).await?;
    // Reconciliation may have finalized it; serve the current row.
    let record = state
        .store
        .get_transaction(&record.id)
        .await
        .api_error()?
        .unwrap_or(record);

    Ok(Json(TransactionResponse {
        record,
        blockchain_status: Some(status),
    }))
}

#[utoipa::path(
    get,
    operation_id = "listUserTransactions",
    path = "/api/user/{address}/transactions",
    tag = "Transactions",
    responses(
        (status = 200, description = "The user's records, newest first", body = UserTransactionsResponse, content_type = "application/json"),
    ),
    params(
        ("address" = String, Path, description = "User address"),
        UserTransactionsQuery,
    )
)]
/// List User Transactions
pub async fn list_user_transactions<S, C>(
    State(state): State<RelayServerState<S, C>>,
    Path(address): Path<String>,
    Query(query): Query<UserTransactionsQuery>,
) -> Result<Json<UserTransactionsResponse>, ApiRelayError>
where
    S: RelayStore + 'static,
    C: ChainClient + 'static,
{
    let user = parse_address("address", &address)?;
    let limit = query
        .limit
        .as_deref()
        .and_then(|limit| limit.trim().parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_LIMIT)
        .min(MAX_LIMIT);

    let transactions = state
        .store
        .list_user_transactions(user, limit)
        .await
        .api_error()?;

    Ok(Json(UserTransactionsResponse { transactions }))
}
