use alloy::primitives::{B256, U256, utils::format_ether};
use relay_executors::{
    reconciler::StatusReport, signer_pool::SignerSnapshot, store::TransactionRecord,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_available_signer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignerView {
    #[schema(value_type = String)]
    pub address: alloy::primitives::Address,
    pub name: String,
    /// Balance in ether
    pub balance: String,
    /// Minimum balance in ether
    pub min_balance: String,
    pub is_active: bool,
    /// Currently held by an in-flight submission
    pub leased: bool,
}

impl From<SignerSnapshot> for SignerView {
    fn from(snapshot: SignerSnapshot) -> Self {
        Self {
            address: snapshot.address,
            name: snapshot.name,
            balance: ether(snapshot.balance),
            min_balance: ether(snapshot.min_balance),
            is_active: snapshot.is_active,
            leased: snapshot.leased,
        }
    }
}

fn ether(wei: U256) -> String {
    format_ether(wei)
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SignersResponse {
    pub signers: Vec<SignerView>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable kind of a classified chain failure, e.g. `insufficient-balance`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl SubmitResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            transaction_id: None,
            message: None,
            error: Some(error.into()),
            error_kind: None,
            details: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    #[serde(flatten)]
    pub record: TransactionRecord,
    /// Live chain status, present while the record is `submitted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain_status: Option<StatusReport>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct UserTransactionsResponse {
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserTransactionsQuery {
    /// Maximum number of records, newest first, capped at 500. Unparseable
    /// values fall back to the default of 50.
    #[param(value_type = Option<u32>)]
    pub limit: Option<String>,
}
