use alloy::primitives::{Address, B256, U256};
use relay_core::{error::RelayError, request::UserNonce};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

mod memory;
mod redis;

pub use memory::MemoryRelayStore;
pub use redis::RedisRelayStore;

/// Lifecycle of a relayed transaction. `Confirmed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Submitted => "submitted",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed | TransactionStatus::Failed
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    #[schema(value_type = String)]
    pub user_address: Address,
    #[schema(value_type = String)]
    pub contract_address: Address,
    pub function_name: String,
    /// Compact JSON snapshot of the call arguments
    pub args: String,
    pub signature: String,
    #[schema(value_type = String)]
    pub nonce: UserNonce,
    pub status: TransactionStatus,
    #[schema(value_type = Option<String>)]
    pub tx_hash: Option<B256>,
    #[schema(value_type = Option<String>)]
    pub signer_address: Option<Address>,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    /// Unix milliseconds
    pub created_at: u64,
    pub submitted_at: Option<u64>,
    pub confirmed_at: Option<u64>,
}

impl TransactionRecord {
    /// A fresh `pending` record with a random id.
    pub fn pending(
        user_address: Address,
        contract_address: Address,
        function_name: String,
        args: String,
        signature: String,
        nonce: UserNonce,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_address,
            contract_address,
            function_name,
            args,
            signature,
            nonce,
            status: TransactionStatus::Pending,
            tx_hash: None,
            signer_address: None,
            error_message: None,
            error_kind: None,
            block_number: None,
            gas_used: None,
            created_at: now_millis(),
            submitted_at: None,
            confirmed_at: None,
        }
    }
}

/// A status change and the fields written with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Submitted {
        tx_hash: B256,
        signer_address: Address,
        submitted_at: u64,
    },
    Failed {
        error_message: String,
        error_kind: Option<String>,
    },
    Finalized {
        success: bool,
        block_number: Option<u64>,
        gas_used: u64,
        confirmed_at: u64,
    },
}

impl Transition {
    pub fn target_status(&self) -> TransactionStatus {
        match self {
            Transition::Submitted { .. } => TransactionStatus::Submitted,
            Transition::Failed { .. } => TransactionStatus::Failed,
            Transition::Finalized { success: true, .. } => TransactionStatus::Confirmed,
            Transition::Finalized { success: false, .. } => TransactionStatus::Failed,
        }
    }

    pub fn apply(&self, record: &mut TransactionRecord) {
        record.status = self.target_status();
        match self {
            Transition::Submitted {
                tx_hash,
                signer_address,
                submitted_at,
            } => {
                record.tx_hash = Some(*tx_hash);
                record.signer_address = Some(*signer_address);
                record.submitted_at = Some(*submitted_at);
            }
            Transition::Failed {
                error_message,
                error_kind,
            } => {
                record.error_message = Some(error_message.clone());
                record.error_kind = error_kind.clone();
            }
            Transition::Finalized {
                success,
                block_number,
                gas_used,
                confirmed_at,
            } => {
                record.block_number = *block_number;
                record.gas_used = Some(*gas_used);
                record.confirmed_at = Some(*confirmed_at);
                if !success {
                    record.error_message = Some("Transaction reverted on chain".to_string());
                    record.error_kind = Some("reverted".to_string());
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub transaction_id: String,
    pub level: AuditLevel,
    pub message: String,
    pub timestamp: u64,
}

impl AuditLogEntry {
    pub fn new(transaction_id: &str, level: AuditLevel, message: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            level,
            message: message.into(),
            timestamp: now_millis(),
        }
    }
}

/// Persisted mirror of a relayer account. Balance and usage fields are
/// informational; the pool reads live balances from the chain.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerRow {
    pub id: u64,
    pub address: Address,
    pub name: String,
    pub is_active: bool,
    #[serde_as(as = "DisplayFromStr")]
    pub min_balance_wei: U256,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub balance_wei: Option<U256>,
    #[serde(default)]
    pub last_used_at: Option<u64>,
    #[serde(default)]
    pub last_balance_check: Option<u64>,
}

#[derive(Debug, thiserror::Error, Serialize, Deserialize, Clone)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "errorCode")]
pub enum RelayStoreError {
    #[error("Redis error: {message}")]
    RedisError { message: String },

    #[error("Serialization error: {message}")]
    DeserError { message: String },

    #[error("Signer not found: {address}")]
    SignerNotFound { address: Address },
}

impl From<::redis::RedisError> for RelayStoreError {
    fn from(error: ::redis::RedisError) -> Self {
        RelayStoreError::RedisError {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for RelayStoreError {
    fn from(error: serde_json::Error) -> Self {
        RelayStoreError::DeserError {
            message: error.to_string(),
        }
    }
}

impl From<RelayStoreError> for RelayError {
    fn from(err: RelayStoreError) -> Self {
        RelayError::StoreError {
            message: err.to_string(),
        }
    }
}

/// Persistence for nonces, transaction records, audit entries and the
/// signer mirror. Every multi-field write is atomic.
pub trait RelayStore: Send + Sync {
    /// Accepts `nonce` iff it is strictly greater than the stored nonce for
    /// `user` (or none is stored), advancing it in the same atomic step. When
    /// `record` is given it is inserted, as `pending`, only on acceptance.
    fn check_and_advance_nonce(
        &self,
        user: Address,
        nonce: UserNonce,
        record: Option<&TransactionRecord>,
    ) -> impl Future<Output = Result<bool, RelayStoreError>> + Send;

    fn current_nonce(
        &self,
        user: Address,
    ) -> impl Future<Output = Result<Option<UserNonce>, RelayStoreError>> + Send;

    fn get_transaction(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<TransactionRecord>, RelayStoreError>> + Send;

    fn get_transaction_by_hash(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionRecord>, RelayStoreError>> + Send;

    /// Newest first.
    fn list_user_transactions(
        &self,
        user: Address,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<TransactionRecord>, RelayStoreError>> + Send;

    /// Oldest first.
    fn list_transactions_by_status(
        &self,
        status: TransactionStatus,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<TransactionRecord>, RelayStoreError>> + Send;

    /// Compare-and-set on the record status. Returns `false` without writing
    /// when the record is missing or not in `expected`.
    fn transition(
        &self,
        id: &str,
        expected: TransactionStatus,
        transition: &Transition,
        audit: Option<&AuditLogEntry>,
    ) -> impl Future<Output = Result<bool, RelayStoreError>> + Send;

    fn append_audit_log(
        &self,
        entry: &AuditLogEntry,
    ) -> impl Future<Output = Result<(), RelayStoreError>> + Send;

    fn list_audit_log(
        &self,
        transaction_id: &str,
    ) -> impl Future<Output = Result<Vec<AuditLogEntry>, RelayStoreError>> + Send;

    fn find_signer(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Option<SignerRow>, RelayStoreError>> + Send;

    /// Inserts a new active row, or reactivates an existing inactive one.
    fn upsert_signer(
        &self,
        address: Address,
        name: &str,
        min_balance_wei: U256,
    ) -> impl Future<Output = Result<SignerRow, RelayStoreError>> + Send;

    fn record_signer_usage(
        &self,
        address: Address,
        balance_wei: U256,
        used_at: u64,
    ) -> impl Future<Output = Result<(), RelayStoreError>> + Send;

    fn record_signer_balance(
        &self,
        address: Address,
        balance_wei: U256,
        checked_at: u64,
    ) -> impl Future<Output = Result<(), RelayStoreError>> + Send;
}

/// Store selected at startup.
#[derive(Clone)]
pub enum RelayStoreBackend {
    Redis(RedisRelayStore),
    Memory(MemoryRelayStore),
}

impl RelayStore for RelayStoreBackend {
    async fn check_and_advance_nonce(
        &self,
        user: Address,
        nonce: UserNonce,
        record: Option<&TransactionRecord>,
    ) -> Result<bool, RelayStoreError> {
        match self {
            Self::Redis(store) => store.check_and_advance_nonce(user, nonce, record).await,
            Self::Memory(store) => store.check_and_advance_nonce(user, nonce, record).await,
        }
    }

    async fn current_nonce(&self, user: Address) -> Result<Option<UserNonce>, RelayStoreError> {
        match self {
            Self::Redis(store) => store.current_nonce(user).await,
            Self::Memory(store) => store.current_nonce(user).await,
        }
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>, RelayStoreError> {
        match self {
            Self::Redis(store) => store.get_transaction(id).await,
            Self::Memory(store) => store.get_transaction(id).await,
        }
    }

    async fn get_transaction_by_hash(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionRecord>, RelayStoreError> {
        match self {
            Self::Redis(store) => store.get_transaction_by_hash(tx_hash).await,
            Self::Memory(store) => store.get_transaction_by_hash(tx_hash).await,
        }
    }

    async fn list_user_transactions(
        &self,
        user: Address,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, RelayStoreError> {
        match self {
            Self::Redis(store) => store.list_user_transactions(user, limit).await,
            Self::Memory(store) => store.list_user_transactions(user, limit).await,
        }
    }

    async fn list_transactions_by_status(
        &self,
        status: TransactionStatus,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, RelayStoreError> {
        match self {
            Self::Redis(store) => store.list_transactions_by_status(status, limit).await,
            Self::Memory(store) => store.list_transactions_by_status(status, limit).await,
        }
    }

    async fn transition(
        &self,
        id: &str,
        expected: TransactionStatus,
        transition: &Transition,
        audit: Option<&AuditLogEntry>,
    ) -> Result<bool, RelayStoreError> {
        match self {
            Self::Redis(store) => store.transition(id, expected, transition, audit).await,
            Self::Memory(store) => store.transition(id, expected, transition, audit).await,
        }
    }

    async fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<(), RelayStoreError> {
        match self {
            Self::Redis(store) => store.append_audit_log(entry).await,
            Self::Memory(store) => store.append_audit_log(entry).await,
        }
    }

    async fn list_audit_log(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<AuditLogEntry>, RelayStoreError> {
        match self {
            Self::Redis(store) => store.list_audit_log(transaction_id).await,
            Self::Memory(store) => store.list_audit_log(transaction_id).await,
        }
    }

    async fn find_signer(&self, address: Address) -> Result<Option<SignerRow>, RelayStoreError> {
        match self {
            Self::Redis(store) => store.find_signer(address).await,
            Self::Memory(store) => store.find_signer(address).await,
        }
    }

    async fn upsert_signer(
        &self,
        address: Address,
        name: &str,
        min_balance_wei: U256,
    ) -> Result<SignerRow, RelayStoreError> {
        match self {
            Self::Redis(store) => store.upsert_signer(address, name, min_balance_wei).await,
            Self::Memory(store) => store.upsert_signer(address, name, min_balance_wei).await,
        }
    }

    async fn record_signer_usage(
        &self,
        address: Address,
        balance_wei: U256,
        used_at: u64,
    ) -> Result<(), RelayStoreError> {
        match self {
            Self::Redis(store) => store.record_signer_usage(address, balance_wei, used_at).await,
            Self::Memory(store) => store.record_signer_usage(address, balance_wei, used_at).await,
        }
    }

    async fn record_signer_balance(
        &self,
        address: Address,
        balance_wei: U256,
        checked_at: u64,
    ) -> Result<(), RelayStoreError> {
        match self {
            Self::Redis(store) => {
                store
                    .record_signer_balance(address, balance_wei, checked_at)
                    .await
            }
            Self::Memory(store) => {
                store
                    .record_signer_balance(address, balance_wei, checked_at)
                    .await
            }
        }
    }
}

pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
