use std::{collections::HashMap, sync::Arc};

use alloy::primitives::{Address, B256, U256};
use relay_core::request::UserNonce;
use tokio::sync::Mutex;

use super::{
    AuditLogEntry, RelayStore, RelayStoreError, SignerRow, Transition, TransactionRecord,
    TransactionStatus,
};

#[derive(Default)]
struct MemoryState {
    nonces: HashMap<Address, UserNonce>,
    transactions: HashMap<String, TransactionRecord>,
    /// Insertion order of transaction ids
    sequence: Vec<String>,
    by_hash: HashMap<B256, String>,
    audit_log: HashMap<String, Vec<AuditLogEntry>>,
    signers: HashMap<Address, SignerRow>,
    next_signer_id: u64,
}

/// Single-process store. Every operation runs under one mutex, which makes
/// each of them atomic.
#[derive(Clone, Default)]
pub struct MemoryRelayStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRelayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelayStore for MemoryRelayStore {
    async fn check_and_advance_nonce(
        &self,
        user: Address,
        nonce: UserNonce,
        record: Option<&TransactionRecord>,
    ) -> Result<bool, RelayStoreError> {
        let mut state = self.state.lock().await;
        if let Some(current) = state.nonces.get(&user) {
            if nonce <= *current {
                return Ok(false);
            }
        }
        state.nonces.insert(user, nonce);

        if let Some(record) = record {
            let mut record = record.clone();
            record.status = TransactionStatus::Pending;
            state.sequence.push(record.id.clone());
            state.transactions.insert(record.id.clone(), record);
        }
        Ok(true)
    }

    async fn current_nonce(&self, user: Address) -> Result<Option<UserNonce>, RelayStoreError> {
        Ok(self.state.lock().await.nonces.get(&user).copied())
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>, RelayStoreError> {
        Ok(self.state.lock().await.transactions.get(id).cloned())
    }

    async fn get_transaction_by_hash(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionRecord>, RelayStoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_hash
            .get(&tx_hash)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn list_user_transactions(
        &self,
        user: Address,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, RelayStoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sequence
            .iter()
            .rev()
            .filter_map(|id| state.transactions.get(id))
            .filter(|record| record.user_address == user)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_transactions_by_status(
        &self,
        status: TransactionStatus,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, RelayStoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sequence
            .iter()
            .filter_map(|id| state.transactions.get(id))
            .filter(|record| record.status == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        id: &str,
        expected: TransactionStatus,
        transition: &Transition,
        audit: Option<&AuditLogEntry>,
    ) -> Result<bool, RelayStoreError> {
        let mut state = self.state.lock().await;
        let Some(record) = state.transactions.get_mut(id) else {
            return Ok(false);
        };
        if record.status != expected {
            return Ok(false);
        }

        transition.apply(record);
        let tx_hash = record.tx_hash;
        if let Some(hash) = tx_hash {
            state.by_hash.insert(hash, id.to_string());
        }
        if let Some(entry) = audit {
            state
                .audit_log
                .entry(entry.transaction_id.clone())
                .or_default()
                .push(entry.clone());
        }
        Ok(true)
    }

    async fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<(), RelayStoreError> {
        self.state
            .lock()
            .await
            .audit_log
            .entry(entry.transaction_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_audit_log(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<AuditLogEntry>, RelayStoreError> {
        Ok(self
            .state
            .lock()
            .await
            .audit_log
            .get(transaction_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_signer(&self, address: Address) -> Result<Option<SignerRow>, RelayStoreError> {
        Ok(self.state.lock().await.signers.get(&address).cloned())
    }

    async fn upsert_signer(
        &self,
        address: Address,
        name: &str,
        min_balance_wei: U256,
    ) -> Result<SignerRow, RelayStoreError> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.signers.get_mut(&address) {
            row.is_active = true;
            return Ok(row.clone());
        }

        state.next_signer_id += 1;
        let row = SignerRow {
            id: state.next_signer_id,
            address,
            name: name.to_string(),
            is_active: true,
            min_balance_wei,
            balance_wei: None,
            last_used_at: None,
            last_balance_check: None,
        };
        state.signers.insert(address, row.clone());
        Ok(row)
    }

    async fn record_signer_usage(
        &self,
        address: Address,
        balance_wei: U256,
        used_at: u64,
    ) -> Result<(), RelayStoreError> {
        let mut state = self.state.lock().await;
        let row = state
            .signers
            .get_mut(&address)
            .ok_or(RelayStoreError::SignerNotFound { address })?;
        row.balance_wei = Some(balance_wei);
        row.last_used_at = Some(used_at);
        row.last_balance_check = Some(used_at);
        Ok(())
    }

    async fn record_signer_balance(
        &self,
        address: Address,
        balance_wei: U256,
        checked_at: u64,
    ) -> Result<(), RelayStoreError> {
        let mut state = self.state.lock().await;
        let row = state
            .signers
            .get_mut(&address)
            .ok_or(RelayStoreError::SignerNotFound { address })?;
        row.balance_wei = Some(balance_wei);
        row.last_balance_check = Some(checked_at);
        Ok(())
    }
}
