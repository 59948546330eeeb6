use std::sync::Arc;

use alloy::primitives::Address;
use relay_core::{error::RelayError, request::UserNonce};

use crate::store::{RelayStore, TransactionRecord};

/// Enforces strictly increasing per-user nonces.
///
/// The compare and the write happen in one atomic store operation, so two
/// concurrent requests for the same user can never both advance from the
/// same prior value.
pub struct NonceSequencer<S> {
    store: Arc<S>,
}

impl<S: RelayStore> NonceSequencer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn check_and_advance(
        &self,
        user: Address,
        nonce: UserNonce,
    ) -> Result<bool, RelayError> {
        let accepted = self.store.check_and_advance_nonce(user, nonce, None).await?;
        if !accepted {
            tracing::debug!(user = %user, nonce = %nonce, "Rejected stale or reused nonce");
        }
        Ok(accepted)
    }

    /// Like [`Self::check_and_advance`], and inserts `record` as `pending`
    /// in the same atomic step when the nonce is accepted.
    pub async fn check_and_advance_with_record(
        &self,
        record: &TransactionRecord,
    ) -> Result<bool, RelayError> {
        let accepted = self
            .store
            .check_and_advance_nonce(record.user_address, record.nonce, Some(record))
            .await?;
        if accepted {
            tracing::debug!(
                user = %record.user_address,
                nonce = %record.nonce,
                transaction_id = %record.id,
                "Accepted nonce and created pending record"
            );
        } else {
            tracing::debug!(
                user = %record.user_address,
                nonce = %record.nonce,
                "Rejected stale or reused nonce"
            );
        }
        Ok(accepted)
    }

    pub async fn current_nonce(&self, user: Address) -> Result<Option<UserNonce>, RelayError> {
        Ok(self.store.current_nonce(user).await?)
    }
}
