use std::sync::Arc;

use alloy::primitives::{Address, B256};
use relay_core::{
    chain::ChainClient,
    contract::{ContractCallEncoder, PreparedCall},
    error::{ChainCallError, RelayError},
    request::RelayRequest,
    signature::SignatureValidator,
};
use serde::Serialize;

use crate::{
    error_classifier::ChainErrorClassifier,
    nonce_sequencer::NonceSequencer,
    signer_pool::SignerPool,
    store::{
        AuditLevel, AuditLogEntry, RelayStore, Transition, TransactionRecord, TransactionStatus,
        now_millis,
    },
};

pub const INVALID_SIGNATURE: &str = "Invalid signature";
pub const INVALID_NONCE: &str = "Invalid or already used nonce";
pub const NO_SIGNER_RECORDED: &str = "No signer available";
pub const NO_SIGNER_RESPONSE: &str = "No signer available with sufficient balance";

/// Result of one relay attempt, as reported to the caller.
///
/// Rejections (`transaction_id` is `None`) never created a record; failures
/// carry the id of the `failed` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayOutcome {
    pub success: bool,
    pub tx_hash: Option<B256>,
    pub error: Option<String>,
    pub transaction_id: Option<String>,
    pub error_kind: Option<String>,
}

impl RelayOutcome {
    fn rejected(error: &str) -> Self {
        Self {
            success: false,
            tx_hash: None,
            error: Some(error.to_string()),
            transaction_id: None,
            error_kind: None,
        }
    }

    fn failed(transaction_id: &str, error: String, error_kind: Option<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            error: Some(error),
            transaction_id: Some(transaction_id.to_string()),
            error_kind,
        }
    }

    fn submitted(transaction_id: &str, tx_hash: B256) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
            error: None,
            transaction_id: Some(transaction_id.to_string()),
            error_kind: None,
        }
    }
}

/// Drives a relay request from signature check to submission.
///
/// Each status change is a compare-and-set on the record, written together
/// with its audit entry. Store or node outages are returned as errors and
/// leave the record `pending`; they are never recorded as `failed`.
pub struct RelayDispatcher<S, C> {
    validator: SignatureValidator,
    sequencer: NonceSequencer<S>,
    encoder: ContractCallEncoder,
    signers: Arc<SignerPool<S, C>>,
    store: Arc<S>,
    chain: Arc<C>,
}

impl<S: RelayStore, C: ChainClient> RelayDispatcher<S, C> {
    pub fn new(
        store: Arc<S>,
        chain: Arc<C>,
        signers: Arc<SignerPool<S, C>>,
        encoder: ContractCallEncoder,
    ) -> Self {
        Self {
            validator: SignatureValidator::new(),
            sequencer: NonceSequencer::new(Arc::clone(&store)),
            encoder,
            signers,
            store,
            chain,
        }
    }

    pub fn signers(&self) -> &Arc<SignerPool<S, C>> {
        &self.signers
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[tracing::instrument(skip_all, fields(user = %request.user_address, function_name = %request.function_name))]
    pub async fn relay(&self, request: &RelayRequest) -> Result<RelayOutcome, RelayError> {
        if !self.validator.validate_request(request) {
            tracing::info!("Rejected relay request: invalid signature");
            return Ok(RelayOutcome::rejected(INVALID_SIGNATURE));
        }

        let record = TransactionRecord::pending(
            request.user()?,
            request.contract()?,
            request.function_name.clone(),
            request.args_snapshot()?,
            request.signature.clone(),
            request.nonce,
        );

        if !self.sequencer.check_and_advance_with_record(&record).await? {
            tracing::info!(nonce = %request.nonce, "Rejected relay request: nonce not fresh");
            return Ok(RelayOutcome::rejected(INVALID_NONCE));
        }

        match self.process(&record, request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(
                    transaction_id = %record.id,
                    error = %err,
                    "Relay aborted by infrastructure error, record left pending"
                );
                let entry = AuditLogEntry::new(
                    &record.id,
                    AuditLevel::Error,
                    format!("Relay aborted: {err}"),
                );
                if let Err(audit_err) = self.store.append_audit_log(&entry).await {
                    tracing::warn!(
                        transaction_id = %record.id,
                        error = %audit_err,
                        "Failed to write audit entry for aborted relay"
                    );
                }
                Err(err)
            }
        }
    }

    async fn process(
        &self,
        record: &TransactionRecord,
        request: &RelayRequest,
    ) -> Result<RelayOutcome, RelayError> {
        let id = record.id.as_str();

        let call = match self.encoder.encode(
            record.contract_address,
            &request.function_name,
            &request.args,
        ) {
            Ok(call) => call,
            Err(err) => {
                let message = err.to_string();
                tracing::info!(transaction_id = %id, error = %message, "Could not encode relayed call");
                self.fail(id, &message, None).await?;
                return Ok(RelayOutcome::failed(id, message, None));
            }
        };

        let Some(lease) = self.signers.select_signer().await? else {
            self.fail(id, NO_SIGNER_RECORDED, None).await?;
            return Ok(RelayOutcome::failed(id, NO_SIGNER_RESPONSE.to_string(), None));
        };

        if let Some(outcome) = self.simulate(id, &call, lease.address()).await? {
            drop(lease);
            return Ok(outcome);
        }

        match self.chain.submit_call(&call, lease.signer()).await {
            Ok(tx_hash) => {
                let signer = lease.address();
                tracing::info!(
                    transaction_id = %id,
                    tx_hash = %tx_hash,
                    signer = %signer,
                    "Relayed transaction broadcast"
                );

                let transition = Transition::Submitted {
                    tx_hash,
                    signer_address: signer,
                    submitted_at: now_millis(),
                };
                let audit = AuditLogEntry::new(
                    id,
                    AuditLevel::Info,
                    format!("Transaction submitted: {tx_hash}"),
                );
                if let Err(err) = self
                    .apply(id, TransactionStatus::Pending, &transition, Some(&audit))
                    .await
                {
                    tracing::error!(
                        transaction_id = %id,
                        tx_hash = %tx_hash,
                        signer = %signer,
                        error = %err,
                        "Broadcast transaction could not be recorded"
                    );
                    return Err(unrecorded_broadcast(err, tx_hash, signer));
                }

                tracing::info!(
                    transaction_id = %id,
                    tx_hash = %tx_hash,
                    signer = %signer,
                    "Relayed transaction submitted"
                );
                drop(lease);
                Ok(RelayOutcome::submitted(id, tx_hash))
            }
            Err(ChainCallError::Unavailable(err)) => Err(err),
            Err(rejected) => {
                let message = format!("Failed to submit transaction: {}", rejected.message());
                tracing::warn!(
                    transaction_id = %id,
                    signer = %lease.address(),
                    error = %message,
                    "Node rejected relayed transaction"
                );
                self.fail(id, &message, None).await?;
                drop(lease);
                Ok(RelayOutcome::failed(id, message, None))
            }
        }
    }

    /// Dry-runs the call. `Some` is the failure outcome when the node rejects it.
    async fn simulate(
        &self,
        id: &str,
        call: &PreparedCall,
        from: Address,
    ) -> Result<Option<RelayOutcome>, RelayError> {
        match self.chain.estimate_call(call, from).await {
            Ok(gas) => {
                tracing::debug!(transaction_id = %id, gas, "Relayed call simulated");
                Ok(None)
            }
            Err(ChainCallError::Unavailable(err)) => Err(err),
            Err(rejected) => {
                let classified = ChainErrorClassifier::classify(&rejected);
                let kind = classified.kind.as_str().to_string();
                tracing::warn!(
                    transaction_id = %id,
                    error_kind = %kind,
                    error = %rejected,
                    "Relayed call failed simulation"
                );
                self.fail(id, &classified.message, Some(kind.clone())).await?;
                Ok(Some(RelayOutcome::failed(id, classified.message, Some(kind))))
            }
        }
    }

    async fn fail(
        &self,
        id: &str,
        message: &str,
        error_kind: Option<String>,
    ) -> Result<(), RelayError> {
        let transition = Transition::Failed {
            error_message: message.to_string(),
            error_kind,
        };
        let audit = AuditLogEntry::new(id, AuditLevel::Error, format!("Transaction failed: {message}"));
        self.apply(id, TransactionStatus::Pending, &transition, Some(&audit))
            .await
    }

    async fn apply(
        &self,
        id: &str,
        expected: TransactionStatus,
        transition: &Transition,
        audit: Option<&AuditLogEntry>,
    ) -> Result<(), RelayError> {
        if self.store.transition(id, expected, transition, audit).await? {
            Ok(())
        } else {
            Err(RelayError::InternalError {
                message: format!(
                    "Transaction {id} was not {expected} when moving it to {}",
                    transition.target_status()
                ),
            })
        }
    }
}

/// Keeps the hash of a transaction that reached the node in the error, so the
/// abort audit entry and the caller both see it.
fn unrecorded_broadcast(err: RelayError, tx_hash: B256, signer: Address) -> RelayError {
    let note = format!("transaction {tx_hash} was broadcast by {signer} but not recorded");
    match err {
        RelayError::StoreError { message } => RelayError::StoreError {
            message: format!("{message}; {note}"),
        },
        other => RelayError::InternalError {
            message: format!("{other}; {note}"),
        },
    }
}
