use std::{sync::Arc, time::Duration};

use alloy::primitives::B256;
use relay_core::{chain::ChainClient, error::RelayError};
use serde::Serialize;

use crate::store::{
    AuditLevel, AuditLogEntry, RelayStore, Transition, TransactionRecord, TransactionStatus,
    now_millis,
};

/// Chain-facing status of a relayed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: ChainStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

impl StatusReport {
    fn pending() -> Self {
        Self {
            status: ChainStatus::Pending,
            block_number: None,
            gas_used: None,
        }
    }

    fn from_record(record: &TransactionRecord) -> Self {
        let status = match record.status {
            TransactionStatus::Confirmed => ChainStatus::Confirmed,
            TransactionStatus::Failed => ChainStatus::Failed,
            TransactionStatus::Pending | TransactionStatus::Submitted => ChainStatus::Pending,
        };
        Self {
            status,
            block_number: record.block_number,
            gas_used: record.gas_used,
        }
    }
}

/// Outcome of one sweep over submitted records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
    /// Ids of `pending` records older than the stale threshold
    pub stale_pending: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub batch_size: usize,
    pub stale_pending_after: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            stale_pending_after: Duration::from_secs(300),
        }
    }
}

/// Finalizes `submitted` records from chain receipts. Never touches records
/// in any other state.
pub struct StatusReconciler<S, C> {
    store: Arc<S>,
    chain: Arc<C>,
    config: ReconcilerConfig,
}

impl<S: RelayStore + 'static, C: ChainClient + 'static> StatusReconciler<S, C> {
    pub fn new(store: Arc<S>, chain: Arc<C>, config: ReconcilerConfig) -> Self {
        Self {
            store,
            chain,
            config,
        }
    }

    #[tracing::instrument(skip_all, fields(tx_hash = %tx_hash))]
    pub async fn reconcile(&self, tx_hash: B256) -> Result<StatusReport, RelayError> {
        let record = self
            .store
            .get_transaction_by_hash(tx_hash)
            .await?
            .ok_or_else(|| RelayError::TransactionNotFound {
                tx_hash: tx_hash.to_string(),
            })?;
        self.reconcile_record(&record).await
    }

    async fn reconcile_record(&self, record: &TransactionRecord) -> Result<StatusReport, RelayError> {
        if record.status != TransactionStatus::Submitted {
            return Ok(StatusReport::from_record(record));
        }
        let Some(tx_hash) = record.tx_hash else {
            return Err(RelayError::InternalError {
                message: format!("Submitted transaction {} has no hash", record.id),
            });
        };

        let Some(receipt) = self.chain.get_receipt(tx_hash).await? else {
            return Ok(StatusReport::pending());
        };

        let transition = Transition::Finalized {
            success: receipt.success,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            confirmed_at: now_millis(),
        };
        let (level, message) = if receipt.success {
            (AuditLevel::Info, format!("Transaction confirmed: {tx_hash}"))
        } else {
            (AuditLevel::Error, format!("Transaction reverted: {tx_hash}"))
        };
        let audit = AuditLogEntry::new(&record.id, level, message);

        let applied = self
            .store
            .transition(&record.id, TransactionStatus::Submitted, &transition, Some(&audit))
            .await?;

        if applied {
            tracing::info!(
                transaction_id = %record.id,
                tx_hash = %tx_hash,
                success = receipt.success,
                block_number = ?receipt.block_number,
                gas_used = receipt.gas_used,
                "Finalized relayed transaction"
            );
            let mut finalized = record.clone();
            transition.apply(&mut finalized);
            return Ok(StatusReport::from_record(&finalized));
        }

        // Another reconciler finalized it first.
        let current = self
            .store
            .get_transaction(&record.id)
            .await?
            .ok_or_else(|| RelayError::TransactionNotFound {
                tx_hash: tx_hash.to_string(),
            })?;
        Ok(StatusReport::from_record(&current))
    }

    /// Reconciles up to `batch_size` submitted records and lists stale
    /// pending ones. Per-record chain errors are counted, not propagated.
    pub async fn reconcile_submitted(&self) -> Result<SweepReport, RelayError> {
        let mut report = SweepReport::default();

        let submitted = self
            .store
            .list_transactions_by_status(TransactionStatus::Submitted, self.config.batch_size)
            .await?;

        for record in &submitted {
            report.checked += 1;
            match self.reconcile_record(record).await {
                Ok(status) => match status.status {
                    ChainStatus::Confirmed => report.confirmed += 1,
                    ChainStatus::Failed => report.failed += 1,
                    ChainStatus::Pending => report.still_pending += 1,
                },
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(
                        transaction_id = %record.id,
                        error = %err,
                        "Failed to reconcile submitted transaction"
                    );
                }
            }
        }

        let stale_before =
            now_millis().saturating_sub(self.config.stale_pending_after.as_millis() as u64);
        let pending = self
            .store
            .list_transactions_by_status(TransactionStatus::Pending, self.config.batch_size)
            .await?;
        for record in pending.iter().filter(|r| r.created_at <= stale_before) {
            tracing::warn!(
                transaction_id = %record.id,
                user = %record.user_address,
                created_at = record.created_at,
                "Transaction stuck in pending"
            );
            report.stale_pending.push(record.id.clone());
        }

        Ok(report)
    }

    /// Runs [`Self::reconcile_submitted`] every `interval` until shut down.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> ReconcilerHandle {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let join_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::info!("Reconciler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.reconcile_submitted().await {
                            Ok(report) => {
                                if report.checked > 0 || !report.stale_pending.is_empty() {
                                    tracing::info!(
                                        checked = report.checked,
                                        confirmed = report.confirmed,
                                        failed = report.failed,
                                        still_pending = report.still_pending,
                                        errors = report.errors,
                                        stale_pending = report.stale_pending.len(),
                                        "Reconciliation sweep finished"
                                    );
                                }
                            }
                            Err(err) => {
                                tracing::error!(error = %err, "Reconciliation sweep failed");
                            }
                        }
                    }
                }
            }
        });

        ReconcilerHandle {
            join_handle,
            shutdown_tx,
        }
    }
}

/// Handle for the background sweep, shut down gracefully.
pub struct ReconcilerHandle {
    join_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl ReconcilerHandle {
    pub async fn shutdown(self) -> Result<(), RelayError> {
        tracing::info!("Initiating graceful shutdown of reconciler");

        if self.shutdown_tx.send(()).is_err() {
            tracing::warn!("Reconciler was already shutting down");
        }

        match self.join_handle.await {
            Ok(()) => {
                tracing::info!("Reconciler shut down gracefully");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Reconciler task panicked during shutdown: {:?}", e);
                Err(RelayError::InternalError {
                    message: format!("Reconciler panic: {e}"),
                })
            }
        }
    }
}
