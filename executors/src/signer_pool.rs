use std::{collections::HashSet, sync::Arc, time::Duration};

use alloy::{
    primitives::{Address, U256},
    signers::local::PrivateKeySigner,
};
use relay_core::{chain::ChainClient, error::RelayError};
use serde::Serialize;
use tokio::{
    sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore},
    time::Instant,
};

use crate::store::{RelayStore, now_millis};

/// 1 ETH, the default balance a relayer must hold to be selected.
pub const DEFAULT_MIN_BALANCE_WEI: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

#[derive(Debug, Clone)]
pub struct SignerPoolConfig {
    pub private_keys: Vec<String>,
    pub default_min_balance: U256,
    /// How long selection waits for a leased account to be released.
    pub lease_wait: Duration,
}

/// A relayer account as held in memory. The key never leaves the pool
/// except through a [`SignerLease`].
struct PooledSigner {
    id: u64,
    address: Address,
    name: String,
    is_active: bool,
    min_balance: U256,
    key: PrivateKeySigner,
    lease: Arc<Semaphore>,
}

/// Point-in-time view of an account, with a freshly read balance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerSnapshot {
    pub id: u64,
    pub address: Address,
    pub name: String,
    pub is_active: bool,
    pub balance: U256,
    pub min_balance: U256,
    pub leased: bool,
}

/// Exclusive use of one relayer account. Released on drop.
pub struct SignerLease {
    account: Arc<PooledSigner>,
    balance: U256,
    permit: Option<OwnedSemaphorePermit>,
    released: Arc<Notify>,
}

impl SignerLease {
    pub fn id(&self) -> u64 {
        self.account.id
    }

    pub fn address(&self) -> Address {
        self.account.address
    }

    pub fn name(&self) -> &str {
        &self.account.name
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.account.key
    }

    /// Balance observed when the lease was granted.
    pub fn balance(&self) -> U256 {
        self.balance
    }
}

impl Drop for SignerLease {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.released.notify_waiters();
    }
}

impl std::fmt::Debug for SignerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerLease")
            .field("address", &self.account.address)
            .field("name", &self.account.name)
            .finish()
    }
}

/// Round-robin pool of funded relayer accounts.
pub struct SignerPool<S, C> {
    accounts: Vec<Arc<PooledSigner>>,
    cursor: Mutex<usize>,
    released: Arc<Notify>,
    lease_wait: Duration,
    store: Arc<S>,
    chain: Arc<C>,
}

impl<S: RelayStore, C: ChainClient> SignerPool<S, C> {
    /// Loads every configured key, registering (or reactivating) its persisted
    /// row and reading its initial balance.
    pub async fn initialize(
        store: Arc<S>,
        chain: Arc<C>,
        config: &SignerPoolConfig,
    ) -> Result<Self, RelayError> {
        if config.private_keys.is_empty() {
            return Err(RelayError::ConfigError {
                message: "No relayer private keys configured".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut accounts = Vec::with_capacity(config.private_keys.len());

        for (index, raw_key) in config.private_keys.iter().enumerate() {
            let key: PrivateKeySigner =
                raw_key.trim().parse().map_err(|_| RelayError::ConfigError {
                    message: format!("Relayer private key #{} is not a valid key", index + 1),
                })?;
            let address = key.address();
            if !seen.insert(address) {
                tracing::warn!(signer = %address, "Skipping duplicate relayer key");
                continue;
            }

            let row = store
                .upsert_signer(
                    address,
                    &format!("Relayer {}", index + 1),
                    config.default_min_balance,
                )
                .await?;
            let balance = chain.get_balance(address).await?;
            store
                .record_signer_balance(address, balance, now_millis())
                .await?;

            tracing::info!(
                signer = %address,
                name = %row.name,
                balance = %balance,
                min_balance = %row.min_balance_wei,
                "Loaded relayer account"
            );

            accounts.push(Arc::new(PooledSigner {
                id: row.id,
                address,
                name: row.name,
                is_active: row.is_active,
                min_balance: row.min_balance_wei,
                key,
                lease: Arc::new(Semaphore::new(1)),
            }));
        }

        Ok(Self {
            accounts,
            cursor: Mutex::new(0),
            released: Arc::new(Notify::new()),
            lease_wait: config.lease_wait,
            store,
            chain,
        })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Picks the next active, unleased account whose live balance covers its
    /// minimum, and leases it.
    ///
    /// Returns `None` when no account is funded. When funded candidates were
    /// skipped only because they were leased, waits up to `lease_wait` for a
    /// release before giving up.
    pub async fn select_signer(&self) -> Result<Option<SignerLease>, RelayError> {
        if self.accounts.is_empty() {
            return Ok(None);
        }
        let deadline = Instant::now() + self.lease_wait;

        loop {
            // Registered before the scan so a release during the scan is not missed.
            let released = self.released.notified();
            tokio::pin!(released);

            // The cursor lock only picks where the scan starts. Balance reads and
            // usage writes run holding nothing but the candidate's own permit.
            let len = self.accounts.len();
            let start = {
                let mut cursor = self.cursor.lock().await;
                let start = *cursor;
                *cursor = (start + 1) % len;
                start
            };

            let mut saw_leased = false;
            for offset in 0..len {
                let index = (start + offset) % len;
                let account = Arc::clone(&self.accounts[index]);
                if !account.is_active {
                    continue;
                }
                let Ok(permit) = Arc::clone(&account.lease).try_acquire_owned() else {
                    saw_leased = true;
                    continue;
                };

                let mut lease = SignerLease {
                    account,
                    balance: U256::ZERO,
                    permit: Some(permit),
                    released: Arc::clone(&self.released),
                };

                let balance = self.chain.get_balance(lease.address()).await?;
                if balance < lease.account.min_balance {
                    tracing::debug!(
                        signer = %lease.address(),
                        balance = %balance,
                        min_balance = %lease.account.min_balance,
                        "Relayer below minimum balance"
                    );
                    continue;
                }
                lease.balance = balance;
                *self.cursor.lock().await = (index + 1) % len;

                self.store
                    .record_signer_usage(lease.address(), balance, now_millis())
                    .await?;

                tracing::debug!(signer = %lease.address(), balance = %balance, "Leased relayer");
                return Ok(Some(lease));
            }

            if !saw_leased {
                tracing::warn!("No relayer with sufficient balance");
                return Ok(None);
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                tracing::warn!(
                    wait_ms = self.lease_wait.as_millis() as u64,
                    "Timed out waiting for a relayer lease"
                );
                return Ok(None);
            }
        }
    }

    /// True iff some active account currently meets its minimum balance.
    /// Leases are ignored and nothing is written.
    pub async fn has_eligible_signer(&self) -> Result<bool, RelayError> {
        for account in self.accounts.iter().filter(|a| a.is_active) {
            if self.chain.get_balance(account.address).await? >= account.min_balance {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every account with a fresh balance, mirrored to the store.
    pub async fn all_accounts(&self) -> Result<Vec<SignerSnapshot>, RelayError> {
        let mut snapshots = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            let balance = self.chain.get_balance(account.address).await?;
            self.store
                .record_signer_balance(account.address, balance, now_millis())
                .await?;
            snapshots.push(SignerSnapshot {
                id: account.id,
                address: account.address,
                name: account.name.clone(),
                is_active: account.is_active,
                balance,
                min_balance: account.min_balance,
                leased: account.lease.available_permits() == 0,
            });
        }
        Ok(snapshots)
    }
}
