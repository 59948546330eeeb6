use alloy::primitives::{Address, B256, U256};
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use relay_core::request::UserNonce;

use super::{
    AuditLogEntry, RelayStore, RelayStoreError, SignerRow, Transition, TransactionRecord,
    TransactionStatus,
};

/// Redis-backed store.
///
/// Records live in `{ns}:relay:tx:{id}` hashes with a JSON `data` field and a
/// plain `status` field, so status compare-and-set can run inside Lua without
/// decoding JSON. Per-status and per-user sorted sets are scored by a global
/// insertion sequence.
#[derive(Clone)]
pub struct RedisRelayStore {
    redis: ConnectionManager,
    namespace: Option<String>,
}

impl RedisRelayStore {
    pub fn new(redis: ConnectionManager, namespace: Option<String>) -> Self {
        Self { redis, namespace }
    }

    pub async fn connect(redis_url: &str, namespace: Option<String>) -> Result<Self, RelayStoreError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self::new(redis, namespace))
    }

    fn key(&self, suffix: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:relay:{suffix}"),
            None => format!("relay:{suffix}"),
        }
    }

    fn user_nonce_key(&self) -> String {
        self.key("user_nonce")
    }

    fn transaction_key(&self, id: &str) -> String {
        self.key(&format!("tx:{id}"))
    }

    fn transaction_sequence_key(&self) -> String {
        self.key("tx_seq")
    }

    fn status_index_key(&self, status: TransactionStatus) -> String {
        self.key(&format!("status:{status}"))
    }

    fn user_index_key(&self, user: Address) -> String {
        self.key(&format!("user_tx:{user}"))
    }

    fn tx_hash_key(&self, tx_hash: B256) -> String {
        self.key(&format!("tx_hash:{tx_hash}"))
    }

    fn audit_log_key(&self, transaction_id: &str) -> String {
        self.key(&format!("tx_logs:{transaction_id}"))
    }

    fn signer_key(&self, address: Address) -> String {
        self.key(&format!("signer:{address}"))
    }

    fn signer_set_key(&self) -> String {
        self.key("signers")
    }

    fn signer_id_key(&self) -> String {
        self.key("signer_id")
    }

    async fn load_transactions(
        &self,
        ids: Vec<String>,
    ) -> Result<Vec<TransactionRecord>, RelayStoreError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_transaction(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Writes the balance mirror, and the last-used time when `used_at` is
    /// set, in one script so concurrent refreshes never drop a usage mark.
    async fn update_signer(
        &self,
        address: Address,
        balance_wei: U256,
        checked_at: u64,
        used_at: Option<u64>,
    ) -> Result<(), RelayStoreError> {
        let script = Script::new(
            r#"
            local signer_key = KEYS[1]
            local balance = ARGV[1]
            local checked_at = tonumber(ARGV[2])
            local used_at = ARGV[3]

            local existing = redis.call('GET', signer_key)
            if not existing then
                return 0
            end

            local row = cjson.decode(existing)
            row.balanceWei = balance
            row.lastBalanceCheck = checked_at
            if used_at ~= '' then
                row.lastUsedAt = tonumber(used_at)
            end
            redis.call('SET', signer_key, cjson.encode(row))
            return 1
            "#,
        );

        let updated: i64 = script
            .key(self.signer_key(address))
            .arg(balance_wei.to_string())
            .arg(checked_at)
            .arg(used_at.map(|at| at.to_string()).unwrap_or_default())
            .invoke_async(&mut self.redis.clone())
            .await?;

        if updated == 0 {
            return Err(RelayStoreError::SignerNotFound { address });
        }
        Ok(())
    }
}

/// Inclusive stop index for the first `limit` members; `-1` reads to the end.
fn range_stop(limit: usize) -> isize {
    isize::try_from(limit).map_or(-1, |limit| limit - 1)
}

impl RelayStore for RedisRelayStore {
    async fn check_and_advance_nonce(
        &self,
        user: Address,
        nonce: UserNonce,
        record: Option<&TransactionRecord>,
    ) -> Result<bool, RelayStoreError> {
        // Nonces are canonical decimal strings: a longer string is a larger
        // number, equal lengths compare lexicographically.
        let script = Script::new(
            r#"
            local user = ARGV[1]
            local nonce = ARGV[2]
            local record_json = ARGV[3]
            local record_id = ARGV[4]

            local nonce_key = KEYS[1]
            local tx_key = KEYS[2]
            local pending_key = KEYS[3]
            local user_index_key = KEYS[4]
            local sequence_key = KEYS[5]

            local current = redis.call('HGET', nonce_key, user)
            if current then
                local greater
                if #nonce ~= #current then
                    greater = #nonce > #current
                else
                    greater = nonce > current
                end
                if not greater then
                    return 0
                end
            end

            redis.call('HSET', nonce_key, user, nonce)

            if record_json ~= '' then
                local seq = redis.call('INCR', sequence_key)
                redis.call('HSET', tx_key, 'data', record_json, 'status', 'pending')
                redis.call('ZADD', pending_key, seq, record_id)
                redis.call('ZADD', user_index_key, seq, record_id)
            end

            return 1
            "#,
        );

        let (record_json, record_id) = match record {
            Some(record) => {
                let mut record = record.clone();
                record.status = TransactionStatus::Pending;
                (serde_json::to_string(&record)?, record.id)
            }
            None => (String::new(), String::new()),
        };

        let accepted: i32 = script
            .key(self.user_nonce_key())
            .key(self.transaction_key(&record_id))
            .key(self.status_index_key(TransactionStatus::Pending))
            .key(self.user_index_key(user))
            .key(self.transaction_sequence_key())
            .arg(user.to_string())
            .arg(nonce.to_string())
            .arg(record_json)
            .arg(record_id)
            .invoke_async(&mut self.redis.clone())
            .await?;

        Ok(accepted == 1)
    }

    async fn current_nonce(&self, user: Address) -> Result<Option<UserNonce>, RelayStoreError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.hget(self.user_nonce_key(), user.to_string()).await?;
        raw.map(|value| {
            value.parse::<UserNonce>().map_err(|e| RelayStoreError::DeserError {
                message: e.to_string(),
            })
        })
        .transpose()
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>, RelayStoreError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.hget(self.transaction_key(id), "data").await?;
        Ok(raw
            .map(|json| serde_json::from_str::<TransactionRecord>(&json))
            .transpose()?)
    }

    async fn get_transaction_by_hash(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionRecord>, RelayStoreError> {
        let mut conn = self.redis.clone();
        let id: Option<String> = conn.get(self.tx_hash_key(tx_hash)).await?;
        match id {
            Some(id) => self.get_transaction(&id).await,
            None => Ok(None),
        }
    }

    async fn list_user_transactions(
        &self,
        user: Address,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, RelayStoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .zrevrange(self.user_index_key(user), 0, range_stop(limit))
            .await?;
        self.load_transactions(ids).await
    }

    async fn list_transactions_by_status(
        &self,
        status: TransactionStatus,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, RelayStoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .zrange(self.status_index_key(status), 0, range_stop(limit))
            .await?;
        self.load_transactions(ids).await
    }

    async fn transition(
        &self,
        id: &str,
        expected: TransactionStatus,
        transition: &Transition,
        audit: Option<&AuditLogEntry>,
    ) -> Result<bool, RelayStoreError> {
        let Some(mut record) = self.get_transaction(id).await? else {
            return Ok(false);
        };
        if record.status != expected {
            return Ok(false);
        }
        transition.apply(&mut record);

        // The status field is re-checked inside the script; a concurrent
        // writer that got there first makes this a no-op.
        let script = Script::new(
            r#"
            local expected = ARGV[1]
            local next_status = ARGV[2]
            local record_json = ARGV[3]
            local record_id = ARGV[4]
            local has_hash = ARGV[5]
            local audit_json = ARGV[6]

            local tx_key = KEYS[1]
            local from_index_key = KEYS[2]
            local to_index_key = KEYS[3]
            local tx_hash_key = KEYS[4]
            local audit_key = KEYS[5]

            local status = redis.call('HGET', tx_key, 'status')
            if status ~= expected then
                return 0
            end

            redis.call('HSET', tx_key, 'data', record_json, 'status', next_status)

            local score = redis.call('ZSCORE', from_index_key, record_id)
            redis.call('ZREM', from_index_key, record_id)
            redis.call('ZADD', to_index_key, score or 0, record_id)

            if has_hash == '1' then
                redis.call('SET', tx_hash_key, record_id)
            end

            if audit_json ~= '' then
                redis.call('RPUSH', audit_key, audit_json)
            end

            return 1
            "#,
        );

        let audit_json = audit.map(serde_json::to_string).transpose()?.unwrap_or_default();
        let tx_hash_key = self.tx_hash_key(record.tx_hash.unwrap_or_default());
        let has_hash = if record.tx_hash.is_some() { "1" } else { "0" };

        let applied: i32 = script
            .key(self.transaction_key(id))
            .key(self.status_index_key(expected))
            .key(self.status_index_key(record.status))
            .key(tx_hash_key)
            .key(self.audit_log_key(id))
            .arg(expected.as_str())
            .arg(record.status.as_str())
            .arg(serde_json::to_string(&record)?)
            .arg(id)
            .arg(has_hash)
            .arg(audit_json)
            .invoke_async(&mut self.redis.clone())
            .await?;

        Ok(applied == 1)
    }

    async fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<(), RelayStoreError> {
        let mut conn = self.redis.clone();
        let _: () = conn
            .rpush(
                self.audit_log_key(&entry.transaction_id),
                serde_json::to_string(entry)?,
            )
            .await?;
        Ok(())
    }

    async fn list_audit_log(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<AuditLogEntry>, RelayStoreError> {
        let mut conn = self.redis.clone();
        let raw: Vec<String> = conn.lrange(self.audit_log_key(transaction_id), 0, -1).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(RelayStoreError::from))
            .collect()
    }

    async fn find_signer(&self, address: Address) -> Result<Option<SignerRow>, RelayStoreError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(self.signer_key(address)).await?;
        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    async fn upsert_signer(
        &self,
        address: Address,
        name: &str,
        min_balance_wei: U256,
    ) -> Result<SignerRow, RelayStoreError> {
        let script = Script::new(
            r#"
            local row_json = ARGV[1]
            local address = ARGV[2]

            local signer_key = KEYS[1]
            local id_key = KEYS[2]
            local signer_set_key = KEYS[3]

            local existing = redis.call('GET', signer_key)
            if existing then
                local row = cjson.decode(existing)
                if not row.isActive then
                    row.isActive = true
                    existing = cjson.encode(row)
                    redis.call('SET', signer_key, existing)
                end
                return existing
            end

            local row = cjson.decode(row_json)
            row.id = redis.call('INCR', id_key)
            local encoded = cjson.encode(row)
            redis.call('SET', signer_key, encoded)
            redis.call('SADD', signer_set_key, address)
            return encoded
            "#,
        );

        let template = SignerRow {
            id: 0,
            address,
            name: name.to_string(),
            is_active: true,
            min_balance_wei,
            balance_wei: None,
            last_used_at: None,
            last_balance_check: None,
        };

        let stored: String = script
            .key(self.signer_key(address))
            .key(self.signer_id_key())
            .key(self.signer_set_key())
            .arg(serde_json::to_string(&template)?)
            .arg(address.to_string())
            .invoke_async(&mut self.redis.clone())
            .await?;

        Ok(serde_json::from_str(&stored)?)
    }

    async fn record_signer_usage(
        &self,
        address: Address,
        balance_wei: U256,
        used_at: u64,
    ) -> Result<(), RelayStoreError> {
        self.update_signer(address, balance_wei, used_at, Some(used_at))
            .await
    }

    async fn record_signer_balance(
        &self,
        address: Address,
        balance_wei: U256,
        checked_at: u64,
    ) -> Result<(), RelayStoreError> {
        self.update_signer(address, balance_wei, checked_at, None)
            .await
    }
}
