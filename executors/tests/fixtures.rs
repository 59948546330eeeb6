#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, B256, U256};
use alloy::signers::{SignerSync, local::PrivateKeySigner};
use relay_core::chain::{CallReceipt, ChainClient};
use relay_core::contract::{ContractCallEncoder, PreparedCall};
use relay_core::error::{ChainCallError, RelayError, RpcErrorKind};
use relay_core::request::{RelayRequest, UserNonce};
use relay_core::signature::canonical_message;
use relay_executors::dispatcher::RelayDispatcher;
use relay_executors::reconciler::{ReconcilerConfig, StatusReconciler};
use relay_executors::signer_pool::{SignerPool, SignerPoolConfig};
use relay_executors::store::MemoryRelayStore;
use serde_json::Value as JsonValue;
use redis::aio::ConnectionManager;
use tokio::sync::{RwLock, RwLockWriteGuard};

// Redis connection URL for tests
pub const REDIS_URL: &str = "redis://127.0.0.1:6379/";

// Anvil dev accounts
pub const USER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const RELAYER_KEYS: [&str; 2] = [
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
];

pub const OTHER_USER_KEY: &str =
    "0x7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6";

pub const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const FUNCTION: &str = "register(string,uint256)";

// Helper to clean up Redis keys for a test namespace
pub async fn cleanup_redis_keys(conn_manager: &ConnectionManager, namespace: &str) {
    let mut conn = conn_manager.clone();
    let keys_pattern = format!("{namespace}:relay:*");

    let keys: Vec<String> = redis::cmd("KEYS")
        .arg(&keys_pattern)
        .query_async(&mut conn)
        .await
        .unwrap_or_default();
    if !keys.is_empty() {
        redis::cmd("DEL")
            .arg(keys)
            .query_async::<()>(&mut conn)
            .await
            .unwrap_or_default();
    }
    tracing::info!("Cleaned up keys for pattern: {}", keys_pattern);
}

// Setup tracing for tests
pub fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_executors=debug,relay_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub fn eth(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(18u64))
}

pub fn address_of(key: &str) -> Address {
    key.parse::<PrivateKeySigner>().unwrap().address()
}

pub fn user_address() -> Address {
    address_of(USER_KEY)
}

pub fn relayer_address(index: usize) -> Address {
    address_of(RELAYER_KEYS[index])
}

/// A correctly signed request from `key`.
pub fn signed_request(key: &str, nonce: u64, args: Vec<JsonValue>) -> RelayRequest {
    signed_call(key, FUNCTION, nonce, args)
}

pub fn signed_call(key: &str, function_name: &str, nonce: u64, args: Vec<JsonValue>) -> RelayRequest {
    let signer: PrivateKeySigner = key.parse().unwrap();
    let user = signer.address().to_string();
    let nonce = UserNonce::from(nonce);
    let message = canonical_message(&user, CONTRACT, function_name, &args, nonce).unwrap();
    let signature = signer.sign_message_sync(message.as_bytes()).unwrap();

    RelayRequest {
        user_address: user,
        contract_address: CONTRACT.to_string(),
        function_name: function_name.to_string(),
        args,
        signature: alloy::hex::encode_prefixed(signature.as_bytes()),
        nonce,
    }
}

pub fn default_args() -> Vec<JsonValue> {
    vec![serde_json::json!("alice"), serde_json::json!("100")]
}

/// ABI of the relayed contract: a no-argument `f` and `register`.
pub fn target_abi() -> JsonAbi {
    serde_json::from_value(serde_json::json!([
        {
            "type": "function",
            "name": "f",
            "inputs": [],
            "outputs": [],
            "stateMutability": "nonpayable"
        },
        {
            "type": "function",
            "name": "register",
            "inputs": [
                { "name": "name", "type": "string", "internalType": "string" },
                { "name": "duration", "type": "uint256", "internalType": "uint256" }
            ],
            "outputs": [],
            "stateMutability": "nonpayable"
        }
    ]))
    .unwrap()
}

pub fn tx_hash(suffix: &[u8]) -> B256 {
    B256::left_padding_from(suffix)
}

pub fn rpc_down() -> RelayError {
    RelayError::RpcError {
        rpc_url: "http://127.0.0.1:8545/".to_string(),
        message: "connection refused".to_string(),
        kind: RpcErrorKind::OtherTransportError {
            message: "connection refused".to_string(),
        },
    }
}

/// Scriptable in-process chain.
#[derive(Default)]
pub struct MockChainClient {
    balances: Mutex<HashMap<Address, U256>>,
    estimate_results: Mutex<VecDeque<Result<u64, ChainCallError>>>,
    submit_results: Mutex<VecDeque<Result<B256, ChainCallError>>>,
    receipts: Mutex<HashMap<B256, CallReceipt>>,
    balances_down: AtomicBool,
    hung_balances: Mutex<HashSet<Address>>,
    submit_gate: RwLock<()>,
    pub balance_calls: AtomicUsize,
    pub estimate_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub receipt_calls: AtomicUsize,
    pub submitted_by: Mutex<Vec<Address>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.balances.lock().unwrap().insert(address, balance);
    }

    pub fn push_estimate(&self, result: Result<u64, ChainCallError>) {
        self.estimate_results.lock().unwrap().push_back(result);
    }

    pub fn push_submit(&self, result: Result<B256, ChainCallError>) {
        self.submit_results.lock().unwrap().push_back(result);
    }

    pub fn set_receipt(&self, tx_hash: B256, receipt: CallReceipt) {
        self.receipts.lock().unwrap().insert(tx_hash, receipt);
    }

    pub fn set_balances_down(&self, down: bool) {
        self.balances_down.store(down, Ordering::SeqCst);
    }

    /// Balance reads for `address` never return.
    pub fn hang_balance(&self, address: Address) {
        self.hung_balances.lock().unwrap().insert(address);
    }

    pub async fn wait_for_balance_calls(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.balance_calls.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("balance read never started");
    }

    /// Submissions block until the returned guard is dropped.
    pub async fn hold_submissions(&self) -> RwLockWriteGuard<'_, ()> {
        self.submit_gate.write().await
    }

    pub async fn wait_for_submit_calls(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.submit_calls.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("submission never started");
    }
}

impl ChainClient for MockChainClient {
    fn rpc_url(&self) -> &str {
        "http://127.0.0.1:8545/"
    }

    async fn get_balance(&self, address: Address) -> Result<U256, RelayError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.balances_down.load(Ordering::SeqCst) {
            return Err(rpc_down());
        }
        let hung = self.hung_balances.lock().unwrap().contains(&address);
        if hung {
            std::future::pending::<()>().await;
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn estimate_call(&self, _call: &PreparedCall, _from: Address) -> Result<u64, ChainCallError> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        self.estimate_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(50_000))
    }

    async fn submit_call(
        &self,
        _call: &PreparedCall,
        signer: &PrivateKeySigner,
    ) -> Result<B256, ChainCallError> {
        let call_number = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _gate = self.submit_gate.read().await;
        self.submitted_by.lock().unwrap().push(signer.address());
        let scripted = self.submit_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(tx_hash(&(call_number as u64).to_be_bytes())))
    }

    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<CallReceipt>, RelayError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.receipts.lock().unwrap().get(&tx_hash).copied())
    }
}

pub type TestPool = SignerPool<MemoryRelayStore, MockChainClient>;
pub type TestDispatcher = RelayDispatcher<MemoryRelayStore, MockChainClient>;
pub type TestReconciler = StatusReconciler<MemoryRelayStore, MockChainClient>;

pub struct Harness {
    pub store: Arc<MemoryRelayStore>,
    pub chain: Arc<MockChainClient>,
    pub pool: Arc<TestPool>,
    pub dispatcher: TestDispatcher,
    pub reconciler: TestReconciler,
}

pub fn pool_config(keys: &[&str], lease_wait: Duration) -> SignerPoolConfig {
    SignerPoolConfig {
        private_keys: keys.iter().map(|k| k.to_string()).collect(),
        default_min_balance: eth(1),
        lease_wait,
    }
}

/// Memory store, mock chain, and one relayer per entry of `relayer_balances`.
pub async fn harness(relayer_balances: &[U256]) -> Harness {
    harness_with(relayer_balances, Duration::from_millis(50), ReconcilerConfig::default()).await
}

pub async fn harness_with(
    relayer_balances: &[U256],
    lease_wait: Duration,
    reconciler_config: ReconcilerConfig,
) -> Harness {
    setup_tracing();

    let store = Arc::new(MemoryRelayStore::new());
    let chain = Arc::new(MockChainClient::new());
    for (index, balance) in relayer_balances.iter().enumerate() {
        chain.set_balance(relayer_address(index), *balance);
    }

    let keys = &RELAYER_KEYS[..relayer_balances.len()];
    let pool = Arc::new(
        SignerPool::initialize(
            Arc::clone(&store),
            Arc::clone(&chain),
            &pool_config(keys, lease_wait),
        )
        .await
        .unwrap(),
    );

    let dispatcher = RelayDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        Arc::clone(&pool),
        ContractCallEncoder::new(Some(target_abi())),
    );
    let reconciler =
        StatusReconciler::new(Arc::clone(&store), Arc::clone(&chain), reconciler_config);

    Harness {
        store,
        chain,
        pool,
        dispatcher,
        reconciler,
    }
}
