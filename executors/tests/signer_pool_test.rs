mod fixtures;
use fixtures::*;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use alloy::primitives::U256;
use relay_core::error::RelayError;
use relay_executors::reconciler::ReconcilerConfig;
use relay_executors::signer_pool::SignerPool;
use relay_executors::store::{MemoryRelayStore, RelayStore};

#[tokio::test]
async fn initialization_registers_named_rows() {
    let h = harness(&[eth(2), eth(3)]).await;

    let first = h.store.find_signer(relayer_address(0)).await.unwrap().unwrap();
    let second = h.store.find_signer(relayer_address(1)).await.unwrap().unwrap();
    assert_eq!(first.name, "Relayer 1");
    assert_eq!(second.name, "Relayer 2");
    assert!(first.is_active && second.is_active);
    assert_eq!(first.min_balance_wei, eth(1));
    assert_eq!(second.balance_wei, Some(eth(3)));
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn initialization_requires_keys_and_rejects_garbage() {
    let store = Arc::new(MemoryRelayStore::new());
    let chain = Arc::new(MockChainClient::new());

    let err = SignerPool::initialize(
        Arc::clone(&store),
        Arc::clone(&chain),
        &pool_config(&[], Duration::ZERO),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, RelayError::ConfigError { .. }));

    let err = SignerPool::initialize(store, chain, &pool_config(&["0x1234"], Duration::ZERO))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RelayError::ConfigError { .. }));
    assert!(!err.to_string().contains("1234"));
}

#[tokio::test]
async fn duplicate_keys_load_once() {
    let store = Arc::new(MemoryRelayStore::new());
    let chain = Arc::new(MockChainClient::new());
    let pool = SignerPool::initialize(
        store,
        chain,
        &pool_config(&[RELAYER_KEYS[0], RELAYER_KEYS[0]], Duration::ZERO),
    )
    .await
    .unwrap();
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn selection_skips_underfunded_accounts() {
    let h = harness(&[eth(1) - U256::from(1), eth(1)]).await;

    for _ in 0..3 {
        let lease = h.pool.select_signer().await.unwrap().unwrap();
        assert_eq!(lease.address(), relayer_address(1));
    }
}

#[tokio::test]
async fn all_below_minimum_yields_none_immediately() {
    let h = harness_with(
        &[U256::ZERO, eth(1) - U256::from(1)],
        Duration::from_secs(30),
        ReconcilerConfig::default(),
    )
    .await;

    let started = tokio::time::Instant::now();
    assert!(h.pool.select_signer().await.unwrap().is_none());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!h.pool.has_eligible_signer().await.unwrap());
}

#[tokio::test]
async fn leased_account_is_never_handed_out_twice() {
    let h = harness(&[eth(5), eth(5)]).await;

    let first = h.pool.select_signer().await.unwrap().unwrap();
    let second = h.pool.select_signer().await.unwrap().unwrap();
    assert_ne!(first.address(), second.address());

    // Both leased: waits lease_wait, then gives up.
    assert!(h.pool.select_signer().await.unwrap().is_none());

    let accounts = h.pool.all_accounts().await.unwrap();
    assert!(accounts.iter().all(|a| a.leased));
    // The probe ignores leases.
    assert!(h.pool.has_eligible_signer().await.unwrap());

    drop(first);
    let third = h.pool.select_signer().await.unwrap().unwrap();
    assert_ne!(third.address(), second.address());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiting_selection_gets_the_released_lease() {
    let h = harness_with(&[eth(5)], Duration::from_secs(5), ReconcilerConfig::default()).await;

    let held = h.pool.select_signer().await.unwrap().unwrap();
    let pool = Arc::clone(&h.pool);
    let waiter = tokio::spawn(async move { pool.select_signer().await.unwrap().map(|l| l.address()) });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    drop(held);

    let got = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, Some(relayer_address(0)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_holders_are_distinct() {
    let h = harness_with(
        &[eth(5), eth(5)],
        Duration::from_millis(10),
        ReconcilerConfig::default(),
    )
    .await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&h.pool);
            tokio::spawn(async move { pool.select_signer().await.unwrap() })
        })
        .collect();

    let mut held = Vec::new();
    for task in tasks {
        if let Some(lease) = task.await.unwrap() {
            held.push(lease);
        }
    }

    let addresses: HashSet<_> = held.iter().map(|l| l.address()).collect();
    assert_eq!(addresses.len(), held.len());
    assert!(held.len() <= 2);
}

#[tokio::test]
async fn balance_outage_is_an_error_not_none() {
    let h = harness(&[eth(5)]).await;
    h.chain.set_balances_down(true);

    let err = h.pool.select_signer().await.unwrap_err();
    assert!(err.is_infrastructure());
    h.chain.set_balances_down(false);
    assert!(h.pool.select_signer().await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hung_balance_read_only_blocks_its_own_account() {
    let h = harness_with(&[eth(5), eth(5)], Duration::from_secs(5), ReconcilerConfig::default()).await;
    h.chain.hang_balance(relayer_address(0));

    let calls_before = h.chain.balance_calls.load(Ordering::SeqCst);
    let pool = Arc::clone(&h.pool);
    let stuck = tokio::spawn(async move { pool.select_signer().await });
    h.chain.wait_for_balance_calls(calls_before + 1).await;

    let lease = tokio::time::timeout(Duration::from_secs(2), h.pool.select_signer())
        .await
        .expect("selection blocked behind another account's balance read")
        .unwrap()
        .unwrap();
    assert_eq!(lease.address(), relayer_address(1));
    assert!(!stuck.is_finished());
    stuck.abort();
}
