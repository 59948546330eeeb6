mod fixtures;
use fixtures::*;

use std::sync::Arc;

use alloy::primitives::{Address, address};
use redis::aio::ConnectionManager;
use relay_core::request::UserNonce;
use relay_executors::store::{
    AuditLevel, AuditLogEntry, RedisRelayStore, RelayStore, RelayStoreError, Transition,
    TransactionRecord, TransactionStatus, now_millis,
};

const USER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
const TARGET: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");

async fn store(namespace: &str) -> (ConnectionManager, RedisRelayStore) {
    setup_tracing();
    let client = redis::Client::open(REDIS_URL).unwrap();
    let conn = ConnectionManager::new(client).await.unwrap();
    cleanup_redis_keys(&conn, namespace).await;
    let store = RedisRelayStore::new(conn.clone(), Some(namespace.to_string()));
    (conn, store)
}

fn record(nonce: u64) -> TransactionRecord {
    TransactionRecord::pending(
        USER,
        TARGET,
        "register(string,uint256)".to_string(),
        r#"["alice","100"]"#.to_string(),
        "0x".to_string(),
        UserNonce::from(nonce),
    )
}

#[tokio::test]
#[ignore = "requires a local Redis"]
async fn nonce_advance_inserts_record_only_on_acceptance() {
    let namespace = "test_relay_nonce";
    let (conn, store) = store(namespace).await;

    let accepted = record(10);
    assert!(store.check_and_advance_nonce(USER, accepted.nonce, Some(&accepted)).await.unwrap());

    let stale = record(9);
    assert!(!store.check_and_advance_nonce(USER, stale.nonce, Some(&stale)).await.unwrap());
    assert!(store.get_transaction(&stale.id).await.unwrap().is_none());

    // Decimal comparison, not lexicographic: 100 > 10.
    assert!(store.check_and_advance_nonce(USER, UserNonce::from(100), None).await.unwrap());
    assert_eq!(store.current_nonce(USER).await.unwrap(), Some(UserNonce::from(100)));

    let pending = store
        .list_transactions_by_status(TransactionStatus::Pending, 10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, accepted.id);

    cleanup_redis_keys(&conn, namespace).await;
}

#[tokio::test]
#[ignore = "requires a local Redis"]
async fn concurrent_nonce_claims_have_one_winner() {
    let namespace = "test_relay_nonce_race";
    let (conn, store) = store(namespace).await;
    let store = Arc::new(store);

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .check_and_advance_nonce(USER, UserNonce::from(1), None)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    cleanup_redis_keys(&conn, namespace).await;
}

#[tokio::test]
#[ignore = "requires a local Redis"]
async fn transitions_are_compare_and_set() {
    let namespace = "test_relay_transition";
    let (conn, store) = store(namespace).await;

    let rec = record(1);
    store.check_and_advance_nonce(USER, rec.nonce, Some(&rec)).await.unwrap();

    let hash = tx_hash(&[0x01]);
    let submitted = Transition::Submitted {
        tx_hash: hash,
        signer_address: relayer_address(0),
        submitted_at: now_millis(),
    };
    let audit = AuditLogEntry::new(&rec.id, AuditLevel::Info, format!("Transaction submitted: {hash}"));
    assert!(
        store
            .transition(&rec.id, TransactionStatus::Pending, &submitted, Some(&audit))
            .await
            .unwrap()
    );
    // Second writer loses.
    assert!(
        !store
            .transition(&rec.id, TransactionStatus::Pending, &submitted, None)
            .await
            .unwrap()
    );

    let by_hash = store.get_transaction_by_hash(hash).await.unwrap().unwrap();
    assert_eq!(by_hash.id, rec.id);
    assert_eq!(by_hash.status, TransactionStatus::Submitted);
    assert!(
        store
            .list_transactions_by_status(TransactionStatus::Pending, 10)
            .await
            .unwrap()
            .is_empty()
    );

    let finalized = Transition::Finalized {
        success: true,
        block_number: Some(12),
        gas_used: 21_000,
        confirmed_at: now_millis(),
    };
    assert!(
        store
            .transition(&rec.id, TransactionStatus::Submitted, &finalized, None)
            .await
            .unwrap()
    );
    let stored = store.get_transaction(&rec.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Confirmed);
    assert_eq!(stored.block_number, Some(12));

    let log = store.list_audit_log(&rec.id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message, format!("Transaction submitted: {hash}"));

    let listed = store.list_user_transactions(USER, 50).await.unwrap();
    assert_eq!(listed.len(), 1);

    cleanup_redis_keys(&conn, namespace).await;
}

#[tokio::test]
#[ignore = "requires a local Redis"]
async fn signer_upsert_assigns_ids_once() {
    let namespace = "test_relay_signers";
    let (conn, store) = store(namespace).await;

    let first = store
        .upsert_signer(relayer_address(0), "Relayer 1", eth(1))
        .await
        .unwrap();
    let again = store
        .upsert_signer(relayer_address(0), "Relayer 1", eth(1))
        .await
        .unwrap();
    let second = store
        .upsert_signer(relayer_address(1), "Relayer 2", eth(1))
        .await
        .unwrap();

    assert_eq!(first.id, again.id);
    assert_ne!(first.id, second.id);
    assert_eq!(first.min_balance_wei, eth(1));

    store
        .record_signer_usage(relayer_address(0), eth(3), 1_000)
        .await
        .unwrap();
    let row = store.find_signer(relayer_address(0)).await.unwrap().unwrap();
    assert_eq!(row.balance_wei, Some(eth(3)));
    assert_eq!(row.last_used_at, Some(1_000));

    cleanup_redis_keys(&conn, namespace).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a local Redis"]
async fn balance_refreshes_never_drop_a_usage_mark() {
    let namespace = "test_relay_signer_usage";
    let (conn, store) = store(namespace).await;
    let store = Arc::new(store);
    store
        .upsert_signer(relayer_address(0), "Relayer 1", eth(1))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for checked_at in 0..20u64 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store
                .record_signer_balance(relayer_address(0), eth(2), 2_000 + checked_at)
                .await
        }));
    }
    let usage = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            store
                .record_signer_usage(relayer_address(0), eth(2), 1_500)
                .await
        })
    };
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    usage.await.unwrap().unwrap();

    let row = store.find_signer(relayer_address(0)).await.unwrap().unwrap();
    assert_eq!(row.last_used_at, Some(1_500));
    assert_eq!(row.balance_wei, Some(eth(2)));

    let missing = store
        .record_signer_balance(relayer_address(1), eth(1), 1)
        .await
        .unwrap_err();
    assert!(matches!(missing, RelayStoreError::SignerNotFound { .. }));

    cleanup_redis_keys(&conn, namespace).await;
}
