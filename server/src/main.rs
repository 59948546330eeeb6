use std::sync::Arc;

use anyhow::anyhow;
use relay_core::{chain::AlloyChainClient, contract::ContractCallEncoder};
use relay_executors::{
    dispatcher::RelayDispatcher,
    reconciler::StatusReconciler,
    signer_pool::SignerPool,
    store::{MemoryRelayStore, RedisRelayStore, RelayStoreBackend},
};
use relay_server::{
    config::{self, StoreBackendKind},
    http::server::{RelayServer, RelayServerState},
};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::get_config()?;

    let subscriber = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to debug for our crates if RUST_LOG is not set
            "relay_server=debug,relay_executors=debug,relay_core=debug,tower_http=debug".into()
        }),
    );

    match config.server.log_format {
        config::LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        config::LogFormat::Pretty => subscriber.with(tracing_subscriber::fmt::layer()).init(),
    }

    let store = Arc::new(match config.store.backend {
        StoreBackendKind::Redis => RelayStoreBackend::Redis(
            RedisRelayStore::connect(&config.redis.url, config.store.namespace.clone()).await?,
        ),
        StoreBackendKind::Memory => {
            tracing::warn!("Using the in-memory store; state is lost on restart");
            RelayStoreBackend::Memory(MemoryRelayStore::new())
        }
    });
    tracing::info!(backend = ?config.store.backend, "Relay store initialized");

    let chain = Arc::new(AlloyChainClient::connect(&config.chain.rpc_url).await?);
    tracing::info!(chain_id = chain.chain_id(), "Chain client initialized");

    let encoder = match config.relayer.abi_path() {
        Some(path) => {
            let encoder = ContractCallEncoder::from_abi_file(path)?;
            tracing::info!(abi_path = %path, "Contract ABI loaded");
            encoder
        }
        None => {
            tracing::warn!("No contract ABI configured; only full function signatures can be relayed");
            ContractCallEncoder::default()
        }
    };

    let pool_config = config
        .relayer
        .signer_pool_config(|name| std::env::var(name).ok())
        .map_err(|e| anyhow!(e))?;
    let signers = Arc::new(
        SignerPool::initialize(Arc::clone(&store), Arc::clone(&chain), &pool_config).await?,
    );
    tracing::info!(signers = signers.len(), "Signer pool initialized");

    let dispatcher = Arc::new(RelayDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        Arc::clone(&signers),
        encoder,
    ));
    let reconciler = Arc::new(StatusReconciler::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        config.reconciler.reconciler_config(),
    ));

    let sweeper = config.reconciler.enabled.then(|| {
        tracing::info!(
            interval_secs = config.reconciler.interval().as_secs(),
            "Starting reconciliation sweep"
        );
        Arc::clone(&reconciler).spawn(config.reconciler.interval())
    });

    let mut server = RelayServer::new(RelayServerState {
        dispatcher,
        reconciler,
        signers,
        store,
    });

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    server.start(listener)?;

    tracing::info!("Relay started, waiting for shutdown signal");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
    }
    tracing::info!("Shutdown signal received");

    if let Err(e) = server.shutdown().await {
        tracing::error!("Error during HTTP server shutdown: {}", e);
    } else {
        tracing::info!("HTTP server shut down successfully");
    }

    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.shutdown().await {
            tracing::error!("Error during reconciler shutdown: {}", e);
        }
    }

    Ok(())
}
