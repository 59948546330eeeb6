use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use relay_core::chain::ChainClient;
use relay_executors::{
    dispatcher::RelayDispatcher, reconciler::StatusReconciler, signer_pool::SignerPool,
    store::RelayStore,
};
use tokio::{sync::watch, task::JoinHandle};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::routes;

pub struct RelayServerState<S, C> {
    pub dispatcher: Arc<RelayDispatcher<S, C>>,
    pub reconciler: Arc<StatusReconciler<S, C>>,
    pub signers: Arc<SignerPool<S, C>>,
    pub store: Arc<S>,
}

// Manual impl: `S` and `C` themselves need not be `Clone`.
impl<S, C> Clone for RelayServerState<S, C> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            reconciler: Arc::clone(&self.reconciler),
            signers: Arc::clone(&self.signers),
            store: Arc::clone(&self.store),
        }
    }
}

pub fn router<S, C>(state: RelayServerState<S, C>) -> Router
where
    S: RelayStore + 'static,
    C: ChainClient + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/health", get(routes::health::health::<S, C>))
        .route("/api/signers", get(routes::signers::list_signers::<S, C>))
        .route("/api/submit", post(routes::submit::submit_transaction::<S, C>))
        .route(
            "/api/transaction/{tx_hash}",
            get(routes::transaction::get_transaction::<S, C>),
        )
        .route(
            "/api/user/{address}/transactions",
            get(routes::transaction::list_user_transactions::<S, C>),
        )
        .route("/api/openapi.json", get(routes::openapi::openapi_json))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct RelayServer {
    handle: Option<JoinHandle<Result<(), std::io::Error>>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    app: Router,
}

impl RelayServer {
    pub fn new<S, C>(state: RelayServerState<S, C>) -> Self
    where
        S: RelayStore + 'static,
        C: ChainClient + 'static,
    {
        Self {
            handle: None,
            shutdown_tx: None,
            app: router(state),
        }
    }

    pub fn start(&mut self, listener: tokio::net::TcpListener) -> Result<(), std::io::Error> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = self.app.clone();
        let local_addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            tracing::info!("HTTP server starting on {}", local_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let mut rx = shutdown_rx;
                    while !*rx.borrow() {
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                    tracing::info!("HTTP server shutting down");
                })
                .await
        });

        self.handle = Some(handle);
        self.shutdown_tx = Some(shutdown_tx);

        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), std::io::Error> {
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(true).is_err() {
                tracing::error!("Failed to send shutdown signal to HTTP server");
            }
        }

        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(result) => {
                    if let Err(e) = result {
                        tracing::error!("HTTP server error during shutdown: {}", e);
                        return Err(e);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to join HTTP server task: {}", e);
                    return Err(std::io::Error::other(format!("Task join error: {e}")));
                }
            }
        }

        Ok(())
    }
}
