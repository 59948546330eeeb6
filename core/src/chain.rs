use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::{RpcError, TransportErrorKind, http::reqwest::Url},
};

use crate::{
    contract::PreparedCall,
    error::{AlloyRpcErrorToRelayError, ChainCallError, RelayError},
};

/// Receipt fields the relay cares about once a transaction is mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallReceipt {
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// The slice of an EVM node the relay talks to.
pub trait ChainClient: Send + Sync {
    fn rpc_url(&self) -> &str;

    fn get_balance(&self, address: Address) -> impl Future<Output = Result<U256, RelayError>> + Send;

    /// Dry-runs the call from `from` and returns the estimated gas.
    fn estimate_call(
        &self,
        call: &PreparedCall,
        from: Address,
    ) -> impl Future<Output = Result<u64, ChainCallError>> + Send;

    /// Signs the call with `signer` and broadcasts it, returning the hash.
    fn submit_call(
        &self,
        call: &PreparedCall,
        signer: &PrivateKeySigner,
    ) -> impl Future<Output = Result<B256, ChainCallError>> + Send;

    /// `None` while the transaction is not mined.
    fn get_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<CallReceipt>, RelayError>> + Send;
}

#[derive(Clone, Debug)]
pub struct AlloyChainClient {
    provider: RootProvider,
    rpc_url: Url,
    chain_id: u64,
}

impl AlloyChainClient {
    /// Connects over HTTP and reads the chain id from the node.
    pub async fn connect(rpc_url: &str) -> Result<Self, RelayError> {
        let url = Url::parse(rpc_url).map_err(|e| RelayError::ConfigError {
            message: format!("Failed to parse RPC URL {rpc_url}: {e}"),
        })?;

        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(url.clone());

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| e.to_relay_error(rpc_url))?;

        tracing::info!(rpc_url = %url, chain_id, "Connected to chain");

        Ok(Self {
            provider,
            rpc_url: url,
            chain_id,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn call_request(&self, call: &PreparedCall, from: Address) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(from)
            .with_to(call.target)
            .with_input(call.call_data.clone())
            .with_chain_id(self.chain_id)
    }

    async fn with_fees(&self, tx: TransactionRequest) -> Result<TransactionRequest, ChainCallError> {
        match self.provider.estimate_eip1559_fees().await {
            Ok(fees) => {
                tracing::debug!(
                    max_fee = %fees.max_fee_per_gas,
                    max_priority_fee = %fees.max_priority_fee_per_gas,
                    "Using EIP-1559 fees"
                );
                Ok(tx
                    .with_max_fee_per_gas(fees.max_fee_per_gas)
                    .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas))
            }
            Err(e) if is_unsupported_eip1559_error(&e) => {
                tracing::debug!("EIP-1559 not supported, falling back to legacy gas price");
                let gas_price = self
                    .provider
                    .get_gas_price()
                    .await
                    .map_err(|e| ChainCallError::Unavailable(e.to_relay_error(self.rpc_url())))?;
                Ok(tx.with_gas_price(gas_price))
            }
            Err(e) => Err(ChainCallError::Unavailable(e.to_relay_error(self.rpc_url()))),
        }
    }
}

impl ChainClient for AlloyChainClient {
    fn rpc_url(&self) -> &str {
        self.rpc_url.as_str()
    }

    async fn get_balance(&self, address: Address) -> Result<U256, RelayError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| e.to_relay_error(self.rpc_url()))
    }

    async fn estimate_call(&self, call: &PreparedCall, from: Address) -> Result<u64, ChainCallError> {
        self.provider
            .estimate_gas(self.call_request(call, from))
            .await
            .map_err(|e| ChainCallError::from_rpc_error(&e, self.rpc_url()))
    }

    async fn submit_call(
        &self,
        call: &PreparedCall,
        signer: &PrivateKeySigner,
    ) -> Result<B256, ChainCallError> {
        let from = signer.address();
        let nonce = self
            .provider
            .get_transaction_count(from)
            .pending()
            .await
            .map_err(|e| ChainCallError::Unavailable(e.to_relay_error(self.rpc_url())))?;

        let mut tx_request = self.call_request(call, from).with_nonce(nonce);
        tx_request = self.with_fees(tx_request).await?;

        let gas_limit = self
            .provider
            .estimate_gas(tx_request.clone())
            .await
            .map_err(|e| ChainCallError::from_rpc_error(&e, self.rpc_url()))?;
        tx_request = tx_request.with_gas_limit(gas_limit * 110 / 100); // 10% buffer

        let wallet = EthereumWallet::from(signer.clone());
        let envelope = tx_request.build(&wallet).await.map_err(|e| {
            ChainCallError::Unavailable(RelayError::InternalError {
                message: format!("Failed to build and sign transaction: {e}"),
            })
        })?;

        let pending = self
            .provider
            .send_tx_envelope(envelope)
            .await
            .map_err(|e| ChainCallError::from_rpc_error(&e, self.rpc_url()))?;

        let tx_hash = *pending.tx_hash();
        tracing::debug!(signer = %from, nonce, tx_hash = %tx_hash, "Broadcast relayed transaction");
        Ok(tx_hash)
    }

    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<CallReceipt>, RelayError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| e.to_relay_error(self.rpc_url()))?;

        Ok(receipt.map(|receipt| CallReceipt {
            success: receipt.status(),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
        }))
    }
}

fn is_unsupported_eip1559_error(error: &RpcError<TransportErrorKind>) -> bool {
    if let RpcError::UnsupportedFeature(_) = error {
        return true;
    }

    if let RpcError::ErrorResp(resp) = error {
        let message = resp.message.to_lowercase();
        return message.contains("method not found");
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unparseable_rpc_url() {
        let err = AlloyChainClient::connect("not a url").await.unwrap_err();
        assert!(matches!(err, RelayError::ConfigError { .. }));
    }

    #[test]
    fn unsupported_feature_triggers_legacy_fallback() {
        let err: RpcError<TransportErrorKind> = RpcError::UnsupportedFeature("eth_feeHistory");
        assert!(is_unsupported_eip1559_error(&err));
        assert!(!is_unsupported_eip1559_error(&RpcError::NullResp));
    }
}
