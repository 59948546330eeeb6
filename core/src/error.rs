use alloy::{
    primitives::Bytes,
    transports::{RpcError as AlloyRpcError, TransportErrorKind},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// Server returned an error response.
    #[error("server returned an error response: {0}")]
    ErrorResp(RpcErrorResponse),

    /// Server returned a null response when a non-null response was expected.
    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    /// Rpc server returned an unsupported feature.
    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    /// Returned when a local pre-processing step fails, e.g. transaction
    /// building or signing.
    #[error("local usage error: {message}")]
    InternalError { message: String },

    /// JSON serialization error.
    #[error("serialization error: {message}")]
    SerError { message: String },

    /// JSON deserialization error.
    #[error("deserialization error: {message}, text: {text}")]
    DeserError { message: String, text: String },

    #[error("HTTP error {status}")]
    TransportHttpError { status: u16, body: String },

    #[error("Other transport error: {message}")]
    OtherTransportError { message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, utoipa::ToSchema)]
pub struct RpcErrorResponse {
    /// The error code.
    pub code: i64,
    /// The error message (if any).
    pub message: String,
    /// The error data (if any).
    pub data: Option<String>,
}

impl std::fmt::Display for RpcErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, ", data: {data}")?;
        }
        Ok(())
    }
}

/// Service-level failures of the relay.
///
/// These never describe the outcome of a relayed transaction; a rejected or
/// failed relay is reported through the dispatcher's outcome type instead.
#[derive(Error, Debug, Serialize, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum RelayError {
    #[schema(title = "EVM RPC Error")]
    #[error("RPC error at {rpc_url}: {message}")]
    RpcError {
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[schema(title = "Store Error")]
    #[error("Store error: {message}")]
    StoreError { message: String },

    #[schema(title = "Contract Encoding Error")]
    #[error("Contract encoding error: {message}")]
    #[serde(rename_all = "camelCase")]
    EncodingError {
        function_name: String,
        message: String,
    },

    #[schema(title = "Transaction Not Found")]
    #[error("Transaction not found: {tx_hash}")]
    #[serde(rename_all = "camelCase")]
    TransactionNotFound { tx_hash: String },

    #[schema(title = "Validation Error")]
    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[schema(title = "Configuration Error")]
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[schema(title = "Relay Internal Error")]
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Failure of a single chain call made on behalf of a relayed transaction.
///
/// `Rejected` means the node answered and refused the call, which is a
/// transaction-level outcome. `Unavailable` means the node could not be
/// reached or answered garbage, which is an infrastructure failure.
#[derive(Error, Debug, Clone)]
pub enum ChainCallError {
    #[error("{message}")]
    Rejected {
        code: i64,
        message: String,
        data: Option<Bytes>,
    },

    #[error(transparent)]
    Unavailable(RelayError),
}

impl ChainCallError {
    pub fn from_rpc_error(err: &AlloyRpcError<TransportErrorKind>, rpc_url: &str) -> Self {
        match err {
            AlloyRpcError::ErrorResp(payload) => ChainCallError::Rejected {
                code: payload.code,
                message: payload.message.to_string(),
                data: payload.as_revert_data(),
            },
            _ => ChainCallError::Unavailable(err.to_relay_error(rpc_url)),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ChainCallError::Rejected { message, .. } => message.clone(),
            ChainCallError::Unavailable(inner) => inner.to_string(),
        }
    }
}

fn to_rpc_error_kind(err: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match err {
        AlloyRpcError::ErrorResp(err) => RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: err.code,
            message: err.message.to_string(),
            data: err.data.as_ref().map(|data| data.to_string()),
        }),
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            message: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(err) => RpcErrorKind::InternalError {
            message: err.to_string(),
        },
        AlloyRpcError::SerError(err) => RpcErrorKind::SerError {
            message: err.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.to_string(),
        },
        AlloyRpcError::Transport(err) => match err {
            TransportErrorKind::HttpError(err) => RpcErrorKind::TransportHttpError {
                status: err.status,
                body: err.body.to_string(),
            },
            _ => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
        },
    }
}

pub trait AlloyRpcErrorToRelayError {
    fn to_relay_error(&self, rpc_url: &str) -> RelayError;
}

impl AlloyRpcErrorToRelayError for AlloyRpcError<TransportErrorKind> {
    fn to_relay_error(&self, rpc_url: &str) -> RelayError {
        RelayError::RpcError {
            rpc_url: rpc_url.to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        RelayError::InternalError {
            message: format!("JSON error: {error}"),
        }
    }
}

impl RelayError {
    pub fn encoding_error(function_name: &str, message: impl Into<String>) -> Self {
        RelayError::EncodingError {
            function_name: function_name.to_string(),
            message: message.into(),
        }
    }

    /// True when the error comes from an unreachable or misbehaving
    /// dependency rather than from the request itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            RelayError::RpcError { .. } | RelayError::StoreError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_response_display_includes_data() {
        let response = RpcErrorResponse {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some("0x8baa579f".to_string()),
        };
        assert_eq!(
            response.to_string(),
            "code 3: execution reverted, data: 0x8baa579f"
        );
    }

    #[test]
    fn relay_error_serializes_with_type_tag() {
        let err = RelayError::TransactionNotFound {
            tx_hash: "0xabc".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "TRANSACTION_NOT_FOUND");
        assert_eq!(json["txHash"], "0xabc");
    }

    #[test]
    fn store_and_rpc_errors_are_infrastructure() {
        assert!(
            RelayError::StoreError {
                message: "down".into()
            }
            .is_infrastructure()
        );
        assert!(
            !RelayError::ValidationError {
                message: "bad".into()
            }
            .is_infrastructure()
        );
    }
}
