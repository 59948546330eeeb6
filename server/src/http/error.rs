use axum::{Json, http::StatusCode, response::IntoResponse};
use relay_core::error::{RelayError, RpcErrorKind};
use serde_json::json;

/// HTTP response conversion for [`RelayError`]
pub struct ApiRelayError(pub RelayError);

impl From<RelayError> for ApiRelayError {
    fn from(error: RelayError) -> Self {
        ApiRelayError(error)
    }
}

impl IntoResponse for ApiRelayError {
    fn into_response(self) -> axum::response::Response {
        let code = self.status_code();

        self.with_status(code)
    }
}

impl ApiRelayError {
    fn with_status(self, status: StatusCode) -> axum::response::Response {
        (
            status,
            Json(json!({
                "error": self.0.to_string(),
                "details": self.0
            })),
        )
            .into_response()
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            RelayError::RpcError { kind, .. } => match kind {
                RpcErrorKind::NullResp | RpcErrorKind::ErrorResp(_) => StatusCode::BAD_GATEWAY,
                RpcErrorKind::UnsupportedFeature { .. } => StatusCode::NOT_IMPLEMENTED,
                RpcErrorKind::TransportHttpError { status, .. } => {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
                }
                _ => StatusCode::SERVICE_UNAVAILABLE,
            },
            RelayError::TransactionNotFound { .. } => StatusCode::NOT_FOUND,
            RelayError::ValidationError { .. } | RelayError::EncodingError { .. } => {
                StatusCode::BAD_REQUEST
            }
            RelayError::StoreError { .. }
            | RelayError::ConfigError { .. }
            | RelayError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub trait RelayResult<T> {
    fn api_error(self) -> Result<T, ApiRelayError>;
}

impl<T, E: Into<RelayError>> RelayResult<T> for Result<T, E> {
    fn api_error(self) -> Result<T, ApiRelayError> {
        self.map_err(|e| ApiRelayError(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let not_found = ApiRelayError(RelayError::TransactionNotFound {
            tx_hash: "0x01".into(),
        });
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let invalid = ApiRelayError(RelayError::ValidationError {
            message: "bad".into(),
        });
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let store = ApiRelayError(RelayError::StoreError {
            message: "down".into(),
        });
        assert_eq!(store.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let rpc = ApiRelayError(RelayError::RpcError {
            rpc_url: "http://localhost:8545".into(),
            message: "refused".into(),
            kind: RpcErrorKind::OtherTransportError {
                message: "refused".into(),
            },
        });
        assert_eq!(rpc.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
