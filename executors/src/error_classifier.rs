use alloy::{
    hex,
    primitives::Bytes,
    sol_types::{Panic, Revert, SolError},
};
use relay_core::error::ChainCallError;
use serde::{Deserialize, Serialize};

/// Stable categories for chain rejections of a relayed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChainErrorKind {
    /// `InvalidSignature()` from the target contract
    InvalidSignature,
    /// `InsufficientBalance()` from the target contract
    InsufficientBalance,
    /// `InvalidAsyncNonce()` from the target contract
    NonceAlreadyUsed,
    /// `SenderIsNotTheExecutor()` from the target contract
    WrongExecutor,
    /// `UpdateBalanceFailed()` from the target contract
    BalanceUpdateFailed,
    /// The relayer account cannot pay for gas
    SignerInsufficientFunds,
    /// Standard `Error(string)` / `Panic(uint256)` revert
    Reverted { reason: String },
    Unknown { message: String },
}

impl ChainErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainErrorKind::InvalidSignature => "invalid-signature",
            ChainErrorKind::InsufficientBalance => "insufficient-balance",
            ChainErrorKind::NonceAlreadyUsed => "nonce-already-used",
            ChainErrorKind::WrongExecutor => "wrong-executor",
            ChainErrorKind::BalanceUpdateFailed => "balance-update-failed",
            ChainErrorKind::SignerInsufficientFunds => "signer-insufficient-funds",
            ChainErrorKind::Reverted { .. } => "reverted",
            ChainErrorKind::Unknown { .. } => "unknown",
        }
    }
}

/// A classified rejection: a stable kind plus the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ChainErrorKind,
    pub message: String,
}

const KNOWN_SELECTORS: [([u8; 4], ChainErrorKind, &str); 5] = [
    (
        [0x8b, 0xaa, 0x57, 0x9f],
        ChainErrorKind::InvalidSignature,
        "InvalidSignature: Signature verification failed. Check EVVM ID and signature format.",
    ),
    (
        [0xf4, 0xd6, 0x78, 0xb8],
        ChainErrorKind::InsufficientBalance,
        "InsufficientBalance: User does not have sufficient balance in EVVM contract. User needs to deposit tokens first.",
    ),
    (
        [0x18, 0x49, 0x85, 0x0b],
        ChainErrorKind::NonceAlreadyUsed,
        "InvalidAsyncNonce: Nonce has already been used.",
    ),
    (
        [0x5c, 0x75, 0x8b, 0x7e],
        ChainErrorKind::WrongExecutor,
        "SenderIsNotTheExecutor: Executor address mismatch.",
    ),
    (
        [0x28, 0x60, 0xe1, 0x9a],
        ChainErrorKind::BalanceUpdateFailed,
        "UpdateBalanceFailed: User does not have sufficient balance in the EVVM contract. The user needs to deposit tokens into the EVVM contract via the Treasury contract before using gasless transactions.",
    ),
];

/// Maps node rejections to [`ChainErrorKind`]s.
pub struct ChainErrorClassifier;

impl ChainErrorClassifier {
    pub fn classify(error: &ChainCallError) -> ClassifiedError {
        match error {
            ChainCallError::Rejected { message, data, .. } => {
                Self::classify_rejection(message, data.as_ref())
            }
            ChainCallError::Unavailable(inner) => ClassifiedError {
                kind: ChainErrorKind::Unknown {
                    message: inner.to_string(),
                },
                message: inner.to_string(),
            },
        }
    }

    /// Revert data wins over the message; some nodes only put the selector
    /// in the message text.
    pub fn classify_rejection(message: &str, data: Option<&Bytes>) -> ClassifiedError {
        if let Some(data) = data {
            if let Some(classified) = Self::match_selector(data) {
                return classified;
            }
            if let Some(reason) = Self::revert_reason(data) {
                return ClassifiedError {
                    kind: ChainErrorKind::Reverted {
                        reason: reason.clone(),
                    },
                    message: format!("Transaction reverted: {reason}"),
                };
            }
        }

        let msg_lower = message.to_lowercase();
        for (selector, kind, text) in &KNOWN_SELECTORS {
            if msg_lower.contains(&hex::encode_prefixed(selector)) {
                return ClassifiedError {
                    kind: kind.clone(),
                    message: text.to_string(),
                };
            }
        }

        if msg_lower.contains("insufficient funds") {
            return ClassifiedError {
                kind: ChainErrorKind::SignerInsufficientFunds,
                message: format!("Relayer cannot pay for gas: {message}"),
            };
        }

        ClassifiedError {
            kind: ChainErrorKind::Unknown {
                message: message.to_string(),
            },
            message: message.to_string(),
        }
    }

    /// The bare reason of an `Error(string)` or `Panic(uint256)` payload.
    fn revert_reason(data: &[u8]) -> Option<String> {
        if let Ok(revert) = Revert::abi_decode(data) {
            return Some(revert.reason);
        }
        let panic = Panic::abi_decode(data).ok()?;
        Some(match panic.kind() {
            Some(kind) => kind.as_str().to_string(),
            None => format!("panic code {}", panic.code),
        })
    }

    fn match_selector(data: &[u8]) -> Option<ClassifiedError> {
        let selector = data.get(..4)?;
        KNOWN_SELECTORS
            .iter()
            .find(|(known, _, _)| known.as_slice() == selector)
            .map(|(_, kind, text)| ClassifiedError {
                kind: kind.clone(),
                message: text.to_string(),
            })
    }
}
