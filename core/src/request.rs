use std::{fmt, str::FromStr};

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::Value as JsonValue;

use crate::error::RelayError;

/// Per-user relay sequence number.
///
/// Accepted on the wire as a JSON integer, a decimal string or a `0x` hex
/// string, and always rendered as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UserNonce(pub U256);

impl UserNonce {
    pub fn new(value: impl Into<U256>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> U256 {
        self.0
    }
}

impl fmt::Display for UserNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserNonce {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.starts_with('+') {
            return Err(RelayError::ValidationError {
                message: format!("Invalid nonce: {s:?}"),
            });
        }
        U256::from_str(trimmed)
            .map(UserNonce)
            .map_err(|e| RelayError::ValidationError {
                message: format!("Invalid nonce {s:?}: {e}"),
            })
    }
}

impl From<u64> for UserNonce {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl Serialize for UserNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserNonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NonceVisitor;

        impl de::Visitor<'_> for NonceVisitor {
            type Value = UserNonce;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or a decimal/hex string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(UserNonce::from(v))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Self::Value, E> {
                Ok(UserNonce(U256::from(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(UserNonce::from)
                    .map_err(|_| E::custom(format!("nonce must not be negative, got {v}")))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Err(E::custom(format!("nonce must be an integer, got {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse::<UserNonce>().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(NonceVisitor)
    }
}

/// A pre-signed, gas-less function call submitted for relaying.
///
/// Addresses are kept in the textual form the user signed over; use
/// [`RelayRequest::user`] and [`RelayRequest::contract`] for parsed values.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    /// Address of the user who signed the request
    #[schema(example = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")]
    pub user_address: String,
    /// Contract to call
    pub contract_address: String,
    /// Function name, or full signature such as `transfer(address,uint256)`
    pub function_name: String,
    /// Ordered call arguments
    #[schema(value_type = Vec<Object>)]
    pub args: Vec<JsonValue>,
    /// EIP-191 signature over the canonical relay message
    pub signature: String,
    /// Strictly increasing per-user nonce
    #[schema(value_type = String, example = "1")]
    pub nonce: UserNonce,
}

impl RelayRequest {
    pub fn user(&self) -> Result<Address, RelayError> {
        parse_address("userAddress", &self.user_address)
    }

    pub fn contract(&self) -> Result<Address, RelayError> {
        parse_address("contractAddress", &self.contract_address)
    }

    /// Serialized snapshot of the call arguments, as hashed and persisted.
    pub fn args_snapshot(&self) -> Result<String, RelayError> {
        Ok(crate::signature::compact_json(&self.args)?)
    }
}

/// Parses a `0x`-prefixed, 40 hex digit address. Checksums are not enforced.
pub fn parse_address(field: &str, value: &str) -> Result<Address, RelayError> {
    let is_well_formed = value.len() == 42
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !is_well_formed {
        return Err(RelayError::ValidationError {
            message: format!("Invalid address for {field}: {value:?}"),
        });
    }
    Address::from_str(value).map_err(|e| RelayError::ValidationError {
        message: format!("Invalid address for {field}: {e}"),
    })
}
