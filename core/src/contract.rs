use std::path::Path;

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
    primitives::{Address, Bytes},
};
use serde_json::Value as JsonValue;

use crate::error::RelayError;

/// A contract call ready to be estimated and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub target: Address,
    pub call_data: Bytes,
    pub function_name: String,
}

/// Turns `functionName` + JSON `args` into calldata.
///
/// `functionName` may be a full signature like `register(string,uint256)`,
/// which is used as-is, or a bare name, which is looked up in the configured
/// contract ABI and disambiguated by argument count.
#[derive(Debug, Clone, Default)]
pub struct ContractCallEncoder {
    abi: Option<JsonAbi>,
}

impl ContractCallEncoder {
    pub fn new(abi: Option<JsonAbi>) -> Self {
        Self { abi }
    }

    /// Loads an ABI from either a bare ABI array or a compiler artifact with an
    /// `abi` field.
    pub fn from_abi_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| RelayError::ConfigError {
            message: format!("Failed to read contract ABI {}: {e}", path.display()),
        })?;
        let json: JsonValue = serde_json::from_str(&raw)?;
        let abi_json = match json {
            JsonValue::Object(mut artifact) => {
                artifact
                    .remove("abi")
                    .ok_or_else(|| RelayError::ConfigError {
                        message: format!("No `abi` field in artifact {}", path.display()),
                    })?
            }
            other => other,
        };
        let abi: JsonAbi = serde_json::from_value(abi_json)?;
        Ok(Self::new(Some(abi)))
    }

    pub fn encode(
        &self,
        target: Address,
        function_name: &str,
        args: &[JsonValue],
    ) -> Result<PreparedCall, RelayError> {
        let function = self.resolve_function(function_name, args.len())?;
        let values = json_to_sol(args, &function.inputs)
            .map_err(|message| RelayError::encoding_error(function_name, message))?;
        let call_data = function.abi_encode_input(&values).map_err(|e| {
            RelayError::encoding_error(function_name, format!("Failed to encode function call: {e}"))
        })?;

        Ok(PreparedCall {
            target,
            call_data: call_data.into(),
            function_name: function.name.clone(),
        })
    }

    fn resolve_function(&self, method: &str, arg_count: usize) -> Result<Function, RelayError> {
        let trimmed = method.trim();
        if trimmed.contains('(') {
            let function = Function::parse(trimmed).map_err(|e| {
                RelayError::encoding_error(method, format!("Invalid function signature: {e}"))
            })?;
            if function.inputs.len() != arg_count {
                return Err(RelayError::encoding_error(
                    method,
                    format!(
                        "Parameter count mismatch: signature expects {}, got {}",
                        function.inputs.len(),
                        arg_count
                    ),
                ));
            }
            return Ok(function);
        }

        let abi = self.abi.as_ref().ok_or_else(|| {
            RelayError::encoding_error(
                method,
                "No contract ABI configured; pass a full function signature",
            )
        })?;

        let candidates: Vec<&Function> = abi.functions().filter(|f| f.name == trimmed).collect();
        if candidates.is_empty() {
            return Err(RelayError::encoding_error(
                method,
                format!("Function {trimmed} not found in contract ABI"),
            ));
        }

        candidates
            .into_iter()
            .find(|f| f.inputs.len() == arg_count)
            .cloned()
            .ok_or_else(|| {
                RelayError::encoding_error(
                    method,
                    format!("No overload of {trimmed} takes {arg_count} arguments"),
                )
            })
    }
}

fn json_to_sol(json_values: &[JsonValue], params: &[Param]) -> Result<Vec<DynSolValue>, String> {
    if json_values.len() != params.len() {
        return Err(format!(
            "Parameter count mismatch: expected {}, got {}",
            params.len(),
            json_values.len()
        ));
    }

    let mut parsed = Vec::with_capacity(params.len());
    for (value, param) in json_values.iter().zip(params) {
        if param.is_complex_type() && !param.ty.ends_with(']') {
            let fields = value
                .as_array()
                .ok_or_else(|| format!("Expected array for tuple parameter {}", param.name))?;
            parsed.push(DynSolValue::Tuple(json_to_sol(fields, &param.components)?));
            continue;
        }

        let sol_type: DynSolType = param
            .resolve()
            .map_err(|e| format!("Invalid Solidity type '{}': {e}", param.ty))?;
        let value = sol_type
            .coerce_json(value)
            .map_err(|e| format!("Failed to parse parameter {}: {e}", param.name))?;
        parsed.push(value);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{primitives::address, sol, sol_types::SolCall};
    use serde_json::json;

    sol! {
        function register(string name, uint256 duration, bool renew);
        function ping();
    }

    const TARGET: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");

    #[test]
    fn encodes_full_signature_without_abi() {
        let encoder = ContractCallEncoder::default();
        let call = encoder
            .encode(
                TARGET,
                "register(string,uint256,bool)",
                &[json!("alice"), json!("31536000"), json!(true)],
            )
            .unwrap();

        let expected = registerCall {
            name: "alice".to_string(),
            duration: alloy::primitives::U256::from(31_536_000u64),
            renew: true,
        }
        .abi_encode();
        assert_eq!(call.call_data.as_ref(), expected.as_slice());
        assert_eq!(call.function_name, "register");
        assert_eq!(call.target, TARGET);
    }

    #[test]
    fn resolves_bare_name_from_abi() {
        let abi: JsonAbi = serde_json::from_value(json!([
            {
                "type": "function",
                "name": "ping",
                "inputs": [],
                "outputs": [],
                "stateMutability": "nonpayable"
            }
        ]))
        .unwrap();
        let call = ContractCallEncoder::new(Some(abi))
            .encode(TARGET, "ping", &[])
            .unwrap();
        assert_eq!(call.call_data.as_ref(), pingCall {}.abi_encode().as_slice());
    }

    #[test]
    fn bare_name_without_abi_is_an_encoding_error() {
        let err = ContractCallEncoder::default()
            .encode(TARGET, "ping", &[])
            .unwrap_err();
        assert!(matches!(err, RelayError::EncodingError { .. }));
    }

    #[test]
    fn argument_count_mismatch_is_reported() {
        let err = ContractCallEncoder::default()
            .encode(TARGET, "register(string,uint256,bool)", &[json!("alice")])
            .unwrap_err();
        assert!(err.to_string().contains("Parameter count mismatch"));
    }

    #[test]
    fn uncoercible_argument_is_reported() {
        let err = ContractCallEncoder::default()
            .encode(
                TARGET,
                "register(string,uint256,bool)",
                &[json!("alice"), json!("not-a-number"), json!(true)],
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::EncodingError { .. }));
    }
}
