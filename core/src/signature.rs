use alloy::{
    hex,
    primitives::{Address, B256, Signature, keccak256},
};
use serde::Serialize;
use serde_json::{Value as JsonValue, ser::Formatter};

use crate::request::{RelayRequest, UserNonce};

/// Checks that a relay request was signed by the user it claims to come from.
///
/// The signed payload is the comma-joined message
/// `userAddress,contractAddress,functionName,argsHash,nonce`, hashed with the
/// EIP-191 personal message prefix. `argsHash` is the keccak256 of the
/// compact JSON rendering of `args`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureValidator;

impl SignatureValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_request(&self, request: &RelayRequest) -> bool {
        self.validate(
            &request.user_address,
            &request.contract_address,
            &request.function_name,
            &request.args,
            request.nonce,
            &request.signature,
        )
    }

    /// Never fails: malformed input of any kind is an invalid signature.
    pub fn validate(
        &self,
        user_address: &str,
        contract_address: &str,
        function_name: &str,
        args: &[JsonValue],
        nonce: UserNonce,
        signature: &str,
    ) -> bool {
        let Some(message) = canonical_message(
            user_address,
            contract_address,
            function_name,
            args,
            nonce,
        ) else {
            tracing::debug!(user = %user_address, "Could not serialize relay arguments");
            return false;
        };

        match recover_signer(message.as_bytes(), signature) {
            Some(recovered) => {
                let matches = recovered.to_string().eq_ignore_ascii_case(user_address);
                if !matches {
                    tracing::debug!(
                        user = %user_address,
                        recovered = %recovered,
                        "Signature recovered to a different address"
                    );
                }
                matches
            }
            None => {
                tracing::debug!(user = %user_address, "Malformed relay signature");
                false
            }
        }
    }
}

/// keccak256 of the compact JSON array of call arguments.
pub fn args_hash(args: &[JsonValue]) -> Option<B256> {
    compact_json(args)
        .ok()
        .map(|json| keccak256(json.as_bytes()))
}

/// Compact JSON with non-integer numbers written the way browsers'
/// `JSON.stringify` writes them (`1` for `1.0`, `1e+21` for `1e21`), so
/// signatures made by web clients over float arguments verify.
pub fn compact_json(args: &[JsonValue]) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, JsNumberFormatter);
    args.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

struct JsNumberFormatter;

impl Formatter for JsNumberFormatter {
    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        writer.write_all(js_number(value).as_bytes())
    }

    fn write_f32<W>(&mut self, writer: &mut W, value: f32) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        self.write_f64(writer, f64::from(value))
    }
}

/// ECMAScript `Number::toString` for finite values.
fn js_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    // Shortest round-trip digits, as `d.ddde<exp>`.
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let n = exponent.parse::<i32>().unwrap_or(0) + 1;

    let body = if k <= n && n <= 21 {
        format!("{digits}{}", "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{int}.{frac}")
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat(n.unsigned_abs() as usize))
    } else {
        let e = n - 1;
        let sign = if e < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{sign}{}", e.abs())
        } else {
            format!("{first}.{rest}e{sign}{}", e.abs())
        }
    };

    if value < 0.0 { format!("-{body}") } else { body }
}

/// Builds the exact message a user signs for a relay request.
pub fn canonical_message(
    user_address: &str,
    contract_address: &str,
    function_name: &str,
    args: &[JsonValue],
    nonce: UserNonce,
) -> Option<String> {
    let args_hash = args_hash(args)?;
    Some(format!(
        "{user_address},{contract_address},{function_name},{args_hash},{nonce}"
    ))
}

fn recover_signer(message: &[u8], signature: &str) -> Option<Address> {
    let bytes = hex::decode(signature.trim()).ok()?;
    let signature = Signature::try_from(bytes.as_slice()).ok()?;
    signature.recover_address_from_msg(message).ok()
}
