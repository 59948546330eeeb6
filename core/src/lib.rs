pub mod chain;
pub mod contract;
pub mod error;
pub mod request;
pub mod signature;

pub use chain::{AlloyChainClient, CallReceipt, ChainClient};
pub use contract::{ContractCallEncoder, PreparedCall};
pub use error::{ChainCallError, RelayError};
pub use request::{RelayRequest, UserNonce};
pub use signature::SignatureValidator;
