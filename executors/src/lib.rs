pub mod dispatcher;
pub mod error_classifier;
pub mod nonce_sequencer;
pub mod reconciler;
pub mod signer_pool;
pub mod store;
