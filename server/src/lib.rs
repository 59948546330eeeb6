pub mod config;
pub mod http;

// Re-export commonly used types for integration tests and external usage
pub use config::{
    ChainConfig, LogFormat, ReconcilerSettings, RedisConfig, RelayConfig, RelayerConfig,
    ServerConfig, StoreBackendKind, StoreConfig,
};
pub use http::server::{RelayServer, RelayServerState, router};
