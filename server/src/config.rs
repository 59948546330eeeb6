use std::{env, time::Duration};

use alloy::primitives::U256;
use anyhow::{Context, anyhow};
use config::{Config, File};
use relay_executors::{reconciler::ReconcilerConfig, signer_pool::SignerPoolConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub relayer: RelayerConfig,
    #[serde(default)]
    pub reconciler: ReconcilerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

/// Contract ABI shipped with the server, relative to its working directory.
pub const DEFAULT_ABI_PATH: &str = "contracts/relay_target.abi.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    pub private_keys: Vec<String>,
    /// Decimal wei
    pub min_balance_wei: String,
    pub lease_wait_ms: u64,
    /// Contract ABI (bare array or build artifact) used to resolve bare
    /// function names. Empty disables the lookup.
    pub abi_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub batch_size: usize,
    pub stale_pending_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            host: "0.0.0.0".into(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Redis,
            namespace: None,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".into(),
        }
    }
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            private_keys: Vec::new(),
            min_balance_wei: "1000000000000000000".into(),
            lease_wait_ms: 5_000,
            abi_path: Some(DEFAULT_ABI_PATH.into()),
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 15,
            batch_size: 100,
            stale_pending_secs: 300,
        }
    }
}

impl RelayerConfig {
    pub fn abi_path(&self) -> Option<&str> {
        self.abi_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }

    /// Configured keys followed by any found in the `RELAYER_PRIVATE_KEY*`
    /// environment variables.
    pub fn signer_pool_config(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<SignerPoolConfig, String> {
        let default_min_balance = U256::from_str_radix(self.min_balance_wei.trim(), 10)
            .map_err(|e| format!("relayer.min_balance_wei is not a decimal integer: {e}"))?;

        let mut private_keys = self.private_keys.clone();
        private_keys.extend(relayer_keys_from(lookup));

        Ok(SignerPoolConfig {
            private_keys,
            default_min_balance,
            lease_wait: Duration::from_millis(self.lease_wait_ms),
        })
    }
}

impl ReconcilerSettings {
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            batch_size: self.batch_size,
            stale_pending_after: Duration::from_secs(self.stale_pending_secs),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// `RELAYER_PRIVATE_KEY_1`, `RELAYER_PRIVATE_KEY_2`, ... up to the first gap,
/// or the single `RELAYER_PRIVATE_KEY` when no numbered key is set.
pub fn relayer_keys_from(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let numbered: Vec<String> = (1..)
        .map_while(|index| lookup(&format!("RELAYER_PRIVATE_KEY_{index}")))
        .filter(|key| !key.trim().is_empty())
        .collect();

    if !numbered.is_empty() {
        return numbered;
    }

    lookup("RELAYER_PRIVATE_KEY")
        .filter(|key| !key.trim().is_empty())
        .into_iter()
        .collect()
}

pub fn get_config() -> anyhow::Result<RelayConfig> {
    let base_path = env::current_dir().context("Failed to determine the current directory")?;
    let configuration_directory = base_path.join("configuration");

    // Detect the running environment
    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(|e: String| anyhow!("Failed to parse APP_ENVIRONMENT: {e}"))?;

    let environment_filename = format!("server_{}.yaml", environment.as_str());

    // Load configuration from files
    let config = Config::builder()
        .add_source(File::from(configuration_directory.join("server_base.yaml")))
        .add_source(File::from(configuration_directory.join(environment_filename)).required(false))
        .add_source(
            config::Environment::with_prefix("app")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("relayer.private_keys")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config.try_deserialize::<RelayConfig>().context(
        "Failed to deserialize configuration. Make sure all required fields are set correctly in your configuration files or environment variables",
    )
}

/// The possible runtime environment for our application.
pub enum Environment {
    Local,
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local`, `development`, or `production`."
            )),
        }
    }
}
