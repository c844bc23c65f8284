//! Configuration management

use crate::bot::{TradingStrategy, TrendMode, TrendStrategy};
use crate::error::{EngineError, Result};
use crate::statistics::{builtin, calculations::LAST_PRICE_MEAN};
use crate::types::is_canonical_symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable prefix, e.g. `TICKFLOW__ENGINE__WORKERS=8`
pub const ENV_PREFIX: &str = "TICKFLOW";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyBinding>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

impl Config {
    /// Load `.env`, the TOML file at `path`, then `TICKFLOW__*` overrides
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(path)))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-section checks: every strategy must reference registered
    /// buckets and calculations.
    pub fn validate(&self) -> Result<()> {
        if self.engine.workers == 0 {
            return Err(EngineError::Config("engine.workers must be positive".into()));
        }
        if self.engine.queue_capacity == 0 {
            return Err(EngineError::Config(
                "engine.queue_capacity must be positive".into(),
            ));
        }

        if let Some(&bad) = self.statistics.bucket_sizes.iter().find(|&&s| s == 0) {
            return Err(EngineError::InvalidBucketSize(bad));
        }
        for name in &self.statistics.calculations {
            if builtin(name).is_none() {
                return Err(EngineError::UnknownCalculation(name.clone()));
            }
        }

        let mut symbols = HashSet::new();
        for binding in &self.strategies {
            if binding.symbol.trim().is_empty() {
                return Err(EngineError::Config("strategy without symbol".into()));
            }
            if !is_canonical_symbol(&binding.symbol) {
                return Err(EngineError::Config(format!(
                    "strategy symbol {:?} must be upper case, e.g. {:?}",
                    binding.symbol,
                    binding.symbol.trim().to_ascii_uppercase()
                )));
            }
            if !symbols.insert(binding.symbol.as_str()) {
                return Err(EngineError::DuplicateStrategy(binding.symbol.clone()));
            }
            for bucket in [binding.short, binding.mid, binding.long] {
                if !self.statistics.bucket_sizes.contains(&bucket) {
                    return Err(EngineError::Config(format!(
                        "strategy for {} uses bucket {} which is not registered",
                        binding.symbol, bucket
                    )));
                }
            }
            if !self.statistics.calculations.contains(&binding.calculation) {
                return Err(EngineError::UnknownCalculation(binding.calculation.clone()));
            }
            if binding.allocation < Decimal::ZERO || binding.allocation > Decimal::ONE {
                return Err(EngineError::Config(format!(
                    "strategy for {} has allocation {} outside [0, 1]",
                    binding.symbol, binding.allocation
                )));
            }
        }

        if let Some(id) = &self.engine.execute_with {
            if id.trim().is_empty() {
                return Err(EngineError::Config("engine.execute_with must name a market client".into()));
            }
        }

        for sub in &self.subscriptions {
            if sub.provider.trim().is_empty() || sub.stream.trim().is_empty() {
                return Err(EngineError::Config(
                    "subscriptions need a provider and a stream".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Exchange credentials and endpoints, consumed by exchange providers
#[derive(Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_stream_host")]
    pub stream_host: String,
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,
}

fn default_rest_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_stream_host() -> String {
    "stream.binance.com".to_string()
}

fn default_stream_port() -> u16 {
    9443
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            rest_url: default_rest_url(),
            stream_host: default_stream_host(),
            stream_port: default_stream_port(),
        }
    }
}

impl ExchangeConfig {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("api_key", &redact(&self.api_key))
            .field("secret_key", &redact(&self.secret_key))
            .field("rest_url", &self.rest_url)
            .field("stream_host", &self.stream_host)
            .field("stream_port", &self.stream_port)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "***"
    }
}

/// Persistence backend connection parameters
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_host")]
    pub host: String,
    #[serde(default = "default_storage_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_storage_host() -> String {
    "localhost".to_string()
}

fn default_storage_port() -> u16 {
    5432
}

fn default_database() -> String {
    "tickflow".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            host: default_storage_host(),
            port: default_storage_port(),
            database: default_database(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Events buffered per worker before producers wait
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Account refresh interval; 0 refreshes only at startup
    #[serde(default)]
    pub account_refresh_secs: u64,
    /// Market client id; when set every decision is placed as a market order
    #[serde(default)]
    pub execute_with: Option<String>,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            account_refresh_secs: 0,
            execute_with: None,
        }
    }
}

impl EngineSettings {
    pub fn account_refresh(&self) -> Option<Duration> {
        (self.account_refresh_secs > 0).then(|| Duration::from_secs(self.account_refresh_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    #[serde(default = "default_bucket_sizes")]
    pub bucket_sizes: Vec<usize>,
    /// Built-in calculation names to register
    #[serde(default = "default_calculations")]
    pub calculations: Vec<String>,
}

fn default_bucket_sizes() -> Vec<usize> {
    vec![10, 100, 1000]
}

fn default_calculations() -> Vec<String> {
    vec![LAST_PRICE_MEAN.to_string()]
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            bucket_sizes: default_bucket_sizes(),
            calculations: default_calculations(),
        }
    }
}

/// Symbol to strategy binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyBinding {
    pub symbol: String,
    #[serde(default)]
    pub mode: TrendMode,
    #[serde(default = "default_calculation")]
    pub calculation: String,
    #[serde(default = "default_short")]
    pub short: usize,
    #[serde(default = "default_mid")]
    pub mid: usize,
    #[serde(default = "default_long")]
    pub long: usize,
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    #[serde(default = "default_allocation")]
    pub allocation: Decimal,
}

fn default_calculation() -> String {
    LAST_PRICE_MEAN.to_string()
}

fn default_short() -> usize {
    10
}

fn default_mid() -> usize {
    100
}

fn default_long() -> usize {
    1000
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_allocation() -> Decimal {
    dec!(0.1)
}

impl StrategyBinding {
    pub fn build(&self) -> Arc<dyn TradingStrategy> {
        Arc::new(
            TrendStrategy::new(self.short, self.mid, self.long)
                .with_mode(self.mode)
                .with_calculation(self.calculation.clone())
                .with_allocation(self.quote_asset.clone(), self.allocation),
        )
    }
}

/// Stream subscribed on `provider` when the engine starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub provider: String,
    pub stream: String,
}
