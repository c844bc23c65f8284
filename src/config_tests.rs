//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use crate::bot::TrendMode;
    use crate::error::EngineError;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_engine_settings_defaults() {
        let config: EngineSettings = toml::from_str("").unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.account_refresh_secs, 0);
        assert!(config.account_refresh().is_none());
    }

    #[test]
    fn test_engine_settings_refresh_interval() {
        let config: EngineSettings = toml::from_str("account_refresh_secs = 30").unwrap();
        assert_eq!(config.account_refresh(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_statistics_config_defaults() {
        let config = StatisticsConfig::default();
        assert_eq!(config.bucket_sizes, vec![10, 100, 1000]);
        assert_eq!(config.calculations, vec!["last_price_mean".to_string()]);
    }

    #[test]
    fn test_exchange_config_defaults() {
        let config: ExchangeConfig = toml::from_str("").unwrap();
        assert_eq!(config.rest_url, "https://api.binance.com");
        assert_eq!(config.stream_host, "stream.binance.com");
        assert_eq!(config.stream_port, 9443);
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_exchange_config_debug_redacts_secrets() {
        let toml_str = r#"
api_key = "my-key"
secret_key = "my-secret"
"#;
        let config: ExchangeConfig = toml::from_str(toml_str).unwrap();
        assert!(config.has_credentials());
        let printed = format!("{:?}", config);
        assert!(!printed.contains("my-key"));
        assert!(!printed.contains("my-secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn test_storage_config() {
        let toml_str = r#"
host = "db.internal"
user = "bot"
password = "hunter2"
"#;
        let config: StorageConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "tickflow");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_strategy_binding_defaults() {
        let config: StrategyBinding = toml::from_str(r#"symbol = "ETHUSDT""#).unwrap();
        assert_eq!(config.mode, TrendMode::Follow);
        assert_eq!(config.calculation, "last_price_mean");
        assert_eq!((config.short, config.mid, config.long), (10, 100, 1000));
        assert_eq!(config.quote_asset, "USDT");
        assert_eq!(config.allocation, dec!(0.1));
        assert_eq!(config.build().name(), "trend_follow");
    }

    #[test]
    fn test_full_config_deserialize() {
        let toml_str = r#"
[engine]
workers = 8

[statistics]
bucket_sizes = [5, 50, 500]
calculations = ["last_price_mean", "last_price_std_dev"]

[[strategies]]
symbol = "BTCUSDT"
mode = "revert"
short = 5
mid = 50
long = 500

[[subscriptions]]
provider = "replay"
stream = "BTCUSDT"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.workers, 8);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.strategies[0].mode, TrendMode::Revert);
        assert_eq!(config.subscriptions[0].stream, "BTCUSDT");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_unregistered_bucket() {
        let toml_str = r#"
[statistics]
bucket_sizes = [10, 100]

[[strategies]]
symbol = "ETHUSDT"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("1000"));
    }

    #[test]
    fn test_validate_rejects_unknown_calculation() {
        let toml_str = r#"
[statistics]
calculations = ["median"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(EngineError::UnknownCalculation(name)) if name == "median"
        ));
    }

    #[test]
    fn test_validate_rejects_strategy_calculation_not_registered() {
        let toml_str = r#"
[[strategies]]
symbol = "ETHUSDT"
calculation = "last_price_max"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(EngineError::UnknownCalculation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_strategy() {
        let toml_str = r#"
[[strategies]]
symbol = "ETHUSDT"

[[strategies]]
symbol = "ETHUSDT"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(EngineError::DuplicateStrategy(_))
        ));
    }

    #[test]
    fn test_validate_rejects_lower_case_strategy_symbol() {
        let toml_str = r#"
[[strategies]]
symbol = "ethusdt"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("ETHUSDT"));
    }

    #[test]
    fn test_validate_rejects_blank_executor() {
        let mut config = Config::default();
        config.engine.execute_with = Some("  ".into());
        assert!(config.validate().unwrap_err().is_config());

        config.engine.execute_with = Some("binance".into());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_bucket_and_workers() {
        let mut config = Config::default();
        config.statistics.bucket_sizes = vec![10, 0];
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidBucketSize(0))
        ));

        let mut config = Config::default();
        config.engine.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_allocation_above_one() {
        let toml_str = r#"
[[strategies]]
symbol = "ETHUSDT"
allocation = 1.5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[engine]
queue_capacity = 64

[[strategies]]
symbol = "ETHUSDT"
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.engine.queue_capacity, 64);
        assert_eq!(config.strategies.len(), 1);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = Config::load("/nonexistent/tickflow.toml").unwrap_err();
        assert!(matches!(err, EngineError::ConfigLoad(_)));
    }
}
