//! Tests for the statistics engine

#[cfg(test)]
mod tests {
    use super::super::calculations::*;
    use super::super::*;
    use crate::types::Ticker;
    use proptest::prelude::*;

    fn engine_with(sizes: &[usize]) -> StatisticsEngine {
        let stats = StatisticsEngine::new();
        stats.register_bucket_sizes(sizes).unwrap();
        stats
            .register_calculation(LAST_PRICE_MEAN, last_price_mean)
            .unwrap();
        stats
    }

    fn feed(stats: &StatisticsEngine, symbol: &str, prices: impl IntoIterator<Item = f64>) {
        for p in prices {
            stats.record(symbol, Ticker::new(symbol, p));
        }
    }

    #[test]
    fn test_linear_series_means() {
        let stats = engine_with(&[10, 100, 1000]);
        feed(&stats, "ETHUSDT", (1..=1000).map(|i| i as f64));

        let short = stats.calculation_for("ETHUSDT", 10, LAST_PRICE_MEAN);
        let mid = stats.calculation_for("ETHUSDT", 100, LAST_PRICE_MEAN);
        let long = stats.calculation_for("ETHUSDT", 1000, LAST_PRICE_MEAN);
        assert!((short - 995.5).abs() < 1e-9, "short mean was {}", short);
        assert!((mid - 950.5).abs() < 1e-9, "mid mean was {}", mid);
        assert!((long - 500.5).abs() < 1e-9, "long mean was {}", long);
    }

    #[test]
    fn test_window_evicts_oldest_beyond_capacity() {
        let stats = engine_with(&[3, 5]);
        assert_eq!(stats.capacity(), 5);
        feed(&stats, "BTCUSDT", (1..=8).map(|i| i as f64));

        assert_eq!(stats.window_len("BTCUSDT"), 5);
        assert_eq!(stats.window_prices("BTCUSDT"), vec![4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_bucket_larger_than_history_uses_all_entries() {
        let stats = engine_with(&[10, 100]);
        feed(&stats, "ETHUSDT", [2.0, 4.0, 6.0]);
        let mean = stats.calculation_for("ETHUSDT", 100, LAST_PRICE_MEAN);
        assert!((mean - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_symbol_returns_empty_value() {
        let stats = engine_with(&[10]);
        assert_eq!(stats.calculation_for("DOGEUSDT", 10, LAST_PRICE_MEAN), EMPTY_CALCULATION);
        assert!(stats.calculator("DOGEUSDT").is_none());
    }

    #[test]
    fn test_unknown_calculation_returns_empty_value() {
        let stats = engine_with(&[10]);
        feed(&stats, "ETHUSDT", [1.0, 2.0]);
        assert_eq!(stats.calculation_for("ETHUSDT", 10, "vwap"), EMPTY_CALCULATION);
    }

    #[test]
    fn test_nothing_recorded_without_buckets() {
        let stats = StatisticsEngine::new();
        feed(&stats, "ETHUSDT", [1.0, 2.0]);
        assert_eq!(stats.window_len("ETHUSDT"), 0);
        assert!(stats.calculator("ETHUSDT").is_none());
    }

    #[test]
    fn test_zero_bucket_rejected() {
        let stats = StatisticsEngine::new();
        let err = stats.register_bucket_sizes(&[10, 0]).unwrap_err();
        assert!(matches!(err, crate::error::EngineError::InvalidBucketSize(0)));
        assert_eq!(stats.capacity(), 0);
    }

    #[test]
    fn test_duplicate_calculation_rejected() {
        let stats = engine_with(&[10]);
        assert!(stats.register_calculation(LAST_PRICE_MEAN, last_price_max).is_err());
        assert!(stats.register_calculation("", last_price_max).is_err());
    }

    #[test]
    fn test_calculator_view_is_bound_to_symbol() {
        let stats = engine_with(&[2]);
        feed(&stats, "ETHUSDT", [10.0, 20.0, 30.0]);
        feed(&stats, "BTCUSDT", [1000.0]);

        let eth = stats.calculator("ETHUSDT").unwrap();
        assert_eq!(eth.symbol(), "ETHUSDT");
        assert_eq!(eth.len(), 2);
        assert!((eth.calculation_for(2, LAST_PRICE_MEAN) - 25.0).abs() < 1e-12);

        let mut symbols = stats.symbols();
        symbols.sort();
        assert_eq!(symbols, vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
    }

    #[test]
    fn test_bucket_sizes_sorted() {
        let stats = engine_with(&[1000, 10, 100]);
        assert_eq!(stats.bucket_sizes(), vec![10, 100, 1000]);
        assert!(stats.has_bucket(100));
        assert!(!stats.has_bucket(50));
    }

    #[test]
    fn test_builtin_calculations() {
        let tickers: Vec<Ticker> = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]
            .iter()
            .map(|p| Ticker::new("X", *p))
            .collect();
        assert!((last_price_mean(&tickers) - 5.0).abs() < 1e-12);
        // sample std dev of the classic series: sqrt(32 / 7)
        assert!((last_price_std_dev(&tickers) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(last_price_min(&tickers), 2.0);
        assert_eq!(last_price_max(&tickers), 9.0);
        assert_eq!(last_price_std_dev(&tickers[..1]), 0.0);
        assert_eq!(last_price_mean(&[]), 0.0);
    }

    #[test]
    fn test_builtin_lookup() {
        for name in BUILTIN_CALCULATIONS {
            assert!(builtin(name).is_some(), "{} should resolve", name);
        }
        assert!(builtin("median").is_none());
    }

    proptest! {
        #[test]
        fn prop_calculation_sees_last_entries_in_order(
            prices in proptest::collection::vec(0u32..10_000, 1..200),
            bucket in 1usize..64,
        ) {
            let stats = StatisticsEngine::new();
            stats.register_bucket_sizes(&[bucket, 64]).unwrap();
            // Position-weighted sum distinguishes both membership and order
            stats.register_calculation("weighted", |w: &[Ticker]| {
                w.iter()
                    .enumerate()
                    .map(|(i, t)| (i as f64 + 1.0) * t.last_price)
                    .sum::<f64>()
            }).unwrap();

            for p in &prices {
                stats.record("SYM", Ticker::new("SYM", *p as f64));
            }

            let take = bucket.min(prices.len());
            let expected: f64 = prices[prices.len() - take..]
                .iter()
                .enumerate()
                .map(|(i, p)| (i as f64 + 1.0) * *p as f64)
                .sum();

            prop_assert_eq!(stats.calculation_for("SYM", bucket, "weighted"), expected);
            prop_assert!(stats.window_len("SYM") <= 64);
        }
    }
}
