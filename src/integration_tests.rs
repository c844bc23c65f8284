//! End-to-end tests through the engine

#[cfg(test)]
mod tests {
    use crate::bot::{TrendStrategy, TradingStrategy};
    use crate::config::Config;
    use crate::dispatcher::WorkerState;
    use crate::engine::{Engine, EngineConfig, EngineState};
    use crate::provider::{Provider, ReplayProvider};
    use crate::statistics::calculations::{last_price_mean, LAST_PRICE_MEAN};
    use crate::statistics::EMPTY_CALCULATION;
    use crate::testing::{depth, ticker, StubProvider};
    use crate::types::{Side, SubscriptionState};
    use std::io::Write;
    use std::sync::Arc;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            workers: 4,
            queue_capacity: 256,
            account_refresh: None,
            execute_with: None,
        })
    }

    #[tokio::test]
    async fn test_linear_series_window_means() {
        let engine = engine();
        let provider = Arc::new(StubProvider::new("feed"));
        engine.engage_provider(provider.clone()).unwrap();
        engine.add_calculation_buckets(&[10, 100, 1000]).unwrap();
        engine.add_calculation(LAST_PRICE_MEAN, last_price_mean).unwrap();
        engine.turn_on().await.unwrap();

        for price in 1..=1000 {
            provider.publish(ticker("ETHUSDT", price as f64)).await.unwrap();
        }
        engine.turn_off().await.unwrap();

        let stats = engine.statistics();
        let mean = |bucket| stats.calculation_for("ETHUSDT", bucket, LAST_PRICE_MEAN);
        assert!((mean(10) - 995.5).abs() < 1e-9);
        assert!((mean(100) - 950.5).abs() < 1e-9);
        assert!((mean(1000) - 500.5).abs() < 1e-9);
        assert_eq!(engine.cache().last_ticker("ETHUSDT").unwrap().last_price, 1000.0);
    }

    #[tokio::test]
    async fn test_falling_series_never_buys() {
        let engine = engine();
        let provider = Arc::new(StubProvider::new("feed"));
        engine.engage_provider(provider.clone()).unwrap();
        engine.add_calculation_buckets(&[10, 100, 1000]).unwrap();
        engine.add_calculation(LAST_PRICE_MEAN, last_price_mean).unwrap();
        engine
            .add_strategy_for("ETHUSDT", Arc::new(TrendStrategy::default()))
            .unwrap();
        let mut decisions = engine.take_decisions().unwrap();
        engine.turn_on().await.unwrap();

        for i in 0..300 {
            provider.publish(ticker("ETHUSDT", 1000.0 - i as f64)).await.unwrap();
        }
        engine.turn_off().await.unwrap();

        let mut sides = Vec::new();
        while let Ok(decision) = decisions.try_recv() {
            sides.push(decision.side);
        }
        assert!(!sides.is_empty());
        assert!(sides.iter().all(|side| *side == Side::Sell));
    }

    #[tokio::test]
    async fn test_trend_strategy_predicate_on_falling_series() {
        let engine = engine();
        engine.add_calculation_buckets(&[10, 100, 1000]).unwrap();
        engine.add_calculation(LAST_PRICE_MEAN, last_price_mean).unwrap();
        let stats = engine.statistics();
        let strategy = TrendStrategy::default();

        for i in 0..1200 {
            stats.record("ETHUSDT", crate::types::Ticker::new("ETHUSDT", 5000.0 - i as f64));
            let view = stats.calculator("ETHUSDT").unwrap();
            assert!(!strategy.should_buy(&view, None), "buy signal at tick {}", i);
        }
    }

    #[tokio::test]
    async fn test_unknown_symbol_returns_empty_value() {
        let engine = engine();
        engine.add_calculation_buckets(&[10]).unwrap();
        engine.add_calculation(LAST_PRICE_MEAN, last_price_mean).unwrap();
        let value = engine
            .statistics()
            .calculation_for("DOGEUSDT", 10, LAST_PRICE_MEAN);
        assert_eq!(value, EMPTY_CALCULATION);
    }

    #[tokio::test]
    async fn test_depth_updates_cache_only() {
        let engine = engine();
        let provider = Arc::new(StubProvider::new("feed"));
        engine.engage_provider(provider.clone()).unwrap();
        engine.add_calculation_buckets(&[10]).unwrap();
        engine.turn_on().await.unwrap();

        provider.publish(depth("BTCUSDT", 99.0, 101.0)).await.unwrap();
        engine.turn_off().await.unwrap();

        let book = engine.cache().last_depth("BTCUSDT").unwrap();
        assert_eq!(book.spread(), Some(2.0));
        assert_eq!(engine.statistics().window_len("BTCUSDT"), 0);
        assert!(engine.cache().last_ticker("BTCUSDT").is_none());
    }

    #[tokio::test]
    async fn test_turn_off_leaves_nothing_running() {
        let engine = engine();
        let provider = Arc::new(StubProvider::new("feed"));
        engine.engage_provider(provider.clone()).unwrap();
        engine.add_initial_subscription("feed", "ETHUSDT").unwrap();
        engine.add_calculation_buckets(&[10]).unwrap();
        engine.turn_on().await.unwrap();
        engine.subscribe("feed", "BTCUSDT").await.unwrap();

        for i in 0..50 {
            provider.publish(ticker("ETHUSDT", i as f64)).await.unwrap();
            provider.publish(ticker("BTCUSDT", i as f64)).await.unwrap();
        }
        let sender = engine.sender();
        let report = engine.turn_off().await.unwrap();

        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(report.processed_events, 100);
        assert_eq!(report.cancelled_subscriptions, 2);
        assert!(provider
            .subscriptions()
            .await
            .unwrap()
            .iter()
            .all(|s| s.state == SubscriptionState::Cancelled));
        assert!(engine.workers().iter().all(|w| w.state == WorkerState::Stopped));

        // Late events are refused, not processed
        assert!(sender.send(ticker("ETHUSDT", 1.0)).await.is_err());
        assert_eq!(engine.statistics().window_len("ETHUSDT"), 10);
        let processed: u64 = engine.workers().iter().map(|w| w.processed).sum();
        assert_eq!(processed, 100);
    }

    #[tokio::test]
    async fn test_replay_run_from_config() {
        let mut events = tempfile::NamedTempFile::new().unwrap();
        for i in 1..=20 {
            writeln!(
                events,
                r#"{{"type":"ticker","symbol":"ETHUSDT","last_price":{}}}"#,
                i
            )
            .unwrap();
        }
        writeln!(
            events,
            r#"{{"type":"order","order_id":1,"symbol":"ETHUSDT","side":"BUY","price":"10","quantity":"1","status":"NEW"}}"#
        )
        .unwrap();
        writeln!(
            events,
            r#"{{"type":"order","order_id":1,"symbol":"ETHUSDT","side":"BUY","price":"10","quantity":"1","status":"FILLED"}}"#
        )
        .unwrap();

        let config: Config = toml::from_str(
            r#"
[statistics]
bucket_sizes = [2, 5, 10]
calculations = ["last_price_mean"]

[[strategies]]
symbol = "ETHUSDT"
short = 2
mid = 5
long = 10

[[subscriptions]]
provider = "replay"
stream = "ethusdt"
"#,
        )
        .unwrap();

        let engine = engine();
        let replay = Arc::new(ReplayProvider::new("replay", events.path()));
        engine.engage_provider(replay.clone()).unwrap();
        engine.apply_config(&config).unwrap();
        let mut decisions = engine.take_decisions().unwrap();

        engine.turn_on().await.unwrap();
        replay.wait_until_exhausted().await;
        let report = engine.turn_off().await.unwrap();

        assert_eq!(report.processed_events, 22);
        assert_eq!(report.failed_events, 0);
        assert_eq!(report.cancelled_subscriptions, 1);
        assert_eq!(engine.statistics().window_prices("ETHUSDT").len(), 10);
        assert_eq!(
            engine.statistics().calculation_for("ETHUSDT", 10, LAST_PRICE_MEAN),
            15.5
        );

        let order = engine.cache().order(1).unwrap();
        assert_eq!(order.status, crate::types::OrderStatus::Filled);
        assert_eq!(engine.cache().order_ids_for("ETHUSDT"), vec![1]);

        let first = decisions.try_recv().unwrap();
        assert_eq!(first.side, Side::Buy);
        assert_eq!(first.strategy, "trend_follow");

        let subs = replay.subscriptions().await.unwrap();
        assert!(subs.iter().all(|s| s.is_cancelled()));
    }
}
