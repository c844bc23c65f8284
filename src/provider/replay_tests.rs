//! Tests for the replay provider

#[cfg(test)]
mod tests {
    use super::super::replay::*;
    use super::super::Provider;
    use crate::dispatcher::WorkerPool;
    use crate::testing::EventRecorder;
    use crate::types::{MarketEvent, SubscriptionState};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn replay_file(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn sample() -> NamedTempFile {
        replay_file(&[
            "# recorded feed",
            r#"{"type":"ticker","symbol":"ETHUSDT","last_price":1.0}"#,
            r#"{"type":"ticker","symbol":"BTCUSDT","last_price":50.0}"#,
            "not json at all",
            r#"{"type":"ticker","symbol":"ethusdt","last_price":2.0}"#,
            "",
            r#"{"type":"account","balances":[]}"#,
            r#"{"type":"ticker","symbol":"ETHUSDT","last_price":3.0}"#,
        ])
    }

    fn prices(recorder: &EventRecorder) -> Vec<f64> {
        recorder
            .events()
            .into_iter()
            .filter_map(|(_, e)| match e {
                MarketEvent::Ticker(t) => Some(t.last_price),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_subscribe_requires_engage() {
        let file = sample();
        let provider = ReplayProvider::new("replay", file.path());
        assert!(provider.subscribe("ETHUSDT").await.is_err());
    }

    #[tokio::test]
    async fn test_replays_matching_symbol_in_order() {
        let file = sample();
        let pool = WorkerPool::new(2, 64);
        let recorder = Arc::new(EventRecorder::new());
        pool.start(recorder.clone()).unwrap();

        let provider = ReplayProvider::new("replay", file.path());
        provider.engage(pool.sender()).await.unwrap();
        let subscription = provider.subscribe("EthUsdt").await.unwrap();
        assert_eq!(subscription.state, SubscriptionState::Active);
        assert_eq!(subscription.provider_id, "replay");

        provider.wait_until_exhausted().await;
        pool.stop().await;

        assert_eq!(prices(&recorder), vec![1.0, 2.0, 3.0]);
        assert_eq!(provider.running(), 0);
    }

    #[tokio::test]
    async fn test_account_stream_carries_symbolless_events() {
        let file = sample();
        let pool = WorkerPool::new(1, 64);
        let recorder = Arc::new(EventRecorder::new());
        pool.start(recorder.clone()).unwrap();

        let provider = ReplayProvider::new("replay", file.path());
        provider.engage(pool.sender()).await.unwrap();
        provider.subscribe(ACCOUNT_STREAM).await.unwrap();
        provider.wait_until_exhausted().await;
        pool.stop().await;

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, MarketEvent::Account(_)));
    }

    #[tokio::test]
    async fn test_resubscribe_while_active_is_idempotent() {
        let file = sample();
        let pool = WorkerPool::new(1, 64);
        let recorder = Arc::new(EventRecorder::new());
        pool.start(recorder.clone()).unwrap();

        let provider = ReplayProvider::new("replay", file.path());
        provider.engage(pool.sender()).await.unwrap();
        provider.subscribe("BTCUSDT").await.unwrap();
        provider.subscribe("btcusdt").await.unwrap();
        provider.wait_until_exhausted().await;
        pool.stop().await;

        assert_eq!(prices(&recorder), vec![50.0]);
        assert_eq!(provider.subscriptions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_cancels() {
        let file = sample();
        let pool = WorkerPool::new(1, 64);
        let provider = ReplayProvider::new("replay", file.path())
            .with_pace(std::time::Duration::from_secs(60));
        provider.engage(pool.sender()).await.unwrap();

        provider.subscribe("ETHUSDT").await.unwrap();
        provider.subscribe("BTCUSDT").await.unwrap();
        let cancelled = provider.unsubscribe("ETHUSDT").await.unwrap();
        assert_eq!(cancelled.state, SubscriptionState::Cancelled);

        let listed = provider.subscriptions().await.unwrap();
        let states: Vec<(String, SubscriptionState)> =
            listed.into_iter().map(|s| (s.stream, s.state)).collect();
        assert_eq!(
            states,
            vec![
                ("BTCUSDT".to_string(), SubscriptionState::Active),
                ("ETHUSDT".to_string(), SubscriptionState::Cancelled),
            ]
        );

        assert!(provider.unsubscribe("SOLUSDT").await.is_err());

        provider.unsubscribe("BTCUSDT").await.unwrap();
        provider.wait_until_exhausted().await;
        assert_eq!(provider.running(), 0);
        provider.disengage().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_ends_replay() {
        let pool = WorkerPool::new(1, 4);
        let provider = ReplayProvider::new("replay", "/nonexistent/events.jsonl");
        provider.engage(pool.sender()).await.unwrap();
        provider.subscribe("ETHUSDT").await.unwrap();
        provider.wait_until_exhausted().await;
        assert_eq!(provider.running(), 0);
    }
}
