//! Per-event side effects

use super::EventHandler;
use crate::bot::TradingBot;
use crate::cache::Cache;
use crate::error::{EngineError, Result};
use crate::statistics::StatisticsEngine;
use crate::storage::{StorageRecord, StorageSink};
use crate::types::{MarketEvent, Ticker};
use std::sync::Arc;
use tracing::warn;

/// Applies market events to the cache, statistics and trading bot
pub struct Dispatcher {
    cache: Arc<Cache>,
    stats: Arc<StatisticsEngine>,
    bot: Arc<TradingBot>,
    storage: Option<StorageSink>,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<Cache>,
        stats: Arc<StatisticsEngine>,
        bot: Arc<TradingBot>,
        storage: Option<StorageSink>,
    ) -> Self {
        Self {
            cache,
            stats,
            bot,
            storage,
        }
    }

    fn persist(&self, record: StorageRecord) {
        if let Some(sink) = &self.storage {
            if let Err(e) = sink.submit(record) {
                warn!("Storage sink unavailable: {}", e);
            }
        }
    }
}

fn validate_ticker(ticker: &Ticker) -> Result<()> {
    if ticker.symbol.is_empty() {
        return Err(EngineError::InvalidEvent("ticker without symbol".into()));
    }
    if !ticker.last_price.is_finite() || ticker.last_price < 0.0 {
        return Err(EngineError::InvalidEvent(format!(
            "{} ticker with price {}",
            ticker.symbol, ticker.last_price
        )));
    }
    Ok(())
}

impl EventHandler for Dispatcher {
    fn handle(&self, worker: usize, event: MarketEvent) -> Result<()> {
        match event {
            MarketEvent::Ticker(ticker) => {
                validate_ticker(&ticker)?;
                self.cache.update_last_ticker(ticker.clone());
                self.stats.record(&ticker.symbol, ticker.clone());
                self.bot.handle_new_ticker(worker, &ticker);
            }
            MarketEvent::Depth(depth) => {
                self.cache.update_last_depth(depth);
            }
            MarketEvent::Order(order) => {
                self.cache.update_order(order.clone());
                self.persist(StorageRecord::Order(order));
            }
            MarketEvent::Account(account) => {
                self.cache.update_account_information(account.clone());
                self.persist(StorageRecord::Account(account));
            }
        }
        Ok(())
    }
}
