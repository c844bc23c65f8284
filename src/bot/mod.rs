//! Per-symbol strategy evaluation
//!
//! ```text
//! Worker ─ticker─▶ TradingBot ─▶ strategy(symbol)
//!                      │              ▲
//!                      │   statistics view + account snapshot
//!                      ▼
//!                  Decision ─▶ log / decision stream
//! ```

pub mod trend;


pub use trend::{TrendMode, TrendStrategy};

use crate::adt::ConcurrentMap;
use crate::cache::Cache;
use crate::error::{EngineError, Result};
use crate::provider::OrderRequest;
use crate::statistics::{StatisticsCalculator, StatisticsEngine};
use crate::types::{is_canonical_symbol, AccountInformation, Side, Ticker};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const DECISION_BUFFER: usize = 1024;

/// Pluggable buy/sell logic for one symbol.
///
/// Both predicates are evaluated on every ticker. A strategy returning
/// `true` from both on the same tick is a caller bug; the bot emits both.
pub trait TradingStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn should_buy(&self, stats: &StatisticsCalculator<'_>, account: Option<&AccountInformation>) -> bool;

    fn should_sell(&self, stats: &StatisticsCalculator<'_>, account: Option<&AccountInformation>) -> bool;

    /// Quote amount to commit on a decision
    fn investment_amount(&self, account: Option<&AccountInformation>) -> Decimal;
}

/// Trading signal produced for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: uuid::Uuid,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    /// Quote amount from the strategy's investment sizing
    pub amount: Decimal,
    pub strategy: String,
    pub worker: usize,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// Market order for the decision, sized in base units at the ticker price
    pub fn to_order_request(&self) -> Option<OrderRequest> {
        let price = Decimal::from_f64_retain(self.price)?;
        if price <= Decimal::ZERO || self.amount <= Decimal::ZERO {
            return None;
        }
        Some(OrderRequest {
            symbol: self.symbol.clone(),
            side: self.side,
            quantity: self.amount / price,
            price: None,
        })
    }
}

/// Strategy registry and evaluator
pub struct TradingBot {
    stats: Arc<StatisticsEngine>,
    cache: Arc<Cache>,
    strategies: ConcurrentMap<String, Arc<dyn TradingStrategy>>,
    decision_tx: mpsc::Sender<Decision>,
    decision_rx: Mutex<Option<mpsc::Receiver<Decision>>>,
    streaming: AtomicBool,
}

impl TradingBot {
    pub fn new(stats: Arc<StatisticsEngine>, cache: Arc<Cache>) -> Self {
        let (decision_tx, decision_rx) = mpsc::channel(DECISION_BUFFER);
        Self {
            stats,
            cache,
            strategies: ConcurrentMap::new(),
            decision_tx,
            decision_rx: Mutex::new(Some(decision_rx)),
            streaming: AtomicBool::new(false),
        }
    }

    pub fn add_strategy(&self, symbol: &str, strategy: Arc<dyn TradingStrategy>) -> Result<()> {
        if !is_canonical_symbol(symbol) {
            return Err(EngineError::Config(format!(
                "strategy symbol {:?} must be upper case",
                symbol
            )));
        }
        let name = strategy.name().to_string();
        let inserted = self
            .strategies
            .upsert(symbol.to_string(), || strategy, |_| {});
        if !inserted {
            return Err(EngineError::DuplicateStrategy(symbol.to_string()));
        }
        info!(symbol, strategy = %name, "Strategy registered");
        Ok(())
    }

    pub fn remove_strategy(&self, symbol: &str) -> bool {
        let removed = self.strategies.remove(&symbol.to_string()).is_some();
        if removed {
            info!(symbol, "Strategy removed");
        }
        removed
    }

    pub fn has_strategy(&self, symbol: &str) -> bool {
        self.strategies.has(&symbol.to_string())
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols = self.strategies.keys();
        symbols.sort();
        symbols
    }

    /// Take the decision stream. Decisions are only buffered once taken.
    pub fn take_decisions(&self) -> Option<mpsc::Receiver<Decision>> {
        let rx = self.decision_rx.lock().take();
        if rx.is_some() {
            self.streaming.store(true, Ordering::SeqCst);
        }
        rx
    }

    /// Evaluate the symbol's strategy against a freshly committed ticker
    pub fn handle_new_ticker(&self, worker: usize, ticker: &Ticker) -> Vec<Decision> {
        let Some(strategy) = self.strategies.get(&ticker.symbol) else {
            return Vec::new();
        };

        let Some(stats) = self.stats.calculator(&ticker.symbol) else {
            error!(
                symbol = %ticker.symbol,
                "No statistics tracked for symbol with a registered strategy"
            );
            return Vec::new();
        };

        let account = self.cache.account_information();
        let account = account.as_deref();

        let mut decisions = Vec::new();
        if strategy.should_buy(&stats, account) {
            decisions.push(self.decide(worker, ticker, Side::Buy, strategy.as_ref(), account));
        }
        if strategy.should_sell(&stats, account) {
            decisions.push(self.decide(worker, ticker, Side::Sell, strategy.as_ref(), account));
        }

        for decision in &decisions {
            self.emit(decision);
        }
        decisions
    }

    fn decide(
        &self,
        worker: usize,
        ticker: &Ticker,
        side: Side,
        strategy: &dyn TradingStrategy,
        account: Option<&AccountInformation>,
    ) -> Decision {
        Decision {
            id: uuid::Uuid::new_v4(),
            symbol: ticker.symbol.clone(),
            side,
            price: ticker.last_price,
            amount: strategy.investment_amount(account),
            strategy: strategy.name().to_string(),
            worker,
            timestamp: Utc::now(),
        }
    }

    fn emit(&self, decision: &Decision) {
        info!(
            symbol = %decision.symbol,
            side = ?decision.side,
            price = decision.price,
            amount = %decision.amount,
            worker = decision.worker,
            "{}: {}",
            match decision.side {
                Side::Buy => "Buy",
                Side::Sell => "Sell",
            },
            decision.symbol
        );

        if !self.streaming.load(Ordering::SeqCst) {
            return;
        }
        match self.decision_tx.try_send(decision.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(symbol = %decision.symbol, "Decision stream full, decision dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
