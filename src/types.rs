//! Core market data and account types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Last traded price for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last_price: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    pub fn new(symbol: impl Into<String>, last_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            last_price,
            timestamp: Utc::now(),
        }
    }
}

/// Exchange symbols are matched exactly, so strategy bindings must use the
/// upper-case form tickers arrive in.
pub fn is_canonical_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// Order book level (price + quantity)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Order book snapshot. Bids are best-first descending, asks best-first ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depth {
    pub symbol: String,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Depth {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()? - self.best_bid()?)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Order lifecycle status as reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// Exchange order. `order_id` and `symbol` never change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u64,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: OrderStatus,
}

/// Asset balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Account snapshot, always replaced as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInformation {
    #[serde(default)]
    pub balances: Vec<Balance>,
    #[serde(default = "default_can_trade")]
    pub can_trade: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_can_trade() -> bool {
    true
}

impl AccountInformation {
    pub fn balance(&self, asset: &str) -> Option<&Balance> {
        self.balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
    }

    /// Free balance for `asset`, zero when the asset is not held
    pub fn free(&self, asset: &str) -> Decimal {
        self.balance(asset).map(|b| b.free).unwrap_or(Decimal::ZERO)
    }
}

/// Subscription lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Pending,
    Active,
    Cancelled,
}

/// Market-data stream subscription held by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub stream: String,
    pub provider_id: String,
    pub state: SubscriptionState,
}

impl Subscription {
    pub fn new(stream: impl Into<String>, provider_id: impl Into<String>, state: SubscriptionState) -> Self {
        Self {
            stream: stream.into(),
            provider_id: provider_id.into(),
            state,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SubscriptionState::Active
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == SubscriptionState::Cancelled
    }
}

/// Event pushed by providers onto the engine queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    Ticker(Ticker),
    Depth(Depth),
    Order(Order),
    Account(AccountInformation),
}

impl MarketEvent {
    /// Symbol used to partition the event; account updates have none
    pub fn symbol(&self) -> Option<&str> {
        match self {
            MarketEvent::Ticker(t) => Some(&t.symbol),
            MarketEvent::Depth(d) => Some(&d.symbol),
            MarketEvent::Order(o) => Some(&o.symbol),
            MarketEvent::Account(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MarketEvent::Ticker(_) => "ticker",
            MarketEvent::Depth(_) => "depth",
            MarketEvent::Order(_) => "order",
            MarketEvent::Account(_) => "account",
        }
    }
}

impl From<Ticker> for MarketEvent {
    fn from(ticker: Ticker) -> Self {
        MarketEvent::Ticker(ticker)
    }
}

impl From<Depth> for MarketEvent {
    fn from(depth: Depth) -> Self {
        MarketEvent::Depth(depth)
    }
}
