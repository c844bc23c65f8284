//! Collaborator capability sets
//!
//! The engine holds every collaborator behind one of these traits and never
//! by concrete type. Exchange-specific implementations live outside the
//! crate; `replay` is the in-process provider used for offline runs.

pub mod replay;

#[cfg(test)]
mod replay_tests;

pub use replay::ReplayProvider;

use crate::dispatcher::EventSender;
use crate::engine::EngineHandle;
use crate::error::Result;
use crate::types::{AccountInformation, Order, Side, Subscription};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Market-data source pushing decoded events onto the engine queue
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    /// Receive the queue to publish events to. Called once when the engine starts.
    async fn engage(&self, sink: EventSender) -> Result<()>;

    async fn subscribe(&self, stream: &str) -> Result<Subscription>;

    async fn unsubscribe(&self, stream: &str) -> Result<Subscription>;

    async fn subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Release connections. Called after every subscription was cancelled.
    async fn disengage(&self) -> Result<()> {
        Ok(())
    }
}

/// Order placement request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    /// Limit price; market order when absent
    pub price: Option<Decimal>,
}

/// Exchange trading operations
#[async_trait]
pub trait MarketClient: Send + Sync {
    fn id(&self) -> &str;

    async fn account_information(&self) -> Result<AccountInformation>;

    async fn place_order(&self, request: &OrderRequest) -> Result<Order>;
}

/// Control-plane surface. `serve` runs until `shutdown` flips to `true`.
#[async_trait]
pub trait Api: Send + Sync {
    fn id(&self) -> &str;

    async fn serve(&self, engine: EngineHandle, shutdown: watch::Receiver<bool>) -> Result<()>;
}

/// Durable sink for orders and account history
#[async_trait]
pub trait Storage: Send + Sync {
    async fn store_order(&self, order: &Order) -> Result<()>;

    async fn store_account_information(&self, account: &AccountInformation) -> Result<()>;
}
