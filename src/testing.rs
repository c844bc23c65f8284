//! In-process doubles for the collaborator traits
//!
//! Used by the unit and integration tests, and handy for wiring an engine
//! without an exchange connection.

use crate::adt::ConcurrentMap;
use crate::dispatcher::{EventHandler, EventSender};
use crate::engine::EngineHandle;
use crate::error::{EngineError, Result};
use crate::provider::{Api, MarketClient, OrderRequest, Provider, Storage};
use crate::types::{
    AccountInformation, Depth, MarketEvent, Order, OrderStatus, PriceLevel, Subscription,
    SubscriptionState, Ticker,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::watch;

pub fn ticker(symbol: &str, price: f64) -> MarketEvent {
    MarketEvent::Ticker(Ticker::new(symbol, price))
}

/// One-level book around `bid` / `ask`
pub fn depth(symbol: &str, bid: f64, ask: f64) -> MarketEvent {
    MarketEvent::Depth(Depth {
        symbol: symbol.to_string(),
        bids: vec![PriceLevel { price: bid, quantity: 1.0 }],
        asks: vec![PriceLevel { price: ask, quantity: 1.0 }],
        timestamp: Utc::now(),
    })
}

/// Event handler recording everything it is handed, with the worker id
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<(usize, MarketEvent)>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(usize, MarketEvent)> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventHandler for EventRecorder {
    fn handle(&self, worker: usize, event: MarketEvent) -> Result<()> {
        self.events.lock().push((worker, event));
        Ok(())
    }
}

/// Provider that publishes whatever the test hands it
pub struct StubProvider {
    id: String,
    sink: Mutex<Option<EventSender>>,
    subscriptions: ConcurrentMap<String, Subscription>,
    /// `subscribe` never resolves; exercises cancellation
    hang: bool,
    disengaged: AtomicBool,
}

impl StubProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            sink: Mutex::new(None),
            subscriptions: ConcurrentMap::new(),
            hang: false,
            disengaged: AtomicBool::new(false),
        }
    }

    pub fn hanging(id: &str) -> Self {
        Self {
            hang: true,
            ..Self::new(id)
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub fn is_disengaged(&self) -> bool {
        self.disengaged.load(Ordering::SeqCst)
    }

    /// Push an event onto the engine queue
    pub async fn publish(&self, event: MarketEvent) -> Result<()> {
        let sink = self
            .sink
            .lock()
            .clone()
            .ok_or_else(|| EngineError::Provider(format!("{} is not engaged", self.id)))?;
        sink.send(event).await
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn engage(&self, sink: EventSender) -> Result<()> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn subscribe(&self, stream: &str) -> Result<Subscription> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        let subscription = Subscription::new(stream, &self.id, SubscriptionState::Active);
        self.subscriptions.put(stream.to_string(), subscription.clone());
        Ok(subscription)
    }

    async fn unsubscribe(&self, stream: &str) -> Result<Subscription> {
        self.subscriptions
            .update(&stream.to_string(), |s| {
                s.state = SubscriptionState::Cancelled;
                s.clone()
            })
            .ok_or_else(|| EngineError::Provider(format!("unknown stream {}", stream)))
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = self.subscriptions.values();
        subscriptions.sort_by(|a, b| a.stream.cmp(&b.stream));
        Ok(subscriptions)
    }

    async fn disengage(&self) -> Result<()> {
        self.sink.lock().take();
        self.disengaged.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Market client serving a fixed account and filling every order
pub struct StubMarketClient {
    id: String,
    account: Mutex<AccountInformation>,
    next_order_id: AtomicU64,
    account_calls: AtomicUsize,
    fail: bool,
}

impl StubMarketClient {
    pub fn new(id: &str, account: AccountInformation) -> Self {
        Self {
            id: id.to_string(),
            account: Mutex::new(account),
            next_order_id: AtomicU64::new(1),
            account_calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Client whose every call fails
    pub fn failing(id: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(id, empty_account())
        }
    }

    pub fn set_account(&self, account: AccountInformation) {
        *self.account.lock() = account;
    }

    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }
}

pub fn empty_account() -> AccountInformation {
    AccountInformation {
        balances: Vec::new(),
        can_trade: true,
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl MarketClient for StubMarketClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn account_information(&self) -> Result<AccountInformation> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EngineError::MarketClient("account endpoint unavailable".into()));
        }
        Ok(self.account.lock().clone())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        if self.fail {
            return Err(EngineError::MarketClient("order endpoint unavailable".into()));
        }
        Ok(Order {
            order_id: self.next_order_id.fetch_add(1, Ordering::SeqCst),
            symbol: request.symbol.clone(),
            side: request.side,
            price: request.price.unwrap_or(Decimal::ZERO),
            quantity: request.quantity,
            status: OrderStatus::Filled,
        })
    }
}

/// Storage keeping every record in memory
#[derive(Default)]
pub struct MemoryStorage {
    orders: Mutex<Vec<Order>>,
    accounts: Mutex<Vec<AccountInformation>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders.lock().clone()
    }

    pub fn accounts(&self) -> Vec<AccountInformation> {
        self.accounts.lock().clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store_order(&self, order: &Order) -> Result<()> {
        self.orders.lock().push(order.clone());
        Ok(())
    }

    async fn store_account_information(&self, account: &AccountInformation) -> Result<()> {
        self.accounts.lock().push(account.clone());
        Ok(())
    }
}

/// API that keeps the handle it was served with until shut down
#[derive(Default)]
pub struct StubApi {
    id: String,
    handle: Mutex<Option<EngineHandle>>,
    stopped: AtomicBool,
}

impl StubApi {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn handle(&self) -> Option<EngineHandle> {
        self.handle.lock().clone()
    }

    pub fn is_serving(&self) -> bool {
        self.handle.lock().is_some() && !self.is_stopped()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Api for StubApi {
    fn id(&self) -> &str {
        &self.id
    }

    async fn serve(&self, engine: EngineHandle, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        *self.handle.lock() = Some(engine);
        let _ = shutdown.wait_for(|stop| *stop).await;
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
