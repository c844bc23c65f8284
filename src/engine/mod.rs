//! Engine lifecycle and collaborator registry
//!
//! ```text
//!  Created ──configure──▶ Configuring ──turn_on──▶ Running ──turn_off──▶ Stopped
//!
//!  Provider ─┐                    ┌▶ Cache
//!  Provider ─┼─▶ EventSender ─▶ WorkerPool ─▶ Dispatcher ┼▶ StatisticsEngine
//!            │                    └▶ TradingBot ─▶ decisions ─▶ executor ─▶ MarketClient
//!  MarketClient ─▶ account refresh ─▶ Cache
//!  Api ◀─ EngineHandle
//! ```
//!
//! Configuration calls are only accepted before `turn_on`. `turn_off`
//! cancels pending subscription calls, unsubscribes every active stream,
//! drains the worker queues and then stops the APIs and storage writer.

mod handle;


pub use handle::EngineHandle;

use crate::adt::ConcurrentMap;
use crate::bot::{Decision, TradingBot, TradingStrategy};
use crate::cache::Cache;
use crate::config::{Config, EngineSettings};
use crate::dispatcher::{Dispatcher, EventSender, WorkerPool, WorkerStatus};
use crate::error::{EngineError, Result};
use crate::provider::{Api, MarketClient, Provider, Storage};
use crate::statistics::{builtin, StatisticsEngine};
use crate::storage::{StorageRecord, StorageSink, StorageWriter};
use crate::types::{Subscription, Ticker};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Created,
    Configuring,
    Running,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Created => "created",
            EngineState::Configuring => "configuring",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Repeat the startup account refresh at this interval
    pub account_refresh: Option<Duration>,
    /// Market client that places an order for every decision
    pub execute_with: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            workers: settings.workers,
            queue_capacity: settings.queue_capacity,
            account_refresh: settings.account_refresh(),
            execute_with: settings.execute_with.clone(),
        }
    }
}

/// Summary returned by `turn_off`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub cancelled_subscriptions: usize,
    pub processed_events: u64,
    pub failed_events: u64,
    pub stored_records: usize,
}

pub struct Engine {
    config: EngineConfig,
    state: Mutex<EngineState>,
    providers: Arc<ConcurrentMap<String, Arc<dyn Provider>>>,
    market_clients: Arc<ConcurrentMap<String, Arc<dyn MarketClient>>>,
    apis: ConcurrentMap<String, Arc<dyn Api>>,
    storage: Mutex<Option<Arc<dyn Storage>>>,
    stats: Arc<StatisticsEngine>,
    cache: Arc<Cache>,
    bot: Arc<TradingBot>,
    pool: Arc<WorkerPool>,
    initial_subscriptions: Mutex<Vec<(String, String)>>,
    cancel: watch::Sender<bool>,
    // Flips once the worker queues are drained
    drained: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    storage_writer: Mutex<Option<StorageWriter>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let stats = Arc::new(StatisticsEngine::new());
        let cache = Arc::new(Cache::new());
        let bot = Arc::new(TradingBot::new(stats.clone(), cache.clone()));
        let pool = Arc::new(WorkerPool::new(config.workers, config.queue_capacity));

        Self {
            config,
            state: Mutex::new(EngineState::Created),
            providers: Arc::new(ConcurrentMap::new()),
            market_clients: Arc::new(ConcurrentMap::new()),
            apis: ConcurrentMap::new(),
            storage: Mutex::new(None),
            stats,
            cache,
            bot,
            pool,
            initial_subscriptions: Mutex::new(Vec::new()),
            cancel: watch::channel(false).0,
            drained: watch::channel(false).0,
            tasks: Mutex::new(Vec::new()),
            storage_writer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Run a configuration step. Rejected once the engine has been turned on.
    fn configure<T>(&self, operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        match *state {
            EngineState::Created | EngineState::Configuring => {
                let out = f()?;
                *state = EngineState::Configuring;
                Ok(out)
            }
            other => Err(EngineError::InvalidState {
                operation,
                state: other,
            }),
        }
    }

    pub fn engage_provider(&self, provider: Arc<dyn Provider>) -> Result<()> {
        self.configure("engage provider", || {
            let id = provider.id().to_string();
            register(&self.providers, "provider", id, provider)
        })
    }

    pub fn engage_market_client(&self, client: Arc<dyn MarketClient>) -> Result<()> {
        self.configure("engage market client", || {
            let id = client.id().to_string();
            register(&self.market_clients, "market client", id, client)
        })
    }

    pub fn engage_api(&self, api: Arc<dyn Api>) -> Result<()> {
        self.configure("engage api", || {
            let id = api.id().to_string();
            register(&self.apis, "api", id, api)
        })
    }

    pub fn engage_storage(&self, storage: Arc<dyn Storage>) -> Result<()> {
        self.configure("engage storage", || {
            let mut slot = self.storage.lock();
            if slot.is_some() {
                return Err(EngineError::DuplicateCollaborator {
                    kind: "storage",
                    id: "storage".to_string(),
                });
            }
            *slot = Some(storage);
            info!("Storage engaged");
            Ok(())
        })
    }

    pub fn add_calculation_buckets(&self, sizes: &[usize]) -> Result<()> {
        self.configure("add calculation buckets", || {
            self.stats.register_bucket_sizes(sizes)
        })
    }

    pub fn add_calculation<F>(&self, name: &str, calculation: F) -> Result<()>
    where
        F: Fn(&[Ticker]) -> f64 + Send + Sync + 'static,
    {
        self.configure("add calculation", || {
            self.stats.register_calculation(name, calculation)
        })
    }

    /// Register one of the named built-in calculations
    pub fn add_builtin_calculation(&self, name: &str) -> Result<()> {
        self.configure("add calculation", || {
            let calculation =
                builtin(name).ok_or_else(|| EngineError::UnknownCalculation(name.to_string()))?;
            self.stats.register_shared_calculation(name, calculation)
        })
    }

    pub fn add_strategy_for(&self, symbol: &str, strategy: Arc<dyn TradingStrategy>) -> Result<()> {
        self.configure("add strategy", || self.bot.add_strategy(symbol, strategy))
    }

    /// Remove a symbol's strategy. Allowed in any state.
    pub fn remove_strategy_for(&self, symbol: &str) -> bool {
        self.bot.remove_strategy(symbol)
    }

    /// Stream to subscribe on `provider_id` when the engine is turned on
    pub fn add_initial_subscription(&self, provider_id: &str, stream: &str) -> Result<()> {
        self.configure("add subscription", || {
            if !self.providers.has(&provider_id.to_string()) {
                return Err(EngineError::ProviderNotFound(provider_id.to_string()));
            }
            self.initial_subscriptions
                .lock()
                .push((provider_id.to_string(), stream.to_string()));
            Ok(())
        })
    }

    /// Apply the statistics, strategy and subscription sections of `config`.
    /// Providers named by subscriptions must already be engaged.
    pub fn apply_config(&self, config: &Config) -> Result<()> {
        config.validate()?;
        if !config.statistics.bucket_sizes.is_empty() {
            self.add_calculation_buckets(&config.statistics.bucket_sizes)?;
        }
        for name in &config.statistics.calculations {
            self.add_builtin_calculation(name)?;
        }
        for binding in &config.strategies {
            self.add_strategy_for(&binding.symbol, binding.build())?;
        }
        for sub in &config.subscriptions {
            self.add_initial_subscription(&sub.provider, &sub.stream)?;
        }
        Ok(())
    }

    pub fn provider(&self, id: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(&id.to_string())
            .ok_or_else(|| EngineError::ProviderNotFound(id.to_string()))
    }

    pub fn market_client(&self, id: &str) -> Result<Arc<dyn MarketClient>> {
        self.market_clients
            .get(&id.to_string())
            .ok_or_else(|| EngineError::MarketClientNotFound(id.to_string()))
    }

    pub fn api(&self, id: &str) -> Result<Arc<dyn Api>> {
        self.apis
            .get(&id.to_string())
            .ok_or_else(|| EngineError::ApiNotFound(id.to_string()))
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn statistics(&self) -> &Arc<StatisticsEngine> {
        &self.stats
    }

    pub fn bot(&self) -> &Arc<TradingBot> {
        &self.bot
    }

    pub fn workers(&self) -> Vec<WorkerStatus> {
        self.pool.workers()
    }

    /// Producer handle onto the event queue
    pub fn sender(&self) -> EventSender {
        self.pool.sender()
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            providers: self.providers.clone(),
            pool: self.pool.clone(),
            cache: self.cache.clone(),
            stats: self.stats.clone(),
            cancel: self.cancel.subscribe(),
        }
    }

    /// Decision stream; `None` once taken
    pub fn take_decisions(&self) -> Option<mpsc::Receiver<Decision>> {
        self.bot.take_decisions()
    }

    pub async fn subscribe(&self, provider_id: &str, stream: &str) -> Result<Subscription> {
        self.handle().subscribe(provider_id, stream).await
    }

    pub async fn unsubscribe(&self, provider_id: &str, stream: &str) -> Result<Subscription> {
        self.handle().unsubscribe(provider_id, stream).await
    }

    /// Start workers, engage providers, refresh accounts, start APIs and
    /// issue the initial subscriptions.
    pub async fn turn_on(&self) -> Result<()> {
        let executor = {
            let mut state = self.state.lock();
            if let other @ (EngineState::Running | EngineState::Stopped) = *state {
                return Err(EngineError::InvalidState {
                    operation: "turn on",
                    state: other,
                });
            }
            // Resolved before the transition so a missing client leaves the state alone
            let executor = self
                .config
                .execute_with
                .as_deref()
                .map(|id| self.market_client(id))
                .transpose()?;
            *state = EngineState::Running;
            executor
        };
        info!(workers = self.pool.size(), "Turning engine on");

        let storage = self.storage.lock().clone();
        let sink = storage.map(|storage| {
            let writer = StorageWriter::spawn(storage);
            let sink = writer.sink();
            *self.storage_writer.lock() = Some(writer);
            sink
        });

        if let Some(client) = executor {
            match self.bot.take_decisions() {
                Some(decisions) => self.tasks.lock().push(spawn_executor(
                    client,
                    decisions,
                    self.cache.clone(),
                    sink.clone(),
                    self.drained.subscribe(),
                )),
                None => warn!(
                    client = client.id(),
                    "Decision stream already taken; orders will not be placed"
                ),
            }
        }

        if self.stats.capacity() == 0 && !self.bot.symbols().is_empty() {
            error!("Strategies registered without statistics buckets; no decisions will be made");
        }

        let dispatcher = Dispatcher::new(self.cache.clone(), self.stats.clone(), self.bot.clone(), sink);
        self.pool.start(Arc::new(dispatcher))?;

        for provider in self.providers.values() {
            if let Err(e) = provider.engage(self.pool.sender()).await {
                error!(provider = provider.id(), "Failed to engage provider: {}", e);
            }
        }

        refresh_accounts(&self.market_clients, &self.cache).await;
        if let Some(interval) = self.config.account_refresh {
            self.tasks.lock().push(spawn_account_refresh(
                interval,
                self.market_clients.clone(),
                self.cache.clone(),
                self.cancel.subscribe(),
            ));
        }

        let handle = self.handle();
        for api in self.apis.values() {
            let handle = handle.clone();
            let shutdown = self.drained.subscribe();
            self.tasks.lock().push(tokio::spawn(async move {
                info!(api = api.id(), "API starting");
                if let Err(e) = api.serve(handle, shutdown).await {
                    error!(api = api.id(), "API stopped with error: {}", e);
                }
            }));
        }

        let initial = self.initial_subscriptions.lock().clone();
        for (provider_id, stream) in initial {
            if let Err(e) = handle.subscribe(&provider_id, &stream).await {
                error!(provider = %provider_id, stream = %stream, "Initial subscription failed: {}", e);
            }
        }

        info!("Engine running");
        Ok(())
    }

    /// Unsubscribe everything, drain the workers and stop the APIs.
    /// Only valid while running.
    pub async fn turn_off(&self) -> Result<ShutdownReport> {
        {
            let mut state = self.state.lock();
            if *state != EngineState::Running {
                return Err(EngineError::InvalidState {
                    operation: "turn off",
                    state: *state,
                });
            }
            *state = EngineState::Stopped;
        }
        info!("Turning engine off");

        // Abandons blocked subscribe calls and the account refresh loop
        self.cancel.send_replace(true);

        let mut report = ShutdownReport::default();
        for provider in self.providers.values() {
            report.cancelled_subscriptions += unsubscribe_all(provider.as_ref()).await;
            if let Err(e) = provider.disengage().await {
                warn!(provider = provider.id(), "Failed to disengage provider: {}", e);
            }
        }

        self.pool.stop().await;
        for worker in self.pool.workers() {
            report.processed_events += worker.processed;
            report.failed_events += worker.failed;
        }

        self.drained.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for result in futures_util::future::join_all(tasks).await {
            if let Err(e) = result {
                error!("Engine task failed: {}", e);
            }
        }

        let writer = self.storage_writer.lock().take();
        if let Some(writer) = writer {
            report.stored_records = writer.finish().await;
        }

        info!(
            cancelled = report.cancelled_subscriptions,
            processed = report.processed_events,
            failed = report.failed_events,
            stored = report.stored_records,
            "Engine stopped"
        );
        Ok(report)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn register<T: ?Sized>(
    registry: &ConcurrentMap<String, Arc<T>>,
    kind: &'static str,
    id: String,
    item: Arc<T>,
) -> Result<()> {
    if id.trim().is_empty() {
        return Err(EngineError::Config(format!("{} id must not be empty", kind)));
    }
    if !registry.upsert(id.clone(), || item, |_| {}) {
        return Err(EngineError::DuplicateCollaborator { kind, id });
    }
    info!(kind, id = %id, "Collaborator engaged");
    Ok(())
}

async fn unsubscribe_all(provider: &dyn Provider) -> usize {
    let subscriptions = match provider.subscriptions().await {
        Ok(subscriptions) => subscriptions,
        Err(e) => {
            warn!(provider = provider.id(), "Failed to list subscriptions: {}", e);
            return 0;
        }
    };

    let mut cancelled = 0;
    for subscription in subscriptions.iter().filter(|s| !s.is_cancelled()) {
        match provider.unsubscribe(&subscription.stream).await {
            Ok(_) => cancelled += 1,
            Err(e) => warn!(
                provider = provider.id(),
                stream = %subscription.stream,
                "Failed to unsubscribe: {}",
                e
            ),
        }
    }
    cancelled
}

async fn refresh_accounts(clients: &ConcurrentMap<String, Arc<dyn MarketClient>>, cache: &Cache) {
    for client in clients.values() {
        match client.account_information().await {
            Ok(account) => {
                info!(client = client.id(), balances = account.balances.len(), "Account refreshed");
                cache.update_account_information(account);
            }
            Err(e) => warn!(client = client.id(), "Account refresh failed: {}", e),
        }
    }
}

fn spawn_account_refresh(
    interval: Duration,
    clients: Arc<ConcurrentMap<String, Arc<dyn MarketClient>>>,
    cache: Arc<Cache>,
    mut cancel: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // First tick completes immediately; startup already refreshed
        timer.tick().await;
        loop {
            tokio::select! {
                _ = timer.tick() => refresh_accounts(&clients, &cache).await,
                _ = signalled(&mut cancel) => break,
            }
        }
    })
}

/// Resolves once `signal` flips to `true`. The borrowed value is released
/// before returning so callers stay `Send` across later awaits.
async fn signalled(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|flag| *flag).await;
}

/// Place an order for every decision until the workers are drained, then
/// flush the decisions they left behind.
fn spawn_executor(
    client: Arc<dyn MarketClient>,
    mut decisions: mpsc::Receiver<Decision>,
    cache: Arc<Cache>,
    sink: Option<StorageSink>,
    mut drained: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(client = client.id(), "Order executor started");
        loop {
            tokio::select! {
                decision = decisions.recv() => match decision {
                    Some(decision) => execute(client.as_ref(), &decision, &cache, sink.as_ref()).await,
                    None => break,
                },
                _ = signalled(&mut drained) => {
                    while let Ok(decision) = decisions.try_recv() {
                        execute(client.as_ref(), &decision, &cache, sink.as_ref()).await;
                    }
                    break;
                }
            }
        }
        info!(client = client.id(), "Order executor stopped");
    })
}

async fn execute(client: &dyn MarketClient, decision: &Decision, cache: &Cache, sink: Option<&StorageSink>) {
    let Some(request) = decision.to_order_request() else {
        debug!(symbol = %decision.symbol, amount = %decision.amount, "Decision without size skipped");
        return;
    };
    match client.place_order(&request).await {
        Ok(order) => {
            info!(
                client = client.id(),
                order_id = order.order_id,
                symbol = %order.symbol,
                side = ?order.side,
                "Order placed"
            );
            cache.update_order(order.clone());
            if let Some(sink) = sink {
                if let Err(e) = sink.submit(StorageRecord::Order(order)) {
                    warn!("Dropping order record: {}", e);
                }
            }
        }
        Err(e) => warn!(
            client = client.id(),
            symbol = %decision.symbol,
            "Order placement failed: {}",
            e
        ),
    }
}
