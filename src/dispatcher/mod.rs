//! Worker pool draining the market event queue
//!
//! Each worker owns one bounded queue. Events are routed to a queue by a
//! hash of their symbol, so every symbol is handled by exactly one worker
//! in enqueue order while different symbols run in parallel.

mod handler;


pub use handler::Dispatcher;

use crate::adt::ConcurrentMap;
use crate::error::{EngineError, Result};
use crate::types::MarketEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Per-event side effects applied by a worker
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, worker: usize, event: MarketEvent) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Pending,
    Idle,
    Busy,
    Stopped,
}

/// Introspection snapshot of one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: usize,
    pub state: WorkerState,
    pub processed: u64,
    pub failed: u64,
    pub last_event_kind: Option<String>,
    pub last_symbol: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl WorkerStatus {
    fn new(id: usize) -> Self {
        Self {
            id,
            state: WorkerState::Pending,
            processed: 0,
            failed: 0,
            last_event_kind: None,
            last_symbol: None,
            last_event_at: None,
        }
    }
}

/// Worker index for a symbol. Events without a symbol go to worker 0.
pub fn partition(symbol: Option<&str>, workers: usize) -> usize {
    match symbol {
        Some(symbol) if workers > 1 => {
            let mut hasher = DefaultHasher::new();
            symbol.hash(&mut hasher);
            (hasher.finish() % workers as u64) as usize
        }
        _ => 0,
    }
}

/// Producer handle onto the worker queues, cloned into every provider
#[derive(Clone)]
pub struct EventSender {
    queues: Arc<Vec<mpsc::Sender<MarketEvent>>>,
    accepting: Arc<AtomicBool>,
}

impl EventSender {
    /// Enqueue an event, waiting while the target queue is full
    pub async fn send(&self, event: MarketEvent) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(EngineError::QueueClosed);
        }
        let queue = &self.queues[partition(event.symbol(), self.queues.len())];
        queue.send(event).await.map_err(|_| EngineError::QueueClosed)
    }

    /// Enqueue without waiting
    pub fn try_send(&self, event: MarketEvent) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(EngineError::QueueClosed);
        }
        let queue = &self.queues[partition(event.symbol(), self.queues.len())];
        queue.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EngineError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EngineError::QueueClosed,
        })
    }

    pub fn is_closed(&self) -> bool {
        !self.accepting.load(Ordering::SeqCst)
    }
}

/// Fixed-size pool of workers
pub struct WorkerPool {
    queues: Arc<Vec<mpsc::Sender<MarketEvent>>>,
    receivers: Mutex<Vec<mpsc::Receiver<MarketEvent>>>,
    statuses: Arc<ConcurrentMap<usize, WorkerStatus>>,
    accepting: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..workers)
            .map(|_| mpsc::channel::<MarketEvent>(queue_capacity.max(1)))
            .unzip();

        let statuses = ConcurrentMap::new();
        for id in 0..workers {
            statuses.put(id, WorkerStatus::new(id));
        }

        Self {
            queues: Arc::new(senders),
            receivers: Mutex::new(receivers),
            statuses: Arc::new(statuses),
            accepting: Arc::new(AtomicBool::new(true)),
            shutdown: watch::channel(false).0,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.queues.len()
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            queues: self.queues.clone(),
            accepting: self.accepting.clone(),
        }
    }

    /// Spawn one task per queue. A pool can only be started once.
    pub fn start(&self, handler: Arc<dyn EventHandler>) -> Result<()> {
        let receivers = std::mem::take(&mut *self.receivers.lock());
        if receivers.is_empty() {
            return Err(EngineError::Internal("worker pool already started".into()));
        }

        let mut handles = self.handles.lock();
        for (id, rx) in receivers.into_iter().enumerate() {
            self.statuses.update(&id, |s| s.state = WorkerState::Idle);
            handles.push(tokio::spawn(run_worker(
                id,
                rx,
                handler.clone(),
                self.statuses.clone(),
                self.shutdown.subscribe(),
            )));
        }
        info!(workers = handles.len(), "Worker pool started");
        Ok(())
    }

    /// Stop accepting events, let every worker drain its queue, then wait for them.
    pub async fn stop(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);

        let handles = std::mem::take(&mut *self.handles.lock());
        for result in futures_util::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }
        info!("Worker pool stopped");
    }

    /// Worker snapshots ordered by id
    pub fn workers(&self) -> Vec<WorkerStatus> {
        let mut workers = self.statuses.values();
        workers.sort_by_key(|w| w.id);
        workers
    }

    pub fn statuses(&self) -> Arc<ConcurrentMap<usize, WorkerStatus>> {
        self.statuses.clone()
    }
}

async fn run_worker(
    id: usize,
    mut rx: mpsc::Receiver<MarketEvent>,
    handler: Arc<dyn EventHandler>,
    statuses: Arc<ConcurrentMap<usize, WorkerStatus>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker = id, "Worker started");

    if !*shutdown.borrow_and_update() {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => process(id, event, handler.as_ref(), &statuses),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
    }

    // Drain whatever was enqueued before the queue closed
    rx.close();
    let mut drained = 0usize;
    while let Some(event) = rx.recv().await {
        process(id, event, handler.as_ref(), &statuses);
        drained += 1;
    }

    statuses.update(&id, |s| s.state = WorkerState::Stopped);
    debug!(worker = id, drained, "Worker stopped");
}

fn process(
    id: usize,
    event: MarketEvent,
    handler: &dyn EventHandler,
    statuses: &ConcurrentMap<usize, WorkerStatus>,
) {
    let kind = event.kind();
    let symbol = event.symbol().map(str::to_string);
    statuses.update(&id, |s| s.state = WorkerState::Busy);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(id, event)));
    let failed = match outcome {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            warn!(worker = id, kind, symbol = ?symbol, "Event dropped: {}", e);
            true
        }
        Err(payload) => {
            error!(
                worker = id,
                kind,
                symbol = ?symbol,
                "Event handler panicked: {}",
                panic_message(payload.as_ref())
            );
            true
        }
    };

    statuses.update(&id, |s| {
        s.state = WorkerState::Idle;
        s.processed += 1;
        if failed {
            s.failed += 1;
        }
        s.last_event_kind = Some(kind.to_string());
        s.last_symbol = symbol;
        s.last_event_at = Some(Utc::now());
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
