//! File-backed market-data provider
//!
//! Streams JSON-lines `MarketEvent`s from a file. Each subscribed stream
//! gets its own reader task that forwards the events whose symbol matches
//! the stream name (case-insensitive). The `account` stream carries the
//! events that have no symbol.

use super::Provider;
use crate::adt::ConcurrentMap;
use crate::dispatcher::EventSender;
use crate::error::{EngineError, Result};
use crate::types::{MarketEvent, Subscription, SubscriptionState};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Stream name carrying account updates
pub const ACCOUNT_STREAM: &str = "account";

struct ReplayStream {
    subscription: Subscription,
    task: Option<JoinHandle<()>>,
}

/// Decrements the running-replay counter when a reader task ends or is aborted
struct Replaying(Arc<watch::Sender<usize>>);

impl Drop for Replaying {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

pub struct ReplayProvider {
    id: String,
    path: PathBuf,
    pace: Option<Duration>,
    sink: Mutex<Option<EventSender>>,
    streams: ConcurrentMap<String, ReplayStream>,
    replaying: Arc<watch::Sender<usize>>,
}

impl ReplayProvider {
    pub fn new(id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            id: id.into(),
            path: path.as_ref().to_path_buf(),
            pace: None,
            sink: Mutex::new(None),
            streams: ConcurrentMap::new(),
            replaying: Arc::new(watch::channel(0).0),
        }
    }

    /// Sleep between forwarded events
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Resolve once every running reader has reached the end of the file
    pub async fn wait_until_exhausted(&self) {
        let mut rx = self.replaying.subscribe();
        let _ = rx.wait_for(|running| *running == 0).await;
    }

    pub fn running(&self) -> usize {
        *self.replaying.borrow()
    }

    fn spawn_reader(&self, stream: String, sink: EventSender) -> JoinHandle<()> {
        self.replaying.send_modify(|n| *n += 1);
        let guard = Replaying(self.replaying.clone());
        let path = self.path.clone();
        let provider = self.id.clone();
        let pace = self.pace;

        tokio::spawn(async move {
            let _guard = guard;
            match replay(&path, &stream, &sink, pace).await {
                Ok(forwarded) => {
                    info!(provider = %provider, stream = %stream, forwarded, "Replay finished")
                }
                Err(e) => warn!(provider = %provider, stream = %stream, "Replay stopped: {}", e),
            }
        })
    }
}

fn stream_key(stream: &str) -> String {
    stream.trim().to_ascii_lowercase()
}

fn matches_stream(event: &MarketEvent, stream: &str) -> bool {
    match event.symbol() {
        Some(symbol) => symbol.eq_ignore_ascii_case(stream),
        None => stream.eq_ignore_ascii_case(ACCOUNT_STREAM),
    }
}

async fn replay(
    path: &Path,
    stream: &str,
    sink: &EventSender,
    pace: Option<Duration>,
) -> Result<usize> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut forwarded = 0usize;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: MarketEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, "Skipping undecodable event: {}", e);
                continue;
            }
        };
        if !matches_stream(&event, stream) {
            continue;
        }

        sink.send(event).await?;
        forwarded += 1;

        if let Some(pace) = pace {
            tokio::time::sleep(pace).await;
        }
    }

    debug!(stream, lines = line_no, "Reached end of replay file");
    Ok(forwarded)
}

#[async_trait]
impl Provider for ReplayProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn engage(&self, sink: EventSender) -> Result<()> {
        *self.sink.lock() = Some(sink);
        info!(provider = %self.id, path = %self.path.display(), "Replay provider engaged");
        Ok(())
    }

    async fn subscribe(&self, stream: &str) -> Result<Subscription> {
        let key = stream_key(stream);
        if key.is_empty() {
            return Err(EngineError::Provider("empty stream name".into()));
        }
        let sink = self
            .sink
            .lock()
            .clone()
            .ok_or_else(|| EngineError::Provider(format!("{} is not engaged", self.id)))?;

        let subscription = self.streams.alter(
            key,
            || ReplayStream {
                subscription: Subscription::new(stream, &self.id, SubscriptionState::Pending),
                task: None,
            },
            |entry| {
                if !entry.subscription.is_active() {
                    entry.task = Some(self.spawn_reader(stream.to_string(), sink));
                    entry.subscription.state = SubscriptionState::Active;
                }
                entry.subscription.clone()
            },
        );

        info!(provider = %self.id, stream, "Subscribed");
        Ok(subscription)
    }

    async fn unsubscribe(&self, stream: &str) -> Result<Subscription> {
        let subscription = self
            .streams
            .update(&stream_key(stream), |entry| {
                if let Some(task) = entry.task.take() {
                    task.abort();
                }
                entry.subscription.state = SubscriptionState::Cancelled;
                entry.subscription.clone()
            })
            .ok_or_else(|| {
                EngineError::Provider(format!("{} is not subscribed to {}", self.id, stream))
            })?;

        info!(provider = %self.id, stream, "Unsubscribed");
        Ok(subscription)
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = self.streams.collect_with(|_, entry| entry.subscription.clone());
        subscriptions.sort_by(|a, b| a.stream.cmp(&b.stream));
        Ok(subscriptions)
    }

    async fn disengage(&self) -> Result<()> {
        self.sink.lock().take();
        self.streams.collect_with(|_, entry| {
            if let Some(task) = &entry.task {
                task.abort();
            }
        });
        info!(provider = %self.id, "Replay provider disengaged");
        Ok(())
    }
}
