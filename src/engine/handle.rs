//! Transport-independent control surface handed to APIs

use crate::adt::ConcurrentMap;
use crate::cache::Cache;
use crate::dispatcher::{WorkerPool, WorkerStatus};
use crate::error::{EngineError, Result};
use crate::provider::Provider;
use crate::statistics::StatisticsEngine;
use crate::types::Subscription;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Cheap, cloneable view onto a running engine
#[derive(Clone)]
pub struct EngineHandle {
    pub(super) providers: Arc<ConcurrentMap<String, Arc<dyn Provider>>>,
    pub(super) pool: Arc<WorkerPool>,
    pub(super) cache: Arc<Cache>,
    pub(super) stats: Arc<StatisticsEngine>,
    pub(super) cancel: watch::Receiver<bool>,
}

impl EngineHandle {
    pub fn provider(&self, id: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(&id.to_string())
            .ok_or_else(|| EngineError::ProviderNotFound(id.to_string()))
    }

    /// Registered provider ids, sorted
    pub fn providers(&self) -> Vec<String> {
        let mut ids = self.providers.keys();
        ids.sort();
        ids
    }

    pub fn workers(&self) -> Vec<WorkerStatus> {
        self.pool.workers()
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn statistics(&self) -> &Arc<StatisticsEngine> {
        &self.stats
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Subscribe `stream` on `provider_id`. Abandoned with `Cancelled` if
    /// the engine shuts down first.
    pub async fn subscribe(&self, provider_id: &str, stream: &str) -> Result<Subscription> {
        let provider = self.provider(provider_id)?;
        debug!(provider = provider_id, stream, "Subscribing");
        self.cancellable(provider.subscribe(stream)).await
    }

    pub async fn unsubscribe(&self, provider_id: &str, stream: &str) -> Result<Subscription> {
        let provider = self.provider(provider_id)?;
        debug!(provider = provider_id, stream, "Unsubscribing");
        self.cancellable(provider.unsubscribe(stream)).await
    }

    pub async fn subscriptions(&self, provider_id: &str) -> Result<Vec<Subscription>> {
        let provider = self.provider(provider_id)?;
        provider.subscriptions().await
    }

    async fn cancellable<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let mut cancel = self.cancel.clone();
        if *cancel.borrow_and_update() {
            return Err(EngineError::Cancelled);
        }
        tokio::select! {
            result = operation => result,
            _ = super::signalled(&mut cancel) => Err(EngineError::Cancelled),
        }
    }
}
