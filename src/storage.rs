//! Write-behind persistence
//!
//! Workers hand records to a `StorageSink` without waiting; one background
//! task writes them to the engaged `Storage`. Live processing never depends
//! on a write succeeding.

use crate::error::{EngineError, Result};
use crate::provider::Storage;
use crate::types::{AccountInformation, Order};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum StorageRecord {
    Order(Order),
    Account(AccountInformation),
}

/// Non-blocking handle onto the storage queue
#[derive(Clone)]
pub struct StorageSink {
    tx: mpsc::UnboundedSender<StorageRecord>,
}

impl StorageSink {
    pub fn submit(&self, record: StorageRecord) -> Result<()> {
        self.tx.send(record).map_err(|_| EngineError::QueueClosed)
    }
}

/// Owns the writer task. Finishing waits until every queued record is written.
pub struct StorageWriter {
    sink: StorageSink,
    handle: JoinHandle<usize>,
}

impl StorageWriter {
    pub fn spawn(storage: Arc<dyn Storage>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StorageRecord>();

        let handle = tokio::spawn(async move {
            let mut written = 0usize;
            while let Some(record) = rx.recv().await {
                let result = match &record {
                    StorageRecord::Order(order) => storage.store_order(order).await,
                    StorageRecord::Account(account) => {
                        storage.store_account_information(account).await
                    }
                };
                match result {
                    Ok(()) => written += 1,
                    Err(e) => warn!("Failed to persist {:?}: {}", record, e),
                }
            }
            written
        });

        Self {
            sink: StorageSink { tx },
            handle,
        }
    }

    pub fn sink(&self) -> StorageSink {
        self.sink.clone()
    }

    /// Close the queue and wait for the writer to drain it.
    ///
    /// Every other `StorageSink` clone must already be dropped, otherwise
    /// this waits for them.
    pub async fn finish(self) -> usize {
        drop(self.sink);
        match self.handle.await {
            Ok(written) => {
                debug!(written, "Storage writer finished");
                written
            }
            Err(e) => {
                warn!("Storage writer task failed: {}", e);
                0
            }
        }
    }
}
