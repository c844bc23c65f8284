//! Rolling-window statistics
//!
//! Every symbol gets one bounded window buffer sized to the largest
//! registered bucket. Calculations are registered by name and evaluated on
//! demand over the most recent `bucket` entries; nothing is cached.

pub mod calculations;

#[cfg(test)]
mod tests;

use crate::adt::ConcurrentMap;
use crate::error::{EngineError, Result};
use crate::types::Ticker;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub use calculations::{builtin, BUILTIN_CALCULATIONS};

/// Pure function from an ordered window (oldest first) to a value
pub type Calculation = Arc<dyn Fn(&[Ticker]) -> f64 + Send + Sync>;

/// Value returned when a symbol has no history or a calculation is unknown
pub const EMPTY_CALCULATION: f64 = 0.0;

/// Registry of bucket sizes and calculations plus every symbol's window
pub struct StatisticsEngine {
    buckets: ConcurrentMap<usize, ()>,
    capacity: AtomicUsize,
    calculations: ConcurrentMap<String, Calculation>,
    windows: ConcurrentMap<String, VecDeque<Ticker>>,
}

impl StatisticsEngine {
    pub fn new() -> Self {
        Self {
            buckets: ConcurrentMap::new(),
            capacity: AtomicUsize::new(0),
            calculations: ConcurrentMap::new(),
            windows: ConcurrentMap::new(),
        }
    }

    /// Register window sizes. The buffer capacity becomes the largest size seen.
    pub fn register_bucket_sizes(&self, sizes: &[usize]) -> Result<()> {
        if let Some(&bad) = sizes.iter().find(|&&s| s == 0) {
            return Err(EngineError::InvalidBucketSize(bad));
        }
        for &size in sizes {
            self.buckets.put(size, ());
            self.capacity.fetch_max(size, Ordering::SeqCst);
        }
        info!(
            sizes = ?sizes,
            capacity = self.capacity(),
            "Registered statistics buckets"
        );
        Ok(())
    }

    /// Register a named calculation. Names are unique.
    pub fn register_calculation<F>(&self, name: &str, calculation: F) -> Result<()>
    where
        F: Fn(&[Ticker]) -> f64 + Send + Sync + 'static,
    {
        self.register_shared_calculation(name, Arc::new(calculation))
    }

    pub fn register_shared_calculation(&self, name: &str, calculation: Calculation) -> Result<()> {
        if name.trim().is_empty() {
            return Err(EngineError::Config("calculation name must not be empty".into()));
        }
        let inserted = self
            .calculations
            .upsert(name.to_string(), || calculation, |_| {});
        if !inserted {
            return Err(EngineError::Config(format!(
                "calculation {} registered twice",
                name
            )));
        }
        info!(name, "Registered calculation");
        Ok(())
    }

    /// Window capacity shared by every symbol
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    pub fn bucket_sizes(&self) -> Vec<usize> {
        let mut sizes = self.buckets.keys();
        sizes.sort_unstable();
        sizes
    }

    pub fn has_bucket(&self, size: usize) -> bool {
        self.buckets.has(&size)
    }

    pub fn has_calculation(&self, name: &str) -> bool {
        self.calculations.has(&name.to_string())
    }

    /// Append a ticker to its symbol's window, evicting the oldest entries
    /// beyond capacity. Without registered buckets nothing is tracked.
    pub fn record(&self, symbol: &str, ticker: Ticker) {
        let capacity = self.capacity();
        if capacity == 0 {
            debug!(symbol, "No bucket sizes registered, ticker not recorded");
            return;
        }

        self.windows.alter(
            symbol.to_string(),
            || VecDeque::with_capacity(capacity),
            |window| {
                window.push_back(ticker);
                while window.len() > capacity {
                    window.pop_front();
                }
            },
        );
    }

    /// Per-symbol view, present once the symbol has recorded history
    pub fn calculator(&self, symbol: &str) -> Option<StatisticsCalculator<'_>> {
        if self.windows.has(&symbol.to_string()) {
            Some(StatisticsCalculator {
                engine: self,
                symbol: symbol.to_string(),
            })
        } else {
            None
        }
    }

    /// Evaluate `name` over the last `min(bucket_size, len)` tickers of `symbol`.
    ///
    /// Returns [`EMPTY_CALCULATION`] when the symbol has no history or the
    /// calculation is not registered.
    pub fn calculation_for(&self, symbol: &str, bucket_size: usize, name: &str) -> f64 {
        let Some(calculation) = self.calculations.get(&name.to_string()) else {
            debug!(name, "Calculation not registered");
            return EMPTY_CALCULATION;
        };

        // Copy the committed tail out so the calculation runs without the lock
        let window = self.windows.with(&symbol.to_string(), |window| {
            let take = bucket_size.min(window.len());
            window
                .iter()
                .skip(window.len() - take)
                .cloned()
                .collect::<Vec<_>>()
        });

        match window {
            Some(window) if !window.is_empty() => calculation(&window),
            _ => EMPTY_CALCULATION,
        }
    }

    pub fn window_len(&self, symbol: &str) -> usize {
        self.windows
            .with(&symbol.to_string(), |w| w.len())
            .unwrap_or(0)
    }

    /// Prices currently held for `symbol`, oldest first
    pub fn window_prices(&self, symbol: &str) -> Vec<f64> {
        self.windows
            .with(&symbol.to_string(), |w| w.iter().map(|t| t.last_price).collect())
            .unwrap_or_default()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.windows.keys()
    }
}

impl Default for StatisticsEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics view bound to one symbol, handed to strategies
pub struct StatisticsCalculator<'a> {
    engine: &'a StatisticsEngine,
    symbol: String,
}

impl<'a> StatisticsCalculator<'a> {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn calculation_for(&self, bucket_size: usize, name: &str) -> f64 {
        self.engine.calculation_for(&self.symbol, bucket_size, name)
    }

    pub fn len(&self) -> usize {
        self.engine.window_len(&self.symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
