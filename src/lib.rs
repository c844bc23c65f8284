//! Tickflow
//!
//! A real-time market-data engine: providers stream tickers and depth
//! updates into a partitioned worker pool that maintains rolling statistics
//! and a state cache, and evaluates per-symbol trading strategies.
//!
//! ## Architecture
//!
//! ```text
//! Provider(s) → EventSender → WorkerPool (hash(symbol) → worker)
//!                                  │
//!                     ┌────────────┼──────────────┐
//!                     ▼            ▼              ▼
//!                   Cache   StatisticsEngine   TradingBot → Decision
//!                     │                               ↑
//!                     └──── account / orders ─────────┘
//!
//! Engine: registry (Provider, MarketClient, Api, Storage) + lifecycle
//! ```

pub mod adt;
pub mod bot;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod provider;
pub mod statistics;
pub mod storage;
pub mod testing;
pub mod types;

pub use engine::{Engine, EngineConfig, EngineHandle, EngineState};
pub use error::{EngineError, Result};

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod integration_tests;
