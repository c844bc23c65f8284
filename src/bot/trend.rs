//! Moving-average trend strategy
//!
//! Compares one calculation (by default the last-price mean) over three
//! window sizes. In `Follow` mode it buys when the averages are stacked
//! upwards (`short > mid > long`) and sells when stacked downwards. In
//! `Revert` mode the signals are swapped, buying into a falling stack.

use super::TradingStrategy;
use crate::statistics::calculations::LAST_PRICE_MEAN;
use crate::statistics::StatisticsCalculator;
use crate::types::AccountInformation;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendMode {
    #[default]
    Follow,
    Revert,
}

#[derive(Debug, Clone)]
pub struct TrendStrategy {
    pub calculation: String,
    pub short: usize,
    pub mid: usize,
    pub long: usize,
    pub mode: TrendMode,
    /// Asset the investment amount is drawn from
    pub quote_asset: String,
    /// Fraction of the free quote balance committed per decision
    pub allocation: Decimal,
}

impl Default for TrendStrategy {
    fn default() -> Self {
        Self {
            calculation: LAST_PRICE_MEAN.to_string(),
            short: 10,
            mid: 100,
            long: 1000,
            mode: TrendMode::Follow,
            quote_asset: "USDT".to_string(),
            allocation: dec!(0.1),
        }
    }
}

impl TrendStrategy {
    pub fn new(short: usize, mid: usize, long: usize) -> Self {
        Self {
            short,
            mid,
            long,
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: TrendMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_calculation(mut self, calculation: impl Into<String>) -> Self {
        self.calculation = calculation.into();
        self
    }

    pub fn with_allocation(mut self, quote_asset: impl Into<String>, allocation: Decimal) -> Self {
        self.quote_asset = quote_asset.into();
        self.allocation = allocation;
        self
    }

    fn averages(&self, stats: &StatisticsCalculator<'_>) -> (f64, f64, f64) {
        let short = stats.calculation_for(self.short, &self.calculation);
        let mid = stats.calculation_for(self.mid, &self.calculation);
        let long = stats.calculation_for(self.long, &self.calculation);
        debug!(
            symbol = stats.symbol(),
            long_mid = long - mid,
            long_short = long - short,
            mid_short = mid - short,
            "Trend averages"
        );
        (short, mid, long)
    }

    fn rising(&self, stats: &StatisticsCalculator<'_>) -> bool {
        let (short, mid, long) = self.averages(stats);
        short > mid && mid > long
    }

    fn falling(&self, stats: &StatisticsCalculator<'_>) -> bool {
        let (short, mid, long) = self.averages(stats);
        long > mid && mid > short
    }
}

impl TradingStrategy for TrendStrategy {
    fn name(&self) -> &str {
        match self.mode {
            TrendMode::Follow => "trend_follow",
            TrendMode::Revert => "trend_revert",
        }
    }

    fn should_buy(&self, stats: &StatisticsCalculator<'_>, _account: Option<&AccountInformation>) -> bool {
        match self.mode {
            TrendMode::Follow => self.rising(stats),
            TrendMode::Revert => self.falling(stats),
        }
    }

    fn should_sell(&self, stats: &StatisticsCalculator<'_>, _account: Option<&AccountInformation>) -> bool {
        match self.mode {
            TrendMode::Follow => self.falling(stats),
            TrendMode::Revert => self.rising(stats),
        }
    }

    fn investment_amount(&self, account: Option<&AccountInformation>) -> Decimal {
        account
            .map(|a| a.free(&self.quote_asset) * self.allocation)
            .unwrap_or(Decimal::ZERO)
    }
}
