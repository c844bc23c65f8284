//! Built-in calculations over last prices

use super::Calculation;
use crate::types::Ticker;
use std::sync::Arc;

pub const LAST_PRICE_MEAN: &str = "last_price_mean";
pub const LAST_PRICE_STD_DEV: &str = "last_price_std_dev";
pub const LAST_PRICE_MIN: &str = "last_price_min";
pub const LAST_PRICE_MAX: &str = "last_price_max";

pub const BUILTIN_CALCULATIONS: [&str; 4] =
    [LAST_PRICE_MEAN, LAST_PRICE_STD_DEV, LAST_PRICE_MIN, LAST_PRICE_MAX];

/// Resolve a built-in calculation by name
pub fn builtin(name: &str) -> Option<Calculation> {
    let calculation: Calculation = match name {
        LAST_PRICE_MEAN => Arc::new(last_price_mean),
        LAST_PRICE_STD_DEV => Arc::new(last_price_std_dev),
        LAST_PRICE_MIN => Arc::new(last_price_min),
        LAST_PRICE_MAX => Arc::new(last_price_max),
        _ => return None,
    };
    Some(calculation)
}

pub fn last_price_mean(tickers: &[Ticker]) -> f64 {
    mean(tickers.iter().map(|t| t.last_price))
}

/// Sample standard deviation (n - 1 denominator), zero below two points
pub fn last_price_std_dev(tickers: &[Ticker]) -> f64 {
    let n = tickers.len();
    if n < 2 {
        return 0.0;
    }
    let m = last_price_mean(tickers);
    let variance = tickers
        .iter()
        .map(|t| {
            let diff = t.last_price - m;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1) as f64;
    variance.sqrt()
}

pub fn last_price_min(tickers: &[Ticker]) -> f64 {
    tickers
        .iter()
        .map(|t| t.last_price)
        .reduce(f64::min)
        .unwrap_or(0.0)
}

pub fn last_price_max(tickers: &[Ticker]) -> f64 {
    tickers
        .iter()
        .map(|t| t.last_price)
        .reduce(f64::max)
        .unwrap_or(0.0)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
