use crate::error::IngestError;
use crate::source::PriceDataSource;
use async_trait::async_trait;
use chrono::{Datelike, Days, Weekday};
use core_types::{DateRange, PriceSnapshot, Stock, TradingDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;

const DAILY_DRIFT: f64 = 0.0005;
const DAILY_VOLATILITY: f64 = 0.02;
const SHARES_RANGE: std::ops::Range<i64> = 200_000_000..10_000_000_000;

/// Generates a geometric random walk over business days.
///
/// Output depends only on the seed, the symbol and the range, so repeated
/// ingests of the same window produce identical rows.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn generate(&self, symbol: &str, range: DateRange) -> Vec<PriceSnapshot> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ symbol_hash(symbol));
        let mut price: f64 = rng.gen_range(20.0..300.0);

        business_days(range)
            .into_iter()
            .filter_map(|date| {
                price *= (DAILY_DRIFT + DAILY_VOLATILITY * standard_normal(&mut rng)).exp();
                let volume = rng.gen_range(1_000_000i64..10_000_000);
                let close = Decimal::from_f64(price)?.round_dp(4);
                Some(PriceSnapshot {
                    date,
                    symbol: symbol.to_string(),
                    close: Some(close),
                    adj_close: Some(close),
                    volume: Some(volume),
                })
            })
            .collect()
    }
}

#[async_trait]
impl PriceDataSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch_daily(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<PriceSnapshot>, IngestError> {
        Ok(self.generate(symbol, range))
    }
}

/// Seeded shares outstanding per symbol, uniform in 200M..10B.
pub fn synthetic_shares(stocks: &[Stock], seed: u64) -> HashMap<String, i64> {
    let mut rng = StdRng::seed_from_u64(seed);
    stocks
        .iter()
        .map(|stock| (stock.symbol.clone(), rng.gen_range(SHARES_RANGE)))
        .collect()
}

/// Monday to Friday dates in `range`, ascending.
pub fn business_days(range: DateRange) -> Vec<TradingDate> {
    let mut days = Vec::new();
    let mut current = range.start.naive();
    let end = range.end.naive();
    while current <= end {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(TradingDate::new(current));
        }
        match current.checked_add_days(Days::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    days
}

// Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

// FNV-1a, stable across runs and platforms.
fn symbol_hash(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
