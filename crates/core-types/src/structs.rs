use crate::date::{DateRange, TradingDate};
use crate::enums::BuildStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One ingested market capitalization observation. The ranking input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MarketCapSnapshot {
    pub date: TradingDate,
    pub symbol: String,
    pub market_cap: Decimal,
}

/// One ingested daily price bar. Only `adj_close` feeds the index return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PriceSnapshot {
    pub date: TradingDate,
    pub symbol: String,
    pub close: Option<Decimal>,
    pub adj_close: Option<Decimal>,
    pub volume: Option<i64>,
}

/// Reference metadata for a listed equity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Stock {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
}

/// A symbol as returned by the market-cap ranking query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RankedSymbol {
    pub symbol: String,
    pub market_cap: Decimal,
}

/// A constituent of the index on a given date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct IndexComposition {
    pub date: TradingDate,
    pub symbol: String,
    pub weight: Decimal,
}

/// The `(symbol, weight)` view of a composition row, used when the date is
/// already implied by the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ConstituentWeight {
    pub symbol: String,
    pub weight: Decimal,
}

/// Daily index performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct IndexPerformance {
    pub date: TradingDate,
    pub daily_return: Decimal,
    pub cumulative_return: Decimal,
    pub index_level: Decimal,
}

/// Entries and exits between two consecutive composition snapshots.
/// Both lists are sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionChange {
    pub date: TradingDate,
    pub entered: Vec<String>,
    pub exited: Vec<String>,
}

/// The result of a successful index build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub status: BuildStatus,
    pub start: TradingDate,
    pub end: TradingDate,
    pub days_processed: usize,
    pub message: String,
}

impl BuildSummary {
    pub fn success(range: DateRange, days_processed: usize) -> Self {
        Self {
            status: BuildStatus::Success,
            start: range.start,
            end: range.end,
            days_processed,
            message: "Index built and stored".to_string(),
        }
    }
}
