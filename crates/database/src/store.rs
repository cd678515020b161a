use crate::error::DbError;
use async_trait::async_trait;
use core_types::{
    ConstituentWeight, DateRange, IndexComposition, IndexPerformance, MarketCapSnapshot,
    PriceSnapshot, RankedSymbol, Stock, TradingDate,
};
use rust_decimal::Decimal;

/// Read access to ingested market data. The index builder's only input.
#[async_trait]
pub trait MarketDataStore: Send + Sync {
    /// Distinct dates that have at least one market-cap row, ascending.
    async fn distinct_dates(&self, range: DateRange) -> Result<Vec<TradingDate>, DbError>;

    /// The `limit` largest symbols by market cap on `date`, descending.
    /// Equal market caps are ordered by symbol ascending.
    async fn top_by_market_cap(
        &self,
        date: TradingDate,
        limit: usize,
    ) -> Result<Vec<RankedSymbol>, DbError>;

    /// Adjusted close for `symbol` on `date`, if one was ingested.
    async fn adjusted_close(
        &self,
        symbol: &str,
        date: TradingDate,
    ) -> Result<Option<Decimal>, DbError>;
}

/// Persisted index compositions, keyed by `(date, symbol)`.
#[async_trait]
pub trait CompositionStore: Send + Sync {
    async fn upsert_compositions(&self, rows: &[IndexComposition]) -> Result<(), DbError>;

    /// Constituents on exactly `date`, ascending by symbol.
    async fn composition_on(&self, date: TradingDate) -> Result<Vec<ConstituentWeight>, DbError>;

    /// All composition rows in range, ordered by date then symbol.
    async fn compositions_between(
        &self,
        range: DateRange,
    ) -> Result<Vec<IndexComposition>, DbError>;
}

/// Persisted index performance, keyed by date.
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    async fn upsert_performance(&self, rows: &[IndexPerformance]) -> Result<(), DbError>;

    /// Performance rows in range, ascending by date.
    async fn performance_between(&self, range: DateRange)
    -> Result<Vec<IndexPerformance>, DbError>;
}

/// Everything an index build touches.
#[async_trait]
pub trait IndexStore: MarketDataStore + CompositionStore + PerformanceStore {
    /// Writes the output of one build run.
    ///
    /// For every date present in `compositions`, the stored snapshot is
    /// replaced so that it holds exactly the given constituents. Performance
    /// rows are upserted by date. Implementations backed by a transactional
    /// store perform both writes atomically; this default writes them in
    /// sequence.
    async fn persist_run(
        &self,
        compositions: &[IndexComposition],
        performance: &[IndexPerformance],
    ) -> Result<(), DbError> {
        self.upsert_compositions(compositions).await?;
        self.upsert_performance(performance).await
    }
}

/// Write access used by the ingestion pipeline.
#[async_trait]
pub trait MarketDataWriter: Send + Sync {
    async fn upsert_stocks(&self, stocks: &[Stock]) -> Result<(), DbError>;

    async fn upsert_prices(&self, prices: &[PriceSnapshot]) -> Result<(), DbError>;

    async fn upsert_market_caps(&self, caps: &[MarketCapSnapshot]) -> Result<(), DbError>;
}
