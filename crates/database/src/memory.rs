use crate::store::{
    CompositionStore, IndexStore, MarketDataStore, MarketDataWriter, PerformanceStore,
};
use crate::DbError;
use async_trait::async_trait;
use core_types::{
    ConstituentWeight, DateRange, IndexComposition, IndexPerformance, MarketCapSnapshot,
    PriceSnapshot, RankedSymbol, Stock, TradingDate,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    stocks: BTreeMap<String, Stock>,
    market_caps: BTreeMap<(TradingDate, String), Decimal>,
    prices: BTreeMap<(TradingDate, String), PriceSnapshot>,
    compositions: BTreeMap<(TradingDate, String), Decimal>,
    performance: BTreeMap<TradingDate, IndexPerformance>,
}

/// A process-local store with the same ordering and upsert semantics as the
/// Postgres repository. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stock_count(&self) -> usize {
        self.tables.read().await.stocks.len()
    }

    /// Stored stocks, ascending by symbol.
    pub async fn stocks(&self) -> Vec<Stock> {
        self.tables.read().await.stocks.values().cloned().collect()
    }

    pub async fn price_count(&self) -> usize {
        self.tables.read().await.prices.len()
    }

    pub async fn market_cap_count(&self) -> usize {
        self.tables.read().await.market_caps.len()
    }
}

#[async_trait]
impl MarketDataStore for InMemoryStore {
    async fn distinct_dates(&self, range: DateRange) -> Result<Vec<TradingDate>, DbError> {
        let tables = self.tables.read().await;
        let dates: BTreeSet<TradingDate> = tables
            .market_caps
            .keys()
            .map(|(date, _)| *date)
            .filter(|date| range.contains(*date))
            .collect();
        Ok(dates.into_iter().collect())
    }

    async fn top_by_market_cap(
        &self,
        date: TradingDate,
        limit: usize,
    ) -> Result<Vec<RankedSymbol>, DbError> {
        let tables = self.tables.read().await;
        let mut ranked: Vec<RankedSymbol> = tables
            .market_caps
            .iter()
            .filter(|((d, _), _)| *d == date)
            .map(|((_, symbol), cap)| RankedSymbol {
                symbol: symbol.clone(),
                market_cap: *cap,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.market_cap
                .cmp(&a.market_cap)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn adjusted_close(
        &self,
        symbol: &str,
        date: TradingDate,
    ) -> Result<Option<Decimal>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .prices
            .get(&(date, symbol.to_string()))
            .and_then(|price| price.adj_close))
    }
}

#[async_trait]
impl CompositionStore for InMemoryStore {
    async fn upsert_compositions(&self, rows: &[IndexComposition]) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        for row in rows {
            tables
                .compositions
                .insert((row.date, row.symbol.clone()), row.weight);
        }
        Ok(())
    }

    async fn composition_on(&self, date: TradingDate) -> Result<Vec<ConstituentWeight>, DbError> {
        let tables = self.tables.read().await;
        // Keys sort by (date, symbol), so symbols come out ascending.
        Ok(tables
            .compositions
            .iter()
            .filter(|((d, _), _)| *d == date)
            .map(|((_, symbol), weight)| ConstituentWeight {
                symbol: symbol.clone(),
                weight: *weight,
            })
            .collect())
    }

    async fn compositions_between(
        &self,
        range: DateRange,
    ) -> Result<Vec<IndexComposition>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .compositions
            .iter()
            .filter(|((date, _), _)| range.contains(*date))
            .map(|((date, symbol), weight)| IndexComposition {
                date: *date,
                symbol: symbol.clone(),
                weight: *weight,
            })
            .collect())
    }
}

#[async_trait]
impl PerformanceStore for InMemoryStore {
    async fn upsert_performance(&self, rows: &[IndexPerformance]) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        for row in rows {
            tables.performance.insert(row.date, row.clone());
        }
        Ok(())
    }

    async fn performance_between(
        &self,
        range: DateRange,
    ) -> Result<Vec<IndexPerformance>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .performance
            .values()
            .filter(|row| range.contains(row.date))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn persist_run(
        &self,
        compositions: &[IndexComposition],
        performance: &[IndexPerformance],
    ) -> Result<(), DbError> {
        let dates: BTreeSet<TradingDate> = compositions.iter().map(|row| row.date).collect();

        // One write guard for the whole run, so readers never see half of it.
        let mut tables = self.tables.write().await;
        tables.compositions.retain(|(date, _), _| !dates.contains(date));
        for row in compositions {
            tables
                .compositions
                .insert((row.date, row.symbol.clone()), row.weight);
        }
        for row in performance {
            tables.performance.insert(row.date, row.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataWriter for InMemoryStore {
    async fn upsert_stocks(&self, stocks: &[Stock]) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        for stock in stocks {
            tables.stocks.insert(stock.symbol.clone(), stock.clone());
        }
        Ok(())
    }

    async fn upsert_prices(&self, prices: &[PriceSnapshot]) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        for price in prices {
            tables
                .prices
                .insert((price.date, price.symbol.clone()), price.clone());
        }
        Ok(())
    }

    async fn upsert_market_caps(&self, caps: &[MarketCapSnapshot]) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        for cap in caps {
            tables
                .market_caps
                .insert((cap.date, cap.symbol.clone()), cap.market_cap);
        }
        Ok(())
    }
}
