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
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use std::collections::BTreeSet;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_compositions(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[IndexComposition],
    ) -> Result<(), DbError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO index_compositions (date, symbol, weight)
                VALUES ($1, $2, $3)
                ON CONFLICT (date, symbol) DO UPDATE SET weight = EXCLUDED.weight
                "#,
            )
            .bind(row.date)
            .bind(&row.symbol)
            .bind(row.weight)
            .execute(&mut **tx) // Note: must use the transaction object `tx` here
            .await?;
        }
        Ok(())
    }

    async fn insert_performance(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[IndexPerformance],
    ) -> Result<(), DbError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO index_performance (date, daily_return, cumulative_return, index_level)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (date) DO UPDATE SET
                    daily_return = EXCLUDED.daily_return,
                    cumulative_return = EXCLUDED.cumulative_return,
                    index_level = EXCLUDED.index_level
                "#,
            )
            .bind(row.date)
            .bind(row.daily_return)
            .bind(row.cumulative_return)
            .bind(row.index_level)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataStore for DbRepository {
    async fn distinct_dates(&self, range: DateRange) -> Result<Vec<TradingDate>, DbError> {
        let dates = sqlx::query_scalar::<_, TradingDate>(
            r#"
            SELECT DISTINCT date
            FROM daily_market_caps
            WHERE date BETWEEN $1 AND $2
            ORDER BY date
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(dates)
    }

    async fn top_by_market_cap(
        &self,
        date: TradingDate,
        limit: usize,
    ) -> Result<Vec<RankedSymbol>, DbError> {
        let rows = sqlx::query_as::<_, RankedSymbol>(
            r#"
            SELECT symbol, market_cap
            FROM daily_market_caps
            WHERE date = $1
            ORDER BY market_cap DESC, symbol ASC
            LIMIT $2
            "#,
        )
        .bind(date)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn adjusted_close(
        &self,
        symbol: &str,
        date: TradingDate,
    ) -> Result<Option<Decimal>, DbError> {
        let close = sqlx::query_scalar::<_, Option<Decimal>>(
            "SELECT adj_close FROM daily_prices WHERE symbol = $1 AND date = $2",
        )
        .bind(symbol)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(close.flatten())
    }
}

#[async_trait]
impl CompositionStore for DbRepository {
    async fn upsert_compositions(&self, rows: &[IndexComposition]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        Self::insert_compositions(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn composition_on(&self, date: TradingDate) -> Result<Vec<ConstituentWeight>, DbError> {
        let rows = sqlx::query_as::<_, ConstituentWeight>(
            r#"
            SELECT symbol, weight
            FROM index_compositions
            WHERE date = $1
            ORDER BY symbol
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn compositions_between(
        &self,
        range: DateRange,
    ) -> Result<Vec<IndexComposition>, DbError> {
        let rows = sqlx::query_as::<_, IndexComposition>(
            r#"
            SELECT date, symbol, weight
            FROM index_compositions
            WHERE date BETWEEN $1 AND $2
            ORDER BY date, symbol
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl PerformanceStore for DbRepository {
    async fn upsert_performance(&self, rows: &[IndexPerformance]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        Self::insert_performance(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn performance_between(
        &self,
        range: DateRange,
    ) -> Result<Vec<IndexPerformance>, DbError> {
        let rows = sqlx::query_as::<_, IndexPerformance>(
            r#"
            SELECT date, daily_return, cumulative_return, index_level
            FROM index_performance
            WHERE date BETWEEN $1 AND $2
            ORDER BY date
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl IndexStore for DbRepository {
    /// Replaces the composition snapshot of every built date and upserts the
    /// performance rows, all within a single transaction.
    async fn persist_run(
        &self,
        compositions: &[IndexComposition],
        performance: &[IndexPerformance],
    ) -> Result<(), DbError> {
        let dates: BTreeSet<TradingDate> = compositions.iter().map(|row| row.date).collect();

        let mut tx = self.pool.begin().await?;
        for date in &dates {
            sqlx::query("DELETE FROM index_compositions WHERE date = $1")
                .bind(*date)
                .execute(&mut *tx)
                .await?;
        }
        Self::insert_compositions(&mut tx, compositions).await?;
        Self::insert_performance(&mut tx, performance).await?;
        tx.commit().await?;

        tracing::debug!(
            dates = dates.len(),
            composition_rows = compositions.len(),
            performance_rows = performance.len(),
            "Persisted index build."
        );
        Ok(())
    }
}

#[async_trait]
impl MarketDataWriter for DbRepository {
    async fn upsert_stocks(&self, stocks: &[Stock]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for stock in stocks {
            sqlx::query(
                r#"
                INSERT INTO stocks (symbol, name, sector)
                VALUES ($1, $2, $3)
                ON CONFLICT (symbol) DO UPDATE SET name = EXCLUDED.name, sector = EXCLUDED.sector
                "#,
            )
            .bind(&stock.symbol)
            .bind(stock.name.as_deref())
            .bind(stock.sector.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_prices(&self, prices: &[PriceSnapshot]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for price in prices {
            sqlx::query(
                r#"
                INSERT INTO daily_prices (symbol, date, close, adj_close, volume)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (symbol, date) DO UPDATE SET
                    close = EXCLUDED.close,
                    adj_close = EXCLUDED.adj_close,
                    volume = EXCLUDED.volume
                "#,
            )
            .bind(&price.symbol)
            .bind(price.date)
            .bind(price.close)
            .bind(price.adj_close)
            .bind(price.volume)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_market_caps(&self, caps: &[MarketCapSnapshot]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for cap in caps {
            sqlx::query(
                r#"
                INSERT INTO daily_market_caps (symbol, date, market_cap)
                VALUES ($1, $2, $3)
                ON CONFLICT (symbol, date) DO UPDATE SET market_cap = EXCLUDED.market_cap
                "#,
            )
            .bind(&cap.symbol)
            .bind(cap.date)
            .bind(cap.market_cap)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
