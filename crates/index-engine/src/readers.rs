use crate::error::IndexError;
use core_types::{ConstituentWeight, DateRange, IndexComposition, IndexPerformance, TradingDate};
use database::{CompositionStore, PerformanceStore};
use std::sync::Arc;

/// Returns stored performance rows. Never computes anything.
pub struct PerformanceReader<S: ?Sized> {
    store: Arc<S>,
}

impl<S: PerformanceStore + ?Sized> PerformanceReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Performance rows within `range`, ascending by date. Dates that were
    /// never built are simply absent.
    pub async fn get(&self, range: DateRange) -> Result<Vec<IndexPerformance>, IndexError> {
        let rows = self.store.performance_between(range).await?;
        tracing::debug!(%range, rows = rows.len(), "Read index performance.");
        Ok(rows)
    }
}

/// Returns the stored constituents of the index.
pub struct CompositionReader<S: ?Sized> {
    store: Arc<S>,
}

impl<S: CompositionStore + ?Sized> CompositionReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Constituents on exactly `date`, ascending by symbol. An unbuilt date
    /// yields an empty list; there is no fallback to a nearby date.
    pub async fn get(&self, date: TradingDate) -> Result<Vec<ConstituentWeight>, IndexError> {
        Ok(self.store.composition_on(date).await?)
    }

    /// Every stored composition row within `range`, by date then symbol.
    pub async fn get_range(&self, range: DateRange) -> Result<Vec<IndexComposition>, IndexError> {
        Ok(self.store.compositions_between(range).await?)
    }
}
