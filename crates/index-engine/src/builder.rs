use crate::error::IndexError;
use configuration::IndexSettings;
use core_types::{BuildSummary, DateRange, IndexComposition, IndexPerformance, TradingDate};
use database::{DbError, IndexStore};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The output of one build run before it is persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildRun {
    pub compositions: Vec<IndexComposition>,
    pub performance: Vec<IndexPerformance>,
}

/// Constructs the equal-weighted index from ranked market data.
///
/// Each trading day is rebalanced from scratch: the top `top_n` symbols by
/// market cap are selected and weighted equally. The day's return is the
/// plain average of the simple returns of the symbols that were also in the
/// previous day's selection, and the level is compounded from
/// `base_level` at the start of every run.
pub struct IndexBuilder<S: ?Sized> {
    store: Arc<S>,
    settings: IndexSettings,
}

impl<S: IndexStore + ?Sized> IndexBuilder<S> {
    pub fn new(store: Arc<S>, settings: IndexSettings) -> Self {
        Self { store, settings }
    }

    /// Builds and stores the index for every trading day in `range`.
    ///
    /// Nothing is written unless the whole range computes successfully; the
    /// results then go to the store in a single `persist_run` call.
    pub async fn build(&self, range: DateRange) -> Result<BuildSummary, IndexError> {
        let trading_dates = self.store.distinct_dates(range).await?;
        if trading_dates.is_empty() {
            tracing::warn!(%range, "No trading days in range.");
            return Err(IndexError::NoTradingDays {
                start: range.start,
                end: range.end,
            });
        }

        let run = self.compute(&trading_dates).await?;
        self.store
            .persist_run(&run.compositions, &run.performance)
            .await?;

        let days_processed = run.performance.len();
        tracing::info!(
            %range,
            days_processed,
            composition_rows = run.compositions.len(),
            "Index built and stored."
        );
        Ok(BuildSummary::success(range, days_processed))
    }

    /// Computes compositions and performance for `dates` (ascending) without
    /// writing anything.
    pub async fn compute(&self, dates: &[TradingDate]) -> Result<BuildRun, IndexError> {
        let base_level = self.settings.base_level;
        let mut index_level = base_level;
        let mut previous: Option<(TradingDate, BTreeSet<String>)> = None;
        let mut run = BuildRun::default();

        for &date in dates {
            let ranked = self
                .store
                .top_by_market_cap(date, self.settings.top_n)
                .await?;
            if ranked.is_empty() {
                tracing::debug!(%date, "No market caps on date, skipping.");
                continue;
            }

            let symbols: BTreeSet<String> = ranked.into_iter().map(|r| r.symbol).collect();
            let weight = equal_weight(symbols.len());

            let daily_return = match &previous {
                None => Decimal::ZERO,
                Some((prev_date, prev_symbols)) => {
                    self.overlap_return(*prev_date, prev_symbols, date, &symbols)
                        .await?
                }
            };

            let overflow = || IndexError::Calculation(format!("index level overflowed on {date}"));
            index_level = Decimal::ONE
                .checked_add(daily_return)
                .and_then(|growth| index_level.checked_mul(growth))
                .ok_or_else(overflow)?;
            let cumulative_return = index_level
                .checked_div(base_level)
                .and_then(|ratio| ratio.checked_sub(Decimal::ONE))
                .ok_or_else(overflow)?;

            run.compositions
                .extend(symbols.iter().map(|symbol| IndexComposition {
                    date,
                    symbol: symbol.clone(),
                    weight,
                }));
            run.performance.push(IndexPerformance {
                date,
                daily_return,
                cumulative_return,
                index_level,
            });

            previous = Some((date, symbols));
        }

        Ok(run)
    }

    /// Mean simple return over the symbols held on both days. Symbols missing
    /// a price on either day are left out of the average.
    async fn overlap_return(
        &self,
        prev_date: TradingDate,
        prev_symbols: &BTreeSet<String>,
        date: TradingDate,
        symbols: &BTreeSet<String>,
    ) -> Result<Decimal, IndexError> {
        let common: Vec<&str> = prev_symbols
            .intersection(symbols)
            .map(String::as_str)
            .collect();
        if common.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let lookups = common.iter().map(|&symbol| async move {
            let prev_close = self.store.adjusted_close(symbol, prev_date).await?;
            let close = self.store.adjusted_close(symbol, date).await?;
            Ok::<_, DbError>(simple_return(prev_close, close))
        });
        // try_join_all keeps input order, so the average is taken in symbol order.
        let returns: Vec<Decimal> = try_join_all(lookups).await?.into_iter().flatten().collect();

        if returns.len() < common.len() {
            tracing::debug!(
                %date,
                overlap = common.len(),
                priced = returns.len(),
                "Excluded symbols without prices on both days."
            );
        }

        if returns.is_empty() {
            return Ok(Decimal::ZERO);
        }
        mean(&returns).ok_or_else(|| {
            IndexError::Calculation(format!("daily return overflowed on {date}"))
        })
    }
}

/// The weight of each constituent when `count` symbols are selected.
pub fn equal_weight(count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    Decimal::ONE / Decimal::from(count)
}

/// `close / prev_close - 1`, or `None` unless both closes are present and
/// positive. A ratio too large for `Decimal` voids the contribution as well.
pub fn simple_return(prev_close: Option<Decimal>, close: Option<Decimal>) -> Option<Decimal> {
    match (prev_close, close) {
        (Some(prev), Some(curr)) if prev > Decimal::ZERO && curr > Decimal::ZERO => curr
            .checked_div(prev)
            .and_then(|ratio| ratio.checked_sub(Decimal::ONE)),
        _ => None,
    }
}

/// Arithmetic mean, `None` for an empty slice or when the sum overflows.
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(*value))?;
    sum.checked_div(Decimal::from(values.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn equal_weight_is_reciprocal_of_count() {
        assert_eq!(equal_weight(2), dec!(0.5));
        assert_eq!(equal_weight(4), dec!(0.25));
        assert_eq!(equal_weight(1), Decimal::ONE);
        assert_eq!(equal_weight(0), Decimal::ZERO);
    }

    #[test]
    fn simple_return_requires_both_prices() {
        assert_eq!(simple_return(Some(dec!(10)), Some(dec!(10.4))), Some(dec!(0.04)));
        assert_eq!(simple_return(None, Some(dec!(10))), None);
        assert_eq!(simple_return(Some(dec!(10)), None), None);
        assert_eq!(simple_return(Some(Decimal::ZERO), Some(dec!(10))), None);
    }

    #[test]
    fn simple_return_voids_ratios_beyond_decimal_range() {
        assert_eq!(
            simple_return(Some(dec!(0.0000000000000001)), Some(dec!(10000000000000))),
            None
        );
    }

    #[test]
    fn mean_of_returns() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[dec!(0.02), dec!(-0.01), dec!(0.05)]), Some(dec!(0.02)));
        assert_eq!(mean(&[Decimal::MAX, Decimal::MAX]), None);
    }
}
