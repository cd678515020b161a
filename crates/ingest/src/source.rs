use crate::error::IngestError;
use async_trait::async_trait;
use core_types::{DateRange, PriceSnapshot, Stock};
use std::time::Duration;

/// The generic interface for a provider of daily price history.
///
/// An empty result means the provider has nothing for the symbol in that
/// range; an error means the request itself failed and may be retried.
#[async_trait]
pub trait PriceDataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_daily(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<PriceSnapshot>, IngestError>;

    /// Reference data (name, sector) for `symbol`, if the provider has any.
    async fn fetch_profile(&self, _symbol: &str) -> Result<Option<Stock>, IngestError> {
        Ok(None)
    }
}

/// Tries each source in order until one returns rows.
///
/// A failing request is retried with exponential backoff, at most
/// `max_attempts` times per source. A source that answers with no rows is
/// not retried.
pub struct FallbackSource {
    sources: Vec<Box<dyn PriceDataSource>>,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl FallbackSource {
    pub fn new(
        sources: Vec<Box<dyn PriceDataSource>>,
        max_attempts: u32,
        initial_backoff: Duration,
    ) -> Self {
        Self {
            sources,
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    async fn fetch_with_retry(
        &self,
        source: &dyn PriceDataSource,
        symbol: &str,
        range: DateRange,
    ) -> Option<Vec<PriceSnapshot>> {
        let mut backoff = self.initial_backoff;
        for attempt in 1..=self.max_attempts {
            match source.fetch_daily(symbol, range).await {
                Ok(rows) => return Some(rows),
                Err(e) => {
                    tracing::warn!(
                        source = source.name(),
                        symbol,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Price request failed."
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        None
    }
}

#[async_trait]
impl PriceDataSource for FallbackSource {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn fetch_daily(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<PriceSnapshot>, IngestError> {
        for source in &self.sources {
            match self.fetch_with_retry(source.as_ref(), symbol, range).await {
                Some(rows) if !rows.is_empty() => {
                    tracing::debug!(source = source.name(), symbol, rows = rows.len(), "Fetched prices.");
                    return Ok(rows);
                }
                _ => tracing::debug!(source = source.name(), symbol, "No data, trying next source."),
            }
        }
        Err(IngestError::NoData {
            symbol: symbol.to_string(),
        })
    }

    /// The first profile any source returns. Profile failures are not retried.
    async fn fetch_profile(&self, symbol: &str) -> Result<Option<Stock>, IngestError> {
        for source in &self.sources {
            match source.fetch_profile(symbol).await {
                Ok(Some(profile)) => return Ok(Some(profile)),
                Ok(None) => {}
                Err(e) => tracing::debug!(source = source.name(), symbol, error = %e, "Profile lookup failed."),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::TradingDate;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times, then returns `rows` rows.
    struct ScriptedSource {
        name: &'static str,
        failures: u32,
        rows: usize,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl PriceDataSource for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_daily(
            &self,
            symbol: &str,
            range: DateRange,
        ) -> Result<Vec<PriceSnapshot>, IngestError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(IngestError::InvalidData("scripted failure".to_string()));
            }
            Ok((0..self.rows)
                .map(|_| PriceSnapshot {
                    date: range.start,
                    symbol: symbol.to_string(),
                    close: Some(dec!(1)),
                    adj_close: Some(dec!(1)),
                    volume: None,
                })
                .collect())
        }
    }

    fn scripted(name: &'static str, failures: u32, rows: usize) -> (Box<dyn PriceDataSource>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let source = ScriptedSource {
            name,
            failures,
            rows,
            calls: calls.clone(),
        };
        (Box::new(source), calls)
    }

    fn range() -> DateRange {
        DateRange::single(TradingDate::from_ymd(2024, 5, 1).unwrap())
    }

    #[tokio::test]
    async fn retries_then_succeeds_on_the_first_source() {
        let (first, first_calls) = scripted("first", 2, 1);
        let (second, second_calls) = scripted("second", 0, 1);
        let fallback = FallbackSource::new(vec![first, second], 3, Duration::from_millis(1));

        let rows = fallback.fetch_daily("AAPL", range()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(first_calls.load(Ordering::SeqCst), 3);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_and_falls_back() {
        let (first, first_calls) = scripted("first", u32::MAX, 1);
        let (second, second_calls) = scripted("second", 0, 2);
        let fallback = FallbackSource::new(vec![first, second], 2, Duration::from_millis(1));

        let rows = fallback.fetch_daily("AAPL", range()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(first_calls.load(Ordering::SeqCst), 2);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_answers_are_not_retried() {
        let (first, first_calls) = scripted("first", 0, 0);
        let fallback = FallbackSource::new(vec![first], 5, Duration::from_millis(1));

        let err = fallback.fetch_daily("AAPL", range()).await.unwrap_err();
        assert!(matches!(err, IngestError::NoData { .. }));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.source_names(), vec!["first"]);
    }

    /// Has no prices, only a company name.
    struct NamedSource;

    #[async_trait]
    impl PriceDataSource for NamedSource {
        fn name(&self) -> &str {
            "named"
        }

        async fn fetch_daily(
            &self,
            _symbol: &str,
            _range: DateRange,
        ) -> Result<Vec<PriceSnapshot>, IngestError> {
            Ok(Vec::new())
        }

        async fn fetch_profile(&self, symbol: &str) -> Result<Option<Stock>, IngestError> {
            Ok(Some(Stock {
                symbol: symbol.to_string(),
                name: Some("Apple Inc.".to_string()),
                sector: None,
            }))
        }
    }

    #[tokio::test]
    async fn profile_comes_from_the_first_source_that_has_one() {
        let (first, _) = scripted("first", 0, 1);
        let fallback = FallbackSource::new(vec![first, Box::new(NamedSource)], 1, Duration::from_millis(1));

        let profile = fallback.fetch_profile("AAPL").await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Apple Inc."));

        let (only, _) = scripted("only", 0, 1);
        let without = FallbackSource::new(vec![only], 1, Duration::from_millis(1));
        assert_eq!(without.fetch_profile("AAPL").await.unwrap(), None);
    }
}
