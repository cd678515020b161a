use crate::error::IngestError;
use crate::source::{FallbackSource, PriceDataSource};
use crate::stooq::StooqSource;
use crate::synthetic::{synthetic_shares, SyntheticSource};
use crate::yahoo::YahooSource;
use configuration::{IngestSettings, SourceKind};
use core_types::{DateRange, MarketCapSnapshot, PriceSnapshot, Stock, TradingDate};
use database::MarketDataWriter;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::time::Duration;

/// Totals for one ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub symbols_requested: usize,
    pub symbols_loaded: usize,
    pub symbols_failed: Vec<String>,
    pub price_rows: usize,
    pub market_cap_rows: usize,
    pub trading_days: usize,
    /// Stocks whose name was filled in from a provider profile.
    pub profiles_updated: usize,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub seed: u64,
    pub concurrency: usize,
    pub fetch_metadata: bool,
    pub progress: Option<ProgressBar>,
}

impl IngestOptions {
    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self {
            seed: settings.seed,
            concurrency: settings.concurrency.max(1),
            fetch_metadata: settings.fetch_metadata,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Builds the configured source chain.
pub fn build_source(settings: &IngestSettings) -> Result<FallbackSource, IngestError> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    let mut sources: Vec<Box<dyn PriceDataSource>> = Vec::with_capacity(settings.sources.len());
    for kind in &settings.sources {
        match kind {
            SourceKind::Yahoo => sources.push(Box::new(YahooSource::new(timeout)?)),
            SourceKind::Stooq => sources.push(Box::new(StooqSource::new(timeout)?)),
            SourceKind::Synthetic => sources.push(Box::new(SyntheticSource::new(settings.seed))),
        }
    }
    Ok(FallbackSource::new(
        sources,
        settings.max_retries,
        Duration::from_millis(settings.initial_backoff_ms),
    ))
}

/// `adj_close * shares` for every row with a positive adjusted close. Rows
/// whose product does not fit in a `Decimal` get no market cap.
pub fn market_caps(prices: &[PriceSnapshot], shares: i64) -> Vec<MarketCapSnapshot> {
    let shares = Decimal::from(shares);
    prices
        .iter()
        .filter_map(|price| {
            let adj_close = price.adj_close.filter(|p| *p > Decimal::ZERO)?;
            let Some(market_cap) = adj_close.checked_mul(shares) else {
                tracing::warn!(symbol = %price.symbol, date = %price.date, "Market cap overflowed, skipping row.");
                return None;
            };
            Some(MarketCapSnapshot {
                date: price.date,
                symbol: price.symbol.clone(),
                market_cap,
            })
        })
        .collect()
}

/// Downloads prices for every stock in `range` and stores stocks, prices
/// and derived market caps.
///
/// Symbols are fetched `concurrency` at a time; writes happen one symbol at
/// a time as results arrive. A symbol no source can serve is logged and
/// skipped. With `fetch_metadata`, unnamed stocks that got prices are
/// looked up and re-stored with the name found. The run fails only when
/// nothing at all was ingested or a write fails.
pub async fn run_ingest<W>(
    writer: &W,
    source: &dyn PriceDataSource,
    stocks: &[Stock],
    range: DateRange,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError>
where
    W: MarketDataWriter + ?Sized,
{
    tracing::info!(%range, symbols = stocks.len(), source = source.name(), "Starting ingest.");
    writer.upsert_stocks(stocks).await?;

    let shares = synthetic_shares(stocks, options.seed);
    let mut report = IngestReport {
        symbols_requested: stocks.len(),
        ..Default::default()
    };
    let mut dates: BTreeSet<TradingDate> = BTreeSet::new();

    let mut named: Vec<Stock> = Vec::new();

    let mut fetches = stream::iter(stocks.iter().map(|stock| async move {
        let result = source.fetch_daily(&stock.symbol, range).await;
        let wants_profile = options.fetch_metadata
            && stock.name.is_none()
            && matches!(&result, Ok(prices) if !prices.is_empty());
        let profile = if wants_profile {
            match source.fetch_profile(&stock.symbol).await {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::debug!(symbol = %stock.symbol, error = %e, "Profile lookup failed.");
                    None
                }
            }
        } else {
            None
        };
        (stock, result, profile)
    }))
    .buffer_unordered(options.concurrency.max(1));

    while let Some((stock, result, profile)) = fetches.next().await {
        if let Some(progress) = &options.progress {
            progress.inc(1);
        }

        let prices = match result {
            Ok(prices) if !prices.is_empty() => prices,
            Ok(_) => {
                tracing::warn!(symbol = %stock.symbol, "No prices returned, skipping.");
                report.symbols_failed.push(stock.symbol.clone());
                continue;
            }
            Err(e) => {
                tracing::warn!(symbol = %stock.symbol, error = %e, "Failed to fetch prices, skipping.");
                report.symbols_failed.push(stock.symbol.clone());
                continue;
            }
        };

        let caps = match shares.get(&stock.symbol) {
            Some(&count) => market_caps(&prices, count),
            None => Vec::new(),
        };

        writer.upsert_prices(&prices).await?;
        writer.upsert_market_caps(&caps).await?;

        if let Some(profile) = profile.filter(|p| p.name.is_some()) {
            named.push(Stock {
                symbol: stock.symbol.clone(),
                name: profile.name,
                sector: stock.sector.clone().or(profile.sector),
            });
        }

        dates.extend(prices.iter().map(|p| p.date));
        report.symbols_loaded += 1;
        report.price_rows += prices.len();
        report.market_cap_rows += caps.len();
    }

    if let Some(progress) = &options.progress {
        progress.finish_and_clear();
    }

    if report.price_rows == 0 {
        return Err(IngestError::NothingIngested);
    }

    if !named.is_empty() {
        named.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        writer.upsert_stocks(&named).await?;
        report.profiles_updated = named.len();
    }

    report.symbols_failed.sort();
    report.trading_days = dates.len();
    tracing::info!(
        loaded = report.symbols_loaded,
        failed = report.symbols_failed.len(),
        price_rows = report.price_rows,
        trading_days = report.trading_days,
        profiles_updated = report.profiles_updated,
        "Ingest complete."
    );
    Ok(report)
}
