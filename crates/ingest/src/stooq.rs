use crate::error::IngestError;
use crate::source::PriceDataSource;
use async_trait::async_trait;
use core_types::{DateRange, PriceSnapshot, TradingDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;
use std::time::Duration;

const STOOQ_BASE_URL: &str = "https://stooq.com";

/// Daily history from Stooq's free CSV endpoint.
///
/// Stooq publishes unadjusted closes only, so `adj_close` is set to `close`.
#[derive(Clone)]
pub struct StooqSource {
    client: reqwest::Client,
    base_url: String,
}

impl StooqSource {
    pub fn new(timeout: Duration) -> Result<Self, IngestError> {
        Self::with_base_url(STOOQ_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceDataSource for StooqSource {
    fn name(&self) -> &str {
        "stooq"
    }

    async fn fetch_daily(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<PriceSnapshot>, IngestError> {
        let url = format!("{}/q/d/l/", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("s", symbol.to_lowercase().as_str()), ("i", "d")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        parse_daily_csv(symbol, &text, range)
    }
}

/// Parses a Stooq daily CSV (`Date,Open,High,Low,Close,Volume`) and keeps
/// the rows inside `range`.
///
/// Stooq answers unknown symbols with a plain-text body instead of a CSV;
/// anything without a `Date` column is read as "no data".
pub fn parse_daily_csv(
    symbol: &str,
    text: &str,
    range: DateRange,
) -> Result<Vec<PriceSnapshot>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));

    let Some(date_idx) = column("Date") else {
        tracing::debug!(symbol, "Stooq response has no Date column.");
        return Ok(Vec::new());
    };
    let close_idx = column("Close");
    let volume_idx = column("Volume");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw_date = record.get(date_idx).unwrap_or_default();
        let date = TradingDate::parse(raw_date)
            .map_err(|e| IngestError::InvalidData(format!("{symbol}: {e}")))?;
        if !range.contains(date) {
            continue;
        }

        let close = close_idx
            .and_then(|i| record.get(i))
            .and_then(|raw| Decimal::from_str(raw.trim()).ok());
        let volume = volume_idx
            .and_then(|i| record.get(i))
            .and_then(|raw| parse_volume(raw.trim()));

        rows.push(PriceSnapshot {
            date,
            symbol: symbol.to_string(),
            close,
            adj_close: close,
            volume,
        });
    }
    Ok(rows)
}

fn parse_volume(raw: &str) -> Option<i64> {
    raw.parse::<i64>()
        .ok()
        .or_else(|| Decimal::from_str(raw).ok().and_then(|v| v.trunc().to_i64()))
}
