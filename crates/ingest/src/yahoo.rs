use crate::error::IngestError;
use crate::source::PriceDataSource;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime};
use core_types::{DateRange, PriceSnapshot, Stock, TradingDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

// Yahoo rejects requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// Daily history from Yahoo Finance's chart endpoint.
///
/// Unlike Stooq, Yahoo publishes a split- and dividend-adjusted close, and
/// the chart metadata carries the company name. Names seen while fetching
/// prices are remembered, so `fetch_profile` after `fetch_daily` costs no
/// extra request.
pub struct YahooSource {
    client: reqwest::Client,
    base_url: String,
    profiles: RwLock<HashMap<String, Stock>>,
}

impl YahooSource {
    pub fn new(timeout: Duration) -> Result<Self, IngestError> {
        Self::with_base_url(YAHOO_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            profiles: RwLock::new(HashMap::new()),
        })
    }

    /// Requests the chart for `symbol`. `None` when Yahoo does not know it.
    async fn chart(
        &self,
        symbol: &str,
        query: &[(&str, String)],
    ) -> Result<Option<String>, IngestError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(IngestError::Status {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Some(response.text().await?))
    }

    async fn remember(&self, symbol: &str, name: Option<String>) {
        if let Some(name) = name {
            self.profiles.write().await.insert(
                symbol.to_string(),
                Stock {
                    symbol: symbol.to_string(),
                    name: Some(name),
                    sector: None,
                },
            );
        }
    }
}

#[async_trait]
impl PriceDataSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_daily(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<PriceSnapshot>, IngestError> {
        let period1 = range.start.naive().and_time(NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive.
        let last = range.end.naive();
        let period2 = last.succ_opt().unwrap_or(last).and_time(NaiveTime::MIN).and_utc().timestamp();
        let query = [
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", "1d".to_string()),
        ];

        let Some(body) = self.chart(symbol, &query).await? else {
            return Ok(Vec::new());
        };
        let chart = parse_chart_json(symbol, &body, range)?;
        self.remember(symbol, chart.name).await;
        Ok(chart.prices)
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<Option<Stock>, IngestError> {
        if let Some(profile) = self.profiles.read().await.get(symbol) {
            return Ok(Some(profile.clone()));
        }

        let query = [("range", "5d".to_string()), ("interval", "1d".to_string())];
        let Some(body) = self.chart(symbol, &query).await? else {
            return Ok(None);
        };
        let envelope: ChartEnvelope = serde_json::from_str(&body)
            .map_err(|e| IngestError::InvalidData(format!("{symbol}: {e}")))?;
        let name = envelope
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .and_then(|result| result.meta.display_name());
        self.remember(symbol, name).await;
        Ok(self.profiles.read().await.get(symbol).cloned())
    }
}

/// Prices and the company name decoded from one chart response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartData {
    pub prices: Vec<PriceSnapshot>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    long_name: Option<String>,
    short_name: Option<String>,
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    gmtoffset: i64,
}

impl ChartMeta {
    fn display_name(&self) -> Option<String> {
        self.long_name
            .as_deref()
            .or(self.short_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

#[derive(Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Decodes a `/v8/finance/chart` response and keeps the rows inside `range`.
///
/// Timestamps are shifted by the exchange offset before taking the date.
/// Null closes stay `None`; a day with neither close is dropped.
pub fn parse_chart_json(symbol: &str, text: &str, range: DateRange) -> Result<ChartData, IngestError> {
    let envelope: ChartEnvelope = serde_json::from_str(text)
        .map_err(|e| IngestError::InvalidData(format!("{symbol}: {e}")))?;

    if let Some(error) = envelope.chart.error {
        tracing::debug!(symbol, code = %error.code, description = %error.description, "Yahoo chart error.");
        return Ok(ChartData::default());
    }
    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(ChartData::default());
    };

    let quote = result.indicators.quote.into_iter().next();
    let (closes, volumes) = quote.map(|q| (q.close, q.volume)).unwrap_or_default();
    let adj_closes = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let to_decimal = |values: &[Option<f64>], i: usize| {
        values
            .get(i)
            .copied()
            .flatten()
            .and_then(Decimal::from_f64)
            .map(|v| v.round_dp(6))
    };

    let mut prices = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let date = DateTime::from_timestamp(ts + result.meta.gmtoffset, 0)
            .map(|dt| TradingDate::new(dt.date_naive()))
            .ok_or_else(|| IngestError::InvalidData(format!("{symbol}: bad timestamp {ts}")))?;
        if !range.contains(date) {
            continue;
        }

        let close = to_decimal(&closes, i);
        let adj_close = to_decimal(&adj_closes, i).or(close);
        if close.is_none() && adj_close.is_none() {
            continue;
        }
        let volume = volumes
            .get(i)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64);

        prices.push(PriceSnapshot {
            date,
            symbol: symbol.to_string(),
            close,
            adj_close,
            volume,
        });
    }

    Ok(ChartData {
        prices,
        name: result.meta.display_name(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use rust_decimal_macros::dec;

    fn june() -> DateRange {
        DateRange::new(
            TradingDate::from_ymd(2024, 6, 1).unwrap(),
            TradingDate::from_ymd(2024, 6, 30).unwrap(),
        )
    }

    // 2024-05-31, 2024-06-03, 2024-06-04 and 2024-06-05 at 09:30 New York.
    const CHART: &str = r#"{"chart":{"result":[{
        "meta":{"symbol":"AAPL","longName":"Apple Inc.","shortName":"Apple","gmtoffset":-14400},
        "timestamp":[1717162200,1717421400,1717507800,1717594200],
        "indicators":{
            "quote":[{"close":[192.25,194.029998779296875,null,null],"volume":[75158300,50080500,47471400,null]}],
            "adjclose":[{"adjclose":[191.5,193.27,194.0,null]}]
        }}],"error":null}}"#;

    #[test]
    fn parses_prices_and_name() {
        let chart = parse_chart_json("AAPL", CHART, june()).unwrap();

        assert_eq!(chart.name.as_deref(), Some("Apple Inc."));
        let dates: Vec<String> = chart.prices.iter().map(|p| p.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-06-03", "2024-06-04"]);

        assert_eq!(chart.prices[0].close, Some(dec!(194.029999)));
        assert_eq!(chart.prices[0].adj_close, Some(dec!(193.27)));
        assert_eq!(chart.prices[0].volume, Some(50_080_500));
        assert_eq!(chart.prices[1].close, None);
        assert_eq!(chart.prices[1].adj_close, Some(dec!(194)));
    }

    #[test]
    fn chart_error_means_no_data() {
        let text = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert_eq!(parse_chart_json("XXXX", text, june()).unwrap(), ChartData::default());
    }

    #[test]
    fn malformed_body_is_invalid_data() {
        assert!(matches!(
            parse_chart_json("AAPL", "<html>", june()),
            Err(IngestError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn fetch_remembers_the_company_name() {
        let base_url = serve(200, "application/json", CHART).await;
        let source = YahooSource::with_base_url(&base_url, Duration::from_secs(5)).unwrap();

        let prices = source.fetch_daily("AAPL", june()).await.unwrap();
        assert_eq!(prices.len(), 2);

        let profile = source.fetch_profile("AAPL").await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Apple Inc."));
        assert_eq!(profile.sector, None);
    }

    #[tokio::test]
    async fn unknown_symbol_is_empty_and_server_errors_fail() {
        let missing = serve(404, "application/json", r#"{"chart":{"result":null,"error":null}}"#).await;
        let source = YahooSource::with_base_url(&missing, Duration::from_secs(5)).unwrap();
        assert!(source.fetch_daily("NOPE", june()).await.unwrap().is_empty());
        assert!(source.fetch_profile("NOPE").await.unwrap().is_none());

        let failing = serve(503, "text/plain", "busy").await;
        let source = YahooSource::with_base_url(&failing, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            source.fetch_daily("AAPL", june()).await,
            Err(IngestError::Status { status: 503, .. })
        ));
    }
}
