use crate::error::IngestError;
use configuration::IngestSettings;
use core_types::Stock;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Large US listings used when no universe file is configured.
pub const STATIC_SYMBOLS: &[&str] = &[
    "AAPL", "MSFT", "AMZN", "GOOGL", "GOOG", "NVDA", "META", "TSLA", "BRK-B", "UNH", "LLY", "JPM",
    "V", "XOM", "WMT", "JNJ", "MA", "PG", "ORCL", "AVGO", "HD", "CVX", "MRK", "COST", "ADBE",
    "NFLX", "CRM", "TMO", "PEP", "KO", "CSCO", "ACN", "ABT", "MCD", "DHR", "TXN", "LIN", "AMD",
    "NKE", "PM", "BMY", "PFE", "WFC", "DIS", "AMGN", "IBM", "INTC", "QCOM", "UPS", "MS", "GS",
    "BAC", "C", "BLK", "CAT", "DE", "HON", "LMT", "BA", "GE", "SBUX", "BKNG", "AMAT", "GILD",
    "ISRG", "ADP", "MU", "T", "VZ", "MO", "SO", "NEE", "DUK", "UNP", "PLD", "RTX", "MDLZ", "LOW",
    "SPGI", "CHTR", "TGT", "CVS", "COP", "ELV", "SCHW", "USB", "BK", "CB", "CME", "ICE", "AON",
    "MET", "PRU", "PNC", "TFC", "OXY", "PSX", "MPC", "F", "GM", "HCA", "CI", "HUM", "ZTS", "REGN",
    "MRVL", "LRCX", "ORLY", "AZO", "ROP", "FI", "ADI", "KLAC", "LULU", "AEP", "EOG", "KMI", "KHC",
    "DG", "DHI", "PGR", "ALL",
];

/// Canonical ticker form: trimmed, upper case, share classes joined with `-`.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_ascii_uppercase().replace('.', "-")
}

/// The built-in universe.
pub fn static_universe() -> Vec<Stock> {
    STATIC_SYMBOLS
        .iter()
        .map(|symbol| Stock {
            symbol: symbol.to_string(),
            name: None,
            sector: None,
        })
        .collect()
}

/// Reads the universe from the CSV at `path`, or falls back to the
/// built-in list when no path is given.
pub fn load_universe(path: Option<&Path>) -> Result<Vec<Stock>, IngestError> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let stocks = parse_universe_csv(&text)?;
            tracing::info!(path = %path.display(), symbols = stocks.len(), "Loaded symbol universe.");
            Ok(stocks)
        }
        None => Ok(static_universe()),
    }
}

/// Downloads a constituents CSV (e.g. `Symbol,Security,GICS Sector`).
pub async fn fetch_universe(url: &str, timeout: Duration) -> Result<Vec<Stock>, IngestError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::Universe(format!(
            "{url} answered with status {}",
            status.as_u16()
        )));
    }
    let stocks = parse_universe_csv(&response.text().await?)?;
    tracing::info!(url, symbols = stocks.len(), "Downloaded symbol universe.");
    Ok(stocks)
}

/// The universe for an ingest run: the configured file, else the remote
/// constituents list, else the built-in symbols.
///
/// A configured file that cannot be read is an error. A remote list that
/// cannot be fetched only logs a warning.
pub async fn resolve_universe(settings: &IngestSettings) -> Result<Vec<Stock>, IngestError> {
    if let Some(path) = settings.symbols_csv.as_deref() {
        return load_universe(Some(Path::new(path)));
    }
    if let Some(url) = settings.universe_url.as_deref() {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        match fetch_universe(url, timeout).await {
            Ok(stocks) => return Ok(stocks),
            Err(e) => tracing::warn!(url, error = %e, "Universe download failed, using the built-in list."),
        }
    }
    Ok(static_universe())
}

/// Parses a `symbol[,name,sector]` CSV. Header names are case-insensitive
/// and `ticker` is accepted in place of `symbol`. Duplicate symbols keep
/// their first row.
pub fn parse_universe_csv(text: &str) -> Result<Vec<Stock>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };

    let symbol_idx = column(&["symbol", "ticker"])
        .ok_or_else(|| IngestError::Universe("CSV has no symbol column".to_string()))?;
    let name_idx = column(&["name", "security"]);
    let sector_idx = column(&["sector", "gics sector"]);

    let optional = |record: &csv::StringRecord, idx: Option<usize>| {
        idx.and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut seen = BTreeSet::new();
    let mut stocks = Vec::new();
    for record in reader.records() {
        let record = record?;
        let symbol = normalize_symbol(record.get(symbol_idx).unwrap_or_default());
        if symbol.is_empty() || !seen.insert(symbol.clone()) {
            continue;
        }
        stocks.push(Stock {
            symbol,
            name: optional(&record, name_idx),
            sector: optional(&record, sector_idx),
        });
    }

    if stocks.is_empty() {
        return Err(IngestError::Universe("CSV lists no symbols".to_string()));
    }
    Ok(stocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_optional_columns_and_normalizes() {
        let text = "Symbol,Security,GICS Sector\nbrk.b,Berkshire Hathaway,Financials\nAAPL,,\n aapl ,Apple,Tech\n";
        let stocks = parse_universe_csv(text).unwrap();

        assert_eq!(stocks.len(), 2);
        assert_eq!(stocks[0].symbol, "BRK-B");
        assert_eq!(stocks[0].sector.as_deref(), Some("Financials"));
        assert_eq!(stocks[1].symbol, "AAPL");
        assert_eq!(stocks[1].name, None);
    }

    #[test]
    fn symbol_column_is_required() {
        assert!(matches!(
            parse_universe_csv("name\nApple\n"),
            Err(IngestError::Universe(_))
        ));
    }

    #[test]
    fn falls_back_to_static_list() {
        let stocks = load_universe(None).unwrap();
        assert_eq!(stocks.len(), STATIC_SYMBOLS.len());
        assert!(stocks.len() > 100);
    }

    #[test]
    fn reads_universe_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ticker\nMSFT\nNVDA").unwrap();
        let stocks = load_universe(Some(file.path())).unwrap();
        assert_eq!(stocks.len(), 2);
    }

    const CONSTITUENTS: &str = "Symbol,Security,GICS Sector,GICS Sub-Industry\n\
                                MMM,3M,Industrials,Industrial Conglomerates\n\
                                BF.B,Brown-Forman,Consumer Staples,Distillers & Vintners\n";

    #[tokio::test]
    async fn downloads_remote_constituents_with_metadata() {
        let url = crate::test_support::serve(200, "text/csv", CONSTITUENTS).await;
        let settings = IngestSettings {
            universe_url: Some(url),
            ..Default::default()
        };

        let stocks = resolve_universe(&settings).await.unwrap();
        assert_eq!(stocks.len(), 2);
        assert_eq!(stocks[1].symbol, "BF-B");
        assert_eq!(stocks[1].name.as_deref(), Some("Brown-Forman"));
        assert_eq!(stocks[0].sector.as_deref(), Some("Industrials"));
    }

    #[tokio::test]
    async fn failed_download_falls_back_to_static_list() {
        let url = crate::test_support::serve(500, "text/plain", "oops").await;
        assert!(matches!(
            fetch_universe(&url, Duration::from_secs(5)).await,
            Err(IngestError::Universe(_))
        ));

        let settings = IngestSettings {
            universe_url: Some(url),
            ..Default::default()
        };
        assert_eq!(resolve_universe(&settings).await.unwrap().len(), STATIC_SYMBOLS.len());
    }

    #[tokio::test]
    async fn configured_file_wins_over_remote_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "symbol\nAAPL").unwrap();
        let settings = IngestSettings {
            symbols_csv: Some(file.path().display().to_string()),
            universe_url: Some("http://127.0.0.1:1/unused.csv".to_string()),
            ..Default::default()
        };
        let stocks = resolve_universe(&settings).await.unwrap();
        assert_eq!(stocks.len(), 1);
    }
}
