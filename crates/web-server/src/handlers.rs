use crate::{error::AppError, AppState};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use core_types::{
    BuildStatus, CompositionChange, ConstituentWeight, DateRange, IndexPerformance, TradingDate,
};
use exporter::{ExportBundle, ExportSheet};
use index_engine::IndexError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RangeRequest {
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl RangeRequest {
    fn range(&self) -> Result<DateRange, AppError> {
        Ok(DateRange::from_inputs(&self.start_date, self.end_date.as_deref())?)
    }
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub sheet: Option<String>,
}

/// Body returned by a build over a range with no market data.
#[derive(Debug, Serialize)]
struct BuildFailure {
    status: BuildStatus,
    message: &'static str,
}

/// # POST /build-index
/// Builds and stores the index for the requested range. A range without
/// trading days is reported in the body rather than as an HTTP error.
pub async fn build_index(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RangeRequest>,
) -> Result<Response, AppError> {
    let range = request.range()?;
    match state.builder.build(range).await {
        Ok(summary) => {
            state.queries.invalidate().await;
            Ok(Json(summary).into_response())
        }
        Err(IndexError::NoTradingDays { .. }) => Ok(Json(BuildFailure {
            status: BuildStatus::Error,
            message: "No trading days in range",
        })
        .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// # GET /index-performance
pub async fn get_index_performance(
    State(state): State<Arc<AppState>>,
    Query(request): Query<RangeRequest>,
) -> Result<Json<Vec<IndexPerformance>>, AppError> {
    let rows = state.queries.performance(request.range()?).await?;
    Ok(Json(rows))
}

/// # GET /index-composition
pub async fn get_index_composition(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<ConstituentWeight>>, AppError> {
    let date = TradingDate::parse(&query.date)?;
    let rows = state.queries.composition(date).await?;
    Ok(Json(rows))
}

/// # GET /composition-changes
pub async fn get_composition_changes(
    State(state): State<Arc<AppState>>,
    Query(request): Query<RangeRequest>,
) -> Result<Json<Vec<CompositionChange>>, AppError> {
    let rows = state.queries.changes(request.range()?).await?;
    Ok(Json(rows))
}

/// # POST /export-data
/// Returns one sheet of the export as a CSV attachment.
pub async fn export_data(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExportRequest>,
) -> Result<Response, AppError> {
    let range = DateRange::from_inputs(&request.start_date, request.end_date.as_deref())?;
    let sheet = match request.sheet.as_deref() {
        Some(raw) => raw.parse::<ExportSheet>()?,
        None => ExportSheet::default(),
    };

    let bundle = ExportBundle::gather(state.store.clone(), range).await?;
    let body = bundle.render(sheet)?;
    let disposition = format!("attachment; filename={}", sheet.file_name());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::{InMemoryCache, ResponseCache};
    use configuration::Settings;
    use core_types::{MarketCapSnapshot, PriceSnapshot};
    use database::{IndexStore, InMemoryStore, MarketDataWriter};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> TradingDate {
        TradingDate::from_ymd(2024, 1, d).unwrap()
    }

    async fn seed(store: &InMemoryStore, date: TradingDate, rows: &[(&str, Decimal, Decimal)]) {
        let caps: Vec<MarketCapSnapshot> = rows
            .iter()
            .map(|(symbol, cap, _)| MarketCapSnapshot {
                date,
                symbol: symbol.to_string(),
                market_cap: *cap,
            })
            .collect();
        let prices: Vec<PriceSnapshot> = rows
            .iter()
            .map(|(symbol, _, close)| PriceSnapshot {
                date,
                symbol: symbol.to_string(),
                close: Some(*close),
                adj_close: Some(*close),
                volume: None,
            })
            .collect();
        store.upsert_market_caps(&caps).await.unwrap();
        store.upsert_prices(&prices).await.unwrap();
    }

    async fn test_state() -> Arc<AppState> {
        let store = InMemoryStore::new();
        seed(&store, day(2), &[("A", dec!(500), dec!(10)), ("B", dec!(400), dec!(20)), ("C", dec!(100), dec!(5))]).await;
        seed(&store, day(3), &[("A", dec!(520), dec!(10.4)), ("D", dec!(200), dec!(8)), ("C", dec!(90), dec!(4.5))]).await;

        let mut settings = Settings::default();
        settings.index.top_n = 2;
        let store: Arc<dyn IndexStore> = Arc::new(store);
        let cache: Arc<dyn ResponseCache> = Arc::new(InMemoryCache::new());
        Arc::new(AppState::new(store, cache, &settings))
    }

    fn range(start: &str, end: Option<&str>) -> RangeRequest {
        RangeRequest {
            start_date: start.to_string(),
            end_date: end.map(str::to_string),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn build_then_read_every_endpoint() {
        let state = test_state().await;

        let response = build_index(State(state.clone()), Json(range("2024-01-02", Some("2024-01-03"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["days_processed"], 2);

        let Json(performance) =
            get_index_performance(State(state.clone()), Query(range("2024-01-02", Some("2024-01-03"))))
                .await
                .unwrap();
        assert_eq!(performance.len(), 2);
        assert_eq!(performance[1].index_level, dec!(104));

        let Json(composition) = get_index_composition(
            State(state.clone()),
            Query(DateQuery {
                date: "2024-01-03".to_string(),
            }),
        )
        .await
        .unwrap();
        let symbols: Vec<&str> = composition.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "D"]);

        let Json(changes) =
            get_composition_changes(State(state), Query(range("2024-01-02", Some("2024-01-03"))))
                .await
                .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].entered, vec!["D"]);
        assert_eq!(changes[0].exited, vec!["B"]);
    }

    #[tokio::test]
    async fn building_refreshes_cached_reads() {
        let state = test_state().await;
        let request = || Query(range("2024-01-02", Some("2024-01-03")));

        let Json(before) = get_index_performance(State(state.clone()), request()).await.unwrap();
        assert!(before.is_empty());

        build_index(State(state.clone()), Json(range("2024-01-02", Some("2024-01-03"))))
            .await
            .unwrap();

        let Json(after) = get_index_performance(State(state), request()).await.unwrap();
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn empty_build_range_reports_status_error() {
        let state = test_state().await;
        let response = build_index(State(state), Json(range("2023-06-01", None)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "No trading days in range");
    }

    #[tokio::test]
    async fn malformed_dates_are_rejected() {
        let state = test_state().await;
        let err = get_index_performance(State(state.clone()), Query(range("01/02/2024", None)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = get_index_composition(
            State(state),
            Query(DateQuery {
                date: "tomorrow".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn exports_a_csv_attachment() {
        let state = test_state().await;
        build_index(State(state.clone()), Json(range("2024-01-02", Some("2024-01-03"))))
            .await
            .unwrap();

        let response = export_data(
            State(state.clone()),
            Json(ExportRequest {
                start_date: "2024-01-02".to_string(),
                end_date: Some("2024-01-03".to_string()),
                sheet: Some("changes".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=index_changes.csv"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"date,entered,exited\n2024-01-03,D,B\n");

        let err = export_data(
            State(state),
            Json(ExportRequest {
                start_date: "2024-01-02".to_string(),
                end_date: None,
                sheet: Some("xlsx".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
