use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use cache::{build_cache, CachedQueries, ResponseCache};
use configuration::Settings;
use database::{DbRepository, IndexStore};
use index_engine::IndexBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

/// The shared application state that all handlers can access.
pub struct AppState {
    pub store: Arc<dyn IndexStore>,
    pub builder: IndexBuilder<dyn IndexStore>,
    pub queries: CachedQueries<dyn IndexStore>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IndexStore>,
        cache: Arc<dyn ResponseCache>,
        settings: &Settings,
    ) -> Self {
        Self {
            builder: IndexBuilder::new(store.clone(), settings.index.clone()),
            queries: CachedQueries::new(
                store.clone(),
                cache,
                Duration::from_secs(settings.cache.ttl_secs),
            ),
            store,
        }
    }
}

/// All routes, with CORS and request tracing applied.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/build-index", post(handlers::build_index))
        .route("/index-performance", get(handlers::get_index_performance))
        .route("/index-composition", get(handlers::get_index_composition))
        .route("/composition-changes", get(handlers::get_composition_changes))
        .route("/export-data", post(handlers::export_data))
        .with_state(state)
        .layer(cors)
        // Logs every incoming request.
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
}

/// Connects to Postgres, applies migrations, picks a cache backend and
/// serves the API until the process is stopped.
///
/// Tracing must already be initialized by the caller.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let addr = settings.server.socket_addr()?;

    let db_pool = database::connect(&settings.database).await?;
    database::run_migrations(&db_pool).await?;
    let store: Arc<dyn IndexStore> = Arc::new(DbRepository::new(db_pool));
    let cache = build_cache(&settings.cache).await;

    let app_state = Arc::new(AppState::new(store, cache, &settings));
    let app = router(app_state);

    tracing::info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
