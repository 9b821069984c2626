pub mod errors;
pub mod search;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use errors::ApiError;
use search::{SearchClient, SearchRequest};
use search_indexer::IndexBuilder;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub builder: IndexBuilder,
    pub search: Arc<SearchClient>,
}

#[derive(Deserialize)]
pub struct IndexPageParams {
    pub url: String,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub site: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

type ApiResult = Result<Json<Value>, ApiError>;

pub fn build_app(builder: IndexBuilder) -> Router {
    let search = SearchClient::new(
        builder.store().clone(),
        builder.extractor().clone(),
        builder.config().search.clone(),
    );
    let state = AppState { builder, search: Arc::new(search) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/startIndexing", get(start_indexing))
        .route("/api/stopIndexing", get(stop_indexing))
        .route("/api/indexPage", post(index_page))
        .route("/api/statistics", get(statistics))
        .route("/api/search", get(search_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_indexing(State(state): State<AppState>) -> ApiResult {
    state.builder.start()?;
    Ok(Json(json!({ "result": true })))
}

pub async fn stop_indexing(State(state): State<AppState>) -> ApiResult {
    state.builder.stop()?;
    Ok(Json(json!({ "result": true })))
}

pub async fn index_page(State(state): State<AppState>, Query(params): Query<IndexPageParams>) -> ApiResult {
    state.builder.index_page(params.url.trim()).await?;
    Ok(Json(json!({ "result": true })))
}

pub async fn statistics(State(state): State<AppState>) -> ApiResult {
    let statistics = state.builder.statistics()?;
    Ok(Json(json!({ "result": true, "statistics": statistics })))
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult {
    let request = SearchRequest {
        query: params.query,
        site: params.site.filter(|s| !s.is_empty()),
        offset: params.offset,
        limit: params.limit.unwrap_or(state.search.config().default_limit),
    };
    let client = state.search.clone();
    let results = tokio::task::spawn_blocking(move || client.search(&request))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))??;
    Ok(Json(json!({ "result": true, "count": results.count, "data": results.data })))
}
