//! HTTP surface: health, metrics, book views, venue metrics and routing

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::MarketDataError;
use crate::orderbook::{BookMaintainer, BookView};
use crate::telemetry::Telemetry;
use crate::venue::{RoutingContext, RoutingStats, SmartVenueRouter, VenueMetrics, VenueRegistry, VenueSelection};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub maintainer: BookMaintainer,
    pub registry: Arc<VenueRegistry>,
    pub router: Arc<SmartVenueRouter>,
    pub telemetry: Arc<Telemetry>,
}

impl AppState {
    pub fn new(
        maintainer: BookMaintainer,
        registry: Arc<VenueRegistry>,
        router: Arc<SmartVenueRouter>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            maintainer,
            registry,
            router,
            telemetry,
        }
    }

    /// Copy current venue metrics and book health into the gauges
    pub fn refresh_telemetry(&self) {
        self.telemetry
            .observe_venues(&self.registry.get_metrics(None, None));
        self.telemetry.observe_books(&self.maintainer.book_health());
    }
}

/// Handler error mapped onto an HTTP status
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Domain(MarketDataError),
}

impl From<MarketDataError> for ApiError {
    fn from(err: MarketDataError) -> Self {
        ApiError::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "BAD_REQUEST", "message": msg }),
            ),
            ApiError::Domain(err) => {
                let message = err.to_string();
                match err {
                    MarketDataError::UnknownBook { .. } => (
                        StatusCode::NOT_FOUND,
                        json!({ "error": "NOT_FOUND", "message": message }),
                    ),
                    MarketDataError::NoSuitableVenue { rejections, .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        json!({
                            "error": "NO_SUITABLE_VENUE",
                            "message": message,
                            "rejections": rejections,
                        }),
                    ),
                    MarketDataError::ShutDown => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        json!({ "error": "SERVICE_UNAVAILABLE", "message": message }),
                    ),
                    other => {
                        error!(error = %other, "Request failed");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            json!({ "error": "INTERNAL_ERROR", "message": "Internal server error" }),
                        )
                    }
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct BookQuery {
    pub depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct VenueQuery {
    pub venue: Option<String>,
    pub symbol: Option<String>,
}

/// Execution feedback for a previously routed order
#[derive(Debug, Deserialize)]
pub struct OutcomeReport {
    pub venue: String,
    pub symbol: String,
    pub success: bool,
    #[serde(default)]
    pub latency_ms: Option<f64>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/books/:venue/:symbol", get(get_book))
        .route("/venues", get(list_venues))
        .route("/route", post(select_venue))
        .route("/outcome", post(record_outcome))
        .route("/routing/stats", get(routing_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(state: AppState, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let books = state.maintainer.book_health();
    let healthy = !state.maintainer.is_shut_down() && books.iter().all(|b| b.healthy);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "component": "orp-flow-router",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "books": books,
        })),
    )
}

async fn metrics(State(state): State<AppState>) -> ApiResult<String> {
    state.refresh_telemetry();
    Ok(state.telemetry.encode()?)
}

async fn get_book(
    State(state): State<AppState>,
    Path((venue, symbol)): Path<(String, String)>,
    Query(query): Query<BookQuery>,
) -> ApiResult<Json<BookView>> {
    let view = match query.depth {
        Some(depth) => state.maintainer.get_book_top(&venue, &symbol, depth)?,
        None => state.maintainer.get_book(&venue, &symbol)?,
    };
    Ok(Json(view))
}

async fn list_venues(
    State(state): State<AppState>,
    Query(query): Query<VenueQuery>,
) -> Json<Vec<VenueMetrics>> {
    Json(
        state
            .registry
            .get_metrics(query.venue.as_deref(), query.symbol.as_deref()),
    )
}

async fn select_venue(
    State(state): State<AppState>,
    Json(context): Json<RoutingContext>,
) -> ApiResult<Json<VenueSelection>> {
    if !context.size.is_finite() || context.size <= 0.0 {
        return Err(ApiError::BadRequest(format!(
            "size must be a positive number, got {}",
            context.size
        )));
    }
    Ok(Json(state.router.select_venue(&context)?))
}

async fn record_outcome(
    State(state): State<AppState>,
    Json(report): Json<OutcomeReport>,
) -> StatusCode {
    let recorded = state
        .router
        .record_outcome(&report.venue, &report.symbol, report.success, report.latency_ms);
    if recorded {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn routing_stats(State(state): State<AppState>) -> Json<Vec<RoutingStats>> {
    Json(state.router.routing_stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FixtureFeed;
    use crate::orderbook::MaintainerSettings;
    use crate::venue::{RouterSettings, VenueMetricsUpdate};

    fn state() -> AppState {
        let maintainer = BookMaintainer::new(Arc::new(FixtureFeed::new()), MaintainerSettings::default());
        let registry = Arc::new(VenueRegistry::default());
        registry.update_venue_metric(
            "binance",
            "BTCUSDT",
            VenueMetricsUpdate {
                spread_bps: Some(2.0),
                top_depth_usd: Some(1_000_000.0),
                reliability_score: Some(0.95),
                ..Default::default()
            },
        );
        let router = Arc::new(SmartVenueRouter::new(registry.clone(), RouterSettings::default()));
        let telemetry = Arc::new(Telemetry::new().unwrap());
        AppState::new(maintainer, registry, router, telemetry)
    }

    #[tokio::test]
    async fn test_route_and_outcome_roundtrip() {
        let state = state();

        let Json(selection) = select_venue(
            State(state.clone()),
            Json(RoutingContext::new("BTCUSDT", 5_000.0)),
        )
        .await
        .unwrap();
        assert_eq!(selection.venue, "binance");

        let status = record_outcome(
            State(state.clone()),
            Json(OutcomeReport {
                venue: "binance".to_string(),
                symbol: "BTCUSDT".to_string(),
                success: true,
                latency_ms: Some(12.0),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let status = record_outcome(
            State(state.clone()),
            Json(OutcomeReport {
                venue: "nowhere".to_string(),
                symbol: "BTCUSDT".to_string(),
                success: false,
                latency_ms: None,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let Json(stats) = routing_stats(State(state)).await;
        assert_eq!(stats[0].total_routed, 1);
        assert_eq!(stats[0].lifetime_success_rate, Some(1.0));
    }

    #[tokio::test]
    async fn test_errors_map_to_status_codes() {
        let state = state();

        let err = select_venue(State(state.clone()), Json(RoutingContext::new("BTCUSDT", -1.0)))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = select_venue(
            State(state.clone()),
            Json(RoutingContext::new("BTCUSDT", 5_000.0).blacklist("binance")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = get_book(
            State(state),
            Path(("nowhere".to_string(), "BTCUSDT".to_string())),
            Query(BookQuery { depth: None }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_and_health() {
        let state = state();
        let body = metrics(State(state.clone())).await.unwrap();
        assert!(body.contains("venue_reliability_score"));

        let (status, _) = health_check(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);

        state.maintainer.shutdown();
        let (status, _) = health_check(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
