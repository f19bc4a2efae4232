//! Read API handlers.
//!
//! Every cacheable endpoint goes through the same read-through path: tiered
//! cache first (the hit tier is surfaced in `X-Cache`), then a coalesced
//! store query on miss. Unexpected failures map to a generic 500 with a
//! correlation id; expected ones surface their status verbatim.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Extension, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::cache::{RequestCoalescer, TieredCache};
use crate::config::Config;
use crate::hub::LiveHub;
use crate::ingest::Orchestrator;
use crate::models::{PositionSide, Region, RegionPrice};
use crate::storage::{KvStore, Store, TTL_DISPATCH_SECS, TTL_FORWARD_SECS, TTL_TRADING_SECS};
use crate::timemap;
use crate::trading::{optimize_bess, BessRequest, CloseOutcome, TradingLedger};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub kv: Arc<KvStore>,
    pub cache: Arc<TieredCache>,
    pub coalescer: Arc<RequestCoalescer>,
    pub ledger: TradingLedger,
    pub hub: LiveHub,
    pub orchestrator: Arc<Orchestrator>,
}

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": what })),
            )
                .into_response(),
            ApiError::BadRequest(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "bad request", "details": details })),
            )
                .into_response(),
            ApiError::Internal(e) => {
                let correlation_id = Uuid::new_v4().to_string();
                error!(correlation_id = %correlation_id, error = %format!("{e:#}"), "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "internal error",
                        "correlation_id": correlation_id,
                    })),
                )
                    .into_response()
            }
        }
    }
}

fn parse_region(raw: &str) -> Result<Region, ApiError> {
    Region::parse(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown region: {raw}")))
}

/// JSON response with the cache-source and lifetime headers attached.
fn cached_json(data: Value, tier: &str, ttl_secs: u64) -> Response {
    let mut resp = Json(data).into_response();
    if let Ok(value) = HeaderValue::from_str(tier) {
        resp.headers_mut().insert("X-Cache", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={ttl_secs}")) {
        resp.headers_mut().insert(header::CACHE_CONTROL, value);
    }
    resp
}

/// Tiered-cache read-through with request coalescing on miss.
async fn read_through<F>(
    state: &AppState,
    cache_key: &str,
    ttl_secs: u64,
    producer: F,
) -> Result<Response, ApiError>
where
    F: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    let request_key = format!("req:{cache_key}");
    if let Some(hit) = state.cache.get(cache_key, Some(&request_key)) {
        return Ok(cached_json(hit.data, hit.tier.as_str(), ttl_secs));
    }

    let data = state.coalescer.run(cache_key, producer).await?;
    state
        .cache
        .set(cache_key, data.clone(), ttl_secs, Some(&request_key));
    if let Some(prefix) = cache_key.split(':').next() {
        state.cache.track_key(&format!("{prefix}:*"), cache_key);
    }
    Ok(cached_json(data, "miss", ttl_secs))
}

// ---- Public surface ----

pub async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "nemflow-backend",
        "description": "NEM market data ingestion and fan-out",
        "endpoints": [
            "/api/prices/latest",
            "/api/prices/history/{region}",
            "/api/forward/{region}",
            "/api/fcas/latest",
            "/api/demand/forecast",
            "/api/trading/positions",
            "/api/bess/optimize",
            "/api/ws",
        ],
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "nemflow-backend",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ---- Prices ----

pub async fn get_prices_latest(State(state): State<AppState>) -> Result<Response, ApiError> {
    let store = state.store.clone();
    read_through(&state, "prices:latest", TTL_DISPATCH_SECS, async move {
        let rows = store.latest_dispatch_prices().await?;
        let prices: Vec<RegionPrice> = rows.iter().map(RegionPrice::from_dispatch).collect();
        Ok(json!({
            "prices": prices,
            "updated_at": Utc::now().to_rfc3339(),
        }))
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<i64>,
}

pub async fn get_price_history(
    State(state): State<AppState>,
    Path(region): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let region = parse_region(&region)?;
    let hours = query.hours.unwrap_or(24).clamp(1, 168);

    let store = state.store.clone();
    let cache_key = format!("prices:history:{region}:{hours}");
    read_through(&state, &cache_key, TTL_DISPATCH_SECS, async move {
        let since = Utc::now() - Duration::hours(hours);
        let rows = store.dispatch_price_history(region, since).await?;
        let history: Vec<RegionPrice> = rows.iter().map(RegionPrice::from_dispatch).collect();
        Ok(json!({
            "region": region,
            "hours": hours,
            "count": history.len(),
            "history": history,
        }))
    })
    .await
}

// ---- Forward curve ----

#[derive(Debug, Deserialize)]
pub struct ForwardQuery {
    pub date: Option<String>,
}

pub async fn get_forward(
    State(state): State<AppState>,
    Path(region): Path<String>,
    Query(query): Query<ForwardQuery>,
) -> Result<Response, ApiError> {
    let region = parse_region(&region)?;
    let date = match query.date {
        Some(date) => date,
        // Default to the current market date.
        None => timemap::format_utc_as_market(Utc::now())[..10].replace('/', "-"),
    };

    // The date keys a market-local midnight-to-midnight window.
    let day_start = timemap::parse_market_to_utc(&format!(
        "{} 00:00:00",
        date.replace('-', "/")
    ))
    .map_err(|_| ApiError::BadRequest(format!("invalid date: {date}")))?;
    let day_end = day_start + Duration::hours(24);

    let store = state.store.clone();
    let cache_key = format!("forward:{region}:{date}");
    read_through(&state, &cache_key, TTL_FORWARD_SECS, async move {
        let rows = store.forward_curve(region, day_start, day_end).await?;
        Ok(json!({
            "region": region,
            "date": date,
            "count": rows.len(),
            "intervals": rows,
        }))
    })
    .await
}

// ---- FCAS ----

pub async fn get_fcas_latest(State(state): State<AppState>) -> Result<Response, ApiError> {
    let store = state.store.clone();
    read_through(&state, "fcas:latest", TTL_DISPATCH_SECS, async move {
        let rows = store.latest_fcas_prices().await?;
        Ok(json!({
            "services": rows,
            "updated_at": Utc::now().to_rfc3339(),
        }))
    })
    .await
}

// ---- Demand forecast ----

#[derive(Debug, Deserialize)]
pub struct DemandQuery {
    pub region: Option<String>,
}

pub async fn get_demand_forecast(
    State(state): State<AppState>,
    Query(query): Query<DemandQuery>,
) -> Result<Response, ApiError> {
    let region = parse_region(query.region.as_deref().unwrap_or("NSW1"))?;

    let store = state.store.clone();
    let cache_key = format!("demand:forecast:{region}");
    read_through(&state, &cache_key, TTL_TRADING_SECS, async move {
        let now = Utc::now();
        let series = store
            .demand_forecast(region, now, now + Duration::hours(24))
            .await?;
        let points: Vec<Value> = series
            .iter()
            .map(|(ts, mw)| json!({ "interval": ts, "demand_mw": mw }))
            .collect();
        Ok(json!({
            "region": region,
            "count": points.len(),
            "series": points,
        }))
    })
    .await
}

// ---- Trading positions ----

pub async fn get_positions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let positions = state.ledger.list(&user.user_id).await?;
    Ok(Json(json!({
        "count": positions.len(),
        "positions": positions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct OpenPositionRequest {
    pub region: String,
    pub side: String,
    pub entry_price: f64,
    pub quantity: f64,
}

pub async fn post_position(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<OpenPositionRequest>,
) -> Result<Json<Value>, ApiError> {
    let region = parse_region(&body.region)?;
    let side = PositionSide::parse(&body.side)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown side: {}", body.side)))?;
    if !(body.quantity > 0.0) {
        return Err(ApiError::BadRequest("quantity must be positive".to_string()));
    }
    if !body.entry_price.is_finite() {
        return Err(ApiError::BadRequest("entry_price must be a number".to_string()));
    }

    let position = state
        .ledger
        .open(
            &user.user_id,
            region,
            side,
            body.entry_price,
            body.quantity,
            Utc::now(),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "id": position.id,
        "position": position,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ClosePositionRequest {
    pub exit_price: f64,
}

pub async fn post_close_position(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ClosePositionRequest>,
) -> Result<Json<Value>, ApiError> {
    if !body.exit_price.is_finite() {
        return Err(ApiError::BadRequest("exit_price must be a number".to_string()));
    }

    match state
        .ledger
        .close(&user.user_id, &id, body.exit_price, Utc::now())
        .await?
    {
        CloseOutcome::Closed(position) => Ok(Json(json!({
            "success": true,
            "pnl": position.pnl,
            "position": position,
        }))),
        CloseOutcome::NotFound => Err(ApiError::NotFound("position not found".to_string())),
    }
}

// ---- BESS optimisation ----

pub async fn post_bess_optimize(
    State(state): State<AppState>,
    Json(body): Json<BessRequest>,
) -> Result<Json<Value>, ApiError> {
    let region = parse_region(&body.region)?;
    let start = timemap::parse_market_to_utc(&format!(
        "{} 00:00:00",
        body.start_date.replace('-', "/")
    ))
    .map_err(|_| ApiError::BadRequest(format!("invalid start_date: {}", body.start_date)))?;
    let end = timemap::parse_market_to_utc(&format!(
        "{} 00:00:00",
        body.end_date.replace('-', "/")
    ))
    .map_err(|_| ApiError::BadRequest(format!("invalid end_date: {}", body.end_date)))?;
    if end <= start {
        return Err(ApiError::BadRequest(
            "end_date must be after start_date".to_string(),
        ));
    }

    // Prefer settled 30-minute prices; fall back to the 5-minute series when
    // trading rows are sparse.
    let trading = state.store.trading_price_series(region, start, end).await?;
    let (series, interval_hours) = if trading.len() >= 2 {
        (trading, 0.5)
    } else {
        warn!(%region, "trading series sparse, optimising on dispatch prices");
        let dispatch = state.store.dispatch_price_series(region, start, end).await?;
        (dispatch, 1.0 / 12.0)
    };

    let result = optimize_bess(&body, &series, interval_hours);
    Ok(Json(serde_json::to_value(result).map_err(anyhow::Error::new)?))
}

// ---- WebSocket ----

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub regions: Option<String>,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = user
        .map(|Extension(u)| u.user_id)
        .or(query.user_id)
        .unwrap_or_else(|| "anonymous".to_string());
    let regions: Vec<String> = query
        .regions
        .map(|raw| raw.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| async move {
        hub.run_socket(socket, user_id, regions).await;
    })
}

// ---- Scraper admin surface ----

pub async fn post_trigger(State(state): State<AppState>) -> Json<Value> {
    let started = Utc::now();
    state.orchestrator.run_tick(started).await;
    Json(json!({
        "status": "completed",
        "started_at": started.to_rfc3339(),
        "finished_at": Utc::now().to_rfc3339(),
    }))
}

pub async fn get_test(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let diagnostics = state.orchestrator.diagnostic_dispatch().await?;
    Ok(Json(diagnostics))
}

pub async fn get_validate(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = state
        .orchestrator
        .run_validation(Utc::now())
        .await
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("validation run errored")))?;
    Ok(Json(serde_json::to_value(report).map_err(anyhow::Error::new)?))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("unknown route".to_string())
}
