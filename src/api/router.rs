//! Route table and middleware stack.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{auth_middleware, AuthClient};

use super::handlers::{self, AppState};

pub fn build_router(state: AppState, auth: Arc<AuthClient>) -> Router {
    // Deployed front-end plus local dev servers; credentials are allowed so
    // the origin list must be explicit.
    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in [
        state.config.frontend_origin.as_str(),
        "http://localhost:3000",
        "http://localhost:5173",
    ] {
        match origin.parse() {
            Ok(value) => origins.push(value),
            Err(_) => warn!(origin, "invalid CORS origin skipped"),
        }
    }
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = Router::new()
        .route("/api/prices/latest", get(handlers::get_prices_latest))
        .route("/api/prices/history/:region", get(handlers::get_price_history))
        .route("/api/forward/:region", get(handlers::get_forward))
        .route("/api/fcas/latest", get(handlers::get_fcas_latest))
        .route("/api/demand/forecast", get(handlers::get_demand_forecast))
        .route("/api/trading/positions", get(handlers::get_positions))
        .route("/api/trading/position", post(handlers::post_position))
        .route("/api/trading/close/:id", post(handlers::post_close_position))
        .route("/api/bess/optimize", post(handlers::post_bess_optimize))
        .route("/api/ws", get(handlers::ws_upgrade))
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state.clone());

    // Admin + liveness surface, no auth.
    let public_routes = Router::new()
        .route("/", get(handlers::service_info))
        .route("/health", get(handlers::health))
        .route("/trigger", post(handlers::post_trigger))
        .route("/test", get(handlers::get_test))
        .route("/validate", get(handlers::get_validate))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
