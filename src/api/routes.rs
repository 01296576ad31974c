use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AnalyticsConfig;
use crate::tracker::AccessTracker;

use super::handlers::{
    health_check, link_events, link_time_series, owner_events, owner_live, record_event,
    track_link_activity, AppState,
};

pub fn create_api_router(tracker: Arc<AccessTracker>, analytics: AnalyticsConfig) -> Router {
    let state = Arc::new(AppState { tracker, analytics });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/events", post(record_event))
        .route("/links/{link_id}/activity", post(track_link_activity))
        .route("/links/{link_id}/timeseries", get(link_time_series))
        .route("/links/{link_id}/events", get(link_events))
        .route("/owners/{owner_id}/events", get(owner_events))
        .route("/owners/{owner_id}/live", get(owner_live))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
