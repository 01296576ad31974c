use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{Extensions, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::analytics::extract_client_ip;
use crate::analytics::models::{
    AccessEventInput, EventDetails, EventDto, LegacyActivity, TimeSeriesPoint,
};
use crate::config::AnalyticsConfig;
use crate::tracker::AccessTracker;

/// Upper bound on building an owner feed for one request
pub const OWNER_FEED_DEADLINE: Duration = Duration::from_secs(10);

pub struct AppState {
    pub tracker: Arc<AccessTracker>,
    pub analytics: AnalyticsConfig,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Deserialize)]
pub struct MinutesQuery {
    pub minutes: Option<u32>,
}

/// Body of the pre-EventType tracking endpoint
#[derive(Deserialize)]
pub struct LegacyActivityRequest {
    #[serde(rename = "type")]
    pub activity: LegacyActivity,
    #[serde(rename = "clientIP", default)]
    pub client_ip: Option<String>,
    #[serde(flatten)]
    pub details: EventDetails,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventDto>,
    pub total: usize,
}

impl From<Vec<EventDto>> for EventsResponse {
    fn from(events: Vec<EventDto>) -> Self {
        Self {
            total: events.len(),
            events,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Address of the caller, when the connection or trusted headers reveal one
fn request_address(
    headers: &HeaderMap,
    extensions: &Extensions,
    config: &AnalyticsConfig,
) -> Option<String> {
    let socket_ip = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let ip = extract_client_ip(headers, socket_ip, config);
    (!ip.is_unspecified()).then(|| ip.to_string())
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Record one access event.
///
/// A `clientIP` in the body wins over the address of the connection, since
/// callers are usually the share-link front end relaying a visitor.
pub async fn record_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(mut input): Json<AccessEventInput>,
) -> Result<StatusCode, ApiError> {
    if input.link_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "linkId cannot be empty".to_string(),
            }),
        ));
    }
    if input.client_ip.is_none() {
        input.client_ip = request_address(&headers, &extensions, &state.analytics);
    }

    state
        .tracker
        .record(input)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|_| internal_error("Failed to record event"))
}

pub async fn track_link_activity(
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<String>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(payload): Json<LegacyActivityRequest>,
) -> Result<StatusCode, ApiError> {
    let client_ip = payload
        .client_ip
        .or_else(|| request_address(&headers, &extensions, &state.analytics));

    state
        .tracker
        .track_link_activity(&link_id, payload.activity, client_ip, payload.details)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|_| internal_error("Failed to record activity"))
}

pub async fn link_time_series(
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<String>,
    Query(params): Query<DaysQuery>,
) -> Json<Vec<TimeSeriesPoint>> {
    Json(state.tracker.time_series(&link_id, params.days).await)
}

pub async fn link_events(
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<String>,
    Query(params): Query<DaysQuery>,
) -> Json<EventsResponse> {
    Json(state.tracker.enriched_feed(&link_id, params.days).await.into())
}

pub async fn owner_events(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Query(params): Query<DaysQuery>,
) -> Json<EventsResponse> {
    let events = state
        .tracker
        .owner_feed_within(&owner_id, params.days, OWNER_FEED_DEADLINE)
        .await;
    Json(events.into())
}

pub async fn owner_live(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Query(params): Query<MinutesQuery>,
) -> Json<EventsResponse> {
    Json(state.tracker.live_visitors(&owner_id, params.minutes).await.into())
}
