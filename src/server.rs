use crate::apis::{EventSearch, SearchCriteria};
use crate::constants::{ALL_CLASSIFICATIONS, DEFAULT_CLASSIFICATIONS, DEFAULT_DAYS_AHEAD, DEFAULT_PAGE_SIZE};
use crate::domain::{Event, EventPreview};
use crate::error::EventsError;
use crate::pipeline::filter::{clamp_days_ahead, parse_classifications, EventFilter, Pagination};
use crate::pipeline::listing::list_events;
use crate::pipeline::normalize::normalize_event;
use crate::storage::EventStore;
use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use hyper::Server;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared handler state; both collaborators are injected by the caller
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub search: Arc<dyn EventSearch>,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, search: Arc<dyn EventSearch>) -> Self {
        Self { store, search }
    }
}

/// Query parameters accepted by every listing route
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub city: Option<String>,
    pub country: Option<String>,
    pub days_ahead: Option<i64>,
    pub classification: Option<String>,
    pub size: Option<u32>,
    pub keyword: Option<String>,
    pub page: Option<u32>,
}

impl EventsQuery {
    fn classifications(&self) -> Vec<String> {
        parse_classifications(
            self.classification
                .as_deref()
                .unwrap_or(DEFAULT_CLASSIFICATIONS),
        )
    }

    fn days_ahead(&self) -> i64 {
        clamp_days_ahead(self.days_ahead.unwrap_or(DEFAULT_DAYS_AHEAD))
    }

    /// Fill in the non-date criteria of a filter whose window is already set
    pub fn apply(&self, window: EventFilter) -> EventFilter {
        EventFilter {
            city: self.city.clone(),
            country: self.country.clone(),
            classifications: self.classifications(),
            keyword: self.keyword.clone(),
            page_size: self.size.unwrap_or(DEFAULT_PAGE_SIZE),
            page: self.page.unwrap_or(0),
            ..window
        }
    }
}

/// Echo of the criteria a listing was produced with
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiltersApplied {
    pub city: Option<String>,
    pub country: Option<String>,
    pub classifications: Vec<String>,
    pub keyword: Option<String>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub size: u32,
    pub page: u32,
}

impl From<&EventFilter> for FiltersApplied {
    fn from(filter: &EventFilter) -> Self {
        Self {
            city: filter.city.clone(),
            country: filter.country.clone(),
            classifications: filter.classifications.clone(),
            keyword: filter.keyword.clone(),
            date_from: filter.date_from,
            date_to: filter.date_to,
            size: filter.effective_page_size(),
            page: filter.page,
        }
    }
}

/// Success envelope shared by all event routes
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsEnvelope<T> {
    pub events: Vec<T>,
    pub pagination: Pagination,
    pub filters_applied: FiltersApplied,
    pub status: &'static str,
}

impl<T> EventsEnvelope<T> {
    fn success(events: Vec<T>, pagination: Pagination, filter: &EventFilter) -> Self {
        Self {
            events,
            pagination,
            filters_applied: FiltersApplied::from(filter),
            status: "success",
        }
    }
}

/// Any pipeline failure, rendered as the failure envelope with HTTP 500
#[derive(Debug)]
pub struct ApiError(EventsError);

impl From<EventsError> for ApiError {
    fn from(err: EventsError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "status": "error",
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

type ApiResult<T> = Result<Json<EventsEnvelope<T>>, ApiError>;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "event-feed",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn stored_listing(state: &AppState, filter: EventFilter) -> ApiResult<Event> {
    let listing = list_events(state.store.as_ref(), &filter).await?;
    Ok(Json(EventsEnvelope::success(
        listing.events,
        listing.pagination,
        &filter,
    )))
}

async fn upcoming_events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> ApiResult<Event> {
    let filter = query.apply(EventFilter::upcoming(today(), query.days_ahead()));
    stored_listing(&state, filter).await
}

async fn todays_events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> ApiResult<Event> {
    let filter = query.apply(EventFilter::today(today()));
    stored_listing(&state, filter).await
}

async fn this_weeks_events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> ApiResult<Event> {
    let filter = query.apply(EventFilter::this_week(today()));
    stored_listing(&state, filter).await
}

async fn event_previews(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<EventPreview> {
    let filter = query.apply(EventFilter::upcoming(today(), query.days_ahead()));
    let listing = list_events(state.store.as_ref(), &filter).await?;
    let previews = listing.events.iter().map(EventPreview::from).collect();
    Ok(Json(EventsEnvelope::success(
        previews,
        listing.pagination,
        &filter,
    )))
}

/// Remote search criteria for the live route; the country param is passed as a country code
fn live_criteria(filter: &EventFilter) -> SearchCriteria {
    let now = Utc::now();
    let classification_names = if filter
        .classifications
        .iter()
        .any(|c| c.eq_ignore_ascii_case(ALL_CLASSIFICATIONS))
    {
        Vec::new()
    } else {
        filter.classifications.clone()
    };

    SearchCriteria {
        keyword: filter.keyword.clone(),
        country_code: filter.country.clone(),
        city: filter.city.clone(),
        classification_names,
        start_date_time: Some(now),
        end_date_time: Some(now + Duration::days((filter.date_to - filter.date_from).num_days())),
        size: filter.effective_page_size(),
        page: filter.page,
        sort: "date,asc".to_string(),
        ..SearchCriteria::default()
    }
}

async fn live_events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> ApiResult<Event> {
    let filter = query.apply(EventFilter::upcoming(today(), query.days_ahead()));
    let page = state.search.search(&live_criteria(&filter)).await?;

    let events: Vec<Event> = page
        .events
        .iter()
        .filter_map(|raw| match normalize_event(raw) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Dropping live event: {}", e);
                None
            }
        })
        .collect();

    let pagination = Pagination {
        total_count: page.page.total_elements,
        total_pages: page.page.total_pages,
        current_page: page.page.number as u32,
        page_size: filter.effective_page_size(),
        returned: events.len(),
    };
    Ok(Json(EventsEnvelope::success(events, pagination, &filter)))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Create the HTTP server with all routes
pub fn create_server(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/events", get(upcoming_events))
        .route("/api/events/today", get(todays_events))
        .route("/api/events/this-week", get(this_weeks_events))
        .route("/api/events/preview", get(event_previews))
        .route("/api/events/live", get(live_events))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origins)),
        )
}

/// Start the HTTP server on the specified port
pub async fn start_server(state: AppState, port: u16, cors_origins: &[String]) -> anyhow::Result<()> {
    let app = create_server(state, cors_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP server listening on http://{}", addr);
    info!("Health check: http://localhost:{}/health", port);

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
