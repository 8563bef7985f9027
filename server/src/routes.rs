//! HTTP route handlers for the Galaxy server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /rooms`, `GET /rooms/{id}` - Room catalogue
//! - `GET|POST /booking`, `GET|PUT|DELETE /booking/{id}` - Bookings
//! - `GET|POST /review`, `GET /review/{id}` - Reviews
//! - `POST /jwt` - Issue the auth cookie
//! - `GET /` - Liveness string
//! - `GET /health` - Health check including a store ping
//!
//! Only `GET /booking` sits behind [`require_identity`]; it additionally
//! requires the `email` query to match the token's identity.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use galaxy_server::config::Config;
//! use galaxy_server::routes::{create_router, AppState};
//! use galaxy_server::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config, Arc::new(MemoryStore::new()));
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5001").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::{auth_cookie, issue_token, require_identity, AuthError, Claims};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::store::{Collection, DocumentStore, FieldFilter, SortDirection, SortSpec};
use crate::types::{
    BookingDates, DeleteAck, IdentityPayload, InsertAck, NewBooking, NewReview, Record, RecordId,
    UpdateAck,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum accepted request body (64 KiB).
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Body of `GET /`.
pub const LIVENESS_MESSAGE: &str = "Galaxy Server is running perfect";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Cloned per request; the store handle and config are reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Document store shared by every handler.
    pub store: Arc<dyn DocumentStore>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state around an opened store.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("store", &"<DocumentStore>")
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// JSON body extractor whose rejections use the API error format.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query extractor whose rejections use the API error format.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path extractor whose rejections use the API error format.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// Layers, innermost first: body limit, CORS, request tracing.
pub fn create_router(state: AppState) -> Router {
    let gate = middleware::from_fn_with_state(state.clone(), require_identity);
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/rooms", get(list_rooms))
        .route("/rooms/{id}", get(get_room))
        .route(
            "/booking",
            get(list_bookings).route_layer(gate).post(create_booking),
        )
        .route(
            "/booking/{id}",
            get(get_booking).put(update_booking).delete(delete_booking),
        )
        .route("/review", get(list_reviews).post(create_review))
        .route("/review/{id}", get(get_review))
        .route("/jwt", post(issue_jwt))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the CORS policy.
///
/// With configured origins, credentialed requests (the auth cookie) are
/// allowed from exactly those origins. Without, any origin may call the API
/// but browsers will not attach cookies.
fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

// ============================================================================
// GET / and GET /health
// ============================================================================

async fn get_root() -> &'static str {
    LIVENESS_MESSAGE
}

/// Response body for the health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` when the store answered, `degraded` otherwise.
    pub status: String,

    /// `up` or `down`.
    pub store: String,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// Answers 200 when the store ping succeeds and 503 otherwise.
async fn get_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_up = match state.store.ping().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "Store ping failed");
            false
        }
    };

    let (status, label) = if store_up {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            store: if store_up { "up" } else { "down" }.to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    )
}

// ============================================================================
// Rooms
// ============================================================================

/// Query parameters for `GET /rooms`.
#[derive(Debug, Default, Deserialize)]
pub struct RoomsQuery {
    /// Price ordering directive: positive ascends, negative descends.
    pub sort: Option<String>,
}

impl RoomsQuery {
    /// Price ordering requested by the caller, if any.
    ///
    /// Only the leading integer counts, so `1.5` and `2abc` ascend. Absent,
    /// zero and non-numeric directives leave the store's default order.
    pub fn sort_spec(&self) -> Option<SortSpec> {
        let directive = leading_integer(self.sort.as_deref()?)?;
        SortDirection::from_directive(directive).map(|direction| SortSpec {
            field: "price",
            direction,
        })
    }
}

/// Reads an optional sign and the decimal digits that follow it, after any
/// leading whitespace. Trailing characters are ignored; an oversized value
/// saturates.
fn leading_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return None;
    }

    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// GET /rooms - All rooms, optionally ordered by price.
async fn list_rooms(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<RoomsQuery>,
) -> Result<Json<Vec<Record>>> {
    let sort = params.sort_spec();
    let rooms = state.store.find(Collection::Rooms, None, sort).await?;
    debug!(count = rooms.len(), sort = ?sort, "Listed rooms");
    Ok(Json(rooms))
}

/// GET /rooms/{id} - A single room.
async fn get_room(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Record>> {
    let id: RecordId = id.parse()?;
    state
        .store
        .find_by_id(Collection::Rooms, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("room {id} not found")))
}

// ============================================================================
// Bookings
// ============================================================================

/// Query parameters for `GET /booking`.
#[derive(Debug, Default, Deserialize)]
pub struct BookingQuery {
    /// Owner whose bookings are requested.
    pub email: Option<String>,
}

/// GET /booking - Bookings owned by the authenticated identity.
///
/// # Responses
///
/// - `200 OK` - Array of booking records
/// - `401 Unauthorized` - Missing or invalid token cookie (from the gate)
/// - `403 Forbidden` - `email` query absent or not the token's identity
async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(params): ApiQuery<BookingQuery>,
) -> Result<Json<Vec<Record>>> {
    if params.email.as_deref() != Some(claims.email.as_str()) {
        warn!(
            requested = ?params.email,
            "Booking listing refused: identity does not match requested owner"
        );
        return Err(ApiError::forbidden("forbidden access"));
    }

    let filter = params.email.map(|email| FieldFilter::new("email", email));
    let bookings = state.store.find(Collection::Bookings, filter, None).await?;
    debug!(count = bookings.len(), "Listed bookings");
    Ok(Json(bookings))
}

/// GET /booking/{id} - A single booking.
async fn get_booking(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Record>> {
    let id: RecordId = id.parse()?;
    state
        .store
        .find_by_id(Collection::Bookings, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("booking {id} not found")))
}

/// POST /booking - Create a booking.
///
/// The owner email and stay dates are checked; every other field is stored
/// as submitted.
async fn create_booking(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<NewBooking>,
) -> Result<Json<InsertAck>> {
    let (id, record) = payload.into_record()?;
    let ack = state.store.insert(Collection::Bookings, id, record).await?;
    info!(booking_id = %ack.inserted_id, "Booking created");
    Ok(Json(ack))
}

/// PUT /booking/{id} - Reschedule a booking.
///
/// Only `checkIn` and `checkOut` are written. An unknown id creates a new
/// record holding just those two fields.
async fn update_booking(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(dates): ApiJson<BookingDates>,
) -> Result<Json<UpdateAck>> {
    let id: RecordId = id.parse()?;
    let fields = dates.into_fields()?;
    let ack = state
        .store
        .upsert_fields(Collection::Bookings, &id, fields)
        .await?;

    if ack.upserted_id.is_some() {
        warn!(booking_id = %id, "Reschedule created a booking without owner fields");
    } else {
        info!(booking_id = %id, modified = ack.modified_count, "Booking rescheduled");
    }
    Ok(Json(ack))
}

/// DELETE /booking/{id} - Cancel a booking. Deleting twice is not an error.
async fn delete_booking(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<DeleteAck>> {
    let id: RecordId = id.parse()?;
    let ack = state.store.delete(Collection::Bookings, &id).await?;
    info!(booking_id = %id, deleted = ack.deleted_count, "Booking delete processed");
    Ok(Json(ack))
}

// ============================================================================
// Reviews
// ============================================================================

/// Query parameters for `GET /review`.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    /// Subject (room) filter.
    pub sid: Option<String>,
}

/// POST /review - Submit a review.
async fn create_review(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<NewReview>,
) -> Result<Json<InsertAck>> {
    let record = payload.into_record()?;
    let ack = state
        .store
        .insert(Collection::Reviews, RecordId::new(), record)
        .await?;
    info!(review_id = %ack.inserted_id, "Review created");
    Ok(Json(ack))
}

/// GET /review - All reviews, or those for one subject.
async fn list_reviews(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ReviewQuery>,
) -> Result<Json<Vec<Record>>> {
    let filter = params.sid.map(|sid| FieldFilter::new("sid", sid));
    let reviews = state.store.find(Collection::Reviews, filter, None).await?;
    debug!(count = reviews.len(), "Listed reviews");
    Ok(Json(reviews))
}

/// GET /review/{id} - A single review.
async fn get_review(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Record>> {
    let id: RecordId = id.parse()?;
    state
        .store
        .find_by_id(Collection::Reviews, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("review {id} not found")))
}

// ============================================================================
// POST /jwt - Token Issuance
// ============================================================================

/// Response body for `POST /jwt`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtResponse {
    pub success: bool,
}

/// POST /jwt - Sign the submitted identity and set it as the `token` cookie.
async fn issue_jwt(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<IdentityPayload>,
) -> Result<(CookieJar, Json<JwtResponse>)> {
    let (email, extra) = payload.into_parts()?;
    let secret = state
        .config
        .token_secret
        .as_deref()
        .ok_or(AuthError::MissingSecret)?;

    let token = issue_token(secret, &email, extra)?;
    info!("Issued auth token");

    let jar = jar.add(auth_cookie(token, state.config.cookie_secure));
    Ok((jar, Json(JwtResponse { success: true })))
}

// ============================================================================
// Tests
// ============================================================================
