//! Router, shared state, extractors and handlers.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

use datalayer_core::{
    Actor, ErrorLogRepository, EventEnvelope, EventLogRepository, LifecycleEvent,
    NoticeStateRepository, Product, ProductCatalog, RequestContext,
};

use crate::config::ApiConfig;
use crate::services::bridge::{BridgeRequest, BridgeResponse, ClientBridge, ShopContext};
use crate::services::dispatcher::{render_markup, EventDispatcher, PendingEvents};
use crate::services::list_cache::ListCache;
use crate::services::maintenance::{secrets_match, MaintenanceService};
use crate::services::pipeline::EventPipeline;
use crate::services::tokens::{generate_session_id, BridgeTokens, TokenClaims};

/// Request bodies are small JSON documents; product snapshots are the largest.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Global rate limiter type (direct quota, no keyed bucketing).
type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Storage backends the server runs against.
#[derive(Clone)]
pub struct Stores {
    pub event_log: Arc<dyn EventLogRepository>,
    pub error_log: Arc<dyn ErrorLogRepository>,
    pub notices: Arc<dyn NoticeStateRepository>,
    pub catalog: Arc<dyn ProductCatalog>,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ApiConfig>,
    pipeline: EventPipeline,
    bridge: ClientBridge,
    maintenance: MaintenanceService,
    catalog: Arc<dyn ProductCatalog>,
    tokens: Option<BridgeTokens>,
    /// Global rate limiter (None if rate limiting is disabled).
    rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(config: ApiConfig, stores: Stores, list_cache: ListCache) -> datalayer_core::Result<Self> {
        let tokens = config
            .bridge_token_secret
            .as_deref()
            .map(BridgeTokens::new)
            .transpose()?;

        let dispatcher = EventDispatcher::new(stores.event_log.clone(), stores.error_log.clone());
        let pipeline = EventPipeline::new(dispatcher, list_cache);
        let bridge = ClientBridge::new(
            tokens.clone(),
            stores.catalog.clone(),
            stores.notices.clone(),
            pipeline.clone(),
            ShopContext {
                site: config.site.clone(),
                currency: config.currency.clone(),
                price_decimals: config.price_decimals,
            },
        );
        let maintenance = MaintenanceService::new(
            stores.event_log,
            stores.error_log,
            stores.notices,
            config.maintenance_secret.clone(),
            config.log_page_size,
        );

        let rate_limiter = if config.rate_limit_enabled {
            let quota = Quota::with_period(Duration::from_secs(config.rate_limit_period_secs))
                .ok_or_else(|| {
                    datalayer_core::Error::Config("RATE_LIMIT_PERIOD_SECS must be non-zero".to_string())
                })?
                .allow_burst(NonZeroU32::new(config.rate_limit_requests).ok_or_else(|| {
                    datalayer_core::Error::Config("RATE_LIMIT_REQUESTS must be non-zero".to_string())
                })?);
            Some(Arc::new(RateLimiter::direct(quota)))
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            bridge,
            maintenance,
            catalog: stores.catalog,
            tokens,
            rate_limiter,
        })
    }

    pub fn pipeline(&self) -> &EventPipeline {
        &self.pipeline
    }

    pub fn bridge(&self) -> &ClientBridge {
        &self.bridge
    }

    pub fn maintenance(&self) -> &MaintenanceService {
        &self.maintenance
    }

    fn request_context(&self, actor: Option<Actor>) -> RequestContext {
        RequestContext::new(self.config.site.clone(), self.config.currency.clone())
            .with_actor(actor)
            .with_price_decimals(self.config.price_decimals)
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Parse allowed CORS origins from `ALLOWED_ORIGINS` (comma-separated).
pub fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str =
        std::env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());

    if origins_str.trim().is_empty() {
        return vec![HeaderValue::from_static("http://localhost:3000")];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

/// Build the full router with middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Client bridge
        .route("/api/v1/bridge", post(bridge_call))
        .route("/api/v1/bridge/token", post(issue_bridge_token))
        // Storefront backend
        .route("/api/v1/lifecycle", post(run_lifecycle))
        .route("/api/v1/products/:id", put(upsert_product))
        // Operator
        .route("/api/v1/admin/logs/events", get(list_event_logs))
        .route("/api/v1/admin/logs/events/recent", get(recent_event_logs))
        .route("/api/v1/admin/logs/errors", get(list_error_logs))
        .route("/api/v1/admin/logs/clear", post(clear_logs))
        .route("/api/v1/admin/notice", get(get_notice))
        .route("/api/v1/admin/notice/dismiss", post(dismiss_notice))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parse_allowed_origins()))
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .max_age(Duration::from_secs(3600)),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

// =============================================================================
// RATE LIMITING MIDDLEWARE
// =============================================================================

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            warn!("Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "error_description": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The storefront backend, authenticated by `STOREFRONT_API_KEY`.
#[derive(Debug, Clone)]
pub struct Storefront;

#[axum::async_trait]
impl FromRequestParts<AppState> for Storefront {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .storefront_api_key
            .as_deref()
            .ok_or_else(|| ApiError::Forbidden("storefront access is disabled".to_string()))?;
        let presented = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
        if !secrets_match(expected, presented)? {
            return Err(ApiError::Unauthorized("Invalid storefront key".to_string()));
        }
        Ok(Storefront)
    }
}

/// An operator, authenticated by one of `ADMIN_API_KEYS`.
#[derive(Debug, Clone)]
pub struct Admin {
    pub admin_id: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
        let admin_id = state
            .config
            .admin_keys
            .get(presented)
            .ok_or_else(|| ApiError::Forbidden("Administrator key required".to_string()))?;
        Ok(Admin {
            admin_id: admin_id.clone(),
        })
    }
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// CLIENT BRIDGE
// =============================================================================

fn bridge_status(response: &BridgeResponse) -> StatusCode {
    match response.error.as_deref() {
        None => StatusCode::OK,
        Some("invalid_token") => StatusCode::UNAUTHORIZED,
        Some("forbidden") => StatusCode::FORBIDDEN,
        Some("not_found") => StatusCode::NOT_FOUND,
        Some("invalid_input") | Some("unknown_action") => StatusCode::BAD_REQUEST,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn bridge_call(
    State(state): State<AppState>,
    admin: Option<Admin>,
    Json(request): Json<BridgeRequest>,
) -> impl IntoResponse {
    let admin_id = admin.as_ref().map(|a| a.admin_id.as_str());
    let response = state.bridge.handle(request, admin_id).await;
    (bridge_status(&response), Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueTokenRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    actor: Option<Actor>,
}

async fn issue_bridge_token(
    _auth: Storefront,
    State(state): State<AppState>,
    Json(body): Json<IssueTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state
        .tokens
        .as_ref()
        .ok_or_else(|| ApiError::Forbidden("client bridge is disabled".to_string()))?;
    let sid = body.session_id.unwrap_or_else(generate_session_id);
    let token = tokens.issue(&TokenClaims {
        sid: sid.clone(),
        actor: body.actor,
    })?;
    Ok(Json(serde_json::json!({ "token": token, "sessionId": sid })))
}

// =============================================================================
// STOREFRONT LIFECYCLE
// =============================================================================

#[derive(Debug, Deserialize)]
struct LifecycleRequest {
    events: Vec<LifecycleEvent>,
    #[serde(default)]
    actor: Option<Actor>,
}

async fn run_lifecycle(
    _auth: Storefront,
    State(state): State<AppState>,
    Json(body): Json<LifecycleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.request_context(body.actor);
    let mut sink = PendingEvents::new();
    for kind in &body.events {
        state.pipeline.handle_lifecycle_event(kind, &ctx, &mut sink).await?;
    }
    let events: Vec<EventEnvelope> = sink.drain();
    let markup = render_markup(&events)?;
    Ok(Json(serde_json::json!({ "markup": markup, "events": events })))
}

async fn upsert_product(
    _auth: Storefront,
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(mut product): Json<Product>,
) -> Result<impl IntoResponse, ApiError> {
    if id == 0 {
        return Err(ApiError::BadRequest("Product ID must be positive".to_string()));
    }
    product.id = id;
    state.catalog.upsert(&product).await?;
    let invalidated = state.pipeline.list_cache().invalidate(id).await;
    info!(subsystem = "api", product_id = id, invalidated, "Product updated");
    Ok(Json(serde_json::json!({ "id": id, "cacheInvalidated": invalidated })))
}

// =============================================================================
// OPERATOR
// =============================================================================

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ClearQuery {
    secret: Option<String>,
}

async fn list_event_logs(
    _admin: Admin,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.maintenance.event_page(query.page.unwrap_or(1)).await?;
    Ok(Json(page))
}

async fn recent_event_logs(
    _admin: Admin,
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.maintenance.recent_events(query.limit.unwrap_or(10)).await?;
    Ok(Json(rows))
}

async fn list_error_logs(
    _admin: Admin,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.maintenance.error_page(query.page.unwrap_or(1)).await?;
    Ok(Json(page))
}

async fn clear_logs(
    admin: Admin,
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let secret = query
        .secret
        .ok_or_else(|| ApiError::Unauthorized("Maintenance secret required".to_string()))?;
    let cleared = state.maintenance.clear_logs(&secret).await?;
    info!(subsystem = "api", admin_id = %admin.admin_id, "Logs cleared by operator");
    Ok(Json(cleared))
}

async fn get_notice(admin: Admin, State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let notice = state.maintenance.notice(&admin.admin_id).await?;
    Ok(Json(notice))
}

async fn dismiss_notice(admin: Admin, State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.maintenance.dismiss(&admin.admin_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Database(datalayer_core::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
}

impl From<datalayer_core::Error> for ApiError {
    fn from(err: datalayer_core::Error) -> Self {
        use datalayer_core::Error;
        match err {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            Error::Forbidden(msg) => ApiError::Forbidden(msg),
            e if e.is_lookup_failure() => ApiError::NotFound(e.to_string()),
            e => ApiError::Database(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
