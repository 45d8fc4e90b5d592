//! HTTP handlers for the relay endpoints
//!
//! `POST /api/chat` runs the full pipeline in a fixed order: rate limit,
//! content type, JSON decoding, validation, parameter defaults, one upstream
//! call, then response normalization. Every outcome carries the request id.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use actix_web::http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::chat::ChatRequest;
use crate::error::{ApiError, ErrorResponse};
use crate::params::GenerationParams;
use crate::rate_limit::Quota;
use crate::server::AppState;
use crate::upstream::CompletionRequest;
use crate::validator::RequestValidator;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Endpoints listed in 404 responses.
pub const AVAILABLE_ENDPOINTS: [&str; 2] = ["POST /api/chat", "GET /health"];

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub environment: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundResponse {
    pub error: String,
    pub path: String,
    pub available_endpoints: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Provider completion with a relay-assigned requestId", content_type = "application/json"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Provider rejected the server credential", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
        (status = 502, description = "Provider unreachable", body = ErrorResponse),
        (status = 504, description = "Provider timed out", body = ErrorResponse)
    )
)]
#[post("/api/chat")]
pub async fn chat(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let request_id = uuid::Uuid::new_v4().to_string();
    let mode = state.config.mode;
    let client_key = client_key(&req, state.config.trust_proxy);

    let quota = match state.limiter.check(&client_key) {
        Ok(quota) => quota,
        Err(limited) => {
            tracing::warn!(
                request_id = %request_id,
                client = %client_key,
                retry_after_secs = limited.retry_after_secs(),
                "Rate limit exceeded"
            );
            let mut response = ApiError::from(limited).to_response(Some(&request_id), mode);
            tag_request_id(&mut response, &request_id);
            return response;
        }
    };
    tracing::debug!(request_id = %request_id, client = %client_key, remaining = quota.remaining, "Chat request received");

    let outcome = AssertUnwindSafe(relay(&req, &body, &state, &request_id))
        .catch_unwind()
        .await;

    let mut response = match outcome {
        Ok(Ok(payload)) => HttpResponse::Ok().json(payload),
        Ok(Err(err)) => {
            if err.is_internal() {
                tracing::error!(request_id = %request_id, error = %err, detail = %err.detail(), "Relay request failed");
            } else {
                tracing::warn!(
                    request_id = %request_id,
                    status = err.status().as_u16(),
                    detail = %err.detail(),
                    "Relay request rejected"
                );
            }
            err.to_response(Some(&request_id), mode)
        }
        Err(_) => {
            tracing::error!(request_id = %request_id, "Chat handler panicked");
            ApiError::internal("handler panicked").to_response(Some(&request_id), mode)
        }
    };

    tag_request_id(&mut response, &request_id);
    apply_quota(&mut response, quota);
    response
}

async fn relay(
    req: &HttpRequest,
    body: &[u8],
    state: &AppState,
    request_id: &str,
) -> Result<Value, ApiError> {
    if !is_json_content_type(req) {
        return Err(ApiError::bad_request("Content-Type must be application/json"));
    }

    let raw: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("malformed JSON body: {e}")))?;

    let request = RequestValidator::validate(&raw, &state.config.limits)?;
    let params = GenerationParams::resolve(&request, &state.config.generation);

    tracing::info!(
        request_id = %request_id,
        messages = request.messages.len(),
        model = %params.model,
        temperature = params.temperature,
        max_tokens = params.max_tokens,
        "Forwarding chat request"
    );

    let started = Instant::now();
    let completion = CompletionRequest::new(request.messages, params);
    let payload = state.provider.complete(&completion).await?;

    tracing::info!(
        request_id = %request_id,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Upstream completion received"
    );

    with_request_id(payload, request_id)
}

fn with_request_id(
    payload: Value,
    request_id: &str,
) -> Result<Value, ApiError> {
    match payload {
        Value::Object(mut map) => {
            map.insert("requestId".to_string(), Value::String(request_id.to_string()));
            Ok(Value::Object(map))
        }
        _ => Err(ApiError::internal("provider payload is not a JSON object")),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service status", body = HealthResponse))
)]
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "operational".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.mode.to_string(),
    })
}

pub async fn not_found(req: HttpRequest) -> HttpResponse {
    tracing::debug!("No route for {} {}", req.method(), req.path());

    HttpResponse::NotFound().json(NotFoundResponse {
        error: "Rota não encontrada".to_string(),
        path: req.path().to_string(),
        available_endpoints: AVAILABLE_ENDPOINTS.iter().map(ToString::to_string).collect(),
    })
}

/// Key used for rate limiting: the peer address, or the forwarded client
/// address when the relay sits behind a trusted proxy.
#[must_use]
pub fn client_key(
    req: &HttpRequest,
    trust_proxy: bool,
) -> String {
    if trust_proxy && let Some(addr) = req.connection_info().realip_remote_addr() {
        return addr.to_string();
    }

    req.peer_addr()
        .map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

fn is_json_content_type(req: &HttpRequest) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn tag_request_id(
    response: &mut HttpResponse,
    request_id: &str,
) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
}

fn apply_quota(
    response: &mut HttpResponse,
    quota: Quota,
) {
    let headers = response.headers_mut();
    headers.insert(HeaderName::from_static("ratelimit-limit"), HeaderValue::from(quota.limit));
    headers.insert(HeaderName::from_static("ratelimit-remaining"), HeaderValue::from(quota.remaining));
    headers.insert(
        HeaderName::from_static("ratelimit-reset"),
        HeaderValue::from(quota.reset_after.as_secs()),
    );
}
