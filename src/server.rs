//! Application wiring shared by the binary and the integration tests.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::chat::{ChatMessage, ChatRequest, ChatRole};
use crate::config::{OperatingMode, RelayConfig};
use crate::error::ErrorResponse;
use crate::handlers::{self, HealthResponse, NotFoundResponse};
use crate::rate_limit::RateLimiter;
use crate::upstream::{CompletionProvider, HttpCompletionProvider};

/// Everything a request handler needs. Built once and shared across workers.
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub provider: Arc<dyn CompletionProvider>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: Arc<RelayConfig>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self {
            config,
            provider,
            limiter,
        }
    }

    /// State talking to the real provider configured in `config`.
    #[must_use]
    pub fn from_config(config: RelayConfig) -> Self {
        let provider = Arc::new(HttpCompletionProvider::from_config(&config));
        Self::new(Arc::new(config), provider)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handlers::chat, handlers::health),
    components(schemas(
        ChatRequest,
        ChatMessage,
        ChatRole,
        ErrorResponse,
        HealthResponse,
        NotFoundResponse,
        OperatingMode
    ))
)]
pub struct ApiDoc;

/// Registers the relay routes. Development mode also serves the OpenAPI
/// document and Swagger UI.
pub fn configure(
    cfg: &mut web::ServiceConfig,
    config: &RelayConfig,
) {
    cfg.app_data(web::PayloadConfig::new(config.body_limit))
        .service(handlers::chat)
        .service(handlers::health);

    if !config.mode.is_production() {
        cfg.service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()));
    }

    cfg.default_service(web::to(handlers::not_found));
}

/// Production accepts only the configured origins and refuses requests from
/// any other origin before they reach a handler. Development accepts any.
#[must_use]
pub fn cors(config: &RelayConfig) -> Cors {
    if !config.mode.is_production() {
        return Cors::permissive();
    }

    config
        .allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers(vec![
            header::RETRY_AFTER,
            header::HeaderName::from_static(handlers::REQUEST_ID_HEADER),
        ])
        .max_age(3600)
        .block_on_origin_mismatch(true)
}
