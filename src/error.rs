use actix_web::http::StatusCode;
use actix_web::http::header::{HeaderValue, RETRY_AFTER};
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::OperatingMode;
use crate::rate_limit::RateLimited;
use crate::upstream::UpstreamError;
use crate::validator::ValidationError;

pub const MSG_INVALID_REQUEST: &str = "Requisição inválida";
pub const MSG_RATE_LIMITED: &str = "Muitas requisições deste IP. Tente novamente mais tarde.";
pub const MSG_INVALID_API_KEY: &str = "Chave de API inválida";
pub const MSG_UPSTREAM_RATE_LIMITED: &str = "Limite de taxa excedido";
pub const MSG_UPSTREAM_UNAVAILABLE: &str = "Erro interno/temporário da API";
pub const MSG_UPSTREAM_ERROR: &str = "Erro na API do provedor";
pub const MSG_TIMEOUT: &str = "Timeout ao conectar com a API";
pub const MSG_CONNECTION: &str = "Erro de conexão com a API";
pub const MSG_INTERNAL: &str = "Erro interno do servidor";

#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Every failure the relay can report to a client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.reason)
    }
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(UpstreamError::Status { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ApiError::Upstream(UpstreamError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream(UpstreamError::Unreachable(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Upstream(UpstreamError::InvalidResponse(_)) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The client-facing message for this failure.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => MSG_INVALID_REQUEST,
            ApiError::RateLimited(_) => MSG_RATE_LIMITED,
            ApiError::Upstream(UpstreamError::Status { status, .. }) => match *status {
                401 => MSG_INVALID_API_KEY,
                429 => MSG_UPSTREAM_RATE_LIMITED,
                s if s >= 500 => MSG_UPSTREAM_UNAVAILABLE,
                _ => MSG_UPSTREAM_ERROR,
            },
            ApiError::Upstream(UpstreamError::Timeout(_)) => MSG_TIMEOUT,
            ApiError::Upstream(UpstreamError::Unreachable(_)) => MSG_CONNECTION,
            ApiError::Upstream(UpstreamError::InvalidResponse(_)) | ApiError::Internal(_) => MSG_INTERNAL,
        }
    }

    /// Diagnostic detail, always written to the server log.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            ApiError::BadRequest(reason) => reason.clone(),
            ApiError::RateLimited(limited) => {
                format!("Tente novamente em {} segundos", limited.retry_after_secs())
            }
            ApiError::Upstream(UpstreamError::Status { body, .. }) => body.to_string(),
            ApiError::Upstream(err) => err.to_string(),
            ApiError::Internal(msg) => msg.clone(),
        }
    }

    /// Client errors describe the caller's own input and are never hidden.
    fn detail_is_public(&self) -> bool {
        matches!(self, ApiError::BadRequest(_) | ApiError::RateLimited(_))
    }

    /// Whether the failure points at a fault in the relay rather than at the
    /// caller or the provider.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_) | ApiError::Upstream(UpstreamError::InvalidResponse(_))
        )
    }

    /// Builds the response body for this failure.
    ///
    /// Upstream and internal details are only exposed in development mode.
    #[must_use]
    pub fn to_body(
        &self,
        request_id: Option<&str>,
        mode: OperatingMode,
    ) -> ErrorResponse {
        let details = (self.detail_is_public() || !mode.is_production()).then(|| self.detail());

        ErrorResponse {
            error: self.message().to_string(),
            details,
            request_id: request_id.map(str::to_owned),
        }
    }

    #[must_use]
    pub fn to_response(
        &self,
        request_id: Option<&str>,
        mode: OperatingMode,
    ) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status());

        if let ApiError::RateLimited(limited) = self {
            builder.insert_header((RETRY_AFTER, HeaderValue::from(limited.retry_after_secs())));
        }

        builder.json(self.to_body(request_id, mode))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        self.to_response(None, OperatingMode::Production)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn upstream_status(status: u16) -> ApiError {
        ApiError::Upstream(UpstreamError::Status {
            status,
            body: json!({ "message": "Unauthorized", "type": "invalid_api_key" }),
        })
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::bad_request("x"), 400, MSG_INVALID_REQUEST),
            (upstream_status(401), 401, MSG_INVALID_API_KEY),
            (upstream_status(429), 429, MSG_UPSTREAM_RATE_LIMITED),
            (upstream_status(500), 500, MSG_UPSTREAM_UNAVAILABLE),
            (upstream_status(503), 503, MSG_UPSTREAM_UNAVAILABLE),
            (upstream_status(422), 422, MSG_UPSTREAM_ERROR),
            (
                ApiError::Upstream(UpstreamError::Timeout(Duration::from_secs(30))),
                504,
                MSG_TIMEOUT,
            ),
            (
                ApiError::Upstream(UpstreamError::Unreachable("connection refused".into())),
                502,
                MSG_CONNECTION,
            ),
            (
                ApiError::Upstream(UpstreamError::InvalidResponse("not json".into())),
                500,
                MSG_INTERNAL,
            ),
            (ApiError::internal("boom"), 500, MSG_INTERNAL),
        ];

        for (err, status, message) in cases {
            assert_eq!(err.status().as_u16(), status, "status for {err:?}");
            assert_eq!(err.message(), message, "message for {err:?}");
        }
    }

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let err = ApiError::from(RateLimited {
            limit: 100,
            retry_after: Duration::from_secs(42),
        });
        let response = err.to_response(Some("abc"), OperatingMode::Production);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn test_upstream_detail_hidden_in_production() {
        let body = upstream_status(401).to_body(Some("req-1"), OperatingMode::Production);
        assert_eq!(body, ErrorResponse {
            error: MSG_INVALID_API_KEY.to_string(),
            details: None,
            request_id: Some("req-1".to_string()),
        });
    }

    #[test]
    fn test_upstream_detail_shown_in_development() {
        let body = upstream_status(401).to_body(Some("req-1"), OperatingMode::Development);
        assert!(body.details.unwrap().contains("invalid_api_key"));
    }

    #[test]
    fn test_validation_detail_always_shown() {
        let err = ApiError::from(ValidationError {
            reason: "messages[0].role must be one of system, user, assistant".to_string(),
        });
        let body = err.to_body(None, OperatingMode::Production);
        assert_eq!(body.details.as_deref(), Some("messages[0].role must be one of system, user, assistant"));
    }

    #[test]
    fn test_error_response_serialization() {
        let body = ErrorResponse {
            error: MSG_TIMEOUT.to_string(),
            details: None,
            request_id: Some("r".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "error": MSG_TIMEOUT, "requestId": "r" })
        );
    }

    #[test]
    fn test_unknown_upstream_status_falls_back_to_bad_gateway() {
        assert_eq!(upstream_status(1000).status(), StatusCode::BAD_GATEWAY);
    }
}
