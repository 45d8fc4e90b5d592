//! # sena-relay
//!
//! A small stateless HTTP relay between the Sena chat client and a hosted
//! chat-completion API.
//!
//! The browser never sees the provider credential. It posts its whole
//! transcript to the relay, which:
//!
//! - **Rate limits** each client address over a fixed window
//! - **Validates** the transcript (roles, sizes, message count)
//! - **Normalizes** optional generation parameters to safe defaults
//! - **Forwards** one request upstream under a hard timeout
//! - **Maps** provider errors, timeouts and network failures to a closed set of
//!   HTTP responses tagged with a per-request correlation id
//!
//! ## Endpoints
//!
//! - `POST /api/chat`: body `{ messages, model?, temperature?, max_tokens? }`
//! - `GET /health`: always `200` with `status: "operational"`
//!
//! ## Library Usage
//!
//! The pipeline stages are usable on their own:
//!
//! ```rust
//! use sena_relay::params::{GenerationDefaults, GenerationParams};
//! use sena_relay::validator::{RequestValidator, ValidationLimits};
//!
//! let body = serde_json::json!({
//!     "messages": [{ "role": "user", "content": "Olá, Sena!" }],
//!     "temperature": 5
//! });
//!
//! let request = RequestValidator::validate(&body, &ValidationLimits::default()).unwrap();
//! let params = GenerationParams::resolve(&request, &GenerationDefaults::default());
//!
//! assert_eq!(params.temperature, 0.7);
//! assert_eq!(params.max_tokens, 1000);
//! ```
//!
//! ## Server Mode
//!
//! ```bash
//! MISTRAL_API_KEY=... APP_ENV=development cargo run
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod params;
pub mod rate_limit;
pub mod server;
pub mod upstream;
pub mod validator;

pub use chat::{ChatMessage, ChatRequest, ChatRole};
pub use config::{OperatingMode, RelayConfig};
pub use error::{ApiError, ErrorResponse};
pub use server::AppState;
pub use upstream::{CompletionProvider, CompletionRequest, HttpCompletionProvider, UpstreamError};
