//! Generation parameter defaults
//!
//! Optional knobs never fail a request: anything missing or out of range is
//! replaced with the configured default.

use serde::Serialize;

use crate::chat::ChatRequest;
use crate::config::DEFAULT_MODEL;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDefaults {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_tokens_ceiling: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            max_tokens_ceiling: 8000,
        }
    }
}

/// The complete parameter set sent upstream with every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl GenerationParams {
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn resolve(
        request: &ChatRequest,
        defaults: &GenerationDefaults,
    ) -> Self {
        let model = request
            .model
            .as_ref()
            .filter(|m| !m.trim().is_empty())
            .map_or_else(|| defaults.model.clone(), Clone::clone);

        let temperature = request
            .temperature
            .filter(|t| t.is_finite() && (0.0..=2.0).contains(t))
            .unwrap_or(defaults.temperature);

        let max_tokens = request
            .max_tokens
            .filter(|n| n.fract() == 0.0 && *n > 0.0 && *n <= f64::from(defaults.max_tokens_ceiling))
            .map_or(defaults.max_tokens, |n| n as u32);

        Self {
            model,
            temperature,
            max_tokens,
        }
    }
}
