//! Shared fixtures for the relay integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sena_relay::config::RelayConfig;
use sena_relay::upstream::{CompletionProvider, CompletionRequest, UpstreamError};
use serde_json::{Value, json};

type Script = Box<dyn Fn() -> Result<Value, UpstreamError> + Send + Sync>;

/// In-process provider that counts calls and records what it was sent.
pub struct StubProvider {
    calls: AtomicUsize,
    seen: Mutex<Vec<CompletionRequest>>,
    script: Script,
}

impl StubProvider {
    pub fn scripted(script: impl Fn() -> Result<Value, UpstreamError> + Send + Sync + 'static) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            script: Box::new(script),
        }
    }

    pub fn replying(payload: Value) -> Self {
        Self::scripted(move || Ok(payload.clone()))
    }

    pub fn completing(text: &str) -> Self {
        Self::replying(completion(text))
    }

    pub fn failing_with_status(
        status: u16,
        body: Value,
    ) -> Self {
        Self::scripted(move || {
            Err(UpstreamError::Status {
                status,
                body: body.clone(),
            })
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        (self.script)()
    }
}

/// A chat-completions payload shaped like the provider's.
pub fn completion(text: &str) -> Value {
    json!({
        "id": "cmpl-7f3a",
        "object": "chat.completion",
        "created": 1_760_000_000,
        "model": "mistral-large-latest",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49 }
    })
}

pub fn production_config(extra: &[(&str, &str)]) -> RelayConfig {
    config_with(&[
        &[
            ("MISTRAL_API_KEY", "test-key"),
            ("APP_ENV", "production"),
            ("ALLOWED_ORIGINS", "https://sena.example.com"),
        ],
        extra,
    ])
}

pub fn development_config(extra: &[(&str, &str)]) -> RelayConfig {
    config_with(&[&[("MISTRAL_API_KEY", "test-key"), ("APP_ENV", "development")], extra])
}

fn config_with(layers: &[&[(&str, &str)]]) -> RelayConfig {
    let map: HashMap<String, String> = layers
        .iter()
        .flat_map(|layer| layer.iter())
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    RelayConfig::from_lookup(|key| map.get(key).cloned()).expect("test config should be valid")
}

pub fn user_message(content: &str) -> Value {
    json!({ "role": "user", "content": content })
}

pub fn transcript(last_user_message: &str) -> Value {
    json!({
        "messages": [
            { "role": "system", "content": "Você é a Sena, uma assistente virtual acolhedora." },
            { "role": "assistant", "content": "Olá! Eu sou a Sena. Como posso ajudar?" },
            user_message(last_user_message)
        ]
    })
}
