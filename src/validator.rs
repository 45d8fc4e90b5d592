use serde_json::Value;

use crate::chat::{ChatRequest, ChatRole};

/// Bounds applied to every incoming transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_messages: usize,
    /// Counted in Unicode scalar values, not bytes.
    pub max_content_chars: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_messages: 50,
            max_content_chars: 10_000,
        }
    }
}

/// First rule violated by a request body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub reason: String,
}

impl ValidationError {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Validates raw chat request bodies before anything is sent upstream
pub struct RequestValidator;

impl RequestValidator {
    /// Checks a decoded JSON body and returns it as a [`ChatRequest`].
    ///
    /// Messages are checked in order and only the first violation is reported.
    /// The returned request holds exactly what the client sent; nothing is
    /// trimmed or truncated.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first rule the body breaks.
    pub fn validate(
        body: &Value,
        limits: &ValidationLimits,
    ) -> Result<ChatRequest, ValidationError> {
        let Some(object) = body.as_object() else {
            return Err(ValidationError::new("request body must be a JSON object"));
        };

        let messages = match object.get("messages") {
            None | Some(Value::Null) => {
                return Err(ValidationError::new(r#"request body must contain a "messages" array"#));
            }
            Some(Value::Array(messages)) => messages,
            Some(_) => return Err(ValidationError::new(r#""messages" must be an array"#)),
        };

        if messages.is_empty() {
            return Err(ValidationError::new(r#""messages" must not be empty"#));
        }

        if messages.len() > limits.max_messages {
            return Err(ValidationError::new(format!(
                r#""messages" has {} entries, at most {} are allowed"#,
                messages.len(),
                limits.max_messages
            )));
        }

        for (index, message) in messages.iter().enumerate() {
            Self::check_message(index, message, limits)?;
        }

        serde_json::from_value(body.clone()).map_err(|e| ValidationError::new(format!("malformed request: {e}")))
    }

    fn check_message(
        index: usize,
        message: &Value,
        limits: &ValidationLimits,
    ) -> Result<(), ValidationError> {
        let Some(fields) = message.as_object() else {
            return Err(ValidationError::new(format!("messages[{index}] must be an object")));
        };

        let (Some(role), Some(content)) = (fields.get("role"), fields.get("content")) else {
            return Err(ValidationError::new(format!(
                "messages[{index}] must have both role and content"
            )));
        };

        if role.as_str().and_then(|r| r.parse::<ChatRole>().ok()).is_none() {
            return Err(ValidationError::new(format!(
                "messages[{index}].role must be one of system, user, assistant"
            )));
        }

        let Some(content) = content.as_str() else {
            return Err(ValidationError::new(format!("messages[{index}].content must be a string")));
        };

        if content.is_empty() {
            return Err(ValidationError::new(format!("messages[{index}].content must not be empty")));
        }

        let chars = content.chars().count();
        if chars > limits.max_content_chars {
            return Err(ValidationError::new(format!(
                "messages[{index}].content has {chars} characters, at most {} are allowed",
                limits.max_content_chars
            )));
        }

        Ok(())
    }
}
