use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GENERIC_FAILURE: &str = "API request failed";

/// Error payload returned by the backend on non-success statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ApiErrorBody {
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Server-provided detail, or the generic failure string.
    pub fn message_or_generic(&self) -> String {
        self.message().unwrap_or_else(|| GENERIC_FAILURE.to_string())
    }
}
