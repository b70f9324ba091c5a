use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{SourceRef, UserIdentity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginUrlResponse {
    pub login_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCallbackResponse {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleDocumentRequest {
    pub name: String,
    pub active: bool,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadAck {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskQuestionRequest {
    pub question: String,
    pub session_token: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
    #[serde(default)]
    pub short_answer: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub response_time: f64,
    #[serde(default)]
    pub is_short_answer_type: bool,
    #[serde(default)]
    pub is_greeting: bool,
    #[serde(default)]
    pub is_list: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearChatRequest {
    pub session_token: Option<String>,
}

/// The history endpoint's shape is owned by the backend; it is passed through untouched.
pub type ChatHistoryResponse = Value;
