//! Events broadcast to observers of the client (UI shells, the CLI, tests).

use shared::domain::{
    ClearingProgress, ConversationTurn, Document, Theme, UploadProgress, UserIdentity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    IdentityChanged(Option<UserIdentity>),
    DocumentsChanged(Vec<Document>),
    SelectionChanged(Vec<String>),
    UploadProgress(Vec<UploadProgress>),
    ClearingProgress(Option<ClearingProgress>),
    UndoWindowChanged { open: bool, pending: usize },
    TurnUpdated(ConversationTurn),
    /// The log was replaced wholesale after sign-in.
    ConversationRestored(Vec<ConversationTurn>),
    ChatCleared,
    ThemeChanged(Theme),
    Notice(Notice),
}
