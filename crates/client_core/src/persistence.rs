//! Mirrors user-scoped state into the durable store.
//!
//! Mirroring for a user only starts once that user's saved state has been read
//! back, so an empty in-memory log can never overwrite a saved one. Storage
//! failures are logged and otherwise ignored.

use shared::{
    domain::{ConversationTurn, Theme},
    protocol::DocumentSummary,
};
use storage::Storage;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoredState {
    pub history: Vec<ConversationTurn>,
    pub theme: Theme,
    /// Last documents view; shown until the remote list arrives.
    pub documents: Option<Vec<DocumentSummary>>,
}

pub struct PersistenceBridge {
    storage: Option<Storage>,
    mirror_user: RwLock<Option<String>>,
}

impl PersistenceBridge {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage: Some(storage),
            mirror_user: RwLock::new(None),
        }
    }

    /// A bridge that remembers nothing; used when the local store cannot be opened.
    pub fn disabled() -> Self {
        Self {
            storage: None,
            mirror_user: RwLock::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.storage.is_some()
    }

    pub async fn is_mirroring(&self) -> bool {
        self.mirror_user.read().await.is_some()
    }

    /// Theme to show before anyone signs in.
    pub async fn initial_theme(&self) -> Theme {
        let Some(storage) = &self.storage else {
            return Theme::default();
        };
        match storage.load_last_theme().await {
            Ok(theme) => theme.unwrap_or_default(),
            Err(err) => {
                warn!("persistence: failed to load last theme: {err:#}");
                Theme::default()
            }
        }
    }

    /// Loads `username`'s saved state, then starts mirroring for them. If the
    /// history cannot be read, mirroring stays off for this session.
    pub async fn attach(&self, username: &str) -> RestoredState {
        let Some(storage) = &self.storage else {
            return RestoredState::default();
        };

        let history = match storage.load_chat_history(username).await {
            Ok(history) => Some(history.unwrap_or_default()),
            Err(err) => {
                warn!(user = %username, "persistence: failed to load chat history: {err:#}");
                None
            }
        };

        let theme = match storage.load_theme(username).await {
            Ok(Some(theme)) => theme,
            Ok(None) => self.initial_theme().await,
            Err(err) => {
                warn!(user = %username, "persistence: failed to load theme: {err:#}");
                Theme::default()
            }
        };

        let documents = storage
            .load_document_cache(username)
            .await
            .unwrap_or_else(|err| {
                warn!(user = %username, "persistence: failed to load document cache: {err:#}");
                None
            });

        let mirroring = history.is_some();
        *self.mirror_user.write().await = mirroring.then(|| username.to_string());
        info!(
            user = %username,
            turns = history.as_ref().map_or(0, Vec::len),
            mirroring,
            "persistence: attached"
        );

        RestoredState {
            history: history.unwrap_or_default(),
            theme,
            documents,
        }
    }

    /// Stops mirroring. Saved state stays behind for the next sign-in.
    pub async fn detach(&self) {
        if let Some(user) = self.mirror_user.write().await.take() {
            info!(user = %user, "persistence: detached");
        }
    }

    async fn target(&self) -> Option<(&Storage, String)> {
        let storage = self.storage.as_ref()?;
        let user = self.mirror_user.read().await.clone()?;
        Some((storage, user))
    }

    pub async fn mirror_history(&self, turns: &[ConversationTurn]) {
        if let Some((storage, user)) = self.target().await {
            if let Err(err) = storage.save_chat_history(&user, turns).await {
                warn!(user = %user, "persistence: failed to save chat history: {err:#}");
            }
        }
    }

    pub async fn forget_history(&self) {
        if let Some((storage, user)) = self.target().await {
            if let Err(err) = storage.delete_chat_history(&user).await {
                warn!(user = %user, "persistence: failed to delete chat history: {err:#}");
            }
        }
    }

    pub async fn mirror_theme(&self, theme: Theme) {
        if let Some((storage, user)) = self.target().await {
            if let Err(err) = storage.save_theme(&user, theme).await {
                warn!(user = %user, "persistence: failed to save theme: {err:#}");
            }
        }
    }

    pub async fn mirror_documents(&self, documents: &[DocumentSummary]) {
        if let Some((storage, user)) = self.target().await {
            if let Err(err) = storage.save_document_cache(&user, documents).await {
                warn!(user = %user, "persistence: failed to save document cache: {err:#}");
            }
        }
    }

    pub async fn load_token(&self) -> Option<String> {
        let storage = self.storage.as_ref()?;
        storage.load_session_token().await.unwrap_or_else(|err| {
            warn!("persistence: failed to load session token: {err:#}");
            None
        })
    }

    pub async fn save_token(&self, token: &str) {
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.save_session_token(token).await {
                warn!("persistence: failed to save session token: {err:#}");
            }
        }
    }

    pub async fn clear_token(&self) {
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.clear_session_token().await {
                warn!("persistence: failed to clear session token: {err:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bridge() -> PersistenceBridge {
        let storage = Storage::new("sqlite::memory:").await.expect("storage");
        PersistenceBridge::new(storage)
    }

    #[tokio::test]
    async fn nothing_is_written_before_attach() {
        let bridge = bridge().await;
        let turn = ConversationTurn::pending(shared::domain::TurnId(1), "early");
        bridge.mirror_history(&[turn]).await;

        let restored = bridge.attach("alice").await;
        assert!(restored.history.is_empty());
        assert_eq!(restored.theme, Theme::Cosmic);
        assert!(bridge.is_mirroring().await);
    }

    #[tokio::test]
    async fn attached_state_survives_detach_and_reattach() {
        let bridge = bridge().await;
        bridge.attach("alice").await;
        let turn = ConversationTurn::pending(shared::domain::TurnId(7), "kept");
        bridge.mirror_history(&[turn.clone()]).await;
        bridge.mirror_theme(Theme::Forest).await;
        bridge.detach().await;
        assert!(!bridge.is_mirroring().await);

        bridge.mirror_history(&[]).await;
        let restored = bridge.attach("alice").await;
        assert_eq!(restored.history, vec![turn]);
        assert_eq!(restored.theme, Theme::Forest);

        let other = bridge.attach("bob").await;
        assert!(other.history.is_empty());
        assert_eq!(other.theme, Theme::Forest);
    }

    #[tokio::test]
    async fn disabled_bridge_restores_defaults() {
        let bridge = PersistenceBridge::disabled();
        let restored = bridge.attach("alice").await;
        assert_eq!(restored, RestoredState::default());
        assert!(!bridge.is_mirroring().await);
        assert_eq!(bridge.load_token().await, None);
    }
}
