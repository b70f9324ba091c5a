//! Process-scoped session context shared by the gateway and the persistence bridge.
//!
//! Initialised when a session token is restored or a login completes, torn down on
//! logout. Nothing else holds the token or identity.

use shared::domain::UserIdentity;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct SessionContext {
    token: RwLock<Option<String>>,
    identity: RwLock<Option<UserIdentity>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            identity: RwLock::new(None),
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn identity(&self) -> Option<UserIdentity> {
        self.identity.read().await.clone()
    }

    pub async fn set_identity(&self, identity: Option<UserIdentity>) {
        *self.identity.write().await = identity;
    }

    /// The partition key for per-user state.
    pub async fn username(&self) -> Option<String> {
        self.identity
            .read()
            .await
            .as_ref()
            .map(|identity| identity.preferred_username.clone())
    }

    pub async fn teardown(&self) {
        self.set_token(None).await;
        self.set_identity(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn teardown_drops_token_and_identity() {
        let session = SessionContext::with_token("tok");
        session
            .set_identity(Some(UserIdentity::new("ana@example.com")))
            .await;
        assert_eq!(session.username().await.as_deref(), Some("ana@example.com"));

        session.teardown().await;
        assert_eq!(session.token().await, None);
        assert_eq!(session.username().await, None);
    }
}
