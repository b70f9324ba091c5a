//! Durable local state for the document assistant client.
//!
//! Two scopes are kept apart: `user_state` rows are partitioned by the user's
//! stable username claim, `app_state` rows are process-wide (last theme, session
//! credential) and survive logout.

use anyhow::{Context, Result};
use chrono::Utc;
use shared::{
    domain::{ConversationTurn, Theme},
    protocol::DocumentSummary,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::warn;

const SLOT_CHAT_HISTORY: &str = "chat_history";
const SLOT_THEME: &str = "theme";
const SLOT_DOCUMENTS: &str = "documents";
const SLOT_LAST_THEME: &str = "last_theme";
const SLOT_SESSION_TOKEN: &str = "session_token";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options =
            SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every pooled connection to `sqlite::memory:` would see its own empty database.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open local store at '{database_url}'"))?;

        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_state (
                username   TEXT NOT NULL,
                slot       TEXT NOT NULL,
                payload    TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (username, slot)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure user_state table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_state (
                slot       TEXT PRIMARY KEY NOT NULL,
                payload    TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure app_state table exists")?;

        Ok(())
    }

    async fn load_user_slot(&self, username: &str, slot: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT payload FROM user_state WHERE username = ? AND slot = ?")
            .bind(username)
            .bind(slot)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read '{slot}' for user '{username}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn save_user_slot(&self, username: &str, slot: &str, payload: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_state (username, slot, payload, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(username, slot) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
        )
        .bind(username)
        .bind(slot)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write '{slot}' for user '{username}'"))?;
        Ok(())
    }

    async fn delete_user_slot(&self, username: &str, slot: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_state WHERE username = ? AND slot = ?")
            .bind(username)
            .bind(slot)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete '{slot}' for user '{username}'"))?;
        Ok(())
    }

    async fn load_app_slot(&self, slot: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT payload FROM app_state WHERE slot = ?")
            .bind(slot)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read app slot '{slot}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn save_app_slot(&self, slot: &str, payload: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO app_state (slot, payload, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(slot) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
        )
        .bind(slot)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write app slot '{slot}'"))?;
        Ok(())
    }

    async fn delete_app_slot(&self, slot: &str) -> Result<()> {
        sqlx::query("DELETE FROM app_state WHERE slot = ?")
            .bind(slot)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete app slot '{slot}'"))?;
        Ok(())
    }

    /// `None` when nothing was ever saved for this user.
    pub async fn load_chat_history(&self, username: &str) -> Result<Option<Vec<ConversationTurn>>> {
        let Some(raw) = self.load_user_slot(username, SLOT_CHAT_HISTORY).await? else {
            return Ok(None);
        };
        let turns = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt chat history for user '{username}'"))?;
        Ok(Some(turns))
    }

    pub async fn save_chat_history(&self, username: &str, turns: &[ConversationTurn]) -> Result<()> {
        let raw = serde_json::to_string(turns).context("failed to encode chat history")?;
        self.save_user_slot(username, SLOT_CHAT_HISTORY, &raw).await
    }

    pub async fn delete_chat_history(&self, username: &str) -> Result<()> {
        self.delete_user_slot(username, SLOT_CHAT_HISTORY).await
    }

    pub async fn load_document_cache(&self, username: &str) -> Result<Option<Vec<DocumentSummary>>> {
        let Some(raw) = self.load_user_slot(username, SLOT_DOCUMENTS).await? else {
            return Ok(None);
        };
        let documents = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt document cache for user '{username}'"))?;
        Ok(Some(documents))
    }

    pub async fn save_document_cache(
        &self,
        username: &str,
        documents: &[DocumentSummary],
    ) -> Result<()> {
        let raw = serde_json::to_string(documents).context("failed to encode document cache")?;
        self.save_user_slot(username, SLOT_DOCUMENTS, &raw).await
    }

    pub async fn load_theme(&self, username: &str) -> Result<Option<Theme>> {
        let raw = self.load_user_slot(username, SLOT_THEME).await?;
        Ok(raw.and_then(|value| parse_theme(&value)))
    }

    /// Saves the user's theme and records it as the process-wide last theme.
    pub async fn save_theme(&self, username: &str, theme: Theme) -> Result<()> {
        self.save_user_slot(username, SLOT_THEME, theme.as_str())
            .await?;
        self.save_app_slot(SLOT_LAST_THEME, theme.as_str()).await
    }

    pub async fn load_last_theme(&self) -> Result<Option<Theme>> {
        let raw = self.load_app_slot(SLOT_LAST_THEME).await?;
        Ok(raw.and_then(|value| parse_theme(&value)))
    }

    pub async fn load_session_token(&self) -> Result<Option<String>> {
        self.load_app_slot(SLOT_SESSION_TOKEN).await
    }

    pub async fn save_session_token(&self, token: &str) -> Result<()> {
        self.save_app_slot(SLOT_SESSION_TOKEN, token).await
    }

    pub async fn clear_session_token(&self) -> Result<()> {
        self.delete_app_slot(SLOT_SESSION_TOKEN).await
    }
}

fn parse_theme(raw: &str) -> Option<Theme> {
    match raw.parse::<Theme>() {
        Ok(theme) => Some(theme),
        Err(err) => {
            warn!("storage: ignoring stored theme: {err}");
            None
        }
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
