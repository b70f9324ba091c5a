use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use shared::domain::{
    ClearingProgress, ConversationTurn, Document, DocumentId, SelectedFile, Theme,
    UploadProgress, UserIdentity,
};
use storage::Storage;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

pub mod chat;
pub mod config;
pub mod documents;
pub mod error;
pub mod events;
pub mod gateway;
pub mod persistence;
pub mod progress;
pub mod sanitizer;
pub mod session;
pub mod uploads;

pub use chat::ChatLog;
pub use config::{load_settings, ClientSettings, GatewayTimeouts, ProgressTimings};
pub use documents::{DeletionSummary, DocumentStore};
pub use error::{ClientError, ClientResult, ErrorKind, GatewayError};
pub use events::{ClientEvent, Notice, NoticeLevel};
pub use gateway::{HttpGateway, RemoteGateway};
pub use persistence::{PersistenceBridge, RestoredState};
pub use session::SessionContext;
pub use uploads::{SelectionOutcome, UploadFailure, UploadQueue, UploadSummary};

use crate::{
    documents::{DOCUMENTS_RESTORED, NOTHING_TO_CLEAR},
    error::SERVER_WAKING_UP,
    progress::{drive_with_ticks, share, DeleteRamp, UploadRamp},
};

/// Operation-lifecycle controller. Owns the document, upload and chat stores,
/// routes every remote call through the gateway and publishes each state
/// change as a [`ClientEvent`].
///
/// While soft-removed documents await undo or deletion, uploads, toggles and
/// new questions are refused with [`ClientError::UndoWindowOpen`].
pub struct AssistantClient {
    gateway: Arc<dyn RemoteGateway>,
    session: Arc<SessionContext>,
    persistence: PersistenceBridge,
    timings: ProgressTimings,
    documents: Mutex<DocumentStore>,
    uploads: Mutex<UploadQueue>,
    chat: Mutex<ChatLog>,
    theme: RwLock<Theme>,
    events: broadcast::Sender<ClientEvent>,
}

impl AssistantClient {
    /// Builds the HTTP gateway and opens the local store named in `settings`.
    /// A store that cannot be opened leaves the client running without persistence.
    pub async fn connect(settings: &ClientSettings) -> Arc<Self> {
        let session = Arc::new(SessionContext::new());
        let gateway = Arc::new(HttpGateway::new(
            settings.api_base_url.clone(),
            Arc::clone(&session),
            settings.timeouts,
        ));

        let persistence = match open_storage(&settings.database_url).await {
            Ok(storage) => PersistenceBridge::new(storage),
            Err(err) => {
                warn!("client: local store unavailable, continuing without it: {err:#}");
                PersistenceBridge::disabled()
            }
        };

        let client = Self::new_with_dependencies(gateway, session, persistence, settings.progress);
        client.bootstrap().await;
        client
    }

    pub fn new_with_dependencies(
        gateway: Arc<dyn RemoteGateway>,
        session: Arc<SessionContext>,
        persistence: PersistenceBridge,
        timings: ProgressTimings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            gateway,
            session,
            persistence,
            timings,
            documents: Mutex::new(DocumentStore::new()),
            uploads: Mutex::new(UploadQueue::new()),
            chat: Mutex::new(ChatLog::new()),
            theme: RwLock::new(Theme::default()),
            events,
        })
    }

    /// Applies the process-wide last theme and the saved session credential.
    pub async fn bootstrap(&self) {
        let theme = self.persistence.initial_theme().await;
        *self.theme.write().await = theme;
        if let Some(token) = self.persistence.load_token().await {
            self.session.set_token(Some(token)).await;
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn notify(&self, notice: Notice) {
        self.emit(ClientEvent::Notice(notice));
    }

    async fn ensure_no_undo_window(&self) -> ClientResult<()> {
        if self.documents.lock().await.undo_window_open() {
            return Err(ClientError::UndoWindowOpen);
        }
        Ok(())
    }

    pub async fn identity(&self) -> Option<UserIdentity> {
        self.session.identity().await
    }

    pub async fn documents(&self) -> Vec<Document> {
        self.documents.lock().await.visible().to_vec()
    }

    pub async fn pending_deletion(&self) -> Vec<Document> {
        self.documents.lock().await.pending_deletion().to_vec()
    }

    pub async fn undo_window_open(&self) -> bool {
        self.documents.lock().await.undo_window_open()
    }

    pub async fn clearing_progress(&self) -> Option<ClearingProgress> {
        self.documents.lock().await.clearing().copied()
    }

    pub async fn selected_files(&self) -> Vec<String> {
        self.uploads.lock().await.selected_names()
    }

    pub async fn upload_progress(&self) -> Vec<UploadProgress> {
        self.uploads.lock().await.progress().to_vec()
    }

    pub async fn conversation(&self) -> Vec<ConversationTurn> {
        self.chat.lock().await.turns().to_vec()
    }

    pub async fn is_asking(&self) -> bool {
        self.chat.lock().await.is_busy()
    }

    pub async fn theme(&self) -> Theme {
        *self.theme.read().await
    }

    pub async fn login_url(&self) -> ClientResult<String> {
        Ok(self.gateway.login_url().await?)
    }

    /// Exchanges the OAuth callback parameters for a session and signs the user in.
    pub async fn complete_login(&self, code: &str, state: Option<&str>) -> ClientResult<UserIdentity> {
        let response = self.gateway.auth_callback(code, state).await?;
        let (true, Some(user)) = (response.authenticated, response.user) else {
            warn!("auth: callback did not authenticate");
            return Err(ClientError::AuthenticationFailed);
        };

        if let Some(token) = response.session_token {
            self.persistence.save_token(&token).await;
            self.session.set_token(Some(token)).await;
        }
        info!(user = %user.preferred_username, "auth: login complete");
        self.establish(user.clone()).await;
        Ok(user)
    }

    /// Resumes the session held by the saved credential, if the backend still accepts it.
    pub async fn restore_session(&self) -> ClientResult<Option<UserIdentity>> {
        if self.session.token().await.is_none() {
            return Ok(None);
        }

        let response = self.gateway.check_session().await?;
        match (response.authenticated, response.user) {
            (true, Some(user)) => {
                info!(user = %user.preferred_username, "auth: session restored");
                self.establish(user.clone()).await;
                Ok(Some(user))
            }
            _ => {
                info!("auth: saved session is no longer valid");
                self.session.set_token(None).await;
                self.persistence.clear_token().await;
                Ok(None)
            }
        }
    }

    async fn establish(&self, user: UserIdentity) {
        let username = user.preferred_username.clone();
        self.session.set_identity(Some(user.clone())).await;
        self.emit(ClientEvent::IdentityChanged(Some(user)));

        let restored = self.persistence.attach(&username).await;

        {
            let mut chat = self.chat.lock().await;
            chat.restore(restored.history);
            self.emit(ClientEvent::ConversationRestored(chat.turns().to_vec()));
        }

        *self.theme.write().await = restored.theme;
        self.emit(ClientEvent::ThemeChanged(restored.theme));

        if let Some(cached) = restored.documents {
            let mut documents = self.documents.lock().await;
            documents.replace_all(cached);
            self.emit(ClientEvent::DocumentsChanged(documents.visible().to_vec()));
        }

        if let Err(err) = self.refresh_documents().await {
            warn!(user = %username, "documents: initial load failed: {err}");
            self.notify(Notice::error(err.to_string()));
        }
    }

    /// Signs out. The remote logout is best effort; local teardown always runs
    /// and the saved history stays behind for the next sign-in.
    pub async fn logout(&self) -> ClientResult<()> {
        if let Err(err) = self.gateway.logout().await {
            warn!("auth: remote logout failed: {err}");
        }

        self.persistence.detach().await;
        self.session.teardown().await;
        self.persistence.clear_token().await;

        self.documents.lock().await.clear();
        self.uploads.lock().await.reset();
        self.chat.lock().await.clear();

        self.emit(ClientEvent::IdentityChanged(None));
        self.emit(ClientEvent::DocumentsChanged(Vec::new()));
        self.emit(ClientEvent::SelectionChanged(Vec::new()));
        self.emit(ClientEvent::UploadProgress(Vec::new()));
        self.emit(ClientEvent::UndoWindowChanged {
            open: false,
            pending: 0,
        });
        self.emit(ClientEvent::ChatCleared);
        info!("auth: logged out");
        Ok(())
    }

    /// Replaces the local document list with the backend's.
    pub async fn refresh_documents(&self) -> ClientResult<Vec<Document>> {
        let user = self.session.username().await;
        let remote = self.gateway.list_documents(user.as_deref()).await?;

        let (visible, summaries) = {
            let mut documents = self.documents.lock().await;
            documents.replace_all(remote);
            (documents.visible().to_vec(), documents.summaries())
        };
        info!(count = visible.len(), "documents: list refreshed");
        self.persistence.mirror_documents(&summaries).await;
        self.emit(ClientEvent::DocumentsChanged(visible.clone()));
        Ok(visible)
    }

    /// Flips a document's active flag locally, then persists it remotely. A
    /// remote failure restores the previous flag.
    pub async fn toggle_document(&self, id: DocumentId) -> ClientResult<Document> {
        let toggled = {
            let mut documents = self.documents.lock().await;
            if documents.undo_window_open() {
                return Err(ClientError::UndoWindowOpen);
            }
            let toggled = documents.toggle_active(id)?;
            self.emit(ClientEvent::DocumentsChanged(documents.visible().to_vec()));
            toggled
        };

        let user = self.session.username().await;
        let outcome = self
            .gateway
            .toggle_document(&toggled.name, toggled.active, user.as_deref())
            .await;

        let mut documents = self.documents.lock().await;
        documents.end_toggle(&toggled.name);
        match outcome {
            Ok(()) => {
                info!(document = %toggled.name, active = toggled.active, "documents: toggled");
                let summaries = documents.summaries();
                drop(documents);
                self.persistence.mirror_documents(&summaries).await;
                Ok(toggled)
            }
            Err(err) => {
                warn!(document = %toggled.name, "documents: toggle failed, rolling back: {err}");
                if !documents.set_active(&toggled.name, !toggled.active) {
                    warn!(document = %toggled.name, "documents: rollback target is gone");
                }
                self.emit(ClientEvent::DocumentsChanged(documents.visible().to_vec()));
                self.notify(Notice::error(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Hides every inactive document and opens the undo window.
    pub async fn clear_inactive(&self) -> ClientResult<usize> {
        // Lock order: documents, then uploads.
        let mut documents = self.documents.lock().await;
        if self.uploads.lock().await.is_in_flight() {
            return Err(ClientError::Busy);
        }
        let moved = documents.soft_remove_inactive()?;
        if moved == 0 {
            self.notify(Notice::info(NOTHING_TO_CLEAR));
            return Ok(0);
        }

        info!(count = moved, "documents: inactive documents queued for deletion");
        self.emit(ClientEvent::DocumentsChanged(documents.visible().to_vec()));
        self.emit(ClientEvent::UndoWindowChanged {
            open: true,
            pending: documents.pending_deletion().len(),
        });
        Ok(moved)
    }

    pub async fn undo_clear(&self) -> ClientResult<usize> {
        let (restored, visible, summaries) = {
            let mut documents = self.documents.lock().await;
            let restored = documents.undo()?;
            (restored, documents.visible().to_vec(), documents.summaries())
        };
        if restored == 0 {
            return Ok(0);
        }

        info!(count = restored, "documents: removal undone");
        self.emit(ClientEvent::DocumentsChanged(visible));
        self.emit(ClientEvent::UndoWindowChanged {
            open: false,
            pending: 0,
        });
        self.notify(Notice::success(DOCUMENTS_RESTORED));
        self.persistence.mirror_documents(&summaries).await;
        Ok(restored)
    }

    /// Permanently deletes the pending-deletion buffer, one document at a time.
    /// Individual failures are tallied and never stop the batch.
    pub async fn commit_clear(&self) -> ClientResult<DeletionSummary> {
        let batch = self.documents.lock().await.begin_commit()?;
        let mut summary = DeletionSummary::default();
        if batch.is_empty() {
            return Ok(summary);
        }

        let total = batch.len();
        self.emit(ClientEvent::ClearingProgress(Some(ClearingProgress {
            current: 0,
            total,
            percent: 0.0,
        })));

        let user = self.session.username().await;
        for (index, document) in batch.iter().enumerate() {
            let mut ramp = DeleteRamp::new(index, total);
            let outcome = drive_with_ticks(
                self.timings.delete_tick,
                self.gateway.delete_document(&document.name, user.as_deref()),
                || {
                    let progress = ClearingProgress {
                        current: index,
                        total,
                        percent: ramp.tick(),
                    };
                    self.update_clearing(progress)
                },
            )
            .await;

            match outcome {
                Ok(()) => {
                    info!(document = %document.name, "documents: deleted");
                    summary.deleted.push(document.name.clone());
                }
                Err(err) => {
                    warn!(document = %document.name, "documents: delete failed: {err}");
                    summary.failed.push((document.name.clone(), err.to_string()));
                }
            }

            self.update_clearing(ClearingProgress {
                current: index + 1,
                total,
                percent: share(index + 1, total),
            })
            .await;
        }

        let summaries = {
            let mut documents = self.documents.lock().await;
            documents.finish_commit();
            documents.summaries()
        };
        self.emit(ClientEvent::ClearingProgress(None));
        self.emit(ClientEvent::UndoWindowChanged {
            open: false,
            pending: 0,
        });
        self.persistence.mirror_documents(&summaries).await;

        info!(
            deleted = summary.deleted.len(),
            failed = summary.failed.len(),
            "documents: deletion batch finished"
        );
        if let Some(message) = summary.message() {
            self.notify(Notice::new(summary.level(), message));
        }
        Ok(summary)
    }

    async fn update_clearing(&self, progress: ClearingProgress) {
        self.documents.lock().await.set_clearing(progress);
        self.emit(ClientEvent::ClearingProgress(Some(progress)));
    }

    /// Adds files to the upload selection. Rejected files are reported in the
    /// outcome and the first rejection is surfaced as a notice.
    pub async fn select_files(&self, files: Vec<SelectedFile>) -> ClientResult<SelectionOutcome> {
        let existing = {
            let documents = self.documents.lock().await;
            if documents.undo_window_open() {
                return Err(ClientError::UndoWindowOpen);
            }
            documents.names_in_use()
        };

        let mut uploads = self.uploads.lock().await;
        let outcome = uploads.select(&existing, files)?;
        if let Some(message) = outcome.notice() {
            self.notify(Notice::error(message));
        }
        self.emit(ClientEvent::SelectionChanged(uploads.selected_names()));
        Ok(outcome)
    }

    pub async fn remove_selected(&self, name: &str) -> ClientResult<bool> {
        let mut uploads = self.uploads.lock().await;
        let removed = uploads.remove_selected(name)?;
        if removed {
            self.emit(ClientEvent::SelectionChanged(uploads.selected_names()));
        }
        Ok(removed)
    }

    /// Uploads the selection sequentially in selection order. Every file is
    /// attempted; the document list is reloaded if any upload succeeded.
    pub async fn upload_selected(self: &Arc<Self>) -> ClientResult<UploadSummary> {
        let owner = self
            .session
            .username()
            .await
            .ok_or(ClientError::NotSignedIn)?;

        let batch = {
            let documents = self.documents.lock().await;
            if documents.undo_window_open() {
                return Err(ClientError::UndoWindowOpen);
            }
            let mut uploads = self.uploads.lock().await;
            let batch = uploads.begin_batch()?;
            if !batch.is_empty() {
                self.emit(ClientEvent::UploadProgress(uploads.progress().to_vec()));
            }
            batch
        };
        let mut summary = UploadSummary::default();
        if batch.is_empty() {
            return Ok(summary);
        }
        info!(count = batch.len(), "upload: batch started");

        for file in &batch {
            self.update_upload(|uploads| uploads.mark_uploading(&file.name, UploadRamp::START))
                .await;

            let mut ramp = UploadRamp::new();
            let outcome = drive_with_ticks(
                self.timings.upload_tick,
                self.gateway.upload_document(file, &owner),
                || {
                    let percent = ramp.tick();
                    self.update_upload(move |uploads| uploads.set_percent(&file.name, percent))
                },
            )
            .await;

            match outcome {
                Ok(_) => {
                    info!(file = %file.name, "upload: complete");
                    self.update_upload(|uploads| uploads.mark_complete(&file.name))
                        .await;
                    summary.succeeded.push(file.name.clone());
                }
                Err(err) => {
                    let message = UploadFailure::classify(&err).message();
                    warn!(file = %file.name, "upload: failed: {err}");
                    self.update_upload(|uploads| uploads.mark_failed(&file.name, message.clone()))
                        .await;
                    summary.failed.push((file.name.clone(), message));
                }
            }
        }

        let generation = {
            let mut uploads = self.uploads.lock().await;
            let generation = uploads.finish_batch();
            summary.progress = uploads.progress().to_vec();
            generation
        };
        self.emit(ClientEvent::SelectionChanged(Vec::new()));
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "upload: batch finished"
        );

        if !summary.succeeded.is_empty() {
            if let Err(err) = self.refresh_documents().await {
                warn!("upload: document reload failed: {err}");
            }
        }
        if let Some(message) = summary.message() {
            self.notify(Notice::new(summary.level(), message));
        }
        self.schedule_progress_clear(generation);
        Ok(summary)
    }

    async fn update_upload(&self, apply: impl FnOnce(&mut UploadQueue)) {
        let mut uploads = self.uploads.lock().await;
        apply(&mut uploads);
        self.emit(ClientEvent::UploadProgress(uploads.progress().to_vec()));
    }

    fn schedule_progress_clear(self: &Arc<Self>, generation: u64) {
        let client = Arc::clone(self);
        let delay = self.timings.clear_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if client.uploads.lock().await.clear_progress_if(generation) {
                client.emit(ClientEvent::UploadProgress(Vec::new()));
            }
        });
    }

    /// Submits a question. Refused without side effects while another question
    /// is pending or when the text fails validation. The returned turn is the
    /// terminal state: answered, or marked as an error.
    pub async fn ask(&self, question: &str) -> ClientResult<ConversationTurn> {
        self.ensure_no_undo_window().await?;

        let pending = {
            let mut chat = self.chat.lock().await;
            if chat.is_busy() {
                return Err(ClientError::Busy);
            }
            let validation = sanitizer::validate(question);
            if !validation.valid {
                return Err(ClientError::Validation(
                    validation.message.unwrap_or_default(),
                ));
            }
            let pending = chat.begin(validation.sanitized, Utc::now().timestamp_millis())?;
            self.emit(ClientEvent::TurnUpdated(pending.clone()));
            pending
        };
        self.mirror_chat().await;

        let user = self.session.username().await;
        let outcome = self
            .gateway
            .ask_question(&pending.question, user.as_deref())
            .await;

        let settled = {
            let mut chat = self.chat.lock().await;
            match outcome {
                Ok(answer) => chat.resolve(pending.id, answer),
                Err(err) => {
                    warn!(turn = pending.id.0, "chat: question failed: {err}");
                    if err.is_timeout() {
                        self.notify(Notice::warning(SERVER_WAKING_UP));
                    }
                    chat.fail(pending.id)
                }
            }
        };
        let turn = match settled {
            Ok(turn) => turn,
            Err(err) => {
                info!(turn = pending.id.0, "chat: answer arrived after the log was cleared");
                return Err(err);
            }
        };

        self.emit(ClientEvent::TurnUpdated(turn.clone()));
        self.mirror_chat().await;
        Ok(turn)
    }

    async fn mirror_chat(&self) {
        let turns = self.chat.lock().await.turns().to_vec();
        self.persistence.mirror_history(&turns).await;
    }

    /// Empties the conversation locally and in durable storage, then asks the
    /// backend to do the same. A remote failure is reported but not returned.
    pub async fn clear_chat(&self) -> ClientResult<()> {
        self.chat.lock().await.clear();
        self.emit(ClientEvent::ChatCleared);
        self.persistence.forget_history().await;

        if let Err(err) = self.gateway.clear_chat().await {
            warn!("chat: remote clear failed: {err}");
            self.notify(Notice::warning(err.to_string()));
        }
        Ok(())
    }

    /// The backend's own record of the conversation, passed through untouched.
    pub async fn remote_history(&self) -> ClientResult<Value> {
        Ok(self.gateway.chat_history().await?)
    }

    pub async fn set_theme(&self, theme: Theme) {
        *self.theme.write().await = theme;
        self.emit(ClientEvent::ThemeChanged(theme));
        self.persistence.mirror_theme(theme).await;
    }
}

async fn open_storage(database_url: &str) -> anyhow::Result<Storage> {
    let database_url = config::prepare_database_url(database_url);
    let storage = Storage::new(&database_url).await?;
    storage.health_check().await?;
    Ok(storage)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
