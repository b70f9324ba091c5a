//! Local view of the user's documents, including the soft-delete buffer.

use std::collections::{HashMap, HashSet};

use shared::{
    domain::{ClearingProgress, Document, DocumentId},
    protocol::DocumentSummary,
};

use crate::{
    error::{ClientError, ClientResult},
    events::NoticeLevel,
};

pub const NOTHING_TO_CLEAR: &str = "No inactive documents to clear";
pub const DOCUMENTS_RESTORED: &str = "Documents restored";

/// Visible documents plus the pending-deletion buffer. The two never share a
/// name, and the undo window is open exactly while the buffer holds entries.
#[derive(Debug, Default)]
pub struct DocumentStore {
    visible: Vec<Document>,
    pending_deletion: Vec<Document>,
    clearing: Option<ClearingProgress>,
    committing: bool,
    toggling: HashSet<String>,
    next_id: i64,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(&self) -> &[Document] {
        &self.visible
    }

    pub fn pending_deletion(&self) -> &[Document] {
        &self.pending_deletion
    }

    pub fn clearing(&self) -> Option<&ClearingProgress> {
        self.clearing.as_ref()
    }

    pub fn undo_window_open(&self) -> bool {
        !self.pending_deletion.is_empty()
    }

    pub fn is_committing(&self) -> bool {
        self.committing
    }

    /// Names the user still owns remotely, hidden or not.
    pub fn names_in_use(&self) -> Vec<String> {
        self.visible
            .iter()
            .chain(&self.pending_deletion)
            .map(|doc| doc.name.clone())
            .collect()
    }

    pub fn summaries(&self) -> Vec<DocumentSummary> {
        self.visible
            .iter()
            .map(|doc| DocumentSummary {
                name: doc.name.clone(),
                active: doc.active,
            })
            .collect()
    }

    /// Replaces the visible set with the remote list. Names already buffered for
    /// deletion stay hidden. A name keeps its local id across reloads.
    pub fn replace_all(&mut self, remote: Vec<DocumentSummary>) {
        let known: HashMap<String, DocumentId> = self
            .visible
            .iter()
            .map(|doc| (doc.name.clone(), doc.id))
            .collect();

        let mut visible = Vec::with_capacity(remote.len());
        for summary in remote {
            if self.pending_deletion.iter().any(|d| d.name == summary.name)
                || visible.iter().any(|d: &Document| d.name == summary.name)
            {
                continue;
            }
            let id = match known.get(&summary.name) {
                Some(id) => *id,
                None => self.allocate_id(),
            };
            visible.push(Document {
                id,
                name: summary.name,
                active: summary.active,
            });
        }
        self.visible = visible;
    }

    fn allocate_id(&mut self) -> DocumentId {
        self.next_id += 1;
        DocumentId(self.next_id)
    }

    /// Flips `active` locally and returns the updated document. The document
    /// counts as toggling until `end_toggle` is called for it.
    pub fn toggle_active(&mut self, id: DocumentId) -> ClientResult<Document> {
        let doc = self
            .visible
            .iter_mut()
            .find(|doc| doc.id == id)
            .ok_or(ClientError::UnknownDocument(id))?;
        if self.toggling.contains(&doc.name) {
            return Err(ClientError::Busy);
        }
        doc.active = !doc.active;
        self.toggling.insert(doc.name.clone());
        Ok(doc.clone())
    }

    pub fn end_toggle(&mut self, name: &str) {
        self.toggling.remove(name);
    }

    pub fn is_toggling(&self) -> bool {
        !self.toggling.is_empty()
    }

    /// Used to roll back an optimistic toggle.
    pub fn set_active(&mut self, name: &str, active: bool) -> bool {
        match self.visible.iter_mut().find(|doc| doc.name == name) {
            Some(doc) => {
                doc.active = active;
                true
            }
            None => false,
        }
    }

    /// Moves every inactive document into the pending-deletion buffer. Refused
    /// while a toggle is unconfirmed, since its rollback needs the document visible.
    pub fn soft_remove_inactive(&mut self) -> ClientResult<usize> {
        if self.committing {
            return Err(ClientError::DeletionInProgress);
        }
        if self.is_toggling() {
            return Err(ClientError::Busy);
        }
        let (inactive, active): (Vec<_>, Vec<_>) =
            self.visible.drain(..).partition(|doc| !doc.active);
        self.visible = active;
        let moved = inactive.len();
        self.pending_deletion.extend(inactive);
        Ok(moved)
    }

    /// Restores the buffer to the visible list in its original order.
    pub fn undo(&mut self) -> ClientResult<usize> {
        if self.committing {
            return Err(ClientError::DeletionInProgress);
        }
        let restored = self.pending_deletion.len();
        self.visible.append(&mut self.pending_deletion);
        self.visible.sort_by_key(|doc| doc.id);
        Ok(restored)
    }

    /// Snapshots the buffer for a sequential remote delete. The buffer stays in
    /// place, and the undo window open, until `finish_commit`.
    pub fn begin_commit(&mut self) -> ClientResult<Vec<Document>> {
        if self.committing {
            return Err(ClientError::DeletionInProgress);
        }
        if self.pending_deletion.is_empty() {
            return Ok(Vec::new());
        }
        self.committing = true;
        self.clearing = Some(ClearingProgress {
            current: 0,
            total: self.pending_deletion.len(),
            percent: 0.0,
        });
        Ok(self.pending_deletion.clone())
    }

    pub fn set_clearing(&mut self, progress: ClearingProgress) {
        if self.committing {
            self.clearing = Some(progress);
        }
    }

    /// Empties the buffer whatever the per-item outcomes were.
    pub fn finish_commit(&mut self) {
        self.pending_deletion.clear();
        self.committing = false;
        self.clearing = None;
    }

    pub fn clear(&mut self) {
        self.visible.clear();
        self.pending_deletion.clear();
        self.committing = false;
        self.toggling.clear();
        self.clearing = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl DeletionSummary {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.failed.is_empty()
    }

    pub fn message(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let deleted = self.deleted.len();
        Some(if !self.failed.is_empty() {
            format!("{deleted} deleted, {} failed", self.failed.len())
        } else if deleted == 1 {
            "1 document permanently deleted".to_string()
        } else {
            format!("{deleted} documents permanently deleted")
        })
    }

    pub fn level(&self) -> NoticeLevel {
        if self.failed.is_empty() {
            NoticeLevel::Success
        } else {
            NoticeLevel::Info
        }
    }
}
