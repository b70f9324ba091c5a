//! Upload queue: selection checks, per-file progress and batch outcome.

use std::collections::HashSet;

use shared::domain::{
    SelectedFile, UploadProgress, UploadStatus, MAX_DOCUMENTS_PER_UPLOAD, MAX_DOCUMENTS_PER_USER,
    MAX_FILE_SIZE,
};

use crate::{
    error::{ClientError, ClientResult, ErrorKind, GatewayError},
    events::NoticeLevel,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub accepted: Vec<String>,
    pub rejections: Vec<String>,
}

impl SelectionOutcome {
    /// Only the first rejection is shown so a large drop does not flood the user.
    pub fn notice(&self) -> Option<&str> {
        self.rejections.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFailure {
    Memory,
    Corrupt,
    IncompatibleFormat,
    Network,
    Generic(String),
}

impl UploadFailure {
    pub fn classify(err: &GatewayError) -> Self {
        if err.is_transient() {
            return Self::Network;
        }

        // Matches the backend's wording, so only the listed casings count.
        let text = err.to_string();
        let mentions = |words: &[&str]| words.iter().any(|word| text.contains(word));
        if mentions(&["memory", "Memory"]) {
            Self::Memory
        } else if mentions(&["corrupt", "invalid"]) {
            Self::Corrupt
        } else if mentions(&["format", "type"]) {
            Self::IncompatibleFormat
        } else if mentions(&["network", "timeout"]) {
            Self::Network
        } else {
            Self::Generic(text)
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Memory => "Memory error - file too large".to_string(),
            Self::Corrupt => "Corrupted or invalid file".to_string(),
            Self::IncompatibleFormat => "Incompatible file format".to_string(),
            Self::Network => "Network error - please retry".to_string(),
            Self::Generic(text) if text.trim().is_empty() => "Upload failed".to_string(),
            Self::Generic(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Progress as it stood when the batch finished, in selection order.
    pub progress: Vec<UploadProgress>,
}

impl UploadSummary {
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        (!self.failed.is_empty()).then_some(ErrorKind::PartialBatchFailure)
    }

    pub fn message(&self) -> Option<String> {
        let ok = self.succeeded.len();
        match (ok, self.failed.first()) {
            (0, None) => None,
            (0, Some((_, error))) => Some(format!("Upload failed: {error}")),
            (1, None) => Some("1 document added successfully".to_string()),
            (_, None) => Some(format!("{ok} documents added successfully")),
            (_, Some(_)) => Some(format!("{ok} uploaded, {} failed", self.failed.len())),
        }
    }

    pub fn level(&self) -> NoticeLevel {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (_, true) => NoticeLevel::Success,
            (false, false) => NoticeLevel::Warning,
            (true, false) => NoticeLevel::Error,
        }
    }
}

/// Selected files plus progress of the batch in flight. Pure state; the client
/// facade performs the remote calls.
#[derive(Debug, Default)]
pub struct UploadQueue {
    selected: Vec<SelectedFile>,
    progress: Vec<UploadProgress>,
    in_flight: bool,
    generation: u64,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> &[SelectedFile] {
        &self.selected
    }

    pub fn selected_names(&self) -> Vec<String> {
        self.selected.iter().map(|f| f.name.clone()).collect()
    }

    pub fn progress(&self) -> &[UploadProgress] {
        &self.progress
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Appends acceptable files to the selection. `existing` holds the names of
    /// documents the user already owns.
    pub fn select(
        &mut self,
        existing: &[String],
        files: Vec<SelectedFile>,
    ) -> ClientResult<SelectionOutcome> {
        if self.in_flight {
            return Err(ClientError::Busy);
        }

        let existing: HashSet<&str> = existing.iter().map(String::as_str).collect();
        let mut taken: HashSet<String> = self.selected.iter().map(|f| f.name.clone()).collect();
        let mut rejections = Vec::new();
        let mut valid = Vec::new();

        for file in files {
            if file.size_bytes > MAX_FILE_SIZE {
                rejections.push(format!("\"{}\" exceeds 200MB limit", file.name));
                continue;
            }
            if taken.contains(&file.name) {
                rejections.push(format!("\"{}\" is already selected", file.name));
                continue;
            }
            if existing.contains(file.name.as_str()) {
                rejections.push(format!(
                    "\"{}\" already exists. Remove it before adding again",
                    file.name
                ));
                continue;
            }
            taken.insert(file.name.clone());
            valid.push(file);
        }

        let occupied = existing.len() + self.selected.len();
        if occupied + valid.len() > MAX_DOCUMENTS_PER_USER {
            let allowed = MAX_DOCUMENTS_PER_USER.saturating_sub(occupied);
            if allowed == 0 {
                rejections.push(format!(
                    "You can upload maximum {MAX_DOCUMENTS_PER_USER} documents. Remove some to add more."
                ));
            } else {
                rejections.push(format!(
                    "Only {allowed} more document(s) can be added. Max limit is {MAX_DOCUMENTS_PER_USER}."
                ));
            }
            valid.truncate(allowed);
        }

        if self.selected.len() + valid.len() > MAX_DOCUMENTS_PER_UPLOAD {
            rejections.push(format!(
                "You can only upload {MAX_DOCUMENTS_PER_UPLOAD} documents at once."
            ));
            valid.truncate(MAX_DOCUMENTS_PER_UPLOAD.saturating_sub(self.selected.len()));
        }

        let accepted = valid.iter().map(|f| f.name.clone()).collect();
        self.selected.extend(valid);
        Ok(SelectionOutcome {
            accepted,
            rejections,
        })
    }

    pub fn remove_selected(&mut self, name: &str) -> ClientResult<bool> {
        if self.in_flight {
            return Err(ClientError::Busy);
        }
        let before = self.selected.len();
        self.selected.retain(|f| f.name != name);
        Ok(self.selected.len() != before)
    }

    /// Starts a batch over the current selection, every file `pending`.
    pub fn begin_batch(&mut self) -> ClientResult<Vec<SelectedFile>> {
        if self.in_flight {
            return Err(ClientError::Busy);
        }
        if self.selected.is_empty() {
            return Ok(Vec::new());
        }
        self.in_flight = true;
        self.generation += 1;
        self.progress = self
            .selected
            .iter()
            .map(|file| UploadProgress {
                name: file.name.clone(),
                status: UploadStatus::Pending,
                percent: 0,
                error: None,
            })
            .collect();
        Ok(self.selected.clone())
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut UploadProgress> {
        self.progress.iter_mut().find(|p| p.name == name)
    }

    pub fn mark_uploading(&mut self, name: &str, percent: u8) {
        if let Some(entry) = self.entry_mut(name) {
            entry.status = UploadStatus::Uploading;
            entry.percent = percent;
        }
    }

    /// Cosmetic update; ignored once the file has left `uploading`.
    pub fn set_percent(&mut self, name: &str, percent: u8) {
        if let Some(entry) = self.entry_mut(name) {
            if entry.status == UploadStatus::Uploading {
                entry.percent = percent.max(entry.percent);
            }
        }
    }

    pub fn mark_complete(&mut self, name: &str) {
        if let Some(entry) = self.entry_mut(name) {
            entry.status = UploadStatus::Complete;
            entry.percent = 100;
            entry.error = None;
        }
    }

    pub fn mark_failed(&mut self, name: &str, error: String) {
        if let Some(entry) = self.entry_mut(name) {
            entry.status = UploadStatus::Failed;
            entry.percent = 0;
            entry.error = Some(error);
        }
    }

    /// Clears the selection and returns the batch generation so a delayed
    /// progress clear can tell whether a newer batch has started since.
    pub fn finish_batch(&mut self) -> u64 {
        self.selected.clear();
        self.in_flight = false;
        self.generation
    }

    pub fn clear_progress_if(&mut self, generation: u64) -> bool {
        if self.in_flight || self.generation != generation || self.progress.is_empty() {
            return false;
        }
        self.progress.clear();
        true
    }

    pub fn reset(&mut self) {
        self.selected.clear();
        self.progress.clear();
        self.in_flight = false;
        self.generation += 1;
    }
}

#[cfg(test)]
#[path = "tests/uploads_tests.rs"]
mod tests;
