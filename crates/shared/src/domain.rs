use std::{collections::HashSet, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);
    };
}

id_newtype!(DocumentId);
id_newtype!(TurnId);

pub const MAX_DOCUMENTS_PER_USER: usize = 10;
pub const MAX_DOCUMENTS_PER_UPLOAD: usize = 10;
pub const MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;

/// A document owned by the signed-in user. The server identifies documents by
/// `name`; `id` is only stable for the lifetime of the local session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub active: bool,
}

#[derive(Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Vec<u8>),
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
        }
    }
}

/// A locally chosen file that has not been uploaded yet.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub size_bytes: u64,
    pub source: FileSource,
}

impl SelectedFile {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size_bytes: bytes.len() as u64,
            source: FileSource::Memory(bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Complete,
    Failed,
}

/// Per-file upload state. `status` is driven by real call completion; `percent`
/// is cosmetic while the file is `Uploading`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub name: String,
    pub status: UploadStatus,
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ClearingProgress {
    pub current: usize,
    pub total: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub preferred_username: String,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl UserIdentity {
    pub fn new(preferred_username: impl Into<String>) -> Self {
        Self {
            preferred_username: preferred_username.into(),
            claims: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Cosmic,
    Ocean,
    Sunset,
    Forest,
    Midnight,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::Cosmic,
        Theme::Ocean,
        Theme::Sunset,
        Theme::Forest,
        Theme::Midnight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Cosmic => "cosmic",
            Theme::Ocean => "ocean",
            Theme::Sunset => "sunset",
            Theme::Forest => "forest",
            Theme::Midnight => "midnight",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown theme '{0}'")]
pub struct UnknownTheme(pub String);

impl FromStr for Theme {
    type Err = UnknownTheme;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .into_iter()
            .find(|theme| theme.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownTheme(value.to_string()))
    }
}

/// A citation attached to an answer. The backend sends either structured
/// references or bare strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceRef {
    Structured {
        source: String,
        #[serde(default)]
        page: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        section: Option<String>,
    },
    Plain(String),
}

impl SourceRef {
    fn dedup_key(&self) -> String {
        match self {
            SourceRef::Structured {
                source,
                page,
                section,
            } => {
                let page = match page {
                    Value::Null => String::new(),
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                format!("s:{source}\u{1f}{page}\u{1f}{}", section.as_deref().unwrap_or(""))
            }
            SourceRef::Plain(raw) => format!("p:{raw}"),
        }
    }
}

/// Collapses sources sharing `(source, page, section)` (or the same raw string),
/// keeping the first occurrence in order.
pub fn dedupe_sources(sources: &[SourceRef]) -> Vec<&SourceRef> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .filter(|source| seen.insert(source.dedup_key()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: TurnId,
    pub question: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub short_answer: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub response_time_seconds: Option<f64>,
    #[serde(default)]
    pub is_short_answer_type: bool,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub is_greeting: bool,
    #[serde(default)]
    pub is_list: bool,
}

impl ConversationTurn {
    pub fn pending(id: TurnId, question: impl Into<String>) -> Self {
        Self {
            id,
            question: question.into(),
            answer: None,
            short_answer: None,
            confidence: None,
            sources: Vec::new(),
            response_time_seconds: None,
            is_short_answer_type: false,
            is_loading: true,
            is_error: false,
            is_greeting: false,
            is_list: false,
        }
    }

    /// Two decimal places with a trailing `s`, e.g. `1.50s`.
    pub fn response_time_label(&self) -> Option<String> {
        self.response_time_seconds
            .map(|seconds| format!("{seconds:.2}s"))
    }

    pub fn display_sources(&self) -> Vec<&SourceRef> {
        dedupe_sources(&self.sources)
    }

    pub fn is_resolved(&self) -> bool {
        !self.is_loading
    }
}
