use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "docchat.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayTimeouts {
    /// Quick reads and JSON calls.
    pub request: Duration,
    /// Upload plus server-side processing; the backend may be cold-starting.
    pub upload: Duration,
    pub login: Duration,
}

impl Default for GatewayTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(60),
            upload: Duration::from_secs(300),
            login: Duration::from_secs(90),
        }
    }
}

/// Cadence of the cosmetic progress ramps. None of these affect correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTimings {
    pub upload_tick: Duration,
    pub delete_tick: Duration,
    pub clear_delay: Duration,
}

impl Default for ProgressTimings {
    fn default() -> Self {
        Self {
            upload_tick: Duration::from_millis(200),
            delete_tick: Duration::from_millis(100),
            clear_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub database_url: String,
    pub timeouts: GatewayTimeouts,
    pub progress: ProgressTimings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            database_url: "sqlite://./data/docchat.db".into(),
            timeouts: GatewayTimeouts::default(),
            progress: ProgressTimings::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    database_url: Option<String>,
    request_timeout_secs: Option<u64>,
    upload_timeout_secs: Option<u64>,
    login_timeout_secs: Option<u64>,
    upload_progress_tick_ms: Option<u64>,
    delete_progress_tick_ms: Option<u64>,
    progress_clear_delay_ms: Option<u64>,
}

/// Defaults, then `docchat.toml` in the working directory, then environment.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!("config: ignoring malformed {}: {err}", path.display()),
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file_settings(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.timeouts.request = Duration::from_secs(v);
    }
    if let Some(v) = file_cfg.upload_timeout_secs {
        settings.timeouts.upload = Duration::from_secs(v);
    }
    if let Some(v) = file_cfg.login_timeout_secs {
        settings.timeouts.login = Duration::from_secs(v);
    }
    if let Some(v) = file_cfg.upload_progress_tick_ms {
        settings.progress.upload_tick = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.delete_progress_tick_ms {
        settings.progress.delete_tick = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.progress_clear_delay_ms {
        settings.progress.clear_delay = Duration::from_millis(v);
    }
}

fn apply_env_overrides(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("DOCCHAT_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.timeouts.request = Duration::from_secs(v);
    }
    if let Some(v) = lookup("APP__UPLOAD_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.timeouts.upload = Duration::from_secs(v);
    }
    if let Some(v) = lookup("APP__LOGIN_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.timeouts.login = Duration::from_secs(v);
    }
}

/// Turns a bare path or `sqlite:` shorthand into a `sqlite://` url. The store
/// creates any missing parent directory when it opens.
pub fn prepare_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return ClientSettings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}
