//! Configuration Vault – reads/writes `~/.reminisce/config.toml`.

use reminisce_runtime::speech_http::DEFAULT_TTS_BASE_URL;
use reminisce_types::Settings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

/// Persisted user configuration stored in `~/.reminisce/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible language model server.
    #[serde(default = "default_llm_url")]
    pub llm_url: String,

    /// Model used for greetings and summaries. Should accept images for
    /// the greeting to see the visitor.
    #[serde(default = "default_model")]
    pub llm_model: String,

    /// Bearer token for the language model server; empty for local servers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub llm_api_key: String,

    /// Base URL of the text-to-speech service.
    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    #[serde(default)]
    pub tts_voice_id: String,

    /// Text-to-speech API key. Without one, greetings are shown but not
    /// spoken.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tts_api_key: String,

    /// SQLite file holding enrolled people and their memories.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Session and reminder tunables. Edits from `/set` are written back here.
    #[serde(default)]
    pub settings: Settings,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("llm_url", &self.llm_url)
            .field("llm_model", &self.llm_model)
            .field("llm_api_key", redact(&self.llm_api_key))
            .field("tts_url", &self.tts_url)
            .field("tts_voice_id", &self.tts_voice_id)
            .field("tts_api_key", redact(&self.tts_api_key))
            .field("db_path", &self.db_path)
            .field("settings", &self.settings)
            .finish()
    }
}

fn redact(secret: &str) -> &'static dyn std::fmt::Debug {
    if secret.is_empty() { &"<not set>" } else { &"<redacted>" }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.llm_api_key.zeroize();
        self.tts_api_key.zeroize();
    }
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llava".to_string()
}
fn default_tts_url() -> String {
    DEFAULT_TTS_BASE_URL.to_string()
}
fn default_db_path() -> String {
    reminisce_dir(&home_dir())
        .join("identities.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_url: default_llm_url(),
            llm_model: default_model(),
            llm_api_key: String::new(),
            tts_url: default_tts_url(),
            tts_voice_id: String::new(),
            tts_api_key: String::new(),
            db_path: default_db_path(),
            settings: Settings::default(),
        }
    }
}

impl Config {
    /// `true` when speech can actually be synthesized.
    pub fn has_voice(&self) -> bool {
        !self.tts_api_key.is_empty() && !self.tts_voice_id.is_empty()
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn reminisce_dir(home: &str) -> PathBuf {
    PathBuf::from(home).join(".reminisce")
}

/// Return the path to `~/.reminisce/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    reminisce_dir(home).join("config.toml")
}

/// Load the config from disk with environment overrides applied.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `REMINISCE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `REMINISCE_LLM_URL` | `llm_url` |
/// | `REMINISCE_MODEL` | `llm_model` |
/// | `REMINISCE_LLM_API_KEY` | `llm_api_key` |
/// | `REMINISCE_TTS_VOICE` | `tts_voice_id` |
/// | `REMINISCE_TTS_API_KEY` | `tts_api_key` |
/// | `REMINISCE_DB_PATH` | `db_path` |
/// | `REMINISCE_GRACE_MS` | `settings.session.grace_period_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("REMINISCE_LLM_URL") {
        cfg.llm_url = v;
    }
    if let Ok(v) = std::env::var("REMINISCE_MODEL") {
        cfg.llm_model = v;
    }
    if let Ok(v) = std::env::var("REMINISCE_LLM_API_KEY") {
        cfg.llm_api_key = v;
    }
    if let Ok(v) = std::env::var("REMINISCE_TTS_VOICE") {
        cfg.tts_voice_id = v;
    }
    if let Ok(v) = std::env::var("REMINISCE_TTS_API_KEY") {
        cfg.tts_api_key = v;
    }
    if let Ok(v) = std::env::var("REMINISCE_DB_PATH") {
        cfg.db_path = v;
    }
    if let Ok(v) = std::env::var("REMINISCE_GRACE_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.settings.session.grace_period_ms = ms;
    }
}

/// Save the config to disk, creating `~/.reminisce/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
