//! Configuration vault – reads/writes `~/.picarx/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use picarx_runtime::NavigationConfig;
use serde::{Deserialize, Serialize};

/// Persisted user configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of an OpenAI-compatible server (Ollama, vLLM, OpenAI, ...).
    #[serde(default = "default_llm_url")]
    pub llm_url: String,

    /// Model used for classification, decomposition and vision.
    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token for hosted servers; empty for local ones.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// Plans are stored per session identifier.
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// SQLite file holding plans.  Empty keeps plans in memory only.
    #[serde(default)]
    pub session_db: String,

    #[serde(default)]
    pub navigation: NavigationConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("llm_url", &self.llm_url)
            .field("model", &self.model)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("session_id", &self.session_id)
            .field("session_db", &self.session_db)
            .field("navigation", &self.navigation)
            .finish()
    }
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.2-vision".to_string()
}
fn default_session_id() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_url: default_llm_url(),
            model: default_model(),
            api_key: String::new(),
            session_id: default_session_id(),
            session_db: String::new(),
            navigation: NavigationConfig::default(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// `~/.picarx/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".picarx").join("config.toml")
}

/// Suggested SQLite location next to the config file.
pub fn default_session_db() -> PathBuf {
    PathBuf::from(home_dir()).join(".picarx").join("sessions.db")
}

/// Load the config from disk.  `None` when the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `PICARX_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `PICARX_LLM_URL` | `llm_url` |
/// | `PICARX_MODEL` | `model` |
/// | `PICARX_API_KEY` | `api_key` |
/// | `PICARX_SESSION` | `session_id` |
/// | `PICARX_SESSION_DB` | `session_db` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("PICARX_LLM_URL") {
        cfg.llm_url = v;
    }
    if let Some(v) = lookup("PICARX_MODEL") {
        cfg.model = v;
    }
    if let Some(v) = lookup("PICARX_API_KEY") {
        cfg.api_key = v;
    }
    if let Some(v) = lookup("PICARX_SESSION").filter(|v| !v.trim().is_empty()) {
        cfg.session_id = v;
    }
    if let Some(v) = lookup("PICARX_SESSION_DB") {
        cfg.session_db = v;
    }
}

/// Save the config, creating `~/.picarx/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // The file may hold an API key: owner read/write only.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
