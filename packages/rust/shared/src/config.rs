//! Application configuration for kbmirror.
//!
//! User config lives at `~/.kbmirror/kbmirror.toml`.
//! CLI flags override config file values, which override defaults.
//! The API token itself never lives in the file; `token_env` names the
//! environment variable that holds it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MirrorError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kbmirror.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kbmirror";

/// Fallback env var consulted when `server.base_url` is empty, so container
/// deployments can run without a config file.
const BASE_URL_ENV: &str = "ZAMMAD_URL";

// ---------------------------------------------------------------------------
// Config structs (matching kbmirror.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Zammad server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Export behavior.
    #[serde(default)]
    pub export: ExportConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the Zammad instance, e.g. `https://support.example.com`.
    #[serde(default)]
    pub base_url: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token_env: default_token_env(),
        }
    }
}

fn default_token_env() -> String {
    "ZAMMAD_TOKEN".into()
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Id of the knowledge base to mirror.
    #[serde(default = "default_kb_id")]
    pub kb_id: u64,

    /// Directory the Markdown tree is written into.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Minimum ms between requests to the server.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Whether to emit YAML frontmatter blocks in the generated files.
    #[serde(default = "default_true")]
    pub frontmatter: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            kb_id: default_kb_id(),
            output_dir: default_output_dir(),
            rate_limit_ms: default_rate_limit(),
            frontmatter: true,
        }
    }
}

fn default_kb_id() -> u64 {
    1
}
fn default_output_dir() -> String {
    "./kb-export".into()
}
fn default_rate_limit() -> u64 {
    100
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kbmirror/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MirrorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kbmirror/kbmirror.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MirrorError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MirrorError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MirrorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(MirrorError::config(format!(
            "config file already exists at {}",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MirrorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MirrorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

// ---------------------------------------------------------------------------
// Credential resolution
// ---------------------------------------------------------------------------

/// Resolve the server base URL from config or the `ZAMMAD_URL` env var.
/// The returned URL has no trailing slash.
pub fn resolve_base_url(config: &AppConfig) -> Result<String> {
    let raw = if config.server.base_url.is_empty() {
        std::env::var(BASE_URL_ENV).unwrap_or_default()
    } else {
        config.server.base_url.clone()
    };
    check_base_url(raw.trim())
}

/// Resolve the API token from the env var named by `server.token_env`.
pub fn resolve_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.server.token_env;
    let value = std::env::var(var_name).unwrap_or_default();
    check_token(var_name, value.trim())
}

fn check_base_url(raw: &str) -> Result<String> {
    let base = raw.trim_end_matches('/');
    if base.is_empty() {
        return Err(MirrorError::config(format!(
            "server base URL is not set. Add server.base_url to kbmirror.toml \
             or set the {BASE_URL_ENV} environment variable."
        )));
    }
    if base.contains("your-zammad") {
        return Err(MirrorError::config(
            "server.base_url still holds the placeholder value; point it at your Zammad instance",
        ));
    }
    Url::parse(base).map_err(|e| MirrorError::config(format!("invalid base URL {base}: {e}")))?;
    Ok(base.to_string())
}

fn check_token(var_name: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(MirrorError::config(format!(
            "API token not found. Set the {var_name} environment variable \
             (create a token under Zammad profile settings, Token Access, \
             with knowledge_base.reader permission)."
        )));
    }
    if value.contains("your_api_token") {
        return Err(MirrorError::config(format!(
            "{var_name} still holds the placeholder value; paste a real API token"
        )));
    }
    Ok(value.to_string())
}
