// Praxis Engine — Configuration
// Plain config struct resolved once at startup; everything downstream
// receives it by reference. No config file — environment variables only,
// with workable defaults for local runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default Anthropic model when none is configured.
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database path; `None` means `~/.praxis/engine.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Anthropic API key. Absent key selects the deterministic mock
    /// provider instead of failing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    /// Override for the provider base URL (proxies, test servers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
        }
    }
}

impl EngineConfig {
    /// Resolve from `PRAXIS_DB_PATH`, `PRAXIS_API_KEY`, `PRAXIS_MODEL`,
    /// `PRAXIS_BASE_URL`. Empty values count as unset.
    pub fn from_env() -> Self {
        let get = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            db_path: get("PRAXIS_DB_PATH").map(PathBuf::from),
            api_key: get("PRAXIS_API_KEY"),
            model: get("PRAXIS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get("PRAXIS_BASE_URL"),
        }
    }
}
