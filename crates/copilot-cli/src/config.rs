use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use copilot_core::DEFAULT_SYSTEM_PROMPT;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    /// Where messages, projects and the saved API key live
    /// (supports $HOME, ~). Defaults to the platform data directory.
    #[serde(default)]
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayKind {
    /// Call the chat-completions API directly.
    #[default]
    Openai,
    /// Post `{messages}` to a relay endpoint that answers `{reply}`.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub kind: RelayKind,

    /// Falls back to OPENAI_API_KEY, then to the key saved with /key.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    /// Endpoint for the `http` relay.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    copilot_relay::openai::DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    copilot_relay::openai::DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    copilot_relay::openai::DEFAULT_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            kind: RelayKind::default(),
            api_key: None,
            base_url: None,
            url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Milliseconds between revealed characters.
    #[serde(default = "default_reveal_interval_ms")]
    pub reveal_interval_ms: u64,

    /// Reveal replies progressively. Always off when stdout is not a terminal.
    #[serde(default = "default_true")]
    pub animate: bool,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_reveal_interval_ms() -> u64 {
    copilot_core::reveal::DEFAULT_INTERVAL.as_millis() as u64
}

fn default_true() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            reveal_interval_ms: default_reveal_interval_ms(),
            animate: true,
        }
    }
}

/// Expand environment variables in a path string
/// Supports: $VAR, ${VAR}, ~
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    } else if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    let re = match regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") {
        Ok(re) => re,
        Err(_) => return PathBuf::from(result),
    };
    let expanded = re.replace_all(&result, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.to_string())
}

impl Config {
    /// Defaults, then `config.toml` when present, then `COPILOT_*`
    /// environment variables (`COPILOT_RELAY__MODEL=gpt-4o-mini`).
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("COPILOT_").split("__"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("copilot"))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(expand_path(dir));
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join("copilot"))
    }

    pub fn history_path() -> Option<PathBuf> {
        Self::config_dir().ok().map(|d| d.join("chat_history"))
    }

    /// API key from the config file or the environment, if any.
    pub fn api_key(&self) -> Option<String> {
        self.relay
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            data_dir = "/tmp/copilot"

            [relay]
            kind = "http"
            url = "http://localhost:3000/copilot/api/claude"
            max_tokens = 500

            [chat]
            animate = false
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.relay.kind, RelayKind::Http);
        assert_eq!(config.relay.max_tokens, 500);
        assert_eq!(config.relay.model, "gpt-4o");
        assert!(!config.chat.animate);
        assert_eq!(config.chat.reveal_interval_ms, 20);
        assert_eq!(config.data_dir.as_deref(), Some("/tmp/copilot"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.relay.kind, RelayKind::Openai);
        assert!((config.relay.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.chat.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[relay]\nmodel = \"gpt-4o-mini\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.relay.model, "gpt-4o-mini");
        assert_eq!(config.relay.max_tokens, 2000);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[relay]\nkind = \"carrier-pigeon\"\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_expand_path() {
        std::env::set_var("COPILOT_TEST_DIR", "/var/data");
        assert_eq!(
            expand_path("$COPILOT_TEST_DIR/chat"),
            PathBuf::from("/var/data/chat")
        );
        assert_eq!(
            expand_path("${COPILOT_TEST_DIR}/chat"),
            PathBuf::from("/var/data/chat")
        );
        assert_eq!(
            expand_path("$COPILOT_UNSET_VAR_XYZ/x"),
            PathBuf::from("$COPILOT_UNSET_VAR_XYZ/x")
        );
    }
}
