//! Engine configuration loading
//!
//! Loads configuration from `~/.config/oasis/oasis.toml` (or `OASIS_CONFIG`),
//! then applies environment overrides. Every field has a default, so a
//! missing file yields a mock-mode configuration that needs no credentials.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::EngineError;
use crate::errors::Result;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Serve `auto` runs from the canned mock generator.
    #[serde(default = "default_mock_mode")]
    pub mock_mode: bool,

    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Upper bound for one chat-completion round trip.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Sampling temperature for model families that accept one.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Directory of `*.txt` system-prompt variants, one per file stem.
    #[serde(default)]
    pub prompt_variants_dir: Option<PathBuf>,
}

fn default_mock_mode() -> bool {
    true
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_output_tokens() -> u32 {
    2000
}

fn default_temperature() -> f64 {
    0.2
}

fn default_store_path() -> PathBuf {
    std::env::temp_dir().join("oasis_store.json")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mock_mode: default_mock_mode(),
            llm_provider: default_llm_provider(),
            llm_model: default_llm_model(),
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            store_path: default_store_path(),
            prompt_variants_dir: None,
        }
    }
}

impl EngineConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "OASIS_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "oasis.toml";

    /// Load configuration from file, then apply environment overrides.
    ///
    /// Resolution order:
    /// 1. `OASIS_CONFIG` environment variable
    /// 2. `~/.config/oasis/oasis.toml`
    ///
    /// If the config file doesn't exist, starts from the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        let mut cfg = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            tracing::info!(path = %path.display(), "oasis config not found, using defaults");
            Self::default()
        };

        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(contents)
            .map_err(|e| EngineError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("oasis")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Apply environment overrides. `lookup` returns the raw value of a
    /// variable; blank values count as unset.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(path) = get("OASIS_STORE_PATH") {
            self.store_path = PathBuf::from(path);
        }
        if let Some(raw) = get("OASIS_MOCK_MODE") {
            match parse_bool(&raw) {
                Some(flag) => self.mock_mode = flag,
                None => tracing::warn!(value = %raw, "ignoring unrecognised OASIS_MOCK_MODE"),
            }
        }
        if let Some(provider) = get("OASIS_LLM_PROVIDER") {
            self.llm_provider = provider;
        }
        if let Some(model) = get("OASIS_LLM_MODEL") {
            self.llm_model = model;
        }
        if let Some(dir) = get("OASIS_PROMPT_VARIANTS_DIR") {
            self.prompt_variants_dir = Some(PathBuf::from(dir));
        }
    }

    /// Configured API key, if non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(EngineError::config("request_timeout_secs must be positive"));
        }
        if self.max_output_tokens == 0 {
            return Err(EngineError::config("max_output_tokens must be positive"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(EngineError::config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.llm_provider.trim().is_empty() {
            return Err(EngineError::config("llm_provider must not be blank"));
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
