use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CAPTION_ENDPOINT: &str = "https://api.replicate.com/v1/predictions";
pub const DEFAULT_CAPTION_VERSION: &str =
    "c1f0352f9da298ac874159e350d6d78139e3805b7e55f5df7c5b79a66ae19528";
pub const DEFAULT_COMPLETION_ENDPOINT: &str =
    "https://api.ai21.com/studio/v1/j2-jumbo-instruct/complete";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Captioning service (Replicate predictions API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptionSettings {
    pub api_key: String,
    pub endpoint: String,
    pub version: String,
    pub num_beams: u32,
    /// Pause between status checks. Values under 100ms are raised to 100ms.
    pub poll_interval_ms: u64,
    /// Upper bound on polling. Zero polls until the job settles.
    pub poll_timeout_secs: u64,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_CAPTION_ENDPOINT.to_string(),
            version: DEFAULT_CAPTION_VERSION.to_string(),
            num_beams: 1,
            poll_interval_ms: 1000,
            poll_timeout_secs: 300,
        }
    }
}

/// Text-completion service. `provider` is `ai21` or one of the chat
/// providers understood by the completion engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionSettings {
    pub provider: String,
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            provider: "ai21".to_string(),
            api_key: String::new(),
            endpoint: DEFAULT_COMPLETION_ENDPOINT.to_string(),
            model: "j2-jumbo-instruct".to_string(),
            max_tokens: 2048,
            temperature: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub bind: String,
    pub caption: CaptionSettings,
    pub completion: CompletionSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            caption: CaptionSettings::default(),
            completion: CompletionSettings::default(),
        }
    }
}

// --- Storage ---

/// Resolve the settings directory (~/.roomcap/).
pub fn settings_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".roomcap")
}

pub fn settings_path() -> PathBuf {
    settings_dir().join("settings.json")
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn read_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    /// Settings file overlaid with process environment, read once at startup.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = Self::read_from(&settings_path())?;
        settings.apply_env(|var| std::env::var(var).ok())?;
        Ok(settings)
    }

    /// Overlay values from an environment lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REPLICATE_API_KEY") {
            self.caption.api_key = v;
        }
        if let Some(v) = get("AI21_API_KEY") {
            self.completion.api_key = v;
        }
        if let Some(v) = get("ROOMCAP_COMPLETION_PROVIDER") {
            self.completion.provider = v;
        }
        if let Some(v) = get("ROOMCAP_COMPLETION_MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = get("ROOMCAP_BIND") {
            self.bind = v;
        }
        if let Some(v) = get("ROOMCAP_POLL_INTERVAL_MS") {
            self.caption.poll_interval_ms = match parse_env("ROOMCAP_POLL_INTERVAL_MS", v)? {
                0 => {
                    return Err(SettingsError::InvalidEnv {
                        var: "ROOMCAP_POLL_INTERVAL_MS",
                        value: "0".to_string(),
                    })
                }
                ms => ms,
            };
        }
        if let Some(v) = get("ROOMCAP_POLL_TIMEOUT_SECS") {
            self.caption.poll_timeout_secs = parse_env("ROOMCAP_POLL_TIMEOUT_SECS", v)?;
        }
        Ok(())
    }

    /// Names of the credentials that are not set.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.caption.api_key.is_empty() {
            missing.push("REPLICATE_API_KEY");
        }
        // Local chat backends run without a key.
        if self.completion.api_key.is_empty() && self.completion.provider != "ollama" {
            missing.push("AI21_API_KEY");
        }
        missing
    }
}

fn parse_env(var: &'static str, value: String) -> Result<u64, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidEnv { var, value })
}
