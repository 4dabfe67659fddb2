use dashmap::DashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid API key: {0}")]
    InvalidApiKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProvider {
    Anthropic,
    OpenRouter,
}

impl ModelProvider {
    pub fn api_key_var(self) -> &'static str {
        match self {
            ModelProvider::Anthropic => "ANTHROPIC_API_KEY",
            ModelProvider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    fn key_prefix(self) -> &'static str {
        match self {
            ModelProvider::Anthropic => "sk-ant-",
            ModelProvider::OpenRouter => "sk-or-",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            ModelProvider::Anthropic => "claude-3-7-sonnet-latest",
            ModelProvider::OpenRouter => "anthropic/claude-3.7-sonnet",
        }
    }
}

impl FromStr for ModelProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(ModelProvider::Anthropic),
            "openrouter" => Ok(ModelProvider::OpenRouter),
            _ => Err(ConfigError::InvalidValue {
                key: "MODEL_PROVIDER",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Model identifiers used for each kind of call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNames {
    pub report: String,
    pub vision: String,
    pub chat: String,
}

impl ModelNames {
    pub fn uniform(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            report: name.clone(),
            vision: name.clone(),
            chat: name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub provider: ModelProvider,
    pub names: ModelNames,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub log_format: LogFormat,
    pub default_api_key: Option<String>,
    pub model: ModelSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let provider = match get("MODEL_PROVIDER") {
            Some(value) => value.parse()?,
            None => ModelProvider::Anthropic,
        };

        let port = match get("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value,
            })?,
            None => 3000,
        };

        let timeout_secs: u64 = match get("HTTP_TIMEOUT_SECS") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "HTTP_TIMEOUT_SECS",
                value,
            })?,
            None => 300,
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        let default_model = provider.default_model();
        let names = ModelNames {
            report: get("REPORT_MODEL").unwrap_or_else(|| default_model.to_string()),
            vision: get("VISION_MODEL").unwrap_or_else(|| default_model.to_string()),
            chat: get("CHAT_MODEL").unwrap_or_else(|| default_model.to_string()),
        };

        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            log_format,
            default_api_key: get(provider.api_key_var()),
            model: ModelSettings {
                provider,
                names,
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

/// Chooses the API key for a model call.
///
/// Precedence: explicit per-call key, then the user's stored preference, then
/// the process default.
pub struct ApiKeyResolver {
    provider: ModelProvider,
    process_default: Option<String>,
    user_keys: DashMap<String, String>,
}

impl ApiKeyResolver {
    pub fn new(provider: ModelProvider, process_default: Option<String>) -> Self {
        Self {
            provider,
            process_default,
            user_keys: DashMap::new(),
        }
    }

    /// Stores a user's key preference. An empty key clears it.
    pub fn set_user_key(&self, user_id: &str, key: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        if key.is_empty() {
            self.user_keys.remove(user_id);
            return Ok(());
        }
        self.validate(key)?;
        self.user_keys.insert(user_id.to_string(), key.to_string());
        Ok(())
    }

    pub fn has_user_key(&self, user_id: &str) -> bool {
        self.user_keys.contains_key(user_id)
    }

    pub fn resolve(&self, per_call: Option<&str>, user_id: Option<&str>) -> Option<String> {
        if let Some(key) = per_call.map(str::trim).filter(|key| !key.is_empty()) {
            return Some(key.to_string());
        }
        if let Some(key) = user_id.and_then(|user| self.user_keys.get(user)) {
            return Some(key.value().clone());
        }
        self.process_default.clone()
    }

    fn validate(&self, key: &str) -> Result<(), ConfigError> {
        let prefix = self.provider.key_prefix();
        if !key.starts_with(prefix) {
            return Err(ConfigError::InvalidApiKey(format!(
                "keys for this provider should start with '{prefix}'"
            )));
        }
        Ok(())
    }
}
