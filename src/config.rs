use dotenvy::dotenv;
use std::env;
use std::time::Duration;

pub const DEFAULT_DECISION_API_URL: &str = "https://decision.flagship.io";
pub const DEFAULT_EVENTS_URL: &str = "https://events.flagship.io";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TIMEOUT_MS: u64 = 2000;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// A required setting that was absent or empty when a request needed it.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{0} missing, it is required")]
pub struct MissingSetting(pub &'static str);

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub flagship: FlagshipSettings,
    /// Connection string of the edge config store, if one is attached.
    pub edge_config: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FlagshipSettings {
    pub env_id: Option<String>,
    pub api_key: Option<String>,
    pub decision_api_url: String,
    pub events_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub env_id: String,
    pub api_key: String,
}

impl FlagshipSettings {
    /// Both credentials are validated here, on every request, rather than at startup.
    pub fn credentials(&self) -> Result<Credentials, MissingSetting> {
        let env_id = self
            .env_id
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or(MissingSetting("FLAGSHIP_ENV_ID"))?;
        let api_key = self
            .api_key
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or(MissingSetting("FLAGSHIP_API_KEY"))?;

        Ok(Credentials { env_id, api_key })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv().is_ok();

        Self::from_vars(|name| env::var(name).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let port = match non_empty("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                expected: "u16 number",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let timeout_ms = match non_empty("FLAGSHIP_TIMEOUT_MS") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "FLAGSHIP_TIMEOUT_MS",
                expected: "number of milliseconds",
                value,
            })?,
            None => DEFAULT_TIMEOUT_MS,
        };

        Ok(Self {
            host: non_empty("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            flagship: FlagshipSettings {
                env_id: non_empty("FLAGSHIP_ENV_ID"),
                api_key: non_empty("FLAGSHIP_API_KEY"),
                decision_api_url: non_empty("FLAGSHIP_DECISION_API_URL")
                    .unwrap_or_else(|| DEFAULT_DECISION_API_URL.to_string()),
                events_url: non_empty("FLAGSHIP_EVENTS_URL")
                    .unwrap_or_else(|| DEFAULT_EVENTS_URL.to_string()),
                timeout: Duration::from_millis(timeout_ms),
            },
            edge_config: non_empty("EDGE_CONFIG"),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
