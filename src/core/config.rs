use crate::core::types::MarketType;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub base_url: Option<String>,
    pub ws_url: Option<String>,
}

// Never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 4)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("base_url", &self.base_url)?;
        state.serialize_field("ws_url", &self.ws_url)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            api_key: String,
            secret_key: String,
            base_url: Option<String>,
            ws_url: Option<String>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            api_key: Secret::new(helper.api_key),
            secret_key: Secret::new(helper.secret_key),
            base_url: helper.base_url,
            ws_url: helper.ws_url,
        })
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            base_url: None,
            ws_url: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{EXCHANGE}_API_KEY` (e.g., `ZB_API_KEY`)
    /// - `{EXCHANGE}_SECRET_KEY` (e.g., `ZB_SECRET_KEY`)
    /// - `{EXCHANGE}_BASE_URL` (optional)
    /// - `{EXCHANGE}_WS_URL` (optional)
    pub fn from_env(exchange_prefix: &str) -> Result<Self, ConfigError> {
        let prefix = exchange_prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;

        let secret_key = env::var(&secret_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?;

        Ok(Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            base_url: env::var(format!("{}_BASE_URL", prefix)).ok(),
            ws_url: env::var(format!("{}_WS_URL", prefix)).ok(),
        })
    }

    /// Load a .env file (if present) and then read the standard variables.
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(exchange_prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(exchange_prefix, ".env")
    }

    /// Same as [`from_env_file`](Self::from_env_file) with a custom path,
    /// e.g. `.env.production`.
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(
        exchange_prefix: &str,
        env_file_path: &str,
    ) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // fall through to plain environment variables
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(exchange_prefix)
    }

    /// Configuration for public market data only
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn ws_url(mut self, ws_url: String) -> Self {
        self.ws_url = Some(ws_url);
        self
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

/// Everything a trading connection needs to come up.
#[derive(Debug, Clone)]
pub struct TradeParams {
    pub platform: String,
    pub account: String,
    pub strategy: String,
    pub symbol: String,
    pub config: ExchangeConfig,
}

impl TradeParams {
    pub fn new(
        platform: impl Into<String>,
        account: impl Into<String>,
        strategy: impl Into<String>,
        symbol: impl Into<String>,
        config: ExchangeConfig,
    ) -> Self {
        Self {
            platform: platform.into(),
            account: account.into(),
            strategy: strategy.into(),
            symbol: symbol.into(),
            config,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require("platform", &self.platform)?;
        require("account", &self.account)?;
        require("strategy", &self.strategy)?;
        require("symbol", &self.symbol)?;
        require("access_key", self.config.api_key())?;
        require("secret_key", self.config.secret_key())
    }
}

#[derive(Debug, Clone)]
pub struct MarketParams {
    pub platform: String,
    pub symbol: String,
    pub market_type: MarketType,
    pub ws_url: Option<String>,
}

impl MarketParams {
    pub fn new(platform: impl Into<String>, symbol: impl Into<String>, market_type: MarketType) -> Self {
        Self {
            platform: platform.into(),
            symbol: symbol.into(),
            market_type,
            ws_url: None,
        }
    }

    #[must_use]
    pub fn ws_url(mut self, ws_url: String) -> Self {
        self.ws_url = Some(ws_url);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require("platform", &self.platform)?;
        require("symbol", &self.symbol)
    }
}

fn require(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingParameter(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("param {0} miss")]
    MissingParameter(String),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
