use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::Signer;
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{instrument, trace, warn};

/// Inspects a successfully parsed body and reports an embedded business
/// rejection as `(code, message)`.
pub type BusinessCheck = fn(&Value) -> Option<(i64, String)>;

/// REST client trait for making HTTP requests
///
/// Every call yields either the parsed body or an error; expected failures
/// never panic. A rejection the exchange reports inside a valid JSON body comes
/// back as [`ExchangeError::BusinessError`] with the body attached.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Generic entry point every endpoint delegates to
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `endpoint` - The API endpoint path
    /// * `params` - Query parameters as key-value pairs
    /// * `authenticated` - Whether to sign the request and route it to the trading host
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError>;

    async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::GET, endpoint, params, authenticated)
            .await
    }

    async fn post(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::POST, endpoint, params, authenticated)
            .await
    }

    /// GET with the body deserialized to `T`
    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let value = self.get(endpoint, params, authenticated).await?;
        serde_json::from_value(value).map_err(ExchangeError::from)
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for public endpoints
    pub base_url: String,
    /// Base URL for signed endpoints; falls back to `base_url`
    pub auth_base_url: Option<String>,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Whole-request timeout
    pub timeout: Duration,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    /// Create a new configuration
    ///
    /// # Arguments
    /// * `base_url` - Base URL for the API
    /// * `exchange_name` - Name of the exchange
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            auth_base_url: None,
            exchange_name,
            timeout: Duration::from_secs(10),
            user_agent: "quantlink/0.1".to_string(),
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Route signed requests to a different host
    pub fn with_auth_base_url(mut self, auth_base_url: String) -> Self {
        self.auth_base_url = Some(auth_base_url);
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
    business_check: Option<BusinessCheck>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
            business_check: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Set how embedded exchange status codes are interpreted
    pub fn with_business_check(mut self, check: BusinessCheck) -> Self {
        self.business_check = Some(check);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| ExchangeError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
            business_check: self.business_check,
        })
    }
}

/// Implementation of `RestClient` using reqwest
///
/// Never retries on its own; a timed-out call surfaces as
/// [`ExchangeError::ConnectionTimeout`] and the caller decides what to do.
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
    business_check: Option<BusinessCheck>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    /// Get the current timestamp in milliseconds
    fn get_timestamp() -> Result<u64, ExchangeError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .map_err(|e| ExchangeError::Other(format!("Failed to get timestamp: {}", e)))
    }

    fn build_url(&self, endpoint: &str, authenticated: bool) -> String {
        let base = if authenticated {
            self.config
                .auth_base_url
                .as_deref()
                .unwrap_or(&self.config.base_url)
        } else {
            &self.config.base_url
        };
        format!("{}{}", base.trim_end_matches('/'), endpoint)
    }

    /// Handle the response and extract JSON
    #[instrument(skip(self, response), fields(exchange = %self.config.exchange_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<Value, ExchangeError> {
        let status = response.status();
        let response_text = response.text().await?;

        trace!("Response body: {}", response_text);

        if !status.is_success() {
            return Err(ExchangeError::ApiError {
                code: i32::from(status.as_u16()),
                message: response_text,
            });
        }

        let body: Value = serde_json::from_str(&response_text)?;

        if let Some((code, message)) = self.business_check.and_then(|check| check(&body)) {
            warn!(code, %message, "exchange rejected request");
            return Err(ExchangeError::BusinessError {
                code,
                message,
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, params), fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint, param_count = params.len()))]
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        let url = self.build_url(endpoint, authenticated);
        let mut request = self.client.request(method.clone(), &url);

        if authenticated {
            let signer = self.signer.as_ref().ok_or_else(|| {
                ExchangeError::AuthError(
                    "Authentication required but no signer provided".to_string(),
                )
            })?;

            let owned: Vec<(String, String)> = params
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
            let timestamp = Self::get_timestamp()?;
            let (headers, signed_params) =
                signer.sign_request(method.as_str(), endpoint, &owned, timestamp)?;

            for (key, value) in headers {
                request = request.header(&key, &value);
            }
            request = request.query(&signed_params);
        } else if !params.is_empty() {
            request = request.query(params);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_requests_use_trading_host() {
        let config = RestClientConfig::new("https://api.zb.today".to_string(), "zb".to_string())
            .with_auth_base_url("https://trade.zb.today/".to_string());
        let rest = RestClientBuilder::new(config).build().unwrap();

        assert_eq!(
            rest.build_url("/data/v1/depth", false),
            "https://api.zb.today/data/v1/depth"
        );
        assert_eq!(
            rest.build_url("/api/order", true),
            "https://trade.zb.today/api/order"
        );
    }

    #[test]
    fn test_default_timeout_is_ten_seconds() {
        let config = RestClientConfig::new("http://localhost".to_string(), "test".to_string());
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_signed_request_without_signer_is_auth_error() {
        let config = RestClientConfig::new("http://127.0.0.1:9".to_string(), "test".to_string());
        let rest = RestClientBuilder::new(config).build().unwrap();
        let err = rest.get("/api/getAccountInfo", &[], true).await.unwrap_err();
        assert!(matches!(err, ExchangeError::AuthError(_)));
    }
}
