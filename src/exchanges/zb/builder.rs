use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ReqwestRest, RestClientBuilder, RestClientConfig};
use crate::exchanges::zb::conversions::zb_business_check;
use crate::exchanges::zb::signer::ZbSigner;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "https://api.zb.today";
pub const DEFAULT_WSS: &str = "wss://api.zb.today/websocket";

/// Signed calls go to the trading host: the first `api` in the host becomes `trade`.
pub fn trading_host(host: &str) -> String {
    host.replacen("api", "trade", 1)
}

/// REST client for ZB. A signer is attached only when credentials are present.
pub fn build_rest(config: &ExchangeConfig, timeout: Duration) -> Result<ReqwestRest, ExchangeError> {
    let host = config
        .base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let rest_config = RestClientConfig::new(host.clone(), "zb".to_string())
        .with_auth_base_url(trading_host(&host))
        .with_timeout(timeout);

    let mut builder = RestClientBuilder::new(rest_config).with_business_check(zb_business_check);

    if config.has_credentials() {
        let signer = Arc::new(ZbSigner::new(
            config.api_key().to_string(),
            config.secret_key(),
        ));
        builder = builder.with_signer(signer);
    }

    builder.build()
}
