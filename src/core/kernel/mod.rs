/// Quantlink Kernel - transport layer shared by every exchange
///
/// The kernel holds only transport logic and generic interfaces; everything
/// exchange-specific lives under `exchanges::*` and plugs in through traits.
///
/// # Architecture
///
/// ## Transport Layer
/// - `RestClient`: HTTP interface with signed/public host routing
/// - `WsSession`: one WebSocket connection with heartbeat and reconnect
///
/// ## Authentication
/// - `Signer`: pluggable request/message signing
/// - `HmacSha256Signer`: hex HMAC-SHA256 over the sorted query
///
/// ## Message Handling
/// - `WsCodec`: exchange-specific frame decoding and lane naming
/// - `FrameHandler`: per-session protocol logic driven by the session task
///
/// # Usage
///
/// ## REST client with a signer
/// ```rust,no_run
/// use quantlink::core::kernel::*;
/// use quantlink::exchanges::zb::ZbSigner;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RestClientConfig::new("https://api.zb.today".to_string(), "zb".to_string())
///     .with_auth_base_url("https://trade.zb.today".to_string());
/// let rest = RestClientBuilder::new(config)
///     .with_signer(Arc::new(ZbSigner::new("access".to_string(), "secret")))
///     .build()?;
///
/// let account = rest
///     .get("/api/getAccountInfo", &[("method", "getAccountInfo")], true)
///     .await?;
/// println!("{}", account);
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use codec::WsCodec;
pub use rest::{BusinessCheck, ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use signer::{HmacSha256Signer, SignatureResult, Signer};
pub use ws::{FrameHandler, SessionHandle, SessionState, WsConfig, WsSender, WsSession};
