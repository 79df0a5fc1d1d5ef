pub mod builder;
pub mod codec;
pub mod connector;
pub mod conversions;
pub mod rest;
pub mod signer;
pub mod types;

// Re-export main types for easier importing
pub use builder::{build_rest, trading_host, DEFAULT_HOST, DEFAULT_WSS};
pub use codec::{ZbCodec, ZbMessage};
pub use connector::{ZbConnector, ZbMarketFeed, ZbTrading, PLATFORM};
pub use rest::ZbRestClient;
pub use signer::ZbSigner;
