pub mod exchange_registry;

pub use exchange_registry::ExchangeRegistry;
