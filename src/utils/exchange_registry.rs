use crate::core::config::ConfigError;
use crate::core::traits::ExchangeConnector;
use crate::exchanges::zb::ZbConnector;
use std::collections::HashMap;
use std::sync::Arc;

/// Platform name to connector lookup, filled at startup.
#[derive(Clone, Default)]
pub struct ExchangeRegistry {
    connectors: HashMap<String, Arc<dyn ExchangeConnector>>,
}

impl ExchangeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in exchange
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ZbConnector::new()));
        registry
    }

    /// Add `connector` under its platform name, replacing any earlier one.
    pub fn register(&mut self, connector: Arc<dyn ExchangeConnector>) {
        self.connectors
            .insert(connector.platform().to_string(), connector);
    }

    pub fn get(&self, platform: &str) -> Result<Arc<dyn ExchangeConnector>, ConfigError> {
        self.connectors
            .get(platform)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownPlatform(platform.to_string()))
    }

    pub fn platforms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ExchangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_include_zb() {
        let registry = ExchangeRegistry::with_defaults();
        assert_eq!(registry.platforms(), ["zb"]);
        assert_eq!(registry.get("zb").unwrap().platform(), "zb");
    }

    #[test]
    fn test_unknown_platform() {
        let registry = ExchangeRegistry::with_defaults();
        assert!(matches!(
            registry.get("huobi"),
            Err(ConfigError::UnknownPlatform(name)) if name == "huobi"
        ));
    }
}
