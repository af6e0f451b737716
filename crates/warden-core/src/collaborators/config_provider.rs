//! The `ConfigProvider` trait: keyed configuration lookup (spec's
//! "out of scope: config loading as a product"). This core only ever
//! needs to read a handful of scalar knobs (default model, agent
//! descriptor search paths, notification targets); it never owns a
//! config file format.

use std::collections::HashMap;

use async_trait::async_trait;

#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
}

// Compile-time assertion: ConfigProvider must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ConfigProvider) {}
};

/// An in-memory config provider, useful for tests and for hosts that
/// have already resolved their configuration into a flat map.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    values: HashMap<String, String>,
}

impl StaticConfigProvider {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// A config provider backed by environment variables, each key prefixed
/// with `WARDEN_` and upper-cased (e.g. `default_model` ->
/// `WARDEN_DEFAULT_MODEL`), following the XDG-first resolution idiom the
/// rest of this workspace uses for host configuration.
pub struct EnvConfigProvider;

#[async_trait]
impl ConfigProvider for EnvConfigProvider {
    async fn get(&self, key: &str) -> Option<String> {
        let env_key = format!("WARDEN_{}", key.to_uppercase());
        std::env::var(env_key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_looks_up_known_key() {
        let mut values = HashMap::new();
        values.insert("default_model".to_string(), "sonnet".to_string());
        let provider = StaticConfigProvider::new(values);
        assert_eq!(provider.get("default_model").await, Some("sonnet".to_string()));
        assert_eq!(provider.get("missing").await, None);
    }
}
