/*
[INPUT]:  Plugins registered by the host, connected provider + profile
[OUTPUT]: Plugin contract and a registry that follows the active session
[POS]:    Plugin layer - add-ons attached to whichever connector is active
[UPDATE]: When the plugin contract or attach/detach rules change
*/

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{ConnectError, Result};
use crate::provider::Provider;
use crate::types::{ChainNamespace, UserInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Disconnected,
    Connected,
}

/// Add-on bound to one namespace (wallet services, checkout, passkeys).
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn namespace(&self) -> ChainNamespace;

    fn status(&self) -> PluginStatus;

    fn is_connected(&self) -> bool {
        self.status() == PluginStatus::Connected
    }

    async fn connect(&self, provider: Arc<dyn Provider>, user_info: &UserInfo) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Plugins by name, in registration order
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|plugin| plugin.name().to_string())
            .collect();
        f.debug_struct("PluginRegistry").field("plugins", &names).finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn add(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        if plugins.iter().any(|existing| existing.name() == plugin.name()) {
            return Err(ConnectError::InvalidParams(format!(
                "plugin {} is already registered",
                plugin.name()
            )));
        }
        info!(plugin = %plugin.name(), namespace = %plugin.namespace(), "plugin registered");
        plugins.push(plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        self.snapshot()
            .into_iter()
            .find(|plugin| plugin.name() == name)
            .ok_or_else(|| ConnectError::PluginNotFound(name.to_string()))
    }

    /// Like `get`, but only hands out plugins attached to a session
    pub fn get_connected(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        let plugin = self.get(name)?;
        if !plugin.is_connected() {
            return Err(ConnectError::PluginNotConnected(name.to_string()));
        }
        Ok(plugin)
    }

    pub fn len(&self) -> usize {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach every plugin of `namespace`; failures are logged and skipped.
    /// Returns the names of plugins that connected.
    pub async fn connect_all(
        &self,
        namespace: ChainNamespace,
        provider: Arc<dyn Provider>,
        user_info: &UserInfo,
    ) -> Vec<String> {
        let mut connected = Vec::new();
        for plugin in self.snapshot() {
            if plugin.namespace() != namespace || plugin.is_connected() {
                continue;
            }
            match plugin.connect(provider.clone(), user_info).await {
                Ok(()) => connected.push(plugin.name().to_string()),
                Err(err) => warn!(plugin = %plugin.name(), error = %err, "plugin connect failed"),
            }
        }
        connected
    }

    /// Detach every connected plugin; failures are logged and skipped
    pub async fn disconnect_all(&self) {
        for plugin in self.snapshot() {
            if !plugin.is_connected() {
                continue;
            }
            if let Err(err) = plugin.disconnect().await {
                warn!(plugin = %plugin.name(), error = %err, "plugin disconnect failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::provider::MockProvider;

    struct TestPlugin {
        name: &'static str,
        namespace: ChainNamespace,
        fail: bool,
        status: Mutex<PluginStatus>,
    }

    impl TestPlugin {
        fn new(name: &'static str, namespace: ChainNamespace) -> Arc<Self> {
            Arc::new(Self {
                name,
                namespace,
                fail: false,
                status: Mutex::new(PluginStatus::Disconnected),
            })
        }
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn namespace(&self) -> ChainNamespace {
            self.namespace
        }

        fn status(&self) -> PluginStatus {
            *self.status.lock().unwrap()
        }

        async fn connect(&self, _provider: Arc<dyn Provider>, _user_info: &UserInfo) -> Result<()> {
            if self.fail {
                return Err(ConnectError::PluginNotInitialized(self.name.to_string()));
            }
            *self.status.lock().unwrap() = PluginStatus::Connected;
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            *self.status.lock().unwrap() = PluginStatus::Disconnected;
            Ok(())
        }
    }

    #[test]
    fn test_get_unknown_plugin() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.get("wallet-services"),
            Err(ConnectError::PluginNotFound(name)) if name == "wallet-services"
        ));
    }

    #[test]
    fn test_duplicate_plugin_rejected() {
        let registry = PluginRegistry::new();
        registry.add(TestPlugin::new("checkout", ChainNamespace::Eip155)).unwrap();
        assert!(registry.add(TestPlugin::new("checkout", ChainNamespace::Solana)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_all_matches_namespace_and_skips_failures() {
        let registry = PluginRegistry::new();
        let evm = TestPlugin::new("wallet-services", ChainNamespace::Eip155);
        let sol = TestPlugin::new("solana-services", ChainNamespace::Solana);
        let broken = Arc::new(TestPlugin {
            name: "checkout",
            namespace: ChainNamespace::Eip155,
            fail: true,
            status: Mutex::new(PluginStatus::Disconnected),
        });
        registry.add(evm.clone()).unwrap();
        registry.add(sol.clone()).unwrap();
        registry.add(broken).unwrap();

        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new(ChainNamespace::Eip155, "0xabc"));
        let connected = registry
            .connect_all(ChainNamespace::Eip155, provider, &UserInfo::default())
            .await;

        assert_eq!(connected, vec!["wallet-services".to_string()]);
        assert!(evm.is_connected());
        assert!(!sol.is_connected());
        assert!(registry.get_connected("wallet-services").is_ok());
        assert!(matches!(
            registry.get_connected("checkout"),
            Err(ConnectError::PluginNotConnected(_))
        ));

        registry.disconnect_all().await;
        assert!(!evm.is_connected());
    }
}
