/*
[INPUT]:  Configured connectors, plugins, persistent store
[OUTPUT]: Single-active-connector registry with one tagged event stream
[POS]:    Orchestration layer - public entry point used by host applications
[UPDATE]: When the active-slot policy, persistence, or public API changes
*/

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::config::SdkConfig;
use crate::connector::{Connector, DisconnectOptions, InitOptions};
use crate::error::{ConnectError, Result};
use crate::http::ChallengeVerifier;
use crate::plugin::{Plugin, PluginRegistry};
use crate::provider::Provider;
use crate::store::{GuardedStore, TokenStore};
use crate::types::{
    ChainConfig, ConnectorEvent, ConnectorStatus, LoginParams, RegistryEvent, UserInfo,
};

const REGISTRY_EVENT_CAPACITY: usize = 128;

/// Holder of the registry-wide active slot
#[derive(Debug, Default)]
struct ActiveSlot {
    name: Option<String>,
    connecting: bool,
    connected: bool,
}

struct Inner {
    config: SdkConfig,
    store: GuardedStore,
    tokens: TokenStore,
    last_connector_key: String,
    connectors: RwLock<Vec<Arc<dyn Connector>>>,
    active: Mutex<ActiveSlot>,
    events: broadcast::Sender<RegistryEvent>,
    plugins: PluginRegistry,
}

/// Connector registry.
///
/// `connect_to` rejects while another connector holds the active slot
/// (connecting or connected); callers must `logout` first.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("client_id", &self.inner.config.client_id)
            .field("connectors", &self.connector_names())
            .field("active", &*self.inner.slot())
            .finish()
    }
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, ActiveSlot> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connector(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|connector| connector.name() == name)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Connector>> {
        self.connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Claim the active slot for `name`, or explain who holds it
    fn reserve(&self, name: &str) -> Result<SlotReservation<'_>> {
        let mut slot = self.slot();
        if let Some(active) = slot.name.as_ref() {
            if slot.connecting {
                return Err(ConnectError::Busy {
                    connector: active.clone(),
                    status: ConnectorStatus::Connecting,
                });
            }
            return Err(ConnectError::AlreadyConnected {
                active: active.clone(),
            });
        }
        // Connectors driven directly (outside the registry) still count
        for connector in self.snapshot() {
            let status = connector.status();
            if status == ConnectorStatus::Connecting {
                return Err(ConnectError::Busy {
                    connector: connector.name().to_string(),
                    status,
                });
            }
            if status.has_session() {
                return Err(ConnectError::AlreadyConnected {
                    active: connector.name().to_string(),
                });
            }
        }
        slot.name = Some(name.to_string());
        slot.connecting = true;
        slot.connected = false;
        Ok(SlotReservation {
            inner: self,
            armed: true,
        })
    }

    fn clear_slot(&self) {
        *self.slot() = ActiveSlot::default();
    }

    fn active_connector(&self) -> Option<Arc<dyn Connector>> {
        let name = {
            let slot = self.slot();
            if !slot.connected {
                return None;
            }
            slot.name.clone()
        };
        name.and_then(|name| self.connector(&name))
    }

    /// Settle a slot whose owner lost its session before its forwarder ran
    async fn release_stale(&self) {
        if let Some(owner) = self.active_connector()
            && !owner.status().is_active()
        {
            self.on_disconnected(&owner).await;
        }
    }

    /// Bookkeeping once `connector` holds a live session
    async fn on_connected(&self, connector: &Arc<dyn Connector>, provider: Arc<dyn Provider>) {
        {
            let mut slot = self.slot();
            slot.name = Some(connector.name().to_string());
            slot.connecting = false;
            slot.connected = true;
        }
        if !self.store.set(&self.last_connector_key, connector.name()) {
            debug!(connector = %connector.name(), "last connector not persisted");
        }

        if self.plugins.is_empty() {
            return;
        }
        let user_info = match connector.get_user_info().await {
            Ok(user_info) => user_info,
            Err(err) => {
                warn!(connector = %connector.name(), error = %err, "user info unavailable for plugins");
                UserInfo::default()
            }
        };
        let attached = self
            .plugins
            .connect_all(connector.namespace(), provider, &user_info)
            .await;
        if !attached.is_empty() {
            info!(connector = %connector.name(), plugins = ?attached, "plugins connected");
        }
    }

    /// Forwarder reaction to a connector's DISCONNECTED event
    async fn on_disconnected(&self, connector: &Arc<dyn Connector>) {
        let cleared = {
            let mut slot = self.slot();
            let owns_slot = slot.name.as_deref() == Some(connector.name()) && slot.connected;
            if owns_slot && !connector.status().is_active() {
                *slot = ActiveSlot::default();
                true
            } else {
                false
            }
        };
        if cleared {
            self.store.remove(&self.last_connector_key);
            self.plugins.disconnect_all().await;
            info!(connector = %connector.name(), "active connector disconnected");
        }
    }
}

/// Releases a reserved active slot unless the connect completed
struct SlotReservation<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl SlotReservation<'_> {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut slot = self.inner.slot();
            if slot.connecting {
                *slot = ActiveSlot::default();
            }
        }
    }
}

impl Orchestrator {
    pub fn new(config: SdkConfig, store: GuardedStore) -> Result<Self> {
        config.validate()?;
        let prefix = config.storage_key_prefix.clone();
        let (events, _rx) = broadcast::channel(REGISTRY_EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                tokens: TokenStore::new(store.clone(), &prefix),
                last_connector_key: format!("{prefix}:connector"),
                config,
                store,
                connectors: RwLock::new(Vec::new()),
                active: Mutex::new(ActiveSlot::default()),
                events,
                plugins: PluginRegistry::new(),
            }),
        })
    }

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    /// Token cache sharing this registry's store and key prefix
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Authenticator to inject into connectors built for this registry
    pub fn authenticator(&self, verifier: Arc<dyn ChallengeVerifier>) -> Result<Arc<Authenticator>> {
        Ok(Arc::new(Authenticator::new(
            self.inner.config.clone(),
            verifier,
            self.inner.tokens.clone(),
        )?))
    }

    /// Register a connector and start forwarding its events.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_connector(&self, connector: Arc<dyn Connector>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ConnectError::InvalidParams("connectors must be added inside a Tokio runtime".to_string())
        })?;
        {
            let mut connectors = self
                .inner
                .connectors
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if connectors.iter().any(|existing| existing.name() == connector.name()) {
                return Err(ConnectError::DuplicateConnector(connector.name().to_string()));
            }
            connectors.push(connector.clone());
        }

        let receiver = connector.subscribe();
        let inner = Arc::downgrade(&self.inner);
        runtime.spawn(forward_events(inner, connector.name().to_string(), receiver));
        info!(connector = %connector.name(), namespace = %connector.namespace(), "connector registered");
        Ok(())
    }

    pub fn connector(&self, name: &str) -> Result<Arc<dyn Connector>> {
        self.inner
            .connector(name)
            .ok_or_else(|| ConnectError::UnknownConnector(name.to_string()))
    }

    pub fn connector_names(&self) -> Vec<String> {
        self.inner
            .snapshot()
            .iter()
            .map(|connector| connector.name().to_string())
            .collect()
    }

    /// Name persisted by the last successful connect
    pub fn last_connector(&self) -> Option<String> {
        self.inner.store.get(&self.inner.last_connector_key)
    }

    /// Initialize every connector concurrently.
    ///
    /// The connector persisted by the previous visit is initialized with
    /// auto-connect; its failures only surface as an ERRORED event.
    pub async fn init(&self) -> Result<()> {
        let connectors = self.inner.snapshot();
        if connectors.is_empty() {
            return Err(ConnectError::InvalidParams("no connectors configured".to_string()));
        }

        let last = self
            .last_connector()
            .filter(|name| connectors.iter().any(|connector| connector.name() == name));
        let reservation = match last.as_deref() {
            Some(name) => match self.inner.reserve(name) {
                Ok(reservation) => Some(reservation),
                Err(err) => {
                    debug!(connector = name, error = %err, "auto-connect skipped");
                    None
                }
            },
            None => None,
        };
        let auto_connect_target = reservation.as_ref().and(last.clone());

        let results = join_all(connectors.iter().map(|connector| {
            let options = InitOptions {
                auto_connect: auto_connect_target.as_deref() == Some(connector.name()),
            };
            async move { (connector, connector.init(options).await) }
        }))
        .await;

        for (connector, result) in results {
            if let Err(err) = result {
                warn!(connector = %connector.name(), error = %err, "connector init failed");
            }
        }

        if let (Some(reservation), Some(name)) = (reservation, auto_connect_target)
            && let Some(connector) = self.inner.connector(&name)
        {
            match connector.provider() {
                Some(provider) if connector.status().has_session() => {
                    reservation.commit();
                    self.inner.on_connected(&connector, provider).await;
                    info!(connector = %name, "session restored");
                }
                _ => {
                    drop(reservation);
                    self.inner.store.remove(&self.inner.last_connector_key);
                    info!(connector = %name, "no session to restore");
                }
            }
        }
        Ok(())
    }

    /// Connect the named connector; rejects while another one is active
    pub async fn connect_to(&self, name: &str, params: LoginParams) -> Result<Arc<dyn Provider>> {
        let connector = self.connector(name)?;
        self.inner.release_stale().await;
        let reservation = self.inner.reserve(name)?;
        let provider = connector.connect(params).await?;
        reservation.commit();
        self.inner.on_connected(&connector, provider.clone()).await;
        Ok(provider)
    }

    /// Disconnect the active connector and forget it
    pub async fn logout(&self, options: DisconnectOptions) -> Result<()> {
        let connector = self.inner.active_connector().ok_or(ConnectError::NotConnected)?;
        self.inner.plugins.disconnect_all().await;
        let result = connector.disconnect(options).await;
        self.inner.clear_slot();
        self.inner.store.remove(&self.inner.last_connector_key);
        info!(connector = %connector.name(), cleanup = options.cleanup, "logged out");
        result
    }

    fn require_active(&self) -> Result<Arc<dyn Connector>> {
        self.inner.active_connector().ok_or(ConnectError::NotConnected)
    }

    pub async fn authenticate_user(&self) -> Result<String> {
        self.require_active()?.authenticate_user().await
    }

    pub async fn get_user_info(&self) -> Result<UserInfo> {
        self.require_active()?.get_user_info().await
    }

    pub async fn add_chain(&self, config: ChainConfig) -> Result<()> {
        self.require_active()?.add_chain(config, false).await
    }

    pub async fn switch_chain(&self, chain_id: &str) -> Result<()> {
        self.require_active()?.switch_chain(chain_id, false).await
    }

    pub async fn enable_mfa(&self, params: Option<Value>) -> Result<()> {
        self.require_active()?.enable_mfa(params).await
    }

    pub fn add_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        self.inner.plugins.add(plugin)
    }

    pub fn get_plugin(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        self.inner.plugins.get(name)
    }

    /// Events of every connector, tagged with the connector name
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.events.subscribe()
    }

    pub fn connected_connector_name(&self) -> Option<String> {
        self.inner
            .active_connector()
            .filter(|connector| connector.status().is_active())
            .map(|connector| connector.name().to_string())
    }

    /// Status of the active connector, else READY once any connector is
    pub fn status(&self) -> ConnectorStatus {
        if let Some(connector) = self.inner.active_connector() {
            return connector.status();
        }
        let connectors = self.inner.snapshot();
        if let Some(busy) = connectors.iter().find(|c| c.status().is_active()) {
            return busy.status();
        }
        if connectors.iter().any(|c| c.status() == ConnectorStatus::Ready) {
            ConnectorStatus::Ready
        } else {
            ConnectorStatus::NotReady
        }
    }

    pub fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.inner.active_connector().and_then(|connector| connector.provider())
    }
}

async fn forward_events(
    inner: Weak<Inner>,
    name: String,
    mut receiver: broadcast::Receiver<ConnectorEvent>,
) {
    loop {
        let event = match receiver.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(connector = %name, skipped, "registry lagged behind connector events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if matches!(event, ConnectorEvent::Disconnected)
            && let Some(connector) = inner.connector(&name)
        {
            inner.on_disconnected(&connector).await;
        }
        let _ = inner.events.send(RegistryEvent {
            connector: name.clone(),
            event,
        });
    }
    debug!(connector = %name, "event forwarding stopped");
}
