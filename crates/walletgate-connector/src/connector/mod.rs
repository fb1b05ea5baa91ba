/*
[INPUT]:  Host lifecycle calls (init, connect, disconnect, authenticate, chain changes)
[OUTPUT]: Connector trait, lifecycle options, and the wallet connector
[POS]:    Connector layer - per-wallet lifecycle controllers
[UPDATE]: When the connector contract changes
*/

pub mod embedded;
pub mod source;
pub mod state;
pub mod wallet;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::provider::Provider;
use crate::types::{
    ChainConfig, ChainNamespace, ConnectorCategory, ConnectorEvent, ConnectorStatus, LoginParams,
    UserInfo,
};

pub use embedded::EmbeddedSource;
pub use source::{ProviderSource, WalletSource};
pub use state::{ConnectorState, Session, TransitionGuard};
pub use wallet::WalletConnector;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOptions {
    /// Reconnect right away when a prior session exists
    #[serde(default)]
    pub auto_connect: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectOptions {
    /// Discard the provider and require a fresh `init`
    #[serde(default)]
    pub cleanup: bool,
}

/// One wallet or login method.
///
/// Lifecycle events are delivered on a broadcast channel; dropping the
/// receiver returned by [`Connector::subscribe`] unsubscribes.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    fn namespace(&self) -> ChainNamespace;

    fn category(&self) -> ConnectorCategory;

    fn status(&self) -> ConnectorStatus;

    /// Present only while CONNECTED, AUTHORIZING or AUTHORIZED
    fn provider(&self) -> Option<Arc<dyn Provider>>;

    fn chain_config(&self) -> ChainConfig;

    /// True when the current session came from auto-connect
    fn rehydrated(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent>;

    async fn init(&self, options: InitOptions) -> Result<()>;

    async fn connect(&self, params: LoginParams) -> Result<Arc<dyn Provider>>;

    async fn disconnect(&self, options: DisconnectOptions) -> Result<()>;

    async fn get_user_info(&self) -> Result<UserInfo>;

    async fn authenticate_user(&self) -> Result<String>;

    async fn add_chain(&self, config: ChainConfig, is_initial_call: bool) -> Result<()>;

    async fn switch_chain(&self, chain_id: &str, is_initial_call: bool) -> Result<()>;

    async fn enable_mfa(&self, params: Option<serde_json::Value>) -> Result<()>;
}
