/*
[INPUT]:  Chain config, login params, and a live provider
[OUTPUT]: Handshaken providers, session probes, revocation, profile data
[POS]:    Connector layer - per-wallet handshake seam behind WalletConnector
[UPDATE]: When a wallet family needs a different handshake or teardown
*/

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ConnectError, Result};
use crate::provider::{self, Provider, RequestArguments};
use crate::types::{ChainConfig, ChainNamespace, LoginParams, UserInfo};

/// Wallet-specific half of a connector.
///
/// The lifecycle state machine is shared; a source only knows how to
/// obtain, probe, and release its provider.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    /// Detect or construct the underlying wallet SDK. Must be idempotent.
    async fn init(&self, chain: &ChainConfig) -> Result<()>;

    /// Whether the wallet still holds a session from an earlier visit
    async fn has_session(&self, _chain: &ChainConfig) -> bool {
        false
    }

    /// Run the handshake and return a provider with account access granted
    async fn connect(
        &self,
        chain: &ChainConfig,
        params: &LoginParams,
    ) -> Result<Arc<dyn Provider>>;

    /// Ask the wallet to drop the site's permissions
    async fn disconnect(&self, provider: &dyn Provider) -> Result<()>;

    /// Discard the SDK instance entirely; `init` must run again afterwards
    async fn teardown(&self) {}

    async fn user_info(&self, _provider: &dyn Provider) -> Result<UserInfo> {
        Ok(UserInfo::default())
    }

    async fn enable_mfa(&self, _provider: &dyn Provider, _params: Option<Value>) -> Result<()> {
        Err(ConnectError::Unsupported(
            "MFA is only available for in-app connectors".to_string(),
        ))
    }
}

type ProviderFactory = dyn Fn(&ChainConfig) -> Result<Arc<dyn Provider>> + Send + Sync;

/// Source for injected and SDK-backed wallets.
///
/// The provider is either handed over up front (an injected wallet that is
/// already installed) or built lazily by a factory on `init`.
pub struct WalletSource {
    namespace: ChainNamespace,
    factory: Option<Box<ProviderFactory>>,
    provider: Mutex<Option<Arc<dyn Provider>>>,
}

impl fmt::Debug for WalletSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSource")
            .field("namespace", &self.namespace)
            .field("lazy", &self.factory.is_some())
            .field("loaded", &self.current().is_some())
            .finish()
    }
}

impl WalletSource {
    /// Wrap an already available provider
    pub fn injected(namespace: ChainNamespace, provider: Arc<dyn Provider>) -> Self {
        Self {
            namespace,
            factory: None,
            provider: Mutex::new(Some(provider)),
        }
    }

    /// Wallet that is not installed; `init` fails with ProviderNotFound
    pub fn missing(namespace: ChainNamespace) -> Self {
        Self {
            namespace,
            factory: None,
            provider: Mutex::new(None),
        }
    }

    /// Build the provider on first `init`, and again after a teardown
    pub fn lazy<F>(namespace: ChainNamespace, factory: F) -> Self
    where
        F: Fn(&ChainConfig) -> Result<Arc<dyn Provider>> + Send + Sync + 'static,
    {
        Self {
            namespace,
            factory: Some(Box::new(factory)),
            provider: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<Arc<dyn Provider>> {
        self.provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn loaded(&self) -> Result<Arc<dyn Provider>> {
        self.current().ok_or_else(|| {
            ConnectError::ProviderNotFound(format!("{} wallet is not available", self.namespace))
        })
    }
}

#[async_trait]
impl ProviderSource for WalletSource {
    async fn init(&self, chain: &ChainConfig) -> Result<()> {
        if chain.chain_namespace != self.namespace {
            return Err(ConnectError::InvalidNamespace(chain.chain_namespace));
        }
        if self.current().is_some() {
            return Ok(());
        }
        let Some(factory) = self.factory.as_ref() else {
            return Err(ConnectError::ProviderNotFound(format!(
                "{} wallet is not installed",
                self.namespace
            )));
        };
        let provider = factory(chain)?;
        *self.provider.lock().unwrap_or_else(PoisonError::into_inner) = Some(provider);
        debug!(namespace = %self.namespace, "wallet provider created");
        Ok(())
    }

    async fn has_session(&self, _chain: &ChainConfig) -> bool {
        let Some(provider) = self.current() else {
            return false;
        };
        match provider::accounts(provider.as_ref(), self.namespace).await {
            Ok(accounts) => !accounts.is_empty(),
            Err(err) => {
                debug!(error = %err, "session probe failed");
                false
            }
        }
    }

    async fn connect(
        &self,
        _chain: &ChainConfig,
        _params: &LoginParams,
    ) -> Result<Arc<dyn Provider>> {
        let provider = self.loaded()?;
        let accounts: Vec<String> = provider::request_as(
            provider.as_ref(),
            self.namespace.request_accounts_method(),
            Value::Null,
        )
        .await?;
        if accounts.is_empty() {
            return Err(ConnectError::ConnectionRejected(
                "wallet returned no accounts".to_string(),
            ));
        }
        Ok(provider)
    }

    async fn disconnect(&self, provider: &dyn Provider) -> Result<()> {
        let request = match self.namespace {
            ChainNamespace::Eip155 => RequestArguments::new(
                "wallet_revokePermissions",
                json!([{ "eth_accounts": {} }]),
            ),
            _ => RequestArguments::bare("disconnect"),
        };
        provider
            .request(request)
            .await
            .map(|_| ())
            .map_err(|e| ConnectError::DisconnectionFailed(e.to_string()))
    }

    async fn teardown(&self) {
        if self.factory.is_some() {
            *self.provider.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }
}
