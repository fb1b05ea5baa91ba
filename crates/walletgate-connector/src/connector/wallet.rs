/*
[INPUT]:  ProviderSource, shared Authenticator, initial chain config
[OUTPUT]: Connector implementation driving the lifecycle state machine
[POS]:    Connector layer - the concrete connector used for every wallet
[UPDATE]: When lifecycle semantics or provider event handling change
*/

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::error::{ConnectError, Result};
use crate::provider::{self, Provider, ProviderEvent, RequestArguments};
use crate::types::{
    ChainConfig, ChainNamespace, ConnectorCategory, ConnectorEvent, ConnectorStatus, LoginParams,
    UserInfo,
};

use super::{Connector, ConnectorState, DisconnectOptions, InitOptions, ProviderSource};

/// Connector composed of the shared state machine, a wallet source, and
/// the shared authenticator.
#[derive(Clone)]
pub struct WalletConnector {
    shared: Arc<Shared>,
}

struct Shared {
    state: ConnectorState,
    namespace: ChainNamespace,
    category: ConnectorCategory,
    source: Arc<dyn ProviderSource>,
    authenticator: Arc<Authenticator>,
}

impl std::fmt::Debug for WalletConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnector")
            .field("name", &self.shared.state.name())
            .field("namespace", &self.shared.namespace)
            .field("status", &self.shared.state.status())
            .finish()
    }
}

impl WalletConnector {
    /// Connector for an external wallet (injected, WalletConnect, hardware)
    pub fn external(
        name: impl Into<String>,
        chain_config: ChainConfig,
        source: Arc<dyn ProviderSource>,
        authenticator: Arc<Authenticator>,
    ) -> Self {
        Self::build(name, ConnectorCategory::External, chain_config, source, authenticator)
    }

    /// Connector for an embedded login (social login, passkeys)
    pub fn in_app(
        name: impl Into<String>,
        chain_config: ChainConfig,
        source: Arc<dyn ProviderSource>,
        authenticator: Arc<Authenticator>,
    ) -> Self {
        Self::build(name, ConnectorCategory::InApp, chain_config, source, authenticator)
    }

    fn build(
        name: impl Into<String>,
        category: ConnectorCategory,
        chain_config: ChainConfig,
        source: Arc<dyn ProviderSource>,
        authenticator: Arc<Authenticator>,
    ) -> Self {
        let namespace = chain_config.chain_namespace;
        Self {
            shared: Arc::new(Shared {
                state: ConnectorState::new(name, chain_config),
                namespace,
                category,
                source,
                authenticator,
            }),
        }
    }

    /// Account the current session was opened with
    pub fn account(&self) -> Option<String> {
        self.shared.state.account()
    }
}

impl Shared {
    fn name(&self) -> &str {
        self.state.name()
    }

    async fn init(self: &Arc<Self>, options: InitOptions) -> Result<()> {
        match self.state.status() {
            ConnectorStatus::NotReady | ConnectorStatus::Errored | ConnectorStatus::Disconnected => {}
            status => {
                debug!(connector = %self.name(), ?status, "init skipped; already initialized");
                return Ok(());
            }
        }

        let chain = self.state.chain_config();
        chain.validate()?;
        if chain.chain_namespace != self.namespace {
            return Err(ConnectError::InvalidNamespace(chain.chain_namespace));
        }
        self.source.init(&chain).await?;
        self.state.add_known_chain(chain.clone());

        if !self.state.mark_ready() {
            return Ok(());
        }

        if options.auto_connect && self.has_prior_session(&chain).await {
            info!(connector = %self.name(), "prior session found; auto-connecting");
            if let Err(err) = self.connect_with(LoginParams::default(), true).await {
                warn!(connector = %self.name(), error = %err, "auto-connect failed");
            }
        }
        Ok(())
    }

    async fn has_prior_session(&self, chain: &ChainConfig) -> bool {
        self.source.has_session(chain).await
            || self.authenticator.tokens().has_valid_for_issuer(self.name())
    }

    async fn connect_with(
        self: &Arc<Self>,
        params: LoginParams,
        rehydrated: bool,
    ) -> Result<Arc<dyn Provider>> {
        let guard = self.state.begin_connect()?;
        let chain = self.state.chain_config();

        let outcome = async {
            let provider = self.source.connect(&chain, &params).await?;
            let account = self
                .authenticator
                .primary_account(provider.as_ref(), self.namespace)
                .await?;
            Ok::<_, ConnectError>((provider, account))
        }
        .await;

        let (provider, account) = match outcome {
            Ok(connected) => connected,
            Err(err) => {
                let err = err.into_connect_error();
                warn!(connector = %self.name(), error = %err, "connect failed");
                self.state.fail_connect(guard, &err);
                return Err(err);
            }
        };

        let provider_events = provider.subscribe();
        let listener = CancellationToken::new();
        self.state
            .finish_connect(guard, provider.clone(), account, rehydrated, listener.clone())?;
        spawn_provider_listener(self.clone(), provider_events, listener);
        info!(connector = %self.name(), rehydrated, "connected");

        if let Some(chain_id) = params.chain_id.as_deref()
            && !chain.same_chain(chain_id)
            && let Err(err) = self.switch_chain(chain_id, false).await
        {
            warn!(connector = %self.name(), chain_id, error = %err, "requested chain not selected");
        }

        Ok(provider)
    }

    async fn close_session(&self, cleanup: bool, revoke: bool) -> Result<()> {
        let session = self.state.session()?;
        self.state.cancel_listener();

        if let Some(account) = session.account.as_deref() {
            self.authenticator.clear_token(account, self.name());
        }
        if revoke && let Err(err) = self.source.disconnect(session.provider.as_ref()).await {
            warn!(connector = %self.name(), error = %err, "wallet permission revoke failed");
        }
        if cleanup {
            self.source.teardown().await;
        }

        self.state.end_session(cleanup);
        info!(connector = %self.name(), cleanup, "disconnected");
        Ok(())
    }

    /// Returns true once the session has ended
    async fn handle_provider_event(&self, event: ProviderEvent) -> bool {
        match event {
            ProviderEvent::Disconnect => {
                info!(connector = %self.name(), "provider disconnected");
                self.end_from_provider().await
            }
            ProviderEvent::AccountsChanged(accounts) => match accounts.into_iter().next() {
                None => {
                    info!(connector = %self.name(), "wallet revoked all accounts");
                    self.end_from_provider().await
                }
                Some(account) => {
                    if let Some(previous) = self.state.account()
                        && !provider::same_address(self.namespace, &previous, &account)
                    {
                        self.authenticator.clear_token(&previous, self.name());
                        info!(connector = %self.name(), "active account changed");
                    }
                    self.state.set_account(Some(account));
                    false
                }
            },
            ProviderEvent::ChainChanged(chain_id) => {
                match self.state.known_chain(&chain_id) {
                    Some(config) => self.state.set_chain_config(config),
                    None => warn!(connector = %self.name(), chain_id, "wallet switched to an unknown chain"),
                }
                false
            }
            ProviderEvent::Connect { chain_id } => {
                debug!(connector = %self.name(), chain_id, "provider connect event");
                false
            }
        }
    }

    async fn end_from_provider(&self) -> bool {
        if let Err(err) = self.close_session(false, false).await {
            debug!(connector = %self.name(), error = %err, "session already closed");
        }
        true
    }

    async fn authenticate(&self) -> Result<String> {
        let (guard, session) = self.state.begin_authorizing()?;
        match self
            .authenticator
            .authenticate_account(session.provider.as_ref(), &session.chain_config, self.name())
            .await
        {
            Ok(issued) => {
                if self.state.finish_authorizing(guard, &issued.token) {
                    return Ok(issued.token);
                }
                // Disconnected mid-flow; the token must not outlive the session
                self.authenticator.clear_token(&issued.address, self.name());
                warn!(connector = %self.name(), "session closed during authentication; token discarded");
                Err(ConnectError::NotConnected)
            }
            Err(err) => {
                drop(guard);
                warn!(connector = %self.name(), error = %err, "authentication failed");
                Err(err)
            }
        }
    }

    async fn add_chain(&self, config: ChainConfig, is_initial_call: bool) -> Result<()> {
        config.validate()?;
        if config.chain_namespace != self.namespace {
            return Err(ConnectError::InvalidNamespace(config.chain_namespace));
        }

        match self.state.session() {
            Ok(session) => {
                if self.namespace == ChainNamespace::Eip155 {
                    session
                        .provider
                        .request(RequestArguments::new(
                            "wallet_addEthereumChain",
                            add_chain_params(&config),
                        ))
                        .await?;
                }
            }
            Err(err) if !is_initial_call => return Err(err),
            Err(_) => {}
        }

        self.state.add_known_chain(config.clone());
        if is_initial_call {
            self.state.set_chain_config(config);
        }
        Ok(())
    }

    async fn switch_chain(&self, chain_id: &str, is_initial_call: bool) -> Result<()> {
        let config = self.state.known_chain(chain_id).ok_or_else(|| {
            ConnectError::InvalidParams(format!("chain {chain_id} has not been added"))
        })?;

        match self.state.session() {
            Ok(session) => {
                if self.namespace == ChainNamespace::Eip155 && !session.chain_config.same_chain(chain_id)
                {
                    session
                        .provider
                        .request(RequestArguments::new(
                            "wallet_switchEthereumChain",
                            json!([{ "chainId": config.chain_id }]),
                        ))
                        .await?;
                }
            }
            Err(err) if !is_initial_call => return Err(err),
            Err(_) => {}
        }

        self.state.set_chain_config(config);
        Ok(())
    }

    async fn enable_mfa(&self, params: Option<Value>) -> Result<()> {
        let session = self.state.session()?;
        self.source
            .enable_mfa(session.provider.as_ref(), params)
            .await?;
        self.state.emit(ConnectorEvent::MfaEnabled(true));
        Ok(())
    }
}

fn add_chain_params(config: &ChainConfig) -> Value {
    let mut params = json!({
        "chainId": config.chain_id,
        "chainName": config.display_name,
        "rpcUrls": [config.rpc_target],
        "nativeCurrency": {
            "name": config.ticker_name,
            "symbol": config.ticker,
            "decimals": config.decimals,
        },
    });
    if let Some(explorer) = &config.block_explorer_url {
        params["blockExplorerUrls"] = json!([explorer]);
    }
    if let Some(logo) = &config.logo {
        params["iconUrls"] = json!([logo]);
    }
    json!([params])
}

fn spawn_provider_listener(
    shared: Arc<Shared>,
    mut events: broadcast::Receiver<ProviderEvent>,
    listener: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = listener.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        if shared.handle_provider_event(event).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connector = %shared.name(), skipped, "provider events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        debug!(connector = %shared.name(), "provider listener stopped");
    });
}

#[async_trait]
impl Connector for WalletConnector {
    fn name(&self) -> &str {
        self.shared.name()
    }

    fn namespace(&self) -> ChainNamespace {
        self.shared.namespace
    }

    fn category(&self) -> ConnectorCategory {
        self.shared.category
    }

    fn status(&self) -> ConnectorStatus {
        self.shared.state.status()
    }

    fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.shared.state.provider()
    }

    fn chain_config(&self) -> ChainConfig {
        self.shared.state.chain_config()
    }

    fn rehydrated(&self) -> bool {
        self.shared.state.rehydrated()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.shared.state.subscribe()
    }

    async fn init(&self, options: InitOptions) -> Result<()> {
        self.shared.init(options).await
    }

    async fn connect(&self, params: LoginParams) -> Result<Arc<dyn Provider>> {
        self.shared.connect_with(params, false).await
    }

    async fn disconnect(&self, options: DisconnectOptions) -> Result<()> {
        self.shared.close_session(options.cleanup, true).await
    }

    async fn get_user_info(&self) -> Result<UserInfo> {
        let session = self.shared.state.session()?;
        self.shared.source.user_info(session.provider.as_ref()).await
    }

    async fn authenticate_user(&self) -> Result<String> {
        self.shared.authenticate().await
    }

    async fn add_chain(&self, config: ChainConfig, is_initial_call: bool) -> Result<()> {
        self.shared.add_chain(config, is_initial_call).await
    }

    async fn switch_chain(&self, chain_id: &str, is_initial_call: bool) -> Result<()> {
        self.shared.switch_chain(chain_id, is_initial_call).await
    }

    async fn enable_mfa(&self, params: Option<Value>) -> Result<()> {
        self.shared.enable_mfa(params).await
    }
}
