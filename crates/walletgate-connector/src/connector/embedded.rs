/*
[INPUT]:  Social-login params and a provider factory for the embedded wallet
[OUTPUT]: In-app ProviderSource with a login profile and MFA state
[POS]:    Connector layer - source behind in-app (embedded login) connectors
[UPDATE]: When the embedded login profile or MFA handling changes
*/

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ConnectError, Result};
use crate::provider::{self, Provider};
use crate::types::{ChainConfig, ChainNamespace, LoginParams, UserInfo};

use super::ProviderSource;

type EmbeddedFactory = dyn Fn(&ChainConfig, &LoginParams) -> Result<Arc<dyn Provider>> + Send + Sync;

#[derive(Default)]
struct EmbeddedSession {
    provider: Option<Arc<dyn Provider>>,
    profile: Option<UserInfo>,
}

/// Source for embedded logins: the wallet is created for the user after
/// they sign in with a social provider.
pub struct EmbeddedSource {
    namespace: ChainNamespace,
    factory: Box<EmbeddedFactory>,
    session: Mutex<EmbeddedSession>,
}

impl fmt::Debug for EmbeddedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.lock();
        f.debug_struct("EmbeddedSource")
            .field("namespace", &self.namespace)
            .field("logged_in", &session.profile.is_some())
            .finish()
    }
}

impl EmbeddedSource {
    pub fn new<F>(namespace: ChainNamespace, factory: F) -> Self
    where
        F: Fn(&ChainConfig, &LoginParams) -> Result<Arc<dyn Provider>> + Send + Sync + 'static,
    {
        Self {
            namespace,
            factory: Box::new(factory),
            session: Mutex::new(EmbeddedSession::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EmbeddedSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn profile_from(params: &LoginParams, login_provider: &str) -> UserInfo {
    let hint = params.login_hint.clone();
    UserInfo {
        email: hint.clone().filter(|hint| hint.contains('@')),
        verifier: Some(login_provider.to_string()),
        verifier_id: hint,
        login_type: Some(login_provider.to_string()),
        is_mfa_enabled: Some(false),
        ..UserInfo::default()
    }
}

#[async_trait]
impl ProviderSource for EmbeddedSource {
    async fn init(&self, chain: &ChainConfig) -> Result<()> {
        if chain.chain_namespace != self.namespace {
            return Err(ConnectError::InvalidNamespace(chain.chain_namespace));
        }
        Ok(())
    }

    async fn has_session(&self, _chain: &ChainConfig) -> bool {
        let session = self.lock();
        session.provider.is_some() && session.profile.is_some()
    }

    async fn connect(&self, chain: &ChainConfig, params: &LoginParams) -> Result<Arc<dyn Provider>> {
        let existing = {
            let session = self.lock();
            session.provider.clone().filter(|_| session.profile.is_some())
        };
        if let Some(provider) = existing {
            debug!(namespace = %self.namespace, "resuming embedded session");
            return Ok(provider);
        }

        let login_provider = params.login_provider.as_deref().ok_or_else(|| {
            ConnectError::InvalidParams("loginProvider is required for in-app login".to_string())
        })?;
        let provider = (self.factory)(chain, params)?;
        let accounts: Vec<String> = provider::request_as(
            provider.as_ref(),
            self.namespace.request_accounts_method(),
            Value::Null,
        )
        .await?;
        if accounts.is_empty() {
            return Err(ConnectError::ConnectionRejected(
                "embedded wallet returned no accounts".to_string(),
            ));
        }

        let mut session = self.lock();
        session.provider = Some(provider.clone());
        session.profile = Some(profile_from(params, login_provider));
        info!(namespace = %self.namespace, login_provider, "embedded login completed");
        Ok(provider)
    }

    async fn disconnect(&self, _provider: &dyn Provider) -> Result<()> {
        self.lock().profile = None;
        Ok(())
    }

    async fn teardown(&self) {
        *self.lock() = EmbeddedSession::default();
    }

    async fn user_info(&self, _provider: &dyn Provider) -> Result<UserInfo> {
        self.lock().profile.clone().ok_or(ConnectError::NotConnected)
    }

    async fn enable_mfa(&self, _provider: &dyn Provider, _params: Option<Value>) -> Result<()> {
        let mut session = self.lock();
        let profile = session.profile.as_mut().ok_or(ConnectError::NotConnected)?;
        profile.is_mfa_enabled = Some(true);
        Ok(())
    }
}
