/*
[INPUT]:  Parsed runner configuration and subcommand arguments
[OUTPUT]: Orchestrator wired to key-backed wallets; login/status/logout flows
[POS]:    Application layer - glue between the CLI and the connector library
[UPDATE]: When subcommands or connector wiring change
*/

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use walletgate_connector::store::{is_expired_at, token_claims};
use walletgate_connector::{
    ChainNamespace, ClientConfig, ConnectError, Connector, DisconnectOptions, EvmWalletProvider,
    FileStore, GuardedStore, LoginParams, Orchestrator, Provider, SolanaWalletProvider,
    VerifierClient, WalletConnector, WalletSource,
};

use crate::config::{CliConfig, ConnectorConfig};

/// Build the registry described by `config`, persisting to its storage dir
pub fn build_orchestrator(config: &CliConfig) -> Result<Orchestrator> {
    let storage_dir = config.storage_dir();
    let store = GuardedStore::new(Arc::new(FileStore::new(&storage_dir)));
    if !store.is_available() {
        warn!(dir = %storage_dir.display(), "storage unavailable; sessions will not persist");
    }

    let orchestrator = Orchestrator::new(config.sdk.clone(), store).context("create orchestrator")?;
    let verifier = VerifierClient::with_base_url(ClientConfig::default(), &config.sdk.verifier_url)
        .context("create verifier client")?;
    let authenticator = orchestrator
        .authenticator(Arc::new(verifier))
        .context("create authenticator")?;

    for connector_config in &config.connectors {
        let source = Arc::new(key_backed_source(connector_config));
        let connector = WalletConnector::external(
            connector_config.name.clone(),
            connector_config.chain.clone(),
            source,
            authenticator.clone(),
        );
        orchestrator
            .add_connector(Arc::new(connector))
            .with_context(|| format!("register connector {}", connector_config.name))?;
    }
    Ok(orchestrator)
}

/// Wallet source that builds its provider from a key in the environment
fn key_backed_source(config: &ConnectorConfig) -> WalletSource {
    let namespace = config.namespace;
    let key_env = config.private_key_env.clone();
    WalletSource::lazy(namespace, move |chain| {
        let key = std::env::var(&key_env).map_err(|_| {
            ConnectError::ProviderNotFound(format!("environment variable {key_env} is not set"))
        })?;
        let provider: Arc<dyn Provider> = match namespace {
            ChainNamespace::Solana => Arc::new(SolanaWalletProvider::new(key.trim(), &chain.chain_id)?),
            _ => Arc::new(EvmWalletProvider::new(key.trim(), &chain.chain_id)?),
        };
        Ok(provider)
    })
}

/// Connect (or reuse the restored session) and mint an identity token
pub async fn login(
    orchestrator: &Orchestrator,
    connector: Option<&str>,
    chain_id: Option<String>,
    show_token: bool,
) -> Result<()> {
    orchestrator.init().await.context("initialize connectors")?;

    let requested = match connector {
        Some(name) => name.to_string(),
        None => orchestrator
            .connector_names()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no connectors configured"))?,
    };

    match orchestrator.connected_connector_name() {
        Some(active) if active == requested => {
            info!(connector = %active, "reusing restored session");
        }
        Some(active) => {
            info!(from = %active, to = %requested, "switching connector");
            orchestrator
                .logout(DisconnectOptions::default())
                .await
                .context("disconnect previous connector")?;
            connect(orchestrator, &requested, chain_id).await?;
        }
        None => connect(orchestrator, &requested, chain_id).await?,
    }

    let token = orchestrator
        .authenticate_user()
        .await
        .with_context(|| format!("authenticate with {requested}"))?;

    let active = orchestrator.connector(&requested)?;
    let account = active_account(active.as_ref()).await;
    println!("connector: {requested}");
    println!("account:   {}", account.as_deref().unwrap_or("-"));
    println!("chain:     {}", active.chain_config().chain_id);
    println!("expires:   {}", describe_expiry(&token));
    if show_token {
        println!("token:     {token}");
    }
    Ok(())
}

async fn connect(orchestrator: &Orchestrator, name: &str, chain_id: Option<String>) -> Result<()> {
    let params = LoginParams {
        chain_id,
        ..LoginParams::default()
    };
    orchestrator
        .connect_to(name, params)
        .await
        .with_context(|| format!("connect {name}"))?;
    Ok(())
}

async fn active_account(connector: &dyn Connector) -> Option<String> {
    let provider = connector.provider()?;
    walletgate_connector::provider::accounts(provider.as_ref(), connector.namespace())
        .await
        .ok()?
        .into_iter()
        .next()
}

/// Print the restored session and every cached token
pub async fn status(orchestrator: &Orchestrator) -> Result<()> {
    orchestrator.init().await.context("initialize connectors")?;

    match orchestrator.connected_connector_name() {
        Some(name) => {
            let connector = orchestrator.connector(&name)?;
            println!("active:    {name} ({:?})", connector.status());
            println!("chain:     {}", connector.chain_config().chain_id);
        }
        None => println!("active:    none"),
    }

    let entries = orchestrator.tokens().entries();
    if entries.is_empty() {
        println!("tokens:    none");
        return Ok(());
    }
    println!("tokens:");
    for (address, issuer) in entries {
        let expiry = orchestrator
            .tokens()
            .get(&address, &issuer)
            .map(|token| describe_expiry(&token))
            .unwrap_or_else(|| "missing".to_string());
        println!("  {issuer:<16} {address}  {expiry}");
    }
    Ok(())
}

/// Disconnect the restored session; optionally forget every cached token
pub async fn logout(orchestrator: &Orchestrator, all: bool) -> Result<()> {
    orchestrator.init().await.context("initialize connectors")?;

    match orchestrator.logout(DisconnectOptions { cleanup: true }).await {
        Ok(()) => println!("logged out"),
        Err(ConnectError::NotConnected) => println!("no active session"),
        Err(err) => return Err(err).context("logout"),
    }

    if all {
        orchestrator.tokens().clear_all();
        println!("cleared all cached tokens");
    }
    Ok(())
}

fn describe_expiry(token: &str) -> String {
    let Ok(claims) = token_claims(token) else {
        return "unreadable".to_string();
    };
    let state = if is_expired_at(token, Utc::now().timestamp()) {
        "expired"
    } else {
        "valid"
    };
    match DateTime::<Utc>::from_timestamp(claims.exp, 0) {
        Some(at) => format!("{state} until {}", at.to_rfc3339()),
        None => format!("{state} (exp {})", claims.exp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn token(exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
        format!("h.{payload}.s")
    }

    #[test]
    fn test_describe_expiry() {
        assert!(describe_expiry(&token(4_102_444_800)).starts_with("valid until 2100-01-01"));
        assert!(describe_expiry(&token(1)).starts_with("expired"));
        assert_eq!(describe_expiry("garbage"), "unreadable");
    }
}
