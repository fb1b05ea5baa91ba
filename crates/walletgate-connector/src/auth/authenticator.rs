/*
[INPUT]:  Connected provider, chain config, issuer name
[OUTPUT]: Backend-verifiable identity token (cached per address + issuer)
[POS]:    Auth layer - orchestrates the challenge-response login flow
[UPDATE]: When signing methods, verification contract, or caching rules change
*/

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::SdkConfig;
use crate::error::{ConnectError, Result};
use crate::http::{ChallengeVerifier, SignedChallenge, VerifyRequest};
use crate::provider::{self, Provider, RequestArguments};
use crate::store::TokenStore;
use crate::types::{ChainConfig, ChainNamespace};

use super::{ChallengeChainId, SignChallenge};

/// Identity token together with the account it was issued for
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub address: String,
    pub token: String,
}

/// Shared challenge-response capability injected into every connector
pub struct Authenticator {
    config: SdkConfig,
    domain: String,
    verifier: Arc<dyn ChallengeVerifier>,
    tokens: TokenStore,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("client_id", &self.config.client_id)
            .field("domain", &self.domain)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(
        config: SdkConfig,
        verifier: Arc<dyn ChallengeVerifier>,
        tokens: TokenStore,
    ) -> Result<Self> {
        config.validate()?;
        let domain = config.domain()?;
        Ok(Self {
            config,
            domain,
            verifier,
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// First account exposed by the provider, if any
    pub async fn primary_account(
        &self,
        provider: &dyn Provider,
        namespace: ChainNamespace,
    ) -> Result<Option<String>> {
        let accounts = provider::accounts(provider, namespace).await?;
        Ok(accounts.into_iter().next())
    }

    /// Build a fresh challenge for `address` on `chain`
    pub fn build_challenge(&self, chain: &ChainConfig, address: &str) -> Result<SignChallenge> {
        let chain_id = ChallengeChainId::for_namespace(chain.chain_namespace, &chain.chain_id)?;
        Ok(SignChallenge::new(
            &self.domain,
            &self.config.uri,
            address,
            chain_id,
            self.config.statement.clone(),
        ))
    }

    /// Complete authentication flow
    ///
    /// 1. Read the primary account
    /// 2. Reuse a cached, unexpired token when present
    /// 3. Build and serialize a fresh challenge
    /// 4. Sign it with the namespace's signing method
    /// 5. Exchange it for an identity token
    /// 6. Cache the token under (address, issuer)
    pub async fn authenticate(
        &self,
        provider: &dyn Provider,
        chain: &ChainConfig,
        issuer: &str,
    ) -> Result<String> {
        self.authenticate_account(provider, chain, issuer)
            .await
            .map(|issued| issued.token)
    }

    /// Same flow as [`Authenticator::authenticate`], also reporting the
    /// address the token was cached under.
    pub async fn authenticate_account(
        &self,
        provider: &dyn Provider,
        chain: &ChainConfig,
        issuer: &str,
    ) -> Result<IssuedToken> {
        let namespace = chain.chain_namespace;
        if !namespace.supports_authentication() {
            return Err(ConnectError::InvalidNamespace(namespace));
        }

        // Step 1
        let address = self
            .primary_account(provider, namespace)
            .await?
            .ok_or(ConnectError::NotConnected)?;

        // Step 2
        if let Some(token) = self.tokens.get_valid(&address, issuer) {
            debug!(issuer, "reusing cached identity token");
            return Ok(IssuedToken { address, token });
        }

        // Step 3
        let challenge = self.build_challenge(chain, &address)?;
        let message = challenge.to_message(namespace)?;

        // Step 4
        let signed_challenge = sign_challenge(provider, namespace, &address, &message).await?;

        // Step 5
        let request = VerifyRequest {
            signed_challenge,
            challenge: message,
            issuer: issuer.to_string(),
            session_time: self.config.session_time,
            client_id: self.config.client_id.clone(),
            network: self.config.network.as_str().to_string(),
        };
        let token = self.verifier.verify(&request).await?;

        // Step 6
        self.tokens.save(&address, issuer, &token);
        info!(issuer, namespace = %namespace, "identity token issued");
        Ok(IssuedToken { address, token })
    }

    pub fn clear_token(&self, address: &str, issuer: &str) {
        self.tokens.clear(address, issuer);
    }
}

async fn sign_challenge(
    provider: &dyn Provider,
    namespace: ChainNamespace,
    address: &str,
    message: &str,
) -> Result<SignedChallenge> {
    match namespace {
        ChainNamespace::Eip155 => {
            let params = json!([format!("0x{}", hex::encode(message)), address]);
            let result = provider
                .request(RequestArguments::new("personal_sign", params))
                .await
                .map_err(ConnectError::into_signing_error)?;
            let signature = result
                .as_str()
                .ok_or_else(|| ConnectError::VerificationFailed("personal_sign returned no signature".into()))?;
            Ok(SignedChallenge {
                signature: signature.to_string(),
                signature_type: "eip191".to_string(),
            })
        }
        ChainNamespace::Solana => {
            let params = json!({ "message": message.as_bytes(), "display": "utf8" });
            let result = provider
                .request(RequestArguments::new("signMessage", params))
                .await
                .map_err(ConnectError::into_signing_error)?;
            Ok(SignedChallenge {
                signature: solana_signature_base58(&result)?,
                signature_type: "sip99".to_string(),
            })
        }
        other => Err(ConnectError::InvalidNamespace(other)),
    }
}

/// Accepts raw bytes, `{ signature: bytes }`, or an already base58 string.
fn solana_signature_base58(result: &Value) -> Result<String> {
    let raw = result.get("signature").unwrap_or(result);
    if let Some(encoded) = raw.as_str() {
        return Ok(encoded.to_string());
    }
    let bytes: Vec<u8> = serde_json::from_value(raw.clone()).map_err(|e| {
        ConnectError::VerificationFailed(format!("signMessage returned malformed signature: {e}"))
    })?;
    if bytes.is_empty() {
        return Err(ConnectError::VerificationFailed(
            "signMessage returned an empty signature".to_string(),
        ));
    }
    Ok(bs58::encode(bytes).into_string())
}
