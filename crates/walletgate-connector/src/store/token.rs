/*
[INPUT]:  Identity tokens keyed by (wallet address, issuer)
[OUTPUT]: Cached token lookup with expiry introspection
[POS]:    Storage layer - identity token lifecycle management
[UPDATE]: When token key layout or expiry rules change
*/

use base64::{
    Engine as _,
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ConnectError, Result};

use super::GuardedStore;

/// Claims read from a cached identity token
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
}

/// Identity token cache partitioned by lowercase address and issuer
#[derive(Debug, Clone)]
pub struct TokenStore {
    store: GuardedStore,
    prefix: String,
}

impl TokenStore {
    pub fn new(store: GuardedStore, key_prefix: &str) -> Self {
        Self {
            store,
            prefix: format!("{key_prefix}:token:"),
        }
    }

    /// Storage key for an `(address, issuer)` pair
    pub fn key(&self, address: &str, issuer: &str) -> String {
        format!("{}{}:{}", self.prefix, address.trim().to_lowercase(), issuer)
    }

    /// Store a token. Returns whether it was persisted.
    pub fn save(&self, address: &str, issuer: &str, token: &str) -> bool {
        let persisted = self.store.set(&self.key(address, issuer), token);
        debug!(issuer, persisted, token_len = token.len(), "identity token cached");
        persisted
    }

    /// Cached token regardless of expiry
    pub fn get(&self, address: &str, issuer: &str) -> Option<String> {
        self.store.get(&self.key(address, issuer))
    }

    /// Cached token only if it has not expired
    pub fn get_valid(&self, address: &str, issuer: &str) -> Option<String> {
        self.get(address, issuer)
            .filter(|token| !is_expired_at(token, Utc::now().timestamp()))
    }

    pub fn clear(&self, address: &str, issuer: &str) {
        self.store.remove(&self.key(address, issuer));
    }

    /// Issuers holding a token for `address`
    pub fn list_issuers(&self, address: &str) -> Vec<String> {
        let address_prefix = format!("{}{}:", self.prefix, address.trim().to_lowercase());
        self.store
            .keys_with_prefix(&address_prefix)
            .into_iter()
            .filter_map(|key| key.strip_prefix(&address_prefix).map(str::to_string))
            .collect()
    }

    /// Every cached `(address, issuer)` pair
    pub fn entries(&self) -> Vec<(String, String)> {
        self.store
            .keys_with_prefix(&self.prefix)
            .into_iter()
            .filter_map(|key| {
                let rest = key.strip_prefix(&self.prefix)?;
                let (address, issuer) = rest.split_once(':')?;
                Some((address.to_string(), issuer.to_string()))
            })
            .collect()
    }

    pub fn clear_all(&self) {
        for key in self.store.keys_with_prefix(&self.prefix) {
            self.store.remove(&key);
        }
    }

    /// Whether a token is present and unexpired for the pair
    pub fn has_valid(&self, address: &str, issuer: &str) -> bool {
        self.get_valid(address, issuer).is_some()
    }

    /// Whether any unexpired token exists for `issuer`
    pub fn has_valid_for_issuer(&self, issuer: &str) -> bool {
        self.entries()
            .into_iter()
            .any(|(address, cached_issuer)| cached_issuer == issuer && self.has_valid(&address, issuer))
    }
}

/// Decode the payload segment of a JWT-like token.
pub fn token_claims(token: &str) -> Result<IdentityClaims> {
    let payload_b64 = token
        .trim()
        .split('.')
        .nth(1)
        .ok_or_else(|| ConnectError::InvalidToken("token is not a valid JWT".to_string()))?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .or_else(|_| URL_SAFE.decode(payload_b64))
        .map_err(|e| ConnectError::InvalidToken(format!("Invalid JWT payload base64: {e}")))?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|e| ConnectError::InvalidToken(format!("Invalid JWT claims: {e}")))
}

/// A token is usable only while `exp` is strictly in the future.
///
/// Unreadable tokens count as expired.
pub fn is_expired_at(token: &str, now_secs: i64) -> bool {
    match token_claims(token) {
        Ok(claims) => claims.exp <= now_secs,
        Err(_) => true,
    }
}
