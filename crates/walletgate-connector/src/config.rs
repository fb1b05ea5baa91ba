/*
[INPUT]:  Host application settings (serde-deserializable)
[OUTPUT]: Validated SDK configuration with defaults
[POS]:    Configuration layer - shared by authenticator and orchestrator
[UPDATE]: When adding new configuration options
*/

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConnectError, Result};
use crate::http::DEFAULT_VERIFIER_URL;
use crate::types::Network;

/// Longest session a token may be requested for (30 days).
pub const MAX_SESSION_TIME: u64 = 30 * 24 * 60 * 60;

/// Top-level SDK configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SdkConfig {
    /// Project identifier registered with the verification service
    pub client_id: String,
    #[serde(default)]
    pub network: Network,
    /// Requested identity token lifetime in seconds
    #[serde(default = "default_session_time")]
    pub session_time: u64,
    /// URL of the page hosting the login; the challenge domain is derived from it
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Optional human-readable line inserted into challenges
    #[serde(default)]
    pub statement: Option<String>,
    #[serde(default = "default_verifier_url")]
    pub verifier_url: String,
    /// Namespace for every persisted key
    #[serde(default = "default_storage_key_prefix")]
    pub storage_key_prefix: String,
}

fn default_session_time() -> u64 {
    86_400
}

fn default_uri() -> String {
    "http://localhost".to_string()
}

fn default_verifier_url() -> String {
    DEFAULT_VERIFIER_URL.to_string()
}

fn default_storage_key_prefix() -> String {
    "walletgate".to_string()
}

impl SdkConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            network: Network::default(),
            session_time: default_session_time(),
            uri: default_uri(),
            statement: None,
            verifier_url: default_verifier_url(),
            storage_key_prefix: default_storage_key_prefix(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(ConnectError::InvalidParams(
                "clientId is required".to_string(),
            ));
        }
        if self.session_time == 0 || self.session_time > MAX_SESSION_TIME {
            return Err(ConnectError::InvalidParams(format!(
                "sessionTime must be between 1 and {MAX_SESSION_TIME} seconds, got {}",
                self.session_time
            )));
        }
        if self.storage_key_prefix.trim().is_empty() {
            return Err(ConnectError::InvalidParams(
                "storage key prefix cannot be empty".to_string(),
            ));
        }
        self.domain()?;
        Url::parse(&self.verifier_url)?;
        Ok(())
    }

    /// `host[:port]` of the hosting page
    pub fn domain(&self) -> Result<String> {
        let url = Url::parse(&self.uri)?;
        let host = url.host_str().ok_or_else(|| {
            ConnectError::InvalidParams(format!("uri {} has no host", self.uri))
        })?;
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: SdkConfig = serde_json::from_str(r#"{"client_id": "abc"}"#).unwrap();
        assert_eq!(config.session_time, 86_400);
        assert_eq!(config.network, Network::SapphireMainnet);
        assert_eq!(config.storage_key_prefix, "walletgate");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_domain_keeps_port() {
        let mut config = SdkConfig::new("abc");
        config.uri = "https://app.example.com:8443/login?x=1".to_string();
        assert_eq!(config.domain().unwrap(), "app.example.com:8443");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SdkConfig::new("");
        assert!(config.validate().is_err());

        config.client_id = "abc".to_string();
        config.session_time = MAX_SESSION_TIME + 1;
        assert!(matches!(config.validate(), Err(ConnectError::InvalidParams(_))));

        config.session_time = 60;
        config.uri = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ConnectError::UrlParse(_))));
    }
}
