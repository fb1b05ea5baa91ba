/*
[INPUT]:  HTTP configuration (base URL, timeouts, client credentials)
[OUTPUT]: Configured reqwest client for the verification service
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ConnectError, Result};

/// Default verification service base URL
pub const DEFAULT_VERIFIER_URL: &str = "https://authjs.walletgate.dev";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the challenge verification service
#[derive(Debug, Clone)]
pub struct VerifierClient {
    http_client: Client,
    base_url: Url,
}

impl VerifierClient {
    /// Create a new client against the default service
    pub fn new() -> Result<Self> {
        Self::with_base_url(ClientConfig::default(), DEFAULT_VERIFIER_URL)
    }

    /// Create a new client with custom configuration and base URL
    pub fn with_base_url(config: ClientConfig, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build request builder for service endpoints
    pub(crate) fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Send a request and decode a JSON body, mapping non-2xx to verification errors
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "verifier response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::verification(status, error_message(&body)));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Pull `message`/`error` out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_bad_url() {
        let err = VerifierClient::with_base_url(ClientConfig::default(), "not a url").unwrap_err();
        assert!(matches!(err, ConnectError::UrlParse(_)));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"bad nonce"}"#), "bad nonce");
        assert_eq!(error_message(r#"{"error":"expired"}"#), "expired");
        assert_eq!(error_message("plain failure\n"), "plain failure");
    }
}
