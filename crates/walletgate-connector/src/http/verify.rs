/*
[INPUT]:  Signed challenge plus session metadata
[OUTPUT]: Identity token issued by the verification service
[POS]:    HTTP layer - verification endpoint and its trait seam
[UPDATE]: When the verification contract changes
*/

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConnectError, Result};

use super::VerifierClient;

const VERIFY_ENDPOINT: &str = "/v1/siww/verify";

/// Signature plus the scheme it was produced with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedChallenge {
    pub signature: String,
    /// `eip191` or `sip99`
    pub signature_type: String,
}

/// Body sent to the verification service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub signed_challenge: SignedChallenge,
    pub challenge: String,
    pub issuer: String,
    pub session_time: u64,
    pub client_id: String,
    pub network: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub id_token: String,
}

/// Exchanges a signed challenge for an identity token.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify(&self, request: &VerifyRequest) -> Result<String>;
}

impl VerifierClient {
    /// POST /v1/siww/verify
    pub async fn verify_challenge(&self, request: &VerifyRequest) -> Result<VerifyResponse> {
        let builder = self.request(Method::POST, VERIFY_ENDPOINT)?.json(request);
        self.send_json(builder).await
    }
}

#[async_trait]
impl ChallengeVerifier for VerifierClient {
    async fn verify(&self, request: &VerifyRequest) -> Result<String> {
        let response = self.verify_challenge(request).await.map_err(|err| match err {
            ConnectError::Serialization(e) => {
                ConnectError::VerificationFailed(format!("malformed verifier response: {e}"))
            }
            ConnectError::Http(e) => ConnectError::VerificationFailed(e.to_string()),
            other => other,
        })?;

        if response.id_token.trim().is_empty() {
            return Err(ConnectError::VerificationFailed(
                "verifier returned an empty idToken".to_string(),
            ));
        }

        info!(issuer = %request.issuer, "challenge verified");
        Ok(response.id_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ClientConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> VerifyRequest {
        VerifyRequest {
            signed_challenge: SignedChallenge {
                signature: "0xsig".to_string(),
                signature_type: "eip191".to_string(),
            },
            challenge: "example.com wants you to sign in".to_string(),
            issuer: "metamask".to_string(),
            session_time: 86_400,
            client_id: "client-1".to_string(),
            network: "sapphire_mainnet".to_string(),
        }
    }

    #[tokio::test]
    async fn test_verify_returns_id_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VERIFY_ENDPOINT))
            .and(body_partial_json(serde_json::json!({
                "signedChallenge": {"signature": "0xsig", "signatureType": "eip191"},
                "issuer": "metamask",
                "sessionTime": 86_400,
                "clientId": "client-1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "idToken": "header.payload.sig",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = VerifierClient::with_base_url(ClientConfig::default(), &server.uri()).unwrap();
        let token = client.verify(&request()).await.unwrap();
        assert_eq!(token, "header.payload.sig");
    }

    #[tokio::test]
    async fn test_verify_failure_is_distinct() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VERIFY_ENDPOINT))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "message": "nonce mismatch",
            })))
            .mount(&server)
            .await;

        let client = VerifierClient::with_base_url(ClientConfig::default(), &server.uri()).unwrap();
        match client.verify(&request()).await.unwrap_err() {
            ConnectError::VerificationFailed(message) => assert!(message.contains("nonce mismatch")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VERIFY_ENDPOINT))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"idToken": ""})),
            )
            .mount(&server)
            .await;

        let client = VerifierClient::with_base_url(ClientConfig::default(), &server.uri()).unwrap();
        assert!(matches!(
            client.verify(&request()).await,
            Err(ConnectError::VerificationFailed(_))
        ));
    }
}
