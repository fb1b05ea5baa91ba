/*
[INPUT]:  Profile fields exposed by a connected wallet or login provider
[OUTPUT]: UserInfo and LoginParams value types
[POS]:    Data layer - identity profile and connect parameters
[UPDATE]: When providers expose new profile or login fields
*/

use serde::{Deserialize, Serialize};

/// Best-effort partial profile; external wallets usually leave everything empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mfa_enabled: Option<bool>,
}

impl UserInfo {
    pub fn is_empty(&self) -> bool {
        *self == UserInfo::default()
    }
}

/// Parameters forwarded to a connector's handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginParams {
    /// Social login provider or wallet hint (in-app connectors)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,
    /// Chain to select once the handshake completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}
