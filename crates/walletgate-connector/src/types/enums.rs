/*
[INPUT]:  Connector identity and lifecycle vocabulary
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - shared enumerations for connectors and chains
[UPDATE]: When adding a chain family, network, or lifecycle state
*/

use std::fmt;

use serde::{Deserialize, Serialize};

/// Blockchain family a connector speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainNamespace {
    Eip155,
    Solana,
    Xrpl,
    Casper,
    Other,
}

impl ChainNamespace {
    /// Method used to read the currently exposed accounts.
    pub fn accounts_method(&self) -> &'static str {
        match self {
            ChainNamespace::Solana => "getAccounts",
            _ => "eth_accounts",
        }
    }

    /// Method used to ask the wallet for account access.
    pub fn request_accounts_method(&self) -> &'static str {
        match self {
            ChainNamespace::Solana => "connect",
            _ => "eth_requestAccounts",
        }
    }

    /// Whether the challenge-response login flow is defined for this namespace.
    pub fn supports_authentication(&self) -> bool {
        matches!(self, ChainNamespace::Eip155 | ChainNamespace::Solana)
    }
}

impl fmt::Display for ChainNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ChainNamespace::Eip155 => "eip155",
            ChainNamespace::Solana => "solana",
            ChainNamespace::Xrpl => "xrpl",
            ChainNamespace::Casper => "casper",
            ChainNamespace::Other => "other",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorCategory {
    InApp,
    External,
}

/// Lifecycle state of a single connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    NotReady,
    Ready,
    Connecting,
    Connected,
    Authorizing,
    Authorized,
    Errored,
    Disconnected,
}

impl ConnectorStatus {
    /// States that hold a live provider.
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            ConnectorStatus::Connected | ConnectorStatus::Authorizing | ConnectorStatus::Authorized
        )
    }

    /// States that occupy the registry-wide active slot.
    pub fn is_active(&self) -> bool {
        *self == ConnectorStatus::Connecting || self.has_session()
    }

    /// Allowed edges of the lifecycle graph.
    pub fn can_transition_to(&self, next: ConnectorStatus) -> bool {
        use ConnectorStatus::*;
        match (*self, next) {
            (NotReady | Errored | Disconnected, Ready) => true,
            (Ready, Connecting) => true,
            (Connecting, Connected | Ready | Errored) => true,
            (Connected, Authorizing) => true,
            (Authorizing, Authorized | Connected) => true,
            (Authorized, Authorizing) => true,
            (Connected | Authorizing | Authorized, Disconnected | Ready | NotReady) => true,
            (Ready, NotReady) => true,
            _ => false,
        }
    }
}

/// Backend network the identity tokens are minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
    Cyan,
    Aqua,
    SapphireMainnet,
    SapphireDevnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
            Network::Cyan => "cyan",
            Network::Aqua => "aqua",
            Network::SapphireMainnet => "sapphire_mainnet",
            Network::SapphireDevnet => "sapphire_devnet",
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::SapphireMainnet
    }
}
