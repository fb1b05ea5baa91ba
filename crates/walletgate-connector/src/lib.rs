/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public wallet-connector crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod config;
pub mod connector;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod plugin;
pub mod provider;
pub mod store;
pub mod types;

// Re-export commonly used types from auth
pub use auth::{Authenticator, ChallengeChainId, IssuedToken, SignChallenge};

pub use config::SdkConfig;

pub use connector::{
    Connector,
    DisconnectOptions,
    EmbeddedSource,
    InitOptions,
    ProviderSource,
    WalletConnector,
    WalletSource,
};

pub use error::{ConnectError, ErrorKind, Result};

// Re-export commonly used types from http
pub use http::{ChallengeVerifier, ClientConfig, VerifierClient, VerifyRequest};

pub use orchestrator::Orchestrator;

pub use plugin::{Plugin, PluginRegistry, PluginStatus};

pub use provider::{
    EvmWalletProvider,
    Provider,
    ProviderEvent,
    RequestArguments,
    SolanaWalletProvider,
};

#[cfg(any(test, feature = "test-util"))]
pub use provider::MockProvider;

pub use store::{FileStore, GuardedStore, KeyValueStore, MemoryStore, TokenStore};

// Re-export all types
pub use types::*;
