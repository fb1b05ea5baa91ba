/*
[INPUT]:  Domain, uri, account address, and chain config
[OUTPUT]: Sign-in payloads and their namespace-specific message text
[POS]:    Auth layer - challenge construction and serialization
[UPDATE]: When message formats or nonce rules change
*/

use std::fmt;

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::{ConnectError, Result};
use crate::types::{ChainNamespace, parse_hex_chain_id};

const NONCE_LENGTH: usize = 16;
pub const CHALLENGE_VERSION: &str = "1";

/// Chain id as it appears inside a challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeChainId {
    /// EVM chains: hex id parsed to its decimal value
    Numeric(u64),
    /// Other namespaces keep a native identifier
    Native(String),
}

impl fmt::Display for ChallengeChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeChainId::Numeric(id) => write!(f, "{id}"),
            ChallengeChainId::Native(id) => f.write_str(id),
        }
    }
}

impl ChallengeChainId {
    pub fn for_namespace(namespace: ChainNamespace, chain_id: &str) -> Result<Self> {
        match namespace {
            ChainNamespace::Eip155 => Ok(Self::Numeric(parse_hex_chain_id(chain_id)?)),
            ChainNamespace::Solana => {
                let cluster = match chain_id.trim().to_ascii_lowercase().as_str() {
                    "0x1" => "mainnet".to_string(),
                    "0x2" => "testnet".to_string(),
                    "0x3" => "devnet".to_string(),
                    other => other.to_string(),
                };
                Ok(Self::Native(cluster))
            }
            other => Err(ConnectError::InvalidNamespace(other)),
        }
    }
}

/// Ephemeral sign-in payload; built fresh for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignChallenge {
    pub domain: String,
    pub uri: String,
    pub address: String,
    pub chain_id: ChallengeChainId,
    pub version: String,
    pub nonce: String,
    pub issued_at: String,
    pub statement: Option<String>,
}

impl SignChallenge {
    pub fn new(
        domain: &str,
        uri: &str,
        address: &str,
        chain_id: ChallengeChainId,
        statement: Option<String>,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            uri: uri.to_string(),
            address: address.to_string(),
            chain_id,
            version: CHALLENGE_VERSION.to_string(),
            nonce: generate_nonce(),
            issued_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            statement,
        }
    }

    /// Serialize into the text the wallet is asked to sign.
    ///
    /// EVM follows EIP-4361; Solana uses the same layout with its own header.
    pub fn to_message(&self, namespace: ChainNamespace) -> Result<String> {
        let account_kind = match namespace {
            ChainNamespace::Eip155 => "Ethereum",
            ChainNamespace::Solana => "Solana",
            other => return Err(ConnectError::InvalidNamespace(other)),
        };

        let mut message = format!(
            "{} wants you to sign in with your {account_kind} account:\n{}\n\n",
            self.domain, self.address
        );
        if let Some(statement) = self.statement.as_deref().filter(|s| !s.is_empty()) {
            message.push_str(statement);
            message.push('\n');
        }
        message.push_str(&format!(
            "\nURI: {}\nVersion: {}\nChain ID: {}\nNonce: {}\nIssued At: {}",
            self.uri, self.version, self.chain_id, self.nonce, self.issued_at
        ));
        Ok(message)
    }
}

/// Random alphanumeric nonce, never reused across attempts.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fixed_challenge(statement: Option<&str>) -> SignChallenge {
        SignChallenge {
            domain: "app.example.com".to_string(),
            uri: "https://app.example.com/login".to_string(),
            address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            chain_id: ChallengeChainId::Numeric(1),
            version: "1".to_string(),
            nonce: "abcdef0123456789".to_string(),
            issued_at: "2024-01-01T00:00:00.000Z".to_string(),
            statement: statement.map(str::to_string),
        }
    }

    #[rstest]
    #[case(ChainNamespace::Eip155, "0x1", ChallengeChainId::Numeric(1))]
    #[case(ChainNamespace::Eip155, "0x89", ChallengeChainId::Numeric(137))]
    #[case(ChainNamespace::Solana, "0x1", ChallengeChainId::Native("mainnet".into()))]
    #[case(ChainNamespace::Solana, "0x3", ChallengeChainId::Native("devnet".into()))]
    #[case(ChainNamespace::Solana, "localnet", ChallengeChainId::Native("localnet".into()))]
    fn test_chain_id_per_namespace(
        #[case] namespace: ChainNamespace,
        #[case] raw: &str,
        #[case] expected: ChallengeChainId,
    ) {
        assert_eq!(ChallengeChainId::for_namespace(namespace, raw).unwrap(), expected);
    }

    #[test]
    fn test_unsupported_namespace() {
        assert!(matches!(
            ChallengeChainId::for_namespace(ChainNamespace::Xrpl, "0x1"),
            Err(ConnectError::InvalidNamespace(ChainNamespace::Xrpl))
        ));
    }

    #[test]
    fn test_eip4361_message_with_statement() {
        let message = fixed_challenge(Some("Sign in to Example"))
            .to_message(ChainNamespace::Eip155)
            .unwrap();
        let expected = "app.example.com wants you to sign in with your Ethereum account:\n\
0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266\n\
\n\
Sign in to Example\n\
\n\
URI: https://app.example.com/login\n\
Version: 1\n\
Chain ID: 1\n\
Nonce: abcdef0123456789\n\
Issued At: 2024-01-01T00:00:00.000Z";
        assert_eq!(message, expected);
    }

    #[test]
    fn test_message_without_statement() {
        let message = fixed_challenge(None)
            .to_message(ChainNamespace::Solana)
            .unwrap();
        assert!(message.starts_with(
            "app.example.com wants you to sign in with your Solana account:\n0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266\n\n\nURI:"
        ));
    }

    #[test]
    fn test_nonce_is_fresh() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), NONCE_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
