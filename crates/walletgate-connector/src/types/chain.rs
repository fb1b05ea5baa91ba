/*
[INPUT]:  Chain parameters supplied by host configuration
[OUTPUT]: Immutable ChainConfig values and chain id helpers
[POS]:    Data layer - target chain description
[UPDATE]: When chain metadata fields or id formats change
*/

use serde::{Deserialize, Serialize};

use super::ChainNamespace;
use crate::error::{ConnectError, Result};

/// Describes one target chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// Namespace-specific identifier (hex string for EVM)
    pub chain_id: String,
    pub chain_namespace: ChainNamespace,
    pub rpc_target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_target: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub ticker_name: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_explorer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

fn default_decimals() -> u8 {
    18
}

impl ChainConfig {
    /// Minimal config; display fields can be filled with struct update syntax.
    pub fn new(
        chain_namespace: ChainNamespace,
        chain_id: impl Into<String>,
        rpc_target: impl Into<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            chain_namespace,
            rpc_target: rpc_target.into(),
            ws_target: None,
            display_name: String::new(),
            ticker: String::new(),
            ticker_name: String::new(),
            decimals: default_decimals(),
            block_explorer_url: None,
            logo: None,
        }
    }

    /// Ethereum mainnet defaults.
    pub fn ethereum_mainnet(rpc_target: impl Into<String>) -> Self {
        Self {
            display_name: "Ethereum Mainnet".to_string(),
            ticker: "ETH".to_string(),
            ticker_name: "Ethereum".to_string(),
            block_explorer_url: Some("https://etherscan.io".to_string()),
            ..Self::new(ChainNamespace::Eip155, "0x1", rpc_target)
        }
    }

    /// Solana mainnet-beta defaults.
    pub fn solana_mainnet(rpc_target: impl Into<String>) -> Self {
        Self {
            display_name: "Solana Mainnet".to_string(),
            ticker: "SOL".to_string(),
            ticker_name: "Solana".to_string(),
            decimals: 9,
            block_explorer_url: Some("https://explorer.solana.com".to_string()),
            ..Self::new(ChainNamespace::Solana, "0x1", rpc_target)
        }
    }

    /// Check the fields every connector relies on.
    pub fn validate(&self) -> Result<()> {
        if self.chain_id.trim().is_empty() {
            return Err(ConnectError::InvalidParams(
                "chainId is required in chain config".to_string(),
            ));
        }
        if self.rpc_target.trim().is_empty() {
            return Err(ConnectError::InvalidParams(format!(
                "rpcTarget is required for chain {}",
                self.chain_id
            )));
        }
        if self.chain_namespace == ChainNamespace::Eip155 {
            parse_hex_chain_id(&self.chain_id)?;
        }
        Ok(())
    }

    /// Chain ids compare case-insensitively (`0xA` == `0xa`).
    pub fn same_chain(&self, chain_id: &str) -> bool {
        self.chain_id.eq_ignore_ascii_case(chain_id.trim())
    }
}

/// Parse a `0x`-prefixed (or bare) hex chain id into its decimal value.
pub fn parse_hex_chain_id(chain_id: &str) -> Result<u64> {
    let trimmed = chain_id.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ConnectError::InvalidParams(format!("Invalid hex chain id {chain_id}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_chain_id() {
        assert_eq!(parse_hex_chain_id("0x1").unwrap(), 1);
        assert_eq!(parse_hex_chain_id("0x89").unwrap(), 137);
        assert_eq!(parse_hex_chain_id("aa36a7").unwrap(), 11_155_111);
        assert!(parse_hex_chain_id("0xzz").is_err());
    }

    #[test]
    fn test_validate_requires_rpc_target() {
        let config = ChainConfig::new(ChainNamespace::Eip155, "0x1", "");
        assert!(matches!(config.validate(), Err(ConnectError::InvalidParams(_))));
    }

    #[test]
    fn test_camel_case_serde() {
        let config = ChainConfig::ethereum_mainnet("https://rpc.example");
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["chainId"], "0x1");
        assert_eq!(value["chainNamespace"], "eip155");
        assert_eq!(value["rpcTarget"], "https://rpc.example");
    }
}
