/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed runner configuration (SDK settings + key-backed connectors)
[POS]:    Configuration layer - runner setup
[UPDATE]: When adding new configuration options
*/

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use walletgate_connector::{ChainConfig, ChainNamespace, SdkConfig};

/// Top-level configuration for the runner
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CliConfig {
    pub sdk: SdkConfig,
    /// Connectors available to `login`, in preference order
    pub connectors: Vec<ConnectorConfig>,
    /// Directory holding the persisted store; platform data dir when unset
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

/// One key-backed wallet
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectorConfig {
    /// Connector name, also used as the token issuer
    pub name: String,
    pub namespace: ChainNamespace,
    /// Environment variable holding the private key (hex for EVM, base58 for Solana)
    pub private_key_env: String,
    pub chain: ChainConfig,
}

impl CliConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sdk.validate().context("invalid sdk section")?;
        if self.connectors.is_empty() {
            bail!("at least one connector must be configured");
        }
        let mut names = HashSet::new();
        for connector in &self.connectors {
            if !names.insert(connector.name.as_str()) {
                bail!("connector {} is configured twice", connector.name);
            }
            if connector.chain.chain_namespace != connector.namespace {
                bail!(
                    "connector {} uses namespace {} but its chain is {}",
                    connector.name,
                    connector.namespace,
                    connector.chain.chain_namespace
                );
            }
            if !matches!(connector.namespace, ChainNamespace::Eip155 | ChainNamespace::Solana) {
                bail!(
                    "connector {}: only eip155 and solana keys are supported",
                    connector.name
                );
            }
            connector
                .chain
                .validate()
                .with_context(|| format!("invalid chain for connector {}", connector.name))?;
        }
        Ok(())
    }

    pub fn connector(&self, name: &str) -> Option<&ConnectorConfig> {
        self.connectors.iter().find(|connector| connector.name == name)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("walletgate"))
                .unwrap_or_else(|| PathBuf::from(".walletgate"))
        })
    }
}
