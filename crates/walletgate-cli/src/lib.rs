/*
[INPUT]:  Public API exports for walletgate-cli crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod runner;

// Re-export main types for convenience
pub use config::{CliConfig, ConnectorConfig};
pub use runner::build_orchestrator;
