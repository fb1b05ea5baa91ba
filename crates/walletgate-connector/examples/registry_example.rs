/*
[INPUT]:  Two mock wallets registered with an orchestrator
[OUTPUT]: Tagged lifecycle events printed as they happen
[POS]:    Examples - registry event stream demonstration
[UPDATE]: When orchestrator API or events change
*/

use std::sync::Arc;

use walletgate_connector::*;

/// Example: one event stream for every connector
#[tokio::main]
async fn main() {
    println!("=== Walletgate Registry Example ===\n");

    let orchestrator = match Orchestrator::new(SdkConfig::new("example-client"), GuardedStore::memory()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };
    let verifier = match VerifierClient::new() {
        Ok(verifier) => verifier,
        Err(e) => {
            eprintln!("Failed to create verifier client: {}", e);
            return;
        }
    };
    let authenticator = match orchestrator.authenticator(Arc::new(verifier)) {
        Ok(auth) => auth,
        Err(e) => {
            eprintln!("Failed to create authenticator: {}", e);
            return;
        }
    };

    let wallets = [
        ("metamask", ChainConfig::ethereum_mainnet("https://rpc.ankr.com/eth"), "0xAbC0000000000000000000000000000000000001"),
        ("phantom", ChainConfig::solana_mainnet("https://api.mainnet-beta.solana.com"), "So1anaExampleAddress"),
    ];
    for (name, chain, address) in wallets {
        let namespace = chain.chain_namespace;
        let provider = Arc::new(MockProvider::new(namespace, address));
        let source = Arc::new(WalletSource::injected(namespace, provider));
        let connector = WalletConnector::external(name, chain, source, authenticator.clone());
        if let Err(e) = orchestrator.add_connector(Arc::new(connector)) {
            eprintln!("Failed to register {}: {}", name, e);
            return;
        }
    }

    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(tagged) = events.recv().await {
            println!("  [{}] {}", tagged.connector, tagged.event.name());
        }
    });

    if let Err(e) = orchestrator.init().await {
        eprintln!("Init failed: {}", e);
        return;
    }
    if let Err(e) = orchestrator.connect_to("metamask", LoginParams::default()).await {
        eprintln!("Connect failed: {}", e);
        return;
    }
    match orchestrator.connect_to("phantom", LoginParams::default()).await {
        Ok(_) => println!("unexpected: two active connectors"),
        Err(e) => println!("✓ Second connector rejected: {}", e),
    }
    if let Err(e) = orchestrator.logout(DisconnectOptions::default()).await {
        eprintln!("Logout failed: {}", e);
    }

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    println!("\n✓ Registry example complete");
}
