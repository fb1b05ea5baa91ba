/*
[INPUT]:  A local EVM key and a verification service URL
[OUTPUT]: Identity token minted through the challenge-response flow
[POS]:    Examples - authentication flow demonstration
[UPDATE]: When auth flow changes
*/

use std::sync::Arc;

use walletgate_connector::*;

/// Example: Authentication flow
///
/// 1. Create the verifier client and the shared authenticator
/// 2. Wrap a key-backed wallet in a connector
/// 3. Init and connect
/// 4. Sign the challenge and exchange it for an identity token
#[tokio::main]
async fn main() {
    println!("=== Walletgate Authentication Example ===\n");

    let verifier_url =
        std::env::var("WALLETGATE_VERIFIER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let private_key = std::env::var("WALLETGATE_EVM_KEY").unwrap_or_else(|_| {
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string()
    });

    // Step 1: Verifier + authenticator
    let verifier = match VerifierClient::with_base_url(ClientConfig::default(), &verifier_url) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to create verifier client: {}", e);
            return;
        }
    };
    let mut config = SdkConfig::new("example-client");
    config.uri = "https://app.example.com".to_string();
    config.verifier_url = verifier_url;
    let tokens = TokenStore::new(GuardedStore::memory(), &config.storage_key_prefix);
    let authenticator = match Authenticator::new(config, Arc::new(verifier), tokens) {
        Ok(auth) => Arc::new(auth),
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };
    println!("✓ Authenticator created");

    // Step 2: Key-backed wallet behind a connector
    let wallet = match EvmWalletProvider::new(&private_key, "0x1") {
        Ok(wallet) => Arc::new(wallet),
        Err(e) => {
            eprintln!("Invalid private key: {}", e);
            return;
        }
    };
    println!("  Wallet address: {}", wallet.address());
    let source = Arc::new(WalletSource::injected(ChainNamespace::Eip155, wallet));
    let connector = WalletConnector::external(
        "local-key",
        ChainConfig::ethereum_mainnet("https://rpc.ankr.com/eth"),
        source,
        authenticator,
    );

    // Step 3: Lifecycle
    if let Err(e) = connector.init(InitOptions::default()).await {
        eprintln!("Init failed: {}", e);
        return;
    }
    if let Err(e) = connector.connect(LoginParams::default()).await {
        eprintln!("Connect failed: {}", e);
        return;
    }
    println!("✓ Connected ({:?})", connector.status());

    // Step 4: Challenge-response
    match connector.authenticate_user().await {
        Ok(token) => println!("✓ Identity token issued ({} bytes)", token.len()),
        Err(e) if e.is_recoverable() => eprintln!("Verification failed, retry later: {}", e),
        Err(e) => eprintln!("Authentication failed: {}", e),
    }
}
