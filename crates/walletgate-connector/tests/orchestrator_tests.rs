/*
[INPUT]:  Orchestrator with several mock-backed connectors
[OUTPUT]: Test results for the registry: active slot, events, persistence
[POS]:    Integration tests - orchestration
[UPDATE]: When the active-slot policy or registry persistence changes
*/

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{
    CountingVerifier, eventually, evm_chain, gated_connector, mock_connector, next_event,
    sdk_config, solana_chain,
};
use rstest::rstest;
use tokio_test::assert_ok;
use walletgate_connector::{
    ChainNamespace, ConnectError, Connector, ConnectorEvent, ConnectorStatus, DisconnectOptions,
    GuardedStore, KeyValueStore, LoginParams, MemoryStore, MockProvider, Orchestrator, Plugin,
    PluginStatus, Provider, ProviderEvent, Result, UserInfo,
};

struct Fixture {
    orchestrator: Orchestrator,
    metamask: Arc<MockProvider>,
    phantom: Arc<MockProvider>,
}

fn fixture_with_store(backend: Arc<MemoryStore>) -> Fixture {
    let orchestrator = Orchestrator::new(sdk_config(), GuardedStore::new(backend)).unwrap();
    let auth = orchestrator
        .authenticator(Arc::new(CountingVerifier::default()))
        .unwrap();
    let (metamask, evm) = mock_connector("metamask", evm_chain(), "0xabc", auth.clone());
    let (phantom, sol) = mock_connector("phantom", solana_chain(), "So1ana", auth);
    orchestrator.add_connector(Arc::new(evm)).unwrap();
    orchestrator.add_connector(Arc::new(sol)).unwrap();
    Fixture {
        orchestrator,
        metamask,
        phantom,
    }
}

async fn fixture() -> Fixture {
    let fixture = fixture_with_store(Arc::new(MemoryStore::new()));
    fixture.orchestrator.init().await.unwrap();
    fixture
}

#[tokio::test]
async fn test_connect_to_marks_active_and_persists() {
    let fixture = fixture().await;
    let orchestrator = &fixture.orchestrator;
    assert_eq!(orchestrator.status(), ConnectorStatus::Ready);

    assert_ok!(orchestrator.connect_to("metamask", LoginParams::default()).await);

    assert_eq!(orchestrator.connected_connector_name().as_deref(), Some("metamask"));
    assert_eq!(orchestrator.last_connector().as_deref(), Some("metamask"));
    assert_eq!(orchestrator.status(), ConnectorStatus::Connected);
    assert!(orchestrator.provider().is_some());
    assert_eq!(fixture.phantom.request_count("connect"), 0);
}

#[rstest]
#[case("metamask")]
#[case("phantom")]
#[tokio::test]
async fn test_second_connector_is_rejected(#[case] first: &str) {
    let fixture = fixture().await;
    let orchestrator = &fixture.orchestrator;
    let second = if first == "metamask" { "phantom" } else { "metamask" };

    orchestrator.connect_to(first, LoginParams::default()).await.unwrap();
    let err = orchestrator
        .connect_to(second, LoginParams::default())
        .await
        .err()
        .expect("expected connect_to to fail");

    assert!(matches!(err, ConnectError::AlreadyConnected { ref active } if active == first));
    assert_eq!(orchestrator.connector(second).unwrap().status(), ConnectorStatus::Ready);
}

#[tokio::test]
async fn test_concurrent_connect_to_never_overlaps() {
    let orchestrator = Orchestrator::new(sdk_config(), GuardedStore::memory()).unwrap();
    let auth = orchestrator
        .authenticator(Arc::new(CountingVerifier::default()))
        .unwrap();
    let (gate, evm) = gated_connector("metamask", evm_chain(), "0xabc", auth.clone());
    let (_phantom, sol) = mock_connector("phantom", solana_chain(), "So1ana", auth);
    orchestrator.add_connector(Arc::new(evm)).unwrap();
    orchestrator.add_connector(Arc::new(sol)).unwrap();
    orchestrator.init().await.unwrap();

    let pending = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.connect_to("metamask", LoginParams::default()).await })
    };
    let metamask = orchestrator.connector("metamask").unwrap();
    assert!(eventually(|| metamask.status() == ConnectorStatus::Connecting).await);

    let err = orchestrator
        .connect_to("phantom", LoginParams::default())
        .await
        .err()
        .expect("expected connect_to to fail");
    assert!(matches!(err, ConnectError::Busy { ref connector, .. } if connector == "metamask"));
    assert_eq!(orchestrator.connector("phantom").unwrap().status(), ConnectorStatus::Ready);

    gate.approve();
    assert_ok!(pending.await.unwrap());
    let active: Vec<_> = orchestrator
        .connector_names()
        .iter()
        .filter(|name| orchestrator.connector(name).unwrap().status().is_active())
        .cloned()
        .collect();
    assert_eq!(active, vec!["metamask".to_string()]);
}

#[tokio::test]
async fn test_failed_connect_releases_slot() {
    let fixture = fixture().await;
    fixture.metamask.set_reject_connect(true);

    let err = fixture
        .orchestrator
        .connect_to("metamask", LoginParams::default())
        .await
        .err()
        .expect("expected connect_to to fail");
    assert!(err.is_user_rejection());
    assert!(fixture.orchestrator.connected_connector_name().is_none());
    assert!(fixture.orchestrator.last_connector().is_none());

    assert_ok!(fixture.orchestrator.connect_to("phantom", LoginParams::default()).await);
}

#[tokio::test]
async fn test_events_are_tagged_with_connector_name() {
    let fixture = fixture().await;
    let mut events = fixture.orchestrator.subscribe();

    fixture
        .orchestrator
        .connect_to("phantom", LoginParams::default())
        .await
        .unwrap();

    // READY events from init may still be in flight
    let connecting = loop {
        let tagged = next_event(&mut events).await;
        if !matches!(tagged.event, ConnectorEvent::Ready) {
            break tagged;
        }
    };
    assert_eq!(connecting.connector, "phantom");
    assert!(matches!(connecting.event, ConnectorEvent::Connecting));
    let connected = next_event(&mut events).await;
    assert_eq!(connected.connector, "phantom");
    assert!(matches!(connected.event, ConnectorEvent::Connected(_)));
}

#[tokio::test]
async fn test_logout_clears_marker_and_slot() {
    let fixture = fixture().await;
    let orchestrator = &fixture.orchestrator;
    orchestrator.connect_to("metamask", LoginParams::default()).await.unwrap();

    assert_ok!(orchestrator.logout(DisconnectOptions::default()).await);

    assert!(orchestrator.connected_connector_name().is_none());
    assert!(orchestrator.last_connector().is_none());
    assert_eq!(fixture.metamask.request_count("wallet_revokePermissions"), 1);
    assert!(matches!(
        orchestrator.logout(DisconnectOptions::default()).await,
        Err(ConnectError::NotConnected)
    ));
    assert_ok!(orchestrator.connect_to("phantom", LoginParams::default()).await);
}

#[tokio::test]
async fn test_slot_is_free_before_forwarder_catches_up() {
    let fixture = fixture().await;
    let orchestrator = &fixture.orchestrator;
    orchestrator.connect_to("metamask", LoginParams::default()).await.unwrap();

    // No yield between these calls, so the forwarder has not seen DISCONNECTED yet
    let metamask = orchestrator.connector("metamask").unwrap();
    assert_ok!(metamask.disconnect(DisconnectOptions::default()).await);
    assert!(orchestrator.connected_connector_name().is_none());
    assert_ok!(orchestrator.connect_to("phantom", LoginParams::default()).await);
    assert_eq!(orchestrator.last_connector().as_deref(), Some("phantom"));

    tokio::task::yield_now().await;
    assert!(eventually(|| orchestrator.connected_connector_name().as_deref() == Some("phantom")).await);
    assert_eq!(orchestrator.last_connector().as_deref(), Some("phantom"));
}

#[tokio::test]
async fn test_wallet_side_disconnect_frees_slot() {
    let fixture = fixture().await;
    let orchestrator = &fixture.orchestrator;
    let mut events = orchestrator.subscribe();
    orchestrator.connect_to("metamask", LoginParams::default()).await.unwrap();

    fixture.metamask.emit(ProviderEvent::Disconnect);

    loop {
        let tagged = next_event(&mut events).await;
        if matches!(tagged.event, ConnectorEvent::Disconnected) {
            assert_eq!(tagged.connector, "metamask");
            break;
        }
    }
    assert!(orchestrator.connected_connector_name().is_none());
    assert!(orchestrator.last_connector().is_none());
    assert_ok!(orchestrator.connect_to("phantom", LoginParams::default()).await);
}

#[tokio::test]
async fn test_init_restores_last_connector() {
    let backend = Arc::new(MemoryStore::new());
    let first = fixture_with_store(backend.clone());
    first.orchestrator.init().await.unwrap();
    first
        .orchestrator
        .connect_to("phantom", LoginParams::default())
        .await
        .unwrap();
    assert_eq!(
        backend.get_item("walletgate:connector").unwrap().as_deref(),
        Some("phantom")
    );

    // Fresh registry over the same storage, as after a page reload
    let second = fixture_with_store(backend);
    let phantom = second.orchestrator.connector("phantom").unwrap();
    let mut events = phantom.subscribe();
    assert_ok!(second.orchestrator.init().await);

    assert_eq!(second.orchestrator.connected_connector_name().as_deref(), Some("phantom"));
    assert!(phantom.rehydrated());
    assert_eq!(second.metamask.request_count("eth_requestAccounts"), 0);
    let reconnected = loop {
        if let ConnectorEvent::Connected(payload) = next_event(&mut events).await {
            break payload.reconnected;
        }
    };
    assert!(reconnected);
}

#[tokio::test]
async fn test_init_drops_marker_without_session() {
    let backend = Arc::new(MemoryStore::new());
    backend.set_item("walletgate:connector", "metamask").unwrap();
    let fixture = fixture_with_store(backend.clone());
    fixture.metamask.set_accounts(vec![]);

    assert_ok!(fixture.orchestrator.init().await);

    assert!(fixture.orchestrator.connected_connector_name().is_none());
    assert_eq!(backend.get_item("walletgate:connector").unwrap(), None);
    assert_eq!(
        fixture.orchestrator.connector("metamask").unwrap().status(),
        ConnectorStatus::Ready
    );
}

#[tokio::test]
async fn test_registry_errors() {
    let fixture = fixture().await;
    let orchestrator = &fixture.orchestrator;

    assert!(matches!(
        orchestrator.connect_to("coinbase", LoginParams::default()).await,
        Err(ConnectError::UnknownConnector(_))
    ));
    let auth = orchestrator
        .authenticator(Arc::new(CountingVerifier::default()))
        .unwrap();
    let (_provider, duplicate) = mock_connector("metamask", evm_chain(), "0xdef", auth);
    assert!(matches!(
        orchestrator.add_connector(Arc::new(duplicate)),
        Err(ConnectError::DuplicateConnector(_))
    ));
    assert!(matches!(
        orchestrator.authenticate_user().await,
        Err(ConnectError::NotConnected)
    ));
    assert!(matches!(
        orchestrator.get_plugin("wallet-services"),
        Err(ConnectError::PluginNotFound(_))
    ));
}

#[tokio::test]
async fn test_authenticate_through_registry() {
    let fixture = fixture().await;
    let orchestrator = &fixture.orchestrator;
    orchestrator.connect_to("metamask", LoginParams::default()).await.unwrap();

    let token = assert_ok!(orchestrator.authenticate_user().await);

    assert_eq!(orchestrator.status(), ConnectorStatus::Authorized);
    assert!(orchestrator.tokens().has_valid("0xABC", "metamask"));
    assert_eq!(orchestrator.tokens().get("0xabc", "metamask"), Some(token));
}

struct RecordingPlugin {
    namespace: ChainNamespace,
    status: Mutex<PluginStatus>,
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        "wallet-services"
    }

    fn namespace(&self) -> ChainNamespace {
        self.namespace
    }

    fn status(&self) -> PluginStatus {
        *self.status.lock().unwrap()
    }

    async fn connect(&self, _provider: Arc<dyn Provider>, _user_info: &UserInfo) -> Result<()> {
        *self.status.lock().unwrap() = PluginStatus::Connected;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.status.lock().unwrap() = PluginStatus::Disconnected;
        Ok(())
    }
}

#[tokio::test]
async fn test_plugins_follow_active_session() {
    let fixture = fixture().await;
    let orchestrator = &fixture.orchestrator;
    orchestrator
        .add_plugin(Arc::new(RecordingPlugin {
            namespace: ChainNamespace::Eip155,
            status: Mutex::new(PluginStatus::Disconnected),
        }))
        .unwrap();
    let plugin = orchestrator.get_plugin("wallet-services").unwrap();

    orchestrator.connect_to("phantom", LoginParams::default()).await.unwrap();
    assert!(!plugin.is_connected());
    orchestrator.logout(DisconnectOptions::default()).await.unwrap();

    orchestrator.connect_to("metamask", LoginParams::default()).await.unwrap();
    assert!(plugin.is_connected());

    orchestrator.logout(DisconnectOptions { cleanup: true }).await.unwrap();
    assert!(!plugin.is_connected());
    assert_eq!(
        orchestrator.connector("metamask").unwrap().status(),
        ConnectorStatus::NotReady
    );
}
