/*
[INPUT]:  Lifecycle transitions inside connectors
[OUTPUT]: Typed lifecycle events and their payloads
[POS]:    Data layer - event vocabulary shared by connectors and the orchestrator
[UPDATE]: When adding lifecycle events or payload fields
*/

use std::fmt;
use std::sync::Arc;

use crate::error::ConnectError;
use crate::provider::Provider;

/// Payload of a CONNECTED event.
#[derive(Clone)]
pub struct ConnectedPayload {
    pub connector: String,
    /// True when the session came from auto-reconnect
    pub reconnected: bool,
    pub provider: Arc<dyn Provider>,
}

impl fmt::Debug for ConnectedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedPayload")
            .field("connector", &self.connector)
            .field("reconnected", &self.reconnected)
            .finish_non_exhaustive()
    }
}

/// Payload of an AUTHORIZED event.
#[derive(Debug, Clone)]
pub struct AuthorizedPayload {
    pub connector: String,
    pub id_token: String,
}

/// Lifecycle events emitted by a connector.
#[derive(Debug, Clone)]
pub enum ConnectorEvent {
    Ready,
    Connecting,
    Connected(ConnectedPayload),
    Disconnected,
    Errored(Arc<ConnectError>),
    MfaEnabled(bool),
    Authorizing,
    Authorized(AuthorizedPayload),
}

impl ConnectorEvent {
    /// Stable event name, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ConnectorEvent::Ready => "ready",
            ConnectorEvent::Connecting => "connecting",
            ConnectorEvent::Connected(_) => "connected",
            ConnectorEvent::Disconnected => "disconnected",
            ConnectorEvent::Errored(_) => "errored",
            ConnectorEvent::MfaEnabled(_) => "mfa_enabled",
            ConnectorEvent::Authorizing => "authorizing",
            ConnectorEvent::Authorized(_) => "authorized",
        }
    }
}

/// Event re-emitted by the orchestrator, tagged with its origin.
#[derive(Debug, Clone)]
pub struct RegistryEvent {
    pub connector: String,
    pub event: ConnectorEvent,
}
