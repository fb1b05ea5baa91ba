/*
[INPUT]:  Lifecycle requests from a connector implementation
[OUTPUT]: Guarded status transitions, session slots, and lifecycle events
[POS]:    Connector layer - state machine shared by every connector
[UPDATE]: When lifecycle edges or session bookkeeping change
*/

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ConnectError, Result};
use crate::provider::Provider;
use crate::types::{
    AuthorizedPayload, ChainConfig, ConnectedPayload, ConnectorEvent, ConnectorStatus,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct StateInner {
    status: ConnectorStatus,
    provider: Option<Arc<dyn Provider>>,
    account: Option<String>,
    chain_config: ChainConfig,
    known_chains: Vec<ChainConfig>,
    rehydrated: bool,
    listener: Option<CancellationToken>,
}

/// Live session handed out by [`ConnectorState::session`]
#[derive(Clone)]
pub struct Session {
    pub provider: Arc<dyn Provider>,
    pub account: Option<String>,
    pub chain_config: ChainConfig,
}

/// Status, session slot, and event channel of one connector.
///
/// The lock is never held across an await point; every transition is a
/// short check-and-set so concurrent callers observe a consistent status.
pub struct ConnectorState {
    name: String,
    inner: Mutex<StateInner>,
    events: broadcast::Sender<ConnectorEvent>,
}

impl ConnectorState {
    pub fn new(name: impl Into<String>, chain_config: ChainConfig) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            inner: Mutex::new(StateInner {
                status: ConnectorStatus::NotReady,
                provider: None,
                account: None,
                chain_config,
                known_chains: Vec::new(),
                rehydrated: false,
                listener: None,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ConnectorStatus {
        self.lock().status
    }

    pub fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.lock().provider.clone()
    }

    pub fn account(&self) -> Option<String> {
        self.lock().account.clone()
    }

    pub fn chain_config(&self) -> ChainConfig {
        self.lock().chain_config.clone()
    }

    pub fn rehydrated(&self) -> bool {
        self.lock().rehydrated
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: ConnectorEvent) {
        debug!(connector = %self.name, event = event.name(), "connector event");
        // No receivers is fine; events are fire-and-forget.
        let _ = self.events.send(event);
    }

    fn set_status(&self, inner: &mut StateInner, next: ConnectorStatus) {
        debug_assert!(
            inner.status == next || inner.status.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            inner.status,
            next
        );
        info!(connector = %self.name, from = ?inner.status, to = ?next, "status changed");
        inner.status = next;
    }

    /// NOT_READY (or a terminal state) -> READY. Returns false when already initialized.
    pub fn mark_ready(&self) -> bool {
        {
            let mut inner = self.lock();
            match inner.status {
                ConnectorStatus::NotReady
                | ConnectorStatus::Errored
                | ConnectorStatus::Disconnected => {
                    self.set_status(&mut inner, ConnectorStatus::Ready);
                }
                _ => return false,
            }
        }
        self.emit(ConnectorEvent::Ready);
        true
    }

    /// READY -> CONNECTING. Fails without mutating anything from any other state.
    pub fn begin_connect(&self) -> Result<TransitionGuard<'_>> {
        {
            let mut inner = self.lock();
            match inner.status {
                ConnectorStatus::Ready => {}
                ConnectorStatus::Connecting | ConnectorStatus::Authorizing => {
                    return Err(ConnectError::Busy {
                        connector: self.name.clone(),
                        status: inner.status,
                    });
                }
                status if status.has_session() => {
                    return Err(ConnectError::AlreadyConnected {
                        active: self.name.clone(),
                    });
                }
                status => {
                    return Err(ConnectError::NotReady {
                        connector: self.name.clone(),
                        status,
                    });
                }
            }
            self.set_status(&mut inner, ConnectorStatus::Connecting);
        }
        self.emit(ConnectorEvent::Connecting);
        Ok(TransitionGuard {
            state: self,
            during: ConnectorStatus::Connecting,
            revert_to: ConnectorStatus::Ready,
            report_abort: true,
            armed: true,
        })
    }

    /// CONNECTING -> CONNECTED with a live provider
    pub fn finish_connect(
        &self,
        guard: TransitionGuard<'_>,
        provider: Arc<dyn Provider>,
        account: Option<String>,
        rehydrated: bool,
        listener: CancellationToken,
    ) -> Result<ConnectedPayload> {
        {
            let mut inner = self.lock();
            if inner.status != ConnectorStatus::Connecting {
                listener.cancel();
                return Err(ConnectError::ConnectionRejected(format!(
                    "connection to {} was interrupted",
                    self.name
                )));
            }
            self.set_status(&mut inner, ConnectorStatus::Connected);
            inner.provider = Some(provider.clone());
            inner.account = account;
            inner.rehydrated = rehydrated;
            inner.listener = Some(listener);
        }
        guard.disarm();

        let payload = ConnectedPayload {
            connector: self.name.clone(),
            reconnected: rehydrated,
            provider,
        };
        self.emit(ConnectorEvent::Connected(payload.clone()));
        Ok(payload)
    }

    /// CONNECTING -> READY, reporting the failure as an ERRORED event
    pub fn fail_connect(&self, guard: TransitionGuard<'_>, error: &ConnectError) {
        guard.disarm();
        let reverted = {
            let mut inner = self.lock();
            if inner.status == ConnectorStatus::Connecting {
                self.set_status(&mut inner, ConnectorStatus::Ready);
                true
            } else {
                false
            }
        };
        if reverted {
            self.emit(ConnectorEvent::Errored(Arc::new(clone_for_event(error))));
        }
    }

    /// CONNECTED/AUTHORIZED -> AUTHORIZING
    pub fn begin_authorizing(&self) -> Result<(TransitionGuard<'_>, Session)> {
        let (session, previous) = {
            let mut inner = self.lock();
            let previous = inner.status;
            match previous {
                ConnectorStatus::Connected | ConnectorStatus::Authorized => {}
                ConnectorStatus::Authorizing => {
                    return Err(ConnectError::Busy {
                        connector: self.name.clone(),
                        status: previous,
                    });
                }
                _ => return Err(ConnectError::NotConnected),
            }
            let session = session_of(&inner).ok_or(ConnectError::NotConnected)?;
            self.set_status(&mut inner, ConnectorStatus::Authorizing);
            (session, previous)
        };
        self.emit(ConnectorEvent::Authorizing);
        Ok((
            TransitionGuard {
                state: self,
                during: ConnectorStatus::Authorizing,
                revert_to: previous,
                report_abort: false,
                armed: true,
            },
            session,
        ))
    }

    /// AUTHORIZING -> AUTHORIZED.
    ///
    /// Returns false when the session closed while the flow was pending.
    pub fn finish_authorizing(&self, guard: TransitionGuard<'_>, id_token: &str) -> bool {
        guard.disarm();
        let authorized = {
            let mut inner = self.lock();
            if inner.status == ConnectorStatus::Authorizing {
                self.set_status(&mut inner, ConnectorStatus::Authorized);
                true
            } else {
                false
            }
        };
        if authorized {
            self.emit(ConnectorEvent::Authorized(AuthorizedPayload {
                connector: self.name.clone(),
                id_token: id_token.to_string(),
            }));
        }
        authorized
    }

    /// Current session or NotConnected
    pub fn session(&self) -> Result<Session> {
        let inner = self.lock();
        if !inner.status.has_session() {
            return Err(ConnectError::NotConnected);
        }
        session_of(&inner).ok_or(ConnectError::NotConnected)
    }

    /// Close the session: READY when reusable, NOT_READY on cleanup.
    ///
    /// Returns the closed session, or None if another caller closed it first.
    pub fn end_session(&self, cleanup: bool) -> Option<Session> {
        let session = {
            let mut inner = self.lock();
            if !inner.status.has_session() {
                return None;
            }
            let session = session_of(&inner);
            if let Some(listener) = inner.listener.take() {
                listener.cancel();
            }
            inner.provider = None;
            inner.account = None;
            inner.rehydrated = false;
            let next = if cleanup {
                ConnectorStatus::NotReady
            } else {
                ConnectorStatus::Ready
            };
            self.set_status(&mut inner, next);
            session
        };
        self.emit(ConnectorEvent::Disconnected);
        session
    }

    /// Stop reacting to provider events ahead of a disconnect
    pub fn cancel_listener(&self) {
        if let Some(listener) = self.lock().listener.take() {
            listener.cancel();
        }
    }

    pub fn set_account(&self, account: Option<String>) {
        self.lock().account = account;
    }

    pub fn known_chain(&self, chain_id: &str) -> Option<ChainConfig> {
        self.lock()
            .known_chains
            .iter()
            .find(|chain| chain.same_chain(chain_id))
            .cloned()
    }

    /// Record a chain; replaces any entry with the same id
    pub fn add_known_chain(&self, config: ChainConfig) {
        let mut inner = self.lock();
        inner.known_chains.retain(|chain| !chain.same_chain(&config.chain_id));
        inner.known_chains.push(config);
    }

    pub fn set_chain_config(&self, config: ChainConfig) {
        let mut inner = self.lock();
        info!(connector = %self.name, chain_id = %config.chain_id, "chain selected");
        inner.chain_config = config;
    }
}

fn session_of(inner: &StateInner) -> Option<Session> {
    inner.provider.as_ref().map(|provider| Session {
        provider: provider.clone(),
        account: inner.account.clone(),
        chain_config: inner.chain_config.clone(),
    })
}

/// Errors carry non-Clone sources; events get a message-preserving copy.
fn clone_for_event(error: &ConnectError) -> ConnectError {
    match error {
        ConnectError::ConnectionRejected(message) => ConnectError::ConnectionRejected(message.clone()),
        ConnectError::ProviderNotFound(message) => ConnectError::ProviderNotFound(message.clone()),
        ConnectError::InvalidParams(message) => ConnectError::InvalidParams(message.clone()),
        ConnectError::Rpc { code, message } => ConnectError::Rpc {
            code: *code,
            message: message.clone(),
        },
        ConnectError::NotConnected => ConnectError::NotConnected,
        other => ConnectError::ConnectionRejected(other.to_string()),
    }
}

/// Reverts an in-flight transition unless it is explicitly completed.
///
/// Dropping the future that holds the guard (caller gave up, task aborted)
/// still returns the connector to a stable state.
pub struct TransitionGuard<'a> {
    state: &'a ConnectorState,
    during: ConnectorStatus,
    revert_to: ConnectorStatus,
    report_abort: bool,
    armed: bool,
}

impl TransitionGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let reverted = {
            let mut inner = self.state.lock();
            if inner.status == self.during {
                self.state.set_status(&mut inner, self.revert_to);
                true
            } else {
                false
            }
        };
        if reverted && self.report_abort {
            self.state.emit(ConnectorEvent::Errored(Arc::new(
                ConnectError::ConnectionRejected("connection attempt abandoned".to_string()),
            )));
        }
    }
}
