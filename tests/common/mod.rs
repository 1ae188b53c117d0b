//! In-memory server side for lifecycle tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use extlink::types::INITIALIZE;
use extlink::{
    Client, ClientState, Connection, ConnectionError, ConnectionEvent, ConnectionEvents,
    ContributionRegistry, ContributionsEntry, NotificationHandler, RequestHandler, ResponseError,
    TransportFactory, Unsubscribable,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

/// Answer to a client request. `None` never answers.
pub type Responder =
    Box<dyn Fn(&str, &Value) -> Option<Result<Value, ConnectionError>> + Send + Sync>;

/// Answers `initialize` with empty capabilities and everything else with null.
pub fn default_responder() -> Responder {
    Box::new(|method: &str, _: &Value| match method {
        INITIALIZE => Some(Ok(json!({ "capabilities": {} }))),
        _ => Some(Ok(Value::Null)),
    })
}

/// A message the client sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Request(String, Value),
    Notification(String, Value),
}

pub struct MockConnection {
    responder: Responder,
    sent: Mutex<Vec<Sent>>,
    request_handlers: Mutex<HashMap<String, RequestHandler>>,
    notification_handlers: Mutex<HashMap<String, NotificationHandler>>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: Mutex<Option<ConnectionEvents>>,
    initialize_gate: Mutex<Option<Arc<Notify>>>,
    /// Signalled when an `initialize` request arrives.
    pub initialize_seen: Notify,
    disposed: AtomicBool,
    dispose_signal: Notify,
    dispose_calls: AtomicUsize,
    listening: AtomicBool,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Self::with_responder(default_responder())
    }

    pub fn with_responder(responder: Responder) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            responder,
            sent: Mutex::new(Vec::new()),
            request_handlers: Mutex::new(HashMap::new()),
            notification_handlers: Mutex::new(HashMap::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            initialize_gate: Mutex::new(None),
            initialize_seen: Notify::new(),
            disposed: AtomicBool::new(false),
            dispose_signal: Notify::new(),
            dispose_calls: AtomicUsize::new(0),
            listening: AtomicBool::new(false),
        })
    }

    /// Answer `initialize` with these server capabilities.
    pub fn with_capabilities(capabilities: Value) -> Arc<Self> {
        Self::with_responder(Box::new(move |method: &str, _: &Value| match method {
            INITIALIZE => Some(Ok(json!({ "capabilities": capabilities.clone() }))),
            _ => Some(Ok(Value::Null)),
        }))
    }

    /// Hold every `initialize` request until the returned gate is notified
    /// or the connection is disposed.
    pub fn hold_initialize(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.initialize_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn requests(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Request(method, _) => Some(method.clone()),
                Sent::Notification(..) => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Notification(method, _) => Some(method.clone()),
                Sent::Request(..) => None,
            })
            .collect()
    }

    /// Params of the first request with this method.
    pub fn request_params(&self, method: &str) -> Option<Value> {
        self.sent.lock().iter().find_map(|sent| match sent {
            Sent::Request(m, params) if m == method => Some(params.clone()),
            _ => None,
        })
    }

    /// Deliver a server-to-client request to the installed handler.
    pub fn server_request(&self, method: &str, params: Value) -> Option<Result<Value, ResponseError>> {
        self.request_handlers
            .lock()
            .get(method)
            .map(|handler| handler(params))
    }

    /// Deliver a server-to-client notification to the installed handler.
    pub fn server_notification(&self, method: &str, params: Value) -> bool {
        match self.notification_handlers.lock().get(method) {
            Some(handler) => {
                handler(params);
                true
            }
            None => false,
        }
    }

    pub fn has_request_handler(&self, method: &str) -> bool {
        self.request_handlers.lock().contains_key(method)
    }

    pub fn fire_error(&self, error: ConnectionError, count: u32) {
        let _ = self.events_tx.send(ConnectionEvent::Error {
            error,
            message: None,
            count: Some(count),
        });
    }

    pub fn fire_close(&self) {
        let _ = self.events_tx.send(ConnectionEvent::Closed);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    async fn wait_for_gate(&self, gate: Arc<Notify>) -> bool {
        if self.is_disposed() {
            return false;
        }
        tokio::select! {
            () = gate.notified() => !self.is_disposed(),
            () = self.dispose_signal.notified() => false,
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn send_request(&self, method: &str, params: Value) -> Result<Value, ConnectionError> {
        if self.is_disposed() {
            return Err(ConnectionError::Disposed);
        }
        self.sent
            .lock()
            .push(Sent::Request(method.to_string(), params.clone()));

        if method == INITIALIZE {
            self.initialize_seen.notify_one();
            let gate = self.initialize_gate.lock().clone();
            if let Some(gate) = gate {
                if !self.wait_for_gate(gate).await {
                    return Err(ConnectionError::Disposed);
                }
            }
        }

        match (self.responder)(method, &params) {
            Some(reply) => reply,
            None => std::future::pending().await,
        }
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<(), ConnectionError> {
        if self.is_disposed() {
            return Err(ConnectionError::Disposed);
        }
        self.sent
            .lock()
            .push(Sent::Notification(method.to_string(), params));
        Ok(())
    }

    fn on_request(&self, method: &str, handler: RequestHandler) {
        self.request_handlers.lock().insert(method.to_string(), handler);
    }

    fn on_notification(&self, method: &str, handler: NotificationHandler) {
        self.notification_handlers
            .lock()
            .insert(method.to_string(), handler);
    }

    fn listen(&self) {
        self.listening.store(true, Ordering::SeqCst);
    }

    fn dispose(&self) {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.dispose_signal.notify_one();
        }
    }

    fn events(&self) -> Option<ConnectionEvents> {
        self.events_rx.lock().take()
    }
}

struct TransportState {
    connections: Mutex<VecDeque<Arc<MockConnection>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    connects: AtomicUsize,
}

/// Hands out the queued connections in order, then refuses.
///
/// Clones share the same queue.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<TransportState>,
}

impl MockTransport {
    pub fn new(connections: Vec<Arc<MockConnection>>) -> Self {
        Self {
            state: Arc::new(TransportState {
                connections: Mutex::new(connections.into()),
                gate: Mutex::new(None),
                connects: AtomicUsize::new(0),
            }),
        }
    }

    /// Hold `connect` until the returned gate is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.state.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for MockTransport {
    async fn connect(&self) -> Result<Arc<dyn Connection>, ConnectionError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let gate = self.state.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let next = self.state.connections.lock().pop_front();
        match next {
            Some(connection) => Ok(connection as Arc<dyn Connection>),
            None => Err(ConnectionError::Transport("connection refused".into())),
        }
    }
}

/// Contribution store that keeps entries in memory.
#[derive(Default)]
pub struct MemoryRegistry {
    entries: Arc<Mutex<Vec<(usize, ContributionsEntry)>>>,
    next: AtomicUsize,
}

struct EntryHandle {
    key: usize,
    entries: Arc<Mutex<Vec<(usize, ContributionsEntry)>>>,
}

impl Unsubscribable for EntryHandle {
    fn unsubscribe(&self) {
        self.entries.lock().retain(|(key, _)| *key != self.key);
    }
}

impl MemoryRegistry {
    pub fn live(&self) -> Vec<ContributionsEntry> {
        self.entries.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// IDs of every live action, in registration order.
    pub fn action_ids(&self) -> Vec<String> {
        self.live()
            .iter()
            .flat_map(|entry| entry.contributions.actions.iter().map(|a| a.id.clone()))
            .collect()
    }
}

impl ContributionRegistry for MemoryRegistry {
    fn register_contributions(&self, entry: ContributionsEntry) -> Box<dyn Unsubscribable> {
        let key = self.next.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().push((key, entry));
        Box::new(EntryHandle {
            key,
            entries: self.entries.clone(),
        })
    }

    fn replace_contributions(
        &self,
        existing: Box<dyn Unsubscribable>,
        entry: ContributionsEntry,
    ) -> Box<dyn Unsubscribable> {
        existing.unsubscribe();
        self.register_contributions(entry)
    }
}

const STEP_LIMIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    within(async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await;
}

/// Wait until the client reaches `state`.
pub async fn wait_for(client: &Client, state: ClientState) {
    within(client.wait_for_state(|s| s == state)).await;
}

/// Run `future`, failing the test if it takes too long.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP_LIMIT, future)
        .await
        .expect("step timed out")
}

/// Collect transitions from `rx` up to and including `Stopped`.
pub async fn transitions_until_stopped(
    mut rx: tokio::sync::broadcast::Receiver<ClientState>,
) -> Vec<ClientState> {
    within(async move {
        let mut seen = Vec::new();
        while let Ok(state) = rx.recv().await {
            seen.push(state);
            if state == ClientState::Stopped {
                break;
            }
        }
        seen
    })
    .await
}

/// A registration request for the contribution feature.
pub fn contribution_registration(id: &str, action: &str, overwrite: bool) -> Value {
    json!({
        "registrations": [{
            "id": id,
            "method": extlink::CONTRIBUTION_METHOD,
            "registerOptions": { "actions": [{ "id": action, "command": "run" }] },
            "overwriteExisting": overwrite,
        }]
    })
}
