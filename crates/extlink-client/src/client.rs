//! Client managing the lifecycle of a single server connection.
//!
//! Drives the connection through activation, the initialize handshake,
//! active operation and shutdown, applies the error/close policy, and routes
//! server registration requests to the feature registry.
//!
//! All transitions happen under one lock. The background driver task
//! re-checks the pending-stop flag under that lock every time it resumes from
//! an await, so a `stop()` issued while the transport is being acquired or the
//! handshake is outstanding always wins.
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio::time::timeout;

use crate::connection::{
    Connection, ConnectionEvent, ConnectionEvents, NotificationHandler, RequestHandler,
    TransportFactory,
};
use crate::error::{ClientError, ResponseError, INVALID_PARAMS};
use crate::feature::Feature;
use crate::policy::{CloseAction, DefaultErrorHandler, ErrorAction, ErrorHandler};
use crate::registry::FeatureRegistry;
use crate::types::{
    ClientInfo, InitializeParams, RegistrationParams, ServerCapabilities, UnregistrationParams,
    EXIT, INITIALIZE, INITIALIZED, REGISTER_CAPABILITY, SHUTDOWN, UNREGISTER_CAPABILITY,
};

/// Default bound on the `shutdown` request during teardown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the state transition channel.
const TRANSITION_CAPACITY: usize = 64;

/// State of the client lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Created, never activated.
    Initial,
    /// Waiting for the transport factory.
    Connecting,
    /// Connection open, initialize handshake in progress.
    Initializing,
    /// Handshake done; messages may be exchanged.
    Active,
    /// Tearing down the active connection.
    ShuttingDown,
    /// Activation never produced an active connection. Always followed by
    /// [`Stopped`](ClientState::Stopped).
    ActivateFailed,
    /// Terminal. A stopped client cannot be activated again.
    Stopped,
}

/// Decides whether to retry after the initialize request failed.
pub type InitializationFailedHandler = Arc<dyn Fn(&ClientError) -> bool + Send + Sync>;

/// Construction options for a [`Client`].
#[derive(Clone)]
pub struct ClientOptions {
    /// Produces a connection for each activation attempt.
    pub transport: Arc<dyn TransportFactory>,
    /// Reaction to transport errors and closure.
    pub error_handler: Arc<dyn ErrorHandler>,
    /// Called when the initialize request fails; `true` retries activation.
    pub initialization_failed: Option<InitializationFailedHandler>,
    /// Root URI sent in the initialize request.
    pub root_uri: Option<String>,
    /// Options sent verbatim in the initialize request.
    pub initialization_options: Option<serde_json::Value>,
    /// Bound on the `shutdown` request during teardown.
    pub shutdown_timeout: Duration,
}

impl ClientOptions {
    /// Options with the default policy and no initialization hook.
    pub fn new(transport: impl TransportFactory + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            error_handler: Arc::new(DefaultErrorHandler),
            initialization_failed: None,
            root_uri: None,
            initialization_options: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Replace the error/close policy.
    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Install the initialization-failed hook.
    pub fn with_initialization_failed(
        mut self,
        handler: impl Fn(&ClientError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.initialization_failed = Some(Arc::new(handler));
        self
    }

    /// Set the root URI.
    pub fn with_root_uri(mut self, root_uri: impl Into<String>) -> Self {
        self.root_uri = Some(root_uri.into());
        self
    }

    /// Set the initialization options.
    pub fn with_initialization_options(mut self, options: serde_json::Value) -> Self {
        self.initialization_options = Some(options);
        self
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("root_uri", &self.root_uri)
            .field("initialization_options", &self.initialization_options)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("initialization_failed", &self.initialization_failed.is_some())
            .finish_non_exhaustive()
    }
}

/// Mutable lifecycle data, guarded by one lock.
struct Shared {
    state: ClientState,
    stop_requested: bool,
    connection: Option<Arc<dyn Connection>>,
    server_capabilities: Option<ServerCapabilities>,
}

struct Inner {
    id: String,
    name: String,
    options: ClientOptions,
    shared: Mutex<Shared>,
    // Lock order: `shared` before `features`.
    features: Mutex<FeatureRegistry>,
    transitions: broadcast::Sender<ClientState>,
    wake: Notify,
}

/// Outcome of one handshake attempt.
enum Handshake {
    Established,
    Retry,
    Finished,
}

/// Outcome of supervising an active connection.
enum Supervision {
    Reconnect,
    Finished,
}

/// Client for one extension/server process.
///
/// Cheap to clone; clones share the same connection and state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Create a client in the [`Initial`](ClientState::Initial) state.
    pub fn new(id: impl Into<String>, name: impl Into<String>, options: ClientOptions) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                name: name.into(),
                options,
                shared: Mutex::new(Shared {
                    state: ClientState::Initial,
                    stop_requested: false,
                    connection: None,
                    server_capabilities: None,
                }),
                features: Mutex::new(FeatureRegistry::new()),
                transitions,
                wake: Notify::new(),
            }),
        }
    }

    /// The client ID.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The human-readable client name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The current state.
    pub fn state(&self) -> ClientState {
        self.inner.shared.lock().state
    }

    /// Capabilities from the last successful handshake.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.inner.shared.lock().server_capabilities.clone()
    }

    /// Receive every subsequent state transition, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientState> {
        self.inner.transitions.subscribe()
    }

    /// Wait until the state satisfies `predicate` and return that state.
    pub async fn wait_for_state(&self, predicate: impl Fn(ClientState) -> bool) -> ClientState {
        self.inner.wait_for_state(self.subscribe(), predicate).await
    }

    /// Snapshot of the registered features, in registration order.
    pub fn features(&self) -> Vec<Feature> {
        self.inner.features.lock().features().to_vec()
    }

    /// Register a static or dynamic feature.
    ///
    /// # Errors
    ///
    /// [`ClientError::DuplicateFeature`] when a dynamic feature for the same
    /// method is already registered; the feature list is left unchanged.
    pub fn register_feature(&self, feature: Feature) -> Result<(), ClientError> {
        self.inner.features.lock().register(feature)
    }

    /// Route server registrations to their dynamic features.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownFeature`] for a method with no dynamic feature,
    /// or whatever the feature's `register` returns. Processing stops at the
    /// first failure.
    pub fn handle_registration_request(
        &self,
        params: RegistrationParams,
    ) -> Result<(), ClientError> {
        self.inner
            .features
            .lock()
            .handle_registration_request(params)
    }

    /// Route server unregistrations to their dynamic features.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownFeature`] for a method with no dynamic feature,
    /// or whatever the feature's `unregister` returns.
    pub fn handle_unregistration_request(
        &self,
        params: UnregistrationParams,
    ) -> Result<(), ClientError> {
        self.inner
            .features
            .lock()
            .handle_unregistration_request(params)
    }

    /// Start connecting. Only has an effect in the
    /// [`Initial`](ClientState::Initial) state.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn activate(&self) {
        {
            let mut shared = self.inner.shared.lock();
            if shared.state != ClientState::Initial {
                tracing::debug!(
                    "client {}: activate ignored in state {:?}",
                    self.inner.id,
                    shared.state
                );
                return;
            }
            self.inner.transition(&mut shared, ClientState::Connecting);
        }
        tokio::spawn(Arc::clone(&self.inner).run());
    }

    /// Activate and wait until the attempt settles in
    /// [`Active`](ClientState::Active) or [`Stopped`](ClientState::Stopped).
    pub async fn activate_and_wait(&self) -> ClientState {
        let transitions = self.subscribe();
        self.activate();
        self.inner
            .wait_for_state(transitions, |state| {
                matches!(state, ClientState::Active | ClientState::Stopped)
            })
            .await
    }

    /// Stop the client.
    ///
    /// The state change is applied before this returns: from `Initial`,
    /// `Connecting` or `Initializing` the client is `Stopped` immediately and
    /// any in-flight activation is discarded when it completes. From `Active`
    /// the client enters `ShuttingDown` and the returned future resolves once
    /// the connection is torn down and the client is `Stopped`.
    pub fn stop(&self) -> impl Future<Output = ()> + Send + 'static {
        let transitions = self.subscribe();
        {
            let mut shared = self.inner.shared.lock();
            shared.stop_requested = true;
            match shared.state {
                ClientState::Initial
                | ClientState::Connecting
                | ClientState::Initializing
                | ClientState::ActivateFailed => {
                    if let Some(connection) = shared.connection.take() {
                        connection.dispose();
                    }
                    self.inner.transition(&mut shared, ClientState::Stopped);
                }
                ClientState::Active => {
                    self.inner.transition(&mut shared, ClientState::ShuttingDown);
                    self.inner.wake.notify_one();
                }
                ClientState::ShuttingDown | ClientState::Stopped => {}
            }
        }
        let inner = Arc::clone(&self.inner);
        async move {
            inner
                .wait_for_state(transitions, |state| state == ClientState::Stopped)
                .await;
        }
    }

    /// Send a request over the active connection.
    ///
    /// # Errors
    ///
    /// [`ClientError::InactiveConnection`] unless the client is active, or
    /// the connection's error.
    pub async fn send_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let connection = self.inner.active_connection()?;
        Ok(connection.send_request(method, params).await?)
    }

    /// Send a notification over the active connection.
    ///
    /// # Errors
    ///
    /// [`ClientError::InactiveConnection`] unless the client is active, or
    /// the connection's error.
    pub async fn send_notification(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<(), ClientError> {
        let connection = self.inner.active_connection()?;
        Ok(connection.send_notification(method, params).await?)
    }

    /// Handle server requests with this method on the active connection.
    ///
    /// # Errors
    ///
    /// [`ClientError::InactiveConnection`] unless the client is active.
    pub fn on_request(&self, method: &str, handler: RequestHandler) -> Result<(), ClientError> {
        self.inner.active_connection()?.on_request(method, handler);
        Ok(())
    }

    /// Handle server notifications with this method on the active connection.
    ///
    /// # Errors
    ///
    /// [`ClientError::InactiveConnection`] unless the client is active.
    pub fn on_notification(
        &self,
        method: &str,
        handler: NotificationHandler,
    ) -> Result<(), ClientError> {
        self.inner
            .active_connection()?
            .on_notification(method, handler);
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("features", &self.inner.features.lock().len())
            .finish()
    }
}

impl Inner {
    fn transition(&self, shared: &mut Shared, next: ClientState) {
        if shared.state == next {
            return;
        }
        tracing::debug!("client {}: {:?} -> {:?}", self.id, shared.state, next);
        shared.state = next;
        // No receivers is fine.
        let _ = self.transitions.send(next);
    }

    async fn wait_for_state(
        &self,
        mut transitions: broadcast::Receiver<ClientState>,
        predicate: impl Fn(ClientState) -> bool,
    ) -> ClientState {
        loop {
            let current = self.shared.lock().state;
            if predicate(current) {
                return current;
            }
            match transitions.recv().await {
                Ok(state) if predicate(state) => return state,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                // The sender lives as long as `self`.
                Err(broadcast::error::RecvError::Closed) => return self.shared.lock().state,
            }
        }
    }

    fn active_connection(&self) -> Result<Arc<dyn Connection>, ClientError> {
        let shared = self.shared.lock();
        match (&shared.connection, shared.state) {
            (Some(connection), ClientState::Active) => Ok(Arc::clone(connection)),
            (_, state) => Err(ClientError::InactiveConnection(state)),
        }
    }

    /// Activation loop. Each iteration acquires one connection; reconnects
    /// loop instead of recursing.
    async fn run(self: Arc<Self>) {
        loop {
            let connection = match self.options.transport.connect().await {
                Ok(connection) => connection,
                Err(err) => {
                    self.activation_failed(ClientError::Activation(err.to_string()));
                    return;
                }
            };
            if !self.begin_initializing(&connection) {
                connection.dispose();
                return;
            }
            let events = connection.events();
            connection.listen();

            match self.handshake(&connection).await {
                Handshake::Established => {}
                Handshake::Retry => continue,
                Handshake::Finished => return,
            }

            match self.supervise(connection, events).await {
                Supervision::Reconnect => continue,
                Supervision::Finished => return,
            }
        }
    }

    fn activation_failed(&self, err: ClientError) {
        let mut shared = self.shared.lock();
        if shared.stop_requested || shared.state == ClientState::Stopped {
            tracing::debug!("client {}: discarding activation failure: {}", self.id, err);
            self.transition(&mut shared, ClientState::Stopped);
            return;
        }
        tracing::warn!("client {}: {}", self.id, err);
        if let Some(connection) = shared.connection.take() {
            connection.dispose();
        }
        self.transition(&mut shared, ClientState::ActivateFailed);
        self.transition(&mut shared, ClientState::Stopped);
    }

    fn begin_initializing(&self, connection: &Arc<dyn Connection>) -> bool {
        let mut shared = self.shared.lock();
        if shared.stop_requested || shared.state != ClientState::Connecting {
            tracing::debug!("client {}: discarding connection after stop", self.id);
            return false;
        }
        shared.connection = Some(Arc::clone(connection));
        self.transition(&mut shared, ClientState::Initializing);
        true
    }

    fn initialize_params(&self) -> InitializeParams {
        let mut params = InitializeParams {
            process_id: Some(std::process::id()),
            client_info: Some(ClientInfo {
                name: self.name.clone(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            root_uri: self.options.root_uri.clone(),
            initialization_options: self.options.initialization_options.clone(),
            ..InitializeParams::default()
        };
        self.features.lock().fill(&mut params);
        params
    }

    async fn handshake(self: &Arc<Self>, connection: &Arc<dyn Connection>) -> Handshake {
        let result = match serde_json::to_value(self.initialize_params()) {
            Ok(params) => connection
                .send_request(INITIALIZE, params)
                .await
                .map_err(ClientError::from)
                .and_then(|result| {
                    ServerCapabilities::from_initialize_response(result)
                        .map_err(|e| ClientError::Serialization(e.to_string()))
                }),
            Err(e) => Err(ClientError::Serialization(e.to_string())),
        };

        let capabilities = match result {
            Ok(capabilities) => capabilities,
            Err(err) => return self.initialization_failed(connection, err),
        };

        {
            let mut shared = self.shared.lock();
            if shared.stop_requested || shared.state != ClientState::Initializing {
                tracing::debug!("client {}: discarding late initialize response", self.id);
                drop(shared);
                connection.dispose();
                return Handshake::Finished;
            }
            let features = self.features.lock();
            if let Err(err) = features.initialize(&capabilities) {
                features.unregister_all();
                drop(features);
                tracing::warn!("client {}: feature initialization failed: {}", self.id, err);
                shared.connection = None;
                connection.dispose();
                self.transition(&mut shared, ClientState::ActivateFailed);
                self.transition(&mut shared, ClientState::Stopped);
                return Handshake::Finished;
            }
            drop(features);
            self.install_handlers(connection);
            shared.server_capabilities = Some(capabilities);
            self.transition(&mut shared, ClientState::Active);
        }

        tracing::info!("client {}: connection active", self.id);
        if let Err(err) = connection
            .send_notification(INITIALIZED, serde_json::json!({}))
            .await
        {
            tracing::warn!("client {}: initialized notification failed: {}", self.id, err);
        }
        Handshake::Established
    }

    fn initialization_failed(&self, connection: &Arc<dyn Connection>, err: ClientError) -> Handshake {
        if self.shared.lock().stop_requested {
            connection.dispose();
            return Handshake::Finished;
        }
        tracing::warn!("client {}: initialize request failed: {}", self.id, err);
        let retry = self
            .options
            .initialization_failed
            .as_ref()
            .is_some_and(|handler| handler(&err));

        let mut shared = self.shared.lock();
        shared.connection = None;
        connection.dispose();
        if shared.stop_requested || shared.state != ClientState::Initializing {
            return Handshake::Finished;
        }
        if retry {
            tracing::info!("client {}: retrying activation", self.id);
            self.transition(&mut shared, ClientState::Connecting);
            return Handshake::Retry;
        }
        self.transition(&mut shared, ClientState::ActivateFailed);
        self.transition(&mut shared, ClientState::Stopped);
        Handshake::Finished
    }

    fn install_handlers(self: &Arc<Self>, connection: &Arc<dyn Connection>) {
        let weak = Arc::downgrade(self);
        let origin = Arc::downgrade(connection);
        connection.on_request(
            REGISTER_CAPABILITY,
            Box::new(move |params: serde_json::Value| {
                let params: RegistrationParams = serde_json::from_value(params)
                    .map_err(|e| ResponseError::new(INVALID_PARAMS, e.to_string()))?;
                dispatch(&weak, &origin, REGISTER_CAPABILITY, |features| {
                    features.handle_registration_request(params)
                })
            }),
        );

        let weak = Arc::downgrade(self);
        let origin = Arc::downgrade(connection);
        connection.on_request(
            UNREGISTER_CAPABILITY,
            Box::new(move |params: serde_json::Value| {
                let params: UnregistrationParams = serde_json::from_value(params)
                    .map_err(|e| ResponseError::new(INVALID_PARAMS, e.to_string()))?;
                dispatch(&weak, &origin, UNREGISTER_CAPABILITY, |features| {
                    features.handle_unregistration_request(params)
                })
            }),
        );
    }

    async fn supervise(
        &self,
        connection: Arc<dyn Connection>,
        events: Option<ConnectionEvents>,
    ) -> Supervision {
        let Some(mut events) = events else {
            tracing::warn!("client {}: connection has no event stream", self.id);
            self.wake.notified().await;
            self.shut_down(&connection).await;
            return Supervision::Finished;
        };

        loop {
            let event = tokio::select! {
                () = self.wake.notified() => {
                    self.shut_down(&connection).await;
                    return Supervision::Finished;
                }
                event = events.recv() => event,
            };

            let state = self.shared.lock().state;
            if state != ClientState::Active {
                self.shut_down(&connection).await;
                return Supervision::Finished;
            }

            match event {
                Some(ConnectionEvent::Error {
                    error,
                    message,
                    count,
                }) => {
                    let action = self
                        .options
                        .error_handler
                        .error(&error, message.as_ref(), count);
                    tracing::debug!("client {}: transport error {} -> {:?}", self.id, error, action);
                    if action == ErrorAction::ShutDown && self.begin_shutdown() {
                        tracing::warn!("client {}: shutting down after transport error", self.id);
                        self.shut_down(&connection).await;
                        return Supervision::Finished;
                    }
                }
                Some(ConnectionEvent::Closed) | None => {
                    let action = self.options.error_handler.closed();
                    tracing::info!("client {}: connection closed -> {:?}", self.id, action);
                    return self.connection_closed(&connection, action);
                }
            }
        }
    }

    fn begin_shutdown(&self) -> bool {
        let mut shared = self.shared.lock();
        if shared.state != ClientState::Active {
            return false;
        }
        self.transition(&mut shared, ClientState::ShuttingDown);
        true
    }

    /// Polite teardown: `shutdown`, `exit`, dispose, unregister, Stopped.
    async fn shut_down(&self, connection: &Arc<dyn Connection>) {
        match timeout(
            self.options.shutdown_timeout,
            connection.send_request(SHUTDOWN, serde_json::Value::Null),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::debug!("client {}: shutdown request failed: {}", self.id, err),
            Err(_) => tracing::debug!(
                "client {}: shutdown request timed out after {:?}",
                self.id,
                self.options.shutdown_timeout
            ),
        }
        if let Err(err) = connection
            .send_notification(EXIT, serde_json::Value::Null)
            .await
        {
            tracing::debug!("client {}: exit notification failed: {}", self.id, err);
        }
        self.release(connection, ClientState::Stopped);
    }

    fn connection_closed(&self, connection: &Arc<dyn Connection>, action: CloseAction) -> Supervision {
        let next = {
            let shared = self.shared.lock();
            if shared.stop_requested || shared.state != ClientState::Active {
                ClientState::Stopped
            } else {
                match action {
                    CloseAction::Reconnect => ClientState::Connecting,
                    CloseAction::DoNotReconnect => ClientState::Stopped,
                }
            }
        };
        self.release(connection, next);
        match next {
            ClientState::Connecting => Supervision::Reconnect,
            _ => Supervision::Finished,
        }
    }

    /// Drop the connection and every dynamic registration, then enter `next`.
    fn release(&self, connection: &Arc<dyn Connection>, next: ClientState) {
        let mut shared = self.shared.lock();
        shared.connection = None;
        shared.server_capabilities = None;
        connection.dispose();
        self.features.lock().unregister_all();
        let next = if shared.stop_requested {
            ClientState::Stopped
        } else {
            next
        };
        self.transition(&mut shared, next);
    }
}

/// Apply a server (un)registration request if the client is still active
/// on the connection it arrived on.
fn dispatch(
    inner: &Weak<Inner>,
    origin: &Weak<dyn Connection>,
    method: &str,
    apply: impl FnOnce(&FeatureRegistry) -> Result<(), ClientError>,
) -> Result<serde_json::Value, ResponseError> {
    let Some(inner) = inner.upgrade() else {
        tracing::warn!("dropping {}: client is gone", method);
        return Ok(serde_json::Value::Null);
    };
    let shared = inner.shared.lock();
    if shared.state != ClientState::Active {
        tracing::warn!(
            "client {}: dropping {} received in state {:?}",
            inner.id,
            method,
            shared.state
        );
        return Ok(serde_json::Value::Null);
    }
    let current = shared
        .connection
        .as_ref()
        .is_some_and(|connection| same_connection(connection, origin));
    if !current {
        tracing::warn!(
            "client {}: dropping {} from a stale connection",
            inner.id,
            method
        );
        return Ok(serde_json::Value::Null);
    }
    let features = inner.features.lock();
    drop(shared);
    let result = apply(&features);
    drop(features);
    result
        .map(|()| serde_json::Value::Null)
        .map_err(ResponseError::from)
}

/// Compares data pointers only; vtables of the same type may differ.
fn same_connection(connection: &Arc<dyn Connection>, origin: &Weak<dyn Connection>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(connection).cast::<()>(),
        origin.as_ptr().cast::<()>(),
    )
}
