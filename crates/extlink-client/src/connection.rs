//! Boundary to the message transport.
//!
//! JSON-RPC framing and dispatch live outside this crate. The client only sees
//! an opaque [`Connection`] produced by a caller-supplied [`TransportFactory`].
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ConnectionError, ResponseError};

/// Handler for requests sent by the server.
pub type RequestHandler =
    Box<dyn Fn(serde_json::Value) -> Result<serde_json::Value, ResponseError> + Send + Sync>;

/// Handler for notifications sent by the server.
pub type NotificationHandler = Box<dyn Fn(serde_json::Value) + Send + Sync>;

/// Stream of lifecycle events for one connection.
pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Error and close signals raised by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The transport reported an error.
    Error {
        /// The reported error.
        error: ConnectionError,
        /// The message being processed when the error occurred, if any.
        message: Option<serde_json::Value>,
        /// Number of errors seen on this connection so far.
        count: Option<u32>,
    },
    /// The transport closed, normally or not.
    Closed,
}

/// A live JSON-RPC connection to the server.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send a request and wait for its result.
    async fn send_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ConnectionError>;

    /// Send a notification (no response expected).
    async fn send_notification(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<(), ConnectionError>;

    /// Install the handler for server requests with this method.
    fn on_request(&self, method: &str, handler: RequestHandler);

    /// Install the handler for server notifications with this method.
    fn on_notification(&self, method: &str, handler: NotificationHandler);

    /// Start reading messages from the transport.
    fn listen(&self);

    /// Release the transport. Must be idempotent.
    fn dispose(&self);

    /// Take the error/close event stream.
    ///
    /// The client calls this exactly once per connection. Later calls may
    /// return `None`.
    fn events(&self) -> Option<ConnectionEvents>;
}

/// Produces a fresh connection for each activation attempt.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> Result<Arc<dyn Connection>, ConnectionError>;
}

#[async_trait]
impl<F, Fut> TransportFactory for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Arc<dyn Connection>, ConnectionError>> + Send + 'static,
{
    async fn connect(&self) -> Result<Arc<dyn Connection>, ConnectionError> {
        (self)().await
    }
}
