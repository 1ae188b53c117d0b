//! Client error types.
use crate::client::ClientState;

/// JSON-RPC error code for malformed params.
pub const INVALID_PARAMS: i32 = -32602;

/// JSON-RPC error code for failures inside a request handler.
pub const INTERNAL_ERROR: i32 = -32603;

/// Errors from client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A dynamic feature already owns this method.
    #[error("dynamic feature already registered for method: {0}")]
    DuplicateFeature(String),

    /// A registration with this ID already exists and overwrite was not requested.
    #[error("registration already exists with ID: {0}")]
    DuplicateRegistration(String),

    /// No dynamic feature owns this method.
    #[error("no dynamic feature registered for method: {0}")]
    UnknownFeature(String),

    /// No registration exists with this ID.
    #[error("no registration with ID: {0}")]
    UnknownRegistration(String),

    /// Overwrite was requested but there is nothing to overwrite.
    #[error("no existing registration to overwrite with ID: {0}")]
    NoExistingRegistration(String),

    /// Messages can only be exchanged while the client is active.
    #[error("connection is not active (state: {0:?})")]
    InactiveConnection(ClientState),

    /// Transport acquisition or the initialize handshake failed.
    #[error("activation failed: {0}")]
    Activation(String),

    /// Registration options could not be decoded.
    #[error("invalid register options for {method}: {message}")]
    InvalidRegisterOptions {
        /// The method the options were sent for.
        method: String,
        /// The decoding failure.
        message: String,
    },

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Error reported by the underlying connection.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Errors reported by a [`Connection`](crate::connection::Connection).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// JSON-RPC error returned by the server.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// The error code.
        code: i32,
        /// The error message.
        message: String,
    },

    /// The connection has been disposed.
    #[error("connection disposed")]
    Disposed,

    /// The connection was closed by the remote end.
    #[error("connection closed")]
    Closed,

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Error payload returned to the server when a server-issued request fails.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResponseError {
    /// The error code.
    pub code: i32,
    /// The error message.
    pub message: String,
}

impl ResponseError {
    /// Create a response error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ClientError> for ResponseError {
    fn from(err: ClientError) -> Self {
        let code = match err {
            ClientError::InvalidRegisterOptions { .. } | ClientError::Serialization(_) => {
                INVALID_PARAMS
            }
            _ => INTERNAL_ERROR,
        };
        Self::new(code, err.to_string())
    }
}
