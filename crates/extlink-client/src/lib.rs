//! extlink-client: lifecycle engine for extension/server connections.
//!
//! This crate drives a JSON-RPC connection through activation, the
//! initialize handshake, active operation and shutdown. It negotiates
//! capabilities through registered features, routes server registration
//! requests to dynamic features and applies a pluggable error/close policy.
pub mod client;
pub mod connection;
pub mod contribution;
pub mod error;
pub mod feature;
pub mod policy;
pub mod registry;
pub mod types;

// Re-export key types for convenience.
pub use client::{Client, ClientOptions, ClientState, DEFAULT_SHUTDOWN_TIMEOUT};
pub use connection::{
    Connection, ConnectionEvent, ConnectionEvents, NotificationHandler, RequestHandler,
    TransportFactory,
};
pub use contribution::{
    ContributionFeature, ContributionRegistry, ContributionsEntry, Unsubscribable,
    CONTRIBUTION_METHOD,
};
pub use error::{ClientError, ConnectionError, ResponseError};
pub use feature::{DynamicFeature, Feature, StaticFeature};
pub use policy::{
    CallbackErrorHandler, CloseAction, DefaultErrorHandler, ErrorAction, ErrorHandler,
    RestartLimitErrorHandler,
};
pub use registry::FeatureRegistry;
pub use types::{
    ClientCapabilities, Contributions, InitializeParams, Registration, RegistrationData,
    RegistrationParams, ServerCapabilities, Unregistration, UnregistrationParams,
};
