//! The feature model.
//!
//! A feature contributes to capability negotiation and, when dynamic, owns one
//! protocol method whose registrations the server can add and remove while the
//! connection is alive.
use std::sync::Arc;

use crate::error::ClientError;
use crate::types::{ClientCapabilities, InitializeParams, RegistrationData, ServerCapabilities};

/// A feature that only takes part in the initialize handshake.
///
/// Callbacks run while the client holds its internal lock and must not call
/// back into the [`Client`](crate::Client).
pub trait StaticFeature: Send + Sync {
    /// Add feature-specific data to the initialize params.
    fn fill_initialize_params(&self, _params: &mut InitializeParams) {}

    /// Add the capabilities this feature supports.
    fn fill_client_capabilities(&self, _capabilities: &mut ClientCapabilities) {}

    /// Called with the server's capabilities once the handshake succeeds.
    fn initialize(&self, capabilities: &ServerCapabilities) -> Result<(), ClientError>;
}

/// A feature whose registrations come and go at runtime.
pub trait DynamicFeature: StaticFeature {
    /// The protocol method this feature owns.
    fn method(&self) -> &str;

    /// Apply a registration. The feature enforces duplicate-ID and
    /// overwrite semantics.
    fn register(&self, method: &str, data: RegistrationData) -> Result<(), ClientError>;

    /// Remove the registration with this ID.
    fn unregister(&self, id: &str) -> Result<(), ClientError>;

    /// Remove every registration. Never fails.
    fn unregister_all(&self);
}

/// A feature registered with a client.
#[derive(Clone)]
pub enum Feature {
    /// Contributes to the handshake only.
    Static(Arc<dyn StaticFeature>),
    /// Also accepts runtime (un)registration.
    Dynamic(Arc<dyn DynamicFeature>),
}

impl Feature {
    /// Wrap a static feature.
    pub fn from_static(feature: impl StaticFeature + 'static) -> Self {
        Self::Static(Arc::new(feature))
    }

    /// Wrap a dynamic feature.
    pub fn from_dynamic(feature: impl DynamicFeature + 'static) -> Self {
        Self::Dynamic(Arc::new(feature))
    }

    /// The owned method, for dynamic features.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Static(_) => None,
            Self::Dynamic(feature) => Some(feature.method()),
        }
    }

    /// The dynamic half of this feature, if any.
    pub fn as_dynamic(&self) -> Option<&Arc<dyn DynamicFeature>> {
        match self {
            Self::Static(_) => None,
            Self::Dynamic(feature) => Some(feature),
        }
    }

    /// Whether both handles point at the same feature object.
    pub fn ptr_eq(&self, other: &Feature) -> bool {
        match (self, other) {
            (Self::Static(a), Self::Static(b)) => Arc::ptr_eq(a, b),
            (Self::Dynamic(a), Self::Dynamic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn fill_initialize_params(&self, params: &mut InitializeParams) {
        match self {
            Self::Static(feature) => feature.fill_initialize_params(params),
            Self::Dynamic(feature) => feature.fill_initialize_params(params),
        }
    }

    pub(crate) fn fill_client_capabilities(&self, capabilities: &mut ClientCapabilities) {
        match self {
            Self::Static(feature) => feature.fill_client_capabilities(capabilities),
            Self::Dynamic(feature) => feature.fill_client_capabilities(capabilities),
        }
    }

    pub(crate) fn initialize(&self, capabilities: &ServerCapabilities) -> Result<(), ClientError> {
        match self {
            Self::Static(feature) => feature.initialize(capabilities),
            Self::Dynamic(feature) => feature.initialize(capabilities),
        }
    }
}

impl std::fmt::Debug for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Feature::Static"),
            Self::Dynamic(feature) => write!(f, "Feature::Dynamic({})", feature.method()),
        }
    }
}
