//! Feature registry.
//!
//! Keeps the insertion-ordered list of features registered with a client and
//! routes server registration requests to the dynamic feature owning the
//! requested method.
use crate::error::ClientError;
use crate::feature::{DynamicFeature, Feature};
use crate::types::{
    ClientCapabilities, InitializeParams, RegistrationParams, ServerCapabilities,
    UnregistrationParams,
};

/// Insertion-ordered set of static and dynamic features.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    features: Vec<Feature>,
}

impl FeatureRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered features, in registration order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Number of registered features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether no feature is registered.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Append a feature.
    ///
    /// Fails without touching the list when a dynamic feature for the same
    /// method is already registered.
    pub fn register(&mut self, feature: Feature) -> Result<(), ClientError> {
        if let Some(method) = feature.method() {
            if self.dynamic_feature(method).is_some() {
                return Err(ClientError::DuplicateFeature(method.to_string()));
            }
        }
        tracing::debug!("registered feature {:?}", feature);
        self.features.push(feature);
        Ok(())
    }

    /// The dynamic feature owning `method`.
    pub fn dynamic_feature(&self, method: &str) -> Option<&dyn DynamicFeature> {
        self.features
            .iter()
            .filter_map(Feature::as_dynamic)
            .find(|feature| feature.method() == method)
            .map(|feature| feature.as_ref())
    }

    /// Apply each registration in order, stopping at the first failure.
    ///
    /// Entries applied before the failure stay applied.
    pub fn handle_registration_request(
        &self,
        params: RegistrationParams,
    ) -> Result<(), ClientError> {
        for registration in params.registrations {
            let feature = self
                .dynamic_feature(&registration.method)
                .ok_or_else(|| ClientError::UnknownFeature(registration.method.clone()))?;
            let method = registration.method.clone();
            tracing::debug!("registering {} ({})", registration.id, method);
            feature.register(&method, registration.into())?;
        }
        Ok(())
    }

    /// Apply each unregistration in order, stopping at the first failure.
    pub fn handle_unregistration_request(
        &self,
        params: UnregistrationParams,
    ) -> Result<(), ClientError> {
        for unregistration in params.unregistrations {
            let feature = self
                .dynamic_feature(&unregistration.method)
                .ok_or_else(|| ClientError::UnknownFeature(unregistration.method.clone()))?;
            tracing::debug!(
                "unregistering {} ({})",
                unregistration.id,
                unregistration.method
            );
            feature.unregister(&unregistration.id)?;
        }
        Ok(())
    }

    /// Let every feature, in order, contribute to the initialize request.
    pub fn fill(&self, params: &mut InitializeParams) {
        for feature in &self.features {
            feature.fill_initialize_params(params);
            let mut capabilities = std::mem::take(&mut params.capabilities);
            feature.fill_client_capabilities(&mut capabilities);
            params.capabilities = capabilities;
        }
    }

    /// Hand the server's capabilities to every feature, in order.
    pub fn initialize(&self, capabilities: &ServerCapabilities) -> Result<(), ClientError> {
        for feature in &self.features {
            feature.initialize(capabilities)?;
        }
        Ok(())
    }

    /// Drop every registration held by the dynamic features.
    pub fn unregister_all(&self) {
        for feature in self.features.iter().filter_map(Feature::as_dynamic) {
            feature.unregister_all();
        }
    }

    /// Merge the capabilities of every feature into an empty set.
    pub fn client_capabilities(&self) -> ClientCapabilities {
        let mut capabilities = ClientCapabilities::default();
        for feature in &self.features {
            feature.fill_client_capabilities(&mut capabilities);
        }
        capabilities
    }
}
