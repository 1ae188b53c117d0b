//! Server-contributed UI entries.
//!
//! [`ContributionFeature`] is a dynamic feature that forwards each
//! registration to a [`ContributionRegistry`] owned by the host application
//! and keeps the returned handle so the registration can be withdrawn.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ClientError;
use crate::feature::{DynamicFeature, StaticFeature};
use crate::types::{
    ClientCapabilities, Contributions, DynamicRegistrationCapability, RegistrationData,
    ServerCapabilities,
};

/// Method the contribution feature is tracked under. It is not sent over the
/// wire on its own; registrations name it to target this feature.
pub const CONTRIBUTION_METHOD: &str = "window/contribution";

/// Handle that withdraws something previously registered.
pub trait Unsubscribable: Send + Sync {
    /// Withdraw the registration.
    fn unsubscribe(&self);
}

/// Contributions as stored in a [`ContributionRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionsEntry {
    /// The contributed entries.
    pub contributions: Contributions,
}

/// The host application's store of contributions.
pub trait ContributionRegistry: Send + Sync {
    /// Add an entry.
    fn register_contributions(&self, entry: ContributionsEntry) -> Box<dyn Unsubscribable>;

    /// Swap `existing` for `entry` in a single step.
    fn replace_contributions(
        &self,
        existing: Box<dyn Unsubscribable>,
        entry: ContributionsEntry,
    ) -> Box<dyn Unsubscribable>;
}

/// Dynamic feature for server-contributed actions and menus.
pub struct ContributionFeature {
    registry: Arc<dyn ContributionRegistry>,
    contributions: Mutex<HashMap<String, Box<dyn Unsubscribable>>>,
}

impl ContributionFeature {
    /// Create a feature writing into `registry`.
    pub fn new(registry: Arc<dyn ContributionRegistry>) -> Self {
        Self {
            registry,
            contributions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live registrations.
    pub fn registration_count(&self) -> usize {
        self.contributions.lock().len()
    }

    /// Whether a registration with this ID is live.
    pub fn has_registration(&self, id: &str) -> bool {
        self.contributions.lock().contains_key(id)
    }
}

impl StaticFeature for ContributionFeature {
    fn fill_client_capabilities(&self, capabilities: &mut ClientCapabilities) {
        capabilities.window_mut().contribution = Some(DynamicRegistrationCapability {
            dynamic_registration: Some(true),
        });
    }

    fn initialize(&self, capabilities: &ServerCapabilities) -> Result<(), ClientError> {
        let Some(contributions) = &capabilities.contributions else {
            return Ok(());
        };
        let register_options = serde_json::to_value(contributions)
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        self.register(
            CONTRIBUTION_METHOD,
            RegistrationData {
                id: uuid::Uuid::new_v4().to_string(),
                register_options,
                overwrite_existing: false,
            },
        )
    }
}

impl DynamicFeature for ContributionFeature {
    fn method(&self) -> &str {
        CONTRIBUTION_METHOD
    }

    fn register(&self, method: &str, data: RegistrationData) -> Result<(), ClientError> {
        let mut registered = self.contributions.lock();
        match (registered.contains_key(&data.id), data.overwrite_existing) {
            (true, false) => return Err(ClientError::DuplicateRegistration(data.id)),
            (false, true) => return Err(ClientError::NoExistingRegistration(data.id)),
            _ => {}
        }

        let contributions: Contributions = serde_json::from_value(data.register_options)
            .map_err(|e| ClientError::InvalidRegisterOptions {
                method: method.to_string(),
                message: e.to_string(),
            })?;
        let entry = ContributionsEntry { contributions };

        let subscription = match registered.remove(&data.id) {
            Some(existing) => self.registry.replace_contributions(existing, entry),
            None => self.registry.register_contributions(entry),
        };
        registered.insert(data.id, subscription);
        Ok(())
    }

    fn unregister(&self, id: &str) -> Result<(), ClientError> {
        let subscription = self
            .contributions
            .lock()
            .remove(id)
            .ok_or_else(|| ClientError::UnknownRegistration(id.to_string()))?;
        subscription.unsubscribe();
        Ok(())
    }

    fn unregister_all(&self) {
        let drained: Vec<_> = self.contributions.lock().drain().collect();
        for (_, subscription) in drained {
            subscription.unsubscribe();
        }
    }
}

impl std::fmt::Debug for ContributionFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContributionFeature")
            .field("registrations", &self.registration_count())
            .finish()
    }
}
