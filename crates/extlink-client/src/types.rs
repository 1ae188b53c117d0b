//! Protocol types exchanged during the handshake and capability registration.
//!
//! Only the messages the lifecycle engine itself produces or consumes are
//! modelled here. Feature payloads stay opaque (`serde_json::Value`) until the
//! owning feature decodes them.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Method name of the initialize request.
pub const INITIALIZE: &str = "initialize";
/// Method name of the notification sent once the handshake completes.
pub const INITIALIZED: &str = "initialized";
/// Method name of the shutdown request.
pub const SHUTDOWN: &str = "shutdown";
/// Method name of the exit notification.
pub const EXIT: &str = "exit";
/// Server-to-client request adding dynamic registrations.
pub const REGISTER_CAPABILITY: &str = "client/registerCapability";
/// Server-to-client request removing dynamic registrations.
pub const UNREGISTER_CAPABILITY: &str = "client/unregisterCapability";

/// Name and version the client reports in the initialize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// The client's name.
    pub name: String,
    /// The client's version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Params of the `initialize` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Process ID of the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    /// Information about the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
    /// Root URI of the workspace, `null` when there is none.
    pub root_uri: Option<String>,
    /// Capabilities merged from every registered feature.
    pub capabilities: ClientCapabilities,
    /// Options passed through to the server verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<serde_json::Value>,
}

/// Capabilities advertised by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Window-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowClientCapabilities>,
    /// Experimental capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<serde_json::Value>,
}

impl ClientCapabilities {
    /// Window capabilities, inserting an empty section if absent.
    pub fn window_mut(&mut self) -> &mut WindowClientCapabilities {
        self.window.get_or_insert_with(WindowClientCapabilities::default)
    }
}

/// Window-related client capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowClientCapabilities {
    /// Support for server-contributed UI entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution: Option<DynamicRegistrationCapability>,
}

/// Marks a capability as supporting dynamic registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicRegistrationCapability {
    /// Whether the capability can be registered at runtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_registration: Option<bool>,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Capabilities declared by the server.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

/// Capabilities declared by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Contributions the server offers without an explicit registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributions: Option<Contributions>,
    /// Capabilities not interpreted by the client core.
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl ServerCapabilities {
    /// Decode the capabilities from an `initialize` response.
    ///
    /// A `null` result or a result without a `capabilities` member yields
    /// empty capabilities.
    pub fn from_initialize_response(result: serde_json::Value) -> Result<Self, serde_json::Error> {
        if result.is_null() {
            return Ok(Self::default());
        }
        let parsed: InitializeResult = serde_json::from_value(result)?;
        Ok(parsed.capabilities)
    }
}

/// User-facing entries contributed by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributions {
    /// Actions the client may invoke.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionContribution>,
    /// Menu items keyed by menu ID.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub menus: BTreeMap<String, Vec<MenuItemContribution>>,
}

/// A single contributed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionContribution {
    /// Unique action ID.
    pub id: String,
    /// Command executed when the action runs.
    pub command: String,
    /// Arguments passed to the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command_arguments: Vec<serde_json::Value>,
    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A menu entry referring to an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemContribution {
    /// ID of the action to show.
    pub action: String,
    /// Expression deciding visibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

/// A registration entry sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Registration ID, used to unregister later.
    pub id: String,
    /// Method the registration is for.
    pub method: String,
    /// Feature-specific options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_options: Option<serde_json::Value>,
    /// Replace an existing registration with the same ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_existing: Option<bool>,
}

/// Params of `client/registerCapability`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationParams {
    /// Registrations to apply, in order.
    pub registrations: Vec<Registration>,
}

/// An unregistration entry sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unregistration {
    /// ID of the registration to remove.
    pub id: String,
    /// Method the registration was for.
    pub method: String,
}

/// Params of `client/unregisterCapability`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregistrationParams {
    /// Unregistrations to apply, in order. The wire name keeps the
    /// protocol's historical spelling.
    #[serde(rename = "unregisterations")]
    pub unregistrations: Vec<Unregistration>,
}

/// The part of a registration handed to the owning feature.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationData<T = serde_json::Value> {
    /// Registration ID.
    pub id: String,
    /// Feature-specific options.
    pub register_options: T,
    /// Replace an existing registration with the same ID.
    pub overwrite_existing: bool,
}

impl From<Registration> for RegistrationData {
    fn from(registration: Registration) -> Self {
        Self {
            id: registration.id,
            register_options: registration
                .register_options
                .unwrap_or(serde_json::Value::Null),
            overwrite_existing: registration.overwrite_existing.unwrap_or(false),
        }
    }
}
