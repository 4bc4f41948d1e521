//! Capability model: descriptors, the uniform invocation trait, and the
//! registry of everything the deployment could expose.
//!
//! A capability is data ([`CapabilityDescriptor`]) plus one seam
//! ([`Capability::invoke`]). Category is a plain enumeration used for
//! grouping and routing, never for behavior branching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use switchyard_types::{ConversationId, TurnId};

// ─────────────────────────────────────────────────────────────────────────────
// Category
// ─────────────────────────────────────────────────────────────────────────────

/// The domain a capability belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityCategory {
    /// Search over the private document corpus.
    Documents,
    /// External structured-data lookups (registries, filings, feeds).
    ExternalData,
    /// Pure computation (calculators, converters).
    Computation,
    /// Live web access.
    Web,
    /// Housekeeping helpers.
    Utility,
}

impl CapabilityCategory {
    /// All categories, in routing-display order.
    pub const ALL: [CapabilityCategory; 5] = [
        CapabilityCategory::Documents,
        CapabilityCategory::ExternalData,
        CapabilityCategory::Computation,
        CapabilityCategory::Web,
        CapabilityCategory::Utility,
    ];
}

impl std::fmt::Display for CapabilityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Documents => "documents",
            Self::ExternalData => "external_data",
            Self::Computation => "computation",
            Self::Web => "web",
            Self::Utility => "utility",
        };
        write!(f, "{s}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Declared shape of one capability parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// JSON type name: "string", "number", "integer", "boolean", "array",
    /// "object".
    #[serde(rename = "type")]
    pub param_type: String,
    /// Whether the parameter must be supplied.
    pub required: bool,
    /// Description shown to the planner.
    pub description: String,
}

impl ParameterSpec {
    /// A required parameter.
    pub fn required(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            required: true,
            description: description.into(),
        }
    }

    /// An optional parameter.
    pub fn optional(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            required: false,
            description: description.into(),
        }
    }
}

/// Check a JSON value against a declared parameter type.
fn matches_type(value: &serde_json::Value, param_type: &str) -> bool {
    match param_type {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        // Unknown declared type: accept anything rather than reject.
        _ => true,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable description of one capability.
///
/// The descriptor is everything the router and planner know about a
/// capability: what it does, which category it belongs to, what arguments
/// it takes, and which backing services must be alive for it to work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique capability name.
    pub name: String,
    /// Description used for routing and planner prompting.
    pub description: String,
    /// Domain category.
    pub category: CapabilityCategory,
    /// Declared parameters, keyed by name. BTreeMap keeps schema output
    /// deterministic.
    pub parameters: BTreeMap<String, ParameterSpec>,
    /// Backing-service ids that must all probe available.
    pub required_services: Vec<String>,
    /// Tie-break priority within a category, higher first.
    pub priority: i32,
}

impl CapabilityDescriptor {
    /// Create a descriptor with no parameters, no required services, and
    /// priority 0.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: CapabilityCategory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            parameters: BTreeMap::new(),
            required_services: Vec::new(),
            priority: 0,
        }
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    /// Add a required backing service.
    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.required_services.push(service_id.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Render the parameter schema as a JSON-Schema-shaped object, the form
    /// completion backends expect for tool definitions.
    pub fn input_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for (name, spec) in &self.parameters {
            properties.insert(
                name.clone(),
                serde_json::json!({
                    "type": spec.param_type,
                    "description": spec.description,
                }),
            );
            if spec.required {
                required.push(serde_json::Value::String(name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validate planner-supplied arguments against the declared schema.
    ///
    /// Checks that every required parameter is present and every supplied
    /// parameter has the declared type. Unknown extra parameters are
    /// rejected so the planner learns the exact schema.
    pub fn validate_arguments(&self, arguments: &serde_json::Value) -> std::result::Result<(), String> {
        let Some(object) = arguments.as_object() else {
            return Err("arguments must be a JSON object".to_string());
        };

        for (name, spec) in &self.parameters {
            match object.get(name) {
                Some(value) => {
                    if !matches_type(value, &spec.param_type) {
                        return Err(format!(
                            "parameter '{}' must be of type {}",
                            name, spec.param_type
                        ));
                    }
                }
                None if spec.required => {
                    return Err(format!(
                        "missing required parameter '{}': {}",
                        name, spec.description
                    ));
                }
                None => {}
            }
        }

        for name in object.keys() {
            if !self.parameters.contains_key(name) {
                return Err(format!("unknown parameter '{}'", name));
            }
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Invocation Seam
// ─────────────────────────────────────────────────────────────────────────────

/// A capability invocation that failed inside the collaborator.
///
/// Never propagated as a turn error; the execution loop records it and
/// lets the planner react.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CapabilityFailure {
    /// What went wrong, phrased for the planner.
    pub message: String,
}

impl CapabilityFailure {
    /// Create a failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Context passed into every invocation.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Conversation the invocation belongs to.
    pub conversation_id: ConversationId,
    /// Turn the invocation belongs to.
    pub turn_id: TurnId,
    /// Token for cooperative cancellation.
    pub cancellation: CancellationToken,
}

impl InvocationContext {
    /// Create a context with a fresh cancellation token.
    pub fn new(conversation_id: ConversationId, turn_id: TurnId) -> Self {
        Self {
            conversation_id,
            turn_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Create a context carrying an existing cancellation token.
    pub fn with_cancellation(
        conversation_id: ConversationId,
        turn_id: TurnId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            conversation_id,
            turn_id,
            cancellation,
        }
    }

    /// Whether the turn has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Trait for callable capabilities.
///
/// Implementations wrap an external API client. The core treats every
/// capability uniformly: JSON arguments in, JSON payload or a typed
/// failure out.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The descriptor for this capability.
    fn descriptor(&self) -> &CapabilityDescriptor;

    /// Invoke the capability with validated arguments.
    async fn invoke(
        &self,
        arguments: serde_json::Value,
        ctx: &InvocationContext,
    ) -> std::result::Result<serde_json::Value, CapabilityFailure>;
}

/// A capability that can be shared across turns.
pub type SharedCapability = Arc<dyn Capability>;

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the deployment could expose, before availability filtering.
///
/// The registry is static configuration; the [`CapabilityCatalog`] is the
/// per-window filtered view built from it.
///
/// [`CapabilityCatalog`]: crate::catalog::CapabilityCatalog
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, SharedCapability>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. Replaces any existing entry with the same name.
    pub fn register<C: Capability + 'static>(&mut self, capability: C) {
        let name = capability.descriptor().name.clone();
        self.capabilities.insert(name, Arc::new(capability));
    }

    /// Register a capability from an Arc.
    pub fn register_arc(&mut self, capability: SharedCapability) {
        let name = capability.descriptor().name.clone();
        self.capabilities.insert(name, capability);
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<SharedCapability> {
        self.capabilities.get(name).cloned()
    }

    /// All registered capabilities, unordered.
    pub fn all(&self) -> Vec<SharedCapability> {
        self.capabilities.values().cloned().collect()
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Capability (for testing)
// ─────────────────────────────────────────────────────────────────────────────

/// A mock capability for testing.
///
/// Returns a configured payload or failure and records every invocation.
#[cfg(test)]
#[derive(Debug)]
pub struct MockCapability {
    descriptor: CapabilityDescriptor,
    response: std::sync::Mutex<std::result::Result<serde_json::Value, CapabilityFailure>>,
    delay: Option<std::time::Duration>,
    calls: std::sync::Mutex<Vec<serde_json::Value>>,
}

#[cfg(test)]
impl MockCapability {
    /// Create a mock with the given descriptor, returning an empty object.
    pub fn new(descriptor: CapabilityDescriptor) -> Self {
        Self {
            descriptor,
            response: std::sync::Mutex::new(Ok(serde_json::json!({}))),
            delay: None,
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Set the payload to return.
    pub fn with_payload(self, payload: serde_json::Value) -> Self {
        *self.response.lock().unwrap() = Ok(payload);
        self
    }

    /// Set a failure to return.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        *self.response.lock().unwrap() = Err(CapabilityFailure::new(message));
        self
    }

    /// Sleep this long before responding, to exercise timeouts.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Arguments received so far.
    pub fn calls(&self) -> Vec<serde_json::Value> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl Capability for MockCapability {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        arguments: serde_json::Value,
        _ctx: &InvocationContext,
    ) -> std::result::Result<serde_json::Value, CapabilityFailure> {
        self.calls.lock().unwrap().push(arguments);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().unwrap().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
