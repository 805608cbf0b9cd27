//! Decision request contracts: who is asking, for what, on which resource.

use std::borrow::Cow;

use governor_primitives::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::conditions::FieldPath;

/// Identity of the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorContext {
    id: String,
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes: Map<String, Value>,
}

impl ActorContext {
    /// Creates an actor with the given identity and role.
    #[must_use]
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            tenant: None,
            attributes: Map::new(),
        }
    }

    /// Sets the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Returns the actor identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the actor role.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Returns the tenant, if any.
    #[must_use]
    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    /// Returns free-form actor attributes.
    #[must_use]
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
}

/// What the request targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    resource: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl RequestContext {
    /// Creates a context for the given resource path.
    #[must_use]
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            metadata: Map::new(),
        }
    }

    /// Inserts metadata into the context.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Adds metadata and returns the updated context.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert_metadata(key, value);
        self
    }

    /// Returns the resource path.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Returns the metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Input to a governance decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    request_id: RequestId,
    actor: ActorContext,
    action: String,
    #[serde(default)]
    context: RequestContext,
}

impl DecisionRequest {
    /// Creates a request with a fresh identifier and an empty context.
    #[must_use]
    pub fn new(actor: ActorContext, action: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::random(),
            actor,
            action: action.into(),
            context: RequestContext::default(),
        }
    }

    /// Replaces the request context.
    #[must_use]
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the targeted resource.
    #[must_use]
    pub fn on_resource(mut self, resource: impl Into<String>) -> Self {
        self.context.resource = resource.into();
        self
    }

    /// Adds metadata to the request context.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert_metadata(key, value);
        self
    }

    /// Returns the request identifier.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the caller.
    #[must_use]
    pub fn actor(&self) -> &ActorContext {
        &self.actor
    }

    /// Returns the requested action.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the request context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Resolves a field path to its value. Absent fields resolve to `None`.
    #[must_use]
    pub fn resolve(&self, path: &FieldPath) -> Option<Cow<'_, Value>> {
        let owned = |text: &str| Some(Cow::Owned(Value::String(text.to_owned())));
        match path {
            FieldPath::Action => owned(&self.action),
            FieldPath::ActorId => owned(&self.actor.id),
            FieldPath::ActorRole => owned(&self.actor.role),
            FieldPath::ActorTenant => self.actor.tenant.as_deref().and_then(owned),
            FieldPath::ActorAttribute(keys) => lookup(&self.actor.attributes, keys).map(Cow::Borrowed),
            FieldPath::Resource => owned(&self.context.resource),
            FieldPath::Metadata(keys) => lookup(&self.context.metadata, keys).map(Cow::Borrowed),
        }
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[String]) -> Option<&'a Value> {
    let (first, rest) = keys.split_first()?;
    rest.iter()
        .try_fold(map.get(first)?, |current, key| current.get(key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> DecisionRequest {
        DecisionRequest::new(
            ActorContext::new("agent-7", "operator")
                .with_tenant("fleet-a")
                .with_attribute("clearance", json!({"level": 3})),
            "mission.dispatch",
        )
        .on_resource("/api/missions/42")
        .with_metadata("payload", json!({"robots": 4}))
    }

    #[test]
    fn resolves_builtin_and_nested_fields() {
        let request = request();

        assert_eq!(
            request.resolve(&FieldPath::ActorRole).as_deref(),
            Some(&json!("operator"))
        );
        assert_eq!(
            request
                .resolve(&FieldPath::Metadata(vec!["payload".into(), "robots".into()]))
                .as_deref(),
            Some(&json!(4))
        );
        assert_eq!(
            request
                .resolve(&FieldPath::ActorAttribute(vec!["clearance".into(), "level".into()]))
                .as_deref(),
            Some(&json!(3))
        );
        assert!(request
            .resolve(&FieldPath::Metadata(vec!["payload".into(), "missing".into()]))
            .is_none());
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: DecisionRequest = serde_json::from_value(json!({
            "actor": {"id": "u1", "role": "viewer"},
            "action": "credits.read"
        }))
        .unwrap();

        assert_eq!(request.action(), "credits.read");
        assert_eq!(request.context().resource(), "");
        assert!(request.resolve(&FieldPath::ActorTenant).is_none());
    }
}
