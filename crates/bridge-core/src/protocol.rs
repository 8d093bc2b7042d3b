//! Wire messages exchanged between satellites and the host.
//!
//! ```text
//! Request:  { id, action, serviceName, methodName?, args?, isMutator?, constructorArgs? }
//! Response: { id, mutations: [{type, payload}], payload, error? }
//! Handle:   { isMutator: true, mutatorName, constructorArgs }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An atomic state change. The bridge transports these without interpreting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(rename = "type")]
    pub mutation_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Mutation {
    pub fn new(mutation_type: impl Into<String>, payload: Value) -> Self {
        Self {
            mutation_type: mutation_type.into(),
            payload,
        }
    }
}

/// Structural identity of a mutator: enough to rebuild it in any process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireHandle", try_from = "WireHandle")]
pub struct MutatorHandle {
    pub name: String,
    pub constructor_args: Vec<Value>,
}

impl MutatorHandle {
    pub fn new(name: impl Into<String>, constructor_args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            constructor_args,
        }
    }

    /// Check whether a payload value is shaped like a handle descriptor.
    pub fn is_descriptor(value: &Value) -> bool {
        value
            .get("isMutator")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHandle {
    is_mutator: bool,
    mutator_name: String,
    #[serde(default)]
    constructor_args: Vec<Value>,
}

impl From<MutatorHandle> for WireHandle {
    fn from(handle: MutatorHandle) -> Self {
        Self {
            is_mutator: true,
            mutator_name: handle.name,
            constructor_args: handle.constructor_args,
        }
    }
}

impl TryFrom<WireHandle> for MutatorHandle {
    type Error = String;

    fn try_from(wire: WireHandle) -> Result<Self, Self::Error> {
        if !wire.is_mutator {
            return Err(format!(
                "descriptor for {} is not flagged isMutator",
                wire.mutator_name
            ));
        }
        Ok(Self {
            name: wire.mutator_name,
            constructor_args: wire.constructor_args,
        })
    }
}

/// What a request asks the host to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestAction {
    InitService,
    CallServiceMethod,
}

/// A call from a satellite to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: String,
    pub action: RequestAction,
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub is_mutator: bool,
    #[serde(default)]
    pub constructor_args: Vec<Value>,
}

impl ServiceRequest {
    fn next_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Ask the host to instantiate a singleton service.
    pub fn init_service(service_name: impl Into<String>) -> Self {
        Self {
            id: Self::next_id(),
            action: RequestAction::InitService,
            service_name: service_name.into(),
            method_name: None,
            args: Vec::new(),
            is_mutator: false,
            constructor_args: Vec::new(),
        }
    }

    /// Call a method on a singleton service.
    pub fn call_method(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            id: Self::next_id(),
            action: RequestAction::CallServiceMethod,
            service_name: service_name.into(),
            method_name: Some(method_name.into()),
            args,
            is_mutator: false,
            constructor_args: Vec::new(),
        }
    }

    /// Call a method on a mutator rebuilt from its handle.
    pub fn call_mutator(
        handle: &MutatorHandle,
        method_name: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            id: Self::next_id(),
            action: RequestAction::CallServiceMethod,
            service_name: handle.name.clone(),
            method_name: Some(method_name.into()),
            args,
            is_mutator: true,
            constructor_args: handle.constructor_args.clone(),
        }
    }

    /// The mutator handle this request targets, if any.
    pub fn mutator_handle(&self) -> Option<MutatorHandle> {
        self.is_mutator
            .then(|| MutatorHandle::new(self.service_name.clone(), self.constructor_args.clone()))
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The host's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub id: String,
    #[serde(default)]
    pub mutations: Vec<Mutation>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    /// Canonical slice of a stateful service, sent with `initService`
    /// answers so the satellite starts from the host's state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

impl ServiceResponse {
    pub fn success(id: impl Into<String>, mutations: Vec<Mutation>, payload: Value) -> Self {
        Self {
            id: id.into(),
            mutations,
            payload,
            error: None,
            state: None,
        }
    }

    pub fn failure(id: impl Into<String>, mutations: Vec<Mutation>, error: ResponseError) -> Self {
        Self {
            id: id.into(),
            mutations,
            payload: Value::Null,
            error: Some(error),
            state: None,
        }
    }

    /// Attach the canonical state slice.
    pub fn with_state(mut self, state: Option<Value>) -> Self {
        self.state = state;
        self
    }
}

/// Unsolicited notifications pushed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    /// The host has finished startup and accepts requests.
    Ready,
}
