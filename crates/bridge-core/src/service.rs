//! Remote-callable service definitions.
//!
//! A service type declares its callable surface once, as a [`MethodTable`]:
//! method name, declared [`ReturnShape`] and the function that runs it. The
//! table is built when the type is registered and is the only way the bridge
//! reaches a service's methods, on the host (dispatch) and on satellites
//! (forwarding and payload decoding) alike.

use crate::context::CallContext;
use crate::protocol::MutatorHandle;
use crate::store::ReducerTable;
use crate::{BridgeError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What a method hands back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReturnShape {
    /// Plain serializable data.
    Data,
    /// A single mutator handle.
    Mutator,
    /// A list of mutator handles.
    MutatorList,
}

/// Result of one method invocation, before it is put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodOutput {
    Data(Value),
    Mutator(MutatorHandle),
    Mutators(Vec<MutatorHandle>),
}

impl MethodOutput {
    pub fn shape(&self) -> ReturnShape {
        match self {
            MethodOutput::Data(_) => ReturnShape::Data,
            MethodOutput::Mutator(_) => ReturnShape::Mutator,
            MethodOutput::Mutators(_) => ReturnShape::MutatorList,
        }
    }

    /// Encode for the response payload. Handles become descriptors.
    pub fn into_payload(self) -> Result<Value> {
        Ok(match self {
            MethodOutput::Data(value) => value,
            MethodOutput::Mutator(handle) => serde_json::to_value(handle)?,
            MethodOutput::Mutators(handles) => serde_json::to_value(handles)?,
        })
    }
}

/// Positional call arguments with typed accessors.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub fn new(values: &'a [Value]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn raw(&self) -> &'a [Value] {
        self.values
    }

    /// Decode a required argument. Missing or `null` is an error.
    pub fn required<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T> {
        match self.values.get(index) {
            Some(value) if !value.is_null() => decode(value, name),
            _ => Err(BridgeError::InvalidParams {
                message: format!("{} is required", name),
            }),
        }
    }

    /// Decode an optional argument. Missing or `null` yields `None`.
    pub fn optional<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<Option<T>> {
        match self.values.get(index) {
            Some(value) if !value.is_null() => decode(value, name).map(Some),
            _ => Ok(None),
        }
    }
}

fn decode<T: DeserializeOwned>(value: &Value, name: &str) -> Result<T> {
    T::deserialize(value).map_err(|e| BridgeError::InvalidParams {
        message: format!("Invalid {}: {}", name, e),
    })
}

type Invoker<T> =
    Box<dyn Fn(&T, Args<'_>, &mut CallContext<'_>) -> Result<MethodOutput> + Send + Sync>;

struct Method<T> {
    shape: ReturnShape,
    invoke: Invoker<T>,
}

/// Method name to declared shape and invoker, for one service type.
pub struct MethodTable<T> {
    methods: BTreeMap<String, Method<T>>,
}

impl<T> Default for MethodTable<T> {
    fn default() -> Self {
        Self {
            methods: BTreeMap::new(),
        }
    }
}

impl<T: 'static> MethodTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, name: &str, shape: ReturnShape, invoke: Invoker<T>) -> Self {
        self.methods.insert(name.to_string(), Method { shape, invoke });
        self
    }

    /// A method returning plain data.
    pub fn data<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&T, Args<'_>, &mut CallContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(
            name,
            ReturnShape::Data,
            Box::new(move |t, args, ctx| f(t, args, ctx).map(MethodOutput::Data)),
        )
    }

    /// A method returning one mutator handle.
    pub fn mutator<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&T, Args<'_>, &mut CallContext<'_>) -> Result<MutatorHandle>
            + Send
            + Sync
            + 'static,
    {
        self.insert(
            name,
            ReturnShape::Mutator,
            Box::new(move |t, args, ctx| f(t, args, ctx).map(MethodOutput::Mutator)),
        )
    }

    /// A method returning a list of mutator handles.
    pub fn mutators<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&T, Args<'_>, &mut CallContext<'_>) -> Result<Vec<MutatorHandle>>
            + Send
            + Sync
            + 'static,
    {
        self.insert(
            name,
            ReturnShape::MutatorList,
            Box::new(move |t, args, ctx| f(t, args, ctx).map(MethodOutput::Mutators)),
        )
    }

    /// The declared surface of this table.
    pub fn interface(&self) -> Interface {
        Interface {
            methods: self
                .methods
                .iter()
                .map(|(name, m)| (name.clone(), m.shape))
                .collect(),
        }
    }

    fn invoke(
        &self,
        target: &T,
        service: &str,
        method: &str,
        args: &[Value],
        ctx: &mut CallContext<'_>,
    ) -> Result<MethodOutput> {
        let entry = self
            .methods
            .get(method)
            .ok_or_else(|| BridgeError::method_not_found(service, method))?;
        (entry.invoke)(target, Args::new(args), ctx)
    }
}

/// Method names and return shapes of one registered service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    methods: BTreeMap<String, ReturnShape>,
}

impl Interface {
    pub fn shape(&self, method: &str) -> Option<ReturnShape> {
        self.methods.get(method).copied()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, ReturnShape)> {
        self.methods.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// A singleton service that can be called across the bridge.
pub trait RemoteService: Send + Sync + Sized + 'static {
    /// Wire name; unique across services and mutators.
    const NAME: &'static str;

    fn methods() -> MethodTable<Self>;

    /// Initial state slice. Services returning `Some` are stateful.
    fn initial_state() -> Option<Value> {
        None
    }

    /// Reducers for the mutation types this service's slice handles.
    fn reducers() -> ReducerTable {
        ReducerTable::new()
    }
}

/// A helper rebuilt on demand from its constructor arguments.
pub trait Mutator: RemoteService {
    fn from_args(args: &[Value]) -> Result<Self>;

    fn constructor_args(&self) -> Vec<Value>;

    fn handle(&self) -> MutatorHandle {
        MutatorHandle::new(Self::NAME, self.constructor_args())
    }
}

/// Type-erased, callable service or mutator instance.
pub trait ServiceObject: Send + Sync {
    fn name(&self) -> &str;

    /// Set for mutators: the handle that rebuilds this instance.
    fn handle(&self) -> Option<MutatorHandle>;

    fn invoke(
        &self,
        method: &str,
        args: &[Value],
        ctx: &mut CallContext<'_>,
    ) -> Result<MethodOutput>;
}

pub type ServiceRef = Arc<dyn ServiceObject>;

/// A service value bound to its method table.
pub(crate) struct Bound<T> {
    inner: T,
    table: Arc<MethodTable<T>>,
    handle: Option<MutatorHandle>,
}

impl<T: RemoteService> Bound<T> {
    pub(crate) fn service(inner: T, table: Arc<MethodTable<T>>) -> Self {
        Self {
            inner,
            table,
            handle: None,
        }
    }
}

impl<T: Mutator> Bound<T> {
    pub(crate) fn mutator(inner: T, table: Arc<MethodTable<T>>) -> Self {
        let handle = Some(inner.handle());
        Self {
            inner,
            table,
            handle,
        }
    }
}

impl<T: RemoteService> ServiceObject for Bound<T> {
    fn name(&self) -> &str {
        T::NAME
    }

    fn handle(&self) -> Option<MutatorHandle> {
        self.handle.clone()
    }

    fn invoke(
        &self,
        method: &str,
        args: &[Value],
        ctx: &mut CallContext<'_>,
    ) -> Result<MethodOutput> {
        self.table.invoke(&self.inner, T::NAME, method, args, ctx)
    }
}

impl fmt::Debug for dyn ServiceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceObject")
            .field("name", &self.name())
            .field("handle", &self.handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Greeter;

    impl RemoteService for Greeter {
        const NAME: &'static str = "Greeter";

        fn methods() -> MethodTable<Self> {
            MethodTable::<Self>::new()
                .data("greet", |_, args, _| {
                    let name: String = args.required(0, "name")?;
                    Ok(json!(format!("hello {name}")))
                })
                .mutator("badge", |_, args, _| {
                    let id: u32 = args.required(0, "id")?;
                    Ok(MutatorHandle::new("Badge", vec![json!(id)]))
                })
        }
    }

    #[test]
    fn test_interface_lists_declared_shapes() {
        let interface = Greeter::methods().interface();
        assert_eq!(interface.shape("greet"), Some(ReturnShape::Data));
        assert_eq!(interface.shape("badge"), Some(ReturnShape::Mutator));
        assert!(!interface.contains("shout"));
    }

    #[test]
    fn test_bound_invoke_and_missing_method() {
        let bound = Bound::service(Greeter, Arc::new(Greeter::methods()));
        let mut store = MemoryStore::new();
        let mut ctx = CallContext::new(&mut store);

        let out = bound.invoke("greet", &[json!("ada")], &mut ctx).unwrap();
        assert_eq!(out, MethodOutput::Data(json!("hello ada")));

        let err = bound.invoke("shout", &[], &mut ctx).unwrap_err();
        assert!(matches!(err, BridgeError::MethodNotFound { .. }));
    }

    #[test]
    fn test_args_validation() {
        let values = [json!("x"), Value::Null];
        let args = Args::new(&values);

        assert_eq!(args.required::<String>(0, "name").unwrap(), "x");
        assert!(args.required::<String>(1, "other").is_err());
        assert_eq!(args.optional::<String>(1, "other").unwrap(), None);
        assert_eq!(args.optional::<String>(5, "missing").unwrap(), None);

        let err = args.required::<u32>(0, "count").unwrap_err();
        assert!(err.to_string().contains("Invalid count"));
    }

    #[test]
    fn test_output_payload_encoding() {
        let handles = vec![
            MutatorHandle::new("Badge", vec![json!(1)]),
            MutatorHandle::new("Badge", vec![json!(2)]),
        ];
        let payload = MethodOutput::Mutators(handles).into_payload().unwrap();
        assert_eq!(payload[1]["constructorArgs"], json!([2]));
        assert_eq!(payload[0]["isMutator"], true);
    }
}
