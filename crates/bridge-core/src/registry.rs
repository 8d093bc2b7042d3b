//! Service registry: name to constructor, plus the per-process instance cache.
//!
//! Services and mutators share one namespace. Singletons are built lazily on
//! first resolution and cached for the rest of the process lifetime; mutators
//! are never cached and are rebuilt from constructor arguments on every use.

use crate::context::CallContext;
use crate::service::{Bound, Interface, Mutator, RemoteService, ServiceRef};
use crate::store::ReducerTable;
use crate::{BridgeError, Result};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Singleton,
    Mutator,
}

/// Immutable registration record for one service or mutator type.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    name: String,
    kind: ServiceKind,
    initial_state: Option<Value>,
    reducers: ReducerTable,
    interface: Interface,
}

impl ServiceDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// Whether this service owns a slice of the shared store.
    pub fn is_stateful(&self) -> bool {
        self.initial_state.is_some()
    }

    pub fn initial_state(&self) -> Option<&Value> {
        self.initial_state.as_ref()
    }

    pub fn reducers(&self) -> &ReducerTable {
        &self.reducers
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }
}

type SingletonCtor = Box<dyn Fn(&mut CallContext<'_>) -> Result<ServiceRef> + Send + Sync>;
type MutatorCtor = Box<dyn Fn(&[Value]) -> Result<ServiceRef> + Send + Sync>;

enum Constructor {
    Singleton(SingletonCtor),
    Mutator(MutatorCtor),
}

struct Entry {
    descriptor: ServiceDescriptor,
    constructor: Constructor,
}

/// Registered service types and the singletons resolved in this process.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: HashMap<String, Entry>,
    instances: HashMap<String, ServiceRef>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, descriptor: ServiceDescriptor, constructor: Constructor) -> Result<()> {
        if self.entries.contains_key(&descriptor.name) {
            return Err(BridgeError::Config {
                message: format!("Service registered twice: {}", descriptor.name),
            });
        }
        debug!(service = %descriptor.name, kind = ?descriptor.kind, "Registered");
        self.entries
            .insert(descriptor.name.clone(), Entry { descriptor, constructor });
        Ok(())
    }

    /// Register a singleton service with its constructor.
    ///
    /// The constructor runs at most once per process, on first resolution,
    /// and may commit mutations through the context it receives.
    pub fn register_service<S, F>(&mut self, constructor: F) -> Result<&mut Self>
    where
        S: RemoteService,
        F: Fn(&mut CallContext<'_>) -> Result<S> + Send + Sync + 'static,
    {
        let table = Arc::new(S::methods());
        let descriptor = ServiceDescriptor {
            name: S::NAME.to_string(),
            kind: ServiceKind::Singleton,
            initial_state: S::initial_state(),
            reducers: S::reducers(),
            interface: table.interface(),
        };
        let ctor: SingletonCtor = Box::new(move |ctx| {
            let service = constructor(ctx)?;
            let bound: ServiceRef = Arc::new(Bound::service(service, table.clone()));
            Ok(bound)
        });
        self.insert(descriptor, Constructor::Singleton(ctor))?;
        Ok(self)
    }

    /// Register a mutator type; it is rebuilt via [`Mutator::from_args`].
    pub fn register_mutator<M: Mutator>(&mut self) -> Result<&mut Self> {
        let table = Arc::new(M::methods());
        let descriptor = ServiceDescriptor {
            name: M::NAME.to_string(),
            kind: ServiceKind::Mutator,
            initial_state: M::initial_state(),
            reducers: M::reducers(),
            interface: table.interface(),
        };
        let ctor: MutatorCtor = Box::new(move |args| {
            let mutator = M::from_args(args)?;
            let bound: ServiceRef = Arc::new(Bound::mutator(mutator, table.clone()));
            Ok(bound)
        });
        self.insert(descriptor, Constructor::Mutator(ctor))?;
        Ok(self)
    }

    /// Resolve a singleton, constructing and caching it on first use.
    pub fn resolve(&mut self, name: &str, ctx: &mut CallContext<'_>) -> Result<ServiceRef> {
        if let Some(instance) = self.instances.get(name) {
            return Ok(instance.clone());
        }

        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| BridgeError::UnknownService {
                name: name.to_string(),
            })?;
        let Constructor::Singleton(ctor) = &entry.constructor else {
            return Err(BridgeError::UnknownService {
                name: name.to_string(),
            });
        };

        let instance = ctor(ctx)?;
        debug!(service = %name, "Instantiated service");
        self.instances.insert(name.to_string(), instance.clone());
        Ok(instance)
    }

    /// The singleton for `name` if it was already resolved in this process.
    pub fn cached(&self, name: &str) -> Option<ServiceRef> {
        self.instances.get(name).cloned()
    }

    /// Build a fresh mutator instance from its constructor arguments.
    pub fn construct_mutator(&self, name: &str, args: &[Value]) -> Result<ServiceRef> {
        match self.entries.get(name).map(|e| &e.constructor) {
            Some(Constructor::Mutator(ctor)) => ctor(args),
            _ => Err(BridgeError::UnknownMutator {
                name: name.to_string(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.entries.get(name).map(|e| &e.descriptor)
    }

    /// Names of every registered descriptor that owns a state slice.
    pub fn list_stateful(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .filter(|e| e.descriptor.is_stateful())
            .map(|e| e.descriptor.name.clone())
            .collect()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("registered", &self.names())
            .field("instances", &self.instances.keys().collect::<BTreeSet<_>>())
            .finish()
    }
}
