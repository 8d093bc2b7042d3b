//! State store interface and an in-memory implementation.
//!
//! The bridge never interprets mutations itself. It hands them to a
//! [`StateStore`], which owns the state slices and decides what each
//! mutation type does to them.

use crate::protocol::Mutation;
use crate::registry::ServiceRegistry;
use crate::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Applies one mutation payload to the slice it belongs to.
pub type Reducer = Arc<dyn Fn(&mut Value, &Value) -> Result<()> + Send + Sync>;

const OBSERVER_CAPACITY: usize = 256;

/// Store seam used by call contexts and by satellite-side replay.
pub trait StateStore: Send {
    /// Apply a mutation and notify observers.
    fn commit(&mut self, mutation: &Mutation) -> Result<()>;

    /// Read the current state slice owned by a service.
    fn slice(&self, name: &str) -> Option<&Value>;
}

/// Mutation types a stateful service handles, with their reducers.
#[derive(Clone, Default)]
pub struct ReducerTable {
    entries: Vec<(String, Reducer)>,
}

impl ReducerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the reducer for a mutation type.
    pub fn on<F>(mut self, mutation_type: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(&mut Value, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.entries.push((mutation_type.into(), Arc::new(reducer)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }
}

impl fmt::Debug for ReducerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types()).finish()
    }
}

/// In-memory store with per-slice reducers, an ordered history and
/// broadcast notification of every committed mutation.
pub struct MemoryStore {
    slices: BTreeMap<String, Value>,
    reducers: HashMap<String, (String, Reducer)>,
    history: Vec<Mutation>,
    observers: broadcast::Sender<Mutation>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (observers, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            slices: BTreeMap::new(),
            reducers: HashMap::new(),
            history: Vec::new(),
            observers,
        }
    }

    /// Create a store with one slice per stateful service in the registry.
    pub fn bootstrap(registry: &ServiceRegistry) -> Self {
        let mut store = Self::new();
        for name in registry.list_stateful() {
            if let Some(descriptor) = registry.descriptor(&name) {
                let initial = descriptor.initial_state().cloned().unwrap_or(Value::Null);
                store.add_slice(&name, initial, descriptor.reducers());
            }
        }
        debug!(slices = store.slices.len(), "State store bootstrapped");
        store
    }

    /// Add (or replace) a slice together with the reducers that act on it.
    pub fn add_slice(&mut self, name: &str, initial: Value, reducers: &ReducerTable) {
        self.slices.insert(name.to_string(), initial);
        for (mutation_type, reducer) in &reducers.entries {
            self.reducers
                .insert(mutation_type.clone(), (name.to_string(), reducer.clone()));
        }
    }

    /// Overwrite a slice with a copy taken elsewhere, keeping its reducers.
    pub fn replace_slice(&mut self, name: &str, value: Value) {
        debug!(slice = %name, "State slice replaced");
        self.slices.insert(name.to_string(), value);
    }

    /// Append a mutation to the history and notify observers without
    /// running its reducer.
    pub fn record(&mut self, mutation: &Mutation) {
        self.history.push(mutation.clone());
        // No subscribers is fine
        let _ = self.observers.send(mutation.clone());
    }

    /// Receive every mutation committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Mutation> {
        self.observers.subscribe()
    }

    /// All mutations committed so far, in order.
    pub fn history(&self) -> &[Mutation] {
        &self.history
    }

    /// Copy of the full state tree keyed by slice name.
    pub fn snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .slices
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }
}

impl StateStore for MemoryStore {
    fn commit(&mut self, mutation: &Mutation) -> Result<()> {
        match self.reducers.get(&mutation.mutation_type) {
            Some((slice_name, reducer)) => {
                let slice = self
                    .slices
                    .entry(slice_name.clone())
                    .or_insert(Value::Null);
                reducer(slice, &mutation.payload)?;
            }
            None => trace!(
                mutation_type = %mutation.mutation_type,
                "No reducer registered; recording only"
            ),
        }

        self.record(mutation);
        Ok(())
    }

    fn slice(&self, name: &str) -> Option<&Value> {
        self.slices.get(name)
    }
}
