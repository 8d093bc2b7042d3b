//! Satellite-side call forwarding.
//!
//! A [`ServiceHandle`] is what satellite code holds for a service or mutator.
//! Allow-listed targets are [`CallProxy`] values: every method call becomes a
//! request to the host, the returned mutations are replayed into the local
//! store in order, and any mutator handles in the result are wrapped again so
//! chained calls keep forwarding. Everything else is a [`LocalRef`] that runs
//! against the satellite's own instance and store.

use crate::config::AllowList;
use crate::context::CallContext;
use crate::protocol::{Mutation, MutatorHandle, ServiceRequest, ServiceResponse};
use crate::registry::{ServiceKind, ServiceRegistry};
use crate::resolver::{MutatorResolver, Returned};
use crate::service::{Interface, MethodOutput, ReturnShape, ServiceRef};
use crate::store::{MemoryStore, StateStore};
use crate::transport::Transport;
use crate::{BridgeError, Result};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Process-wide satellite state shared by every handle it hands out.
pub(crate) struct SatelliteState {
    registry: Mutex<ServiceRegistry>,
    store: Mutex<MemoryStore>,
    transport: Arc<dyn Transport>,
    allow_list: AllowList,
}

impl SatelliteState {
    pub(crate) fn new(
        registry: ServiceRegistry,
        store: MemoryStore,
        transport: Arc<dyn Transport>,
        allow_list: AllowList,
    ) -> Self {
        Self {
            registry: Mutex::new(registry),
            store: Mutex::new(store),
            transport,
            allow_list,
        }
    }

    pub(crate) fn registry(&self) -> Result<MutexGuard<'_, ServiceRegistry>> {
        self.registry
            .lock()
            .map_err(|_| BridgeError::Other("Failed to acquire satellite registry lock".into()))
    }

    pub(crate) fn store(&self) -> Result<MutexGuard<'_, MemoryStore>> {
        self.store
            .lock()
            .map_err(|_| BridgeError::Other("Failed to acquire satellite store lock".into()))
    }

    pub(crate) fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub(crate) async fn send(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        self.transport.request(request).await
    }

    /// Replay host mutations into the local store, in order.
    ///
    /// A mutation the local slice cannot take (its reducer reports the slice
    /// stale) is still recorded and broadcast. The stale slice names are
    /// returned.
    pub(crate) fn apply(&self, mutations: &[Mutation]) -> Result<Vec<String>> {
        let mut stale = Vec::new();
        if mutations.is_empty() {
            return Ok(stale);
        }
        let mut store = self.store()?;
        for mutation in mutations {
            match store.commit(mutation) {
                Ok(()) => {}
                Err(BridgeError::StaleState { slice, message }) => {
                    warn!(
                        slice = %slice,
                        mutation_type = %mutation.mutation_type,
                        "Local state out of date: {}",
                        message
                    );
                    store.record(mutation);
                    if !stale.contains(&slice) {
                        stale.push(slice);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        debug!(count = mutations.len(), "Applied host mutations");
        Ok(stale)
    }

    /// Apply an `initService` answer: replay its mutations, then adopt the
    /// host's copy of the slice.
    pub(crate) fn load(&self, name: &str, response: ServiceResponse) -> Result<()> {
        // Stale entries are covered by the slice copy below
        self.apply(&response.mutations)?;
        if let Some(slice) = response.state {
            self.store()?.replace_slice(name, slice);
        }
        match response.error {
            Some(err) => Err(BridgeError::from_response_error(err)),
            None => Ok(()),
        }
    }

    /// Fetch the host's current copy of one slice.
    pub(crate) async fn resync(&self, slice: &str) -> Result<()> {
        let response = self.send(ServiceRequest::init_service(slice)).await?;
        self.load(slice, response)
    }

    /// Apply a response's mutations, refresh any slice they found stale,
    /// then surface the response error if it has one.
    pub(crate) async fn settle(&self, response: ServiceResponse) -> Result<Value> {
        let stale = self.apply(&response.mutations)?;
        for slice in stale {
            if self.allow_list.allows(&slice) {
                info!(slice = %slice, "Refreshing out-of-date slice from host");
                self.resync(&slice).await?;
            }
        }
        match response.error {
            Some(err) => Err(BridgeError::from_response_error(err)),
            None => Ok(response.payload),
        }
    }

    /// Wrap a mutator handle for the caller: a proxy when allow-listed,
    /// otherwise a locally rebuilt instance.
    fn wrap(
        self: &Arc<Self>,
        registry: &ServiceRegistry,
        handle: MutatorHandle,
    ) -> Result<ServiceHandle> {
        if self.allow_list.allows(&handle.name) {
            let interface = mutator_interface(registry, &handle.name)?;
            return Ok(ServiceHandle::Remote(CallProxy {
                target: Target::Mutator(handle),
                interface,
                state: self.clone(),
            }));
        }

        warn!(mutator = %handle.name, "Mutator not allow-listed; calls will run locally");
        let instance = registry.construct_mutator(&handle.name, &handle.constructor_args)?;
        Ok(ServiceHandle::Local(LocalRef {
            name: handle.name,
            instance: Some(instance),
            state: self.clone(),
        }))
    }

    fn wrap_output(self: &Arc<Self>, output: MethodOutput) -> Result<Returned<ServiceHandle>> {
        let registry = self.registry()?;
        Ok(match output {
            MethodOutput::Data(value) => Returned::Data(value),
            MethodOutput::Mutator(handle) => Returned::Mutator(self.wrap(&registry, handle)?),
            MethodOutput::Mutators(handles) => Returned::Mutators(
                handles
                    .into_iter()
                    .map(|h| self.wrap(&registry, h))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

fn mutator_interface(registry: &ServiceRegistry, name: &str) -> Result<Interface> {
    match registry.descriptor(name) {
        Some(d) if d.kind() == ServiceKind::Mutator => Ok(d.interface().clone()),
        _ => Err(BridgeError::UnknownMutator {
            name: name.to_string(),
        }),
    }
}

fn service_interface(registry: &ServiceRegistry, name: &str) -> Result<Interface> {
    match registry.descriptor(name) {
        Some(d) if d.kind() == ServiceKind::Singleton => Ok(d.interface().clone()),
        _ => Err(BridgeError::UnknownService {
            name: name.to_string(),
        }),
    }
}

/// What a proxy forwards to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Service(String),
    Mutator(MutatorHandle),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Service(name) => name,
            Target::Mutator(handle) => &handle.name,
        }
    }
}

/// Forwards every method call on one target to the host.
#[derive(Clone)]
pub struct CallProxy {
    target: Target,
    interface: Interface,
    state: Arc<SatelliteState>,
}

impl CallProxy {
    pub(crate) fn for_service(state: &Arc<SatelliteState>, name: &str) -> Result<Self> {
        let interface = service_interface(&*state.registry()?, name)?;
        Ok(Self {
            target: Target::Service(name.to_string()),
            interface,
            state: state.clone(),
        })
    }

    pub(crate) fn for_mutator(state: &Arc<SatelliteState>, handle: MutatorHandle) -> Result<Self> {
        let interface = mutator_interface(&*state.registry()?, &handle.name)?;
        Ok(Self {
            target: Target::Mutator(handle),
            interface,
            state: state.clone(),
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Forward one method call and wait for the host's answer.
    ///
    /// Method names are checked against the interface table first, so a
    /// misspelt name fails without a round trip. Mutations in the response
    /// are applied locally before this returns, even when the call failed.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Returned<ServiceHandle>> {
        let shape = self
            .interface
            .shape(method)
            .ok_or_else(|| BridgeError::method_not_found(self.target.name(), method))?;

        let request = match &self.target {
            Target::Service(name) => ServiceRequest::call_method(name.as_str(), method, args),
            Target::Mutator(handle) => ServiceRequest::call_mutator(handle, method, args),
        };
        debug!(id = %request.id, target = %self.target.name(), method, "Forwarding call");

        let response = self.state.send(request).await?;
        let payload = self.state.settle(response).await?;
        self.wrap_payload(shape, payload)
    }

    fn wrap_payload(&self, shape: ReturnShape, payload: Value) -> Result<Returned<ServiceHandle>> {
        let registry = self.state.registry()?;
        MutatorResolver::new(&registry)
            .scan_and_wrap(shape, payload, |handle| self.state.wrap(&registry, handle))
    }
}

impl fmt::Debug for CallProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallProxy")
            .field("target", &self.target)
            .field("interface", &self.interface)
            .finish()
    }
}

/// A reference that runs calls in the satellite itself.
///
/// State changes made through it never reach the host.
#[derive(Clone)]
pub struct LocalRef {
    name: String,
    instance: Option<ServiceRef>,
    state: Arc<SatelliteState>,
}

impl LocalRef {
    pub(crate) fn new(state: &Arc<SatelliteState>, name: &str, instance: Option<ServiceRef>) -> Self {
        Self {
            name: name.to_string(),
            instance,
            state: state.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the satellite ever instantiated this service.
    pub fn is_instantiated(&self) -> bool {
        self.instance.is_some()
    }

    /// Run a method on the local instance against the local store.
    ///
    /// Without a local instance every method is missing.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Returned<ServiceHandle>> {
        warn!(service = %self.name, method, "Executing locally; host state is not updated");

        let instance = self
            .instance
            .as_ref()
            .ok_or_else(|| BridgeError::method_not_found(&self.name, method))?;

        let output = {
            let mut store = self.state.store()?;
            let mut ctx = CallContext::new(&mut *store);
            instance.invoke(method, &args, &mut ctx)?
        };
        self.state.wrap_output(output)
    }
}

impl fmt::Debug for LocalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRef")
            .field("name", &self.name)
            .field("instantiated", &self.is_instantiated())
            .finish()
    }
}

/// A service or mutator reference held by satellite code.
#[derive(Debug, Clone)]
pub enum ServiceHandle {
    Remote(CallProxy),
    Local(LocalRef),
}

impl ServiceHandle {
    pub fn name(&self) -> &str {
        match self {
            ServiceHandle::Remote(proxy) => proxy.target.name(),
            ServiceHandle::Local(local) => &local.name,
        }
    }

    /// `false` for references whose calls bypass the host.
    pub fn is_remote(&self) -> bool {
        matches!(self, ServiceHandle::Remote(_))
    }

    /// The structural identity, for mutator targets.
    pub fn mutator_handle(&self) -> Option<MutatorHandle> {
        match self {
            ServiceHandle::Remote(proxy) => match &proxy.target {
                Target::Mutator(handle) => Some(handle.clone()),
                Target::Service(_) => None,
            },
            ServiceHandle::Local(local) => local.instance.as_ref().and_then(|i| i.handle()),
        }
    }

    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Returned<ServiceHandle>> {
        match self {
            ServiceHandle::Remote(proxy) => proxy.call(method, args).await,
            ServiceHandle::Local(local) => local.call(method, args).await,
        }
    }

    /// Call a method declared to return plain data.
    pub async fn call_data(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let returned = self.call(method, args).await?;
        let shape = returned.shape();
        returned
            .into_data()
            .ok_or_else(|| self.shape_mismatch(method, ReturnShape::Data, shape))
    }

    /// Call a method declared to return one mutator.
    pub async fn call_mutator(&self, method: &str, args: Vec<Value>) -> Result<ServiceHandle> {
        let returned = self.call(method, args).await?;
        let shape = returned.shape();
        returned
            .into_mutator()
            .ok_or_else(|| self.shape_mismatch(method, ReturnShape::Mutator, shape))
    }

    /// Call a method declared to return a list of mutators.
    pub async fn call_mutators(&self, method: &str, args: Vec<Value>) -> Result<Vec<ServiceHandle>> {
        let returned = self.call(method, args).await?;
        let shape = returned.shape();
        returned
            .into_mutators()
            .ok_or_else(|| self.shape_mismatch(method, ReturnShape::MutatorList, shape))
    }

    fn shape_mismatch(&self, method: &str, wanted: ReturnShape, got: ReturnShape) -> BridgeError {
        BridgeError::InvalidRequest {
            message: format!(
                "{}.{} returns {:?}, not {:?}",
                self.name(),
                method,
                got,
                wanted
            ),
        }
    }
}
