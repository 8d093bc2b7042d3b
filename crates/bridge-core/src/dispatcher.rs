//! Host-side handling of satellite requests.
//!
//! The dispatcher owns the host's registry and canonical store behind one
//! async mutex. Every request takes the lock for its whole duration, so
//! requests from all satellites run strictly one after another and each
//! response carries only the mutations its own call produced.

use crate::context::CallContext;
use crate::ipc::server::RequestHandler;
use crate::protocol::{RequestAction, ServiceRequest, ServiceResponse};
use crate::registry::ServiceRegistry;
use crate::resolver::MutatorResolver;
use crate::service::MethodOutput;
use crate::store::{MemoryStore, StateStore};
use crate::{BridgeError, Result};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct HostState<S> {
    registry: ServiceRegistry,
    store: S,
}

pub struct HostDispatcher<S = MemoryStore> {
    state: Mutex<HostState<S>>,
}

impl HostDispatcher<MemoryStore> {
    /// A dispatcher whose store is bootstrapped from the registry's stateful services.
    pub fn with_memory_store(registry: ServiceRegistry) -> Self {
        let store = MemoryStore::bootstrap(&registry);
        Self::new(registry, store)
    }
}

impl<S: StateStore> HostDispatcher<S> {
    pub fn new(registry: ServiceRegistry, store: S) -> Self {
        Self {
            state: Mutex::new(HostState { registry, store }),
        }
    }

    /// Process one request to completion.
    pub async fn dispatch(&self, request: ServiceRequest) -> ServiceResponse {
        let mut guard = self.state.lock().await;
        let HostState { registry, store } = &mut *guard;

        debug!(
            id = %request.id,
            action = ?request.action,
            service = %request.service_name,
            method = ?request.method_name,
            mutator = request.is_mutator,
            "Dispatching request"
        );

        let mut ctx = match CallContext::capturing(&mut *store) {
            Ok(ctx) => ctx,
            Err(e) => return ServiceResponse::failure(request.id, Vec::new(), e.to_response_error()),
        };
        let outcome = Self::execute(registry, &request, &mut ctx);
        let mutations = ctx.finish();

        match outcome {
            Ok(payload) => {
                debug!(id = %request.id, mutations = mutations.len(), "Request completed");
                let state = match request.action {
                    RequestAction::InitService => store.slice(&request.service_name).cloned(),
                    RequestAction::CallServiceMethod => None,
                };
                ServiceResponse::success(request.id, mutations, payload).with_state(state)
            }
            Err(e) => {
                warn!(
                    id = %request.id,
                    service = %request.service_name,
                    mutations = mutations.len(),
                    "Request failed: {}",
                    e
                );
                ServiceResponse::failure(request.id, mutations, e.to_response_error())
            }
        }
    }

    fn execute(
        registry: &mut ServiceRegistry,
        request: &ServiceRequest,
        ctx: &mut CallContext<'_>,
    ) -> Result<Value> {
        match request.action {
            RequestAction::InitService => {
                registry.resolve(&request.service_name, ctx)?;
                Ok(Value::Null)
            }
            RequestAction::CallServiceMethod => {
                let method = request
                    .method_name
                    .as_deref()
                    .ok_or_else(|| BridgeError::InvalidRequest {
                        message: "methodName is required for callServiceMethod".to_string(),
                    })?;

                let target = match request.mutator_handle() {
                    Some(handle) => MutatorResolver::new(registry).reconstruct(&handle)?,
                    None => registry.resolve(&request.service_name, ctx)?,
                };

                target.invoke(method, &request.args, ctx)?.into_payload()
            }
        }
    }

    /// Call a service from inside the host process.
    ///
    /// Mutations are applied to the canonical store but not captured.
    pub async fn call_local(
        &self,
        service: &str,
        method: &str,
        args: &[Value],
    ) -> Result<MethodOutput> {
        let mut guard = self.state.lock().await;
        let HostState { registry, store } = &mut *guard;
        let mut ctx = CallContext::new(store);
        let target = registry.resolve(service, &mut ctx)?;
        target.invoke(method, args, &mut ctx)
    }

    /// Run a closure against the canonical store.
    pub async fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard.store)
    }

    /// Run a closure against the host registry.
    pub async fn with_registry<R>(&self, f: impl FnOnce(&ServiceRegistry) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard.registry)
    }
}

#[async_trait::async_trait]
impl<S: StateStore + 'static> RequestHandler for HostDispatcher<S> {
    async fn handle(&self, request: ServiceRequest) -> ServiceResponse {
        self.dispatch(request).await
    }
}
