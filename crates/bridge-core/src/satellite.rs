//! Satellite process entry point.
//!
//! A [`Satellite`] holds the process's own registry (used for interface
//! tables and mutator reconstruction), a replicated [`MemoryStore`] and the
//! transport to the host. It hands out [`ServiceHandle`]s: proxies for
//! allow-listed services, local references for everything else.

use crate::config::AllowList;
use crate::context::CallContext;
use crate::ipc::IpcClient;
use crate::protocol::{Mutation, MutatorHandle, ServiceRequest};
use crate::proxy::{CallProxy, LocalRef, SatelliteState, ServiceHandle};
use crate::registry::ServiceRegistry;
use crate::store::{MemoryStore, StateStore};
use crate::transport::Transport;
use crate::{BridgeError, Result};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Satellite {
    state: Arc<SatelliteState>,
}

impl Satellite {
    /// Build a satellite over any transport. The local store gets one slice
    /// per stateful service registered here.
    pub fn new(registry: ServiceRegistry, transport: Arc<dyn Transport>, allow_list: AllowList) -> Self {
        let store = MemoryStore::bootstrap(&registry);
        Self {
            state: Arc::new(SatelliteState::new(registry, store, transport, allow_list)),
        }
    }

    /// Connect to a host over TCP and wait for its ready event.
    pub async fn connect(
        addr: SocketAddr,
        registry: ServiceRegistry,
        allow_list: AllowList,
    ) -> Result<Self> {
        let client = IpcClient::connect(addr).await?;
        info!("Satellite connected to host at {}", addr);
        Ok(Self::new(registry, Arc::new(client), allow_list))
    }

    /// Obtain a service.
    ///
    /// Allow-listed names are instantiated on the host first (an
    /// `initService` request, whose mutations are replayed here), the local
    /// slice is replaced by the host's copy, and they come back as proxies. Other names come back as local references to whatever
    /// instance this process already has.
    pub async fn service(&self, name: &str) -> Result<ServiceHandle> {
        if !self.state.allow_list().allows(name) {
            return self.local_reference(name);
        }

        let proxy = CallProxy::for_service(&self.state, name)?;
        let response = self.state.send(ServiceRequest::init_service(name)).await?;
        self.state.load(name, response)?;
        debug!(service = %name, "Service proxy ready");
        Ok(ServiceHandle::Remote(proxy))
    }

    fn local_reference(&self, name: &str) -> Result<ServiceHandle> {
        let registry = self.state.registry()?;
        if !registry.contains(name) {
            return Err(BridgeError::UnknownService {
                name: name.to_string(),
            });
        }
        warn!(
            service = %name,
            "Service is not allow-listed; calls run locally and may diverge from the host"
        );
        let instance = registry.cached(name);
        Ok(ServiceHandle::Local(LocalRef::new(&self.state, name, instance)))
    }

    /// Wrap a mutator handle, forwarding when its name is allow-listed.
    pub fn mutator(&self, handle: MutatorHandle) -> Result<ServiceHandle> {
        if self.state.allow_list().allows(&handle.name) {
            return Ok(ServiceHandle::Remote(CallProxy::for_mutator(&self.state, handle)?));
        }
        let instance = self
            .state
            .registry()?
            .construct_mutator(&handle.name, &handle.constructor_args)?;
        Ok(ServiceHandle::Local(LocalRef::new(&self.state, &handle.name, Some(instance))))
    }

    /// Instantiate a service inside this process and return a local reference.
    ///
    /// Mutations its constructor emits go to the local store only.
    pub fn resolve_local(&self, name: &str) -> Result<ServiceHandle> {
        let mut registry = self.state.registry()?;
        let mut store = self.state.store()?;
        let mut ctx = CallContext::new(&mut *store);
        let instance = registry.resolve(name, &mut ctx)?;
        Ok(ServiceHandle::Local(LocalRef::new(&self.state, name, Some(instance))))
    }

    /// Receive every mutation applied to the local store from now on.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<Mutation>> {
        Ok(self.state.store()?.subscribe())
    }

    /// Current local copy of one service's state slice.
    pub fn state(&self, slice: &str) -> Result<Option<Value>> {
        Ok(self.state.store()?.slice(slice).cloned())
    }

    pub fn snapshot(&self) -> Result<Value> {
        Ok(self.state.store()?.snapshot())
    }

    /// Mutations applied locally so far, in order.
    pub fn history(&self) -> Result<Vec<Mutation>> {
        Ok(self.state.store()?.history().to_vec())
    }

    pub fn allow_list(&self) -> &AllowList {
        self.state.allow_list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::HostDispatcher;
    use crate::service::{MethodTable, RemoteService};
    use crate::store::ReducerTable;
    use crate::transport::LocalTransport;
    use serde_json::json;

    struct Notes;

    impl RemoteService for Notes {
        const NAME: &'static str = "Notes";

        fn methods() -> MethodTable<Self> {
            MethodTable::<Self>::new()
                .data("add", |_, args, ctx| {
                    let text: String = args.required(0, "text")?;
                    ctx.emit("ADD_NOTE", json!(text))?;
                    Ok(Value::Null)
                })
                .data("count", |_, _, ctx| {
                    Ok(json!(ctx
                        .state("Notes")
                        .and_then(|s| s.as_array())
                        .map_or(0, Vec::len)))
                })
        }

        fn initial_state() -> Option<Value> {
            Some(json!([]))
        }

        fn reducers() -> ReducerTable {
            ReducerTable::new().on("ADD_NOTE", |state, payload| {
                if let Some(list) = state.as_array_mut() {
                    list.push(payload.clone());
                }
                Ok(())
            })
        }
    }

    fn registry() -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        registry
            .register_service::<Notes, _>(|ctx| {
                ctx.emit("ADD_NOTE", json!("welcome"))?;
                Ok(Notes)
            })
            .unwrap();
        registry
    }

    fn satellite(allow: &[&str]) -> (Arc<HostDispatcher>, Satellite) {
        let host = Arc::new(HostDispatcher::with_memory_store(registry()));
        let satellite = Satellite::new(
            registry(),
            Arc::new(LocalTransport::new(host.clone())),
            AllowList::new(allow.iter().copied()),
        );
        (host, satellite)
    }

    #[tokio::test]
    async fn test_service_sends_init_and_replays_constructor_mutations() {
        let (host, satellite) = satellite(&["Notes"]);

        let notes = satellite.service("Notes").await.unwrap();
        assert!(notes.is_remote());
        assert_eq!(satellite.state("Notes").unwrap(), Some(json!(["welcome"])));
        assert!(host.with_registry(|r| r.cached("Notes").is_some()).await);

        // A second handle does not re-instantiate
        satellite.service("Notes").await.unwrap();
        assert_eq!(satellite.history().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_observers_see_replayed_mutations() {
        let (_host, satellite) = satellite(&["Notes"]);
        let notes = satellite.service("Notes").await.unwrap();
        let mut rx = satellite.subscribe().unwrap();

        notes.call("add", vec![json!("buy milk")]).await.unwrap();

        let seen = rx.try_recv().unwrap();
        assert_eq!(seen, Mutation::new("ADD_NOTE", json!("buy milk")));
    }

    #[tokio::test]
    async fn test_not_allow_listed_is_local_and_uninstantiated() {
        let (host, satellite) = satellite(&[]);

        let notes = satellite.service("Notes").await.unwrap();
        assert!(!notes.is_remote());

        let err = notes.call("count", vec![]).await.unwrap_err();
        assert!(matches!(err, BridgeError::MethodNotFound { .. }));
        assert!(!host.with_registry(|r| r.cached("Notes").is_some()).await);
    }

    #[tokio::test]
    async fn test_resolve_local_diverges_from_host() {
        let (host, satellite) = satellite(&[]);

        let notes = satellite.resolve_local("Notes").unwrap();
        notes.call("add", vec![json!("only here")]).await.unwrap();

        assert_eq!(
            notes.call_data("count", vec![]).await.unwrap(),
            json!(2)
        );
        assert_eq!(host.with_store(|s| s.slice("Notes").cloned()).await, Some(json!([])));

        // Later local references reuse the local instance
        let again = satellite.service("Notes").await.unwrap();
        assert_eq!(again.call_data("count", vec![]).await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_unknown_service_is_rejected() {
        let (_host, satellite) = satellite(&["Calendar"]);
        let err = satellite.service("Calendar").await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownService { .. }));

        let err = satellite.service("Clock").await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownService { .. }));
    }
}
