//! Bridge Core - cross-process service calls for multi-window applications.
//!
//! One process (the host) owns the canonical state and every business-logic
//! service. Other processes (satellites) call those services through proxies:
//! each call is sent to the host, executed there with its state mutations
//! captured, and the mutations are replayed into the satellite's own store
//! before the call returns.
//!
//! # Example
//!
//! ```rust,ignore
//! use bridge_core::{AllowList, HostDispatcher, IpcServer, Satellite, ServiceRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> bridge_core::Result<()> {
//!     // Host
//!     let host = Arc::new(HostDispatcher::with_memory_store(build_registry()?));
//!     let server = IpcServer::start(host).await?;
//!
//!     // Satellite
//!     let allow = AllowList::new(["ScenesService", "Scene"]);
//!     let satellite = Satellite::connect(server.addr(), build_registry()?, allow).await?;
//!     let scenes = satellite.service("ScenesService").await?;
//!     let scene = scenes.call_mutator("createScene", vec!["Intro".into()]).await?;
//!     scene.call("rename", vec!["Opening".into()]).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod ipc;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod resolver;
pub mod satellite;
pub mod service;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use buffer::{BufferState, MutationBuffer};
pub use config::{AllowList, IpcConfig, LaunchConfig};
pub use context::CallContext;
pub use dispatcher::HostDispatcher;
pub use error::{BridgeError, Result};
pub use ipc::{IpcClient, IpcServer, IpcServerHandle, RequestHandler};
pub use protocol::{
    HostEvent, Mutation, MutatorHandle, RequestAction, ResponseError, ServiceRequest,
    ServiceResponse,
};
pub use proxy::{CallProxy, LocalRef, ServiceHandle, Target};
pub use registry::{ServiceDescriptor, ServiceKind, ServiceRegistry};
pub use resolver::{MutatorResolver, Returned};
pub use satellite::Satellite;
pub use service::{
    Args, Interface, MethodOutput, MethodTable, Mutator, RemoteService, ReturnShape,
    ServiceObject, ServiceRef,
};
pub use store::{MemoryStore, ReducerTable, StateStore};
pub use transport::{LocalTransport, Transport};
