//! Bridge Services - the application services callable from satellite windows.
//!
//! Every process registers the same set through [`register_all`]: the host
//! executes them, satellites use the registrations for interface tables,
//! mutator reconstruction and their replicated state slices.

pub mod audio;
pub mod layout;
pub mod scenes;
pub mod sources;

pub use audio::{AudioService, AudioSource};
pub use layout::LayoutService;
pub use scenes::{Scene, SceneItem, ScenesService};
pub use sources::{Source, SourcesService};

use bridge_core::{AllowList, BridgeError, CallContext, RemoteService, Result, ServiceRegistry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Register every application service and mutator.
pub fn register_all(registry: &mut ServiceRegistry) -> Result<()> {
    registry
        .register_service::<ScenesService, _>(|_| Ok(ScenesService))?
        .register_mutator::<Scene>()?
        .register_mutator::<SceneItem>()?
        .register_service::<SourcesService, _>(|_| Ok(SourcesService))?
        .register_mutator::<Source>()?
        .register_service::<AudioService, _>(|_| Ok(AudioService))?
        .register_mutator::<AudioSource>()?
        .register_service::<LayoutService, _>(LayoutService::init)?;
    Ok(())
}

/// A registry holding every application service.
pub fn registry() -> Result<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}

/// Services and mutators whose calls satellites forward to the host.
///
/// `LayoutService` is not listed; every window keeps its own layout.
pub fn default_allow_list() -> AllowList {
    AllowList::new([
        ScenesService::NAME,
        Scene::NAME,
        SceneItem::NAME,
        SourcesService::NAME,
        Source::NAME,
        AudioService::NAME,
        AudioSource::NAME,
    ])
}

/// Read a typed copy of a state slice.
pub(crate) fn read_slice<S: DeserializeOwned>(ctx: &CallContext<'_>, name: &str) -> Result<S> {
    let value = ctx.state(name).ok_or_else(|| BridgeError::Config {
        message: format!("State slice {} is not installed", name),
    })?;
    S::deserialize(value).map_err(|e| BridgeError::Json {
        message: format!("Malformed {} state: {}", name, e),
        source: Some(e),
    })
}

/// Run a reducer against a typed view of a slice and write it back.
///
/// The slice is left untouched when the reducer fails.
pub(crate) fn update_slice<S, F>(state: &mut Value, f: F) -> Result<()>
where
    S: Serialize + DeserializeOwned,
    F: FnOnce(&mut S) -> Result<()>,
{
    let mut typed = S::deserialize(&*state)?;
    f(&mut typed)?;
    *state = serde_json::to_value(typed)?;
    Ok(())
}

/// Reducer error for a mutation naming an entity the slice does not hold.
pub(crate) fn missing(slice: &str, what: impl fmt::Display) -> BridgeError {
    BridgeError::stale_state(slice, format!("no {}", what))
}

/// Decode a mutation payload.
pub(crate) fn payload<T: DeserializeOwned>(mutation_type: &str, payload: &Value) -> Result<T> {
    T::deserialize(payload).map_err(|e| BridgeError::Validation {
        field: mutation_type.to_string(),
        message: e.to_string(),
    })
}

/// Emit a mutation with a typed payload.
pub(crate) fn emit<T: Serialize>(ctx: &mut CallContext<'_>, mutation_type: &str, payload: &T) -> Result<()> {
    ctx.emit(mutation_type, serde_json::to_value(payload)?)
}
