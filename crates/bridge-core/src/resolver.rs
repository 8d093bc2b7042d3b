//! Mutator handles across the process boundary.
//!
//! A live mutator never crosses the channel. It travels as its
//! `(name, constructorArgs)` handle and is rebuilt on the other side from the
//! registry's constructor table. Payloads are decoded according to the return
//! shape the method declared, so only the positions that can hold handles are
//! ever inspected.

use crate::protocol::MutatorHandle;
use crate::registry::ServiceRegistry;
use crate::service::{MethodOutput, ReturnShape, ServiceObject, ServiceRef};
use crate::{BridgeError, Result};
use serde_json::Value;

/// A decoded call result whose handles were turned into `H`.
#[derive(Debug, Clone, PartialEq)]
pub enum Returned<H> {
    Data(Value),
    Mutator(H),
    Mutators(Vec<H>),
}

impl<H> Returned<H> {
    pub fn shape(&self) -> ReturnShape {
        match self {
            Returned::Data(_) => ReturnShape::Data,
            Returned::Mutator(_) => ReturnShape::Mutator,
            Returned::Mutators(_) => ReturnShape::MutatorList,
        }
    }

    pub fn into_data(self) -> Option<Value> {
        match self {
            Returned::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_mutator(self) -> Option<H> {
        match self {
            Returned::Mutator(h) => Some(h),
            _ => None,
        }
    }

    pub fn into_mutators(self) -> Option<Vec<H>> {
        match self {
            Returned::Mutators(hs) => Some(hs),
            _ => None,
        }
    }
}

pub struct MutatorResolver<'a> {
    registry: &'a ServiceRegistry,
}

impl<'a> MutatorResolver<'a> {
    pub fn new(registry: &'a ServiceRegistry) -> Self {
        Self { registry }
    }

    /// The handle of a mutator instance.
    pub fn serialize(target: &dyn ServiceObject) -> Result<MutatorHandle> {
        target.handle().ok_or_else(|| BridgeError::UnknownMutator {
            name: target.name().to_string(),
        })
    }

    /// Rebuild a mutator from its handle.
    pub fn reconstruct(&self, handle: &MutatorHandle) -> Result<ServiceRef> {
        self.registry
            .construct_mutator(&handle.name, &handle.constructor_args)
    }

    /// Decode a response payload according to the declared return shape.
    pub fn decode(shape: ReturnShape, payload: Value) -> Result<MethodOutput> {
        match shape {
            ReturnShape::Data => Ok(MethodOutput::Data(payload)),
            ReturnShape::Mutator => serde_json::from_value(payload)
                .map(MethodOutput::Mutator)
                .map_err(|e| BridgeError::InvalidRequest {
                    message: format!("Malformed mutator descriptor: {}", e),
                }),
            ReturnShape::MutatorList => serde_json::from_value(payload)
                .map(MethodOutput::Mutators)
                .map_err(|e| BridgeError::InvalidRequest {
                    message: format!("Malformed mutator descriptor list: {}", e),
                }),
        }
    }

    /// Decode a payload and wrap every handle it contains.
    ///
    /// Each handle is first checked against the registry, so an unknown
    /// mutator name fails before `wrap` sees it.
    pub fn scan_and_wrap<H, F>(
        &self,
        shape: ReturnShape,
        payload: Value,
        mut wrap: F,
    ) -> Result<Returned<H>>
    where
        F: FnMut(MutatorHandle) -> Result<H>,
    {
        let mut checked = |handle: MutatorHandle| -> Result<H> {
            self.ensure_mutator(&handle.name)?;
            wrap(handle)
        };

        Ok(match Self::decode(shape, payload)? {
            MethodOutput::Data(value) => Returned::Data(value),
            MethodOutput::Mutator(handle) => Returned::Mutator(checked(handle)?),
            MethodOutput::Mutators(handles) => Returned::Mutators(
                handles
                    .into_iter()
                    .map(&mut checked)
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }

    fn ensure_mutator(&self, name: &str) -> Result<()> {
        match self.registry.descriptor(name).map(|d| d.kind()) {
            Some(crate::registry::ServiceKind::Mutator) => Ok(()),
            _ => Err(BridgeError::UnknownMutator {
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallContext;
    use crate::service::{Args, MethodTable, Mutator, RemoteService};
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Tile {
        x: i64,
        y: i64,
    }

    impl RemoteService for Tile {
        const NAME: &'static str = "Tile";

        fn methods() -> MethodTable<Self> {
            MethodTable::<Self>::new().data("sum", |tile, _, _| Ok(json!(tile.x + tile.y)))
        }
    }

    impl Mutator for Tile {
        fn from_args(args: &[Value]) -> Result<Self> {
            let args = Args::new(args);
            Ok(Self {
                x: args.required(0, "x")?,
                y: args.required(1, "y")?,
            })
        }

        fn constructor_args(&self) -> Vec<Value> {
            vec![json!(self.x), json!(self.y)]
        }
    }

    fn registry() -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        registry.register_mutator::<Tile>().unwrap();
        registry
    }

    #[test]
    fn test_serialize_then_reconstruct() {
        let registry = registry();
        let resolver = MutatorResolver::new(&registry);
        let tile = registry.construct_mutator("Tile", &[json!(2), json!(5)]).unwrap();

        let handle = MutatorResolver::serialize(tile.as_ref()).unwrap();
        let rebuilt = resolver.reconstruct(&handle).unwrap();

        let mut store = MemoryStore::new();
        let mut ctx = CallContext::new(&mut store);
        assert_eq!(
            rebuilt.invoke("sum", &[], &mut ctx).unwrap(),
            tile.invoke("sum", &[], &mut ctx).unwrap()
        );
    }

    #[test]
    fn test_reconstruct_unknown_name() {
        let registry = registry();
        let resolver = MutatorResolver::new(&registry);
        let err = resolver
            .reconstruct(&MutatorHandle::new("Ghost", vec![]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownMutator { name } if name == "Ghost"));
    }

    #[test]
    fn test_scan_and_wrap_list() {
        let registry = registry();
        let resolver = MutatorResolver::new(&registry);
        let payload = json!([
            {"isMutator": true, "mutatorName": "Tile", "constructorArgs": [0, 1]},
            {"isMutator": true, "mutatorName": "Tile", "constructorArgs": [2, 3]}
        ]);

        let wrapped = resolver
            .scan_and_wrap(ReturnShape::MutatorList, payload, |h| {
                Ok(h.constructor_args.len())
            })
            .unwrap();
        assert_eq!(wrapped, Returned::Mutators(vec![2, 2]));
    }

    #[test]
    fn test_scan_and_wrap_leaves_data_untouched() {
        let registry = registry();
        let resolver = MutatorResolver::new(&registry);
        let payload = json!({"isMutator": true, "mutatorName": "Tile", "constructorArgs": []});

        let wrapped: Returned<()> = resolver
            .scan_and_wrap(ReturnShape::Data, payload.clone(), |_| Ok(()))
            .unwrap();
        assert_eq!(wrapped, Returned::Data(payload));
    }

    #[test]
    fn test_scan_and_wrap_rejects_unknown_and_malformed() {
        let registry = registry();
        let resolver = MutatorResolver::new(&registry);

        let unknown = json!({"isMutator": true, "mutatorName": "Ghost", "constructorArgs": []});
        let err = resolver
            .scan_and_wrap(ReturnShape::Mutator, unknown, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownMutator { .. }));

        let err = resolver
            .scan_and_wrap(ReturnShape::Mutator, json!([1, 2]), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest { .. }));
    }
}
