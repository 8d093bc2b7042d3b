//! Source collection and the `Source` mutator.

use crate::{emit, missing, payload, read_slice, update_slice};
use bridge_core::{
    Args, BridgeError, CallContext, MethodTable, Mutator, ReducerTable, RemoteService, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

pub const ADD_SOURCE: &str = "ADD_SOURCE";
pub const SET_SOURCE_NAME: &str = "SET_SOURCE_NAME";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesState {
    pub sources: Vec<SourceInfo>,
}

impl SourcesState {
    pub fn find(&self, id: &str) -> Option<&SourceInfo> {
        self.sources.iter().find(|s| s.id == id)
    }
}

#[derive(Serialize, Deserialize)]
struct SourceName {
    id: String,
    name: String,
}

fn source_not_found(id: &str) -> BridgeError {
    BridgeError::InvalidParams {
        message: format!("Source not found: {}", id),
    }
}

pub struct SourcesService;

impl SourcesService {
    fn read(ctx: &CallContext<'_>) -> Result<SourcesState> {
        read_slice(ctx, Self::NAME)
    }
}

impl RemoteService for SourcesService {
    const NAME: &'static str = "SourcesService";

    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .mutator("createSource", |_, args, ctx| {
                let name: String = args.required(0, "name")?;
                let source_type: String = args.required(1, "type")?;
                let id = format!("{}_{}", source_type, uuid::Uuid::new_v4());
                emit(
                    ctx,
                    ADD_SOURCE,
                    &SourceInfo {
                        id: id.clone(),
                        name,
                        source_type,
                    },
                )?;
                debug!(source = %id, "Source created");
                Ok(Source::new(id).handle())
            })
            .mutator("getSource", |_, args, ctx| {
                let id: String = args.required(0, "id")?;
                match Self::read(ctx)?.find(&id) {
                    Some(_) => Ok(Source::new(id).handle()),
                    None => Err(source_not_found(&id)),
                }
            })
            .data("getSources", |_, _, ctx| {
                Ok(serde_json::to_value(Self::read(ctx)?.sources)?)
            })
    }

    fn initial_state() -> Option<Value> {
        Some(json!({ "sources": [] }))
    }

    fn reducers() -> ReducerTable {
        ReducerTable::new()
            .on(ADD_SOURCE, |state, p| {
                let source: SourceInfo = payload(ADD_SOURCE, p)?;
                update_slice(state, |s: &mut SourcesState| {
                    s.sources.push(source);
                    Ok(())
                })
            })
            .on(SET_SOURCE_NAME, |state, p| {
                let SourceName { id, name } = payload(SET_SOURCE_NAME, p)?;
                update_slice(state, |s: &mut SourcesState| {
                    let source = s
                        .sources
                        .iter_mut()
                        .find(|x| x.id == id)
                        .ok_or_else(|| missing(SourcesService::NAME, format_args!("source {}", id)))?;
                    source.name = name;
                    Ok(())
                })
            })
    }
}

pub struct Source {
    source_id: String,
}

impl Source {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }
}

impl RemoteService for Source {
    const NAME: &'static str = "Source";

    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .data("getName", |source, _, ctx| {
                SourcesService::read(ctx)?
                    .find(&source.source_id)
                    .map(|s| json!(s.name))
                    .ok_or_else(|| source_not_found(&source.source_id))
            })
            .data("setName", |source, args, ctx| {
                let name: String = args.required(0, "name")?;
                if SourcesService::read(ctx)?.find(&source.source_id).is_none() {
                    return Err(source_not_found(&source.source_id));
                }
                emit(
                    ctx,
                    SET_SOURCE_NAME,
                    &SourceName {
                        id: source.source_id.clone(),
                        name,
                    },
                )?;
                Ok(Value::Null)
            })
    }
}

impl Mutator for Source {
    fn from_args(args: &[Value]) -> Result<Self> {
        Ok(Self::new(Args::new(args).required::<String>(0, "sourceId")?))
    }

    fn constructor_args(&self) -> Vec<Value> {
        vec![json!(self.source_id)]
    }
}
