//! Scene collection, the `Scene` mutator and the `SceneItem` mutator.
//!
//! A scene holds items, each placing one source. `Scene.addSource` returns a
//! `SceneItem` handle, so a satellite can go from the collection to a single
//! item through two levels of handles.

use crate::sources::{SourcesService, SourcesState};
use crate::{emit, missing, payload, read_slice, update_slice};
use bridge_core::{
    Args, BridgeError, CallContext, MethodTable, Mutator, ReducerTable, RemoteService, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

pub const ADD_SCENE: &str = "ADD_SCENE";
pub const REMOVE_SCENE: &str = "REMOVE_SCENE";
pub const RENAME_SCENE: &str = "RENAME_SCENE";
pub const ADD_SCENE_ITEM: &str = "ADD_SCENE_ITEM";
pub const SET_SCENE_ITEM_VISIBILITY: &str = "SET_SCENE_ITEM_VISIBILITY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItemInfo {
    pub id: String,
    pub source_id: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<SceneItemInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenesState {
    pub scenes: Vec<SceneInfo>,
}

impl ScenesState {
    pub fn find(&self, id: &str) -> Option<&SceneInfo> {
        self.scenes.iter().find(|s| s.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut SceneInfo> {
        self.scenes
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| missing(ScenesService::NAME, format_args!("scene {}", id)))
    }
}

#[derive(Serialize, Deserialize)]
struct SceneId {
    id: String,
}

#[derive(Serialize, Deserialize)]
struct SceneName {
    id: String,
    name: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewItem {
    scene_id: String,
    item: SceneItemInfo,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemVisibility {
    scene_id: String,
    item_id: String,
    visible: bool,
}

fn scene_not_found(id: &str) -> BridgeError {
    BridgeError::InvalidParams {
        message: format!("Scene not found: {}", id),
    }
}

pub struct ScenesService;

impl ScenesService {
    fn read(ctx: &CallContext<'_>) -> Result<ScenesState> {
        read_slice(ctx, Self::NAME)
    }
}

impl RemoteService for ScenesService {
    const NAME: &'static str = "ScenesService";

    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .data("getScenes", |_, _, ctx| {
                Ok(serde_json::to_value(Self::read(ctx)?.scenes)?)
            })
            .mutator("createScene", |_, args, ctx| {
                let name: String = args.required(0, "name")?;
                let id = uuid::Uuid::new_v4().to_string();
                emit(
                    ctx,
                    ADD_SCENE,
                    &SceneInfo {
                        id: id.clone(),
                        name,
                        items: Vec::new(),
                    },
                )?;
                debug!(scene = %id, "Scene created");
                Ok(Scene::new(id).handle())
            })
            .mutator("getScene", |_, args, ctx| {
                let id: String = args.required(0, "id")?;
                if Self::read(ctx)?.find(&id).is_none() {
                    return Err(scene_not_found(&id));
                }
                Ok(Scene::new(id).handle())
            })
            .mutators("getSceneHandles", |_, _, ctx| {
                Ok(Self::read(ctx)?
                    .scenes
                    .into_iter()
                    .map(|s| Scene::new(s.id).handle())
                    .collect())
            })
            .data("removeScene", |_, args, ctx| {
                let id: String = args.required(0, "id")?;
                if Self::read(ctx)?.find(&id).is_none() {
                    return Ok(json!(false));
                }
                emit(ctx, REMOVE_SCENE, &SceneId { id })?;
                Ok(json!(true))
            })
    }

    fn initial_state() -> Option<Value> {
        Some(json!({ "scenes": [] }))
    }

    fn reducers() -> ReducerTable {
        ReducerTable::new()
            .on(ADD_SCENE, |state, p| {
                let scene: SceneInfo = payload(ADD_SCENE, p)?;
                update_slice(state, |s: &mut ScenesState| {
                    s.scenes.push(scene);
                    Ok(())
                })
            })
            .on(REMOVE_SCENE, |state, p| {
                let SceneId { id } = payload(REMOVE_SCENE, p)?;
                update_slice(state, |s: &mut ScenesState| {
                    s.find_mut(&id)?;
                    s.scenes.retain(|x| x.id != id);
                    Ok(())
                })
            })
            .on(RENAME_SCENE, |state, p| {
                let SceneName { id, name } = payload(RENAME_SCENE, p)?;
                update_slice(state, |s: &mut ScenesState| {
                    s.find_mut(&id)?.name = name;
                    Ok(())
                })
            })
            .on(ADD_SCENE_ITEM, |state, p| {
                let NewItem { scene_id, item } = payload(ADD_SCENE_ITEM, p)?;
                update_slice(state, |s: &mut ScenesState| {
                    s.find_mut(&scene_id)?.items.push(item);
                    Ok(())
                })
            })
            .on(SET_SCENE_ITEM_VISIBILITY, |state, p| {
                let change: ItemVisibility = payload(SET_SCENE_ITEM_VISIBILITY, p)?;
                update_slice(state, |s: &mut ScenesState| {
                    let item = s
                        .find_mut(&change.scene_id)?
                        .items
                        .iter_mut()
                        .find(|i| i.id == change.item_id)
                        .ok_or_else(|| {
                            missing(ScenesService::NAME, format_args!("scene item {}", change.item_id))
                        })?;
                    item.visible = change.visible;
                    Ok(())
                })
            })
    }
}

/// One scene, identified by its id.
pub struct Scene {
    id: String,
}

impl Scene {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn info(&self, ctx: &CallContext<'_>) -> Result<SceneInfo> {
        ScenesService::read(ctx)?
            .find(&self.id)
            .cloned()
            .ok_or_else(|| scene_not_found(&self.id))
    }
}

impl RemoteService for Scene {
    const NAME: &'static str = "Scene";

    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .data("getId", |scene, _, _| Ok(json!(scene.id)))
            .data("getName", |scene, _, ctx| Ok(json!(scene.info(ctx)?.name)))
            .data("rename", |scene, args, ctx| {
                let name: String = args.required(0, "name")?;
                scene.info(ctx)?;
                emit(
                    ctx,
                    RENAME_SCENE,
                    &SceneName {
                        id: scene.id.clone(),
                        name,
                    },
                )?;
                Ok(Value::Null)
            })
            .mutator("addSource", |scene, args, ctx| {
                let source_id: String = args.required(0, "sourceId")?;
                scene.info(ctx)?;
                let sources: SourcesState = read_slice(ctx, SourcesService::NAME)?;
                if sources.find(&source_id).is_none() {
                    return Err(BridgeError::InvalidParams {
                        message: format!("Source not found: {}", source_id),
                    });
                }
                let item = SceneItemInfo {
                    id: uuid::Uuid::new_v4().to_string(),
                    source_id,
                    visible: true,
                };
                let handle = SceneItem::new(scene.id.clone(), item.id.clone()).handle();
                emit(
                    ctx,
                    ADD_SCENE_ITEM,
                    &NewItem {
                        scene_id: scene.id.clone(),
                        item,
                    },
                )?;
                Ok(handle)
            })
            .mutators("getItems", |scene, _, ctx| {
                Ok(scene
                    .info(ctx)?
                    .items
                    .into_iter()
                    .map(|i| SceneItem::new(scene.id.clone(), i.id).handle())
                    .collect())
            })
    }
}

impl Mutator for Scene {
    fn from_args(args: &[Value]) -> Result<Self> {
        Ok(Self::new(Args::new(args).required::<String>(0, "sceneId")?))
    }

    fn constructor_args(&self) -> Vec<Value> {
        vec![json!(self.id)]
    }
}

/// One source placed in one scene.
pub struct SceneItem {
    scene_id: String,
    item_id: String,
}

impl SceneItem {
    pub fn new(scene_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            item_id: item_id.into(),
        }
    }

    fn info(&self, ctx: &CallContext<'_>) -> Result<SceneItemInfo> {
        Scene::new(self.scene_id.as_str())
            .info(ctx)?
            .items
            .into_iter()
            .find(|i| i.id == self.item_id)
            .ok_or_else(|| BridgeError::InvalidParams {
                message: format!("Scene item not found: {}", self.item_id),
            })
    }
}

impl RemoteService for SceneItem {
    const NAME: &'static str = "SceneItem";

    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .data("getModel", |item, _, ctx| Ok(serde_json::to_value(item.info(ctx)?)?))
            .data("isVisible", |item, _, ctx| Ok(json!(item.info(ctx)?.visible)))
            .data("setVisibility", |item, args, ctx| {
                let visible: bool = args.required(0, "visible")?;
                item.info(ctx)?;
                emit(
                    ctx,
                    SET_SCENE_ITEM_VISIBILITY,
                    &ItemVisibility {
                        scene_id: item.scene_id.clone(),
                        item_id: item.item_id.clone(),
                        visible,
                    },
                )?;
                Ok(Value::Null)
            })
    }
}

impl Mutator for SceneItem {
    fn from_args(args: &[Value]) -> Result<Self> {
        let args = Args::new(args);
        Ok(Self::new(
            args.required::<String>(0, "sceneId")?,
            args.required::<String>(1, "itemId")?,
        ))
    }

    fn constructor_args(&self) -> Vec<Value> {
        vec![json!(self.scene_id), json!(self.item_id)]
    }
}
