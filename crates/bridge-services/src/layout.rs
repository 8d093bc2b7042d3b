//! Editor layout: tabs, pane arrangement and resize bars.
//!
//! Layout is per window and is not forwarded to the host.

use crate::{emit, missing, payload, read_slice, update_slice};
use bridge_core::{BridgeError, CallContext, MethodTable, ReducerTable, RemoteService, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const SET_TAB_NAME: &str = "SET_TAB_NAME";
pub const SET_CURRENT_TAB: &str = "SET_CURRENT_TAB";
pub const SET_RESIZE: &str = "SET_RESIZE";
pub const CHANGE_LAYOUT: &str = "CHANGE_LAYOUT";
pub const SET_SLOTS: &str = "SET_SLOTS";

const DEFAULT_TAB: &str = "default";
const DEFAULT_TAB_NAME: &str = "Editor";
const SLOT_COUNT: u8 = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Layout {
    #[default]
    Default,
    TwoPane,
    Classic,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Bar {
    Bar1,
    Bar2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resizes {
    pub bar1: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bar2: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutTab {
    pub name: Option<String>,
    pub icon: String,
    pub current_layout: Layout,
    /// Element name to slot number ("1" to "6").
    pub slotted_elements: BTreeMap<String, String>,
    pub resizes: Resizes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutState {
    pub current_tab: String,
    pub tabs: BTreeMap<String, LayoutTab>,
}

impl Default for LayoutState {
    fn default() -> Self {
        let slotted_elements = [
            ("Display", "1"),
            ("Minifeed", "2"),
            ("Scenes", "3"),
            ("Sources", "4"),
            ("Mixer", "5"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let tab = LayoutTab {
            name: None,
            icon: "icon-studio".to_string(),
            current_layout: Layout::Default,
            slotted_elements,
            resizes: Resizes {
                bar1: 156,
                bar2: Some(240),
            },
        };

        Self {
            current_tab: DEFAULT_TAB.to_string(),
            tabs: BTreeMap::from([(DEFAULT_TAB.to_string(), tab)]),
        }
    }
}

impl LayoutState {
    fn tab_mut(&mut self, id: &str) -> Result<&mut LayoutTab> {
        self.tabs
            .get_mut(id)
            .ok_or_else(|| missing(LayoutService::NAME, format_args!("layout tab {}", id)))
    }

    fn current_mut(&mut self) -> Result<&mut LayoutTab> {
        let current = self.current_tab.clone();
        self.tab_mut(&current)
    }
}

#[derive(Serialize, Deserialize)]
struct TabName {
    id: String,
    name: String,
}

#[derive(Serialize, Deserialize)]
struct TabId {
    id: String,
}

#[derive(Serialize, Deserialize)]
struct Resize {
    bar: Bar,
    size: u32,
}

#[derive(Serialize, Deserialize)]
struct LayoutChange {
    layout: Layout,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Slots {
    slotted_elements: BTreeMap<String, String>,
}

pub struct LayoutService;

impl LayoutService {
    /// Constructor: names the default tab the first time the service starts.
    pub fn init(ctx: &mut CallContext<'_>) -> Result<Self> {
        let state = Self::read(ctx)?;
        let unnamed = state
            .tabs
            .get(DEFAULT_TAB)
            .is_some_and(|tab| tab.name.is_none());
        if unnamed {
            emit(
                ctx,
                SET_TAB_NAME,
                &TabName {
                    id: DEFAULT_TAB.to_string(),
                    name: DEFAULT_TAB_NAME.to_string(),
                },
            )?;
        }
        Ok(Self)
    }

    fn read(ctx: &CallContext<'_>) -> Result<LayoutState> {
        read_slice(ctx, Self::NAME)
    }
}

impl RemoteService for LayoutService {
    const NAME: &'static str = "LayoutService";

    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .data("getCurrentTab", |_, _, ctx| {
                let state = Self::read(ctx)?;
                Ok(state
                    .tabs
                    .get(&state.current_tab)
                    .map(serde_json::to_value)
                    .transpose()?
                    .unwrap_or(Value::Null))
            })
            .data("setCurrentTab", |_, args, ctx| {
                let id: String = args.required(0, "id")?;
                if !Self::read(ctx)?.tabs.contains_key(&id) {
                    return Err(BridgeError::InvalidParams {
                        message: format!("Unknown layout tab: {}", id),
                    });
                }
                emit(ctx, SET_CURRENT_TAB, &TabId { id })?;
                Ok(Value::Null)
            })
            .data("setBarResize", |_, args, ctx| {
                let bar: Bar = args.required(0, "bar")?;
                let size: u32 = args.required(1, "size")?;
                emit(ctx, SET_RESIZE, &Resize { bar, size })?;
                Ok(Value::Null)
            })
            .data("changeLayout", |_, args, ctx| {
                let layout: Layout = args.required(0, "layout")?;
                emit(ctx, CHANGE_LAYOUT, &LayoutChange { layout })?;
                Ok(Value::Null)
            })
            .data("setSlots", |_, args, ctx| {
                let slotted_elements: BTreeMap<String, String> =
                    args.required(0, "slottedElements")?;
                let invalid = slotted_elements
                    .iter()
                    .find(|(_, slot)| !valid_slot(slot));
                if let Some((element, slot)) = invalid {
                    return Err(BridgeError::InvalidParams {
                        message: format!("Invalid slot {} for {}", slot, element),
                    });
                }
                emit(ctx, SET_SLOTS, &Slots { slotted_elements })?;
                Ok(Value::Null)
            })
    }

    fn initial_state() -> Option<Value> {
        serde_json::to_value(LayoutState::default()).ok()
    }

    fn reducers() -> ReducerTable {
        ReducerTable::new()
            .on(SET_TAB_NAME, |state, p| {
                let TabName { id, name } = payload(SET_TAB_NAME, p)?;
                update_slice(state, |s: &mut LayoutState| {
                    s.tab_mut(&id)?.name = Some(name);
                    Ok(())
                })
            })
            .on(SET_CURRENT_TAB, |state, p| {
                let TabId { id } = payload(SET_CURRENT_TAB, p)?;
                update_slice(state, |s: &mut LayoutState| {
                    s.tab_mut(&id)?;
                    s.current_tab = id;
                    Ok(())
                })
            })
            .on(SET_RESIZE, |state, p| {
                let Resize { bar, size } = payload(SET_RESIZE, p)?;
                update_slice(state, |s: &mut LayoutState| {
                    let tab = s.current_mut()?;
                    match bar {
                        Bar::Bar1 => tab.resizes.bar1 = size,
                        Bar::Bar2 => tab.resizes.bar2 = Some(size),
                    }
                    Ok(())
                })
            })
            .on(CHANGE_LAYOUT, |state, p| {
                let LayoutChange { layout } = payload(CHANGE_LAYOUT, p)?;
                update_slice(state, |s: &mut LayoutState| {
                    s.current_mut()?.current_layout = layout;
                    Ok(())
                })
            })
            .on(SET_SLOTS, |state, p| {
                let Slots { slotted_elements } = payload(SET_SLOTS, p)?;
                update_slice(state, |s: &mut LayoutState| {
                    s.current_mut()?.slotted_elements = slotted_elements;
                    Ok(())
                })
            })
    }
}

fn valid_slot(slot: &str) -> bool {
    slot.parse::<u8>()
        .is_ok_and(|n| (1..=SLOT_COUNT).contains(&n))
}
