//! Audio mixer state and the `AudioSource` mutator.
//!
//! `AudioService` keeps one entry per audio-capable source. Satellites reach
//! a single source through `getSource(id)`, which hands back an
//! `AudioSource` handle; its setters emit the mutations that move the fader.

use crate::{emit, missing, payload, read_slice, update_slice};
use bridge_core::{
    Args, BridgeError, CallContext, MethodTable, Mutator, ReducerTable, RemoteService, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const REGISTER_AUDIO_SOURCE: &str = "REGISTER_AUDIO_SOURCE";
pub const SET_VOLUME: &str = "SET_VOLUME";
pub const SET_MUTED: &str = "SET_MUTED";

const DEFAULT_VOLUME: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSourceInfo {
    pub source_id: String,
    pub name: String,
    pub volume: f64,
    pub muted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioState {
    pub sources: BTreeMap<String, AudioSourceInfo>,
}

impl AudioState {
    fn source_mut(&mut self, id: &str) -> Result<&mut AudioSourceInfo> {
        self.sources
            .get_mut(id)
            .ok_or_else(|| missing(AudioService::NAME, format_args!("audio source {}", id)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeChange {
    pub source_id: String,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteChange {
    pub source_id: String,
    pub muted: bool,
}

fn audio_source_not_found(id: &str) -> BridgeError {
    BridgeError::InvalidParams {
        message: format!("Audio source not found: {}", id),
    }
}

pub struct AudioService;

impl AudioService {
    fn read(ctx: &CallContext<'_>) -> Result<AudioState> {
        read_slice(ctx, Self::NAME)
    }
}

impl RemoteService for AudioService {
    const NAME: &'static str = "AudioService";

    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .data("registerSource", |_, args, ctx| {
                let source_id: String = args.required(0, "sourceId")?;
                let name: String = args.required(1, "name")?;
                if Self::read(ctx)?.sources.contains_key(&source_id) {
                    return Err(BridgeError::InvalidParams {
                        message: format!("Audio source already registered: {}", source_id),
                    });
                }
                emit(
                    ctx,
                    REGISTER_AUDIO_SOURCE,
                    &AudioSourceInfo {
                        source_id: source_id.clone(),
                        name,
                        volume: DEFAULT_VOLUME,
                        muted: false,
                    },
                )?;
                debug!(source = %source_id, "Audio source registered");
                Ok(Value::Null)
            })
            .mutator("getSource", |_, args, ctx| {
                let source_id: String = args.required(0, "sourceId")?;
                if !Self::read(ctx)?.sources.contains_key(&source_id) {
                    return Err(audio_source_not_found(&source_id));
                }
                Ok(AudioSource::new(source_id).handle())
            })
            .mutators("getSources", |_, _, ctx| {
                Ok(Self::read(ctx)?
                    .sources
                    .into_keys()
                    .map(|id| AudioSource::new(id).handle())
                    .collect())
            })
    }

    fn initial_state() -> Option<Value> {
        Some(json!({ "sources": {} }))
    }

    fn reducers() -> ReducerTable {
        ReducerTable::new()
            .on(REGISTER_AUDIO_SOURCE, |state, p| {
                let source: AudioSourceInfo = payload(REGISTER_AUDIO_SOURCE, p)?;
                update_slice(state, |s: &mut AudioState| {
                    s.sources.insert(source.source_id.clone(), source);
                    Ok(())
                })
            })
            .on(SET_VOLUME, |state, p| {
                let change: VolumeChange = payload(SET_VOLUME, p)?;
                update_slice(state, |s: &mut AudioState| {
                    s.source_mut(&change.source_id)?.volume = change.volume;
                    Ok(())
                })
            })
            .on(SET_MUTED, |state, p| {
                let change: MuteChange = payload(SET_MUTED, p)?;
                update_slice(state, |s: &mut AudioState| {
                    s.source_mut(&change.source_id)?.muted = change.muted;
                    Ok(())
                })
            })
    }
}

/// Fader controls for one audio source.
pub struct AudioSource {
    source_id: String,
}

impl AudioSource {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    fn info(&self, ctx: &CallContext<'_>) -> Result<AudioSourceInfo> {
        AudioService::read(ctx)?
            .sources
            .remove(&self.source_id)
            .ok_or_else(|| audio_source_not_found(&self.source_id))
    }
}

impl RemoteService for AudioSource {
    const NAME: &'static str = "AudioSource";

    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .data("getVolume", |source, _, ctx| Ok(json!(source.info(ctx)?.volume)))
            .data("isMuted", |source, _, ctx| Ok(json!(source.info(ctx)?.muted)))
            .data("getModel", |source, _, ctx| {
                Ok(serde_json::to_value(source.info(ctx)?)?)
            })
            .data("setVolume", |source, args, ctx| {
                let volume: f64 = args.required(0, "volume")?;
                if !(0.0..=1.0).contains(&volume) {
                    return Err(BridgeError::InvalidParams {
                        message: format!("volume must be between 0 and 1, got {}", volume),
                    });
                }
                source.info(ctx)?;
                emit(
                    ctx,
                    SET_VOLUME,
                    &VolumeChange {
                        source_id: source.source_id.clone(),
                        volume,
                    },
                )?;
                Ok(Value::Null)
            })
            .data("setMuted", |source, args, ctx| {
                let muted: bool = args.required(0, "muted")?;
                source.info(ctx)?;
                emit(
                    ctx,
                    SET_MUTED,
                    &MuteChange {
                        source_id: source.source_id.clone(),
                        muted,
                    },
                )?;
                Ok(Value::Null)
            })
    }
}

impl Mutator for AudioSource {
    fn from_args(args: &[Value]) -> Result<Self> {
        Ok(Self::new(Args::new(args).required::<String>(0, "sourceId")?))
    }

    fn constructor_args(&self) -> Vec<Value> {
        vec![json!(self.source_id)]
    }
}
