//! Render sinks - where model changes leave the backend.
//!
//! Every flushed model produces a [`RenderEvent::ModelUpdated`] snapshot that
//! the render surface applies as a full replacement of its view of that sync
//! id. Field changes, deletions and clears also produce granular events so
//! the surface can update in place before the next snapshot arrives.
//!
//! Sinks:
//! - `ChannelSink` - std mpsc channel to a render thread
//! - `LogSink` - tracing output or an in-memory buffer, for tests and debugging
//! - `EmitterSink` - in-process `EventEmitter` (requires `emitter` feature)

mod publisher;

use serde::Serialize;
use thiserror::Error;

use crate::item::FieldMap;
use crate::sync_id::{ItemKey, SyncId};

pub use publisher::{ChannelSink, LogSink};
#[cfg(feature = "emitter")]
pub use publisher::EmitterSink;

/// Event sent to the render surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum RenderEvent {
    /// Full ordered snapshot of a model.
    ModelUpdated {
        sync_id: SyncId,
        items: Vec<FieldMap>,
    },
    /// Fields of one record changed; `index_then` is `None` for insertions.
    ItemSet {
        sync_id: SyncId,
        key: ItemKey,
        index_then: Option<usize>,
        index_now: usize,
        fields: FieldMap,
    },
    /// `count` adjacent records removed, the first one at `index`.
    ///
    /// A batch removal sends one event per run of adjacent records; each
    /// `index` applies to the view left by the events before it.
    ItemsDeleted {
        sync_id: SyncId,
        index: usize,
        count: usize,
        keys: Vec<ItemKey>,
    },
    ModelCleared {
        sync_id: SyncId,
    },
}

impl RenderEvent {
    /// Event name, as used by emitter listeners.
    pub fn name(&self) -> &'static str {
        match self {
            RenderEvent::ModelUpdated { .. } => "ModelUpdated",
            RenderEvent::ItemSet { .. } => "ItemSet",
            RenderEvent::ItemsDeleted { .. } => "ItemsDeleted",
            RenderEvent::ModelCleared { .. } => "ModelCleared",
        }
    }

    pub fn sync_id(&self) -> &SyncId {
        match self {
            RenderEvent::ModelUpdated { sync_id, .. }
            | RenderEvent::ItemSet { sync_id, .. }
            | RenderEvent::ItemsDeleted { sync_id, .. }
            | RenderEvent::ModelCleared { sync_id } => sync_id,
        }
    }
}

/// Error type for render sinks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The receiving end went away.
    #[error("render surface disconnected")]
    Disconnected,
    #[error("render sink buffer poisoned")]
    BufferPoisoned,
    #[error("failed to encode render event: {0}")]
    Encode(String),
}

/// Destination of render events.
///
/// Sinks are called while the emitting model's lock is held, so they must
/// not call back into models.
pub trait RenderSink: Send + Sync {
    fn send(&self, event: RenderEvent) -> Result<(), SinkError>;
}

/// Sink discarding every event, for models nobody renders.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn send(&self, _event: RenderEvent) -> Result<(), SinkError> {
        Ok(())
    }
}
