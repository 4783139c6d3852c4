// Lets the derive macro's `synced_rust::` paths resolve inside this crate
extern crate self as synced_rust;

mod config;
mod error;
mod item;
mod items;
mod model;
mod proxy;
mod scheduler;
mod sink;
mod sync_id;

pub use config::{SyncConfig, DEFAULT_FLUSH_INTERVAL};
pub use error::{ModelError, OptionalExt};
pub use item::{FieldMap, FieldValue, ModelId, ModelItem, RenderValue};
pub use items::{
    all_rooms, default_store, filtered_members, filtered_members_id, matching_accounts, Account,
    Event, Member, Presence, Room, Upload, UploadStatus, ALL_ROOMS, FILTERED_MEMBERS,
    MATCHING_ACCOUNTS,
};
pub use model::{DerivedModel, FlushReport, LiveModel, Model, ModelDirectory, ModelStore};
pub use proxy::{
    matches_filter, AcceptAll, FieldSubstringFilter, ItemAcceptor, ModelFilter, ModelProxy,
    RefilterOutcome, SourceAcceptor, SourceObserver,
};
pub use scheduler::{SchedulerStats, SyncScheduler};
#[cfg(feature = "emitter")]
pub use sink::EmitterSink;
pub use sink::{ChannelSink, LogSink, NullSink, RenderEvent, RenderSink, SinkError};
pub use sync_id::{ItemKey, SyncId, SyncIdShape};

// Derive macro for `ModelItem`
pub use synced_rust_macros::ModelItem;

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
