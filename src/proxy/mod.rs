//! Proxies - derived models that stay live-consistent with their sources.
//!
//! A proxy mirrors the records of every model it accepts into its own
//! `Model<T>`, keyed by `ItemKey::Proxied { source, key }`. It subscribes
//! through the [`ModelDirectory`](crate::ModelDirectory): existing sources are
//! replayed once at construction, and every later mutation of any model is
//! delivered inside the mutating call, unless another thread is already
//! delivering that model's changes and takes this one along.
//!
//! Policy is plugged in with strategies rather than subclassing:
//! - [`SourceAcceptor`] decides which models a proxy mirrors
//! - [`ItemAcceptor`] decides which records a [`ModelFilter`] shows
//!
//! ## Example
//!
//! ```ignore
//! // Every room of every account
//! let rooms = ModelProxy::<Room>::with_sources(
//!     &directory,
//!     SyncId::new("every_room"),
//!     SyncIdShape::new("Room", 1),
//! )?;
//!
//! // Rooms with unread messages
//! let unread = ModelFilter::<Room>::new(
//!     &directory,
//!     SyncId::new("unread_rooms"),
//!     SyncIdShape::new("Room", 1),
//!     |room: &Room| room.unreads > 0,
//! )?;
//! ```

mod filter;
#[allow(clippy::module_inception)]
mod proxy;
mod substring;

use std::any::Any;

use crate::error::ModelError;
use crate::sync_id::{ItemKey, SyncId, SyncIdShape};

pub use filter::{ModelFilter, RefilterOutcome};
pub use proxy::ModelProxy;
pub use substring::{matches_filter, FieldSubstringFilter};

/// Receiver of every mutation made to any model of a directory.
///
/// `source_item_set` receives the record as `&dyn Any`; observers ignore
/// records of a type they do not hold. Changes of one source arrive in the
/// order they were made, after the source's lock is released; implementations
/// must never mutate their sources.
pub trait SourceObserver: Send + Sync {
    fn observer_sync_id(&self) -> &SyncId;

    fn source_item_set(
        &self,
        source: &SyncId,
        key: &ItemKey,
        item: &dyn Any,
    ) -> Result<(), ModelError>;

    fn source_item_deleted(&self, source: &SyncId, key: &ItemKey) -> Result<(), ModelError>;

    fn source_cleared(&self, source: &SyncId) -> Result<(), ModelError>;
}

/// Decides which models a proxy mirrors.
///
/// A proxy never receives its own changes, so acceptors need not exclude it.
pub trait SourceAcceptor: Send + Sync {
    fn accept_source(&self, source: &SyncId) -> bool;
}

/// Decides which records a filter shows.
pub trait ItemAcceptor<T>: Send + Sync {
    fn accept_item(&self, item: &T) -> bool;
}

/// Accept every source, or every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl SourceAcceptor for AcceptAll {
    fn accept_source(&self, _source: &SyncId) -> bool {
        true
    }
}

impl<T> ItemAcceptor<T> for AcceptAll {
    fn accept_item(&self, _item: &T) -> bool {
        true
    }
}

impl<F> SourceAcceptor for F
where
    F: Fn(&SyncId) -> bool + Send + Sync,
{
    fn accept_source(&self, source: &SyncId) -> bool {
        self(source)
    }
}

impl<T, F> ItemAcceptor<T> for F
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn accept_item(&self, item: &T) -> bool {
        self(item)
    }
}

/// Accept exactly one source.
impl SourceAcceptor for SyncId {
    fn accept_source(&self, source: &SyncId) -> bool {
        self == source
    }
}

/// Accept every source of this shape.
impl SourceAcceptor for SyncIdShape {
    fn accept_source(&self, source: &SyncId) -> bool {
        source.tag() == self.tag && source.keys().len() == self.arity
    }
}
