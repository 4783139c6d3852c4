//! Typed records stored in models.
//!
//! Records are fixed-shape structs implementing [`ModelItem`], normally through
//! `#[derive(ModelItem)]`:
//!
//! ```ignore
//! use synced_rust::{ModelId, ModelItem};
//!
//! #[derive(Clone, Debug, Default, ModelItem)]
//! #[item(order = "Account::display_order")]
//! pub struct Account {
//!     pub id: String,
//!     pub order: i64,
//!     pub display_name: String,
//!     pub owner: Option<ModelId>,
//! }
//! ```

mod value;

use std::cmp::Ordering;
use std::fmt;

use crate::sync_id::ItemKey;

pub use value::{FieldMap, FieldValue, RenderValue};

/// Lightweight handle naming a live model in a [`ModelDirectory`](crate::ModelDirectory).
///
/// Records hold one of these instead of a pointer to the model that owns them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

impl ModelId {
    pub(crate) fn new(raw: u64) -> Self {
        ModelId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// A record that can be stored in a [`Model`](crate::Model).
pub trait ModelItem: Clone + fmt::Debug + Send + Sync + 'static {
    /// Canonical type name, used as the tag of `SyncId::of::<Self>()`.
    const TYPE_NAME: &'static str;

    /// Declared field names, in declaration order, without the owner handle.
    const FIELDS: &'static [&'static str];

    /// Identity key, unique within the owning model.
    fn key(&self) -> ItemKey;

    /// The model owning this record, if it has been stored in one.
    fn owner(&self) -> Option<ModelId>;

    fn set_owner(&mut self, owner: Option<ModelId>);

    /// Display order. `None` means the two records cannot be compared; a model
    /// that meets such a pair falls back to insertion order for good.
    fn compare(&self, other: &Self) -> Option<Ordering>;

    /// All declared fields in render-surface form.
    fn serialized(&self) -> FieldMap;

    /// One declared field in render-surface form.
    fn field(&self, name: &str) -> Option<RenderValue>;

    /// Merge an incoming partial record into this one.
    ///
    /// Fields the incoming record left at their default are treated as not
    /// specified and keep this record's value. The owner handle is kept.
    fn merged_with(&self, incoming: &Self) -> Self;

    /// Names of the declared fields whose values differ.
    fn changed_fields(&self, other: &Self) -> Vec<&'static str>;

    fn has_field(name: &str) -> bool {
        Self::FIELDS.contains(&name)
    }

    /// Field-for-field equality, ignoring the owner handle.
    fn same_fields(&self, other: &Self) -> bool {
        self.changed_fields(other).is_empty()
    }
}
