//! Models - keyed, ordered record sets synced to a render surface.
//!
//! - `Model<T>` - the synchronized collection, with merge-on-write and
//!   snapshot emission
//! - `ModelDirectory` - the explicit registry of live models and proxies
//! - `ModelStore` - `SyncId` to model map that creates models on first access
//!
//! ## Example
//!
//! ```ignore
//! use synced_rust::{default_store, LogSink, Member, ModelDirectory, SyncScheduler};
//!
//! let directory = ModelDirectory::new(LogSink::new());
//! let store = default_store(&directory)?;
//! let scheduler = SyncScheduler::spawn(directory.clone(), Duration::from_millis(250));
//!
//! let members = store.get_or_create::<Member>(
//!     &Member::sync_id("@alice:example.org", "!room:example.org"),
//! )?;
//! members.insert(Member::new("@bob:example.org"))?;
//! ```

mod directory;
#[allow(clippy::module_inception)]
mod model;
mod store;

pub use directory::{FlushReport, LiveModel, ModelDirectory};
pub use model::Model;
pub use store::{DerivedModel, ModelStore};
