use std::any::Any;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use super::directory::{DirectoryInner, LiveModel, ModelDirectory};
use crate::error::ModelError;
use crate::item::{FieldMap, ModelId, ModelItem};
use crate::proxy::SourceObserver;
use crate::sink::{RenderEvent, RenderSink};
use crate::sync_id::{ItemKey, SyncId};

/// A change waiting to be delivered to observers.
enum Outgoing<T> {
    Set(ItemKey, T),
    Deleted(ItemKey),
    Cleared,
    /// A current record, for one newly subscribed observer only.
    Replay(Arc<dyn SourceObserver>, ItemKey, T),
}

/// Records of one model, guarded by the model lock.
struct ModelState<T> {
    /// Insertion order.
    items: IndexMap<ItemKey, T>,
    /// Display order, kept sorted on every write. Unused once `unsortable`.
    sorted: Vec<ItemKey>,
    dirty: bool,
    /// Set once a pair of records could not be compared; display order is
    /// then insertion order.
    unsortable: bool,
    /// Changes not yet delivered to observers, in mutation order.
    outgoing: VecDeque<Outgoing<T>>,
}

impl<T: ModelItem> ModelState<T> {
    fn new() -> Self {
        ModelState {
            items: IndexMap::new(),
            sorted: Vec::new(),
            dirty: false,
            unsortable: false,
            outgoing: VecDeque::new(),
        }
    }

    /// Display position of `key`.
    fn position_of(&self, key: &ItemKey) -> Option<usize> {
        if self.unsortable {
            self.items.get_index_of(key)
        } else {
            self.sorted.iter().position(|k| k == key)
        }
    }

    /// Entries in display order.
    fn ordered(&self) -> Vec<(&ItemKey, &T)> {
        if self.unsortable {
            self.items.iter().collect()
        } else {
            self.sorted
                .iter()
                .filter_map(|key| self.items.get_key_value(key))
                .collect()
        }
    }

    /// Store `item` under `key` and move it to its display position.
    /// Returns the positions before and after.
    fn put(&mut self, sync_id: &SyncId, key: &ItemKey, item: T) -> (Option<usize>, usize) {
        let index_then = self.position_of(key);
        if let (false, Some(index)) = (self.unsortable, index_then) {
            self.sorted.remove(index);
        }

        self.items.insert(key.clone(), item);
        if !self.unsortable {
            self.place(sync_id, key);
        }
        let index_now = self.position_of(key).unwrap_or_default();
        (index_then, index_now)
    }

    fn place(&mut self, sync_id: &SyncId, key: &ItemKey) {
        let point = match self.items.get(key) {
            Some(item) => self.insertion_point(item),
            None => return,
        };
        match point {
            Some(index) => self.sorted.insert(index, key.clone()),
            None => self.fall_back(sync_id),
        }
    }

    /// Binary search for the slot of `item` in `sorted`, after any equal
    /// records. `None` as soon as a comparison is undefined.
    fn insertion_point(&self, item: &T) -> Option<usize> {
        let (mut low, mut high) = (0, self.sorted.len());
        while low < high {
            let mid = low + (high - low) / 2;
            let other = self.items.get(&self.sorted[mid])?;
            match other.compare(item)? {
                Ordering::Greater => high = mid,
                Ordering::Less | Ordering::Equal => low = mid + 1,
            }
        }
        Some(low)
    }

    fn fall_back(&mut self, sync_id: &SyncId) {
        warn!(
            sync_id = %sync_id,
            item_type = T::TYPE_NAME,
            "records are not comparable, keeping insertion order"
        );
        self.unsortable = true;
        self.sorted.clear();
    }

    /// Remove `key`, returning its display position and record.
    fn take(&mut self, key: &ItemKey) -> Option<(usize, T)> {
        let index = self.position_of(key)?;
        let item = self.items.shift_remove(key)?;
        if !self.unsortable {
            self.sorted.remove(index);
        }
        Some((index, item))
    }

    fn serialized(&self) -> Vec<FieldMap> {
        self.ordered()
            .into_iter()
            .map(|(_, item)| item.serialized())
            .collect()
    }
}

/// Exclusive right to deliver one model's queued changes.
struct Delivery<'a>(&'a AtomicBool);

impl<'a> Delivery<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, AtomicOrdering::Acquire, AtomicOrdering::Relaxed)
            .ok()
            .map(|_| Delivery(flag))
    }
}

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        self.0.store(false, AtomicOrdering::Release);
    }
}

/// A keyed, ordered set of records mirrored to the render surface.
///
/// Every mutation marks the model dirty, emits a granular [`RenderEvent`] and
/// is forwarded to every proxy registered in the model's [`ModelDirectory`].
/// Forwarding happens after the model lock is released, in mutation order,
/// before the mutating call returns unless another thread is already
/// forwarding this model's changes. The dirty model is serialized into a
/// [`RenderEvent::ModelUpdated`] snapshot by the
/// [`SyncScheduler`](crate::SyncScheduler) or by [`Model::sync_now`].
///
/// ## Example
///
/// ```ignore
/// let directory = ModelDirectory::new(LogSink::new());
/// let accounts = Model::<Account>::new(&directory, SyncId::of::<Account>())?;
///
/// accounts.insert(Account::new("@alice:example.org"))?;
/// accounts.modify(&"@alice:example.org".into(), |a| a.display_name = "Alice".into())?;
/// accounts.sync_now()?;
/// ```
pub struct Model<T: ModelItem> {
    id: ModelId,
    sync_id: SyncId,
    /// Proxies mirror records without taking ownership of them.
    owns_items: bool,
    state: Mutex<ModelState<T>>,
    delivering: AtomicBool,
    directory: Weak<DirectoryInner>,
    sink: Arc<dyn RenderSink>,
}

impl<T: ModelItem> Model<T> {
    /// Create a model and register it with the directory.
    ///
    /// Fails with `AlreadyRegistered` if the directory already holds a model
    /// under `sync_id`.
    pub fn new(directory: &ModelDirectory, sync_id: SyncId) -> Result<Arc<Self>, ModelError> {
        Self::create(directory, sync_id, true)
    }

    pub(crate) fn create(
        directory: &ModelDirectory,
        sync_id: SyncId,
        owns_items: bool,
    ) -> Result<Arc<Self>, ModelError> {
        sync_id.validate()?;

        let model = Arc::new(Model {
            id: directory.next_model_id(),
            sync_id,
            owns_items,
            state: Mutex::new(ModelState::new()),
            delivering: AtomicBool::new(false),
            directory: directory.downgrade(),
            sink: directory.sink(),
        });
        directory.register_model(&model)?;
        Ok(model)
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn sync_id(&self) -> &SyncId {
        &self.sync_id
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, ModelState<T>>, ModelError> {
        self.state
            .lock()
            .map_err(|_| ModelError::LockPoisoned(operation))
    }

    fn not_found(&self, key: &ItemKey) -> ModelError {
        ModelError::not_found(&self.sync_id, key)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get a record by key. Missing keys are `ModelError::NotFound`.
    pub fn get(&self, key: &ItemKey) -> Result<T, ModelError> {
        let state = self.lock("get")?;
        state
            .items
            .get(key)
            .cloned()
            .ok_or_else(|| self.not_found(key))
    }

    /// Get a record by key, `None` if missing.
    pub fn find(&self, key: &ItemKey) -> Result<Option<T>, ModelError> {
        let state = self.lock("find")?;
        Ok(state.items.get(key).cloned())
    }

    pub fn contains_key(&self, key: &ItemKey) -> Result<bool, ModelError> {
        Ok(self.lock("contains_key")?.items.contains_key(key))
    }

    pub fn len(&self) -> Result<usize, ModelError> {
        Ok(self.lock("len")?.items.len())
    }

    pub fn is_empty(&self) -> Result<bool, ModelError> {
        Ok(self.len()? == 0)
    }

    pub fn is_dirty(&self) -> Result<bool, ModelError> {
        Ok(self.lock("is_dirty")?.dirty)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Result<Vec<ItemKey>, ModelError> {
        Ok(self.lock("keys")?.items.keys().cloned().collect())
    }

    /// Records in insertion order.
    pub fn values(&self) -> Result<Vec<T>, ModelError> {
        Ok(self.lock("values")?.items.values().cloned().collect())
    }

    /// Entries in insertion order.
    pub fn items(&self) -> Result<Vec<(ItemKey, T)>, ModelError> {
        let state = self.lock("items")?;
        Ok(state
            .items
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Entries in display order.
    pub fn sorted_items(&self) -> Result<Vec<(ItemKey, T)>, ModelError> {
        let state = self.lock("sorted_items")?;
        Ok(state
            .ordered()
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Display position of a record.
    pub fn index_of(&self, key: &ItemKey) -> Result<Option<usize>, ModelError> {
        Ok(self.lock("index_of")?.position_of(key))
    }

    /// Ordered field maps of every record.
    pub fn serialized(&self) -> Result<Vec<FieldMap>, ModelError> {
        Ok(self.lock("serialized")?.serialized())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or merge a record.
    ///
    /// An absent key stores `item` as is. A present key merges field by field:
    /// values `item` left at their default keep the stored value. A merge that
    /// changes nothing is a no-op: the model stays clean and proxies are not
    /// notified. Otherwise a [`RenderEvent::ItemSet`] carrying the changed
    /// fields is emitted. Returns whether the model changed.
    pub fn set(&self, key: impl Into<ItemKey>, item: T) -> Result<bool, ModelError> {
        let key = key.into();
        {
            let mut state = self.lock("set")?;
            let (stored, changed) = match state.items.get(&key) {
                Some(existing) => {
                    let merged = existing.merged_with(&item);
                    let changed = existing.changed_fields(&merged);
                    if changed.is_empty() {
                        return Ok(false);
                    }
                    (merged, Some(changed))
                }
                None => (self.adopt(item), None),
            };
            self.commit(&mut state, key, stored, changed);
        }
        self.deliver_pending()?;
        Ok(true)
    }

    /// Insert or merge a record under its own identity key.
    pub fn insert(&self, item: T) -> Result<bool, ModelError> {
        self.set(item.key(), item)
    }

    /// Store a complete record without merging. Identical records are a no-op.
    pub fn replace(&self, key: impl Into<ItemKey>, item: T) -> Result<bool, ModelError> {
        let changed = self.replace_staged(key.into(), item)?;
        self.deliver_pending()?;
        Ok(changed)
    }

    /// [`Model::replace`] without delivering to observers; the caller must
    /// call [`Model::deliver_pending`] once its own locks are released.
    pub(crate) fn replace_staged(&self, key: ItemKey, item: T) -> Result<bool, ModelError> {
        let mut state = self.lock("replace")?;
        let changed = match state.items.get(&key) {
            Some(existing) => {
                let changed = existing.changed_fields(&item);
                if changed.is_empty() {
                    return Ok(false);
                }
                Some(changed)
            }
            None => None,
        };
        let stored = self.adopt(item);
        self.commit(&mut state, key, stored, changed);
        Ok(true)
    }

    /// Change fields of a stored record in place.
    ///
    /// Setting fields to their current values is a no-op. Otherwise an
    /// [`RenderEvent::ItemSet`] with the new values and the record's old and
    /// new display positions is emitted right away, the model is marked dirty
    /// so the next snapshot includes the change, and proxies are notified.
    pub fn modify<F>(&self, key: &ItemKey, f: F) -> Result<bool, ModelError>
    where
        F: FnOnce(&mut T),
    {
        {
            let mut state = self.lock("modify")?;
            let current = state
                .items
                .get(key)
                .cloned()
                .ok_or_else(|| self.not_found(key))?;

            let mut updated = current.clone();
            f(&mut updated);
            updated.set_owner(current.owner());

            if updated.key() != current.key() {
                return Err(ModelError::FieldNotMutable {
                    field: "identity key".to_string(),
                });
            }

            let changed = current.changed_fields(&updated);
            if changed.is_empty() {
                return Ok(false);
            }
            self.commit(&mut state, key.clone(), updated, Some(changed));
        }
        self.deliver_pending()?;
        Ok(true)
    }

    /// Records are fixed-shape: this always fails, with `UnknownField` for
    /// names the record type does not declare.
    pub fn delete_field(&self, key: &ItemKey, field: &str) -> Result<(), ModelError> {
        if !self.contains_key(key)? {
            return Err(self.not_found(key));
        }
        if !T::has_field(field) {
            return Err(ModelError::UnknownField {
                field: field.to_string(),
            });
        }
        Err(ModelError::FieldNotMutable {
            field: field.to_string(),
        })
    }

    /// Remove a record, `None` if missing.
    pub fn remove(&self, key: &ItemKey) -> Result<Option<T>, ModelError> {
        let removed = self.remove_staged(key)?;
        self.deliver_pending()?;
        Ok(removed)
    }

    pub(crate) fn remove_staged(&self, key: &ItemKey) -> Result<Option<T>, ModelError> {
        let mut state = self.lock("remove")?;
        let Some((index, mut item)) = state.take(key) else {
            return Ok(None);
        };
        self.release(&mut item);
        state.dirty = true;

        self.emit_granular(RenderEvent::ItemsDeleted {
            sync_id: self.sync_id.clone(),
            index,
            count: 1,
            keys: vec![key.clone()],
        });
        state.outgoing.push_back(Outgoing::Deleted(key.clone()));
        Ok(Some(item))
    }

    /// Remove and return a record. Missing keys are `ModelError::NotFound`.
    pub fn pop(&self, key: &ItemKey) -> Result<T, ModelError> {
        self.remove(key)?.ok_or_else(|| self.not_found(key))
    }

    /// Remove a record. Missing keys are `ModelError::NotFound`.
    pub fn delete(&self, key: &ItemKey) -> Result<(), ModelError> {
        self.pop(key).map(|_| ())
    }

    /// Remove several records as one change: one lock acquisition and one
    /// dirty mark. Missing keys are skipped.
    ///
    /// Removed records are grouped into runs of adjacent display positions,
    /// with one `ItemsDeleted` event per run. Returns the removed entries in
    /// display order.
    pub fn remove_batch(&self, keys: &[ItemKey]) -> Result<Vec<(ItemKey, T)>, ModelError> {
        let removed = self.remove_batch_staged(keys)?;
        self.deliver_pending()?;
        Ok(removed)
    }

    pub(crate) fn remove_batch_staged(
        &self,
        keys: &[ItemKey],
    ) -> Result<Vec<(ItemKey, T)>, ModelError> {
        let mut state = self.lock("remove_batch")?;

        let mut doomed: Vec<(usize, ItemKey)> = keys
            .iter()
            .filter_map(|key| state.position_of(key).map(|index| (index, key.clone())))
            .collect();
        doomed.sort_by_key(|entry| entry.0);
        doomed.dedup_by_key(|entry| entry.0);
        if doomed.is_empty() {
            return Ok(Vec::new());
        }

        // (first position, keys) of each run of adjacent records
        let mut runs: Vec<(usize, Vec<ItemKey>)> = Vec::new();
        for (index, key) in doomed {
            match runs.last_mut() {
                Some((start, run)) if *start + run.len() == index => run.push(key),
                _ => runs.push((index, vec![key])),
            }
        }

        let mut removed = Vec::new();
        for (_, run) in &runs {
            for key in run {
                if let Some((_, mut item)) = state.take(key) {
                    self.release(&mut item);
                    state.outgoing.push_back(Outgoing::Deleted(key.clone()));
                    removed.push((key.clone(), item));
                }
            }
        }
        state.dirty = true;

        // Each index applies to the view left by the runs before it
        let mut shift = 0;
        for (start, run) in runs {
            let count = run.len();
            self.emit_granular(RenderEvent::ItemsDeleted {
                sync_id: self.sync_id.clone(),
                index: start - shift,
                count,
                keys: run,
            });
            shift += count;
        }
        Ok(removed)
    }

    /// Remove every record. Clearing an empty model is a no-op.
    pub fn clear(&self) -> Result<(), ModelError> {
        {
            let mut state = self.lock("clear")?;
            if state.items.is_empty() {
                return Ok(());
            }

            state.items.clear();
            state.sorted.clear();
            state.dirty = true;

            self.emit_granular(RenderEvent::ModelCleared {
                sync_id: self.sync_id.clone(),
            });
            state.outgoing.push_back(Outgoing::Cleared);
        }
        self.deliver_pending()
    }

    /// Store a changed record, emit its `ItemSet` and queue it for observers.
    ///
    /// `changed` lists the fields that differ from the stored record; `None`
    /// for insertions, which send every field.
    fn commit(
        &self,
        state: &mut ModelState<T>,
        key: ItemKey,
        item: T,
        changed: Option<Vec<&'static str>>,
    ) {
        let (index_then, index_now) = state.put(&self.sync_id, &key, item.clone());
        state.dirty = true;

        let fields = match changed {
            Some(names) => names
                .into_iter()
                .filter_map(|name| item.field(name).map(|value| (name.to_string(), value)))
                .collect(),
            None => item.serialized(),
        };
        self.emit_granular(RenderEvent::ItemSet {
            sync_id: self.sync_id.clone(),
            key: key.clone(),
            index_then,
            index_now,
            fields,
        });
        state.outgoing.push_back(Outgoing::Set(key, item));
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Emit a snapshot now, dirty or not, and mark the model clean.
    pub fn sync_now(&self) -> Result<(), ModelError> {
        let mut state = self.lock("sync_now")?;
        self.emit_snapshot(&mut state)
    }

    /// Emit a snapshot if the model changed since the last one.
    pub fn flush_if_dirty(&self) -> Result<bool, ModelError> {
        let mut state = self.lock("flush")?;
        if !state.dirty {
            return Ok(false);
        }
        self.emit_snapshot(&mut state)?;
        Ok(true)
    }

    /// Serialize and send while holding the lock, so a snapshot never
    /// observes a half-applied mutation.
    fn emit_snapshot(&self, state: &mut ModelState<T>) -> Result<(), ModelError> {
        debug!("Syncing {}: {} items", self.sync_id, state.items.len());
        let items = state.serialized();
        self.sink.send(RenderEvent::ModelUpdated {
            sync_id: self.sync_id.clone(),
            items,
        })?;
        state.dirty = false;
        Ok(())
    }

    /// Granular events are hints ahead of the next snapshot; a failing sink
    /// does not fail the mutation.
    fn emit_granular(&self, event: RenderEvent) {
        if let Err(err) = self.sink.send(event) {
            warn!(sync_id = %self.sync_id, error = %err, "dropped granular render event");
        }
    }

    // ========================================================================
    // Ownership and fan-out
    // ========================================================================

    fn adopt(&self, mut item: T) -> T {
        if self.owns_items {
            item.set_owner(Some(self.id));
        }
        item
    }

    fn release(&self, item: &mut T) {
        if self.owns_items {
            item.set_owner(None);
        }
    }

    /// Deliver queued changes to observers, oldest first.
    ///
    /// One thread at a time delivers a model's changes, without holding the
    /// model lock. A caller finding delivery in progress leaves its changes
    /// to the delivering thread, which may be itself further up the stack.
    pub(crate) fn deliver_pending(&self) -> Result<(), ModelError> {
        loop {
            let Some(delivery) = Delivery::acquire(&self.delivering) else {
                return Ok(());
            };
            while let Some(change) = self.next_outgoing()? {
                self.deliver(change)?;
            }
            drop(delivery);

            // A change queued between the last pop and the release is ours
            if self.lock("deliver")?.outgoing.is_empty() {
                return Ok(());
            }
        }
    }

    fn next_outgoing(&self) -> Result<Option<Outgoing<T>>, ModelError> {
        Ok(self.lock("deliver")?.outgoing.pop_front())
    }

    /// Forward one change to every registered observer but this model itself.
    fn deliver(&self, change: Outgoing<T>) -> Result<(), ModelError> {
        let Some(directory) = self.directory.upgrade() else {
            return Ok(());
        };

        if let Outgoing::Replay(observer, key, item) = &change {
            trace!(source = %self.sync_id, observer = %observer.observer_sync_id(), key = %key, "replay");
            return observer.source_item_set(&self.sync_id, key, item as &dyn Any);
        }

        for observer in directory.observers()? {
            let observer_id = observer.observer_sync_id();
            if *observer_id == self.sync_id {
                continue;
            }

            match &change {
                Outgoing::Set(key, item) => {
                    if key.routes_through(observer_id) {
                        continue;
                    }
                    trace!(source = %self.sync_id, observer = %observer_id, key = %key, "fan out set");
                    observer.source_item_set(&self.sync_id, key, item as &dyn Any)?;
                }
                Outgoing::Deleted(key) => {
                    if key.routes_through(observer_id) {
                        continue;
                    }
                    trace!(source = %self.sync_id, observer = %observer_id, key = %key, "fan out delete");
                    observer.source_item_deleted(&self.sync_id, key)?;
                }
                Outgoing::Cleared => {
                    trace!(source = %self.sync_id, observer = %observer_id, "fan out clear");
                    observer.source_cleared(&self.sync_id)?;
                }
                Outgoing::Replay(..) => {}
            }
        }
        Ok(())
    }
}

impl<T: ModelItem> LiveModel for Model<T> {
    fn model_id(&self) -> ModelId {
        self.id
    }

    fn sync_id(&self) -> &SyncId {
        &self.sync_id
    }

    fn is_dirty(&self) -> Result<bool, ModelError> {
        Model::is_dirty(self)
    }

    fn flush_if_dirty(&self) -> Result<bool, ModelError> {
        Model::flush_if_dirty(self)
    }

    fn sync_now(&self) -> Result<(), ModelError> {
        Model::sync_now(self)
    }

    fn replay_into(&self, observer: Arc<dyn SourceObserver>) -> Result<(), ModelError> {
        if *observer.observer_sync_id() == self.sync_id {
            return Ok(());
        }

        {
            let mut state = self.lock("replay")?;
            let observer_id = observer.observer_sync_id();
            let replayed: Vec<Outgoing<T>> = state
                .items
                .iter()
                .filter(|(key, _)| !key.routes_through(observer_id))
                .map(|(key, item)| Outgoing::Replay(observer.clone(), key.clone(), item.clone()))
                .collect();
            trace!(source = %self.sync_id, observer = %observer_id, items = replayed.len(), "replaying");
            state.outgoing.extend(replayed);
        }
        self.deliver_pending()
    }

    fn item_count(&self) -> Result<usize, ModelError> {
        self.len()
    }
}

impl<T: ModelItem> fmt::Display for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.lock() {
            Ok(state) => write!(f, "{}: {} items", self.sync_id, state.items.len()),
            Err(_) => write!(f, "{}: <poisoned>", self.sync_id),
        }
    }
}

impl<T: ModelItem> fmt::Debug for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("sync_id", &self.sync_id)
            .field("owns_items", &self.owns_items)
            .finish_non_exhaustive()
    }
}
