use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;
use tracing::warn;

use super::Model;
use crate::error::ModelError;
use crate::item::{ModelId, ModelItem};
use crate::proxy::SourceObserver;
use crate::sink::RenderSink;
use crate::sync_id::SyncId;

/// Type-erased view of a live model, used by the scheduler and by proxy replay.
pub trait LiveModel: Send + Sync {
    fn model_id(&self) -> ModelId;

    fn sync_id(&self) -> &SyncId;

    fn is_dirty(&self) -> Result<bool, ModelError>;

    /// Emit a snapshot if dirty. Returns whether one was emitted.
    fn flush_if_dirty(&self) -> Result<bool, ModelError>;

    fn sync_now(&self) -> Result<(), ModelError>;

    /// Feed every current record to `observer` as if it had just been set,
    /// queued behind the model's earlier changes.
    fn replay_into(&self, observer: Arc<dyn SourceObserver>) -> Result<(), ModelError>;

    fn item_count(&self) -> Result<usize, ModelError>;
}

#[derive(Clone)]
struct DirectoryEntry {
    live: Arc<dyn LiveModel>,
    typed: Arc<dyn Any + Send + Sync>,
}

pub(crate) struct DirectoryInner {
    next_id: AtomicU64,
    models: RwLock<IndexMap<ModelId, DirectoryEntry>>,
    observers: RwLock<Vec<Arc<dyn SourceObserver>>>,
    sink: Arc<dyn RenderSink>,
}

impl DirectoryInner {
    /// Clone of the observer list, so no directory lock is held while
    /// observers take model locks.
    pub(crate) fn observers(&self) -> Result<Vec<Arc<dyn SourceObserver>>, ModelError> {
        let observers = self
            .observers
            .read()
            .map_err(|_| ModelError::LockPoisoned("observers read"))?;
        Ok(observers.clone())
    }
}

/// Summary of one pass over every live model.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    pub failed: usize,
}

/// Registry of every live model and proxy, shared by all of them.
///
/// Constructed once at startup and passed to every model and proxy
/// constructor. Models register themselves on creation; proxies also
/// register as observers so that every later mutation of any model reaches
/// them. Models keep only a weak handle back to the directory.
///
/// Cloning creates another handle to the same directory.
#[derive(Clone)]
pub struct ModelDirectory {
    inner: Arc<DirectoryInner>,
}

impl ModelDirectory {
    pub fn new(sink: impl RenderSink + 'static) -> Self {
        Self::with_sink(Arc::new(sink))
    }

    pub fn with_sink(sink: Arc<dyn RenderSink>) -> Self {
        ModelDirectory {
            inner: Arc::new(DirectoryInner {
                next_id: AtomicU64::new(1),
                models: RwLock::new(IndexMap::new()),
                observers: RwLock::new(Vec::new()),
                sink,
            }),
        }
    }

    pub fn sink(&self) -> Arc<dyn RenderSink> {
        Arc::clone(&self.inner.sink)
    }

    pub(crate) fn downgrade(&self) -> Weak<DirectoryInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn next_model_id(&self) -> ModelId {
        ModelId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Proxies key mirrored records by source sync id, so one id names at
    /// most one live model.
    pub(crate) fn register_model<T: ModelItem>(
        &self,
        model: &Arc<Model<T>>,
    ) -> Result<(), ModelError> {
        let mut models = self
            .inner
            .models
            .write()
            .map_err(|_| ModelError::LockPoisoned("models write"))?;
        if models
            .values()
            .any(|entry| entry.live.sync_id() == model.sync_id())
        {
            return Err(ModelError::AlreadyRegistered(model.sync_id().to_string()));
        }
        models.insert(
            model.id(),
            DirectoryEntry {
                live: model.clone(),
                typed: model.clone(),
            },
        );
        Ok(())
    }

    /// Register a proxy so it receives every later mutation.
    pub(crate) fn register_observer(
        &self,
        observer: Arc<dyn SourceObserver>,
    ) -> Result<(), ModelError> {
        let mut observers = self
            .inner
            .observers
            .write()
            .map_err(|_| ModelError::LockPoisoned("observers write"))?;
        observers.push(observer);
        Ok(())
    }

    /// Every live model, in creation order.
    pub fn live_models(&self) -> Result<Vec<Arc<dyn LiveModel>>, ModelError> {
        let models = self
            .inner
            .models
            .read()
            .map_err(|_| ModelError::LockPoisoned("models read"))?;
        Ok(models.values().map(|entry| entry.live.clone()).collect())
    }

    pub fn len(&self) -> Result<usize, ModelError> {
        Ok(self.live_models()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ModelError> {
        Ok(self.len()? == 0)
    }

    /// Resolve a model handle. `None` if the id is unknown or the model
    /// holds another record type.
    pub fn model<T: ModelItem>(&self, id: ModelId) -> Result<Option<Arc<Model<T>>>, ModelError> {
        let entry = {
            let models = self
                .inner
                .models
                .read()
                .map_err(|_| ModelError::LockPoisoned("models read"))?;
            models.get(&id).cloned()
        };
        Ok(entry.and_then(|entry| entry.typed.downcast::<Model<T>>().ok()))
    }

    /// The model owning `item`, if it has been stored in one.
    pub fn model_of<T: ModelItem>(&self, item: &T) -> Result<Option<Arc<Model<T>>>, ModelError> {
        match item.owner() {
            Some(id) => self.model(id),
            None => Ok(None),
        }
    }

    /// Change fields of a record held outside its model.
    ///
    /// `f` is applied to `item`; if `item` is owned by a model, it is applied
    /// to the stored record too, through [`Model::modify`]. Returns whether
    /// the owning model changed.
    pub fn modify_owned<T, F>(&self, item: &mut T, f: F) -> Result<bool, ModelError>
    where
        T: ModelItem,
        F: Fn(&mut T),
    {
        f(item);
        match self.model_of(item)? {
            Some(model) => model.modify(&item.key(), f),
            None => Ok(false),
        }
    }

    /// Emit a snapshot for every dirty model. Failing models stay dirty.
    pub fn flush_dirty(&self) -> Result<FlushReport, ModelError> {
        let mut report = FlushReport::default();
        for model in self.live_models()? {
            match model.flush_if_dirty() {
                Ok(true) => report.flushed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(sync_id = %model.sync_id(), error = %err, "snapshot failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
