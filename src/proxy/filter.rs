use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use tracing::debug;

use super::proxy::{keys_from, subscribe};
use super::{ItemAcceptor, SourceAcceptor, SourceObserver};
use crate::error::ModelError;
use crate::item::ModelItem;
use crate::model::{DerivedModel, Model, ModelDirectory};
use crate::sync_id::{ItemKey, SyncId};

type RefilterCallback = Arc<dyn Fn() + Send + Sync>;

/// Records moved across the partition by one [`ModelFilter::refilter`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefilterOutcome {
    pub hidden: usize,
    pub shown: usize,
}

impl RefilterOutcome {
    pub fn changed(&self) -> bool {
        self.hidden > 0 || self.shown > 0
    }
}

/// A proxy that shows only the records its [`ItemAcceptor`] accepts.
///
/// Every record of an accepted source is either in the visible model or in
/// the filtered-out map, never both. Both sides change under the
/// filtered-out lock, which is always taken before the visible model's lock
/// and released before the visible model's changes reach its observers.
pub struct ModelFilter<T: ModelItem> {
    model: Arc<Model<T>>,
    sources: Box<dyn SourceAcceptor>,
    items: Box<dyn ItemAcceptor<T>>,
    filtered_out: Mutex<IndexMap<ItemKey, T>>,
    callbacks: Mutex<Vec<RefilterCallback>>,
}

impl<T: ModelItem> ModelFilter<T> {
    pub fn new(
        directory: &ModelDirectory,
        sync_id: SyncId,
        sources: impl SourceAcceptor + 'static,
        items: impl ItemAcceptor<T> + 'static,
    ) -> Result<Arc<Self>, ModelError> {
        let filter = Arc::new(ModelFilter {
            model: Model::create(directory, sync_id, false)?,
            sources: Box::new(sources),
            items: Box::new(items),
            filtered_out: Mutex::new(IndexMap::new()),
            callbacks: Mutex::new(Vec::new()),
        });
        subscribe(directory, filter.clone(), |source| {
            filter.sources.accept_source(source)
        })?;
        Ok(filter)
    }

    /// The visible records.
    pub fn model(&self) -> &Arc<Model<T>> {
        &self.model
    }

    pub fn sync_id(&self) -> &SyncId {
        self.model.sync_id()
    }

    fn partition(&self) -> Result<MutexGuard<'_, IndexMap<ItemKey, T>>, ModelError> {
        self.filtered_out
            .lock()
            .map_err(|_| ModelError::LockPoisoned("filtered_out"))
    }

    /// Records currently hidden, in the order they were hidden.
    pub fn filtered_out(&self) -> Result<Vec<(ItemKey, T)>, ModelError> {
        Ok(self
            .partition()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    pub fn filtered_out_len(&self) -> Result<usize, ModelError> {
        Ok(self.partition()?.len())
    }

    /// Run `callback` after every refilter, e.g. to refilter a view that
    /// depends on this one.
    pub fn on_refiltered<F>(&self, callback: F) -> Result<(), ModelError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ModelError::LockPoisoned("refilter callbacks"))?;
        callbacks.push(Arc::new(callback));
        Ok(())
    }

    /// Re-evaluate every visible and filtered-out record.
    ///
    /// Needed whenever the item acceptor's own state changes. Records that
    /// became hidden leave the visible model in a single batch removal.
    pub fn refilter(&self) -> Result<RefilterOutcome, ModelError> {
        let outcome = {
            let mut hidden = self.partition()?;

            let to_show: Vec<ItemKey> = hidden
                .iter()
                .filter(|(_, item)| self.items.accept_item(item))
                .map(|(key, _)| key.clone())
                .collect();

            let to_hide: Vec<ItemKey> = self
                .model
                .items()?
                .into_iter()
                .filter(|(_, item)| !self.items.accept_item(item))
                .map(|(key, _)| key)
                .collect();

            let removed = self.model.remove_batch_staged(&to_hide)?;
            let mut outcome = RefilterOutcome {
                hidden: removed.len(),
                shown: 0,
            };

            for key in to_show {
                if let Some(item) = hidden.shift_remove(&key) {
                    self.model.replace_staged(key, item)?;
                    outcome.shown += 1;
                }
            }
            hidden.extend(removed);
            outcome
        };
        self.model.deliver_pending()?;

        debug!(
            filter = %self.model.sync_id(),
            hidden = outcome.hidden,
            shown = outcome.shown,
            "refiltered"
        );

        let callbacks: Vec<RefilterCallback> = self
            .callbacks
            .lock()
            .map_err(|_| ModelError::LockPoisoned("refilter callbacks"))?
            .clone();
        for callback in callbacks {
            callback();
        }
        Ok(outcome)
    }
}

impl<T: ModelItem> SourceObserver for ModelFilter<T> {
    fn observer_sync_id(&self) -> &SyncId {
        self.model.sync_id()
    }

    fn source_item_set(
        &self,
        source: &SyncId,
        key: &ItemKey,
        item: &dyn Any,
    ) -> Result<(), ModelError> {
        let Some(item) = item.downcast_ref::<T>() else {
            return Ok(());
        };
        if !self.sources.accept_source(source) {
            return Ok(());
        }

        let key = ItemKey::proxied(source.clone(), key.clone());
        {
            let mut hidden = self.partition()?;
            if self.items.accept_item(item) {
                hidden.shift_remove(&key);
                self.model.replace_staged(key, item.clone())?;
            } else {
                self.model.remove_staged(&key)?;
                hidden.insert(key, item.clone());
            }
        }
        self.model.deliver_pending()
    }

    fn source_item_deleted(&self, source: &SyncId, key: &ItemKey) -> Result<(), ModelError> {
        if !self.sources.accept_source(source) {
            return Ok(());
        }

        let key = ItemKey::proxied(source.clone(), key.clone());
        {
            let mut hidden = self.partition()?;
            if hidden.shift_remove(&key).is_none() {
                self.model.remove_staged(&key)?;
            }
        }
        self.model.deliver_pending()
    }

    fn source_cleared(&self, source: &SyncId) -> Result<(), ModelError> {
        if !self.sources.accept_source(source) {
            return Ok(());
        }

        {
            let mut hidden = self.partition()?;
            hidden.retain(|key, _| key.source() != Some(source));
            let keys = keys_from(&self.model, source)?;
            self.model.remove_batch_staged(&keys)?;
        }
        self.model.deliver_pending()
    }
}

impl<T: ModelItem> DerivedModel<T> for ModelFilter<T> {
    fn model(&self) -> &Arc<Model<T>> {
        &self.model
    }
}

impl<T: ModelItem> fmt::Debug for ModelFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFilter")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
