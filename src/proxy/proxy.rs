use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{AcceptAll, SourceAcceptor, SourceObserver};
use crate::error::ModelError;
use crate::item::ModelItem;
use crate::model::{DerivedModel, Model, ModelDirectory};
use crate::sync_id::{ItemKey, SyncId};

/// A model mirroring the `T` records of every accepted source.
pub struct ModelProxy<T: ModelItem> {
    model: Arc<Model<T>>,
    sources: Box<dyn SourceAcceptor>,
}

impl<T: ModelItem> ModelProxy<T> {
    /// Mirror every model holding `T` records.
    pub fn new(directory: &ModelDirectory, sync_id: SyncId) -> Result<Arc<Self>, ModelError> {
        Self::with_sources(directory, sync_id, AcceptAll)
    }

    /// Mirror the models accepted by `sources`.
    pub fn with_sources(
        directory: &ModelDirectory,
        sync_id: SyncId,
        sources: impl SourceAcceptor + 'static,
    ) -> Result<Arc<Self>, ModelError> {
        let proxy = Arc::new(ModelProxy {
            model: Model::create(directory, sync_id, false)?,
            sources: Box::new(sources),
        });
        subscribe(directory, proxy.clone(), |source| {
            proxy.sources.accept_source(source)
        })?;
        Ok(proxy)
    }

    pub fn model(&self) -> &Arc<Model<T>> {
        &self.model
    }

    pub fn sync_id(&self) -> &SyncId {
        self.model.sync_id()
    }
}

/// Register `observer` for every later mutation, then replay the current
/// records of every live model accepted by `accept`.
///
/// Registering first means no mutation falls between the replay and the
/// subscription. Replayed records queue behind the source's earlier changes,
/// so a replay never overwrites a newer delivery; a record seen twice is
/// stored once.
pub(crate) fn subscribe<O, F>(
    directory: &ModelDirectory,
    observer: Arc<O>,
    accept: F,
) -> Result<(), ModelError>
where
    O: SourceObserver + 'static,
    F: Fn(&SyncId) -> bool,
{
    let observer: Arc<dyn SourceObserver> = observer;
    directory.register_observer(observer.clone())?;

    let mut replayed = 0;
    for source in directory.live_models()? {
        if source.sync_id() == observer.observer_sync_id() || !accept(source.sync_id()) {
            continue;
        }
        source.replay_into(observer.clone())?;
        replayed += 1;
    }
    debug!(observer = %observer.observer_sync_id(), sources = replayed, "subscribed");
    Ok(())
}

/// Keys of `model` mirrored from `source`.
pub(crate) fn keys_from<T: ModelItem>(
    model: &Model<T>,
    source: &SyncId,
) -> Result<Vec<ItemKey>, ModelError> {
    Ok(model
        .keys()?
        .into_iter()
        .filter(|key| key.source() == Some(source))
        .collect())
}

impl<T: ModelItem> SourceObserver for ModelProxy<T> {
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
        self.model
            .replace(ItemKey::proxied(source.clone(), key.clone()), item.clone())?;
        Ok(())
    }

    fn source_item_deleted(&self, source: &SyncId, key: &ItemKey) -> Result<(), ModelError> {
        if !self.sources.accept_source(source) {
            return Ok(());
        }
        self.model
            .remove(&ItemKey::proxied(source.clone(), key.clone()))?;
        Ok(())
    }

    fn source_cleared(&self, source: &SyncId) -> Result<(), ModelError> {
        if !self.sources.accept_source(source) {
            return Ok(());
        }
        let keys = keys_from(&self.model, source)?;
        self.model.remove_batch(&keys)?;
        Ok(())
    }
}

impl<T: ModelItem> DerivedModel<T> for ModelProxy<T> {
    fn model(&self) -> &Arc<Model<T>> {
        &self.model
    }
}

impl<T: ModelItem> fmt::Debug for ModelProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelProxy")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ModelId;
    use crate::sink::NullSink;
    use crate::SyncIdShape;

    #[derive(Clone, Debug, Default, synced_rust_macros::ModelItem)]
    struct Note {
        id: String,
        text: String,
        owner: Option<ModelId>,
    }

    #[derive(Clone, Debug, Default, synced_rust_macros::ModelItem)]
    struct Other {
        id: String,
        owner: Option<ModelId>,
    }

    fn note(id: &str, text: &str) -> Note {
        Note {
            id: id.into(),
            text: text.into(),
            owner: None,
        }
    }

    fn proxied(source: &SyncId, id: &str) -> ItemKey {
        ItemKey::proxied(source.clone(), id.into())
    }

    #[test]
    fn replays_existing_sources() {
        let directory = ModelDirectory::new(NullSink);
        let notes = Model::<Note>::new(&directory, SyncId::new("Note").with_key("a")).unwrap();
        notes.insert(note("n1", "hello")).unwrap();

        let proxy = ModelProxy::<Note>::new(&directory, SyncId::new("all_notes")).unwrap();

        let mirrored = proxy.model().get(&proxied(notes.sync_id(), "n1")).unwrap();
        assert_eq!(mirrored.text, "hello");
        // Mirrored records keep their source as owner
        assert_eq!(mirrored.owner, Some(notes.id()));
    }

    #[test]
    fn follows_later_mutations() {
        let directory = ModelDirectory::new(NullSink);
        let proxy = ModelProxy::<Note>::new(&directory, SyncId::new("all_notes")).unwrap();
        let notes = Model::<Note>::new(&directory, SyncId::new("Note").with_key("a")).unwrap();
        let key = proxied(notes.sync_id(), "n1");

        notes.insert(note("n1", "hello")).unwrap();
        assert!(proxy.model().contains_key(&key).unwrap());

        notes
            .modify(&"n1".into(), |n| n.text = "bye".into())
            .unwrap();
        assert_eq!(proxy.model().get(&key).unwrap().text, "bye");

        notes.delete(&"n1".into()).unwrap();
        assert!(!proxy.model().contains_key(&key).unwrap());
    }

    #[test]
    fn clear_removes_only_that_source() {
        let directory = ModelDirectory::new(NullSink);
        let a = Model::<Note>::new(&directory, SyncId::new("Note").with_key("a")).unwrap();
        let b = Model::<Note>::new(&directory, SyncId::new("Note").with_key("b")).unwrap();
        let proxy = ModelProxy::<Note>::new(&directory, SyncId::new("all_notes")).unwrap();

        a.insert(note("n1", "x")).unwrap();
        b.insert(note("n1", "y")).unwrap();
        assert_eq!(proxy.model().len().unwrap(), 2);

        a.clear().unwrap();
        assert_eq!(proxy.model().keys().unwrap(), vec![proxied(b.sync_id(), "n1")]);
    }

    #[test]
    fn ignores_rejected_sources_and_other_types() {
        let directory = ModelDirectory::new(NullSink);
        let proxy = ModelProxy::<Note>::with_sources(
            &directory,
            SyncId::new("a_notes"),
            SyncIdShape::new("Note", 1),
        )
        .unwrap();

        let bare = Model::<Note>::new(&directory, SyncId::new("Note")).unwrap();
        let others = Model::<Other>::new(&directory, SyncId::new("Note").with_key("o")).unwrap();
        bare.insert(note("n1", "x")).unwrap();
        others
            .insert(Other {
                id: "o1".into(),
                owner: None,
            })
            .unwrap();

        assert!(proxy.model().is_empty().unwrap());
    }
}
