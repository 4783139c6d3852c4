use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{LiveModel, Model, ModelDirectory};
use crate::error::ModelError;
use crate::item::ModelItem;
use crate::sync_id::{SyncId, SyncIdShape};

/// A derived view (proxy or filter) backed by a visible `Model<T>`.
pub trait DerivedModel<T: ModelItem>: Send + Sync + 'static {
    fn model(&self) -> &Arc<Model<T>>;
}

type Constructor =
    Box<dyn Fn(&ModelDirectory, &SyncId) -> Result<StoredModel, ModelError> + Send + Sync>;

#[derive(Clone)]
struct StoredModel {
    /// `Arc<Model<T>>`
    typed: Arc<dyn Any + Send + Sync>,
    live: Arc<dyn LiveModel>,
    /// The object controlling a derived view, e.g. a `FieldSubstringFilter`.
    special: Option<Arc<dyn Any + Send + Sync>>,
}

impl StoredModel {
    fn plain<T: ModelItem>(model: Arc<Model<T>>) -> Self {
        StoredModel {
            typed: model.clone(),
            live: model,
            special: None,
        }
    }

    fn derived<T: ModelItem, S: DerivedModel<T>>(special: Arc<S>) -> Self {
        let model = special.model().clone();
        StoredModel {
            typed: model.clone(),
            live: model,
            special: Some(special as Arc<dyn Any + Send + Sync>),
        }
    }
}

/// Map of sync ids to models, creating models on first access.
///
/// Which ids may be created is decided by a table of [`SyncIdShape`]s. A
/// shape maps either to a plain `Model<T>` or to a factory building a
/// derived view, so that e.g. `("filtered_members", user, room)` comes up
/// as a pre-wired substring filter over that room's members.
///
/// ## Example
///
/// ```ignore
/// let store = ModelStore::new(directory.clone())
///     .allow::<Account>(0)
///     .allow::<Room>(1);
///
/// let rooms = store.get_or_create::<Room>(&SyncId::of::<Room>().with_key(user_id))?;
/// ```
pub struct ModelStore {
    directory: ModelDirectory,
    shapes: HashMap<SyncIdShape, Constructor>,
    models: RwLock<HashMap<SyncId, StoredModel>>,
}

impl ModelStore {
    pub fn new(directory: ModelDirectory) -> Self {
        ModelStore {
            directory,
            shapes: HashMap::new(),
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &ModelDirectory {
        &self.directory
    }

    /// Allow plain `Model<T>`s tagged with `T::TYPE_NAME` and `arity` keys.
    pub fn allow<T: ModelItem>(self, arity: usize) -> Self {
        self.allow_tagged::<T>(T::TYPE_NAME, arity)
    }

    /// Allow plain `Model<T>`s under a custom tag.
    pub fn allow_tagged<T: ModelItem>(mut self, tag: impl Into<String>, arity: usize) -> Self {
        self.shapes.insert(
            SyncIdShape::new(tag, arity),
            Box::new(|directory: &ModelDirectory, sync_id: &SyncId| {
                Model::<T>::new(directory, sync_id.clone()).map(StoredModel::plain)
            }),
        );
        self
    }

    /// Allow a derived view built by `factory` for every id of this shape.
    ///
    /// The factory runs while the store is locked and must not call back
    /// into the store.
    pub fn allow_special<T, S, F>(mut self, tag: impl Into<String>, arity: usize, factory: F) -> Self
    where
        T: ModelItem,
        S: DerivedModel<T>,
        F: Fn(&ModelDirectory, &SyncId) -> Result<Arc<S>, ModelError> + Send + Sync + 'static,
    {
        self.shapes.insert(
            SyncIdShape::new(tag, arity),
            Box::new(move |directory: &ModelDirectory, sync_id: &SyncId| {
                factory(directory, sync_id).map(StoredModel::derived::<T, S>)
            }),
        );
        self
    }

    /// Register an already built derived view under its own sync id.
    pub fn register_special<T, S>(&self, special: Arc<S>) -> Result<(), ModelError>
    where
        T: ModelItem,
        S: DerivedModel<T>,
    {
        let sync_id = special.model().sync_id().clone();
        let mut models = self
            .models
            .write()
            .map_err(|_| ModelError::LockPoisoned("store write"))?;
        if models.contains_key(&sync_id) {
            return Err(ModelError::AlreadyRegistered(sync_id.to_string()));
        }
        models.insert(sync_id, StoredModel::derived::<T, S>(special));
        Ok(())
    }

    /// Return the model for `sync_id`, creating it if needed.
    ///
    /// Fails right away for ids with empty components or unknown shapes, and
    /// when the existing model holds another record type.
    pub fn get_or_create<T: ModelItem>(&self, sync_id: &SyncId) -> Result<Arc<Model<T>>, ModelError> {
        let entry = self.entry(sync_id)?;
        entry
            .typed
            .downcast::<Model<T>>()
            .map_err(|_| ModelError::TypeMismatch {
                sync_id: sync_id.to_string(),
                expected: T::TYPE_NAME.to_string(),
            })
    }

    /// Return the object controlling the derived view at `sync_id`, creating
    /// the view if needed.
    pub fn special<S: Send + Sync + 'static>(&self, sync_id: &SyncId) -> Result<Arc<S>, ModelError> {
        let entry = self.entry(sync_id)?;
        entry
            .special
            .and_then(|special| special.downcast::<S>().ok())
            .ok_or_else(|| ModelError::TypeMismatch {
                sync_id: sync_id.to_string(),
                expected: std::any::type_name::<S>().to_string(),
            })
    }

    /// Make sure a model exists for `sync_id`.
    ///
    /// Used when the render surface subscribes to an id before any writer
    /// touched it, so later writes land in the model it already watches.
    pub fn ensure_exists(&self, sync_id: &SyncId) -> Result<(), ModelError> {
        self.entry(sync_id).map(|_| ())
    }

    /// Existing model for `sync_id`, without creating one.
    pub fn get<T: ModelItem>(&self, sync_id: &SyncId) -> Result<Option<Arc<Model<T>>>, ModelError> {
        let models = self
            .models
            .read()
            .map_err(|_| ModelError::LockPoisoned("store read"))?;
        Ok(models
            .get(sync_id)
            .and_then(|entry| entry.typed.clone().downcast::<Model<T>>().ok()))
    }

    pub fn contains(&self, sync_id: &SyncId) -> Result<bool, ModelError> {
        let models = self
            .models
            .read()
            .map_err(|_| ModelError::LockPoisoned("store read"))?;
        Ok(models.contains_key(sync_id))
    }

    pub fn len(&self) -> Result<usize, ModelError> {
        let models = self
            .models
            .read()
            .map_err(|_| ModelError::LockPoisoned("store read"))?;
        Ok(models.len())
    }

    pub fn is_empty(&self) -> Result<bool, ModelError> {
        Ok(self.len()? == 0)
    }

    /// Sync ids of every stored model, sorted.
    pub fn sync_ids(&self) -> Result<Vec<SyncId>, ModelError> {
        let models = self
            .models
            .read()
            .map_err(|_| ModelError::LockPoisoned("store read"))?;
        let mut ids: Vec<SyncId> = models.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn entry(&self, sync_id: &SyncId) -> Result<StoredModel, ModelError> {
        {
            let models = self
                .models
                .read()
                .map_err(|_| ModelError::LockPoisoned("store read"))?;
            if let Some(entry) = models.get(sync_id) {
                return Ok(entry.clone());
            }
        }

        sync_id.validate()?;
        let shape = sync_id.shape();
        let constructor = self
            .shapes
            .get(&shape)
            .ok_or_else(|| ModelError::UnknownShape(shape.to_string()))?;

        let mut models = self
            .models
            .write()
            .map_err(|_| ModelError::LockPoisoned("store write"))?;
        // Another thread may have won the race since the read lock was released
        if let Some(entry) = models.get(sync_id) {
            return Ok(entry.clone());
        }

        let created = constructor(&self.directory, sync_id)?;
        debug!(sync_id = %sync_id, "created model");
        models.insert(sync_id.clone(), created.clone());
        Ok(created)
    }
}

impl fmt::Display for ModelStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let models = match self.models.read() {
            Ok(models) => models,
            Err(_) => return write!(f, "ModelStore(<poisoned>)"),
        };

        let mut lines: Vec<String> = models
            .iter()
            .map(|(sync_id, entry)| match entry.live.item_count() {
                Ok(count) => format!("{}: {} items", sync_id, count),
                Err(_) => format!("{}: <poisoned>", sync_id),
            })
            .collect();
        lines.sort();

        writeln!(f, "ModelStore(")?;
        for line in lines {
            writeln!(f, "    {}", line)?;
        }
        write!(f, ")")
    }
}
