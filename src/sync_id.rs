//! Identifiers naming models (`SyncId`) and the records inside them (`ItemKey`).

use std::fmt;

use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

use crate::error::ModelError;
use crate::item::ModelItem;

/// Opaque identifier naming a model and its destination on the render surface.
///
/// A sync id is a tag (the canonical type name of the records for typed
/// models, or a view name such as `"all_rooms"`) followed by zero or more
/// string keys, e.g. `("Member", "@alice:example.org", "!room:example.org")`.
///
/// On the wire a bare id becomes its tag string and a keyed id becomes the
/// list `[tag, key, ...]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncId {
    tag: String,
    keys: Vec<String>,
}

impl SyncId {
    /// A bare sync id.
    pub fn new(tag: impl Into<String>) -> Self {
        SyncId {
            tag: tag.into(),
            keys: Vec::new(),
        }
    }

    /// A bare sync id tagged with the record type's canonical name.
    pub fn of<T: ModelItem>() -> Self {
        Self::new(T::TYPE_NAME)
    }

    /// A keyed sync id.
    pub fn tuple<I, S>(tag: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SyncId {
            tag: tag.into(),
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a key component.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_bare(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn shape(&self) -> SyncIdShape {
        SyncIdShape::new(self.tag.clone(), self.keys.len())
    }

    /// Reject ids with an empty component.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.tag.is_empty() || self.keys.iter().any(String::is_empty) {
            return Err(ModelError::InvalidSyncId(format!(
                "empty component in {:?}",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.keys.is_empty() {
            return write!(f, "{}", self.tag);
        }

        write!(f, "({}", self.tag)?;
        for key in &self.keys {
            write!(f, ", {}", key)?;
        }
        write!(f, ")")
    }
}

impl Serialize for SyncId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.keys.is_empty() {
            return serializer.serialize_str(&self.tag);
        }

        let mut seq = serializer.serialize_seq(Some(self.keys.len() + 1))?;
        seq.serialize_element(&self.tag)?;
        for key in &self.keys {
            seq.serialize_element(key)?;
        }
        seq.end()
    }
}

/// The shape of a sync id: its tag and how many keys follow it.
///
/// The store maps shapes to model constructors.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SyncIdShape {
    pub tag: String,
    pub arity: usize,
}

impl SyncIdShape {
    pub fn new(tag: impl Into<String>, arity: usize) -> Self {
        SyncIdShape {
            tag: tag.into(),
            arity,
        }
    }
}

impl fmt::Display for SyncIdShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.tag, self.arity)
    }
}

/// Key of a record inside a model.
///
/// Source models key records by their identity field. Proxies key mirrored
/// records by the source model's sync id plus the source key, so a
/// proxy-of-a-proxy holds nested keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKey {
    Id(String),
    Proxied { source: SyncId, key: Box<ItemKey> },
}

impl ItemKey {
    pub fn proxied(source: SyncId, key: ItemKey) -> Self {
        ItemKey::Proxied {
            source,
            key: Box::new(key),
        }
    }

    /// The model this entry was mirrored from, if any.
    pub fn source(&self) -> Option<&SyncId> {
        match self {
            ItemKey::Id(_) => None,
            ItemKey::Proxied { source, .. } => Some(source),
        }
    }

    /// Whether any level of this key was mirrored from `sync_id`.
    pub fn routes_through(&self, sync_id: &SyncId) -> bool {
        match self {
            ItemKey::Id(_) => false,
            ItemKey::Proxied { source, key } => source == sync_id || key.routes_through(sync_id),
        }
    }

    /// The identity value of the original record.
    pub fn root(&self) -> &str {
        match self {
            ItemKey::Id(id) => id,
            ItemKey::Proxied { key, .. } => key.root(),
        }
    }
}

impl From<String> for ItemKey {
    fn from(id: String) -> Self {
        ItemKey::Id(id)
    }
}

impl From<&str> for ItemKey {
    fn from(id: &str) -> Self {
        ItemKey::Id(id.to_string())
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Id(id) => write!(f, "{}", id),
            ItemKey::Proxied { source, key } => write!(f, "({}, {})", source, key),
        }
    }
}

impl Serialize for ItemKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ItemKey::Id(id) => serializer.serialize_str(id),
            ItemKey::Proxied { source, key } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(source)?;
                seq.serialize_element(key)?;
                seq.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_id_serializes_to_tag() {
        let id = SyncId::new("Account");
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("Account"));
        assert_eq!(id.to_string(), "Account");
    }

    #[test]
    fn keyed_id_serializes_to_flat_list() {
        let id = SyncId::tuple("Member", ["@alice:example.org", "!room:example.org"]);
        assert_eq!(
            serde_json::to_value(&id).unwrap(),
            json!(["Member", "@alice:example.org", "!room:example.org"])
        );
        assert_eq!(id.to_string(), "(Member, @alice:example.org, !room:example.org)");
        assert_eq!(id.shape(), SyncIdShape::new("Member", 2));
    }

    #[test]
    fn empty_components_are_invalid() {
        assert!(SyncId::new("").validate().is_err());
        assert!(SyncId::new("Room").with_key("").validate().is_err());
        assert!(SyncId::new("Room").with_key("@a:b").validate().is_ok());
    }

    #[test]
    fn nested_keys_route_through_every_level() {
        let rooms = SyncId::new("Room").with_key("@a:b");
        let all = SyncId::new("all_rooms");
        let key = ItemKey::proxied(all.clone(), ItemKey::proxied(rooms.clone(), "!r".into()));

        assert!(key.routes_through(&all));
        assert!(key.routes_through(&rooms));
        assert!(!key.routes_through(&SyncId::new("Account")));
        assert_eq!(key.root(), "!r");
        assert_eq!(key.source(), Some(&all));
        assert_eq!(
            serde_json::to_value(&key).unwrap(),
            json!(["all_rooms", [["Room", "@a:b"], "!r"]])
        );
    }
}
