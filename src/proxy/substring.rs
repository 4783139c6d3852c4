use std::fmt;
use std::sync::{Arc, RwLock};

use super::{ModelFilter, RefilterOutcome, SourceAcceptor};
use crate::error::ModelError;
use crate::item::{ModelItem, RenderValue};
use crate::model::{DerivedModel, Model, ModelDirectory};
use crate::sync_id::SyncId;

/// Whether `text` matches a live filter string.
///
/// An empty filter matches everything. Otherwise every whitespace-separated
/// token of `filter` must occur in `text`. Matching ignores case unless
/// `filter` contains an uppercase character.
pub fn matches_filter(filter: &str, text: &str) -> bool {
    if filter.trim().is_empty() {
        return true;
    }

    if filter.chars().any(char::is_uppercase) {
        filter.split_whitespace().all(|token| text.contains(token))
    } else {
        let text = text.to_lowercase();
        filter
            .split_whitespace()
            .all(|token| text.contains(&token.to_lowercase()))
    }
}

struct SubstringMatcher {
    fields: Vec<String>,
    text: RwLock<String>,
}

impl SubstringMatcher {
    fn searched_text<T: ModelItem>(&self, item: &T) -> String {
        self.fields
            .iter()
            .filter_map(|name| match item.field(name)? {
                RenderValue::Null => None,
                RenderValue::String(text) => Some(text),
                other => Some(other.to_string()),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn accepts<T: ModelItem>(&self, item: &T) -> bool {
        match self.text.read() {
            Ok(filter) => matches_filter(&filter, &self.searched_text(item)),
            // A poisoned filter string shows everything
            Err(_) => true,
        }
    }
}

/// A filter showing records whose fields contain every token of a live
/// filter string.
///
/// ## Example
///
/// ```ignore
/// let rooms = FieldSubstringFilter::<Room>::new(
///     &directory,
///     SyncId::new("all_rooms"),
///     SyncIdShape::new("Room", 1),
///     &["display_name"],
/// )?;
///
/// rooms.set_filter("matrix hq")?;
/// ```
pub struct FieldSubstringFilter<T: ModelItem> {
    filter: Arc<ModelFilter<T>>,
    matcher: Arc<SubstringMatcher>,
}

impl<T: ModelItem> FieldSubstringFilter<T> {
    pub fn new(
        directory: &ModelDirectory,
        sync_id: SyncId,
        sources: impl SourceAcceptor + 'static,
        fields: &[&str],
    ) -> Result<Arc<Self>, ModelError> {
        let matcher = Arc::new(SubstringMatcher {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            text: RwLock::new(String::new()),
        });
        let accepting = matcher.clone();
        let filter = ModelFilter::new(directory, sync_id, sources, move |item: &T| {
            accepting.accepts(item)
        })?;
        Ok(Arc::new(FieldSubstringFilter { filter, matcher }))
    }

    /// The current filter string.
    pub fn filter(&self) -> Result<String, ModelError> {
        let text = self
            .matcher
            .text
            .read()
            .map_err(|_| ModelError::LockPoisoned("filter text"))?;
        Ok(text.clone())
    }

    /// Replace the filter string and refilter.
    pub fn set_filter(&self, text: impl Into<String>) -> Result<RefilterOutcome, ModelError> {
        {
            let mut current = self
                .matcher
                .text
                .write()
                .map_err(|_| ModelError::LockPoisoned("filter text"))?;
            *current = text.into();
        }
        self.filter.refilter()
    }

    pub fn refilter(&self) -> Result<RefilterOutcome, ModelError> {
        self.filter.refilter()
    }

    pub fn on_refiltered<F>(&self, callback: F) -> Result<(), ModelError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.filter.on_refiltered(callback)
    }

    pub fn inner(&self) -> &Arc<ModelFilter<T>> {
        &self.filter
    }

    pub fn model(&self) -> &Arc<Model<T>> {
        self.filter.model()
    }
}

impl<T: ModelItem> DerivedModel<T> for FieldSubstringFilter<T> {
    fn model(&self) -> &Arc<Model<T>> {
        self.filter.model()
    }
}

impl<T: ModelItem> fmt::Debug for FieldSubstringFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSubstringFilter")
            .field("fields", &self.matcher.fields)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ModelId;
    use crate::sink::NullSink;
    use crate::sync_id::ItemKey;

    #[derive(Clone, Debug, Default, synced_rust_macros::ModelItem)]
    struct Contact {
        id: String,
        name: String,
        note: Option<String>,
        owner: Option<ModelId>,
    }

    fn contact(id: &str, name: &str) -> Contact {
        Contact {
            id: id.into(),
            name: name.into(),
            note: None,
            owner: None,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches_filter("", "anything"));
        assert!(matches_filter("   ", ""));
    }

    #[test]
    fn lowercase_filter_ignores_case() {
        assert!(matches_filter("abc", "ABC Room"));
        assert!(matches_filter("room abc", "ABC Room"));
        assert!(!matches_filter("abc xyz", "ABC Room"));
    }

    #[test]
    fn uppercase_filter_is_case_sensitive() {
        assert!(!matches_filter("Abc", "ABC Room"));
        assert!(matches_filter("Abc", "The Abc room"));
        assert!(!matches_filter("Abc room", "The Abc Room"));
    }

    #[test]
    fn searches_configured_fields_only() {
        let directory = ModelDirectory::new(NullSink);
        let contacts = Model::<Contact>::new(&directory, SyncId::new("Contact")).unwrap();
        let filter = FieldSubstringFilter::<Contact>::new(
            &directory,
            SyncId::new("contact_search"),
            SyncId::new("Contact"),
            &["name", "note"],
        )
        .unwrap();

        contacts.insert(contact("c1", "Alice")).unwrap();
        contacts
            .insert(Contact {
                note: Some("met at FOSDEM".into()),
                ..contact("c2", "Bob")
            })
            .unwrap();

        filter.set_filter("fosdem").unwrap();
        assert_eq!(
            filter.model().keys().unwrap(),
            vec![ItemKey::proxied(SyncId::new("Contact"), "c2".into())]
        );

        // Keys are not searched
        let outcome = filter.set_filter("c1").unwrap();
        assert_eq!(outcome.hidden, 1);
        assert!(filter.model().is_empty().unwrap());

        filter.set_filter("").unwrap();
        assert_eq!(filter.model().len().unwrap(), 2);
        assert_eq!(filter.filter().unwrap(), "");
    }

    #[test]
    fn new_records_respect_current_filter() {
        let directory = ModelDirectory::new(NullSink);
        let filter = FieldSubstringFilter::<Contact>::new(
            &directory,
            SyncId::new("contact_search"),
            SyncId::new("Contact"),
            &["name"],
        )
        .unwrap();
        let contacts = Model::<Contact>::new(&directory, SyncId::new("Contact")).unwrap();

        filter.set_filter("ali").unwrap();
        contacts.insert(contact("c1", "Alice")).unwrap();
        contacts.insert(contact("c2", "Bob")).unwrap();

        assert_eq!(filter.model().len().unwrap(), 1);
        assert_eq!(filter.inner().filtered_out_len().unwrap(), 1);
    }
}
