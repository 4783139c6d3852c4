use std::sync::Arc;

use tracing::warn;

use super::{Account, Member, Room, Upload};
use crate::error::ModelError;
use crate::model::{ModelDirectory, ModelStore};
use crate::proxy::{FieldSubstringFilter, ModelFilter};
use crate::sync_id::{SyncId, SyncIdShape};
use crate::ModelItem;

pub const ALL_ROOMS: &str = "all_rooms";
pub const MATCHING_ACCOUNTS: &str = "matching_accounts";
pub const FILTERED_MEMBERS: &str = "filtered_members";

/// Rooms of every account, searchable by name.
pub fn all_rooms(
    directory: &ModelDirectory,
) -> Result<Arc<FieldSubstringFilter<Room>>, ModelError> {
    FieldSubstringFilter::new(
        directory,
        SyncId::new(ALL_ROOMS),
        SyncIdShape::new(Room::TYPE_NAME, 1),
        &["display_name"],
    )
}

/// Accounts owning at least one room shown by `all_rooms`.
///
/// Every account matches while the room filter is empty, so accounts without
/// rooms stay visible. Refilters whenever `all_rooms` does.
pub fn matching_accounts(
    directory: &ModelDirectory,
    all_rooms: &Arc<FieldSubstringFilter<Room>>,
) -> Result<Arc<ModelFilter<Account>>, ModelError> {
    let rooms = Arc::downgrade(all_rooms);
    let accounts = ModelFilter::new(
        directory,
        SyncId::new(MATCHING_ACCOUNTS),
        Account::sync_id(),
        move |account: &Account| match rooms.upgrade() {
            Some(rooms) => has_visible_room(&rooms, account),
            None => true,
        },
    )?;

    let dependent = Arc::downgrade(&accounts);
    all_rooms.on_refiltered(move || {
        let Some(accounts) = dependent.upgrade() else {
            return;
        };
        if let Err(err) = accounts.refilter() {
            warn!(error = %err, "refiltering {} failed", MATCHING_ACCOUNTS);
        }
    })?;

    Ok(accounts)
}

fn has_visible_room(rooms: &FieldSubstringFilter<Room>, account: &Account) -> bool {
    match rooms.filter() {
        Ok(filter) if !filter.is_empty() => {}
        _ => return true,
    }
    match rooms.model().values() {
        Ok(visible) => visible.iter().any(|room| room.for_account == account.id),
        Err(_) => true,
    }
}

pub fn filtered_members_id(user_id: &str, room_id: &str) -> SyncId {
    SyncId::tuple(FILTERED_MEMBERS, [user_id, room_id])
}

/// Searchable members of one room, for `(filtered_members, user_id, room_id)`.
pub fn filtered_members(
    directory: &ModelDirectory,
    sync_id: &SyncId,
) -> Result<Arc<FieldSubstringFilter<Member>>, ModelError> {
    let source = SyncId::tuple(Member::TYPE_NAME, sync_id.keys().iter().cloned());
    FieldSubstringFilter::new(directory, sync_id.clone(), source, &["display_name"])
}

/// A store accepting every record model, with `all_rooms`,
/// `matching_accounts` and `filtered_members` views.
pub fn default_store(directory: &ModelDirectory) -> Result<ModelStore, ModelError> {
    let store = ModelStore::new(directory.clone())
        .allow::<Account>(0)
        .allow::<Room>(1)
        .allow::<Member>(2)
        .allow::<super::Event>(2)
        .allow::<Upload>(2)
        .allow_special::<Member, _, _>(FILTERED_MEMBERS, 2, filtered_members);

    let rooms = all_rooms(directory)?;
    let accounts = matching_accounts(directory, &rooms)?;
    store.register_special::<Room, _>(rooms)?;
    store.register_special::<Account, _>(accounts)?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;
    use crate::sync_id::ItemKey;
    use crate::Model;

    fn room(id: &str, account: &str, name: &str) -> Room {
        Room {
            for_account: account.into(),
            display_name: name.into(),
            ..Room::new(id)
        }
    }

    #[test]
    fn all_rooms_spans_accounts() {
        let directory = ModelDirectory::new(NullSink);
        let store = default_store(&directory).unwrap();

        let alice = store.get_or_create::<Room>(&Room::sync_id("@alice:x")).unwrap();
        let bob = store.get_or_create::<Room>(&Room::sync_id("@bob:x")).unwrap();
        alice.insert(room("!1", "@alice:x", "Rust")).unwrap();
        bob.insert(room("!2", "@bob:x", "Matrix HQ")).unwrap();

        let rooms = store
            .special::<FieldSubstringFilter<Room>>(&SyncId::new(ALL_ROOMS))
            .unwrap();
        assert_eq!(rooms.model().len().unwrap(), 2);

        rooms.set_filter("matrix").unwrap();
        let keys = rooms.model().keys().unwrap();
        assert_eq!(
            keys,
            vec![ItemKey::proxied(Room::sync_id("@bob:x"), "!2".into())]
        );
    }

    #[test]
    fn matching_accounts_follow_room_filter() {
        let directory = ModelDirectory::new(NullSink);
        let store = default_store(&directory).unwrap();

        let accounts = store.get_or_create::<Account>(&Account::sync_id()).unwrap();
        accounts.insert(Account::new("@alice:x")).unwrap();
        accounts.insert(Account::new("@bob:x")).unwrap();
        store
            .get_or_create::<Room>(&Room::sync_id("@alice:x"))
            .unwrap()
            .insert(room("!1", "@alice:x", "Rust"))
            .unwrap();

        let matching = store
            .get_or_create::<Account>(&SyncId::new(MATCHING_ACCOUNTS))
            .unwrap();
        assert_eq!(matching.len().unwrap(), 2);

        let rooms = store
            .special::<FieldSubstringFilter<Room>>(&SyncId::new(ALL_ROOMS))
            .unwrap();
        rooms.set_filter("rust").unwrap();
        assert_eq!(
            matching.keys().unwrap(),
            vec![ItemKey::proxied(Account::sync_id(), "@alice:x".into())]
        );

        rooms.set_filter("").unwrap();
        assert_eq!(matching.len().unwrap(), 2);
    }

    #[test]
    fn filtered_members_are_created_on_demand() {
        let directory = ModelDirectory::new(NullSink);
        let store = default_store(&directory).unwrap();

        let members: Arc<Model<Member>> = store
            .get_or_create(&Member::sync_id("@alice:x", "!1"))
            .unwrap();
        members
            .insert(Member {
                display_name: "Bob".into(),
                ..Member::new("@bob:x")
            })
            .unwrap();
        members.insert(Member::new("@carol:x")).unwrap();
        // Another room's members stay out
        store
            .get_or_create::<Member>(&Member::sync_id("@alice:x", "!2"))
            .unwrap()
            .insert(Member::new("@dave:x"))
            .unwrap();

        let id = filtered_members_id("@alice:x", "!1");
        let filter = store.special::<FieldSubstringFilter<Member>>(&id).unwrap();
        assert_eq!(filter.model().len().unwrap(), 2);

        filter.set_filter("bob").unwrap();
        assert_eq!(filter.model().len().unwrap(), 1);

        let again = store.special::<FieldSubstringFilter<Member>>(&id).unwrap();
        assert!(Arc::ptr_eq(&filter, &again));
    }

    #[test]
    fn views_cannot_be_registered_twice() {
        let directory = ModelDirectory::new(NullSink);
        let store = default_store(&directory).unwrap();

        // The directory refuses a second view under the same id
        let err = ModelFilter::<Account>::new(
            &directory,
            SyncId::new(MATCHING_ACCOUNTS),
            Account::sync_id(),
            crate::proxy::AcceptAll,
        )
        .unwrap_err();
        assert_eq!(err, ModelError::AlreadyRegistered(MATCHING_ACCOUNTS.into()));

        // So does the store, for a view built against another directory
        let elsewhere = ModelDirectory::new(NullSink);
        let stray = ModelFilter::<Account>::new(
            &elsewhere,
            SyncId::new(MATCHING_ACCOUNTS),
            Account::sync_id(),
            crate::proxy::AcceptAll,
        )
        .unwrap();
        let err = store.register_special::<Account, _>(stray).unwrap_err();
        assert_eq!(err, ModelError::AlreadyRegistered(MATCHING_ACCOUNTS.into()));

        // The original view keeps mirroring
        let accounts = store.get_or_create::<Account>(&Account::sync_id()).unwrap();
        accounts.insert(Account::new("@alice:x")).unwrap();
        let matching = store
            .get_or_create::<Account>(&SyncId::new(MATCHING_ACCOUNTS))
            .unwrap();
        assert_eq!(matching.len().unwrap(), 1);
    }
}
