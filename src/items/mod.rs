//! Records exchanged with the render surface, and the derived views built on
//! them.
//!
//! Each record type lives in models with a fixed sync id shape:
//!
//! | Record    | Sync id                          |
//! |-----------|----------------------------------|
//! | `Account` | `Account`                        |
//! | `Room`    | `(Room, user_id)`                |
//! | `Member`  | `(Member, user_id, room_id)`     |
//! | `Event`   | `(Event, user_id, room_id)`      |
//! | `Upload`  | `(Upload, user_id, room_id)`     |

mod special;

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::item::{FieldValue, ModelId, RenderValue};
use crate::sync_id::SyncId;
use crate::ModelItem;

pub use special::{
    all_rooms, default_store, filtered_members, filtered_members_id, matching_accounts,
    ALL_ROOMS, FILTERED_MEMBERS, MATCHING_ACCOUNTS,
};

/// Presence of a user, best first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Presence {
    Online,
    Unavailable,
    Invisible,
    #[default]
    Offline,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Unavailable => "unavailable",
            Presence::Invisible => "invisible",
            Presence::Offline => "offline",
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FieldValue for Presence {
    fn to_render(&self) -> RenderValue {
        RenderValue::String(self.as_str().to_string())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStatus {
    #[default]
    Preparing,
    Uploading,
    Caching,
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Preparing => "Preparing",
            UploadStatus::Uploading => "Uploading",
            UploadStatus::Caching => "Caching",
            UploadStatus::Error => "Error",
        }
    }
}

impl FieldValue for UploadStatus {
    fn to_render(&self) -> RenderValue {
        RenderValue::String(self.as_str().to_string())
    }
}

/// A logged in account.
#[derive(Clone, Debug, Default, ModelItem)]
#[item(order = "Account::display_order")]
pub struct Account {
    pub id: String,
    pub order: i64,
    pub display_name: String,
    pub avatar_url: String,
    pub max_upload_size: u64,
    pub connecting: bool,
    pub total_unread: u64,
    pub total_highlights: u64,
    pub presence: Presence,
    pub status_msg: String,
    pub owner: Option<ModelId>,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Account {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn sync_id() -> SyncId {
        SyncId::of::<Account>()
    }

    /// By configured order, then user id.
    fn display_order(a: &Self, b: &Self) -> Option<Ordering> {
        Some(a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)))
    }
}

/// A room an account is invited to, joined, or left.
#[derive(Clone, Debug, Default, ModelItem)]
#[item(order = "Room::display_order")]
pub struct Room {
    pub id: String,
    pub for_account: String,
    pub display_name: String,
    pub avatar_url: String,
    pub topic: String,
    pub inviter_id: String,
    pub left: bool,
    pub bookmarked: bool,
    pub typing_members: Vec<String>,
    pub unreads: u64,
    pub highlights: u64,
    pub last_event_date: DateTime<Utc>,
    pub owner: Option<ModelId>,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Room {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn sync_id(user_id: &str) -> SyncId {
        SyncId::of::<Room>().with_key(user_id)
    }

    pub fn is_invite(&self) -> bool {
        !self.left && !self.inviter_id.is_empty()
    }

    fn sort_name(&self) -> String {
        if self.display_name.is_empty() {
            self.id.to_lowercase()
        } else {
            self.display_name.to_lowercase()
        }
    }

    /// Grouped by account; bookmarks, then invites, then joined, then left
    /// rooms. Within a group: highlights, unreads, latest activity, name.
    fn display_order(a: &Self, b: &Self) -> Option<Ordering> {
        Some(
            a.for_account
                .cmp(&b.for_account)
                .then_with(|| b.bookmarked.cmp(&a.bookmarked))
                .then_with(|| a.left.cmp(&b.left))
                .then_with(|| b.is_invite().cmp(&a.is_invite()))
                .then_with(|| (b.highlights > 0).cmp(&(a.highlights > 0)))
                .then_with(|| (b.unreads > 0).cmp(&(a.unreads > 0)))
                .then_with(|| b.last_event_date.cmp(&a.last_event_date))
                .then_with(|| a.sort_name().cmp(&b.sort_name()))
                .then_with(|| a.id.cmp(&b.id)),
        )
    }
}

/// A member of a room.
#[derive(Clone, Debug, Default, ModelItem)]
#[item(order = "Member::display_order")]
pub struct Member {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
    pub typing: bool,
    pub power_level: i64,
    pub invited: bool,
    pub presence: Presence,
    pub owner: Option<ModelId>,
}

impl Member {
    pub fn new(id: impl Into<String>) -> Self {
        Member {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn sync_id(user_id: &str, room_id: &str) -> SyncId {
        SyncId::tuple(Member::TYPE_NAME, [user_id, room_id])
    }

    fn sort_name(&self) -> String {
        if self.display_name.is_empty() {
            self.id.trim_start_matches('@').to_lowercase()
        } else {
            self.display_name.to_lowercase()
        }
    }

    /// Joined before invited, then highest power level, presence and name.
    fn display_order(a: &Self, b: &Self) -> Option<Ordering> {
        Some(
            a.invited
                .cmp(&b.invited)
                .then_with(|| b.power_level.cmp(&a.power_level))
                .then_with(|| a.presence.cmp(&b.presence))
                .then_with(|| a.sort_name().cmp(&b.sort_name()))
                .then_with(|| a.id.cmp(&b.id)),
        )
    }
}

/// A timeline event.
#[derive(Clone, Debug, Default, ModelItem)]
#[item(order = "Event::display_order")]
pub struct Event {
    pub id: String,
    pub event_id: String,
    pub event_type: String,
    pub date: DateTime<Utc>,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub links: Vec<String>,
    pub is_local_echo: bool,
    pub owner: Option<ModelId>,
}

impl Event {
    pub fn new(id: impl Into<String>) -> Self {
        Event {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn sync_id(user_id: &str, room_id: &str) -> SyncId {
        SyncId::tuple(Event::TYPE_NAME, [user_id, room_id])
    }

    /// Local echoes first, then newest to oldest.
    fn display_order(a: &Self, b: &Self) -> Option<Ordering> {
        Some(
            b.is_local_echo
                .cmp(&a.is_local_echo)
                .then_with(|| b.date.cmp(&a.date))
                .then_with(|| b.id.cmp(&a.id)),
        )
    }
}

/// A running or failed file upload.
#[derive(Clone, Debug, Default, ModelItem)]
#[item(order = "Upload::display_order")]
pub struct Upload {
    pub id: Uuid,
    pub filepath: PathBuf,
    pub total_size: u64,
    pub uploaded: u64,
    pub speed: f64,
    pub time_left: Duration,
    pub paused: bool,
    pub status: UploadStatus,
    pub start_date: DateTime<Utc>,
    pub owner: Option<ModelId>,
}

impl Upload {
    /// A new upload of `filepath`, started now.
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Upload {
            id: Uuid::new_v4(),
            filepath: filepath.into(),
            start_date: Utc::now(),
            ..Default::default()
        }
    }

    pub fn sync_id(user_id: &str, room_id: &str) -> SyncId {
        SyncId::tuple(Upload::TYPE_NAME, [user_id, room_id])
    }

    /// Newest first.
    fn display_order(a: &Self, b: &Self) -> Option<Ordering> {
        Some(
            b.start_date
                .cmp(&a.start_date)
                .then_with(|| b.id.cmp(&a.id)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn accounts_sort_by_order_then_id() {
        let a = Account {
            order: 2,
            ..Account::new("@a:x")
        };
        let b = Account {
            order: 1,
            ..Account::new("@b:x")
        };
        assert_eq!(a.compare(&b), Some(Ordering::Greater));
        assert_eq!(Account::new("@a:x").compare(&Account::new("@b:x")), Some(Ordering::Less));
    }

    #[test]
    fn rooms_sort_invites_first_left_last() {
        let joined = Room {
            display_name: "Joined".into(),
            ..Room::new("!joined")
        };
        let invite = Room {
            inviter_id: "@bob:x".into(),
            ..Room::new("!invite")
        };
        let left = Room {
            left: true,
            inviter_id: "@bob:x".into(),
            ..Room::new("!left")
        };
        let mut rooms = vec![left.clone(), joined.clone(), invite.clone()];
        rooms.sort_by(|a, b| a.compare(b).unwrap());

        let ids: Vec<&str> = rooms.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["!invite", "!joined", "!left"]);
    }

    #[test]
    fn rooms_with_activity_come_first() {
        let quiet = Room {
            display_name: "aaa".into(),
            last_event_date: at(10),
            ..Room::new("!quiet")
        };
        let recent = Room {
            display_name: "zzz".into(),
            last_event_date: at(20),
            ..Room::new("!recent")
        };
        let unread = Room {
            unreads: 3,
            ..Room::new("!unread")
        };
        let mut rooms = vec![quiet, recent, unread];
        rooms.sort_by(|a, b| a.compare(b).unwrap());

        let ids: Vec<&str> = rooms.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["!unread", "!recent", "!quiet"]);
    }

    #[test]
    fn members_sort_by_power_then_name() {
        let admin = Member {
            power_level: 100,
            display_name: "Zed".into(),
            ..Member::new("@zed:x")
        };
        let alice = Member::new("@alice:x");
        let bob = Member {
            display_name: "bob".into(),
            ..Member::new("@bob:x")
        };
        let mut members = vec![bob, alice, admin];
        members.sort_by(|a, b| a.compare(b).unwrap());

        let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["@zed:x", "@alice:x", "@bob:x"]);
    }

    #[test]
    fn events_put_local_echoes_first() {
        let old = Event {
            date: at(1),
            ..Event::new("$old")
        };
        let new = Event {
            date: at(2),
            ..Event::new("$new")
        };
        let echo = Event {
            is_local_echo: true,
            ..Event::new("echo")
        };
        let mut events = vec![old, echo, new];
        events.sort_by(|a, b| a.compare(b).unwrap());

        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["echo", "$new", "$old"]);
    }

    #[test]
    fn enums_render_as_strings() {
        let account = Account {
            presence: Presence::Online,
            ..Account::new("@a:x")
        };
        assert_eq!(account.field("presence"), Some(json!("online")));

        let upload = Upload::new("/tmp/cat.png");
        assert_eq!(upload.field("status"), Some(json!("Preparing")));
        assert_eq!(upload.field("filepath"), Some(json!("file:///tmp/cat.png")));
        assert_eq!(upload.key().to_string(), upload.id.to_string());
    }

    #[test]
    fn owner_is_not_serialized() {
        let room = Room::new("!r");
        let fields = room.serialized();
        assert!(fields.contains_key("for_account"));
        assert!(!fields.contains_key("owner"));
    }
}
