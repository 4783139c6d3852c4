//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::mpsc::Receiver;

use synced_rust::{ChannelSink, ModelDirectory, ModelId, ModelItem, RenderEvent, SyncId};

/// A directory whose render events can be inspected.
pub fn recording_directory() -> (ModelDirectory, Receiver<RenderEvent>) {
    let (sink, rx) = ChannelSink::channel();
    (ModelDirectory::new(sink), rx)
}

/// Every event received so far.
pub fn drain(rx: &Receiver<RenderEvent>) -> Vec<RenderEvent> {
    rx.try_iter().collect()
}

/// Snapshots addressed to `sync_id`.
pub fn snapshots<'a>(events: &'a [RenderEvent], sync_id: &SyncId) -> Vec<&'a RenderEvent> {
    events
        .iter()
        .filter(|e| matches!(e, RenderEvent::ModelUpdated { .. }) && e.sync_id() == sync_id)
        .collect()
}

/// A record with a few mergeable fields and an explicit order.
#[derive(Clone, Debug, Default, ModelItem)]
#[item(order = "Point::by_order")]
pub struct Point {
    pub id: String,
    pub x: i64,
    pub y: i64,
    pub order: i64,
    pub label: String,
    pub owner: Option<ModelId>,
}

impl Point {
    pub fn new(id: &str) -> Self {
        Point {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn at(id: &str, x: i64, y: i64) -> Self {
        Point {
            x,
            y,
            ..Point::new(id)
        }
    }

    pub fn ordered(id: &str, order: i64) -> Self {
        Point {
            order,
            ..Point::new(id)
        }
    }

    pub fn labeled(id: &str, label: &str) -> Self {
        Point {
            label: label.to_string(),
            ..Point::new(id)
        }
    }

    fn by_order(a: &Self, b: &Self) -> Option<Ordering> {
        Some(a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)))
    }
}

/// A record whose order is undefined for NaN scores.
#[derive(Clone, Debug, Default, ModelItem)]
#[item(order = "Score::by_value")]
pub struct Score {
    pub id: String,
    pub value: f64,
    pub owner: Option<ModelId>,
}

impl Score {
    pub fn new(id: &str, value: f64) -> Self {
        Score {
            id: id.to_string(),
            value,
            owner: None,
        }
    }

    fn by_value(a: &Self, b: &Self) -> Option<Ordering> {
        a.value.partial_cmp(&b.value)
    }
}

/// Ids of serialized records, in order.
pub fn ids(items: &[synced_rust::FieldMap]) -> Vec<String> {
    items
        .iter()
        .filter_map(|fields| fields.get("id").and_then(|v| v.as_str()).map(String::from))
        .collect()
}
