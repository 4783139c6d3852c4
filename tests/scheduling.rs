mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use support::{drain, ids, recording_directory, snapshots, Point};
use synced_rust::{Model, RenderEvent, SyncConfig, SyncId, SyncScheduler};

#[test]
fn continuous_writes_snapshot_at_most_once_per_tick() {
    let (directory, rx) = recording_directory();
    let points = Model::<Point>::new(&directory, SyncId::new("Point")).unwrap();
    let scheduler = SyncScheduler::spawn(directory.clone(), Duration::from_millis(10));

    let running = Arc::new(AtomicBool::new(true));
    let writer = {
        let points = points.clone();
        let running = running.clone();
        thread::spawn(move || {
            let mut x = 0;
            while running.load(Ordering::SeqCst) {
                x += 1;
                points.insert(Point::at("p", x, 1)).unwrap();
                thread::sleep(Duration::from_millis(1));
            }
            x
        })
    };

    thread::sleep(Duration::from_millis(120));
    running.store(false, Ordering::SeqCst);
    let writes = writer.join().unwrap();
    let stats = scheduler.stop();
    points.flush_if_dirty().unwrap();

    let events = drain(&rx);
    let count = snapshots(&events, points.sync_id()).len();
    assert!(count >= 1);
    assert!(count <= stats.ticks + 1, "{} snapshots in {} ticks", count, stats.ticks);
    assert!((count as i64) < writes);

    // The last snapshot carries the last write
    match snapshots(&events, points.sync_id()).last() {
        Some(RenderEvent::ModelUpdated { items, .. }) => {
            assert_eq!(items[0].get("x").and_then(|v| v.as_i64()), Some(writes));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn concurrent_writers_lose_nothing() {
    let (directory, rx) = recording_directory();
    let points = Model::<Point>::new(&directory, SyncId::new("Point")).unwrap();
    let scheduler = SyncScheduler::spawn(directory.clone(), Duration::from_millis(5));

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let points = points.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let id = format!("w{}-{:02}", w, i);
                    points.insert(Point::ordered(&id, w * 100 + i)).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    thread::sleep(Duration::from_millis(30));
    let stats = scheduler.stop();
    assert_eq!(stats.failures, 0);
    assert_eq!(points.len().unwrap(), 100);
    assert!(!points.is_dirty().unwrap());

    let events = drain(&rx);
    match snapshots(&events, points.sync_id()).last() {
        Some(RenderEvent::ModelUpdated { items, .. }) => {
            let ordered = ids(items);
            assert_eq!(ordered.len(), 100);
            assert_eq!(ordered.first().map(String::as_str), Some("w0-00"));
            assert_eq!(ordered.last().map(String::as_str), Some("w3-24"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn scheduler_reads_interval_from_config() {
    let (directory, rx) = recording_directory();
    let points = Model::<Point>::new(&directory, SyncId::new("Point")).unwrap();
    let config = SyncConfig::from_json(r#"{ "flush_interval_ms": 5 }"#).unwrap();

    let scheduler = SyncScheduler::from_config(directory.clone(), &config);
    points.insert(Point::new("p")).unwrap();
    thread::sleep(Duration::from_millis(50));
    let stats = scheduler.stop();

    assert_eq!(stats.snapshots, 1);
    assert_eq!(snapshots(&drain(&rx), points.sync_id()).len(), 1);
}

#[test]
fn failed_flushes_are_counted_and_retried() {
    let (directory, rx) = recording_directory();
    let points = Model::<Point>::new(&directory, SyncId::new("Point")).unwrap();
    points.insert(Point::new("p")).unwrap();
    drop(rx);

    let scheduler = SyncScheduler::spawn(directory.clone(), Duration::from_millis(5));
    thread::sleep(Duration::from_millis(40));
    let stats = scheduler.stop();

    assert_eq!(stats.snapshots, 0);
    assert!(stats.failures >= 2);
    assert!(points.is_dirty().unwrap());
}
