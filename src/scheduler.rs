//! Debounced flushing of dirty models.
//!
//! A single background thread ticks at the flush interval and snapshots every
//! model that changed since its last snapshot, however many times it changed.
//! Models that did not change cost one flag check per tick.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::model::ModelDirectory;

/// Statistics from the scheduler thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: usize,
    pub snapshots: usize,
    pub failures: usize,
}

/// A background thread flushing every dirty model of a directory.
///
/// ## Example
///
/// ```ignore
/// let directory = ModelDirectory::new(ChannelSink::new(tx));
/// let scheduler = SyncScheduler::spawn(directory.clone(), Duration::from_millis(250));
///
/// // ... mutate models ...
///
/// let stats = scheduler.stop();
/// println!("{} snapshots in {} ticks", stats.snapshots, stats.ticks);
/// ```
pub struct SyncScheduler {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<SchedulerStats>>,
}

impl SyncScheduler {
    /// Spawn the scheduler thread.
    ///
    /// The directory handle is cloned into the thread; models created after
    /// the spawn are flushed too.
    pub fn spawn(directory: ModelDirectory, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = SchedulerStats::default();
            info!(interval_ms = interval.as_millis() as u64, "sync scheduler started");

            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                stats.ticks += 1;
                match directory.flush_dirty() {
                    Ok(report) => {
                        stats.snapshots += report.flushed;
                        stats.failures += report.failed;
                    }
                    Err(err) => {
                        warn!(error = %err, "flush pass failed");
                        stats.failures += 1;
                    }
                }
            }

            info!(
                ticks = stats.ticks,
                snapshots = stats.snapshots,
                "sync scheduler stopped"
            );
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    pub fn from_config(directory: ModelDirectory, config: &SyncConfig) -> Self {
        Self::spawn(directory, config.flush_interval)
    }

    /// Signal the scheduler to stop and wait for it to finish.
    /// Returns the scheduler statistics.
    pub fn stop(mut self) -> SchedulerStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            SchedulerStats::default()
        }
    }

    /// Signal the scheduler to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ModelId;
    use crate::sink::{ChannelSink, RenderEvent};
    use crate::{Model, SyncId};

    #[derive(Clone, Debug, Default, synced_rust_macros::ModelItem)]
    struct Counter {
        id: String,
        value: u32,
        owner: Option<ModelId>,
    }

    #[test]
    fn stop_returns_stats() {
        let (sink, _rx) = ChannelSink::channel();
        let directory = ModelDirectory::new(sink);
        let scheduler = SyncScheduler::spawn(directory, Duration::from_millis(5));

        thread::sleep(Duration::from_millis(40));
        let stats = scheduler.stop();
        assert!(stats.ticks > 0);
        assert_eq!(stats.snapshots, 0);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn burst_of_changes_flushes_once() {
        let (sink, rx) = ChannelSink::channel();
        let directory = ModelDirectory::new(sink);
        let counters = Model::<Counter>::new(&directory, SyncId::new("Counter")).unwrap();

        for value in 1..=50 {
            counters
                .insert(Counter {
                    id: "c".into(),
                    value,
                    owner: None,
                })
                .unwrap();
        }

        let scheduler = SyncScheduler::spawn(directory, Duration::from_millis(20));
        thread::sleep(Duration::from_millis(100));
        let stats = scheduler.stop();

        let snapshots: Vec<RenderEvent> = rx
            .try_iter()
            .filter(|e| matches!(e, RenderEvent::ModelUpdated { .. }))
            .collect();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(stats.snapshots, 1);
        assert!(!counters.is_dirty().unwrap());
    }
}
