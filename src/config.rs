use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default debounce interval between snapshots of a changing model.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Runtime settings for model synchronization.
///
/// ```ignore
/// let config = SyncConfig::from_json(r#"{ "flush_interval_ms": 100 }"#)?;
/// let scheduler = SyncScheduler::from_config(directory.clone(), &config);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    #[serde(rename = "flush_interval_ms", with = "millis")]
    pub flush_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
