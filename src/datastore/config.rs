use crate::network::application::onep::{DataportDescription, Format, Limit, Visibility};
use core::fmt::Debug;
use core::time::Duration;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// The flush worker never runs more often than this.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Datastore options.
#[derive(Debug, Clone, PartialEq)]
pub struct DatastoreConfig {
    /// Upper bound on live values plus buffered records. Writes are refused
    /// once the total reaches it.
    pub write_buffer_size: usize,
    /// Number of aliases the read cache holds before it is emptied.
    pub read_cache_size: usize,
    /// How long a cached read stays fresh.
    pub read_cache_expire: Duration,
    /// Time between flush cycles. Clamped to [`MIN_FLUSH_INTERVAL`].
    pub flush_interval: Duration,
    /// Create missing dataports on first use instead of refusing writes.
    pub auto_create: Option<AutoCreate>,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            write_buffer_size: 1024,
            read_cache_size: 1024,
            read_cache_expire: Duration::from_secs(5),
            flush_interval: MIN_FLUSH_INTERVAL,
            auto_create: None,
        }
    }
}

impl DatastoreConfig {
    pub fn effective_flush_interval(&self) -> Duration {
        self.flush_interval.max(MIN_FLUSH_INTERVAL)
    }
}

/// How auto-created dataports are set up. The dataport is named after its
/// alias.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoCreate {
    pub format: Format,
    pub preprocess: Vec<Value>,
    pub count: Limit,
    pub duration: Limit,
    pub visibility: Visibility,
}

impl AutoCreate {
    pub fn describe(&self, alias: &str) -> DataportDescription {
        DataportDescription {
            name: alias.to_owned(),
            format: self.format,
            visibility: self.visibility,
            count: self.count,
            duration: self.duration,
            preprocess: self.preprocess.clone(),
        }
    }
}

/// Wall-clock seconds, as the platform timestamps data.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }
}
