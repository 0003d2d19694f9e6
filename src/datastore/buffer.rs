//! Live and historical write buffers.

use serde_json::Value;
use std::collections::BTreeMap;

/// One buffered historical value.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    /// Absolute timestamp, or the moment a failed live write was attempted
    /// when `relative` is set.
    pub timestamp: i64,
    pub value: Value,
    /// Send as an offset from the time of recording rather than as an
    /// absolute timestamp.
    pub relative: bool,
}

impl RecordEntry {
    pub fn absolute(timestamp: i64, value: Value) -> Self {
        Self {
            timestamp,
            value,
            relative: false,
        }
    }

    pub fn relative(timestamp: i64, value: Value) -> Self {
        Self {
            timestamp,
            value,
            relative: true,
        }
    }

    /// The timestamp to put on the wire when recording at `now`.
    ///
    /// Relative entries become negative offsets; an offset of zero or more
    /// is sent as `-1` because the platform reads non-negative numbers as
    /// absolute times.
    pub fn wire_timestamp(&self, now: i64) -> i64 {
        if self.relative {
            (self.timestamp - now).min(-1)
        } else {
            self.timestamp
        }
    }
}

/// Everything waiting to be written.
///
/// `record_count` always equals the number of entries across all record
/// queues; every mutation below keeps it that way.
#[derive(Debug, Default)]
pub struct WriteBuffers {
    live: BTreeMap<String, Value>,
    records: BTreeMap<String, Vec<RecordEntry>>,
    record_count: usize,
}

impl WriteBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffered items of both kinds.
    pub fn len(&self) -> usize {
        self.live.len() + self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self, capacity: usize) -> bool {
        self.len() >= capacity
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Set the pending live value for `alias`. Returns `false` when an
    /// earlier value was replaced.
    pub fn put_live(&mut self, alias: &str, value: Value) -> bool {
        self.live.insert(alias.to_owned(), value).is_none()
    }

    pub fn live_value(&self, alias: &str) -> Option<&Value> {
        self.live.get(alias)
    }

    /// Move every live value out, leaving the live buffer empty.
    pub fn take_live(&mut self) -> BTreeMap<String, Value> {
        core::mem::take(&mut self.live)
    }

    pub fn clear_live(&mut self) -> usize {
        let dropped = self.live.len();
        self.live.clear();
        dropped
    }

    pub fn push_record(&mut self, alias: &str, entry: RecordEntry) {
        self.records.entry(alias.to_owned()).or_default().push(entry);
        self.record_count += 1;
    }

    pub fn extend_records(&mut self, alias: &str, entries: impl IntoIterator<Item = RecordEntry>) {
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_none() {
            return;
        }
        let queue = self.records.entry(alias.to_owned()).or_default();
        let before = queue.len();
        queue.extend(entries);
        self.record_count += queue.len() - before;
    }

    pub fn records_for(&self, alias: &str) -> &[RecordEntry] {
        self.records
            .get(alias)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Copy of every record queue, in alias order.
    pub fn snapshot_records(&self) -> Vec<(String, Vec<RecordEntry>)> {
        self.records
            .iter()
            .map(|(alias, entries)| (alias.clone(), entries.clone()))
            .collect()
    }

    /// Remove the first `n` entries queued for `alias`, once they have been
    /// recorded or rejected for good. Entries appended after a snapshot was
    /// taken stay queued.
    pub fn settle_records(&mut self, alias: &str, n: usize) -> usize {
        let Some(queue) = self.records.get_mut(alias) else {
            return 0;
        };
        let n = n.min(queue.len());
        queue.drain(..n);
        if queue.is_empty() {
            self.records.remove(alias);
        }
        self.record_count -= n;
        n
    }
}
