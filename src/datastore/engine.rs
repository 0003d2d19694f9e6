//! The flush cycle and the worker thread that runs it.
//!
//! Each cycle first writes every buffered live value in one `writegroup`
//! call, then records each alias's historical queue with one `record` call.
//! A failed live write is not lost: its values move to the historical queue
//! and are recorded later at offsets from the time of the failed attempt.
//!
//! The worker is a small state machine:
//!
//! * `Running`: a cycle every flush interval.
//! * `DrainingBeforeStop`: cycles continue until the historical queue is
//!   empty, then the worker stops by itself.
//! * `Stopped`: the worker exits after any cycle already under way.

use super::Shared;
use super::buffer::RecordEntry;
use crate::network::application::onep::{DataPoint, ResourceRef, RpcError, Transport};
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::PoisonError;
use tracing::{debug, error, info, warn};

/// Lifecycle of the flush worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    DrainingBeforeStop,
    Stopped,
}

/// How [`Datastore::stop`](super::Datastore::stop) ends the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Keep flushing until no historical records are left.
    Graceful,
    /// Stop now and throw away live values that were not written yet.
    Forced,
}

/// Platform answers meaning the points already exist. Matched whole and
/// without regard to case.
const DUPLICATE_STATUSES: &[&str] = &[
    "duplicate",
    "duplicate datapoint",
    "duplicate_datapoint",
    "datapoint exists",
];

/// What to do with historical entries the platform refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// The points are already stored; retrying can never succeed, so the
    /// entries are dropped.
    Duplicate,
    /// Anything else; the entries stay queued for the next cycle.
    Retry,
}

impl RejectKind {
    /// Classify a failed call's status, or a platform error object by its
    /// `message`.
    pub fn classify(payload: &Value) -> Self {
        let text = match payload {
            Value::String(status) => Some(status.as_str()),
            Value::Object(error) => error.get("message").and_then(Value::as_str),
            _ => None,
        };
        match text {
            Some(text)
                if DUPLICATE_STATUSES
                    .iter()
                    .any(|known| text.trim().eq_ignore_ascii_case(known)) =>
            {
                RejectKind::Duplicate
            }
            _ => RejectKind::Retry,
        }
    }

    fn of_error(error: &RpcError) -> Self {
        match error {
            RpcError::Platform(payload) => Self::classify(payload),
            _ => RejectKind::Retry,
        }
    }
}

/// What one cycle did, by number of values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Live values written.
    pub written: usize,
    /// Live values moved to the historical queue after a failure.
    pub rerouted: usize,
    /// Live values dropped because their dataport does not exist.
    pub skipped: usize,
    /// Historical entries recorded.
    pub recorded: usize,
    /// Historical entries dropped for good.
    pub dropped: usize,
    /// Historical entries left queued for a later cycle.
    pub retained: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

impl<T: Transport> Shared<T> {
    /// Worker thread body.
    pub(super) fn run(&self) {
        let interval = self.config.effective_flush_interval();
        info!(?interval, "flush worker started");

        // Set while draining with entries the last cycle could not record,
        // so retries keep to the flush interval.
        let mut retrying = false;
        loop {
            {
                let state = self.control();
                let (state, _) = self
                    .wakeup
                    .wait_timeout_while(state, interval, |state| {
                        *state == EngineState::Running
                            || (retrying && *state == EngineState::DrainingBeforeStop)
                    })
                    .unwrap_or_else(PoisonError::into_inner);
                if *state == EngineState::Stopped {
                    break;
                }
            }

            if catch_unwind(AssertUnwindSafe(|| self.run_cycle())).is_err() {
                error!("flush cycle panicked, continuing with the next one");
            }

            let mut state = self.control();
            match *state {
                EngineState::Stopped => break,
                EngineState::DrainingBeforeStop => {
                    if self.buffers().record_count() == 0 {
                        *state = EngineState::Stopped;
                        break;
                    }
                    retrying = true;
                }
                EngineState::Running => retrying = false,
            }
        }

        self.wakeup.notify_all();
        info!("flush worker stopped");
    }

    /// One full cycle: live values first, then history.
    pub(super) fn run_cycle(&self) -> CycleReport {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        let mut report = CycleReport::default();
        self.flush_live(&mut report);
        self.flush_records(&mut report);
        if !report.is_idle() {
            debug!(?report, "flush cycle finished");
        }
        report
    }

    fn flush_live(&self, report: &mut CycleReport) {
        let live = self.buffers().take_live();
        if live.is_empty() {
            return;
        }

        let prepared_at = self.clock.now();
        let mut group = Vec::with_capacity(live.len());
        let mut attempted = Vec::with_capacity(live.len());
        for (alias, value) in live {
            match self.ensure_dataport(&alias) {
                Ok(Some(rid)) => {
                    debug!(alias = %alias, %value, "live value to be written");
                    group.push((ResourceRef::Rid(rid), value.clone()));
                    attempted.push((alias, value));
                }
                Ok(None) => {
                    warn!(alias = %alias, "dataport does not exist and auto-create is off, dropping live value");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(alias = %alias, error = %e, "could not prepare dataport, keeping live value as history");
                    self.buffers()
                        .push_record(&alias, RecordEntry::relative(prepared_at, value));
                    report.rerouted += 1;
                }
            }
        }
        if group.is_empty() {
            return;
        }

        let written_at = self.clock.now();
        let failure = match self.client.writegroup(&self.identity, &group) {
            Ok(reply) if reply.success => None,
            Ok(reply) => Some(reply.payload.to_string()),
            Err(e) => Some(e.to_string()),
        };
        match failure {
            None => {
                info!(count = group.len(), "wrote live values");
                report.written += group.len();
            }
            Some(reason) => {
                error!(%reason, count = attempted.len(), "live write failed, keeping values as history");
                report.rerouted += attempted.len();
                let mut buffers = self.buffers();
                for (alias, value) in attempted {
                    buffers.push_record(&alias, RecordEntry::relative(written_at, value));
                }
            }
        }
    }

    fn flush_records(&self, report: &mut CycleReport) {
        let snapshot = self.buffers().snapshot_records();
        for (alias, entries) in snapshot {
            let rid = match self.ensure_dataport(&alias) {
                Ok(Some(rid)) => rid,
                Ok(None) => {
                    let dropped = self.buffers().settle_records(&alias, entries.len());
                    warn!(alias = %alias, dropped, "dataport does not exist, dropping buffered records");
                    report.dropped += dropped;
                    continue;
                }
                Err(e) => {
                    error!(alias = %alias, error = %e, "could not prepare dataport, records stay queued");
                    report.retained += entries.len();
                    continue;
                }
            };

            let now = self.clock.now();
            let points = entries
                .iter()
                .map(|entry| DataPoint {
                    timestamp: entry.wire_timestamp(now),
                    value: entry.value.clone(),
                })
                .collect::<Vec<_>>();

            let reply = self.client.record(&self.identity, &ResourceRef::Rid(rid), &points);
            let outcome = match reply {
                Ok(reply) if reply.success => Ok(()),
                Ok(reply) => Err((RejectKind::classify(&reply.payload), reply.payload.to_string())),
                Err(e) => Err((RejectKind::of_error(&e), e.to_string())),
            };
            match outcome {
                Ok(()) => {
                    let recorded = self.buffers().settle_records(&alias, entries.len());
                    info!(alias = %alias, recorded, "recorded historical values");
                    report.recorded += recorded;
                }
                Err((RejectKind::Duplicate, reason)) => {
                    let dropped = self.buffers().settle_records(&alias, entries.len());
                    warn!(alias = %alias, dropped, %reason, "platform already holds these points, dropping them");
                    report.dropped += dropped;
                }
                Err((RejectKind::Retry, reason)) => {
                    error!(alias = %alias, %reason, "recording failed, records stay queued");
                    report.retained += entries.len();
                }
            }
        }
    }
}
