//! Numbered call envelopes.

use super::method::{PendingCall, Procedure};
use core::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One call inside a request's `calls` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub id: u64,
    pub procedure: Procedure,
    pub arguments: Vec<Value>,
}

/// Hands out call ids.
///
/// Ids start at the configured value and are never reused for the lifetime
/// of the composer, so responses from different batches cannot be confused
/// with one another. Each batch reserves a contiguous block, which keeps ids
/// inside one batch consecutive even when several threads compose at once.
#[derive(Debug)]
pub struct CallComposer {
    next_id: AtomicU64,
}

impl CallComposer {
    pub fn new(start_id: u64) -> Self {
        Self {
            next_id: AtomicU64::new(start_id),
        }
    }

    /// Number the calls of one batch.
    pub fn compose(&self, calls: Vec<PendingCall>) -> Vec<CallEnvelope> {
        let first = self
            .next_id
            .fetch_add(calls.len() as u64, Ordering::Relaxed);
        calls
            .into_iter()
            .zip(first..)
            .map(|(call, id)| CallEnvelope {
                id,
                procedure: call.procedure,
                arguments: call.arguments,
            })
            .collect()
    }

    /// The id the next composed call will receive.
    pub fn peek_next_id(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

impl Default for CallComposer {
    fn default() -> Self {
        Self::new(0)
    }
}
