//! Per-identity queues of calls waiting to be sent as one batch.

use super::auth::Identity;
use super::error::RpcError;
use super::method::PendingCall;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Queue {
    calls: Vec<PendingCall>,
    no_timeout: bool,
}

/// The calls taken out of a queue by [`DeferredRequests::drain`].
#[derive(Debug, Clone, PartialEq)]
pub struct DrainedCalls {
    pub calls: Vec<PendingCall>,
    /// Set when any drained call long-polls, so the batch must be sent
    /// without a client-side timeout.
    pub no_timeout: bool,
}

/// Deferred calls keyed by [`Identity::queue_key`].
///
/// A key is present only while it has at least one queued call.
#[derive(Debug, Default)]
pub struct DeferredRequests {
    queues: HashMap<String, Queue>,
}

impl DeferredRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a call. `no_timeout` sticks for the identity until its queue is
    /// drained.
    pub fn add(&mut self, identity: &Identity, call: PendingCall, no_timeout: bool) {
        let queue = self.queues.entry(identity.queue_key()).or_default();
        queue.calls.push(call);
        queue.no_timeout |= no_timeout;
    }

    pub fn has_pending(&self, identity: &Identity) -> bool {
        self.queues
            .get(&identity.queue_key())
            .is_some_and(|q| !q.calls.is_empty())
    }

    /// Number of calls queued for `identity`.
    pub fn pending_len(&self, identity: &Identity) -> usize {
        self.queues
            .get(&identity.queue_key())
            .map_or(0, |q| q.calls.len())
    }

    /// Take every queued call for `identity`, removing its queue.
    ///
    /// Fails with [`RpcError::NoPendingCalls`] when nothing is queued,
    /// including a second drain right after the first.
    pub fn drain(&mut self, identity: &Identity) -> Result<DrainedCalls, RpcError> {
        match self.queues.remove(&identity.queue_key()) {
            Some(queue) if !queue.calls.is_empty() => Ok(DrainedCalls {
                calls: queue.calls,
                no_timeout: queue.no_timeout,
            }),
            _ => Err(RpcError::NoPendingCalls),
        }
    }

    /// Drop everything queued for `identity` without sending it.
    pub fn discard(&mut self, identity: &Identity) -> usize {
        self.queues
            .remove(&identity.queue_key())
            .map_or(0, |q| q.calls.len())
    }
}
