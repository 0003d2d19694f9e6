//! Error types for JSON-RPC calls

use serde_json::Value;
use thiserror::Error;

/// Everything that can go wrong between composing a batch and handing back
/// per-call results.
///
/// Per-call failures (a call answered with a non-`ok` status) are *not*
/// errors: they come back as `success == false` results. The variants here
/// describe failures of the whole request.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request could not be sent.
    #[error("failed to make http request: {0}")]
    RequestTransmission(String),

    /// The request went out but the response could not be received.
    #[error("failed to get response for request: {0}")]
    ResponseRead(String),

    /// The response body is not valid JSON.
    #[error("exception while parsing JSON response: {reason}\n{body}")]
    InvalidResponse {
        /// Raw response body as received.
        body: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The platform rejected the request as a whole, either with a top-level
    /// `error` object or with an `error` in place of a call's `status`.
    #[error("platform error: {0}")]
    Platform(Value),

    /// The response is valid JSON but has none of the recognized shapes.
    #[error("unknown protocol error: {0}")]
    UnknownProtocol(String),

    /// A deferred batch was sent for an identity with nothing queued.
    #[error("no deferred requests to send")]
    NoPendingCalls,

    /// The request envelope could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RpcError {
    /// `true` for failures that happened on the wire rather than in the
    /// platform's answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::RequestTransmission(_) | RpcError::ResponseRead(_)
        )
    }
}
