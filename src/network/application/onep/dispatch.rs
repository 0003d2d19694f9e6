//! Request envelopes and response demultiplexing.
//!
//! A request carries an `auth` block and a `calls` array. The platform answers
//! with either a single object holding a top-level `error` (the whole request
//! was rejected) or an array with one item per call, in any order:
//!
//! ```text
//! [{"id": 2, "status": "ok"},
//!  {"id": 1, "status": "ok", "result": [[1700000000, 1]]},
//!  {"id": 3, "status": "invalid"}]
//! ```
//!
//! [`demultiplex`] matches every item back to the envelope that produced it.

use super::auth::Identity;
use super::call::CallEnvelope;
use super::error::RpcError;
use serde::Serialize;
use serde_json::Value;

/// Payload reported for a successful call that returned no `result`.
pub const OK: &str = "ok";

/// The serialized body of one request.
#[derive(Debug, Serialize)]
pub struct RequestEnvelope<'a> {
    pub auth: &'a Identity,
    pub calls: &'a [CallEnvelope],
}

/// Outcome of one call in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    /// The call this result answers.
    pub call: CallEnvelope,
    pub success: bool,
    /// The call's `result`, the string `"ok"` when there was none, or the
    /// failure status when `success` is false.
    pub payload: Value,
}

/// Outcome of a lone call, without the envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub success: bool,
    pub payload: Value,
}

impl Reply {
    /// Successful and answered with a bare `ok`.
    pub fn is_ok_status(&self) -> bool {
        self.success && self.payload.as_str() == Some(OK)
    }
}

impl From<CallResult> for Reply {
    fn from(result: CallResult) -> Self {
        Self {
            success: result.success,
            payload: result.payload,
        }
    }
}

/// Parse a response body and pair each item with its originating call.
///
/// Results come back in response order. A platform-level `error`, either at
/// the top level or in any item, fails the whole batch and no per-call
/// results are returned. It takes precedence over malformed or unmatched
/// items elsewhere in the array.
pub fn demultiplex(body: &str, calls: &[CallEnvelope]) -> Result<Vec<CallResult>, RpcError> {
    let response: Value =
        serde_json::from_str(body).map_err(|e| RpcError::InvalidResponse {
            body: body.to_owned(),
            reason: e.to_string(),
        })?;

    match response {
        Value::Object(mut object) => match object.remove("error") {
            Some(error) => Err(RpcError::Platform(error)),
            None => Err(RpcError::UnknownProtocol(format!(
                "response object without an error field: {}",
                Value::Object(object)
            ))),
        },
        Value::Array(mut items) => {
            if let Some(error) = items.iter_mut().find_map(|item| item.get_mut("error")) {
                return Err(RpcError::Platform(error.take()));
            }
            items.into_iter().map(|item| classify(item, calls)).collect()
        }
        other => Err(RpcError::UnknownProtocol(format!(
            "unexpected response: {other}"
        ))),
    }
}

/// Collapse a batch into the single reply of its only call.
pub fn single(results: Vec<CallResult>) -> Result<Reply, RpcError> {
    results
        .into_iter()
        .next()
        .map(Reply::from)
        .ok_or_else(|| RpcError::UnknownProtocol("empty response array".into()))
}

fn classify(item: Value, calls: &[CallEnvelope]) -> Result<CallResult, RpcError> {
    let mut item = match item {
        Value::Object(item) => item,
        other => {
            return Err(RpcError::UnknownProtocol(format!(
                "response item is not an object: {other}"
            )));
        }
    };

    let id = item
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::UnknownProtocol("response item without a numeric id".into()))?;

    // Duplicate ids should not happen; the first matching call wins.
    let call = calls
        .iter()
        .find(|call| call.id == id)
        .cloned()
        .ok_or_else(|| RpcError::UnknownProtocol(format!("response for unknown call id {id}")))?;

    if let Some(status) = item.remove("status") {
        return Ok(if status.as_str() == Some(OK) {
            CallResult {
                call,
                success: true,
                payload: item.remove("result").unwrap_or_else(|| OK.into()),
            }
        } else {
            CallResult {
                call,
                success: false,
                payload: status,
            }
        });
    }

    Err(RpcError::UnknownProtocol(format!(
        "response item {id} has neither status nor error"
    )))
}
