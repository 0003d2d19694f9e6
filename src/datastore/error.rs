use crate::network::application::onep::RpcError;
use thiserror::Error;

/// Failures surfaced by [`Datastore`](super::Datastore) calls.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A read could not be served from the platform.
    #[error("data for {alias} unavailable: {reason}")]
    Unavailable { alias: String, reason: String },

    #[error("alias {0} does not exist")]
    UnknownAlias(String),

    #[error("alias {0} already exists")]
    AliasExists(String),

    #[error("failed to create dataport {alias}: {reason}")]
    CreateFailed { alias: String, reason: String },

    /// The flush worker thread could not be started.
    #[error("failed to spawn flush worker: {0}")]
    Spawn(#[from] std::io::Error),
}
