//! The JSON-RPC client: immediate calls, deferred batches and the typed API.

use super::auth::{Identity, Scope};
use super::call::CallComposer;
use super::deferred::DeferredRequests;
use super::dispatch::{CallResult, Reply, RequestEnvelope, demultiplex, single};
use super::error::RpcError;
use super::method::{
    DataPoint, DataportDescription, LookupKind, PendingCall, ReadOptions, ResourceRef, Visibility,
};
use super::transport::{Transport, TransportConfig, TransportRequest};
use crate::network::application::http::{Header, Headers, Method};
use serde_json::Value;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// A One Platform RPC client over any [`Transport`].
///
/// The client is `Sync`; one instance can be shared between threads, and the
/// datastore's flush worker shares it with the foreground.
#[derive(Debug)]
pub struct OnepClient<T> {
    transport: T,
    config: TransportConfig,
    composer: CallComposer,
    deferred: Mutex<DeferredRequests>,
    scope: RwLock<Scope>,
    logged: Mutex<Vec<Value>>,
}

impl<T: Transport> OnepClient<T> {
    pub fn new(transport: T, config: TransportConfig) -> Self {
        Self {
            transport,
            composer: CallComposer::new(config.start_id),
            config,
            deferred: Mutex::new(DeferredRequests::new()),
            scope: RwLock::new(Scope::Own),
            logged: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Make every bare-CIK call act as the client `client_id`.
    ///
    /// Clears any owner scope set by [`connect_owner`](Self::connect_owner).
    pub fn connect_as(&self, client_id: Option<&str>) {
        self.set_scope(client_id.map_or(Scope::Own, |id| Scope::Client(id.into())));
    }

    /// Make every bare-CIK call act on behalf of the owner of `resource_id`.
    ///
    /// Clears any client scope set by [`connect_as`](Self::connect_as).
    pub fn connect_owner(&self, resource_id: Option<&str>) {
        self.set_scope(resource_id.map_or(Scope::Own, |id| Scope::Owner(id.into())));
    }

    pub fn scope(&self) -> Scope {
        self.scope.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_scope(&self, scope: Scope) {
        *self.scope.write().unwrap_or_else(PoisonError::into_inner) = scope;
    }

    /// Request bodies sent so far, oldest first. Empty unless
    /// `log_requests` is set.
    pub fn logged_requests(&self) -> Vec<Value> {
        self.logged.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Send one call at once.
    pub fn call(&self, identity: &Identity, call: PendingCall) -> Result<Reply, RpcError> {
        let no_timeout = call.procedure.is_long_poll();
        single(self.dispatch(identity, vec![call], no_timeout)?)
    }

    /// Send several calls as one request and get a result per call.
    pub fn batch(
        &self,
        identity: &Identity,
        calls: Vec<PendingCall>,
    ) -> Result<Vec<CallResult>, RpcError> {
        let no_timeout = calls.iter().any(|call| call.procedure.is_long_poll());
        self.dispatch(identity, calls, no_timeout)
    }

    /// Queue a call for the next [`send_deferred`](Self::send_deferred).
    pub fn defer(&self, identity: &Identity, call: PendingCall) {
        let no_timeout = call.procedure.is_long_poll();
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(identity, call, no_timeout);
    }

    pub fn has_deferred(&self, identity: &Identity) -> bool {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .has_pending(identity)
    }

    /// Send everything queued for `identity` as one request.
    ///
    /// The queue is emptied before sending, so a failed request does not
    /// leave its calls behind.
    pub fn send_deferred(&self, identity: &Identity) -> Result<Vec<CallResult>, RpcError> {
        let drained = self
            .deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(identity)?;
        self.dispatch(identity, drained.calls, drained.no_timeout)
    }

    fn dispatch(
        &self,
        identity: &Identity,
        calls: Vec<PendingCall>,
        no_timeout: bool,
    ) -> Result<Vec<CallResult>, RpcError> {
        let envelopes = self.composer.compose(calls);
        let auth = identity.scoped(&self.scope());
        let request = serde_json::to_value(RequestEnvelope {
            auth: &auth,
            calls: &envelopes,
        })?;
        let body = serde_json::to_vec(&request)?;

        if self.config.log_requests {
            self.logged
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request);
        }

        let headers = self.headers()?;
        debug!(
            calls = envelopes.len(),
            first_id = envelopes.first().map(|c| c.id),
            no_timeout,
            "sending rpc request"
        );
        let response = self.transport.transmit(&TransportRequest {
            method: Method::Post,
            path: &self.config.path,
            body: &body,
            headers: &headers,
            no_timeout,
        })?;
        if response.status_code != 200 {
            debug!(status = response.status_code, "rpc endpoint answered with non-200 status");
        }

        demultiplex(&response.body, &envelopes).inspect_err(|e| {
            warn!(error = %e, "rpc request failed");
        })
    }

    fn headers(&self) -> Result<Headers, RpcError> {
        let mut headers = Headers::new();
        let mut push = |name: &str, value: &str| {
            let header = Header::new(name, value)
                .map_err(|e| RpcError::RequestTransmission(format!("header {name}: {e}")))?;
            headers
                .push(header)
                .map_err(|_| RpcError::RequestTransmission("too many request headers".into()))
        };
        push("Content-Type", CONTENT_TYPE)?;
        if let Some(agent) = &self.config.user_agent {
            push("User-Agent", agent)?;
        }
        Ok(headers)
    }

    pub fn activate(
        &self,
        identity: &Identity,
        codetype: &str,
        code: &str,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::activate(codetype, code))
    }

    pub fn comment(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        visibility: Visibility,
        text: &str,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::comment(resource, visibility, text))
    }

    pub fn create(
        &self,
        identity: &Identity,
        kind: &str,
        description: Value,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::create(kind, description))
    }

    /// Create a dataport. On success the payload is the new resource id.
    pub fn create_dataport(
        &self,
        identity: &Identity,
        description: &DataportDescription,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::create_dataport(description))
    }

    pub fn deactivate(
        &self,
        identity: &Identity,
        codetype: &str,
        code: &str,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::deactivate(codetype, code))
    }

    pub fn drop_resource(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::drop_resource(resource))
    }

    pub fn flush(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        options: Option<Value>,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::flush(resource, options))
    }

    pub fn grant(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        permissions: Value,
        ttl: Option<u64>,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::grant(resource, permissions, ttl))
    }

    pub fn info(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        options: Value,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::info(resource, options))
    }

    pub fn listing(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        types: &[&str],
        options: Value,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::listing(resource, types, options))
    }

    pub fn lookup(
        &self,
        identity: &Identity,
        kind: LookupKind,
        mapping: &str,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::lookup(kind, mapping))
    }

    pub fn map(&self, identity: &Identity, rid: &str, alias: &str) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::map(rid, alias))
    }

    pub fn move_resource(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        destination: &ResourceRef,
        keep_aliases: bool,
    ) -> Result<Reply, RpcError> {
        self.call(
            identity,
            PendingCall::move_resource(resource, destination, keep_aliases),
        )
    }

    pub fn read(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        options: &ReadOptions,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::read(resource, options))
    }

    pub fn record(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        entries: &[DataPoint],
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::record(resource, entries))
    }

    pub fn recordbatch(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        entries: &[DataPoint],
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::recordbatch(resource, entries))
    }

    pub fn revoke(
        &self,
        identity: &Identity,
        codetype: &str,
        code: &str,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::revoke(codetype, code))
    }

    pub fn share(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        options: Value,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::share(resource, options))
    }

    pub fn tag(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        action: &str,
        tag: &str,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::tag(resource, action, tag))
    }

    pub fn unmap(&self, identity: &Identity, alias: &str) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::unmap(alias))
    }

    pub fn update(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        description: Value,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::update(resource, description))
    }

    pub fn usage(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        metric: &str,
        starttime: i64,
        endtime: i64,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::usage(resource, metric, starttime, endtime))
    }

    /// Long-poll; sent without a client-side timeout.
    pub fn wait(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        options: Value,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::wait(resource, options))
    }

    pub fn write(
        &self,
        identity: &Identity,
        resource: &ResourceRef,
        value: Value,
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::write(resource, value))
    }

    pub fn writegroup(
        &self,
        identity: &Identity,
        entries: &[(ResourceRef, Value)],
    ) -> Result<Reply, RpcError> {
        self.call(identity, PendingCall::writegroup(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::application::onep::transport::{TransportError, TransportResponse};
    use serde_json::json;

    /// Answers every call in a request with `{"status": "ok"}` and keeps the
    /// bodies it saw.
    #[derive(Default)]
    struct Echo {
        seen: Mutex<Vec<(Value, bool)>>,
    }

    impl Transport for Echo {
        fn transmit(
            &self,
            request: &TransportRequest<'_>,
        ) -> Result<TransportResponse, TransportError> {
            let body: Value = serde_json::from_slice(request.body).unwrap();
            let items = body["calls"]
                .as_array()
                .unwrap()
                .iter()
                .map(|c| json!({"id": c["id"], "status": "ok"}))
                .collect::<Vec<_>>();
            self.seen.lock().unwrap().push((body, request.no_timeout));
            Ok(TransportResponse {
                status_code: 200,
                body: Value::Array(items).to_string(),
            })
        }
    }

    fn client() -> OnepClient<Echo> {
        OnepClient::new(Echo::default(), TransportConfig::default())
    }

    #[test]
    fn scoping_modes_exclude_each_other() {
        let client = client();
        let id = Identity::cik("k");
        client.connect_as(Some("c"));
        client.connect_owner(Some("r"));
        client.unmap(&id, "x").unwrap();
        client.connect_owner(None);
        client.unmap(&id, "x").unwrap();

        let seen = client.transport().seen.lock().unwrap();
        assert_eq!(seen[0].0["auth"], json!({"cik": "k", "resource_id": "r"}));
        assert_eq!(seen[1].0["auth"], json!({"cik": "k"}));
    }

    #[test]
    fn wait_goes_out_without_timeout() {
        let client = client();
        let id = Identity::cik("k");
        client.wait(&id, &ResourceRef::alias("x"), json!({"timeout": 1000})).unwrap();
        client.read(&id, &ResourceRef::alias("x"), &ReadOptions::latest(1)).unwrap();

        let seen = client.transport().seen.lock().unwrap();
        assert!(seen[0].1);
        assert!(!seen[1].1);
    }

    #[test]
    fn requests_are_logged_only_when_asked() {
        let quiet = client();
        quiet.unmap(&Identity::cik("k"), "x").unwrap();
        assert!(quiet.logged_requests().is_empty());

        let config = TransportConfig {
            log_requests: true,
            ..TransportConfig::default()
        };
        let chatty = OnepClient::new(Echo::default(), config);
        chatty.unmap(&Identity::cik("k"), "x").unwrap();
        let logged = chatty.logged_requests();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0]["calls"][0]["procedure"], "unmap");
    }

    #[test]
    fn bad_user_agent_fails_before_sending() {
        let config = TransportConfig {
            user_agent: Some("x".repeat(1024)),
            ..TransportConfig::default()
        };
        let client = OnepClient::new(Echo::default(), config);
        let err = client.unmap(&Identity::cik("k"), "x").unwrap_err();
        assert!(matches!(err, RpcError::RequestTransmission(_)));
        assert!(client.transport().seen.lock().unwrap().is_empty());
    }
}
