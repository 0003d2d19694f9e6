//! In-memory stand-ins for the platform shared by the integration tests.

#![allow(dead_code)]

use libonep::datastore::Clock;
use libonep::network::application::onep::{
    Transport, TransportError, TransportRequest, TransportResponse,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// One request as the mock saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub body: Value,
    pub headers: Vec<(String, String)>,
    pub no_timeout: bool,
}

impl Recorded {
    pub fn ids(&self) -> Vec<u64> {
        self.body["calls"]
            .as_array()
            .map(|calls| calls.iter().filter_map(|c| c["id"].as_u64()).collect())
            .unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Responder = dyn Fn(&Value) -> Result<String, TransportError> + Send + Sync;

/// Transport answering from a closure over the parsed request body.
pub struct MockTransport {
    responder: Box<Responder>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockTransport {
    /// Answer whole requests: the closure returns the raw response body.
    pub fn raw(
        responder: impl Fn(&Value) -> Result<String, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer call by call, in request order. The closure gets the
    /// procedure and arguments and returns the item without its `id`.
    pub fn per_call(handler: impl Fn(&str, &[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self::raw(move |body| {
            let items = body["calls"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|call| {
                    let arguments = call["arguments"].as_array().cloned().unwrap_or_default();
                    let procedure = call["procedure"].as_str().unwrap_or_default();
                    let mut item = handler(procedure, &arguments);
                    item["id"] = call["id"].clone();
                    item
                })
                .collect::<Vec<_>>();
            Ok(Value::Array(items).to_string())
        })
    }

    /// Every call succeeds without a result.
    pub fn always_ok() -> Self {
        Self::per_call(|_, _| json!({"status": "ok"}))
    }

    /// Every request fails to go out.
    pub fn offline() -> Self {
        Self::raw(|_| Err(TransportError::Transmission("connection refused".into())))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn transmit(
        &self,
        request: &TransportRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        let body: Value = serde_json::from_slice(request.body).expect("client sent invalid JSON");
        self.requests.lock().unwrap().push(Recorded {
            body: body.clone(),
            headers: request
                .headers
                .iter()
                .map(|h| (h.name.to_string(), h.value.to_string()))
                .collect(),
            no_timeout: request.no_timeout,
        });
        (self.responder)(&body).map(|body| TransportResponse {
            status_code: 200,
            body,
        })
    }
}

/// A small model of the platform: aliases, dataports and what was written
/// to them, with switches to make individual procedures fail.
#[derive(Default)]
pub struct FakePlatform {
    aliases: Mutex<HashMap<String, String>>,
    series: Mutex<HashMap<String, Vec<(i64, Value)>>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    next_rid: AtomicUsize,
    /// Every request fails to go out.
    pub offline: AtomicBool,
    /// `writegroup` answers with a platform `error` item.
    pub writegroup_error: AtomicBool,
    /// `record` answers with this status instead of `ok`.
    pub record_status: Mutex<Option<Value>>,
    /// `map` answers with this status instead of `ok`.
    pub map_status: Mutex<Option<Value>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataport mapped to `alias` and return its resource id.
    pub fn with_alias(&self, alias: &str) -> String {
        let rid = format!("rid-{alias}");
        self.aliases.lock().unwrap().insert(alias.into(), rid.clone());
        rid
    }

    /// Seed points, oldest first.
    pub fn seed(&self, alias: &str, points: &[(i64, Value)]) {
        let rid = self.with_alias(alias);
        self.series.lock().unwrap().insert(rid, points.to_vec());
    }

    pub fn rid_of(&self, alias: &str) -> Option<String> {
        self.aliases.lock().unwrap().get(alias).cloned()
    }

    /// Arguments of every call to `procedure`, oldest first.
    pub fn calls_of(&self, procedure: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == procedure)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn count(&self, procedure: &str) -> usize {
        self.calls_of(procedure).len()
    }

    pub fn procedures(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    /// Every `[rid, value]` pair written through `writegroup`.
    pub fn written(&self) -> Vec<(String, Value)> {
        self.calls_of("writegroup")
            .into_iter()
            .filter_map(|args| args.into_iter().next())
            .flat_map(|pairs| pairs.as_array().cloned().unwrap_or_default())
            .map(|pair| (pair[0].as_str().unwrap_or_default().to_owned(), pair[1].clone()))
            .collect()
    }

    fn handle(&self, procedure: &str, args: &[Value]) -> Value {
        self.calls
            .lock()
            .unwrap()
            .push((procedure.to_owned(), args.to_vec()));

        match procedure {
            "lookup" => {
                let alias = args[1].as_str().unwrap_or_default();
                match self.aliases.lock().unwrap().get(alias) {
                    Some(rid) => json!({"status": "ok", "result": rid}),
                    None => json!({"status": "invalid"}),
                }
            }
            "create" => {
                let n = self.next_rid.fetch_add(1, Ordering::SeqCst);
                json!({"status": "ok", "result": format!("rid-created-{n}")})
            }
            "map" => {
                if let Some(status) = self.map_status.lock().unwrap().clone() {
                    return json!({ "status": status });
                }
                let rid = args[1].as_str().unwrap_or_default().to_owned();
                let alias = args[2].as_str().unwrap_or_default().to_owned();
                self.aliases.lock().unwrap().insert(alias, rid);
                json!({"status": "ok"})
            }
            "writegroup" if self.writegroup_error.load(Ordering::SeqCst) => {
                json!({"error": {"code": 500, "message": "internal error"}})
            }
            "record" => match self.record_status.lock().unwrap().clone() {
                Some(status) => json!({ "status": status }),
                None => json!({"status": "ok"}),
            },
            "read" => {
                let rid = args[0].as_str().unwrap_or_default();
                let limit = args[1]["limit"].as_u64().unwrap_or(1) as usize;
                let series = self.series.lock().unwrap();
                let points = series
                    .get(rid)
                    .map(|points| {
                        points
                            .iter()
                            .rev()
                            .take(limit)
                            .map(|(t, v)| json!([t, v]))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                json!({"status": "ok", "result": points})
            }
            _ => json!({"status": "ok"}),
        }
    }
}

impl Transport for FakePlatform {
    fn transmit(
        &self,
        request: &TransportRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Transmission("connection refused".into()));
        }
        let body: Value = serde_json::from_slice(request.body).expect("client sent invalid JSON");
        let mut items = Vec::new();
        for call in body["calls"].as_array().into_iter().flatten() {
            let arguments = call["arguments"].as_array().cloned().unwrap_or_default();
            let mut item = self.handle(call["procedure"].as_str().unwrap_or_default(), &arguments);
            item["id"] = call["id"].clone();
            items.push(item);
        }
        Ok(TransportResponse {
            status_code: 200,
            body: Value::Array(items).to_string(),
        })
    }
}

/// A clock the test moves by hand.
#[derive(Debug)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Route library logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
