#![allow(missing_docs)]

//! # Buffered Datastore
//!
//! A layer over [`OnepClient`] for programs that write often and read the
//! same values repeatedly.
//!
//! * Writes go into a buffer and are sent by a background worker once per
//!   flush interval, all aliases in one request. A value written twice
//!   before a flush is only sent once, with its latest value.
//! * When a live write fails its values are kept and recorded later as
//!   history, so a network outage delays data instead of losing it.
//! * Reads are served from a short-lived cache when the same number of
//!   points was fetched recently.
//! * Alias lookups are memoized, misses included. With [`AutoCreate`]
//!   configured, missing dataports are created on first write.
//!
//! ```rust,no_run
//! use libonep::datastore::{Datastore, DatastoreConfig, StopMode};
//! use libonep::network::application::onep::{HttpTransport, Identity, TransportConfig};
//! use libonep::network::client::TcpConnector;
//! use core::time::Duration;
//!
//! let transport_config = TransportConfig::default();
//! let transport = HttpTransport::new(TcpConnector::default(), &transport_config);
//! let store = Datastore::connect(
//!     transport,
//!     transport_config,
//!     Identity::cik("0123456789012345678901234567890123456789"),
//!     DatastoreConfig::default(),
//! );
//!
//! store.start().unwrap();
//! store.write("temperature", 21.5).unwrap();
//! let latest = store.read("temperature", 1).unwrap();
//! println!("{latest:?}");
//! store.stop(StopMode::Graceful);
//! store.wait_stopped(Duration::from_secs(10));
//! ```

pub mod alias;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;

pub use alias::AliasCache;
pub use buffer::{RecordEntry, WriteBuffers};
pub use cache::ReadCache;
pub use config::{AutoCreate, Clock, DatastoreConfig, MIN_FLUSH_INTERVAL, SystemClock};
pub use engine::{CycleReport, EngineState, RejectKind, StopMode};
pub use error::DataError;

use crate::network::application::onep::{
    DataPoint, DataportDescription, Identity, LookupKind, OnepClient, ReadOptions, ResourceRef,
    Sort, Transport, TransportConfig, Visibility,
};
use core::time::Duration;
use serde_json::Value;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Result of [`Datastore::write`] and [`Datastore::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Buffered in a free slot.
    Buffered,
    /// Replaced a live value for the same alias that had not been sent yet.
    Overwrote,
    Rejected(Rejection),
}

impl WriteOutcome {
    /// Whether the value will be sent.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, WriteOutcome::Rejected(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The write buffer is at capacity.
    BufferFull,
    /// The alias does not exist and auto-create is off.
    UnknownAlias,
}

/// Buffered item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pending {
    pub live: usize,
    pub records: usize,
}

/// State shared between the datastore handle and its flush worker.
#[derive(Debug)]
pub(crate) struct Shared<T> {
    client: Arc<OnepClient<T>>,
    identity: Identity,
    config: DatastoreConfig,
    clock: Arc<dyn Clock>,
    buffers: Mutex<WriteBuffers>,
    aliases: Mutex<AliasCache>,
    cache: Mutex<ReadCache>,
    control: Mutex<EngineState>,
    wakeup: Condvar,
    /// Held for the length of a flush cycle so cycles never overlap.
    cycle: Mutex<()>,
}

impl<T> Shared<T> {
    fn buffers(&self) -> MutexGuard<'_, WriteBuffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn aliases(&self) -> MutexGuard<'_, AliasCache> {
        self.aliases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache(&self) -> MutexGuard<'_, ReadCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn control(&self) -> MutexGuard<'_, EngineState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport> Shared<T> {
    /// Resource id for `alias`, or `None` if it does not exist. Answers from
    /// the alias cache unless `force` is set.
    fn resolve(&self, alias: &str, force: bool) -> Result<Option<String>, DataError> {
        if !force {
            if let Some(cached) = self.aliases().get(alias) {
                return Ok(cached.map(str::to_owned));
            }
        }

        let reply = self.client.lookup(&self.identity, LookupKind::Alias, alias)?;
        let rid = if reply.success {
            reply.payload.as_str().map(str::to_owned)
        } else {
            None
        };
        debug!(alias, ?rid, "looked up alias");
        self.aliases().insert(alias, rid.clone());
        Ok(rid)
    }

    /// Like [`resolve`](Self::resolve), but creates the dataport when it is
    /// missing and auto-create is configured.
    fn ensure_dataport(&self, alias: &str) -> Result<Option<String>, DataError> {
        if let Some(rid) = self.resolve(alias, false)? {
            return Ok(Some(rid));
        }
        match &self.config.auto_create {
            Some(auto) => self.create_and_map(alias, &auto.describe(alias)).map(Some),
            None => Ok(None),
        }
    }

    /// `create` followed by `map`. A created dataport that cannot be mapped
    /// is dropped again.
    fn create_and_map(
        &self,
        alias: &str,
        description: &DataportDescription,
    ) -> Result<String, DataError> {
        let created = self.client.create_dataport(&self.identity, description)?;
        let rid = match (created.success, created.payload.as_str()) {
            (true, Some(rid)) => rid.to_owned(),
            _ => {
                error!(alias, payload = %created.payload, "creating dataport failed");
                return Err(DataError::CreateFailed {
                    alias: alias.to_owned(),
                    reason: created.payload.to_string(),
                });
            }
        };

        let reason = match self.client.map(&self.identity, &rid, alias) {
            Ok(mapped) if mapped.success => {
                info!(alias, rid = %rid, "created dataport");
                self.aliases().insert(alias, Some(rid.clone()));
                return Ok(rid);
            }
            Ok(mapped) => mapped.payload.to_string(),
            Err(e) => e.to_string(),
        };

        error!(alias, rid = %rid, %reason, "mapping new dataport failed, dropping it");
        if let Err(e) = self.client.drop_resource(&self.identity, &ResourceRef::rid(rid.as_str())) {
            warn!(rid = %rid, error = %e, "could not drop unmapped dataport");
        }
        Err(DataError::CreateFailed {
            alias: alias.to_owned(),
            reason,
        })
    }
}

/// Buffered, cached access to the dataports of one client.
#[derive(Debug)]
pub struct Datastore<T: Transport + 'static> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + 'static> Datastore<T> {
    pub fn new(client: Arc<OnepClient<T>>, identity: Identity, config: DatastoreConfig) -> Self {
        Self::with_clock(client, identity, config, Arc::new(SystemClock))
    }

    /// Build a datastore that reads time from `clock` instead of the
    /// system clock.
    pub fn with_clock(
        client: Arc<OnepClient<T>>,
        identity: Identity,
        config: DatastoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ReadCache::new(
            config.read_cache_size,
            config.read_cache_expire.as_secs() as i64,
        );
        Self {
            shared: Arc::new(Shared {
                client,
                identity,
                config,
                clock,
                buffers: Mutex::new(WriteBuffers::new()),
                aliases: Mutex::new(AliasCache::new()),
                cache: Mutex::new(cache),
                control: Mutex::new(EngineState::Stopped),
                wakeup: Condvar::new(),
                cycle: Mutex::new(()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Build the client too.
    pub fn connect(
        transport: T,
        transport_config: TransportConfig,
        identity: Identity,
        config: DatastoreConfig,
    ) -> Self {
        Self::new(
            Arc::new(OnepClient::new(transport, transport_config)),
            identity,
            config,
        )
    }

    pub fn client(&self) -> &OnepClient<T> {
        &self.shared.client
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.shared.config
    }

    /// Buffer a live value for `alias`.
    ///
    /// Refused when the buffers are full, or when the alias does not exist
    /// and auto-create is off. Checking existence may cost one lookup the
    /// first time an alias is seen; after that the answer is cached.
    pub fn write(&self, alias: &str, value: impl Into<Value>) -> Result<WriteOutcome, DataError> {
        let capacity = self.shared.config.write_buffer_size;
        if self.shared.buffers().is_full(capacity) {
            debug!(alias, capacity, "write buffer full");
            return Ok(WriteOutcome::Rejected(Rejection::BufferFull));
        }
        if !self.alias_writable(alias)? {
            return Ok(WriteOutcome::Rejected(Rejection::UnknownAlias));
        }

        let mut buffers = self.shared.buffers();
        if buffers.is_full(capacity) {
            return Ok(WriteOutcome::Rejected(Rejection::BufferFull));
        }
        let fresh = buffers.put_live(alias, value.into());
        debug!(alias, fresh, buffered = buffers.len(), "buffered live value");
        Ok(if fresh {
            WriteOutcome::Buffered
        } else {
            WriteOutcome::Overwrote
        })
    }

    /// Buffer historical points with absolute timestamps for `alias`.
    ///
    /// Same admission rules as [`write`](Self::write). The capacity check is
    /// made once for the whole batch.
    pub fn record(
        &self,
        alias: &str,
        points: impl IntoIterator<Item = DataPoint>,
    ) -> Result<WriteOutcome, DataError> {
        let capacity = self.shared.config.write_buffer_size;
        if self.shared.buffers().is_full(capacity) {
            debug!(alias, capacity, "write buffer full");
            return Ok(WriteOutcome::Rejected(Rejection::BufferFull));
        }
        if !self.alias_writable(alias)? {
            return Ok(WriteOutcome::Rejected(Rejection::UnknownAlias));
        }

        let mut buffers = self.shared.buffers();
        if buffers.is_full(capacity) {
            return Ok(WriteOutcome::Rejected(Rejection::BufferFull));
        }
        buffers.extend_records(
            alias,
            points
                .into_iter()
                .map(|point| RecordEntry::absolute(point.timestamp, point.value)),
        );
        debug!(alias, records = buffers.record_count(), "buffered historical values");
        Ok(WriteOutcome::Buffered)
    }

    fn alias_writable(&self, alias: &str) -> Result<bool, DataError> {
        if self.shared.config.auto_create.is_some() {
            return Ok(true);
        }
        Ok(self.shared.resolve(alias, false)?.is_some())
    }

    /// The newest `count` points of `alias`, from cache when possible.
    pub fn read(&self, alias: &str, count: usize) -> Result<Vec<DataPoint>, DataError> {
        self.read_with(alias, count, false)
    }

    /// [`read`](Self::read), optionally looking the alias up again instead
    /// of trusting the alias cache.
    pub fn read_with(
        &self,
        alias: &str,
        count: usize,
        force_query: bool,
    ) -> Result<Vec<DataPoint>, DataError> {
        let now = self.shared.clock.now();
        if let Some(cached) = self.shared.cache().get(alias, count, now) {
            debug!(alias, count, "read served from cache");
            return Ok(cached.to_vec());
        }

        let data = self.fetch(alias, ReadOptions::latest(count), force_query)?;
        self.shared
            .cache()
            .insert(alias, data.clone(), self.shared.clock.now());
        Ok(data)
    }

    /// Up to `count` points of `alias` between `starttime` and `endtime`.
    /// Always asks the platform; the cache is neither used nor updated.
    pub fn read_range(
        &self,
        alias: &str,
        count: usize,
        starttime: i64,
        endtime: i64,
    ) -> Result<Vec<DataPoint>, DataError> {
        let options = ReadOptions {
            starttime: Some(starttime),
            endtime: Some(endtime),
            ..ReadOptions::latest(count)
        };
        self.fetch(alias, options, false)
    }

    fn fetch(
        &self,
        alias: &str,
        options: ReadOptions,
        force_query: bool,
    ) -> Result<Vec<DataPoint>, DataError> {
        let unavailable = |reason: String| DataError::Unavailable {
            alias: alias.to_owned(),
            reason,
        };
        let rid = match self.shared.resolve(alias, force_query) {
            Ok(Some(rid)) => rid,
            Ok(None) => return Err(DataError::UnknownAlias(alias.to_owned())),
            Err(e) => return Err(unavailable(e.to_string())),
        };

        let options = ReadOptions {
            sort: Sort::Desc,
            ..options
        };
        let reply = self
            .shared
            .client
            .read(&self.shared.identity, &ResourceRef::Rid(rid), &options)
            .map_err(|e| unavailable(e.to_string()))?;
        if !reply.success {
            error!(alias, status = %reply.payload, "read refused");
            return Err(unavailable(format!("platform answered {}", reply.payload)));
        }
        DataPoint::list_from_value(&reply.payload)
            .ok_or_else(|| unavailable(format!("unexpected read result {}", reply.payload)))
    }

    /// Create a dataport and map `alias` to it. Returns the new resource id.
    ///
    /// An empty `description.name` is replaced with the alias.
    pub fn create_dataport(
        &self,
        alias: &str,
        description: &DataportDescription,
    ) -> Result<String, DataError> {
        if self.shared.resolve(alias, false)?.is_some() {
            return Err(DataError::AliasExists(alias.to_owned()));
        }
        let mut description = description.clone();
        if description.name.is_empty() {
            description.name = alias.to_owned();
        }
        self.shared.create_and_map(alias, &description)
    }

    pub fn comment(
        &self,
        alias: &str,
        visibility: Visibility,
        text: &str,
    ) -> Result<bool, DataError> {
        let rid = self
            .shared
            .resolve(alias, false)?
            .ok_or_else(|| DataError::UnknownAlias(alias.to_owned()))?;
        let reply = self.shared.client.comment(
            &self.shared.identity,
            &ResourceRef::Rid(rid),
            visibility,
            text,
        )?;
        Ok(reply.success)
    }

    /// Start the flush worker.
    ///
    /// Starting a worker that is draining towards a graceful stop puts it
    /// back to work instead of spawning a second one.
    pub fn start(&self) -> Result<(), DataError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let alive = worker.as_ref().is_some_and(|handle| !handle.is_finished());
        {
            let mut state = self.shared.control();
            if alive && *state != EngineState::Stopped {
                *state = EngineState::Running;
                self.shared.wakeup.notify_all();
                return Ok(());
            }
        }

        // A worker told to stop exits after its current cycle.
        if let Some(previous) = worker.take() {
            if previous.join().is_err() {
                error!("previous flush worker panicked");
            }
        }

        *self.shared.control() = EngineState::Running;
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("onep-flush".into())
            .spawn(move || shared.run());
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                *self.shared.control() = EngineState::Stopped;
                Err(e.into())
            }
        }
    }

    pub fn stop(&self, mode: StopMode) {
        let mut state = self.shared.control();
        match mode {
            StopMode::Graceful => {
                if *state == EngineState::Running {
                    *state = EngineState::DrainingBeforeStop;
                }
            }
            StopMode::Forced => {
                *state = EngineState::Stopped;
                let discarded = self.shared.buffers().clear_live();
                if discarded > 0 {
                    warn!(discarded, "forced stop discarded unwritten live values");
                }
            }
        }
        info!(?mode, state = ?*state, "datastore stopping");
        self.shared.wakeup.notify_all();
    }

    /// Force a stop, wait for the worker to exit and start a new one.
    pub fn restart(&self) -> Result<(), DataError> {
        self.stop(StopMode::Forced);
        self.start()
    }

    /// Block until the worker has stopped or `timeout` passed. Returns
    /// whether it stopped.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        {
            let state = self.shared.control();
            let (state, _) = self
                .shared
                .wakeup
                .wait_timeout_while(state, timeout, |state| *state != EngineState::Stopped)
                .unwrap_or_else(PoisonError::into_inner);
            if *state != EngineState::Stopped {
                return false;
            }
        }
        if let Some(handle) = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take() {
            if handle.join().is_err() {
                error!("flush worker panicked");
            }
        }
        true
    }

    pub fn state(&self) -> EngineState {
        *self.shared.control()
    }

    /// Whether the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one flush cycle on the calling thread.
    pub fn flush_now(&self) -> CycleReport {
        self.shared.run_cycle()
    }

    pub fn pending(&self) -> Pending {
        let buffers = self.shared.buffers();
        Pending {
            live: buffers.live_len(),
            records: buffers.record_count(),
        }
    }

    pub fn live_value(&self, alias: &str) -> Option<Value> {
        self.shared.buffers().live_value(alias).cloned()
    }

    pub fn buffered_records(&self, alias: &str) -> Vec<RecordEntry> {
        self.shared.buffers().records_for(alias).to_vec()
    }

    pub fn cached_aliases(&self) -> usize {
        self.shared.cache().len()
    }
}

impl<T: Transport + 'static> Drop for Datastore<T> {
    fn drop(&mut self) {
        *self.shared.control() = EngineState::Stopped;
        self.shared.wakeup.notify_all();
    }
}
