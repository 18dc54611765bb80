// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kodachi_runtime::{
    Attr, CommitId, HostError, HostFactory, HostRuntime, HostTransaction, KodachiRuntime,
    LocationData, LocationEvent, MemoryHost, NativeClientId, NativeOpId,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

// =============================================================================
// Log capture
// =============================================================================

/// Counts events at `WARN` level.
#[derive(Clone, Default)]
pub struct WarnCounter {
    count: Arc<AtomicUsize>,
}

impl WarnCounter {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Runs `f` with a thread-local subscriber and returns its result together
/// with the number of warnings emitted on this thread.
pub fn count_warnings<R>(f: impl FnOnce() -> R) -> (R, usize) {
    let counter = WarnCounter::default();
    let subscriber = Registry::default().with(counter.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, counter.count())
}

// =============================================================================
// Host factories
// =============================================================================

/// Factory that keeps every host it creates so tests can inspect them.
/// The first host is the canonical one; the rest are replicas.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    hosts: Arc<Mutex<Vec<Arc<MemoryHost>>>>,
}

impl RecordingFactory {
    pub fn hosts(&self) -> Vec<Arc<MemoryHost>> {
        self.hosts.lock().unwrap().clone()
    }

    pub fn canonical(&self) -> Arc<MemoryHost> {
        Arc::clone(&self.hosts.lock().unwrap()[0])
    }

    pub fn replicas(&self) -> Vec<Arc<MemoryHost>> {
        self.hosts.lock().unwrap()[1..].to_vec()
    }
}

impl HostFactory for RecordingFactory {
    fn create_host(&self) -> Result<Arc<dyn HostRuntime>, HostError> {
        let host = Arc::new(MemoryHost::new());
        self.hosts.lock().unwrap().push(Arc::clone(&host));
        Ok(host)
    }
}

/// Host whose cooks take at least `delay`.
pub struct SlowHost {
    inner: MemoryHost,
    delay: Duration,
}

impl HostRuntime for SlowHost {
    fn create_transaction(&self) -> HostTransaction {
        self.inner.create_transaction()
    }
    fn commit(&self, txn: HostTransaction) -> CommitId {
        self.inner.commit(txn)
    }
    fn op_args(&self, op: NativeOpId) -> Option<(String, Attr)> {
        self.inner.op_args(op)
    }
    fn op_inputs(&self, op: NativeOpId) -> Vec<NativeOpId> {
        self.inner.op_inputs(op)
    }
    fn client_op(&self, client: NativeClientId) -> Option<NativeOpId> {
        self.inner.client_op(client)
    }
    fn cook_location(&self, client: NativeClientId, path: &str) -> Result<LocationData, HostError> {
        std::thread::sleep(self.delay);
        self.inner.cook_location(client, path)
    }
    fn set_locations_active(&self, client: NativeClientId, paths: &[String]) -> Result<(), HostError> {
        self.inner.set_locations_active(client, paths)
    }
    fn location_events(&self, client: NativeClientId, max: usize) -> Result<Vec<LocationEvent>, HostError> {
        self.inner.location_events(client, max)
    }
    fn evict(&self, path: &str) {
        self.inner.evict(path);
    }
    fn flush_caches(&self) {
        self.inner.flush_caches();
    }
    fn options(&self) -> Attr {
        self.inner.options()
    }
    fn set_options(&self, options: Attr) {
        self.inner.set_options(options);
    }
    fn describe_op(&self, op_type: &str) -> Attr {
        self.inner.describe_op(op_type)
    }
    fn registered_op_types(&self) -> Vec<String> {
        self.inner.registered_op_types()
    }
    fn is_processing(&self) -> bool {
        false
    }
    fn root_location_path(&self) -> String {
        self.inner.root_location_path()
    }
}

/// Factory producing [`SlowHost`]s.
pub struct SlowFactory(pub Duration);

impl HostFactory for SlowFactory {
    fn create_host(&self) -> Result<Arc<dyn HostRuntime>, HostError> {
        Ok(Arc::new(SlowHost {
            inner: MemoryHost::new(),
            delay: self.0,
        }))
    }
}

// =============================================================================
// Graph helpers
// =============================================================================

/// Parses a JSON document into an attribute.
pub fn attr(json: &str) -> Attr {
    serde_json::from_str(json).unwrap()
}

/// Commits `LocationCreate(paths)` bound to a fresh client; returns the
/// client and the op.
pub fn client_with_locations(
    runtime: &Arc<KodachiRuntime>,
    paths: &[&str],
) -> (Arc<kodachi_runtime::Client>, Arc<kodachi_runtime::Op>) {
    let mut txn = runtime.create_transaction();
    let op = txn.create_op();
    let paths: Vec<String> = paths.iter().map(|p| (*p).to_owned()).collect();
    let mut args = kodachi_runtime::GroupAttr::new();
    args.set("locations", paths);
    txn.set_op_args(&op, kodachi_runtime::LOCATION_CREATE, Attr::Group(args));
    let client = txn.create_client();
    txn.set_client_op(&client, &op);
    runtime.commit(&mut txn).unwrap();
    (client, op)
}
