// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The runtime: canonical op graph, commit protocol and per-thread replicas.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::ThreadId;

use tracing::{debug, info, instrument, warn};

use crate::attr::Attr;
use crate::cache::{CacheRegistry, MemoryCache};
use crate::client::ReplicaClient;
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::host::{CommitId, HostFactory, HostRuntime, NativeClientId, NativeOpId};
use crate::op::Op;
use crate::op_id::OpId;
use crate::sync::{OpTreeSynchronizer, ReplicaId};
use crate::transaction::Transaction;

/// Cache scope for memoized op type descriptions.
pub const DESCRIBE_OP_CACHE: &str = "kodachi.describeOp";

/// State guarded by the canonical mutex.
struct Canonical {
    host: Arc<dyn HostRuntime>,
    ops: HashMap<OpId, Arc<Op>>,
    native_ops: HashMap<NativeOpId, Arc<Op>>,
    synchronizer: OpTreeSynchronizer,
}

/// A per-thread replica host instance.
#[derive(Clone)]
pub(crate) struct Replica {
    pub(crate) id: ReplicaId,
    pub(crate) host: Arc<dyn HostRuntime>,
}

/// Authority over one op graph.
///
/// Commits are applied to a single canonical host instance under one mutex
/// and stamped with a monotonically increasing [`CommitId`]. Cooking never
/// touches the canonical instance: every thread that cooks gets its own
/// replica host, which [`crate::Client`] brings up to date lazily the next
/// time that thread uses it after a commit.
///
/// The latest commit version is published with `Release` while the mutex is
/// held and read with `Acquire` without it. A reader may therefore miss a
/// commit that lands concurrently; it catches up on its next staleness check.
pub struct KodachiRuntime {
    weak_self: Weak<KodachiRuntime>,
    canonical: Mutex<Canonical>,
    latest_commit: AtomicU64,
    replicas: Mutex<HashMap<ThreadId, Replica>>,
    next_replica: AtomicU64,
    factory: Arc<dyn HostFactory>,
    caches: CacheRegistry,
    config: RuntimeConfig,
}

impl core::fmt::Debug for KodachiRuntime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KodachiRuntime")
            .field("latest_commit", &self.latest_commit_id())
            .field("replicas", &self.replica_count())
            .field("caches", &self.caches)
            .finish_non_exhaustive()
    }
}

impl KodachiRuntime {
    /// Creates a runtime with default configuration.
    pub fn create(factory: impl HostFactory + 'static) -> Result<Arc<Self>, RuntimeError> {
        Self::with_config(factory, RuntimeConfig::default())
    }

    /// Creates a runtime whose canonical host is made by `factory`.
    ///
    /// Fails only when the canonical host cannot be created.
    pub fn with_config(
        factory: impl HostFactory + 'static,
        config: RuntimeConfig,
    ) -> Result<Arc<Self>, RuntimeError> {
        let factory: Arc<dyn HostFactory> = Arc::new(factory);
        let host = factory.create_host()?;
        let host_root = host.root_location_path();
        if host_root != config.root_location_path {
            warn!(
                configured = %config.root_location_path,
                host = %host_root,
                "host factory ignores the configured root location"
            );
        }
        if !config.host_options.is_null() {
            host.set_options(config.host_options.clone());
        }
        Ok(Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            canonical: Mutex::new(Canonical {
                host,
                ops: HashMap::new(),
                native_ops: HashMap::new(),
                synchronizer: OpTreeSynchronizer::new(),
            }),
            latest_commit: AtomicU64::new(0),
            replicas: Mutex::new(HashMap::new()),
            next_replica: AtomicU64::new(0),
            factory,
            caches: CacheRegistry::new(),
            config,
        }))
    }

    fn canonical(&self) -> MutexGuard<'_, Canonical> {
        self.canonical.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replica_table(&self) -> MutexGuard<'_, HashMap<ThreadId, Replica>> {
        self.replicas.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens an empty transaction bound to this runtime.
    pub fn create_transaction(&self) -> Transaction {
        Transaction::new(self.weak_self.clone())
    }

    /// Applies a transaction to the canonical graph and returns the new
    /// commit version.
    ///
    /// Commit is best-effort: a duplicate op id, an op without a backing op
    /// or a dangling input is skipped with a warning while the rest of the
    /// transaction is applied. The transaction is left empty either way.
    ///
    /// # Errors
    /// [`RuntimeError::ForeignTransaction`] when `txn` was created by another
    /// runtime; nothing is applied in that case.
    #[instrument(skip_all, fields(ops = txn.pending_op_count()))]
    pub fn commit(&self, txn: &mut Transaction) -> Result<CommitId, RuntimeError> {
        if !Weak::ptr_eq(txn.runtime_ref(), &self.weak_self) {
            return Err(RuntimeError::ForeignTransaction);
        }
        let pending = txn.take_pending();

        let mut guard = self.canonical();
        let canonical = &mut *guard;
        let mut host_txn = canonical.host.create_transaction();

        for (id, op) in pending.ops {
            if canonical.ops.contains_key(&id) {
                warn!(op_id = %id, "op id already committed; keeping the existing op");
                continue;
            }
            if !op.belongs_to(&self.weak_self) {
                warn!(op_id = %id, "op belongs to another runtime; skipping");
                continue;
            }
            let native = host_txn.create_op();
            if !op.bind(native) {
                warn!(op_id = %id, "op already has a backing op; skipping");
                continue;
            }
            canonical.ops.insert(id, Arc::clone(&op));
            canonical.native_ops.insert(native, op);
        }

        for (id, staged) in pending.args {
            let Some(native) = self.backing_of(&staged.op) else {
                warn!(op_id = %id, "cannot set args: op has no backing op");
                continue;
            };
            host_txn.set_op_args(native, staged.op_type, staged.args);
        }

        for (id, staged) in pending.inputs {
            let Some(native) = self.backing_of(&staged.op) else {
                warn!(op_id = %id, "cannot set inputs: op has no backing op");
                continue;
            };
            let mut inputs = Vec::with_capacity(staged.inputs.len());
            for input in &staged.inputs {
                match self.backing_of(input) {
                    Some(native_input) => inputs.push(native_input),
                    None => warn!(
                        op_id = %id,
                        input = %input.id(),
                        "dropping input without a backing op"
                    ),
                }
            }
            host_txn.set_op_inputs(native, inputs);
        }

        // Clients are released after the mutex: dropping the last handle
        // tears down its master client under that same mutex.
        let mut bound = Vec::with_capacity(pending.clients.len());
        for (client, op) in pending.clients {
            bound.push(Arc::clone(&client));
            if !client.belongs_to(&self.weak_self) {
                warn!("client belongs to another runtime; skipping");
                continue;
            }
            let master = client.master_or_init(|| host_txn.create_client());
            let Some(native) = self.backing_of(&op) else {
                warn!(op_id = %op.id(), "cannot bind client: op has no backing op");
                continue;
            };
            host_txn.set_client_op(master, native);
        }

        let commit = canonical.host.commit(host_txn);
        self.latest_commit.store(commit.value(), Ordering::Release);
        info!(commit = %commit, ops = canonical.ops.len(), "committed transaction");
        drop(guard);
        drop(bound);
        Ok(commit)
    }

    fn backing_of(&self, op: &Op) -> Option<NativeOpId> {
        if op.belongs_to(&self.weak_self) {
            op.backing()
        } else {
            None
        }
    }

    /// Latest commit version; `CommitId(0)` before the first commit.
    ///
    /// Lock-free and possibly one commit behind a concurrent committer.
    #[must_use]
    pub fn latest_commit_id(&self) -> CommitId {
        CommitId::from_raw(self.latest_commit.load(Ordering::Acquire))
    }

    /// Committed op carrying `id`.
    #[must_use]
    pub fn op_from_op_id(&self, id: OpId) -> Option<Arc<Op>> {
        self.canonical().ops.get(&id).cloned()
    }

    /// Returns `true` if an op with `id` has been committed. Ops staged in
    /// uncommitted transactions are not visible here.
    #[must_use]
    pub fn is_valid_op(&self, id: OpId) -> bool {
        self.canonical().ops.contains_key(&id)
    }

    /// Number of committed ops.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.canonical().ops.len()
    }

    /// Drops cached cook results in the canonical host, every replica host
    /// and the runtime's [`CacheRegistry`].
    pub fn flush_caches(&self) {
        let replicas: Vec<Replica> = self.replica_table().values().cloned().collect();
        for replica in &replicas {
            replica.host.flush_caches();
        }
        self.canonical().host.flush_caches();
        self.caches.clear_all();
        debug!(replicas = replicas.len(), "flushed caches");
    }

    /// Description of an op type, memoized in [`DESCRIBE_OP_CACHE`].
    pub fn describe_op(&self, op_type: &str) -> Attr {
        let compute = || self.canonical().host.describe_op(op_type);
        match self
            .caches
            .get_or_register(DESCRIBE_OP_CACHE, MemoryCache::<String, Attr>::new)
        {
            Some(cache) => cache.get_or_insert_with(op_type.to_owned(), compute),
            None => compute(),
        }
    }

    /// Op types the host can cook.
    pub fn registered_op_types(&self) -> Vec<String> {
        self.canonical().host.registered_op_types()
    }

    /// Current canonical host options.
    pub fn options(&self) -> Attr {
        self.canonical().host.options()
    }

    /// Replaces the host options on the canonical host and every replica.
    pub fn set_options(&self, options: Attr) {
        let canonical = self.canonical();
        canonical.host.set_options(options.clone());
        for replica in self.replica_table().values() {
            replica.host.set_options(options.clone());
        }
    }

    /// Whether the canonical host is still processing.
    pub fn is_processing(&self) -> bool {
        self.canonical().host.is_processing()
    }

    /// Scenegraph root location of the canonical host.
    pub fn root_location_path(&self) -> String {
        self.canonical().host.root_location_path()
    }

    /// Number of live replica hosts (one per thread that has cooked).
    #[must_use]
    pub fn replica_count(&self) -> usize {
        self.replica_table().len()
    }

    /// Caches owned by this runtime.
    #[must_use]
    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    /// Configuration the runtime was created with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Tears down the calling thread's replica host, if any.
    ///
    /// Clients rebuild their replica state on the next use from this thread.
    pub fn release_thread_replica(&self) -> bool {
        let thread = std::thread::current().id();
        let mut canonical = self.canonical();
        let Some(replica) = self.replica_table().remove(&thread) else {
            return false;
        };
        canonical.synchronizer.forget(replica.id);
        debug!(replica = replica.id.value(), "released thread replica");
        true
    }

    /// Returns `true` while `id` names a live thread replica.
    pub(crate) fn has_replica(&self, id: ReplicaId) -> bool {
        self.replica_table().values().any(|replica| replica.id == id)
    }

    /// Removes a dropped client's master from the canonical host.
    ///
    /// The commit version is left alone: no op changed, so replicas have
    /// nothing to catch up on.
    pub(crate) fn release_client(&self, master: NativeClientId) {
        let canonical = self.canonical();
        let mut txn = canonical.host.create_transaction();
        txn.destroy_client(master);
        canonical.host.commit(txn);
        debug!(?master, "released master client");
    }

    /// The calling thread's replica host, created on first use with the
    /// canonical host's current options.
    pub(crate) fn thread_replica(&self) -> Result<Replica, RuntimeError> {
        let thread = std::thread::current().id();
        if let Some(replica) = self.replica_table().get(&thread) {
            return Ok(replica.clone());
        }

        let host = self.factory.create_host()?;
        let replica = Replica {
            id: ReplicaId::from_raw(self.next_replica.fetch_add(1, Ordering::Relaxed) + 1),
            host,
        };
        let canonical = self.canonical();
        replica.host.set_options(canonical.host.options());
        self.replica_table().insert(thread, replica.clone());
        drop(canonical);
        debug!(replica = replica.id.value(), ?thread, "created thread replica");
        Ok(replica)
    }

    pub(crate) fn committed_inputs(&self, op: NativeOpId) -> Vec<Arc<Op>> {
        let canonical = self.canonical();
        canonical
            .host
            .op_inputs(op)
            .into_iter()
            .filter_map(|input| canonical.native_ops.get(&input).cloned())
            .collect()
    }

    pub(crate) fn committed_args(&self, op: NativeOpId) -> Option<(String, Attr)> {
        self.canonical().host.op_args(op)
    }

    /// Op the canonical client currently cooks.
    pub(crate) fn client_root(&self, master: NativeClientId) -> Result<Arc<Op>, RuntimeError> {
        let canonical = self.canonical();
        canonical
            .host
            .client_op(master)
            .and_then(|native| canonical.native_ops.get(&native).cloned())
            .ok_or(RuntimeError::ClientOpNotSet)
    }

    /// Brings `replica` up to the latest commit if it is behind.
    ///
    /// The fast path is a lock-free version comparison. The slow path
    /// rechecks under the canonical mutex, replicates the canonical client's
    /// op tree into a replica transaction and captures the version before
    /// releasing the lock; the replica commit happens outside it.
    pub(crate) fn sync_client(&self, master: NativeClientId, replica: &mut ReplicaClient) {
        if replica.is_current(self.latest_commit_id()) {
            return;
        }
        self.resync(master, replica);
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(replica = replica.replica.value(), thread = ?replica.thread)
    )]
    fn resync(&self, master: NativeClientId, replica: &mut ReplicaClient) {
        let mut dest_txn = replica.host.create_transaction();
        let (synced_root, version) = {
            let mut guard = self.canonical();
            let version = self.latest_commit_id();
            if replica.is_current(version) {
                return;
            }
            // A released replica must not be mapped again.
            if !self.has_replica(replica.replica) {
                debug!("skipping resync of a released replica");
                return;
            }
            let Canonical {
                host, synchronizer, ..
            } = &mut *guard;
            let root = host.client_op(master).map(|root| {
                synchronizer.sync_from_op(&**host, replica.replica, &mut dest_txn, root)
            });
            (root, version)
        };

        if let Some(root) = synced_root {
            if replica.host.client_op(replica.client) != Some(root) {
                dest_txn.set_client_op(replica.client, root);
            }
        }
        replica.host.commit(dest_txn);
        replica.last_synced = Some(version);
        debug!(commit = %version, "replica client resynced");
    }
}
