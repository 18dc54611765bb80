// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cooking clients and their per-thread replica state.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::thread::ThreadId;

use rayon::prelude::*;
use tracing::debug;

use crate::error::RuntimeError;
use crate::host::{CommitId, HostError, HostRuntime, LocationData, LocationEvent, NativeClientId};
use crate::op::Op;
use crate::runtime::KodachiRuntime;
use crate::sync::ReplicaId;

/// One thread's view of a [`Client`]: a client handle inside that thread's
/// replica host plus the commit version it was last synced to.
pub(crate) struct ReplicaClient {
    pub(crate) host: Arc<dyn HostRuntime>,
    pub(crate) replica: ReplicaId,
    pub(crate) client: NativeClientId,
    pub(crate) thread: ThreadId,
    /// `None` until the first sync.
    pub(crate) last_synced: Option<CommitId>,
}

impl ReplicaClient {
    pub(crate) fn is_current(&self, latest: CommitId) -> bool {
        self.last_synced.is_some_and(|synced| synced >= latest)
    }
}

struct ReplicaSlot {
    seq: u64,
    replica: ReplicaId,
    client: Arc<Mutex<ReplicaClient>>,
}

/// Handle used to cook the op tree bound to it.
///
/// The binding lives in the canonical graph (the "master" client). Each
/// thread that cooks through the client gets its own replica client, so
/// cooking on one thread never waits on cooking on another.
pub struct Client {
    runtime: Weak<KodachiRuntime>,
    master: OnceLock<NativeClientId>,
    replicas: Mutex<HashMap<ThreadId, ReplicaSlot>>,
    next_seq: AtomicU64,
}

impl core::fmt::Debug for Client {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("master", &self.master.get())
            .field("replicas", &self.replica_count())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Client {
    pub(crate) fn new(runtime: Weak<KodachiRuntime>) -> Self {
        Self {
            runtime,
            master: OnceLock::new(),
            replicas: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn belongs_to(&self, runtime: &Weak<KodachiRuntime>) -> bool {
        Weak::ptr_eq(&self.runtime, runtime)
    }

    pub(crate) fn master_or_init(&self, create: impl FnOnce() -> NativeClientId) -> NativeClientId {
        *self.master.get_or_init(create)
    }

    /// Owning runtime, or `None` once it has been dropped.
    #[must_use]
    pub fn runtime(&self) -> Option<Arc<KodachiRuntime>> {
        self.runtime.upgrade()
    }

    /// Returns `true` once a commit has bound this client.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.master.get().is_some()
    }

    fn resolve(&self) -> Result<(Arc<KodachiRuntime>, NativeClientId), RuntimeError> {
        let runtime = self.runtime().ok_or(RuntimeError::RuntimeExpired)?;
        let master = *self.master.get().ok_or(RuntimeError::ClientNotCommitted)?;
        Ok((runtime, master))
    }

    /// Op currently bound to this client in the canonical graph.
    ///
    /// # Errors
    /// [`RuntimeError::ClientNotCommitted`] before the binding transaction
    /// has been committed, [`RuntimeError::ClientOpNotSet`] when the binding
    /// was skipped, [`RuntimeError::RuntimeExpired`] after the runtime drops.
    pub fn op(&self) -> Result<Arc<Op>, RuntimeError> {
        let (runtime, master) = self.resolve()?;
        runtime.client_root(master)
    }

    /// Cooks `path` on the calling thread's replica, syncing it first.
    ///
    /// With `evict`, the replica drops its cached result for `path` after
    /// cooking.
    pub fn cook_location(&self, path: &str, evict: bool) -> Result<LocationData, RuntimeError> {
        let (runtime, master) = self.resolve()?;
        let slot = self.thread_replica(&runtime)?;
        let mut replica = lock(&slot);
        runtime.sync_client(master, &mut replica);
        let data = replica.host.cook_location(replica.client, path)?;
        if evict {
            replica.host.evict(path);
        }
        Ok(data)
    }

    /// Marks locations as observed on the calling thread's replica.
    pub fn set_locations_active(&self, paths: &[String]) -> Result<(), RuntimeError> {
        let (runtime, master) = self.resolve()?;
        let slot = self.thread_replica(&runtime)?;
        let mut replica = lock(&slot);
        runtime.sync_client(master, &mut replica);
        replica.host.set_locations_active(replica.client, paths)?;
        Ok(())
    }

    /// Drains change events from every thread's replica.
    ///
    /// Replicas are drained in parallel, each synced first, and the results
    /// are concatenated in replica creation order. A replica that is cooking
    /// on its owning thread is drained after that cook finishes. Replica
    /// state left on a released thread replica is dropped, not drained.
    pub fn location_events(&self) -> Result<Vec<LocationEvent>, RuntimeError> {
        let (runtime, master) = self.resolve()?;
        let limit = runtime.config().drain_limit();
        let mut slots: Vec<(u64, Arc<Mutex<ReplicaClient>>)> = {
            let mut table = lock(&self.replicas);
            table.retain(|_, slot| runtime.has_replica(slot.replica));
            table
                .values()
                .map(|slot| (slot.seq, Arc::clone(&slot.client)))
                .collect()
        };
        slots.sort_by_key(|(seq, _)| *seq);

        let drained: Vec<Vec<LocationEvent>> = slots
            .par_iter()
            .map(|(_, slot)| {
                let mut replica = lock(slot);
                runtime.sync_client(master, &mut replica);
                replica.host.location_events(replica.client, limit)
            })
            .collect::<Result<_, HostError>>()?;
        Ok(drained.into_iter().flatten().collect())
    }

    /// Commit version the calling thread's replica was last synced to.
    /// `None` if this thread has never used the client.
    #[must_use]
    pub fn last_synced_commit(&self) -> Option<CommitId> {
        let thread = std::thread::current().id();
        let slot = lock(&self.replicas).get(&thread).map(|s| Arc::clone(&s.client))?;
        let synced = lock(&slot).last_synced;
        synced
    }

    /// Number of threads holding replica state for this client.
    #[must_use]
    pub fn replica_count(&self) -> usize {
        lock(&self.replicas).len()
    }

    fn thread_replica(
        &self,
        runtime: &KodachiRuntime,
    ) -> Result<Arc<Mutex<ReplicaClient>>, RuntimeError> {
        let replica = runtime.thread_replica()?;
        let thread = std::thread::current().id();
        if let Some(slot) = lock(&self.replicas).get(&thread) {
            if slot.replica == replica.id {
                return Ok(Arc::clone(&slot.client));
            }
        }

        let mut txn = replica.host.create_transaction();
        let client = txn.create_client();
        replica.host.commit(txn);
        let state = Arc::new(Mutex::new(ReplicaClient {
            host: replica.host,
            replica: replica.id,
            client,
            thread,
            last_synced: None,
        }));
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        lock(&self.replicas).insert(
            thread,
            ReplicaSlot {
                seq,
                replica: replica.id,
                client: Arc::clone(&state),
            },
        );
        debug!(replica = replica.id.value(), ?thread, "created replica client");
        Ok(state)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let slots = self
            .replicas
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, slot) in slots.drain() {
            let replica = lock(&slot.client);
            let mut txn = replica.host.create_transaction();
            txn.destroy_client(replica.client);
            replica.host.commit(txn);
        }
        if let (Some(runtime), Some(master)) = (self.runtime.upgrade(), self.master.get()) {
            runtime.release_client(*master);
        }
    }
}
