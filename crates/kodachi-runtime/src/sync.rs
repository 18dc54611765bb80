// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Incremental op-tree replication between host instances.
use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::host::{HostRuntime, HostTransaction, NativeOpId};

/// Identity of a destination host instance (a per-thread replica).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ReplicaId(u64);

impl ReplicaId {
    /// Constructs a `ReplicaId` from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

type OpMap = HashMap<NativeOpId, NativeOpId>;

/// Replicates the subgraph reachable from a source op into a destination
/// host instance.
///
/// A map per destination remembers which destination op stands for each
/// source op, so repeated syncs only stage new nodes for ops the destination
/// has never seen. Args are re-copied for every reachable node and inputs are
/// rewired on every sync, which keeps an already-mapped node current.
#[derive(Debug, Default)]
pub struct OpTreeSynchronizer {
    maps: HashMap<ReplicaId, OpMap>,
}

impl OpTreeSynchronizer {
    /// Creates a synchronizer with no destinations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages into `dest_txn` everything needed for `dest` to mirror the tree
    /// rooted at `src_root` in `src`, and returns the destination op for
    /// `src_root`.
    ///
    /// The walk is iterative (explicit stack) and marks nodes visited when
    /// they are popped, so diamonds are expanded once. Source graphs are
    /// expected to be acyclic.
    pub fn sync_from_op(
        &mut self,
        src: &dyn HostRuntime,
        dest: ReplicaId,
        dest_txn: &mut HostTransaction,
        src_root: NativeOpId,
    ) -> NativeOpId {
        let map = self.maps.entry(dest).or_default();
        let mut stack = vec![src_root];
        let mut visited = HashSet::new();

        while let Some(src_op) = stack.pop() {
            if !visited.insert(src_op) {
                continue;
            }
            let src_inputs = src.op_inputs(src_op);
            let mut dest_inputs = Vec::with_capacity(src_inputs.len());
            for input in src_inputs {
                dest_inputs.push(get_or_create(map, src, dest_txn, input, true));
                stack.push(input);
            }
            let dest_op = get_or_create(map, src, dest_txn, src_op, false);
            dest_txn.set_op_inputs(dest_op, dest_inputs);
        }

        let root = get_or_create(map, src, dest_txn, src_root, true);
        trace!(
            replica = dest.value(),
            visited = visited.len(),
            mapped = map.len(),
            "synced op tree"
        );
        root
    }

    /// Drops the map for a destination that has been torn down.
    pub fn forget(&mut self, dest: ReplicaId) -> bool {
        self.maps.remove(&dest).is_some()
    }

    /// Number of source ops mapped into `dest`.
    #[must_use]
    pub fn mapped_count(&self, dest: ReplicaId) -> usize {
        self.maps.get(&dest).map_or(0, HashMap::len)
    }
}

fn get_or_create(
    map: &mut OpMap,
    src: &dyn HostRuntime,
    dest_txn: &mut HostTransaction,
    src_op: NativeOpId,
    sync_args: bool,
) -> NativeOpId {
    let dest_op = *map.entry(src_op).or_insert_with(|| dest_txn.create_op());
    if sync_args {
        if let Some((op_type, args)) = src.op_args(src_op) {
            dest_txn.set_op_args(dest_op, op_type, args);
        }
    }
    dest_op
}
