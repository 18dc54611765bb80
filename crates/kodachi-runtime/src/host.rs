// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Port to the host scenegraph engine.
//!
//! The runtime never cooks anything itself. It stages graph edits into a
//! [`HostTransaction`], hands them to a [`HostRuntime`] and asks that host to
//! cook locations. One host instance is canonical; every cooking thread gets
//! its own replica instance created by the same [`HostFactory`].
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::attr::{Attr, GroupAttr, Hash};

/// Host-native op handle. Only meaningful within the host instance that
/// allocated it.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NativeOpId(pub u64);

/// Host-native client handle. Only meaningful within the host instance that
/// allocated it.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NativeClientId(pub u64);

/// Monotonic commit version of a host instance.
///
/// Zero means "nothing committed yet"; the first commit yields `CommitId(1)`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct CommitId(u64);

impl CommitId {
    /// Constructs a `CommitId` from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the next version.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl core::fmt::Display for CommitId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by host instances.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host instance could not be created.
    #[error("failed to create host runtime: {0}")]
    Create(String),
    /// The client handle was never committed to this host instance.
    #[error("unknown host client: {0:?}")]
    UnknownClient(NativeClientId),
}

/// Result of cooking one scenegraph location.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocationData {
    /// Absolute location path, e.g. `/root/world/geo`.
    pub path: String,
    /// Content digest of the cooked location (attributes and children).
    pub hash: Hash,
    /// Whether the location exists in the cooked scene.
    pub exists: bool,
    /// Cooked attributes.
    pub attrs: GroupAttr,
    /// Names (not paths) of the location's potential children.
    pub potential_children: Vec<String>,
}

impl LocationData {
    /// Placeholder for a location that does not exist.
    #[must_use]
    pub fn missing(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            ..Self::default()
        }
    }

    /// Full paths of the potential children.
    pub fn child_paths(&self) -> impl Iterator<Item = String> + '_ {
        self.potential_children
            .iter()
            .map(move |name| format!("{}/{name}", self.path))
    }
}

/// Change notification for an actively monitored location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEvent {
    /// Location that changed.
    pub path: String,
    /// Fresh data for the location, when the host has it.
    pub data: Option<LocationData>,
}

/// One staged edit inside a [`HostTransaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostEdit {
    /// Create an op with the given pre-allocated handle.
    CreateOp(NativeOpId),
    /// Replace an op's type and args.
    SetOpArgs {
        /// Target op.
        op: NativeOpId,
        /// Op type name.
        op_type: String,
        /// Op args payload.
        args: Attr,
    },
    /// Replace an op's input list.
    SetOpInputs {
        /// Target op.
        op: NativeOpId,
        /// Ordered inputs.
        inputs: Vec<NativeOpId>,
    },
    /// Create a client with the given pre-allocated handle.
    CreateClient(NativeClientId),
    /// Point a client at the op it cooks.
    SetClientOp {
        /// Target client.
        client: NativeClientId,
        /// Terminal op the client cooks.
        op: NativeOpId,
    },
    /// Remove a client and everything the host tracks for it.
    DestroyClient(NativeClientId),
}

/// Handle allocator shared between a host instance and its transactions.
///
/// Handles are allocated when an edit is staged so later edits in the same
/// transaction can reference them before commit.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    /// Creates an allocator whose first handle is `1`.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Ordered log of edits applied atomically by [`HostRuntime::commit`].
#[derive(Debug)]
pub struct HostTransaction {
    handles: Arc<HandleAllocator>,
    edits: Vec<HostEdit>,
}

impl HostTransaction {
    /// Creates an empty transaction drawing handles from `handles`.
    #[must_use]
    pub fn new(handles: Arc<HandleAllocator>) -> Self {
        Self {
            handles,
            edits: Vec::new(),
        }
    }

    /// Stages a new op and returns its handle.
    pub fn create_op(&mut self) -> NativeOpId {
        let op = NativeOpId(self.handles.allocate());
        self.edits.push(HostEdit::CreateOp(op));
        op
    }

    /// Stages an args assignment.
    pub fn set_op_args(&mut self, op: NativeOpId, op_type: impl Into<String>, args: Attr) {
        self.edits.push(HostEdit::SetOpArgs {
            op,
            op_type: op_type.into(),
            args,
        });
    }

    /// Stages an input assignment.
    pub fn set_op_inputs(&mut self, op: NativeOpId, inputs: Vec<NativeOpId>) {
        self.edits.push(HostEdit::SetOpInputs { op, inputs });
    }

    /// Stages a new client and returns its handle.
    pub fn create_client(&mut self) -> NativeClientId {
        let client = NativeClientId(self.handles.allocate());
        self.edits.push(HostEdit::CreateClient(client));
        client
    }

    /// Stages a client-op assignment.
    pub fn set_client_op(&mut self, client: NativeClientId, op: NativeOpId) {
        self.edits.push(HostEdit::SetClientOp { client, op });
    }

    /// Stages the removal of a client.
    pub fn destroy_client(&mut self, client: NativeClientId) {
        self.edits.push(HostEdit::DestroyClient(client));
    }

    /// Staged edits in order.
    #[must_use]
    pub fn edits(&self) -> &[HostEdit] {
        &self.edits
    }

    /// Consumes the transaction, yielding its edits.
    #[must_use]
    pub fn into_edits(self) -> Vec<HostEdit> {
        self.edits
    }

    /// Returns `true` if nothing has been staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// One instance of the host scenegraph engine.
///
/// Implementations must be `Send + Sync`, but callers uphold a stronger
/// discipline: a replica instance is only driven by the thread that owns it,
/// and the canonical instance is only touched under the runtime's mutex.
/// The one exception is client teardown, which commits a
/// [`HostEdit::DestroyClient`] into a replica from whichever thread drops
/// the last handle to the client.
pub trait HostRuntime: Send + Sync {
    /// Opens a transaction against this instance.
    fn create_transaction(&self) -> HostTransaction;

    /// Applies a transaction and returns the new commit version.
    fn commit(&self, txn: HostTransaction) -> CommitId;

    /// Latest committed `(op_type, args)` of an op.
    fn op_args(&self, op: NativeOpId) -> Option<(String, Attr)>;

    /// Latest committed inputs of an op. Empty for unknown ops.
    fn op_inputs(&self, op: NativeOpId) -> Vec<NativeOpId>;

    /// The op a client cooks, if one was committed.
    fn client_op(&self, client: NativeClientId) -> Option<NativeOpId>;

    /// Cooks `path` through `client`'s op tree.
    fn cook_location(&self, client: NativeClientId, path: &str) -> Result<LocationData, HostError>;

    /// Marks locations as monitored for change events.
    fn set_locations_active(&self, client: NativeClientId, paths: &[String]) -> Result<(), HostError>;

    /// Drains up to `max` pending change events for `client`.
    fn location_events(&self, client: NativeClientId, max: usize) -> Result<Vec<LocationEvent>, HostError>;

    /// Drops cached cook results for `path`.
    fn evict(&self, path: &str);

    /// Drops every cached cook result.
    fn flush_caches(&self);

    /// Current option set.
    fn options(&self) -> Attr;

    /// Replaces the option set.
    fn set_options(&self, options: Attr);

    /// Describes an op type (args schema, docs). `Null` when unknown.
    fn describe_op(&self, op_type: &str) -> Attr;

    /// Names of the op types this host can cook.
    fn registered_op_types(&self) -> Vec<String>;

    /// Whether the host is still processing asynchronous work.
    fn is_processing(&self) -> bool;

    /// Path of the scenegraph root location.
    fn root_location_path(&self) -> String;
}

/// Creates host instances: one canonical, plus one replica per cooking thread.
pub trait HostFactory: Send + Sync {
    /// Creates a fresh, empty host instance.
    fn create_host(&self) -> Result<Arc<dyn HostRuntime>, HostError>;
}

impl<F> HostFactory for F
where
    F: Fn() -> Result<Arc<dyn HostRuntime>, HostError> + Send + Sync,
{
    fn create_host(&self) -> Result<Arc<dyn HostRuntime>, HostError> {
        self()
    }
}
