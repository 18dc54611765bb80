// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Op handles.
use std::sync::{Arc, OnceLock, Weak};

use tracing::info;

use crate::attr::Attr;
use crate::error::RuntimeError;
use crate::host::NativeOpId;
use crate::op_id::OpId;
use crate::runtime::KodachiRuntime;

/// Handle to one node of the op graph.
///
/// An `Op` is created pending inside a [`crate::Transaction`] and becomes
/// committed once [`KodachiRuntime::commit`] gives it a backing op in the
/// canonical host graph. The backing reference is written at most once.
/// Handles only observe their runtime; they never keep it alive.
#[derive(Debug)]
pub struct Op {
    id: OpId,
    runtime: Weak<KodachiRuntime>,
    backing: OnceLock<NativeOpId>,
}

impl Op {
    pub(crate) fn new(id: OpId, runtime: Weak<KodachiRuntime>) -> Self {
        Self {
            id,
            runtime,
            backing: OnceLock::new(),
        }
    }

    /// Identifier of this op.
    #[must_use]
    pub fn id(&self) -> OpId {
        self.id
    }

    /// Owning runtime, or `None` once it has been dropped.
    #[must_use]
    pub fn runtime(&self) -> Option<Arc<KodachiRuntime>> {
        self.runtime.upgrade()
    }

    /// Returns `true` once a commit has created the backing op.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.backing.get().is_some()
    }

    pub(crate) fn backing(&self) -> Option<NativeOpId> {
        self.backing.get().copied()
    }

    pub(crate) fn bind(&self, native: NativeOpId) -> bool {
        self.backing.set(native).is_ok()
    }

    pub(crate) fn belongs_to(&self, runtime: &Weak<KodachiRuntime>) -> bool {
        Weak::ptr_eq(&self.runtime, runtime)
    }

    /// Committed inputs of this op, in order.
    ///
    /// An uncommitted op has no inputs yet: this is logged and yields an
    /// empty list. Fails only when the runtime has expired.
    pub fn inputs(&self) -> Result<Vec<Arc<Op>>, RuntimeError> {
        let Some(native) = self.backing() else {
            info!(op_id = %self.id, "inputs requested for uncommitted op");
            return Ok(Vec::new());
        };
        let runtime = self.runtime().ok_or(RuntimeError::RuntimeExpired)?;
        Ok(runtime.committed_inputs(native))
    }

    /// Committed `(op_type, args)` of this op.
    ///
    /// `None` for an uncommitted op (logged) or an op whose args were never
    /// set. Fails only when the runtime has expired.
    pub fn op_args(&self) -> Result<Option<(String, Attr)>, RuntimeError> {
        let Some(native) = self.backing() else {
            info!(op_id = %self.id, "args requested for uncommitted op");
            return Ok(None);
        };
        let runtime = self.runtime().ok_or(RuntimeError::RuntimeExpired)?;
        Ok(runtime.committed_args(native))
    }
}

impl PartialEq for Op {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Op {}
