// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Staging area for graph mutations.
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use tracing::error;

use crate::attr::{Attr, GroupAttr};
use crate::client::Client;
use crate::op::Op;
use crate::op_id::OpId;
use crate::runtime::KodachiRuntime;

/// Pending `(op_type, args)` assignment.
#[derive(Debug, Clone)]
pub(crate) struct PendingArgs {
    pub(crate) op: Arc<Op>,
    pub(crate) op_type: String,
    pub(crate) args: Attr,
}

/// Pending input wiring.
#[derive(Debug, Clone)]
pub(crate) struct PendingInputs {
    pub(crate) op: Arc<Op>,
    pub(crate) inputs: Vec<Arc<Op>>,
}

/// Everything a commit consumes, drained out of a [`Transaction`].
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    pub(crate) ops: BTreeMap<OpId, Arc<Op>>,
    pub(crate) args: BTreeMap<OpId, PendingArgs>,
    pub(crate) inputs: BTreeMap<OpId, PendingInputs>,
    pub(crate) clients: Vec<(Arc<Client>, Arc<Op>)>,
}

/// A batch of graph mutations, invisible to everyone else until committed
/// with [`KodachiRuntime::commit`].
///
/// Transactions are single-use: commit drains every pending map.
#[derive(Debug)]
pub struct Transaction {
    runtime: Weak<KodachiRuntime>,
    pending: PendingChanges,
}

impl Transaction {
    pub(crate) fn new(runtime: Weak<KodachiRuntime>) -> Self {
        Self {
            runtime,
            pending: PendingChanges::default(),
        }
    }

    pub(crate) fn runtime_ref(&self) -> &Weak<KodachiRuntime> {
        &self.runtime
    }

    pub(crate) fn take_pending(&mut self) -> PendingChanges {
        std::mem::take(&mut self.pending)
    }

    /// Stages a new op with a freshly generated id.
    pub fn create_op(&mut self) -> Arc<Op> {
        self.stage_op(OpId::generate())
    }

    fn stage_op(&mut self, id: OpId) -> Arc<Op> {
        let op = Arc::new(Op::new(id, self.runtime.clone()));
        self.pending.ops.insert(id, Arc::clone(&op));
        op
    }

    /// Stages the op type and args of `op`, replacing earlier staged args.
    pub fn set_op_args(&mut self, op: &Arc<Op>, op_type: impl Into<String>, args: Attr) {
        self.pending.args.insert(
            op.id(),
            PendingArgs {
                op: Arc::clone(op),
                op_type: op_type.into(),
                args,
            },
        );
    }

    /// Stages the ordered inputs of `op`, replacing earlier staged inputs.
    pub fn set_op_inputs(&mut self, op: &Arc<Op>, inputs: &[Arc<Op>]) {
        self.pending.inputs.insert(
            op.id(),
            PendingInputs {
                op: Arc::clone(op),
                inputs: inputs.to_vec(),
            },
        );
    }

    /// Creates a client. It can cook once a commit has bound an op to it.
    pub fn create_client(&mut self) -> Arc<Client> {
        Arc::new(Client::new(self.runtime.clone()))
    }

    /// Stages binding `client` to `op`, replacing an earlier staged binding.
    pub fn set_client_op(&mut self, client: &Arc<Client>, op: &Arc<Op>) {
        if let Some(slot) = self
            .pending
            .clients
            .iter_mut()
            .find(|(c, _)| Arc::ptr_eq(c, client))
        {
            slot.1 = Arc::clone(op);
        } else {
            self.pending
                .clients
                .push((Arc::clone(client), Arc::clone(op)));
        }
    }

    /// Resolves `id` to the op staged in this transaction, else to the
    /// committed op, else stages a new placeholder op carrying `id`.
    pub fn get_or_create_op(&mut self, id: OpId) -> Arc<Op> {
        if let Some(op) = self.pending.ops.get(&id) {
            return Arc::clone(op);
        }
        if let Some(op) = self
            .runtime
            .upgrade()
            .and_then(|runtime| runtime.op_from_op_id(id))
        {
            return op;
        }
        self.stage_op(id)
    }

    /// Stages the ops of a graph description and returns them in
    /// description order.
    ///
    /// Each child of `description` is keyed by a textual [`OpId`] and may
    /// carry `opType`, `opArgs` and `opInputs`. Args are staged only when
    /// `opType` is present. Nodes with malformed ids are skipped and
    /// malformed input ids are dropped; both are logged.
    pub fn parse_graph(&mut self, description: &GroupAttr) -> Vec<Arc<Op>> {
        let mut ops = Vec::with_capacity(description.len());
        for (name, node) in description {
            let id = match OpId::parse(name) {
                Ok(id) => id,
                Err(err) => {
                    error!(name = %name, %err, "op name is not a valid op id");
                    continue;
                }
            };
            let op = self.get_or_create_op(id);
            let node = node.as_group();

            if let Some(op_type) = node.and_then(|n| n.child("opType")).and_then(Attr::as_str) {
                let args = node
                    .and_then(|n| n.child("opArgs"))
                    .cloned()
                    .unwrap_or_default();
                self.set_op_args(&op, op_type, args);
            }

            if let Some(names) = node
                .and_then(|n| n.child("opInputs"))
                .and_then(Attr::as_strings)
            {
                let mut inputs = Vec::with_capacity(names.len());
                for input in names {
                    match OpId::parse(input) {
                        Ok(input_id) => inputs.push(self.get_or_create_op(input_id)),
                        Err(err) => error!(input, %err, "op input is not a valid op id"),
                    }
                }
                self.set_op_inputs(&op, &inputs);
            }

            ops.push(op);
        }
        ops
    }

    /// Appends a chain of new ops downstream of `op`.
    ///
    /// `chain` is a group whose children, in order, carry `opType` and
    /// `opArgs`; each new op takes the previous one as its only input.
    /// Returns the last op of the chain (`op` itself for an empty chain).
    pub fn append_op_chain(&mut self, op: &Arc<Op>, chain: &GroupAttr) -> Arc<Op> {
        let mut last = Arc::clone(op);
        for (_, node) in chain {
            let node = node.as_group();
            let op_type = node
                .and_then(|n| n.child("opType"))
                .and_then(Attr::as_str)
                .unwrap_or_default()
                .to_owned();
            let args = node
                .and_then(|n| n.child("opArgs"))
                .cloned()
                .unwrap_or_default();
            let created = self.create_op();
            self.set_op_args(&created, op_type, args);
            self.set_op_inputs(&created, &[last]);
            last = created;
        }
        last
    }

    /// Wires `ops` below `op` as a single-input chain: `op` takes `ops[0]`,
    /// `ops[0]` takes `ops[1]`, and so on. Returns the last op wired.
    pub fn append_ops(&mut self, op: &Arc<Op>, ops: &[Arc<Op>]) -> Arc<Op> {
        let mut last = Arc::clone(op);
        for next in ops {
            self.set_op_inputs(&last, &[Arc::clone(next)]);
            last = Arc::clone(next);
        }
        last
    }

    /// Drops everything staged.
    pub fn clear(&mut self) {
        self.pending = PendingChanges::default();
    }

    /// Returns `true` when nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.ops.is_empty()
            && self.pending.args.is_empty()
            && self.pending.inputs.is_empty()
            && self.pending.clients.is_empty()
    }

    /// Number of staged new ops.
    #[must_use]
    pub fn pending_op_count(&self) -> usize {
        self.pending.ops.len()
    }

    /// Number of staged args assignments.
    #[must_use]
    pub fn pending_args_count(&self) -> usize {
        self.pending.args.len()
    }

    /// Number of staged input assignments.
    #[must_use]
    pub fn pending_inputs_count(&self) -> usize {
        self.pending.inputs.len()
    }

    /// Number of staged client bindings.
    #[must_use]
    pub fn pending_client_count(&self) -> usize {
        self.pending.clients.len()
    }

    /// Op staged under `id` in this transaction, if any.
    #[must_use]
    pub fn pending_op(&self, id: OpId) -> Option<Arc<Op>> {
        self.pending.ops.get(&id).cloned()
    }
}
