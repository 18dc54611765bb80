// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Builder for graph descriptions.
//!
//! A graph description is a [`GroupAttr`] whose children are keyed by textual
//! [`OpId`]s and carry `opType`, `opArgs` and `opInputs`; it is what
//! [`crate::Transaction::parse_graph`] consumes. The builder accumulates
//! edits in a delta and folds deltas into a merged description on build.
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::error;

use crate::attr::{Attr, GroupAttr};
use crate::op_id::OpId;

/// Op type given to ops before their args are set.
pub const DEFAULT_OP_TYPE: &str = "no-op";

/// What happens to accumulated state when building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Hand out the result and reset the accumulated description.
    #[default]
    Flush,
    /// Hand out the result and keep accumulating.
    Retain,
}

/// Errors raised while merging or building descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeBuilderError {
    /// A description key is not a valid op id.
    #[error("invalid op id in description: {0:?}")]
    InvalidOpId(String),
    /// Every op in the description is some other op's input.
    #[error("description has no terminal op (cyclic graph?)")]
    NoTerminalOp,
    /// The op was not created by this builder.
    #[error("op {0} was not created by this builder")]
    UnknownOp(OpId),
    /// An op reachable from the terminal op is missing from the description.
    #[error("op {0:?} not found in the built description")]
    MissingOp(String),
}

/// Handle to an op created by an [`OpTreeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreeOp {
    id: OpId,
}

impl TreeOp {
    /// Identifier of the op.
    #[must_use]
    pub fn id(&self) -> OpId {
        self.id
    }
}

#[derive(Debug, Default)]
struct BuilderState {
    ops: HashSet<OpId>,
    delta: GroupAttr,
    merged: GroupAttr,
}

impl BuilderState {
    fn create_op(&mut self, id: OpId) -> TreeOp {
        self.ops.insert(id);
        let op = TreeOp { id };
        self.set_op_args(op, DEFAULT_OP_TYPE, Attr::Group(GroupAttr::new()));
        op
    }

    fn set_op_args(&mut self, op: TreeOp, op_type: &str, args: Attr) {
        if !self.ops.contains(&op.id) {
            error!(op_id = %op.id, "cannot set op args: op was not created by this builder");
            return;
        }
        self.delta.set(&format!("{}.opType", op.id), op_type);
        self.delta.set(&format!("{}.opArgs", op.id), args);
    }

    fn set_op_inputs(&mut self, op: TreeOp, inputs: &[TreeOp]) {
        if !self.ops.contains(&op.id) {
            error!(op_id = %op.id, "cannot set op inputs: op was not created by this builder");
            return;
        }
        let mut names = Vec::with_capacity(inputs.len());
        for input in inputs {
            if self.ops.contains(&input.id) {
                names.push(input.id.to_string());
            } else {
                error!(op_id = %input.id, "skipping input op not created by this builder");
            }
        }
        self.delta
            .set(&format!("{}.opInputs", op.id), Attr::StringArray(names));
    }
}

/// Thread-safe builder of graph descriptions.
#[derive(Debug, Default)]
pub struct OpTreeBuilder {
    state: Mutex<BuilderState>,
}

fn input_names(node: &Attr) -> Vec<&str> {
    node.as_group()
        .and_then(|g| g.child("opInputs"))
        .and_then(Attr::as_strings)
        .unwrap_or_default()
}

impl OpTreeBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BuilderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids of the ops in `description` that no other op uses as an input,
    /// in description order. Invalid ids are ignored.
    #[must_use]
    pub fn find_terminal_ops(description: &GroupAttr) -> Vec<OpId> {
        let used: HashSet<&str> = description
            .iter()
            .flat_map(|(_, node)| input_names(node))
            .collect();
        description
            .iter()
            .filter(|(name, _)| !used.contains(name))
            .filter_map(|(name, _)| OpId::parse(name).ok())
            .collect()
    }

    /// Creates a new op of type [`DEFAULT_OP_TYPE`].
    pub fn create_op(&self) -> TreeOp {
        self.state().create_op(OpId::generate())
    }

    /// Handle for `id` if this builder created (or merged) it.
    pub fn op_from_op_id(&self, id: OpId) -> Option<TreeOp> {
        self.state().ops.contains(&id).then_some(TreeOp { id })
    }

    /// Returns `true` if `op` belongs to this builder.
    pub fn contains(&self, op: TreeOp) -> bool {
        self.state().ops.contains(&op.id)
    }

    /// Sets the op type and args of `op`.
    pub fn set_op_args(&self, op: TreeOp, op_type: &str, args: Attr) -> &Self {
        self.state().set_op_args(op, op_type, args);
        self
    }

    /// Sets the inputs of `op`. Inputs from other builders are skipped.
    pub fn set_op_inputs(&self, op: TreeOp, inputs: &[TreeOp]) -> &Self {
        self.state().set_op_inputs(op, inputs);
        self
    }

    /// Merges an existing description into this builder.
    ///
    /// Unknown ops are registered. Returns the ops of the description with a
    /// terminal op last.
    pub fn merge(&self, description: &GroupAttr) -> Result<Vec<TreeOp>, TreeBuilderError> {
        let ids = description
            .iter()
            .map(|(name, _)| {
                OpId::parse(name).map_err(|_| TreeBuilderError::InvalidOpId(name.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let used: HashSet<&str> = description
            .iter()
            .flat_map(|(_, node)| input_names(node))
            .collect();
        let terminal = ids
            .iter()
            .position(|id| !used.contains(id.to_string().as_str()))
            .ok_or(TreeBuilderError::NoTerminalOp)?;

        let mut state = self.state();
        let mut ops: Vec<TreeOp> = ids
            .iter()
            .map(|&id| {
                if state.ops.contains(&id) {
                    TreeOp { id }
                } else {
                    state.create_op(id)
                }
            })
            .collect();
        let last = ops.remove(terminal);
        ops.push(last);

        for (name, node) in description {
            state.delta.set(name, node.clone());
        }
        Ok(ops)
    }

    /// Makes `upstream` the only input of `downstream` and returns
    /// `downstream`.
    pub fn append_op(&self, upstream: TreeOp, downstream: TreeOp) -> TreeOp {
        self.state().set_op_inputs(downstream, &[upstream]);
        downstream
    }

    /// Creates one op per child of `chain` (each with `opType` and
    /// `opArgs`) and chains them below `op`. Returns `op` followed by the
    /// new ops.
    pub fn append_op_chain(&self, op: TreeOp, chain: &GroupAttr) -> Vec<TreeOp> {
        let mut state = self.state();
        let mut ops = Vec::with_capacity(chain.len() + 1);
        ops.push(op);
        let mut last = op;
        for (_, node) in chain {
            let node = node.as_group();
            let op_type = node
                .and_then(|n| n.child("opType"))
                .and_then(Attr::as_str)
                .unwrap_or(DEFAULT_OP_TYPE)
                .to_owned();
            let args = node
                .and_then(|n| n.child("opArgs"))
                .cloned()
                .unwrap_or_default();
            let created = state.create_op(OpId::generate());
            state.set_op_args(created, &op_type, args);
            state.set_op_inputs(created, &[last]);
            ops.push(created);
            last = created;
        }
        ops
    }

    /// Returns the edits made since the last build.
    ///
    /// [`BuildMode::Flush`] also discards the merged description;
    /// [`BuildMode::Retain`] folds the delta into it.
    pub fn build_delta(&self, mode: BuildMode) -> GroupAttr {
        let mut state = self.state();
        let delta = std::mem::take(&mut state.delta);
        match mode {
            BuildMode::Flush => state.merged = GroupAttr::new(),
            BuildMode::Retain => state.merged.deep_merge(&delta),
        }
        delta
    }

    /// Folds pending edits into the merged description and returns the
    /// sub-tree reachable from `terminal` through `opInputs`.
    ///
    /// [`BuildMode::Flush`] resets the merged description afterwards.
    pub fn build(&self, terminal: TreeOp, mode: BuildMode) -> Result<GroupAttr, TreeBuilderError> {
        let mut state = self.state();
        if !state.ops.contains(&terminal.id) {
            return Err(TreeBuilderError::UnknownOp(terminal.id));
        }
        let delta = std::mem::take(&mut state.delta);
        state.merged.deep_merge(&delta);
        let graph = match mode {
            BuildMode::Flush => std::mem::take(&mut state.merged),
            BuildMode::Retain => state.merged.clone(),
        };
        drop(state);

        let mut tree = GroupAttr::new();
        let mut queue = VecDeque::from([terminal.id.to_string()]);
        let mut seen = HashSet::new();
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let node = graph
                .child(&name)
                .ok_or_else(|| TreeBuilderError::MissingOp(name.clone()))?;
            queue.extend(input_names(node).into_iter().map(str::to_owned));
            tree.set(&name, node.clone());
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn new_ops_default_to_no_op() {
        let builder = OpTreeBuilder::new();
        let op = builder.create_op();
        let tree = builder.build(op, BuildMode::Flush).unwrap();
        assert_eq!(
            tree.get(&format!("{}.opType", op.id())).and_then(Attr::as_str),
            Some(DEFAULT_OP_TYPE)
        );
    }

    #[test]
    fn build_extracts_only_the_reachable_subtree() {
        let builder = OpTreeBuilder::new();
        let a = builder.create_op();
        let b = builder.create_op();
        let stray = builder.create_op();
        builder
            .set_op_args(a, "LocationCreate", Attr::from("/root/a"))
            .set_op_inputs(b, &[a]);
        let tree = builder.build(b, BuildMode::Retain).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.child(&stray.id().to_string()).is_none());
        assert_eq!(OpTreeBuilder::find_terminal_ops(&tree), vec![b.id()]);

        let again = builder.build(stray, BuildMode::Flush).unwrap();
        assert_eq!(again.len(), 1);
        assert!(builder.build_delta(BuildMode::Flush).is_empty());
    }

    #[test]
    fn foreign_inputs_are_skipped() {
        let builder = OpTreeBuilder::new();
        let other = OpTreeBuilder::new();
        let mine = builder.create_op();
        let theirs = other.create_op();
        assert!(!builder.contains(theirs));
        builder.set_op_inputs(mine, &[theirs]);
        let delta = builder.build_delta(BuildMode::Flush);
        assert_eq!(
            delta.get(&format!("{}.opInputs", mine.id())),
            Some(&Attr::StringArray(Vec::new()))
        );
    }

    #[test]
    fn merge_puts_terminal_last_and_rejects_cycles() {
        let builder = OpTreeBuilder::new();
        let a = OpId::generate();
        let b = OpId::generate();
        let description: Attr = serde_json::from_str(&format!(
            r#"{{"{b}": {{"opType": "no-op", "opInputs": ["{a}"]}}, "{a}": {{"opType": "no-op"}}}}"#
        ))
        .unwrap();
        let ops = builder.merge(description.as_group().unwrap()).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops.last().map(TreeOp::id), Some(b));
        assert!(builder.op_from_op_id(a).is_some());

        let cyclic: Attr = serde_json::from_str(&format!(
            r#"{{"{a}": {{"opInputs": ["{b}"]}}, "{b}": {{"opInputs": ["{a}"]}}}}"#
        ))
        .unwrap();
        assert_eq!(
            builder.merge(cyclic.as_group().unwrap()),
            Err(TreeBuilderError::NoTerminalOp)
        );

        let invalid: Attr = serde_json::from_str(r#"{"nope": {}}"#).unwrap();
        assert!(matches!(
            builder.merge(invalid.as_group().unwrap()),
            Err(TreeBuilderError::InvalidOpId(_))
        ));
    }

    #[test]
    fn append_op_chain_links_new_ops() {
        let builder = OpTreeBuilder::new();
        let base = builder.create_op();
        let chain: Attr =
            serde_json::from_str(r#"{"0": {"opType": "Prune", "opArgs": {"location": "/root/x"}}}"#)
                .unwrap();
        let ops = builder.append_op_chain(base, chain.as_group().unwrap());
        assert_eq!(ops.len(), 2);
        let tree = builder.build(ops[1], BuildMode::Flush).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(
            tree.get(&format!("{}.opInputs", ops[1].id())),
            Some(&Attr::StringArray(vec![base.id().to_string()]))
        );
    }
}
