// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]
use kodachi_runtime::{
    Attr, HostRuntime, MemoryHost, NativeOpId, OpTreeSynchronizer, ReplicaId,
};

/// Commits `(op_type, args, inputs)` triples in order and returns their handles.
fn commit_ops(host: &MemoryHost, specs: &[(&str, i64, &[usize])]) -> Vec<NativeOpId> {
    let mut txn = host.create_transaction();
    let mut ops = Vec::new();
    for (op_type, arg, inputs) in specs {
        let op = txn.create_op();
        txn.set_op_args(op, *op_type, Attr::Int(*arg));
        txn.set_op_inputs(op, inputs.iter().map(|i| ops[*i]).collect());
        ops.push(op);
    }
    host.commit(txn);
    ops
}

fn sync_into(
    sync: &mut OpTreeSynchronizer,
    src: &MemoryHost,
    dest: &MemoryHost,
    id: ReplicaId,
    root: NativeOpId,
) -> NativeOpId {
    let mut txn = dest.create_transaction();
    let out = sync.sync_from_op(src, id, &mut txn, root);
    dest.commit(txn);
    out
}

#[test]
fn second_sync_adds_no_nodes() {
    let src = MemoryHost::new();
    let ops = commit_ops(&src, &[("A", 1, &[]), ("B", 2, &[0]), ("C", 3, &[0, 1])]);
    let dest = MemoryHost::new();
    let mut sync = OpTreeSynchronizer::new();
    let id = ReplicaId::from_raw(1);

    let first = sync_into(&mut sync, &src, &dest, id, ops[2]);
    let count = dest.op_count();
    assert_eq!(count, 3);

    let second = sync_into(&mut sync, &src, &dest, id, ops[2]);
    assert_eq!(first, second);
    assert_eq!(dest.op_count(), count);
    assert_eq!(dest.op_args(second), Some(("C".to_owned(), Attr::Int(3))));
}

#[test]
fn dedup_keys_on_source_handle_not_content() {
    let src = MemoryHost::new();
    // A -> B, then B' reuses A; A'' -> B'' duplicates the content of A -> B.
    let ops = commit_ops(
        &src,
        &[("A", 1, &[]), ("B", 2, &[0]), ("B", 2, &[0]), ("A", 1, &[]), ("B", 2, &[3])],
    );
    let mut sync = OpTreeSynchronizer::new();

    let shared = MemoryHost::new();
    let id = ReplicaId::from_raw(1);
    sync_into(&mut sync, &src, &shared, id, ops[1]);
    sync_into(&mut sync, &src, &shared, id, ops[2]);
    assert_eq!(shared.op_count(), 3);

    let unrelated = MemoryHost::new();
    let other = ReplicaId::from_raw(2);
    sync_into(&mut sync, &src, &unrelated, other, ops[1]);
    sync_into(&mut sync, &src, &unrelated, other, ops[4]);
    assert_eq!(unrelated.op_count(), 4);
}

#[test]
fn source_changes_are_rewired_in_place() {
    let src = MemoryHost::new();
    let ops = commit_ops(&src, &[("A", 1, &[]), ("B", 2, &[]), ("Top", 0, &[0])]);
    let dest = MemoryHost::new();
    let mut sync = OpTreeSynchronizer::new();
    let id = ReplicaId::from_raw(3);
    let top = sync_into(&mut sync, &src, &dest, id, ops[2]);

    let mut txn = src.create_transaction();
    txn.set_op_inputs(ops[2], vec![ops[1]]);
    txn.set_op_args(ops[1], "B", Attr::Int(20));
    src.commit(txn);

    let again = sync_into(&mut sync, &src, &dest, id, ops[2]);
    assert_eq!(again, top);
    assert_eq!(dest.op_count(), 3);
    let inputs = dest.op_inputs(top);
    assert_eq!(inputs.len(), 1);
    assert_eq!(dest.op_args(inputs[0]), Some(("B".to_owned(), Attr::Int(20))));
}

#[test]
fn deep_chains_do_not_recurse() {
    let src = MemoryHost::new();
    let mut txn = src.create_transaction();
    let mut prev = txn.create_op();
    for _ in 0..50_000 {
        let op = txn.create_op();
        txn.set_op_inputs(op, vec![prev]);
        prev = op;
    }
    src.commit(txn);

    let dest = MemoryHost::new();
    let mut sync = OpTreeSynchronizer::new();
    let mut dest_txn = dest.create_transaction();
    sync.sync_from_op(&src, ReplicaId::from_raw(1), &mut dest_txn, prev);
    assert_eq!(sync.mapped_count(ReplicaId::from_raw(1)), 50_001);
}
