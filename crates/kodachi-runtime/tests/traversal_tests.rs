// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]
mod common;

use std::sync::Arc;

use common::{attr, client_with_locations};
use kodachi_runtime::{
    Attr, BuildMode, GroupAttr, KodachiRuntime, MemoryHostFactory, OpTreeBuilder, Traversal,
    ATTRIBUTE_SET, LOCATION_CREATE,
};

fn paths(client: &Arc<kodachi_runtime::Client>, parallel: bool) -> Vec<String> {
    Traversal::new(Arc::clone(client))
        .unwrap()
        .parallel(parallel)
        .run()
        .unwrap()
        .into_iter()
        .map(|l| l.path)
        .collect()
}

#[test]
fn traversal_visits_every_location_in_path_order() {
    let runtime = KodachiRuntime::create(MemoryHostFactory::default()).unwrap();
    let (client, _) = client_with_locations(
        &runtime,
        &["/root/world/geo/b", "/root/world/geo/a", "/root/cam"],
    );
    let expected = vec![
        "/root",
        "/root/cam",
        "/root/world",
        "/root/world/geo",
        "/root/world/geo/a",
        "/root/world/geo/b",
    ];
    assert_eq!(paths(&client, true), expected);
    assert_eq!(paths(&client, false), expected);
}

#[test]
fn traversal_can_start_below_the_root() {
    let runtime = KodachiRuntime::create(MemoryHostFactory::default()).unwrap();
    let (client, _) = client_with_locations(&runtime, &["/root/world/geo", "/root/cam"]);
    let found: Vec<String> = Traversal::new(Arc::clone(&client))
        .unwrap()
        .root("/root/world")
        .run()
        .unwrap()
        .into_iter()
        .map(|l| l.path)
        .collect();
    assert_eq!(found, vec!["/root/world", "/root/world/geo"]);

    let missing = Traversal::new(client).unwrap().root("/root/nope").run().unwrap();
    assert!(missing.is_empty());
}

#[test]
fn serial_marker_does_not_change_the_result() {
    let runtime = KodachiRuntime::create(MemoryHostFactory::default()).unwrap();
    let (client, op) = client_with_locations(&runtime, &["/root/world/a", "/root/world/b"]);
    let before = paths(&client, true);

    let mut txn = runtime.create_transaction();
    let marker = txn.create_op();
    txn.set_op_args(
        &marker,
        ATTRIBUTE_SET,
        attr(r#"{"location": "/root/world", "attrs": {"kodachi": {"parallelTraversal": 0}}}"#),
    );
    txn.set_op_inputs(&marker, &[op]);
    txn.set_client_op(&client, &marker);
    runtime.commit(&mut txn).unwrap();

    let world = client.cook_location("/root/world", false).unwrap();
    assert_eq!(
        world.attrs.get(kodachi_runtime::PARALLEL_TRAVERSAL_ATTR),
        Some(&Attr::Int(0))
    );
    assert_eq!(paths(&client, true), before);
}

#[test]
fn built_description_commits_and_cooks() {
    let builder = OpTreeBuilder::new();
    let create = builder.create_op();
    let mut locations = GroupAttr::new();
    locations.set("locations", vec!["/root/world/geo".to_owned()]);
    builder.set_op_args(create, LOCATION_CREATE, Attr::Group(locations));
    let stamp = builder.create_op();
    builder.set_op_args(
        stamp,
        ATTRIBUTE_SET,
        attr(r#"{"location": "/root/world/geo", "attrs": {"type": "polymesh"}}"#),
    );
    let terminal = builder.append_op(create, stamp);
    let description = builder.build(terminal, BuildMode::Flush).unwrap();
    assert_eq!(OpTreeBuilder::find_terminal_ops(&description), vec![stamp.id()]);

    let runtime = KodachiRuntime::create(MemoryHostFactory::default()).unwrap();
    let mut txn = runtime.create_transaction();
    let ops = txn.parse_graph(&description);
    assert_eq!(ops.len(), 2);
    let top = ops.iter().find(|op| op.id() == stamp.id()).unwrap();
    let client = txn.create_client();
    txn.set_client_op(&client, top);
    runtime.commit(&mut txn).unwrap();

    let found = Traversal::new(Arc::clone(&client)).unwrap().run().unwrap();
    let geo = found.iter().find(|l| l.path == "/root/world/geo").unwrap();
    assert_eq!(geo.attrs.get("type").and_then(Attr::as_str), Some("polymesh"));
    assert_eq!(top.inputs().unwrap()[0].id(), create.id());
}
