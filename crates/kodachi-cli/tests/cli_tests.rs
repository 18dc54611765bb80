// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]
use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CREATE: &str = "00000000-0000-4000-8000-000000000001";
const CAMERA: &str = "00000000-0000-4000-8000-000000000002";
const BOUNDS: &str = "00000000-0000-4000-8000-000000000003";
const STRAY: &str = "00000000-0000-4000-8000-000000000004";
const FAR: &str = "00000000-0000-4000-8000-000000000005";
const WIDE: &str = "00000000-0000-4000-8000-000000000006";

/// Camera at the origin looking down -z, with three bounded boxes: one in
/// view, one past the far plane and one straddling the side planes.
fn scene_graph() -> String {
    let set_bound = |id: &str, location: &str, bound: &str, input: &str| {
        format!(
            r#""{id}": {{
    "opType": "AttributeSet",
    "opArgs": {{ "location": "{location}", "attrs": {{ "bound": {bound} }} }},
    "opInputs": ["{input}"]
  }}"#
        )
    };
    format!(
        r#"{{
  "{CREATE}": {{
    "opType": "LocationCreate",
    "opArgs": {{ "locations": ["/root/world/cam", "/root/world/near", "/root/world/far", "/root/world/wide"] }}
  }},
  "{CAMERA}": {{
    "opType": "AttributeSet",
    "opArgs": {{
      "location": "/root/world/cam",
      "attrs": {{ "geometry": {{ "fov": 90, "near": 1, "far": 20, "left": -1, "right": 1, "bottom": -1, "top": 1 }} }}
    }},
    "opInputs": ["{CREATE}"]
  }},
  {near},
  {far},
  {wide}
}}"#,
        near = set_bound(BOUNDS, "/root/world/near", "[-1, 1, -1, 1, -6, -4]", CAMERA),
        far = set_bound(FAR, "/root/world/far", "[-1, 1, -1, 1, -40, -30]", BOUNDS),
        wide = set_bound(WIDE, "/root/world/wide", "[-10, 10, -1, 1, -6, -4]", FAR),
    )
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn kodachi(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kodachi").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn describe_lists_registered_op_types() {
    let dir = TempDir::new().unwrap();
    kodachi(&dir)
        .arg("describe")
        .assert()
        .success()
        .stdout(predicate::str::contains("LocationCreate"))
        .stdout(predicate::str::contains("AttributeSet"))
        .stdout(predicate::str::contains("Prune"));
}

#[test]
fn describe_prints_json_for_named_types() {
    let dir = TempDir::new().unwrap();
    let output = kodachi(&dir)
        .args(["describe", "Prune", "Bogus"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["Prune"]["opType"], "Prune");
    assert_eq!(json["Prune"]["args"][0], "location");
    assert!(json["Bogus"].is_null());
}

#[test]
fn cook_prints_location_json() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "graph.json", &scene_graph());
    let output = kodachi(&dir)
        .arg("cook")
        .arg(&graph)
        .args(["--location", "/root/world/near", "--location", "/root/nowhere"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let near = &json[0];
    assert_eq!(near["path"], "/root/world/near");
    assert_eq!(near["exists"], true);
    assert_eq!(near["hash"].as_str().unwrap().len(), 64);
    assert_eq!(near["attrs"]["bound"][4], -6.0);

    assert_eq!(json[1]["path"], "/root/nowhere");
    assert_eq!(json[1]["exists"], false);
}

#[test]
fn cook_defaults_to_the_root_location() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "graph.json", &scene_graph());
    kodachi(&dir)
        .arg("cook")
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""path": "/root""#))
        .stdout(predicate::str::contains(r#""world""#));
}

#[test]
fn traverse_prints_paths_in_order() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "graph.json", &scene_graph());
    let expected = "/root\n/root/world\n/root/world/cam\n/root/world/far\n/root/world/near\n/root/world/wide\n";
    kodachi(&dir)
        .arg("traverse")
        .arg(&graph)
        .assert()
        .success()
        .stdout(expected);
    kodachi(&dir)
        .arg("traverse")
        .arg(&graph)
        .arg("--serial")
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn traverse_from_a_sub_root() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "graph.json", &scene_graph());
    kodachi(&dir)
        .arg("traverse")
        .arg(&graph)
        .args(["--root", "/root/world/cam"])
        .assert()
        .success()
        .stdout("/root/world/cam\n");
}

#[test]
fn cull_classifies_bounds_against_the_camera() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "graph.json", &scene_graph());
    kodachi(&dir)
        .arg("cull")
        .arg(&graph)
        .args(["--camera", "/root/world/cam"])
        .assert()
        .success()
        .stdout(
            "/root/world/far\toutside\n/root/world/near\tinside\n/root/world/wide\tintersects\n",
        );
}

#[test]
fn cull_rejects_a_location_without_camera_geometry() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "graph.json", &scene_graph());
    kodachi(&dir)
        .arg("cull")
        .arg(&graph)
        .args(["--camera", "/root/world/near"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("needs geometry"));
}

#[test]
fn missing_graph_file_fails() {
    let dir = TempDir::new().unwrap();
    kodachi(&dir)
        .arg("traverse")
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read graph"));
}

#[test]
fn several_terminal_ops_need_an_explicit_op() {
    let dir = TempDir::new().unwrap();
    let graph = format!(
        r#"{{
  "{CREATE}": {{ "opType": "LocationCreate", "opArgs": {{ "location": "/root/a" }} }},
  "{STRAY}": {{ "opType": "LocationCreate", "opArgs": {{ "location": "/root/b" }} }}
}}"#
    );
    let graph = write(dir.path(), "graph.json", &graph);

    kodachi(&dir)
        .arg("traverse")
        .arg(&graph)
        .assert()
        .failure()
        .stderr(predicate::str::contains("pick one with --op"));

    kodachi(&dir)
        .arg("traverse")
        .arg(&graph)
        .args(["--op", STRAY])
        .assert()
        .success()
        .stdout("/root\n/root/b\n");
}

#[test]
fn config_file_moves_the_scenegraph_root() {
    let dir = TempDir::new().unwrap();
    let config = write(
        dir.path(),
        "config.json",
        r#"{ "root_location_path": "/scene", "parallel_traversal": false }"#,
    );
    let graph = format!(
        r#"{{ "{CREATE}": {{ "opType": "LocationCreate", "opArgs": {{ "location": "/scene/cam" }} }} }}"#
    );
    let graph = write(dir.path(), "graph.json", &graph);
    kodachi(&dir)
        .arg("--config")
        .arg(&config)
        .arg("traverse")
        .arg(&graph)
        .assert()
        .success()
        .stdout("/scene\n/scene/cam\n");
}

#[test]
fn unreadable_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let config = write(dir.path(), "config.json", "{ not json");
    kodachi(&dir)
        .args(["--config"])
        .arg(&config)
        .arg("describe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
