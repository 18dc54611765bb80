// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Graph files and the runtime they are committed to.
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use kodachi_runtime::{
    Client, GroupAttr, KodachiRuntime, MemoryHostFactory, OpId, OpTreeBuilder, RuntimeConfig,
};
use tracing::{debug, info};

/// Reads a graph description (an object keyed by op id) from `path`.
pub fn read_description(path: &Path) -> Result<GroupAttr> {
    let bytes = fs::read(path).with_context(|| format!("failed to read graph {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("graph {} is not a JSON object", path.display()))
}

/// Picks the op to cook: `requested` when given, otherwise the only op that
/// no other op consumes.
pub fn terminal_op(description: &GroupAttr, requested: Option<&str>) -> Result<OpId> {
    if let Some(text) = requested {
        let id = OpId::parse(text).with_context(|| format!("--op {text:?}"))?;
        if description.child(&id.to_string()).is_none() {
            bail!("op {id} is not in the graph");
        }
        return Ok(id);
    }
    match OpTreeBuilder::find_terminal_ops(description).as_slice() {
        [] => bail!("graph has no terminal op (empty or cyclic)"),
        [only] => Ok(*only),
        many => {
            let ids: Vec<String> = many.iter().map(ToString::to_string).collect();
            bail!(
                "graph has {} terminal ops ({}); pick one with --op",
                many.len(),
                ids.join(", ")
            )
        }
    }
}

/// Creates a runtime for `config` backed by the in-memory host.
pub fn create_runtime(config: &RuntimeConfig) -> Result<Arc<KodachiRuntime>> {
    let factory = MemoryHostFactory::with_root(config.root_location_path.clone());
    KodachiRuntime::with_config(factory, config.clone()).context("failed to create runtime")
}

/// A committed graph and the client bound to its terminal op.
pub struct LoadedGraph {
    /// Runtime holding the committed graph.
    pub runtime: Arc<KodachiRuntime>,
    /// Client cooking the terminal op.
    pub client: Arc<Client>,
}

/// Loads `path`, commits it and binds a client to the terminal op.
pub fn load(path: &Path, requested: Option<&str>, config: &RuntimeConfig) -> Result<LoadedGraph> {
    let description = read_description(path)?;
    let terminal = terminal_op(&description, requested)?;
    let runtime = create_runtime(config)?;

    let mut txn = runtime.create_transaction();
    let ops = txn.parse_graph(&description);
    let Some(op) = ops.iter().find(|op| op.id() == terminal) else {
        bail!("op {terminal} could not be staged");
    };
    let client = txn.create_client();
    txn.set_client_op(&client, op);
    debug!(ops = ops.len(), %terminal, "staged graph");
    let version = runtime.commit(&mut txn)?;
    info!(version = version.value(), graph = %path.display(), "graph committed");

    Ok(LoadedGraph { runtime, client })
}
