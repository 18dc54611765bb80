// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use kodachi_runtime::config::{ConfigService, FsConfigStore};
use kodachi_runtime::{LocationData, RuntimeConfig, Traversal};
use serde_json::{json, Value};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::cull;
use crate::graph::{self, LoadedGraph};

/// Command line of the `kodachi` binary.
#[derive(Parser)]
#[command(name = "kodachi")]
#[command(about = "Cook, traverse and cull Kodachi op graphs")]
#[command(version)]
pub struct Cli {
    /// Runtime config file (JSON); defaults to the stored user config
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// `kodachi` subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Cook locations and print them as JSON
    Cook {
        /// Graph description (JSON object keyed by op id)
        graph: PathBuf,
        /// Locations to cook; defaults to the scenegraph root
        #[arg(long = "location")]
        locations: Vec<String>,
        /// Op to cook when the graph has several terminal ops
        #[arg(long)]
        op: Option<String>,
        /// Evict each location from the cache after cooking it
        #[arg(long)]
        evict: bool,
    },
    /// Print every existing location below the root, one per line
    Traverse {
        /// Graph description (JSON object keyed by op id)
        graph: PathBuf,
        /// Location to start from
        #[arg(long)]
        root: Option<String>,
        /// Cook children one at a time
        #[arg(long)]
        serial: bool,
        /// Op to cook when the graph has several terminal ops
        #[arg(long)]
        op: Option<String>,
    },
    /// Classify bounded locations against a camera frustum
    Cull {
        /// Graph description (JSON object keyed by op id)
        graph: PathBuf,
        /// Camera location providing `geometry` and `xform.matrix`
        #[arg(long)]
        camera: String,
        /// Grows the frustum window by this amount
        #[arg(long, default_value = "0")]
        padding: f64,
        /// Location to start from
        #[arg(long)]
        root: Option<String>,
        /// Op to cook when the graph has several terminal ops
        #[arg(long)]
        op: Option<String>,
    },
    /// List op types, or describe the named ones as JSON
    Describe {
        /// Op types to describe
        op_types: Vec<String>,
    },
}

/// Parses the command line, sets up logging and runs the command.
pub fn entrypoint() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the runtime config from `path`, or from the user's config store.
///
/// A broken user store is logged and replaced by the defaults; an explicit
/// file that cannot be read is an error.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    if let Some(path) = path {
        return RuntimeConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    let stored =
        FsConfigStore::new().and_then(|store| RuntimeConfig::load(&ConfigService::new(store)));
    Ok(stored.unwrap_or_else(|err| {
        warn!(%err, "falling back to the default runtime config");
        RuntimeConfig::default()
    }))
}

/// Runs a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    debug!(root = %config.root_location_path, "runtime config loaded");

    match cli.command {
        Commands::Cook {
            graph,
            locations,
            op,
            evict,
        } => {
            let LoadedGraph { runtime, client } = graph::load(&graph, op.as_deref(), &config)?;
            let paths = if locations.is_empty() {
                vec![runtime.root_location_path()]
            } else {
                locations
            };
            let mut cooked = Vec::with_capacity(paths.len());
            for path in &paths {
                cooked.push(location_json(&client.cook_location(path, evict)?)?);
            }
            println!("{}", serde_json::to_string_pretty(&cooked)?);
        }
        Commands::Traverse {
            graph,
            root,
            serial,
            op,
        } => {
            let LoadedGraph { runtime: _runtime, client } =
                graph::load(&graph, op.as_deref(), &config)?;
            let mut traversal = Traversal::new(client)?;
            if let Some(root) = root {
                traversal = traversal.root(root);
            }
            if serial {
                traversal = traversal.parallel(false);
            }
            for location in traversal.run()? {
                println!("{}", location.path);
            }
        }
        Commands::Cull {
            graph,
            camera,
            padding,
            root,
            op,
        } => {
            let LoadedGraph { runtime: _runtime, client } =
                graph::load(&graph, op.as_deref(), &config)?;
            let frustum = cull::camera_frustum(&client, &camera, padding)?;
            for (path, result) in cull::cull(&client, &frustum, root.as_deref())? {
                println!("{path}\t{}", cull::label(result));
            }
        }
        Commands::Describe { op_types } => {
            let runtime = graph::create_runtime(&config)?;
            if op_types.is_empty() {
                for op_type in runtime.registered_op_types() {
                    println!("{op_type}");
                }
            } else {
                let mut described = serde_json::Map::new();
                for op_type in op_types {
                    let description = serde_json::to_value(runtime.describe_op(&op_type))?;
                    described.insert(op_type, description);
                }
                println!("{}", serde_json::to_string_pretty(&described)?);
            }
        }
    }
    Ok(())
}

fn location_json(location: &LocationData) -> Result<Value> {
    Ok(json!({
        "path": location.path,
        "exists": location.exists,
        "hash": hex::encode(location.hash),
        "attrs": serde_json::to_value(&location.attrs)?,
        "children": location.potential_children,
    }))
}
