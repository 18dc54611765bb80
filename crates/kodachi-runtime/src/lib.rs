// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! kodachi-runtime: transactional op graph with lazily synchronized
//! per-thread replicas.
//!
//! Callers stage graph edits in a [`Transaction`] and apply them with
//! [`KodachiRuntime::commit`], which mutates one canonical host graph under a
//! mutex and bumps the commit version. A [`Client`] cooks locations on a
//! replica host owned by the calling thread; the replica is brought up to
//! the latest commit on first use after that commit, by copying only the op
//! tree the client cooks ([`OpTreeSynchronizer`]).
//!
//! The host engine is reached through the [`HostRuntime`] port.
//! [`MemoryHost`] is the in-memory reference implementation.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::significant_drop_tightening
)]

mod attr;
mod cache;
mod client;
/// Runtime configuration and config storage.
pub mod config;
mod error;
mod host;
mod memory_host;
mod op;
mod op_id;
mod runtime;
mod sync;
mod transaction;
mod traversal;
mod tree_builder;

/// Attribute values and their digests.
pub use attr::{Attr, GroupAttr, Hash};
/// Explicit cache registry.
pub use cache::{Cache, CacheRegistry, CacheStats, MemoryCache};
pub use client::Client;
pub use config::{ConfigError, RuntimeConfig};
pub use error::RuntimeError;
/// Host engine port.
pub use host::{
    CommitId, HandleAllocator, HostEdit, HostError, HostFactory, HostRuntime, HostTransaction,
    LocationData, LocationEvent, NativeClientId, NativeOpId,
};
/// In-memory reference host and its op types.
pub use memory_host::{
    MemoryHost, MemoryHostFactory, ATTRIBUTE_SET, LOCATION_CREATE, NO_OP, PRUNE, ROOT_LOCATION,
};
pub use op::Op;
pub use op_id::{OpId, OpIdError};
pub use runtime::{KodachiRuntime, DESCRIBE_OP_CACHE};
pub use sync::{OpTreeSynchronizer, ReplicaId};
pub use transaction::Transaction;
pub use traversal::{Traversal, PARALLEL_TRAVERSAL_ATTR};
pub use tree_builder::{BuildMode, OpTreeBuilder, TreeBuilderError, TreeOp, DEFAULT_OP_TYPE};
