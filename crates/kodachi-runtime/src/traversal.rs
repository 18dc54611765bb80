// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scenegraph expansion through a [`Client`].
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use tracing::debug;

use crate::attr::Attr;
use crate::client::Client;
use crate::error::RuntimeError;
use crate::host::LocationData;

/// Location attribute that, when set to `0`, makes a traversal visit that
/// location's children one at a time.
pub const PARALLEL_TRAVERSAL_ATTR: &str = "kodachi.parallelTraversal";

/// Expands every location below a root by cooking it through a client.
///
/// Children are cooked in parallel on the rayon pool, so every worker
/// thread involved gets its own replica of the client's op tree.
#[derive(Debug, Clone)]
pub struct Traversal {
    client: Arc<Client>,
    root: String,
    parallel: bool,
    evict: bool,
}

impl Traversal {
    /// Traversal rooted at the runtime's scenegraph root.
    pub fn new(client: Arc<Client>) -> Result<Self, RuntimeError> {
        let runtime = client.runtime().ok_or(RuntimeError::RuntimeExpired)?;
        Ok(Self {
            root: runtime.root_location_path(),
            parallel: runtime.config().parallel_traversal,
            evict: false,
            client,
        })
    }

    /// Starts the traversal at `path` instead.
    #[must_use]
    pub fn root(mut self, path: impl Into<String>) -> Self {
        self.root = path.into();
        self
    }

    /// Enables or disables parallel child expansion.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Evicts each location from the replica cache after cooking it.
    #[must_use]
    pub fn evict(mut self, evict: bool) -> Self {
        self.evict = evict;
        self
    }

    /// Cooks the root and all its descendants; returns the existing ones
    /// sorted by path.
    pub fn run(&self) -> Result<Vec<LocationData>, RuntimeError> {
        let found = Mutex::new(Vec::new());
        self.expand(&self.root, &found)?;
        let mut locations = found.into_inner().unwrap_or_else(PoisonError::into_inner);
        locations.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(root = %self.root, locations = locations.len(), "traversal complete");
        Ok(locations)
    }

    fn expand(&self, path: &str, found: &Mutex<Vec<LocationData>>) -> Result<(), RuntimeError> {
        let data = self.client.cook_location(path, self.evict)?;
        if !data.exists {
            return Ok(());
        }
        let children: Vec<String> = data.child_paths().collect();
        let parallel = self.parallel
            && data.attrs.get(PARALLEL_TRAVERSAL_ATTR).and_then(Attr::as_int) != Some(0);
        found
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data);

        if parallel {
            children
                .par_iter()
                .try_for_each(|child| self.expand(child, found))
        } else {
            children
                .iter()
                .try_for_each(|child| self.expand(child, found))
        }
    }
}
