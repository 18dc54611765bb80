// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory reference host used by tools and tests.
//!
//! Each op cooks a whole scene (location path to attributes): input scenes
//! are merged in input order, later inputs winning on attribute conflicts,
//! and then the op's own effect is applied. Every scene contains the root
//! location.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use blake3::Hasher;
use tracing::{debug, warn};

use crate::attr::{Attr, GroupAttr, Hash};
use crate::host::{
    CommitId, HandleAllocator, HostEdit, HostError, HostFactory, HostRuntime, HostTransaction,
    LocationData, LocationEvent, NativeClientId, NativeOpId,
};

/// Default scenegraph root location.
pub const ROOT_LOCATION: &str = "/root";

/// Op type that passes its merged inputs through unchanged.
pub const NO_OP: &str = "no-op";
/// Op type that creates locations (`location` or `locations` arg) and their ancestors.
pub const LOCATION_CREATE: &str = "LocationCreate";
/// Op type that merges `attrs` into `location` (default: the root).
pub const ATTRIBUTE_SET: &str = "AttributeSet";
/// Op type that removes `location` and its descendants.
pub const PRUNE: &str = "Prune";

type Scene = BTreeMap<String, GroupAttr>;

#[derive(Debug, Clone)]
struct OpNode {
    op_type: String,
    args: Attr,
    inputs: Vec<NativeOpId>,
}

impl Default for OpNode {
    fn default() -> Self {
        Self {
            op_type: NO_OP.to_owned(),
            args: Attr::Null,
            inputs: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct ClientState {
    op: Option<NativeOpId>,
    active: BTreeSet<String>,
    delivered: HashMap<String, Hash>,
}

#[derive(Debug, Default)]
struct State {
    ops: HashMap<NativeOpId, OpNode>,
    clients: HashMap<NativeClientId, ClientState>,
    commit: CommitId,
    options: Attr,
    scenes: HashMap<NativeOpId, Arc<Scene>>,
    locations: HashMap<(NativeOpId, String), LocationData>,
    cook_count: u64,
}

/// In-memory host instance.
#[derive(Debug)]
pub struct MemoryHost {
    root: String,
    handles: Arc<HandleAllocator>,
    state: Mutex<State>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::with_root(ROOT_LOCATION)
    }
}

impl MemoryHost {
    /// Creates an empty host rooted at [`ROOT_LOCATION`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty host rooted at `root`.
    #[must_use]
    pub fn with_root(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            handles: HandleAllocator::new(),
            state: Mutex::new(State {
                options: Attr::Group(GroupAttr::new()),
                ..State::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of ops committed to this instance.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.state().ops.len()
    }

    /// Number of clients committed to this instance.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.state().clients.len()
    }

    /// Number of location cooks that missed the cache.
    #[must_use]
    pub fn cook_count(&self) -> u64 {
        self.state().cook_count
    }

    /// Latest commit version of this instance.
    #[must_use]
    pub fn commit_id(&self) -> CommitId {
        self.state().commit
    }

    fn apply(state: &mut State, edit: HostEdit) {
        match edit {
            HostEdit::CreateOp(op) => {
                state.ops.entry(op).or_default();
            }
            HostEdit::SetOpArgs { op, op_type, args } => match state.ops.get_mut(&op) {
                Some(node) => {
                    node.op_type = op_type;
                    node.args = args;
                }
                None => warn!(?op, "set_op_args on unknown op"),
            },
            HostEdit::SetOpInputs { op, inputs } => match state.ops.get_mut(&op) {
                Some(node) => node.inputs = inputs,
                None => warn!(?op, "set_op_inputs on unknown op"),
            },
            HostEdit::CreateClient(client) => {
                state.clients.entry(client).or_default();
            }
            HostEdit::SetClientOp { client, op } => {
                if !state.ops.contains_key(&op) {
                    warn!(?client, ?op, "set_client_op with unknown op");
                    return;
                }
                match state.clients.get_mut(&client) {
                    Some(c) => c.op = Some(op),
                    None => warn!(?client, "set_client_op on unknown client"),
                }
            }
            HostEdit::DestroyClient(client) => {
                if state.clients.remove(&client).is_none() {
                    debug!(?client, "destroy_client on unknown client");
                }
            }
        }
    }

    fn cook_scene(&self, state: &mut State, root_op: NativeOpId) -> Arc<Scene> {
        if let Some(scene) = state.scenes.get(&root_op) {
            return Arc::clone(scene);
        }
        // Post-order walk with an explicit stack; inputs are cooked first.
        let mut stack = vec![(root_op, false)];
        let mut in_progress = HashSet::new();
        while let Some((op, expanded)) = stack.pop() {
            if state.scenes.contains_key(&op) {
                continue;
            }
            let Some(node) = state.ops.get(&op) else {
                continue;
            };
            if !expanded {
                if !in_progress.insert(op) {
                    continue;
                }
                stack.push((op, true));
                for input in node.inputs.iter().rev() {
                    if !state.scenes.contains_key(input) && !in_progress.contains(input) {
                        stack.push((*input, false));
                    }
                }
                continue;
            }
            let mut scene = Scene::new();
            scene.insert(self.root.clone(), GroupAttr::new());
            for input in &node.inputs {
                if let Some(input_scene) = state.scenes.get(input) {
                    for (path, attrs) in input_scene.iter() {
                        scene.entry(path.clone()).or_default().deep_merge(attrs);
                    }
                }
            }
            self.apply_op(&mut scene, &node.op_type, &node.args);
            in_progress.remove(&op);
            state.scenes.insert(op, Arc::new(scene));
        }
        state
            .scenes
            .get(&root_op)
            .cloned()
            .unwrap_or_else(|| Arc::new(Scene::from([(self.root.clone(), GroupAttr::new())])))
    }

    fn apply_op(&self, scene: &mut Scene, op_type: &str, args: &Attr) {
        let args_group = args.as_group();
        let location = args_group
            .and_then(|g| g.child("location"))
            .and_then(Attr::as_str);
        match op_type {
            NO_OP => {}
            LOCATION_CREATE => {
                let paths = args_group
                    .and_then(|g| g.child("location").or_else(|| g.child("locations")))
                    .and_then(Attr::as_strings)
                    .unwrap_or_default();
                for path in paths {
                    self.create_location(scene, path);
                }
            }
            ATTRIBUTE_SET => {
                let target = location.unwrap_or(&self.root);
                let attrs = args_group
                    .and_then(|g| g.child("attrs"))
                    .and_then(Attr::as_group);
                if let (Some(existing), Some(attrs)) = (scene.get_mut(target), attrs) {
                    existing.deep_merge(attrs);
                }
            }
            PRUNE => match location {
                Some(path) if path != self.root => {
                    let prefix = format!("{path}/");
                    scene.retain(|p, _| p != path && !p.starts_with(&prefix));
                }
                Some(_) => warn!("refusing to prune the root location"),
                None => {}
            },
            other => {
                if let Some(root) = scene.get_mut(&self.root) {
                    root.set(&format!("opArgs.{other}"), args.clone());
                }
            }
        }
    }

    fn create_location(&self, scene: &mut Scene, path: &str) {
        let Some(rest) = path.strip_prefix(self.root.as_str()) else {
            warn!(path, root = %self.root, "location is outside the scenegraph root");
            return;
        };
        if !(rest.is_empty() || rest.starts_with('/')) {
            warn!(path, root = %self.root, "location is outside the scenegraph root");
            return;
        }
        let mut current = self.root.clone();
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            scene.entry(current.clone()).or_default();
        }
    }

    fn location_data(scene: &Scene, path: &str) -> LocationData {
        let Some(attrs) = scene.get(path) else {
            return LocationData::missing(path);
        };
        let prefix = format!("{path}/");
        let potential_children: Vec<String> = scene
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter_map(|(p, _)| {
                let name = &p[prefix.len()..];
                (!name.contains('/')).then(|| name.to_owned())
            })
            .collect();

        let mut hasher = Hasher::new();
        hasher.update(b"location:");
        hasher.update(&(path.len() as u64).to_le_bytes());
        hasher.update(path.as_bytes());
        attrs.hash_into(&mut hasher);
        hasher.update(&(potential_children.len() as u64).to_le_bytes());
        for child in &potential_children {
            hasher.update(&(child.len() as u64).to_le_bytes());
            hasher.update(child.as_bytes());
        }

        LocationData {
            path: path.to_owned(),
            hash: hasher.finalize().into(),
            exists: true,
            attrs: attrs.clone(),
            potential_children,
        }
    }

    fn cook_locked(&self, state: &mut State, op: Option<NativeOpId>, path: &str) -> LocationData {
        let Some(op) = op else {
            return LocationData::missing(path);
        };
        let key = (op, path.to_owned());
        if let Some(hit) = state.locations.get(&key) {
            return hit.clone();
        }
        state.cook_count += 1;
        let scene = self.cook_scene(state, op);
        let data = Self::location_data(&scene, path);
        state.locations.insert(key, data.clone());
        data
    }
}

impl HostRuntime for MemoryHost {
    fn create_transaction(&self) -> HostTransaction {
        HostTransaction::new(Arc::clone(&self.handles))
    }

    fn commit(&self, txn: HostTransaction) -> CommitId {
        let mut state = self.state();
        for edit in txn.into_edits() {
            Self::apply(&mut state, edit);
        }
        state.commit = state.commit.next();
        state.scenes.clear();
        state.locations.clear();
        debug!(commit = %state.commit, ops = state.ops.len(), "memory host commit");
        state.commit
    }

    fn op_args(&self, op: NativeOpId) -> Option<(String, Attr)> {
        self.state()
            .ops
            .get(&op)
            .map(|node| (node.op_type.clone(), node.args.clone()))
    }

    fn op_inputs(&self, op: NativeOpId) -> Vec<NativeOpId> {
        self.state()
            .ops
            .get(&op)
            .map(|node| node.inputs.clone())
            .unwrap_or_default()
    }

    fn client_op(&self, client: NativeClientId) -> Option<NativeOpId> {
        self.state().clients.get(&client).and_then(|c| c.op)
    }

    fn cook_location(&self, client: NativeClientId, path: &str) -> Result<LocationData, HostError> {
        let mut state = self.state();
        let op = state
            .clients
            .get(&client)
            .ok_or(HostError::UnknownClient(client))?
            .op;
        Ok(self.cook_locked(&mut state, op, path))
    }

    fn set_locations_active(&self, client: NativeClientId, paths: &[String]) -> Result<(), HostError> {
        let mut state = self.state();
        let entry = state
            .clients
            .get_mut(&client)
            .ok_or(HostError::UnknownClient(client))?;
        entry.active.extend(paths.iter().cloned());
        Ok(())
    }

    fn location_events(&self, client: NativeClientId, max: usize) -> Result<Vec<LocationEvent>, HostError> {
        let mut state = self.state();
        let (op, active) = {
            let entry = state
                .clients
                .get(&client)
                .ok_or(HostError::UnknownClient(client))?;
            (entry.op, entry.active.iter().cloned().collect::<Vec<_>>())
        };
        let mut events = Vec::new();
        for path in active {
            if events.len() >= max {
                break;
            }
            let data = self.cook_locked(&mut state, op, &path);
            let Some(entry) = state.clients.get_mut(&client) else {
                break;
            };
            if entry.delivered.get(&path) == Some(&data.hash) {
                continue;
            }
            entry.delivered.insert(path.clone(), data.hash);
            events.push(LocationEvent {
                path,
                data: Some(data),
            });
        }
        Ok(events)
    }

    fn evict(&self, path: &str) {
        self.state().locations.retain(|(_, p), _| p != path);
    }

    fn flush_caches(&self) {
        let mut state = self.state();
        state.scenes.clear();
        state.locations.clear();
    }

    fn options(&self) -> Attr {
        self.state().options.clone()
    }

    fn set_options(&self, options: Attr) {
        self.state().options = options;
    }

    fn describe_op(&self, op_type: &str) -> Attr {
        let (description, args): (&str, &[&str]) = match op_type {
            NO_OP => ("Passes its merged inputs through unchanged.", &[]),
            LOCATION_CREATE => (
                "Creates locations and their ancestors.",
                &["location", "locations"],
            ),
            ATTRIBUTE_SET => (
                "Merges attrs into a location (default: the root).",
                &["location", "attrs"],
            ),
            PRUNE => ("Removes a location and its descendants.", &["location"]),
            _ => return Attr::Null,
        };
        let mut group = GroupAttr::new();
        group.set("opType", op_type);
        group.set("description", description);
        group.set(
            "args",
            Attr::StringArray(args.iter().map(|s| (*s).to_owned()).collect()),
        );
        Attr::Group(group)
    }

    fn registered_op_types(&self) -> Vec<String> {
        [NO_OP, LOCATION_CREATE, ATTRIBUTE_SET, PRUNE]
            .iter()
            .map(|s| (*s).to_owned())
            .collect()
    }

    fn is_processing(&self) -> bool {
        false
    }

    fn root_location_path(&self) -> String {
        self.root.clone()
    }
}

/// Factory producing fresh [`MemoryHost`] instances.
#[derive(Debug, Clone)]
pub struct MemoryHostFactory {
    root: String,
}

impl Default for MemoryHostFactory {
    fn default() -> Self {
        Self {
            root: ROOT_LOCATION.to_owned(),
        }
    }
}

impl MemoryHostFactory {
    /// Factory for hosts rooted at `root`.
    #[must_use]
    pub fn with_root(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
}

impl HostFactory for MemoryHostFactory {
    fn create_host(&self) -> Result<Arc<dyn HostRuntime>, HostError> {
        Ok(Arc::new(MemoryHost::with_root(self.root.clone())))
    }
}
