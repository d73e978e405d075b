// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem engine for termfs core

#[cfg(feature = "events")]
use std::collections::HashMap;
#[cfg(feature = "events")]
use std::sync::Arc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{FsConfig, SeedLayout};
use crate::error::{FsError, FsResult};
use crate::events::EventKind;
#[cfg(feature = "events")]
use crate::events::{EventSink, SubscriptionId};
use crate::identity::{GroupRecord, IdentityDb, UserRecord};
use crate::node::{Node, NodeKind, NodeStore, StoredNode};
use crate::path;
use crate::permissions;
use crate::types::{Actor, Capability, DirEntry, Mode, NodeId, NodeInfo};

/// Tree plus identity maps, guarded together so every operation sees and
/// leaves a consistent state.
struct FsState {
    store: NodeStore,
    identities: IdentityDb,
}

impl FsState {
    fn node(&self, id: NodeId) -> FsResult<&Node> {
        self.store.get(id).ok_or(FsError::NotFound)
    }

    fn node_mut(&mut self, id: NodeId) -> FsResult<&mut Node> {
        self.store.get_mut(id).ok_or(FsError::NotFound)
    }

    fn allowed(&self, enforce: bool, id: NodeId, actor: &Actor, capability: Capability) -> bool {
        if !enforce {
            return true;
        }
        self.store
            .get(id)
            .is_some_and(|node| permissions::allowed(node, actor, &self.identities, capability))
    }

    fn require(
        &self,
        enforce: bool,
        id: NodeId,
        actor: &Actor,
        capability: Capability,
    ) -> FsResult<()> {
        if self.allowed(enforce, id, actor, capability) {
            Ok(())
        } else {
            debug!(user = %actor.name, node = %id, ?capability, "permission denied");
            Err(FsError::PermissionDenied)
        }
    }

    /// Parent directory id and entry name for a canonical path.
    fn parent_dir(&self, canonical: &str) -> FsResult<(NodeId, String)> {
        if canonical == "/" {
            return Err(FsError::InvalidArgument);
        }
        let parent = self
            .store
            .lookup(&path::parent_path(canonical))
            .ok_or(FsError::NotFound)?;
        if !self.node(parent)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok((parent, path::basename(canonical)))
    }

    /// Where a copy or move of `src` lands when asked to go to `dst`: inside
    /// `dst` under the source's name if `dst` is an existing directory.
    fn landing_path(&self, src: &str, dst: &str) -> String {
        match self.store.lookup(dst).and_then(|id| self.store.get(id)) {
            Some(node) if node.is_dir() => path::join(dst, &path::basename(src)),
            _ => dst.to_string(),
        }
    }

    /// For link creation at `name` in `parent`: whether an existing entry
    /// will be replaced.
    fn link_destination(
        &self,
        parent: NodeId,
        name: &str,
        linking: Option<NodeId>,
        force: bool,
    ) -> FsResult<bool> {
        let Some(existing) = self.store.child(parent, name) else {
            return Ok(false);
        };
        if !force {
            return Err(FsError::AlreadyExists);
        }
        if self.node(existing)?.is_dir() {
            return Err(FsError::IsADirectory);
        }
        // Re-linking a name to the node it already names changes nothing
        Ok(linking != Some(existing))
    }
}

/// Serializable image of the whole tree and identity maps
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsSnapshot {
    root: NodeId,
    nodes: Vec<StoredNode>,
    identities: IdentityDb,
}

impl FsSnapshot {
    pub fn to_json(&self) -> FsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> FsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// The main filesystem core implementation
pub struct FsCore {
    config: FsConfig,
    state: Mutex<FsState>,
    #[cfg(feature = "events")]
    next_subscription_id: Mutex<u64>,
    #[cfg(feature = "events")]
    event_subscriptions: Mutex<HashMap<SubscriptionId, Arc<dyn EventSink>>>,
}

impl FsCore {
    /// Create a tree containing `/`, the root account and the configured seed
    /// layout.
    pub fn new(config: FsConfig) -> FsResult<Self> {
        let mut identities = IdentityDb::new();
        if !config.seed.groups.iter().any(|g| g.name == "root") {
            identities.add_group("root", 0)?;
        }
        if !config.seed.users.iter().any(|u| u.name == "root") {
            identities.add_user(
                "root",
                UserRecord {
                    uid: 0,
                    gid: 0,
                    home: "/root".to_string(),
                    shell: "/bin/bash".to_string(),
                    locked: false,
                },
            )?;
        }

        let root = Node::directory(Mode::DIRECTORY, "root", "root", Utc::now());
        let mut state = FsState {
            store: NodeStore::new(root),
            identities,
        };
        Self::apply_seed(&mut state, &config.seed, config.defaults.directory_mode)?;

        info!(
            nodes = state.store.len(),
            enforce_permissions = config.security.enforce_permissions,
            "filesystem initialized"
        );
        Ok(Self::from_state(config, state))
    }

    /// Restore a tree previously captured with [`FsCore::snapshot`].
    pub fn from_snapshot(config: FsConfig, snapshot: FsSnapshot) -> FsResult<Self> {
        let store = NodeStore::from_parts(snapshot.root, snapshot.nodes)?;
        let state = FsState {
            store,
            identities: snapshot.identities,
        };
        info!(nodes = state.store.len(), "filesystem restored from snapshot");
        Ok(Self::from_state(config, state))
    }

    fn from_state(config: FsConfig, state: FsState) -> Self {
        Self {
            config,
            state: Mutex::new(state),
            #[cfg(feature = "events")]
            next_subscription_id: Mutex::new(1),
            #[cfg(feature = "events")]
            event_subscriptions: Mutex::new(HashMap::new()),
        }
    }

    fn apply_seed(state: &mut FsState, seed: &SeedLayout, directory_mode: Mode) -> FsResult<()> {
        for group in &seed.groups {
            state.identities.add_group(&group.name, group.gid)?;
        }
        for user in &seed.users {
            state.identities.add_user(
                &user.name,
                UserRecord {
                    uid: user.uid,
                    gid: user.gid,
                    home: user.home.clone(),
                    shell: user.shell.clone(),
                    locked: false,
                },
            )?;
        }
        for group in &seed.groups {
            for member in &group.members {
                state.identities.add_member(&group.name, member)?;
            }
        }

        for dir in &seed.directories {
            if state.identities.user(&dir.owner).is_none() {
                return Err(FsError::NoSuchUser(dir.owner.clone()));
            }
            if state.identities.group(&dir.group).is_none() {
                return Err(FsError::NoSuchGroup(dir.group.clone()));
            }
            let now = Utc::now();
            let mut current = state.store.root();
            for segment in path::segments(&path::normalize(&dir.path)) {
                current = match state.store.child(current, segment) {
                    Some(existing) if state.store.get(existing).is_some_and(Node::is_dir) => {
                        existing
                    }
                    Some(_) => return Err(FsError::NotADirectory),
                    None => {
                        let id = state
                            .store
                            .insert(Node::directory(directory_mode, "root", "root", now));
                        state.store.link_entry(current, segment, id, now)?;
                        id
                    }
                };
            }
            let node = state.node_mut(current)?;
            node.mode = dir.mode;
            node.owner = dir.owner.clone();
            node.group = dir.group.clone();
        }
        Ok(())
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, FsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enforce(&self) -> bool {
        self.config.security.enforce_permissions
    }

    /// Capture the whole tree and identity maps.
    pub fn snapshot(&self) -> FsSnapshot {
        let state = self.state();
        let (root, nodes) = state.store.to_parts();
        FsSnapshot {
            root,
            nodes,
            identities: state.identities.clone(),
        }
    }

    /// Number of live nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.state().store.len()
    }

    // Identity operations

    /// Security identity for a known user.
    pub fn actor_for(&self, name: &str) -> FsResult<Actor> {
        self.state().identities.actor(name)
    }

    pub fn user(&self, name: &str) -> Option<UserRecord> {
        self.state().identities.user(name).cloned()
    }

    pub fn group(&self, name: &str) -> Option<GroupRecord> {
        self.state().identities.group(name).cloned()
    }

    pub fn identities(&self) -> IdentityDb {
        self.state().identities.clone()
    }

    fn require_superuser(&self, actor: &Actor) -> FsResult<()> {
        if self.enforce() && !actor.is_superuser() {
            return Err(FsError::PermissionDenied);
        }
        Ok(())
    }

    pub fn add_user(&self, actor: &Actor, name: &str, record: UserRecord) -> FsResult<()> {
        self.require_superuser(actor)?;
        self.state().identities.add_user(name, record)?;
        debug!(user = name, "user added");
        Ok(())
    }

    pub fn add_group(&self, actor: &Actor, name: &str, gid: u32) -> FsResult<()> {
        self.require_superuser(actor)?;
        self.state().identities.add_group(name, gid)?;
        debug!(group = name, gid, "group added");
        Ok(())
    }

    pub fn add_group_member(&self, actor: &Actor, group: &str, user: &str) -> FsResult<()> {
        self.require_superuser(actor)?;
        self.state().identities.add_member(group, user)
    }

    pub fn set_user_locked(&self, actor: &Actor, user: &str, locked: bool) -> FsResult<()> {
        self.require_superuser(actor)?;
        self.state().identities.set_locked(user, locked)
    }

    // Path resolution and lookup

    /// Canonical absolute path of `path` as seen from `cwd` by `actor`.
    pub fn resolve(&self, actor: &Actor, cwd: &str, path: &str) -> String {
        path::resolve(path, cwd, &actor.home)
    }

    /// Node named by a canonical path. Symlinks are never followed.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.state().store.lookup(&path::normalize(path))
    }

    pub fn stat(&self, path: &str) -> FsResult<NodeInfo> {
        let state = self.state();
        let id = state.store.lookup(&path::normalize(path)).ok_or(FsError::NotFound)?;
        Ok(state.node(id)?.info(id))
    }

    pub fn node_info(&self, id: NodeId) -> Option<NodeInfo> {
        self.state().store.get(id).map(|node| node.info(id))
    }

    pub fn check_permission(&self, node: NodeId, actor: &Actor, capability: Capability) -> bool {
        self.state().allowed(self.enforce(), node, actor, capability)
    }

    // Reads

    pub fn read_file(&self, actor: &Actor, path: &str) -> FsResult<String> {
        let state = self.state();
        let id = state.store.lookup(&path::normalize(path)).ok_or(FsError::NotFound)?;
        let node = state.node(id)?;
        let content = match &node.kind {
            NodeKind::File { content } => content.clone(),
            NodeKind::Directory { .. } => return Err(FsError::IsADirectory),
            NodeKind::Symlink { .. } => return Err(FsError::InvalidArgument),
        };
        state.require(self.enforce(), id, actor, Capability::Read)?;
        Ok(content)
    }

    /// Entries of a directory in insertion order.
    pub fn read_dir(&self, actor: &Actor, path: &str) -> FsResult<Vec<DirEntry>> {
        let state = self.state();
        let id = state.store.lookup(&path::normalize(path)).ok_or(FsError::NotFound)?;
        let children = state.node(id)?.children().ok_or(FsError::NotADirectory)?;
        state.require(self.enforce(), id, actor, Capability::Read)?;
        children
            .iter()
            .map(|(name, child)| {
                Ok(DirEntry {
                    name: name.clone(),
                    id: *child,
                    node_type: state.node(*child)?.node_type(),
                })
            })
            .collect()
    }

    pub fn read_link(&self, path: &str) -> FsResult<String> {
        let state = self.state();
        let id = state.store.lookup(&path::normalize(path)).ok_or(FsError::NotFound)?;
        match &state.node(id)?.kind {
            NodeKind::Symlink { target } => Ok(target.clone()),
            _ => Err(FsError::InvalidArgument),
        }
    }

    // Creation

    pub fn create_directory(&self, actor: &Actor, path: &str) -> FsResult<NodeId> {
        let path = path::normalize(path);
        let id = {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.store.lookup(&path).is_some() {
                return Err(FsError::AlreadyExists);
            }
            let (parent, name) = state.parent_dir(&path)?;
            self.insert_directory(state, actor, parent, &name)?
        };
        debug!(path = %path, user = %actor.name, "directory created");
        self.emit_event(EventKind::Created { path });
        Ok(id)
    }

    /// Create `path` and any missing ancestors. Succeeds if the directory
    /// already exists.
    pub fn create_directory_all(&self, actor: &Actor, path: &str) -> FsResult<NodeId> {
        let path = path::normalize(path);
        let mut created = Vec::new();
        let result = {
            let mut guard = self.state();
            let state = &mut *guard;
            let mut current = state.store.root();
            let mut current_path = String::from("/");
            let mut outcome = Ok(current);
            for segment in path::segments(&path) {
                current_path = path::join(&current_path, segment);
                let next = match state.store.child(current, segment) {
                    Some(existing) if state.store.get(existing).is_some_and(Node::is_dir) => {
                        Ok(existing)
                    }
                    Some(_) => Err(FsError::NotADirectory),
                    None => self.insert_directory(state, actor, current, segment).map(|id| {
                        created.push(current_path.clone());
                        id
                    }),
                };
                match next {
                    Ok(id) => {
                        current = id;
                        outcome = Ok(id);
                    }
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            outcome
        };
        // Ancestors created before a failure stay, as with `mkdir -p`.
        for created_path in created {
            debug!(path = %created_path, user = %actor.name, "directory created");
            self.emit_event(EventKind::Created { path: created_path });
        }
        result
    }

    fn insert_directory(
        &self,
        state: &mut FsState,
        actor: &Actor,
        parent: NodeId,
        name: &str,
    ) -> FsResult<NodeId> {
        state.require(self.enforce(), parent, actor, Capability::Write)?;
        let group = state.identities.primary_group_of(actor);
        let now = Utc::now();
        let id = state.store.insert(Node::directory(
            self.config.defaults.directory_mode,
            &actor.name,
            &group,
            now,
        ));
        state.store.link_entry(parent, name, id, now)?;
        Ok(id)
    }

    /// Create an empty file, or refresh the timestamp of an existing node.
    pub fn create_or_touch_file(&self, actor: &Actor, path: &str) -> FsResult<NodeId> {
        let path = path::normalize(path);
        let (id, event) = {
            let mut guard = self.state();
            let state = &mut *guard;
            if let Some(id) = state.store.lookup(&path) {
                let owns = state.node(id)?.owner == actor.name;
                if !owns {
                    state.require(self.enforce(), id, actor, Capability::Write)?;
                }
                state.node_mut(id)?.modified = Utc::now();
                (id, EventKind::Modified { path: path.clone() })
            } else {
                let (parent, name) = state.parent_dir(&path)?;
                state.require(self.enforce(), parent, actor, Capability::Write)?;
                let group = state.identities.primary_group_of(actor);
                let now = Utc::now();
                let id = state.store.insert(Node::file(
                    self.config.defaults.file_mode,
                    &actor.name,
                    &group,
                    now,
                ));
                state.store.link_entry(parent, &name, id, now)?;
                (id, EventKind::Created { path: path.clone() })
            }
        };
        debug!(path = %path, user = %actor.name, "file touched");
        self.emit_event(event);
        Ok(id)
    }

    /// Replace or extend a file's content, creating the file if needed.
    /// Every name of a hard-linked file observes the new content.
    pub fn write_file(
        &self,
        actor: &Actor,
        path: &str,
        data: &str,
        append: bool,
    ) -> FsResult<NodeId> {
        let path = path::normalize(path);
        let (id, event) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let (id, event) = match state.store.lookup(&path) {
                Some(id) => {
                    match state.node(id)?.kind {
                        NodeKind::File { .. } => {}
                        NodeKind::Directory { .. } => return Err(FsError::IsADirectory),
                        NodeKind::Symlink { .. } => return Err(FsError::InvalidArgument),
                    }
                    state.require(self.enforce(), id, actor, Capability::Write)?;
                    (id, EventKind::Modified { path: path.clone() })
                }
                None => {
                    let (parent, name) = state.parent_dir(&path)?;
                    state.require(self.enforce(), parent, actor, Capability::Write)?;
                    let group = state.identities.primary_group_of(actor);
                    let now = Utc::now();
                    let id = state.store.insert(Node::file(
                        self.config.defaults.file_mode,
                        &actor.name,
                        &group,
                        now,
                    ));
                    state.store.link_entry(parent, &name, id, now)?;
                    (id, EventKind::Created { path: path.clone() })
                }
            };

            let node = state.node_mut(id)?;
            if let NodeKind::File { content } = &mut node.kind {
                if !append {
                    content.clear();
                }
                content.push_str(data);
                node.size = content.len() as u64;
            }
            node.modified = Utc::now();
            (id, event)
        };
        debug!(path = %path, user = %actor.name, bytes = data.len(), append, "file written");
        self.emit_event(event);
        Ok(id)
    }

    // Copy and move

    /// Deep-copy `src` to `dst` and return the path the copy landed at.
    ///
    /// Every node of the copy is new and owned by `actor`; hard links inside
    /// the source become independent files. Readability of the whole source
    /// subtree is checked before anything is attached, so a refused copy
    /// leaves no trace.
    pub fn deep_copy(
        &self,
        actor: &Actor,
        src: &str,
        dst: &str,
        recursive: bool,
    ) -> FsResult<String> {
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        let landed = {
            let mut guard = self.state();
            let state = &mut *guard;
            let src_id = state.store.lookup(&src).ok_or(FsError::NotFound)?;
            let src_is_dir = state.node(src_id)?.is_dir();
            if src_is_dir && !recursive {
                return Err(FsError::IsADirectory);
            }

            let landed = state.landing_path(&src, &dst);
            if src_is_dir && path::is_within(&landed, &src) {
                return Err(FsError::InvalidArgument);
            }
            let (parent, name) = state.parent_dir(&landed)?;
            let mut replaces = false;
            if let Some(existing) = state.store.child(parent, &name) {
                if existing == src_id {
                    return Err(FsError::InvalidArgument);
                }
                if state.node(existing)?.is_dir() {
                    return Err(FsError::AlreadyExists);
                }
                replaces = true;
            }

            for id in state.store.subtree(src_id) {
                state.require(self.enforce(), id, actor, Capability::Read)?;
            }
            state.require(self.enforce(), parent, actor, Capability::Write)?;

            let group = state.identities.primary_group_of(actor);
            let now = Utc::now();
            let copy = state.store.clone_subtree(src_id, &actor.name, &group, now)?;
            state.store.link_entry(parent, &name, copy, now)?;
            if replaces {
                state.store.collect_garbage();
            }
            landed
        };
        debug!(from = %src, to = %landed, user = %actor.name, "copied");
        self.emit_event(EventKind::Created {
            path: landed.clone(),
        });
        Ok(landed)
    }

    /// Re-parent `src` under `dst` and return its new path. The node keeps
    /// its identity, so other hard-link names still refer to it.
    pub fn move_node(&self, actor: &Actor, src: &str, dst: &str, force: bool) -> FsResult<String> {
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        let landed = {
            let mut guard = self.state();
            let state = &mut *guard;
            let (src_parent, src_name) = state.parent_dir(&src)?;
            let src_id = state.store.child(src_parent, &src_name).ok_or(FsError::NotFound)?;
            let src_is_dir = state.node(src_id)?.is_dir();

            let landed = state.landing_path(&src, &dst);
            if landed == src {
                return Ok(landed);
            }
            if src_is_dir && path::is_within(&landed, &src) {
                return Err(FsError::InvalidArgument);
            }
            // Landing on an ancestor would replace the directory holding `src`
            if path::is_within(&src, &landed) {
                return Err(FsError::InvalidArgument);
            }
            let (dst_parent, dst_name) = state.parent_dir(&landed)?;
            let mut replaces = false;
            if let Some(existing) = state.store.child(dst_parent, &dst_name) {
                if !force {
                    return Err(FsError::AlreadyExists);
                }
                match (src_is_dir, state.node(existing)?.is_dir()) {
                    (false, true) => return Err(FsError::IsADirectory),
                    (true, false) => return Err(FsError::NotADirectory),
                    _ => replaces = true,
                }
            }

            state.require(self.enforce(), src_parent, actor, Capability::Write)?;
            state.require(self.enforce(), dst_parent, actor, Capability::Write)?;

            let now = Utc::now();
            state.store.link_entry(dst_parent, &dst_name, src_id, now)?;
            state.store.unlink_entry(src_parent, &src_name, now);
            if replaces {
                state.store.collect_garbage();
            }
            landed
        };
        debug!(from = %src, to = %landed, user = %actor.name, "moved");
        self.emit_event(EventKind::Renamed {
            from: src,
            to: landed.clone(),
        });
        Ok(landed)
    }

    // Links

    /// Create a symlink at `link_path` holding `target` verbatim. The target
    /// is not checked for existence.
    pub fn create_symlink(
        &self,
        actor: &Actor,
        target: &str,
        link_path: &str,
        force: bool,
    ) -> FsResult<NodeId> {
        let link_path = path::normalize(link_path);
        let id = {
            let mut guard = self.state();
            let state = &mut *guard;
            let (parent, name) = state.parent_dir(&link_path)?;
            let replaces = state.link_destination(parent, &name, None, force)?;
            state.require(self.enforce(), parent, actor, Capability::Write)?;

            let group = state.identities.primary_group_of(actor);
            let now = Utc::now();
            let id = state.store.insert(Node::symlink(
                target,
                Mode::SYMLINK,
                &actor.name,
                &group,
                now,
            ));
            state.store.link_entry(parent, &name, id, now)?;
            if replaces {
                state.store.collect_garbage();
            }
            id
        };
        debug!(path = %link_path, target, user = %actor.name, "symlink created");
        self.emit_event(EventKind::Created { path: link_path });
        Ok(id)
    }

    /// Give the existing non-directory node at `target` a second name.
    pub fn create_hard_link(
        &self,
        actor: &Actor,
        target: &str,
        link_path: &str,
        force: bool,
    ) -> FsResult<NodeId> {
        let target = path::normalize(target);
        let link_path = path::normalize(link_path);
        let id = {
            let mut guard = self.state();
            let state = &mut *guard;
            let id = state.store.lookup(&target).ok_or(FsError::NotFound)?;
            if state.node(id)?.is_dir() {
                return Err(FsError::IsADirectory);
            }
            let (parent, name) = state.parent_dir(&link_path)?;
            let replaces = state.link_destination(parent, &name, Some(id), force)?;
            state.require(self.enforce(), parent, actor, Capability::Write)?;

            let now = Utc::now();
            state.store.link_entry(parent, &name, id, now)?;
            if replaces {
                state.store.collect_garbage();
            }
            id
        };
        debug!(path = %link_path, target = %target, user = %actor.name, "hard link created");
        self.emit_event(EventKind::Created { path: link_path });
        Ok(id)
    }

    // Removal

    /// Unlink the name `path`. The node itself survives while any other
    /// name still refers to it.
    pub fn remove(&self, actor: &Actor, path: &str, recursive: bool, force: bool) -> FsResult<()> {
        let path = path::normalize(path);
        {
            let mut guard = self.state();
            let state = &mut *guard;
            let located = state
                .parent_dir(&path)
                .and_then(|(parent, name)| match state.store.child(parent, &name) {
                    Some(id) => Ok((parent, name, id)),
                    None => Err(FsError::NotFound),
                });
            let (parent, name, id) = match located {
                Ok(found) => found,
                Err(FsError::NotFound) if force => return Ok(()),
                Err(e) => return Err(e),
            };

            if state.node(id)?.is_dir() {
                if !recursive {
                    return Err(FsError::IsADirectory);
                }
                for dir in state.store.subtree(id) {
                    let has_entries = state
                        .node(dir)?
                        .children()
                        .is_some_and(|children| !children.is_empty());
                    if has_entries {
                        state.require(self.enforce(), dir, actor, Capability::Write)?;
                    }
                }
            }
            state.require(self.enforce(), parent, actor, Capability::Write)?;

            state.store.unlink_entry(parent, &name, Utc::now());
            let reclaimed = state.store.collect_garbage();
            debug!(path = %path, user = %actor.name, reclaimed, "removed");
        }
        self.emit_event(EventKind::Removed { path });
        Ok(())
    }

    // Metadata

    /// chmod: only the owner or the superuser may change a node's mode.
    pub fn set_mode(&self, actor: &Actor, path: &str, mode: &str) -> FsResult<()> {
        let mode = Mode::parse(mode)?;
        let path = path::normalize(path);
        {
            let mut guard = self.state();
            let state = &mut *guard;
            let id = state.store.lookup(&path).ok_or(FsError::NotFound)?;
            let node = state.node_mut(id)?;
            if matches!(node.kind, NodeKind::Symlink { .. }) {
                return Err(FsError::InvalidArgument);
            }
            if self.enforce() && !actor.is_superuser() && actor.name != node.owner {
                return Err(FsError::PermissionDenied);
            }
            node.mode = mode;
        }
        debug!(path = %path, %mode, user = %actor.name, "mode changed");
        self.emit_event(EventKind::Modified { path });
        Ok(())
    }

    /// chown: only the superuser may hand a node to another user; an owner
    /// may change its group to one they belong to.
    pub fn set_owner(
        &self,
        actor: &Actor,
        path: &str,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> FsResult<()> {
        let path = path::normalize(path);
        {
            let mut guard = self.state();
            let state = &mut *guard;
            if let Some(owner) = owner {
                if state.identities.user(owner).is_none() {
                    return Err(FsError::NoSuchUser(owner.to_string()));
                }
            }
            if let Some(group) = group {
                if state.identities.group(group).is_none() {
                    return Err(FsError::NoSuchGroup(group.to_string()));
                }
            }
            let id = state.store.lookup(&path).ok_or(FsError::NotFound)?;
            let node = state.node(id)?;

            if self.enforce() && !actor.is_superuser() {
                if owner.is_some_and(|owner| owner != node.owner) {
                    return Err(FsError::PermissionDenied);
                }
                if let Some(group) = group {
                    let may_regroup =
                        actor.name == node.owner && state.identities.is_member(actor, group);
                    if group != node.group && !may_regroup {
                        return Err(FsError::PermissionDenied);
                    }
                }
            }

            let node = state.node_mut(id)?;
            if let Some(owner) = owner {
                node.owner = owner.to_string();
            }
            if let Some(group) = group {
                node.group = group.to_string();
            }
        }
        debug!(path = %path, ?owner, ?group, user = %actor.name, "ownership changed");
        self.emit_event(EventKind::Modified { path });
        Ok(())
    }

    // Event subscription operations

    #[cfg(feature = "events")]
    pub fn subscribe_events(&self, cb: Arc<dyn EventSink>) -> FsResult<SubscriptionId> {
        let mut subscriptions =
            self.event_subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next_id = self.next_subscription_id.lock().unwrap_or_else(PoisonError::into_inner);
        let subscription_id = SubscriptionId::new(*next_id);
        *next_id += 1;
        subscriptions.insert(subscription_id, cb);
        Ok(subscription_id)
    }

    #[cfg(feature = "events")]
    pub fn unsubscribe_events(&self, sub: SubscriptionId) -> FsResult<()> {
        let mut subscriptions =
            self.event_subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        if subscriptions.remove(&sub).is_none() {
            return Err(FsError::NotFound);
        }
        Ok(())
    }

    /// Deliver an event; called only after the state lock is released so
    /// sinks may query the filesystem.
    #[cfg(feature = "events")]
    fn emit_event(&self, event: EventKind) {
        if !self.config.track_events {
            return;
        }
        let sinks: Vec<Arc<dyn EventSink>> = self
            .event_subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for sink in sinks {
            sink.on_event(&event);
        }
    }

    #[cfg(not(feature = "events"))]
    fn emit_event(&self, _event: EventKind) {}
}
