// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Node store: an arena of nodes addressed by [`NodeId`]
//!
//! Directory entries hold ids rather than owned nodes, so two entries can
//! name the same node (hard links). A node lives as long as some directory
//! reachable from the root still names it; [`NodeStore::collect_garbage`]
//! drops everything else.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};
use crate::path;
use crate::types::{Mode, NodeId, NodeInfo, NodeType};

/// Filesystem node payloads
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(crate) enum NodeKind {
    Directory { children: IndexMap<String, NodeId> },
    File { content: String },
    Symlink { target: String },
}

/// Filesystem node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub mode: Mode,
    pub owner: String,
    pub group: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl Node {
    pub fn directory(mode: Mode, owner: &str, group: &str, now: DateTime<Utc>) -> Self {
        Self {
            kind: NodeKind::Directory {
                children: IndexMap::new(),
            },
            mode,
            owner: owner.to_string(),
            group: group.to_string(),
            size: 4096,
            modified: now,
        }
    }

    pub fn file(mode: Mode, owner: &str, group: &str, now: DateTime<Utc>) -> Self {
        Self {
            kind: NodeKind::File {
                content: String::new(),
            },
            mode,
            owner: owner.to_string(),
            group: group.to_string(),
            size: 0,
            modified: now,
        }
    }

    pub fn symlink(target: &str, mode: Mode, owner: &str, group: &str, now: DateTime<Utc>) -> Self {
        Self {
            kind: NodeKind::Symlink {
                target: target.to_string(),
            },
            mode,
            owner: owner.to_string(),
            group: group.to_string(),
            size: target.len() as u64,
            modified: now,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Directory { .. } => NodeType::Directory,
            NodeKind::File { .. } => NodeType::File,
            NodeKind::Symlink { .. } => NodeType::Symlink,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn children(&self) -> Option<&IndexMap<String, NodeId>> {
        match &self.kind {
            NodeKind::Directory { children } => Some(children),
            _ => None,
        }
    }

    pub fn info(&self, id: NodeId) -> NodeInfo {
        NodeInfo {
            id,
            node_type: self.node_type(),
            mode: self.mode,
            owner: self.owner.clone(),
            group: self.group.clone(),
            size: self.size,
            modified: self.modified,
            target: match &self.kind {
                NodeKind::Symlink { target } => Some(target.clone()),
                _ => None,
            },
        }
    }
}

/// Serialized form of one arena slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredNode {
    pub id: NodeId,
    pub node: Node,
}

#[derive(Clone, Debug)]
pub(crate) struct NodeStore {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
}

impl NodeStore {
    pub fn new(root: Node) -> Self {
        let root_id = NodeId(1);
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            nodes,
            root: root_id,
            next_id: 2,
        }
    }

    /// Rebuild a store from serialized slots, rejecting dangling entries.
    pub fn from_parts(root: NodeId, stored: Vec<StoredNode>) -> FsResult<Self> {
        let mut nodes = HashMap::with_capacity(stored.len());
        for StoredNode { id, node } in stored {
            if nodes.insert(id, node).is_some() {
                return Err(FsError::InvalidArgument);
            }
        }
        if !nodes.get(&root).is_some_and(Node::is_dir) {
            return Err(FsError::InvalidArgument);
        }
        let dangling = nodes
            .values()
            .filter_map(Node::children)
            .flat_map(|children| children.values())
            .any(|child| !nodes.contains_key(child));
        if dangling {
            return Err(FsError::InvalidArgument);
        }
        let next_id = nodes.keys().map(|id| id.0).max().unwrap_or(0) + 1;
        Ok(Self {
            nodes,
            root,
            next_id,
        })
    }

    /// Slots in id order, for serialization.
    pub fn to_parts(&self) -> (NodeId, Vec<StoredNode>) {
        let mut stored: Vec<StoredNode> = self
            .nodes
            .iter()
            .map(|(id, node)| StoredNode {
                id: *id,
                node: node.clone(),
            })
            .collect();
        stored.sort_by_key(|slot| slot.id);
        (self.root, stored)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    /// Walk a canonical path from the root without following symlinks.
    pub fn lookup(&self, canonical: &str) -> Option<NodeId> {
        let mut current = self.root;
        for segment in path::segments(canonical) {
            current = *self.get(current)?.children()?.get(segment)?;
        }
        Some(current)
    }

    pub fn child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.get(dir)?.children()?.get(name).copied()
    }

    /// Point `name` in `dir` at `child`, replacing any previous entry in
    /// place. Returns the id the name used to refer to.
    pub fn link_entry(
        &mut self,
        dir: NodeId,
        name: &str,
        child: NodeId,
        now: DateTime<Utc>,
    ) -> FsResult<Option<NodeId>> {
        let parent = self.nodes.get_mut(&dir).ok_or(FsError::NotFound)?;
        match &mut parent.kind {
            NodeKind::Directory { children } => {
                let previous = children.insert(name.to_string(), child);
                parent.modified = now;
                Ok(previous)
            }
            _ => Err(FsError::NotADirectory),
        }
    }

    /// Remove `name` from `dir`, keeping the order of the other entries.
    pub fn unlink_entry(&mut self, dir: NodeId, name: &str, now: DateTime<Utc>) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&dir)?;
        let NodeKind::Directory { children } = &mut parent.kind else {
            return None;
        };
        let removed = children.shift_remove(name)?;
        parent.modified = now;
        Some(removed)
    }

    /// Every distinct node in the subtree rooted at `id`, `id` first.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            if let Some(children) = self.get(current).and_then(Node::children) {
                stack.extend(children.values().rev().copied());
            }
        }
        order
    }

    /// Deep-copy the subtree at `id` into fresh, unattached nodes owned by
    /// `owner`/`group`. Aliases inside the source become independent copies.
    pub fn clone_subtree(
        &mut self,
        id: NodeId,
        owner: &str,
        group: &str,
        now: DateTime<Utc>,
    ) -> FsResult<NodeId> {
        let copy = self.detached_copy(id, owner, group, now)?;
        let mut pending = vec![(id, copy)];
        while let Some((source, target)) = pending.pop() {
            let Some(children) = self.get(source).and_then(Node::children).cloned() else {
                continue;
            };
            let mut copied = IndexMap::with_capacity(children.len());
            for (name, child) in children {
                let child_copy = self.detached_copy(child, owner, group, now)?;
                copied.insert(name, child_copy);
                pending.push((child, child_copy));
            }
            if let Some(NodeKind::Directory { children }) =
                self.get_mut(target).map(|node| &mut node.kind)
            {
                *children = copied;
            }
        }
        Ok(copy)
    }

    /// Copy one node without its children.
    fn detached_copy(
        &mut self,
        id: NodeId,
        owner: &str,
        group: &str,
        now: DateTime<Utc>,
    ) -> FsResult<NodeId> {
        let source = self.get(id).ok_or(FsError::NotFound)?;
        let kind = match &source.kind {
            NodeKind::Directory { .. } => NodeKind::Directory {
                children: IndexMap::new(),
            },
            other => other.clone(),
        };
        let node = Node {
            kind,
            mode: source.mode,
            owner: owner.to_string(),
            group: group.to_string(),
            size: source.size,
            modified: now,
        };
        Ok(self.insert(node))
    }

    /// Drop every node no longer reachable from the root. Returns the
    /// number of nodes reclaimed.
    pub fn collect_garbage(&mut self) -> usize {
        let reachable: HashSet<NodeId> = self.subtree(self.root).into_iter().collect();
        let before = self.nodes.len();
        self.nodes.retain(|id, _| reachable.contains(id));
        before - self.nodes.len()
    }
}
