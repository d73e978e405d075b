// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! termfs core - an in-memory, Unix-flavoured filesystem
//!
//! The tree holds directories, regular files and symbolic links. Each node
//! carries an owner, a group and an octal mode checked against the acting
//! user. Hard links are shared nodes reachable under several names;
//! symlinks store an unresolved target string and are never followed.

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub(crate) mod node;
pub mod path;
pub(crate) mod permissions;
pub mod types;
pub mod vfs;

#[cfg(test)]
mod test_scenarios;

// Re-export the main engine types
pub use config::{
    FsConfig, NodeDefaults, SecurityPolicy, SeedDirectory, SeedGroup, SeedLayout, SeedUser,
};
pub use error::{FsError, FsResult};
#[cfg(feature = "events")]
pub use events::{EventSink, SubscriptionId};
pub use events::EventKind;
pub use identity::{GroupRecord, IdentityDb, UserRecord};
pub use types::{Actor, Capability, DirEntry, Mode, NodeId, NodeInfo, NodeType};
pub use vfs::{FsCore, FsSnapshot};
