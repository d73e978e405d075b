// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! User and group databases used for ownership and permission checks

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};
use crate::types::Actor;

/// Account record keyed by username
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    pub shell: String,
    #[serde(default)]
    pub locked: bool,
}

/// Group record keyed by group name
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub gid: u32,
    #[serde(default)]
    pub members: BTreeSet<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDb {
    users: IndexMap<String, UserRecord>,
    groups: IndexMap<String, GroupRecord>,
}

impl IdentityDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, name: &str, record: UserRecord) -> FsResult<()> {
        if name.is_empty() || name.contains(['/', ':']) {
            return Err(FsError::InvalidName);
        }
        if self.users.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        self.users.insert(name.to_string(), record);
        Ok(())
    }

    pub fn add_group(&mut self, name: &str, gid: u32) -> FsResult<()> {
        if name.is_empty() || name.contains(['/', ':']) {
            return Err(FsError::InvalidName);
        }
        if self.groups.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        self.groups.insert(
            name.to_string(),
            GroupRecord {
                gid,
                members: BTreeSet::new(),
            },
        );
        Ok(())
    }

    pub fn add_member(&mut self, group: &str, user: &str) -> FsResult<()> {
        if !self.users.contains_key(user) {
            return Err(FsError::NoSuchUser(user.to_string()));
        }
        let record = self
            .groups
            .get_mut(group)
            .ok_or_else(|| FsError::NoSuchGroup(group.to_string()))?;
        record.members.insert(user.to_string());
        Ok(())
    }

    pub fn set_locked(&mut self, user: &str, locked: bool) -> FsResult<()> {
        let record = self
            .users
            .get_mut(user)
            .ok_or_else(|| FsError::NoSuchUser(user.to_string()))?;
        record.locked = locked;
        Ok(())
    }

    pub fn user(&self, name: &str) -> Option<&UserRecord> {
        self.users.get(name)
    }

    pub fn group(&self, name: &str) -> Option<&GroupRecord> {
        self.groups.get(name)
    }

    pub fn users(&self) -> impl Iterator<Item = (&str, &UserRecord)> {
        self.users.iter().map(|(name, record)| (name.as_str(), record))
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &GroupRecord)> {
        self.groups.iter().map(|(name, record)| (name.as_str(), record))
    }

    /// Name of the first group carrying `gid`.
    pub fn group_name_for_gid(&self, gid: u32) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, record)| record.gid == gid)
            .map(|(name, _)| name.as_str())
    }

    /// Whether `actor` belongs to `group`, either as a listed member or
    /// through their primary gid.
    pub fn is_member(&self, actor: &Actor, group: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|record| record.gid == actor.gid || record.members.contains(&actor.name))
    }

    /// Build the security identity for a known user.
    pub fn actor(&self, name: &str) -> FsResult<Actor> {
        let record = self.users.get(name).ok_or_else(|| FsError::NoSuchUser(name.to_string()))?;
        Ok(Actor {
            name: name.to_string(),
            uid: record.uid,
            gid: record.gid,
            home: record.home.clone(),
        })
    }

    /// Primary group name of an actor, falling back to their username when
    /// no group carries their gid.
    pub fn primary_group_of(&self, actor: &Actor) -> String {
        self.group_name_for_gid(actor.gid)
            .map(str::to_string)
            .unwrap_or_else(|| actor.name.clone())
    }
}
