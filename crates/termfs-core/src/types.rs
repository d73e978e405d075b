// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for termfs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FsError, FsResult};

/// Opaque node identifier. Every directory entry naming the same node
/// stores the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Octal permission mode: owner/group/other digits plus an optional
/// special-bits digit (setuid/setgid/sticky) that is stored but never
/// consulted by permission checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mode(u32);

impl Mode {
    pub const DIRECTORY: Mode = Mode(0o755);
    pub const FILE: Mode = Mode(0o644);
    pub const SYMLINK: Mode = Mode(0o777);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0o7777)
    }

    /// Parse a 3- or 4-digit octal string such as `755` or `1777`.
    pub fn parse(s: &str) -> FsResult<Self> {
        if !(3..=4).contains(&s.len()) || !s.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            return Err(FsError::InvalidMode(s.to_string()));
        }
        u32::from_str_radix(s, 8)
            .map(Self)
            .map_err(|_| FsError::InvalidMode(s.to_string()))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn special(&self) -> u8 {
        ((self.0 >> 9) & 0o7) as u8
    }

    pub fn owner(&self) -> u8 {
        ((self.0 >> 6) & 0o7) as u8
    }

    pub fn group(&self) -> u8 {
        ((self.0 >> 3) & 0o7) as u8
    }

    pub fn other(&self) -> u8 {
        (self.0 & 0o7) as u8
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl std::str::FromStr for Mode {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::parse(s)
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Mode::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Access requested from a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Read,
    Write,
    Execute,
}

impl Capability {
    /// Bit within a single mode digit.
    pub fn bit(&self) -> u8 {
        match self {
            Capability::Read => 4,
            Capability::Write => 2,
            Capability::Execute => 1,
        }
    }
}

/// Security identity of the user issuing a command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
}

impl Actor {
    pub fn is_superuser(&self) -> bool {
        self.uid == 0
    }
}

/// Node variant without its payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Directory,
    File,
    Symlink,
}

/// Point-in-time view of a node's attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub node_type: NodeType,
    pub mode: Mode,
    pub owner: String,
    pub group: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Link text for symlinks
    pub target: Option<String>,
}

impl NodeInfo {
    pub fn is_dir(&self) -> bool {
        self.node_type == NodeType::Directory
    }
}

/// Directory entry information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub id: NodeId,
    pub node_type: NodeType,
}
