// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for termfs core

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("permission denied")]
    PermissionDenied,
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("invalid mode: '{0}'")]
    InvalidMode(String),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("name not allowed")]
    InvalidName,
    #[error("no such user: '{0}'")]
    NoSuchUser(String),
    #[error("no such group: '{0}'")]
    NoSuchGroup(String),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type FsResult<T> = Result<T, FsError>;
