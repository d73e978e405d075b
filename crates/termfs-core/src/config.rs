// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration types for termfs core

use serde::{Deserialize, Serialize};

use crate::error::FsResult;
use crate::types::Mode;

/// Permission enforcement settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SecurityPolicy {
    /// When false every permission check grants access
    pub enforce_permissions: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            enforce_permissions: true,
        }
    }
}

/// Modes given to freshly created directories and files. Symlinks are
/// always created with [`Mode::SYMLINK`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NodeDefaults {
    pub directory_mode: Mode,
    pub file_mode: Mode,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            directory_mode: Mode::DIRECTORY,
            file_mode: Mode::FILE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeedUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeedGroup {
    pub name: String,
    pub gid: u32,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeedDirectory {
    pub path: String,
    pub mode: Mode,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_owner")]
    pub group: String,
}

fn default_owner() -> String {
    "root".to_string()
}

/// Identities and directory skeleton the tree starts with. The `root`
/// account and group always exist whether or not they are listed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SeedLayout {
    pub groups: Vec<SeedGroup>,
    pub users: Vec<SeedUser>,
    pub directories: Vec<SeedDirectory>,
}

impl Default for SeedLayout {
    fn default() -> Self {
        let dir = |path: &str, mode: Mode| SeedDirectory {
            path: path.to_string(),
            mode,
            owner: default_owner(),
            group: default_owner(),
        };
        Self {
            groups: Vec::new(),
            users: Vec::new(),
            directories: vec![
                dir("/bin", Mode::DIRECTORY),
                dir("/etc", Mode::DIRECTORY),
                dir("/home", Mode::DIRECTORY),
                dir("/root", Mode::from_bits(0o700)),
                dir("/tmp", Mode::from_bits(0o1777)),
                dir("/usr", Mode::DIRECTORY),
                dir("/var", Mode::DIRECTORY),
            ],
        }
    }
}

/// Main filesystem configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FsConfig {
    pub security: SecurityPolicy,
    pub defaults: NodeDefaults,
    pub track_events: bool,
    pub seed: SeedLayout,
}

impl FsConfig {
    /// Parse a TOML document; missing sections fall back to defaults.
    pub fn from_toml_str(text: &str) -> FsResult<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;

    #[test]
    fn test_defaults() {
        let config = FsConfig::default();
        assert!(config.security.enforce_permissions);
        assert!(!config.track_events);
        assert_eq!(config.defaults.directory_mode.to_string(), "0755");
        assert_eq!(config.defaults.file_mode.to_string(), "0644");
        let tmp = config.seed.directories.iter().find(|d| d.path == "/tmp").unwrap();
        assert_eq!(tmp.mode.to_string(), "1777");
    }

    #[test]
    fn test_from_toml() {
        let config = FsConfig::from_toml_str(
            r#"
            track-events = true

            [defaults]
            file-mode = "0600"

            [[seed.groups]]
            name = "students"
            gid = 100
            members = ["ada"]

            [[seed.users]]
            name = "ada"
            uid = 1000
            gid = 100
            home = "/home/ada"

            [[seed.directories]]
            path = "/home/ada"
            mode = "0750"
            owner = "ada"
            group = "students"
            "#,
        )
        .unwrap();

        assert!(config.track_events);
        assert!(config.security.enforce_permissions);
        assert_eq!(config.defaults.file_mode.bits(), 0o600);
        assert_eq!(config.defaults.directory_mode.bits(), 0o755);
        assert_eq!(config.seed.users[0].shell, "/bin/bash");
        assert_eq!(config.seed.groups[0].members, vec!["ada".to_string()]);
        // An explicit seed section replaces the default skeleton
        assert_eq!(config.seed.directories.len(), 1);
    }

    #[test]
    fn test_from_toml_rejects_bad_mode() {
        let err = FsConfig::from_toml_str("[defaults]\nfile-mode = \"0999\"\n").unwrap_err();
        assert!(matches!(err, FsError::Config(_)));
    }

    #[test]
    fn test_config_file_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("termfs.toml");
        std::fs::write(&path, "[security]\nenforce-permissions = false\n").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let config = FsConfig::from_toml_str(&text).unwrap();
        assert!(!config.security.enforce_permissions);
    }
}
