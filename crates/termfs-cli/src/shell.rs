// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Command lines mapped onto filesystem operations

use std::fmt::Write as _;

use clap::Parser;
use termfs_core::{path, Actor, Capability, FsCore, FsError, NodeInfo, NodeType};
use tracing::debug;

/// One shell command line
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(no_binary_name = true, disable_help_subcommand = true)]
pub enum ShellCommand {
    /// Change the working directory (home when omitted)
    Cd { path: Option<String> },
    /// Print the working directory
    Pwd,
    /// Print the acting user
    Whoami,
    /// Create directories
    Mkdir {
        /// Create missing parents; no error if the directory exists
        #[arg(short = 'p')]
        parents: bool,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Create empty files or refresh their timestamps
    Touch {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Write the remaining words, plus a newline, to a file
    Write {
        /// Append instead of replacing
        #[arg(short = 'a')]
        append: bool,
        path: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Print file contents
    Cat {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// List a directory
    Ls {
        /// Long listing with mode, owner, group and size
        #[arg(short = 'l')]
        long: bool,
        path: Option<String>,
    },
    /// Copy a file, or a directory with -r
    Cp {
        #[arg(short = 'r', short_alias = 'R')]
        recursive: bool,
        src: String,
        dst: String,
    },
    /// Move or rename
    Mv {
        #[arg(short = 'f')]
        force: bool,
        src: String,
        dst: String,
    },
    /// Create a hard link, or a symbolic link with -s
    Ln {
        #[arg(short = 's')]
        symbolic: bool,
        #[arg(short = 'f')]
        force: bool,
        target: String,
        link: String,
    },
    /// Remove names
    Rm {
        #[arg(short = 'r', short_alias = 'R')]
        recursive: bool,
        #[arg(short = 'f')]
        force: bool,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Change permission mode (octal)
    Chmod {
        mode: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Change owner and/or group: OWNER, OWNER:GROUP or :GROUP
    Chown {
        spec: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Print a symlink's target
    Readlink { path: String },
    /// Show node metadata
    Stat { path: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("{0}")]
    Usage(String),
    #[error("'{path}': {source}")]
    Fs {
        path: String,
        #[source]
        source: FsError,
    },
}

trait FsContext<T> {
    fn at(self, path: &str) -> Result<T, ShellError>;
}

impl<T> FsContext<T> for Result<T, FsError> {
    fn at(self, path: &str) -> Result<T, ShellError> {
        self.map_err(|source| ShellError::Fs {
            path: path.to_string(),
            source,
        })
    }
}

/// A user's session: who is acting and where they stand.
pub struct Session<'a> {
    core: &'a FsCore,
    actor: Actor,
    cwd: String,
}

impl<'a> Session<'a> {
    /// Start in the actor's home directory, or `/` if it does not exist.
    pub fn new(core: &'a FsCore, actor: Actor) -> Self {
        let cwd = match core.stat(&actor.home) {
            Ok(info) if info.is_dir() => path::normalize(&actor.home),
            _ => "/".to_string(),
        };
        Self { core, actor, cwd }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    fn resolve(&self, path: &str) -> String {
        self.core.resolve(&self.actor, &self.cwd, path)
    }

    /// Run one command line and return its output. Blank lines and
    /// `#` comments produce nothing.
    pub fn run_line(&mut self, line: &str) -> Result<String, ShellError> {
        let words = shell_words::split(line).map_err(|e| ShellError::Usage(e.to_string()))?;
        match words.first() {
            None => return Ok(String::new()),
            Some(word) if word.starts_with('#') => return Ok(String::new()),
            Some(_) => {}
        }
        let command = match ShellCommand::try_parse_from(&words) {
            Ok(command) => command,
            Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => return Ok(e.to_string()),
            Err(e) => {
                let rendered = e.to_string();
                let first = rendered.lines().next().unwrap_or_default();
                return Err(ShellError::Usage(
                    first.trim_start_matches("error: ").to_string(),
                ));
            }
        };
        debug!(user = %self.actor.name, cwd = %self.cwd, ?command, "running command");
        self.execute(command)
    }

    pub fn execute(&mut self, command: ShellCommand) -> Result<String, ShellError> {
        let mut out = String::new();
        match command {
            ShellCommand::Cd { path } => {
                let target = self.resolve(path.as_deref().unwrap_or("~"));
                let info = self.core.stat(&target).at(&target)?;
                if !info.is_dir() {
                    return Err(FsError::NotADirectory).at(&target);
                }
                if !self.core.check_permission(info.id, &self.actor, Capability::Execute) {
                    return Err(FsError::PermissionDenied).at(&target);
                }
                self.cwd = target;
            }
            ShellCommand::Pwd => {
                let _ = writeln!(out, "{}", self.cwd);
            }
            ShellCommand::Whoami => {
                let _ = writeln!(out, "{}", self.actor.name);
            }
            ShellCommand::Mkdir { parents, paths } => {
                for p in paths {
                    let target = self.resolve(&p);
                    if parents {
                        self.core.create_directory_all(&self.actor, &target).at(&p)?;
                    } else {
                        self.core.create_directory(&self.actor, &target).at(&p)?;
                    }
                }
            }
            ShellCommand::Touch { paths } => {
                for p in paths {
                    let target = self.resolve(&p);
                    self.core.create_or_touch_file(&self.actor, &target).at(&p)?;
                }
            }
            ShellCommand::Write { append, path, text } => {
                let target = self.resolve(&path);
                let mut content = text.join(" ");
                content.push('\n');
                self.core.write_file(&self.actor, &target, &content, append).at(&path)?;
            }
            ShellCommand::Cat { paths } => {
                for p in paths {
                    let target = self.resolve(&p);
                    out.push_str(&self.core.read_file(&self.actor, &target).at(&p)?);
                }
            }
            ShellCommand::Ls { long, path } => {
                let shown = path.unwrap_or_else(|| ".".to_string());
                let target = self.resolve(&shown);
                let info = self.core.stat(&target).at(&shown)?;
                let listing = if info.is_dir() {
                    self.core
                        .read_dir(&self.actor, &target)
                        .at(&shown)?
                        .into_iter()
                        .filter_map(|entry| {
                            self.core.node_info(entry.id).map(|info| (entry.name, info))
                        })
                        .collect()
                } else {
                    vec![(path::basename(&target), info)]
                };
                for (name, info) in listing {
                    if long {
                        let _ = writeln!(out, "{}", long_entry(&name, &info));
                    } else {
                        let _ = writeln!(out, "{name}");
                    }
                }
            }
            ShellCommand::Cp { recursive, src, dst } => {
                let (from, to) = (self.resolve(&src), self.resolve(&dst));
                self.core.deep_copy(&self.actor, &from, &to, recursive).at(&src)?;
            }
            ShellCommand::Mv { force, src, dst } => {
                let (from, to) = (self.resolve(&src), self.resolve(&dst));
                self.core.move_node(&self.actor, &from, &to, force).at(&src)?;
            }
            ShellCommand::Ln {
                symbolic,
                force,
                target,
                link,
            } => {
                let link_path = self.resolve(&link);
                if symbolic {
                    // Symlink targets are stored as typed
                    self.core
                        .create_symlink(&self.actor, &target, &link_path, force)
                        .at(&link)?;
                } else {
                    let target_path = self.resolve(&target);
                    self.core
                        .create_hard_link(&self.actor, &target_path, &link_path, force)
                        .at(&link)?;
                }
            }
            ShellCommand::Rm {
                recursive,
                force,
                paths,
            } => {
                for p in paths {
                    let target = self.resolve(&p);
                    self.core.remove(&self.actor, &target, recursive, force).at(&p)?;
                }
            }
            ShellCommand::Chmod { mode, paths } => {
                for p in paths {
                    let target = self.resolve(&p);
                    self.core.set_mode(&self.actor, &target, &mode).at(&p)?;
                }
            }
            ShellCommand::Chown { spec, paths } => {
                let (owner, group) = parse_owner_spec(&spec)?;
                for p in paths {
                    let target = self.resolve(&p);
                    self.core.set_owner(&self.actor, &target, owner, group).at(&p)?;
                }
            }
            ShellCommand::Readlink { path } => {
                let target = self.resolve(&path);
                let _ = writeln!(out, "{}", self.core.read_link(&target).at(&path)?);
            }
            ShellCommand::Stat { path } => {
                let target = self.resolve(&path);
                let info = self.core.stat(&target).at(&path)?;
                out.push_str(&stat_report(&target, &info));
            }
        }
        Ok(out)
    }
}

fn parse_owner_spec(spec: &str) -> Result<(Option<&str>, Option<&str>), ShellError> {
    let (owner, group) = match spec.split_once(':') {
        Some((owner, group)) => (owner, group),
        None => (spec, ""),
    };
    let owner = (!owner.is_empty()).then_some(owner);
    let group = (!group.is_empty()).then_some(group);
    if owner.is_none() && group.is_none() {
        return Err(ShellError::Usage(format!("invalid owner spec '{spec}'")));
    }
    Ok((owner, group))
}

fn type_char(node_type: NodeType) -> char {
    match node_type {
        NodeType::Directory => 'd',
        NodeType::File => '-',
        NodeType::Symlink => 'l',
    }
}

/// `drwxr-xr-x`-style rendering of the type and permission digits
fn permission_string(info: &NodeInfo) -> String {
    let mut rendered = String::with_capacity(10);
    rendered.push(type_char(info.node_type));
    for digit in [info.mode.owner(), info.mode.group(), info.mode.other()] {
        rendered.push(if digit & 4 != 0 { 'r' } else { '-' });
        rendered.push(if digit & 2 != 0 { 'w' } else { '-' });
        rendered.push(if digit & 1 != 0 { 'x' } else { '-' });
    }
    rendered
}

fn long_entry(name: &str, info: &NodeInfo) -> String {
    let mut line = format!(
        "{} {:<8} {:<8} {:>6} {} {}",
        permission_string(info),
        info.owner,
        info.group,
        info.size,
        info.modified.format("%Y-%m-%d %H:%M"),
        name
    );
    if let Some(target) = &info.target {
        let _ = write!(line, " -> {target}");
    }
    line
}

fn stat_report(path: &str, info: &NodeInfo) -> String {
    let kind = match info.node_type {
        NodeType::Directory => "directory",
        NodeType::File => "regular file",
        NodeType::Symlink => "symbolic link",
    };
    let mut report = String::new();
    match &info.target {
        Some(target) => {
            let _ = writeln!(report, "  File: {path} -> {target}");
        }
        None => {
            let _ = writeln!(report, "  File: {path}");
        }
    }
    let _ = writeln!(report, "  Size: {}\tNode: {}\t{kind}", info.size, info.id);
    let _ = writeln!(
        report,
        "Access: ({}/{})  Owner: {}  Group: {}",
        info.mode,
        permission_string(info),
        info.owner,
        info.group
    );
    let _ = writeln!(report, "Modify: {}", info.modified.to_rfc3339());
    report
}
