// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

mod shell;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use termfs_core::{FsConfig, FsCore, FsSnapshot};
use termfs_logging::CliLoggingArgs;
use tracing::{info, warn};

use crate::shell::Session;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run shell-style commands against an in-memory Unix filesystem"
)]
struct Cli {
    /// User to act as
    #[arg(long, default_value = "root")]
    user: String,

    /// TOML configuration (permission policy, default modes, seed layout)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Restore the tree from a JSON snapshot instead of seeding it
    #[arg(long)]
    snapshot_in: Option<PathBuf>,

    /// Save the tree to a JSON snapshot when done
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    #[command(flatten)]
    logging: CliLoggingArgs,

    /// Command lines such as "mkdir -p /srv/www"; read from stdin when absent
    commands: Vec<String>,
}

fn load_config(path: Option<&Path>) -> Result<FsConfig> {
    let Some(path) = path else {
        return Ok(FsConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    FsConfig::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn open_filesystem(config: FsConfig, snapshot: Option<&Path>) -> Result<FsCore> {
    match snapshot {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read snapshot {}", path.display()))?;
            let snapshot = FsSnapshot::from_json(&text)?;
            FsCore::from_snapshot(config, snapshot)
                .with_context(|| format!("invalid snapshot {}", path.display()))
        }
        None => FsCore::new(config).context("failed to seed filesystem"),
    }
}

fn save_snapshot(core: &FsCore, path: &Path) -> Result<()> {
    let json = core.snapshot().to_json()?;
    fs::write(path, json).with_context(|| format!("failed to write snapshot {}", path.display()))?;
    info!(path = %path.display(), "snapshot saved");
    Ok(())
}

/// Run every line, reporting failures on stderr. Returns the number of
/// failed lines.
fn run_script<I>(session: &mut Session<'_>, lines: I) -> usize
where
    I: IntoIterator<Item = String>,
{
    let mut failures = 0;
    for line in lines {
        match session.run_line(&line) {
            Ok(output) => print!("{output}"),
            Err(e) => {
                failures += 1;
                let command = line.split_whitespace().next().unwrap_or_default();
                eprintln!("termfs: {command}: {e}");
            }
        }
    }
    failures
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    cli.logging.clone().init("termfs")?;

    let config = load_config(cli.config.as_deref())?;
    let core = open_filesystem(config, cli.snapshot_in.as_deref())?;
    let actor = core.actor_for(&cli.user)?;
    if core.user(&cli.user).is_some_and(|record| record.locked) {
        warn!(user = %cli.user, "acting as a locked account");
    }

    let mut session = Session::new(&core, actor);
    let failures = if cli.commands.is_empty() {
        let lines = io::stdin().lock().lines().collect::<io::Result<Vec<_>>>()?;
        run_script(&mut session, lines)
    } else {
        run_script(&mut session, cli.commands.clone())
    };

    info!(user = %cli.user, cwd = session.cwd(), failures, "script finished");

    if let Some(path) = cli.snapshot_out.as_deref() {
        save_snapshot(&core, path)?;
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::try_parse_from([
            "termfs",
            "--user",
            "alice",
            "--log-level",
            "debug",
            "mkdir /x",
            "ls /",
        ])
        .unwrap();
        assert_eq!(cli.user, "alice");
        assert_eq!(cli.commands, vec!["mkdir /x", "ls /"]);
        assert!(cli.logging.log_level.is_some());
        assert!(cli.snapshot_in.is_none());
    }

    #[test]
    fn test_config_and_snapshot_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("termfs.toml");
        fs::write(&config_path, "[defaults]\nfile-mode = \"0600\"\n").unwrap();
        let config = load_config(Some(&config_path)).unwrap();

        let core = open_filesystem(config.clone(), None).unwrap();
        let mut session = Session::new(&core, core.actor_for("root").unwrap());
        let failures = run_script(
            &mut session,
            [
                "mkdir /data",
                "write /data/f hi",
                "ln /data/f /data/g",
                "rm /missing",
            ]
            .map(String::from),
        );
        assert_eq!(failures, 1);

        let snapshot_path = dir.path().join("tree.json");
        save_snapshot(&core, &snapshot_path).unwrap();
        let restored = open_filesystem(config, Some(&snapshot_path)).unwrap();
        assert_eq!(restored.lookup("/data/f"), restored.lookup("/data/g"));
        assert_eq!(restored.stat("/data/f").unwrap().mode.to_string(), "0600");
    }

    #[test]
    fn test_missing_config_is_reported() {
        let err = load_config(Some(Path::new("/nonexistent/termfs.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
