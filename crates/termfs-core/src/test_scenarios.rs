// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{path, Actor, Capability, FsConfig, FsCore, FsError, FsSnapshot, NodeType};

const CLASSROOM: &str = r#"
[[seed.groups]]
name = "students"
gid = 100
members = ["alice", "bob"]

[[seed.groups]]
name = "alice"
gid = 1000

[[seed.groups]]
name = "bob"
gid = 1001

[[seed.users]]
name = "alice"
uid = 1000
gid = 1000
home = "/home/alice"

[[seed.users]]
name = "bob"
uid = 1001
gid = 1001
home = "/home/bob"

[[seed.directories]]
path = "/tmp"
mode = "1777"

[[seed.directories]]
path = "/home/alice"
mode = "0750"
owner = "alice"
group = "alice"

[[seed.directories]]
path = "/home/bob"
mode = "0755"
owner = "bob"
group = "bob"
"#;

fn classroom() -> (FsCore, Actor, Actor, Actor) {
    let config = FsConfig::from_toml_str(CLASSROOM).unwrap();
    let core = FsCore::new(config).unwrap();
    let root = core.actor_for("root").unwrap();
    let alice = core.actor_for("alice").unwrap();
    let bob = core.actor_for("bob").unwrap();
    (core, root, alice, bob)
}

#[test]
fn test_resolution_properties() {
    let (core, _, alice, _) = classroom();
    for input in ["/a/./b/./", "a/../../b", "~", "~/notes/../todo", "//x//y/", "/.."] {
        let once = core.resolve(&alice, "/home/alice/work", input);
        assert_eq!(core.resolve(&alice, "/", &once), once, "not idempotent for {input}");
    }
    assert_eq!(core.resolve(&alice, "/", "/.."), "/");
    assert_eq!(core.resolve(&alice, "/", "/a/../../.."), "/");
    assert_eq!(core.resolve(&alice, "/", "/a/./b/./"), "/a/b");
    assert_eq!(core.resolve(&alice, "/tmp", "~"), "/home/alice");
    assert_eq!(core.resolve(&alice, "/tmp", "~/x"), "/home/alice/x");
    assert_eq!(core.resolve(&alice, "/tmp", "../etc"), "/etc");
    assert_eq!(path::basename("/"), "/");
    assert_eq!(path::parent_path("/"), "/");
    assert_eq!(path::parent_path("/home/alice"), "/home");
}

#[test]
fn test_seeded_home_directories() {
    let (core, _, alice, bob) = classroom();
    let home = core.stat("/home/alice").unwrap();
    assert_eq!(home.owner, "alice");
    assert_eq!(home.mode.to_string(), "0750");
    // Intermediate /home was created with the default directory mode
    assert_eq!(core.stat("/home").unwrap().mode.to_string(), "0755");

    let diary = core.resolve(&alice, "/", "~/diary");
    core.write_file(&alice, &diary, "dear diary", false).unwrap();
    assert_eq!(core.stat("/home/alice/diary").unwrap().group, "alice");
    assert!(matches!(core.read_dir(&bob, "/home/alice"), Err(FsError::PermissionDenied)));
}

#[test]
fn test_hard_link_aliasing_survives_removal() {
    let (core, root, _, _) = classroom();
    core.create_directory(&root, "/a").unwrap();
    core.create_directory(&root, "/b").unwrap();
    core.write_file(&root, "/a/f", "contents", false).unwrap();
    core.create_hard_link(&root, "/a/f", "/b/g", false).unwrap();

    assert_eq!(core.lookup("/a/f"), core.lookup("/b/g"));
    core.remove(&root, "/a/f", false, false).unwrap();
    assert_eq!(core.lookup("/a/f"), None);
    assert_eq!(core.read_file(&root, "/b/g").unwrap(), "contents");
}

#[test]
fn test_copy_independence() {
    let (core, root, _, _) = classroom();
    core.create_directory(&root, "/a").unwrap();
    core.write_file(&root, "/a/file.txt", "v1", false).unwrap();
    core.deep_copy(&root, "/a", "/b", true).unwrap();

    core.write_file(&root, "/b/file.txt", "v2", false).unwrap();
    assert_eq!(core.read_file(&root, "/a/file.txt").unwrap(), "v1");
    assert_eq!(core.read_file(&root, "/b/file.txt").unwrap(), "v2");
}

#[test]
fn test_move_keeps_alias_identity() {
    let (core, root, _, _) = classroom();
    core.create_directory(&root, "/a").unwrap();
    core.create_directory(&root, "/b").unwrap();
    core.write_file(&root, "/a/f", "before", false).unwrap();
    core.create_hard_link(&root, "/a/f", "/tmp/alias", false).unwrap();

    core.move_node(&root, "/a/f", "/b/f", false).unwrap();
    core.write_file(&root, "/b/f", "after", false).unwrap();
    assert_eq!(core.read_file(&root, "/tmp/alias").unwrap(), "after");
}

#[test]
fn test_owner_precedence_over_group() {
    let (core, _, alice, bob) = classroom();
    let id = core.create_or_touch_file(&alice, "/tmp/report").unwrap();
    core.set_owner(&alice, "/tmp/report", None, Some("students")).unwrap();
    core.set_mode(&alice, "/tmp/report", "0740").unwrap();

    // alice is also in students, whose digit has no write bit
    assert!(core.check_permission(id, &alice, Capability::Write));
    assert!(!core.check_permission(id, &bob, Capability::Write));
    assert!(core.check_permission(id, &bob, Capability::Read));
    assert!(matches!(
        core.write_file(&bob, "/tmp/report", "x", false),
        Err(FsError::PermissionDenied)
    ));
}

#[test]
fn test_mkdir_twice() {
    let (core, root, _, _) = classroom();
    core.create_directory(&root, "/x").unwrap();
    assert!(matches!(core.create_directory(&root, "/x"), Err(FsError::AlreadyExists)));
}

#[test]
fn test_symlink_lookup_returns_link_itself() {
    let (core, root, _, _) = classroom();
    core.create_directory(&root, "/x").unwrap();
    core.create_or_touch_file(&root, "/x/a.txt").unwrap();
    core.create_symlink(&root, "/x/a.txt", "/x/link", false).unwrap();

    let id = core.lookup("/x/link").unwrap();
    assert_ne!(Some(id), core.lookup("/x/a.txt"));
    let info = core.node_info(id).unwrap();
    assert_eq!(info.node_type, NodeType::Symlink);
    assert_eq!(info.target.as_deref(), Some("/x/a.txt"));
}

#[test]
fn test_rm_needs_recursive_for_directories() {
    let (core, root, _, _) = classroom();
    core.create_directory(&root, "/x").unwrap();
    core.create_or_touch_file(&root, "/x/a.txt").unwrap();

    assert!(matches!(core.remove(&root, "/x", false, false), Err(FsError::IsADirectory)));
    core.remove(&root, "/x", true, false).unwrap();
    assert_eq!(core.lookup("/x"), None);
    assert_eq!(core.lookup("/x/a.txt"), None);
}

#[test]
fn test_root_chmod_ignores_mode_bits() {
    let (core, root, alice, _) = classroom();
    core.create_or_touch_file(&alice, "/home/alice/locked").unwrap();
    core.set_mode(&alice, "/home/alice/locked", "000").unwrap();
    core.set_mode(&root, "/home/alice/locked", "0644").unwrap();
    assert_eq!(core.stat("/home/alice/locked").unwrap().mode.to_string(), "0644");
    assert_eq!(core.read_file(&root, "/home/alice/locked").unwrap(), "");
}

#[test]
fn test_sticky_tmp_is_not_enforced() {
    let (core, _, alice, bob) = classroom();
    core.create_or_touch_file(&alice, "/tmp/alices").unwrap();
    // The sticky digit is stored, not enforced: /tmp is world-writable
    core.remove(&bob, "/tmp/alices", false, false).unwrap();
    assert_eq!(core.stat("/tmp").unwrap().mode.special(), 1);
}

#[test]
fn test_snapshot_file_round_trip() {
    let (core, root, alice, _) = classroom();
    core.create_directory_all(&root, "/srv/data").unwrap();
    core.write_file(&alice, "/tmp/shared", "payload", false).unwrap();
    core.create_hard_link(&root, "/tmp/shared", "/srv/data/alias", false).unwrap();
    core.create_symlink(&root, "../tmp/shared", "/srv/link", false).unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("snapshot.json");
    std::fs::write(&file, core.snapshot().to_json().unwrap()).unwrap();

    let text = std::fs::read_to_string(&file).unwrap();
    let restored =
        FsCore::from_snapshot(FsConfig::default(), FsSnapshot::from_json(&text).unwrap()).unwrap();

    assert_eq!(restored.lookup("/tmp/shared"), restored.lookup("/srv/data/alias"));
    assert_eq!(restored.read_link("/srv/link").unwrap(), "../tmp/shared");
    assert_eq!(restored.stat("/tmp/shared").unwrap().owner, "alice");
    assert!(restored.user("bob").is_some());
    assert_eq!(restored.actor_for("alice").unwrap().home, "/home/alice");
}

#[test]
fn test_corrupt_snapshot_is_rejected() {
    assert!(matches!(FsSnapshot::from_json("{not json"), Err(FsError::Snapshot(_))));
}
