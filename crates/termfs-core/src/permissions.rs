// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Owner/group/other permission evaluation

use crate::identity::IdentityDb;
use crate::node::Node;
use crate::types::{Actor, Capability};

/// Decide whether `actor` may exercise `capability` on `node`.
///
/// The superuser always passes. Otherwise exactly one class applies, in
/// order: owner, then group member, then other. A class that applies but
/// lacks the bit denies even if a later class would grant it. The special
/// digit of the mode is ignored.
pub(crate) fn allowed(
    node: &Node,
    actor: &Actor,
    identities: &IdentityDb,
    capability: Capability,
) -> bool {
    if actor.is_superuser() {
        return true;
    }

    let digit = if actor.name == node.owner {
        node.mode.owner()
    } else if identities.is_member(actor, &node.group) {
        node.mode.group()
    } else {
        node.mode.other()
    };

    digit & capability.bit() != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserRecord;
    use crate::types::Mode;
    use chrono::Utc;

    fn identities() -> IdentityDb {
        let mut db = IdentityDb::new();
        db.add_group("root", 0).unwrap();
        db.add_group("devs", 100).unwrap();
        db.add_group("users", 1000).unwrap();
        let users = [
            ("root", 0, 0),
            ("alice", 1000, 1000),
            ("bob", 1001, 1000),
            ("eve", 1002, 1002),
        ];
        for (name, uid, gid) in users {
            db.add_user(
                name,
                UserRecord {
                    uid,
                    gid,
                    home: format!("/home/{name}"),
                    shell: "/bin/sh".into(),
                    locked: false,
                },
            )
            .unwrap();
        }
        db.add_member("devs", "alice").unwrap();
        db.add_member("devs", "bob").unwrap();
        db
    }

    fn node(mode: &str, owner: &str, group: &str) -> Node {
        Node::file(Mode::parse(mode).unwrap(), owner, group, Utc::now())
    }

    #[test]
    fn test_owner_class_wins_over_group() {
        let db = identities();
        let alice = db.actor("alice").unwrap();
        // alice owns the node and is also in devs, whose digit lacks write
        let file = node("0740", "alice", "devs");
        assert!(allowed(&file, &alice, &db, Capability::Write));
        assert!(allowed(&file, &alice, &db, Capability::Execute));
    }

    #[test]
    fn test_group_member_uses_group_digit() {
        let db = identities();
        let bob = db.actor("bob").unwrap();
        let file = node("0740", "alice", "devs");
        assert!(allowed(&file, &bob, &db, Capability::Read));
        assert!(!allowed(&file, &bob, &db, Capability::Write));
    }

    #[test]
    fn test_no_fallthrough_to_other() {
        let db = identities();
        let bob = db.actor("bob").unwrap();
        let eve = db.actor("eve").unwrap();
        let file = node("0607", "alice", "devs");
        // bob is in devs: the group digit (0) decides even though other is 7
        assert!(!allowed(&file, &bob, &db, Capability::Read));
        assert!(allowed(&file, &eve, &db, Capability::Read));
        // owner digit 6 has no execute bit
        let alice = db.actor("alice").unwrap();
        assert!(!allowed(&file, &alice, &db, Capability::Execute));
    }

    #[test]
    fn test_primary_gid_counts_as_membership() {
        let db = identities();
        let bob = db.actor("bob").unwrap();
        let file = node("0060", "alice", "users");
        assert!(allowed(&file, &bob, &db, Capability::Write));
    }

    #[test]
    fn test_superuser_bypasses_everything() {
        let db = identities();
        let root = db.actor("root").unwrap();
        let file = node("0000", "alice", "devs");
        for capability in [Capability::Read, Capability::Write, Capability::Execute] {
            assert!(allowed(&file, &root, &db, capability));
        }
    }

    #[test]
    fn test_special_digit_is_ignored() {
        let db = identities();
        let eve = db.actor("eve").unwrap();
        let sticky = Node::directory(Mode::parse("1777").unwrap(), "root", "root", Utc::now());
        assert!(allowed(&sticky, &eve, &db, Capability::Write));
        let setuid = node("4700", "alice", "devs");
        assert!(!allowed(&setuid, &eve, &db, Capability::Read));
    }
}
