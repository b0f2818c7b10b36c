//! Role lattice for operation authorization
//!
//! Five roles in strict order: viewer < contributor < editor < co-admin <
//! admin. Every mutation endpoint is guarded by exactly one of the
//! predicates below. `editor` is retained for back-compatibility: it edits
//! the tree like a co-admin but cannot approve suggestions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User role granting tree and moderation capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Role {
    /// Read-only access to the tree
    #[default]
    Viewer = 0,
    /// May propose changes through the suggestion queue
    Contributor = 1,
    /// May edit the tree directly (legacy tier)
    Editor = 2,
    /// May edit directly and review suggestions
    CoAdmin = 3,
    /// Full control, including user management
    Admin = 4,
}

impl Role {
    /// Direct tree mutations (create/update/delete a person)
    pub fn can_edit_directly(self) -> bool {
        matches!(self, Role::Editor | Role::CoAdmin | Role::Admin)
    }

    /// Reviewing suggestions and identity claims
    pub fn can_approve(self) -> bool {
        matches!(self, Role::CoAdmin | Role::Admin)
    }

    /// User management: role changes, revocation, user deletion
    pub fn can_manage_users(self) -> bool {
        self == Role::Admin
    }

    /// Submitting suggestions to the moderation queue
    pub fn can_suggest(self) -> bool {
        matches!(
            self,
            Role::Contributor | Role::Editor | Role::CoAdmin | Role::Admin
        )
    }

    /// Parse a role tag as stored in documents and JWT claims
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "viewer" => Some(Role::Viewer),
            "contributor" => Some(Role::Contributor),
            "editor" => Some(Role::Editor),
            "co-admin" => Some(Role::CoAdmin),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Contributor => "contributor",
            Role::Editor => "editor",
            Role::CoAdmin => "co-admin",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Role; 5] = [
        Role::Viewer,
        Role::Contributor,
        Role::Editor,
        Role::CoAdmin,
        Role::Admin,
    ];

    #[test]
    fn test_ordering() {
        assert!(Role::Viewer < Role::Contributor);
        assert!(Role::Contributor < Role::Editor);
        assert!(Role::Editor < Role::CoAdmin);
        assert!(Role::CoAdmin < Role::Admin);
    }

    #[test]
    fn test_predicates() {
        assert!(!Role::Contributor.can_edit_directly());
        assert!(Role::Editor.can_edit_directly());
        assert!(!Role::Editor.can_approve());
        assert!(Role::CoAdmin.can_approve());
        assert!(!Role::CoAdmin.can_manage_users());
        assert!(Role::Admin.can_manage_users());
        assert!(!Role::Viewer.can_suggest());
        assert!(Role::Contributor.can_suggest());
    }

    // Lattice implications: manage ⇒ approve ⇒ edit, approve ⇒ suggest
    #[test]
    fn test_lattice_implications() {
        for role in ALL {
            if role.can_manage_users() {
                assert!(role.can_approve(), "{role}: manage must imply approve");
            }
            if role.can_approve() {
                assert!(role.can_edit_directly(), "{role}: approve must imply edit");
                assert!(role.can_suggest(), "{role}: approve must imply suggest");
            }
        }
    }

    #[test]
    fn test_serde_tags() {
        let json = serde_json::to_string(&Role::CoAdmin).unwrap();
        assert_eq!(json, "\"co-admin\"");
        let role: Role = serde_json::from_str("\"contributor\"").unwrap();
        assert_eq!(role, Role::Contributor);
    }

    #[test]
    fn test_parse_round_trip() {
        for role in ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }
}
