//! Members and their roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CommunityError;

/// Site role of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    Author,
    Contributor,
    Subscriber,
}

impl Role {
    /// Returns the lowercase role name.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Editor => "editor",
            Role::Author => "author",
            Role::Contributor => "contributor",
            Role::Subscriber => "subscriber",
        }
    }

    /// Whether the role may manage profile fields and other members' avatars.
    pub fn can_moderate(self) -> bool {
        matches!(self, Role::Administrator | Role::Editor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CommunityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "administrator" => Ok(Role::Administrator),
            "editor" => Ok(Role::Editor),
            "author" => Ok(Role::Author),
            "contributor" => Ok(Role::Contributor),
            "subscriber" => Ok(Role::Subscriber),
            other => Err(CommunityError::invalid(
                "role",
                format!("unknown role '{}'", other),
            )),
        }
    }
}

/// A registered member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Member id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Site role
    pub role: Role,
    /// Bearer token identifying the member on API requests
    pub token: String,
}

impl Member {
    /// Whether this member holds the moderation capability.
    pub fn can_moderate(&self) -> bool {
        self.role.can_moderate()
    }

    /// Whether this member may change the avatar of `member_id`.
    pub fn can_edit_member(&self, member_id: u64) -> bool {
        self.id == member_id || self.can_moderate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64, role: Role) -> Member {
        Member {
            id,
            name: format!("member-{}", id),
            role,
            token: format!("token-{}", id),
        }
    }

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!("Administrator".parse::<Role>().unwrap(), Role::Administrator);
        assert_eq!(" subscriber ".parse::<Role>().unwrap(), Role::Subscriber);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_moderation_capability() {
        assert!(Role::Administrator.can_moderate());
        assert!(Role::Editor.can_moderate());
        assert!(!Role::Author.can_moderate());
        assert!(!Role::Subscriber.can_moderate());
    }

    #[test]
    fn test_can_edit_member() {
        let subscriber = member(2, Role::Subscriber);
        assert!(subscriber.can_edit_member(2));
        assert!(!subscriber.can_edit_member(3));

        let admin = member(1, Role::Administrator);
        assert!(admin.can_edit_member(3));
    }
}
