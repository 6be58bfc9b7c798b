//! Role-partitioned member lists.
//!
//! A project and each of its environments carry their own `members`
//! descriptor. Roles are contextual: the same identity may be an admin of one
//! environment and a reader of another.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KeystoneError, Result};
use crate::path::DescriptorType;

/// Prefix of the generated identities backing share links.
pub const SHARED_MEMBER_PREFIX: &str = "{{shared}}";

/// A member of a project or environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl Member {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            email: None,
            public_key: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    /// Whether this member was generated for a share link.
    pub fn is_shared(&self) -> bool {
        self.identity.starts_with(SHARED_MEMBER_PREFIX)
    }
}

/// Role of a member within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Contributor,
    Reader,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Contributor, Role::Reader];

    /// Roles allowed to write descriptors.
    pub const WRITERS: [Role; 2] = [Role::Admin, Role::Contributor];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Contributor => "contributor",
            Role::Reader => "reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" | "admins" => Ok(Role::Admin),
            "contributor" | "contributors" => Ok(Role::Contributor),
            "reader" | "readers" => Ok(Role::Reader),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Content of a `members` descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Members {
    #[serde(default)]
    pub admins: Vec<Member>,
    #[serde(default)]
    pub contributors: Vec<Member>,
    #[serde(default)]
    pub readers: Vec<Member>,
}

impl Members {
    /// Members of a freshly created scope: `creator` is the sole admin.
    pub fn with_admin(creator: Member) -> Self {
        Self {
            admins: vec![creator],
            ..Default::default()
        }
    }

    pub fn list(&self, role: Role) -> &[Member] {
        match role {
            Role::Admin => &self.admins,
            Role::Contributor => &self.contributors,
            Role::Reader => &self.readers,
        }
    }

    fn list_mut(&mut self, role: Role) -> &mut Vec<Member> {
        match role {
            Role::Admin => &mut self.admins,
            Role::Contributor => &mut self.contributors,
            Role::Reader => &mut self.readers,
        }
    }

    /// Members holding any of `roles`, in role order.
    pub fn extract_by_role(&self, roles: &[Role]) -> Vec<Member> {
        roles
            .iter()
            .flat_map(|role| self.list(*role).iter().cloned())
            .collect()
    }

    /// Every member of the scope.
    pub fn all(&self) -> Vec<Member> {
        self.extract_by_role(&Role::ALL)
    }

    pub fn find(&self, identity: &str) -> Option<&Member> {
        Role::ALL
            .iter()
            .find_map(|role| self.list(*role).iter().find(|m| m.identity == identity))
    }

    pub fn role_of(&self, identity: &str) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| self.list(*role).iter().any(|m| m.identity == identity))
    }

    pub fn has_role(&self, identity: &str, roles: &[Role]) -> bool {
        self.role_of(identity).is_some_and(|r| roles.contains(&r))
    }

    /// Fail unless `identity` holds one of `roles`.
    pub fn assert_has_role(&self, identity: &str, roles: &[Role]) -> Result<()> {
        if self.has_role(identity, roles) {
            return Ok(());
        }
        if roles == [Role::Admin] {
            Err(KeystoneError::NeedToBeAdmin)
        } else {
            Err(KeystoneError::NeedToBeAdminOrContributor)
        }
    }

    /// Add a member under `role`.
    pub fn add(&mut self, member: Member, role: Role) -> Result<()> {
        if self.role_of(&member.identity).is_some() {
            return Err(KeystoneError::AlreadyInProject {
                identity: member.identity,
            });
        }
        self.list_mut(role).push(member);
        Ok(())
    }

    /// Remove an identity from every role. Returns the removed record.
    pub fn remove(&mut self, identity: &str) -> Option<Member> {
        let mut removed = None;
        for role in Role::ALL {
            let list = self.list_mut(role);
            if let Some(pos) = list.iter().position(|m| m.identity == identity) {
                removed = Some(list.remove(pos));
            }
        }
        removed
    }

    /// Move an existing member to `role`. Returns `false` when the identity is
    /// unknown or already holds that role.
    pub fn set_role(&mut self, identity: &str, role: Role) -> bool {
        if self.role_of(identity) == Some(role) {
            return false;
        }
        match self.remove(identity) {
            Some(member) => {
                self.list_mut(role).push(member);
                true
            }
            None => false,
        }
    }

    pub fn has_admin(&self) -> bool {
        !self.admins.is_empty()
    }

    /// Members whose copy of a `kind` descriptor is trusted on fan-in.
    pub fn readable(&self, kind: DescriptorType) -> Vec<Member> {
        self.extract_by_role(read_roles(kind))
    }

    /// Members who receive a copy on fan-out.
    pub fn writable(&self) -> Vec<Member> {
        self.all()
    }
}

/// Roles whose copies are read when fetching a descriptor of `kind`.
///
/// Member lists are only trusted from admins.
pub fn read_roles(kind: DescriptorType) -> &'static [Role] {
    match kind {
        DescriptorType::Members => &[Role::Admin],
        _ => &Role::WRITERS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Members {
        let mut members = Members::with_admin(Member::new("alice"));
        members.add(Member::new("bob"), Role::Contributor).unwrap();
        members.add(Member::new("carol"), Role::Reader).unwrap();
        members
    }

    #[test]
    fn test_assert_has_role() {
        let members = sample();
        assert!(members.assert_has_role("alice", &[Role::Admin]).is_ok());
        assert!(matches!(
            members.assert_has_role("bob", &[Role::Admin]),
            Err(KeystoneError::NeedToBeAdmin)
        ));
        assert!(members.assert_has_role("bob", &Role::WRITERS).is_ok());
        assert!(matches!(
            members.assert_has_role("carol", &Role::WRITERS),
            Err(KeystoneError::NeedToBeAdminOrContributor)
        ));
        assert!(members.assert_has_role("mallory", &Role::WRITERS).is_err());
    }

    #[test]
    fn test_add_existing_member_in_any_role_fails() {
        let mut members = sample();
        let err = members.add(Member::new("carol"), Role::Admin).unwrap_err();
        assert!(matches!(err, KeystoneError::AlreadyInProject { identity } if identity == "carol"));
    }

    #[test]
    fn test_remove_absent_member_is_noop() {
        let mut members = sample();
        let before = members.clone();
        assert!(members.remove("mallory").is_none());
        assert_eq!(members, before);
    }

    #[test]
    fn test_set_role_moves_member() {
        let mut members = sample();
        assert!(members.set_role("carol", Role::Contributor));
        assert_eq!(members.role_of("carol"), Some(Role::Contributor));
        assert!(members.readers.is_empty());
        assert!(!members.set_role("carol", Role::Contributor));
        assert!(!members.set_role("mallory", Role::Admin));
    }

    #[test]
    fn test_read_and_write_sets() {
        let members = sample();
        let ids = |list: Vec<Member>| list.into_iter().map(|m| m.identity).collect::<Vec<_>>();
        assert_eq!(ids(members.readable(DescriptorType::Members)), vec!["alice"]);
        assert_eq!(ids(members.readable(DescriptorType::File)), vec!["alice", "bob"]);
        assert_eq!(ids(members.writable()), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_wire_format() {
        let members = Members::with_admin(Member::new("alice").with_public_key("pk-alice"));
        let json = serde_json::to_value(&members).unwrap();
        assert_eq!(json["admins"][0]["publicKey"], "pk-alice");
        assert!(json["admins"][0].get("email").is_none());
        assert_eq!(json["readers"], serde_json::json!([]));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("admins".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Reader".parse::<Role>().unwrap(), Role::Reader);
        assert!("owner".parse::<Role>().is_err());
    }
}
