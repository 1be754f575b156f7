use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Ordered caller authority. A command runs only when the caller's level is at least the
/// command's required level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum PrivilegeLevel {
    #[default]
    Member = 0,
    GroupModerator = 1,
    Owner = 2,
}

impl PrivilegeLevel {
    /// Name shown to users in denial messages.
    pub fn role_name(self) -> &'static str {
        match self {
            PrivilegeLevel::Member => "User",
            PrivilegeLevel::GroupModerator => "Group Admin",
            PrivilegeLevel::Owner => "Bot Owner",
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role_name())
    }
}

/// A numeric level outside `0..=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown privilege level {0} (expected 0, 1 or 2)")]
pub struct UnknownPrivilege(pub u8);

impl TryFrom<u8> for PrivilegeLevel {
    type Error = UnknownPrivilege;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PrivilegeLevel::Member),
            1 => Ok(PrivilegeLevel::GroupModerator),
            2 => Ok(PrivilegeLevel::Owner),
            other => Err(UnknownPrivilege(other)),
        }
    }
}

impl From<PrivilegeLevel> for u8 {
    fn from(level: PrivilegeLevel) -> Self {
        level.as_u8()
    }
}

/// One entry of a group's membership snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: String,
    #[serde(default)]
    pub is_moderator: bool,
}

impl GroupMember {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), is_moderator: false }
    }

    pub fn moderator(id: impl Into<String>) -> Self {
        Self { id: id.into(), is_moderator: true }
    }
}

/// Where a message arrived, with whatever membership was already fetched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConversationContext {
    /// One-to-one conversation.
    #[default]
    Direct,
    /// Group conversation and its membership snapshot.
    Group { members: Vec<GroupMember> },
}

impl ConversationContext {
    pub fn group(members: impl IntoIterator<Item = GroupMember>) -> Self {
        ConversationContext::Group { members: members.into_iter().collect() }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ConversationContext::Group { .. })
    }

    /// Membership entry for `id`, if this is a group and the caller is in the snapshot.
    pub fn member(&self, id: &str) -> Option<&GroupMember> {
        match self {
            ConversationContext::Direct => None,
            ConversationContext::Group { members } => members.iter().find(|m| m.id == id),
        }
    }
}

/// Maps a caller and its conversation to a privilege level. Implementations must not do I/O.
pub trait PermissionResolver: Send + Sync {
    fn resolve(&self, caller: &str, context: &ConversationContext) -> PrivilegeLevel;
}

/// Owner set from configuration, then group moderator flag, then member.
#[derive(Debug, Clone, Default)]
pub struct OwnerListResolver {
    owners: HashSet<String>,
}

impl OwnerListResolver {
    pub fn new<I, S>(owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { owners: owners.into_iter().map(Into::into).collect() }
    }

    pub fn is_owner(&self, caller: &str) -> bool {
        self.owners.contains(caller)
    }
}

impl PermissionResolver for OwnerListResolver {
    fn resolve(&self, caller: &str, context: &ConversationContext) -> PrivilegeLevel {
        if self.is_owner(caller) {
            return PrivilegeLevel::Owner;
        }
        match context.member(caller) {
            Some(member) if member.is_moderator => PrivilegeLevel::GroupModerator,
            _ => PrivilegeLevel::Member,
        }
    }
}
