use serde::{Deserialize, Serialize};
use std::fmt;

/// JID of the broadcast channel that carries status posts.
pub const STATUS_BROADCAST_JID: &str = "status@broadcast";

/// Server suffix used by group chats.
pub const GROUP_SERVER: &str = "g.us";

/// Coarse classification of a chat JID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Direct,
    Group,
    Broadcast,
}

impl ChatKind {
    pub fn of(jid: &str) -> Self {
        match jid.rsplit_once('@').map(|(_, server)| server) {
            Some(server) if server == GROUP_SERVER => ChatKind::Group,
            Some("broadcast") => ChatKind::Broadcast,
            _ => ChatKind::Direct,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ChatKind::Group)
    }
}

/// Returns `true` for the status broadcast channel.
pub fn is_status_broadcast(jid: &str) -> bool {
    jid == STATUS_BROADCAST_JID
}

/// User part of a JID with any device suffix removed.
///
/// `"94770000000:12@s.whatsapp.net"` → `"94770000000"`.
pub fn jid_user(jid: &str) -> &str {
    let user = jid.split_once('@').map(|(u, _)| u).unwrap_or(jid);
    user.split_once(':').map(|(u, _)| u).unwrap_or(user)
}

/// Which chats commands are accepted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OperatingMode {
    /// Only owners may run commands.
    #[default]
    Private,
    /// Everyone may run commands.
    Public,
    /// Commands from group chats only (owners everywhere).
    GroupOnly,
    /// Commands from direct chats only (owners everywhere).
    InboxOnly,
}

impl OperatingMode {
    /// Decide whether a command from this sender/chat combination is processed.
    pub fn allows_command(&self, is_owner: bool, is_group: bool) -> bool {
        if is_owner {
            return true;
        }
        match self {
            OperatingMode::Private => false,
            OperatingMode::Public => true,
            OperatingMode::GroupOnly => is_group,
            OperatingMode::InboxOnly => !is_group,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Private => write!(f, "private"),
            OperatingMode::Public => write!(f, "public"),
            OperatingMode::GroupOnly => write!(f, "group-only"),
            OperatingMode::InboxOnly => write!(f, "inbox-only"),
        }
    }
}

impl std::str::FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(OperatingMode::Private),
            "public" => Ok(OperatingMode::Public),
            "group-only" | "groups" => Ok(OperatingMode::GroupOnly),
            "inbox-only" | "inbox" => Ok(OperatingMode::InboxOnly),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}
