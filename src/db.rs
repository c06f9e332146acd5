use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How many messages a room keeps, in memory and in the local snapshot.
pub const MESSAGE_CAP: usize = 50;

/// How many trailing messages per room go into the condensed backup payload.
pub const BACKUP_TAIL: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Mod,
    Member,
}

impl FromStr for Role {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "mod" => Ok(Role::Mod),
            "member" => Ok(Role::Member),
            other => Err(ChatError::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Owner => "owner",
            Role::Mod => "mod",
            Role::Member => "member",
        })
    }
}

/// One directory record, keyed by username. Created on first join, never
/// deleted. Avatar and tag are client-asserted display hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub avatar: String,
    pub tag: String,
    pub role: Role,
    pub muted: bool,
}

/// A chat message as it is logged and broadcast. The author fields are
/// stamped by the server from the directory, never taken from the client.
/// `time` is a display string supplied by the sender; ordering is by
/// arrival, not by this field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub room: String,
    pub text: String,
    pub time: String,
    pub username: String,
    pub avatar: String,
    pub role: Role,
}

/// The serializable projection of everything durable: the full directory
/// plus every room's message log. This is the unit both stores work in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub users: HashMap<String, User>,
    pub messages: HashMap<String, VecDeque<Message>>,
}

impl Snapshot {
    /// Projection pushed to the backup channel: every user, but only the
    /// last [`BACKUP_TAIL`] messages per room, to bound the payload size.
    pub fn condensed(&self) -> Snapshot {
        let messages = self
            .messages
            .iter()
            .map(|(room, log)| {
                let skip = log.len().saturating_sub(BACKUP_TAIL);
                (room.clone(), log.iter().skip(skip).cloned().collect())
            })
            .collect();
        Snapshot { users: self.users.clone(), messages }
    }
}

/// Everything a client event can be rejected for. Each variant surfaces as
/// exactly one `error-msg` event to the acting session; none is fatal.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("you are not allowed to do that")]
    Forbidden,
    #[error("join a room first")]
    UnknownSession,
    #[error("you are currently muted")]
    Muted,
    #[error("no such user: {0}")]
    UnknownUser(String),
}
