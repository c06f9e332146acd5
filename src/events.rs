use serde::{Deserialize, Serialize};

use crate::db::{Message, User};

/// Identity asserted by the client at join time. Only the username is ever
/// keyed on; avatar and tag are untrusted display hints.
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_tag() -> String {
    "#0000".to_owned()
}

/// A message as the client submits it. Everything else on the logged
/// [`Message`] is filled in by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct Draft {
    pub text: String,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom { room_id: String, user: Identity },
    SendMessage { room_id: String, message: Draft },
    MuteUser { target: String },
    // role arrives as a plain string and is validated against the closed
    // enum in the moderation handler, so bad values get an explicit error
    AssignRole { target: String, role: String },
    KickUser { target: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    LoadChatHistory(Vec<Message>),
    UpdateMemberList(Vec<MemberEntry>),
    NewMessage(Message),
    ErrorMsg(String),
    Kicked,
}

/// Roster entry: the directory record plus whether any live session is
/// currently bound to it.
#[derive(Debug, Clone, Serialize)]
pub struct MemberEntry {
    #[serde(flatten)]
    pub user: User,
    pub is_online: bool,
}
