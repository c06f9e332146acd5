use std::collections::{HashMap, VecDeque};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::{MESSAGE_CAP, Message, Role, Snapshot, User};
use crate::events::{Identity, MemberEntry, ServerEvent};

/// What a connection task receives from the state side. `Close` tells the
/// forwarder to shut the socket; it is only sent on ejection.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(ServerEvent),
    Close,
}

pub type EventSender = mpsc::UnboundedSender<Outbound>;

#[derive(Debug)]
struct LiveSession {
    username: String,
    room: String,
    tx: EventSender,
}

/// The authoritative chat state: directory, per-room message logs, and the
/// session registry. All mutation goes through the one `Mutex<ChatState>`
/// held by `AppState`, so every operation here is a plain `&mut self` and
/// broadcast order equals append order.
#[derive(Default)]
pub struct ChatState {
    users: HashMap<String, User>,
    messages: HashMap<String, VecDeque<Message>>,
    sessions: HashMap<Uuid, LiveSession>,
}

impl ChatState {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut messages = snapshot.messages;
        for log in messages.values_mut() {
            while log.len() > MESSAGE_CAP {
                log.pop_front();
            }
        }
        Self { users: snapshot.users, messages, sessions: HashMap::new() }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot { users: self.users.clone(), messages: self.messages.clone() }
    }

    // --- session registry ---

    /// Bind a session to a username and room. Rejoining under the same
    /// session id simply rebinds it (this is how a client switches rooms).
    pub fn register(&mut self, sid: Uuid, username: String, room: String, tx: EventSender) {
        self.sessions.insert(sid, LiveSession { username, room, tx });
    }

    pub fn unregister(&mut self, sid: Uuid) -> bool {
        self.sessions.remove(&sid).is_some()
    }

    /// Eject a live session: `kicked`, then its outbound channel is closed,
    /// which makes the connection task shut the socket.
    pub fn eject(&mut self, sid: Uuid) {
        if let Some(session) = self.sessions.remove(&sid) {
            let _ = session.tx.send(Outbound::Event(ServerEvent::Kicked));
            let _ = session.tx.send(Outbound::Close);
        }
    }

    pub fn sessions_of(&self, username: &str) -> Vec<Uuid> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.username == username)
            .map(|(sid, _)| *sid)
            .collect()
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.sessions.values().any(|s| s.username == username)
    }

    // --- directory ---

    /// Create the directory record on first sight of a username. The first
    /// user ever created on an empty directory becomes the owner. Returns
    /// true if a record was created.
    pub fn ensure_user(&mut self, ident: &Identity) -> bool {
        if self.users.contains_key(&ident.username) {
            return false;
        }
        let role = if self.users.is_empty() { Role::Owner } else { Role::Member };
        self.users.insert(
            ident.username.clone(),
            User {
                username: ident.username.clone(),
                avatar: ident.avatar.clone(),
                tag: ident.tag.clone(),
                role,
                muted: false,
            },
        );
        true
    }

    pub fn user(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    pub fn user_mut(&mut self, username: &str) -> Option<&mut User> {
        self.users.get_mut(username)
    }

    /// Resolve a session to its directory record.
    pub fn user_of(&self, sid: Uuid) -> Option<&User> {
        self.sessions.get(&sid).and_then(|s| self.users.get(&s.username))
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn online_count(&self) -> usize {
        self.users.keys().filter(|name| self.is_online(name)).count()
    }

    // --- message log ---

    pub fn history(&self, room: &str) -> Vec<Message> {
        self.messages.get(room).map(|log| log.iter().cloned().collect()).unwrap_or_default()
    }

    /// Append to the room's log, evicting the oldest entry past the cap.
    pub fn append(&mut self, msg: Message) {
        let log = self.messages.entry(msg.room.clone()).or_default();
        log.push_back(msg);
        if log.len() > MESSAGE_CAP {
            log.pop_front();
        }
    }

    // --- fan-out ---

    pub fn send_to(&self, sid: Uuid, event: ServerEvent) {
        if let Some(session) = self.sessions.get(&sid) {
            let _ = session.tx.send(Outbound::Event(event));
        }
    }

    pub fn broadcast_room(&self, room: &str, event: ServerEvent) {
        for session in self.sessions.values().filter(|s| s.room == room) {
            let _ = session.tx.send(Outbound::Event(event.clone()));
        }
    }

    /// Recompute the roster and push it to every connected session. The
    /// roster is global: every directory record, flagged online or not.
    pub fn sync_members(&self) {
        let mut members: Vec<MemberEntry> = self
            .users
            .values()
            .map(|user| MemberEntry { is_online: self.is_online(&user.username), user: user.clone() })
            .collect();
        members.sort_by(|a, b| a.user.username.cmp(&b.user.username));

        let event = ServerEvent::UpdateMemberList(members);
        for session in self.sessions.values() {
            let _ = session.tx.send(Outbound::Event(event.clone()));
        }
    }
}
