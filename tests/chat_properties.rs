//! Behavioral properties of the chat state machine: identity and roles,
//! the bounded message log, moderation, and event delivery.

use std::sync::Arc;

use palaver::AppState;
use palaver::db::{ChatError, MESSAGE_CAP, Message, Role};
use palaver::events::{ClientEvent, Draft, Identity, ServerEvent};
use palaver::persist::{local::LocalStore, writer::BackupWriter};
use palaver::rooms::{moderation, msg, ws};
use palaver::state::{ChatState, EventSender, Outbound};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

fn ident(name: &str) -> Identity {
    Identity {
        username: name.to_owned(),
        avatar: format!("https://avatars.example/{name}.svg"),
        tag: "#0001".to_owned(),
    }
}

fn draft(text: &str) -> Draft {
    Draft { text: text.to_owned(), time: "12:00".to_owned() }
}

fn join(chat: &mut ChatState, room: &str, name: &str) -> (Uuid, UnboundedReceiver<Outbound>) {
    let sid = Uuid::now_v7();
    let (tx, rx) = mpsc::unbounded_channel();
    ws::join_room(chat, sid, room.to_owned(), ident(name), tx).unwrap();
    (sid, rx)
}

fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

fn messages_in(events: &[Outbound]) -> Vec<Message> {
    events
        .iter()
        .filter_map(|ev| match ev {
            Outbound::Event(ServerEvent::NewMessage(msg)) => Some(msg.clone()),
            _ => None,
        })
        .collect()
}

fn errors_in(events: &[Outbound]) -> Vec<String> {
    events
        .iter()
        .filter_map(|ev| match ev {
            Outbound::Event(ServerEvent::ErrorMsg(text)) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn first_join_becomes_owner_then_members() {
    let mut chat = ChatState::default();
    let _alice = join(&mut chat, "general", "alice");
    let _bob = join(&mut chat, "general", "bob");
    let _carol = join(&mut chat, "general", "carol");

    assert_eq!(chat.user("alice").unwrap().role, Role::Owner);
    assert_eq!(chat.user("bob").unwrap().role, Role::Member);
    assert_eq!(chat.user("carol").unwrap().role, Role::Member);
}

#[test]
fn rejoin_keeps_existing_record() {
    let mut chat = ChatState::default();
    let _first = join(&mut chat, "general", "alice");
    // second join asserts a different avatar; the directory keeps the first
    let sid = Uuid::now_v7();
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut other = ident("alice");
    other.avatar = "https://avatars.example/other.svg".to_owned();
    ws::join_room(&mut chat, sid, "general".to_owned(), other, tx).unwrap();

    assert_eq!(chat.user_count(), 1);
    assert_eq!(chat.user("alice").unwrap().avatar, "https://avatars.example/alice.svg");
    assert_eq!(chat.user("alice").unwrap().role, Role::Owner);
}

#[test]
fn empty_username_join_is_rejected() {
    let mut chat = ChatState::default();
    let sid = Uuid::now_v7();
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = ws::join_room(&mut chat, sid, "general".to_owned(), ident("   "), tx);

    assert!(matches!(result, Err(ChatError::InvalidInput(_))));
    assert_eq!(chat.user_count(), 0);
    assert!(!chat.is_online("   "));
}

#[test]
fn join_replays_room_history() {
    let mut chat = ChatState::default();
    let (alice, _alice_rx) = join(&mut chat, "general", "alice");
    for i in 0..3 {
        msg::send_msg(&mut chat, alice, "general".to_owned(), draft(&format!("m{i}"))).unwrap();
    }

    let (_bob, mut bob_rx) = join(&mut chat, "general", "bob");
    let events = drain(&mut bob_rx);
    let history = events
        .iter()
        .find_map(|ev| match ev {
            Outbound::Event(ServerEvent::LoadChatHistory(h)) => Some(h.clone()),
            _ => None,
        })
        .expect("history on join");
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].text, "m0");
}

#[test]
fn message_log_keeps_last_fifty_in_arrival_order() {
    let mut chat = ChatState::default();
    let (alice, _rx) = join(&mut chat, "general", "alice");

    for i in 1..=51 {
        msg::send_msg(&mut chat, alice, "general".to_owned(), draft(&format!("m{i}"))).unwrap();
    }

    let history = chat.history("general");
    assert_eq!(history.len(), MESSAGE_CAP);
    assert_eq!(history.first().unwrap().text, "m2");
    assert_eq!(history.last().unwrap().text, "m51");
    let texts: Vec<_> = history.iter().map(|m| m.text.clone()).collect();
    let expected: Vec<_> = (2..=51).map(|i| format!("m{i}")).collect();
    assert_eq!(texts, expected);
}

#[test]
fn sender_identity_is_stamped_from_directory() {
    let mut chat = ChatState::default();
    let (alice, mut rx) = join(&mut chat, "general", "alice");
    drain(&mut rx);

    msg::send_msg(&mut chat, alice, "general".to_owned(), draft("hi")).unwrap();
    let seen = messages_in(&drain(&mut rx));
    let sent = &seen[0];
    assert_eq!(sent.username, "alice");
    assert_eq!(sent.avatar, "https://avatars.example/alice.svg");
    assert_eq!(sent.role, Role::Owner);
    assert_eq!(sent.time, "12:00");
}

#[test]
fn send_without_join_is_rejected() {
    let mut chat = ChatState::default();
    let result = msg::send_msg(&mut chat, Uuid::now_v7(), "general".to_owned(), draft("hi"));
    assert!(matches!(result, Err(ChatError::UnknownSession)));
    assert!(chat.history("general").is_empty());
}

#[test]
fn rooms_do_not_share_logs_or_broadcasts() {
    let mut chat = ChatState::default();
    let (alice, mut alice_rx) = join(&mut chat, "red", "alice");
    let (_bob, mut bob_rx) = join(&mut chat, "blue", "bob");
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    msg::send_msg(&mut chat, alice, "red".to_owned(), draft("only red")).unwrap();

    assert_eq!(messages_in(&drain(&mut alice_rx)).len(), 1);
    assert!(messages_in(&drain(&mut bob_rx)).is_empty());
    assert_eq!(chat.history("red").len(), 1);
    assert!(chat.history("blue").is_empty());
}

#[test]
fn non_owner_cannot_moderate() {
    let mut chat = ChatState::default();
    let (_alice, _arx) = join(&mut chat, "general", "alice");
    let (bob, _brx) = join(&mut chat, "general", "bob");

    assert!(matches!(moderation::toggle_mute(&mut chat, bob, "alice"), Err(ChatError::Forbidden)));
    assert!(matches!(
        moderation::assign_role(&mut chat, bob, "alice", "member"),
        Err(ChatError::Forbidden)
    ));
    assert!(matches!(moderation::kick(&mut chat, bob, "alice"), Err(ChatError::Forbidden)));
    assert_eq!(chat.user("alice").unwrap().role, Role::Owner);
    assert!(!chat.user("alice").unwrap().muted);
}

#[test]
fn mute_toggle_flips_and_cancels() {
    let mut chat = ChatState::default();
    let (alice, _arx) = join(&mut chat, "general", "alice");
    let (_bob, _brx) = join(&mut chat, "general", "bob");

    moderation::toggle_mute(&mut chat, alice, "bob").unwrap();
    assert!(chat.user("bob").unwrap().muted);
    moderation::toggle_mute(&mut chat, alice, "bob").unwrap();
    assert!(!chat.user("bob").unwrap().muted);
}

#[test]
fn mute_unknown_target_is_rejected() {
    let mut chat = ChatState::default();
    let (alice, _rx) = join(&mut chat, "general", "alice");
    assert!(matches!(
        moderation::toggle_mute(&mut chat, alice, "nobody"),
        Err(ChatError::UnknownUser(_))
    ));
}

#[test]
fn assign_role_accepts_only_known_roles() {
    let mut chat = ChatState::default();
    let (alice, _arx) = join(&mut chat, "general", "alice");
    let (_bob, _brx) = join(&mut chat, "general", "bob");

    assert!(matches!(
        moderation::assign_role(&mut chat, alice, "bob", "admin"),
        Err(ChatError::InvalidInput(_))
    ));
    assert_eq!(chat.user("bob").unwrap().role, Role::Member);

    moderation::assign_role(&mut chat, alice, "bob", "mod").unwrap();
    assert_eq!(chat.user("bob").unwrap().role, Role::Mod);
}

#[test]
fn kick_ejects_session_but_keeps_the_record() {
    let mut chat = ChatState::default();
    let (alice, _arx) = join(&mut chat, "general", "alice");
    let (_bob, mut bob_rx) = join(&mut chat, "general", "bob");

    moderation::toggle_mute(&mut chat, alice, "bob").unwrap();
    drain(&mut bob_rx);

    moderation::kick(&mut chat, alice, "bob").unwrap();
    let events = drain(&mut bob_rx);
    let kicked = events
        .iter()
        .filter(|ev| matches!(ev, Outbound::Event(ServerEvent::Kicked)))
        .count();
    assert_eq!(kicked, 1);
    assert!(matches!(events.last(), Some(Outbound::Close)));
    assert!(!chat.is_online("bob"));

    // the record survives; rejoin retains role and mute state
    let bob = chat.user("bob").unwrap();
    assert_eq!(bob.role, Role::Member);
    assert!(bob.muted);
    let (_bob2, _rx2) = join(&mut chat, "general", "bob");
    assert!(chat.is_online("bob"));
    assert!(chat.user("bob").unwrap().muted);
}

#[test]
fn kick_without_live_session_is_a_noop() {
    let mut chat = ChatState::default();
    let (alice, _arx) = join(&mut chat, "general", "alice");
    let (_bob, bob_rx) = join(&mut chat, "general", "bob");
    drop(bob_rx);
    chat.unregister(chat.sessions_of("bob")[0]);

    assert!(matches!(moderation::kick(&mut chat, alice, "bob"), Ok(None)));
    assert!(chat.user("bob").is_some());
}

#[test]
fn roster_reflects_online_state() {
    let mut chat = ChatState::default();
    let (_alice, mut alice_rx) = join(&mut chat, "general", "alice");
    let (_bob, _bob_rx) = join(&mut chat, "general", "bob");
    drain(&mut alice_rx);

    chat.unregister(chat.sessions_of("bob")[0]);
    chat.sync_members();

    let events = drain(&mut alice_rx);
    let roster = events
        .iter()
        .find_map(|ev| match ev {
            Outbound::Event(ServerEvent::UpdateMemberList(list)) => Some(list.clone()),
            _ => None,
        })
        .expect("roster update");
    assert_eq!(roster.len(), 2);
    assert!(roster.iter().find(|m| m.user.username == "alice").unwrap().is_online);
    assert!(!roster.iter().find(|m| m.user.username == "bob").unwrap().is_online);
}

// --- event-level tests through the dispatcher ---

fn test_app() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let app = AppState {
        chat: Arc::new(Mutex::new(ChatState::default())),
        local: LocalStore::new(dir.path().join("snapshot.json")),
        backup: BackupWriter::disabled(),
    };
    (app, dir)
}

fn connect() -> (Uuid, EventSender, UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Uuid::now_v7(), tx, rx)
}

fn join_event(room: &str, name: &str) -> ClientEvent {
    ClientEvent::JoinRoom { room_id: room.to_owned(), user: ident(name) }
}

fn send_event(room: &str, text: &str) -> ClientEvent {
    ClientEvent::SendMessage { room_id: room.to_owned(), message: draft(text) }
}

#[tokio::test]
async fn muted_sender_gets_one_error_and_nobody_else_hears_it() {
    let (app, _dir) = test_app();
    let (alice, alice_tx, mut alice_rx) = connect();
    let (bob, bob_tx, mut bob_rx) = connect();

    ws::dispatch(&app, alice, &alice_tx, join_event("general", "alice")).await;
    ws::dispatch(&app, bob, &bob_tx, join_event("general", "bob")).await;
    ws::dispatch(&app, alice, &alice_tx, ClientEvent::MuteUser { target: "bob".to_owned() })
        .await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    ws::dispatch(&app, bob, &bob_tx, send_event("general", "hello")).await;

    let bob_events = drain(&mut bob_rx);
    assert_eq!(errors_in(&bob_events).len(), 1);
    assert!(messages_in(&bob_events).is_empty());
    let alice_events = drain(&mut alice_rx);
    assert!(messages_in(&alice_events).is_empty());
    assert!(errors_in(&alice_events).is_empty());
    assert!(app.chat.lock().await.history("general").is_empty());
}

#[tokio::test]
async fn owner_moderation_scenario() {
    let (app, _dir) = test_app();
    let (alice, alice_tx, mut alice_rx) = connect();
    let (bob, bob_tx, mut bob_rx) = connect();

    ws::dispatch(&app, alice, &alice_tx, join_event("general", "alice")).await;
    assert_eq!(app.chat.lock().await.user("alice").unwrap().role, Role::Owner);
    ws::dispatch(&app, bob, &bob_tx, join_event("general", "bob")).await;
    assert_eq!(app.chat.lock().await.user("bob").unwrap().role, Role::Member);

    ws::dispatch(&app, alice, &alice_tx, ClientEvent::MuteUser { target: "bob".to_owned() })
        .await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    ws::dispatch(&app, bob, &bob_tx, send_event("general", "hello")).await;
    assert_eq!(errors_in(&drain(&mut bob_rx)).len(), 1);
    assert!(messages_in(&drain(&mut alice_rx)).is_empty());

    ws::dispatch(&app, alice, &alice_tx, ClientEvent::MuteUser { target: "bob".to_owned() })
        .await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    ws::dispatch(&app, bob, &bob_tx, send_event("general", "hello")).await;
    for events in [drain(&mut alice_rx), drain(&mut bob_rx)] {
        let seen = messages_in(&events);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].text, "hello");
        assert_eq!(seen[0].username, "bob");
        assert_eq!(seen[0].role, Role::Member);
    }
    assert_eq!(app.chat.lock().await.history("general").len(), 1);
}

#[tokio::test]
async fn durable_mutations_land_in_the_local_snapshot() {
    let (app, _dir) = test_app();
    let (alice, alice_tx, _alice_rx) = connect();

    ws::dispatch(&app, alice, &alice_tx, join_event("general", "alice")).await;
    ws::dispatch(&app, alice, &alice_tx, send_event("general", "persist me")).await;

    let saved = app.local.load().unwrap().expect("snapshot written");
    assert!(saved.users.contains_key("alice"));
    assert_eq!(saved.messages["general"].back().unwrap().text, "persist me");
}
