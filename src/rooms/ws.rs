use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::ChatError;
use crate::events::{ClientEvent, Identity, ServerEvent};
use crate::persist;
use crate::rooms::{moderation, msg};
use crate::state::{ChatState, EventSender, Outbound};
use crate::AppState;

#[debug_handler]
pub(crate) async fn chat_ws(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(app, socket))
}

async fn handle_socket(app: AppState, socket: WebSocket) {
    let sid = Uuid::now_v7();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (mut sink, mut stream) = socket.split();

    // Drain the session's outbound queue into the socket. An explicit
    // `Close` (ejection) ends the drain after the pending events, which
    // closes the connection.
    let mut forward = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Event(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => break,
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut forward => break,
            inbound = stream.next() => match inbound {
                Some(Ok(frame)) => {
                    // unparseable frames are skipped
                    let Ok(event) = serde_json::from_slice::<ClientEvent>(&frame.into_data()) else {
                        continue;
                    };
                    dispatch(&app, sid, &tx, event).await;
                }
                _ => break,
            },
        }
    }

    forward.abort();
    let mut chat = app.chat.lock().await;
    chat.unregister(sid);
    chat.sync_members();
    debug!(%sid, "session closed");
}

/// Run one client event against the state service, persisting after any
/// durable mutation and turning rejections into a single `error-msg` back
/// to the acting session.
pub async fn dispatch(app: &AppState, sid: Uuid, tx: &EventSender, event: ClientEvent) {
    let result = {
        let mut chat = app.chat.lock().await;
        let result = match event {
            ClientEvent::JoinRoom { room_id, user } => {
                join_room(&mut chat, sid, room_id, user, tx.clone())
            }
            ClientEvent::SendMessage { room_id, message } => {
                msg::send_msg(&mut chat, sid, room_id, message)
            }
            ClientEvent::MuteUser { target } => moderation::toggle_mute(&mut chat, sid, &target),
            ClientEvent::AssignRole { target, role } => {
                moderation::assign_role(&mut chat, sid, &target, &role)
            }
            ClientEvent::KickUser { target } => moderation::kick(&mut chat, sid, &target),
        };
        // the local overwrite happens under the state lock so snapshots
        // land on disk in mutation order
        if let Ok(Some(note)) = &result {
            persist::persist(app, chat.snapshot(), Some(note.clone()));
        }
        result
    };

    if let Err(e) = result {
        debug!(%sid, error = %e, "rejected client event");
        let _ = tx.send(Outbound::Event(ServerEvent::ErrorMsg(e.to_string())));
    }
}

/// Bind the session to a room, create the directory record on first sight,
/// reply with that room's history and refresh everyone's roster. Returns
/// the activity note when the directory changed.
pub fn join_room(
    chat: &mut ChatState,
    sid: Uuid,
    room_id: String,
    user: Identity,
    tx: EventSender,
) -> Result<Option<String>, ChatError> {
    if user.username.trim().is_empty() {
        return Err(ChatError::InvalidInput("username must not be empty".to_owned()));
    }

    let note = chat
        .ensure_user(&user)
        .then(|| format!("new user: {} ({})", user.username, user.tag));
    if note.is_some() {
        info!(username = %user.username, "created directory record");
    }

    chat.register(sid, user.username.clone(), room_id.clone(), tx);
    chat.send_to(sid, ServerEvent::LoadChatHistory(chat.history(&room_id)));
    chat.sync_members();
    debug!(%sid, username = %user.username, room = %room_id, "joined");
    Ok(note)
}
