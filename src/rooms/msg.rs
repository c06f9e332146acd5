use uuid::Uuid;

use crate::db::{ChatError, Message};
use crate::events::{Draft, ServerEvent};
use crate::state::ChatState;

/// Validate a send against the directory, stamp the authoritative author
/// fields, append to the room's log and fan the message out to every
/// session in that room.
pub fn send_msg(
    chat: &mut ChatState,
    sid: Uuid,
    room_id: String,
    draft: Draft,
) -> Result<Option<String>, ChatError> {
    let user = chat.user_of(sid).ok_or(ChatError::UnknownSession)?.clone();
    if user.muted {
        return Err(ChatError::Muted);
    }

    let msg = Message {
        room: room_id,
        text: draft.text,
        time: draft.time,
        username: user.username,
        avatar: user.avatar,
        role: user.role,
    };
    let note = format!("{}: {}", msg.username, msg.text);
    let room = msg.room.clone();

    chat.append(msg.clone());
    chat.broadcast_room(&room, ServerEvent::NewMessage(msg));
    Ok(Some(note))
}
