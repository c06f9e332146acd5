use tracing::info;
use uuid::Uuid;

use crate::db::{ChatError, Role};
use crate::state::ChatState;

/// Every moderation action is gated on the acting session resolving to an
/// owner. Returns the actor's username for the activity note.
fn acting_owner(chat: &ChatState, sid: Uuid) -> Result<String, ChatError> {
    let actor = chat.user_of(sid).ok_or(ChatError::UnknownSession)?;
    if actor.role != Role::Owner {
        return Err(ChatError::Forbidden);
    }
    Ok(actor.username.clone())
}

pub fn toggle_mute(
    chat: &mut ChatState,
    sid: Uuid,
    target: &str,
) -> Result<Option<String>, ChatError> {
    let actor = acting_owner(chat, sid)?;
    let user = chat.user_mut(target).ok_or_else(|| ChatError::UnknownUser(target.to_owned()))?;
    user.muted = !user.muted;
    let muted = user.muted;
    info!(%actor, %target, muted, "mute toggled");
    chat.sync_members();
    let verb = if muted { "muted" } else { "unmuted" };
    Ok(Some(format!("{actor} {verb} {target}")))
}

pub fn assign_role(
    chat: &mut ChatState,
    sid: Uuid,
    target: &str,
    role: &str,
) -> Result<Option<String>, ChatError> {
    let actor = acting_owner(chat, sid)?;
    let role: Role = role.parse()?;
    let user = chat.user_mut(target).ok_or_else(|| ChatError::UnknownUser(target.to_owned()))?;
    user.role = role;
    info!(%actor, %target, %role, "role assigned");
    chat.sync_members();
    Ok(Some(format!("{actor} made {target} a {role}")))
}

/// Eject every live session bound to the target. The directory record is
/// left alone: the target may rejoin immediately with prior role and mute
/// state. No live session means nothing to do.
pub fn kick(chat: &mut ChatState, sid: Uuid, target: &str) -> Result<Option<String>, ChatError> {
    let actor = acting_owner(chat, sid)?;
    let sids = chat.sessions_of(target);
    if sids.is_empty() {
        return Ok(None);
    }
    for sid in sids {
        chat.eject(sid);
    }
    info!(%actor, %target, "kicked");
    chat.sync_members();
    Ok(Some(format!("{actor} kicked {target}")))
}
