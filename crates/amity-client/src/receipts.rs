//! Read receipts.
//!
//! Read state is one boolean per message. Opening a conversation marks every
//! unread inbound message read; a `message-read` push from the counterpart
//! marks everything read. There is no per-reader tracking.

use amity_proto::{ClientFrame, ConversationId, Message, UserId};

use crate::event::{ClientAction, RestRequest};

/// Mark every unread message not sent by `self_id` as read. Returns how many
/// changed.
pub fn mark_unread_inbound(messages: &mut [Message], self_id: &UserId) -> usize {
    let mut changed = 0;
    for message in messages.iter_mut().filter(|m| !m.read && !m.is_from(self_id)) {
        message.read = true;
        changed += 1;
    }
    changed
}

/// Apply a `message-read` push. Ignored when `read_by` is ourselves.
/// Returns how many messages changed.
pub fn apply_remote_read(messages: &mut [Message], read_by: &UserId, self_id: &UserId) -> usize {
    if read_by == self_id {
        return 0;
    }

    let mut changed = 0;
    for message in messages.iter_mut().filter(|m| !m.read) {
        message.read = true;
        changed += 1;
    }
    changed
}

/// Realtime and durable "read everything" for a conversation.
pub fn mark_all_read_actions(conversation_id: &ConversationId) -> Vec<ClientAction> {
    vec![
        ClientAction::Emit(ClientFrame::MarkRead { conversation_id: conversation_id.clone() }),
        ClientAction::Request(RestRequest::MarkAllRead {
            conversation_id: conversation_id.clone(),
        }),
    ]
}
