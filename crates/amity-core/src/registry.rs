//! Conversation room membership.
//!
//! Tracks which rooms the client has announced interest in. Join and leave
//! are idempotent at the protocol level: a frame is produced only when
//! membership actually changes. Membership is kept across connection drops
//! because the server forgets it; [`ChannelRegistry::rejoin_frames`] rebuilds
//! it after every reconnect.

use std::collections::BTreeSet;

use amity_proto::{ClientFrame, ConversationId};

/// Set of joined conversation rooms.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    joined: BTreeSet<ConversationId>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a join. Returns the frame to emit, or `None` if already joined.
    pub fn join(&mut self, conversation_id: &ConversationId) -> Option<ClientFrame> {
        self.joined.insert(conversation_id.clone()).then(|| ClientFrame::JoinConversation {
            conversation_id: conversation_id.clone(),
        })
    }

    /// Record a leave. Returns the frame to emit, or `None` if not joined.
    pub fn leave(&mut self, conversation_id: &ConversationId) -> Option<ClientFrame> {
        self.joined.remove(conversation_id).then(|| ClientFrame::LeaveConversation {
            conversation_id: conversation_id.clone(),
        })
    }

    /// Join frames for every room, in id order. Sent after each reconnect.
    pub fn rejoin_frames(&self) -> Vec<ClientFrame> {
        self.joined
            .iter()
            .map(|id| ClientFrame::JoinConversation { conversation_id: id.clone() })
            .collect()
    }

    /// Whether the room is joined.
    pub fn contains(&self, conversation_id: &ConversationId) -> bool {
        self.joined.contains(conversation_id)
    }

    /// Number of joined rooms.
    pub fn len(&self) -> usize {
        self.joined.len()
    }

    /// Whether no room is joined.
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }

    /// Forget all membership (logout).
    pub fn clear(&mut self) {
        self.joined.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_twice_emits_once() {
        let mut registry = ChannelRegistry::new();
        let id = ConversationId::new("c1");

        assert!(registry.join(&id).is_some());
        assert!(registry.join(&id).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn leave_unjoined_is_noop() {
        let mut registry = ChannelRegistry::new();
        assert!(registry.leave(&ConversationId::new("c1")).is_none());
    }

    #[test]
    fn leave_then_join_emits_again() {
        let mut registry = ChannelRegistry::new();
        let id = ConversationId::new("c1");

        registry.join(&id);
        assert!(matches!(registry.leave(&id), Some(ClientFrame::LeaveConversation { .. })));
        assert!(registry.join(&id).is_some());
    }

    #[test]
    fn rejoin_covers_every_room() {
        let mut registry = ChannelRegistry::new();
        registry.join(&ConversationId::new("b"));
        registry.join(&ConversationId::new("a"));

        let frames = registry.rejoin_frames();
        assert_eq!(frames, vec![
            ClientFrame::JoinConversation { conversation_id: "a".into() },
            ClientFrame::JoinConversation { conversation_id: "b".into() },
        ]);
    }
}
