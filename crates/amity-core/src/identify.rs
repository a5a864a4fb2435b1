//! Message identity rule.
//!
//! Decides whether two [`Message`] values describe the same logical message.
//! Strict ids win; the fuzzy rule only exists because the REST send response
//! and the realtime echo of the same message can arrive in either order, and
//! an echo does not always carry the temp id.
//!
//! # Resolution order
//!
//! 1. Stable ids equal
//! 2. Temp ids equal
//! 3. Fuzzy: the existing entry is an unconfirmed optimistic send, and both
//!    share sender and content with timestamps at most
//!    [`FUZZY_MATCH_WINDOW_MS`] apart
//!
//! Two messages with different stable ids are always distinct.

use amity_proto::Message;

/// Maximum timestamp distance for a fuzzy match.
pub const FUZZY_MATCH_WINDOW_MS: u64 = 5_000;

/// How an incoming message relates to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Same server-assigned id.
    StableId,
    /// Same client-generated temp id.
    TempId,
    /// Same sender and content within the time window.
    Fuzzy,
    /// Different messages.
    Distinct,
}

impl Identity {
    /// Whether the two messages are the same logical message.
    pub fn is_match(self) -> bool {
        self != Self::Distinct
    }

    fn is_exact(self) -> bool {
        matches!(self, Self::StableId | Self::TempId)
    }
}

/// Classify `incoming` against `existing`.
pub fn identify(existing: &Message, incoming: &Message) -> Identity {
    match (&existing.id, &incoming.id) {
        (Some(a), Some(b)) if a == b => return Identity::StableId,
        (Some(_), Some(_)) => return Identity::Distinct,
        _ => {},
    }

    if let (Some(a), Some(b)) = (&existing.temp_id, &incoming.temp_id) {
        return if a == b { Identity::TempId } else { Identity::Distinct };
    }

    let pending = existing.sending && existing.id.is_none();
    if pending
        && existing.sender_id == incoming.sender_id
        && existing.content == incoming.content
        && existing.created_at.abs_diff(incoming.created_at) <= FUZZY_MATCH_WINDOW_MS
    {
        return Identity::Fuzzy;
    }

    Identity::Distinct
}

/// Locate the entry in `messages` that `incoming` should replace.
///
/// Exact matches anywhere in the list take priority over a fuzzy match; among
/// fuzzy candidates the oldest pending entry wins.
pub fn find_match(messages: &[Message], incoming: &Message) -> Option<(usize, Identity)> {
    let mut fuzzy = None;

    for (index, existing) in messages.iter().enumerate() {
        let identity = identify(existing, incoming);
        if identity.is_exact() {
            return Some((index, identity));
        }
        if identity == Identity::Fuzzy && fuzzy.is_none() {
            fuzzy = Some((index, identity));
        }
    }

    fuzzy
}

#[cfg(test)]
mod tests {
    use amity_proto::{ConversationId, TempId, UserId};

    use super::*;

    fn pending(temp: &str, content: &str, at: u64) -> Message {
        Message::pending(
            TempId::new(temp),
            ConversationId::new("c1"),
            UserId::new("alice"),
            content.into(),
            None,
            at,
        )
    }

    fn confirmed(id: &str, temp: Option<&str>, content: &str, at: u64) -> Message {
        Message {
            id: Some(id.into()),
            temp_id: temp.map(TempId::new),
            conversation_id: ConversationId::new("c1"),
            sender_id: UserId::new("alice"),
            content: content.into(),
            media: None,
            created_at: at,
            read: false,
            sending: false,
            failed: false,
        }
    }

    #[test]
    fn stable_id_wins() {
        let a = confirmed("m1", None, "x", 0);
        let b = confirmed("m1", None, "different", 60_000);
        assert_eq!(identify(&a, &b), Identity::StableId);
    }

    #[test]
    fn different_stable_ids_never_match() {
        let a = confirmed("m1", Some("temp-1"), "hi", 0);
        let b = confirmed("m2", Some("temp-1"), "hi", 0);
        assert_eq!(identify(&a, &b), Identity::Distinct);
    }

    #[test]
    fn temp_id_matches_pending_entry() {
        let local = pending("temp-1", "hi", 1_000);
        let echo = confirmed("m1", Some("temp-1"), "hi", 90_000);
        assert_eq!(identify(&local, &echo), Identity::TempId);
    }

    #[test]
    fn different_temp_ids_do_not_fall_back_to_fuzzy() {
        let local = pending("temp-1", "hi", 1_000);
        let echo = confirmed("m1", Some("temp-2"), "hi", 1_000);
        assert_eq!(identify(&local, &echo), Identity::Distinct);
    }

    #[test]
    fn fuzzy_inside_window() {
        let local = pending("temp-1", "hi", 10_000);
        let echo = confirmed("m1", None, "hi", 15_000);
        assert_eq!(identify(&local, &echo), Identity::Fuzzy);
    }

    #[test]
    fn fuzzy_outside_window() {
        let local = pending("temp-1", "hi", 10_000);
        let echo = confirmed("m1", None, "hi", 15_001);
        assert_eq!(identify(&local, &echo), Identity::Distinct);
    }

    #[test]
    fn fuzzy_requires_pending_entry() {
        let mut local = pending("temp-1", "hi", 10_000);
        local.sending = false;
        local.failed = true;
        let echo = confirmed("m1", None, "hi", 10_000);
        assert_eq!(identify(&local, &echo), Identity::Distinct);
    }

    #[test]
    fn fuzzy_requires_same_sender() {
        let local = pending("temp-1", "hi", 10_000);
        let mut echo = confirmed("m1", None, "hi", 10_000);
        echo.sender_id = UserId::new("bob");
        assert_eq!(identify(&local, &echo), Identity::Distinct);
    }

    #[test]
    fn find_match_prefers_exact_over_earlier_fuzzy() {
        let list = vec![pending("temp-1", "hi", 1_000), pending("temp-2", "hi", 1_500)];
        let echo = confirmed("m2", Some("temp-2"), "hi", 1_500);

        assert_eq!(find_match(&list, &echo), Some((1, Identity::TempId)));
    }

    #[test]
    fn find_match_fuzzy_picks_oldest_pending() {
        let list = vec![pending("temp-1", "hi", 1_000), pending("temp-2", "hi", 1_500)];
        let echo = confirmed("m9", None, "hi", 1_200);

        assert_eq!(find_match(&list, &echo), Some((0, Identity::Fuzzy)));
    }
}
