//! Typing indicators.
//!
//! [`TypingSignaler`] debounces local keystrokes into at most one
//! `typing:true` per burst and one `typing:false` after the idle window.
//! [`RemoteTyping`] tracks who else is typing. It has no timeout: a remote
//! user stays "typing" until their `typing:false` arrives.

use std::{collections::BTreeSet, ops::Sub, time::Duration};

use amity_proto::UserId;

/// Silence after the last keystroke before `typing:false` is sent.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(2);

/// Local typing debounce.
#[derive(Debug, Clone)]
pub struct TypingSignaler<I> {
    idle: Duration,
    typing: bool,
    last_keystroke: Option<I>,
}

impl<I> TypingSignaler<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an idle signaler.
    pub fn new(idle: Duration) -> Self {
        Self { idle, typing: false, last_keystroke: None }
    }

    /// Whether `typing:true` has been sent and not yet retracted.
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// Record a keystroke. Returns `Some(true)` if `typing:true` must be sent.
    pub fn keystroke(&mut self, now: I) -> Option<bool> {
        self.last_keystroke = Some(now);
        if self.typing {
            return None;
        }
        self.typing = true;
        Some(true)
    }

    /// Advance time. Returns `Some(false)` once the idle window has passed
    /// since the last keystroke.
    pub fn tick(&mut self, now: I) -> Option<bool> {
        let last = self.last_keystroke?;
        if !self.typing || now - last < self.idle {
            return None;
        }
        self.typing = false;
        self.last_keystroke = None;
        Some(false)
    }

    /// Stop immediately (message sent). Returns `Some(false)` if typing was on.
    pub fn stop(&mut self) -> Option<bool> {
        self.last_keystroke = None;
        std::mem::take(&mut self.typing).then_some(false)
    }

    /// Forget state without signalling. Used when the room is left, so no
    /// `typing:false` reaches a room we are no longer in.
    pub fn cancel(&mut self) {
        self.typing = false;
        self.last_keystroke = None;
    }
}

/// Remote users currently typing in the open conversation.
#[derive(Debug, Clone, Default)]
pub struct RemoteTyping {
    users: BTreeSet<UserId>,
}

impl RemoteTyping {
    /// Apply a remote typing event. Returns `true` if the set changed.
    pub fn apply(&mut self, user_id: &UserId, is_typing: bool) -> bool {
        if is_typing { self.users.insert(user_id.clone()) } else { self.users.remove(user_id) }
    }

    /// Whether `user_id` is typing.
    pub fn is_typing(&self, user_id: &UserId) -> bool {
        self.users.contains(user_id)
    }

    /// Typing users in id order.
    pub fn users(&self) -> Vec<UserId> {
        self.users.iter().cloned().collect()
    }

    /// Forget everyone.
    pub fn clear(&mut self) {
        self.users.clear();
    }
}
