//! Online/offline status of remote users.

use std::collections::HashMap;

use amity_proto::UserId;

/// Last known presence per user, from `user-status` pushes.
#[derive(Debug, Clone, Default)]
pub struct Presence {
    online: HashMap<UserId, bool>,
}

impl Presence {
    /// Record a status change. Returns `true` if it differs from what was
    /// known.
    pub fn set(&mut self, user_id: &UserId, is_online: bool) -> bool {
        self.online.insert(user_id.clone(), is_online) != Some(is_online)
    }

    /// Last known status. `None` if no event has been seen for the user.
    pub fn is_online(&self, user_id: &UserId) -> Option<bool> {
        self.online.get(user_id).copied()
    }

    /// Forget everything (logout).
    pub fn clear(&mut self) {
        self.online.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_changes() {
        let mut presence = Presence::default();
        let sam = UserId::from("sam");

        assert_eq!(presence.is_online(&sam), None);
        assert!(presence.set(&sam, true));
        assert!(!presence.set(&sam, true));
        assert!(presence.set(&sam, false));
        assert_eq!(presence.is_online(&sam), Some(false));
    }
}
