//! Standard invariant checks.

use std::collections::HashSet;

use amity_client::ConversationSnapshot;

use super::{Invariant, InvariantResult, Violation};

/// No two entries share a stable id.
pub struct NoDuplicateMessages;

impl Invariant for NoDuplicateMessages {
    fn name(&self) -> &'static str {
        "no_duplicate_messages"
    }

    fn check(&self, state: &ConversationSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for id in state.messages.iter().filter_map(|m| m.id.as_ref()) {
            if !seen.insert(id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("message {id} appears more than once"),
                });
            }
        }
        Ok(())
    }
}

/// No two entries share a temp id.
pub struct UniqueTempIds;

impl Invariant for UniqueTempIds {
    fn name(&self) -> &'static str {
        "unique_temp_ids"
    }

    fn check(&self, state: &ConversationSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for temp_id in state.messages.iter().filter_map(|m| m.temp_id.as_ref()) {
            if !seen.insert(temp_id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("temp id {temp_id} appears more than once"),
                });
            }
        }
        Ok(())
    }
}

/// `sending` and `failed` are never both set.
pub struct FlagsExclusive;

impl Invariant for FlagsExclusive {
    fn name(&self) -> &'static str {
        "flags_exclusive"
    }

    fn check(&self, state: &ConversationSnapshot) -> InvariantResult {
        match state.messages.iter().find(|m| m.sending && m.failed) {
            Some(m) => Err(Violation {
                invariant: self.name(),
                message: format!("message {:?}/{:?} is both sending and failed", m.id, m.temp_id),
            }),
            None => Ok(()),
        }
    }
}

/// A message with a stable id is no longer `sending`.
pub struct ConfirmedNotSending;

impl Invariant for ConfirmedNotSending {
    fn name(&self) -> &'static str {
        "confirmed_not_sending"
    }

    fn check(&self, state: &ConversationSnapshot) -> InvariantResult {
        match state.messages.iter().find(|m| m.is_confirmed() && m.sending) {
            Some(m) => Err(Violation {
                invariant: self.name(),
                message: format!("confirmed message {:?} still sending", m.id),
            }),
            None => Ok(()),
        }
    }
}
