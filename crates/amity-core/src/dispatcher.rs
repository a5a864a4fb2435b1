//! Scoped fan-out of inbound events.
//!
//! Subscribers register for a ([`Scope`], [`EventKind`]) pair and receive
//! every matching event synchronously, in registration order. The dispatcher
//! never deduplicates, reorders, or batches; that is the reconciler's job.
//!
//! # Routing
//!
//! For an event scoped to conversation `C`, subscribers on
//! `Scope::Conversation(C)` fire first, then subscribers on [`Scope::Any`].
//! Events with no conversation (presence, acks, lifecycle) reach only
//! [`Scope::Any`] subscribers.

use std::{collections::HashMap, fmt};

use amity_proto::{ConversationId, EventKind};

use crate::event::TransportEvent;

/// Subscriber callback.
pub type Callback = Box<dyn FnMut(&TransportEvent) + Send>;

/// Routing scope of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every event of the subscribed kind, whatever its conversation.
    Any,
    /// Only events for this conversation.
    Conversation(ConversationId),
}

/// Handle returned by [`EventDispatcher::subscribe`]; pass it to
/// [`EventDispatcher::unsubscribe`] to dispose of the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Event fan-out keyed by scope and event kind.
#[derive(Default)]
pub struct EventDispatcher {
    next_id: u64,
    subscribers: HashMap<(Scope, EventKind), Vec<(SubscriptionId, Callback)>>,
    index: HashMap<SubscriptionId, (Scope, EventKind)>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher").field("subscriptions", &self.index.len()).finish()
    }
}

impl EventDispatcher {
    /// Create a dispatcher with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events of `kind` in `scope`.
    pub fn subscribe<F>(&mut self, scope: Scope, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: FnMut(&TransportEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        self.subscribers.entry((scope.clone(), kind)).or_default().push((id, Box::new(callback)));
        self.index.insert(id, (scope, kind));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(key) = self.index.remove(&id) else {
            return false;
        };

        if let Some(list) = self.subscribers.get_mut(&key) {
            list.retain(|(sub_id, _)| *sub_id != id);
            if list.is_empty() {
                self.subscribers.remove(&key);
            }
        }
        true
    }

    /// Deliver `event` to every matching subscriber. Returns how many
    /// callbacks ran.
    pub fn dispatch(&mut self, event: &TransportEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;

        if let Some(conversation_id) = event.conversation_id() {
            let key = (Scope::Conversation(conversation_id.clone()), kind);
            delivered += Self::invoke(self.subscribers.get_mut(&key), event);
        }
        delivered += Self::invoke(self.subscribers.get_mut(&(Scope::Any, kind)), event);

        delivered
    }

    /// Drop every subscription. Called on logout so handlers do not leak
    /// into the next session.
    pub fn clear(&mut self) {
        self.subscribers.clear();
        self.index.clear();
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn invoke(list: Option<&mut Vec<(SubscriptionId, Callback)>>, event: &TransportEvent) -> usize {
        let Some(list) = list else {
            return 0;
        };
        for (_, callback) in list.iter_mut() {
            callback(event);
        }
        list.len()
    }
}
