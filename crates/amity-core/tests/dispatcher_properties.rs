//! Property-based tests for event fan-out.
//!
//! Arbitrary interleavings of subscribe, unsubscribe, and dispatch are
//! checked against a plain list of live subscriptions: conversation-scoped
//! callbacks run first, then `Any`, each group in registration order, and a
//! removed callback never runs again.

#![allow(clippy::unwrap_used)]
#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::sync::{Arc, Mutex};

use amity_core::{EventDispatcher, Scope, SubscriptionId, TransportEvent};
use amity_proto::{ConversationId, EventKind, ServerEvent, UserId};
use proptest::prelude::*;

const CONVERSATIONS: [&str; 3] = ["c0", "c1", "c2"];

#[derive(Debug, Clone)]
enum Op {
    /// `None` subscribes on `Scope::Any`.
    Subscribe { conversation: Option<usize>, typing: bool },
    /// Index into every subscription made so far, live or not.
    Unsubscribe(usize),
    /// `None` dispatches `Connected`, otherwise typing in that conversation.
    Dispatch(Option<usize>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (prop::option::of(0..CONVERSATIONS.len()), any::<bool>())
            .prop_map(|(conversation, typing)| Op::Subscribe { conversation, typing }),
        1 => (0usize..32).prop_map(Op::Unsubscribe),
        3 => prop::option::of(0..CONVERSATIONS.len()).prop_map(Op::Dispatch),
    ]
}

struct Model {
    scope: Scope,
    kind: EventKind,
    id: SubscriptionId,
    tag: usize,
    live: bool,
}

fn event_for(conversation: Option<usize>) -> TransportEvent {
    match conversation {
        None => TransportEvent::Connected,
        Some(c) => TransportEvent::Server(ServerEvent::UserTyping {
            user_id: UserId::new("bob"),
            conversation_id: ConversationId::new(CONVERSATIONS[c]),
            is_typing: true,
        }),
    }
}

fn expected(model: &[Model], event: &TransportEvent) -> Vec<usize> {
    let kind = event.kind();
    let matching = |scope: &Scope| {
        model.iter().filter(move |m| m.live && m.kind == kind && &m.scope == scope).map(|m| m.tag).collect::<Vec<_>>()
    };

    let mut tags = Vec::new();
    if let Some(conversation_id) = event.conversation_id() {
        tags.extend(matching(&Scope::Conversation(conversation_id.clone())));
    }
    tags.extend(matching(&Scope::Any));
    tags
}

proptest! {
    #[test]
    fn prop_delivery_follows_registration_order(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        let mut model: Vec<Model> = Vec::new();

        for op in ops {
            match op {
                Op::Subscribe { conversation, typing } => {
                    let scope = match conversation {
                        None => Scope::Any,
                        Some(c) => Scope::Conversation(ConversationId::new(CONVERSATIONS[c])),
                    };
                    let kind = if typing { EventKind::UserTyping } else { EventKind::Connect };
                    let tag = model.len();
                    let sink = Arc::clone(&log);
                    let id = dispatcher.subscribe(scope.clone(), kind, move |_| {
                        sink.lock().unwrap().push(tag);
                    });
                    model.push(Model { scope, kind, id, tag, live: true });
                },
                Op::Unsubscribe(index) => {
                    if let Some(entry) = model.get_mut(index) {
                        prop_assert_eq!(dispatcher.unsubscribe(entry.id), entry.live);
                        entry.live = false;
                    }
                },
                Op::Dispatch(conversation) => {
                    let event = event_for(conversation);
                    let want = expected(&model, &event);

                    let delivered = dispatcher.dispatch(&event);
                    let got = std::mem::take(&mut *log.lock().unwrap());

                    prop_assert_eq!(delivered, want.len());
                    prop_assert_eq!(got, want);
                },
            }

            prop_assert_eq!(dispatcher.len(), model.iter().filter(|m| m.live).count());
        }
    }
}
