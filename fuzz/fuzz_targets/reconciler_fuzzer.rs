//! Fuzz target for message reconciliation
//!
//! Drives one conversation through arbitrary interleavings of sends, REST
//! outcomes, realtime echoes, acks, server errors, retries and discards.
//!
//! # Invariants
//!
//! - Conversation invariants hold after every step
//! - A logical message never has more than one confirmed entry
//! - NEVER panic on any ordering

#![no_main]

use std::time::Duration;

use amity_client::{Conversation, Message, MessagePage, RestError};
use amity_harness::InvariantRegistry;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

const T0: u64 = 1_700_000_000_000;

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Op {
    Send,
    RestOk,
    RestErr,
    Echo { with_temp: bool, delay_ms: u16 },
    Ack,
    ServerError,
    Retry,
    Discard,
    Reconnect,
}

fn temp(i: u8) -> String {
    format!("temp-{i}")
}

fn server_copy(i: u8, with_temp: bool, delay_ms: u16) -> Message {
    Message {
        id: Some(format!("s{i}").into()),
        temp_id: with_temp.then(|| temp(i).into()),
        conversation_id: "c1".into(),
        sender_id: "me".into(),
        content: format!("message {i}"),
        media: None,
        created_at: T0 + u64::from(i) * 10_000 + u64::from(delay_ms),
        read: false,
        sending: false,
        failed: false,
    }
}

fuzz_target!(|ops: Vec<(u8, Op)>| {
    let registry = InvariantRegistry::standard();
    let mut conversation =
        Conversation::<Duration>::new("c1".into(), "me".into(), 20, Duration::from_secs(2));
    conversation.open();
    conversation.handle_messages_fetched(None, Ok(MessagePage {
        messages: Vec::new(),
        page: 1,
        total_pages: 1,
    }));

    // Temp ids are unique per send, so each logical message is sent once,
    // before anything else refers to it.
    let mut sent = [false; 6];

    for (i, op) in ops.into_iter().take(64) {
        let i = i % 6;
        if !sent[usize::from(i)] {
            sent[usize::from(i)] = true;
            let content = format!("message {i}");
            conversation.send(temp(i).into(), content, None, T0 + u64::from(i) * 10_000);
        }

        match op {
            Op::Send => {},
            Op::RestOk => {
                conversation.handle_sent(temp(i).into(), Ok(server_copy(i, false, 300)));
            },
            Op::RestErr => {
                conversation.handle_sent(temp(i).into(), Err(RestError::Network("down".into())));
            },
            Op::Echo { with_temp, delay_ms } => {
                conversation.handle_new_message(server_copy(i, with_temp, delay_ms));
            },
            Op::Ack => {
                conversation.handle_ack(&temp(i).into());
            },
            Op::ServerError => {
                conversation.handle_send_error(&temp(i).into(), "rejected");
            },
            Op::Retry => {
                let _ = conversation.retry_send(&temp(i).into());
            },
            Op::Discard => {
                let _ = conversation.discard_failed(&temp(i).into());
            },
            Op::Reconnect => {
                conversation.take_resends();
            },
        }

        if let Err(violations) = registry.check_all(&conversation.snapshot()) {
            panic!("after {op:?} on {i}: {violations:?}");
        }
    }
});
