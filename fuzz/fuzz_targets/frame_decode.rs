//! Fuzz target for wire frame decoding
//!
//! # Strategy
//!
//! - Random bytes: arbitrary input to both decoders
//! - Valid prefix: a well-formed frame with random trailing bytes
//! - Oversized: input just past the frame size limit
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - Anything that decodes re-encodes and decodes to the same value
//! - Input over `MAX_FRAME_SIZE` is always rejected

#![no_main]

use amity_proto::{ClientFrame, MAX_FRAME_SIZE, ServerEvent};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input {
    RandomBytes(Vec<u8>),
    ValidPrefix { conversation: String, is_typing: bool, trailing: Vec<u8> },
    Oversized { fill: u8 },
}

fuzz_target!(|input: Input| {
    match input {
        Input::RandomBytes(bytes) => check(&bytes),
        Input::ValidPrefix { conversation, is_typing, trailing } => {
            let frame =
                ClientFrame::Typing { conversation_id: conversation.into(), is_typing };
            let Ok(mut bytes) = frame.encode() else { return };
            bytes.extend_from_slice(&trailing);
            check(&bytes);
        },
        Input::Oversized { fill } => {
            let bytes = vec![fill; MAX_FRAME_SIZE + 1];
            assert!(ServerEvent::decode(&bytes).is_err());
            assert!(ClientFrame::decode(&bytes).is_err());
        },
    }
});

fn check(bytes: &[u8]) {
    if let Ok(event) = ServerEvent::decode(bytes) {
        let encoded = event.encode().unwrap();
        assert_eq!(ServerEvent::decode(&encoded).unwrap(), event);
    }
    if let Ok(frame) = ClientFrame::decode(bytes) {
        let encoded = frame.encode().unwrap();
        assert_eq!(ClientFrame::decode(&encoded).unwrap(), frame);
    }
}
