//! Turns conversation snapshots into terminal lines.
//!
//! Only changes are printed: a message is printed when it first appears and
//! again whenever its delivery status changes.

use std::collections::HashMap;

use amity_client::{ConversationId, ConversationPhase, ConversationSnapshot, Message, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Sending,
    Failed,
    Sent,
    Read,
}

impl Status {
    fn of(message: &Message) -> Self {
        if message.failed {
            Self::Failed
        } else if message.sending {
            Self::Sending
        } else if message.read {
            Self::Read
        } else {
            Self::Sent
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Failed => "FAILED",
            Self::Sent => "sent",
            Self::Read => "read",
        }
    }
}

/// Incremental snapshot renderer.
#[derive(Debug)]
pub struct Renderer {
    self_id: UserId,
    seen: HashMap<String, Status>,
    conversation: Option<ConversationId>,
    phase: Option<ConversationPhase>,
    typing: Vec<UserId>,
    online: Option<bool>,
}

impl Renderer {
    /// Create a renderer for the user `self_id`.
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            seen: HashMap::new(),
            conversation: None,
            phase: None,
            typing: Vec::new(),
            online: None,
        }
    }

    /// Lines describing what changed since the previous snapshot.
    pub fn render(&mut self, snapshot: Option<&ConversationSnapshot>) -> Vec<String> {
        let Some(snapshot) = snapshot else {
            if self.conversation.take().is_some() {
                self.reset();
                return vec!["-- conversation closed".to_string()];
            }
            return Vec::new();
        };

        if self.conversation.as_ref() != Some(&snapshot.conversation_id) {
            self.reset();
            self.conversation = Some(snapshot.conversation_id.clone());
        }

        let mut lines = Vec::new();
        if self.phase != Some(snapshot.phase) {
            self.phase = Some(snapshot.phase);
            lines.extend(self.phase_line(snapshot));
        }

        if let Some(counterpart) = &snapshot.counterpart
            && self.online != Some(counterpart.is_online)
        {
            self.online = Some(counterpart.is_online);
            let status = if counterpart.is_online { "online" } else { "offline" };
            lines.push(format!("-- {} is {status}", counterpart.display_name));
        }

        for message in &snapshot.messages {
            let key = key_of(message);
            let status = Status::of(message);
            if self.seen.insert(key, status) == Some(status) {
                continue;
            }
            lines.push(self.message_line(message, status));
        }

        if self.typing != snapshot.typing_users {
            self.typing.clone_from(&snapshot.typing_users);
            if !self.typing.is_empty() {
                let names: Vec<_> = self.typing.iter().map(UserId::as_str).collect();
                lines.push(format!("-- {} typing...", names.join(", ")));
            }
        }

        lines
    }

    fn reset(&mut self) {
        self.phase = None;
        self.seen.clear();
        self.typing.clear();
        self.online = None;
    }

    fn phase_line(&self, snapshot: &ConversationSnapshot) -> Option<String> {
        match snapshot.phase {
            ConversationPhase::Loading => {
                Some(format!("-- opening {}", snapshot.conversation_id))
            },
            ConversationPhase::LoadFailed => Some(format!(
                "-- could not load history ({}); /reload to retry",
                snapshot.load_error.as_ref().map_or_else(String::new, ToString::to_string)
            )),
            ConversationPhase::Ready if snapshot.has_more => {
                Some("-- older messages available; /more to load".to_string())
            },
            _ => None,
        }
    }

    fn message_line(&self, message: &Message, status: Status) -> String {
        let author = if message.sender_id == self.self_id { "me" } else { message.sender_id.as_str() };
        let body = match &message.media {
            Some(media) if message.content.is_empty() => format!("[{:?}] {}", media.kind, media.url),
            Some(media) => format!("{} [{:?}] {}", message.content, media.kind, media.url),
            None => message.content.clone(),
        };

        if message.sender_id != self.self_id {
            return format!("<{author}> {body}");
        }
        match (&message.temp_id, status) {
            (Some(temp_id), Status::Failed) => {
                format!("<{author}> {body} ({}, {temp_id})", status.label())
            },
            _ => format!("<{author}> {body} ({})", status.label()),
        }
    }
}

/// Stable render key: the temp id survives confirmation, so a message keeps
/// its key from optimistic insert onwards.
fn key_of(message: &Message) -> String {
    match (&message.temp_id, &message.id) {
        (Some(temp_id), _) => format!("t:{temp_id}"),
        (None, Some(id)) => format!("m:{id}"),
        (None, None) => format!("c:{}:{}", message.created_at, message.content),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message(id: Option<&str>, temp: Option<&str>, sender: &str, content: &str) -> Message {
        Message {
            id: id.map(Into::into),
            temp_id: temp.map(Into::into),
            conversation_id: "c1".into(),
            sender_id: sender.into(),
            content: content.into(),
            media: None,
            created_at: 0,
            read: false,
            sending: id.is_none(),
            failed: false,
        }
    }

    fn snapshot(messages: Vec<Message>) -> ConversationSnapshot {
        ConversationSnapshot {
            conversation_id: "c1".into(),
            phase: ConversationPhase::Ready,
            messages,
            has_more: false,
            load_error: None,
            typing_users: Vec::new(),
            counterpart: None,
        }
    }

    #[test]
    fn prints_new_messages_once() {
        let mut renderer = Renderer::new("me".into());
        let snap = snapshot(vec![message(Some("1"), None, "sam", "hi")]);

        assert_eq!(renderer.render(Some(&snap)), vec!["<sam> hi"]);
        assert!(renderer.render(Some(&snap)).is_empty());
    }

    #[test]
    fn reprints_on_status_change_only() {
        let mut renderer = Renderer::new("me".into());
        let pending = snapshot(vec![message(None, Some("t1"), "me", "yo")]);
        let confirmed = snapshot(vec![message(Some("9"), Some("t1"), "me", "yo")]);

        assert_eq!(renderer.render(Some(&pending)), vec!["<me> yo (sending)"]);
        assert_eq!(renderer.render(Some(&confirmed)), vec!["<me> yo (sent)"]);
        assert!(renderer.render(Some(&confirmed)).is_empty());
    }

    #[test]
    fn failed_line_names_temp_id() {
        let mut renderer = Renderer::new("me".into());
        let mut failed = message(None, Some("t1"), "me", "yo");
        failed.sending = false;
        failed.failed = true;

        let lines = renderer.render(Some(&snapshot(vec![failed])));
        assert_eq!(lines, vec!["<me> yo (FAILED, t1)"]);
    }

    #[test]
    fn typing_and_close_are_announced() {
        let mut renderer = Renderer::new("me".into());
        let mut snap = snapshot(Vec::new());
        renderer.render(Some(&snap));

        snap.typing_users = vec!["sam".into()];
        assert_eq!(renderer.render(Some(&snap)), vec!["-- sam typing..."]);
        assert_eq!(renderer.render(None), vec!["-- conversation closed"]);
        assert!(renderer.render(None).is_empty());
    }
}
