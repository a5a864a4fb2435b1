//! Client events and actions.

use amity_core::TransportEvent;
use amity_proto::{
    ClientFrame, ConversationId, MediaRef, Message, MessageId, ServerEvent, TempId,
};

use crate::{
    error::RestError,
    rest::{MatchSummary, MessagePage},
};

/// Media picked or recorded by the user, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Raw file contents.
    pub bytes: Vec<u8>,
    /// MIME type reported by the picker or recorder.
    pub mime: String,
    /// Original file name, if known.
    pub file_name: Option<String>,
}

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Opening and closing the socket when asked, and reporting the outcome
/// - Forwarding server pushes as `FrameReceived`
/// - Running REST requests and feeding the outcome back as `RestCompleted`
/// - Driving time forward via ticks
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation environments.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Start the realtime connection.
    Connect,

    /// Tear down the session's realtime state (logout).
    Disconnect,

    /// The transport open requested by [`ClientAction::Open`] succeeded.
    TransportOpened,

    /// The transport open requested by [`ClientAction::Open`] failed.
    TransportOpenFailed {
        /// Why the open failed.
        reason: String,
    },

    /// An established transport dropped.
    TransportClosed {
        /// Why it dropped.
        reason: String,
    },

    /// Event pushed by the server.
    FrameReceived(ServerEvent),

    /// Time tick for typing and reconnect timers.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// User opened a conversation.
    OpenConversation {
        /// Conversation to open.
        conversation_id: ConversationId,
    },

    /// User navigated away from the open conversation.
    CloseConversation,

    /// User scrolled to the top; fetch the next older page.
    LoadMore,

    /// Retry a failed initial load.
    RetryLoad,

    /// User typed in the composer.
    Keystroke,

    /// User sent a message.
    SendMessage {
        /// Text body. May be empty when an attachment is present.
        content: String,
        /// Optional media to upload first.
        attachment: Option<Attachment>,
    },

    /// Resend a failed message.
    RetrySend {
        /// Temp id of the failed message.
        temp_id: TempId,
    },

    /// Remove a failed message from the list.
    DiscardFailed {
        /// Temp id of the failed message.
        temp_id: TempId,
    },

    /// A request from [`ClientAction::Request`] finished.
    RestCompleted(RestResponse),
}

/// Durable operations the client asks the caller to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestRequest {
    /// Fetch one page of history, newest first.
    FetchMessages {
        /// Conversation to fetch.
        conversation_id: ConversationId,
        /// 1-based page number.
        page: u32,
        /// Page size.
        limit: u32,
        /// Exclusive upper bound. `None` for the newest page.
        before: Option<MessageId>,
    },

    /// Persist a message.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Temp id of the optimistic entry to reconcile against.
        temp_id: TempId,
        /// Text body.
        content: String,
        /// Already-uploaded attachment.
        media: Option<MediaRef>,
    },

    /// Mark one message read.
    MarkRead {
        /// Conversation the message belongs to.
        conversation_id: ConversationId,
        /// Message that was read.
        message_id: MessageId,
    },

    /// Mark every message in a conversation read.
    MarkAllRead {
        /// Conversation that was read.
        conversation_id: ConversationId,
    },

    /// Upload an attachment before sending.
    UploadMedia {
        /// Conversation the send targets.
        conversation_id: ConversationId,
        /// Temp id reserved for the message that will carry the media.
        temp_id: TempId,
        /// Text body to send once the upload finishes.
        content: String,
        /// File to upload.
        attachment: Attachment,
    },

    /// Fetch the counterpart's summary for the conversation header.
    FetchMatch {
        /// Conversation whose counterpart to fetch.
        conversation_id: ConversationId,
    },
}

impl RestRequest {
    /// Conversation the request belongs to.
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::FetchMessages { conversation_id, .. }
            | Self::SendMessage { conversation_id, .. }
            | Self::MarkRead { conversation_id, .. }
            | Self::MarkAllRead { conversation_id }
            | Self::UploadMedia { conversation_id, .. }
            | Self::FetchMatch { conversation_id } => conversation_id,
        }
    }
}

/// Outcome of a [`RestRequest`], fed back as [`ClientEvent::RestCompleted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestResponse {
    /// Answer to [`RestRequest::FetchMessages`].
    MessagesFetched {
        /// Conversation that was fetched.
        conversation_id: ConversationId,
        /// Cursor the request used. `None` marks the initial page.
        before: Option<MessageId>,
        /// Page or failure.
        result: Result<MessagePage, RestError>,
    },

    /// Answer to [`RestRequest::SendMessage`].
    MessageSent {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Temp id of the optimistic entry.
        temp_id: TempId,
        /// Authoritative message or failure.
        result: Result<Message, RestError>,
    },

    /// Answer to [`RestRequest::UploadMedia`].
    MediaUploaded {
        /// Conversation the send targets.
        conversation_id: ConversationId,
        /// Temp id reserved for the message.
        temp_id: TempId,
        /// Text body to send with the media.
        content: String,
        /// Hosted media or failure.
        result: Result<MediaRef, RestError>,
    },

    /// Answer to [`RestRequest::FetchMatch`].
    MatchFetched {
        /// Conversation whose counterpart was fetched.
        conversation_id: ConversationId,
        /// Summary or failure.
        result: Result<MatchSummary, RestError>,
    },

    /// Answer to [`RestRequest::MarkRead`] or [`RestRequest::MarkAllRead`].
    MarkedRead {
        /// Conversation that was marked.
        conversation_id: ConversationId,
        /// Failure is logged only.
        result: Result<(), RestError>,
    },
}

impl RestResponse {
    /// Conversation the originating request belonged to.
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::MessagesFetched { conversation_id, .. }
            | Self::MessageSent { conversation_id, .. }
            | Self::MediaUploaded { conversation_id, .. }
            | Self::MatchFetched { conversation_id, .. }
            | Self::MarkedRead { conversation_id, .. } => conversation_id,
        }
    }
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send a frame over the realtime connection.
    ///
    /// Only produced while connected.
    Emit(ClientFrame),

    /// Run a REST request and feed the outcome back.
    Request(RestRequest),

    /// Open the transport with the session credentials.
    Open,

    /// Close the transport.
    Close {
        /// Reason for closing.
        reason: String,
    },

    /// Deliver a connection lifecycle event to subscribers.
    ///
    /// Server pushes are dispatched by the caller directly when they arrive.
    Notify(TransportEvent),

    /// Visible conversation state changed; re-render.
    ConversationChanged,

    /// A send was abandoned before any message was inserted (upload failed).
    SendAborted {
        /// Temp id that was reserved for the message.
        temp_id: TempId,
        /// Why.
        reason: String,
    },

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
