//! REST collaborator.
//!
//! The durable half of the chat pipeline. Realtime delivery is best-effort;
//! whatever [`RestApi`] returns is authoritative. Implementations live in the
//! binary (HTTP) and in the test harness (in-memory).

use std::future::Future;

use amity_proto::{ConversationId, MediaRef, Message, MessageId, UserId};
use serde::{Deserialize, Serialize};

use crate::{
    error::RestError,
    event::{Attachment, RestRequest, RestResponse},
};

/// One page of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Messages, newest first.
    pub messages: Vec<Message>,
    /// 1-based page number.
    pub page: u32,
    /// Total pages available.
    pub total_pages: u32,
}

impl MessagePage {
    /// Whether an older page exists.
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Counterpart summary shown in the conversation header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Conversation (match) id.
    pub conversation_id: ConversationId,
    /// The other participant.
    pub user_id: UserId,
    /// Name to display.
    pub display_name: String,
    /// Profile photo.
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Last known presence.
    #[serde(default)]
    pub is_online: bool,
}

/// Request/response services the client depends on.
pub trait RestApi: Clone + Send + Sync + 'static {
    /// Fetch a page of messages, newest first. `before` is exclusive.
    fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        limit: u32,
        before: Option<&MessageId>,
    ) -> impl Future<Output = Result<MessagePage, RestError>> + Send;

    /// Persist a message and return the stored copy.
    fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        media: Option<&MediaRef>,
    ) -> impl Future<Output = Result<Message, RestError>> + Send;

    /// Mark a single message read.
    fn mark_read(&self, message_id: &MessageId)
    -> impl Future<Output = Result<(), RestError>> + Send;

    /// Mark every message in a conversation read.
    fn mark_all_read(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<(), RestError>> + Send;

    /// Upload an attachment and return its hosted reference.
    fn upload_media(
        &self,
        attachment: &Attachment,
    ) -> impl Future<Output = Result<MediaRef, RestError>> + Send;

    /// Fetch the counterpart summary for a conversation.
    fn fetch_match(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<MatchSummary, RestError>> + Send;
}

/// Run `request` against `api` and package the outcome as a response event.
pub async fn execute<R: RestApi>(api: R, request: RestRequest) -> RestResponse {
    match request {
        RestRequest::FetchMessages { conversation_id, page, limit, before } => {
            let result = api.fetch_messages(&conversation_id, page, limit, before.as_ref()).await;
            RestResponse::MessagesFetched { conversation_id, before, result }
        },
        RestRequest::SendMessage { conversation_id, temp_id, content, media } => {
            let result = api.send_message(&conversation_id, &content, media.as_ref()).await;
            RestResponse::MessageSent { conversation_id, temp_id, result }
        },
        RestRequest::MarkRead { conversation_id, message_id } => {
            let result = api.mark_read(&message_id).await;
            RestResponse::MarkedRead { conversation_id, result }
        },
        RestRequest::MarkAllRead { conversation_id } => {
            let result = api.mark_all_read(&conversation_id).await;
            RestResponse::MarkedRead { conversation_id, result }
        },
        RestRequest::UploadMedia { conversation_id, temp_id, content, attachment } => {
            let result = api.upload_media(&attachment).await;
            RestResponse::MediaUploaded { conversation_id, temp_id, content, result }
        },
        RestRequest::FetchMatch { conversation_id } => {
            let result = api.fetch_match(&conversation_id).await;
            RestResponse::MatchFetched { conversation_id, result }
        },
    }
}
