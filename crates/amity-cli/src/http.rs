//! HTTP implementation of the REST collaborator.
//!
//! Routes, relative to the API base URL:
//!
//! | Call | Route |
//! |---|---|
//! | fetch match | `GET /matches/{conversation}` |
//! | fetch page | `GET /messages/{conversation}?page&limit&before` |
//! | send | `POST /messages/{conversation}` |
//! | mark read | `PUT /messages/{message}/read` |
//! | mark all read | `PUT /messages/{conversation}/read-all` |
//! | upload | `POST /media` (raw body, `Content-Type` set to the MIME type) |
//!
//! Every request carries the session token as a bearer credential. Ids are
//! percent-encoded as single path segments.

use std::sync::Arc;

use amity_client::{Attachment, MatchSummary, MessagePage, RestApi, RestError};
use amity_proto::{ConversationId, MediaKind, MediaRef, Message, MessageId};
use reqwest::{RequestBuilder, Response, Url, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// REST backend over HTTP.
#[derive(Clone)]
pub struct HttpRest {
    client: reqwest::Client,
    base: Arc<Url>,
    token: Arc<str>,
}

/// Backend could not be built.
#[derive(Debug, Error)]
pub enum HttpSetupError {
    /// API base is not an absolute http(s) URL with a path.
    #[error("invalid API base URL {base}: {reason}")]
    BaseUrl {
        /// Rejected input.
        base: String,
        /// Why it was rejected.
        reason: String,
    },
    /// HTTP client construction failed.
    #[error(transparent)]
    Client(#[from] reqwest::Error),
}

impl std::fmt::Debug for HttpRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRest").field("base", &self.base).finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SendBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<&'a MediaRef>,
}

#[derive(Deserialize)]
struct Uploaded {
    url: String,
    /// Kind the upload service detected. Older servers omit it.
    #[serde(default)]
    kind: Option<MediaKind>,
}

impl Uploaded {
    fn into_media(self, mime: &str) -> MediaRef {
        MediaRef { url: self.url, kind: self.kind.unwrap_or_else(|| MediaKind::from_mime(mime)) }
    }
}

impl HttpRest {
    /// Create a backend rooted at `base` (for example `https://api.example/v1`).
    ///
    /// # Errors
    ///
    /// - `HttpSetupError::BaseUrl` if `base` does not parse or cannot carry
    ///   a path
    /// - `HttpSetupError::Client` if the HTTP client cannot be built
    pub fn new(base: &str, token: &str) -> Result<Self, HttpSetupError> {
        let invalid = |reason: String| HttpSetupError::BaseUrl { base: base.to_string(), reason };
        let base_url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".to_string()));
        }

        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, base: Arc::new(base_url), token: token.into() })
    }

    /// Append `segments` to the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = Url::clone(&self.base);
        // Checked hierarchical in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, segments: &[&str]) -> RequestBuilder {
        self.client.get(self.url(segments)).bearer_auth(&self.token)
    }

    fn post(&self, segments: &[&str]) -> RequestBuilder {
        self.client.post(self.url(segments)).bearer_auth(&self.token)
    }

    fn put(&self, segments: &[&str]) -> RequestBuilder {
        self.client.put(self.url(segments)).bearer_auth(&self.token)
    }
}

async fn send(request: RequestBuilder) -> Result<Response, RestError> {
    let response = request.send().await.map_err(|e| RestError::Network(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.text().await {
        Ok(body) if !body.trim().is_empty() => body,
        _ => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    Err(RestError::Status { code: status.as_u16(), message })
}

async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RestError> {
    send(request).await?.json().await.map_err(|e| RestError::Decode(e.to_string()))
}

/// Query string for a history page.
fn page_query(page: u32, limit: u32, before: Option<&MessageId>) -> Vec<(&'static str, String)> {
    let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
    if let Some(before) = before {
        query.push(("before", before.to_string()));
    }
    query
}

impl RestApi for HttpRest {
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        limit: u32,
        before: Option<&MessageId>,
    ) -> Result<MessagePage, RestError> {
        let request = self
            .get(&["messages", conversation_id.as_str()])
            .query(&page_query(page, limit, before));
        json(request).await
    }

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        media: Option<&MediaRef>,
    ) -> Result<Message, RestError> {
        let request =
            self.post(&["messages", conversation_id.as_str()]).json(&SendBody { content, media });
        json(request).await
    }

    async fn mark_read(&self, message_id: &MessageId) -> Result<(), RestError> {
        send(self.put(&["messages", message_id.as_str(), "read"])).await.map(drop)
    }

    async fn mark_all_read(&self, conversation_id: &ConversationId) -> Result<(), RestError> {
        send(self.put(&["messages", conversation_id.as_str(), "read-all"])).await.map(drop)
    }

    async fn upload_media(&self, attachment: &Attachment) -> Result<MediaRef, RestError> {
        let mut request = self
            .post(&["media"])
            .header(CONTENT_TYPE, attachment.mime.as_str())
            .body(attachment.bytes.clone());
        if let Some(name) = &attachment.file_name {
            request = request.query(&[("name", name)]);
        }

        let uploaded: Uploaded = json(request).await?;
        Ok(uploaded.into_media(&attachment.mime))
    }

    async fn fetch_match(&self, conversation_id: &ConversationId) -> Result<MatchSummary, RestError> {
        json(self.get(&["matches", conversation_id.as_str()])).await
    }
}
