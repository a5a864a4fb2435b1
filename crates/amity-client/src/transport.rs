//! WebSocket transport for the client.
//!
//! Provides [`WsConnector`], which opens an authenticated WebSocket and
//! bridges it to a [`Link`]. This is a thin layer that moves CBOR frames;
//! protocol logic remains in the Sans-IO [`crate::Client`].
//!
//! Credentials travel on the upgrade request (`Authorization: Bearer` and
//! `X-User-Id`) and are never renegotiated. When the server invalidates the
//! token it closes the socket, which surfaces as a dropped link.

use amity_proto::{ClientFrame, ServerEvent, UserId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Error as WsError, Message as WsMessage,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};

use crate::{
    error::TransportError,
    runtime::{Connector, LINK_BUFFER, Link},
    session::AuthSession,
};

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Opens WebSocket links to the chat server.
#[derive(Clone)]
pub struct WsConnector {
    url: String,
    token: String,
    user_id: UserId,
}

impl std::fmt::Debug for WsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnector").field("url", &self.url).field("user_id", &self.user_id).finish()
    }
}

impl WsConnector {
    /// Create a connector for `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>, token: impl Into<String>, user_id: UserId) -> Self {
        Self { url: url.into(), token: token.into(), user_id }
    }

    /// Create a connector using the credentials of `session`.
    pub fn from_session(url: impl Into<String>, session: &AuthSession) -> Self {
        Self::new(url, session.token.clone(), session.user.id.clone())
    }
}

impl Connector for WsConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connection(format!("invalid url: {e}")))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| TransportError::Credentials(e.to_string()))?;
        let user = HeaderValue::from_str(self.user_id.as_str())
            .map_err(|e| TransportError::Credentials(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        request.headers_mut().insert(USER_ID_HEADER, user);

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let (to_server_tx, to_server_rx) = mpsc::channel(LINK_BUFFER);
        let (from_server_tx, from_server_rx) = mpsc::channel(LINK_BUFFER);

        let (sink, source) = stream.split();
        let handle = tokio::spawn(run_connection(sink, source, to_server_rx, from_server_tx));

        Ok(Link::new(to_server_tx, from_server_rx).with_abort(handle.abort_handle()))
    }
}

/// Bridge a WebSocket and the link channels until either side closes.
///
/// Dropping `from_server` on exit is what tells the runtime the link is gone.
async fn run_connection<W, R>(
    mut sink: W,
    mut source: R,
    mut to_server: mpsc::Receiver<ClientFrame>,
    from_server: mpsc::Sender<ServerEvent>,
) where
    W: Sink<WsMessage, Error = WsError> + Unpin,
    R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        tokio::select! {
            outbound = to_server.recv() => {
                let Some(frame) = outbound else { break };
                let bytes = match frame.encode() {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        tracing::warn!(%error, "dropping unencodable frame");
                        continue;
                    },
                };
                if let Err(error) = sink.send(WsMessage::Binary(bytes)).await {
                    tracing::debug!(%error, "socket write failed");
                    break;
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(WsMessage::Binary(bytes))) => match ServerEvent::decode(&bytes) {
                    Ok(event) => {
                        if from_server.send(event).await.is_err() {
                            break;
                        }
                    },
                    Err(error) => tracing::warn!(%error, "dropping undecodable frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::debug!(?frame, "server closed socket");
                    break;
                },
                Some(Ok(_)) => {},
                Some(Err(error)) => {
                    tracing::debug!(%error, "socket read failed");
                    break;
                },
                None => break,
            },
        }
    }

    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_omits_token() {
        let connector = WsConnector::new("wss://chat.example", "secret-token", "u1".into());
        assert!(!format!("{connector:?}").contains("secret-token"));
    }
}
