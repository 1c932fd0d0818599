//! Remote store backed by a `roomsync-server`.
//!
//! Each subscription opens its own WebSocket connection; writes go over
//! HTTP. Dropping a [`ChangeStream`] closes its connection.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use roomsync_engine::protocol::{parse_server_message, ClientMessage, ServerMessage};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use super::{ChangeStream, RemoteStore};
use crate::error::RemoteError;

/// WebSocket subscriptions plus HTTP writes against one server.
#[derive(Debug, Clone)]
pub struct WsRemote {
    base_url: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl WsRemote {
    /// Create a backend for a server base URL such as `http://localhost:3000`.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, RemoteError> {
        let base_url =
            Url::parse(base_url).map_err(|e| RemoteError::Connection(e.to_string()))?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(RemoteError::Connection(format!(
                    "unsupported scheme {other}, expected http or https"
                )))
            }
        }
        Ok(Self {
            base_url,
            token,
            http: reqwest::Client::new(),
        })
    }

    /// The WebSocket endpoint derived from the base URL.
    pub fn ws_url(&self) -> Result<Url, RemoteError> {
        let mut url = self
            .base_url
            .join("ws")
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        let scheme = if self.base_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|_| RemoteError::Connection(format!("cannot use scheme {scheme}")))?;
        Ok(url)
    }

    /// HTTP endpoint of one document.
    pub fn document_url(&self, path: &str, doc_id: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(&format!(
                "documents/{}/{}",
                path.trim_matches('/'),
                doc_id
            ))
            .map_err(|e| RemoteError::Connection(e.to_string()))
    }

    fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }
}

#[async_trait]
impl RemoteStore for WsRemote {
    async fn subscribe(&self, path: &str) -> Result<ChangeStream, RemoteError> {
        let url = self.ws_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        if let Some(bearer) = self.bearer() {
            let value = HeaderValue::from_str(&bearer)
                .map_err(|e| RemoteError::Connection(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        tracing::debug!(%url, %path, "connecting subscription");
        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = ClientMessage::Subscribe {
            path: path.to_string(),
            request_id: Some(uuid::Uuid::new_v4().to_string()),
        };
        let text =
            serde_json::to_string(&subscribe).map_err(|e| RemoteError::Protocol(e.to_string()))?;
        write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;

        // Wait for the acknowledgement so a rejected subscription fails here.
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => match parse_server_message(&text) {
                    Ok(ServerMessage::Subscribed { .. }) => break,
                    Ok(ServerMessage::Error { message, .. }) => {
                        return Err(RemoteError::Subscription {
                            path: path.to_string(),
                            message,
                        })
                    }
                    Ok(other) => tracing::trace!(?other, "ignoring message before ack"),
                    Err(e) => return Err(RemoteError::Protocol(e.to_string())),
                },
                Some(Ok(Message::Close(_))) | None => return Err(RemoteError::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(RemoteError::Connection(e.to_string())),
            }
        }

        tracing::debug!(%path, "subscription acknowledged");
        let path = path.to_string();

        let stream = async_stream::stream! {
            // Keep the sink alive for as long as the subscription runs.
            let _write = write;
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => match parse_server_message(&text) {
                        Ok(ServerMessage::Error { message, .. }) => {
                            yield Err(RemoteError::Subscription { path: path.clone(), message });
                        }
                        Ok(message) => {
                            if let Some(batch) = message.into_batch() {
                                yield Ok(batch);
                            }
                        }
                        Err(e) => yield Err(RemoteError::Protocol(e.to_string())),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(RemoteError::Connection(e.to_string()));
                        break;
                    }
                }
            }
            tracing::debug!(%path, "subscription stream ended");
        };

        Ok(stream.boxed())
    }

    async fn write(
        &self,
        path: &str,
        doc_id: &str,
        document: serde_json::Value,
    ) -> Result<(), RemoteError> {
        let url = self.document_url(path, doc_id)?;
        let write_error = |message: String| RemoteError::Write {
            path: path.to_string(),
            message,
        };

        let mut request = self.http.put(url).json(&document);
        if let Some(bearer) = self.bearer() {
            request = request.header(reqwest::header::AUTHORIZATION, bearer);
        }

        let response = request.send().await.map_err(|e| write_error(e.to_string()))?;
        response
            .error_for_status()
            .map_err(|e| write_error(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_endpoints() {
        let remote = WsRemote::new("http://localhost:3000", None).unwrap();
        assert_eq!(remote.ws_url().unwrap().as_str(), "ws://localhost:3000/ws");
        assert_eq!(
            remote.document_url("users/u1/rooms", "r-1").unwrap().as_str(),
            "http://localhost:3000/documents/users/u1/rooms/r-1"
        );

        let secure = WsRemote::new("https://sync.example.com/", None).unwrap();
        assert_eq!(secure.ws_url().unwrap().as_str(), "wss://sync.example.com/ws");
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            WsRemote::new("ftp://example.com", None),
            Err(RemoteError::Connection(_))
        ));
        assert!(WsRemote::new("not a url", None).is_err());
    }

    #[test]
    fn bearer_header() {
        let remote = WsRemote::new("http://localhost:3000", Some("secret".into())).unwrap();
        assert_eq!(remote.bearer().as_deref(), Some("Bearer secret"));
    }
}
