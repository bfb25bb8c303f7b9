use std::error;

use bytes::Bytes;
use futures::future;
use futures::stream::{self, Stream, StreamExt};

use super::{Connection, Request, Transport, TransportEvent, TransportKind};
use crate::client::Backend;
use crate::error::Result;
use crate::sse::process_sse;

/// Token-stream transport: `GET /chat-stream?message=..&userId=..`.
#[derive(Debug, Clone)]
pub struct ChatTransport {
    backend: Backend,
}

impl ChatTransport {
    /// Creates a chat transport on top of `backend`.
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl Transport for ChatTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::TokenStream
    }

    async fn open(&self, request: &Request) -> Result<Connection> {
        open_event_stream(&self.backend, self.kind(), "chat-stream", "message", request).await
    }
}

/// Single-shot transport: `GET /web-search?query=..&userId=..`.
#[derive(Debug, Clone)]
pub struct SearchTransport {
    backend: Backend,
}

impl SearchTransport {
    /// Creates a search transport on top of `backend`.
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl Transport for SearchTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::SingleShot
    }

    async fn open(&self, request: &Request) -> Result<Connection> {
        open_event_stream(&self.backend, self.kind(), "web-search", "query", request).await
    }
}

async fn open_event_stream(
    backend: &Backend,
    kind: TransportKind,
    path: &str,
    text_param: &str,
    request: &Request,
) -> Result<Connection> {
    let mut url = backend.endpoint(path)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair(text_param, &request.text);
        query.append_pair("userId", &request.user_id);
        if let Some(conversation_id) = &request.conversation_id {
            query.append_pair("conversationId", conversation_id);
        }
    }

    let response = backend.get_event_stream(url).await?;
    Ok(Connection::new(kind, events(kind, response.bytes_stream())))
}

/// Classify the server-sent events of `byte_stream` for `kind`.
///
/// Events the variant does not listen to are skipped.  A failing byte stream
/// becomes [`TransportEvent::ConnectionFailed`], and so does a stream that
/// ends before any terminal event: a closed event stream is an error, never a
/// completion.
pub(crate) fn events<S, E>(
    kind: TransportKind,
    byte_stream: S,
) -> impl Stream<Item = Result<TransportEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send,
    E: error::Error + Send + Sync + 'static,
{
    process_sse(byte_stream)
        .filter_map(move |item| {
            future::ready(match item {
                Ok(event) => kind.classify(&event.event, event.data).map(Ok),
                Err(e) if e.is_streaming() => Some(Ok(TransportEvent::ConnectionFailed {
                    reason: e.to_string(),
                })),
                Err(e) => Some(Err(e)),
            })
        })
        .chain(stream::once(future::ready(Ok(
            TransportEvent::ConnectionFailed {
                reason: "event stream closed before a final event".to_string(),
            },
        ))))
}
