use std::error;
use std::mem;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::multipart::{Form, Part};

use super::{Connection, Request, Transport, TransportEvent, TransportKind};
use crate::client::Backend;
use crate::error::{Error, Result};
use crate::observability::STREAM_BYTES;

/// Chunked-upload transport: `POST /upload-file` with a multipart body.
///
/// The response body has no event framing.  Each decoded chunk is a
/// [`TransportEvent::Token`], and end-of-body is [`TransportEvent::End`], so
/// the answer is whatever the chunks concatenate to.
#[derive(Debug, Clone)]
pub struct UploadTransport {
    backend: Backend,
}

impl UploadTransport {
    /// Creates an upload transport on top of `backend`.
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl Transport for UploadTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ChunkedUpload
    }

    async fn open(&self, request: &Request) -> Result<Connection> {
        let Some(file) = &request.file else {
            return Err(Error::validation(
                "file upload requires an attached file",
                Some("file".to_string()),
            ));
        };

        let part = Part::bytes(file.raw_bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| {
                Error::validation(
                    format!("invalid MIME type {:?}: {e}", file.mime_type),
                    Some("mime_type".to_string()),
                )
            })?;
        let mut form = Form::new()
            .part("file", part)
            .text("message", request.text.clone())
            .text("userId", request.user_id.clone());
        if let Some(conversation_id) = &request.conversation_id {
            form = form.text("conversationId", conversation_id.clone());
        }

        let url = self.backend.endpoint("upload-file")?;
        let response = self
            .backend
            .post_multipart(url, form)
            .await
            .map_err(|e| Error::upload(e.to_string()))?;
        Ok(Connection::new(self.kind(), chunks(response.bytes_stream())))
    }
}

/// Incremental UTF-8 decoder that tolerates characters split across chunks.
///
/// Invalid sequences decode to U+FFFD rather than failing the upload.
#[derive(Default)]
struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete trailing character; wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let rest = mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

struct ChunkState<S> {
    stream: S,
    decoder: ChunkDecoder,
    end_pending: bool,
    finished: bool,
}

/// Decode a raw response body into upload events.
pub(crate) fn chunks<S, E>(byte_stream: S) -> impl Stream<Item = Result<TransportEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send,
    E: error::Error + Send + Sync + 'static,
{
    let state = ChunkState {
        stream: byte_stream,
        decoder: ChunkDecoder::default(),
        end_pending: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        if state.end_pending {
            state.finished = true;
            return Some((Ok(TransportEvent::End), state));
        }
        loop {
            match state.stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    let text = state.decoder.push(&bytes);
                    if !text.is_empty() {
                        return Some((Ok(TransportEvent::Token(text)), state));
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let event = TransportEvent::ConnectionFailed {
                        reason: format!("reading the response failed: {e}"),
                    };
                    return Some((Ok(event), state));
                }
                None => {
                    let tail = state.decoder.finish();
                    if !tail.is_empty() {
                        state.end_pending = true;
                        return Some((Ok(TransportEvent::Token(tail)), state));
                    }
                    state.finished = true;
                    return Some((Ok(TransportEvent::End), state));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    async fn run(parts: Vec<std::result::Result<Bytes, io::Error>>) -> Vec<TransportEvent> {
        chunks(stream::iter(parts))
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn chunks_then_end() {
        let events = run(vec![
            Ok(Bytes::from_static(b"A")),
            Ok(Bytes::from_static(b"B")),
            Ok(Bytes::from_static(b"C")),
        ])
        .await;
        assert_eq!(
            events,
            vec![
                TransportEvent::Token("A".into()),
                TransportEvent::Token("B".into()),
                TransportEvent::Token("C".into()),
                TransportEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn split_character_is_held_until_complete() {
        let snowman = "\u{2603}".as_bytes();
        let events = run(vec![
            Ok(Bytes::copy_from_slice(&snowman[..1])),
            Ok(Bytes::copy_from_slice(&snowman[1..])),
        ])
        .await;
        assert_eq!(
            events,
            vec![TransportEvent::Token("\u{2603}".into()), TransportEvent::End]
        );
    }

    #[tokio::test]
    async fn invalid_bytes_become_replacement_characters() {
        let events = run(vec![Ok(Bytes::from_static(b"a\xffb"))]).await;
        assert_eq!(events[0], TransportEvent::Token("a\u{fffd}b".into()));
    }

    #[tokio::test]
    async fn dangling_partial_character_is_flushed_at_end() {
        let events = run(vec![Ok(Bytes::from_static(b"ok\xe2\x98"))]).await;
        assert_eq!(
            events,
            vec![
                TransportEvent::Token("ok".into()),
                TransportEvent::Token("\u{fffd}".into()),
                TransportEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn read_failure_is_a_connection_failure() {
        let events = run(vec![
            Ok(Bytes::from_static(b"A")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")),
        ])
        .await;
        assert_eq!(events[0], TransportEvent::Token("A".into()));
        match &events[1] {
            TransportEvent::ConnectionFailed { reason } => assert!(reason.contains("truncated")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn open_without_file_is_rejected() {
        let backend = Backend::new("http://127.0.0.1:9/").unwrap();
        let transport = UploadTransport::new(backend);
        let err = transport
            .open(&Request::new("summarize", "default"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
