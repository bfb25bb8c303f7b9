//! Server-Sent Events (SSE) framing.
//!
//! This module turns the raw byte stream of an HTTP response into a stream of
//! named [`SseEvent`]s.  It knows nothing about what the events mean; the
//! transports in [`crate::transport`] classify them.

use std::error;
use std::mem;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::observability::STREAM_BYTES;

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, or [`DEFAULT_EVENT`].
    pub event: String,
    /// All `data:` lines of the frame joined with `\n`.
    pub data: String,
}

#[derive(Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
}

impl PendingEvent {
    fn field(&mut self, line: &str) {
        // Lines starting with ':' are comments (keep-alives).
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let pending = mem::take(self);
        if pending.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: pending.event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: pending.data.join("\n"),
        })
    }
}

struct SseState<S> {
    stream: S,
    buffer: Vec<u8>,
    pending: PendingEvent,
    finished: bool,
}

impl<S> SseState<S> {
    /// Consume complete lines from the buffer until an event dispatches or a
    /// line fails to decode.
    fn next_buffered(&mut self) -> Option<Result<SseEvent>> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(item) = self.line(&line) {
                return Some(item);
            }
        }
        None
    }

    fn line(&mut self, line: &[u8]) -> Option<Result<SseEvent>> {
        match std::str::from_utf8(line) {
            Ok("") => self.pending.dispatch().map(Ok),
            Ok(text) => {
                self.pending.field(text);
                None
            }
            Err(e) => Some(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            ))),
        }
    }
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Frames may be split across chunks at any byte, including inside a
/// multi-byte character.  A line that is not valid UTF-8 yields an
/// [`Error::Encoding`] item and parsing continues with the next line.  A
/// failure of the underlying stream yields one [`Error::Streaming`] item and
/// ends the stream.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: error::Error + Send + Sync + 'static,
{
    let state = SseState {
        stream: byte_stream,
        buffer: Vec::new(),
        pending: PendingEvent::default(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.next_buffered() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    state.buffer.extend_from_slice(&bytes);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(Error::streaming(
                            format!("Error in HTTP stream: {e}"),
                            Some(Box::new(e)),
                        )),
                        state,
                    ));
                }
                None => {
                    // End of stream: flush an unterminated final line and
                    // dispatch whatever frame it completes.
                    state.finished = true;
                    let rest = mem::take(&mut state.buffer);
                    if !rest.is_empty() {
                        if let Some(item) = state.line(&rest) {
                            return Some((item, state));
                        }
                    }
                    return state.pending.dispatch().map(|event| (Ok(event), state));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    async fn collect(parts: &[&[u8]]) -> Vec<Result<SseEvent>> {
        let parts: Vec<std::result::Result<Bytes, io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        process_sse(stream::iter(parts)).collect().await
    }

    fn event(name: &str, data: &str) -> SseEvent {
        SseEvent {
            event: name.to_string(),
            data: data.to_string(),
        }
    }

    #[tokio::test]
    async fn parse_token_event() {
        let events = collect(&[b"event:token\ndata:Hello\n\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &event("token", "Hello"));
    }

    #[tokio::test]
    async fn parse_multiple_events() {
        let events = collect(&[b"event: token\ndata: He\n\nevent: complete\ndata: Hello\n\n"]).await;
        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![event("token", "He"), event("complete", "Hello")]);
    }

    #[tokio::test]
    async fn only_one_leading_space_is_stripped() {
        let events = collect(&[b"event: token\ndata:  world\n\n"]).await;
        assert_eq!(events[0].as_ref().unwrap().data, " world");
    }

    #[tokio::test]
    async fn handle_split_event() {
        let events = collect(&[b"event: tok", b"en\ndata: par", b"tial\n", b"\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &event("token", "partial"));
    }

    #[tokio::test]
    async fn handle_split_multibyte_character() {
        let text = "caf\u{e9}".as_bytes();
        // Split inside the two-byte encoding of 'é'.
        let (head, tail) = text.split_at(4);
        let events = collect(&[b"event: token\ndata: ", head, tail, b"\n\n"]).await;
        assert_eq!(events[0].as_ref().unwrap().data, "caf\u{e9}");
    }

    #[tokio::test]
    async fn crlf_and_multiline_data() {
        let events = collect(&[b"event: complete\r\ndata: line one\r\ndata: line two\r\n\r\n"]).await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &event("complete", "line one\nline two")
        );
    }

    #[tokio::test]
    async fn comments_and_unknown_fields_are_ignored() {
        let events = collect(&[b": keep-alive\n\nid: 7\nretry: 100\ndata: plain\n\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &event(DEFAULT_EVENT, "plain"));
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_reported_and_parsing_continues() {
        let events = collect(&[b"event: token\ndata: \xff\xfe\n\nevent: token\ndata: ok\n\n"]).await;
        assert!(matches!(events[0], Err(Error::Encoding { .. })));
        assert_eq!(events.last().unwrap().as_ref().unwrap(), &event("token", "ok"));
    }

    #[tokio::test]
    async fn unterminated_final_frame_is_dispatched() {
        let events = collect(&[b"event: complete\ndata: done"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &event("complete", "done"));
    }

    #[tokio::test]
    async fn stream_failure_ends_with_streaming_error() {
        let parts: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"event: token\ndata: a\n\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"event: token\ndata: b\n\n")),
        ];
        let events: Vec<_> = process_sse(stream::iter(parts)).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &event("token", "a"));
        assert!(events[1].as_ref().unwrap_err().is_streaming());
    }
}
