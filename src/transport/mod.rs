//! Transports: the three ways a request reaches the backend.
//!
//! Every transport opens one network resource and exposes it as a
//! [`Connection`], an owned stream of [`TransportEvent`]s.  The variants
//! differ only in how they turn bytes into events:
//!
//! - [`ChatTransport`] (token-stream): `token` deltas then an authoritative
//!   `complete` payload.
//! - [`SearchTransport`] (single-shot-stream): normally a lone
//!   `search_results` payload, though deltas are honored if they arrive.
//! - [`UploadTransport`] (chunked-upload): a multipart POST whose raw body
//!   chunks are deltas and whose end-of-body completes the answer with the
//!   accumulated text.

use std::fmt;
use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::error::Result;
use crate::store::FileRef;

mod event_stream;
mod scripted;
mod upload;

pub use event_stream::{ChatTransport, SearchTransport};
pub use scripted::ScriptedTransport;
pub use upload::UploadTransport;

/// Marker appended to the frozen text when a chunked upload is stopped.
pub const STOPPED_MARKER: &str = " [Response stopped]";

/// Text shown when an event stream fails before producing anything.
pub const FALLBACK_ERROR_TEXT: &str = "Error, please try again.";

/// One incremental event from an open connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A fragment to append to the answer.
    Token(String),
    /// The complete answer, superseding any accumulated fragments.
    Final(String),
    /// End of a chunked body; the accumulated fragments are the answer.
    End,
    /// The backend reported an error inside the event vocabulary.
    Error(String),
    /// The connection failed outside the event vocabulary.
    ConnectionFailed {
        /// Why the connection failed.
        reason: String,
    },
}

/// Which of the three transport variants produced a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Conversational chat over an event stream.
    #[default]
    TokenStream,
    /// Web search over an event stream.
    SingleShot,
    /// File analysis over a chunked HTTP body.
    ChunkedUpload,
}

impl TransportKind {
    /// Failure and stop handling for this variant.
    pub fn policy(self) -> TransportPolicy {
        match self {
            TransportKind::TokenStream | TransportKind::SingleShot => TransportPolicy {
                fallback_error_text: FALLBACK_ERROR_TEXT,
                stop_marker: None,
                report_failure_reason: false,
            },
            TransportKind::ChunkedUpload => TransportPolicy {
                fallback_error_text: "Error processing file.",
                stop_marker: Some(STOPPED_MARKER),
                report_failure_reason: true,
            },
        }
    }

    /// Maps a named server-sent event onto the transport vocabulary.
    ///
    /// Returns `None` for events this variant does not listen to.
    pub fn classify(self, event: &str, data: String) -> Option<TransportEvent> {
        match (self, event) {
            (TransportKind::ChunkedUpload, _) => None,
            (_, "token") => Some(TransportEvent::Token(data)),
            (_, "complete") => Some(TransportEvent::Final(data)),
            (TransportKind::SingleShot, "search_results") => Some(TransportEvent::Final(data)),
            (_, "error") => Some(TransportEvent::Error(data)),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::TokenStream => "chat",
            TransportKind::SingleShot => "search",
            TransportKind::ChunkedUpload => "upload",
        };
        f.write_str(name)
    }
}

/// How a transport variant words failures and stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportPolicy {
    /// Text shown when an error leaves nothing accumulated.
    pub fallback_error_text: &'static str,
    /// Suffix applied to the frozen text on a user stop.
    pub stop_marker: Option<&'static str>,
    /// Whether connection failures are rendered with their reason.
    pub report_failure_reason: bool,
}

impl TransportPolicy {
    /// Visible text after an error event or an unprocessable event.
    pub fn error_text(&self, accumulated: &str) -> String {
        if accumulated.is_empty() {
            self.fallback_error_text.to_string()
        } else {
            accumulated.to_string()
        }
    }

    /// Visible text after the connection itself failed.
    pub fn failure_text(&self, accumulated: &str, reason: &str) -> String {
        if !self.report_failure_reason {
            self.error_text(accumulated)
        } else if accumulated.is_empty() {
            format!("Error: {reason}")
        } else {
            format!("{accumulated}\n\n[Error: {reason}]")
        }
    }

    /// Visible text after a user stop, if it changes at all.
    pub fn stopped_text(&self, accumulated: &str) -> Option<String> {
        self.stop_marker
            .map(|marker| format!("{accumulated}{marker}").trim_start().to_string())
    }
}

impl Default for TransportPolicy {
    fn default() -> Self {
        TransportKind::TokenStream.policy()
    }
}

/// Parameters for one submission.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    /// The user's message or search query.
    pub text: String,
    /// Identifies the user to the backend.
    pub user_id: String,
    /// Backend-side conversation memory key, if any.
    pub conversation_id: Option<String>,
    /// File for chunked-upload requests.
    pub file: Option<FileRef>,
}

impl Request {
    /// Creates a request without conversation or file.
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            conversation_id: None,
            file: None,
        }
    }

    /// Sets the conversation id.
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Sets the attached file.
    pub fn with_file(mut self, file: Option<FileRef>) -> Self {
        self.file = file;
        self
    }
}

/// The event sequence of an open connection.
///
/// `Err` items are events that could not be processed; the connection stays
/// usable after one.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<TransportEvent>> + Send>>;

/// An owned, open network resource.
///
/// Dropping the event stream releases the underlying HTTP response, so
/// [`Connection::close`] is a synchronous, fire-and-forget dispose.
pub struct Connection {
    kind: TransportKind,
    events: Option<EventStream>,
}

impl Connection {
    /// Wraps an event stream.
    pub fn new<S>(kind: TransportKind, events: S) -> Self
    where
        S: Stream<Item = Result<TransportEvent>> + Send + 'static,
    {
        Self {
            kind,
            events: Some(Box::pin(events)),
        }
    }

    /// The variant that opened this connection.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Waits for the next event.  A closed connection yields nothing.
    pub async fn next_event(&mut self) -> Option<Result<TransportEvent>> {
        match self.events.as_mut() {
            Some(events) => events.next().await,
            None => None,
        }
    }

    /// Releases the underlying resource.  Calling this twice is harmless.
    pub fn close(&mut self) {
        self.events = None;
    }

    /// Returns true once [`Connection::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.events.is_none()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The capability every transport variant implements.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> TransportKind;

    /// Opens the network resource for `request`.
    ///
    /// An error here means the connection was never established.
    async fn open(&self, request: &Request) -> Result<Connection>;
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[test]
    fn chat_classifies_its_vocabulary() {
        let kind = TransportKind::TokenStream;
        assert_eq!(
            kind.classify("token", "He".into()),
            Some(TransportEvent::Token("He".into()))
        );
        assert_eq!(
            kind.classify("complete", "Hello".into()),
            Some(TransportEvent::Final("Hello".into()))
        );
        assert_eq!(
            kind.classify("error", "boom".into()),
            Some(TransportEvent::Error("boom".into()))
        );
        assert_eq!(kind.classify("search_results", "x".into()), None);
        assert_eq!(kind.classify("ping", "".into()), None);
    }

    #[test]
    fn search_accepts_both_terminal_names() {
        let kind = TransportKind::SingleShot;
        assert_eq!(
            kind.classify("search_results", "found".into()),
            Some(TransportEvent::Final("found".into()))
        );
        assert_eq!(
            kind.classify("complete", "found".into()),
            Some(TransportEvent::Final("found".into()))
        );
        assert_eq!(
            kind.classify("token", "f".into()),
            Some(TransportEvent::Token("f".into()))
        );
    }

    #[test]
    fn event_stream_policy_prefers_partial_text() {
        let policy = TransportKind::TokenStream.policy();
        assert_eq!(policy.error_text(""), FALLBACK_ERROR_TEXT);
        assert_eq!(policy.error_text("partial"), "partial");
        assert_eq!(policy.failure_text("", "reset"), FALLBACK_ERROR_TEXT);
        assert_eq!(policy.stopped_text("partial"), None);
    }

    #[test]
    fn upload_policy_embeds_reason_and_marks_stops() {
        let policy = TransportKind::ChunkedUpload.policy();
        assert_eq!(policy.failure_text("", "HTTP 500"), "Error: HTTP 500");
        assert_eq!(
            policy.failure_text("AB", "reset"),
            "AB\n\n[Error: reset]"
        );
        assert_eq!(
            policy.stopped_text("AB").as_deref(),
            Some("AB [Response stopped]")
        );
        assert_eq!(
            policy.stopped_text("").as_deref(),
            Some("[Response stopped]")
        );
    }

    #[tokio::test]
    async fn closed_connection_yields_nothing() {
        let mut conn = Connection::new(
            TransportKind::TokenStream,
            stream::iter(vec![Ok(TransportEvent::Token("a".into()))]),
        );
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert!(conn.next_event().await.is_none());
    }

    #[test]
    fn request_builder() {
        let request = Request::new("hi", "default").with_conversation("7");
        assert_eq!(request.conversation_id.as_deref(), Some("7"));
        assert!(request.file.is_none());
    }
}
