//! The conversation log.
//!
//! A [`MessageStore`] is an ordered list of [`Message`]s.  It exposes exactly
//! two mutation primitives, [`MessageStore::append`] and
//! [`MessageStore::replace_last_text`]; streaming sessions only ever use the
//! latter.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique message identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Allocates a fresh identifier.
    pub fn next() -> Self {
        Self(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The person typing.
    User,
    /// The backend assistant.
    Assistant,
}

impl Sender {
    /// Display label used by renderers and text export.
    pub fn label(self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Assistant => "Assistant",
        }
    }
}

/// A file attached to a user message for file-backed analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// File name as presented to the backend.
    pub name: String,
    /// MIME type sent with the multipart part.
    pub mime_type: String,
    /// File contents.
    #[serde(with = "crate::utils::bytes_base64")]
    pub raw_bytes: Vec<u8>,
}

impl FileRef {
    /// Creates a file reference from in-memory contents.
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        raw_bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            raw_bytes: raw_bytes.into(),
        }
    }

    /// Reads a file from disk, guessing its MIME type from the extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::validation(
                    format!("{} has no usable file name", path.display()),
                    Some("path".to_string()),
                )
            })?
            .to_string();
        let raw_bytes = fs::read(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        let mime_type = guess_mime_type(&name).to_string();
        Ok(Self {
            name,
            mime_type,
            raw_bytes,
        })
    }

    /// Size of the contents in bytes.
    pub fn len(&self) -> usize {
        self.raw_bytes.len()
    }

    /// Returns true if the file is empty.
    pub fn is_empty(&self) -> bool {
        self.raw_bytes.is_empty()
    }
}

fn guess_mime_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// One conversation turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Author of the message.
    pub sender: Sender,
    /// Message text; the only field a session ever rewrites.
    pub text: String,
    /// Creation time.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
    /// File sent along with a user message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<FileRef>,
}

impl Message {
    /// Creates a message with a fresh id and the current time.
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::next(),
            sender,
            text: text.into(),
            created_at: OffsetDateTime::now_utc(),
            attachment: None,
        }
    }

    /// Creates a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// Creates the empty assistant message a session will fill in.
    pub fn assistant_placeholder() -> Self {
        Self::new(Sender::Assistant, "")
    }

    /// Attaches a file to this message.
    pub fn with_attachment(mut self, attachment: Option<FileRef>) -> Self {
        self.attachment = attachment;
        self
    }
}

/// Ordered log of conversation turns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message to the end of the log and returns it.
    pub fn append(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Overwrites the text of the final message, leaving every other field
    /// alone.  Does nothing on an empty store.
    pub fn replace_last_text(&mut self, text: impl Into<String>) -> Option<&Message> {
        let last = self.messages.last_mut()?;
        last.text = text.into();
        Some(last)
    }

    /// Overwrites the text of the message with `id`, wherever it sits.
    pub fn replace_text(&mut self, id: MessageId, text: impl Into<String>) -> Option<&Message> {
        let message = self.messages.iter_mut().find(|m| m.id == id)?;
        message.text = text.into();
        Some(message)
    }

    /// The final message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Looks up a message by id.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Iterates messages in conversation order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// All messages in conversation order.
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_last_text_on_empty_store_is_noop() {
        let mut store = MessageStore::new();
        assert!(store.replace_last_text("ignored").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn replace_last_text_only_touches_final_text() {
        let mut store = MessageStore::new();
        store.append(Message::user("Hello"));
        let placeholder = store.append(Message::assistant_placeholder()).clone();

        store.replace_last_text("Hi there");

        assert_eq!(store.len(), 2);
        assert_eq!(store.as_slice()[0].text, "Hello");
        let last = store.last().unwrap();
        assert_eq!(last.text, "Hi there");
        assert_eq!(last.id, placeholder.id);
        assert_eq!(last.sender, Sender::Assistant);
        assert_eq!(last.created_at, placeholder.created_at);
    }

    #[test]
    fn replace_text_by_id_leaves_later_messages_alone() {
        let mut store = MessageStore::new();
        let earlier = store.append(Message::assistant_placeholder()).id;
        store.append(Message::user("next"));

        assert!(store.replace_text(earlier, "rewritten").is_some());
        assert_eq!(store.as_slice()[0].text, "rewritten");
        assert_eq!(store.last().unwrap().text, "next");

        let missing = Message::user("elsewhere").id;
        assert!(store.replace_text(missing, "ignored").is_none());
    }

    #[test]
    fn message_ids_are_unique() {
        let a = Message::user("a");
        let b = Message::user("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn mime_guess_by_extension() {
        assert_eq!(guess_mime_type("notes.TXT"), "text/plain");
        assert_eq!(guess_mime_type("report.pdf"), "application/pdf");
        assert_eq!(guess_mime_type("blob"), "application/octet-stream");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = FileRef::load("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn attachment_serializes_as_base64() {
        let message = Message::user("summarize")
            .with_attachment(Some(FileRef::new("a.txt", "text/plain", b"hi".to_vec())));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["attachment"]["raw_bytes"], "aGk=");
        assert_eq!(json["sender"], "user");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }
}
