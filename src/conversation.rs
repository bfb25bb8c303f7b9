//! In-memory conversation list.
//!
//! Each [`Conversation`] owns its own [`MessageStore`].  Exactly one
//! conversation is active whenever the list is non-empty, and the list never
//! stays empty after a delete.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::store::MessageStore;

static NEXT_CONVERSATION_ID: AtomicU64 = AtomicU64::new(1);

/// Title given to a conversation before its first message.
pub const DEFAULT_TITLE: &str = "New Conversation";

const TITLE_MAX_CHARS: usize = 30;

/// Process-unique conversation identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(u64);

impl ConversationId {
    fn next() -> Self {
        Self(NEXT_CONVERSATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim().parse::<u64>().map(ConversationId).map_err(|_| {
            Error::validation(
                format!("{s:?} is not a conversation id"),
                Some("id".to_string()),
            )
        })
    }
}

/// One conversation thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Identifier, also sent to the backend as `conversationId`.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Whether this is the conversation new messages go to.
    pub active: bool,
    /// Time of the last change.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,
    /// The conversation's messages.
    pub messages: MessageStore,
}

impl Conversation {
    fn new(title: impl Into<String>) -> Self {
        Self {
            id: ConversationId::next(),
            title: title.into(),
            active: false,
            timestamp: OffsetDateTime::now_utc(),
            messages: MessageStore::new(),
        }
    }

    /// Marks the conversation as changed now.
    pub fn touch(&mut self) {
        self.timestamp = OffsetDateTime::now_utc();
    }

    /// Replaces the default title with one derived from `first_message`.
    ///
    /// Titles that were set explicitly are left alone.
    pub fn title_from(&mut self, first_message: &str) {
        if self.title == DEFAULT_TITLE {
            if let Some(title) = derive_title(first_message) {
                self.title = title;
            }
        }
    }
}

fn derive_title(text: &str) -> Option<String> {
    let text = text.trim();
    let first_line = text.lines().next()?.trim();
    if first_line.is_empty() {
        return None;
    }
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        Some(first_line.to_string())
    } else {
        let truncated: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
        Some(format!("{}...", truncated.trim_end()))
    }
}

/// The ordered set of conversations.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationList {
    conversations: Vec<Conversation>,
}

impl ConversationList {
    /// Creates a list holding one active, empty conversation.
    pub fn new() -> Self {
        let mut list = Self {
            conversations: Vec::new(),
        };
        list.create(None);
        list
    }

    /// Adds a conversation, makes it active, and returns its id.
    pub fn create(&mut self, title: Option<&str>) -> ConversationId {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        let conversation = Conversation::new(title);
        let id = conversation.id;
        self.conversations.push(conversation);
        self.activate(id);
        id
    }

    /// Makes `id` the active conversation.
    pub fn select(&mut self, id: ConversationId) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::not_found(format!("conversation {id}")));
        }
        self.activate(id);
        Ok(())
    }

    /// Renames the conversation `id`.
    pub fn rename(&mut self, id: ConversationId, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::validation(
                "conversation title cannot be empty",
                Some("title".to_string()),
            ));
        }
        let conversation = self
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("conversation {id}")))?;
        conversation.title = title.to_string();
        conversation.touch();
        Ok(())
    }

    /// Removes the conversation `id`.
    ///
    /// Deleting the active conversation activates the most recently changed
    /// remaining one, or a fresh conversation if none remain.
    pub fn delete(&mut self, id: ConversationId) -> Result<Conversation> {
        let index = self
            .conversations
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::not_found(format!("conversation {id}")))?;
        let removed = self.conversations.remove(index);
        if removed.active {
            let next = self
                .conversations
                .iter()
                .max_by_key(|c| c.timestamp)
                .map(|c| c.id);
            match next {
                Some(next) => self.activate(next),
                None => {
                    self.create(None);
                }
            }
        }
        Ok(removed)
    }

    /// The active conversation.
    pub fn active(&self) -> &Conversation {
        // `new` and `delete` keep one conversation active at all times.
        match self.conversations.iter().position(|c| c.active) {
            Some(index) => &self.conversations[index],
            None => &self.conversations[self.conversations.len() - 1],
        }
    }

    /// The active conversation, mutably.
    pub fn active_mut(&mut self) -> &mut Conversation {
        let index = self
            .conversations
            .iter()
            .position(|c| c.active)
            .unwrap_or(self.conversations.len() - 1);
        &mut self.conversations[index]
    }

    /// Looks up a conversation.
    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// Iterates conversations in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.iter()
    }

    /// Number of conversations; never zero.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Always false; present for symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    fn activate(&mut self, id: ConversationId) {
        for conversation in &mut self.conversations {
            conversation.active = conversation.id == id;
        }
    }
}

impl Default for ConversationList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Message;

    fn active_count(list: &ConversationList) -> usize {
        list.iter().filter(|c| c.active).count()
    }

    #[test]
    fn new_list_has_one_active_conversation() {
        let list = ConversationList::new();
        assert_eq!(list.len(), 1);
        assert_eq!(active_count(&list), 1);
        assert_eq!(list.active().title, DEFAULT_TITLE);
        assert!(list.active().messages.is_empty());
    }

    #[test]
    fn create_and_select_move_the_active_flag() {
        let mut list = ConversationList::new();
        let first = list.active().id;
        let second = list.create(Some("Research"));
        assert_eq!(list.active().id, second);
        assert_eq!(list.active().title, "Research");
        assert_eq!(active_count(&list), 1);

        list.select(first).unwrap();
        assert_eq!(list.active().id, first);
        assert_eq!(active_count(&list), 1);
    }

    #[test]
    fn select_unknown_is_not_found() {
        let mut list = ConversationList::new();
        let err = list.select("999999".parse().unwrap()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn conversations_keep_separate_messages() {
        let mut list = ConversationList::new();
        let first = list.active().id;
        list.active_mut().messages.append(Message::user("one"));
        list.create(None);
        assert!(list.active().messages.is_empty());
        assert_eq!(list.get(first).unwrap().messages.len(), 1);
    }

    #[test]
    fn delete_active_falls_back_then_recreates() {
        let mut list = ConversationList::new();
        let first = list.active().id;
        let second = list.create(None);

        list.delete(second).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.active().id, first);

        list.delete(first).unwrap();
        assert_eq!(list.len(), 1);
        assert_ne!(list.active().id, first);
        assert_eq!(active_count(&list), 1);
    }

    #[test]
    fn delete_inactive_keeps_active() {
        let mut list = ConversationList::new();
        let first = list.active().id;
        let second = list.create(None);
        list.delete(first).unwrap();
        assert_eq!(list.active().id, second);
    }

    #[test]
    fn rename_rejects_blank_titles() {
        let mut list = ConversationList::new();
        let id = list.active().id;
        list.rename(id, "  Trip planning ").unwrap();
        assert_eq!(list.active().title, "Trip planning");
        assert!(list.rename(id, "   ").unwrap_err().is_validation());
    }

    #[test]
    fn title_derivation_truncates_and_respects_explicit_titles() {
        let mut list = ConversationList::new();
        list.active_mut().title_from("What is the capital of France?");
        assert_eq!(list.active().title, "What is the capital of France?");
        list.active_mut().title_from("something else");
        assert_eq!(list.active().title, "What is the capital of France?");

        let mut list = ConversationList::new();
        list.active_mut()
            .title_from("Explain how the borrow checker reasons about lifetimes");
        assert_eq!(list.active().title, "Explain how the borrow checker...");

        let mut list = ConversationList::new();
        list.active_mut().title_from("   ");
        assert_eq!(list.active().title, DEFAULT_TITLE);
    }

    #[test]
    fn parse_id() {
        assert!("abc".parse::<ConversationId>().unwrap_err().is_validation());
        let list = ConversationList::new();
        let id = list.active().id;
        assert_eq!(id.to_string().parse::<ConversationId>().unwrap(), id);
    }
}
