//! Pending input, one draft per request mode.

use std::fmt;
use std::mem;
use std::str::FromStr;

use crate::error::Error;

/// Which kind of request the next submit makes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InputMode {
    /// Conversational chat.
    #[default]
    Chat,
    /// Web search.
    Search,
}

impl InputMode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            InputMode::Chat => InputMode::Search,
            InputMode::Search => InputMode::Chat,
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Chat => f.write_str("chat"),
            InputMode::Search => f.write_str("search"),
        }
    }
}

impl FromStr for InputMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(InputMode::Chat),
            "search" => Ok(InputMode::Search),
            other => Err(Error::validation(
                format!("unknown input mode {other:?} (expected chat or search)"),
                Some("mode".to_string()),
            )),
        }
    }
}

/// Holds the chat draft and the search draft side by side.
///
/// Only the draft of the active mode is visible.  Toggling never merges or
/// discards either draft.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputModeController {
    chat_text: String,
    search_text: String,
    active: InputMode,
}

impl InputModeController {
    /// Creates a controller in chat mode with both drafts empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// The active mode.
    pub fn mode(&self) -> InputMode {
        self.active
    }

    /// Switches to the other mode and returns it.
    pub fn toggle(&mut self) -> InputMode {
        self.active = self.active.toggled();
        self.active
    }

    /// Switches to `mode`; a no-op if it is already active.
    pub fn set_mode(&mut self, mode: InputMode) {
        self.active = mode;
    }

    /// The visible draft.
    pub fn current_value(&self) -> &str {
        match self.active {
            InputMode::Chat => &self.chat_text,
            InputMode::Search => &self.search_text,
        }
    }

    /// Replaces the visible draft.
    pub fn set_current_value(&mut self, value: impl Into<String>) {
        *self.current_mut() = value.into();
    }

    /// Empties the visible draft and returns what it held.
    pub fn take_current(&mut self) -> String {
        mem::take(self.current_mut())
    }

    /// Empties the draft of `mode`, visible or not.
    pub fn clear(&mut self, mode: InputMode) {
        match mode {
            InputMode::Chat => self.chat_text.clear(),
            InputMode::Search => self.search_text.clear(),
        }
    }

    fn current_mut(&mut self) -> &mut String {
        match self.active {
            InputMode::Chat => &mut self.chat_text,
            InputMode::Search => &mut self.search_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_chat_mode() {
        let input = InputModeController::new();
        assert_eq!(input.mode(), InputMode::Chat);
        assert_eq!(input.current_value(), "");
    }

    #[test]
    fn drafts_survive_toggles_without_merging() {
        let mut input = InputModeController::new();
        input.set_current_value("draft chat");
        assert_eq!(input.toggle(), InputMode::Search);
        assert_eq!(input.current_value(), "");
        input.set_current_value("rust async");
        input.set_current_value("rust async streams");
        assert_eq!(input.toggle(), InputMode::Chat);
        assert_eq!(input.current_value(), "draft chat");
        input.set_current_value("draft chat, edited");
        input.toggle();
        assert_eq!(input.current_value(), "rust async streams");
        input.toggle();
        assert_eq!(input.current_value(), "draft chat, edited");
    }

    #[test]
    fn double_toggle_restores_each_buffer() {
        let edits = [
            ("a", "b"),
            ("", "search only"),
            ("chat only", ""),
            ("same", "same"),
        ];
        for (chat, search) in edits {
            let mut input = InputModeController::new();
            input.set_current_value(chat);
            input.toggle();
            input.set_current_value(search);
            input.toggle();
            assert_eq!(input.current_value(), chat);
            input.toggle();
            assert_eq!(input.current_value(), search);
        }
    }

    #[test]
    fn take_current_only_empties_the_visible_draft() {
        let mut input = InputModeController::new();
        input.set_current_value("hello");
        input.set_mode(InputMode::Search);
        input.set_current_value("query");
        assert_eq!(input.take_current(), "query");
        assert_eq!(input.current_value(), "");
        input.set_mode(InputMode::Chat);
        assert_eq!(input.current_value(), "hello");
        input.clear(InputMode::Chat);
        assert_eq!(input.current_value(), "");
    }

    #[test]
    fn parse_mode() {
        assert_eq!("chat".parse::<InputMode>().unwrap(), InputMode::Chat);
        assert_eq!(" Search ".parse::<InputMode>().unwrap(), InputMode::Search);
        assert!("upload".parse::<InputMode>().unwrap_err().is_validation());
        assert_eq!(InputMode::Search.to_string(), "search");
    }
}
