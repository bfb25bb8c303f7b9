//! Output rendering for the conversation log.
//!
//! This module provides the [`Renderer`] trait the orchestrator reports to and
//! a plain-text implementation for terminals.

use std::io::{self, Write};

use crate::session::Outcome;
use crate::store::{Message, MessageId, Sender};
use crate::transport::TransportKind;

/// ANSI escape code for dim text (used for informational lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for sender labels).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for revisions and stops).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering conversation output.
///
/// The orchestrator calls these hooks after every mutation it makes, so a
/// renderer only ever observes state that is already in the message store.
pub trait Renderer: Send {
    /// A message was added to the end of the log.
    fn message_appended(&mut self, message: &Message);

    /// The text of the final message may have changed.
    ///
    /// This is called once per applied event, so implementations should
    /// expect repeated calls with unchanged text.
    fn text_updated(&mut self, message: &Message);

    /// A session ended.
    fn session_finished(&mut self, kind: TransportKind, outcome: Outcome) {
        _ = kind;
        _ = outcome;
    }

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);
}

/// Plain text renderer with optional ANSI styling.
///
/// Streamed text is printed as it grows.  When a final payload rewrites the
/// message instead of extending it, the whole message is printed again under
/// a `[revised]` marker.
pub struct PlainTextRenderer {
    out: Box<dyn Write + Send>,
    use_color: bool,
    live: Option<MessageId>,
    printed: String,
    line_start: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(Box::new(io::stdout()), use_color)
    }

    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: Box<dyn Write + Send>, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            live: None,
            printed: String::new(),
            line_start: true,
        }
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.line_start = text.ends_with('\n');
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn end_line(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }

    fn print_label(&mut self, sender: Sender) {
        self.end_line();
        let label = self.styled(ANSI_CYAN, &format!("{}:", sender.label()));
        self.write(&format!("{label}\n"));
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn message_appended(&mut self, message: &Message) {
        match message.sender {
            // The user already sees what they typed; only note attachments.
            Sender::User => {
                if let Some(file) = &message.attachment {
                    let note = format!("[attached {} ({} bytes)]\n", file.name, file.len());
                    let note = self.styled(ANSI_DIM, &note);
                    self.end_line();
                    self.write(&note);
                }
            }
            Sender::Assistant => {
                self.print_label(Sender::Assistant);
                self.live = Some(message.id);
                self.printed.clear();
                let text = message.text.clone();
                self.write(&text);
                self.printed = text;
            }
        }
    }

    fn text_updated(&mut self, message: &Message) {
        if self.live != Some(message.id) || message.text == self.printed {
            return;
        }
        match message.text.strip_prefix(self.printed.as_str()) {
            Some(suffix) => {
                let suffix = suffix.to_string();
                self.write(&suffix);
            }
            None => {
                self.end_line();
                let marker = self.styled(ANSI_YELLOW, "[revised]");
                self.write(&format!("{marker}\n"));
                let text = message.text.clone();
                self.write(&text);
            }
        }
        self.printed = message.text.clone();
    }

    fn session_finished(&mut self, kind: TransportKind, outcome: Outcome) {
        if outcome == Outcome::Cancelled && kind.policy().stop_marker.is_none() {
            self.end_line();
            let note = self.styled(ANSI_YELLOW, "[stopped]");
            self.write(&format!("{note}\n"));
        }
        self.end_line();
        self.live = None;
        self.printed.clear();
    }

    fn print_error(&mut self, error: &str) {
        self.end_line();
        let line = self.styled(ANSI_RED, &format!("Error: {error}"));
        self.write(&format!("{line}\n"));
    }

    fn print_info(&mut self, info: &str) {
        self.end_line();
        let line = self.styled(ANSI_DIM, info);
        self.write(&format!("{line}\n"));
    }
}
