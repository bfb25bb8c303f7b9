//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the REPL without sending a request to the
//! backend.

use crate::conversation::ConversationId;
use crate::export::ExportFormat;
use crate::input::InputMode;

/// A parsed chat command.
///
/// These commands control the chat application and are not sent to the
/// backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Toggle between chat and search mode.
    ToggleSearch,

    /// Show or set the input mode.
    /// `None` shows the current mode.
    Mode(Option<InputMode>),

    /// Upload a file, optionally with a message about it.
    Upload {
        /// Path of the file to send.
        path: String,
        /// Message sent along with the file.
        message: Option<String>,
    },

    /// Start a new conversation, optionally titled.
    New(Option<String>),

    /// List conversations.
    List,

    /// Switch to another conversation.
    Switch(ConversationId),

    /// Rename the active conversation.
    Rename(String),

    /// Delete a conversation.
    Delete(ConversationId),

    /// Export the active conversation to a file.
    Export {
        /// Output format.
        format: ExportFormat,
        /// Destination path.
        path: String,
    },

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use streamchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/upload notes.txt summarize").is_some());
/// assert!(parse_command("What's new in Rust?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "search" => ChatCommand::ToggleSearch,
        "mode" => match argument {
            Some(arg) => match arg.parse::<InputMode>() {
                Ok(mode) => ChatCommand::Mode(Some(mode)),
                Err(_) => ChatCommand::Invalid("/mode expects 'chat' or 'search'".to_string()),
            },
            None => ChatCommand::Mode(None),
        },
        "upload" => parse_upload_command(argument),
        "new" => ChatCommand::New(argument.map(|s| s.to_string())),
        "list" | "ls" => ChatCommand::List,
        "switch" => parse_id_command(argument, ChatCommand::Switch, "/switch"),
        "rename" => match argument {
            Some(title) => ChatCommand::Rename(title.to_string()),
            None => ChatCommand::Invalid("/rename requires a title".to_string()),
        },
        "delete" => parse_id_command(argument, ChatCommand::Delete, "/delete"),
        "export" => parse_export_command(argument),
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_upload_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/upload requires a file path".to_string());
    };
    let mut parts = arg.splitn(2, ' ');
    let path = parts.next().unwrap_or_default().to_string();
    let message = parts
        .next()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    ChatCommand::Upload { path, message }
}

fn parse_export_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/export requires a format and a file path".to_string());
    };
    let mut parts = arg.splitn(2, ' ');
    let format = match parts.next().unwrap_or_default().parse::<ExportFormat>() {
        Ok(format) => format,
        Err(_) => return ChatCommand::Invalid("/export expects 'json' or 'txt'".to_string()),
    };
    match parts.next().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(path) => ChatCommand::Export {
            format,
            path: path.to_string(),
        },
        None => ChatCommand::Invalid("/export requires a file path".to_string()),
    }
}

fn parse_id_command<F>(argument: Option<&str>, constructor: F, name: &str) -> ChatCommand
where
    F: Fn(ConversationId) -> ChatCommand,
{
    match argument {
        Some(arg) => match arg.parse::<ConversationId>() {
            Ok(id) => constructor(id),
            Err(_) => ChatCommand::Invalid(format!("{} expects a conversation id", name)),
        },
        None => ChatCommand::Invalid(format!("{} requires a conversation id", name)),
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /search                Toggle between chat and search mode
  /mode [chat|search]    Show or set the input mode
  /upload <file> [msg]   Send a file with an optional message
  /new [title]           Start a new conversation
  /list                  List conversations
  /switch <id>           Switch to another conversation
  /rename <title>        Rename the current conversation
  /delete <id>           Delete a conversation
  /export json|txt <f>   Export the current conversation
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl+C while a response is streaming to stop it."#
}
