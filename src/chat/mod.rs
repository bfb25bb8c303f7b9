//! Interactive chat application module.
//!
//! This module provides the pieces of the `streamchat` REPL that are not
//! tied to a terminal:
//!
//! - Streaming responses rendered as they arrive
//! - Chat, search, and file-upload requests
//! - Slash commands for conversations and export
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing and handling
//! - [`interrupt`]: Ctrl+C stops the in-flight request

mod commands;
mod config;
pub mod interrupt;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use interrupt::Interrupt;
