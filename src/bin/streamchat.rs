//! Interactive client for a streaming assistant backend.
//!
//! This binary provides a REPL that sends chat messages, web searches, and
//! file uploads to the backend and prints each answer as it streams in.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a backend on localhost:8080
//! streamchat
//!
//! # Point at another backend and identify as a specific user
//! streamchat --base-url http://assistant.internal:9000 --user-id alice
//!
//! # Disable colors and log session events to stderr
//! streamchat --no-color --verbose
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/search` - Toggle between chat and search mode
//! - `/upload <file> [message]` - Send a file for analysis
//! - `/new`, `/list`, `/switch <id>` - Manage conversations
//! - `/quit` - Exit the application
//!
//! Ctrl+C while a response is streaming stops it.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use streamchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, Interrupt, PlainTextRenderer, help_text, interrupt,
    parse_command,
};
use streamchat::{FileRef, InputMode, SessionOrchestrator, StderrLogger, Transports};

/// Main entry point for the streamchat application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("streamchat [OPTIONS]");
    let config = ChatConfig::from(args);

    let backend = config.backend()?;
    let mut orchestrator =
        SessionOrchestrator::new(Transports::http(backend), config.user_id.clone())
            .with_renderer(Box::new(PlainTextRenderer::with_color(config.use_color)));
    if config.verbose {
        orchestrator = orchestrator.with_logger(Arc::new(StderrLogger));
    }
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C during streaming stops the session rather than the process.
    let stop = Arc::new(Interrupt::new());
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.trigger())?;
    }

    println!("streamchat ({}, user: {})", config.base_url, config.user_id);
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let prompt = match orchestrator.input().mode() {
            InputMode::Chat => "You: ",
            InputMode::Search => "Search: ",
        };
        let readline = rl.readline(prompt);

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::ToggleSearch => {
                            let mode = orchestrator.toggle_mode();
                            info(&mut orchestrator, &format!("Switched to {mode} mode."));
                        }
                        ChatCommand::Mode(None) => {
                            let mode = orchestrator.input().mode();
                            info(&mut orchestrator, &format!("Current mode: {mode}"));
                        }
                        ChatCommand::Mode(Some(mode)) => {
                            orchestrator.input_mut().set_mode(mode);
                            info(&mut orchestrator, &format!("Switched to {mode} mode."));
                        }
                        ChatCommand::Upload { path, message } => match FileRef::load(&path) {
                            Ok(file) => {
                                let message = message.unwrap_or_default();
                                interrupt::upload(&mut orchestrator, file, &message, &stop).await;
                            }
                            Err(err) => error(&mut orchestrator, &err.to_string()),
                        },
                        ChatCommand::New(title) => {
                            let id = orchestrator.new_conversation(title.as_deref());
                            info(&mut orchestrator, &format!("Started conversation {id}."));
                        }
                        ChatCommand::List => {
                            print_conversations(&orchestrator);
                        }
                        ChatCommand::Switch(id) => match orchestrator.select_conversation(id) {
                            Ok(()) => {
                                let conversation = orchestrator.conversations().active();
                                let message = format!(
                                    "Switched to {}: {} ({} messages)",
                                    conversation.id,
                                    conversation.title,
                                    conversation.messages.len()
                                );
                                info(&mut orchestrator, &message);
                            }
                            Err(err) => error(&mut orchestrator, &err.to_string()),
                        },
                        ChatCommand::Rename(title) => {
                            let id = orchestrator.conversations().active().id;
                            match orchestrator.rename_conversation(id, &title) {
                                Ok(()) => info(&mut orchestrator, "Conversation renamed."),
                                Err(err) => error(&mut orchestrator, &err.to_string()),
                            }
                        }
                        ChatCommand::Delete(id) => match orchestrator.delete_conversation(id) {
                            Ok(removed) => {
                                let message = format!("Deleted conversation {}.", removed.id);
                                info(&mut orchestrator, &message);
                            }
                            Err(err) => error(&mut orchestrator, &err.to_string()),
                        },
                        ChatCommand::Export { format, path } => {
                            match orchestrator.save_active(format, &path) {
                                Ok(()) => {
                                    info(&mut orchestrator, &format!("Conversation saved to {path}"))
                                }
                                Err(err) => error(
                                    &mut orchestrator,
                                    &format!("Failed to export conversation: {err}"),
                                ),
                            }
                        }
                        ChatCommand::Invalid(message) => {
                            error(&mut orchestrator, &message);
                        }
                    }
                    continue;
                }

                orchestrator.input_mut().set_current_value(line);
                interrupt::submit(&mut orchestrator, &stop).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                error(&mut orchestrator, &format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn print_conversations(orchestrator: &SessionOrchestrator) {
    println!("    Conversations:");
    for conversation in orchestrator.conversations().iter() {
        let marker = if conversation.active { "*" } else { " " };
        println!(
            "    {} {:>4}  {} ({} messages)",
            marker,
            conversation.id,
            conversation.title,
            conversation.messages.len()
        );
    }
}

fn info(orchestrator: &mut SessionOrchestrator, message: &str) {
    if let Some(renderer) = orchestrator.renderer_mut() {
        renderer.print_info(message);
    }
}

fn error(orchestrator: &mut SessionOrchestrator, message: &str) {
    if let Some(renderer) = orchestrator.renderer_mut() {
        renderer.print_error(message);
    }
}
