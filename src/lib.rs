// Public modules
pub mod chat;
pub mod client;
pub mod conversation;
pub mod error;
pub mod export;
pub mod input;
pub mod observability;
pub mod orchestrator;
pub mod render;
pub mod session;
pub mod session_logger;
pub mod sse;
pub mod store;
pub mod transport;
pub mod utils;

// Re-exports
pub use client::Backend;
pub use conversation::{Conversation, ConversationId, ConversationList};
pub use error::{Error, Result};
pub use export::{ExportFormat, export_conversation, save_conversation_to};
pub use input::{InputMode, InputModeController};
pub use observability::register_biometrics;
pub use orchestrator::{SessionOrchestrator, Transports};
pub use render::{PlainTextRenderer, Renderer};
pub use session::{Effect, Outcome, SessionState, Status, Step, StreamSession, cancel, reduce};
pub use session_logger::{SessionLogger, StderrLogger};
pub use store::{FileRef, Message, MessageId, MessageStore, Sender};
pub use transport::{
    ChatTransport, Connection, Request, ScriptedTransport, SearchTransport, Transport,
    TransportEvent, TransportKind, UploadTransport,
};
