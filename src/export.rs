//! Stateless conversation export.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use serde_json::to_writer_pretty;
use time::OffsetDateTime;

use crate::conversation::Conversation;
use crate::error::{Error, Result};
use crate::utils::time::to_rfc3339;

const EXPORT_VERSION: u8 = 1;

/// Output format for [`export_conversation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// Versioned JSON; attachment bytes are base64.
    Json,
    /// Human-readable transcript.
    Text,
}

impl ExportFormat {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Text),
            other => Err(Error::validation(
                format!("unknown export format {other:?} (expected json or txt)"),
                Some("format".to_string()),
            )),
        }
    }
}

#[derive(Serialize)]
struct ExportFile<'a> {
    version: u8,
    #[serde(with = "crate::utils::time")]
    exported_at: OffsetDateTime,
    conversation: &'a Conversation,
}

impl<'a> ExportFile<'a> {
    fn new(conversation: &'a Conversation) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at: OffsetDateTime::now_utc(),
            conversation,
        }
    }
}

/// Renders `conversation` in `format`.
pub fn export_conversation(conversation: &Conversation, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(&ExportFile::new(conversation))
            .map_err(|err| {
                Error::serialization("failed to serialize conversation", Some(Box::new(err)))
            }),
        ExportFormat::Text => Ok(render_text(conversation)),
    }
}

/// Writes `conversation` in `format` to `path`.
pub fn save_conversation_to<P: AsRef<Path>>(
    conversation: &Conversation,
    format: ExportFormat,
    path: P,
) -> Result<()> {
    let file = File::create(path.as_ref())
        .map_err(|err| Error::io("failed to create export file", err))?;
    let mut writer = BufWriter::new(file);
    match format {
        ExportFormat::Json => {
            to_writer_pretty(&mut writer, &ExportFile::new(conversation)).map_err(|err| {
                Error::serialization("failed to serialize conversation", Some(Box::new(err)))
            })?;
        }
        ExportFormat::Text => {
            writer
                .write_all(render_text(conversation).as_bytes())
                .map_err(|err| Error::io("failed to write export file", err))?;
        }
    }
    writer
        .flush()
        .map_err(|err| Error::io("failed to write export file", err))
}

fn render_text(conversation: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", conversation.title);
    let _ = writeln!(out, "Exported: {}", to_rfc3339(&OffsetDateTime::now_utc()));
    for message in conversation.messages.iter() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "[{}] {}:",
            to_rfc3339(&message.created_at),
            message.sender.label()
        );
        if let Some(file) = &message.attachment {
            let _ = writeln!(
                out,
                "(attached {} ({}, {} bytes))",
                file.name,
                file.mime_type,
                file.len()
            );
        }
        let _ = writeln!(out, "{}", message.text);
    }
    out
}
