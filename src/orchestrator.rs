//! Glue between input, transports, the session, and the conversation log.

use std::path::Path;
use std::sync::Arc;

use crate::client::Backend;
use crate::conversation::{Conversation, ConversationId, ConversationList};
use crate::error::{Error, Result};
use crate::export::{ExportFormat, export_conversation, save_conversation_to};
use crate::input::{InputMode, InputModeController};
use crate::render::Renderer;
use crate::session::{Outcome, Step, StreamSession};
use crate::session_logger::SessionLogger;
use crate::store::{FileRef, Message, MessageStore};
use crate::transport::{ChatTransport, Request, SearchTransport, Transport, UploadTransport};

/// One transport per request mode.
pub struct Transports {
    chat: Box<dyn Transport>,
    search: Box<dyn Transport>,
    upload: Box<dyn Transport>,
}

impl Transports {
    /// Builds the three transports from explicit implementations.
    pub fn new(
        chat: Box<dyn Transport>,
        search: Box<dyn Transport>,
        upload: Box<dyn Transport>,
    ) -> Self {
        Self {
            chat,
            search,
            upload,
        }
    }

    /// The HTTP transports, all talking to `backend`.
    pub fn http(backend: Backend) -> Self {
        Self::new(
            Box::new(ChatTransport::new(backend.clone())),
            Box::new(SearchTransport::new(backend.clone())),
            Box::new(UploadTransport::new(backend)),
        )
    }

    /// An attached file always goes to the upload transport.
    pub fn select(&self, mode: InputMode, has_file: bool) -> &dyn Transport {
        if has_file {
            return self.upload.as_ref();
        }
        match mode {
            InputMode::Chat => self.chat.as_ref(),
            InputMode::Search => self.search.as_ref(),
        }
    }
}

/// Turns submits into sessions.
///
/// The orchestrator owns the single [`StreamSession`].  Every operation that
/// would start a session or change which conversation is visible stops the
/// in-flight one first, so two sessions never write to the log at once.
pub struct SessionOrchestrator {
    transports: Transports,
    user_id: String,
    session: StreamSession,
    input: InputModeController,
    conversations: ConversationList,
    pending_file: Option<FileRef>,
    renderer: Option<Box<dyn Renderer>>,
}

impl SessionOrchestrator {
    /// Creates an orchestrator with one empty conversation in chat mode.
    pub fn new(transports: Transports, user_id: impl Into<String>) -> Self {
        Self {
            transports,
            user_id: user_id.into(),
            session: StreamSession::new(),
            input: InputModeController::new(),
            conversations: ConversationList::new(),
            pending_file: None,
            renderer: None,
        }
    }

    /// Attaches a session logger.
    pub fn with_logger(mut self, logger: Arc<dyn SessionLogger>) -> Self {
        self.session = StreamSession::new().with_logger(logger);
        self
    }

    /// Attaches a renderer.
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// The attached renderer.
    pub fn renderer_mut(&mut self) -> Option<&mut (dyn Renderer + 'static)> {
        self.renderer.as_deref_mut()
    }

    /// The user id sent with every request.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Pending input.
    pub fn input(&self) -> &InputModeController {
        &self.input
    }

    /// Pending input, mutably.
    pub fn input_mut(&mut self) -> &mut InputModeController {
        &mut self.input
    }

    /// Switches between chat and search drafts.
    pub fn toggle_mode(&mut self) -> InputMode {
        self.input.toggle()
    }

    /// Makes the next submit a file upload.
    pub fn attach_file(&mut self, file: FileRef) {
        self.pending_file = Some(file);
    }

    /// The file the next submit will upload.
    pub fn pending_file(&self) -> Option<&FileRef> {
        self.pending_file.as_ref()
    }

    /// Drops the pending file.
    pub fn detach_file(&mut self) -> Option<FileRef> {
        self.pending_file.take()
    }

    /// The session.
    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Returns true while a response is streaming.
    pub fn is_streaming(&self) -> bool {
        self.session.is_active()
    }

    /// Messages of the active conversation.
    pub fn messages(&self) -> &MessageStore {
        &self.conversations.active().messages
    }

    /// All conversations.
    pub fn conversations(&self) -> &ConversationList {
        &self.conversations
    }

    /// Sends the visible draft, or the pending file, as a new request.
    ///
    /// Does nothing if there is neither text nor a file.  The draft is
    /// cleared before the connection opens, so it is gone even if the open
    /// fails.  A search submit returns the input to chat mode.
    pub async fn submit(&mut self) -> Step {
        let text = self.input.current_value().trim().to_string();
        if text.is_empty() && self.pending_file.is_none() {
            return Step::Idle;
        }
        self.stop();

        let mode = self.input.mode();
        let file = self.pending_file.take();
        self.input.take_current();
        if mode == InputMode::Search {
            self.input.set_mode(InputMode::Chat);
        }
        self.send(mode, text, file).await
    }

    /// Uploads `file` with `message`, leaving both drafts and the mode as
    /// they are.
    pub async fn upload(&mut self, file: FileRef, message: &str) -> Step {
        self.stop();
        let mode = self.input.mode();
        self.send(mode, message.trim().to_string(), Some(file)).await
    }

    async fn send(&mut self, mode: InputMode, text: String, file: Option<FileRef>) -> Step {
        let conversation = self.conversations.active_mut();
        match &file {
            Some(file) if text.is_empty() => conversation.title_from(&file.name),
            _ => conversation.title_from(&text),
        }
        conversation.touch();
        let request = Request::new(text.clone(), self.user_id.clone())
            .with_conversation(conversation.id.to_string())
            .with_file(file.clone());

        let user = conversation
            .messages
            .append(Message::user(text).with_attachment(file))
            .clone();
        let assistant = conversation
            .messages
            .append(Message::assistant_placeholder())
            .clone();
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.message_appended(&user);
            renderer.message_appended(&assistant);
        }

        let transport = self.transports.select(mode, request.file.is_some());
        let conversation = self.conversations.active_mut();
        let step = self
            .session
            .start(transport, &request, &mut conversation.messages)
            .await;
        self.report(step)
    }

    /// Waits for and applies the next event of the in-flight session.
    pub async fn pump(&mut self) -> Step {
        let conversation = self.conversations.active_mut();
        let step = self.session.next(&mut conversation.messages).await;
        self.report(step)
    }

    /// Pumps until the in-flight session finishes.
    pub async fn run_until_finished(&mut self) -> Option<Outcome> {
        loop {
            match self.pump().await {
                Step::Streaming => continue,
                Step::Finished(outcome) => return Some(outcome),
                Step::Idle => return None,
            }
        }
    }

    /// Stops the in-flight session, if any.
    pub fn stop(&mut self) -> Option<Outcome> {
        let conversation = self.conversations.active_mut();
        let outcome = self.session.stop(&mut conversation.messages)?;
        self.report(Step::Finished(outcome));
        Some(outcome)
    }

    /// Creates a conversation and makes it active.
    pub fn new_conversation(&mut self, title: Option<&str>) -> ConversationId {
        self.stop();
        self.conversations.create(title)
    }

    /// Makes `id` the active conversation.
    pub fn select_conversation(&mut self, id: ConversationId) -> Result<()> {
        if self.conversations.active().id != id {
            self.conversations
                .get(id)
                .ok_or_else(|| Error::not_found(format!("conversation {id}")))?;
            self.stop();
        }
        self.conversations.select(id)
    }

    /// Renames the conversation `id`.
    pub fn rename_conversation(&mut self, id: ConversationId, title: &str) -> Result<()> {
        self.conversations.rename(id, title)
    }

    /// Deletes the conversation `id`.
    pub fn delete_conversation(&mut self, id: ConversationId) -> Result<Conversation> {
        self.conversations
            .get(id)
            .ok_or_else(|| Error::not_found(format!("conversation {id}")))?;
        self.stop();
        self.conversations.delete(id)
    }

    /// Renders the active conversation.
    pub fn export_active(&self, format: ExportFormat) -> Result<String> {
        export_conversation(self.conversations.active(), format)
    }

    /// Writes the active conversation to `path`.
    pub fn save_active<P: AsRef<Path>>(&self, format: ExportFormat, path: P) -> Result<()> {
        save_conversation_to(self.conversations.active(), format, path)
    }

    fn report(&mut self, step: Step) -> Step {
        if step == Step::Idle {
            return step;
        }
        let conversation = self.conversations.active_mut();
        if matches!(step, Step::Finished(_)) {
            conversation.touch();
        }
        if let Some(renderer) = self.renderer.as_mut() {
            if let Some(last) = conversation.messages.last() {
                renderer.text_updated(last);
            }
            if let Step::Finished(outcome) = step {
                renderer.session_finished(self.session.kind(), outcome);
            }
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Sender;
    use crate::transport::{FALLBACK_ERROR_TEXT, ScriptedTransport, TransportEvent, TransportKind};

    fn token(text: &str) -> TransportEvent {
        TransportEvent::Token(text.to_string())
    }

    fn scripted(
        chat: ScriptedTransport,
        search: ScriptedTransport,
        upload: ScriptedTransport,
    ) -> SessionOrchestrator {
        SessionOrchestrator::new(
            Transports::new(Box::new(chat), Box::new(search), Box::new(upload)),
            "default",
        )
    }

    fn idle(kind: TransportKind) -> ScriptedTransport {
        ScriptedTransport::script(kind, Vec::new())
    }

    fn texts(orchestrator: &SessionOrchestrator) -> Vec<(Sender, String)> {
        orchestrator
            .messages()
            .iter()
            .map(|m| (m.sender, m.text.clone()))
            .collect()
    }

    #[tokio::test]
    async fn empty_submit_does_nothing() {
        let mut orchestrator = scripted(
            idle(TransportKind::TokenStream),
            idle(TransportKind::SingleShot),
            idle(TransportKind::ChunkedUpload),
        );
        orchestrator.input_mut().set_current_value("   ");
        assert_eq!(orchestrator.submit().await, Step::Idle);
        assert!(orchestrator.messages().is_empty());
    }

    #[tokio::test]
    async fn chat_submit_streams_into_a_new_assistant_message() {
        let mut orchestrator = scripted(
            ScriptedTransport::script(
                TransportKind::TokenStream,
                vec![
                    token("He"),
                    token("llo"),
                    token("!"),
                    TransportEvent::Final("Hello! How can I help?".into()),
                ],
            ),
            idle(TransportKind::SingleShot),
            idle(TransportKind::ChunkedUpload),
        );
        orchestrator.input_mut().set_current_value("Hello");
        assert_eq!(orchestrator.submit().await, Step::Streaming);
        assert_eq!(
            texts(&orchestrator),
            vec![
                (Sender::User, "Hello".to_string()),
                (Sender::Assistant, String::new())
            ]
        );
        assert_eq!(orchestrator.input().current_value(), "");

        assert_eq!(
            orchestrator.run_until_finished().await,
            Some(Outcome::Completed)
        );
        assert_eq!(
            orchestrator.messages().last().unwrap().text,
            "Hello! How can I help?"
        );
        assert_eq!(orchestrator.conversations().active().title, "Hello");
    }

    #[tokio::test]
    async fn search_failure_still_clears_the_draft() {
        let search = ScriptedTransport::failing(
            TransportKind::SingleShot,
            Error::connection("connection refused", None),
        );
        let mut orchestrator = scripted(
            idle(TransportKind::TokenStream),
            search,
            idle(TransportKind::ChunkedUpload),
        );
        orchestrator.input_mut().set_current_value("chat draft");
        orchestrator.toggle_mode();
        orchestrator.input_mut().set_current_value("rust news");

        let step = orchestrator.submit().await;
        assert_eq!(step, Step::Finished(Outcome::Errored));
        assert_eq!(
            orchestrator.messages().last().unwrap().text,
            FALLBACK_ERROR_TEXT
        );
        assert_eq!(orchestrator.input().mode(), InputMode::Chat);
        assert_eq!(orchestrator.input().current_value(), "chat draft");
        orchestrator.toggle_mode();
        assert_eq!(orchestrator.input().current_value(), "");
    }

    #[tokio::test]
    async fn attached_file_uses_upload_transport() {
        let upload = ScriptedTransport::script(
            TransportKind::ChunkedUpload,
            vec![token("A"), token("B"), token("C"), TransportEvent::End],
        );
        let mut orchestrator = scripted(
            idle(TransportKind::TokenStream),
            idle(TransportKind::SingleShot),
            upload,
        );
        orchestrator.attach_file(FileRef::new("notes.txt", "text/plain", b"x".to_vec()));
        orchestrator.input_mut().set_current_value("summarize");
        orchestrator.submit().await;
        assert!(orchestrator.pending_file().is_none());
        assert_eq!(
            orchestrator.run_until_finished().await,
            Some(Outcome::Completed)
        );

        let messages = orchestrator.messages().as_slice();
        assert_eq!(messages[0].attachment.as_ref().unwrap().name, "notes.txt");
        assert_eq!(messages[1].text, "ABC");
    }

    #[tokio::test]
    async fn upload_leaves_drafts_and_mode_alone() {
        let upload = ScriptedTransport::script(
            TransportKind::ChunkedUpload,
            vec![token("Summary"), TransportEvent::End],
        );
        let mut orchestrator = scripted(
            idle(TransportKind::TokenStream),
            idle(TransportKind::SingleShot),
            upload,
        );
        orchestrator.input_mut().set_current_value("chat draft");
        orchestrator.toggle_mode();
        orchestrator.input_mut().set_current_value("search draft");

        let file = FileRef::new("notes.txt", "text/plain", b"x".to_vec());
        assert_eq!(orchestrator.upload(file, " summarize ").await, Step::Streaming);
        assert_eq!(
            orchestrator.run_until_finished().await,
            Some(Outcome::Completed)
        );

        assert_eq!(orchestrator.input().mode(), InputMode::Search);
        assert_eq!(orchestrator.input().current_value(), "search draft");
        orchestrator.toggle_mode();
        assert_eq!(orchestrator.input().current_value(), "chat draft");
        assert_eq!(
            texts(&orchestrator),
            vec![
                (Sender::User, "summarize".to_string()),
                (Sender::Assistant, "Summary".to_string())
            ]
        );
        assert_eq!(
            orchestrator.messages().as_slice()[0]
                .attachment
                .as_ref()
                .unwrap()
                .name,
            "notes.txt"
        );
    }

    #[tokio::test]
    async fn requests_carry_user_and_conversation() {
        let chat = Arc::new(ScriptedTransport::script(
            TransportKind::TokenStream,
            vec![TransportEvent::Final("ok".into())],
        ));
        struct Shared(Arc<ScriptedTransport>);
        #[async_trait::async_trait]
        impl Transport for Shared {
            fn kind(&self) -> TransportKind {
                self.0.kind()
            }
            async fn open(&self, request: &Request) -> Result<crate::transport::Connection> {
                self.0.open(request).await
            }
        }
        let mut orchestrator = scripted(
            idle(TransportKind::TokenStream),
            idle(TransportKind::SingleShot),
            idle(TransportKind::ChunkedUpload),
        );
        orchestrator.transports.chat = Box::new(Shared(chat.clone()));
        orchestrator.input_mut().set_current_value("  hi  ");
        orchestrator.submit().await;

        let request = chat.last_request().unwrap();
        assert_eq!(request.text, "hi");
        assert_eq!(request.user_id, "default");
        assert_eq!(
            request.conversation_id,
            Some(orchestrator.conversations().active().id.to_string())
        );
    }

    #[tokio::test]
    async fn switching_conversations_stops_the_session() {
        let (chat, tx) = ScriptedTransport::channel(TransportKind::TokenStream);
        let mut orchestrator = scripted(
            chat,
            idle(TransportKind::SingleShot),
            idle(TransportKind::ChunkedUpload),
        );
        let first = orchestrator.conversations().active().id;
        orchestrator.input_mut().set_current_value("Tell me a story");
        orchestrator.submit().await;
        tx.unbounded_send(Ok(token("Once"))).unwrap();
        assert_eq!(orchestrator.pump().await, Step::Streaming);

        let second = orchestrator.new_conversation(Some("Other"));
        assert!(!orchestrator.is_streaming());
        assert_eq!(orchestrator.session().last_outcome(), Some(Outcome::Cancelled));
        assert!(tx.unbounded_send(Ok(token(" upon"))).is_err());
        assert_eq!(orchestrator.pump().await, Step::Idle);

        assert!(orchestrator.messages().is_empty());
        orchestrator.select_conversation(first).unwrap();
        assert_eq!(orchestrator.messages().last().unwrap().text, "Once");
        orchestrator.delete_conversation(second).unwrap();
        assert_eq!(orchestrator.conversations().len(), 1);
    }

    #[tokio::test]
    async fn unknown_conversation_leaves_session_running() {
        let (chat, _tx) = ScriptedTransport::channel(TransportKind::TokenStream);
        let mut orchestrator = scripted(
            chat,
            idle(TransportKind::SingleShot),
            idle(TransportKind::ChunkedUpload),
        );
        orchestrator.input_mut().set_current_value("hi");
        orchestrator.submit().await;
        let bogus: ConversationId = "999999".parse().unwrap();
        assert!(orchestrator.select_conversation(bogus).unwrap_err().is_not_found());
        assert!(orchestrator.delete_conversation(bogus).is_err());
        assert!(orchestrator.is_streaming());
    }

    #[tokio::test]
    async fn export_active_conversation() {
        let mut orchestrator = scripted(
            ScriptedTransport::script(
                TransportKind::TokenStream,
                vec![TransportEvent::Final("Paris".into())],
            ),
            idle(TransportKind::SingleShot),
            idle(TransportKind::ChunkedUpload),
        );
        orchestrator
            .input_mut()
            .set_current_value("Capital of France?");
        orchestrator.submit().await;
        orchestrator.run_until_finished().await;
        let text = orchestrator.export_active(ExportFormat::Text).unwrap();
        assert!(text.starts_with("Capital of France?\n"));
        assert!(text.contains("Paris"));
    }
}
