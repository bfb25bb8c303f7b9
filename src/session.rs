//! The streaming session state machine.
//!
//! A session moves `Idle -> Active -> {Completed, Errored, Cancelled} -> Idle`.
//! All event handling goes through [`reduce`], a pure function from the
//! current [`SessionState`] and one [`TransportEvent`] to the next state plus
//! at most one [`Effect`] on the [`MessageStore`].  [`StreamSession`] wraps
//! the reducer with the one thing it cannot own: the open [`Connection`].

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use crate::observability::{
    SESSION_DURATION, SESSION_OPEN_ERRORS, SESSIONS_CANCELLED, SESSIONS_COMPLETED,
    SESSIONS_ERRORED, SESSIONS_STARTED, STREAM_EVENTS, STREAM_HANDLING_ERRORS,
};
use crate::session_logger::SessionLogger;
use crate::store::{MessageId, MessageStore};
use crate::transport::{
    Connection, Request, Transport, TransportEvent, TransportKind, TransportPolicy,
};

/// Lifecycle position of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    /// No request outstanding.
    #[default]
    Idle,
    /// A connection is open (or opening) and its events are being applied.
    Active,
    /// A final payload or end-of-body arrived.
    Completed,
    /// An error event, an unprocessable event, or a connection failure.
    Errored,
    /// The user stopped the session.
    Cancelled,
}

impl Status {
    /// The terminal outcome this status represents, if any.
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            Status::Completed => Some(Outcome::Completed),
            Status::Errored => Some(Outcome::Errored),
            Status::Cancelled => Some(Outcome::Cancelled),
            Status::Idle | Status::Active => None,
        }
    }
}

/// How a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The answer arrived in full.
    Completed,
    /// The session failed; the visible text explains or preserves what came.
    Errored,
    /// The user stopped the session.
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Completed => "completed",
            Outcome::Errored => "errored",
            Outcome::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A mutation the reducer asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Overwrite the text of the session's message.
    ReplaceLastText(String),
}

/// Everything the reducer knows about a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    status: Status,
    accumulated: String,
    kind: TransportKind,
}

impl SessionState {
    /// A freshly opened session for `kind` with nothing accumulated.
    pub fn active(kind: TransportKind) -> Self {
        Self {
            status: Status::Active,
            accumulated: String::new(),
            kind,
        }
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Text accumulated so far; frozen once the session leaves `Active`.
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    /// The transport variant this session reads from.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    fn policy(&self) -> TransportPolicy {
        self.kind.policy()
    }
}

/// Applies one transport event.
///
/// Anything that arrives while the session is not `Active` is ignored, which
/// is what makes late events from a disposed connection harmless.
pub fn reduce(mut state: SessionState, event: TransportEvent) -> (SessionState, Option<Effect>) {
    if state.status != Status::Active {
        return (state, None);
    }
    let text = match event {
        TransportEvent::Token(fragment) => {
            state.accumulated.push_str(&fragment);
            state.accumulated.clone()
        }
        TransportEvent::Final(payload) => {
            state.status = Status::Completed;
            state.accumulated = payload;
            state.accumulated.clone()
        }
        TransportEvent::End => {
            state.status = Status::Completed;
            state.accumulated.clone()
        }
        TransportEvent::Error(_) => {
            state.status = Status::Errored;
            state.policy().error_text(&state.accumulated)
        }
        TransportEvent::ConnectionFailed { reason } => {
            state.status = Status::Errored;
            state.policy().failure_text(&state.accumulated, &reason)
        }
    };
    (state, Some(Effect::ReplaceLastText(text)))
}

/// Applies a user stop.
pub fn cancel(mut state: SessionState) -> (SessionState, Option<Effect>) {
    if state.status != Status::Active {
        return (state, None);
    }
    state.status = Status::Cancelled;
    let effect = state
        .policy()
        .stopped_text(&state.accumulated)
        .map(Effect::ReplaceLastText);
    (state, effect)
}

/// What happened on one call into a [`StreamSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Nothing is in flight.
    Idle,
    /// An event was applied and the session is still active.
    Streaming,
    /// The session reached a terminal state and has been disposed.
    Finished(Outcome),
}

/// Owns at most one in-flight request and folds its events into a
/// [`MessageStore`].
///
/// The message a session writes to is the last one in the store when the
/// session starts; if anything else is appended later, the session's writes
/// are dropped rather than landing on the wrong message.
#[derive(Default)]
pub struct StreamSession {
    state: SessionState,
    connection: Option<Connection>,
    target: Option<MessageId>,
    last_outcome: Option<Outcome>,
    started: Option<Instant>,
    logger: Option<Arc<dyn SessionLogger>>,
}

impl StreamSession {
    /// Creates an idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a logger.
    pub fn with_logger(mut self, logger: Arc<dyn SessionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// `Idle` or `Active`; terminal states are never observable here.
    pub fn status(&self) -> Status {
        self.state.status
    }

    /// Returns true while a request is in flight.
    pub fn is_active(&self) -> bool {
        self.state.status == Status::Active
    }

    /// How the most recent session ended.
    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    /// Text accumulated by the current or most recent session.
    pub fn accumulated_text(&self) -> &str {
        self.state.accumulated_text()
    }

    /// The transport variant of the current or most recent session.
    pub fn kind(&self) -> TransportKind {
        self.state.kind
    }

    /// Opens `transport` for `request` and begins writing into the last
    /// message of `store`.
    ///
    /// An active session is stopped first.  A failure to open resolves the
    /// new session to `Errored` immediately.
    pub async fn start(
        &mut self,
        transport: &dyn Transport,
        request: &Request,
        store: &mut MessageStore,
    ) -> Step {
        if self.is_active() {
            self.stop(store);
        }

        let kind = transport.kind();
        self.state = SessionState::active(kind);
        self.target = store.last().map(|m| m.id);
        self.last_outcome = None;
        self.started = Some(Instant::now());
        SESSIONS_STARTED.click();

        match transport.open(request).await {
            Ok(connection) => {
                self.connection = Some(connection);
                Step::Streaming
            }
            Err(err) => {
                SESSION_OPEN_ERRORS.click();
                let event = TransportEvent::ConnectionFailed {
                    reason: err.to_string(),
                };
                self.apply(event, store)
            }
        }
    }

    /// Waits for the next event from the open connection and applies it.
    ///
    /// Dropping the returned future before it completes changes nothing, so
    /// it can race a stop request.
    pub async fn next(&mut self, store: &mut MessageStore) -> Step {
        if !self.is_active() {
            return Step::Idle;
        }
        let item = match self.connection.as_mut() {
            Some(connection) => connection.next_event().await,
            None => None,
        };
        let event = match item {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                STREAM_HANDLING_ERRORS.click();
                if let Some(logger) = &self.logger {
                    logger.log_handling_error(self.state.kind, &err);
                }
                TransportEvent::Error(self.state.policy().fallback_error_text.to_string())
            }
            None => TransportEvent::ConnectionFailed {
                reason: "connection closed".to_string(),
            },
        };
        self.apply(event, store)
    }

    /// Drives the session until it finishes.
    pub async fn finish(&mut self, store: &mut MessageStore) -> Option<Outcome> {
        loop {
            match self.next(store).await {
                Step::Streaming => continue,
                Step::Finished(outcome) => return Some(outcome),
                Step::Idle => return None,
            }
        }
    }

    /// Stops the active session, disposing its connection at once.
    ///
    /// Returns `None` if nothing was in flight.
    pub fn stop(&mut self, store: &mut MessageStore) -> Option<Outcome> {
        if !self.is_active() {
            return None;
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        let (state, effect) = cancel(mem::take(&mut self.state));
        self.state = state;
        // The stop marker belongs to the session's own message, even after a
        // newer one was appended behind it.
        if let (Some(Effect::ReplaceLastText(text)), Some(target)) = (effect, self.target) {
            store.replace_text(target, text);
        }
        Some(self.dispose(Outcome::Cancelled, store))
    }

    fn apply(&mut self, event: TransportEvent, store: &mut MessageStore) -> Step {
        STREAM_EVENTS.click();
        if let Some(logger) = &self.logger {
            logger.log_event(self.state.kind, &event);
        }
        let (state, effect) = reduce(mem::take(&mut self.state), event);
        self.state = state;
        if let Some(effect) = effect {
            self.apply_effect(effect, store);
        }
        match self.state.status.outcome() {
            Some(outcome) => Step::Finished(self.dispose(outcome, store)),
            None => Step::Streaming,
        }
    }

    fn apply_effect(&self, effect: Effect, store: &mut MessageStore) {
        match effect {
            Effect::ReplaceLastText(text) => {
                if store.last().map(|m| m.id) == self.target {
                    store.replace_last_text(text);
                }
            }
        }
    }

    fn dispose(&mut self, outcome: Outcome, store: &MessageStore) -> Outcome {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        match outcome {
            Outcome::Completed => SESSIONS_COMPLETED.click(),
            Outcome::Errored => SESSIONS_ERRORED.click(),
            Outcome::Cancelled => SESSIONS_CANCELLED.click(),
        }
        if let Some(started) = self.started.take() {
            SESSION_DURATION.add(started.elapsed().as_secs_f64());
        }
        if let Some(logger) = &self.logger {
            let text = self
                .target
                .and_then(|id| store.get(id))
                .map(|m| m.text.as_str())
                .unwrap_or_default();
            logger.log_outcome(self.state.kind, outcome, text);
        }
        self.state.status = Status::Idle;
        self.target = None;
        self.last_outcome = Some(outcome);
        outcome
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state)
            .field("connection", &self.connection)
            .field("target", &self.target)
            .field("last_outcome", &self.last_outcome)
            .finish()
    }
}
