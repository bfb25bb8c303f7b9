//! Logging trait for stream sessions.
//!
//! This module provides the [`SessionLogger`] trait that lets callers record
//! everything a [`StreamSession`](crate::StreamSession) consumes and how each
//! session ends.

use std::io::{self, Write};

use crate::error::Error;
use crate::session::Outcome;
use crate::transport::{TransportEvent, TransportKind};

/// A trait for logging stream session activity.
///
/// # Example
///
/// ```rust
/// use std::sync::Mutex;
///
/// use streamchat::{Error, Outcome, SessionLogger, TransportEvent, TransportKind};
///
/// #[derive(Default)]
/// struct Counting {
///     events: Mutex<usize>,
/// }
///
/// impl SessionLogger for Counting {
///     fn log_event(&self, _: TransportKind, _: &TransportEvent) {
///         *self.events.lock().unwrap() += 1;
///     }
///
///     fn log_handling_error(&self, _: TransportKind, _: &Error) {}
///
///     fn log_outcome(&self, _: TransportKind, _: Outcome, _: &str) {}
/// }
/// ```
pub trait SessionLogger: Send + Sync {
    /// Log an event as it is applied to the session.
    fn log_event(&self, kind: TransportKind, event: &TransportEvent);

    /// Log an event that could not be processed.
    ///
    /// The session treats such an event as an error carrying the transport's
    /// fallback text.
    fn log_handling_error(&self, kind: TransportKind, error: &Error);

    /// Log how a session ended along with the final visible text.
    fn log_outcome(&self, kind: TransportKind, outcome: Outcome, text: &str);
}

/// Writes one line per call to standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrLogger;

impl SessionLogger for StderrLogger {
    fn log_event(&self, kind: TransportKind, event: &TransportEvent) {
        let _ = writeln!(io::stderr(), "[{kind}] event: {event:?}");
    }

    fn log_handling_error(&self, kind: TransportKind, error: &Error) {
        let _ = writeln!(io::stderr(), "[{kind}] unprocessable event: {error}");
    }

    fn log_outcome(&self, kind: TransportKind, outcome: Outcome, text: &str) {
        let _ = writeln!(
            io::stderr(),
            "[{kind}] session {outcome:?} ({} chars)",
            text.chars().count()
        );
    }
}
