use biometrics::{Collector, Counter, Moments};

pub(crate) static SESSIONS_STARTED: Counter = Counter::new("streamchat.session.started");
pub(crate) static SESSIONS_COMPLETED: Counter = Counter::new("streamchat.session.completed");
pub(crate) static SESSIONS_ERRORED: Counter = Counter::new("streamchat.session.errored");
pub(crate) static SESSIONS_CANCELLED: Counter = Counter::new("streamchat.session.cancelled");
pub(crate) static SESSION_OPEN_ERRORS: Counter = Counter::new("streamchat.session.open_errors");
pub(crate) static SESSION_DURATION: Moments =
    Moments::new("streamchat.session.duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("streamchat.stream.events");
pub(crate) static STREAM_HANDLING_ERRORS: Counter =
    Counter::new("streamchat.stream.handling_errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("streamchat.stream.bytes");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&SESSIONS_STARTED);
    collector.register_counter(&SESSIONS_COMPLETED);
    collector.register_counter(&SESSIONS_ERRORED);
    collector.register_counter(&SESSIONS_CANCELLED);
    collector.register_counter(&SESSION_OPEN_ERRORS);
    collector.register_moments(&SESSION_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_HANDLING_ERRORS);
    collector.register_counter(&STREAM_BYTES);
}
