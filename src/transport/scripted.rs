use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::stream;

use super::{Connection, Request, Transport, TransportEvent, TransportKind};
use crate::error::{Error, Result};

enum Source {
    Script(Vec<Result<TransportEvent>>),
    Channel(Option<UnboundedReceiver<Result<TransportEvent>>>),
    Fail(Error),
}

/// A transport that never touches the network.
///
/// It replays a fixed script on every open, forwards whatever the caller
/// pushes into a channel (single open only), or refuses to open.  The last
/// request it saw is kept for inspection.
pub struct ScriptedTransport {
    kind: TransportKind,
    source: Mutex<Source>,
    opens: AtomicUsize,
    last_request: Mutex<Option<Request>>,
}

impl ScriptedTransport {
    /// Replays `events` in order on every open.
    pub fn script(kind: TransportKind, events: Vec<TransportEvent>) -> Self {
        Self::with_items(kind, events.into_iter().map(Ok).collect())
    }

    /// Replays `items`, including unprocessable ones, on every open.
    pub fn with_items(kind: TransportKind, items: Vec<Result<TransportEvent>>) -> Self {
        Self::from_source(kind, Source::Script(items))
    }

    /// Forwards events pushed into the returned sender.  Dropping the
    /// connection makes further sends fail.
    pub fn channel(kind: TransportKind) -> (Self, UnboundedSender<Result<TransportEvent>>) {
        let (tx, rx) = unbounded();
        (Self::from_source(kind, Source::Channel(Some(rx))), tx)
    }

    /// Fails every open with `error`.
    pub fn failing(kind: TransportKind, error: Error) -> Self {
        Self::from_source(kind, Source::Fail(error))
    }

    fn from_source(kind: TransportKind, source: Source) -> Self {
        Self {
            kind,
            source: Mutex::new(source),
            opens: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// How many times [`Transport::open`] has been called.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    /// The most recent request passed to [`Transport::open`].
    pub fn last_request(&self) -> Option<Request> {
        self.last_request
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&self, request: &Request) -> Result<Connection> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let mut source = self
            .source
            .lock()
            .map_err(|_| Error::connection("scripted transport lock poisoned", None))?;
        match &mut *source {
            Source::Script(items) => Ok(Connection::new(self.kind, stream::iter(items.clone()))),
            Source::Channel(rx) => match rx.take() {
                Some(rx) => Ok(Connection::new(self.kind, rx)),
                None => Err(Error::connection("scripted channel already opened", None)),
            },
            Source::Fail(error) => Err(error.clone()),
        }
    }
}
