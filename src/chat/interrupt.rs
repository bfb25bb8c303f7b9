//! Ctrl+C handling for the REPL.
//!
//! A signal handler raises an [`Interrupt`]; the REPL races every await on
//! the orchestrator against it, from the moment a request is submitted until
//! the session finishes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::orchestrator::SessionOrchestrator;
use crate::session::Step;
use crate::store::FileRef;

/// A stop request raised from a signal handler.
#[derive(Debug, Default)]
pub struct Interrupt {
    raised: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    /// Creates an interrupt that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the interrupt.  Callable from any thread.
    pub fn trigger(&self) {
        self.raised.store(true, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Forgets any interrupt raised before now.
    pub fn reset(&self) {
        self.raised.store(false, Ordering::Relaxed);
    }

    /// Resolves once the interrupt is raised.
    pub async fn raised(&self) {
        loop {
            self.notify.notified().await;
            // Permits left over from a reset interrupt carry no flag.
            if self.raised.swap(false, Ordering::Relaxed) {
                return;
            }
        }
    }
}

/// Submits the visible draft and streams the answer until it finishes or
/// `interrupt` is raised.
pub async fn submit(orchestrator: &mut SessionOrchestrator, interrupt: &Interrupt) -> Step {
    interrupt.reset();
    let opened = until_raised(orchestrator.submit(), interrupt).await;
    drive(orchestrator, opened, interrupt).await
}

/// Uploads `file` with `message` and streams the answer until it finishes or
/// `interrupt` is raised.
pub async fn upload(
    orchestrator: &mut SessionOrchestrator,
    file: FileRef,
    message: &str,
    interrupt: &Interrupt,
) -> Step {
    interrupt.reset();
    let opened = until_raised(orchestrator.upload(file, message), interrupt).await;
    drive(orchestrator, opened, interrupt).await
}

async fn until_raised<F: Future<Output = Step>>(future: F, interrupt: &Interrupt) -> Option<Step> {
    tokio::select! {
        step = future => Some(step),
        () = interrupt.raised() => None,
    }
}

async fn drive(
    orchestrator: &mut SessionOrchestrator,
    opened: Option<Step>,
    interrupt: &Interrupt,
) -> Step {
    let Some(mut step) = opened else {
        return stopped(orchestrator);
    };
    while step == Step::Streaming {
        match until_raised(orchestrator.pump(), interrupt).await {
            Some(next) => step = next,
            None => return stopped(orchestrator),
        }
    }
    step
}

fn stopped(orchestrator: &mut SessionOrchestrator) -> Step {
    match orchestrator.stop() {
        Some(outcome) => Step::Finished(outcome),
        None => Step::Idle,
    }
}
