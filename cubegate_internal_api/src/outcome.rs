//! Exactly-once outcome resolution for submitted dispatch units.
//!
//! One cell per unit moves `Submitted -> Resolved(Success) |
//! Resolved(Failure)`; both resolved states are terminal. The guard is an
//! atomic owned by this side of the boundary, so the contract holds even
//! against a misbehaving processor.

use crate::query_processor::{ProcessorFailure, SendableRowStream};
use cubegate_types::ResultModel;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::warn;

/// Terminal result of one dispatch unit. No retries, no partial outcomes.
pub enum Outcome {
    Success(ResultModel, SendableRowStream),
    Failure(ProcessorFailure),
}

impl Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(model, _) => f
                .debug_tuple("Success")
                .field(model)
                .field(&"<row stream>")
                .finish(),
            Self::Failure(failure) => f.debug_tuple("Failure").field(failure).finish(),
        }
    }
}

/// The processor dropped its callbacks without resolving either way.
///
/// An internal defect in the processor, not a caller error; the dispatching
/// side surfaces it loudly rather than hanging forever.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("query processor dropped the dispatch unit without resolving an outcome")]
pub struct ProcessorHangup;

/// Create the callback pair and the handle it resolves.
///
/// Call this before submitting to the processor, never after: the callbacks
/// must exist by the time `process` is invoked, or an early-resolving
/// processor races the registration.
pub fn outcome_channel() -> (OutcomeCallbacks, OutcomeHandle) {
    let (tx, rx) = oneshot::channel();
    let callbacks = OutcomeCallbacks {
        cell: Arc::new(ResolveCell {
            resolved: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        }),
    };
    (callbacks, OutcomeHandle { rx })
}

#[derive(Debug)]
struct ResolveCell {
    resolved: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

/// The success/failure callbacks for one submitted unit.
///
/// Clones share the same resolution cell: however many hands hold these,
/// exactly one resolution is allowed across all of them.
#[derive(Debug, Clone)]
pub struct OutcomeCallbacks {
    cell: Arc<ResolveCell>,
}

impl OutcomeCallbacks {
    /// Resolve the unit successfully, handing the rows on as a stream
    pub fn success(&self, model: ResultModel, rows: SendableRowStream) {
        self.resolve(Outcome::Success(model, rows));
    }

    /// Resolve the unit as failed
    pub fn failure(&self, failure: ProcessorFailure) {
        self.resolve(Outcome::Failure(failure));
    }

    fn resolve(&self, outcome: Outcome) {
        if self.cell.resolved.swap(true, Ordering::AcqRel) {
            panic!(
                "dispatch outcome resolved more than once: \
                the query processor broke the exactly-once contract"
            );
        }
        let tx = self
            .cell
            .tx
            .lock()
            .take()
            .expect("resolution guard won, sender must still be present");
        if tx.send(outcome).is_err() {
            // Receiver gone means the transport abandoned the request. The
            // outcome is terminal regardless; it just has no audience.
            warn!("dispatch outcome resolved after the dispatching side went away");
        }
    }
}

/// Awaits the terminal outcome of a submitted unit.
///
/// The sole synchronization point between the dispatching task and whichever
/// thread resolves the outcome; resumable from any thread, exactly once.
#[derive(Debug)]
pub struct OutcomeHandle {
    rx: oneshot::Receiver<Outcome>,
}

impl OutcomeHandle {
    /// Suspend until the unit reaches a terminal outcome.
    pub async fn outcome(self) -> Result<Outcome, ProcessorHangup> {
        self.rx.await.map_err(|_| ProcessorHangup)
    }
}
