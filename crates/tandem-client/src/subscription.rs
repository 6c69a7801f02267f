//! Cancellable handle over a live listener task.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tandem_store::{SnapshotResult, SnapshotStream, StoreError};

thread_local! {
    /// Address of the gate whose callback is running on this thread.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks a gate as delivering on this thread; restores the previous
/// marker on drop, including when the callback unwinds.
struct DeliveringMarker {
    outer: usize,
}

impl DeliveringMarker {
    fn enter(addr: usize) -> Self {
        Self {
            outer: DELIVERING.with(|d| d.replace(addr)),
        }
    }
}

impl Drop for DeliveringMarker {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.outer));
    }
}

/// Serialises callbacks against cancellation.
#[derive(Default)]
pub(crate) struct Gate {
    cancelled: AtomicBool,
    delivery: Mutex<()>,
}

impl Gate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }

    /// Run `callback` unless cancelled.  Returns `false` once cancelled.
    pub(crate) fn deliver(&self, callback: impl FnOnce()) -> bool {
        let _guard = self.delivery.lock().unwrap_or_else(|p| p.into_inner());
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        let _marker = DeliveringMarker::enter(self.addr());
        callback();
        true
    }

    /// Returns `true` on the first call only.
    fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        // From inside our own callback the lock is already held up the
        // stack; the flag alone stops the next delivery.
        if DELIVERING.with(|d| d.get()) != self.addr() {
            drop(self.delivery.lock().unwrap_or_else(|p| p.into_inner()));
        }
        true
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Handle to a live directory, thread or auth listener.
///
/// [`Subscription::cancel`] is idempotent, and once it returns no further
/// callback starts.  Dropping the handle cancels.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    gate: Arc<Gate>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(gate: Arc<Gate>, task: JoinHandle<()>) -> Self {
        Self {
            gate,
            task: Some(task),
        }
    }

    /// Spawn a task that feeds every item of `stream` to `on_item` until
    /// the stream ends or the subscription is cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn listen<F>(mut stream: SnapshotStream, mut on_item: F) -> Self
    where
        F: FnMut(SnapshotResult) + Send + 'static,
    {
        let gate = Gate::new();
        let task_gate = Arc::clone(&gate);
        let task = tokio::spawn(async move {
            while let Some(item) = stream.recv().await {
                if !task_gate.deliver(|| on_item(item)) {
                    break;
                }
            }
        });
        Self::new(gate, task)
    }

    /// A listener that reports `error` once and then ends.  Used when the
    /// store refuses to open the live query at all.
    pub(crate) fn failed<F>(error: StoreError, on_item: F) -> Self
    where
        F: FnMut(SnapshotResult) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(Err(error));
        Self::listen(rx, on_item)
    }

    /// Stop delivering updates.  Safe to call more than once, and from
    /// inside the subscription's own callback.
    pub fn cancel(&mut self) {
        if self.gate.cancel() {
            tracing::trace!("subscription cancelled");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }

    /// Whether the listener stopped on its own, e.g. because the store
    /// closed the stream.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
