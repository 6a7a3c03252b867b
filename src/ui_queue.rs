//! Serial executor standing in for the application's UI thread.
//!
//! Status writes driven by poll ticks, and everything causally after them,
//! must happen on one serialized timeline. [`UiQueue`] is that timeline: a
//! single tokio task draining an unbounded channel of jobs in FIFO order.
//!
//! Jobs must not block. A job that panics is logged and skipped; the queue
//! keeps draining.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle for posting jobs to the serial UI queue.
///
/// Cloning is cheap. The drain task exits once every handle is dropped.
#[derive(Clone)]
pub struct UiQueue {
    sender: mpsc::UnboundedSender<Job>,
    runtime: Handle,
}

impl UiQueue {
    /// Spawn the drain task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        Self::spawn_on(&Handle::current())
    }

    /// Spawn the drain task on the given runtime.
    ///
    /// Gates built with this queue also spawn their poll loops on `runtime`.
    pub fn spawn_on(runtime: &Handle) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = runtime.spawn(drain(receiver));
        let queue = Self {
            sender,
            runtime: runtime.clone(),
        };
        (queue, task)
    }

    /// Post a job. Returns `false` if the drain task is gone.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.sender.send(Box::new(job)).is_ok()
    }

    /// Wait until every job posted before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.post(move || {
            let _ = tx.send(());
        }) {
            let _ = rx.await;
        }
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

impl std::fmt::Debug for UiQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiQueue")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

async fn drain(mut receiver: mpsc::UnboundedReceiver<Job>) {
    info!("UI queue started");
    let mut panic_count = 0u64;

    while let Some(job) = receiver.recv().await {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
            panic_count += 1;
            error!(
                panic = panic_message(payload.as_ref()),
                panic_count, "UI queue job panicked, continuing"
            );
        }
    }

    info!("UI queue stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
