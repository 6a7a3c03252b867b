//! Capability gate state machine.
//!
//! A [`Gate`] wraps one OS-level capability behind two injected callbacks:
//!
//! - `probe`: synchronous, side-effect free check of the current grant
//! - `request`: fire-and-forget trigger for the OS grant prompt
//!
//! ## Lifecycle
//!
//! ```text
//!            run_with_completion (probe false)
//!   ┌──────┐ ───────────────────────────────▶ ┌─────────┐
//!   │ Idle │                                  │ Polling │ ── tick: probe → UiQueue → granted
//!   └──────┘ ◀─────────────────────────────── └─────────┘
//!        stop_check / granted observed true (completion runs once)
//! ```
//!
//! A flow owns two handles: the poll task and a one-shot subscription on
//! the gate's own `granted` cell. Both live in a single [`Flow`] value, so
//! they are armed and released together. Each flow carries an epoch; probe
//! results queued by a flow that has since been stopped are discarded.
//!
//! The probe and request callbacks must not panic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::focus::{restore_focus, FocusRestorer, NoopFocus};
use crate::status::{lock, StatusCell, Subscription};
use crate::ui_queue::UiQueue;

type Probe = Box<dyn Fn() -> bool + Send + Sync>;
type Request = Box<dyn Fn() + Send + Sync>;
type Completion = Box<dyn FnOnce() + Send>;

/// Dependencies shared by all gates of one application.
#[derive(Clone)]
pub struct GateContext {
    queue: UiQueue,
    focus: Arc<dyn FocusRestorer>,
    config: GateConfig,
}

impl GateContext {
    /// Context with default configuration and no focus restoration hooks.
    pub fn new(queue: UiQueue) -> Self {
        Self {
            queue,
            focus: Arc::new(NoopFocus),
            config: GateConfig::default(),
        }
    }

    pub fn with_focus(mut self, focus: Arc<dyn FocusRestorer>) -> Self {
        self.focus = focus;
        self
    }

    pub fn with_config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn queue(&self) -> &UiQueue {
        &self.queue
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

impl std::fmt::Debug for GateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateContext")
            .field("queue", &self.queue)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Whether a gate is currently waiting for its capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Polling,
}

/// Point-in-time view of a gate for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    pub title: String,
    pub details: Vec<String>,
    pub notes: Vec<String>,
    pub granted: bool,
    pub state: GateState,
}

/// An armed poll/observe pair. Dropping it releases both.
struct Flow {
    epoch: u64,
    poll: JoinHandle<()>,
    _watch: Subscription,
}

impl Drop for Flow {
    fn drop(&mut self) {
        self.poll.abort();
    }
}

#[derive(Default)]
struct FlowSlot {
    next_epoch: u64,
    active: Option<Flow>,
}

impl FlowSlot {
    fn is_current(&self, epoch: u64) -> bool {
        self.active.as_ref().is_some_and(|flow| flow.epoch == epoch)
    }
}

/// State reachable from the poll task and the completion observer.
struct Shared {
    title: String,
    details: Vec<String>,
    notes: Vec<String>,
    probe: Probe,
    request: Request,
    granted: Arc<StatusCell>,
    flow: Mutex<FlowSlot>,
    ctx: GateContext,
}

impl Shared {
    fn probe(&self) -> bool {
        (self.probe)()
    }

    fn stop_check(&self) {
        let flow = lock(&self.flow).active.take();
        if let Some(flow) = flow {
            debug!(gate = %self.title, epoch = flow.epoch, "Stopped capability check");
        }
    }

    /// Remove the active flow if it is still the one identified by `epoch`.
    fn take_flow(&self, epoch: u64) -> Option<Flow> {
        let mut slot = lock(&self.flow);
        if slot.is_current(epoch) {
            slot.active.take()
        } else {
            None
        }
    }

    /// Runs on the UI queue with a probe result from the poll task.
    fn apply_tick(&self, epoch: u64, granted: bool) {
        let notification = {
            let slot = lock(&self.flow);
            if !slot.is_current(epoch) {
                debug!(gate = %self.title, epoch, "Discarding probe result from stopped flow");
                return;
            }
            self.granted.replace(granted)
        };
        notification.fire();
    }
}

/// Per-capability permission gate.
///
/// Construct one per capability and share it (e.g. in an `Arc`) with the
/// [`crate::GateRegistry`] and the presentation layer. Dropping the gate
/// stops any running check.
pub struct Gate {
    shared: Arc<Shared>,
}

impl Gate {
    /// Create a gate. Runs `probe` once to initialize the granted status;
    /// no polling is started.
    pub fn new(
        ctx: &GateContext,
        title: impl Into<String>,
        details: Vec<String>,
        notes: Vec<String>,
        probe: impl Fn() -> bool + Send + Sync + 'static,
        request: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let title = title.into();
        let granted = probe();
        debug!(gate = %title, granted, "Created capability gate");

        Self {
            shared: Arc::new(Shared {
                title,
                details,
                notes,
                probe: Box::new(probe),
                request: Box::new(request),
                granted: Arc::new(StatusCell::new(granted)),
                flow: Mutex::new(FlowSlot::default()),
                ctx: ctx.clone(),
            }),
        }
    }

    /// Accessibility permission gate.
    ///
    /// `is_trusted(prompt)` is the platform trust check: it reports whether
    /// the process is trusted and, when `prompt` is true, asks the OS to show
    /// its grant dialog.
    pub fn accessibility(
        ctx: &GateContext,
        is_trusted: impl Fn(bool) -> bool + Send + Sync + 'static,
    ) -> Self {
        let is_trusted = Arc::new(is_trusted);
        let prompt = Arc::clone(&is_trusted);
        Self::new(
            ctx,
            "Accessibility",
            vec!["Get real-time information about the menu bar.".to_string()],
            Vec::new(),
            move || is_trusted(false),
            move || {
                prompt(true);
            },
        )
    }

    pub fn title(&self) -> &str {
        &self.shared.title
    }

    pub fn details(&self) -> &[String] {
        &self.shared.details
    }

    pub fn notes(&self) -> &[String] {
        &self.shared.notes
    }

    /// Last known grant status.
    pub fn is_granted(&self) -> bool {
        self.shared.granted.get()
    }

    pub fn state(&self) -> GateState {
        if lock(&self.shared.flow).active.is_some() {
            GateState::Polling
        } else {
            GateState::Idle
        }
    }

    /// Observe every write to the granted status.
    pub fn subscribe(&self, observer: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        self.shared.granted.subscribe(observer)
    }

    /// Receiver tracking the granted status.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.shared.granted.watch()
    }

    pub(crate) fn status(&self) -> &Arc<StatusCell> {
        &self.shared.granted
    }

    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            title: self.shared.title.clone(),
            details: self.shared.details.clone(),
            notes: self.shared.notes.clone(),
            granted: self.is_granted(),
            state: self.state(),
        }
    }

    /// Check the capability, requesting it and polling until granted if it
    /// is missing.
    ///
    /// Any check already running on this gate is stopped first; its
    /// completion will never run. If the capability is already granted the
    /// call returns without invoking `on_granted`. Otherwise `request` is
    /// invoked once and the gate polls every configured interval; the first
    /// time the granted status becomes true, focus is restored, the check
    /// stops and `on_granted` runs on the UI queue.
    ///
    /// Never blocks beyond one probe and one request call.
    ///
    /// The gate holds `on_granted` until the flow completes or is stopped.
    /// A completion that needs the gate itself should capture a
    /// `Weak<Gate>`: an `Arc<Gate>` would keep the gate alive, and its
    /// `Drop` from stopping the check, for as long as the flow waits.
    pub fn run_with_completion(&self, on_granted: impl FnOnce() + Send + 'static) {
        self.stop_check();
        let shared = &self.shared;

        if shared.probe() {
            shared.granted.set(true);
            debug!(gate = %shared.title, "Capability already granted");
            return;
        }

        shared.granted.set(false);
        (shared.request)();

        let mut slot = lock(&shared.flow);
        slot.next_epoch += 1;
        let epoch = slot.next_epoch;
        let watch = shared.granted.subscribe(completion_observer(
            Arc::clone(shared),
            epoch,
            Box::new(on_granted),
        ));
        let poll = shared
            .ctx
            .queue
            .runtime()
            .spawn(poll_loop(Arc::clone(shared), epoch));
        // Another caller may have armed a flow since our stop_check.
        let superseded = slot.active.replace(Flow {
            epoch,
            poll,
            _watch: watch,
        });
        drop(slot);
        drop(superseded);

        info!(
            gate = %shared.title,
            epoch,
            poll_interval_ms = shared.ctx.config.poll_interval_ms,
            "Requested capability, polling for grant"
        );
    }

    /// Stop any running check. Idempotent, and safe to call from inside the
    /// completion callback.
    pub fn stop_check(&self) {
        self.shared.stop_check();
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        self.shared.stop_check();
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("title", &self.shared.title)
            .field("granted", &self.is_granted())
            .field("state", &self.state())
            .finish()
    }
}

/// One-shot observer fired on the first `true` written during flow `epoch`.
fn completion_observer(
    shared: Arc<Shared>,
    epoch: u64,
    on_granted: Completion,
) -> impl Fn(bool) + Send + Sync + 'static {
    let pending = Mutex::new(Some(on_granted));

    move |granted| {
        if !granted {
            return;
        }
        // Claiming the flow is the Polling -> Idle transition; it also
        // releases this observer's own subscription and the poll task.
        let Some(flow) = shared.take_flow(epoch) else {
            return;
        };
        drop(flow);

        let Some(on_granted) = lock(&pending).take() else {
            return;
        };

        info!(gate = %shared.title, epoch, "Capability granted");
        if shared.ctx.config.restore_focus {
            restore_focus(shared.ctx.focus.as_ref());
        }
        on_granted();
    }
}

async fn poll_loop(shared: Arc<Shared>, epoch: u64) {
    let period = shared
        .ctx
        .config
        .poll_interval()
        .max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let granted = shared.probe();
        debug!(gate = %shared.title, epoch, granted, "Probed capability");

        let target = Arc::clone(&shared);
        if !shared
            .ctx
            .queue
            .post(move || target.apply_tick(epoch, granted))
        {
            warn!(gate = %shared.title, epoch, "UI queue closed, abandoning poll loop");
            drop(shared.take_flow(epoch));
            break;
        }
    }
}
