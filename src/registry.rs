//! Aggregate status over a fixed set of gates.
//!
//! The registry never mutates a gate. It subscribes to each gate's granted
//! status and republishes `all_granted`, the logical AND over every member,
//! whenever any member's status is written.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::info;

use crate::gate::{Gate, GateSnapshot};
use crate::status::{lock, StatusCell, Subscription};

/// Observes a fixed, ordered set of gates.
///
/// Constructed once with the full gate set; members cannot be added or
/// removed afterwards. Dropping the registry releases its subscriptions.
pub struct GateRegistry {
    gates: Vec<Arc<Gate>>,
    all_granted: Arc<StatusCell>,
    _subscriptions: Vec<Subscription>,
}

impl GateRegistry {
    /// Start observing `gates`. The aggregate is computed immediately.
    pub fn new(gates: Vec<Arc<Gate>>) -> Self {
        let members: Arc<[Arc<StatusCell>]> =
            gates.iter().map(|gate| Arc::clone(gate.status())).collect();
        let all_granted = Arc::new(StatusCell::new(aggregate(&members)));
        let recompute = Arc::new(Mutex::new(()));

        let subscriptions = gates
            .iter()
            .map(|gate| {
                let members = Arc::clone(&members);
                let all_granted = Arc::clone(&all_granted);
                let recompute = Arc::clone(&recompute);
                let title = gate.title().to_string();
                gate.subscribe(move |granted| {
                    // Member writes land before their observers run, so the
                    // last recompute to take the lock sees every write.
                    let (notification, before, after) = {
                        let _serial = lock(&recompute);
                        let before = all_granted.get();
                        let after = aggregate(&members);
                        (all_granted.replace(after), before, after)
                    };
                    if before != after {
                        info!(gate = %title, granted, all_granted = after, "Aggregate capability status changed");
                    }
                    notification.fire();
                })
            })
            .collect();

        info!(
            gates = gates.len(),
            all_granted = all_granted.get(),
            "Gate registry observing"
        );

        Self {
            gates,
            all_granted,
            _subscriptions: subscriptions,
        }
    }

    /// True iff every member gate is granted. True for an empty registry.
    pub fn all_granted(&self) -> bool {
        self.all_granted.get()
    }

    /// Observe every recomputation of the aggregate.
    pub fn subscribe(&self, observer: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        self.all_granted.subscribe(observer)
    }

    /// Receiver tracking the aggregate.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.all_granted.watch()
    }

    pub fn gates(&self) -> &[Arc<Gate>] {
        &self.gates
    }

    pub fn gate(&self, index: usize) -> Option<&Arc<Gate>> {
        self.gates.get(index)
    }

    pub fn snapshot(&self) -> Vec<GateSnapshot> {
        self.gates.iter().map(|gate| gate.snapshot()).collect()
    }

    /// Stop every member's running check. The aggregate is unaffected.
    pub fn stop_all_checks(&self) {
        for gate in &self.gates {
            gate.stop_check();
        }
    }
}

impl std::fmt::Debug for GateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateRegistry")
            .field("gates", &self.gates)
            .field("all_granted", &self.all_granted())
            .finish()
    }
}

fn aggregate(members: &[Arc<StatusCell>]) -> bool {
    members.iter().all(|cell| cell.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{GateContext, GateState};
    use crate::ui_queue::UiQueue;

    fn context() -> GateContext {
        let (queue, _task) = UiQueue::spawn();
        GateContext::new(queue)
    }

    fn fixed(ctx: &GateContext, title: &str, granted: bool) -> Arc<Gate> {
        Arc::new(Gate::new(ctx, title, vec![], vec![], move || granted, || {}))
    }

    #[tokio::test]
    async fn test_aggregate_at_construction() {
        let ctx = context();

        let mixed = GateRegistry::new(vec![
            fixed(&ctx, "Accessibility", true),
            fixed(&ctx, "Screen Recording", false),
        ]);
        assert!(!mixed.all_granted());

        let all = GateRegistry::new(vec![
            fixed(&ctx, "Accessibility", true),
            fixed(&ctx, "Screen Recording", true),
        ]);
        assert!(all.all_granted());
    }

    #[tokio::test]
    async fn test_empty_registry_is_granted() {
        let registry = GateRegistry::new(Vec::new());
        assert!(registry.all_granted());
        assert!(registry.snapshot().is_empty());
        registry.stop_all_checks();
    }

    #[tokio::test]
    async fn test_recomputes_on_member_writes() {
        let ctx = context();
        let first = fixed(&ctx, "Accessibility", false);
        let second = fixed(&ctx, "Screen Recording", true);
        let registry = GateRegistry::new(vec![Arc::clone(&first), Arc::clone(&second)]);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _sub = registry.subscribe(move |all| sink.lock().unwrap().push(all));

        first.status().set(true);
        assert!(registry.all_granted());
        second.status().set(false);
        assert!(!registry.all_granted());

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_stop_all_checks_leaves_aggregate() {
        let ctx = context();
        let granted = fixed(&ctx, "Accessibility", true);
        let missing = fixed(&ctx, "Screen Recording", false);
        let registry = GateRegistry::new(vec![Arc::clone(&granted), Arc::clone(&missing)]);

        missing.run_with_completion(|| {});
        assert_eq!(missing.state(), GateState::Polling);

        registry.stop_all_checks();
        registry.stop_all_checks();

        assert_eq!(missing.state(), GateState::Idle);
        assert_eq!(granted.state(), GateState::Idle);
        assert!(!registry.all_granted());
    }

    #[tokio::test]
    async fn test_drop_releases_subscriptions() {
        let ctx = context();
        let gate = fixed(&ctx, "Accessibility", true);
        let registry = GateRegistry::new(vec![Arc::clone(&gate)]);
        assert_eq!(gate.status().observer_count(), 1);

        drop(registry);
        assert_eq!(gate.status().observer_count(), 0);
    }

    #[tokio::test]
    async fn test_accessors() {
        let ctx = context();
        let registry = GateRegistry::new(vec![
            fixed(&ctx, "Accessibility", true),
            fixed(&ctx, "Screen Recording", false),
        ]);

        assert_eq!(registry.gates().len(), 2);
        assert_eq!(registry.gate(1).map(|g| g.title()), Some("Screen Recording"));
        assert!(registry.gate(2).is_none());

        let titles: Vec<String> = registry.snapshot().into_iter().map(|s| s.title).collect();
        assert_eq!(titles, vec!["Accessibility", "Screen Recording"]);
    }
}
