//! Capability Gate - asynchronous permission gates
//!
//! This crate orchestrates OS-level capability grants (accessibility,
//! automation, screen recording...) without implementing them: each
//! [`Gate`] is given a `probe` and a `request` callback, checks the grant,
//! prompts when it is missing and polls until it appears, then runs a
//! one-shot completion. A [`GateRegistry`] folds a fixed set of gates into a
//! single "all granted" signal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use capability_gate::{Gate, GateContext, GateRegistry, UiQueue};
//!
//! # async fn demo() {
//! let (queue, _drain) = UiQueue::spawn();
//! let ctx = GateContext::new(queue);
//!
//! let accessibility = Arc::new(Gate::accessibility(&ctx, |_prompt| false));
//! let registry = GateRegistry::new(vec![Arc::clone(&accessibility)]);
//!
//! accessibility.run_with_completion(|| println!("granted"));
//! let mut all_granted = registry.watch();
//! while !*all_granted.borrow_and_update() {
//!     if all_granted.changed().await.is_err() {
//!         break;
//!     }
//! }
//! # }
//! ```
//!
//! ## Threading
//!
//! Probe results from poll ticks are applied on the [`UiQueue`], a single
//! serialized task, so observers see one ordered sequence of writes. Direct
//! calls (`run_with_completion`, `stop_check`) run on the caller's thread;
//! call them from the same UI context.

pub mod config;
pub mod error;
pub mod focus;
pub mod gate;
pub mod registry;
pub mod status;
pub mod ui_queue;

pub use config::GateConfig;
pub use error::ConfigError;
pub use focus::{FocusRestorer, NoopFocus, ProcessRef};
pub use gate::{Gate, GateContext, GateSnapshot, GateState};
pub use registry::GateRegistry;
pub use status::{StatusCell, Subscription};
pub use ui_queue::UiQueue;
