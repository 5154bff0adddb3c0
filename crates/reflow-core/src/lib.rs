//! # Flows
//!
//! Reflow's core is a small push/pull reactive graph built around one type,
//! `Flow<T>`: a single value that producers assign and derivations follow.
//!
//! - Root flows hold values set by producers.
//! - Derived flows (`map`, `distinct_until_changed`, `throttle`, `combine*`)
//!   compute their value from parents and are read-only.
//! - `observe` attaches a callback for as long as a `Lifecycle` owner is
//!   active.
//!
//! ## Roots and derivations
//!
//! ```rust
//! use reflow_core::*;
//!
//! let count = Flow::new();
//! let doubled = count.map(|v: &i32| v * 2);
//! assert_eq!(doubled.get(), None);
//!
//! count.set(3).unwrap();
//! assert_eq!(doubled.get(), Some(6));
//!
//! assert_eq!(doubled.set(1), Err(FlowError::ImmutableWrite));
//! ```
//!
//! ## Push when observed, pull when read
//!
//! A derived flow is *live* while it is observed, forced reactive, or feeds a
//! live flow. Assigning a root pushes the value synchronously through every
//! live derivation; dead ones are skipped entirely and computed on demand by
//! `get()` instead. Nothing is computed for a derivation nobody looks at.
//!
//! ```rust
//! use reflow_core::*;
//!
//! let owner = LifecycleOwner::started();
//! let a = Flow::new();
//! let b = flow(100);
//! let sum = Flow::combine2(&a, &b, |x: &i32, y: &i32| x + y);
//!
//! let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//! let s = seen.clone();
//! sum.observe(&owner, move |v| s.borrow_mut().push(*v));
//! assert!(seen.borrow().is_empty()); // `a` is still empty
//!
//! a.set(1).unwrap();
//! assert_eq!(*seen.borrow(), vec![101]);
//!
//! owner.on_stop();
//! a.set(2).unwrap();
//! assert_eq!(*seen.borrow(), vec![101]);
//! ```
//!
//! ## Time
//!
//! `throttle` defers delivery through the per-thread [`scheduler`]. The host
//! loop drives it by calling `scheduler::run_due_timers()` and
//! `scheduler::run_frame()`; tests install a `ManualClock`.

pub mod combine;
pub mod effects;
pub mod error;
pub mod flow;
pub mod graph;
pub mod lifecycle;
pub mod observer;
pub mod prelude;
pub mod scheduler;
pub mod throttle;

pub use effects::*;
pub use error::*;
pub use flow::*;
pub use lifecycle::*;
pub use observer::*;
pub use throttle::*;
