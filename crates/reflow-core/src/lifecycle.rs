use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::effects::Dispose;

/// What [`Flow::observe`](crate::Flow::observe) needs from the thing that
/// owns an observation.
pub trait Lifecycle {
    fn is_active(&self) -> bool;

    /// Registers a callback to run once when the owner stops.
    fn add_observer(&self, on_stop: Dispose);
}

/// A start/stop switch with a list of stop callbacks.
///
/// Stopping runs every registered callback once and forgets them; a later
/// start begins with an empty list. Dropping the last handle of an owner that
/// still holds callbacks runs them too.
#[derive(Clone, Default)]
pub struct LifecycleOwner {
    inner: Rc<OwnerInner>,
}

#[derive(Default)]
struct OwnerInner {
    active: Cell<bool>,
    observers: RefCell<Vec<Dispose>>,
}

impl LifecycleOwner {
    /// An inactive owner.
    pub fn new() -> Self {
        Self::default()
    }

    /// An owner that is already active.
    pub fn started() -> Self {
        let owner = Self::new();
        owner.on_start();
        owner
    }

    pub fn on_start(&self) {
        self.inner.active.set(true);
    }

    pub fn on_stop(&self) {
        self.inner.active.set(false);
        let observers = std::mem::take(&mut *self.inner.observers.borrow_mut());
        if !observers.is_empty() {
            log::debug!("lifecycle: stopping, {} observer(s)", observers.len());
        }
        for o in observers {
            o.run();
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }
}

impl Lifecycle for LifecycleOwner {
    fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    fn add_observer(&self, on_stop: Dispose) {
        self.inner.observers.borrow_mut().push(on_stop);
    }
}

impl fmt::Debug for LifecycleOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleOwner")
            .field("active", &self.inner.active.get())
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl Drop for OwnerInner {
    fn drop(&mut self) {
        let observers = std::mem::take(&mut *self.observers.borrow_mut());
        for o in observers {
            o.run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_runs_each_callback_once() {
        let owner = LifecycleOwner::started();
        let hits = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let h = hits.clone();
            owner.add_observer(Dispose::new(move || h.set(h.get() + 1)));
        }
        assert_eq!(owner.observer_count(), 2);

        owner.on_stop();
        assert!(!owner.is_active());
        assert_eq!(hits.get(), 2);
        assert_eq!(owner.observer_count(), 0);

        owner.on_start();
        owner.on_stop();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn dropping_owner_runs_pending_callbacks() {
        let hit = Rc::new(Cell::new(false));
        {
            let owner = LifecycleOwner::started();
            let h = hit.clone();
            owner.add_observer(Dispose::new(move || h.set(true)));
        }
        assert!(hit.get());
    }
}
