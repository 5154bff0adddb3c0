use std::fmt;
use std::marker::PhantomData;

/// Receives values pushed by a flow.
///
/// `on_change` is only ever called with a present value. Delivery goes
/// through [`Observer::offer`], which drops `None`.
pub trait Observer<T> {
    fn on_change(&self, value: &T);

    /// Forwards present values to `on_change`; absent values go nowhere.
    fn offer(&self, value: Option<&T>) {
        if let Some(v) = value {
            self.on_change(v);
        }
    }
}

/// Adapts a plain callback into an [`Observer`].
pub struct CallbackObserver<T, F> {
    callback: F,
    _value: PhantomData<fn(&T)>,
}

impl<T, F: Fn(&T)> CallbackObserver<T, F> {
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _value: PhantomData,
        }
    }
}

impl<T, F: Fn(&T)> Observer<T> for CallbackObserver<T, F> {
    fn on_change(&self, value: &T) {
        (self.callback)(value)
    }
}

impl<T, F> fmt::Debug for CallbackObserver<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackObserver").finish_non_exhaustive()
    }
}

/// Shorthand for [`CallbackObserver::new`].
pub fn observer<T, F: Fn(&T)>(callback: F) -> CallbackObserver<T, F> {
    CallbackObserver::new(callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn offer_drops_absent_values() {
        let seen = RefCell::new(Vec::new());
        let obs = observer(|v: &i32| seen.borrow_mut().push(*v));

        obs.offer(None);
        obs.offer(Some(&7));
        obs.offer(None);

        assert_eq!(*seen.borrow(), vec![7]);
    }
}
