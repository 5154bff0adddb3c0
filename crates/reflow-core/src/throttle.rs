use std::cell::RefCell;
use std::rc::Rc;

use web_time::Duration;

use crate::error::FlowError;
use crate::observer::Observer;
use crate::scheduler::{self, TaskHandle};

/// Trailing-edge sampler in front of another observer.
///
/// The first value in an idle period opens a window of `window`; values
/// arriving while the window is open replace the pending one without
/// extending it. When the window closes the latest value is delivered and the
/// sampler goes idle again. A zero window waits for the next frame instead of
/// a timer.
pub struct ThrottleObserver<T: 'static> {
    inner: Rc<ThrottleInner<T>>,
}

struct ThrottleInner<T> {
    downstream: Rc<dyn Observer<T>>,
    window: Duration,
    state: RefCell<ThrottleState<T>>,
}

struct ThrottleState<T> {
    pending: Option<T>,
    task: Option<TaskHandle>,
}

impl<T: Clone + 'static> ThrottleObserver<T> {
    pub fn new(downstream: Rc<dyn Observer<T>>, window: Duration) -> Self {
        Self {
            inner: Rc::new(ThrottleInner {
                downstream,
                window,
                state: RefCell::new(ThrottleState {
                    pending: None,
                    task: None,
                }),
            }),
        }
    }

    /// Window given in signed milliseconds; negative windows are rejected.
    pub fn from_millis(downstream: Rc<dyn Observer<T>>, millis: i64) -> Result<Self, FlowError> {
        let window = window_from_millis(millis)?;
        Ok(Self::new(downstream, window))
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// True while a window is open.
    pub fn is_pending(&self) -> bool {
        self.inner
            .state
            .borrow()
            .task
            .as_ref()
            .is_some_and(TaskHandle::is_pending)
    }
}

pub(crate) fn window_from_millis(millis: i64) -> Result<Duration, FlowError> {
    u64::try_from(millis)
        .map(Duration::from_millis)
        .map_err(|_| FlowError::InvalidWindow { millis })
}

impl<T: Clone + 'static> ThrottleInner<T> {
    fn close_window(&self) {
        let value = {
            let mut st = self.state.borrow_mut();
            st.task = None;
            st.pending.take()
        };
        self.downstream.offer(value.as_ref());
    }
}

impl<T: Clone + 'static> Observer<T> for ThrottleObserver<T> {
    fn on_change(&self, value: &T) {
        let mut st = self.inner.state.borrow_mut();
        st.pending = Some(value.clone());
        if st.task.is_some() {
            return;
        }

        let inner = self.inner.clone();
        let fire = move || inner.close_window();
        st.task = Some(if self.inner.window.is_zero() {
            scheduler::request_frame(fire)
        } else {
            scheduler::schedule_after(self.inner.window, fire)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::observer;
    use crate::scheduler::{ManualClock, run_due_timers, run_frame, set_clock};

    fn sink() -> (Rc<RefCell<Vec<i32>>>, Rc<dyn Observer<i32>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        (seen, Rc::new(observer(move |v: &i32| s.borrow_mut().push(*v))))
    }

    #[test]
    fn delivers_latest_value_when_window_closes() {
        let clock = ManualClock::new();
        set_clock(clock.clone());
        let (seen, down) = sink();
        let t = ThrottleObserver::new(down, Duration::from_millis(20));

        t.on_change(&1);
        clock.advance(Duration::from_millis(15));
        t.on_change(&2);
        assert!(t.is_pending());

        // the second value must not push the deadline out
        clock.advance(Duration::from_millis(5));
        run_due_timers();
        assert_eq!(*seen.borrow(), vec![2]);
        assert!(!t.is_pending());

        t.on_change(&3);
        clock.advance(Duration::from_millis(19));
        run_due_timers();
        assert_eq!(*seen.borrow(), vec![2]);
        clock.advance(Duration::from_millis(1));
        run_due_timers();
        assert_eq!(*seen.borrow(), vec![2, 3]);
    }

    #[test]
    fn zero_window_waits_for_next_frame() {
        let (seen, down) = sink();
        let t = ThrottleObserver::new(down, Duration::ZERO);

        t.on_change(&4);
        t.on_change(&5);
        assert!(seen.borrow().is_empty());
        assert_eq!(run_frame(), 1);
        assert_eq!(*seen.borrow(), vec![5]);
    }

    #[test]
    fn negative_window_is_rejected() {
        let (_, down) = sink();
        let err = ThrottleObserver::from_millis(down.clone(), -1).err();
        assert_eq!(err, Some(FlowError::InvalidWindow { millis: -1 }));

        let ok = ThrottleObserver::from_millis(down, 0).map(|t| t.window());
        assert_eq!(ok, Ok(Duration::ZERO));
    }
}
