//! Cooperative task queue for deferred flow work.
//!
//! Nothing here runs on its own: the host event loop calls
//! [`run_due_timers`] and [`run_frame`] (typically once per frame), and the
//! queued callbacks run on that same thread. The queue and the clock are
//! per-thread, matching the single-threaded flow graph.

use std::cell::{Cell, RefCell};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;

use web_time::{Duration, Instant};

/// Time source for timers.
pub trait Clock: 'static {
    fn now(&self) -> Instant;
}

pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    t: Rc<Cell<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(t: Instant) -> Self {
        Self {
            t: Rc::new(Cell::new(t)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.t.set(self.t.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.t.get()
    }
}

thread_local! {
    static CLOCK: RefCell<Option<Rc<dyn Clock>>> = const { RefCell::new(None) };
    static QUEUE: RefCell<TaskQueue> = RefCell::new(TaskQueue::default());
}

/// Install the clock used by this thread's timers. Without one, the system
/// clock is used.
pub fn set_clock(clock: impl Clock) {
    CLOCK.with(|c| *c.borrow_mut() = Some(Rc::new(clock)));
}

pub fn now() -> Instant {
    let clock = CLOCK.with(|c| c.borrow().clone());
    clock.map(|c| c.now()).unwrap_or_else(Instant::now)
}

/// Handle to a queued task. Dropping it does not cancel the task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    pending: Rc<Cell<bool>>,
}

impl TaskHandle {
    /// Cancels the task if it has not run yet. Safe to call more than once.
    pub fn cancel(&self) {
        self.pending.set(false);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }
}

struct Task {
    pending: Rc<Cell<bool>>,
    run: Box<dyn FnOnce()>,
}

impl Task {
    fn new(run: impl FnOnce() + 'static) -> (Self, TaskHandle) {
        let pending = Rc::new(Cell::new(true));
        let handle = TaskHandle {
            pending: pending.clone(),
        };
        (
            Self {
                pending,
                run: Box::new(run),
            },
            handle,
        )
    }

    /// Runs the task unless it was cancelled. Returns whether it ran.
    fn fire(self) -> bool {
        if self.pending.replace(false) {
            (self.run)();
            true
        } else {
            false
        }
    }
}

struct Timer {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Timer {}
impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct TaskQueue {
    timers: BinaryHeap<Reverse<Timer>>,
    frame: Vec<Task>,
    seq: u64,
}

impl TaskQueue {
    // drop cancelled timers sitting at the front
    fn prune(&mut self) {
        while self
            .timers
            .peek()
            .is_some_and(|Reverse(t)| !t.task.pending.get())
        {
            self.timers.pop();
        }
    }

    fn pop_due(&mut self, now: Instant) -> Option<Task> {
        self.prune();
        let due = matches!(self.timers.peek(), Some(Reverse(t)) if t.deadline <= now);
        if due {
            self.timers.pop().map(|Reverse(t)| t.task)
        } else {
            None
        }
    }
}

/// Queue `f` to run once `delay` has elapsed on this thread's clock.
pub fn schedule_after(delay: Duration, f: impl FnOnce() + 'static) -> TaskHandle {
    let deadline = now() + delay;
    let (task, handle) = Task::new(f);
    QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        let seq = q.seq;
        q.seq += 1;
        q.timers.push(Reverse(Timer {
            deadline,
            seq,
            task,
        }));
    });
    handle
}

/// Queue `f` for the next [`run_frame`].
pub fn request_frame(f: impl FnOnce() + 'static) -> TaskHandle {
    let (task, handle) = Task::new(f);
    QUEUE.with(|q| q.borrow_mut().frame.push(task));
    handle
}

/// Runs every timer whose deadline has passed, earliest first (ties in
/// submission order). Timers queued by a callback run in the same call if
/// they are already due. Returns how many callbacks ran.
pub fn run_due_timers() -> usize {
    let mut ran = 0;
    loop {
        let now = now();
        let Some(task) = QUEUE.with(|q| q.borrow_mut().pop_due(now)) else {
            break;
        };
        if task.fire() {
            ran += 1;
        }
    }
    if ran > 0 {
        log::trace!("scheduler: ran {ran} timer(s)");
    }
    ran
}

/// Runs the frame callbacks queued before this call. Callbacks requested while
/// the frame runs wait for the next one. Returns how many callbacks ran.
pub fn run_frame() -> usize {
    let tasks = QUEUE.with(|q| std::mem::take(&mut q.borrow_mut().frame));
    tasks.into_iter().map(Task::fire).filter(|ran| *ran).count()
}

/// Deadline of the earliest live timer, if any.
pub fn next_deadline() -> Option<Instant> {
    QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        q.prune();
        q.timers.peek().map(|Reverse(t)| t.deadline)
    })
}

/// Number of queued timers and frame callbacks that have not run or been
/// cancelled.
pub fn pending_tasks() -> usize {
    QUEUE.with(|q| {
        let q = q.borrow();
        let timers = q
            .timers
            .iter()
            .filter(|Reverse(t)| t.task.pending.get())
            .count();
        let frame = q.frame.iter().filter(|t| t.pending.get()).count();
        timers + frame
    })
}
