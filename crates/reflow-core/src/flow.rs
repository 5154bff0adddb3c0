//! The flow node: cache, push propagation, pull evaluation.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::{SmallVec, smallvec};
use web_time::Duration;

use crate::effects::Dispose;
use crate::error::FlowError;
use crate::graph::{self, NodeId};
use crate::lifecycle::Lifecycle;
use crate::observer::{CallbackObserver, Observer};
use crate::throttle::{ThrottleObserver, window_from_millis};

pub type ObserverId = u64;

/// A cloneable handle to one value in the flow graph.
///
/// Root flows (made with [`Flow::new`], [`Flow::with_value`] or [`flow`]) are
/// assigned by producers. Derived flows come out of combinators and are
/// read-only. A derived flow is kept up to date by pushes only while it is
/// live (observed, forced reactive, or feeding a live flow); otherwise
/// [`get`](Flow::get) computes it from its parents on demand.
pub struct Flow<T: 'static> {
    pub(crate) inner: Rc<FlowInner<T>>,
}

pub(crate) struct FlowInner<T: 'static> {
    id: NodeId,
    derivation: Option<Derivation<T>>,
    state: RefCell<FlowState<T>>,
}

struct FlowState<T: 'static> {
    cached: Option<T>,
    next_observer: ObserverId,
    observers: Vec<(ObserverId, Rc<dyn Observer<T>>)>,
    edges: SmallVec<[(NodeId, Rc<dyn Observer<T>>); 2]>,
}

/// Parents of a derived flow plus the function that combines their values.
/// `compute` returns `None` when any parent is absent.
pub(crate) struct Derivation<T> {
    parents: SmallVec<[Rc<dyn Upstream>; 2]>,
    compute: Box<dyn Fn() -> Option<T>>,
}

/// Type-erased view of a parent, enough to unhook a child from it.
pub(crate) trait Upstream {
    fn node_id(&self) -> NodeId;
    fn drop_edge(&self, child: NodeId);
    /// Forgets the cache of a derived flow that is no longer live, then does
    /// the same for its parents. Stops at the first live or root flow.
    fn release(&self);
}

impl<T: 'static> Upstream for FlowInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn drop_edge(&self, child: NodeId) {
        let removed: SmallVec<[_; 2]> = {
            let mut st = self.state.borrow_mut();
            let (gone, kept) = std::mem::take(&mut st.edges)
                .into_iter()
                .partition(|(c, _)| *c == child);
            st.edges = kept;
            gone
        };
        drop(removed);
    }

    fn release(&self) {
        let Some(d) = &self.derivation else {
            return;
        };
        // unknown liveness (thread teardown) leaves the cache alone
        if graph::try_is_live(self.id) != Some(false) {
            return;
        }
        let stale = self
            .state
            .try_borrow_mut()
            .ok()
            .and_then(|mut st| st.cached.take());
        drop(stale);
        for p in &d.parents {
            p.release();
        }
    }
}

impl<T: 'static> Drop for FlowInner<T> {
    fn drop(&mut self) {
        let parents = self
            .derivation
            .as_ref()
            .map(|d| &d.parents[..])
            .unwrap_or_default();
        for p in parents {
            p.drop_edge(self.id);
        }
        graph::remove_node(self.id);
        for p in parents {
            p.release();
        }
    }
}

impl<T: 'static> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Default for Flow<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.state.borrow();
        f.debug_struct("Flow")
            .field("id", &self.inner.id)
            .field("root", &self.inner.derivation.is_none())
            .field("cached", &st.cached)
            .field("observers", &st.observers.len())
            .field("edges", &st.edges.len())
            .finish()
    }
}

/// Shorthand for [`Flow::with_value`].
pub fn flow<T: Clone + 'static>(value: T) -> Flow<T> {
    Flow::with_value(value)
}

impl<T: Clone + 'static> Flow<T> {
    /// An empty root flow.
    pub fn new() -> Self {
        Self::root(None)
    }

    /// A root flow seeded with `value`.
    pub fn with_value(value: T) -> Self {
        Self::root(Some(value))
    }

    fn root(cached: Option<T>) -> Self {
        Self::from_parts(graph::insert_node(&[]), None, cached)
    }

    pub(crate) fn derived(
        parents: SmallVec<[Rc<dyn Upstream>; 2]>,
        compute: impl Fn() -> Option<T> + 'static,
    ) -> Self {
        let ids: SmallVec<[NodeId; 2]> = parents.iter().map(|p| p.node_id()).collect();
        let derivation = Derivation {
            parents,
            compute: Box::new(compute),
        };
        Self::from_parts(graph::insert_node(&ids), Some(derivation), None)
    }

    fn from_parts(id: NodeId, derivation: Option<Derivation<T>>, cached: Option<T>) -> Self {
        Self {
            inner: Rc::new(FlowInner {
                id,
                derivation,
                state: RefCell::new(FlowState {
                    cached,
                    next_observer: 0,
                    observers: Vec::new(),
                    edges: SmallVec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn is_root(&self) -> bool {
        self.inner.derivation.is_none()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The current value.
    ///
    /// Returns the cache when it holds a value. Otherwise a root yields `None`
    /// and a derived flow is computed from its parents' current values; that
    /// result is not cached, so repeated reads recompute.
    pub fn get(&self) -> Option<T> {
        let cached = self.inner.state.borrow().cached.clone();
        if cached.is_some() {
            return cached;
        }
        self.inner.derivation.as_ref().and_then(|d| (d.compute)())
    }

    /// Assigns a root flow and pushes the value through the live graph.
    pub fn set(&self, value: impl Into<Option<T>>) -> Result<(), FlowError> {
        if !self.is_root() {
            return Err(FlowError::ImmutableWrite);
        }
        let value = value.into().ok_or(FlowError::AbsentValue)?;
        self.push(Some(value));
        Ok(())
    }

    /// Stores `value` and delivers it: to every external observer, and to each
    /// internal edge whose child is live. An absent value changes nothing.
    ///
    /// A dead derived flow is not kept current, so it does not cache the
    /// value (a throttle window can close after its flow went dead).
    pub(crate) fn push(&self, value: Option<T>) {
        let Some(value) = value else {
            return;
        };
        let keep = self.is_root() || graph::is_live(self.inner.id);
        let (observers, edges) = {
            let mut st = self.inner.state.borrow_mut();
            if keep {
                st.cached = Some(value.clone());
            }
            let observers: SmallVec<[Rc<dyn Observer<T>>; 4]> =
                st.observers.iter().map(|(_, o)| o.clone()).collect();
            (observers, st.edges.clone())
        };

        for o in &observers {
            o.offer(Some(&value));
        }
        for (child, edge) in &edges {
            if graph::is_live(*child) {
                edge.offer(Some(&value));
            } else {
                log::trace!("flow {:?}: child {child:?} is dead, not pushed", self.inner.id);
            }
        }
    }

    /// Recomputes a derived flow from its parents and pushes the result.
    pub(crate) fn refresh(&self) {
        let value = self.inner.derivation.as_ref().and_then(|d| (d.compute)());
        self.push(value);
    }

    #[cfg(test)]
    pub(crate) fn cached(&self) -> Option<T> {
        self.inner.state.borrow().cached.clone()
    }

    pub(crate) fn cache_matches(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.inner.state.borrow().cached.as_ref() == Some(value)
    }

    pub(crate) fn upstream(&self) -> Rc<dyn Upstream> {
        self.inner.clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<FlowInner<T>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn add_edge(&self, child: NodeId, edge: Rc<dyn Observer<T>>) {
        let mut st = self.inner.state.borrow_mut();
        match st.edges.iter_mut().find(|(c, _)| *c == child) {
            Some(slot) => slot.1 = edge,
            None => st.edges.push((child, edge)),
        }
    }

    /// Wires `child` below this flow; `react` sees every value pushed here
    /// while the child is live.
    pub(crate) fn wire<R: Clone + 'static>(
        &self,
        child: &Flow<R>,
        react: impl Fn(&Flow<R>, &T) + 'static,
    ) {
        let weak = child.downgrade();
        let edge = CallbackObserver::new(move |v: &T| {
            if let Some(inner) = weak.upgrade() {
                react(&Flow { inner }, v);
            }
        });
        self.add_edge(child.id(), Rc::new(edge));
    }

    /// Live when forced reactive, observed, or feeding a live flow.
    pub fn is_live(&self) -> bool {
        graph::is_live(self.inner.id)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.state.borrow().observers.len()
    }

    /// Number of derived flows currently wired below this one.
    pub fn child_count(&self) -> usize {
        graph::children(self.inner.id).len()
    }

    fn add_observer(&self, observer: Rc<dyn Observer<T>>) -> ObserverId {
        let id = {
            let mut st = self.inner.state.borrow_mut();
            let id = st.next_observer;
            st.next_observer += 1;
            st.observers.push((id, observer));
            id
        };
        graph::add_observer(self.inner.id);
        id
    }

    fn remove_observer(&self, id: ObserverId) {
        let removed = {
            let mut st = self.inner.state.borrow_mut();
            let pos = st.observers.iter().position(|(o, _)| *o == id);
            pos.map(|i| st.observers.remove(i))
        };
        if removed.is_none() {
            return;
        }
        graph::remove_observer(self.inner.id);
        // Dead derived flows stop receiving pushes, so their caches would go
        // stale; that includes ancestors that were live only through this
        // one. Roots keep theirs: there is nothing to pull a root from.
        self.inner.release();
        drop(removed);
    }

    /// Calls `callback` with every value this flow takes while `owner` is
    /// active.
    ///
    /// Does nothing when `owner` is inactive. Otherwise the current value, if
    /// any, is cached and delivered right away, and the observation ends when
    /// `owner` stops. The owner keeps this flow alive until then.
    pub fn observe(&self, owner: &impl Lifecycle, callback: impl Fn(&T) + 'static) {
        if !owner.is_active() {
            log::trace!("flow {:?}: owner inactive, observe ignored", self.inner.id);
            return;
        }
        let observer: Rc<dyn Observer<T>> = Rc::new(CallbackObserver::new(callback));
        let id = self.add_observer(observer.clone());

        let flow = self.clone();
        owner.add_observer(Dispose::new(move || flow.remove_observer(id)));

        // live from here on, so a pulled value is now trustworthy
        let current = self.get();
        self.inner.state.borrow_mut().cached.clone_from(&current);
        observer.offer(current.as_ref());
    }

    /// Treats this flow as live even without observers and refreshes its
    /// cache from the parents, so [`get`](Flow::get) stays cheap and current.
    /// Idempotent.
    pub fn force_reactive(&self) {
        graph::set_force_reactive(self.inner.id);
        let value = self.get();
        self.inner.state.borrow_mut().cached = value;
    }

    /// Unhooks this flow from its parents: they stop pushing to it. The flow
    /// keeps its parent handles, so [`get`](Flow::get) still pulls through
    /// them. No effect on a root.
    pub fn stop_receiving_updates(&self) {
        let Some(d) = &self.inner.derivation else {
            return;
        };
        for p in &d.parents {
            p.drop_edge(self.inner.id);
        }
        graph::detach(self.inner.id);
        for p in &d.parents {
            p.release();
        }
        log::debug!("flow {:?}: detached from {} parent(s)", self.inner.id, d.parents.len());
    }

    /// A derived flow applying `transform` to every value of this one.
    pub fn map<R: Clone + 'static>(&self, transform: impl Fn(&T) -> R + 'static) -> Flow<R> {
        let transform = Rc::new(transform);
        let compute = {
            let parent = self.clone();
            let transform = transform.clone();
            move || parent.get().map(|v| transform(&v))
        };
        let child = Flow::derived(smallvec![self.upstream()], compute);
        self.wire(&child, move |child, v| child.push(Some(transform(v))));
        child
    }

    /// A derived flow that skips values equal to the one it already holds.
    /// The first value always passes.
    pub fn distinct_until_changed(&self) -> Flow<T>
    where
        T: PartialEq,
    {
        let child = self.passthrough();
        self.wire(&child, |child, v| {
            if !child.cache_matches(v) {
                child.push(Some(v.clone()));
            }
        });
        child
    }

    /// A derived flow updated at most once per `window`, with the latest value
    /// seen in that window. A zero window samples once per frame.
    pub fn throttle(&self, window: Duration) -> Flow<T> {
        let child = self.passthrough();
        let weak = child.downgrade();
        let deliver = CallbackObserver::new(move |v: &T| {
            if let Some(inner) = weak.upgrade() {
                Flow { inner }.push(Some(v.clone()));
            }
        });
        let edge = ThrottleObserver::new(Rc::new(deliver), window);
        self.add_edge(child.id(), Rc::new(edge));
        child
    }

    /// [`throttle`](Flow::throttle) with a window in signed milliseconds.
    pub fn throttle_millis(&self, millis: i64) -> Result<Flow<T>, FlowError> {
        Ok(self.throttle(window_from_millis(millis)?))
    }

    // Derived flow whose pulled value is this flow's value; the caller wires it.
    fn passthrough(&self) -> Flow<T> {
        let parent = self.clone();
        Flow::derived(smallvec![self.upstream()], move || parent.get())
    }
}
