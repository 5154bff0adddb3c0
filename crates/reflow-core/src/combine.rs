//! Flows computed from several parents.
//!
//! A combined flow has a value only while every parent has one. Any parent's
//! push recomputes the whole tuple from the parents' current values.

use smallvec::smallvec;

use crate::flow::Flow;

impl<T: Clone + 'static> Flow<T> {
    /// Combines this flow with `other`; see [`Flow::combine2`].
    pub fn combine<U, R>(&self, other: &Flow<U>, transform: impl Fn(&T, &U) -> R + 'static) -> Flow<R>
    where
        U: Clone + 'static,
        R: Clone + 'static,
    {
        Flow::combine2(self, other, transform)
    }

    // every parent push recomputes from all parents
    fn feed<R: Clone + 'static>(&self, child: &Flow<R>) {
        self.wire(child, |child, _| child.refresh());
    }
}

impl<R: Clone + 'static> Flow<R> {
    pub fn combine2<A, B>(a: &Flow<A>, b: &Flow<B>, transform: impl Fn(&A, &B) -> R + 'static) -> Flow<R>
    where
        A: Clone + 'static,
        B: Clone + 'static,
    {
        let compute = {
            let (a, b) = (a.clone(), b.clone());
            move || Some(transform(&a.get()?, &b.get()?))
        };
        let child = Flow::derived(smallvec![a.upstream(), b.upstream()], compute);
        a.feed(&child);
        b.feed(&child);
        child
    }

    pub fn combine3<A, B, C>(
        a: &Flow<A>,
        b: &Flow<B>,
        c: &Flow<C>,
        transform: impl Fn(&A, &B, &C) -> R + 'static,
    ) -> Flow<R>
    where
        A: Clone + 'static,
        B: Clone + 'static,
        C: Clone + 'static,
    {
        let compute = {
            let (a, b, c) = (a.clone(), b.clone(), c.clone());
            move || Some(transform(&a.get()?, &b.get()?, &c.get()?))
        };
        let child = Flow::derived(smallvec![a.upstream(), b.upstream(), c.upstream()], compute);
        a.feed(&child);
        b.feed(&child);
        c.feed(&child);
        child
    }

    pub fn combine4<A, B, C, D>(
        a: &Flow<A>,
        b: &Flow<B>,
        c: &Flow<C>,
        d: &Flow<D>,
        transform: impl Fn(&A, &B, &C, &D) -> R + 'static,
    ) -> Flow<R>
    where
        A: Clone + 'static,
        B: Clone + 'static,
        C: Clone + 'static,
        D: Clone + 'static,
    {
        let compute = {
            let (a, b, c, d) = (a.clone(), b.clone(), c.clone(), d.clone());
            move || Some(transform(&a.get()?, &b.get()?, &c.get()?, &d.get()?))
        };
        let parents = smallvec![a.upstream(), b.upstream(), c.upstream(), d.upstream()];
        let child = Flow::derived(parents, compute);
        a.feed(&child);
        b.feed(&child);
        c.feed(&child);
        d.feed(&child);
        child
    }

    /// Combines any number of same-typed flows; `transform` sees their values
    /// in the order given. With no flows there is nothing to derive from, and
    /// the result never holds a value.
    pub fn combine_list<T>(flows: &[Flow<T>], transform: impl Fn(&[T]) -> R + 'static) -> Flow<R>
    where
        T: Clone + 'static,
    {
        let compute = {
            let flows = flows.to_vec();
            move || {
                if flows.is_empty() {
                    return None;
                }
                let values = flows.iter().map(Flow::get).collect::<Option<Vec<T>>>()?;
                Some(transform(&values))
            }
        };
        let parents = flows.iter().map(Flow::upstream).collect();
        let child = Flow::derived(parents, compute);
        for f in flows {
            f.feed(&child);
        }
        child
    }
}
