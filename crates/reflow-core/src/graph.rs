//! Flow topology and the liveness query.
//!
//! Values live in the typed flow nodes; this arena only tracks what liveness
//! needs: who observes a node, whether it is forced reactive, and which
//! derived flows are wired to it.

use std::cell::RefCell;

use slotmap::{SecondaryMap, SlotMap, new_key_type};
use smallvec::SmallVec;

new_key_type! {
    /// Stable id of a flow in this thread's graph.
    pub struct NodeId;
}

#[derive(Default)]
struct Node {
    observers: usize,
    force_reactive: bool,
    parents: SmallVec<[NodeId; 2]>,
    children: SmallVec<[NodeId; 4]>,
}

#[derive(Default)]
struct FlowGraph {
    nodes: SlotMap<NodeId, Node>,
}

thread_local! {
    static GRAPH: RefCell<FlowGraph> = RefCell::new(FlowGraph::default());
}

impl FlowGraph {
    fn unlink(&mut self, child: NodeId) {
        let parents = match self.nodes.get_mut(child) {
            Some(node) => std::mem::take(&mut node.parents),
            None => return,
        };
        for p in parents {
            if let Some(parent) = self.nodes.get_mut(p) {
                parent.children.retain(|c| *c != child);
            }
        }
    }

    fn is_live(&self, id: NodeId) -> bool {
        let mut visited: SecondaryMap<NodeId, ()> = SecondaryMap::new();
        let mut stack: SmallVec<[NodeId; 8]> = SmallVec::new();
        stack.push(id);
        while let Some(n) = stack.pop() {
            if visited.insert(n, ()).is_some() {
                continue;
            }
            let Some(node) = self.nodes.get(n) else {
                continue;
            };
            if node.force_reactive || node.observers > 0 {
                return true;
            }
            stack.extend(node.children.iter().copied());
        }
        false
    }
}

/// Allocates a node and wires it below each of `parents`.
pub(crate) fn insert_node(parents: &[NodeId]) -> NodeId {
    GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        let id = g.nodes.insert(Node {
            parents: parents.iter().copied().collect(),
            ..Node::default()
        });
        for p in parents {
            if let Some(parent) = g.nodes.get_mut(*p) {
                if !parent.children.contains(&id) {
                    parent.children.push(id);
                }
            }
        }
        id
    })
}

/// Removes `child` from the child lists of all its parents.
pub(crate) fn detach(child: NodeId) {
    GRAPH.with(|g| g.borrow_mut().unlink(child));
}

/// Detaches and frees a node. Tolerates running during thread teardown.
pub(crate) fn remove_node(id: NodeId) {
    let _ = GRAPH.try_with(|g| {
        if let Ok(mut g) = g.try_borrow_mut() {
            g.unlink(id);
            g.nodes.remove(id);
        }
    });
}

pub(crate) fn add_observer(id: NodeId) {
    GRAPH.with(|g| {
        if let Some(node) = g.borrow_mut().nodes.get_mut(id) {
            node.observers += 1;
        }
    });
}

pub(crate) fn remove_observer(id: NodeId) {
    GRAPH.with(|g| {
        if let Some(node) = g.borrow_mut().nodes.get_mut(id) {
            node.observers = node.observers.saturating_sub(1);
        }
    });
}

pub(crate) fn set_force_reactive(id: NodeId) {
    GRAPH.with(|g| {
        if let Some(node) = g.borrow_mut().nodes.get_mut(id) {
            node.force_reactive = true;
        }
    });
}

/// A node is live when it is forced reactive, has an external observer, or
/// has a live descendant. Each node is visited at most once per query.
pub(crate) fn is_live(id: NodeId) -> bool {
    GRAPH.with(|g| g.borrow().is_live(id))
}

/// [`is_live`] that answers `None` instead of panicking when the graph is
/// gone (thread teardown) or already borrowed.
pub(crate) fn try_is_live(id: NodeId) -> Option<bool> {
    GRAPH
        .try_with(|g| g.try_borrow().ok().map(|g| g.is_live(id)))
        .ok()
        .flatten()
}

pub(crate) fn children(id: NodeId) -> SmallVec<[NodeId; 4]> {
    GRAPH.with(|g| {
        g.borrow()
            .nodes
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_follows_descendants() {
        let root = insert_node(&[]);
        let mid = insert_node(&[root]);
        let leaf = insert_node(&[mid]);
        let side = insert_node(&[root]);

        assert!(!is_live(root));
        add_observer(leaf);
        assert!(is_live(root));
        assert!(is_live(mid));
        assert!(!is_live(side));

        detach(leaf);
        assert!(!is_live(mid));
        assert!(is_live(leaf));

        set_force_reactive(side);
        assert!(is_live(root));
        remove_observer(leaf);
        assert!(!is_live(leaf));
    }

    #[test]
    fn diamond_is_walked_once_per_node() {
        let a = insert_node(&[]);
        let b = insert_node(&[a]);
        let c = insert_node(&[a]);
        let d = insert_node(&[b, c]);
        assert_eq!(children(b).as_slice(), &[d]);
        assert!(!is_live(a));

        add_observer(d);
        assert!(is_live(a));
        remove_node(d);
        assert!(!is_live(a));
        assert!(children(b).is_empty());
        assert!(children(c).is_empty());
        assert_eq!(try_is_live(a), Some(false));
        assert_eq!(try_is_live(d), Some(false));
    }
}
