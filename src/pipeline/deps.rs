//! Item dependencies: the parent-waits-for-child relation that orders folder
//! deletions after their contents.
//!
//! Edges only ever point from a folder to an item strictly beneath it, so the
//! graph is acyclic by construction and needs no cycle detection.

use std::collections::HashMap;
use std::sync::Mutex;

/// State of one parent-to-child edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeState {
    /// The child has not been processed yet.
    Pending,
    /// The child failed; the parent must not be processed.
    Fail,
}

/// How a child's processing ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    Fail,
    /// The child will be retried; the parent keeps waiting.
    Retry,
}

/// Whether a dependent key may be processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// No outstanding children.
    Ready,
    /// At least one child is still pending; requeue the dependent.
    Waiting,
    /// At least one child failed; skip the dependent and propagate.
    Poisoned,
}

/// Mutex-guarded dependency graph shared by the ingester, the crawlers, and
/// the processor workers.
#[derive(Default)]
pub struct ItemDependencies {
    edges: Mutex<HashMap<String, HashMap<String, EdgeState>>>,
}

impl ItemDependencies {
    pub fn new() -> ItemDependencies {
        ItemDependencies::default()
    }

    /// Insert an edge; idempotent, and never downgrades a resolved edge.
    pub fn add(&self, parent: &str, child: &str) {
        let mut edges = self.edges.lock().expect("dependency graph poisoned");
        edges
            .entry(parent.to_string())
            .or_default()
            .entry(child.to_string())
            .or_insert(EdgeState::Pending);
    }

    /// Resolve one edge. `Succeed` drops it, `Fail` poisons the parent,
    /// `Retry` leaves the child pending so the parent keeps waiting.
    pub fn remove(&self, parent: &str, child: &str, outcome: Outcome) {
        let mut edges = self.edges.lock().expect("dependency graph poisoned");
        let Some(children) = edges.get_mut(parent) else {
            return;
        };
        match outcome {
            Outcome::Succeed => {
                children.remove(child);
                if children.is_empty() {
                    edges.remove(parent);
                }
            }
            Outcome::Fail => {
                children.insert(child.to_string(), EdgeState::Fail);
            }
            Outcome::Retry => {
                children
                    .entry(child.to_string())
                    .or_insert(EdgeState::Pending);
            }
        }
    }

    /// Resolve every edge of a dependent at once (used when the dependent
    /// itself will never be processed this run).
    pub fn remove_all(&self, parent: &str, outcome: Outcome) {
        let children: Vec<String> = {
            let edges = self.edges.lock().expect("dependency graph poisoned");
            match edges.get(parent) {
                Some(children) => children.keys().cloned().collect(),
                None => return,
            }
        };
        for child in children {
            self.remove(parent, &child, outcome);
        }
    }

    /// Children a dependent is still waiting on (pending or failed).
    pub fn dependencies_of(&self, parent: &str) -> Vec<String> {
        let edges = self.edges.lock().expect("dependency graph poisoned");
        edges
            .get(parent)
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn readiness(&self, parent: &str) -> Readiness {
        let edges = self.edges.lock().expect("dependency graph poisoned");
        match edges.get(parent) {
            None => Readiness::Ready,
            Some(children) if children.is_empty() => Readiness::Ready,
            Some(children) => {
                if children.values().any(|s| *s == EdgeState::Fail) {
                    Readiness::Poisoned
                } else {
                    Readiness::Waiting
                }
            }
        }
    }

    /// True iff no outstanding children.
    pub fn is_ready(&self, parent: &str) -> bool {
        self.readiness(parent) == Readiness::Ready
    }

    /// True while any edge is still pending resolution.
    pub fn has_pending(&self) -> bool {
        let edges = self.edges.lock().expect("dependency graph poisoned");
        edges
            .values()
            .any(|children| children.values().any(|s| *s == EdgeState::Pending))
    }

    pub fn is_empty(&self) -> bool {
        let edges = self.edges.lock().expect("dependency graph poisoned");
        edges.is_empty()
    }

    pub fn clear(&self) {
        self.edges.lock().expect("dependency graph poisoned").clear();
    }
}
