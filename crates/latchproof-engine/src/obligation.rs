//! Proof obligations and their queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::cube::Cube;

/// A cube that must be shown unreachable within `frame` steps.
///
/// Obligations form chains through `parent` back to the bad cube that
/// started them; a chain reaching frame 0 is a counterexample.
#[derive(Debug)]
pub struct ProofObligation {
    pub frame: usize,
    pub priority: u64,
    pub cube: Cube,
    pub parent: Option<Rc<ProofObligation>>,
}

impl ProofObligation {
    pub fn new(
        frame: usize,
        priority: u64,
        cube: Cube,
        parent: Option<Rc<ProofObligation>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            frame,
            priority,
            cube,
            parent,
        })
    }

    /// Same cube and parent, queued again at another frame.
    pub fn rescheduled(&self, frame: usize, priority: u64) -> Rc<Self> {
        Self::new(frame, priority, self.cube.clone(), self.parent.clone())
    }

    /// Obligations from `self` to the root, in that order.
    pub fn chain(self: &Rc<Self>) -> Vec<Rc<ProofObligation>> {
        let mut chain = vec![Rc::clone(self)];
        while let Some(parent) = chain.last().and_then(|o| o.parent.clone()) {
            chain.push(parent);
        }
        chain
    }
}

impl Drop for ProofObligation {
    // Long chains would otherwise drop recursively.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(rc) = next {
            match Rc::try_unwrap(rc) {
                Ok(mut owned) => next = owned.parent.take(),
                Err(_) => break,
            }
        }
    }
}

struct Queued(Rc<ProofObligation>);

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: lower frame first, then higher priority.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .frame
            .cmp(&self.0.frame)
            .then_with(|| self.0.priority.cmp(&other.0.priority))
    }
}

/// Pending obligations, lowest frame first and newest first within a frame.
#[derive(Default)]
pub struct ObligationQueue {
    heap: BinaryHeap<Queued>,
}

impl ObligationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, obligation: Rc<ProofObligation>) {
        self.heap.push(Queued(obligation));
    }

    pub fn head(&self) -> Option<&Rc<ProofObligation>> {
        self.heap.peek().map(|q| &q.0)
    }

    pub fn pop(&mut self) -> Option<Rc<ProofObligation>> {
        self.heap.pop().map(|q| q.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl std::fmt::Debug for ObligationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObligationQueue")
            .field("len", &self.heap.len())
            .finish()
    }
}
