//! Three-valued simulation used to shrink predecessor states.

use std::collections::BTreeSet;

use latchproof_ir::{Edge, Node, NodeId, TransitionSystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ternary {
    Zero,
    One,
    X,
}

impl Ternary {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Ternary::One
        } else {
            Ternary::Zero
        }
    }

    pub fn negate_if(self, flip: bool) -> Self {
        match (self, flip) {
            (Ternary::Zero, true) => Ternary::One,
            (Ternary::One, true) => Ternary::Zero,
            (v, _) => v,
        }
    }

    pub fn and(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::Zero, _) | (_, Ternary::Zero) => Ternary::Zero,
            (Ternary::One, Ternary::One) => Ternary::One,
            _ => Ternary::X,
        }
    }
}

/// Node-value table reused across minimizations of the same system.
#[derive(Debug, Default)]
pub struct TernarySim {
    values: Vec<Ternary>,
    undo: Vec<(NodeId, Ternary)>,
}

impl TernarySim {
    pub fn new() -> Self {
        Self::default()
    }

    fn edge(&self, edge: Edge) -> Ternary {
        self.values[edge.node().index()].negate_if(edge.is_complemented())
    }

    fn load(&mut self, ts: &TransitionSystem, registers: &[bool], inputs: &[bool]) {
        self.values.clear();
        for node in ts.nodes() {
            let v = match *node {
                Node::Const => Ternary::Zero,
                Node::Input(i) => Ternary::from_bool(inputs.get(i).copied().unwrap_or(false)),
                Node::Register(r) => {
                    Ternary::from_bool(registers.get(r).copied().unwrap_or(false))
                }
                Node::And(a, b) => self.edge(a).and(self.edge(b)),
            };
            self.values.push(v);
        }
    }

    /// Sets `start` to X and re-evaluates its fanout cone in index order.
    fn propagate_x(&mut self, ts: &TransitionSystem, fanouts: &[Vec<NodeId>], start: NodeId) {
        self.undo.clear();
        self.undo.push((start, self.values[start.index()]));
        self.values[start.index()] = Ternary::X;
        let mut pending: BTreeSet<NodeId> = fanouts[start.index()].iter().copied().collect();
        while let Some(id) = pending.pop_first() {
            let Some(Node::And(a, b)) = ts.node(id).copied() else {
                continue;
            };
            let value = self.edge(a).and(self.edge(b));
            let old = self.values[id.index()];
            if value != old {
                self.undo.push((id, old));
                self.values[id.index()] = value;
                pending.extend(fanouts[id.index()].iter().copied());
            }
        }
    }

    fn rollback(&mut self) {
        while let Some((id, old)) = self.undo.pop() {
            self.values[id.index()] = old;
        }
    }

    /// Registers whose values are needed to keep every target edge at its
    /// required value.
    ///
    /// `registers` and `inputs` must satisfy all targets. Registers are tried
    /// in `order`; inputs stay concrete. Returns one flag per register.
    pub fn minimize(
        &mut self,
        ts: &TransitionSystem,
        fanouts: &[Vec<NodeId>],
        registers: &[bool],
        inputs: &[bool],
        targets: &[(Edge, bool)],
        order: &[usize],
    ) -> Vec<bool> {
        self.load(ts, registers, inputs);
        debug_assert!(targets
            .iter()
            .all(|&(e, v)| self.edge(e) == Ternary::from_bool(v)));
        let mut kept = vec![true; registers.len()];
        for &r in order {
            let Some(edge) = ts.register_edge(r) else {
                continue;
            };
            self.propagate_x(ts, fanouts, edge.node());
            if targets.iter().any(|&(e, _)| self.edge(e) == Ternary::X) {
                self.rollback();
            } else {
                kept[r] = false;
            }
        }
        kept
    }
}
