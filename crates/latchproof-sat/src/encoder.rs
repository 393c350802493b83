//! Demand-driven Tseitin encoding of an and-inverter graph.

use std::collections::HashMap;

use latchproof_ir::{Edge, Node, NodeId, TransitionSystem};
use thiserror::Error;

use crate::lit::{Lit, Var};
use crate::solver::SatSolver;

#[derive(Debug, Error)]
pub enum EncodeError<E> {
    #[error("edge refers to node {0}, which the system does not contain")]
    MissingNode(NodeId),
    #[error("solver error: {0}")]
    Solver(E),
}

/// Node-to-variable table of one solver instance.
///
/// Only the fanin cone of requested edges is encoded, and nodes already in the
/// table are reused by later queries against the same solver.
#[derive(Debug, Default, Clone)]
pub struct ConeEncoder {
    vars: HashMap<NodeId, Var>,
}

impl ConeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var_of(&self, node: NodeId) -> Option<Var> {
        self.vars.get(&node).copied()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Drops the table; used together with a solver reset.
    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Literal for `edge`, encoding its fanin cone on first use.
    pub fn lit_for<S: SatSolver>(
        &mut self,
        solver: &mut S,
        ts: &TransitionSystem,
        edge: Edge,
    ) -> Result<Lit, EncodeError<S::Error>> {
        let var = self.encode_node(solver, ts, edge.node())?;
        Ok(Lit::new(var, edge.is_complemented()))
    }

    fn encode_node<S: SatSolver>(
        &mut self,
        solver: &mut S,
        ts: &TransitionSystem,
        root: NodeId,
    ) -> Result<Var, EncodeError<S::Error>> {
        if let Some(var) = self.var_of(root) {
            return Ok(var);
        }
        let mut stack = vec![root];
        while let Some(&id) = stack.last() {
            if self.vars.contains_key(&id) {
                stack.pop();
                continue;
            }
            let node = ts.node(id).copied().ok_or(EncodeError::MissingNode(id))?;
            match node {
                Node::Const => {
                    let v = solver.new_var();
                    solver
                        .add_clause(&[v.negative()])
                        .map_err(EncodeError::Solver)?;
                    self.vars.insert(id, v);
                    stack.pop();
                }
                Node::Input(_) | Node::Register(_) => {
                    self.vars.insert(id, solver.new_var());
                    stack.pop();
                }
                Node::And(a, b) => {
                    let pending: Vec<NodeId> = [a.node(), b.node()]
                        .into_iter()
                        .filter(|n| !self.vars.contains_key(n))
                        .collect();
                    if !pending.is_empty() {
                        stack.extend(pending);
                        continue;
                    }
                    let la = self.edge_lit(a);
                    let lb = self.edge_lit(b);
                    let v = solver.new_var();
                    let clauses: [&[Lit]; 3] =
                        [&[v.negative(), la], &[v.negative(), lb], &[v.positive(), !la, !lb]];
                    for clause in clauses {
                        solver.add_clause(clause).map_err(EncodeError::Solver)?;
                    }
                    self.vars.insert(id, v);
                    stack.pop();
                }
            }
        }
        Ok(self.vars[&root])
    }

    fn edge_lit(&self, edge: Edge) -> Lit {
        let var = self.vars[&edge.node()];
        Lit::new(var, edge.is_complemented())
    }
}
