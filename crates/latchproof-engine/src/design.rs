//! The checked system, normalized once per run.

use std::collections::VecDeque;

use latchproof_ir::normalize::{normalize, NormalizationMap};
use latchproof_ir::{Edge, Node, NodeId, TransitionSystem};
use sha2::{Digest, Sha256};

use crate::error::PdrError;

/// Read-only view of the system under verification.
///
/// Holds the user's system, its zero-reset normalization, and the tables the
/// engine consults on every query.
#[derive(Debug, Clone)]
pub struct Design {
    original: TransitionSystem,
    system: TransitionSystem,
    map: NormalizationMap,
    register_edges: Vec<Edge>,
    next_edges: Vec<Edge>,
    fanouts: Vec<Vec<NodeId>>,
    fingerprint: String,
}

impl Design {
    pub fn new(ts: &TransitionSystem) -> Result<Self, PdrError> {
        let normalized = normalize(ts)?;
        let system = normalized.system;
        let mut register_edges = Vec::with_capacity(system.num_registers());
        let mut next_edges = Vec::with_capacity(system.num_registers());
        for (r, reg) in system.registers().iter().enumerate() {
            register_edges.push(Edge::new(reg.node, false));
            let next = system.next_state(r).ok_or_else(|| {
                PdrError::MalformedInput(format!("register '{}' has no next state", reg.name))
            })?;
            next_edges.push(next);
        }
        let fingerprint = sha256_hex_bytes(&serde_json::to_vec(&system)?);
        Ok(Self {
            original: ts.clone(),
            fanouts: system.fanouts(),
            system,
            map: normalized.map,
            register_edges,
            next_edges,
            fingerprint,
        })
    }

    /// The user's system, before reset normalization.
    pub fn original(&self) -> &TransitionSystem {
        &self.original
    }

    /// The zero-reset system the engine works on.
    pub fn system(&self) -> &TransitionSystem {
        &self.system
    }

    pub fn map(&self) -> &NormalizationMap {
        &self.map
    }

    pub fn num_registers(&self) -> usize {
        self.register_edges.len()
    }

    pub fn num_inputs(&self) -> usize {
        self.system.num_inputs()
    }

    pub fn num_outputs(&self) -> usize {
        self.system.num_outputs()
    }

    pub fn register_edge(&self, reg: usize) -> Edge {
        self.register_edges[reg]
    }

    pub fn next_edge(&self, reg: usize) -> Edge {
        self.next_edges[reg]
    }

    pub fn output_edge(&self, output: usize) -> Edge {
        self.system.outputs()[output].edge
    }

    pub fn output_name(&self, output: usize) -> &str {
        &self.system.outputs()[output].name
    }

    pub fn fanouts(&self) -> &[Vec<NodeId>] {
        &self.fanouts
    }

    /// SHA-256 over the serialized normalized system.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Registers read combinationally by `edge`.
    pub fn register_support(&self, edge: Edge) -> Vec<usize> {
        let mut seen = vec![false; self.system.num_nodes()];
        let mut stack = vec![edge.node()];
        let mut regs = Vec::new();
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            match self.system.node(id) {
                Some(Node::Register(r)) => regs.push(*r),
                Some(Node::And(a, b)) => {
                    stack.push(a.node());
                    stack.push(b.node());
                }
                _ => {}
            }
        }
        regs.sort_unstable();
        regs
    }

    /// Sequential distance of every register from the outputs' cones,
    /// turned into a rank below `1 << shift` where closer registers rank
    /// higher.
    pub fn structural_rank(&self, shift: u32) -> Vec<u64> {
        let n = self.num_registers();
        let mut dist = vec![usize::MAX; n];
        let mut queue = VecDeque::new();
        for o in 0..self.num_outputs() {
            for r in self.register_support(self.output_edge(o)) {
                if dist[r] == usize::MAX {
                    dist[r] = 0;
                    queue.push_back(r);
                }
            }
        }
        while let Some(r) = queue.pop_front() {
            for s in self.register_support(self.next_edges[r]) {
                if dist[s] == usize::MAX {
                    dist[s] = dist[r] + 1;
                    queue.push_back(s);
                }
            }
        }
        let cap = (1u64 << shift).saturating_sub(1);
        dist.iter()
            .map(|&d| (n.saturating_sub(d.min(n)) as u64).min(cap))
            .collect()
    }
}

/// Lowercase hexadecimal SHA-256 digest.
pub fn sha256_hex_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
