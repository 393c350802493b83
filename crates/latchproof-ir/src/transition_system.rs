//! And-inverter graph with registers.
//!
//! Node 0 is the constant false node. Every other node is a primary input, a
//! register output or a two-input AND gate whose fanins are complementable
//! [`Edge`]s to nodes created earlier, so the node table is always in
//! topological order.

use std::collections::HashMap;
use std::fmt;
use std::ops::Not;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::IrError;

/// Index of a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A possibly complemented reference to a node, encoded as `2 * node + complement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Edge(u32);

impl Edge {
    pub const FALSE: Edge = Edge(0);
    pub const TRUE: Edge = Edge(1);

    pub fn new(node: NodeId, complemented: bool) -> Self {
        Edge(node.0 * 2 + complemented as u32)
    }

    pub fn from_raw(raw: u32) -> Self {
        Edge(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn node(self) -> NodeId {
        NodeId(self.0 >> 1)
    }

    pub fn is_complemented(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn is_const(self) -> bool {
        self.0 < 2
    }

    /// Strips the complement bit.
    pub fn regular(self) -> Edge {
        Edge(self.0 & !1)
    }

    /// Complements the edge when `flip` holds.
    pub fn xor_complement(self, flip: bool) -> Edge {
        Edge(self.0 ^ flip as u32)
    }
}

impl Not for Edge {
    type Output = Edge;

    fn not(self) -> Edge {
        Edge(self.0 ^ 1)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_complemented() {
            write!(f, "!{}", self.node())
        } else {
            write!(f, "{}", self.node())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Const,
    Input(usize),
    Register(usize),
    And(Edge, Edge),
}

/// Value a register holds in the initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reset {
    Zero,
    One,
    /// Unconstrained: any initial value is possible.
    Free,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub name: String,
    pub node: NodeId,
    pub next: Option<Edge>,
    pub reset: Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub node: NodeId,
}

/// A monitored signal. The property holds while the edge stays false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub edge: Edge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "SystemTables")]
pub struct TransitionSystem {
    nodes: Vec<Node>,
    inputs: Vec<Input>,
    registers: Vec<Register>,
    outputs: Vec<Output>,
    names: IndexMap<String, Edge>,
    #[serde(skip)]
    strash: HashMap<(Edge, Edge), NodeId>,
}

/// Serialized form of a [`TransitionSystem`]; the AND table is rebuilt on load.
#[derive(Deserialize)]
struct SystemTables {
    nodes: Vec<Node>,
    inputs: Vec<Input>,
    registers: Vec<Register>,
    outputs: Vec<Output>,
    names: IndexMap<String, Edge>,
}

impl From<SystemTables> for TransitionSystem {
    fn from(tables: SystemTables) -> Self {
        let strash = tables
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| match *node {
                Node::And(a, b) => Some(((a, b), NodeId(idx as u32))),
                _ => None,
            })
            .collect();
        Self {
            nodes: tables.nodes,
            inputs: tables.inputs,
            registers: tables.registers,
            outputs: tables.outputs,
            names: tables.names,
            strash,
        }
    }
}

impl Default for TransitionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionSystem {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::Const],
            inputs: Vec::new(),
            registers: Vec::new(),
            outputs: Vec::new(),
            names: IndexMap::new(),
            strash: HashMap::new(),
        }
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn claim_name(&mut self, name: &str, edge: Edge) -> Result<(), IrError> {
        if self.names.contains_key(name) {
            return Err(IrError::DuplicateName(name.to_string()));
        }
        self.names.insert(name.to_string(), edge);
        Ok(())
    }

    pub fn add_input(&mut self, name: impl Into<String>) -> Result<Edge, IrError> {
        let name = name.into();
        let edge = Edge::new(NodeId(self.nodes.len() as u32), false);
        self.claim_name(&name, edge)?;
        let node = self.push_node(Node::Input(self.inputs.len()));
        self.inputs.push(Input { name, node });
        Ok(edge)
    }

    /// Adds a register without a next-state function; see [`Self::set_next`].
    pub fn add_register(&mut self, name: impl Into<String>, reset: Reset) -> Result<Edge, IrError> {
        let name = name.into();
        let edge = Edge::new(NodeId(self.nodes.len() as u32), false);
        self.claim_name(&name, edge)?;
        let node = self.push_node(Node::Register(self.registers.len()));
        self.registers.push(Register {
            name,
            node,
            next: None,
            reset,
        });
        Ok(edge)
    }

    pub fn set_next(&mut self, register: Edge, next: Edge) -> Result<(), IrError> {
        if next.node().index() >= self.nodes.len() {
            return Err(IrError::DanglingEdge(next.raw()));
        }
        match self.nodes.get(register.node().index()) {
            Some(Node::Register(r)) if !register.is_complemented() => {
                let r = *r;
                self.registers[r].next = Some(next);
                Ok(())
            }
            _ => Err(IrError::NotARegister(register.raw())),
        }
    }

    pub fn add_output(&mut self, name: impl Into<String>, edge: Edge) -> Result<usize, IrError> {
        let name = name.into();
        if edge.node().index() >= self.nodes.len() {
            return Err(IrError::DanglingEdge(edge.raw()));
        }
        self.claim_name(&name, edge)?;
        self.outputs.push(Output { name, edge });
        Ok(self.outputs.len() - 1)
    }

    /// Structurally hashed AND with constant folding.
    pub fn and(&mut self, a: Edge, b: Edge) -> Edge {
        if a == Edge::FALSE || b == Edge::FALSE || a == !b {
            return Edge::FALSE;
        }
        if a == Edge::TRUE || a == b {
            return b;
        }
        if b == Edge::TRUE {
            return a;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&node) = self.strash.get(&key) {
            return Edge::new(node, false);
        }
        let node = self.push_node(Node::And(key.0, key.1));
        self.strash.insert(key, node);
        Edge::new(node, false)
    }

    pub fn or(&mut self, a: Edge, b: Edge) -> Edge {
        !self.and(!a, !b)
    }

    pub fn xor(&mut self, a: Edge, b: Edge) -> Edge {
        let left = self.and(a, !b);
        let right = self.and(!a, b);
        self.or(left, right)
    }

    /// `sel ? then : otherwise`
    pub fn mux(&mut self, sel: Edge, then: Edge, otherwise: Edge) -> Edge {
        let left = self.and(sel, then);
        let right = self.and(!sel, otherwise);
        self.or(left, right)
    }

    pub fn and_all(&mut self, edges: impl IntoIterator<Item = Edge>) -> Edge {
        edges
            .into_iter()
            .fold(Edge::TRUE, |acc, edge| self.and(acc, edge))
    }

    pub fn or_all(&mut self, edges: impl IntoIterator<Item = Edge>) -> Edge {
        edges
            .into_iter()
            .fold(Edge::FALSE, |acc, edge| self.or(acc, edge))
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_registers(&self) -> usize {
        self.registers.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn lookup(&self, name: &str) -> Option<Edge> {
        self.names.get(name).copied()
    }

    pub fn input_edge(&self, index: usize) -> Option<Edge> {
        self.inputs.get(index).map(|i| Edge::new(i.node, false))
    }

    pub fn register_edge(&self, index: usize) -> Option<Edge> {
        self.registers.get(index).map(|r| Edge::new(r.node, false))
    }

    pub fn next_state(&self, index: usize) -> Option<Edge> {
        self.registers.get(index).and_then(|r| r.next)
    }

    /// Register index behind a node, if it is a register output.
    pub fn register_of(&self, node: NodeId) -> Option<usize> {
        match self.nodes.get(node.index()) {
            Some(Node::Register(r)) => Some(*r),
            _ => None,
        }
    }

    /// Input index behind a node, if it is a primary input.
    pub fn input_of(&self, node: NodeId) -> Option<usize> {
        match self.nodes.get(node.index()) {
            Some(Node::Input(i)) => Some(*i),
            _ => None,
        }
    }

    /// For every node, the AND gates that read it.
    pub fn fanouts(&self) -> Vec<Vec<NodeId>> {
        let mut fanouts = vec![Vec::new(); self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::And(a, b) = node {
                let id = NodeId(idx as u32);
                fanouts[a.node().index()].push(id);
                if b.node() != a.node() {
                    fanouts[b.node().index()].push(id);
                }
            }
        }
        fanouts
    }

    /// Checks the structural invariants the checker relies on.
    pub fn validate(&self) -> Result<(), IrError> {
        if self.nodes.first() != Some(&Node::Const) {
            return Err(IrError::InconsistentTable("constant"));
        }
        for (idx, node) in self.nodes.iter().enumerate().skip(1) {
            match *node {
                Node::Const => return Err(IrError::InconsistentTable("constant")),
                Node::Input(i) => {
                    if self.inputs.get(i).map(|inp| inp.node.index()) != Some(idx) {
                        return Err(IrError::InconsistentTable("input"));
                    }
                }
                Node::Register(r) => {
                    if self.registers.get(r).map(|reg| reg.node.index()) != Some(idx) {
                        return Err(IrError::InconsistentTable("register"));
                    }
                }
                Node::And(a, b) => {
                    for fanin in [a, b] {
                        if fanin.node().index() >= idx {
                            return Err(IrError::ForwardReference {
                                node: idx as u32,
                                fanin: fanin.node().0,
                            });
                        }
                    }
                }
            }
        }
        for input in &self.inputs {
            if !matches!(self.node(input.node), Some(Node::Input(_))) {
                return Err(IrError::InconsistentTable("input"));
            }
        }
        for register in &self.registers {
            if !matches!(self.node(register.node), Some(Node::Register(_))) {
                return Err(IrError::InconsistentTable("register"));
            }
            let next = register
                .next
                .ok_or_else(|| IrError::MissingNextState(register.name.clone()))?;
            if next.node().index() >= self.nodes.len() {
                return Err(IrError::DanglingEdge(next.raw()));
            }
        }
        if self.outputs.is_empty() {
            return Err(IrError::NoOutputs);
        }
        for output in &self.outputs {
            if output.edge.node().index() >= self.nodes.len() {
                return Err(IrError::DanglingEdge(output.edge.raw()));
            }
        }
        let named = self.inputs.len() + self.registers.len() + self.outputs.len();
        if self.names.len() != named {
            return Err(IrError::InconsistentTable("name"));
        }
        Ok(())
    }
}
