//! Cubes over register literals.
//!
//! A cube is a conjunction of register literals, sorted by literal code and
//! holding at most one literal per register, optionally followed by input
//! literals recorded as a witness. Clauses are stored as the cubes they
//! exclude. Cubes are immutable and shared through `Rc`; shrinking a cube
//! builds a new one.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::ops::Not;
use std::rc::Rc;

use crate::error::PdrError;

/// Register literal, encoded as `2 * register + negated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateLit(u32);

impl StateLit {
    pub fn new(register: usize, negated: bool) -> Self {
        StateLit(register as u32 * 2 + negated as u32)
    }

    pub fn from_code(code: u32) -> Self {
        StateLit(code)
    }

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn register(self) -> usize {
        (self.0 >> 1) as usize
    }

    pub fn is_negated(self) -> bool {
        self.0 & 1 == 1
    }

    /// Bit of this literal in a cube signature.
    fn signature_bit(self) -> u64 {
        1u64 << (self.0 % 63)
    }
}

impl Not for StateLit {
    type Output = StateLit;

    fn not(self) -> StateLit {
        StateLit(self.0 ^ 1)
    }
}

/// Primary input value carried as part of a witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputLit {
    pub input: usize,
    pub value: bool,
}

#[derive(Debug)]
struct CubeData {
    lits: Box<[StateLit]>,
    witness: Box<[InputLit]>,
    /// Registers whose literals were dropped by abstraction.
    hidden: Box<[usize]>,
    signature: u64,
}

#[derive(Debug, Clone)]
pub struct Cube(Rc<CubeData>);

fn signature_of(lits: &[StateLit]) -> u64 {
    lits.iter().fold(0, |sig, lit| sig | lit.signature_bit())
}

impl Cube {
    /// Builds a cube from arbitrary literals, rejecting two literals on one register.
    pub fn new(lits: impl IntoIterator<Item = StateLit>) -> Result<Cube, PdrError> {
        let mut lits: Vec<StateLit> = lits.into_iter().collect();
        lits.sort_unstable();
        lits.dedup();
        if let Some(pair) = lits.windows(2).find(|w| w[0].register() == w[1].register()) {
            return Err(PdrError::MalformedInput(format!(
                "register {} appears with both polarities in one cube",
                pair[0].register()
            )));
        }
        Ok(Cube::from_sorted(lits, Vec::new(), Vec::new()))
    }

    /// Internal constructor for literal lists already in canonical order.
    pub(crate) fn from_sorted(
        lits: Vec<StateLit>,
        witness: Vec<InputLit>,
        hidden: Vec<usize>,
    ) -> Cube {
        debug_assert!(lits.windows(2).all(|w| w[0].register() < w[1].register()));
        let signature = signature_of(&lits);
        Cube(Rc::new(CubeData {
            lits: lits.into_boxed_slice(),
            witness: witness.into_boxed_slice(),
            hidden: hidden.into_boxed_slice(),
            signature,
        }))
    }

    /// Rebuilds a cube from persisted literal codes.
    pub fn from_codes(codes: &[u32]) -> Result<Cube, PdrError> {
        Cube::new(codes.iter().map(|&c| StateLit::from_code(c)))
    }

    pub fn lits(&self) -> &[StateLit] {
        &self.0.lits
    }

    pub fn witness(&self) -> &[InputLit] {
        &self.0.witness
    }

    pub fn hidden_support(&self) -> &[usize] {
        &self.0.hidden
    }

    pub fn len(&self) -> usize {
        self.0.lits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lits.is_empty()
    }

    pub fn signature(&self) -> u64 {
        self.0.signature
    }

    pub fn codes(&self) -> Vec<u32> {
        self.lits().iter().map(|l| l.code()).collect()
    }

    /// Sub-cube made of the given literals, which must come from this cube.
    pub fn subset(&self, keep: &[StateLit]) -> Cube {
        let lits = self
            .lits()
            .iter()
            .copied()
            .filter(|l| keep.contains(l))
            .collect();
        Cube::from_sorted(lits, Vec::new(), Vec::new())
    }

    /// This cube without the literal at `index`.
    pub fn without(&self, index: usize) -> Cube {
        let lits = self
            .lits()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, l)| *l)
            .collect();
        Cube::from_sorted(lits, Vec::new(), Vec::new())
    }

    /// Same literals without witness data.
    pub fn strip_witness(&self) -> Cube {
        if self.witness().is_empty() && self.hidden_support().is_empty() {
            return self.clone();
        }
        Cube::from_sorted(self.lits().to_vec(), Vec::new(), Vec::new())
    }

    /// True when every literal of `self` also occurs in `other`.
    ///
    /// As clauses, `self` then subsumes `other`; as state sets, `other` is
    /// contained in `self`.
    pub fn subsumes(&self, other: &Cube) -> bool {
        if self.len() > other.len() || self.signature() & !other.signature() != 0 {
            return false;
        }
        let mut rest = other.lits().iter();
        'outer: for lit in self.lits() {
            for candidate in rest.by_ref() {
                match candidate.cmp(lit) {
                    Ordering::Less => continue,
                    Ordering::Equal => continue 'outer,
                    Ordering::Greater => return false,
                }
            }
            return false;
        }
        true
    }

    /// True when the states of `self` lie inside the states of `other`.
    pub fn contained_in(&self, other: &Cube) -> bool {
        other.subsumes(self)
    }

    /// True when the all-zero initial state satisfies the cube, ignoring the
    /// literal at `exclude`.
    pub fn is_init_intersecting(&self, exclude: Option<usize>) -> bool {
        self.lits()
            .iter()
            .enumerate()
            .all(|(i, lit)| Some(i) == exclude || lit.is_negated())
    }

    pub fn first_positive(&self) -> Option<StateLit> {
        self.lits().iter().copied().find(|l| !l.is_negated())
    }

    pub fn contains_register(&self, register: usize) -> bool {
        self.lits()
            .binary_search_by(|l| l.register().cmp(&register))
            .is_ok()
    }

    /// Literals shared with `pred`, for joining a cube with a predecessor.
    ///
    /// Literals of `self` missing from `pred` are dropped and recorded in
    /// `keep`. Returns `None` when `pred` holds a literal already in `keep`
    /// that the join would lose.
    pub fn intersection(&self, pred: &Cube, keep: &mut HashSet<StateLit>) -> Option<Cube> {
        let (a, b) = (self.lits(), pred.lits());
        let (mut i, mut j) = (0, 0);
        let mut common = Vec::with_capacity(a.len().min(b.len()));
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Greater => {
                    if keep.contains(&b[j]) {
                        return None;
                    }
                    j += 1;
                }
                Ordering::Less => {
                    keep.insert(a[i]);
                    i += 1;
                }
                Ordering::Equal => {
                    common.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        Some(Cube::from_sorted(common, Vec::new(), Vec::new()))
    }
}

impl PartialEq for Cube {
    fn eq(&self, other: &Self) -> bool {
        self.lits() == other.lits()
    }
}

impl Eq for Cube {}

impl PartialOrd for Cube {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lexicographic on literal codes, shorter prefix first.
impl Ord for Cube {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lits().cmp(other.lits())
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, lit) in self.lits().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            if lit.is_negated() {
                write!(f, "!")?;
            }
            write!(f, "r{}", lit.register())?;
        }
        write!(f, "]")
    }
}
