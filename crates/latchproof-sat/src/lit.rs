use std::fmt;
use std::ops::Not;

/// Solver variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub u32);

impl Var {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn positive(self) -> Lit {
        Lit::new(self, false)
    }

    pub fn negative(self) -> Lit {
        Lit::new(self, true)
    }
}

/// Signed variable, encoded as `2 * var + negated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lit(u32);

impl Lit {
    pub fn new(var: Var, negated: bool) -> Self {
        Lit(var.0 * 2 + negated as u32)
    }

    pub fn var(self) -> Var {
        Var(self.0 >> 1)
    }

    pub fn is_negated(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Complements the literal when `flip` holds.
    pub fn xor_sign(self, flip: bool) -> Lit {
        Lit(self.0 ^ flip as u32)
    }
}

impl Not for Lit {
    type Output = Lit;

    fn not(self) -> Lit {
        Lit(self.0 ^ 1)
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negated() {
            write!(f, "-{}", self.var().0)
        } else {
            write!(f, "{}", self.var().0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_encoding() {
        let v = Var(5);
        assert_eq!(v.positive().var(), v);
        assert!(v.negative().is_negated());
        assert_eq!(!v.positive(), v.negative());
        assert_eq!(v.positive().xor_sign(true), v.negative());
        assert_eq!(v.negative().to_string(), "-5");
    }
}
