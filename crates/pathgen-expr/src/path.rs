//! Constraints, branch conditions, and path conditions.

use crate::expr::{EvalError, Expr, Sort};
use crate::variable::{Assignment, ConcreteValue, VarId, VariableSet};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Comparison operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    /// The logical complement at the same program point.
    /// Involution: `c.negate().negate() == c`.
    pub fn negate(self) -> Comparator {
        match self {
            Comparator::Eq => Comparator::Ne,
            Comparator::Ne => Comparator::Eq,
            Comparator::Lt => Comparator::Ge,
            Comparator::Ge => Comparator::Lt,
            Comparator::Le => Comparator::Gt,
            Comparator::Gt => Comparator::Le,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

/// A comparison between two symbolic expressions. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub left: Expr,
    pub cmp: Comparator,
    pub right: Expr,
}

impl Constraint {
    pub fn new(left: Expr, cmp: Comparator, right: Expr) -> Constraint {
        Constraint { left, cmp, right }
    }

    /// The same comparison with the complemented operator.
    pub fn negate(&self) -> Constraint {
        Constraint {
            left: self.left.clone(),
            cmp: self.cmp.negate(),
            right: self.right.clone(),
        }
    }

    /// Variables of the constraint, left operand first, in first-appearance
    /// order.
    pub fn variables(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        self.left.collect_variables(&mut out);
        self.right.collect_variables(&mut out);
        out
    }

    /// Whether the comparison holds under the current assignment.
    pub fn holds(&self, vars: &VariableSet, values: &Assignment) -> Result<bool, EvalError> {
        let l = self.left.eval(vars, values)?;
        let r = self.right.eval(vars, values)?;
        match (&l, &r) {
            (ConcreteValue::Int(a), ConcreteValue::Int(b)) => Ok(compare(a.cmp(b), self.cmp)),
            (ConcreteValue::Real(a), ConcreteValue::Real(b)) => {
                // Total order on reals; NaN never satisfies an ordering.
                match a.partial_cmp(b) {
                    Some(ord) => Ok(compare(ord, self.cmp)),
                    None => Ok(matches!(self.cmp, Comparator::Ne)),
                }
            }
            (ConcreteValue::Str(a), ConcreteValue::Str(b)) => match self.cmp {
                Comparator::Eq => Ok(a == b),
                Comparator::Ne => Ok(a != b),
                _ => Err(EvalError::IncomparableSorts {
                    left: Sort::Str,
                    right: Sort::Str,
                }),
            },
            _ => Err(EvalError::IncomparableSorts {
                left: self.left.sort(vars),
                right: self.right.sort(vars),
            }),
        }
    }

    /// Structural fingerprint, stable across clones. Used for
    /// order-insensitive path-condition dedup and the solver query cache.
    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.left.fingerprint_into(&mut h);
        self.cmp.hash(&mut h);
        self.right.fingerprint_into(&mut h);
        h.finish()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} {:?}", self.left, self.cmp.symbol(), self.right)
    }
}

fn compare(ord: std::cmp::Ordering, cmp: Comparator) -> bool {
    use std::cmp::Ordering::*;
    match cmp {
        Comparator::Eq => ord == Equal,
        Comparator::Ne => ord != Equal,
        Comparator::Lt => ord == Less,
        Comparator::Le => ord != Greater,
        Comparator::Gt => ord == Greater,
        Comparator::Ge => ord != Less,
    }
}

/// One decision point of a concrete execution: the constraint that held
/// along the taken direction and the concrete boolean outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchCondition {
    pub constraint: Constraint,
    /// The concrete outcome the execution took at this branch.
    pub outcome: bool,
}

impl BranchCondition {
    pub fn new(constraint: Constraint, outcome: bool) -> BranchCondition {
        BranchCondition { constraint, outcome }
    }

    /// The other direction of the same decision point: complemented
    /// constraint, flipped outcome. Always exists; derived on demand.
    pub fn negated(&self) -> BranchCondition {
        BranchCondition {
            constraint: self.constraint.negate(),
            outcome: !self.outcome,
        }
    }

    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.constraint.fingerprint().hash(&mut h);
        self.outcome.hash(&mut h);
        h.finish()
    }
}

/// The ordered, append-only sequence of branch conditions recorded by one
/// concrete execution. Order is execution order; any prefix is itself a
/// valid path condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathCondition {
    branches: Vec<BranchCondition>,
}

impl PathCondition {
    pub fn new(branches: Vec<BranchCondition>) -> PathCondition {
        PathCondition { branches }
    }

    pub fn push(&mut self, branch: BranchCondition) {
        self.branches.push(branch);
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Branch at `index`. Panics on an out-of-range index: path conditions
    /// are only ever indexed with positions derived from their own length.
    pub fn branch(&self, index: usize) -> &BranchCondition {
        &self.branches[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &BranchCondition> {
        self.branches.iter()
    }

    /// The first `len` branches as a new path condition.
    pub fn prefix(&self, len: usize) -> PathCondition {
        PathCondition {
            branches: self.branches[..len].to_vec(),
        }
    }

    /// The conjunction of constraints along this path, in execution order.
    pub fn constraints(&self) -> Vec<Constraint> {
        self.branches.iter().map(|b| b.constraint.clone()).collect()
    }

    /// Variables referenced anywhere on the path, in first-appearance order.
    pub fn variables(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        for b in &self.branches {
            self.collect_constraint_vars(&b.constraint, &mut out);
        }
        out
    }

    fn collect_constraint_vars(&self, c: &Constraint, out: &mut Vec<VarId>) {
        for v in c.variables() {
            if !out.contains(&v) {
                out.push(v);
            }
        }
    }

    /// Order-insensitive fingerprint of the constraint set, for dedup of
    /// path conditions that differ only in recording order.
    pub fn normalized_fingerprint(&self) -> u64 {
        let mut fps: Vec<u64> = self.branches.iter().map(|b| b.constraint.fingerprint()).collect();
        fps.sort_unstable();
        fps.dedup();
        let mut h = DefaultHasher::new();
        fps.hash(&mut h);
        h.finish()
    }

    /// Whether the first `len` branches of `self` record the same decisions
    /// (same constraints, same outcomes) as the first `len` of `other`.
    pub fn shares_prefix(&self, other: &PathCondition, len: usize) -> bool {
        if self.branches.len() < len || other.branches.len() < len {
            return false;
        }
        self.branches[..len]
            .iter()
            .zip(&other.branches[..len])
            .all(|(a, b)| a.fingerprint() == b.fingerprint())
    }
}

impl FromIterator<BranchCondition> for PathCondition {
    fn from_iter<T: IntoIterator<Item = BranchCondition>>(iter: T) -> Self {
        PathCondition {
            branches: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableSet;

    fn int_constraint(x: VarId, cmp: Comparator, k: i64) -> Constraint {
        Constraint::new(Expr::var(x), cmp, Expr::IntConst(k))
    }

    #[test]
    fn test_comparator_negate_involution() {
        for cmp in [
            Comparator::Eq,
            Comparator::Ne,
            Comparator::Lt,
            Comparator::Le,
            Comparator::Gt,
            Comparator::Ge,
        ] {
            assert_eq!(cmp.negate().negate(), cmp);
        }
    }

    #[test]
    fn test_branch_negation_is_complement() {
        let mut vars = VariableSet::new();
        let x = vars.declare_integer("x", 5, i64::MIN, i64::MAX);
        let values = Assignment::initial(&vars);

        let bc = BranchCondition::new(int_constraint(x, Comparator::Lt, 10), true);
        let neg = bc.negated();

        assert!(bc.constraint.holds(&vars, &values).unwrap());
        assert!(!neg.constraint.holds(&vars, &values).unwrap());
        assert_eq!(neg.negated(), bc);
    }

    #[test]
    fn test_string_ordering_is_an_error() {
        let mut vars = VariableSet::new();
        let s = vars.declare_string("s", "a");
        let values = Assignment::initial(&vars);
        let c = Constraint::new(Expr::var(s), Comparator::Lt, Expr::StrConst("b".into()));
        assert!(c.holds(&vars, &values).is_err());
    }

    #[test]
    fn test_normalized_fingerprint_order_insensitive() {
        let mut vars = VariableSet::new();
        let x = vars.declare_integer("x", 0, i64::MIN, i64::MAX);
        let a = BranchCondition::new(int_constraint(x, Comparator::Lt, 1), true);
        let b = BranchCondition::new(int_constraint(x, Comparator::Ge, 7), false);

        let pc1 = PathCondition::new(vec![a.clone(), b.clone()]);
        let pc2 = PathCondition::new(vec![b, a]);
        assert_eq!(pc1.normalized_fingerprint(), pc2.normalized_fingerprint());
    }

    #[test]
    fn test_shares_prefix() {
        let mut vars = VariableSet::new();
        let x = vars.declare_integer("x", 0, i64::MIN, i64::MAX);
        let a = BranchCondition::new(int_constraint(x, Comparator::Lt, 1), true);
        let b = BranchCondition::new(int_constraint(x, Comparator::Ge, 7), false);

        let pc1 = PathCondition::new(vec![a.clone(), b.clone()]);
        let pc2 = PathCondition::new(vec![a.clone(), b.negated()]);
        assert!(pc1.shares_prefix(&pc2, 1));
        assert!(!pc1.shares_prefix(&pc2, 2));
        assert!(!pc1.shares_prefix(&pc2, 3));
    }

    #[test]
    fn test_prefix_is_valid_path_condition() {
        let mut vars = VariableSet::new();
        let x = vars.declare_integer("x", 0, i64::MIN, i64::MAX);
        let a = BranchCondition::new(int_constraint(x, Comparator::Lt, 1), true);
        let b = BranchCondition::new(int_constraint(x, Comparator::Ge, 7), false);

        let pc = PathCondition::new(vec![a.clone(), b]);
        let p = pc.prefix(1);
        assert_eq!(p.len(), 1);
        assert_eq!(p.branch(0), &a);
    }
}
