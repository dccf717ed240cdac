//! Branch distance estimation.
//!
//! The engine only ever *reads* distances: it compares successive values to
//! detect improvement and checks for zero. The trait keeps the engine
//! independent of how the score is computed; [`BranchDistance`] is the
//! default implementation used when no instrumented estimator is supplied.

use crate::expr::EvalError;
use crate::path::{Comparator, Constraint};
use crate::variable::{Assignment, ConcreteValue, VariableSet};
use tracing::warn;

/// "How far from satisfied" scoring of a constraint set under the current
/// concrete assignment. `0.0` means every constraint is satisfied. Must be
/// deterministic for a fixed assignment.
pub trait DistanceEstimator {
    fn distance(&self, constraints: &[Constraint], vars: &VariableSet, values: &Assignment)
        -> f64;
}

/// Weight of one character of string length difference. Dominates any
/// single-character distance so that growing/shrinking towards the target
/// length always registers as an improvement.
const STR_LEN_WEIGHT: f64 = 0x11_0000 as f64;

/// The standard branch-distance estimator.
///
/// Per-constraint distances follow the usual branch-distance schema
/// (`|l-r|` for equality, `l-r+1` for strict orderings, ...); each is
/// normalized as `d/(d+1)` before summing so that no single constraint
/// dominates the landscape and the sum is zero exactly when the whole
/// conjunction is satisfied.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchDistance;

impl DistanceEstimator for BranchDistance {
    fn distance(
        &self,
        constraints: &[Constraint],
        vars: &VariableSet,
        values: &Assignment,
    ) -> f64 {
        constraints
            .iter()
            .map(|c| normalize(constraint_distance(c, vars, values)))
            .sum()
    }
}

fn normalize(d: f64) -> f64 {
    if d == 0.0 {
        0.0
    } else {
        d / (d + 1.0)
    }
}

fn constraint_distance(c: &Constraint, vars: &VariableSet, values: &Assignment) -> f64 {
    let left = match c.left.eval(vars, values) {
        Ok(v) => v,
        Err(e) => return unevaluable(c, e),
    };
    let right = match c.right.eval(vars, values) {
        Ok(v) => v,
        Err(e) => return unevaluable(c, e),
    };

    match (left, right) {
        (ConcreteValue::Int(l), ConcreteValue::Int(r)) => integer_distance(l, r, c.cmp),
        (ConcreteValue::Real(l), ConcreteValue::Real(r)) => real_distance(l, r, c.cmp),
        (ConcreteValue::Str(l), ConcreteValue::Str(r)) => string_distance(&l, &r, c.cmp, vars, c),
        _ => unevaluable(
            c,
            EvalError::IncomparableSorts {
                left: c.left.sort(vars),
                right: c.right.sort(vars),
            },
        ),
    }
}

fn unevaluable(c: &Constraint, e: EvalError) -> f64 {
    warn!(constraint = %c, error = %e, "constraint not evaluable, scoring maximum distance");
    f64::MAX
}

fn integer_distance(l: i64, r: i64, cmp: Comparator) -> f64 {
    // Widen so l - r cannot overflow.
    let d = l as i128 - r as i128;
    let dist = match cmp {
        Comparator::Eq => d.unsigned_abs(),
        Comparator::Ne => {
            if d != 0 {
                0
            } else {
                1
            }
        }
        Comparator::Lt => {
            if d < 0 {
                0
            } else {
                d as u128 + 1
            }
        }
        Comparator::Le => {
            if d <= 0 {
                0
            } else {
                d as u128
            }
        }
        Comparator::Gt => {
            if d > 0 {
                0
            } else {
                d.unsigned_abs() + 1
            }
        }
        Comparator::Ge => {
            if d >= 0 {
                0
            } else {
                d.unsigned_abs()
            }
        }
    };
    dist as f64
}

fn real_distance(l: f64, r: f64, cmp: Comparator) -> f64 {
    let d = l - r;
    if d.is_nan() {
        return f64::MAX;
    }
    match cmp {
        Comparator::Eq => d.abs(),
        Comparator::Ne => {
            if d != 0.0 {
                0.0
            } else {
                1.0
            }
        }
        Comparator::Lt => {
            if d < 0.0 {
                0.0
            } else {
                d + 1.0
            }
        }
        Comparator::Le => {
            if d <= 0.0 {
                0.0
            } else {
                d
            }
        }
        Comparator::Gt => {
            if d > 0.0 {
                0.0
            } else {
                -d + 1.0
            }
        }
        Comparator::Ge => {
            if d >= 0.0 {
                0.0
            } else {
                -d
            }
        }
    }
}

/// Equality distance with a character-level gradient: a weighted length
/// difference plus the codepoint distance at each position of the common
/// prefix. This is the landscape the string AVM climbs (chopping or adding
/// characters moves the length term, per-character search moves the rest).
fn string_distance(l: &str, r: &str, cmp: Comparator, vars: &VariableSet, c: &Constraint) -> f64 {
    match cmp {
        Comparator::Eq => {
            let lc: Vec<u32> = l.chars().map(|ch| ch as u32).collect();
            let rc: Vec<u32> = r.chars().map(|ch| ch as u32).collect();
            let len_diff = (lc.len() as i64 - rc.len() as i64).unsigned_abs() as f64;
            let char_dist: f64 = lc
                .iter()
                .zip(&rc)
                .map(|(a, b)| (*a as i64 - *b as i64).unsigned_abs() as f64)
                .sum();
            len_diff * STR_LEN_WEIGHT + char_dist
        }
        Comparator::Ne => {
            if l != r {
                0.0
            } else {
                1.0
            }
        }
        _ => unevaluable(
            c,
            EvalError::IncomparableSorts {
                left: c.left.sort(vars),
                right: c.right.sort(vars),
            },
        ),
    }
}
