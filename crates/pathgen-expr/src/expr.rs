//! The operand language of constraints.
//!
//! An [`Expr`] is the symbolic side of what the instrumentation layer
//! records at a branch: constants, variable references, and the small set
//! of arithmetic/string operators the tracer emits. Expressions are
//! immutable once built; evaluation reads the current concrete values from
//! an [`Assignment`].

use crate::variable::{Assignment, ConcreteValue, VarId, VariableSet};
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Expression evaluation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("operands of {op:?} have mismatched sorts {left:?} and {right:?}")]
    SortMismatch { op: BinOp, left: Sort, right: Sort },

    #[error("{context} is not defined for sort {sort:?}")]
    Unsupported { context: &'static str, sort: Sort },

    #[error("division by zero")]
    DivisionByZero,

    #[error("comparison of {left:?} against {right:?}")]
    IncomparableSorts { left: Sort, right: Sort },
}

/// Sort of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Int,
    Real,
    Str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
}

/// A symbolic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntConst(i64),
    RealConst(f64),
    StrConst(String),
    Var(VarId),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Int → Real widening, for mixed comparisons recorded by the tracer.
    ToReal(Box<Expr>),
    /// Length of a string expression, as Int.
    StrLen(Box<Expr>),
}

impl Expr {
    pub fn var(id: VarId) -> Expr {
        Expr::Var(id)
    }

    pub fn neg(self) -> Expr {
        Expr::Unary(UnaryOp::Neg, Box::new(self))
    }

    pub fn add(self, rhs: Expr) -> Expr {
        Expr::Binary(BinOp::Add, Box::new(self), Box::new(rhs))
    }

    pub fn sub(self, rhs: Expr) -> Expr {
        Expr::Binary(BinOp::Sub, Box::new(self), Box::new(rhs))
    }

    pub fn mul(self, rhs: Expr) -> Expr {
        Expr::Binary(BinOp::Mul, Box::new(self), Box::new(rhs))
    }

    /// Sort of this expression under the given variable declarations.
    pub fn sort(&self, vars: &VariableSet) -> Sort {
        match self {
            Expr::IntConst(_) => Sort::Int,
            Expr::RealConst(_) => Sort::Real,
            Expr::StrConst(_) => Sort::Str,
            Expr::Var(id) => match vars.get(*id).domain {
                crate::variable::Domain::Integer { .. } => Sort::Int,
                crate::variable::Domain::Real { .. } => Sort::Real,
                crate::variable::Domain::String => Sort::Str,
            },
            Expr::Unary(_, e) => e.sort(vars),
            Expr::Binary(_, l, _) => l.sort(vars),
            Expr::ToReal(_) => Sort::Real,
            Expr::StrLen(_) => Sort::Int,
        }
    }

    /// Append the variables of this expression to `out` in first-appearance
    /// order, skipping ones already collected.
    pub fn collect_variables(&self, out: &mut Vec<VarId>) {
        match self {
            Expr::IntConst(_) | Expr::RealConst(_) | Expr::StrConst(_) => {}
            Expr::Var(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            Expr::Unary(_, e) | Expr::ToReal(e) | Expr::StrLen(e) => e.collect_variables(out),
            Expr::Binary(_, l, r) => {
                l.collect_variables(out);
                r.collect_variables(out);
            }
        }
    }

    /// Evaluate under the current concrete assignment.
    ///
    /// Integer arithmetic wraps (matching the machine semantics the trace
    /// was recorded under); division and remainder by zero are errors.
    pub fn eval(&self, vars: &VariableSet, values: &Assignment) -> Result<ConcreteValue, EvalError> {
        match self {
            Expr::IntConst(n) => Ok(ConcreteValue::Int(*n)),
            Expr::RealConst(x) => Ok(ConcreteValue::Real(*x)),
            Expr::StrConst(s) => Ok(ConcreteValue::Str(s.clone())),
            Expr::Var(id) => Ok(values.get(*id).clone()),
            Expr::Unary(UnaryOp::Neg, e) => match e.eval(vars, values)? {
                ConcreteValue::Int(n) => Ok(ConcreteValue::Int(n.wrapping_neg())),
                ConcreteValue::Real(x) => Ok(ConcreteValue::Real(-x)),
                ConcreteValue::Str(_) => Err(EvalError::Unsupported {
                    context: "negation",
                    sort: Sort::Str,
                }),
            },
            Expr::Binary(op, l, r) => {
                let lv = l.eval(vars, values)?;
                let rv = r.eval(vars, values)?;
                eval_binary(*op, lv, rv)
            }
            Expr::ToReal(e) => match e.eval(vars, values)? {
                ConcreteValue::Int(n) => Ok(ConcreteValue::Real(n as f64)),
                other @ ConcreteValue::Real(_) => Ok(other),
                ConcreteValue::Str(_) => Err(EvalError::Unsupported {
                    context: "widening to Real",
                    sort: Sort::Str,
                }),
            },
            Expr::StrLen(e) => match e.eval(vars, values)? {
                ConcreteValue::Str(s) => Ok(ConcreteValue::Int(s.chars().count() as i64)),
                other => Err(EvalError::Unsupported {
                    context: "string length",
                    sort: sort_of(&other),
                }),
            },
        }
    }

    /// Feed the structure of this expression into a hasher, for
    /// order-insensitive constraint fingerprints. Reals hash by bit
    /// pattern, sidestepping float equality.
    pub fn fingerprint_into<H: Hasher>(&self, state: &mut H) {
        match self {
            Expr::IntConst(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            Expr::RealConst(x) => {
                1u8.hash(state);
                x.to_bits().hash(state);
            }
            Expr::StrConst(s) => {
                2u8.hash(state);
                s.hash(state);
            }
            Expr::Var(id) => {
                3u8.hash(state);
                id.hash(state);
            }
            Expr::Unary(op, e) => {
                4u8.hash(state);
                op.hash(state);
                e.fingerprint_into(state);
            }
            Expr::Binary(op, l, r) => {
                5u8.hash(state);
                op.hash(state);
                l.fingerprint_into(state);
                r.fingerprint_into(state);
            }
            Expr::ToReal(e) => {
                6u8.hash(state);
                e.fingerprint_into(state);
            }
            Expr::StrLen(e) => {
                7u8.hash(state);
                e.fingerprint_into(state);
            }
        }
    }
}

fn sort_of(value: &ConcreteValue) -> Sort {
    match value {
        ConcreteValue::Int(_) => Sort::Int,
        ConcreteValue::Real(_) => Sort::Real,
        ConcreteValue::Str(_) => Sort::Str,
    }
}

fn eval_binary(op: BinOp, lv: ConcreteValue, rv: ConcreteValue) -> Result<ConcreteValue, EvalError> {
    match (lv, rv) {
        (ConcreteValue::Int(l), ConcreteValue::Int(r)) => {
            let v = match op {
                BinOp::Add => l.wrapping_add(r),
                BinOp::Sub => l.wrapping_sub(r),
                BinOp::Mul => l.wrapping_mul(r),
                BinOp::Div => {
                    if r == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l.wrapping_div(r)
                }
                BinOp::Rem => {
                    if r == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l.wrapping_rem(r)
                }
            };
            Ok(ConcreteValue::Int(v))
        }
        (ConcreteValue::Real(l), ConcreteValue::Real(r)) => {
            let v = match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l / r
                }
                BinOp::Rem => {
                    if r == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l % r
                }
            };
            Ok(ConcreteValue::Real(v))
        }
        (l, r) => Err(EvalError::SortMismatch {
            op,
            left: sort_of(&l),
            right: sort_of(&r),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableSet;

    fn setup() -> (VariableSet, Assignment, VarId, VarId) {
        let mut vars = VariableSet::new();
        let x = vars.declare_integer("x", 6, i64::MIN, i64::MAX);
        let y = vars.declare_real("y", 2.5, f64::MIN, f64::MAX);
        let values = Assignment::initial(&vars);
        (vars, values, x, y)
    }

    #[test]
    fn test_eval_arithmetic() {
        let (vars, values, x, _) = setup();
        let e = Expr::var(x).mul(Expr::IntConst(7)).add(Expr::IntConst(-2));
        assert_eq!(e.eval(&vars, &values).unwrap(), ConcreteValue::Int(40));
    }

    #[test]
    fn test_eval_real_widening() {
        let (vars, values, x, y) = setup();
        let e = Expr::ToReal(Box::new(Expr::var(x))).add(Expr::var(y));
        assert_eq!(e.eval(&vars, &values).unwrap(), ConcreteValue::Real(8.5));
    }

    #[test]
    fn test_eval_division_by_zero() {
        let (vars, values, x, _) = setup();
        let e = Expr::Binary(BinOp::Div, Box::new(Expr::var(x)), Box::new(Expr::IntConst(0)));
        assert_eq!(e.eval(&vars, &values), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_eval_sort_mismatch() {
        let (vars, values, x, y) = setup();
        let e = Expr::var(x).add(Expr::var(y));
        assert!(matches!(
            e.eval(&vars, &values),
            Err(EvalError::SortMismatch { .. })
        ));
    }

    #[test]
    fn test_strlen() {
        let mut vars = VariableSet::new();
        let s = vars.declare_string("s", "héllo");
        let values = Assignment::initial(&vars);
        let e = Expr::StrLen(Box::new(Expr::var(s)));
        assert_eq!(e.eval(&vars, &values).unwrap(), ConcreteValue::Int(5));
    }

    #[test]
    fn test_collect_variables_first_appearance_order() {
        let (_, _, x, y) = setup();
        let e = Expr::var(y).add(Expr::ToReal(Box::new(Expr::var(x).add(Expr::var(x)))));
        let mut out = Vec::new();
        e.collect_variables(&mut out);
        assert_eq!(out, vec![y, x]);
    }
}
