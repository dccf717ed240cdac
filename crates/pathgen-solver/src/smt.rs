//! SMT-LIB 2 rendering of constraint conjunctions.
//!
//! One query per goal: declarations for every referenced variable, bounds
//! assertions for the numeric ones (so models stay inside the declared
//! domains), then one assert per constraint, `(check-sat)` and
//! `(get-model)`.

use crate::SolverError;
use pathgen_expr::{BinOp, Comparator, Constraint, Domain, Expr, Sort, UnaryOp, VarId, VariableSet};
use std::fmt::Write;

/// Render the conjunction of `constraints` as a complete SMT-LIB 2 query.
pub fn render_query(
    constraints: &[Constraint],
    vars: &VariableSet,
) -> Result<String, SolverError> {
    let mut referenced: Vec<VarId> = Vec::new();
    for c in constraints {
        for v in c.variables() {
            if !referenced.contains(&v) {
                referenced.push(v);
            }
        }
    }

    let mut out = String::new();
    out.push_str("(set-logic ALL)\n");

    for id in &referenced {
        let var = vars.get(*id);
        let sort = match var.domain {
            Domain::Integer { .. } => "Int",
            Domain::Real { .. } => "Real",
            Domain::String => "String",
        };
        writeln!(out, "(declare-const {} {})", var.name, sort).expect("write to String");
    }

    for id in &referenced {
        render_bounds(&mut out, vars, *id)?;
    }

    for c in constraints {
        out.push_str("(assert ");
        render_constraint(&mut out, c, vars)?;
        out.push_str(")\n");
    }

    out.push_str("(check-sat)\n(get-model)\n");
    Ok(out)
}

/// Bounds assertions for a numeric variable, skipping bounds that span the
/// whole machine range (they constrain nothing and bloat the query).
fn render_bounds(out: &mut String, vars: &VariableSet, id: VarId) -> Result<(), SolverError> {
    let var = vars.get(id);
    match var.domain {
        Domain::Integer { min, max } => {
            if min != i64::MIN {
                writeln!(out, "(assert (>= {} {}))", var.name, int_literal(min))
                    .expect("write to String");
            }
            if max != i64::MAX {
                writeln!(out, "(assert (<= {} {}))", var.name, int_literal(max))
                    .expect("write to String");
            }
        }
        Domain::Real { min, max } => {
            if min.is_finite() && min != f64::MIN {
                writeln!(out, "(assert (>= {} {}))", var.name, real_literal(min)?)
                    .expect("write to String");
            }
            if max.is_finite() && max != f64::MAX {
                writeln!(out, "(assert (<= {} {}))", var.name, real_literal(max)?)
                    .expect("write to String");
            }
        }
        Domain::String => {}
    }
    Ok(())
}

fn render_constraint(
    out: &mut String,
    c: &Constraint,
    vars: &VariableSet,
) -> Result<(), SolverError> {
    match c.cmp {
        Comparator::Ne => {
            out.push_str("(not (= ");
            render_expr(out, &c.left, vars)?;
            out.push(' ');
            render_expr(out, &c.right, vars)?;
            out.push_str("))");
        }
        cmp => {
            let op = match cmp {
                Comparator::Eq => "=",
                Comparator::Lt => "<",
                Comparator::Le => "<=",
                Comparator::Gt => ">",
                Comparator::Ge => ">=",
                Comparator::Ne => unreachable!(),
            };
            out.push('(');
            out.push_str(op);
            out.push(' ');
            render_expr(out, &c.left, vars)?;
            out.push(' ');
            render_expr(out, &c.right, vars)?;
            out.push(')');
        }
    }
    Ok(())
}

fn render_expr(out: &mut String, e: &Expr, vars: &VariableSet) -> Result<(), SolverError> {
    match e {
        Expr::IntConst(n) => out.push_str(&int_literal(*n)),
        Expr::RealConst(x) => out.push_str(&real_literal(*x)?),
        Expr::StrConst(s) => out.push_str(&string_literal(s)),
        Expr::Var(id) => out.push_str(&vars.get(*id).name),
        Expr::Unary(UnaryOp::Neg, inner) => {
            out.push_str("(- ");
            render_expr(out, inner, vars)?;
            out.push(')');
        }
        Expr::Binary(op, l, r) => {
            // Integer division/remainder spell differently from real division.
            let sym = match (op, l.sort(vars)) {
                (BinOp::Add, _) => "+",
                (BinOp::Sub, _) => "-",
                (BinOp::Mul, _) => "*",
                (BinOp::Div, Sort::Real) => "/",
                (BinOp::Div, _) => "div",
                (BinOp::Rem, _) => "mod",
            };
            out.push('(');
            out.push_str(sym);
            out.push(' ');
            render_expr(out, l, vars)?;
            out.push(' ');
            render_expr(out, r, vars)?;
            out.push(')');
        }
        Expr::ToReal(inner) => {
            out.push_str("(to_real ");
            render_expr(out, inner, vars)?;
            out.push(')');
        }
        Expr::StrLen(inner) => {
            out.push_str("(str.len ");
            render_expr(out, inner, vars)?;
            out.push(')');
        }
    }
    Ok(())
}

fn int_literal(n: i64) -> String {
    if n < 0 {
        // i64::MIN has no i64 absolute value; widen first.
        format!("(- {})", (n as i128).unsigned_abs())
    } else {
        n.to_string()
    }
}

fn real_literal(x: f64) -> Result<String, SolverError> {
    if !x.is_finite() {
        return Err(SolverError::Render(format!(
            "non-finite real constant {x}"
        )));
    }
    if x == 0.0 {
        return Ok("0.0".to_string());
    }
    if x < 0.0 {
        return Ok(format!("(- {})", real_literal(-x)?));
    }
    let s = format!("{x:?}");
    if s.contains('e') || s.contains('E') {
        // Exponent notation is not SMT-LIB; fall back to fixed point.
        Ok(format!("{x:.17}"))
    } else {
        Ok(s)
    }
}

/// SMT-LIB string literal: quotes double, everything else verbatim.
fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if ch == '"' {
            out.push_str("\"\"");
        } else {
            out.push(ch);
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_declares_bounds_and_asserts() {
        let mut vars = VariableSet::new();
        let x = vars.declare_integer("x", 0, -100, 100);
        let c = Constraint::new(Expr::var(x), Comparator::Eq, Expr::IntConst(42));

        let query = render_query(&[c], &vars).unwrap();
        assert!(query.contains("(declare-const x Int)"));
        assert!(query.contains("(assert (>= x (- 100)))"));
        assert!(query.contains("(assert (<= x 100))"));
        assert!(query.contains("(assert (= x 42))"));
        assert!(query.ends_with("(check-sat)\n(get-model)\n"));
    }

    #[test]
    fn test_render_skips_machine_range_bounds() {
        let mut vars = VariableSet::new();
        let x = vars.declare_integer("x", 0, i64::MIN, i64::MAX);
        let c = Constraint::new(Expr::var(x), Comparator::Gt, Expr::IntConst(0));

        let query = render_query(&[c], &vars).unwrap();
        assert!(!query.contains(">= x"));
        assert!(!query.contains("<= x"));
    }

    #[test]
    fn test_render_ne_as_negated_equality() {
        let mut vars = VariableSet::new();
        let x = vars.declare_integer("x", 0, i64::MIN, i64::MAX);
        let c = Constraint::new(Expr::var(x), Comparator::Ne, Expr::IntConst(7));

        let query = render_query(&[c], &vars).unwrap();
        assert!(query.contains("(assert (not (= x 7)))"));
    }

    #[test]
    fn test_render_real_literals() {
        let mut vars = VariableSet::new();
        let y = vars.declare_real("y", 0.0, -1.5, 1.5);
        let c = Constraint::new(Expr::var(y), Comparator::Ge, Expr::RealConst(-0.25));

        let query = render_query(&[c], &vars).unwrap();
        assert!(query.contains("(assert (>= y (- 1.5)))"));
        assert!(query.contains("(assert (<= y 1.5))"));
        assert!(query.contains("(assert (>= y (- 0.25)))"));
    }

    #[test]
    fn test_render_string_and_length() {
        let mut vars = VariableSet::new();
        let s = vars.declare_string("s", "");
        let eq = Constraint::new(Expr::var(s), Comparator::Eq, Expr::StrConst("a\"b".into()));
        let len = Constraint::new(
            Expr::StrLen(Box::new(Expr::var(s))),
            Comparator::Gt,
            Expr::IntConst(2),
        );

        let query = render_query(&[eq, len], &vars).unwrap();
        assert!(query.contains("(declare-const s String)"));
        assert!(query.contains("(assert (= s \"a\"\"b\"))"));
        assert!(query.contains("(assert (> (str.len s) 2))"));
    }

    #[test]
    fn test_render_rejects_non_finite_reals() {
        let mut vars = VariableSet::new();
        let y = vars.declare_real("y", 0.0, f64::MIN, f64::MAX);
        let c = Constraint::new(Expr::var(y), Comparator::Eq, Expr::RealConst(f64::NAN));
        assert!(matches!(
            render_query(&[c], &vars),
            Err(SolverError::Render(_))
        ));
    }

    #[test]
    fn test_int_literal_min() {
        assert_eq!(int_literal(i64::MIN), "(- 9223372036854775808)");
    }
}
