//! External SMT solver adapter for the pathgen concolic engine.
//!
//! Renders a constraint conjunction to SMT-LIB 2, invokes a solver binary
//! as a bounded subprocess, and parses its textual satisfiability result
//! and variable-assignment model into typed concrete values.

pub mod model;
pub mod process;
pub mod smt;

use pathgen_expr::{Constraint, VariableSet};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use model::parse_solver_output;
pub use process::{ProcessSolver, SolverCommand};
pub use smt::render_query;

/// Solver invocation error.
///
/// None of these are fatal to a search episode: every variant degrades to
/// the AVM fallback for the single goal being solved.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The solver's output did not match the expected grammar.
    #[error("failed to parse solver output: {0}")]
    Parse(String),

    /// The solver did not finish within its deadline.
    #[error("solver timed out after {0:?}")]
    Timeout(Duration),

    /// Spawning or talking to the solver process failed.
    #[error("failed to run solver: {0}")]
    Process(String),

    /// The solver itself reported an error (an `(error ...)` response).
    #[error("solver reported an error: {0}")]
    Reported(String),

    /// The query could not be rendered to SMT-LIB (e.g. a non-finite real
    /// constant).
    #[error("query cannot be rendered: {0}")]
    Render(String),

    /// A query with no constraints.
    #[error("refusing to solve an empty query")]
    EmptyQuery,
}

/// A typed value from a solver model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelValue {
    Int(i64),
    Real(f64),
    Str(String),
}

/// Variable name → model value, as parsed from a `sat` response.
pub type Model = BTreeMap<String, ModelValue>;

/// Outcome of one solver invocation. Immutable, produced fresh per solve.
///
/// `Unknown` is a value, not an error: the driver treats it exactly like a
/// timeout (fall back to local search).
#[derive(Debug, Clone, PartialEq)]
pub enum SolverResult {
    Sat(Model),
    Unsat,
    Unknown,
}

impl SolverResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SolverResult::Sat(_))
    }

    pub fn is_unsat(&self) -> bool {
        matches!(self, SolverResult::Unsat)
    }

    /// The model of a `Sat` result.
    pub fn model(&self) -> Option<&Model> {
        match self {
            SolverResult::Sat(model) => Some(model),
            _ => None,
        }
    }
}

/// A solver of constraint conjunctions.
///
/// The engine only depends on this seam; [`ProcessSolver`] is the shipped
/// implementation, tests script their own.
pub trait ConstraintSolver {
    fn solve(
        &self,
        constraints: &[Constraint],
        vars: &VariableSet,
    ) -> Result<SolverResult, SolverError>;
}
