//! External solver process invocation.
//!
//! The query is written to a temp file and the configured solver binary is
//! spawned on it. The call is bounded: a child that outlives its deadline
//! is killed and reported as a timeout, which the engine degrades to the
//! local-search fallback.

use crate::{model, smt, ConstraintSolver, SolverError, SolverResult};
use pathgen_expr::{Constraint, VariableSet};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How to invoke the external solver.
#[derive(Debug, Clone)]
pub struct SolverCommand {
    /// Solver binary, resolved via `PATH`.
    pub program: String,
    /// Arguments placed before the query file path.
    pub args: Vec<String>,
    /// Wall-clock deadline for one invocation.
    pub timeout: Duration,
}

impl Default for SolverCommand {
    fn default() -> Self {
        SolverCommand {
            program: "z3".to_string(),
            args: vec!["-smt2".to_string()],
            timeout: Duration::from_secs(15),
        }
    }
}

/// [`ConstraintSolver`] backed by a solver subprocess speaking SMT-LIB 2.
#[derive(Debug, Clone, Default)]
pub struct ProcessSolver {
    pub command: SolverCommand,
}

impl ProcessSolver {
    pub fn new(command: SolverCommand) -> Self {
        ProcessSolver { command }
    }

    /// Check if the solver binary is available on PATH.
    pub fn available(&self) -> bool {
        Command::new(&self.command.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl ConstraintSolver for ProcessSolver {
    fn solve(
        &self,
        constraints: &[Constraint],
        vars: &VariableSet,
    ) -> Result<SolverResult, SolverError> {
        if constraints.is_empty() {
            return Err(SolverError::EmptyQuery);
        }

        let query = smt::render_query(constraints, vars)?;

        let mut tmpfile = tempfile::Builder::new()
            .suffix(".smt2")
            .tempfile()
            .map_err(|e| SolverError::Process(format!("failed to create temp file: {e}")))?;
        tmpfile
            .write_all(query.as_bytes())
            .map_err(|e| SolverError::Process(format!("failed to write temp file: {e}")))?;
        tmpfile
            .flush()
            .map_err(|e| SolverError::Process(format!("failed to write temp file: {e}")))?;

        let path = tmpfile.path().to_string_lossy().into_owned();
        info!(
            program = %self.command.program,
            path = %path,
            constraints = constraints.len(),
            "invoking solver"
        );

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SolverError::Process(format!("failed to spawn solver: {e}")))?;

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if started.elapsed() >= self.command.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        debug!(elapsed = ?started.elapsed(), "solver killed on deadline");
                        return Err(SolverError::Timeout(self.command.timeout));
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => {
                    return Err(SolverError::Process(format!(
                        "failed to wait for solver: {e}"
                    )))
                }
            }
        };

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout);
        }
        let mut stderr = String::new();
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }

        debug!(
            status = %status,
            stdout = %stdout.trim(),
            "solver finished"
        );

        if stdout.trim().is_empty() {
            return Err(SolverError::Process(format!(
                "solver produced no output (status {status}): {}",
                stderr.trim()
            )));
        }

        model::parse_solver_output(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathgen_expr::{Comparator, Expr};

    /// A command that ignores the query file and prints a scripted
    /// response; lets the process plumbing be tested without a solver
    /// installed.
    fn scripted(script: &str, timeout_ms: u64) -> ProcessSolver {
        ProcessSolver::new(SolverCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    fn trivial_query() -> (Vec<Constraint>, VariableSet) {
        let mut vars = VariableSet::new();
        let x = vars.declare_integer("x", 0, i64::MIN, i64::MAX);
        let c = Constraint::new(Expr::var(x), Comparator::Eq, Expr::IntConst(1));
        (vec![c], vars)
    }

    #[test]
    fn test_empty_query_is_rejected() {
        let vars = VariableSet::new();
        let solver = scripted("echo unsat", 1000);
        assert!(matches!(
            solver.solve(&[], &vars),
            Err(SolverError::EmptyQuery)
        ));
    }

    #[test]
    fn test_scripted_unsat() {
        let (cs, vars) = trivial_query();
        let solver = scripted("echo unsat", 5000);
        assert_eq!(solver.solve(&cs, &vars).unwrap(), SolverResult::Unsat);
    }

    #[test]
    fn test_scripted_model() {
        let (cs, vars) = trivial_query();
        let solver = scripted("echo sat; echo '(model (define-fun x () Int 1))'", 5000);
        let result = solver.solve(&cs, &vars).unwrap();
        assert_eq!(
            result.model().unwrap()["x"],
            crate::ModelValue::Int(1)
        );
    }

    #[test]
    fn test_deadline_kills_the_child() {
        let (cs, vars) = trivial_query();
        let solver = scripted("sleep 30", 50);
        assert!(matches!(
            solver.solve(&cs, &vars),
            Err(SolverError::Timeout(_))
        ));
    }

    #[test]
    fn test_missing_binary_is_a_process_error() {
        let (cs, vars) = trivial_query();
        let solver = ProcessSolver::new(SolverCommand {
            program: "pathgen-no-such-solver".to_string(),
            args: vec![],
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(
            solver.solve(&cs, &vars),
            Err(SolverError::Process(_))
        ));
    }

    #[test]
    fn test_silent_child_is_a_process_error() {
        let (cs, vars) = trivial_query();
        let solver = scripted("true", 5000);
        assert!(matches!(
            solver.solve(&cs, &vars),
            Err(SolverError::Process(_))
        ));
    }
}
