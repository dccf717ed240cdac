//! Generational search driver.
//!
//! The orchestration loop: execute the program under test concretely,
//! expand the recorded path condition into child goals via the configured
//! strategy, and turn each goal into concrete inputs — solver first, AVM
//! local search as the fallback. Every failure mode degrades to "drop this
//! goal and continue"; nothing here is fatal to the episode.

use crate::avm::{apply_avm, SearchBudget};
use crate::strategy::{GenerationalPathCondition, PathExtensionStrategy};
use pathgen_expr::{
    Assignment, ConcreteValue, DistanceEstimator, Domain, PathCondition, VariableSet,
};
use pathgen_solver::{ConstraintSolver, Model, ModelValue, SolverResult};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Error from one concrete execution of the program under test.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("execution failed: {0}")]
    Failed(String),
}

/// The re-execution seam to the instrumentation layer: run the program
/// under test with the given inputs and hand back the recorded path
/// condition. Implementations are responsible for bounding the run; an
/// overrun is an [`ExecutionError::Timeout`], which the driver treats as a
/// failed goal attempt, not a crash of the engine.
pub trait ConcolicExecutor {
    fn run_concretely(&mut self, values: &Assignment) -> Result<PathCondition, ExecutionError>;
}

/// Configuration of one exploration episode.
#[derive(Debug, Clone, Default)]
pub struct ExplorationConfig {
    /// Which branches of the frontier to negate, and in which order.
    pub strategy: PathExtensionStrategy,
    /// Maximum concrete executions (0 = unlimited).
    pub max_executions: usize,
    /// Wall-clock limit for the episode (None = unlimited).
    pub max_time: Option<Duration>,
    /// Cooperative cancellation, checked between goal attempts.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Why an episode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The worklist ran dry: every reachable goal was tried.
    Exhausted,
    ExecutionLimit,
    TimeLimit,
    Cancelled,
    /// The seed execution itself failed; nothing to explore.
    SeedExecutionFailed,
}

/// A goal whose target branch actually took the other direction,
/// materialized for downstream test-input emission.
#[derive(Debug, Clone)]
pub struct AchievedGoal {
    /// The concrete inputs that flipped the branch.
    pub assignment: Assignment,
    /// The path condition the re-execution recorded.
    pub path_condition: PathCondition,
}

/// Outcome of one exploration episode.
#[derive(Debug)]
pub struct ExplorationReport {
    pub achieved: Vec<AchievedGoal>,
    /// Concrete executions performed, the seed included.
    pub executions: usize,
    /// Goals that produced an assignment and were re-executed.
    pub goals_attempted: usize,
    pub goals_achieved: usize,
    /// Attempted goals whose execution diverged before the target branch:
    /// the assignment solved the symbolic constraints but the concrete run
    /// went elsewhere. A normal exploration miss.
    pub goals_missed: usize,
    /// Goals whose constraint conjunction the solver proved unsatisfiable.
    pub goals_unsat: usize,
    /// Goals neither the solver nor local search could make progress on.
    pub goals_unreachable: usize,
    pub stop: StopReason,
}

/// One independent exploration episode: its own variable model and
/// executor, sharing nothing with other episodes.
pub struct Episode<E> {
    pub vars: VariableSet,
    pub executor: E,
}

/// Run independent episodes in parallel. Each operates on its own copy of
/// the constraint/variable model; only the solver, estimator, and config
/// are shared (read-only).
pub fn explore_all<E, S>(
    episodes: Vec<Episode<E>>,
    solver: &S,
    estimator: &(dyn DistanceEstimator + Sync),
    config: &ExplorationConfig,
) -> Vec<ExplorationReport>
where
    E: ConcolicExecutor + Send,
    S: ConstraintSolver + Sync,
{
    episodes
        .into_par_iter()
        .map(|mut episode| explore(&episode.vars, &mut episode.executor, solver, estimator, config))
        .collect()
}

/// Remembered outcome of a goal's solve attempt. A child whose query is in
/// the cache is skipped outright: re-solving an identical conjunction can
/// not produce new information, and under the DFS strategy (which carries
/// no resume index) skipping repeats is what keeps expansion finite.
enum CachedOutcome {
    Solved,
    Unsat,
    Unreachable,
}

/// A worklist entry: inputs to run, and the goal they were derived for.
struct Candidate {
    values: Assignment,
    origin: GenerationalPathCondition,
    /// Branch index expected to flip; `None` for the seed.
    target_index: Option<usize>,
}

/// Explore one entry point of the program under test.
pub fn explore<E, S>(
    vars: &VariableSet,
    executor: &mut E,
    solver: &S,
    estimator: &dyn DistanceEstimator,
    config: &ExplorationConfig,
) -> ExplorationReport
where
    E: ConcolicExecutor,
    S: ConstraintSolver,
{
    let started = Instant::now();
    let mut budget = match config.max_time {
        Some(limit) => SearchBudget::with_timeout(limit),
        None => SearchBudget::unlimited(),
    };
    if let Some(flag) = &config.cancel {
        budget = budget.with_cancel(Arc::clone(flag));
    }

    let mut report = ExplorationReport {
        achieved: Vec::new(),
        executions: 0,
        goals_attempted: 0,
        goals_achieved: 0,
        goals_missed: 0,
        goals_unsat: 0,
        goals_unreachable: 0,
        stop: StopReason::Exhausted,
    };

    // Path conditions already expanded, by normalized constraint set.
    let mut seen: HashSet<u64> = HashSet::new();
    // Goal outcomes by query fingerprint; a repeated child query is never
    // attempted twice.
    let mut query_cache: HashMap<u64, CachedOutcome> = HashMap::new();

    let mut worklist: VecDeque<Candidate> = VecDeque::new();
    worklist.push_back(Candidate {
        values: Assignment::initial(vars),
        origin: GenerationalPathCondition::root(PathCondition::default()),
        target_index: None,
    });

    info!(variables = vars.len(), strategy = ?config.strategy, "starting exploration episode");

    report.stop = 'search: loop {
        if is_cancelled(config) {
            break StopReason::Cancelled;
        }
        if over_time(config, started) {
            break StopReason::TimeLimit;
        }
        let Some(candidate) = worklist.pop_front() else {
            break StopReason::Exhausted;
        };
        if config.max_executions > 0 && report.executions >= config.max_executions {
            break StopReason::ExecutionLimit;
        }

        // Run the candidate concretely.
        let pc = match executor.run_concretely(&candidate.values) {
            Ok(pc) => pc,
            Err(e) => {
                if candidate.target_index.is_none() {
                    warn!(error = %e, "seed execution failed");
                    break StopReason::SeedExecutionFailed;
                }
                debug!(error = %e, "goal execution failed, dropping goal");
                report.goals_attempted += 1;
                report.goals_missed += 1;
                continue;
            }
        };
        report.executions += 1;
        debug!(branches = pc.len(), "path condition collected");

        // Did the target branch actually take the other direction?
        let mut diverged = false;
        if let Some(target) = candidate.target_index {
            report.goals_attempted += 1;
            let expected = &candidate.origin.path_condition;
            if pc.shares_prefix(expected, target + 1) {
                report.goals_achieved += 1;
                debug!(target, "goal achieved, branch flipped");
                report.achieved.push(AchievedGoal {
                    assignment: candidate.values.clone(),
                    path_condition: pc.clone(),
                });
            } else {
                // Solved symbolically, but the concrete run went
                // elsewhere. A normal miss.
                report.goals_missed += 1;
                diverged = true;
                debug!(target, "execution diverged from the expected path");
            }
        }

        // On divergence, keep the lowest resume index we are sure of.
        let generated_from_index = candidate.origin.generated_from_index.min(pc.len());
        let node = GenerationalPathCondition::new(pc, generated_from_index);

        let node_fp = node.path_condition.normalized_fingerprint();
        if diverged && seen.contains(&node_fp) {
            debug!("diverged onto an already-explored path condition, skipping expansion");
            continue;
        }
        seen.insert(node_fp);

        let children = config.strategy.generate_children(&node);
        trace!(children = children.len(), "expanded path condition");

        for child in children {
            if is_cancelled(config) {
                break 'search StopReason::Cancelled;
            }
            if over_time(config, started) {
                break 'search StopReason::TimeLimit;
            }

            let child_fp = child.path_condition.normalized_fingerprint();
            if seen.contains(&child_fp) {
                trace!("child already explored, skipping");
                continue;
            }
            if query_cache.contains_key(&child_fp) {
                trace!("child query already attempted, skipping");
                continue;
            }

            let constraints = child.path_condition.constraints();
            let outcome = match solver.solve(&constraints, vars) {
                Ok(SolverResult::Sat(model)) => {
                    debug!("child query is satisfiable");
                    let mut values = candidate.values.clone();
                    apply_model(&model, vars, &mut values);
                    enqueue(&mut worklist, values, child);
                    CachedOutcome::Solved
                }
                Ok(SolverResult::Unsat) => {
                    debug!("child query is unsatisfiable");
                    report.goals_unsat += 1;
                    CachedOutcome::Unsat
                }
                Ok(SolverResult::Unknown) => {
                    debug!("solver outcome unknown, falling back to local search");
                    avm_or_drop(
                        vars, estimator, &budget, &candidate, child, &mut worklist, &mut report,
                    )
                }
                Err(e) => {
                    debug!(error = %e, "solver failed, falling back to local search");
                    avm_or_drop(
                        vars, estimator, &budget, &candidate, child, &mut worklist, &mut report,
                    )
                }
            };
            query_cache.insert(child_fp, outcome);
        }
    };

    info!(
        stop = ?report.stop,
        executions = report.executions,
        achieved = report.goals_achieved,
        missed = report.goals_missed,
        unsat = report.goals_unsat,
        unreachable = report.goals_unreachable,
        elapsed = ?started.elapsed(),
        "exploration episode finished"
    );
    report
}

fn is_cancelled(config: &ExplorationConfig) -> bool {
    config
        .cancel
        .as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}

fn over_time(config: &ExplorationConfig, started: Instant) -> bool {
    config
        .max_time
        .map(|limit| started.elapsed() >= limit)
        .unwrap_or(false)
}

fn enqueue(worklist: &mut VecDeque<Candidate>, values: Assignment, goal: GenerationalPathCondition) {
    let target_index = goal.path_condition.len() - 1;
    worklist.push_back(Candidate {
        values,
        origin: goal,
        target_index: Some(target_index),
    });
}

/// AVM fallback: local search on each variable of the newly negated
/// constraint, in first-appearance order, against the goal's whole
/// conjunction. Enqueues on success, records the goal unreachable
/// otherwise.
fn avm_or_drop(
    vars: &VariableSet,
    estimator: &dyn DistanceEstimator,
    budget: &SearchBudget,
    candidate: &Candidate,
    child: GenerationalPathCondition,
    worklist: &mut VecDeque<Candidate>,
    report: &mut ExplorationReport,
) -> CachedOutcome {
    let constraints = child.path_condition.constraints();
    let target = child
        .path_condition
        .branch(child.path_condition.len() - 1)
        .constraint
        .clone();

    let mut trial = candidate.values.clone();
    if estimator.distance(&constraints, vars, &trial) == 0.0 {
        // The current values already satisfy the goal.
        enqueue(worklist, trial, child);
        return CachedOutcome::Solved;
    }

    for var in target.variables() {
        if budget.expired() {
            break;
        }
        apply_avm(var, vars, &mut trial, &constraints, estimator, budget);
        if estimator.distance(&constraints, vars, &trial) == 0.0 {
            debug!(var = %vars.get(var).name, "local search satisfied the goal");
            enqueue(worklist, trial, child);
            return CachedOutcome::Solved;
        }
    }

    debug!("goal unreachable: neither solver nor local search made progress");
    report.goals_unreachable += 1;
    CachedOutcome::Unreachable
}

/// Write a solver model into an assignment. Unknown names are ignored,
/// variables missing from the model keep their current values, and values
/// outside a variable's declared bounds are clamped on write.
pub fn apply_model(model: &Model, vars: &VariableSet, values: &mut Assignment) {
    for (name, value) in model {
        let Some(id) = vars.lookup(name) else {
            trace!(name = %name, "model names an unknown variable, ignoring");
            continue;
        };
        let concrete = match (value, &vars.get(id).domain) {
            (ModelValue::Int(n), Domain::Integer { .. }) => ConcreteValue::Int(*n),
            (ModelValue::Real(x), Domain::Real { .. }) => ConcreteValue::Real(*x),
            (ModelValue::Str(s), Domain::String) => ConcreteValue::Str(s.clone()),
            (value, domain) => {
                warn!(name = %name, ?value, ?domain, "model value sort does not match variable domain, ignoring");
                continue;
            }
        };
        values.set(vars, id, concrete);
    }
}
