//! The pathgen concolic engine.
//!
//! Turns one concrete execution trace of the program under test into a
//! tree of alternative executions worth trying, and converts "make this
//! branch take the other direction" goals into concrete input values:
//! path-extension strategies pick the branches to negate, an external SMT
//! solver (via `pathgen-solver`) answers the symbolic queries, and the
//! alternating-variable-method local search covers the cases the solver
//! cannot.
//!
//! The engine is a library driven by the surrounding search loop; it has
//! no CLI surface. One [`driver::explore`] call is one sequential episode;
//! independent episodes run in parallel via [`driver::explore_all`].

pub mod avm;
pub mod driver;
pub mod strategy;

pub use avm::{apply_avm, SearchBudget};
pub use driver::{
    apply_model, explore, explore_all, AchievedGoal, ConcolicExecutor, Episode, ExecutionError,
    ExplorationConfig, ExplorationReport, StopReason,
};
pub use strategy::{GenerationalPathCondition, PathExtensionStrategy};
