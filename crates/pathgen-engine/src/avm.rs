//! Alternating Variable Method local search.
//!
//! Mutates one variable's concrete value in place to drive the distance of
//! a constraint set toward zero: probe a unit step in each direction, and
//! while a direction keeps improving, double the step. Checkpoint/restore
//! discipline throughout — whatever happens (plateau, budget expiry,
//! cancellation), the variable is left at the best value found, never
//! worse than on entry.

use pathgen_expr::{
    Assignment, ConcreteValue, Constraint, DistanceEstimator, Domain, VarId, VariableSet,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Cooperative budget for one search episode: an optional wall-clock
/// deadline and an optional external cancel flag.
#[derive(Debug, Clone, Default)]
pub struct SearchBudget {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        SearchBudget {
            deadline: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    /// Attach an external cancellation flag (shared across episodes).
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn expired(&self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        false
    }
}

/// Best value/distance pair found so far. Restoring means writing
/// `value` back; the search never returns with the variable at a distance
/// above `distance`.
#[derive(Debug, Clone)]
struct Checkpoint<T> {
    value: T,
    distance: f64,
}

/// Run AVM on one variable against a constraint conjunction.
///
/// Returns `true` iff an improving value was found and retained. `false`
/// is a normal outcome: either the constraints were already satisfied, or
/// this variable alone cannot improve them and the caller should try
/// another variable or abandon the goal.
pub fn apply_avm(
    var: VarId,
    vars: &VariableSet,
    values: &mut Assignment,
    constraints: &[Constraint],
    estimator: &dyn DistanceEstimator,
    budget: &SearchBudget,
) -> bool {
    let search = VarSearch {
        var,
        vars,
        constraints,
        estimator,
        budget,
    };
    match vars.get(var).domain {
        Domain::Integer { min, max } => search.integer_avm(values, min, max),
        Domain::Real { min, max } => search.real_avm(values, min, max),
        Domain::String => search.string_avm(values),
    }
}

struct VarSearch<'a> {
    var: VarId,
    vars: &'a VariableSet,
    constraints: &'a [Constraint],
    estimator: &'a dyn DistanceEstimator,
    budget: &'a SearchBudget,
}

impl VarSearch<'_> {
    fn distance(&self, values: &Assignment) -> f64 {
        self.estimator.distance(self.constraints, self.vars, values)
    }

    // === Integer ===

    fn integer_avm(&self, values: &mut Assignment, min: i64, max: i64) -> bool {
        let initial = self.distance(values);
        if initial == 0.0 {
            return false;
        }
        let start = values
            .get(self.var)
            .as_int()
            .expect("integer variable holds integer value");
        let mut ck = Checkpoint {
            value: start,
            distance: initial,
        };
        let mut improvement = false;
        debug!(var = %self.vars.get(self.var).name, start, initial, "integer AVM");

        loop {
            if self.budget.expired() {
                self.restore_int(values, &ck);
                return improvement;
            }

            // Probe +1.
            if self.probe_int(values, &mut ck, 1, min, max) {
                improvement = true;
                if ck.distance == 0.0 || self.iterate_int(values, &mut ck, 2, min, max) {
                    return true;
                }
                continue;
            }

            // Probe -1.
            if self.probe_int(values, &mut ck, -1, min, max) {
                improvement = true;
                if ck.distance == 0.0 || self.iterate_int(values, &mut ck, -2, min, max) {
                    return true;
                }
                continue;
            }

            // Neither direction improves.
            break;
        }
        self.restore_int(values, &ck);
        improvement
    }

    /// One unit probe from the checkpoint. On improvement the checkpoint
    /// moves and the probe value stays; otherwise the checkpoint is
    /// restored.
    fn probe_int(
        &self,
        values: &mut Assignment,
        ck: &mut Checkpoint<i64>,
        delta: i64,
        min: i64,
        max: i64,
    ) -> bool {
        let next = step_int(ck.value, delta, min, max);
        values.set(self.vars, self.var, ConcreteValue::Int(next));
        let d = self.distance(values);
        trace!(next, d, best = ck.distance, "integer probe");
        if d < ck.distance {
            *ck = Checkpoint {
                value: next,
                distance: d,
            };
            true
        } else {
            self.restore_int(values, ck);
            false
        }
    }

    /// The exponential phase: keep applying `delta`, doubling after every
    /// improvement, until no further improvement or solved. Leaves the
    /// variable at the checkpoint. Returns `true` iff solved.
    fn iterate_int(
        &self,
        values: &mut Assignment,
        ck: &mut Checkpoint<i64>,
        mut delta: i64,
        min: i64,
        max: i64,
    ) -> bool {
        loop {
            if self.budget.expired() {
                break;
            }
            let next = step_int(ck.value, delta, min, max);
            if next == ck.value {
                // Saturated at a bound.
                break;
            }
            values.set(self.vars, self.var, ConcreteValue::Int(next));
            let d = self.distance(values);
            trace!(next, d, best = ck.distance, delta, "integer iterate");
            if d < ck.distance {
                *ck = Checkpoint {
                    value: next,
                    distance: d,
                };
                if d == 0.0 {
                    return true;
                }
                delta = delta.saturating_mul(2);
            } else {
                break;
            }
        }
        self.restore_int(values, ck);
        false
    }

    fn restore_int(&self, values: &mut Assignment, ck: &Checkpoint<i64>) {
        values.set(self.vars, self.var, ConcreteValue::Int(ck.value));
    }

    // === Real ===

    fn real_avm(&self, values: &mut Assignment, min: f64, max: f64) -> bool {
        let initial = self.distance(values);
        if initial == 0.0 {
            return false;
        }
        let mut improvement = self.real_search(values, 1.0, min, max);

        if self.distance(values) > 0.0 {
            if self.refine_precision(values, min, max) {
                improvement = true;
            }
        }
        improvement
    }

    /// Precision refinement after the whole-unit search plateaus: round to
    /// `p` decimal digits (banker's rounding, kept only if distance does
    /// not worsen), then search at step `10^-p`.
    fn refine_precision(&self, values: &mut Assignment, min: f64, max: f64) -> bool {
        // Values confined to a 32-bit float range carry fewer meaningful
        // decimal digits.
        let max_precision = if min >= f32::MIN as f64 && max <= f32::MAX as f64 {
            7
        } else {
            15
        };
        let mut improvement = false;

        for precision in 1..=max_precision {
            if self.budget.expired() {
                break;
            }
            debug!(precision, "real AVM refinement");

            let before = self.distance(values);
            let value = values
                .get(self.var)
                .as_real()
                .expect("real variable holds real value");
            let rounded = round_to_precision(value, precision).clamp(min, max);
            values.set(self.vars, self.var, ConcreteValue::Real(rounded));
            let d = self.distance(values);
            if d > before {
                values.set(self.vars, self.var, ConcreteValue::Real(value));
            } else if d < before {
                improvement = true;
            }
            if self.distance(values) == 0.0 {
                return true;
            }

            if self.real_search(values, 10f64.powi(-precision), min, max) {
                improvement = true;
            }
            if self.distance(values) == 0.0 {
                break;
            }
        }
        improvement
    }

    /// Probe ±delta and exponentially iterate, exactly like the integer
    /// search but at the given scale.
    fn real_search(&self, values: &mut Assignment, delta: f64, min: f64, max: f64) -> bool {
        let initial = self.distance(values);
        if initial == 0.0 {
            return false;
        }
        let start = values
            .get(self.var)
            .as_real()
            .expect("real variable holds real value");
        let mut ck = Checkpoint {
            value: start,
            distance: initial,
        };
        let mut improvement = false;

        loop {
            if self.budget.expired() {
                self.restore_real(values, &ck);
                return improvement;
            }

            if self.probe_real(values, &mut ck, delta, min, max) {
                improvement = true;
                if ck.distance == 0.0 || self.iterate_real(values, &mut ck, 2.0 * delta, min, max)
                {
                    return true;
                }
                continue;
            }

            if self.probe_real(values, &mut ck, -delta, min, max) {
                improvement = true;
                if ck.distance == 0.0 || self.iterate_real(values, &mut ck, -2.0 * delta, min, max)
                {
                    return true;
                }
                continue;
            }

            break;
        }
        self.restore_real(values, &ck);
        improvement
    }

    fn probe_real(
        &self,
        values: &mut Assignment,
        ck: &mut Checkpoint<f64>,
        delta: f64,
        min: f64,
        max: f64,
    ) -> bool {
        let next = (ck.value + delta).clamp(min, max);
        values.set(self.vars, self.var, ConcreteValue::Real(next));
        let d = self.distance(values);
        trace!(next, d, best = ck.distance, "real probe");
        if d < ck.distance {
            *ck = Checkpoint {
                value: next,
                distance: d,
            };
            true
        } else {
            self.restore_real(values, ck);
            false
        }
    }

    fn iterate_real(
        &self,
        values: &mut Assignment,
        ck: &mut Checkpoint<f64>,
        mut delta: f64,
        min: f64,
        max: f64,
    ) -> bool {
        loop {
            if self.budget.expired() {
                break;
            }
            let next = (ck.value + delta).clamp(min, max);
            if next == ck.value {
                break;
            }
            values.set(self.vars, self.var, ConcreteValue::Real(next));
            let d = self.distance(values);
            trace!(next, d, best = ck.distance, delta, "real iterate");
            if d < ck.distance {
                *ck = Checkpoint {
                    value: next,
                    distance: d,
                };
                if d == 0.0 {
                    return true;
                }
                delta *= 2.0;
            } else {
                break;
            }
        }
        self.restore_real(values, ck);
        false
    }

    fn restore_real(&self, values: &mut Assignment, ck: &Checkpoint<f64>) {
        values.set(self.vars, self.var, ConcreteValue::Real(ck.value));
    }

    // === String ===

    fn string_avm(&self, values: &mut Assignment) -> bool {
        let initial = self.distance(values);
        if initial == 0.0 {
            return false;
        }
        let start = values
            .get(self.var)
            .as_str()
            .expect("string variable holds string value")
            .to_string();
        let mut ck = Checkpoint {
            value: start,
            distance: initial,
        };
        let mut improvement = false;
        debug!(var = %self.vars.get(self.var).name, initial, "string AVM");

        // Chop characters from the back while distance does not worsen.
        while !ck.value.is_empty() {
            if self.budget.expired() {
                self.restore_str(values, &ck);
                return improvement;
            }
            let mut shorter: Vec<char> = ck.value.chars().collect();
            shorter.pop();
            let candidate: String = shorter.into_iter().collect();
            values.set(self.vars, self.var, ConcreteValue::Str(candidate.clone()));
            let d = self.distance(values);
            trace!(candidate = %candidate, d, best = ck.distance, "string chop");
            if d <= ck.distance {
                ck = Checkpoint {
                    value: candidate,
                    distance: d,
                };
                improvement = true;
                if d == 0.0 {
                    return true;
                }
            } else {
                self.restore_str(values, &ck);
                break;
            }
        }

        // Per-character search over every position.
        let len = ck.value.chars().count();
        for position in 0..len {
            if self.budget.expired() {
                self.restore_str(values, &ck);
                return improvement;
            }
            if self.character_avm(values, &mut ck, position) {
                improvement = true;
            }
            if ck.distance == 0.0 {
                return true;
            }
        }

        // Append characters at the end while that improves, optimizing
        // each appended character in place. The seed character is
        // arbitrary; the per-character search immediately reshapes it.
        loop {
            if self.budget.expired() {
                self.restore_str(values, &ck);
                return improvement;
            }
            let mut candidate = ck.value.clone();
            candidate.push('a');
            values.set(self.vars, self.var, ConcreteValue::Str(candidate.clone()));
            let d = self.distance(values);
            trace!(candidate = %candidate, d, best = ck.distance, "string append");
            if d < ck.distance {
                improvement = true;
                let position = candidate.chars().count() - 1;
                ck = Checkpoint {
                    value: candidate,
                    distance: d,
                };
                if d == 0.0 {
                    return true;
                }
                self.character_avm(values, &mut ck, position);
                if ck.distance == 0.0 {
                    return true;
                }
            } else {
                self.restore_str(values, &ck);
                break;
            }
        }

        improvement
    }

    /// AVM on the character at `position`: probe codepoint ±1, then the
    /// case distance ±32, doubling while improving.
    fn character_avm(
        &self,
        values: &mut Assignment,
        ck: &mut Checkpoint<String>,
        position: usize,
    ) -> bool {
        let mut improvement = false;
        loop {
            if self.budget.expired() {
                self.restore_str(values, ck);
                return improvement;
            }

            if self.probe_char(values, ck, position, 1) {
                improvement = true;
                if ck.distance == 0.0 || self.iterate_char(values, ck, position, 2) {
                    return true;
                }
                continue;
            }
            if self.probe_char(values, ck, position, -1) {
                improvement = true;
                if ck.distance == 0.0 || self.iterate_char(values, ck, position, -2) {
                    return true;
                }
                continue;
            }
            // Case flip often jumps straight across the landscape.
            if self.probe_char(values, ck, position, 32) || self.probe_char(values, ck, position, -32)
            {
                improvement = true;
                if ck.distance == 0.0 {
                    return true;
                }
                continue;
            }
            break;
        }
        self.restore_str(values, ck);
        improvement
    }

    fn probe_char(
        &self,
        values: &mut Assignment,
        ck: &mut Checkpoint<String>,
        position: usize,
        delta: i64,
    ) -> bool {
        let Some(candidate) = replace_char(&ck.value, position, delta) else {
            return false;
        };
        values.set(self.vars, self.var, ConcreteValue::Str(candidate.clone()));
        let d = self.distance(values);
        trace!(candidate = %candidate, d, best = ck.distance, position, "character probe");
        if d < ck.distance {
            *ck = Checkpoint {
                value: candidate,
                distance: d,
            };
            true
        } else {
            self.restore_str(values, ck);
            false
        }
    }

    fn iterate_char(
        &self,
        values: &mut Assignment,
        ck: &mut Checkpoint<String>,
        position: usize,
        mut delta: i64,
    ) -> bool {
        loop {
            if self.budget.expired() {
                break;
            }
            let Some(candidate) = replace_char(&ck.value, position, delta) else {
                break;
            };
            if candidate == ck.value {
                break;
            }
            values.set(self.vars, self.var, ConcreteValue::Str(candidate.clone()));
            let d = self.distance(values);
            trace!(candidate = %candidate, d, best = ck.distance, delta, "character iterate");
            if d < ck.distance {
                *ck = Checkpoint {
                    value: candidate,
                    distance: d,
                };
                if d == 0.0 {
                    return true;
                }
                delta = delta.saturating_mul(2);
            } else {
                break;
            }
        }
        self.restore_str(values, ck);
        false
    }

    fn restore_str(&self, values: &mut Assignment, ck: &Checkpoint<String>) {
        values.set(self.vars, self.var, ConcreteValue::Str(ck.value.clone()));
    }
}

/// Saturating, clamped integer step.
fn step_int(value: i64, delta: i64, min: i64, max: i64) -> i64 {
    value.saturating_add(delta).clamp(min, max)
}

/// Round to `p` decimal digits, ties to even.
fn round_to_precision(x: f64, p: i32) -> f64 {
    let scale = 10f64.powi(p);
    (x * scale).round_ties_even() / scale
}

/// `s` with the character at `position` stepped by `delta` codepoints,
/// saturating at the valid range and skipping the surrogate gap.
fn replace_char(s: &str, position: usize, delta: i64) -> Option<String> {
    let mut chars: Vec<char> = s.chars().collect();
    let old = *chars.get(position)?;
    chars[position] = step_char(old, delta);
    Some(chars.into_iter().collect())
}

fn step_char(c: char, delta: i64) -> char {
    let mut cp = (c as i64).saturating_add(delta).clamp(0, 0x10FFFF);
    // Surrogates are not scalar values; step over the gap.
    if (0xD800..=0xDFFF).contains(&cp) {
        cp = if delta >= 0 { 0xE000 } else { 0xD7FF };
    }
    char::from_u32(cp as u32).expect("codepoint validated")
}
