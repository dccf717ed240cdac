//! Symbolic variables and their concrete assignments.
//!
//! Variables are registered once per distinct input source in a
//! [`VariableSet`] and referenced everywhere else by dense [`VarId`]. The
//! current concrete values live in a separate [`Assignment`] so the local
//! search can mutate values in place while the variable declarations stay
//! shared and immutable.

use std::collections::HashMap;
use std::fmt;

/// Index of a variable within its [`VariableSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Declared domain of a symbolic variable.
///
/// Numeric domains carry inclusive bounds; every concrete value written
/// through [`Assignment::set`] is clamped into them. Strings are unbounded.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    Integer { min: i64, max: i64 },
    Real { min: f64, max: f64 },
    String,
}

/// One symbolic input source: a name, a domain, and the concrete value it
/// had in the seed execution.
#[derive(Debug, Clone)]
pub struct SymbolicVariable {
    pub name: String,
    pub domain: Domain,
    pub initial: ConcreteValue,
}

/// A concrete value of one of the three supported sorts.
#[derive(Debug, Clone, PartialEq)]
pub enum ConcreteValue {
    Int(i64),
    Real(f64),
    Str(String),
}

impl ConcreteValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConcreteValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            ConcreteValue::Real(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConcreteValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ConcreteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteValue::Int(n) => write!(f, "{n}"),
            ConcreteValue::Real(x) => write!(f, "{x}"),
            ConcreteValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Registry of the symbolic variables of one search episode.
///
/// Append-only: variables are declared up front (one per input source) and
/// never removed while the episode runs.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    vars: Vec<SymbolicVariable>,
    by_name: HashMap<String, VarId>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an integer variable with inclusive bounds.
    pub fn declare_integer(&mut self, name: &str, initial: i64, min: i64, max: i64) -> VarId {
        self.declare(SymbolicVariable {
            name: name.to_string(),
            domain: Domain::Integer { min, max },
            initial: ConcreteValue::Int(initial.clamp(min, max)),
        })
    }

    /// Declare a real variable with inclusive bounds.
    pub fn declare_real(&mut self, name: &str, initial: f64, min: f64, max: f64) -> VarId {
        self.declare(SymbolicVariable {
            name: name.to_string(),
            domain: Domain::Real { min, max },
            initial: ConcreteValue::Real(initial.clamp(min, max)),
        })
    }

    /// Declare a string variable.
    pub fn declare_string(&mut self, name: &str, initial: &str) -> VarId {
        self.declare(SymbolicVariable {
            name: name.to_string(),
            domain: Domain::String,
            initial: ConcreteValue::Str(initial.to_string()),
        })
    }

    fn declare(&mut self, var: SymbolicVariable) -> VarId {
        debug_assert!(
            !self.by_name.contains_key(&var.name),
            "variable '{}' declared twice",
            var.name
        );
        let id = VarId(self.vars.len());
        self.by_name.insert(var.name.clone(), id);
        self.vars.push(var);
        id
    }

    pub fn get(&self, id: VarId) -> &SymbolicVariable {
        &self.vars[id.0]
    }

    /// Look a variable up by its solver-facing name.
    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &SymbolicVariable)> {
        self.vars.iter().enumerate().map(|(i, v)| (VarId(i), v))
    }
}

/// The current concrete value of every variable in a [`VariableSet`].
///
/// This is the piece of state the AVM search mutates in place and the
/// driver clones per candidate; one slot per declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    values: Vec<ConcreteValue>,
}

impl Assignment {
    /// The assignment of the seed execution: every variable at its initial
    /// concrete value.
    pub fn initial(vars: &VariableSet) -> Self {
        Self {
            values: vars.vars.iter().map(|v| v.initial.clone()).collect(),
        }
    }

    pub fn get(&self, id: VarId) -> &ConcreteValue {
        &self.values[id.0]
    }

    /// Write a value, clamping numeric values into the variable's declared
    /// bounds. An out-of-bounds value is a normal occurrence (solver models
    /// and saturating search steps both produce them), never an error.
    pub fn set(&mut self, vars: &VariableSet, id: VarId, value: ConcreteValue) {
        let clamped = match (&vars.get(id).domain, value) {
            (Domain::Integer { min, max }, ConcreteValue::Int(n)) => {
                ConcreteValue::Int(n.clamp(*min, *max))
            }
            (Domain::Real { min, max }, ConcreteValue::Real(x)) => {
                ConcreteValue::Real(x.clamp(*min, *max))
            }
            (Domain::String, v @ ConcreteValue::Str(_)) => v,
            (domain, value) => {
                // Sort mismatch is a caller bug, not a runtime condition.
                panic!(
                    "value {value:?} does not fit domain {domain:?} of variable '{}'",
                    vars.get(id).name
                );
            }
        };
        self.values[id.0] = clamped;
    }
}
