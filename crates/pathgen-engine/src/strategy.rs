//! Path-extension strategies.
//!
//! A strategy turns the path condition of the latest concrete execution
//! into the ordered list of child goals to pursue next. Every child differs
//! from its parent in exactly one branch condition, replaced by its
//! negation; everything before that index is unchanged and everything
//! after is dropped (the child must be re-executed to discover what follows
//! the flipped branch).

use pathgen_expr::PathCondition;

/// A path condition annotated with the first branch index not yet explored
/// from this node. Lets generational search resume expansion where the
/// previous generation stopped instead of re-deriving explored prefixes.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationalPathCondition {
    pub path_condition: PathCondition,
    pub generated_from_index: usize,
}

impl GenerationalPathCondition {
    pub fn new(path_condition: PathCondition, generated_from_index: usize) -> Self {
        GenerationalPathCondition {
            path_condition,
            generated_from_index,
        }
    }

    /// A root node: nothing explored yet.
    pub fn root(path_condition: PathCondition) -> Self {
        Self::new(path_condition, 0)
    }
}

/// The closed set of path-extension policies.
///
/// `RevertedExpand` is a pure post-processing of `Expand`, so it is
/// composed from it rather than duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathExtensionStrategy {
    /// Negate every branch, deepest first: pursue the decision made last
    /// in the trace before backtracking to earlier ones.
    Dfs,
    /// Generational expansion: negate every branch from
    /// `generated_from_index` on, shallow to deep. The canonical
    /// "negate every remaining branch once per generation" policy.
    #[default]
    Expand,
    /// `Expand` deep-to-shallow.
    RevertedExpand,
}

impl PathExtensionStrategy {
    /// Generate this node's child goals.
    ///
    /// An empty path condition yields no children for any variant; an
    /// exhausted or out-of-range `generated_from_index` yields none for
    /// the generational variants.
    pub fn generate_children(
        &self,
        parent: &GenerationalPathCondition,
    ) -> Vec<GenerationalPathCondition> {
        match self {
            PathExtensionStrategy::Dfs => {
                // DFS does not use the resume index; children report a
                // constant placeholder.
                let mut children = Self::expand_from(parent, 0, false);
                children.reverse();
                children
            }
            PathExtensionStrategy::Expand => {
                Self::expand_from(parent, parent.generated_from_index, true)
            }
            PathExtensionStrategy::RevertedExpand => {
                let mut children =
                    Self::expand_from(parent, parent.generated_from_index, true);
                children.reverse();
                children
            }
        }
    }

    /// Children for every index `i` in `from..len`, shallow to deep: keep
    /// the prefix `[0..i)`, append the negation of branch `i`. With
    /// `generational` set, children carry `i + 1` so the next generation
    /// resumes right after the flip; otherwise they carry `0`.
    fn expand_from(
        parent: &GenerationalPathCondition,
        from: usize,
        generational: bool,
    ) -> Vec<GenerationalPathCondition> {
        let pc = &parent.path_condition;
        if from >= pc.len() {
            // Nothing left to explore (includes the empty path condition
            // and an out-of-range resume index).
            return Vec::new();
        }

        (from..pc.len())
            .map(|i| {
                let mut child = pc.prefix(i);
                child.push(pc.branch(i).negated());
                let generated_from_index = if generational { i + 1 } else { 0 };
                GenerationalPathCondition::new(child, generated_from_index)
            })
            .collect()
    }
}
