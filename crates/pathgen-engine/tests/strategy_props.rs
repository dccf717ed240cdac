//! Property tests for the path-extension strategy laws.

use pathgen_engine::{GenerationalPathCondition, PathExtensionStrategy};
use pathgen_expr::{BranchCondition, Comparator, Constraint, Expr, PathCondition, VariableSet};
use proptest::prelude::*;

/// A path condition of `n` branches with varied comparators and outcomes.
fn path_of(n: usize) -> PathCondition {
    let mut vars = VariableSet::new();
    let x = vars.declare_integer("x", 0, i64::MIN, i64::MAX);
    let comparators = [
        Comparator::Eq,
        Comparator::Ne,
        Comparator::Lt,
        Comparator::Le,
        Comparator::Gt,
        Comparator::Ge,
    ];
    (0..n)
        .map(|i| {
            BranchCondition::new(
                Constraint::new(
                    Expr::var(x),
                    comparators[i % comparators.len()],
                    Expr::IntConst(i as i64),
                ),
                i % 2 == 0,
            )
        })
        .collect()
}

proptest! {
    /// DFS emits exactly `n` children, deepest negation first.
    #[test]
    fn dfs_shape(n in 0usize..32) {
        let pc = path_of(n);
        let parent = GenerationalPathCondition::root(pc.clone());
        let children = PathExtensionStrategy::Dfs.generate_children(&parent);

        prop_assert_eq!(children.len(), n);
        for (i, child) in children.iter().enumerate() {
            prop_assert_eq!(child.path_condition.len(), n - i);
            let flipped = n - 1 - i;
            prop_assert_eq!(
                child.path_condition.branch(flipped),
                &pc.branch(flipped).negated()
            );
            prop_assert!(child.path_condition.shares_prefix(&pc, flipped));
        }
    }

    /// Expand emits `n - k` children resuming at `k`, shallow to deep,
    /// with resume indexes advancing one past each flip.
    #[test]
    fn expand_shape(n in 0usize..32, k in 0usize..40) {
        let pc = path_of(n);
        let parent = GenerationalPathCondition::new(pc.clone(), k);
        let children = PathExtensionStrategy::Expand.generate_children(&parent);

        prop_assert_eq!(children.len(), n.saturating_sub(k));
        for (j, child) in children.iter().enumerate() {
            prop_assert_eq!(child.path_condition.len(), k + j + 1);
            prop_assert_eq!(
                child.path_condition.branch(k + j),
                &pc.branch(k + j).negated()
            );
            prop_assert_eq!(child.generated_from_index, k + j + 1);
        }
    }

    /// RevertedExpand is Expand's output exactly reversed.
    #[test]
    fn reverted_expand_is_reverse(n in 0usize..32, k in 0usize..40) {
        let pc = path_of(n);
        let parent = GenerationalPathCondition::new(pc, k);
        let mut expand = PathExtensionStrategy::Expand.generate_children(&parent);
        let reverted = PathExtensionStrategy::RevertedExpand.generate_children(&parent);
        expand.reverse();
        prop_assert_eq!(expand, reverted);
    }

    /// Double negation of any branch is the identity.
    #[test]
    fn branch_negation_is_involutive(n in 1usize..32) {
        let pc = path_of(n);
        for bc in pc.iter() {
            prop_assert_eq!(&bc.negated().negated(), bc);
        }
    }
}
