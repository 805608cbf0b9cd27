//! Constraint reduction: narrowing a permissive base with matched rule reductions.
//!
//! Reductions are monotonic. Every step lowers, clears, or removes; a key absent
//! from the base is never created. Steps are applied in the order given, which
//! matters because capping and scaling do not commute.

use governor_primitives::{ConstraintSet, Reduction};
use tracing::trace;

use crate::error::EvaluationError;

/// Applies one reduction in place. Returns `true` if the set changed.
///
/// # Errors
///
/// Returns [`EvaluationError::InvalidReduction`] when the reduction would widen
/// a limit or names an empty key.
pub fn apply_reduction(
    constraints: &mut ConstraintSet,
    reduction: &Reduction,
) -> Result<bool, EvaluationError> {
    reduction
        .validate()
        .map_err(|err| EvaluationError::InvalidReduction {
            rule: None,
            reason: err.to_string(),
        })?;

    let changed = match reduction {
        Reduction::CapLimit { key, max } => constraints.cap_limit(key, *max),
        Reduction::ScaleLimit { key, percent } => constraints.scale_limit(key, *percent),
        Reduction::Disable { flag } => constraints.disable(flag),
        Reduction::Remove { set, items } => constraints.remove_items(set, items),
        Reduction::Restrict { set, allowed } => constraints.restrict(set, allowed),
    };
    trace!(key = reduction.key(), changed, "reduction applied");
    Ok(changed)
}

/// Result of a reduction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionOutcome {
    constraints: ConstraintSet,
    applied: usize,
    unchanged: usize,
}

impl ReductionOutcome {
    /// Returns the reduced constraint set.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Consumes the outcome and returns the reduced constraint set.
    #[must_use]
    pub fn into_constraints(self) -> ConstraintSet {
        self.constraints
    }

    /// Number of reductions that changed the set.
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.applied
    }

    /// Number of reductions that were no-ops.
    #[must_use]
    pub const fn unchanged(&self) -> usize {
        self.unchanged
    }
}

/// Narrows a base constraint set.
#[derive(Debug, Clone)]
pub struct ConstraintReducer {
    base: ConstraintSet,
}

impl ConstraintReducer {
    /// Creates a reducer over the given base set.
    #[must_use]
    pub fn new(base: ConstraintSet) -> Self {
        Self { base }
    }

    /// Returns the base set.
    #[must_use]
    pub fn base(&self) -> &ConstraintSet {
        &self.base
    }

    /// Applies `reductions` in order to a copy of the base set.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::InvalidReduction`] for the first invalid step;
    /// the base set is left untouched.
    pub fn reduce<'a, I>(&self, reductions: I) -> Result<ReductionOutcome, EvaluationError>
    where
        I: IntoIterator<Item = &'a Reduction>,
    {
        let mut constraints = self.base.clone();
        let mut applied = 0;
        let mut unchanged = 0;
        for reduction in reductions {
            if apply_reduction(&mut constraints, reduction)? {
                applied += 1;
            } else {
                unchanged += 1;
            }
        }

        Ok(ReductionOutcome {
            constraints,
            applied,
            unchanged,
        })
    }
}
