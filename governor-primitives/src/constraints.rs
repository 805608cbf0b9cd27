//! Constraint sets describing granted permissions, and reductions over them.
//!
//! A [`ConstraintSet`] can only be narrowed after construction: every mutating
//! method lowers a limit, clears a flag, or removes set members. Keys that are
//! absent stay absent.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Permissions granted to an action: numeric limits, boolean flags, and string sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    limits: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    flags: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    sets: BTreeMap<String, BTreeSet<String>>,
}

impl ConstraintSet {
    /// Returns a set granting nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a numeric limit.
    #[must_use]
    pub fn with_limit(mut self, key: impl Into<String>, value: u64) -> Self {
        self.limits.insert(key.into(), value);
        self
    }

    /// Adds a boolean flag.
    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>, value: bool) -> Self {
        self.flags.insert(key.into(), value);
        self
    }

    /// Adds a named string set.
    #[must_use]
    pub fn with_set<I, S>(mut self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sets
            .insert(key.into(), items.into_iter().map(Into::into).collect());
        self
    }

    /// Returns a numeric limit.
    #[must_use]
    pub fn limit(&self, key: &str) -> Option<u64> {
        self.limits.get(key).copied()
    }

    /// Returns a flag value.
    #[must_use]
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.flags.get(key).copied()
    }

    /// Returns a string set.
    #[must_use]
    pub fn set(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.sets.get(key)
    }

    /// Returns `true` when nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.flags.is_empty() && self.sets.is_empty()
    }

    /// Lowers a limit to at most `max`. Returns `true` if the value changed.
    pub fn cap_limit(&mut self, key: &str, max: u64) -> bool {
        match self.limits.get_mut(key) {
            Some(value) if *value > max => {
                *value = max;
                true
            }
            _ => false,
        }
    }

    /// Scales a limit down to `percent` of its value, rounding down.
    ///
    /// Percentages above 100 are clamped to 100.
    pub fn scale_limit(&mut self, key: &str, percent: u32) -> bool {
        let percent = u64::from(percent.min(100));
        match self.limits.get_mut(key) {
            Some(value) => {
                let scaled = u64::try_from(u128::from(*value) * u128::from(percent) / 100)
                    .unwrap_or(*value);
                let changed = scaled != *value;
                *value = scaled;
                changed
            }
            None => false,
        }
    }

    /// Clears a flag. Returns `true` if the flag was previously set.
    pub fn disable(&mut self, key: &str) -> bool {
        match self.flags.get_mut(key) {
            Some(value) if *value => {
                *value = false;
                true
            }
            _ => false,
        }
    }

    /// Removes items from a set. Returns `true` if anything was removed.
    pub fn remove_items(&mut self, key: &str, items: &BTreeSet<String>) -> bool {
        match self.sets.get_mut(key) {
            Some(set) => {
                let before = set.len();
                set.retain(|item| !items.contains(item));
                set.len() != before
            }
            None => false,
        }
    }

    /// Intersects a set with `allowed`. Returns `true` if anything was removed.
    pub fn restrict(&mut self, key: &str, allowed: &BTreeSet<String>) -> bool {
        match self.sets.get_mut(key) {
            Some(set) => {
                let before = set.len();
                set.retain(|item| allowed.contains(item));
                set.len() != before
            }
            None => false,
        }
    }

    /// Returns `true` when `self` grants nothing beyond `base`.
    #[must_use]
    pub fn is_within(&self, base: &Self) -> bool {
        let limits = self
            .limits
            .iter()
            .all(|(key, value)| base.limits.get(key).is_some_and(|max| value <= max));
        let flags = self
            .flags
            .iter()
            .all(|(key, value)| !*value || base.flags.get(key).copied().unwrap_or(false));
        let sets = self
            .sets
            .iter()
            .all(|(key, set)| base.sets.get(key).is_some_and(|outer| set.is_subset(outer)));
        limits && flags && sets
    }
}

/// One narrowing step declared on a manifest rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Reduction {
    /// Caps a numeric limit.
    CapLimit {
        /// Limit key.
        key: String,
        /// New upper bound.
        max: u64,
    },
    /// Scales a numeric limit to a percentage of its current value.
    ScaleLimit {
        /// Limit key.
        key: String,
        /// Percentage in `0..=100`. Wider values parse and fail validation.
        percent: u32,
    },
    /// Clears a boolean flag.
    Disable {
        /// Flag key.
        flag: String,
    },
    /// Removes items from a string set.
    Remove {
        /// Set key.
        set: String,
        /// Items to remove.
        items: BTreeSet<String>,
    },
    /// Intersects a string set with an allow list.
    Restrict {
        /// Set key.
        set: String,
        /// Items that may remain.
        allowed: BTreeSet<String>,
    },
}

impl Reduction {
    /// Returns the constraint key the reduction targets.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::CapLimit { key, .. } | Self::ScaleLimit { key, .. } => key,
            Self::Disable { flag } => flag,
            Self::Remove { set, .. } | Self::Restrict { set, .. } => set,
        }
    }

    /// Validates the reduction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReduction`] for empty keys or a scale percentage
    /// above 100, which would widen the limit.
    pub fn validate(&self) -> Result<()> {
        if self.key().trim().is_empty() {
            return Err(Error::InvalidReduction {
                reason: "reduction key cannot be empty".into(),
            });
        }
        if let Self::ScaleLimit { key, percent } = self {
            if *percent > 100 {
                return Err(Error::InvalidReduction {
                    reason: format!("scale_limit on `{key}` must be <= 100 percent, got {percent}"),
                });
            }
        }
        Ok(())
    }
}
