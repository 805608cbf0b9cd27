//! Manifest registry: staged, active, and retired manifest versions.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock};

use governor_policy::{DecisionError, DecisionEvaluator, EvaluationError, ManifestError};
use governor_primitives::GovernorManifest;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// States a manifest version moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestState {
    /// Validated and compiled, not serving.
    Staged,
    /// Serving decisions.
    Active,
    /// Replaced or discarded. Terminal.
    Retired,
}

/// Events that move a manifest between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestEvent {
    /// Start serving.
    Activate,
    /// Stop serving, or discard before serving.
    Retire,
}

impl ManifestState {
    /// Returns the state reached by `event`, if the transition is allowed.
    #[must_use]
    pub const fn next(self, event: ManifestEvent) -> Option<Self> {
        match (self, event) {
            (Self::Staged, ManifestEvent::Activate) => Some(Self::Active),
            (Self::Staged | Self::Active, ManifestEvent::Retire) => Some(Self::Retired),
            _ => None,
        }
    }
}

impl Display for ManifestState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Staged => "staged",
            Self::Active => "active",
            Self::Retired => "retired",
        })
    }
}

/// Retired entries keep only their state so the version stays reserved.
#[derive(Debug)]
struct Entry {
    evaluator: Option<Arc<DecisionEvaluator>>,
    state: ManifestState,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    active: Option<String>,
}

impl Inner {
    fn transition(&mut self, version: &str, event: ManifestEvent) -> RegistryResult<()> {
        let entry = self
            .entries
            .get_mut(version)
            .ok_or_else(|| ManifestError::UnknownVersion {
                version: version.to_owned(),
            })?;
        let next = entry
            .state
            .next(event)
            .ok_or_else(|| RegistryError::InvalidTransition {
                version: version.to_owned(),
                from: entry.state,
                event,
            })?;
        debug!(version, from = %entry.state, to = %next, "manifest transition");
        entry.state = next;
        if next == ManifestState::Retired {
            entry.evaluator = None;
        }
        Ok(())
    }
}

/// Holds compiled manifests and the one currently serving.
///
/// Evaluators are shared as [`Arc`] and never mutated, so a swap never
/// disturbs decisions already in flight. Retiring a version releases the
/// registry's reference to its evaluator.
#[derive(Debug, Default)]
pub struct ManifestRegistry {
    inner: RwLock<Inner>,
}

impl ManifestRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates, compiles, and stages a manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::VersionConflict`] when the version is already
    /// registered, or the validation and compilation error.
    pub fn stage(&self, manifest: GovernorManifest) -> RegistryResult<Arc<DecisionEvaluator>> {
        let version = manifest.version().to_owned();
        if self.read().entries.contains_key(&version) {
            return Err(ManifestError::VersionConflict { version }.into());
        }
        let evaluator = Arc::new(DecisionEvaluator::new(Arc::new(manifest))?);

        let mut inner = self.write();
        if inner.entries.contains_key(&version) {
            return Err(ManifestError::VersionConflict { version }.into());
        }
        inner.entries.insert(
            version.clone(),
            Entry {
                evaluator: Some(Arc::clone(&evaluator)),
                state: ManifestState::Staged,
            },
        );
        debug!(%version, rules = evaluator.manifest().rules().len(), "manifest staged");
        Ok(evaluator)
    }

    /// Activates a staged version and retires the previously active one.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownVersion`] or
    /// [`RegistryError::InvalidTransition`] if the version is not staged.
    pub fn activate(&self, version: &str) -> RegistryResult<Arc<DecisionEvaluator>> {
        let mut inner = self.write();
        inner.transition(version, ManifestEvent::Activate)?;
        let previous = inner.active.replace(version.to_owned());
        if let Some(previous) = previous {
            inner.transition(&previous, ManifestEvent::Retire)?;
        }
        info!(%version, "governor manifest activated");

        inner
            .entries
            .get(version)
            .and_then(|entry| entry.evaluator.clone())
            .ok_or_else(|| {
                ManifestError::UnknownVersion {
                    version: version.to_owned(),
                }
                .into()
            })
    }

    /// Stages and activates in one step.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::stage`] and [`Self::activate`].
    pub fn load(&self, manifest: GovernorManifest) -> RegistryResult<Arc<DecisionEvaluator>> {
        let version = manifest.version().to_owned();
        self.stage(manifest)?;
        self.activate(&version)
    }

    /// Retires a staged or active version. Retiring the active version leaves
    /// the registry without one.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownVersion`] or
    /// [`RegistryError::InvalidTransition`] for retired versions.
    pub fn retire(&self, version: &str) -> RegistryResult<()> {
        let mut inner = self.write();
        inner.transition(version, ManifestEvent::Retire)?;
        if inner.active.as_deref() == Some(version) {
            inner.active = None;
        }
        Ok(())
    }

    /// Returns the evaluator currently serving.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NoActiveManifest`] before the first activation.
    pub fn active(&self) -> RegistryResult<Arc<DecisionEvaluator>> {
        let inner = self.read();
        inner
            .active
            .as_ref()
            .and_then(|version| inner.entries.get(version))
            .and_then(|entry| entry.evaluator.clone())
            .ok_or_else(|| ManifestError::NoActiveManifest.into())
    }

    /// Returns the state of a version.
    #[must_use]
    pub fn state(&self, version: &str) -> Option<ManifestState> {
        self.read().entries.get(version).map(|entry| entry.state)
    }

    /// Lists registered versions with their states.
    #[must_use]
    pub fn versions(&self) -> Vec<(String, ManifestState)> {
        self.read()
            .entries
            .iter()
            .map(|(version, entry)| (version.clone(), entry.state))
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Errors surfaced by the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Manifest invalid, unknown, conflicting, or missing.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// A rule condition failed to compile.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    /// The version cannot move via this event from its current state.
    #[error("manifest `{version}` cannot {event:?} from state {from}")]
    InvalidTransition {
        /// Affected version.
        version: String,
        /// State prior to the attempt.
        from: ManifestState,
        /// Rejected event.
        event: ManifestEvent,
    },
}

impl From<DecisionError> for RegistryError {
    fn from(value: DecisionError) -> Self {
        match value {
            DecisionError::Manifest(err) => Self::Manifest(err),
            DecisionError::Evaluation(err) => Self::Evaluation(err),
        }
    }
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
