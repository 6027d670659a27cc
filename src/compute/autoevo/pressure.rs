//! Selection pressure capability.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::cache::SimulationCache;
use crate::compute::error::AutoEvoError;
use crate::schema::{Patch, Species};

use super::mutation::MutationOperator;
use super::pressures::{PressureBuildContext, PressureRecord};

/// Version written into every persisted pressure.
pub const PRESSURE_RECORD_VERSION: u16 = 1;

/// Stable identity of a pressure: a kind tag plus a parameter payload.
///
/// Two pressures with equal keys score every species identically, so the key
/// doubles as the cache key and as the de-duplication key among siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PressureKey {
    pub kind: &'static str,
    pub params: [u64; 2],
}

impl PressureKey {
    pub const fn new(kind: &'static str, params: [u64; 2]) -> Self {
        Self { kind, params }
    }

    /// Key of a pressure without parameters.
    pub const fn unit(kind: &'static str) -> Self {
        Self::new(kind, [0, 0])
    }
}

impl fmt::Display for PressureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.kind, self.params[0], self.params[1])
    }
}

/// A scoring strategy bound to one niche node.
///
/// Pressures are immutable after construction. `score` is expected to be a
/// pure function of the species and the patch; callers go through
/// [`SimulationCache::get_pressure_score`] so each pair is scored once.
pub trait SelectionPressure: fmt::Debug + Send + Sync {
    fn key(&self) -> PressureKey;

    /// Display name, used in energy attribution records.
    fn name(&self) -> String;

    /// Weight of this pressure when comparing candidates. Must be positive.
    fn strength(&self) -> f32;

    /// Mutation operators that can improve the score.
    fn mutations(&self) -> &[Arc<dyn MutationOperator>];

    /// Fitness of `species` in `patch`. A score `<= 0.0` means the species
    /// fails this pressure.
    fn score(&self, species: &Species, patch: &Patch, cache: &mut SimulationCache) -> f32;

    /// Energy available to occupants of the niche.
    fn energy(&self, patch: &Patch) -> f32;

    /// Constructor arguments for persistence. `None` for pressures that
    /// cannot be saved.
    fn record(&self) -> Option<PressureRecord> {
        None
    }
}

/// Compare a new score against an old one, scaled by pressure strength.
///
/// - `new <= 0` returns exactly `-1.0`.
/// - `old <= 0 < new` returns `strength` (the pressure is newly passed).
/// - Improvements return `(new / old - 1) * strength`.
/// - Regressions return `new / old - 1`, which lies in `(-1, 0)`.
///
/// For a fixed positive `old` and positive `strength` the result is
/// strictly increasing in `new` over the positive range.
pub fn weighted_compared_scores(new_score: f32, old_score: f32, strength: f32) -> f32 {
    if new_score <= 0.0 {
        return -1.0;
    }
    if old_score <= 0.0 {
        return strength;
    }
    let ratio = new_score / old_score - 1.0;
    if ratio > 0.0 { ratio * strength } else { ratio }
}

/// A persisted pressure with its format version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureEnvelope {
    pub version: u16,
    pub pressure: PressureRecord,
}

impl PressureEnvelope {
    pub fn new(pressure: PressureRecord) -> Self {
        Self {
            version: PRESSURE_RECORD_VERSION,
            pressure,
        }
    }

    /// Capture a live pressure.
    pub fn save(pressure: &dyn SelectionPressure) -> Result<Self, AutoEvoError> {
        pressure
            .record()
            .map(Self::new)
            .ok_or_else(|| AutoEvoError::UnpersistablePressure(pressure.name()))
    }

    /// Rebuild the pressure. Fails on an unknown version or when the record
    /// refers to data missing from the context.
    pub fn load(
        &self,
        ctx: &PressureBuildContext<'_>,
    ) -> Result<Arc<dyn SelectionPressure>, AutoEvoError> {
        if self.version != PRESSURE_RECORD_VERSION {
            return Err(AutoEvoError::UnsupportedVersion {
                kind: "pressure",
                found: self.version,
                expected: PRESSURE_RECORD_VERSION,
            });
        }
        self.pressure.build(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_weighted_scores_cases() {
        assert_eq!(weighted_compared_scores(0.0, 5.0, 2.0), -1.0);
        assert_eq!(weighted_compared_scores(-3.0, 5.0, 2.0), -1.0);
        assert_eq!(weighted_compared_scores(1.0, 0.0, 2.0), 2.0);
        assert_eq!(weighted_compared_scores(10.0, 5.0, 2.0), 2.0);
        assert_eq!(weighted_compared_scores(5.0, 5.0, 2.0), 0.0);
        assert!((weighted_compared_scores(2.5, 5.0, 2.0) + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unsupported_version() {
        let envelope = PressureEnvelope {
            version: 99,
            pressure: PressureRecord::Root,
        };
        let params = crate::schema::SimulationParameters::default();
        let constants = crate::schema::EnergyConstants::default();
        let species = std::collections::BTreeMap::new();
        let ctx = PressureBuildContext {
            params: &params,
            constants: &constants,
            species: &species,
        };
        assert!(matches!(
            envelope.load(&ctx),
            Err(AutoEvoError::UnsupportedVersion { found: 99, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_weighted_scores_monotonic(
            old in 0.01f32..100.0,
            a in 0.01f32..100.0,
            b in 0.01f32..100.0,
            strength in 0.1f32..10.0,
        ) {
            let (low, high) = if a < b { (a, b) } else { (b, a) };
            prop_assume!(high - low > 1e-3);
            prop_assert!(
                weighted_compared_scores(high, old, strength)
                    > weighted_compared_scores(low, old, strength)
            );
        }

        #[test]
        fn prop_non_positive_is_minus_one(
            new in -100.0f32..=0.0,
            old in -100.0f32..100.0,
            strength in 0.1f32..10.0,
        ) {
            prop_assert_eq!(weighted_compared_scores(new, old, strength), -1.0);
        }
    }
}
