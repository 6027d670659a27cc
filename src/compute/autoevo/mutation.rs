//! Mutation operator capability.

use std::fmt;

use crate::compute::layout::LayoutEngine;
use crate::compute::rng::EvoRng;
use crate::schema::{BiomeConditions, SimulationParameters, Species, SpeciesIdAllocator};

/// Stable identity of a mutation operator, used to de-duplicate operators
/// declared by several pressures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationKey {
    pub kind: &'static str,
    pub params: [u64; 2],
}

impl MutationKey {
    pub const fn new(kind: &'static str, params: [u64; 2]) -> Self {
        Self { kind, params }
    }
}

impl fmt::Display for MutationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.kind, self.params[0], self.params[1])
    }
}

/// A candidate species with the mutation points it has left.
#[derive(Debug, Clone)]
pub struct Mutant {
    pub species: Species,
    pub mp: f32,
}

impl Mutant {
    pub fn new(species: Species, mp: f32) -> Self {
        Self { species, mp }
    }
}

/// Everything an operator needs besides the base species.
pub struct MutationContext<'a> {
    pub params: &'a SimulationParameters,
    /// Restrict to "life as we know it" content.
    pub lawk: bool,
    pub rng: &'a mut EvoRng,
    pub biome: &'a BiomeConditions,
    pub ids: &'a SpeciesIdAllocator,
    pub layout: &'a dyn LayoutEngine,
}

impl MutationContext<'_> {
    /// Clone `base` under a fresh id, ready to be edited.
    pub fn derive(&self, base: &Species) -> Species {
        base.clone_as(self.ids.allocate())
    }
}

/// Produces mutated variants of a species within a mutation point budget.
///
/// Return value contract:
/// - `None`: the operator has nothing to offer this species at all.
/// - `Some(vec![])`: something applies, but not within `mp`.
/// - Otherwise every returned mutant has `0.0 <= mutant.mp <= mp`, a fresh
///   id and up to date derived stats.
pub trait MutationOperator: fmt::Debug + Send + Sync {
    fn key(&self) -> MutationKey;

    /// Whether the operator may be applied again to its own output.
    fn repeatable(&self) -> bool {
        false
    }

    fn mutations_of(
        &self,
        base: &Species,
        mp: f32,
        ctx: &mut MutationContext<'_>,
    ) -> Option<Vec<Mutant>>;
}

/// FNV-1a over a sequence of strings, for key payloads derived from names.
pub(crate) fn stable_hash<'a>(parts: impl IntoIterator<Item = &'a str>) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    let mut hash = OFFSET;
    for part in parts {
        for byte in part.bytes().chain(std::iter::once(0xff)) {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_hash_separates_parts() {
        assert_eq!(stable_hash(["ab", "c"]), stable_hash(["ab", "c"]));
        assert_ne!(stable_hash(["ab", "c"]), stable_hash(["a", "bc"]));
        assert_ne!(stable_hash(["a"]), stable_hash(["b"]));
    }
}
