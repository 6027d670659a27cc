//! Patch map: ecological patches, their biome conditions and populations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Compound, ConfigError, SimulationParameters, Species, SpeciesId};

/// Stable patch identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct PatchId(pub u32);

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patch {}", self.0)
    }
}

/// Amount of one compound in a biome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BiomeCompound {
    /// Ambient level for environmental compounds (0.0-1.0 for gases and light).
    #[serde(default)]
    pub ambient: f32,
    /// Cloud density for cloud compounds.
    #[serde(default)]
    pub density: f32,
    /// Cloud amount for cloud compounds.
    #[serde(default)]
    pub amount: f32,
}

/// Environmental conditions of a patch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BiomeConditions {
    #[serde(default)]
    pub compounds: BTreeMap<Compound, BiomeCompound>,
    /// Average temperature in degrees Celsius.
    #[serde(default)]
    pub temperature: f32,
}

impl BiomeConditions {
    pub fn compound(&self, compound: Compound) -> BiomeCompound {
        self.compounds.get(&compound).copied().unwrap_or_default()
    }

    pub fn ambient(&self, compound: Compound) -> f32 {
        self.compound(compound).ambient
    }

    /// Total cloud availability (density x amount).
    pub fn cloud_availability(&self, compound: Compound) -> f32 {
        let c = self.compound(compound);
        c.density * c.amount
    }

    /// Builder used by tests and the example world.
    pub fn with_compound(mut self, compound: Compound, value: BiomeCompound) -> Self {
        self.compounds.insert(compound, value);
        self
    }
}

/// One ecological patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub id: PatchId,
    pub name: String,
    pub biome: BiomeConditions,
    /// Current population of every species present.
    #[serde(default)]
    pub species_in_patch: BTreeMap<SpeciesId, i64>,
    #[serde(default)]
    pub adjacent: BTreeSet<PatchId>,
}

impl Patch {
    pub fn new(id: PatchId, name: impl Into<String>, biome: BiomeConditions) -> Self {
        Self {
            id,
            name: name.into(),
            biome,
            species_in_patch: BTreeMap::new(),
            adjacent: BTreeSet::new(),
        }
    }

    pub fn population(&self, species: SpeciesId) -> i64 {
        self.species_in_patch.get(&species).copied().unwrap_or(0)
    }

    /// Species with a positive population, in id order.
    pub fn living_species(&self) -> impl Iterator<Item = SpeciesId> + '_ {
        self.species_in_patch
            .iter()
            .filter(|(_, population)| **population > 0)
            .map(|(id, _)| *id)
    }
}

/// The whole world: patches plus the species registry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PatchMap {
    pub patches: BTreeMap<PatchId, Patch>,
    pub species: BTreeMap<SpeciesId, Species>,
    /// Next unused species id.
    #[serde(default)]
    pub next_species_id: u64,
}

impl PatchMap {
    pub fn add_patch(&mut self, patch: Patch) {
        self.patches.insert(patch.id, patch);
    }

    /// Register a species, bumping `next_species_id` past its id.
    pub fn add_species(&mut self, species: Species) {
        self.next_species_id = self.next_species_id.max(species.id.0 + 1);
        self.species.insert(species.id, species);
    }

    /// Validate species against the tables and recompute derived stats.
    ///
    /// Must run after deserialization since derived stats are not stored.
    pub fn prepare(&mut self, params: &SimulationParameters) -> Result<(), ConfigError> {
        for species in self.species.values_mut() {
            species.validate(params)?;
            species.on_edited(params);
        }
        let max_id = self.species.keys().next_back().map(|id| id.0 + 1).unwrap_or(0);
        self.next_species_id = self.next_species_id.max(max_id);
        Ok(())
    }
}
