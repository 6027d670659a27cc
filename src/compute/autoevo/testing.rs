//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::compute::cache::SimulationCache;
use crate::compute::layout::HexSpiralLayout;
use crate::compute::rng::EvoRng;
use crate::schema::{
    BiomeCompound, BiomeConditions, Compound, EnergyConstants, Hex, MembraneKind,
    OrganelleTemplate, Patch, PatchId, SimulationParameters, Species, SpeciesId,
    SpeciesIdAllocator, WorldSettings,
};

use super::mutation::{MutationContext, MutationOperator, stable_hash};
use super::pressure::{PressureKey, SelectionPressure};

/// A species with the given organelles laid out in separate columns.
pub fn simple_species(id: u64, organelles: &[&str]) -> Species {
    let params = SimulationParameters::default();
    let templates = organelles
        .iter()
        .enumerate()
        .map(|(i, name)| OrganelleTemplate::new(*name, Hex::new(i as i32 * 4, 0)))
        .collect();
    let mut species = Species::new(SpeciesId(id), "Testus", "cellus", templates, MembraneKind::Single);
    species.on_edited(&params);
    species
}

pub fn test_biome() -> BiomeConditions {
    BiomeConditions {
        temperature: 20.0,
        ..Default::default()
    }
    .with_compound(
        Compound::Sunlight,
        BiomeCompound {
            ambient: 0.8,
            ..Default::default()
        },
    )
    .with_compound(
        Compound::Carbondioxide,
        BiomeCompound {
            ambient: 0.1,
            ..Default::default()
        },
    )
    .with_compound(
        Compound::Oxygen,
        BiomeCompound {
            ambient: 0.2,
            ..Default::default()
        },
    )
    .with_compound(
        Compound::Glucose,
        BiomeCompound {
            density: 0.5,
            amount: 40.0,
            ..Default::default()
        },
    )
}

pub fn test_patch(id: u32) -> Patch {
    Patch::new(PatchId(id), format!("Patch {id}"), test_biome())
}

pub fn test_cache() -> SimulationCache {
    SimulationCache::new(
        Arc::new(SimulationParameters::default()),
        EnergyConstants::default(),
        WorldSettings::default(),
    )
}

type Scorer = Arc<dyn Fn(&Species) -> f32 + Send + Sync>;

/// Pressure with scripted scores that counts how often it is evaluated.
pub struct FixedPressure {
    name: &'static str,
    strength: f32,
    energy: f32,
    scores: HashMap<SpeciesId, f32>,
    scorer: Option<Scorer>,
    mutations: Vec<Arc<dyn MutationOperator>>,
    calls: AtomicUsize,
}

impl FixedPressure {
    pub fn new(name: &'static str, strength: f32, energy: f32) -> Self {
        Self {
            name,
            strength,
            energy,
            scores: HashMap::new(),
            scorer: None,
            mutations: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_score(mut self, species: u64, score: f32) -> Self {
        self.scores.insert(SpeciesId(species), score);
        self
    }

    /// Score species without a scripted score with `scorer`.
    pub fn with_scorer(mut self, scorer: impl Fn(&Species) -> f32 + Send + Sync + 'static) -> Self {
        self.scorer = Some(Arc::new(scorer));
        self
    }

    pub fn with_mutation(mut self, operator: Arc<dyn MutationOperator>) -> Self {
        self.mutations.push(operator);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for FixedPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPressure")
            .field("name", &self.name)
            .field("strength", &self.strength)
            .field("energy", &self.energy)
            .finish()
    }
}

impl SelectionPressure for FixedPressure {
    fn key(&self) -> PressureKey {
        PressureKey::new("fixed", [stable_hash([self.name]), 0])
    }

    fn name(&self) -> String {
        self.name.to_string()
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, _patch: &Patch, _cache: &mut SimulationCache) -> f32 {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(score) = self.scores.get(&species.id) {
            return *score;
        }
        self.scorer.as_ref().map(|f| f(species)).unwrap_or(0.0)
    }

    fn energy(&self, _patch: &Patch) -> f32 {
        self.energy
    }
}

/// Owns everything a [`MutationContext`] borrows.
pub struct MutationFixture {
    pub params: SimulationParameters,
    pub rng: EvoRng,
    pub biome: BiomeConditions,
    pub ids: SpeciesIdAllocator,
    pub layout: HexSpiralLayout,
    pub lawk: bool,
}

impl MutationFixture {
    pub fn new(seed: u64) -> Self {
        Self {
            params: SimulationParameters::default(),
            rng: EvoRng::new(seed),
            biome: test_biome(),
            ids: SpeciesIdAllocator::starting_at(1000),
            layout: HexSpiralLayout,
            lawk: false,
        }
    }

    pub fn context(&mut self) -> MutationContext<'_> {
        MutationContext {
            params: &self.params,
            lawk: self.lawk,
            rng: &mut self.rng,
            biome: &self.biome,
            ids: &self.ids,
            layout: &self.layout,
        }
    }
}
