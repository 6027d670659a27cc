//! Memoization of species statistics and pressure scores.
//!
//! The mutation search re-scores the same species against the same pressures
//! thousands of times, so every derived value is computed once per
//! (species, patch) and looked up afterwards. Entries are pure functions of
//! immutable inputs: they are never invalidated individually, only dropped
//! wholesale by [`SimulationCache::clear`] between unrelated runs.
//!
//! Keys use species and patch ids. Species are never edited after they have
//! been scored (mutants are clones with fresh ids), and a patch's biome does
//! not change during a run.
//!
//! The tables are plain `HashMap`s and not safe for concurrent mutation: each
//! patch step owns its own cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::schema::{
    Compound, EnergyConstants, Patch, PatchId, ProcessId, SimulationParameters, Species,
    SpeciesId, WorldSettings,
};

use super::autoevo::{PressureKey, SelectionPressure};
use super::biology::{
    Biology, EnergyBalance, PredationInputs, PredationToolScores, predation_score,
};

/// Lookup counters, mostly for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Memoization layer keyed by species, patch and pressure.
#[derive(Debug)]
pub struct SimulationCache {
    params: Arc<SimulationParameters>,
    constants: EnergyConstants,
    world: WorldSettings,

    pressure_scores: HashMap<(SpeciesId, PatchId, PressureKey), f32>,
    energy_balances: HashMap<(SpeciesId, PatchId), EnergyBalance>,
    base_speeds: HashMap<SpeciesId, f32>,
    hex_sizes: HashMap<SpeciesId, f32>,
    conversion_scores: HashMap<(SpeciesId, PatchId, Compound, Compound), f32>,
    predation_scores: HashMap<(SpeciesId, SpeciesId, PatchId), f32>,
    process_speeds: HashMap<PatchId, HashMap<ProcessId, f32>>,
    varying_compounds: HashMap<(SpeciesId, PatchId), bool>,
    storage_scores: HashMap<(SpeciesId, PatchId, Compound), f32>,
    tool_scores: HashMap<SpeciesId, PredationToolScores>,

    stats: CacheStats,
}

/// Look up `key` in `table`, computing and storing the value on a miss.
macro_rules! memoize {
    ($self:ident, $table:ident, $key:expr, $compute:expr) => {{
        let key = $key;
        if let Some(value) = $self.$table.get(&key) {
            $self.stats.hits += 1;
            return value.clone();
        }
        $self.stats.misses += 1;
        let value = $compute;
        $self.$table.insert(key, value.clone());
        value
    }};
}

impl SimulationCache {
    pub fn new(
        params: Arc<SimulationParameters>,
        constants: EnergyConstants,
        world: WorldSettings,
    ) -> Self {
        Self {
            params,
            constants,
            world,
            pressure_scores: HashMap::new(),
            energy_balances: HashMap::new(),
            base_speeds: HashMap::new(),
            hex_sizes: HashMap::new(),
            conversion_scores: HashMap::new(),
            predation_scores: HashMap::new(),
            process_speeds: HashMap::new(),
            varying_compounds: HashMap::new(),
            storage_scores: HashMap::new(),
            tool_scores: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn constants(&self) -> &EnergyConstants {
        &self.constants
    }

    pub fn world(&self) -> &WorldSettings {
        &self.world
    }

    /// Whether this cache was built for the given world settings and may be
    /// reused for a run with them.
    pub fn matches_settings(&self, world: &WorldSettings) -> bool {
        self.world == *world
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of stored entries across all tables.
    pub fn len(&self) -> usize {
        self.pressure_scores.len()
            + self.energy_balances.len()
            + self.base_speeds.len()
            + self.hex_sizes.len()
            + self.conversion_scores.len()
            + self.predation_scores.len()
            + self.process_speeds.values().map(HashMap::len).sum::<usize>()
            + self.varying_compounds.len()
            + self.storage_scores.len()
            + self.tool_scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Only call when no caller still relies on earlier
    /// results being reused.
    pub fn clear(&mut self) {
        self.pressure_scores.clear();
        self.energy_balances.clear();
        self.base_speeds.clear();
        self.hex_sizes.clear();
        self.conversion_scores.clear();
        self.predation_scores.clear();
        self.process_speeds.clear();
        self.varying_compounds.clear();
        self.storage_scores.clear();
        self.tool_scores.clear();
        self.stats = CacheStats::default();
    }

    fn biology(&self) -> Biology<'_> {
        Biology::new(&self.params, &self.constants, &self.world)
    }

    /// Derived statistics in `patch` that read the species' process speeds
    /// from the speed table, filling it first.
    fn patch_biology(&mut self, species: &Species, patch: &Patch) -> Biology<'_> {
        let processes: Vec<ProcessId> = species
            .organelles
            .iter()
            .filter_map(|t| self.params.organelles.get(&t.organelle))
            .flat_map(|def| def.processes.keys().cloned())
            .collect();
        for process in &processes {
            self.process_speed(process, patch);
        }

        let biology = Biology::new(&self.params, &self.constants, &self.world);
        match self.process_speeds.get(&patch.id) {
            Some(speeds) => biology.with_process_speeds(speeds),
            None => biology,
        }
    }

    /// Process speed in `patch` and whether it was already known. Does not
    /// touch the hit counters.
    fn process_speed(&mut self, process: &ProcessId, patch: &Patch) -> (f32, bool) {
        if let Some(speed) = self
            .process_speeds
            .get(&patch.id)
            .and_then(|speeds| speeds.get(process))
        {
            return (*speed, true);
        }
        let speed = self.biology().process_speed(process, &patch.biome);
        self.process_speeds
            .entry(patch.id)
            .or_default()
            .insert(process.clone(), speed);
        (speed, false)
    }

    pub fn get_pressure_score(
        &mut self,
        pressure: &dyn SelectionPressure,
        patch: &Patch,
        species: &Species,
    ) -> f32 {
        memoize!(
            self,
            pressure_scores,
            (species.id, patch.id, pressure.key()),
            pressure.score(species, patch, self)
        )
    }

    pub fn get_energy_balance_for_species(
        &mut self,
        species: &Species,
        patch: &Patch,
    ) -> EnergyBalance {
        memoize!(
            self,
            energy_balances,
            (species.id, patch.id),
            self.patch_biology(species, patch)
                .energy_balance(species, &patch.biome)
        )
    }

    pub fn get_base_speed_for_species(&mut self, species: &Species) -> f32 {
        memoize!(
            self,
            base_speeds,
            species.id,
            self.biology().base_speed(species)
        )
    }

    pub fn get_base_hex_size_for_species(&mut self, species: &Species) -> f32 {
        memoize!(self, hex_sizes, species.id, self.biology().hex_size(species))
    }

    pub fn get_compound_conversion_score(
        &mut self,
        species: &Species,
        patch: &Patch,
        from: Compound,
        to: Compound,
    ) -> f32 {
        memoize!(
            self,
            conversion_scores,
            (species.id, patch.id, from, to),
            self.patch_biology(species, patch)
                .compound_conversion(species, from, to, &patch.biome)
        )
    }

    pub fn get_process_max_speed(&mut self, process: &ProcessId, patch: &Patch) -> f32 {
        let (speed, known) = self.process_speed(process, patch);
        if known {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        speed
    }

    pub fn get_uses_varying_compounds(&mut self, species: &Species, patch: &Patch) -> bool {
        memoize!(
            self,
            varying_compounds,
            (species.id, patch.id),
            self.patch_biology(species, patch)
                .uses_varying_compounds(species, &patch.biome)
        )
    }

    pub fn get_storage_score(&mut self, species: &Species, patch: &Patch, compound: Compound) -> f32 {
        memoize!(
            self,
            storage_scores,
            (species.id, patch.id, compound),
            self.patch_biology(species, patch)
                .storage_score(species, compound, &patch.biome)
        )
    }

    pub fn get_predation_tool_scores(&mut self, species: &Species) -> PredationToolScores {
        memoize!(
            self,
            tool_scores,
            species.id,
            self.biology().predation_tools(species)
        )
    }

    /// How well `predator` hunts `prey` in a patch. Zero for the species
    /// itself.
    pub fn get_predation_score(&mut self, predator: &Species, prey: &Species, patch: &Patch) -> f32 {
        if predator.id == prey.id {
            return 0.0;
        }
        memoize!(self, predation_scores, (predator.id, prey.id, patch.id), {
            let inputs = PredationInputs {
                predator_speed: self.get_base_speed_for_species(predator),
                prey_speed: self.get_base_speed_for_species(prey),
                predator_size: self.get_base_hex_size_for_species(predator),
                prey_size: self.get_base_hex_size_for_species(prey),
                predator_tools: self.get_predation_tool_scores(predator),
                predator_aggression: predator.behaviour.aggression,
            };
            predation_score(&inputs, self.constants.engulf_size_ratio)
        })
    }
}
