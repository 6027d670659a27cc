//! Run driver: ticks every patch step and collects the results.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compute::error::AutoEvoError;
use crate::compute::layout::{HexSpiralLayout, LayoutEngine};
use crate::compute::rng::EvoRng;
use crate::schema::{AutoEvoConfig, PatchMap, RunResults, SimulationParameters, Species, SpeciesId};

use super::steps::{EvolutionInputs, PatchEvolution, PatchEvolutionSnapshot, RunStep};

/// Version of [`RunSnapshot`].
pub const RUN_SNAPSHOT_VERSION: u16 = 1;

/// Width of the id range each patch allocates new species from.
const ID_STRIPE: u64 = 1 << 32;

/// Serializable state of a paused [`AutoEvoRun`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub version: u16,
    pub seed: u64,
    pub patches: Vec<PatchEvolutionSnapshot>,
}

impl RunSnapshot {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AutoEvoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AutoEvoError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// One generation of auto-evo over a whole patch map.
pub struct AutoEvoRun {
    world: PatchMap,
    seed: u64,
    steps: Vec<PatchEvolution>,
    results: RunResults,
}

impl AutoEvoRun {
    /// Set up a run over `world` with the default layout engine.
    ///
    /// Every configuration error surfaces here, before any work is done.
    pub fn new(
        world: &PatchMap,
        config: AutoEvoConfig,
        params: SimulationParameters,
    ) -> Result<Self, AutoEvoError> {
        Self::with_layout(world, config, params, Arc::new(HexSpiralLayout))
    }

    pub fn with_layout(
        world: &PatchMap,
        config: AutoEvoConfig,
        params: SimulationParameters,
        layout: Arc<dyn LayoutEngine>,
    ) -> Result<Self, AutoEvoError> {
        let (inputs, world) = Self::prepare(world, config, params, layout)?;
        let seed = inputs
            .config
            .random_seed
            .unwrap_or_else(|| EvoRng::random().next_seed());
        let species = species_registry(&world);

        let mut steps = Vec::with_capacity(world.patches.len());
        for (ordinal, patch) in world.patches.values().enumerate() {
            let first_id = world.next_species_id + ordinal as u64 * ID_STRIPE;
            steps.push(PatchEvolution::new(
                inputs.clone(),
                patch.clone(),
                species.clone(),
                first_id,
                seed,
            )?);
        }

        log::info!(
            "Auto-evo run over {} patches and {} species (seed {})",
            world.patches.len(),
            world.species.len(),
            seed
        );
        Ok(Self {
            world,
            seed,
            steps,
            results: RunResults::default(),
        })
    }

    fn prepare(
        world: &PatchMap,
        config: AutoEvoConfig,
        params: SimulationParameters,
        layout: Arc<dyn LayoutEngine>,
    ) -> Result<(EvolutionInputs, PatchMap), AutoEvoError> {
        config.validate()?;
        params.validate()?;
        let mut world = world.clone();
        world.prepare(&params)?;
        let inputs = EvolutionInputs {
            config: Arc::new(config),
            params: Arc::new(params),
            layout,
        };
        Ok((inputs, world))
    }

    /// The prepared copy of the world the run works on.
    pub fn world(&self) -> &PatchMap {
        &self.world
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn steps(&self) -> &[PatchEvolution] {
        &self.steps
    }

    pub fn total_steps(&self) -> usize {
        self.steps.iter().map(|step| step.total_steps()).sum()
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .map(|step| (step.tick() as usize).min(step.total_steps()))
            .sum()
    }

    /// Fraction of the work done, in `0..=1`.
    pub fn progress(&self) -> f32 {
        let total = self.total_steps();
        if total == 0 {
            return 1.0;
        }
        self.completed_steps() as f32 / total as f32
    }

    pub fn finished(&self) -> bool {
        self.steps.iter().all(|step| step.finished())
    }

    /// Advance every unfinished step by one tick. Returns whether work remains.
    pub fn tick(&mut self) -> Result<bool, AutoEvoError> {
        let (concurrent, exclusive): (Vec<_>, Vec<_>) = self
            .steps
            .iter_mut()
            .filter(|step| !step.finished())
            .partition(|step| step.can_run_concurrently());

        concurrent
            .into_par_iter()
            .try_for_each(|step| step.run_step().map(|_| ()))?;
        for step in exclusive {
            step.run_step()?;
        }

        self.merge_finished();
        Ok(!self.finished())
    }

    pub fn run_to_completion(&mut self) -> Result<&RunResults, AutoEvoError> {
        while self.tick()? {}
        self.results()
    }

    /// Results of the finished run.
    pub fn results(&self) -> Result<&RunResults, AutoEvoError> {
        if !self.finished() {
            return Err(AutoEvoError::RunNotFinished);
        }
        Ok(&self.results)
    }

    fn merge_finished(&mut self) {
        for step in &self.steps {
            let Some(results) = step.results() else {
                continue;
            };
            if self.results.patches.contains_key(&results.patch) {
                continue;
            }
            log::debug!(
                "{}: {} new species, cache {:?}",
                results.patch,
                results.new_species.len(),
                step.cache_stats()
            );
            self.results.merge(results.clone());
        }
    }

    pub fn snapshot(&self) -> Result<RunSnapshot, AutoEvoError> {
        let patches = self
            .steps
            .iter()
            .map(|step| step.snapshot())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RunSnapshot {
            version: RUN_SNAPSHOT_VERSION,
            seed: self.seed,
            patches,
        })
    }

    /// Continue a paused run. `world`, `config` and `params` must be the
    /// inputs the run was created with.
    pub fn resume(
        world: &PatchMap,
        config: AutoEvoConfig,
        params: SimulationParameters,
        snapshot: RunSnapshot,
    ) -> Result<Self, AutoEvoError> {
        Self::resume_with_layout(world, config, params, snapshot, Arc::new(HexSpiralLayout))
    }

    pub fn resume_with_layout(
        world: &PatchMap,
        config: AutoEvoConfig,
        params: SimulationParameters,
        snapshot: RunSnapshot,
        layout: Arc<dyn LayoutEngine>,
    ) -> Result<Self, AutoEvoError> {
        if snapshot.version != RUN_SNAPSHOT_VERSION {
            return Err(AutoEvoError::UnsupportedVersion {
                kind: "run",
                found: snapshot.version,
                expected: RUN_SNAPSHOT_VERSION,
            });
        }
        let (inputs, world) = Self::prepare(world, config, params, layout)?;
        if let Some(missing) = world
            .patches
            .keys()
            .find(|id| !snapshot.patches.iter().any(|p| p.patch == **id))
        {
            return Err(AutoEvoError::MissingPatch(*missing));
        }

        let species = species_registry(&world);
        let mut steps = Vec::with_capacity(snapshot.patches.len());
        for patch_snapshot in snapshot.patches {
            let patch = world
                .patches
                .get(&patch_snapshot.patch)
                .cloned()
                .ok_or(AutoEvoError::MissingPatch(patch_snapshot.patch))?;
            steps.push(PatchEvolution::resume(
                inputs.clone(),
                patch_snapshot,
                patch,
                species.clone(),
            )?);
        }

        let mut run = Self {
            world,
            seed: snapshot.seed,
            steps,
            results: RunResults::default(),
        };
        run.merge_finished();
        log::info!(
            "Auto-evo run resumed at {}/{} steps",
            run.completed_steps(),
            run.total_steps()
        );
        Ok(run)
    }
}

fn species_registry(world: &PatchMap) -> Arc<BTreeMap<SpeciesId, Arc<Species>>> {
    Arc::new(
        world
            .species
            .iter()
            .map(|(id, species)| (*id, Arc::new(species.clone())))
            .collect(),
    )
}

impl RunResults {
    /// Commit the results to `map`: new species are registered and every
    /// patch gets its final populations.
    ///
    /// Nothing is written unless every patch in the results exists in `map`.
    pub fn apply_to(&self, map: &mut PatchMap) -> Result<(), AutoEvoError> {
        if let Some(missing) = self.patches.keys().find(|id| !map.patches.contains_key(id)) {
            return Err(AutoEvoError::MissingPatch(*missing));
        }

        for record in self.new_species() {
            map.add_species(record.species.clone());
        }
        for (id, results) in &self.patches {
            let Some(patch) = map.patches.get_mut(id) else {
                continue;
            };
            for (species, population) in &results.populations {
                if *population > 0 {
                    patch.species_in_patch.insert(*species, *population);
                } else {
                    patch.species_in_patch.remove(species);
                }
            }
        }

        log::info!(
            "Applied results of {} patches ({} new species)",
            self.patches.len(),
            self.new_species().count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::autoevo::testing::{simple_species, test_patch};
    use crate::schema::{CandidateKind, NewSpeciesRecord, PatchId, PatchResults};

    fn world() -> PatchMap {
        let mut map = PatchMap::default();
        map.add_species(simple_species(1, &["cytoplasm"]));
        map.add_species(simple_species(2, &["cytoplasm", "metabolosomes"]));
        for id in 0..2 {
            let mut patch = test_patch(id);
            patch.species_in_patch.insert(SpeciesId(1), 1200);
            patch.species_in_patch.insert(SpeciesId(2), 300);
            map.add_patch(patch);
        }
        map
    }

    fn seeded(seed: u64) -> AutoEvoConfig {
        AutoEvoConfig {
            random_seed: Some(seed),
            ..Default::default()
        }
    }

    fn results_json(results: &RunResults) -> serde_json::Value {
        serde_json::to_value(results).unwrap()
    }

    #[test]
    fn test_run_completes_every_patch() {
        let mut run = AutoEvoRun::new(&world(), seeded(3), SimulationParameters::default()).unwrap();
        assert_eq!(run.total_steps(), 2 * (2 + 3));
        assert_eq!(run.progress(), 0.0);
        assert!(matches!(run.results(), Err(AutoEvoError::RunNotFinished)));

        let mut ticks = 0;
        while run.tick().unwrap() {
            ticks += 1;
            assert!(run.progress() < 1.0);
        }
        assert_eq!(ticks + 1, 2 + 3);
        assert_eq!(run.progress(), 1.0);

        let results = run.results().unwrap();
        assert_eq!(results.patches.len(), 2);
        for record in results.new_species() {
            assert!(record.species.id.0 >= run.world().next_species_id);
        }
    }

    #[test]
    fn test_patches_allocate_disjoint_ids() {
        let mut run = AutoEvoRun::new(&world(), seeded(8), SimulationParameters::default()).unwrap();
        let first = run.world().next_species_id;
        let results = run.run_to_completion().unwrap();

        for record in &results.patch(PatchId(0)).unwrap().new_species {
            assert!(record.species.id.0 < first + ID_STRIPE);
        }
        for record in &results.patch(PatchId(1)).unwrap().new_species {
            assert!(record.species.id.0 >= first + ID_STRIPE);
        }
    }

    #[test]
    fn test_same_seed_same_results() {
        let a = AutoEvoRun::new(&world(), seeded(21), SimulationParameters::default())
            .unwrap()
            .run_to_completion()
            .map(results_json)
            .unwrap();
        let b = AutoEvoRun::new(&world(), seeded(21), SimulationParameters::default())
            .unwrap()
            .run_to_completion()
            .map(results_json)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_config_fails_setup() {
        let config = AutoEvoConfig {
            mutation_points: 0.0,
            ..Default::default()
        };
        let result = AutoEvoRun::new(&world(), config, SimulationParameters::default());
        assert!(matches!(result, Err(AutoEvoError::Config(_))));
    }

    #[test]
    fn test_unregistered_species_fails_setup() {
        let mut map = world();
        if let Some(patch) = map.patches.get_mut(&PatchId(1)) {
            patch.species_in_patch.insert(SpeciesId(77), 10);
        }
        let result = AutoEvoRun::new(&map, seeded(1), SimulationParameters::default());
        assert!(matches!(result, Err(AutoEvoError::MissingSpecies(SpeciesId(77)))));
    }

    #[test]
    fn test_apply_commits_populations_and_species() {
        let mut map = world();
        let mut run = AutoEvoRun::new(&map, seeded(11), SimulationParameters::default()).unwrap();
        let results = run.run_to_completion().unwrap().clone();
        results.apply_to(&mut map).unwrap();

        for record in results.new_species() {
            assert!(map.species.contains_key(&record.species.id));
            assert!(map.next_species_id > record.species.id.0);
        }
        for (id, patch_results) in &results.patches {
            let patch = &map.patches[id];
            for (species, population) in &patch_results.populations {
                assert_eq!(patch.population(*species), (*population).max(0));
            }
        }
    }

    #[test]
    fn test_apply_is_atomic() {
        let mut map = world();
        let before = serde_json::to_value(&map).unwrap();

        let mut results = RunResults::default();
        let mut known = PatchResults::new(PatchId(0));
        known.populations.insert(SpeciesId(1), 5);
        results.merge(known);
        let mut unknown = PatchResults::new(PatchId(99));
        unknown.new_species.push(NewSpeciesRecord {
            species: simple_species(500, &["cytoplasm"]),
            parent: SpeciesId(1),
            kind: CandidateKind::Split,
            population: 40,
        });
        results.merge(unknown);

        let err = results.apply_to(&mut map).unwrap_err();
        assert!(matches!(err, AutoEvoError::MissingPatch(PatchId(99))));
        assert_eq!(serde_json::to_value(&map).unwrap(), before);
    }

    #[test]
    fn test_resume_matches_uninterrupted_run() {
        let expected = AutoEvoRun::new(&world(), seeded(5), SimulationParameters::default())
            .unwrap()
            .run_to_completion()
            .map(results_json)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut paused = AutoEvoRun::new(&world(), seeded(5), SimulationParameters::default()).unwrap();
        paused.tick().unwrap();
        paused.tick().unwrap();
        paused.snapshot().unwrap().save(&path).unwrap();
        drop(paused);

        let snapshot = RunSnapshot::load(&path).unwrap();
        let mut resumed =
            AutoEvoRun::resume(&world(), seeded(5), SimulationParameters::default(), snapshot)
                .unwrap();
        assert_eq!(resumed.completed_steps(), 4);
        let actual = resumed.run_to_completion().map(results_json).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_resume_rejects_foreign_snapshot() {
        let run = AutoEvoRun::new(&world(), seeded(2), SimulationParameters::default()).unwrap();
        let mut snapshot = run.snapshot().unwrap();
        snapshot.version += 1;
        let result = AutoEvoRun::resume(
            &world(),
            seeded(2),
            SimulationParameters::default(),
            snapshot.clone(),
        );
        assert!(matches!(result, Err(AutoEvoError::UnsupportedVersion { .. })));

        snapshot.version = RUN_SNAPSHOT_VERSION;
        snapshot.patches.pop();
        let result = AutoEvoRun::resume(&world(), seeded(2), SimulationParameters::default(), snapshot);
        assert!(matches!(result, Err(AutoEvoError::MissingPatch(PatchId(1)))));
    }
}
