//! Incremental per-patch evolution.
//!
//! A [`PatchEvolution`] spreads the work of one patch over many calls to
//! [`RunStep::run_step`]:
//!
//! 1. `Mutations`: search variants of one existing species per tick.
//! 2. `MutationFilter`: drop no-ops, shuffle and truncate the candidates.
//! 3. `MutationTest`: insert every candidate into the patch's niche tree.
//! 4. `FinalApply`: pick the winning candidates, rebuild the tree and
//!    compute the final populations.
//!
//! All state lives in plain fields and every tick derives its random stream
//! from the run seed, the patch and the tick number, so a snapshot taken
//! between two ticks resumes to exactly the same results.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::cache::{CacheStats, SimulationCache};
use crate::compute::error::AutoEvoError;
use crate::compute::layout::LayoutEngine;
use crate::compute::rng::EvoRng;
use crate::schema::{
    AutoEvoConfig, CandidateKind, NewSpeciesRecord, Patch, PatchId, PatchResults,
    SimulationParameters, Species, SpeciesId, SpeciesIdAllocator,
};

use super::miche::{Miche, MicheSnapshot};
use super::miche_builder::MicheBuilder;
use super::population::PopulationAllocator;
use super::pressure::SelectionPressure;
use super::pressures::PressureBuildContext;
use super::search::{MutationSearch, SearchLimits};

/// Version of [`PatchEvolutionSnapshot`].
pub const PATCH_EVOLUTION_VERSION: u16 = 1;

/// A unit of work the run driver ticks until it reports completion.
pub trait RunStep {
    /// Number of `run_step` calls until the step finishes.
    fn total_steps(&self) -> usize;

    /// Whether the step shares no mutable state with other steps.
    fn can_run_concurrently(&self) -> bool;

    /// Do one bounded slice of work. Returns whether more work remains.
    fn run_step(&mut self) -> Result<bool, AutoEvoError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Mutations,
    MutationFilter,
    MutationTest,
    FinalApply,
    Finished,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepPhase::Mutations => "mutations",
            StepPhase::MutationFilter => "mutation filter",
            StepPhase::MutationTest => "mutation test",
            StepPhase::FinalApply => "final apply",
            StepPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// A mutated variant waiting to be tested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub original: SpeciesId,
    pub species: Species,
    pub kind: CandidateKind,
}

/// Read-only inputs shared by every patch of a run.
#[derive(Clone)]
pub struct EvolutionInputs {
    pub config: Arc<AutoEvoConfig>,
    pub params: Arc<SimulationParameters>,
    pub layout: Arc<dyn LayoutEngine>,
}

impl fmt::Debug for EvolutionInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvolutionInputs")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Serializable state of a paused [`PatchEvolution`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchEvolutionSnapshot {
    pub version: u16,
    pub patch: PatchId,
    pub seed: u64,
    pub phase: StepPhase,
    pub tick: u64,
    pub queue: Vec<SpeciesId>,
    pub processed: usize,
    pub next_species_id: u64,
    pub candidates: Vec<Candidate>,
    pub miche: MicheSnapshot,
    #[serde(default)]
    pub results: Option<PatchResults>,
}

/// Evolution of one patch for one generation.
pub struct PatchEvolution {
    inputs: EvolutionInputs,
    patch: Patch,
    species: Arc<BTreeMap<SpeciesId, Arc<Species>>>,
    cache: SimulationCache,
    miche: Miche,
    ids: SpeciesIdAllocator,
    seed: u64,
    phase: StepPhase,
    tick: u64,
    queue: Vec<SpeciesId>,
    processed: usize,
    candidates: Vec<Candidate>,
    results: Option<PatchResults>,
}

impl PatchEvolution {
    /// Build the niche tree of `patch` and insert its living species.
    ///
    /// New species get ids from `first_species_id` upwards. Fails when the
    /// tree cannot be built (see [`MicheBuilder::build`]).
    pub fn new(
        inputs: EvolutionInputs,
        patch: Patch,
        species: Arc<BTreeMap<SpeciesId, Arc<Species>>>,
        first_species_id: u64,
        seed: u64,
    ) -> Result<Self, AutoEvoError> {
        let mut cache = Self::new_cache(&inputs);
        let builder = MicheBuilder::new(
            &inputs.params,
            &inputs.config.energy,
            &inputs.config.world,
        );
        let mut miche = builder.build(&patch, &species)?;

        let mut queue = Vec::new();
        for id in patch.living_species() {
            let existing = species
                .get(&id)
                .cloned()
                .ok_or(AutoEvoError::MissingSpecies(id))?;
            if !existing.player_species {
                queue.push(id);
            }
            miche.insert_species(existing, &patch, &mut cache);
        }

        log::debug!(
            "{} starts with {} species to mutate",
            patch.id,
            queue.len()
        );
        Ok(Self {
            inputs,
            patch,
            species,
            cache,
            miche,
            ids: SpeciesIdAllocator::starting_at(first_species_id),
            seed,
            phase: StepPhase::Mutations,
            tick: 0,
            queue,
            processed: 0,
            candidates: Vec::new(),
            results: None,
        })
    }

    fn new_cache(inputs: &EvolutionInputs) -> SimulationCache {
        SimulationCache::new(
            inputs.params.clone(),
            inputs.config.energy.clone(),
            inputs.config.world.clone(),
        )
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    /// Ticks run so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn miche(&self) -> &Miche {
        &self.miche
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn results(&self) -> Option<&PatchResults> {
        self.results.as_ref()
    }

    pub fn finished(&self) -> bool {
        self.phase == StepPhase::Finished
    }

    /// First id not handed out yet.
    pub fn next_species_id(&self) -> u64 {
        self.ids.peek()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn tick_rng(&self) -> EvoRng {
        EvoRng::derived(self.seed, &[self.patch.id.0 as u64, self.tick])
    }

    fn builder(&self) -> MicheBuilder<'_> {
        MicheBuilder::new(
            &self.inputs.params,
            &self.inputs.config.energy,
            &self.inputs.config.world,
        )
    }

    /// Search variants of one species against every leaf of the tree.
    fn mutate_species(&mut self, id: SpeciesId, rng: &mut EvoRng) -> Result<(), AutoEvoError> {
        let base = self
            .species
            .get(&id)
            .cloned()
            .ok_or(AutoEvoError::MissingSpecies(id))?;
        let config = self.inputs.config.clone();
        let own_leaf = self.miche.leaf_of(id);
        let avoidance = self.builder().predator_avoidance(&self.miche, id)?;

        let search = MutationSearch::new(
            SearchLimits::from_config(&config),
            &self.inputs.params,
            self.inputs.layout.as_ref(),
            &self.ids,
            config.world.lawk_only,
        );
        let mp = config.effective_mutation_points();

        let before = self.candidates.len();
        for leaf in self.miche.leaf_nodes() {
            let kind = if own_leaf == Some(leaf) {
                CandidateKind::Replacement
            } else {
                CandidateKind::Split
            };
            let allowed = match kind {
                CandidateKind::Replacement => config.allow_replacement,
                CandidateKind::Split => config.allow_speciation,
            };
            if !allowed {
                continue;
            }

            let mut pressures: Vec<Arc<dyn SelectionPressure>> = self
                .miche
                .back_traversal(leaf)
                .into_iter()
                .filter_map(|node| self.miche.node(node))
                .map(|node| node.pressure().clone())
                .collect();
            if kind == CandidateKind::Replacement {
                pressures.extend(avoidance.iter().cloned());
            }

            let found = search.find(&base, &pressures, mp, &self.patch, &mut self.cache, rng);
            self.candidates
                .extend(found.into_iter().map(|species| Candidate {
                    original: id,
                    species,
                    kind,
                }));
        }

        log::debug!(
            "{} produced {} candidates in {}",
            base.formatted_name(),
            self.candidates.len() - before,
            self.patch.id
        );
        Ok(())
    }

    fn filter_candidates(&mut self, rng: &mut EvoRng) {
        let before = self.candidates.len();
        let species = &self.species;
        let mut kept: Vec<Candidate> = Vec::with_capacity(before);
        for candidate in self.candidates.drain(..) {
            let Some(original) = species.get(&candidate.original) else {
                log::error!(
                    "Candidate {} lost track of its parent {}",
                    candidate.species.id,
                    candidate.original
                );
                debug_assert!(
                    species.contains_key(&candidate.original),
                    "candidate without parent"
                );
                continue;
            };
            if candidate.species.same_traits(original) {
                continue;
            }
            let duplicate = kept.iter().any(|other| {
                other.original == candidate.original && other.species.same_traits(&candidate.species)
            });
            if !duplicate {
                kept.push(candidate);
            }
        }

        rng.shuffle(&mut kept);
        kept.truncate(self.inputs.config.mutations_to_try);
        for candidate in &mut kept {
            candidate.species.on_edited(&self.inputs.params);
        }
        log::debug!(
            "{}: {} of {} candidates kept for testing",
            self.patch.id,
            kept.len(),
            before
        );
        self.candidates = kept;
    }

    fn test_candidates(&mut self) {
        let mut winners = 0;
        for candidate in &self.candidates {
            let species = Arc::new(candidate.species.clone());
            if self.miche.insert_species(species, &self.patch, &mut self.cache) {
                winners += 1;
            }
        }
        log::debug!(
            "{}: {} of {} candidates hold a niche after insertion",
            self.patch.id,
            winners,
            self.candidates.len()
        );
    }

    fn final_apply(&mut self) -> Result<(), AutoEvoError> {
        let config = self.inputs.config.clone();
        let allocator = PopulationAllocator::new(config.minimum_viable_population);

        // Candidates holding a leaf of the tested tree, best first.
        let leaf_winners: BTreeSet<SpeciesId> =
            self.miche.leaf_occupants().iter().map(|s| s.id).collect();
        let mut ranked: Vec<(&Candidate, i64)> = Vec::new();
        for candidate in &self.candidates {
            if !leaf_winners.contains(&candidate.species.id) {
                continue;
            }
            let population =
                allocator.population(&self.miche, &self.patch, &mut self.cache, &candidate.species);
            if population > 0 {
                ranked.push((candidate, population));
            }
        }
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.species.id.cmp(&b.0.species.id)));

        let mut splits: BTreeMap<SpeciesId, usize> = BTreeMap::new();
        let mut replaced: BTreeSet<SpeciesId> = BTreeSet::new();
        let mut accepted: Vec<Candidate> = Vec::new();
        for (candidate, _) in ranked {
            match candidate.kind {
                CandidateKind::Split => {
                    let count = splits.entry(candidate.original).or_insert(0);
                    if *count >= config.max_splits_per_species {
                        continue;
                    }
                    *count += 1;
                }
                CandidateKind::Replacement => {
                    let player = self
                        .species
                        .get(&candidate.original)
                        .is_some_and(|s| s.player_species);
                    if player || !replaced.insert(candidate.original) {
                        continue;
                    }
                }
            }
            accepted.push(candidate.clone());
        }

        // Candidates that fail in the rebuilt tree are dropped and the tree is
        // rebuilt without them; failed replacements give their parent back.
        let (miche, allocation) = loop {
            let mut roster: Vec<Arc<Species>> = self
                .patch
                .living_species()
                .filter(|id| !replaced.contains(id))
                .filter_map(|id| self.species.get(&id).cloned())
                .collect();
            roster.extend(accepted.iter().map(|c| Arc::new(c.species.clone())));

            let mut miche = self.builder().build(&self.patch, &self.species)?;
            for species in &roster {
                miche.insert_species(species.clone(), &self.patch, &mut self.cache);
            }
            let allocation = allocator.allocate(&miche, &self.patch, &mut self.cache, &roster);

            let failed: Vec<usize> = accepted
                .iter()
                .enumerate()
                .filter(|(_, c)| allocation.populations.get(&c.species.id).copied().unwrap_or(0) <= 0)
                .map(|(i, _)| i)
                .collect();
            if failed.is_empty() {
                break (miche, allocation);
            }
            for index in failed.into_iter().rev() {
                let candidate = accepted.remove(index);
                if candidate.kind == CandidateKind::Replacement {
                    replaced.remove(&candidate.original);
                }
                log::debug!(
                    "{:?} {} of {} is not viable in {}",
                    candidate.kind,
                    candidate.species.id,
                    candidate.original,
                    self.patch.id
                );
            }
        };

        let mut results = PatchResults::new(self.patch.id);
        results.populations = allocation.populations;
        for id in &replaced {
            results.populations.insert(*id, 0);
        }
        for candidate in accepted {
            let population = results
                .populations
                .get(&candidate.species.id)
                .copied()
                .unwrap_or(0);
            debug_assert!(population > 0, "non-viable candidate survived the rebuild");
            log::info!(
                "New {:?} {} from {} in {} with population {}",
                candidate.kind,
                candidate.species.formatted_name(),
                candidate.original,
                self.patch.id,
                population
            );
            results.new_species.push(NewSpeciesRecord {
                species: candidate.species,
                parent: candidate.original,
                kind: candidate.kind,
                population,
            });
        }
        results.energy = allocation.energy;

        self.miche = miche;
        self.results = Some(results);
        Ok(())
    }

    /// Capture the state between two ticks.
    pub fn snapshot(&self) -> Result<PatchEvolutionSnapshot, AutoEvoError> {
        Ok(PatchEvolutionSnapshot {
            version: PATCH_EVOLUTION_VERSION,
            patch: self.patch.id,
            seed: self.seed,
            phase: self.phase,
            tick: self.tick,
            queue: self.queue.clone(),
            processed: self.processed,
            next_species_id: self.ids.peek(),
            candidates: self.candidates.clone(),
            miche: self.miche.snapshot()?,
            results: self.results.clone(),
        })
    }

    /// Continue a paused step. `patch` and `species` must be the inputs the
    /// step was created with.
    pub fn resume(
        inputs: EvolutionInputs,
        snapshot: PatchEvolutionSnapshot,
        patch: Patch,
        species: Arc<BTreeMap<SpeciesId, Arc<Species>>>,
    ) -> Result<Self, AutoEvoError> {
        if snapshot.version != PATCH_EVOLUTION_VERSION {
            return Err(AutoEvoError::UnsupportedVersion {
                kind: "patch evolution",
                found: snapshot.version,
                expected: PATCH_EVOLUTION_VERSION,
            });
        }
        if snapshot.patch != patch.id {
            return Err(AutoEvoError::MissingPatch(snapshot.patch));
        }

        let mut candidates = snapshot.candidates;
        for candidate in &mut candidates {
            candidate.species.on_edited(&inputs.params);
        }

        // Trees may hold candidates as well as existing species.
        let mut known: BTreeMap<SpeciesId, Arc<Species>> = (*species).clone();
        for candidate in &candidates {
            known.insert(candidate.species.id, Arc::new(candidate.species.clone()));
        }
        let plain: BTreeMap<SpeciesId, Species> = known
            .iter()
            .map(|(id, s)| (*id, Species::clone(s)))
            .collect();

        let mut cache = Self::new_cache(&inputs);
        let ctx = PressureBuildContext {
            params: &inputs.params,
            constants: &inputs.config.energy,
            species: &plain,
        };
        let miche = Miche::restore(&snapshot.miche, &ctx, &known, &patch, &mut cache)?;

        log::debug!(
            "{} resumed in phase {} at tick {}",
            patch.id,
            snapshot.phase,
            snapshot.tick
        );
        Ok(Self {
            inputs,
            patch,
            species,
            cache,
            miche,
            ids: SpeciesIdAllocator::starting_at(snapshot.next_species_id),
            seed: snapshot.seed,
            phase: snapshot.phase,
            tick: snapshot.tick,
            queue: snapshot.queue,
            processed: snapshot.processed,
            candidates,
            results: snapshot.results,
        })
    }
}

impl RunStep for PatchEvolution {
    fn total_steps(&self) -> usize {
        self.queue.len().max(1) + 3
    }

    fn can_run_concurrently(&self) -> bool {
        true
    }

    fn run_step(&mut self) -> Result<bool, AutoEvoError> {
        let mut rng = self.tick_rng();
        let phase = self.phase;
        match phase {
            StepPhase::Mutations => {
                if let Some(id) = self.queue.get(self.processed).copied() {
                    self.mutate_species(id, &mut rng)?;
                    self.processed += 1;
                }
                if self.processed >= self.queue.len() {
                    self.phase = StepPhase::MutationFilter;
                }
            }
            StepPhase::MutationFilter => {
                self.filter_candidates(&mut rng);
                self.phase = StepPhase::MutationTest;
            }
            StepPhase::MutationTest => {
                self.test_candidates();
                self.phase = StepPhase::FinalApply;
            }
            StepPhase::FinalApply => {
                self.final_apply()?;
                self.phase = StepPhase::Finished;
                log::info!("{} finished after {} ticks", self.patch.id, self.tick + 1);
            }
            StepPhase::Finished => return Ok(false),
        }
        self.tick += 1;
        if self.phase != phase {
            log::debug!("{} entered phase {}", self.patch.id, self.phase);
        }
        Ok(self.phase != StepPhase::Finished)
    }
}
