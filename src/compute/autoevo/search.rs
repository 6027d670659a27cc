//! Guided search for mutated variants of a species.
//!
//! A search starts from the base species and its mutation point budget,
//! applies every operator declared by the tested pressures to the base and
//! to every variant found so far, and keeps only variants that improve the
//! strength-weighted comparison against the base. Candidate lists are capped
//! after each operator application and after each operator pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compute::cache::SimulationCache;
use crate::compute::layout::LayoutEngine;
use crate::compute::rng::EvoRng;
use crate::schema::{AutoEvoConfig, Patch, SimulationParameters, Species, SpeciesIdAllocator};

use super::mutation::{Mutant, MutationContext, MutationKey, MutationOperator};
use super::naming;
use super::pressure::{SelectionPressure, weighted_compared_scores};

/// Caps of one search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchLimits {
    pub mutations_per_species: usize,
    pub max_variants_per_mutation: usize,
    pub max_variants_in_mutations: usize,
    pub repeat_recursion_cap: usize,
    pub colour_change_max: f32,
}

impl SearchLimits {
    pub fn from_config(config: &AutoEvoConfig) -> Self {
        Self {
            mutations_per_species: config.mutations_per_species,
            max_variants_per_mutation: config.max_variants_per_mutation,
            max_variants_in_mutations: config.max_variants_in_mutations,
            repeat_recursion_cap: config.repeat_recursion_cap,
            colour_change_max: config.colour_change_max,
        }
    }
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self::from_config(&AutoEvoConfig::default())
    }
}

/// Counters reported at debug level after each search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub applications: usize,
    pub inapplicable: usize,
    pub broken_contract: usize,
    pub no_ops: usize,
    pub pruned: usize,
    pub kept: usize,
}

#[derive(Debug, Clone)]
struct Scored {
    mutant: Mutant,
    rank: f32,
}

/// Inputs fixed for the duration of one search.
struct Pass<'p> {
    base: &'p Species,
    pressures: &'p [Arc<dyn SelectionPressure>],
    base_scores: Vec<f32>,
    patch: &'p Patch,
}

struct SearchState<'s> {
    cache: &'s mut SimulationCache,
    rng: &'s mut EvoRng,
    stats: SearchStats,
}

/// Candidate score relative to the base, per unit of pressure strength.
fn normalized(new_score: f32, old_score: f32) -> f32 {
    if old_score > 0.0 {
        new_score / old_score
    } else if new_score > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Keep the `cap` best ranked candidates. Ties go to the lower species id.
fn bound(candidates: &mut Vec<Scored>, cap: usize) {
    candidates.sort_by(|a, b| {
        b.rank
            .total_cmp(&a.rank)
            .then(a.mutant.species.id.cmp(&b.mutant.species.id))
    });
    candidates.truncate(cap);
}

/// Mutation search over a fixed set of operators and layout.
pub struct MutationSearch<'a> {
    limits: SearchLimits,
    params: &'a SimulationParameters,
    layout: &'a dyn LayoutEngine,
    ids: &'a SpeciesIdAllocator,
    lawk: bool,
}

impl<'a> MutationSearch<'a> {
    pub fn new(
        limits: SearchLimits,
        params: &'a SimulationParameters,
        layout: &'a dyn LayoutEngine,
        ids: &'a SpeciesIdAllocator,
        lawk: bool,
    ) -> Self {
        Self {
            limits,
            params,
            layout,
            ids,
            lawk,
        }
    }

    /// Union of the operators declared by `pressures`, de-duplicated by key,
    /// in random order.
    pub fn collect_operators(
        pressures: &[Arc<dyn SelectionPressure>],
        rng: &mut EvoRng,
    ) -> Vec<Arc<dyn MutationOperator>> {
        let mut unique: BTreeMap<MutationKey, Arc<dyn MutationOperator>> = BTreeMap::new();
        for operator in pressures.iter().flat_map(|p| p.mutations()) {
            unique.entry(operator.key()).or_insert_with(|| operator.clone());
        }
        let mut operators: Vec<_> = unique.into_values().collect();
        rng.shuffle(&mut operators);
        operators
    }

    /// Best variants of `base` against `pressures`, at most
    /// `mutations_per_species`, best first.
    ///
    /// Returned species carry fresh ids, a new epithet, a perturbed colour,
    /// `parent = base.id` and the next generation. An empty result means
    /// nothing better was found.
    pub fn find(
        &self,
        base: &Species,
        pressures: &[Arc<dyn SelectionPressure>],
        mp: f32,
        patch: &Patch,
        cache: &mut SimulationCache,
        rng: &mut EvoRng,
    ) -> Vec<Species> {
        let operators = Self::collect_operators(pressures, rng);
        if operators.is_empty() {
            return Vec::new();
        }

        let base_scores = pressures
            .iter()
            .map(|p| cache.get_pressure_score(p.as_ref(), patch, base))
            .collect();
        let pass = Pass {
            base,
            pressures,
            base_scores,
            patch,
        };
        let mut state = SearchState {
            cache,
            rng,
            stats: SearchStats::default(),
        };

        let mut variants: Vec<Scored> = Vec::new();
        for operator in &operators {
            let inputs: Vec<Mutant> = std::iter::once(Mutant::new(base.clone(), mp))
                .chain(variants.iter().map(|v| v.mutant.clone()))
                .collect();
            for input in &inputs {
                let produced = self.apply(operator.as_ref(), input, 0, &pass, &mut state);
                variants.extend(produced);
            }
            bound(&mut variants, self.limits.max_variants_in_mutations);
        }

        variants.truncate(self.limits.mutations_per_species);
        state.stats.kept = variants.len();
        log::debug!(
            "Search for {} over {} pressures and {} operators: {:?}",
            base.formatted_name(),
            pressures.len(),
            operators.len(),
            state.stats
        );

        variants
            .into_iter()
            .map(|v| self.finish(base, v.mutant.species, state.rng))
            .collect()
    }

    fn apply(
        &self,
        operator: &dyn MutationOperator,
        input: &Mutant,
        depth: usize,
        pass: &Pass<'_>,
        state: &mut SearchState<'_>,
    ) -> Vec<Scored> {
        state.stats.applications += 1;
        let mutants = {
            let mut ctx = MutationContext {
                params: self.params,
                lawk: self.lawk,
                rng: &mut *state.rng,
                biome: &pass.patch.biome,
                ids: self.ids,
                layout: self.layout,
            };
            operator.mutations_of(&input.species, input.mp, &mut ctx)
        };
        let Some(mutants) = mutants else {
            state.stats.inapplicable += 1;
            return Vec::new();
        };

        let mut kept = Vec::new();
        for mutant in mutants {
            if !honours_contract(operator, input, pass.base, &mutant) {
                state.stats.broken_contract += 1;
                continue;
            }
            if mutant.species.same_traits(&input.species) || mutant.species.same_traits(pass.base)
            {
                state.stats.no_ops += 1;
                continue;
            }
            match self.evaluate(mutant, pass, state.cache) {
                Some(scored) => kept.push(scored),
                None => state.stats.pruned += 1,
            }
        }
        bound(&mut kept, self.limits.max_variants_per_mutation);

        if operator.repeatable() && depth < self.limits.repeat_recursion_cap && !kept.is_empty() {
            let mut deeper = Vec::new();
            for scored in &kept {
                deeper.extend(self.apply(operator, &scored.mutant, depth + 1, pass, state));
            }
            kept.extend(deeper);
            bound(&mut kept, self.limits.max_variants_per_mutation);
        }
        kept
    }

    /// Score a mutant against every pressure; `None` when it is pruned.
    fn evaluate(
        &self,
        mutant: Mutant,
        pass: &Pass<'_>,
        cache: &mut SimulationCache,
    ) -> Option<Scored> {
        let mut combined = 0.0;
        let mut rank = 0.0;
        for (pressure, &old_score) in pass.pressures.iter().zip(&pass.base_scores) {
            let new_score = cache.get_pressure_score(pressure.as_ref(), pass.patch, &mutant.species);
            if old_score > 0.0 && new_score <= 0.0 {
                log::trace!(
                    "{} fails {} which its base passes",
                    mutant.species.id,
                    pressure.name()
                );
                return None;
            }
            combined += weighted_compared_scores(new_score, old_score, pressure.strength());
            rank += pressure.strength() * normalized(new_score, old_score);
        }
        if combined <= 0.0 {
            log::trace!("{} pruned with combined score {}", mutant.species.id, combined);
            return None;
        }
        Some(Scored { mutant, rank })
    }

    fn finish(&self, base: &Species, mut species: Species, rng: &mut EvoRng) -> Species {
        species.genus = base.genus.clone();
        species.epithet = naming::mutate_epithet(&base.epithet, rng);
        let jitter = self.limits.colour_change_max;
        species.colour.r = (species.colour.r + rng.normal(jitter)).clamp(0.0, 1.0);
        species.colour.g = (species.colour.g + rng.normal(jitter)).clamp(0.0, 1.0);
        species.colour.b = (species.colour.b + rng.normal(jitter)).clamp(0.0, 1.0);
        species.parent = Some(base.id);
        species.generation = base.generation + 1;
        species.player_species = false;
        species.on_edited(self.params);
        species
    }
}

fn honours_contract(
    operator: &dyn MutationOperator,
    input: &Mutant,
    base: &Species,
    mutant: &Mutant,
) -> bool {
    let valid_mp = mutant.mp >= 0.0 && mutant.mp <= input.mp;
    let fresh_id = mutant.species.id != base.id && mutant.species.id != input.species.id;
    if valid_mp && fresh_id {
        return true;
    }
    log::error!(
        "{} returned an invalid mutant {} (mp {} from {})",
        operator.key(),
        mutant.species.id,
        mutant.mp,
        input.mp
    );
    debug_assert!(
        valid_mp && fresh_id,
        "mutation operator {} broke its contract",
        operator.key()
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::autoevo::operators::{AddOrganelle, ChangeBehaviour};
    use crate::compute::autoevo::testing::{FixedPressure, simple_species, test_cache, test_patch};
    use crate::compute::layout::HexSpiralLayout;
    use crate::schema::{BehaviourAxis, OrganelleId};
    use proptest::prelude::*;

    /// Returns an unchanged copy of its input.
    #[derive(Debug)]
    struct Identity;

    impl MutationOperator for Identity {
        fn key(&self) -> MutationKey {
            MutationKey::new("identity", [0, 0])
        }

        fn mutations_of(
            &self,
            base: &Species,
            mp: f32,
            ctx: &mut MutationContext<'_>,
        ) -> Option<Vec<Mutant>> {
            Some(vec![Mutant::new(ctx.derive(base), mp)])
        }
    }

    struct Fixture {
        params: SimulationParameters,
        layout: HexSpiralLayout,
        ids: SpeciesIdAllocator,
        limits: SearchLimits,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                params: SimulationParameters::default(),
                layout: HexSpiralLayout,
                ids: SpeciesIdAllocator::starting_at(100),
                limits: SearchLimits::default(),
            }
        }

        fn search(&self) -> MutationSearch<'_> {
            MutationSearch::new(self.limits, &self.params, &self.layout, &self.ids, false)
        }
    }

    fn add_cytoplasm() -> Arc<dyn MutationOperator> {
        Arc::new(AddOrganelle::new(vec![OrganelleId::new("cytoplasm")]))
    }

    fn size_pressure() -> Arc<dyn SelectionPressure> {
        Arc::new(
            FixedPressure::new("size", 1.0, 0.0)
                .with_scorer(|s| s.organelles.len() as f32)
                .with_mutation(add_cytoplasm()),
        )
    }

    #[test]
    fn test_variants_improve_and_carry_lineage() {
        let fixture = Fixture::new();
        let base = simple_species(1, &["cytoplasm"]);
        let mut cache = test_cache();
        let mut rng = EvoRng::new(1);

        let found = fixture.search().find(
            &base,
            &[size_pressure()],
            100.0,
            &test_patch(0),
            &mut cache,
            &mut rng,
        );
        assert!(!found.is_empty());
        assert!(found.len() <= fixture.limits.mutations_per_species);
        for species in &found {
            assert!(species.organelles.len() > base.organelles.len());
            assert_ne!(species.id, base.id);
            assert_eq!(species.parent, Some(base.id));
            assert_eq!(species.generation, base.generation + 1);
            assert_eq!(species.genus, base.genus);
            assert!(!species.player_species);
        }
    }

    #[test]
    fn test_repeat_recursion_is_capped() {
        let mut fixture = Fixture::new();
        fixture.limits.repeat_recursion_cap = 2;
        let base = simple_species(1, &["cytoplasm"]);
        let mut cache = test_cache();
        let mut rng = EvoRng::new(2);

        let found = fixture.search().find(
            &base,
            &[size_pressure()],
            1000.0,
            &test_patch(0),
            &mut cache,
            &mut rng,
        );
        // One application plus two repeats.
        assert_eq!(found[0].organelles.len(), base.organelles.len() + 3);
        assert!(found.iter().all(|s| s.organelles.len() <= base.organelles.len() + 3));
    }

    #[test]
    fn test_budget_limits_chain_length() {
        let fixture = Fixture::new();
        let base = simple_species(1, &["cytoplasm"]);
        let mut cache = test_cache();
        let mut rng = EvoRng::new(3);

        // Cytoplasm costs 22, so 50 points buy two.
        let found = fixture.search().find(
            &base,
            &[size_pressure()],
            50.0,
            &test_patch(0),
            &mut cache,
            &mut rng,
        );
        assert_eq!(found[0].organelles.len(), base.organelles.len() + 2);
    }

    #[test]
    fn test_regression_on_passed_pressure_is_rejected() {
        let fixture = Fixture::new();
        let base = simple_species(1, &["cytoplasm"]);
        let small: Arc<dyn SelectionPressure> = Arc::new(
            FixedPressure::new("small", 1.0, 0.0)
                .with_scorer(|s| if s.organelles.len() > 1 { 0.0 } else { 1.0 }),
        );
        let mut cache = test_cache();
        let mut rng = EvoRng::new(4);

        let found = fixture.search().find(
            &base,
            &[size_pressure(), small],
            100.0,
            &test_patch(0),
            &mut cache,
            &mut rng,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn test_no_ops_are_filtered() {
        let fixture = Fixture::new();
        let base = simple_species(1, &["cytoplasm"]);
        let pressure: Arc<dyn SelectionPressure> = Arc::new(
            FixedPressure::new("any", 1.0, 0.0)
                .with_scorer(|_| 1.0)
                .with_mutation(Arc::new(Identity)),
        );
        let mut cache = test_cache();
        let mut rng = EvoRng::new(5);

        let found =
            fixture
                .search()
                .find(&base, &[pressure], 100.0, &test_patch(0), &mut cache, &mut rng);
        assert!(found.is_empty());
    }

    #[test]
    fn test_without_operators_nothing_is_found() {
        let fixture = Fixture::new();
        let base = simple_species(1, &["cytoplasm"]);
        let pressure: Arc<dyn SelectionPressure> =
            Arc::new(FixedPressure::new("bare", 1.0, 0.0).with_scorer(|_| 1.0));
        let mut cache = test_cache();
        let mut rng = EvoRng::new(6);

        let found =
            fixture
                .search()
                .find(&base, &[pressure], 100.0, &test_patch(0), &mut cache, &mut rng);
        assert!(found.is_empty());
    }

    #[test]
    fn test_operators_are_deduplicated_by_key() {
        let a: Arc<dyn SelectionPressure> = Arc::new(
            FixedPressure::new("a", 1.0, 0.0)
                .with_mutation(add_cytoplasm())
                .with_mutation(Arc::new(ChangeBehaviour::new(BehaviourAxis::Fear, true))),
        );
        let b: Arc<dyn SelectionPressure> = Arc::new(
            FixedPressure::new("b", 1.0, 0.0)
                .with_mutation(add_cytoplasm())
                .with_mutation(Arc::new(ChangeBehaviour::new(BehaviourAxis::Fear, false))),
        );
        let operators = MutationSearch::collect_operators(&[a, b], &mut EvoRng::new(7));
        assert_eq!(operators.len(), 3);
    }

    #[test]
    fn test_search_is_deterministic_per_seed() {
        let run = || {
            let fixture = Fixture::new();
            let base = simple_species(1, &["cytoplasm"]);
            let mut cache = test_cache();
            let mut rng = EvoRng::new(42);
            fixture
                .search()
                .find(&base, &[size_pressure()], 100.0, &test_patch(0), &mut cache, &mut rng)
                .into_iter()
                .map(|s| (s.id, s.epithet, s.organelles))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_normalized_score() {
        assert_eq!(normalized(4.0, 2.0), 2.0);
        assert_eq!(normalized(3.0, 0.0), 1.0);
        assert_eq!(normalized(0.0, 0.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_search_respects_caps(seed in any::<u64>(), per_species in 1usize..5) {
            let mut fixture = Fixture::new();
            fixture.limits.mutations_per_species = per_species;
            let base = simple_species(1, &["cytoplasm", "flagellum"]);
            let pressures = [
                size_pressure(),
                Arc::new(
                    FixedPressure::new("calm", 0.5, 0.0)
                        .with_scorer(|s| 1.0 + s.behaviour.fear / 100.0)
                        .with_mutation(Arc::new(ChangeBehaviour::new(BehaviourAxis::Fear, true))),
                ) as Arc<dyn SelectionPressure>,
            ];
            let mut cache = test_cache();
            let mut rng = EvoRng::new(seed);
            let found = fixture
                .search()
                .find(&base, &pressures, 80.0, &test_patch(0), &mut cache, &mut rng);
            prop_assert!(found.len() <= per_species);
            for species in &found {
                prop_assert!(!species.same_traits(&base));
                prop_assert!(species.id.0 >= 100);
            }
        }
    }
}
