//! Population allocation from niche energy.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::compute::biology::EnergyBalance;
use crate::compute::cache::SimulationCache;
use crate::schema::{EnergyAttribution, MAX_BEHAVIOUR_VALUE, Patch, Species, SpeciesId};

use super::miche::{Miche, NodeId};

/// ATP an individual needs per second at its activity level.
pub fn individual_cost(balance: &EnergyBalance, activity: f32) -> f32 {
    balance.stationary_consumption()
        + balance.movement * (activity.clamp(0.0, MAX_BEHAVIOUR_VALUE) / MAX_BEHAVIOUR_VALUE)
}

/// `floor(energy / cost)`, or zero when below `minimum_viable` or when the
/// cost is not positive.
pub fn population_for(energy: f32, individual_cost: f32, minimum_viable: i64) -> i64 {
    if individual_cost <= 0.0 || energy <= 0.0 || !energy.is_finite() {
        return 0;
    }
    let population = (energy / individual_cost).floor() as i64;
    if population < minimum_viable.max(0) {
        0
    } else {
        population
    }
}

/// Populations and energy records of one allocation pass.
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub populations: BTreeMap<SpeciesId, i64>,
    pub energy: Vec<EnergyAttribution>,
}

/// Turns leaf occupancy into population counts.
#[derive(Debug, Clone, Copy)]
pub struct PopulationAllocator {
    minimum_viable_population: i64,
}

impl PopulationAllocator {
    pub fn new(minimum_viable_population: i64) -> Self {
        Self {
            minimum_viable_population,
        }
    }

    /// Nodes whose pressures feed a species: the union of the
    /// back-traversals of every leaf it holds.
    fn feeding_nodes(miche: &Miche, species: SpeciesId) -> BTreeSet<NodeId> {
        miche
            .leaf_nodes()
            .into_iter()
            .filter(|leaf| {
                miche
                    .node(*leaf)
                    .and_then(|node| node.occupant())
                    .is_some_and(|occupant| occupant.id == species)
            })
            .flat_map(|leaf| miche.back_traversal(leaf))
            .collect()
    }

    /// Energy reaching a species, one record per contributing pressure.
    /// Pressures without positive energy contribute nothing.
    pub fn energy_sources(
        &self,
        miche: &Miche,
        patch: &Patch,
        species: SpeciesId,
    ) -> Vec<EnergyAttribution> {
        Self::feeding_nodes(miche, species)
            .into_iter()
            .filter_map(|id| miche.node(id))
            .filter_map(|node| {
                let energy = node.pressure().energy(patch);
                (energy > 0.0).then(|| EnergyAttribution {
                    species,
                    pressure: node.pressure().name(),
                    energy,
                })
            })
            .collect()
    }

    pub fn total_energy(&self, miche: &Miche, patch: &Patch, species: SpeciesId) -> f32 {
        self.energy_sources(miche, patch, species)
            .iter()
            .map(|record| record.energy)
            .sum()
    }

    /// Population of one species in the tree's patch.
    pub fn population(
        &self,
        miche: &Miche,
        patch: &Patch,
        cache: &mut SimulationCache,
        species: &Species,
    ) -> i64 {
        if species.player_species {
            return patch.population(species.id);
        }
        let energy = self.total_energy(miche, patch, species.id);
        self.population_from_energy(energy, patch, cache, species)
    }

    fn population_from_energy(
        &self,
        energy: f32,
        patch: &Patch,
        cache: &mut SimulationCache,
        species: &Species,
    ) -> i64 {
        let balance = cache.get_energy_balance_for_species(species, patch);
        let cost = individual_cost(&balance, species.behaviour.activity);
        if cost <= 0.0 {
            log::warn!(
                "{} has non-positive individual cost {} in {}",
                species.formatted_name(),
                cost,
                patch.id
            );
        }
        population_for(energy, cost, self.minimum_viable_population)
    }

    /// Populations of every given species. Species holding no leaf get zero;
    /// player species keep their tracked population.
    pub fn allocate<'a>(
        &self,
        miche: &Miche,
        patch: &Patch,
        cache: &mut SimulationCache,
        species: impl IntoIterator<Item = &'a Arc<Species>>,
    ) -> Allocation {
        let mut allocation = Allocation::default();
        for species in species {
            if species.player_species {
                let tracked = patch.population(species.id);
                if tracked <= 0 {
                    log::warn!(
                        "Player species {} has no tracked population in {}",
                        species.formatted_name(),
                        patch.id
                    );
                }
                allocation.populations.insert(species.id, tracked.max(0));
                continue;
            }

            let sources = self.energy_sources(miche, patch, species.id);
            let energy: f32 = sources.iter().map(|record| record.energy).sum();
            let population = self.population_from_energy(energy, patch, cache, species);
            log::debug!(
                "{} in {}: energy {:.1}, population {}",
                species.formatted_name(),
                patch.id,
                energy,
                population
            );
            allocation.populations.insert(species.id, population);
            if population > 0 {
                allocation.energy.extend(sources);
            }
        }
        allocation
    }
}
