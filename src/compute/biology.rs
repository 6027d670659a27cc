//! Derived species statistics.
//!
//! Simplified, deterministic formulas for the quantities the selection
//! pressures score against. Every function here is pure: the same species
//! in the same biome always yields the same value, which is what makes
//! [`SimulationCache`](super::SimulationCache) memoization sound.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::schema::{
    BioProcess, BiomeConditions, Compound, EnergyConstants, MAX_BEHAVIOUR_VALUE, ProcessId,
    SimulationParameters, Species, WorldSettings,
};

/// Temperature mapped to 1.0 ambient for thermosynthesis.
const TEMPERATURE_NORMALIZATION: f32 = 50.0;

/// ATP budget of one individual.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EnergyBalance {
    /// ATP produced per second.
    pub production: f32,
    /// ATP spent on osmoregulation.
    pub osmoregulation: f32,
    /// ATP consumed by processes.
    pub process_consumption: f32,
    /// ATP spent while moving.
    pub movement: f32,
    /// Production minus every cost.
    pub final_balance: f32,
    /// Production minus costs of a cell that does not move.
    pub final_balance_stationary: f32,
}

impl EnergyBalance {
    /// Costs paid regardless of activity.
    pub fn stationary_consumption(&self) -> f32 {
        self.osmoregulation + self.process_consumption
    }

    pub fn total_consumption(&self) -> f32 {
        self.stationary_consumption() + self.movement
    }
}

/// Raw scores of the tools a species can hunt with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PredationToolScores {
    pub pilus: f32,
    pub toxin: f32,
    /// Engulfing capacity (hex size), zero when the membrane cannot engulf.
    pub engulf: f32,
}

/// Inputs of [`predation_score`], gathered from cached statistics.
#[derive(Debug, Clone, Copy)]
pub struct PredationInputs {
    pub predator_speed: f32,
    pub prey_speed: f32,
    pub predator_size: f32,
    pub prey_size: f32,
    pub predator_tools: PredationToolScores,
    pub predator_aggression: f32,
}

/// Context for derived statistics.
#[derive(Clone, Copy)]
pub struct Biology<'a> {
    pub params: &'a SimulationParameters,
    pub constants: &'a EnergyConstants,
    pub world: &'a WorldSettings,
    /// Known process speeds of the biome being evaluated.
    speeds: Option<&'a HashMap<ProcessId, f32>>,
}

impl<'a> Biology<'a> {
    pub fn new(
        params: &'a SimulationParameters,
        constants: &'a EnergyConstants,
        world: &'a WorldSettings,
    ) -> Self {
        Self {
            params,
            constants,
            world,
            speeds: None,
        }
    }

    /// Read process speeds from `speeds` instead of recomputing them. Every
    /// entry must belong to the biome later passed in.
    pub fn with_process_speeds(mut self, speeds: &'a HashMap<ProcessId, f32>) -> Self {
        self.speeds = Some(speeds);
        self
    }

    fn speed_of(&self, process: &ProcessId, biome: &BiomeConditions) -> f32 {
        self.speeds
            .and_then(|speeds| speeds.get(process).copied())
            .unwrap_or_else(|| self.process_speed(process, biome))
    }

    /// Effective size; prokaryotes count half.
    pub fn hex_size(&self, species: &Species) -> f32 {
        let hexes = species.hex_count().max(1) as f32;
        if species.has_nucleus() {
            hexes
        } else {
            hexes * 0.5
        }
    }

    /// Base movement speed.
    pub fn base_speed(&self, species: &Species) -> f32 {
        let force = self.constants.base_movement_force
            + species
                .organelles
                .iter()
                .filter_map(|t| self.params.organelles.get(&t.organelle))
                .map(|def| def.movement_force)
                .sum::<f32>();

        let movement_factor = self
            .params
            .membranes
            .get(&species.membrane)
            .map(|m| m.movement_factor)
            .unwrap_or(1.0);

        let rigidity = (species.membrane_rigidity.clamp(-1.0, 1.0) + 1.0) * 0.5;
        let rigidity_factor = 1.0 - self.constants.rigidity_speed_penalty * rigidity;

        force * movement_factor * rigidity_factor / self.hex_size(species).sqrt()
    }

    /// Availability of an input compound for a process in this biome.
    fn input_availability(&self, compound: Compound, biome: &BiomeConditions) -> f32 {
        let Some(def) = self.params.compounds.get(&compound) else {
            return 0.0;
        };
        if !def.environmental {
            // Cloud compounds and ATP are assumed to be collected as needed.
            return 1.0;
        }

        let ambient = ambient_level(biome, compound);

        if def.varies_day_night && self.world.day_night_cycle_enabled {
            ambient * self.world.daytime_fraction
        } else {
            ambient
        }
    }

    /// Fraction (0.0-1.0) of its maximum rate a process reaches in a biome.
    /// The scarcest environmental input limits the rate.
    pub fn process_speed(&self, process: &ProcessId, biome: &BiomeConditions) -> f32 {
        let Some(process) = self.params.processes.get(process) else {
            return 0.0;
        };
        process
            .inputs
            .keys()
            .map(|compound| self.input_availability(*compound, biome))
            .fold(1.0f32, f32::min)
            .max(0.0)
    }

    /// Iterate `(process rate, process speed, process)` of every organelle.
    fn running_processes<'s>(
        &'s self,
        species: &'s Species,
        biome: &'s BiomeConditions,
    ) -> impl Iterator<Item = (f32, f32, &'a BioProcess)> + 's {
        species
            .organelles
            .iter()
            .filter_map(move |t| self.params.organelles.get(&t.organelle))
            .flat_map(|def| def.processes.iter())
            .filter_map(move |(id, rate)| {
                let process = self.params.processes.get(id)?;
                Some((*rate, self.speed_of(id, biome), process))
            })
    }

    /// ATP budget of one individual in a biome.
    pub fn energy_balance(&self, species: &Species, biome: &BiomeConditions) -> EnergyBalance {
        let mut production = 0.0;
        let mut process_consumption = 0.0;
        for (rate, speed, process) in self.running_processes(species, biome) {
            production += rate * speed * process.outputs.get(&Compound::Atp).unwrap_or(&0.0);
            process_consumption +=
                rate * speed * process.inputs.get(&Compound::Atp).unwrap_or(&0.0);
        }

        let osmoregulation_factor = self
            .params
            .membranes
            .get(&species.membrane)
            .map(|m| m.osmoregulation_factor)
            .unwrap_or(1.0);
        let osmoregulation = species.hex_count().max(1) as f32
            * self.constants.osmoregulation_cost_per_hex
            * osmoregulation_factor;

        let flagella = species
            .organelles
            .iter()
            .filter_map(|t| self.params.organelles.get(&t.organelle))
            .filter(|def| def.movement_force > 0.0)
            .count() as f32;
        let movement =
            self.constants.base_movement_cost + flagella * self.constants.flagellum_movement_cost;

        let stationary = production - osmoregulation - process_consumption;
        EnergyBalance {
            production,
            osmoregulation,
            process_consumption,
            movement,
            final_balance: stationary - movement,
            final_balance_stationary: stationary,
        }
    }

    /// How well a species turns `from` into `to` in a biome.
    pub fn compound_conversion(
        &self,
        species: &Species,
        from: Compound,
        to: Compound,
        biome: &BiomeConditions,
    ) -> f32 {
        self.running_processes(species, biome)
            .filter_map(|(rate, speed, process)| {
                let input = *process.inputs.get(&from)?;
                let output = *process.outputs.get(&to)?;
                if input <= 0.0 {
                    return None;
                }
                Some(rate * speed * output / input)
            })
            .sum()
    }

    /// Seconds the species can keep consuming `compound` from storage.
    pub fn storage_score(
        &self,
        species: &Species,
        compound: Compound,
        biome: &BiomeConditions,
    ) -> f32 {
        let capacity: f32 = species
            .organelles
            .iter()
            .filter_map(|t| self.params.organelles.get(&t.organelle))
            .map(|def| def.storage)
            .sum();

        let consumption = if compound == Compound::Atp {
            self.energy_balance(species, biome).stationary_consumption()
        } else {
            self.running_processes(species, biome)
                .map(|(rate, speed, process)| {
                    rate * speed * process.inputs.get(&compound).unwrap_or(&0.0)
                })
                .sum()
        };

        if consumption <= 0.0 {
            capacity
        } else {
            capacity / consumption
        }
    }

    /// Whether a process of the species depends on a compound that changes
    /// between day and night.
    pub fn uses_varying_compounds(&self, species: &Species, biome: &BiomeConditions) -> bool {
        if !self.world.day_night_cycle_enabled {
            return false;
        }
        self.running_processes(species, biome).any(|(_, _, process)| {
            process.inputs.keys().any(|compound| {
                self.params
                    .compounds
                    .get(compound)
                    .is_some_and(|def| def.varies_day_night)
                    && biome.ambient(*compound) > 0.0
            })
        })
    }

    pub fn predation_tools(&self, species: &Species) -> PredationToolScores {
        let mut tools = PredationToolScores::default();
        for def in species
            .organelles
            .iter()
            .filter_map(|t| self.params.organelles.get(&t.organelle))
        {
            if def.pilus {
                tools.pilus += 1.0;
            }
            tools.toxin += def.toxin;
        }
        let can_engulf = self
            .params
            .membranes
            .get(&species.membrane)
            .is_some_and(|m| m.can_engulf);
        if can_engulf {
            tools.engulf = self.hex_size(species);
        }
        tools
    }
}

/// Ambient level of an environmental compound; temperature is normalized
/// to 0.0-1.0.
/// Whether the biome describes `compound` at all. Temperature is always
/// present.
pub(crate) fn biome_provides(biome: &BiomeConditions, compound: Compound) -> bool {
    compound == Compound::Temperature || biome.compounds.contains_key(&compound)
}

pub(crate) fn ambient_level(biome: &BiomeConditions, compound: Compound) -> f32 {
    if compound == Compound::Temperature {
        (biome.temperature / TEMPERATURE_NORMALIZATION).clamp(0.0, 1.0)
    } else {
        biome.ambient(compound)
    }
}

/// Hunting success of a predator against a prey.
pub fn predation_score(inputs: &PredationInputs, engulf_size_ratio: f32) -> f32 {
    if inputs.prey_speed <= 0.0 && inputs.predator_speed <= 0.0 {
        return 0.0;
    }

    let catch = if inputs.prey_speed <= 0.0 {
        2.0
    } else {
        (inputs.predator_speed / inputs.prey_speed).min(2.0)
    };

    let tools = &inputs.predator_tools;
    let engulf = if tools.engulf > 0.0 && inputs.predator_size >= inputs.prey_size * engulf_size_ratio
    {
        2.0
    } else {
        0.0
    };
    let attack = engulf + tools.pilus * 0.5 + tools.toxin * 0.7;

    let aggression = 0.5 + inputs.predator_aggression / MAX_BEHAVIOUR_VALUE;
    attack * catch * aggression
}
