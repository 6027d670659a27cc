//! Configuration types for auto-evo runs.

use serde::{Deserialize, Serialize};

use super::{Compound, MembraneKind, OrganelleId, ProcessId};

/// World-level settings shared by every patch of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    /// Multiplier applied to the mutation point budget of AI species.
    #[serde(default = "default_ai_mutation_multiplier")]
    pub ai_mutation_multiplier: f32,
    /// Whether ambient light follows a day/night cycle.
    #[serde(default)]
    pub day_night_cycle_enabled: bool,
    /// Fraction of the cycle that is daytime (0.0-1.0).
    #[serde(default = "default_daytime_fraction")]
    pub daytime_fraction: f32,
    /// Restrict mutations to "life as we know it" content.
    #[serde(default)]
    pub lawk_only: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            ai_mutation_multiplier: default_ai_mutation_multiplier(),
            day_night_cycle_enabled: false,
            daytime_fraction: default_daytime_fraction(),
            lawk_only: false,
        }
    }
}

fn default_ai_mutation_multiplier() -> f32 {
    1.0
}
fn default_daytime_fraction() -> f32 {
    0.5
}

/// Constants of the derived-statistics and energy model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyConstants {
    /// ATP per second spent per hex on osmoregulation.
    #[serde(default = "default_osmoregulation_cost")]
    pub osmoregulation_cost_per_hex: f32,
    /// ATP per second for basic movement.
    #[serde(default = "default_base_movement_cost")]
    pub base_movement_cost: f32,
    /// Extra ATP per second per flagellum while moving.
    #[serde(default = "default_flagellum_cost")]
    pub flagellum_movement_cost: f32,
    /// Movement force every cell has without flagella.
    #[serde(default = "default_base_movement_force")]
    pub base_movement_force: f32,
    /// Speed lost at full membrane rigidity (fraction).
    #[serde(default = "default_rigidity_speed_penalty")]
    pub rigidity_speed_penalty: f32,
    /// Niche energy per unit of ambient environmental compound.
    #[serde(default = "default_autotroph_energy")]
    pub autotroph_energy_per_ambient: f32,
    /// Niche energy per unit of cloud compound (density x amount).
    #[serde(default = "default_cloud_energy")]
    pub cloud_energy_per_unit: f32,
    /// Fraction of prey energy available to predators.
    #[serde(default = "default_predation_fraction")]
    pub predation_energy_fraction: f32,
    /// Energy held by one prey individual.
    #[serde(default = "default_prey_individual_energy")]
    pub prey_individual_energy: f32,
    /// Predator must be this many times larger than prey to engulf it.
    #[serde(default = "default_engulf_size_ratio")]
    pub engulf_size_ratio: f32,
    /// Seconds a species must survive without varying compounds.
    #[serde(default = "default_night_duration")]
    pub night_duration: f32,
}

impl Default for EnergyConstants {
    fn default() -> Self {
        Self {
            osmoregulation_cost_per_hex: default_osmoregulation_cost(),
            base_movement_cost: default_base_movement_cost(),
            flagellum_movement_cost: default_flagellum_cost(),
            base_movement_force: default_base_movement_force(),
            rigidity_speed_penalty: default_rigidity_speed_penalty(),
            autotroph_energy_per_ambient: default_autotroph_energy(),
            cloud_energy_per_unit: default_cloud_energy(),
            predation_energy_fraction: default_predation_fraction(),
            prey_individual_energy: default_prey_individual_energy(),
            engulf_size_ratio: default_engulf_size_ratio(),
            night_duration: default_night_duration(),
        }
    }
}

fn default_osmoregulation_cost() -> f32 {
    1.0
}
fn default_base_movement_cost() -> f32 {
    1.0
}
fn default_flagellum_cost() -> f32 {
    0.7
}
fn default_base_movement_force() -> f32 {
    1.0
}
fn default_rigidity_speed_penalty() -> f32 {
    0.3
}
fn default_autotroph_energy() -> f32 {
    50_000.0
}
fn default_cloud_energy() -> f32 {
    500.0
}
fn default_predation_fraction() -> f32 {
    0.1
}
fn default_prey_individual_energy() -> f32 {
    40.0
}
fn default_engulf_size_ratio() -> f32 {
    1.5
}
fn default_night_duration() -> f32 {
    60.0
}

/// Top-level configuration of an auto-evo run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoEvoConfig {
    /// Mutation point budget of one search pass (before the AI multiplier).
    #[serde(default = "default_mutation_points")]
    pub mutation_points: f32,
    /// Variants returned by the search for each species and niche.
    #[serde(default = "default_mutations_per_species")]
    pub mutations_per_species: usize,
    /// Variants kept from a single operator application.
    #[serde(default = "default_max_variants_per_mutation")]
    pub max_variants_per_mutation: usize,
    /// Variants kept across all operators of one search.
    #[serde(default = "default_max_variants_in_mutations")]
    pub max_variants_in_mutations: usize,
    /// How often a repeatable operator is re-applied to its own output.
    #[serde(default = "default_repeat_recursion_cap")]
    pub repeat_recursion_cap: usize,
    /// Candidates tested per patch after filtering.
    #[serde(default = "default_mutations_to_try")]
    pub mutations_to_try: usize,
    /// Populations below this are treated as local extinction.
    #[serde(default = "default_minimum_viable_population")]
    pub minimum_viable_population: i64,
    /// New species a single species may split into per generation and patch.
    #[serde(default = "default_max_splits_per_species")]
    pub max_splits_per_species: usize,
    /// Allow candidates that fill other niches to become new species.
    #[serde(default = "default_true")]
    pub allow_speciation: bool,
    /// Allow candidates that improve a species in its own niche to replace it.
    #[serde(default = "default_true")]
    pub allow_replacement: bool,
    /// Standard deviation of the cosmetic colour change of new species.
    #[serde(default = "default_colour_change_max")]
    pub colour_change_max: f32,
    /// Energy model constants.
    #[serde(default)]
    pub energy: EnergyConstants,
    /// World settings.
    #[serde(default)]
    pub world: WorldSettings,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for AutoEvoConfig {
    fn default() -> Self {
        Self {
            mutation_points: default_mutation_points(),
            mutations_per_species: default_mutations_per_species(),
            max_variants_per_mutation: default_max_variants_per_mutation(),
            max_variants_in_mutations: default_max_variants_in_mutations(),
            repeat_recursion_cap: default_repeat_recursion_cap(),
            mutations_to_try: default_mutations_to_try(),
            minimum_viable_population: default_minimum_viable_population(),
            max_splits_per_species: default_max_splits_per_species(),
            allow_speciation: true,
            allow_replacement: true,
            colour_change_max: default_colour_change_max(),
            energy: EnergyConstants::default(),
            world: WorldSettings::default(),
            random_seed: None,
        }
    }
}

fn default_mutation_points() -> f32 {
    100.0
}
fn default_mutations_per_species() -> usize {
    3
}
fn default_max_variants_per_mutation() -> usize {
    5
}
fn default_max_variants_in_mutations() -> usize {
    20
}
fn default_repeat_recursion_cap() -> usize {
    3
}
fn default_mutations_to_try() -> usize {
    30
}
fn default_minimum_viable_population() -> i64 {
    20
}
fn default_max_splits_per_species() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_colour_change_max() -> f32 {
    0.05
}

impl AutoEvoConfig {
    /// Mutation points available to an AI species after the world multiplier.
    pub fn effective_mutation_points(&self) -> f32 {
        self.mutation_points * self.world.ai_mutation_multiplier
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.effective_mutation_points() <= 0.0 {
            return Err(ConfigError::InvalidMutationPoints(
                self.effective_mutation_points(),
            ));
        }
        if self.max_variants_per_mutation == 0 || self.max_variants_in_mutations == 0 {
            return Err(ConfigError::InvalidVariantCaps);
        }
        if self.max_variants_per_mutation > self.max_variants_in_mutations {
            return Err(ConfigError::InvalidVariantCaps);
        }
        if self.minimum_viable_population < 0 {
            return Err(ConfigError::InvalidViabilityThreshold(
                self.minimum_viable_population,
            ));
        }
        if !(0.0..=1.0).contains(&self.world.daytime_fraction) {
            return Err(ConfigError::InvalidDaytimeFraction(self.world.daytime_fraction));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Mutation point budget must be positive, got {0}")]
    InvalidMutationPoints(f32),
    #[error("Variant caps must be non-zero and per-mutation cap must not exceed the total cap")]
    InvalidVariantCaps,
    #[error("Minimum viable population must be non-negative, got {0}")]
    InvalidViabilityThreshold(i64),
    #[error("Daytime fraction must be within 0..=1, got {0}")]
    InvalidDaytimeFraction(f32),
    #[error("Compound {0} is missing from the simulation tables")]
    MissingCompound(Compound),
    #[error("Organelle {0} is missing from the simulation tables")]
    MissingOrganelle(OrganelleId),
    #[error("Membrane {0:?} is missing from the simulation tables")]
    MissingMembrane(MembraneKind),
    #[error("Process {0} is missing from the simulation tables")]
    MissingProcess(ProcessId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = AutoEvoConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_caps() {
        let config = AutoEvoConfig {
            max_variants_per_mutation: 50,
            max_variants_in_mutations: 10,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidVariantCaps)
        ));
    }

    #[test]
    fn test_multiplier_scales_budget() {
        let mut config = AutoEvoConfig::default();
        config.world.ai_mutation_multiplier = 0.5;
        assert_eq!(config.effective_mutation_points(), 50.0);

        config.world.ai_mutation_multiplier = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMutationPoints(_))
        ));
    }

    #[test]
    fn test_serialization_defaults() {
        let parsed: AutoEvoConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.mutations_per_species, 3);
        assert_eq!(parsed.energy.autotroph_energy_per_ambient, 50_000.0);

        let json = serde_json::to_string(&AutoEvoConfig::default()).unwrap();
        let parsed: AutoEvoConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_variants_in_mutations, 20);
    }
}
