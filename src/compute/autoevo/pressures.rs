//! Built-in selection pressures.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::biology::ambient_level;
use crate::compute::cache::SimulationCache;
use crate::compute::error::AutoEvoError;
use crate::schema::{
    BehaviourAxis, Compound, EnergyConstants, OrganelleId, Patch, SimulationParameters, Species,
    SpeciesId,
};

use super::mutation::MutationOperator;
use super::operators::{
    AddOrganelle, ChangeBehaviour, ChangeMembraneRigidity, ChangeMembraneType, RemoveOrganelle,
    ShiftTemperatureTolerance, ToleranceChange, MAX_TEMPERATURE_TOLERANCE,
    MIN_TEMPERATURE_TOLERANCE,
};
use super::pressure::{PressureKey, SelectionPressure};

/// Data a [`PressureRecord`] is rebuilt against.
pub struct PressureBuildContext<'a> {
    pub params: &'a SimulationParameters,
    pub constants: &'a EnergyConstants,
    /// Species registry, for pressures that refer to other species.
    pub species: &'a BTreeMap<SpeciesId, Species>,
}

/// Constructor arguments of every built-in pressure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PressureRecord {
    Root,
    TemperatureTolerance { strength: f32 },
    MetabolicStability { strength: f32 },
    AutotrophEnergyEfficiency { compound: Compound, strength: f32 },
    CompoundCloud { compound: Compound, strength: f32 },
    CompoundConversion { from: Compound, to: Compound, strength: f32 },
    PredationEffectiveness { prey: SpeciesId, strength: f32 },
    PredatorAvoidance { predator: SpeciesId, strength: f32 },
    MaintainCompound { compound: Compound, strength: f32 },
    SurviveNight { strength: f32 },
}

impl PressureRecord {
    pub fn build(
        &self,
        ctx: &PressureBuildContext<'_>,
    ) -> Result<Arc<dyn SelectionPressure>, AutoEvoError> {
        let lookup = |id: &SpeciesId| {
            ctx.species
                .get(id)
                .map(|s| Arc::new(s.clone()))
                .ok_or(AutoEvoError::MissingSpecies(*id))
        };

        let pressure: Arc<dyn SelectionPressure> = match self {
            Self::Root => Arc::new(RootPressure::new()),
            Self::TemperatureTolerance { strength } => {
                Arc::new(TemperatureTolerancePressure::new(*strength))
            }
            Self::MetabolicStability { strength } => {
                Arc::new(MetabolicStabilityPressure::new(ctx.params, *strength)?)
            }
            Self::AutotrophEnergyEfficiency { compound, strength } => Arc::new(
                AutotrophEnergyEfficiencyPressure::new(ctx.params, ctx.constants, *compound, *strength)?,
            ),
            Self::CompoundCloud { compound, strength } => Arc::new(CompoundCloudPressure::new(
                ctx.params,
                ctx.constants,
                *compound,
                *strength,
            )?),
            Self::CompoundConversion { from, to, strength } => Arc::new(
                CompoundConversionEfficiencyPressure::new(ctx.params, *from, *to, *strength)?,
            ),
            Self::PredationEffectiveness { prey, strength } => Arc::new(
                PredationEffectivenessPressure::new(ctx.params, ctx.constants, lookup(prey)?, *strength)?,
            ),
            Self::PredatorAvoidance { predator, strength } => Arc::new(
                PredatorAvoidancePressure::new(ctx.params, lookup(predator)?, *strength)?,
            ),
            Self::MaintainCompound { compound, strength } => Arc::new(
                MaintainCompoundPressure::new(ctx.params, *compound, *strength)?,
            ),
            Self::SurviveNight { strength } => Arc::new(SurviveNightPressure::new(
                ctx.params,
                ctx.constants,
                *strength,
            )?),
        };
        Ok(pressure)
    }

    /// Compound the pressure reads from the biome, if any.
    pub fn biome_compound(&self) -> Option<Compound> {
        match self {
            Self::AutotrophEnergyEfficiency { compound, .. }
            | Self::CompoundCloud { compound, .. } => Some(*compound),
            _ => None,
        }
    }
}

fn organelle_list(
    params: &SimulationParameters,
    names: &[&str],
) -> Result<Vec<OrganelleId>, AutoEvoError> {
    names
        .iter()
        .map(|name| -> Result<OrganelleId, AutoEvoError> {
            let id = OrganelleId::new(*name);
            params.organelle(&id)?;
            Ok(id)
        })
        .collect()
}

fn storage_organelles(params: &SimulationParameters) -> Vec<OrganelleId> {
    params
        .organelles
        .iter()
        .filter(|(_, def)| def.storage > 0.0)
        .map(|(id, _)| id.clone())
        .collect()
}

fn strength_bits(strength: f32) -> u64 {
    strength.to_bits() as u64
}

fn compound_bits(compound: Compound) -> u64 {
    compound.index() as u64
}

/// Every species passes the root.
#[derive(Debug)]
pub struct RootPressure {
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl RootPressure {
    pub fn new() -> Self {
        Self {
            mutations: Vec::new(),
        }
    }
}

impl Default for RootPressure {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionPressure for RootPressure {
    fn key(&self) -> PressureKey {
        PressureKey::unit("root")
    }

    fn name(&self) -> String {
        "Root".into()
    }

    fn strength(&self) -> f32 {
        1.0
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, _species: &Species, _patch: &Patch, _cache: &mut SimulationCache) -> f32 {
        1.0
    }

    fn energy(&self, _patch: &Patch) -> f32 {
        0.0
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::Root)
    }
}

/// Fit between the patch temperature and the species' tolerance window.
/// Narrower windows score higher when they still cover the patch.
#[derive(Debug)]
pub struct TemperatureTolerancePressure {
    strength: f32,
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl TemperatureTolerancePressure {
    pub fn new(strength: f32) -> Self {
        let mutations: Vec<Arc<dyn MutationOperator>> = vec![
            Arc::new(ShiftTemperatureTolerance::new(ToleranceChange::Warmer)),
            Arc::new(ShiftTemperatureTolerance::new(ToleranceChange::Colder)),
            Arc::new(ShiftTemperatureTolerance::new(ToleranceChange::Wider)),
            Arc::new(ShiftTemperatureTolerance::new(ToleranceChange::Narrower)),
        ];
        Self {
            strength,
            mutations,
        }
    }
}

impl SelectionPressure for TemperatureTolerancePressure {
    fn key(&self) -> PressureKey {
        PressureKey::new("temperature_tolerance", [strength_bits(self.strength), 0])
    }

    fn name(&self) -> String {
        "Temperature tolerance".into()
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, patch: &Patch, _cache: &mut SimulationCache) -> f32 {
        let tolerance = species
            .tolerances
            .temperature_tolerance
            .max(MIN_TEMPERATURE_TOLERANCE);
        let distance = (patch.biome.temperature - species.tolerances.preferred_temperature).abs();
        if distance >= tolerance {
            return 0.0;
        }
        let fit = 1.0 - distance / tolerance;
        let breadth_cost = 0.5 * tolerance / MAX_TEMPERATURE_TOLERANCE;
        fit * (1.0 - breadth_cost)
    }

    fn energy(&self, _patch: &Patch) -> f32 {
        0.0
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::TemperatureTolerance {
            strength: self.strength,
        })
    }
}

/// ATP production relative to consumption.
#[derive(Debug)]
pub struct MetabolicStabilityPressure {
    strength: f32,
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl MetabolicStabilityPressure {
    pub fn new(params: &SimulationParameters, strength: f32) -> Result<Self, AutoEvoError> {
        params.compound(Compound::Atp)?;
        let mutations: Vec<Arc<dyn MutationOperator>> = vec![
            Arc::new(AddOrganelle::new(params.organelles_producing(Compound::Atp))),
            Arc::new(RemoveOrganelle::any()),
            Arc::new(ChangeBehaviour::new(BehaviourAxis::Activity, false)),
        ];
        Ok(Self {
            strength,
            mutations,
        })
    }
}

impl SelectionPressure for MetabolicStabilityPressure {
    fn key(&self) -> PressureKey {
        PressureKey::new("metabolic_stability", [strength_bits(self.strength), 0])
    }

    fn name(&self) -> String {
        "Metabolic stability".into()
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, patch: &Patch, cache: &mut SimulationCache) -> f32 {
        let balance = cache.get_energy_balance_for_species(species, patch);
        if balance.production <= 0.0 {
            return 0.0;
        }
        let consumption = balance.total_consumption();
        if consumption <= 0.0 {
            return 2.0;
        }
        (balance.production / consumption).min(2.0)
    }

    fn energy(&self, _patch: &Patch) -> f32 {
        0.0
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::MetabolicStability {
            strength: self.strength,
        })
    }
}

/// Efficiency of turning an ambient or cloud compound into usable energy.
/// The niche's energy is proportional to the compound's availability.
#[derive(Debug)]
pub struct AutotrophEnergyEfficiencyPressure {
    compound: Compound,
    strength: f32,
    environmental: bool,
    energy_per_unit: f32,
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl AutotrophEnergyEfficiencyPressure {
    pub fn new(
        params: &SimulationParameters,
        constants: &EnergyConstants,
        compound: Compound,
        strength: f32,
    ) -> Result<Self, AutoEvoError> {
        let environmental = params.compound(compound)?.environmental;
        let energy_per_unit = if environmental {
            constants.autotroph_energy_per_ambient
        } else {
            constants.cloud_energy_per_unit
        };
        let mutations: Vec<Arc<dyn MutationOperator>> = vec![
            Arc::new(AddOrganelle::new(params.organelles_using(compound))),
            Arc::new(RemoveOrganelle::any()),
        ];
        Ok(Self {
            compound,
            strength,
            environmental,
            energy_per_unit,
            mutations,
        })
    }
}

impl SelectionPressure for AutotrophEnergyEfficiencyPressure {
    fn key(&self) -> PressureKey {
        PressureKey::new(
            "autotroph_energy_efficiency",
            [compound_bits(self.compound), strength_bits(self.strength)],
        )
    }

    fn name(&self) -> String {
        format!("Autotroph energy efficiency ({})", self.compound)
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, patch: &Patch, cache: &mut SimulationCache) -> f32 {
        let conversion = cache.get_compound_conversion_score(
            species,
            patch,
            self.compound,
            Compound::Glucose,
        ) + cache.get_compound_conversion_score(species, patch, self.compound, Compound::Atp);
        if conversion <= 0.0 {
            return 0.0;
        }
        conversion / cache.get_base_hex_size_for_species(species)
    }

    fn energy(&self, patch: &Patch) -> f32 {
        let amount = if self.environmental {
            ambient_level(&patch.biome, self.compound)
        } else {
            patch.biome.cloud_availability(self.compound)
        };
        amount * self.energy_per_unit
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::AutotrophEnergyEfficiency {
            compound: self.compound,
            strength: self.strength,
        })
    }
}

/// Ability to reach a compound cloud that the species can use.
#[derive(Debug)]
pub struct CompoundCloudPressure {
    compound: Compound,
    strength: f32,
    energy_per_unit: f32,
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl CompoundCloudPressure {
    pub fn new(
        params: &SimulationParameters,
        constants: &EnergyConstants,
        compound: Compound,
        strength: f32,
    ) -> Result<Self, AutoEvoError> {
        params.compound(compound)?;
        let mutations: Vec<Arc<dyn MutationOperator>> = vec![
            Arc::new(AddOrganelle::new(organelle_list(params, &["flagellum"])?)),
            Arc::new(ChangeMembraneRigidity::new(false)),
            Arc::new(ChangeBehaviour::new(BehaviourAxis::Activity, true)),
            Arc::new(RemoveOrganelle::any()),
        ];
        Ok(Self {
            compound,
            strength,
            energy_per_unit: constants.cloud_energy_per_unit,
            mutations,
        })
    }
}

impl SelectionPressure for CompoundCloudPressure {
    fn key(&self) -> PressureKey {
        PressureKey::new(
            "compound_cloud",
            [compound_bits(self.compound), strength_bits(self.strength)],
        )
    }

    fn name(&self) -> String {
        format!("Compound cloud ({})", self.compound)
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, patch: &Patch, cache: &mut SimulationCache) -> f32 {
        let usable =
            cache.get_compound_conversion_score(species, patch, self.compound, Compound::Atp)
                + cache.get_compound_conversion_score(
                    species,
                    patch,
                    self.compound,
                    Compound::Glucose,
                );
        if usable <= 0.0 {
            return 0.0;
        }
        cache.get_base_speed_for_species(species)
    }

    fn energy(&self, patch: &Patch) -> f32 {
        patch.biome.cloud_availability(self.compound) * self.energy_per_unit
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::CompoundCloud {
            compound: self.compound,
            strength: self.strength,
        })
    }
}

/// Per-hex efficiency of a compound conversion.
#[derive(Debug)]
pub struct CompoundConversionEfficiencyPressure {
    from: Compound,
    to: Compound,
    strength: f32,
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl CompoundConversionEfficiencyPressure {
    pub fn new(
        params: &SimulationParameters,
        from: Compound,
        to: Compound,
        strength: f32,
    ) -> Result<Self, AutoEvoError> {
        params.compound(from)?;
        params.compound(to)?;
        let producers = params.organelles_producing(to);
        let converters = params
            .organelles_using(from)
            .into_iter()
            .filter(|id| producers.contains(id))
            .collect();
        let mutations: Vec<Arc<dyn MutationOperator>> = vec![
            Arc::new(AddOrganelle::new(converters)),
            Arc::new(RemoveOrganelle::any()),
        ];
        Ok(Self {
            from,
            to,
            strength,
            mutations,
        })
    }
}

impl SelectionPressure for CompoundConversionEfficiencyPressure {
    fn key(&self) -> PressureKey {
        PressureKey::new(
            "compound_conversion",
            [
                compound_bits(self.from) << 32 | compound_bits(self.to),
                strength_bits(self.strength),
            ],
        )
    }

    fn name(&self) -> String {
        format!("Conversion efficiency ({} to {})", self.from, self.to)
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, patch: &Patch, cache: &mut SimulationCache) -> f32 {
        let conversion = cache.get_compound_conversion_score(species, patch, self.from, self.to);
        if conversion <= 0.0 {
            return 0.0;
        }
        conversion / cache.get_base_hex_size_for_species(species)
    }

    fn energy(&self, _patch: &Patch) -> f32 {
        0.0
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::CompoundConversion {
            from: self.from,
            to: self.to,
            strength: self.strength,
        })
    }
}

/// How well the species hunts one prey species. The niche's energy grows
/// with the prey population.
#[derive(Debug)]
pub struct PredationEffectivenessPressure {
    prey: Arc<Species>,
    strength: f32,
    energy_per_prey: f32,
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl PredationEffectivenessPressure {
    pub fn new(
        params: &SimulationParameters,
        constants: &EnergyConstants,
        prey: Arc<Species>,
        strength: f32,
    ) -> Result<Self, AutoEvoError> {
        let weapons = organelle_list(
            params,
            &["pilus", "oxytoxy_proteins", "flagellum", "toxin_vacuole"],
        )?;
        let mutations: Vec<Arc<dyn MutationOperator>> = vec![
            Arc::new(AddOrganelle::new(weapons)),
            Arc::new(ChangeMembraneType),
            Arc::new(ChangeBehaviour::new(BehaviourAxis::Aggression, true)),
            Arc::new(ChangeMembraneRigidity::new(false)),
        ];
        Ok(Self {
            prey,
            strength,
            energy_per_prey: constants.prey_individual_energy * constants.predation_energy_fraction,
            mutations,
        })
    }

    pub fn prey(&self) -> SpeciesId {
        self.prey.id
    }
}

impl SelectionPressure for PredationEffectivenessPressure {
    fn key(&self) -> PressureKey {
        PressureKey::new(
            "predation_effectiveness",
            [self.prey.id.0, strength_bits(self.strength)],
        )
    }

    fn name(&self) -> String {
        format!("Predation of {}", self.prey.formatted_name())
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, patch: &Patch, cache: &mut SimulationCache) -> f32 {
        cache.get_predation_score(species, &self.prey, patch)
    }

    fn energy(&self, patch: &Patch) -> f32 {
        patch.population(self.prey.id).max(0) as f32 * self.energy_per_prey
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::PredationEffectiveness {
            prey: self.prey.id,
            strength: self.strength,
        })
    }
}

/// Resistance to being hunted by one predator species.
#[derive(Debug)]
pub struct PredatorAvoidancePressure {
    predator: Arc<Species>,
    strength: f32,
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl PredatorAvoidancePressure {
    pub fn new(
        params: &SimulationParameters,
        predator: Arc<Species>,
        strength: f32,
    ) -> Result<Self, AutoEvoError> {
        let mutations: Vec<Arc<dyn MutationOperator>> = vec![
            Arc::new(AddOrganelle::new(organelle_list(params, &["flagellum"])?)),
            Arc::new(ChangeMembraneRigidity::new(true)),
            Arc::new(ChangeBehaviour::new(BehaviourAxis::Fear, true)),
            Arc::new(ChangeMembraneType),
        ];
        Ok(Self {
            predator,
            strength,
            mutations,
        })
    }
}

impl SelectionPressure for PredatorAvoidancePressure {
    fn key(&self) -> PressureKey {
        PressureKey::new(
            "predator_avoidance",
            [self.predator.id.0, strength_bits(self.strength)],
        )
    }

    fn name(&self) -> String {
        format!("Avoiding {}", self.predator.formatted_name())
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, patch: &Patch, cache: &mut SimulationCache) -> f32 {
        1.0 / (1.0 + cache.get_predation_score(&self.predator, species, patch))
    }

    fn energy(&self, _patch: &Patch) -> f32 {
        0.0
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::PredatorAvoidance {
            predator: self.predator.id,
            strength: self.strength,
        })
    }
}

/// How long the species can keep consuming a compound from storage.
#[derive(Debug)]
pub struct MaintainCompoundPressure {
    compound: Compound,
    strength: f32,
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl MaintainCompoundPressure {
    pub fn new(
        params: &SimulationParameters,
        compound: Compound,
        strength: f32,
    ) -> Result<Self, AutoEvoError> {
        params.compound(compound)?;
        let mutations: Vec<Arc<dyn MutationOperator>> = vec![
            Arc::new(AddOrganelle::new(storage_organelles(params))),
            Arc::new(RemoveOrganelle::any()),
        ];
        Ok(Self {
            compound,
            strength,
            mutations,
        })
    }
}

impl SelectionPressure for MaintainCompoundPressure {
    fn key(&self) -> PressureKey {
        PressureKey::new(
            "maintain_compound",
            [compound_bits(self.compound), strength_bits(self.strength)],
        )
    }

    fn name(&self) -> String {
        format!("Maintain {}", self.compound)
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, patch: &Patch, cache: &mut SimulationCache) -> f32 {
        let seconds = cache.get_storage_score(species, patch, self.compound);
        if seconds <= 0.0 {
            return 0.0;
        }
        seconds / (seconds + 10.0)
    }

    fn energy(&self, _patch: &Patch) -> f32 {
        0.0
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::MaintainCompound {
            compound: self.compound,
            strength: self.strength,
        })
    }
}

/// Species depending on day-only compounds must bridge the night from
/// storage. Everyone else passes with a full score.
#[derive(Debug)]
pub struct SurviveNightPressure {
    strength: f32,
    night_duration: f32,
    mutations: Vec<Arc<dyn MutationOperator>>,
}

impl SurviveNightPressure {
    pub fn new(
        params: &SimulationParameters,
        constants: &EnergyConstants,
        strength: f32,
    ) -> Result<Self, AutoEvoError> {
        params.compound(Compound::Atp)?;
        let mutations: Vec<Arc<dyn MutationOperator>> = vec![Arc::new(AddOrganelle::new(
            storage_organelles(params),
        ))];
        Ok(Self {
            strength,
            night_duration: constants.night_duration,
            mutations,
        })
    }
}

impl SelectionPressure for SurviveNightPressure {
    fn key(&self) -> PressureKey {
        PressureKey::new("survive_night", [strength_bits(self.strength), 0])
    }

    fn name(&self) -> String {
        "Survive the night".into()
    }

    fn strength(&self) -> f32 {
        self.strength
    }

    fn mutations(&self) -> &[Arc<dyn MutationOperator>] {
        &self.mutations
    }

    fn score(&self, species: &Species, patch: &Patch, cache: &mut SimulationCache) -> f32 {
        if !cache.get_uses_varying_compounds(species, patch) {
            return 1.0;
        }
        let seconds = cache.get_storage_score(species, patch, Compound::Atp);
        if self.night_duration <= 0.0 {
            return 1.0;
        }
        (seconds / self.night_duration).min(1.0)
    }

    fn energy(&self, _patch: &Patch) -> f32 {
        0.0
    }

    fn record(&self) -> Option<PressureRecord> {
        Some(PressureRecord::SurviveNight {
            strength: self.strength,
        })
    }
}
