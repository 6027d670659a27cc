//! Builds the niche tree of a patch from its biome and its living species.
//!
//! ```text
//! root
//! └ temperature tolerance
//!   └ metabolic stability
//!     ├ autotroph (sunlight)          [survive night child with day/night]
//!     ├ autotroph (temperature)       [outside LAWK, with a thermosynthesizer]
//!     ├ autotroph (chemosynthesis)    one per usable cloud compound
//!     ├ compound cloud (glucose)
//!     │ ├ conversion glucose -> ATP
//!     │ └ maintain glucose
//!     └ predation (prey)              one per living species
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compute::biology::ambient_level;
use crate::compute::error::AutoEvoError;
use crate::schema::{
    Compound, EnergyConstants, Patch, SimulationParameters, Species, SpeciesId, WorldSettings,
};

use super::miche::{Miche, NodeId};
use super::pressure::SelectionPressure;
use super::pressures::{
    AutotrophEnergyEfficiencyPressure, CompoundCloudPressure,
    CompoundConversionEfficiencyPressure, MaintainCompoundPressure, MetabolicStabilityPressure,
    PredationEffectivenessPressure, PredatorAvoidancePressure, PressureRecord, RootPressure,
    SurviveNightPressure, TemperatureTolerancePressure,
};

const TEMPERATURE_STRENGTH: f32 = 1.0;
const METABOLIC_STRENGTH: f32 = 1.0;
const AUTOTROPH_STRENGTH: f32 = 1.5;
const CLOUD_STRENGTH: f32 = 1.0;
const CONVERSION_STRENGTH: f32 = 0.8;
const MAINTAIN_STRENGTH: f32 = 0.5;
const SURVIVE_NIGHT_STRENGTH: f32 = 1.0;
const PREDATION_STRENGTH: f32 = 1.0;
const AVOIDANCE_STRENGTH: f32 = 0.5;

pub struct MicheBuilder<'a> {
    params: &'a SimulationParameters,
    constants: &'a EnergyConstants,
    world: &'a WorldSettings,
}

impl<'a> MicheBuilder<'a> {
    pub fn new(
        params: &'a SimulationParameters,
        constants: &'a EnergyConstants,
        world: &'a WorldSettings,
    ) -> Self {
        Self {
            params,
            constants,
            world,
        }
    }

    /// Build the tree of `patch`. No species are inserted.
    ///
    /// Fails when the biome mentions a compound missing from the tables or
    /// when a living species of the patch is not in `species`.
    pub fn build(
        &self,
        patch: &Patch,
        species: &BTreeMap<SpeciesId, Arc<Species>>,
    ) -> Result<Miche, AutoEvoError> {
        for compound in patch.biome.compounds.keys() {
            self.params.compound(*compound)?;
        }

        let mut miche = Miche::new(Arc::new(RootPressure::new()));
        let temperature = miche.add_child(
            miche.root(),
            Arc::new(TemperatureTolerancePressure::new(TEMPERATURE_STRENGTH)),
        )?;
        let metabolism = miche.add_child(
            temperature,
            Arc::new(MetabolicStabilityPressure::new(self.params, METABOLIC_STRENGTH)?),
        )?;

        self.add_autotroph_niches(&mut miche, metabolism, patch)?;
        self.add_consumer_niches(&mut miche, metabolism, patch)?;
        self.add_predation_niches(&mut miche, metabolism, patch, species)?;

        log::debug!(
            "Built niche tree for {} with {} nodes and {} leaves",
            patch.id,
            miche.len(),
            miche.leaf_nodes().len()
        );
        Ok(miche)
    }

    fn add_autotroph_niches(
        &self,
        miche: &mut Miche,
        parent: NodeId,
        patch: &Patch,
    ) -> Result<(), AutoEvoError> {
        let biome = &patch.biome;

        if ambient_level(biome, Compound::Sunlight) > 0.0 {
            let sunlight = miche.add_child(parent, self.autotroph(Compound::Sunlight)?)?;
            let varies = self.params.compound(Compound::Sunlight)?.varies_day_night;
            if self.world.day_night_cycle_enabled && varies {
                miche.add_child(
                    sunlight,
                    Arc::new(SurviveNightPressure::new(
                        self.params,
                        self.constants,
                        SURVIVE_NIGHT_STRENGTH,
                    )?),
                )?;
            }
        }

        let thermosynthesis = !self.params.organelles_using(Compound::Temperature).is_empty();
        if !self.world.lawk_only
            && thermosynthesis
            && ambient_level(biome, Compound::Temperature) > 0.0
        {
            miche.add_child(parent, self.autotroph(Compound::Temperature)?)?;
        }

        for &compound in biome.compounds.keys() {
            let def = self.params.compound(compound)?;
            if !def.cloud || compound == Compound::Glucose {
                continue;
            }
            if biome.cloud_availability(compound) <= 0.0
                || self.params.organelles_using(compound).is_empty()
            {
                continue;
            }
            miche.add_child(parent, self.autotroph(compound)?)?;
        }
        Ok(())
    }

    fn add_consumer_niches(
        &self,
        miche: &mut Miche,
        parent: NodeId,
        patch: &Patch,
    ) -> Result<(), AutoEvoError> {
        if patch.biome.cloud_availability(Compound::Glucose) <= 0.0 {
            return Ok(());
        }
        let cloud = miche.add_child(
            parent,
            Arc::new(CompoundCloudPressure::new(
                self.params,
                self.constants,
                Compound::Glucose,
                CLOUD_STRENGTH,
            )?),
        )?;
        miche.add_child(
            cloud,
            Arc::new(CompoundConversionEfficiencyPressure::new(
                self.params,
                Compound::Glucose,
                Compound::Atp,
                CONVERSION_STRENGTH,
            )?),
        )?;
        miche.add_child(
            cloud,
            Arc::new(MaintainCompoundPressure::new(
                self.params,
                Compound::Glucose,
                MAINTAIN_STRENGTH,
            )?),
        )?;
        Ok(())
    }

    fn add_predation_niches(
        &self,
        miche: &mut Miche,
        parent: NodeId,
        patch: &Patch,
        species: &BTreeMap<SpeciesId, Arc<Species>>,
    ) -> Result<(), AutoEvoError> {
        for prey in patch.living_species() {
            let prey = species
                .get(&prey)
                .cloned()
                .ok_or(AutoEvoError::MissingSpecies(prey))?;
            miche.add_child(
                parent,
                Arc::new(PredationEffectivenessPressure::new(
                    self.params,
                    self.constants,
                    prey,
                    PREDATION_STRENGTH,
                )?),
            )?;
        }
        Ok(())
    }

    fn autotroph(&self, compound: Compound) -> Result<Arc<dyn SelectionPressure>, AutoEvoError> {
        Ok(Arc::new(AutotrophEnergyEfficiencyPressure::new(
            self.params,
            self.constants,
            compound,
            AUTOTROPH_STRENGTH,
        )?))
    }

    /// One predator avoidance pressure per species currently holding a
    /// predation leaf that targets `prey`.
    pub fn predator_avoidance(
        &self,
        miche: &Miche,
        prey: SpeciesId,
    ) -> Result<Vec<Arc<dyn SelectionPressure>>, AutoEvoError> {
        let mut pressures: Vec<Arc<dyn SelectionPressure>> = Vec::new();
        for leaf in miche.leaf_nodes() {
            let Some(node) = miche.node(leaf) else {
                continue;
            };
            let Some(PressureRecord::PredationEffectiveness { prey: target, .. }) =
                node.pressure().record()
            else {
                continue;
            };
            let Some(predator) = node.occupant() else {
                continue;
            };
            if target != prey || predator.id == prey {
                continue;
            }
            pressures.push(Arc::new(PredatorAvoidancePressure::new(
                self.params,
                predator.clone(),
                AVOIDANCE_STRENGTH,
            )?));
        }
        Ok(pressures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::autoevo::testing::{simple_species, test_cache, test_patch};
    use crate::schema::BiomeCompound;

    fn records(miche: &Miche, nodes: impl IntoIterator<Item = NodeId>) -> Vec<PressureRecord> {
        nodes
            .into_iter()
            .filter_map(|id| miche.node(id))
            .filter_map(|node| node.pressure().record())
            .collect()
    }

    fn leaf_records(miche: &Miche) -> Vec<PressureRecord> {
        records(miche, miche.leaf_nodes())
    }

    #[test]
    fn test_default_patch_shape() {
        let params = SimulationParameters::default();
        let constants = EnergyConstants::default();
        let world = WorldSettings::default();
        let miche = MicheBuilder::new(&params, &constants, &world)
            .build(&test_patch(0), &BTreeMap::new())
            .unwrap();

        assert_eq!(miche.len(), 8);
        let leaves = leaf_records(&miche);
        assert_eq!(leaves.len(), 4);
        assert!(leaves.contains(&PressureRecord::AutotrophEnergyEfficiency {
            compound: Compound::Sunlight,
            strength: AUTOTROPH_STRENGTH,
        }));
        assert!(leaves.contains(&PressureRecord::AutotrophEnergyEfficiency {
            compound: Compound::Temperature,
            strength: AUTOTROPH_STRENGTH,
        }));
        assert!(leaves.contains(&PressureRecord::CompoundConversion {
            from: Compound::Glucose,
            to: Compound::Atp,
            strength: CONVERSION_STRENGTH,
        }));

        let sunlight = miche
            .leaf_nodes()
            .into_iter()
            .find(|id| {
                matches!(
                    miche.node(*id).and_then(|n| n.pressure().record()),
                    Some(PressureRecord::AutotrophEnergyEfficiency {
                        compound: Compound::Sunlight,
                        ..
                    })
                )
            })
            .unwrap();
        let chain = records(&miche, miche.back_traversal(sunlight));
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[3], PressureRecord::Root);
    }

    #[test]
    fn test_day_night_and_lawk() {
        let params = SimulationParameters::default();
        let constants = EnergyConstants::default();
        let world = WorldSettings {
            day_night_cycle_enabled: true,
            lawk_only: true,
            ..Default::default()
        };
        let miche = MicheBuilder::new(&params, &constants, &world)
            .build(&test_patch(0), &BTreeMap::new())
            .unwrap();

        let leaves = leaf_records(&miche);
        assert!(leaves.contains(&PressureRecord::SurviveNight {
            strength: SURVIVE_NIGHT_STRENGTH
        }));
        assert!(!leaves.iter().any(|r| matches!(
            r,
            PressureRecord::AutotrophEnergyEfficiency {
                compound: Compound::Temperature,
                ..
            }
        )));
    }

    #[test]
    fn test_chemosynthesis_and_predation_leaves() {
        let params = SimulationParameters::default();
        let constants = EnergyConstants::default();
        let world = WorldSettings::default();
        let mut patch = test_patch(0);
        patch.biome = patch.biome.with_compound(
            Compound::Hydrogensulfide,
            BiomeCompound {
                density: 0.2,
                amount: 10.0,
                ..Default::default()
            },
        );
        patch.species_in_patch.insert(SpeciesId(1), 500);
        patch.species_in_patch.insert(SpeciesId(2), 0);
        let species: BTreeMap<_, _> = [1, 2]
            .into_iter()
            .map(|id| (SpeciesId(id), Arc::new(simple_species(id, &["cytoplasm"]))))
            .collect();

        let miche = MicheBuilder::new(&params, &constants, &world)
            .build(&patch, &species)
            .unwrap();
        let leaves = leaf_records(&miche);
        assert!(leaves.contains(&PressureRecord::AutotrophEnergyEfficiency {
            compound: Compound::Hydrogensulfide,
            strength: AUTOTROPH_STRENGTH,
        }));
        let prey: Vec<_> = leaves
            .iter()
            .filter_map(|r| match r {
                PressureRecord::PredationEffectiveness { prey, .. } => Some(*prey),
                _ => None,
            })
            .collect();
        assert_eq!(prey, vec![SpeciesId(1)]);
    }

    #[test]
    fn test_unknown_prey_is_fatal() {
        let params = SimulationParameters::default();
        let constants = EnergyConstants::default();
        let world = WorldSettings::default();
        let mut patch = test_patch(0);
        patch.species_in_patch.insert(SpeciesId(9), 10);

        let result = MicheBuilder::new(&params, &constants, &world).build(&patch, &BTreeMap::new());
        assert!(matches!(result, Err(AutoEvoError::MissingSpecies(SpeciesId(9)))));
    }

    #[test]
    fn test_compound_missing_from_tables_is_fatal() {
        let mut params = SimulationParameters::default();
        params.compounds.remove(&Compound::Oxygen);
        let constants = EnergyConstants::default();
        let world = WorldSettings::default();

        let result =
            MicheBuilder::new(&params, &constants, &world).build(&test_patch(0), &BTreeMap::new());
        assert!(matches!(result, Err(AutoEvoError::Config(_))));
    }

    #[test]
    fn test_predator_avoidance_targets_occupying_hunters() {
        let params = SimulationParameters::default();
        let constants = EnergyConstants::default();
        let world = WorldSettings::default();
        let mut patch = test_patch(0);
        patch.species_in_patch.insert(SpeciesId(1), 500);

        let prey = Arc::new(simple_species(1, &["cytoplasm"]));
        let hunter = Arc::new(simple_species(2, &["cytoplasm", "pilus", "flagellum", "cytoplasm"]));
        let species: BTreeMap<_, _> = [(prey.id, prey.clone()), (hunter.id, hunter.clone())]
            .into_iter()
            .collect();

        let builder = MicheBuilder::new(&params, &constants, &world);
        let mut miche = builder.build(&patch, &species).unwrap();
        let mut cache = test_cache();
        miche.insert_species(prey.clone(), &patch, &mut cache);
        miche.insert_species(hunter.clone(), &patch, &mut cache);

        let predation_holder = miche.leaf_nodes().into_iter().find_map(|id| {
            let node = miche.node(id)?;
            match node.pressure().record()? {
                PressureRecord::PredationEffectiveness { .. } => node.occupant().cloned(),
                _ => None,
            }
        });
        let avoidance = builder.predator_avoidance(&miche, prey.id).unwrap();
        match predation_holder {
            Some(holder) if holder.id != prey.id => {
                assert_eq!(avoidance.len(), 1);
                assert_eq!(
                    avoidance[0].record(),
                    Some(PressureRecord::PredatorAvoidance {
                        predator: holder.id,
                        strength: AVOIDANCE_STRENGTH,
                    })
                );
            }
            _ => assert!(avoidance.is_empty()),
        }
    }
}
