//! Input file of the command line runner.

use serde::{Deserialize, Serialize};

use super::{
    AutoEvoConfig, BiomeCompound, BiomeConditions, Compound, Hex, MembraneKind,
    OrganelleTemplate, Patch, PatchId, PatchMap, SimulationParameters, Species, SpeciesId,
};

/// A world plus the configuration to evolve it with.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldFile {
    pub map: PatchMap,
    #[serde(default)]
    pub config: AutoEvoConfig,
    /// Static tables; the built-in tables are used when absent.
    #[serde(default)]
    pub params: Option<SimulationParameters>,
}

impl WorldFile {
    /// Two adjacent patches sharing one primordial species.
    pub fn example() -> Self {
        let mut map = PatchMap::default();
        let species = Species::new(
            SpeciesId(0),
            "Primum",
            "thrivium",
            vec![
                OrganelleTemplate::new("cytoplasm", Hex::new(0, 0)),
                OrganelleTemplate::new("cytoplasm", Hex::new(1, 0)),
            ],
            MembraneKind::Single,
        );
        let id = species.id;
        map.add_species(species);

        let surface = BiomeConditions {
            temperature: 22.0,
            ..Default::default()
        }
        .with_compound(Compound::Sunlight, ambient(0.9))
        .with_compound(Compound::Oxygen, ambient(0.2))
        .with_compound(Compound::Carbondioxide, ambient(0.08))
        .with_compound(Compound::Glucose, cloud(0.4, 30.0));

        let vents = BiomeConditions {
            temperature: 60.0,
            ..Default::default()
        }
        .with_compound(Compound::Carbondioxide, ambient(0.12))
        .with_compound(Compound::Hydrogensulfide, cloud(0.6, 50.0))
        .with_compound(Compound::Glucose, cloud(0.2, 20.0));

        let mut shallows = Patch::new(PatchId(0), "Epipelagic", surface);
        let mut vent = Patch::new(PatchId(1), "Hydrothermal Vent", vents);
        shallows.species_in_patch.insert(id, 1000);
        vent.species_in_patch.insert(id, 400);
        shallows.adjacent.insert(vent.id);
        vent.adjacent.insert(shallows.id);
        map.add_patch(shallows);
        map.add_patch(vent);

        Self {
            map,
            config: AutoEvoConfig::default(),
            params: None,
        }
    }
}

fn ambient(level: f32) -> BiomeCompound {
    BiomeCompound {
        ambient: level,
        ..Default::default()
    }
}

fn cloud(density: f32, amount: f32) -> BiomeCompound {
    BiomeCompound {
        density,
        amount,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_survives_json() {
        let world = WorldFile::example();
        let json = serde_json::to_string_pretty(&world).unwrap();
        let parsed: WorldFile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.map.patches.len(), 2);
        assert_eq!(parsed.map.next_species_id, 1);
        assert!(parsed.params.is_none());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let parsed: WorldFile = serde_json::from_str(r#"{"map": {"patches": {}, "species": {}}}"#).unwrap();
        assert_eq!(parsed.config.mutations_per_species, 3);
        assert_eq!(parsed.map.next_species_id, 0);
    }
}
