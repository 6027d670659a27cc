//! Static simulation tables: compounds, bio processes, organelles and membranes.
//!
//! These are the read-only definitions every selection pressure and mutation
//! operator is validated against. A pressure that refers to an entry missing
//! from these tables is a configuration error and aborts run setup.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Chemical compounds and environmental quantities known to the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compound {
    Atp,
    Glucose,
    Ammonia,
    Phosphates,
    Hydrogensulfide,
    Iron,
    Oxygen,
    Carbondioxide,
    Nitrogen,
    Sunlight,
    Temperature,
}

impl Compound {
    /// Every compound, in a stable order.
    pub const ALL: [Compound; 11] = [
        Compound::Atp,
        Compound::Glucose,
        Compound::Ammonia,
        Compound::Phosphates,
        Compound::Hydrogensulfide,
        Compound::Iron,
        Compound::Oxygen,
        Compound::Carbondioxide,
        Compound::Nitrogen,
        Compound::Sunlight,
        Compound::Temperature,
    ];

    /// Stable small integer used in cache and pressure keys.
    pub fn index(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compound::Atp => "ATP",
            Compound::Glucose => "glucose",
            Compound::Ammonia => "ammonia",
            Compound::Phosphates => "phosphates",
            Compound::Hydrogensulfide => "hydrogen sulfide",
            Compound::Iron => "iron",
            Compound::Oxygen => "oxygen",
            Compound::Carbondioxide => "carbon dioxide",
            Compound::Nitrogen => "nitrogen",
            Compound::Sunlight => "sunlight",
            Compound::Temperature => "temperature",
        };
        f.write_str(name)
    }
}

/// Identifier of an organelle type in [`SimulationParameters::organelles`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganelleId(pub String);

impl OrganelleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganelleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a bio process in [`SimulationParameters::processes`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Membrane types a species can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembraneKind {
    Single,
    Double,
    Cellulose,
    Chitin,
    CalciumCarbonate,
    Silica,
}

impl MembraneKind {
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Static description of a compound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundDefinition {
    /// Exists as clouds that cells collect by moving.
    #[serde(default)]
    pub cloud: bool,
    /// Ambient environmental quantity (light, gases, temperature).
    #[serde(default)]
    pub environmental: bool,
    /// Ambient value changes between day and night.
    #[serde(default)]
    pub varies_day_night: bool,
}

/// A chemical process run by organelles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BioProcess {
    pub inputs: BTreeMap<Compound, f32>,
    pub outputs: BTreeMap<Compound, f32>,
}

/// Static description of an organelle type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganelleDefinition {
    /// Mutation points needed to add one.
    pub mp_cost: f32,
    /// Number of hexes occupied.
    pub hexes: u32,
    /// Processes run by this organelle and their rates.
    #[serde(default)]
    pub processes: BTreeMap<ProcessId, f32>,
    /// Compound storage capacity contributed.
    #[serde(default)]
    pub storage: f32,
    /// Movement force contributed (flagella).
    #[serde(default)]
    pub movement_force: f32,
    #[serde(default)]
    pub pilus: bool,
    /// Toxin production strength.
    #[serde(default)]
    pub toxin: f32,
    /// Allowed in "life as we know it" mode.
    #[serde(default = "default_true")]
    pub lawk: bool,
    #[serde(default)]
    pub requires_nucleus: bool,
    /// At most one per species.
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub is_nucleus: bool,
}

/// Static description of a membrane type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembraneDefinition {
    pub mp_cost: f32,
    pub movement_factor: f32,
    pub osmoregulation_factor: f32,
    #[serde(default = "default_true")]
    pub can_engulf: bool,
    #[serde(default = "default_true")]
    pub lawk: bool,
    #[serde(default)]
    pub requires_nucleus: bool,
}

fn default_true() -> bool {
    true
}

/// All static tables used by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub compounds: BTreeMap<Compound, CompoundDefinition>,
    pub processes: BTreeMap<ProcessId, BioProcess>,
    pub organelles: BTreeMap<OrganelleId, OrganelleDefinition>,
    pub membranes: BTreeMap<MembraneKind, MembraneDefinition>,
}

impl SimulationParameters {
    pub fn compound(&self, compound: Compound) -> Result<&CompoundDefinition, ConfigError> {
        self.compounds
            .get(&compound)
            .ok_or(ConfigError::MissingCompound(compound))
    }

    pub fn process(&self, id: &ProcessId) -> Result<&BioProcess, ConfigError> {
        self.processes
            .get(id)
            .ok_or_else(|| ConfigError::MissingProcess(id.clone()))
    }

    pub fn organelle(&self, id: &OrganelleId) -> Result<&OrganelleDefinition, ConfigError> {
        self.organelles
            .get(id)
            .ok_or_else(|| ConfigError::MissingOrganelle(id.clone()))
    }

    pub fn membrane(&self, kind: MembraneKind) -> Result<&MembraneDefinition, ConfigError> {
        self.membranes
            .get(&kind)
            .ok_or(ConfigError::MissingMembrane(kind))
    }

    /// Organelles running a process that consumes `compound`.
    pub fn organelles_using(&self, compound: Compound) -> Vec<OrganelleId> {
        self.organelles_matching(|process| process.inputs.contains_key(&compound))
    }

    /// Organelles running a process that produces `compound`.
    pub fn organelles_producing(&self, compound: Compound) -> Vec<OrganelleId> {
        self.organelles_matching(|process| process.outputs.contains_key(&compound))
    }

    fn organelles_matching(&self, predicate: impl Fn(&BioProcess) -> bool) -> Vec<OrganelleId> {
        self.organelles
            .iter()
            .filter(|(_, def)| {
                def.processes
                    .keys()
                    .filter_map(|id| self.processes.get(id))
                    .any(&predicate)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Check internal references (organelle processes exist, every compound
    /// used by a process is defined).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for def in self.organelles.values() {
            for process in def.processes.keys() {
                self.process(process)?;
            }
        }
        for process in self.processes.values() {
            for compound in process.inputs.keys().chain(process.outputs.keys()) {
                self.compound(*compound)?;
            }
        }
        Ok(())
    }
}

fn process(inputs: &[(Compound, f32)], outputs: &[(Compound, f32)]) -> BioProcess {
    BioProcess {
        inputs: inputs.iter().copied().collect(),
        outputs: outputs.iter().copied().collect(),
    }
}

fn organelle(mp_cost: f32, hexes: u32) -> OrganelleDefinition {
    OrganelleDefinition {
        mp_cost,
        hexes,
        processes: BTreeMap::new(),
        storage: 0.0,
        movement_force: 0.0,
        pilus: false,
        toxin: 0.0,
        lawk: true,
        requires_nucleus: false,
        unique: false,
        is_nucleus: false,
    }
}

fn with_process(mut def: OrganelleDefinition, id: &str, rate: f32) -> OrganelleDefinition {
    def.processes.insert(ProcessId::new(id), rate);
    def
}

impl Default for SimulationParameters {
    fn default() -> Self {
        use Compound::*;

        let mut compounds = BTreeMap::new();
        for compound in Compound::ALL {
            let cloud = matches!(
                compound,
                Glucose | Ammonia | Phosphates | Hydrogensulfide | Iron
            );
            let environmental = matches!(
                compound,
                Oxygen | Carbondioxide | Nitrogen | Sunlight | Temperature
            );
            compounds.insert(
                compound,
                CompoundDefinition {
                    cloud,
                    environmental,
                    varies_day_night: compound == Sunlight,
                },
            );
        }

        let mut processes = BTreeMap::new();
        processes.insert(
            ProcessId::new("glycolysis"),
            process(&[(Glucose, 1.0)], &[(Atp, 2.0)]),
        );
        processes.insert(
            ProcessId::new("aerobic_respiration"),
            process(&[(Glucose, 1.0), (Oxygen, 1.0)], &[(Atp, 34.0)]),
        );
        processes.insert(
            ProcessId::new("photosynthesis"),
            process(&[(Carbondioxide, 0.1), (Sunlight, 1.0)], &[(Glucose, 1.0)]),
        );
        processes.insert(
            ProcessId::new("chemosynthesis"),
            process(
                &[(Hydrogensulfide, 1.0), (Carbondioxide, 0.1)],
                &[(Glucose, 1.0)],
            ),
        );
        processes.insert(
            ProcessId::new("iron_chemolithoautotrophy"),
            process(&[(Iron, 1.0)], &[(Atp, 10.0)]),
        );
        processes.insert(
            ProcessId::new("nitrogen_fixation"),
            process(&[(Atp, 1.0), (Nitrogen, 1.0)], &[(Ammonia, 0.5)]),
        );
        processes.insert(
            ProcessId::new("thermosynthesis"),
            process(&[(Temperature, 1.0)], &[(Atp, 6.0)]),
        );

        let mut organelles = BTreeMap::new();
        let mut insert = |id: &str, def: OrganelleDefinition| {
            organelles.insert(OrganelleId::new(id), def);
        };

        let mut cytoplasm = with_process(organelle(22.0, 1), "glycolysis", 1.0);
        cytoplasm.storage = 4.0;
        insert("cytoplasm", cytoplasm);
        insert(
            "metabolosomes",
            with_process(organelle(45.0, 1), "aerobic_respiration", 0.4),
        );
        insert(
            "chromatophore",
            with_process(organelle(55.0, 1), "photosynthesis", 0.3),
        );
        insert(
            "chemosynthesizing_proteins",
            with_process(organelle(45.0, 1), "chemosynthesis", 0.3),
        );
        insert(
            "rusticyanin",
            with_process(organelle(45.0, 1), "iron_chemolithoautotrophy", 0.5),
        );
        insert(
            "nitrogenase",
            with_process(organelle(50.0, 1), "nitrogen_fixation", 1.0),
        );

        let mut flagellum = organelle(55.0, 1);
        flagellum.movement_force = 0.7;
        insert("flagellum", flagellum);

        let mut pilus = organelle(30.0, 1);
        pilus.pilus = true;
        insert("pilus", pilus);

        let mut oxytoxy = organelle(55.0, 1);
        oxytoxy.toxin = 1.0;
        insert("oxytoxy_proteins", oxytoxy);

        let mut nucleus = organelle(70.0, 11);
        nucleus.storage = 10.0;
        nucleus.unique = true;
        nucleus.is_nucleus = true;
        insert("nucleus", nucleus);

        let mut mitochondrion = with_process(organelle(45.0, 2), "aerobic_respiration", 1.0);
        mitochondrion.requires_nucleus = true;
        insert("mitochondrion", mitochondrion);

        let mut chloroplast = with_process(organelle(55.0, 3), "photosynthesis", 1.0);
        chloroplast.requires_nucleus = true;
        insert("chloroplast", chloroplast);

        let mut chemoplast = with_process(organelle(52.0, 2), "chemosynthesis", 1.0);
        chemoplast.requires_nucleus = true;
        insert("chemoplast", chemoplast);

        let mut thermoplast = with_process(organelle(40.0, 2), "thermosynthesis", 1.0);
        thermoplast.requires_nucleus = true;
        thermoplast.lawk = false;
        insert("thermoplast", thermoplast);

        let mut vacuole = organelle(50.0, 1);
        vacuole.storage = 12.0;
        vacuole.requires_nucleus = true;
        insert("vacuole", vacuole);

        let mut toxin_vacuole = organelle(70.0, 1);
        toxin_vacuole.toxin = 3.0;
        toxin_vacuole.requires_nucleus = true;
        insert("toxin_vacuole", toxin_vacuole);

        let membrane = |mp_cost, movement_factor, osmoregulation_factor, can_engulf, nucleus| {
            MembraneDefinition {
                mp_cost,
                movement_factor,
                osmoregulation_factor,
                can_engulf,
                lawk: true,
                requires_nucleus: nucleus,
            }
        };
        let mut membranes = BTreeMap::new();
        membranes.insert(MembraneKind::Single, membrane(0.0, 1.0, 1.0, true, false));
        membranes.insert(MembraneKind::Double, membrane(50.0, 0.9, 0.85, true, false));
        membranes.insert(MembraneKind::Cellulose, membrane(55.0, 0.7, 0.8, false, true));
        membranes.insert(MembraneKind::Chitin, membrane(55.0, 0.75, 0.75, false, true));
        membranes.insert(
            MembraneKind::CalciumCarbonate,
            membrane(60.0, 0.6, 0.7, false, true),
        );
        membranes.insert(MembraneKind::Silica, membrane(70.0, 0.55, 0.6, false, true));

        Self {
            compounds,
            processes,
            organelles,
            membranes,
        }
    }
}
