//! Output types of an auto-evo run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{PatchId, Species, SpeciesId};

/// How a candidate relates to the species it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Targets a niche the parent does not hold; becomes an additional species.
    Split,
    /// Improves the parent within its own niche and takes its place there.
    Replacement,
}

/// A species created by the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSpeciesRecord {
    pub species: Species,
    pub parent: SpeciesId,
    pub kind: CandidateKind,
    /// Initial population in the patch it arose in.
    pub population: i64,
}

/// Energy a species receives from one pressure of the niche it occupies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyAttribution {
    pub species: SpeciesId,
    pub pressure: String,
    pub energy: f32,
}

/// Results for one patch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PatchResults {
    pub patch: PatchId,
    /// Final population of every species in the patch, new species included.
    pub populations: BTreeMap<SpeciesId, i64>,
    pub new_species: Vec<NewSpeciesRecord>,
    #[serde(default)]
    pub energy: Vec<EnergyAttribution>,
}

impl PatchResults {
    pub fn new(patch: PatchId) -> Self {
        Self {
            patch,
            ..Default::default()
        }
    }

    pub fn population(&self, species: SpeciesId) -> i64 {
        self.populations.get(&species).copied().unwrap_or(0)
    }
}

/// Accumulated results of a run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunResults {
    pub patches: BTreeMap<PatchId, PatchResults>,
}

impl RunResults {
    pub fn merge(&mut self, results: PatchResults) {
        self.patches.insert(results.patch, results);
    }

    pub fn patch(&self, patch: PatchId) -> Option<&PatchResults> {
        self.patches.get(&patch)
    }

    /// Every new species across all patches.
    pub fn new_species(&self) -> impl Iterator<Item = &NewSpeciesRecord> {
        self.patches.values().flat_map(|p| p.new_species.iter())
    }

    /// Human readable summary.
    pub fn summary(&self, species_names: &BTreeMap<SpeciesId, String>) -> String {
        let mut out = String::new();
        for results in self.patches.values() {
            out.push_str(&format!("{}:\n", results.patch));
            for (id, population) in &results.populations {
                let name = species_names
                    .get(id)
                    .cloned()
                    .or_else(|| {
                        results
                            .new_species
                            .iter()
                            .find(|r| r.species.id == *id)
                            .map(|r| r.species.formatted_name())
                    })
                    .unwrap_or_else(|| id.to_string());
                out.push_str(&format!("  {name}: {population}\n"));
            }
            for record in &results.new_species {
                out.push_str(&format!(
                    "  new {:?} {} from {} (population {})\n",
                    record.kind,
                    record.species.formatted_name(),
                    record.parent,
                    record.population
                ));
            }
        }
        out
    }
}
