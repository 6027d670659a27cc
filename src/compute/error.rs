//! Error type of the auto-evo engine.

use std::io;

use crate::schema::{Compound, ConfigError, PatchId, SpeciesId};

/// Errors that abort run setup or persistence.
///
/// Search exhaustion is not an error; operators report it with `None` or an
/// empty candidate list.
#[derive(Debug, thiserror::Error)]
pub enum AutoEvoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Species {0} is not registered")]
    MissingSpecies(SpeciesId),
    #[error("{0} does not exist")]
    MissingPatch(PatchId),
    #[error("{patch} has no {compound} in its biome")]
    MissingBiomeCompound { patch: PatchId, compound: Compound },
    #[error("Unsupported {kind} record version {found} (expected {expected})")]
    UnsupportedVersion {
        kind: &'static str,
        found: u16,
        expected: u16,
    },
    #[error("Pressure {0} appears twice under the same parent")]
    DuplicatePressure(String),
    #[error("Pressure {0} cannot be persisted")]
    UnpersistablePressure(String),
    #[error("Miche node {0} does not exist")]
    MissingNode(usize),
    #[error("Run has not finished")]
    RunNotFinished,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
