//! Auto-evo - Niche trees, mutation search and the per-patch evolution steps.
//!
//! A run builds one [`PatchEvolution`] per patch. Each step searches mutated
//! variants of the species living in its patch, lets them compete for the
//! leaves of the patch's [`Miche`] and turns the winners into new species.
//! [`AutoEvoRun`] ticks the steps, in parallel where they allow it, and
//! collects their [`RunResults`](crate::schema::RunResults).
//!
//! # Example
//!
//! ```rust,no_run
//! use auto_evo::compute::autoevo::AutoEvoRun;
//! use auto_evo::schema::{AutoEvoConfig, PatchMap, SimulationParameters};
//!
//! let mut world = PatchMap::default();
//! let mut run = AutoEvoRun::new(
//!     &world,
//!     AutoEvoConfig::default(),
//!     SimulationParameters::default(),
//! )?;
//! let results = run.run_to_completion()?.clone();
//! results.apply_to(&mut world)?;
//! # Ok::<(), auto_evo::compute::AutoEvoError>(())
//! ```

pub mod miche;
pub mod miche_builder;
pub mod mutation;
pub mod naming;
pub mod operators;
pub mod population;
pub mod pressure;
pub mod pressures;
pub mod run;
pub mod search;
pub mod steps;

#[cfg(test)]
pub(crate) mod testing;

pub use miche::{LeafNodes, Miche, MicheNode, MicheNodeRecord, MicheSnapshot, NodeId};
pub use miche_builder::MicheBuilder;
pub use mutation::{Mutant, MutationContext, MutationKey, MutationOperator};
pub use population::{Allocation, PopulationAllocator, individual_cost, population_for};
pub use pressure::{
    PRESSURE_RECORD_VERSION, PressureEnvelope, PressureKey, SelectionPressure,
    weighted_compared_scores,
};
pub use pressures::{PressureBuildContext, PressureRecord};
pub use run::{AutoEvoRun, RUN_SNAPSHOT_VERSION, RunSnapshot};
pub use search::{MutationSearch, SearchLimits, SearchStats};
pub use steps::{
    Candidate, EvolutionInputs, PATCH_EVOLUTION_VERSION, PatchEvolution, PatchEvolutionSnapshot,
    RunStep, StepPhase,
};
