//! Auto-evo - Generational evolution of microbial species across a patch map.
//!
//! Each patch of the world gets a tree of selection pressures (its "miche").
//! Species compete for the leaves of that tree, mutated variants of the
//! existing species are searched for ones that score better, and the winners
//! become new species with populations derived from the energy of the niches
//! they hold.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration, world and result types (all serde)
//! - `compute`: Derived statistics, the simulation cache and the engine
//!
//! # Example
//!
//! ```rust,no_run
//! use auto_evo::{
//!     compute::autoevo::AutoEvoRun,
//!     schema::{AutoEvoConfig, PatchMap, SimulationParameters},
//! };
//!
//! let json = std::fs::read_to_string("world.json")?;
//! let mut world: PatchMap = serde_json::from_str(&json)?;
//!
//! let mut run = AutoEvoRun::new(
//!     &world,
//!     AutoEvoConfig::default(),
//!     SimulationParameters::default(),
//! )?;
//! while run.tick()? {
//!     println!("{:.0}%", run.progress() * 100.0);
//! }
//! run.results()?.apply_to(&mut world)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::AutoEvoError;
pub use compute::autoevo::{AutoEvoRun, Miche, PatchEvolution, RunStep, SelectionPressure};
pub use schema::{AutoEvoConfig, PatchMap, RunResults, SimulationParameters, Species};
