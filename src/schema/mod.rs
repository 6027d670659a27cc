//! Schema module - Configuration, world and result types for auto-evo runs.

mod config;
mod parameters;
mod patch;
mod results;
mod species;
mod world;

pub use config::*;
pub use parameters::*;
pub use patch::*;
pub use results::*;
pub use species::*;
pub use world::*;
