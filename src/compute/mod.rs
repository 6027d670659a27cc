//! Compute module - Derived statistics, caching and the auto-evo engine.

mod biology;
mod cache;
mod error;
mod layout;
mod rng;

pub mod autoevo;

pub use biology::*;
pub use cache::*;
pub use error::*;
pub use layout::*;
pub use rng::*;
