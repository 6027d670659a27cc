//! Organelle placement on the hex grid.

use std::collections::HashSet;

use crate::schema::{Hex, OrganelleId, OrganelleTemplate, SimulationParameters, Species};

use super::rng::EvoRng;

/// Rings searched around the anchor before giving up.
const MAX_RING: i32 = 12;

/// Places and removes organelles in a species layout.
///
/// Implementations do not call [`Species::on_edited`]; mutation operators do
/// that once after all their edits.
pub trait LayoutEngine: Send + Sync {
    /// Place one organelle. Returns false when no valid spot exists.
    fn place(
        &self,
        species: &mut Species,
        organelle: &OrganelleId,
        params: &SimulationParameters,
        rng: &mut EvoRng,
    ) -> bool;

    /// Remove the organelle at `index`. Returns false when the index is out
    /// of range or the species would be left empty.
    fn remove(&self, species: &mut Species, index: usize) -> bool;
}

/// Places each organelle on the first free hex of a spiral around a random
/// existing organelle.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexSpiralLayout;

impl HexSpiralLayout {
    fn occupied(species: &Species, params: &SimulationParameters) -> HashSet<Hex> {
        species
            .organelles
            .iter()
            .flat_map(|t| {
                let size = params
                    .organelles
                    .get(&t.organelle)
                    .map(|def| def.hexes)
                    .unwrap_or(1);
                t.covered_hexes(size).collect::<Vec<_>>()
            })
            .collect()
    }

    /// Hexes at exactly `radius` from `center`, in ring order.
    fn ring(center: Hex, radius: i32) -> Vec<Hex> {
        if radius == 0 {
            return vec![center];
        }
        let mut hexes = Vec::with_capacity(6 * radius as usize);
        let mut current = center.offset(4, radius);
        for direction in 0..6 {
            for _ in 0..radius {
                hexes.push(current);
                current = current.offset(direction, 1);
            }
        }
        hexes
    }
}

impl LayoutEngine for HexSpiralLayout {
    fn place(
        &self,
        species: &mut Species,
        organelle: &OrganelleId,
        params: &SimulationParameters,
        rng: &mut EvoRng,
    ) -> bool {
        let size = match params.organelles.get(organelle) {
            Some(def) => def.hexes,
            None => return false,
        };
        let occupied = Self::occupied(species, params);
        let anchor = rng
            .choose(&species.organelles)
            .map(|t| t.position)
            .unwrap_or_default();

        for radius in 0..=MAX_RING {
            for hex in Self::ring(anchor, radius) {
                for orientation in 0..6u8 {
                    let template = OrganelleTemplate {
                        organelle: organelle.clone(),
                        position: hex,
                        orientation,
                    };
                    if template.covered_hexes(size).all(|h| !occupied.contains(&h)) {
                        species.organelles.push(template);
                        return true;
                    }
                    if size <= 1 {
                        break;
                    }
                }
            }
        }
        false
    }

    fn remove(&self, species: &mut Species, index: usize) -> bool {
        if index >= species.organelles.len() || species.organelles.len() <= 1 {
            return false;
        }
        species.organelles.remove(index);
        true
    }
}
