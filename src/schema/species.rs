//! Species description: organelle layout, membrane, behaviour and tolerances.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::{ConfigError, MembraneKind, OrganelleId, SimulationParameters};

/// Upper bound of every behaviour value.
pub const MAX_BEHAVIOUR_VALUE: f32 = 400.0;

/// Stable species identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SpeciesId(pub u64);

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fresh species ids. Clones share the same counter.
#[derive(Debug, Clone)]
pub struct SpeciesIdAllocator {
    next: Arc<AtomicU64>,
}

impl SpeciesIdAllocator {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    pub fn allocate(&self) -> SpeciesId {
        SpeciesId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to [`allocate`](Self::allocate) returns.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Axial hex coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
}

impl Hex {
    pub const DIRECTIONS: [Hex; 6] = [
        Hex { q: 0, r: -1 },
        Hex { q: 1, r: -1 },
        Hex { q: 1, r: 0 },
        Hex { q: 0, r: 1 },
        Hex { q: -1, r: 1 },
        Hex { q: -1, r: 0 },
    ];

    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub fn offset(self, direction: usize, distance: i32) -> Hex {
        let d = Self::DIRECTIONS[direction % 6];
        Hex::new(self.q + d.q * distance, self.r + d.r * distance)
    }

    pub fn distance(self, other: Hex) -> i32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        (dq.abs() + dr.abs() + (dq + dr).abs()) / 2
    }
}

/// One placed organelle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganelleTemplate {
    pub organelle: OrganelleId,
    pub position: Hex,
    /// Rotation in sixths of a turn.
    #[serde(default)]
    pub orientation: u8,
}

impl OrganelleTemplate {
    pub fn new(organelle: impl Into<String>, position: Hex) -> Self {
        Self {
            organelle: OrganelleId::new(organelle),
            position,
            orientation: 0,
        }
    }

    /// Hexes covered when the organelle spans `size` hexes.
    pub fn covered_hexes(&self, size: u32) -> impl Iterator<Item = Hex> + '_ {
        (0..size.max(1) as i32).map(move |i| self.position.offset(self.orientation as usize, i))
    }
}

/// Behaviour axes that mutation can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviourAxis {
    Aggression,
    Opportunism,
    Fear,
    Activity,
    Focus,
}

impl BehaviourAxis {
    pub const ALL: [BehaviourAxis; 5] = [
        BehaviourAxis::Aggression,
        BehaviourAxis::Opportunism,
        BehaviourAxis::Fear,
        BehaviourAxis::Activity,
        BehaviourAxis::Focus,
    ];
}

/// AI behaviour sliders, each within `0..=MAX_BEHAVIOUR_VALUE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Behaviour {
    pub aggression: f32,
    pub opportunism: f32,
    pub fear: f32,
    pub activity: f32,
    pub focus: f32,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            aggression: 100.0,
            opportunism: 100.0,
            fear: 100.0,
            activity: 100.0,
            focus: 100.0,
        }
    }
}

impl Behaviour {
    pub fn get(&self, axis: BehaviourAxis) -> f32 {
        match axis {
            BehaviourAxis::Aggression => self.aggression,
            BehaviourAxis::Opportunism => self.opportunism,
            BehaviourAxis::Fear => self.fear,
            BehaviourAxis::Activity => self.activity,
            BehaviourAxis::Focus => self.focus,
        }
    }

    pub fn set(&mut self, axis: BehaviourAxis, value: f32) {
        let value = value.clamp(0.0, MAX_BEHAVIOUR_VALUE);
        match axis {
            BehaviourAxis::Aggression => self.aggression = value,
            BehaviourAxis::Opportunism => self.opportunism = value,
            BehaviourAxis::Fear => self.fear = value,
            BehaviourAxis::Activity => self.activity = value,
            BehaviourAxis::Focus => self.focus = value,
        }
    }
}

/// Environmental tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// Preferred temperature in degrees Celsius.
    pub preferred_temperature: f32,
    /// Distance from the preferred temperature that is still survivable.
    pub temperature_tolerance: f32,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            preferred_temperature: 15.0,
            temperature_tolerance: 21.0,
        }
    }
}

/// RGBA colour, components in 0.0-1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Colour {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Colour {
    fn default() -> Self {
        Self {
            r: 0.6,
            g: 0.8,
            b: 0.6,
            a: 1.0,
        }
    }
}

/// Stats recomputed by [`Species::on_edited`].
#[derive(Debug, Clone, Default)]
struct DerivedStats {
    hex_count: u32,
    has_nucleus: bool,
}

/// An organism description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub id: SpeciesId,
    pub genus: String,
    pub epithet: String,
    pub organelles: Vec<OrganelleTemplate>,
    pub membrane: MembraneKind,
    /// Membrane rigidity in -1.0..=1.0.
    #[serde(default)]
    pub membrane_rigidity: f32,
    #[serde(default)]
    pub behaviour: Behaviour,
    #[serde(default)]
    pub tolerances: Tolerances,
    #[serde(default)]
    pub colour: Colour,
    /// Controlled by the player; auto-evo never mutates it.
    #[serde(default)]
    pub player_species: bool,
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub parent: Option<SpeciesId>,
    #[serde(skip)]
    derived: DerivedStats,
}

impl Species {
    /// Create a species; call [`on_edited`](Self::on_edited) before use.
    pub fn new(
        id: SpeciesId,
        genus: impl Into<String>,
        epithet: impl Into<String>,
        organelles: Vec<OrganelleTemplate>,
        membrane: MembraneKind,
    ) -> Self {
        Self {
            id,
            genus: genus.into(),
            epithet: epithet.into(),
            organelles,
            membrane,
            membrane_rigidity: 0.0,
            behaviour: Behaviour::default(),
            tolerances: Tolerances::default(),
            colour: Colour::default(),
            player_species: false,
            generation: 1,
            parent: None,
            derived: DerivedStats::default(),
        }
    }

    /// Clone with a new identity. The clone is never a player species.
    pub fn clone_as(&self, id: SpeciesId) -> Species {
        let mut copy = self.clone();
        copy.id = id;
        copy.player_species = false;
        copy
    }

    /// Recompute derived stats after the layout or membrane changed.
    ///
    /// Unknown organelles contribute nothing; [`validate`](Self::validate)
    /// reports them.
    pub fn on_edited(&mut self, params: &SimulationParameters) {
        let mut hex_count = 0;
        let mut has_nucleus = false;
        for template in &self.organelles {
            if let Some(def) = params.organelles.get(&template.organelle) {
                hex_count += def.hexes;
                has_nucleus |= def.is_nucleus;
            }
        }
        self.derived = DerivedStats {
            hex_count,
            has_nucleus,
        };
    }

    /// Check that every organelle and the membrane exist in the tables.
    pub fn validate(&self, params: &SimulationParameters) -> Result<(), ConfigError> {
        for template in &self.organelles {
            params.organelle(&template.organelle)?;
        }
        params.membrane(self.membrane)?;
        Ok(())
    }

    pub fn hex_count(&self) -> u32 {
        self.derived.hex_count
    }

    pub fn has_nucleus(&self) -> bool {
        self.derived.has_nucleus
    }

    pub fn organelle_count(&self, organelle: &OrganelleId) -> usize {
        self.organelles
            .iter()
            .filter(|t| &t.organelle == organelle)
            .count()
    }

    /// Count of each organelle type.
    pub fn organelle_counts(&self) -> BTreeMap<&OrganelleId, usize> {
        let mut counts = BTreeMap::new();
        for template in &self.organelles {
            *counts.entry(&template.organelle).or_insert(0) += 1;
        }
        counts
    }

    /// Whether two species are biologically identical (ignores identity,
    /// naming and colour).
    pub fn same_traits(&self, other: &Species) -> bool {
        self.membrane == other.membrane
            && self.membrane_rigidity == other.membrane_rigidity
            && self.behaviour == other.behaviour
            && self.tolerances == other.tolerances
            && self.organelles == other.organelles
    }

    pub fn formatted_name(&self) -> String {
        format!("{} {}", self.genus, self.epithet)
    }
}

impl PartialEq for Species {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Species {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_species(id: u64) -> Species {
        let params = SimulationParameters::default();
        let mut species = Species::new(
            SpeciesId(id),
            "Primum",
            "thrivium",
            vec![
                OrganelleTemplate::new("cytoplasm", Hex::new(0, 0)),
                OrganelleTemplate::new("cytoplasm", Hex::new(1, 0)),
            ],
            MembraneKind::Single,
        );
        species.on_edited(&params);
        species
    }

    #[test]
    fn test_on_edited_recomputes_hexes() {
        let params = SimulationParameters::default();
        let mut species = test_species(1);
        assert_eq!(species.hex_count(), 2);
        assert!(!species.has_nucleus());

        species
            .organelles
            .push(OrganelleTemplate::new("nucleus", Hex::new(0, 3)));
        species.on_edited(&params);
        assert_eq!(species.hex_count(), 13);
        assert!(species.has_nucleus());
    }

    #[test]
    fn test_clone_as_keeps_traits() {
        let mut original = test_species(1);
        original.player_species = true;
        let copy = original.clone_as(SpeciesId(2));

        assert_ne!(copy, original);
        assert!(copy.same_traits(&original));
        assert!(!copy.player_species);
        assert_eq!(copy.hex_count(), original.hex_count());
    }

    #[test]
    fn test_behaviour_clamped() {
        let mut behaviour = Behaviour::default();
        behaviour.set(BehaviourAxis::Fear, 1000.0);
        assert_eq!(behaviour.get(BehaviourAxis::Fear), MAX_BEHAVIOUR_VALUE);
        behaviour.set(BehaviourAxis::Activity, -5.0);
        assert_eq!(behaviour.activity, 0.0);
    }

    #[test]
    fn test_validate_unknown_organelle() {
        let params = SimulationParameters::default();
        let mut species = test_species(1);
        species
            .organelles
            .push(OrganelleTemplate::new("ribosome", Hex::new(2, 0)));
        assert!(matches!(
            species.validate(&params),
            Err(ConfigError::MissingOrganelle(_))
        ));
    }

    #[test]
    fn test_allocator_shared_between_clones() {
        let ids = SpeciesIdAllocator::starting_at(10);
        let other = ids.clone();
        assert_eq!(ids.allocate(), SpeciesId(10));
        assert_eq!(other.allocate(), SpeciesId(11));
        assert_eq!(ids.peek(), 12);
    }

    #[test]
    fn test_hex_distance() {
        let origin = Hex::default();
        assert_eq!(origin.distance(origin.offset(2, 3)), 3);
        assert_eq!(Hex::new(1, -1).distance(Hex::new(-1, 1)), 2);
    }
}
