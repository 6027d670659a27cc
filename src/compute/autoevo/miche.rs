//! Niche tree with competitive allocation of species to leaves.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`], so a deep
//! copy is a plain `clone()` that shares species and pressures through
//! `Arc`s but never the occupancy state.
//!
//! # Allocation
//!
//! Every species ever inserted is remembered together with its score at
//! each node. A species *reaches* a node when it scores above zero there and
//! at every ancestor. Its *chain score* at a leaf is the strength-weighted
//! sum of its scores along the back-traversal.
//!
//! - An internal node is occupied by the highest scoring species that
//!   reaches it.
//! - Leaves are assigned by species-proposing deferred acceptance: each
//!   species prefers the leaves it reaches by descending chain score, each
//!   leaf prefers species by descending chain score. A displaced occupant
//!   moves on to its next preferred leaf.
//!
//! Ties are broken by the lower species id, then the lower node id. The
//! result therefore depends only on the set of species inserted, never on
//! the insertion order, and every species holds at most one leaf.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::biology::biome_provides;
use crate::compute::cache::SimulationCache;
use crate::compute::error::AutoEvoError;
use crate::schema::{Patch, Species, SpeciesId};

use super::pressure::{PressureEnvelope, SelectionPressure};
use super::pressures::PressureBuildContext;

/// Index of a node in its [`Miche`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// One niche.
#[derive(Debug, Clone)]
pub struct MicheNode {
    pressure: Arc<dyn SelectionPressure>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    occupant: Option<Arc<Species>>,
}

impl MicheNode {
    pub fn pressure(&self) -> &Arc<dyn SelectionPressure> {
        &self.pressure
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn occupant(&self) -> Option<&Arc<Species>> {
        self.occupant.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Leaves split by whether they have an occupant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafNodes {
    pub occupied: Vec<NodeId>,
    pub unoccupied: Vec<NodeId>,
}

impl LeafNodes {
    pub fn all(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.occupied.iter().chain(self.unoccupied.iter()).copied()
    }
}

/// Persisted form of a [`Miche`]: the tree shape, its pressures and the
/// species inserted so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicheSnapshot {
    pub nodes: Vec<MicheNodeRecord>,
    pub attempted: Vec<SpeciesId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicheNodeRecord {
    pub parent: Option<NodeId>,
    pub pressure: PressureEnvelope,
}

/// Per-species view of the tree computed during reallocation.
struct Standing {
    reaches: Vec<bool>,
    chain: Vec<f32>,
}

/// Niche tree of one patch.
#[derive(Debug, Clone)]
pub struct Miche {
    nodes: Vec<MicheNode>,
    attempted: BTreeMap<SpeciesId, Arc<Species>>,
    /// Score of each attempted species at every node, indexed by node.
    scores: BTreeMap<SpeciesId, Vec<f32>>,
}

impl Miche {
    /// Create a tree consisting of a root node.
    pub fn new(root: Arc<dyn SelectionPressure>) -> Self {
        Self {
            nodes: vec![MicheNode {
                pressure: root,
                parent: None,
                children: Vec::new(),
                occupant: None,
            }],
            attempted: BTreeMap::new(),
            scores: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Attach a pressure below `parent`. The tree must be complete before the
    /// first species is inserted.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        pressure: Arc<dyn SelectionPressure>,
    ) -> Result<NodeId, AutoEvoError> {
        let parent_node = self
            .nodes
            .get(parent.0)
            .ok_or(AutoEvoError::MissingNode(parent.0))?;
        let key = pressure.key();
        if parent_node
            .children
            .iter()
            .any(|child| self.nodes[child.0].pressure.key() == key)
        {
            return Err(AutoEvoError::DuplicatePressure(pressure.name()));
        }
        if !self.attempted.is_empty() {
            log::error!(
                "Pressure {} added after {} species were inserted",
                pressure.name(),
                self.attempted.len()
            );
            debug_assert!(false, "miche changed after insertion");
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(MicheNode {
            pressure,
            parent: Some(parent),
            children: Vec::new(),
            occupant: None,
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&MicheNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every species inserted so far, occupying or not.
    pub fn attempted(&self) -> impl Iterator<Item = &Arc<Species>> {
        self.attempted.values()
    }

    /// Insert a species and reallocate the tree.
    ///
    /// Returns whether the species occupies any node afterwards. Inserting a
    /// species that was already inserted changes nothing.
    pub fn insert_species(
        &mut self,
        species: Arc<Species>,
        patch: &Patch,
        cache: &mut SimulationCache,
    ) -> bool {
        let id = species.id;
        if self.attempted.contains_key(&id) {
            log::trace!("{} already competed in {}", id, patch.id);
            return self.occupies_any(id);
        }

        let scores = self
            .nodes
            .iter()
            .map(|node| cache.get_pressure_score(node.pressure.as_ref(), patch, &species))
            .collect();
        self.scores.insert(id, scores);
        self.attempted.insert(id, species);
        self.reallocate();

        let occupies = self.occupies_any(id);
        log::trace!(
            "{} inserted in {}: {}",
            id,
            patch.id,
            match self.leaf_of(id) {
                Some(leaf) => format!("holds leaf {}", leaf.0),
                None if occupies => "holds internal nodes only".to_string(),
                None => "holds nothing".to_string(),
            }
        );
        occupies
    }

    fn standing(&self, scores: &[f32]) -> Standing {
        let mut reaches = vec![false; self.nodes.len()];
        let mut chain = vec![0.0; self.nodes.len()];
        // Parents always precede their children in the arena.
        for (index, node) in self.nodes.iter().enumerate() {
            let score = scores.get(index).copied().unwrap_or(0.0);
            let (parent_reaches, parent_chain) = match node.parent {
                Some(parent) => (reaches[parent.0], chain[parent.0]),
                None => (true, 0.0),
            };
            reaches[index] = parent_reaches && score > 0.0;
            chain[index] = parent_chain + score * node.pressure.strength();
        }
        Standing { reaches, chain }
    }

    fn reallocate(&mut self) {
        let ids: Vec<SpeciesId> = self.attempted.keys().copied().collect();
        let standings: Vec<Standing> = ids
            .iter()
            .map(|id| self.standing(self.scores.get(id).map(Vec::as_slice).unwrap_or(&[])))
            .collect();

        for node in &mut self.nodes {
            node.occupant = None;
        }

        // Internal nodes: best single score among species reaching the node.
        for index in 0..self.nodes.len() {
            if self.nodes[index].is_leaf() {
                continue;
            }
            let mut best: Option<(usize, f32)> = None;
            for (s, standing) in standings.iter().enumerate() {
                if !standing.reaches[index] {
                    continue;
                }
                let score = self.scores[&ids[s]][index];
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((s, score));
                }
            }
            self.nodes[index].occupant = best.map(|(s, _)| self.attempted[&ids[s]].clone());
        }

        // Leaves: deferred acceptance on chain scores.
        let leaves: Vec<usize> = (0..self.nodes.len())
            .filter(|i| self.nodes[*i].is_leaf())
            .collect();
        let preferences: Vec<Vec<usize>> = standings
            .iter()
            .map(|standing| {
                let mut reachable: Vec<usize> = leaves
                    .iter()
                    .copied()
                    .filter(|leaf| standing.reaches[*leaf])
                    .collect();
                reachable.sort_by(|a, b| {
                    standing.chain[*b]
                        .total_cmp(&standing.chain[*a])
                        .then(a.cmp(b))
                });
                reachable
            })
            .collect();

        let mut holder: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut next = vec![0usize; ids.len()];
        let mut free: VecDeque<usize> = (0..ids.len()).collect();
        while let Some(s) = free.pop_front() {
            let Some(&leaf) = preferences[s].get(next[s]) else {
                continue;
            };
            next[s] += 1;
            match holder[leaf] {
                None => holder[leaf] = Some(s),
                Some(incumbent) => {
                    let challenger = standings[s].chain[leaf];
                    let defender = standings[incumbent].chain[leaf];
                    // `ids` is sorted, so a lower index is the lower id.
                    if challenger > defender || (challenger == defender && s < incumbent) {
                        holder[leaf] = Some(s);
                        free.push_back(incumbent);
                    } else {
                        free.push_back(s);
                    }
                }
            }
        }

        for leaf in leaves {
            self.nodes[leaf].occupant = holder[leaf].map(|s| self.attempted[&ids[s]].clone());
        }
    }

    /// Path from `node` up to the root, `node` first.
    pub fn back_traversal(&self, node: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(node.0).map(|_| node);
        while let Some(id) = current {
            path.push(id);
            current = self.nodes[id.0].parent;
        }
        path
    }

    /// Every leaf, in node order.
    pub fn leaf_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_leaf())
            .map(|(index, _)| NodeId(index))
            .collect()
    }

    /// Leaves matching `predicate`, split by occupancy.
    pub fn leaf_nodes_where(&self, predicate: impl Fn(&MicheNode) -> bool) -> LeafNodes {
        let mut leaves = LeafNodes::default();
        for id in self.leaf_nodes() {
            let node = &self.nodes[id.0];
            if !predicate(node) {
                continue;
            }
            if node.occupant.is_some() {
                leaves.occupied.push(id);
            } else {
                leaves.unoccupied.push(id);
            }
        }
        leaves
    }

    /// The leaf held by a species.
    pub fn leaf_of(&self, species: SpeciesId) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.is_leaf() && node.occupant.as_ref().is_some_and(|o| o.id == species))
            .map(NodeId)
    }

    pub fn occupies_any(&self, species: SpeciesId) -> bool {
        self.nodes
            .iter()
            .any(|node| node.occupant.as_ref().is_some_and(|o| o.id == species))
    }

    /// Distinct species occupying any node, in id order.
    pub fn all_occupants(&self) -> Vec<Arc<Species>> {
        let mut occupants = BTreeMap::new();
        for node in &self.nodes {
            if let Some(occupant) = &node.occupant {
                occupants.entry(occupant.id).or_insert_with(|| occupant.clone());
            }
        }
        occupants.into_values().collect()
    }

    /// Add the ids of every occupant to `set`.
    pub fn get_occupants(&self, set: &mut BTreeSet<SpeciesId>) {
        set.extend(self.nodes.iter().filter_map(|n| n.occupant.as_ref().map(|o| o.id)));
    }

    /// Species holding a leaf, in id order.
    pub fn leaf_occupants(&self) -> Vec<Arc<Species>> {
        let mut occupants: Vec<_> = self
            .nodes
            .iter()
            .filter(|node| node.is_leaf())
            .filter_map(|node| node.occupant.clone())
            .collect();
        occupants.sort_by_key(|s| s.id);
        occupants
    }

    pub fn snapshot(&self) -> Result<MicheSnapshot, AutoEvoError> {
        let nodes = self
            .nodes
            .iter()
            .map(|node| {
                Ok(MicheNodeRecord {
                    parent: node.parent,
                    pressure: PressureEnvelope::save(node.pressure.as_ref())?,
                })
            })
            .collect::<Result<Vec<_>, AutoEvoError>>()?;
        Ok(MicheSnapshot {
            nodes,
            attempted: self.attempted.keys().copied().collect(),
        })
    }

    /// Rebuild a tree from a snapshot and re-insert its species.
    pub fn restore(
        snapshot: &MicheSnapshot,
        ctx: &PressureBuildContext<'_>,
        species: &BTreeMap<SpeciesId, Arc<Species>>,
        patch: &Patch,
        cache: &mut SimulationCache,
    ) -> Result<Self, AutoEvoError> {
        let mut records = snapshot.nodes.iter();
        let root = records.next().ok_or(AutoEvoError::MissingNode(0))?;
        let mut miche = Miche::new(Self::load_pressure(root, ctx, patch)?);

        for (index, record) in records.enumerate() {
            let parent = match record.parent {
                Some(parent) if parent.0 <= index => parent,
                Some(parent) => return Err(AutoEvoError::MissingNode(parent.0)),
                None => return Err(AutoEvoError::MissingNode(index + 1)),
            };
            miche.add_child(parent, Self::load_pressure(record, ctx, patch)?)?;
        }

        for id in &snapshot.attempted {
            let species = species
                .get(id)
                .cloned()
                .ok_or(AutoEvoError::MissingSpecies(*id))?;
            miche.insert_species(species, patch, cache);
        }
        Ok(miche)
    }

    fn load_pressure(
        record: &MicheNodeRecord,
        ctx: &PressureBuildContext<'_>,
        patch: &Patch,
    ) -> Result<Arc<dyn SelectionPressure>, AutoEvoError> {
        if let Some(compound) = record.pressure.pressure.biome_compound() {
            if !biome_provides(&patch.biome, compound) {
                return Err(AutoEvoError::MissingBiomeCompound {
                    patch: patch.id,
                    compound,
                });
            }
        }
        record.pressure.load(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::autoevo::pressures::{
        MetabolicStabilityPressure, PressureRecord, RootPressure, TemperatureTolerancePressure,
    };
    use crate::compute::autoevo::testing::{FixedPressure, simple_species, test_cache, test_patch};
    use crate::schema::{EnergyConstants, SimulationParameters};
    use proptest::prelude::*;

    fn species(id: u64) -> Arc<Species> {
        Arc::new(simple_species(id, &["cytoplasm"]))
    }

    fn single_leaf(pressure: FixedPressure) -> (Miche, NodeId) {
        let mut miche = Miche::new(Arc::new(RootPressure::new()));
        let leaf = miche.add_child(miche.root(), Arc::new(pressure)).unwrap();
        (miche, leaf)
    }

    #[test]
    fn test_better_species_takes_leaf() {
        let pressure = FixedPressure::new("p", 1.0, 100.0)
            .with_score(1, 5.0)
            .with_score(2, 8.0);
        let (mut miche, leaf) = single_leaf(pressure);
        let patch = test_patch(0);
        let mut cache = test_cache();

        assert!(miche.insert_species(species(1), &patch, &mut cache));
        assert_eq!(miche.node(leaf).unwrap().occupant().unwrap().id, SpeciesId(1));

        assert!(miche.insert_species(species(2), &patch, &mut cache));
        assert_eq!(miche.node(leaf).unwrap().occupant().unwrap().id, SpeciesId(2));
        assert_eq!(miche.leaf_of(SpeciesId(1)), None);
    }

    #[test]
    fn test_weaker_later_species_does_not_displace() {
        let pressure = FixedPressure::new("p", 1.0, 100.0)
            .with_score(1, 5.0)
            .with_score(2, 8.0);
        let (mut miche, leaf) = single_leaf(pressure);
        let patch = test_patch(0);
        let mut cache = test_cache();

        miche.insert_species(species(2), &patch, &mut cache);
        miche.insert_species(species(1), &patch, &mut cache);
        assert_eq!(miche.node(leaf).unwrap().occupant().unwrap().id, SpeciesId(2));
    }

    #[test]
    fn test_insert_is_idempotent() {
        let pressure = FixedPressure::new("p", 1.0, 100.0).with_score(1, 5.0);
        let (mut miche, leaf) = single_leaf(pressure);
        let patch = test_patch(0);
        let mut cache = test_cache();

        let first = miche.insert_species(species(1), &patch, &mut cache);
        let occupants = miche.all_occupants();
        let second = miche.insert_species(species(1), &patch, &mut cache);
        assert_eq!(first, second);
        assert_eq!(miche.all_occupants(), occupants);
        assert_eq!(miche.leaf_of(SpeciesId(1)), Some(leaf));
    }

    #[test]
    fn test_displaced_species_moves_to_next_leaf() {
        let mut miche = Miche::new(Arc::new(RootPressure::new()));
        let a = miche
            .add_child(
                miche.root(),
                Arc::new(FixedPressure::new("a", 1.0, 10.0).with_score(1, 5.0).with_score(2, 8.0)),
            )
            .unwrap();
        let b = miche
            .add_child(
                miche.root(),
                Arc::new(FixedPressure::new("b", 1.0, 10.0).with_score(1, 4.0).with_score(2, 1.0)),
            )
            .unwrap();
        let patch = test_patch(0);
        let mut cache = test_cache();

        miche.insert_species(species(1), &patch, &mut cache);
        assert_eq!(miche.leaf_of(SpeciesId(1)), Some(a));

        miche.insert_species(species(2), &patch, &mut cache);
        assert_eq!(miche.leaf_of(SpeciesId(2)), Some(a));
        assert_eq!(miche.leaf_of(SpeciesId(1)), Some(b));
    }

    #[test]
    fn test_species_holds_single_leaf() {
        let mut miche = Miche::new(Arc::new(RootPressure::new()));
        for name in ["a", "b", "c"] {
            miche
                .add_child(miche.root(), Arc::new(FixedPressure::new(name, 1.0, 1.0).with_score(1, 3.0)))
                .unwrap();
        }
        let patch = test_patch(0);
        let mut cache = test_cache();
        miche.insert_species(species(1), &patch, &mut cache);

        let leaves = miche.leaf_nodes_where(|_| true);
        assert_eq!(leaves.occupied.len(), 1);
        assert_eq!(leaves.unoccupied.len(), 2);
    }

    #[test]
    fn test_failed_ancestor_blocks_descendants() {
        let mut miche = Miche::new(Arc::new(RootPressure::new()));
        let gate = miche
            .add_child(miche.root(), Arc::new(FixedPressure::new("gate", 1.0, 0.0).with_score(1, 0.0)))
            .unwrap();
        let leaf = miche
            .add_child(gate, Arc::new(FixedPressure::new("leaf", 1.0, 1.0).with_score(1, 9.0)))
            .unwrap();
        let patch = test_patch(0);
        let mut cache = test_cache();

        // Still holds the root.
        assert!(miche.insert_species(species(1), &patch, &mut cache));
        assert!(miche.node(leaf).unwrap().occupant().is_none());
        assert!(miche.node(gate).unwrap().occupant().is_none());
        assert_eq!(miche.leaf_of(SpeciesId(1)), None);
    }

    #[test]
    fn test_back_traversal_leaf_first() {
        let mut miche = Miche::new(Arc::new(RootPressure::new()));
        let mid = miche
            .add_child(miche.root(), Arc::new(FixedPressure::new("mid", 1.0, 0.0)))
            .unwrap();
        let leaf = miche
            .add_child(mid, Arc::new(FixedPressure::new("leaf", 1.0, 0.0)))
            .unwrap();
        assert_eq!(miche.back_traversal(leaf), vec![leaf, mid, miche.root()]);
        assert_eq!(miche.back_traversal(NodeId(42)), Vec::<NodeId>::new());
        assert_eq!(miche.leaf_nodes(), vec![leaf]);
    }

    #[test]
    fn test_duplicate_sibling_rejected() {
        let mut miche = Miche::new(Arc::new(RootPressure::new()));
        miche
            .add_child(miche.root(), Arc::new(FixedPressure::new("p", 1.0, 0.0)))
            .unwrap();
        let result = miche.add_child(miche.root(), Arc::new(FixedPressure::new("p", 1.0, 0.0)));
        assert!(matches!(result, Err(AutoEvoError::DuplicatePressure(_))));
        assert!(matches!(
            miche.add_child(NodeId(7), Arc::new(FixedPressure::new("q", 1.0, 0.0))),
            Err(AutoEvoError::MissingNode(7))
        ));
    }

    #[test]
    fn test_clone_is_independent() {
        let pressure = FixedPressure::new("p", 1.0, 100.0)
            .with_score(1, 5.0)
            .with_score(2, 8.0);
        let (mut miche, leaf) = single_leaf(pressure);
        let patch = test_patch(0);
        let mut cache = test_cache();
        miche.insert_species(species(1), &patch, &mut cache);

        let mut speculative = miche.clone();
        speculative.insert_species(species(2), &patch, &mut cache);
        assert_eq!(speculative.node(leaf).unwrap().occupant().unwrap().id, SpeciesId(2));
        assert_eq!(miche.node(leaf).unwrap().occupant().unwrap().id, SpeciesId(1));
    }

    #[test]
    fn test_snapshot_restores_allocation() {
        let params = SimulationParameters::default();
        let constants = EnergyConstants::default();
        let patch = test_patch(0);
        let mut cache = test_cache();

        let mut miche = Miche::new(Arc::new(RootPressure::new()));
        let temperature = miche
            .add_child(miche.root(), Arc::new(TemperatureTolerancePressure::new(1.0)))
            .unwrap();
        miche
            .add_child(
                temperature,
                Arc::new(MetabolicStabilityPressure::new(&params, 1.0).unwrap()),
            )
            .unwrap();

        let mut registry = BTreeMap::new();
        for (id, organelles) in [(1, vec!["cytoplasm"]), (2, vec!["cytoplasm", "metabolosomes"])] {
            let s = Arc::new(simple_species(id, &organelles));
            registry.insert(s.id, s.clone());
            miche.insert_species(s, &patch, &mut cache);
        }

        let snapshot = miche.snapshot().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: MicheSnapshot = serde_json::from_str(&json).unwrap();

        let world_species = BTreeMap::new();
        let ctx = PressureBuildContext {
            params: &params,
            constants: &constants,
            species: &world_species,
        };
        let mut fresh_cache = test_cache();
        let restored = Miche::restore(&parsed, &ctx, &registry, &patch, &mut fresh_cache).unwrap();

        assert_eq!(restored.len(), miche.len());
        for index in 0..miche.len() {
            let a = miche.node(NodeId(index)).unwrap().occupant().map(|s| s.id);
            let b = restored.node(NodeId(index)).unwrap().occupant().map(|s| s.id);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_restore_requires_biome_compound() {
        let params = SimulationParameters::default();
        let constants = EnergyConstants::default();
        let snapshot = MicheSnapshot {
            nodes: vec![
                MicheNodeRecord {
                    parent: None,
                    pressure: PressureEnvelope::new(PressureRecord::Root),
                },
                MicheNodeRecord {
                    parent: Some(NodeId(0)),
                    pressure: PressureEnvelope::new(PressureRecord::AutotrophEnergyEfficiency {
                        compound: crate::schema::Compound::Iron,
                        strength: 1.0,
                    }),
                },
            ],
            attempted: Vec::new(),
        };
        let registry = BTreeMap::new();
        let world_species = BTreeMap::new();
        let ctx = PressureBuildContext {
            params: &params,
            constants: &constants,
            species: &world_species,
        };
        let result = Miche::restore(&snapshot, &ctx, &registry, &test_patch(0), &mut test_cache());
        assert!(matches!(result, Err(AutoEvoError::MissingBiomeCompound { .. })));
    }

    #[test]
    fn test_unpersistable_pressure() {
        let (miche, _) = single_leaf(FixedPressure::new("p", 1.0, 0.0));
        assert!(matches!(
            miche.snapshot(),
            Err(AutoEvoError::UnpersistablePressure(_))
        ));
    }

    fn scored_tree(scores: &[f32]) -> Miche {
        let mut miche = Miche::new(Arc::new(RootPressure::new()));
        let middle = miche
            .add_child(miche.root(), Arc::new(FixedPressure::new("mid", 1.0, 0.0).with_scorer(|_| 1.0)))
            .unwrap();
        for (leaf, name) in ["x", "y", "z"].into_iter().enumerate() {
            let mut pressure = FixedPressure::new(name, 1.0 + leaf as f32 * 0.5, 10.0);
            for species in 0..4 {
                pressure = pressure.with_score(species as u64, scores[species * 3 + leaf]);
            }
            let parent = if leaf == 0 { miche.root() } else { middle };
            miche.add_child(parent, Arc::new(pressure)).unwrap();
        }
        miche
    }

    proptest! {
        #[test]
        fn prop_insertion_order_independent(
            scores in prop::collection::vec(-2.0f32..10.0, 12),
            order in Just((0u64..4).collect::<Vec<_>>()).prop_shuffle(),
        ) {
            let patch = test_patch(0);

            let mut sorted = scored_tree(&scores);
            let mut cache = test_cache();
            for id in 0..4 {
                sorted.insert_species(species(id), &patch, &mut cache);
            }

            let mut shuffled = scored_tree(&scores);
            let mut cache = test_cache();
            for id in &order {
                shuffled.insert_species(species(*id), &patch, &mut cache);
            }

            for index in 0..sorted.len() {
                let a = sorted.node(NodeId(index)).unwrap().occupant().map(|s| s.id);
                let b = shuffled.node(NodeId(index)).unwrap().occupant().map(|s| s.id);
                prop_assert_eq!(a, b);
            }

            let mut seen = BTreeSet::new();
            for leaf in sorted.leaf_nodes() {
                if let Some(occupant) = sorted.node(leaf).unwrap().occupant() {
                    prop_assert!(seen.insert(occupant.id));
                }
            }
        }
    }
}
