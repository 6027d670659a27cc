//! Built-in mutation operators.

use std::collections::BTreeSet;

use crate::schema::{
    BehaviourAxis, MAX_BEHAVIOUR_VALUE, MembraneKind, OrganelleDefinition, OrganelleId, Species,
};

use super::mutation::{Mutant, MutationContext, MutationKey, MutationOperator, stable_hash};

/// MP spent to remove one organelle.
pub const REMOVE_ORGANELLE_COST: f32 = 10.0;
/// MP per rigidity step.
pub const RIGIDITY_STEP_COST: f32 = 5.0;
pub const RIGIDITY_STEP: f32 = 0.2;
/// MP per temperature tolerance step.
pub const TOLERANCE_STEP_COST: f32 = 4.0;
/// Degrees Celsius per temperature tolerance step.
pub const TOLERANCE_STEP: f32 = 2.0;
pub const MIN_TEMPERATURE_TOLERANCE: f32 = 2.0;
pub const MAX_TEMPERATURE_TOLERANCE: f32 = 50.0;

/// Largest number of steps a single stepped operator application takes.
const MAX_STEPS: u32 = 3;

fn organelle_allowed(
    id: &OrganelleId,
    def: &OrganelleDefinition,
    species: &Species,
    lawk: bool,
) -> bool {
    if lawk && !def.lawk {
        return false;
    }
    if def.requires_nucleus && !species.has_nucleus() {
        return false;
    }
    !(def.unique && species.organelle_count(id) > 0)
}

fn names_hash(ids: &[OrganelleId]) -> u64 {
    let names: BTreeSet<&str> = ids.iter().map(|id| id.as_str()).collect();
    stable_hash(names)
}

/// Adds one organelle from a candidate list.
///
/// `None` when no candidate may be added at all (LAWK, missing nucleus or a
/// unique organelle already present). `Some(vec![])` when candidates apply
/// but none is affordable or none fits the layout.
#[derive(Debug, Clone)]
pub struct AddOrganelle {
    candidates: Vec<OrganelleId>,
}

impl AddOrganelle {
    pub fn new(candidates: Vec<OrganelleId>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[OrganelleId] {
        &self.candidates
    }
}

impl MutationOperator for AddOrganelle {
    fn key(&self) -> MutationKey {
        MutationKey::new("add_organelle", [names_hash(&self.candidates), 0])
    }

    fn repeatable(&self) -> bool {
        true
    }

    fn mutations_of(
        &self,
        base: &Species,
        mp: f32,
        ctx: &mut MutationContext<'_>,
    ) -> Option<Vec<Mutant>> {
        let params = ctx.params;
        let applicable: Vec<_> = self
            .candidates
            .iter()
            .filter_map(|id| params.organelles.get(id).map(|def| (id, def)))
            .filter(|(id, def)| organelle_allowed(id, def, base, ctx.lawk))
            .collect();
        if applicable.is_empty() {
            return None;
        }

        let mut mutants = Vec::new();
        for (id, def) in applicable {
            if def.mp_cost > mp {
                continue;
            }
            let mut species = ctx.derive(base);
            if !ctx.layout.place(&mut species, id, params, ctx.rng) {
                continue;
            }
            species.on_edited(params);
            mutants.push(Mutant::new(species, mp - def.mp_cost));
        }
        Some(mutants)
    }
}

/// Removes one organelle of a given type. An empty candidate list means
/// any type.
///
/// `None` when the species has a single organelle or none of the candidate
/// types. A nucleus is never removed while organelles that need it remain.
/// `Some(vec![])` when removal applies but `mp < REMOVE_ORGANELLE_COST`.
#[derive(Debug, Clone, Default)]
pub struct RemoveOrganelle {
    candidates: Vec<OrganelleId>,
}

impl RemoveOrganelle {
    pub fn new(candidates: Vec<OrganelleId>) -> Self {
        Self { candidates }
    }

    pub fn any() -> Self {
        Self::default()
    }
}

impl MutationOperator for RemoveOrganelle {
    fn key(&self) -> MutationKey {
        MutationKey::new("remove_organelle", [names_hash(&self.candidates), 0])
    }

    fn mutations_of(
        &self,
        base: &Species,
        mp: f32,
        ctx: &mut MutationContext<'_>,
    ) -> Option<Vec<Mutant>> {
        if base.organelles.len() <= 1 {
            return None;
        }
        let params = ctx.params;
        let needs_nucleus = base.organelles.iter().any(|t| {
            params
                .organelles
                .get(&t.organelle)
                .is_some_and(|def| def.requires_nucleus)
        });

        let removable: BTreeSet<&OrganelleId> = base
            .organelles
            .iter()
            .map(|t| &t.organelle)
            .filter(|id| self.candidates.is_empty() || self.candidates.contains(id))
            .filter(|id| {
                !(needs_nucleus
                    && params
                        .organelles
                        .get(*id)
                        .is_some_and(|def| def.is_nucleus))
            })
            .collect();
        if removable.is_empty() {
            return None;
        }
        if mp < REMOVE_ORGANELLE_COST {
            return Some(Vec::new());
        }

        let mut mutants = Vec::new();
        for id in removable {
            let Some(index) = base.organelles.iter().rposition(|t| &t.organelle == id) else {
                continue;
            };
            let mut species = ctx.derive(base);
            if !ctx.layout.remove(&mut species, index) {
                continue;
            }
            species.on_edited(params);
            mutants.push(Mutant::new(species, mp - REMOVE_ORGANELLE_COST));
        }
        Some(mutants)
    }
}

/// Switches to another membrane type, paying its MP cost.
///
/// `None` when no other membrane is allowed. `Some(vec![])` when the allowed
/// ones are too expensive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeMembraneType;

impl MutationOperator for ChangeMembraneType {
    fn key(&self) -> MutationKey {
        MutationKey::new("change_membrane", [0, 0])
    }

    fn mutations_of(
        &self,
        base: &Species,
        mp: f32,
        ctx: &mut MutationContext<'_>,
    ) -> Option<Vec<Mutant>> {
        let params = ctx.params;
        let options: Vec<(MembraneKind, f32)> = params
            .membranes
            .iter()
            .filter(|(kind, _)| **kind != base.membrane)
            .filter(|(_, def)| !(ctx.lawk && !def.lawk))
            .filter(|(_, def)| !def.requires_nucleus || base.has_nucleus())
            .map(|(kind, def)| (*kind, def.mp_cost))
            .collect();
        if options.is_empty() {
            return None;
        }

        let mutants = options
            .into_iter()
            .filter(|(_, cost)| *cost <= mp)
            .map(|(kind, cost)| {
                let mut species = ctx.derive(base);
                species.membrane = kind;
                species.on_edited(params);
                Mutant::new(species, mp - cost)
            })
            .collect();
        Some(mutants)
    }
}

/// Makes the membrane more or less rigid in steps of [`RIGIDITY_STEP`].
///
/// `None` when rigidity is already at the bound in that direction.
/// `Some(vec![])` when `mp < RIGIDITY_STEP_COST`.
#[derive(Debug, Clone, Copy)]
pub struct ChangeMembraneRigidity {
    pub increase: bool,
}

impl ChangeMembraneRigidity {
    pub fn new(increase: bool) -> Self {
        Self { increase }
    }
}

impl MutationOperator for ChangeMembraneRigidity {
    fn key(&self) -> MutationKey {
        MutationKey::new("change_rigidity", [self.increase as u64, 0])
    }

    fn mutations_of(
        &self,
        base: &Species,
        mp: f32,
        ctx: &mut MutationContext<'_>,
    ) -> Option<Vec<Mutant>> {
        let current = base.membrane_rigidity;
        let at_bound = if self.increase {
            current >= 1.0
        } else {
            current <= -1.0
        };
        if at_bound {
            return None;
        }

        let direction = if self.increase { 1.0 } else { -1.0 };
        let mut mutants = Vec::new();
        for steps in 1..=MAX_STEPS {
            let cost = RIGIDITY_STEP_COST * steps as f32;
            if cost > mp {
                break;
            }
            let target = (current + direction * RIGIDITY_STEP * steps as f32).clamp(-1.0, 1.0);
            let mut species = ctx.derive(base);
            species.membrane_rigidity = target;
            species.on_edited(ctx.params);
            mutants.push(Mutant::new(species, mp - cost));
            if target.abs() >= 1.0 {
                break;
            }
        }
        Some(mutants)
    }
}

/// Moves one behaviour slider by a random amount. Behaviour changes are
/// free, so this never returns `Some(vec![])`.
///
/// `None` when the slider is already at the bound in that direction.
#[derive(Debug, Clone, Copy)]
pub struct ChangeBehaviour {
    pub axis: BehaviourAxis,
    pub increase: bool,
}

impl ChangeBehaviour {
    pub fn new(axis: BehaviourAxis, increase: bool) -> Self {
        Self { axis, increase }
    }
}

impl MutationOperator for ChangeBehaviour {
    fn key(&self) -> MutationKey {
        MutationKey::new("change_behaviour", [self.axis as u64, self.increase as u64])
    }

    fn mutations_of(
        &self,
        base: &Species,
        mp: f32,
        ctx: &mut MutationContext<'_>,
    ) -> Option<Vec<Mutant>> {
        let current = base.behaviour.get(self.axis);
        let at_bound = if self.increase {
            current >= MAX_BEHAVIOUR_VALUE
        } else {
            current <= 0.0
        };
        if at_bound {
            return None;
        }

        let delta = ctx.rng.range(20.0, 80.0);
        let target = if self.increase {
            current + delta
        } else {
            current - delta
        };
        let mut species = ctx.derive(base);
        species.behaviour.set(self.axis, target);
        Some(vec![Mutant::new(species, mp)])
    }
}

/// Direction of a temperature tolerance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToleranceChange {
    Warmer,
    Colder,
    Wider,
    Narrower,
}

/// Shifts the preferred temperature or the tolerance range in steps of
/// [`TOLERANCE_STEP`].
///
/// `None` when the tolerance range is already at its bound for `Wider` or
/// `Narrower`. `Some(vec![])` when `mp < TOLERANCE_STEP_COST`.
#[derive(Debug, Clone, Copy)]
pub struct ShiftTemperatureTolerance {
    pub change: ToleranceChange,
}

impl ShiftTemperatureTolerance {
    pub fn new(change: ToleranceChange) -> Self {
        Self { change }
    }
}

impl MutationOperator for ShiftTemperatureTolerance {
    fn key(&self) -> MutationKey {
        MutationKey::new("shift_tolerance", [self.change as u64, 0])
    }

    fn mutations_of(
        &self,
        base: &Species,
        mp: f32,
        ctx: &mut MutationContext<'_>,
    ) -> Option<Vec<Mutant>> {
        let tolerance = base.tolerances.temperature_tolerance;
        match self.change {
            ToleranceChange::Wider if tolerance >= MAX_TEMPERATURE_TOLERANCE => return None,
            ToleranceChange::Narrower if tolerance <= MIN_TEMPERATURE_TOLERANCE => return None,
            _ => {}
        }

        let mut mutants = Vec::new();
        for steps in 1..=MAX_STEPS {
            let cost = TOLERANCE_STEP_COST * steps as f32;
            if cost > mp {
                break;
            }
            let amount = TOLERANCE_STEP * steps as f32;
            let mut species = ctx.derive(base);
            let tolerances = &mut species.tolerances;
            let clamped = match self.change {
                ToleranceChange::Warmer => {
                    tolerances.preferred_temperature += amount;
                    false
                }
                ToleranceChange::Colder => {
                    tolerances.preferred_temperature -= amount;
                    false
                }
                ToleranceChange::Wider => {
                    tolerances.temperature_tolerance =
                        (tolerance + amount).min(MAX_TEMPERATURE_TOLERANCE);
                    tolerances.temperature_tolerance >= MAX_TEMPERATURE_TOLERANCE
                }
                ToleranceChange::Narrower => {
                    tolerances.temperature_tolerance =
                        (tolerance - amount).max(MIN_TEMPERATURE_TOLERANCE);
                    tolerances.temperature_tolerance <= MIN_TEMPERATURE_TOLERANCE
                }
            };
            mutants.push(Mutant::new(species, mp - cost));
            if clamped {
                break;
            }
        }
        Some(mutants)
    }
}
