//! Inventory deltas between target and observed counts.
//!
//! The reconciler is accretive: over-owned classes and over-built expansions
//! simply drop out of the result, nothing is ever sold or demolished.
use crate::model::{ExpansionSlot, Vehicle};
use crate::schema::{TargetSchema, VehicleTarget};
use std::collections::BTreeMap;

/// Vehicles still missing per class, positive entries only.
pub fn missing_vehicles(
    owned: &[Vehicle],
    targets: &BTreeMap<String, VehicleTarget>,
) -> BTreeMap<String, u32> {
    let mut owned_counts: BTreeMap<&str, u32> = BTreeMap::new();
    for vehicle in owned {
        *owned_counts.entry(vehicle.class.as_str()).or_insert(0) += 1;
    }
    targets
        .iter()
        .filter_map(|(class, target)| {
            let have = owned_counts.get(class.as_str()).copied().unwrap_or(0);
            let delta = target.count.saturating_sub(have);
            (delta > 0).then(|| (class.clone(), delta))
        })
        .collect()
}

/// Count slots that already account for their kind (done or in progress),
/// folding derived kinds into their parent bucket.
pub fn accounted_expansions(
    slots: &[ExpansionSlot],
    schema: &TargetSchema,
) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for slot in slots.iter().filter(|slot| slot.status.is_accounted()) {
        *counts
            .entry(schema.expansion_bucket(&slot.kind).to_string())
            .or_insert(0) += 1;
    }
    counts
}

/// Expansions still missing per kind, positive entries only.
pub fn missing_expansions(
    accounted: &BTreeMap<String, u32>,
    targets: &BTreeMap<String, u32>,
) -> BTreeMap<String, u32> {
    targets
        .iter()
        .filter_map(|(kind, wanted)| {
            let have = accounted.get(kind).copied().unwrap_or(0);
            let delta = wanted.saturating_sub(have);
            (delta > 0).then(|| (kind.clone(), delta))
        })
        .collect()
}
