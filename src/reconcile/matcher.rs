//! Qualification matching between crew and vehicle requirements.
//!
//! Crew pools are keyed by the exact qualification set: a member with
//! `{EMT, HAZMAT}` never counts toward an `{EMT}` need and vice versa.
use crate::model::{CrewMember, QualificationKey, Vehicle};
use crate::schema::{TargetSchema, VehicleTarget};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Crew coverage for one qualification key in the current pass.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CrewCheck {
    pub key: QualificationKey,
    pub needed: u32,
    pub available: u32,
    /// Classes sharing this key, all kept or all dropped together.
    pub classes: Vec<String>,
}

impl CrewCheck {
    pub fn satisfied(&self) -> bool {
        self.available >= self.needed
    }
}

/// What the facility should buy this pass after the crew check.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct PurchasePlan {
    pub to_buy: BTreeMap<String, u32>,
    /// Classes dropped because their qualification key lacks crew.
    pub deferred: BTreeMap<String, u32>,
    pub checks: Vec<CrewCheck>,
    /// Set when crew-bound classes exist but none of their keys is covered.
    pub abandoned: bool,
}

impl PurchasePlan {
    pub fn blocking_keys(&self) -> Vec<QualificationKey> {
        self.checks
            .iter()
            .filter(|check| !check.satisfied())
            .map(|check| check.key.clone())
            .collect()
    }
}

/// Count available crew whose qualification set equals `key`.
pub fn available_with_key(crew: &[CrewMember], key: &QualificationKey) -> u32 {
    crew.iter()
        .filter(|member| member.is_available() && &member.qualifications == key)
        .count() as u32
}

/// Group crew-bound missing classes by key and compare need against supply.
pub fn check_crew(
    missing: &BTreeMap<String, u32>,
    targets: &BTreeMap<String, VehicleTarget>,
    crew: &[CrewMember],
) -> Vec<CrewCheck> {
    let mut grouped: BTreeMap<QualificationKey, (u32, Vec<String>)> = BTreeMap::new();
    for (class, count) in missing {
        let Some(target) = targets.get(class) else {
            continue;
        };
        if !target.needs_crew() {
            continue;
        }
        let entry = grouped
            .entry(target.qualifications.clone())
            .or_insert_with(|| (0, Vec::new()));
        entry.0 += target.crew * count;
        entry.1.push(class.clone());
    }
    grouped
        .into_iter()
        .map(|(key, (needed, classes))| CrewCheck {
            available: available_with_key(crew, &key),
            key,
            needed,
            classes,
        })
        .collect()
}

/// Drop every class whose key is short on crew; keep the rest unchanged.
///
/// Classes that need no crew are kept unless the whole buy is abandoned,
/// which happens when at least one key was checked and none is satisfied.
pub fn plan_purchases(
    missing: &BTreeMap<String, u32>,
    targets: &BTreeMap<String, VehicleTarget>,
    crew: &[CrewMember],
) -> PurchasePlan {
    let checks = check_crew(missing, targets, crew);
    let abandoned = !checks.is_empty() && checks.iter().all(|check| !check.satisfied());
    let blocked: BTreeSet<&str> = checks
        .iter()
        .filter(|check| !check.satisfied())
        .flat_map(|check| check.classes.iter().map(String::as_str))
        .collect();

    let mut to_buy = BTreeMap::new();
    let mut deferred = BTreeMap::new();
    for (class, count) in missing {
        if abandoned || blocked.contains(class.as_str()) {
            deferred.insert(class.clone(), *count);
        } else {
            to_buy.insert(class.clone(), *count);
        }
    }
    PurchasePlan {
        to_buy,
        deferred,
        checks,
        abandoned,
    }
}

/// Exclusive claims on crew members within one matcher pass.
#[derive(Debug, Default)]
pub struct CrewPool {
    claimed: BTreeSet<String>,
}

impl CrewPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the first available, unclaimed member in listing order whose
    /// qualification set equals `key`.
    pub fn claim<'a>(
        &mut self,
        crew: &'a [CrewMember],
        key: &QualificationKey,
    ) -> Option<&'a CrewMember> {
        let member = crew.iter().find(|member| {
            member.is_available()
                && &member.qualifications == key
                && !self.claimed.contains(&member.id)
        })?;
        self.claimed.insert(member.id.clone());
        Some(member)
    }
}

/// A vehicle whose class requires crew.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewNeed<'a> {
    pub vehicle: &'a Vehicle,
    pub target: &'a VehicleTarget,
}

/// Vehicles, in listing order, whose class declares a crew requirement.
pub fn crew_needs<'a>(vehicles: &'a [Vehicle], schema: &'a TargetSchema) -> Vec<CrewNeed<'a>> {
    vehicles
        .iter()
        .filter_map(|vehicle| {
            let target = schema.vehicle(&vehicle.class)?;
            target
                .needs_crew()
                .then_some(CrewNeed { vehicle, target })
        })
        .collect()
}

pub fn assigned_count(crew: &[CrewMember], vehicle_id: &str) -> u32 {
    crew.iter()
        .filter(|member| member.is_assigned_to(vehicle_id))
        .count() as u32
}

/// One planned crew placement.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlannedAssignment {
    pub vehicle_id: String,
    pub crew_id: String,
}

/// Per-vehicle outcome of a static assignment plan.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssignmentPlan {
    pub assignments: Vec<PlannedAssignment>,
    /// Vehicle id to seats that could not be filled.
    pub shortfalls: BTreeMap<String, u32>,
}

/// Greedy first-match plan over a single crew snapshot.
///
/// Used for dry runs; live runs re-observe between placements instead.
pub fn plan_assignments(
    vehicles: &[Vehicle],
    crew: &[CrewMember],
    schema: &TargetSchema,
) -> AssignmentPlan {
    let mut pool = CrewPool::new();
    let mut assignments = Vec::new();
    let mut shortfalls = BTreeMap::new();
    for need in crew_needs(vehicles, schema) {
        let assigned = assigned_count(crew, &need.vehicle.id);
        let mut open = need.target.crew.saturating_sub(assigned);
        while open > 0 {
            let Some(member) = pool.claim(crew, &need.target.qualifications) else {
                break;
            };
            assignments.push(PlannedAssignment {
                vehicle_id: need.vehicle.id.clone(),
                crew_id: member.id.clone(),
            });
            open -= 1;
        }
        if open > 0 {
            shortfalls.insert(need.vehicle.id.clone(), open);
        }
    }
    AssignmentPlan {
        assignments,
        shortfalls,
    }
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
