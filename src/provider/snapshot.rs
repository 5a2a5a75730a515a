//! In-memory provider backed by a JSON world snapshot.
//!
//! Actions apply immediately to the in-memory world, which can be written
//! back out so consecutive runs see each other's effects.
use super::{Action, ProviderError, StateProvider};
use crate::model::{
    CrewMember, ExpansionSlot, Facility, FacilityCategory, FacilityObservation, SlotStatus,
    Vehicle,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// One facility with everything the external system would report about it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SnapshotFacility {
    #[serde(flatten)]
    pub facility: Facility,
    pub free_space: i64,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
    #[serde(default)]
    pub expansion_slots: Vec<ExpansionSlot>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct WorldSnapshot {
    #[serde(default)]
    pub facilities: Vec<SnapshotFacility>,
    /// Classes stored outside general capacity.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub space_exempt_classes: Vec<String>,
    /// Action kinds the simulated system refuses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reject_actions: Vec<String>,
}

impl WorldSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read snapshot {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse snapshot {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self).context("serialize snapshot")?;
        fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

/// Provider over a `WorldSnapshot`, recording every performed action.
#[derive(Debug, Clone, Default)]
pub struct SnapshotProvider {
    world: WorldSnapshot,
    performed: Vec<Action>,
    next_vehicle: usize,
    space_exempt: BTreeSet<String>,
}

impl SnapshotProvider {
    pub fn new(world: WorldSnapshot) -> Self {
        let next_vehicle = world
            .facilities
            .iter()
            .map(|entry| entry.vehicles.len())
            .sum::<usize>();
        let space_exempt = world.space_exempt_classes.iter().cloned().collect();
        SnapshotProvider {
            world,
            performed: Vec::new(),
            next_vehicle,
            space_exempt,
        }
    }

    /// Also store these classes outside general capacity, on top of the
    /// world's own list. The world file is left as it was.
    pub fn with_space_exempt<I>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.space_exempt.extend(classes);
        self
    }

    pub fn world(&self) -> &WorldSnapshot {
        &self.world
    }

    /// Stands in for changes made outside the reconciler.
    #[cfg(test)]
    pub fn world_mut(&mut self) -> &mut WorldSnapshot {
        &mut self.world
    }

    /// Actions applied so far, in order.
    pub fn performed(&self) -> &[Action] {
        &self.performed
    }

    fn facility_mut(&mut self, facility_id: &str) -> Result<&mut SnapshotFacility, ProviderError> {
        self.world
            .facilities
            .iter_mut()
            .find(|entry| entry.facility.id == facility_id)
            .ok_or_else(|| ProviderError::NotFound(format!("facility {facility_id}")))
    }

    fn facility(&self, facility_id: &str) -> Result<&SnapshotFacility, ProviderError> {
        self.world
            .facilities
            .iter()
            .find(|entry| entry.facility.id == facility_id)
            .ok_or_else(|| ProviderError::NotFound(format!("facility {facility_id}")))
    }

    fn fresh_vehicle_id(&mut self, facility_id: &str) -> String {
        loop {
            self.next_vehicle += 1;
            let candidate = format!("{facility_id}-v{}", self.next_vehicle);
            let taken = self
                .world
                .facilities
                .iter()
                .flat_map(|entry| entry.vehicles.iter())
                .any(|vehicle| vehicle.id == candidate);
            if !taken {
                return candidate;
            }
        }
    }

    fn apply(&mut self, action: &Action) -> Result<(), ProviderError> {
        let rejected = |reason: &str| ProviderError::Rejected {
            action: action.to_string(),
            reason: reason.to_string(),
        };
        if self
            .world
            .reject_actions
            .iter()
            .any(|kind| kind == action.kind())
        {
            return Err(rejected("refused by the simulated system"));
        }
        match action {
            Action::BuyVehicle { facility_id, class } => {
                let exempt = self.space_exempt.contains(class);
                if !exempt && self.facility(facility_id)?.free_space <= 0 {
                    return Err(rejected("no free space"));
                }
                let id = self.fresh_vehicle_id(facility_id);
                let entry = self.facility_mut(facility_id)?;
                if !exempt {
                    entry.free_space -= 1;
                }
                entry.vehicles.push(Vehicle {
                    id,
                    class: class.clone(),
                });
            }
            Action::ExpandCapacity { facility_id } => {
                self.facility_mut(facility_id)?.free_space += 1;
            }
            Action::AssignCrew {
                vehicle_id,
                crew_id,
            } => {
                let entry = self
                    .world
                    .facilities
                    .iter_mut()
                    .find(|entry| entry.vehicles.iter().any(|v| &v.id == vehicle_id))
                    .ok_or_else(|| ProviderError::NotFound(format!("vehicle {vehicle_id}")))?;
                let member = entry
                    .crew
                    .iter_mut()
                    .find(|member| &member.id == crew_id)
                    .ok_or_else(|| ProviderError::NotFound(format!("crew {crew_id}")))?;
                if !member.is_available() {
                    return Err(rejected("crew member is not available"));
                }
                member.assigned_to = Some(vehicle_id.clone());
            }
            Action::QueueExpansion {
                facility_id,
                slot_id,
            } => {
                let entry = self.facility_mut(facility_id)?;
                let slot = entry
                    .expansion_slots
                    .iter_mut()
                    .find(|slot| &slot.id == slot_id)
                    .ok_or_else(|| ProviderError::NotFound(format!("slot {slot_id}")))?;
                if slot.status != SlotStatus::ToBuild {
                    return Err(rejected("slot is not buildable"));
                }
                slot.status = SlotStatus::InProgress;
            }
            Action::SetRecruitment { facility_id, .. } => {
                self.facility_mut(facility_id)?.facility.recruitment_active = true;
            }
            Action::SetCrewTarget {
                facility_id,
                target,
            } => {
                self.facility_mut(facility_id)?.facility.crew_target = Some(*target);
            }
        }
        Ok(())
    }
}

impl StateProvider for SnapshotProvider {
    fn list_facilities(
        &mut self,
        location_id: &str,
        category: FacilityCategory,
    ) -> Result<Vec<Facility>, ProviderError> {
        Ok(self
            .world
            .facilities
            .iter()
            .filter(|entry| {
                entry.facility.location_id == location_id && entry.facility.category == category
            })
            .map(|entry| entry.facility.clone())
            .collect())
    }

    fn observe_facility(
        &mut self,
        facility_id: &str,
    ) -> Result<FacilityObservation, ProviderError> {
        let entry = self.facility(facility_id)?;
        Ok(FacilityObservation {
            free_space: entry.free_space,
            vehicles: entry.vehicles.clone(),
            expansion_slots: entry.expansion_slots.clone(),
        })
    }

    fn observe_crew(&mut self, facility_id: &str) -> Result<Vec<CrewMember>, ProviderError> {
        Ok(self.facility(facility_id)?.crew.clone())
    }

    fn perform(&mut self, action: &Action) -> Result<(), ProviderError> {
        self.apply(action)?;
        self.performed.push(action.clone());
        Ok(())
    }
}
