//! State provider seam between the engine and the external system.
//!
//! Providers are the only place that talks to the outside world. The engine
//! issues one call at a time and treats every observation as possibly stale.
mod http;
mod retry;
mod snapshot;

pub use http::{HttpProvider, HttpProviderConfig};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use snapshot::{SnapshotProvider, WorldSnapshot};

use crate::model::{CrewMember, Facility, FacilityCategory, FacilityObservation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Mutating calls the engine can issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    BuyVehicle { facility_id: String, class: String },
    ExpandCapacity { facility_id: String },
    AssignCrew { vehicle_id: String, crew_id: String },
    QueueExpansion { facility_id: String, slot_id: String },
    SetRecruitment { facility_id: String, duration: u8 },
    SetCrewTarget { facility_id: String, target: u32 },
}

impl Action {
    /// Return the stable string identifier used in events and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::BuyVehicle { .. } => "buy_vehicle",
            Action::ExpandCapacity { .. } => "expand_capacity",
            Action::AssignCrew { .. } => "assign_crew",
            Action::QueueExpansion { .. } => "queue_expansion",
            Action::SetRecruitment { .. } => "set_recruitment",
            Action::SetCrewTarget { .. } => "set_crew_target",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::BuyVehicle { facility_id, class } => {
                write!(f, "buy {class} at {facility_id}")
            }
            Action::ExpandCapacity { facility_id } => write!(f, "expand {facility_id} by one"),
            Action::AssignCrew {
                vehicle_id,
                crew_id,
            } => write!(f, "assign {crew_id} to {vehicle_id}"),
            Action::QueueExpansion {
                facility_id,
                slot_id,
            } => write!(f, "queue expansion {slot_id} at {facility_id}"),
            Action::SetRecruitment {
                facility_id,
                duration,
            } => write!(f, "set recruitment {duration} at {facility_id}"),
            Action::SetCrewTarget {
                facility_id,
                target,
            } => write!(f, "set crew target {target} at {facility_id}"),
        }
    }
}

/// Errors a provider can report.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Expected data is briefly absent; worth another look after a wait.
    #[error("observation not ready: {0}")]
    Transient(String),

    /// The external system refused the action or it had no effect.
    #[error("action rejected: {action}: {reason}")]
    Rejected { action: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected payload: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Access to the external system's authoritative state.
pub trait StateProvider {
    fn list_facilities(
        &mut self,
        location_id: &str,
        category: FacilityCategory,
    ) -> Result<Vec<Facility>, ProviderError>;

    fn observe_facility(&mut self, facility_id: &str)
        -> Result<FacilityObservation, ProviderError>;

    /// Crew of a facility in the external system's listing order.
    fn observe_crew(&mut self, facility_id: &str) -> Result<Vec<CrewMember>, ProviderError>;

    fn perform(&mut self, action: &Action) -> Result<(), ProviderError>;
}

impl<P: StateProvider + ?Sized> StateProvider for &mut P {
    fn list_facilities(
        &mut self,
        location_id: &str,
        category: FacilityCategory,
    ) -> Result<Vec<Facility>, ProviderError> {
        (**self).list_facilities(location_id, category)
    }

    fn observe_facility(
        &mut self,
        facility_id: &str,
    ) -> Result<FacilityObservation, ProviderError> {
        (**self).observe_facility(facility_id)
    }

    fn observe_crew(&mut self, facility_id: &str) -> Result<Vec<CrewMember>, ProviderError> {
        (**self).observe_crew(facility_id)
    }

    fn perform(&mut self, action: &Action) -> Result<(), ProviderError> {
        (**self).perform(action)
    }
}
