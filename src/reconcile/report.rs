//! Per-facility and per-run reports.
use super::capacity::CapacityVerdict;
use super::matcher::{PlannedAssignment, PurchasePlan};
use crate::model::{CrewMember, Facility, FacilityCategory, FacilityObservation};
use crate::provider::Action;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_epoch_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassOutcome {
    Completed,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedAction {
    pub action: Action,
    pub reason: String,
}

/// Everything one reconciliation pass decided and did.
///
/// In a dry run the action lists hold what would have been done.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FacilityReport {
    pub facility: Facility,
    pub outcome: PassOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recruitment: Vec<Action>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub missing: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase: Option<PurchasePlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CapacityVerdict>,
    pub expanded_units: u32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub bought: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub unbought: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignments: Vec<PlannedAssignment>,
    /// Vehicle id to seats left empty.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub shortfalls: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expansions_queued: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub expansions_unmet: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_actions: Vec<FailedAction>,
}

impl FacilityReport {
    pub fn new(facility: &Facility) -> Self {
        FacilityReport {
            facility: facility.clone(),
            outcome: PassOutcome::Completed,
            recruitment: Vec::new(),
            missing: BTreeMap::new(),
            purchase: None,
            capacity: None,
            expanded_units: 0,
            bought: BTreeMap::new(),
            unbought: BTreeMap::new(),
            assignments: Vec::new(),
            shortfalls: BTreeMap::new(),
            expansions_queued: Vec::new(),
            expansions_unmet: BTreeMap::new(),
            failed_actions: Vec::new(),
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, PassOutcome::Failed { .. })
    }

    pub fn bought_total(&self) -> u32 {
        self.bought.values().sum()
    }

    pub fn seats_unfilled(&self) -> u32 {
        self.shortfalls.values().sum()
    }
}

/// Diagnostic capture for a facility pass that aborted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailureSnapshot {
    pub facility: Facility,
    pub error: String,
    pub captured_at_epoch_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_observation: Option<FacilityObservation>,
    pub last_crew: Vec<CrewMember>,
    pub progress: FacilityReport,
}

/// Summary of a whole run, written with `--report`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunReport {
    pub location_id: String,
    pub category: FacilityCategory,
    pub dry_run: bool,
    pub started_at_epoch_ms: u128,
    pub finished_at_epoch_ms: u128,
    pub facilities: Vec<FacilityReport>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.facilities.iter().filter(|report| !report.failed()).count()
    }

    pub fn failed(&self) -> usize {
        self.facilities.iter().filter(|report| report.failed()).count()
    }
}
