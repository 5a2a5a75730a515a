//! Structured decision and outcome events.
//!
//! The engine never logs; it reports everything it decides or observes going
//! wrong through a `DiagnosticsSink` and lets the caller render or persist it.
use super::capacity::CapacityVerdict;
use super::matcher::CrewCheck;
use super::report::FailureSnapshot;
use crate::model::{FacilityCategory, QualificationKey};
use crate::provider::Action;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Optional phases of a reconciliation pass.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Recruitment,
    Buy,
    Assign,
    Expansions,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Recruitment => "recruitment",
            Phase::Buy => "buy",
            Phase::Assign => "assign",
            Phase::Expansions => "expansions",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pass tallies carried by `Event::PassFinished`.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PassSummary {
    pub bought: u32,
    pub assigned: u32,
    pub seats_unfilled: u32,
    pub expansions_queued: u32,
    pub failed_actions: u32,
}

/// `applied` is false when the action was only planned (dry run).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    RunStarted {
        location_id: String,
        category: FacilityCategory,
        facilities: usize,
        dry_run: bool,
    },
    PassStarted {
        facility_id: String,
        facility_name: String,
        index: usize,
        total: usize,
    },
    PhaseSkipped {
        facility_id: String,
        phase: Phase,
        reason: String,
    },
    RecruitmentChanged {
        facility_id: String,
        action: Action,
        applied: bool,
    },
    VehiclesMissing {
        facility_id: String,
        missing: BTreeMap<String, u32>,
    },
    NothingToBuy {
        facility_id: String,
    },
    CrewChecked {
        facility_id: String,
        check: CrewCheck,
    },
    PurchasesDeferred {
        facility_id: String,
        deferred: BTreeMap<String, u32>,
        blocking_keys: Vec<QualificationKey>,
        abandoned: bool,
    },
    CapacityChecked {
        facility_id: String,
        verdict: CapacityVerdict,
    },
    CapacityExpanded {
        facility_id: String,
        units: u32,
        applied: bool,
    },
    /// Space observed after expanding still cannot hold the purchase.
    CapacityStillShort {
        facility_id: String,
        verdict: CapacityVerdict,
        deferred: BTreeMap<String, u32>,
    },
    VehicleBought {
        facility_id: String,
        class: String,
        applied: bool,
    },
    CrewAssigned {
        facility_id: String,
        vehicle_id: String,
        crew_id: String,
        applied: bool,
    },
    AssignmentShortfall {
        facility_id: String,
        vehicle_id: String,
        class: String,
        key: QualificationKey,
        shortfall: u32,
    },
    ExpansionQueued {
        facility_id: String,
        slot_id: String,
        kind: String,
        applied: bool,
    },
    ExpansionsUnmet {
        facility_id: String,
        still_needed: BTreeMap<String, u32>,
    },
    ActionFailed {
        facility_id: String,
        action: Action,
        reason: String,
    },
    PassFailed {
        facility_id: String,
        error: String,
    },
    PassFinished {
        facility_id: String,
        summary: PassSummary,
    },
    RunFinished {
        completed: usize,
        failed: usize,
    },
}

impl Event {
    /// Return the stable string identifier used in the JSONL event log.
    pub fn name(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "run_started",
            Event::PassStarted { .. } => "pass_started",
            Event::PhaseSkipped { .. } => "phase_skipped",
            Event::RecruitmentChanged { .. } => "recruitment_changed",
            Event::VehiclesMissing { .. } => "vehicles_missing",
            Event::NothingToBuy { .. } => "nothing_to_buy",
            Event::CrewChecked { .. } => "crew_checked",
            Event::PurchasesDeferred { .. } => "purchases_deferred",
            Event::CapacityChecked { .. } => "capacity_checked",
            Event::CapacityExpanded { .. } => "capacity_expanded",
            Event::CapacityStillShort { .. } => "capacity_still_short",
            Event::VehicleBought { .. } => "vehicle_bought",
            Event::CrewAssigned { .. } => "crew_assigned",
            Event::AssignmentShortfall { .. } => "assignment_shortfall",
            Event::ExpansionQueued { .. } => "expansion_queued",
            Event::ExpansionsUnmet { .. } => "expansions_unmet",
            Event::ActionFailed { .. } => "action_failed",
            Event::PassFailed { .. } => "pass_failed",
            Event::PassFinished { .. } => "pass_finished",
            Event::RunFinished { .. } => "run_finished",
        }
    }
}

/// Receiver for engine events.
pub trait DiagnosticsSink {
    fn emit(&mut self, event: &Event);

    /// Called once per failed facility pass with the captured state.
    fn record_failure(&mut self, _failure: &FailureSnapshot) {}
}

impl<S: DiagnosticsSink + ?Sized> DiagnosticsSink for &mut S {
    fn emit(&mut self, event: &Event) {
        (**self).emit(event);
    }

    fn record_failure(&mut self, failure: &FailureSnapshot) {
        (**self).record_failure(failure);
    }
}

impl<S: DiagnosticsSink + ?Sized> DiagnosticsSink for Box<S> {
    fn emit(&mut self, event: &Event) {
        (**self).emit(event);
    }

    fn record_failure(&mut self, failure: &FailureSnapshot) {
        (**self).record_failure(failure);
    }
}

/// Keeps every event in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<Event>,
    pub failures: Vec<FailureSnapshot>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(&self, name: &str) -> Vec<&Event> {
        self.events.iter().filter(|event| event.name() == name).collect()
    }
}

#[cfg(test)]
impl DiagnosticsSink for RecordingSink {
    fn emit(&mut self, event: &Event) {
        self.events.push(event.clone());
    }

    fn record_failure(&mut self, failure: &FailureSnapshot) {
        self.failures.push(failure.clone());
    }
}
