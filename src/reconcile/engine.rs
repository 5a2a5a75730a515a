//! Reconciliation driver.
//!
//! Each facility is reconciled completely before the next one starts:
//! recruitment, diff, crew check, capacity, buy, re-observe, assign crew,
//! then expansions. A pass that hits an unhandled error is recorded as failed
//! with a snapshot of its working state and the run moves on.
use super::capacity::{plan_capacity, required_space};
use super::differ::missing_vehicles;
use super::events::{DiagnosticsSink, Event, PassSummary, Phase};
use super::expansions::ExpansionTracker;
use super::matcher::{
    assigned_count, crew_needs, plan_assignments, plan_purchases, CrewPool, PlannedAssignment,
};
use super::recruitment::recruitment_actions;
use super::report::{
    now_epoch_ms, FacilityReport, FailedAction, FailureSnapshot, PassOutcome, RunReport,
};
use crate::model::{CrewMember, Facility, FacilityCategory, FacilityObservation, Vehicle};
use crate::provider::{Action, StateProvider};
use crate::schema::TargetSchema;
use anyhow::{Context, Result};

const DISABLED: &str = "disabled by run options";

/// Toggles for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Plan and report without issuing any action.
    pub dry_run: bool,
    pub skip_buy: bool,
    pub skip_assign: bool,
    pub skip_expansions: bool,
    pub skip_recruitment: bool,
}

pub struct Reconciler<'a, P, S> {
    schema: &'a TargetSchema,
    options: RunOptions,
    provider: P,
    sink: S,
}

/// Working state of one facility pass.
struct Pass {
    facility: Facility,
    report: FacilityReport,
    observation: Option<FacilityObservation>,
    crew: Vec<CrewMember>,
}

impl Pass {
    fn new(facility: &Facility) -> Self {
        Pass {
            facility: facility.clone(),
            report: FacilityReport::new(facility),
            observation: None,
            crew: Vec::new(),
        }
    }

    fn id(&self) -> String {
        self.facility.id.clone()
    }

    fn summary(&self) -> PassSummary {
        PassSummary {
            bought: self.report.bought_total(),
            assigned: self.report.assignments.len() as u32,
            seats_unfilled: self.report.seats_unfilled(),
            expansions_queued: self.report.expansions_queued.len() as u32,
            failed_actions: self.report.failed_actions.len() as u32,
        }
    }
}

impl<'a, P: StateProvider, S: DiagnosticsSink> Reconciler<'a, P, S> {
    pub fn new(schema: &'a TargetSchema, options: RunOptions, provider: P, sink: S) -> Self {
        Reconciler {
            schema,
            options,
            provider,
            sink,
        }
    }

    pub fn into_parts(self) -> (P, S) {
        (self.provider, self.sink)
    }

    /// Reconcile every facility in order and collect the per-facility reports.
    pub fn run(
        &mut self,
        location_id: &str,
        category: FacilityCategory,
        facilities: &[Facility],
    ) -> RunReport {
        let started_at_epoch_ms = now_epoch_ms();
        self.sink.emit(&Event::RunStarted {
            location_id: location_id.to_string(),
            category,
            facilities: facilities.len(),
            dry_run: self.options.dry_run,
        });
        let total = facilities.len();
        let mut reports = Vec::with_capacity(total);
        for (index, facility) in facilities.iter().enumerate() {
            reports.push(self.reconcile(facility, index, total));
        }
        let report = RunReport {
            location_id: location_id.to_string(),
            category,
            dry_run: self.options.dry_run,
            started_at_epoch_ms,
            finished_at_epoch_ms: now_epoch_ms(),
            facilities: reports,
        };
        self.sink.emit(&Event::RunFinished {
            completed: report.completed(),
            failed: report.failed(),
        });
        report
    }

    /// Run one isolated facility pass; errors end up in the report, not here.
    pub fn reconcile(&mut self, facility: &Facility, index: usize, total: usize) -> FacilityReport {
        self.sink.emit(&Event::PassStarted {
            facility_id: facility.id.clone(),
            facility_name: facility.name.clone(),
            index,
            total,
        });
        let mut pass = Pass::new(facility);
        match self.run_pass(&mut pass) {
            Ok(()) => {
                self.sink.emit(&Event::PassFinished {
                    facility_id: pass.id(),
                    summary: pass.summary(),
                });
            }
            Err(err) => {
                let error = format!("{err:#}");
                pass.report.outcome = PassOutcome::Failed {
                    error: error.clone(),
                };
                self.sink.emit(&Event::PassFailed {
                    facility_id: pass.id(),
                    error: error.clone(),
                });
                let snapshot = FailureSnapshot {
                    facility: pass.facility.clone(),
                    error,
                    captured_at_epoch_ms: now_epoch_ms(),
                    last_observation: pass.observation.clone(),
                    last_crew: pass.crew.clone(),
                    progress: pass.report.clone(),
                };
                self.sink.record_failure(&snapshot);
            }
        }
        pass.report
    }

    fn run_pass(&mut self, pass: &mut Pass) -> Result<()> {
        let facility_id = pass.id();
        self.recruit(pass);

        pass.crew = self.observe_crew(&facility_id)?;
        let observation = self.observe_facility(&facility_id)?;
        pass.observation = Some(observation.clone());

        if self.options.skip_buy {
            self.skipped(pass, Phase::Buy);
        } else {
            self.buy(pass, &observation)?;
        }
        if self.options.skip_assign {
            self.skipped(pass, Phase::Assign);
        } else {
            self.assign(pass)?;
        }
        if self.options.skip_expansions {
            self.skipped(pass, Phase::Expansions);
        } else {
            self.build_expansions(pass)?;
        }
        Ok(())
    }

    fn observe_facility(&mut self, facility_id: &str) -> Result<FacilityObservation> {
        self.provider
            .observe_facility(facility_id)
            .with_context(|| format!("observe facility {facility_id}"))
    }

    fn observe_crew(&mut self, facility_id: &str) -> Result<Vec<CrewMember>> {
        self.provider
            .observe_crew(facility_id)
            .with_context(|| format!("observe crew of {facility_id}"))
    }

    fn skipped(&mut self, pass: &Pass, phase: Phase) {
        self.sink.emit(&Event::PhaseSkipped {
            facility_id: pass.id(),
            phase,
            reason: DISABLED.to_string(),
        });
    }

    /// Issue `action` unless this is a dry run. A failed action is reported
    /// and recorded; it never aborts the pass.
    fn act(&mut self, pass: &mut Pass, action: Action) -> bool {
        if self.options.dry_run {
            return true;
        }
        match self.provider.perform(&action) {
            Ok(()) => true,
            Err(err) => {
                let reason = err.to_string();
                self.sink.emit(&Event::ActionFailed {
                    facility_id: pass.id(),
                    action: action.clone(),
                    reason: reason.clone(),
                });
                pass.report.failed_actions.push(FailedAction { action, reason });
                false
            }
        }
    }

    fn applied(&self) -> bool {
        !self.options.dry_run
    }

    fn recruit(&mut self, pass: &mut Pass) {
        let schema = self.schema;
        let Some(target) = schema.recruitment.as_ref() else {
            return;
        };
        if self.options.skip_recruitment {
            self.skipped(pass, Phase::Recruitment);
            return;
        }
        for action in recruitment_actions(&pass.facility, target) {
            if !self.act(pass, action.clone()) {
                continue;
            }
            self.sink.emit(&Event::RecruitmentChanged {
                facility_id: pass.id(),
                action: action.clone(),
                applied: self.applied(),
            });
            pass.report.recruitment.push(action);
        }
    }

    fn buy(&mut self, pass: &mut Pass, observation: &FacilityObservation) -> Result<()> {
        let schema = self.schema;
        let facility_id = pass.id();
        let missing = missing_vehicles(&observation.vehicles, &schema.vehicles);
        if missing.is_empty() {
            self.sink.emit(&Event::NothingToBuy { facility_id });
            return Ok(());
        }
        pass.report.missing = missing.clone();
        self.sink.emit(&Event::VehiclesMissing {
            facility_id: facility_id.clone(),
            missing: missing.clone(),
        });

        let plan = plan_purchases(&missing, &schema.vehicles, &pass.crew);
        for check in &plan.checks {
            self.sink.emit(&Event::CrewChecked {
                facility_id: facility_id.clone(),
                check: check.clone(),
            });
        }
        if !plan.deferred.is_empty() {
            self.sink.emit(&Event::PurchasesDeferred {
                facility_id: facility_id.clone(),
                deferred: plan.deferred.clone(),
                blocking_keys: plan.blocking_keys(),
                abandoned: plan.abandoned,
            });
        }
        let to_buy = plan.to_buy.clone();
        pass.report.purchase = Some(plan);
        if to_buy.is_empty() {
            return Ok(());
        }

        let verdict = plan_capacity(
            required_space(&to_buy, schema),
            observation.free_space,
            schema.reserved_space(pass.facility.category),
        );
        pass.report.capacity = Some(verdict);
        self.sink.emit(&Event::CapacityChecked {
            facility_id: facility_id.clone(),
            verdict,
        });
        if verdict.needs_expansion() {
            if !self.expand_capacity(pass, verdict.expansions_needed) {
                pass.report.unbought = to_buy;
                return Ok(());
            }
            if !self.options.dry_run {
                let observation = self.observe_facility(&facility_id)?;
                let rechecked =
                    plan_capacity(verdict.required, observation.free_space, verdict.reserved);
                pass.observation = Some(observation);
                if rechecked.needs_expansion() {
                    self.sink.emit(&Event::CapacityStillShort {
                        facility_id,
                        verdict: rechecked,
                        deferred: to_buy.clone(),
                    });
                    pass.report.unbought = to_buy;
                    return Ok(());
                }
            }
        }

        for (class, count) in &to_buy {
            for bought in 0..*count {
                let action = Action::BuyVehicle {
                    facility_id: facility_id.clone(),
                    class: class.clone(),
                };
                if !self.act(pass, action) {
                    pass.report.unbought.insert(class.clone(), count - bought);
                    break;
                }
                self.sink.emit(&Event::VehicleBought {
                    facility_id: facility_id.clone(),
                    class: class.clone(),
                    applied: self.applied(),
                });
                *pass.report.bought.entry(class.clone()).or_insert(0) += 1;
            }
        }
        Ok(())
    }

    /// Expand one unit per call. Returns false when any unit failed, in which
    /// case nothing is bought this pass.
    fn expand_capacity(&mut self, pass: &mut Pass, units: u32) -> bool {
        let mut expanded = 0;
        let mut complete = true;
        for _ in 0..units {
            let action = Action::ExpandCapacity {
                facility_id: pass.id(),
            };
            if !self.act(pass, action) {
                complete = false;
                break;
            }
            expanded += 1;
        }
        pass.report.expanded_units = expanded;
        if expanded > 0 {
            self.sink.emit(&Event::CapacityExpanded {
                facility_id: pass.id(),
                units: expanded,
                applied: self.applied(),
            });
        }
        complete
    }

    fn assign(&mut self, pass: &mut Pass) -> Result<()> {
        if self.options.dry_run {
            // Planned purchases are not visible yet; plan over what exists.
            let vehicles = pass
                .observation
                .as_ref()
                .map(|observation| observation.vehicles.clone())
                .unwrap_or_default();
            self.plan_crew(pass, &vehicles);
            return Ok(());
        }
        let facility_id = pass.id();
        let observation = self.observe_facility(&facility_id)?;
        let vehicles = observation.vehicles.clone();
        pass.observation = Some(observation);
        self.crew_vehicles(pass, &vehicles)
    }

    fn plan_crew(&mut self, pass: &mut Pass, vehicles: &[Vehicle]) {
        let plan = plan_assignments(vehicles, &pass.crew, self.schema);
        for assignment in &plan.assignments {
            self.sink.emit(&Event::CrewAssigned {
                facility_id: pass.id(),
                vehicle_id: assignment.vehicle_id.clone(),
                crew_id: assignment.crew_id.clone(),
                applied: false,
            });
        }
        for (vehicle_id, shortfall) in &plan.shortfalls {
            if let Some(vehicle) = vehicles.iter().find(|vehicle| &vehicle.id == vehicle_id) {
                self.report_shortfall(pass, vehicle, *shortfall);
            }
        }
        pass.report.assignments = plan.assignments;
    }

    /// Fill every crewed vehicle, re-observing crew after each placement.
    ///
    /// Open seats per vehicle never exceed the shortfall seen before the first
    /// placement, so a stale crew listing cannot cause over-assignment.
    fn crew_vehicles(&mut self, pass: &mut Pass, vehicles: &[Vehicle]) -> Result<()> {
        let schema = self.schema;
        let facility_id = pass.id();
        let mut pool = CrewPool::new();
        for need in crew_needs(vehicles, schema) {
            let seats = need.target.crew;
            let vehicle_id = need.vehicle.id.clone();
            let mut open = seats.saturating_sub(assigned_count(&pass.crew, &vehicle_id));
            while open > 0 {
                let Some(member) = pool.claim(&pass.crew, &need.target.qualifications) else {
                    break;
                };
                let crew_id = member.id.clone();
                let action = Action::AssignCrew {
                    vehicle_id: vehicle_id.clone(),
                    crew_id: crew_id.clone(),
                };
                if !self.act(pass, action) {
                    break;
                }
                self.sink.emit(&Event::CrewAssigned {
                    facility_id: facility_id.clone(),
                    vehicle_id: vehicle_id.clone(),
                    crew_id: crew_id.clone(),
                    applied: true,
                });
                pass.report.assignments.push(PlannedAssignment {
                    vehicle_id: vehicle_id.clone(),
                    crew_id,
                });
                pass.crew = self.observe_crew(&facility_id)?;
                let observed_open = seats.saturating_sub(assigned_count(&pass.crew, &vehicle_id));
                open = (open - 1).min(observed_open);
            }
            if open > 0 {
                self.report_shortfall(pass, need.vehicle, open);
            }
        }
        Ok(())
    }

    fn report_shortfall(&mut self, pass: &mut Pass, vehicle: &Vehicle, shortfall: u32) {
        let key = self
            .schema
            .vehicle(&vehicle.class)
            .map(|target| target.qualifications.clone())
            .unwrap_or_default();
        self.sink.emit(&Event::AssignmentShortfall {
            facility_id: pass.id(),
            vehicle_id: vehicle.id.clone(),
            class: vehicle.class.clone(),
            key,
            shortfall,
        });
        pass.report.shortfalls.insert(vehicle.id.clone(), shortfall);
    }

    /// Queue one expansion per step until the tracker has nothing left to do.
    fn build_expansions(&mut self, pass: &mut Pass) -> Result<()> {
        let schema = self.schema;
        let targets = schema.expansions_for(pass.facility.category);
        if targets.is_empty() {
            return Ok(());
        }
        let facility_id = pass.id();
        let mut slots = if self.options.dry_run {
            pass.observation
                .as_ref()
                .map(|observation| observation.expansion_slots.clone())
                .unwrap_or_default()
        } else {
            let observation = self.observe_facility(&facility_id)?;
            let slots = observation.expansion_slots.clone();
            pass.observation = Some(observation);
            slots
        };

        let mut tracker = ExpansionTracker::new(&slots, &targets, schema);
        let mut failed_bucket = None;
        while let Some(slot) = tracker.step(&slots, schema) {
            let action = Action::QueueExpansion {
                facility_id: facility_id.clone(),
                slot_id: slot.id.clone(),
            };
            if !self.act(pass, action) {
                failed_bucket = Some(schema.expansion_bucket(&slot.kind).to_string());
                break;
            }
            self.sink.emit(&Event::ExpansionQueued {
                facility_id: facility_id.clone(),
                slot_id: slot.id.clone(),
                kind: slot.kind.clone(),
                applied: self.applied(),
            });
            pass.report.expansions_queued.push(slot.id);
            if !self.options.dry_run {
                let observation = self.observe_facility(&facility_id)?;
                slots = observation.expansion_slots.clone();
                pass.observation = Some(observation);
            }
        }

        let mut unmet = tracker.still_needed().clone();
        if let Some(bucket) = failed_bucket {
            *unmet.entry(bucket).or_insert(0) += 1;
        }
        if !unmet.is_empty() {
            self.sink.emit(&Event::ExpansionsUnmet {
                facility_id,
                still_needed: unmet.clone(),
            });
            pass.report.expansions_unmet = unmet;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
