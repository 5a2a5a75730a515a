//! Diagnostics sinks for engine events.
//!
//! `TracingSink` renders events as log lines, `JsonlSink` appends them to an
//! event log, `FailureDumper` writes one JSON file per failed facility pass,
//! and `FanoutSink` feeds several sinks at once.
use crate::reconcile::report::now_epoch_ms;
use crate::reconcile::{DiagnosticsSink, Event, FailureSnapshot};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn emit(&mut self, event: &Event) {
        match event {
            Event::RunStarted {
                location_id,
                category,
                facilities,
                dry_run,
            } => tracing::info!(
                location = %location_id,
                category = %category,
                facilities,
                dry_run,
                "run started"
            ),
            Event::PassStarted {
                facility_id,
                facility_name,
                index,
                total,
            } => tracing::info!(
                facility = %facility_id,
                name = %facility_name,
                "facility {} of {}",
                index + 1,
                total
            ),
            Event::PhaseSkipped {
                facility_id,
                phase,
                reason,
            } => tracing::debug!(facility = %facility_id, phase = %phase, reason = %reason, "phase skipped"),
            Event::RecruitmentChanged {
                facility_id,
                action,
                applied,
            } => tracing::info!(facility = %facility_id, action = %action, applied, "recruitment"),
            Event::VehiclesMissing {
                facility_id,
                missing,
            } => tracing::info!(facility = %facility_id, missing = ?missing, "vehicles missing"),
            Event::NothingToBuy { facility_id } => {
                tracing::info!(facility = %facility_id, "fleet complete")
            }
            Event::CrewChecked { facility_id, check } => tracing::debug!(
                facility = %facility_id,
                key = %check.key,
                needed = check.needed,
                available = check.available,
                "crew check"
            ),
            Event::PurchasesDeferred {
                facility_id,
                deferred,
                blocking_keys,
                abandoned,
            } => {
                let keys: Vec<String> = blocking_keys.iter().map(ToString::to_string).collect();
                tracing::warn!(
                    facility = %facility_id,
                    deferred = ?deferred,
                    blocking = %keys.join(", "),
                    abandoned,
                    "not enough qualified crew"
                )
            }
            Event::CapacityChecked {
                facility_id,
                verdict,
            } => tracing::info!(
                facility = %facility_id,
                required = verdict.required,
                free = verdict.free_space,
                reserved = verdict.reserved,
                expansions = verdict.expansions_needed,
                "capacity"
            ),
            Event::CapacityExpanded {
                facility_id,
                units,
                applied,
            } => tracing::info!(facility = %facility_id, units, applied, "capacity expanded"),
            Event::CapacityStillShort {
                facility_id,
                verdict,
                deferred,
            } => tracing::warn!(
                facility = %facility_id,
                required = verdict.required,
                free = verdict.free_space,
                reserved = verdict.reserved,
                deferred = ?deferred,
                "capacity still short after expanding"
            ),
            Event::VehicleBought {
                facility_id,
                class,
                applied,
            } => tracing::info!(facility = %facility_id, class = %class, applied, "vehicle bought"),
            Event::CrewAssigned {
                facility_id,
                vehicle_id,
                crew_id,
                applied,
            } => tracing::debug!(
                facility = %facility_id,
                vehicle = %vehicle_id,
                crew = %crew_id,
                applied,
                "crew assigned"
            ),
            Event::AssignmentShortfall {
                facility_id,
                vehicle_id,
                class,
                key,
                shortfall,
            } => tracing::warn!(
                facility = %facility_id,
                vehicle = %vehicle_id,
                class = %class,
                key = %key,
                shortfall,
                "seats left empty"
            ),
            Event::ExpansionQueued {
                facility_id,
                slot_id,
                kind,
                applied,
            } => tracing::info!(
                facility = %facility_id,
                slot = %slot_id,
                kind = %kind,
                applied,
                "expansion queued"
            ),
            Event::ExpansionsUnmet {
                facility_id,
                still_needed,
            } => tracing::warn!(facility = %facility_id, still_needed = ?still_needed, "expansions unmet"),
            Event::ActionFailed {
                facility_id,
                action,
                reason,
            } => tracing::warn!(facility = %facility_id, action = %action, reason = %reason, "action failed"),
            Event::PassFailed { facility_id, error } => {
                tracing::error!(facility = %facility_id, error = %error, "facility pass failed")
            }
            Event::PassFinished {
                facility_id,
                summary,
            } => tracing::info!(
                facility = %facility_id,
                bought = summary.bought,
                assigned = summary.assigned,
                unfilled = summary.seats_unfilled,
                expansions = summary.expansions_queued,
                failed_actions = summary.failed_actions,
                "facility done"
            ),
            Event::RunFinished { completed, failed } => {
                tracing::info!(completed, failed, "run finished")
            }
        }
    }
}

#[derive(Serialize)]
struct EventLine<'a> {
    at_epoch_ms: u128,
    #[serde(flatten)]
    event: &'a Event,
}

/// Append-only JSONL event log.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    file: fs::File,
}

impl JsonlSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir {}", parent.display()))?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        Ok(JsonlSink {
            path: path.to_path_buf(),
            file,
        })
    }

    fn append(&mut self, event: &Event) -> Result<()> {
        let line = EventLine {
            at_epoch_ms: now_epoch_ms(),
            event,
        };
        let text = serde_json::to_string(&line).context("serialize event")?;
        self.file
            .write_all(text.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))?;
        self.file
            .write_all(b"\n")
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}

impl DiagnosticsSink for JsonlSink {
    fn emit(&mut self, event: &Event) {
        if let Err(err) = self.append(event) {
            tracing::warn!(
                event = event.name(),
                error = %format!("{err:#}"),
                "event log write failed"
            );
        }
    }
}

/// Writes `failure_<facility>_<epoch_ms>.json` for each failed pass.
#[derive(Debug, Clone)]
pub struct FailureDumper {
    dir: PathBuf,
}

impl FailureDumper {
    pub fn new(dir: &Path) -> Self {
        FailureDumper {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dump_path(&self, failure: &FailureSnapshot) -> PathBuf {
        let facility: String = failure
            .facility
            .id
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
            .collect();
        self.dir.join(format!(
            "failure_{facility}_{}.json",
            failure.captured_at_epoch_ms
        ))
    }

    pub fn write(&self, failure: &FailureSnapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create diagnostics dir {}", self.dir.display()))?;
        let path = self.dump_path(failure);
        let text = serde_json::to_string_pretty(failure).context("serialize failure snapshot")?;
        fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

impl DiagnosticsSink for FailureDumper {
    fn emit(&mut self, _event: &Event) {}

    fn record_failure(&mut self, failure: &FailureSnapshot) {
        match self.write(failure) {
            Ok(path) => tracing::warn!(path = %path.display(), "failure snapshot written"),
            Err(err) => tracing::warn!(error = %format!("{err:#}"), "failure snapshot not written"),
        }
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn DiagnosticsSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn DiagnosticsSink>) {
        self.sinks.push(sink);
    }
}

impl DiagnosticsSink for FanoutSink {
    fn emit(&mut self, event: &Event) {
        for sink in &mut self.sinks {
            sink.emit(event);
        }
    }

    fn record_failure(&mut self, failure: &FailureSnapshot) {
        for sink in &mut self.sinks {
            sink.record_failure(failure);
        }
    }
}
