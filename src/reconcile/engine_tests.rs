use super::*;
use crate::model::{QualificationKey, SlotStatus};
use crate::provider::{ProviderError, SnapshotProvider, WorldSnapshot};
use crate::reconcile::events::RecordingSink;
use crate::schema::parse_schema;
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn schema(text: &str) -> TargetSchema {
    parse_schema(text).expect("parse schema")
}

fn world(value: Value) -> WorldSnapshot {
    serde_json::from_value(value).expect("parse world")
}

fn station(id: &str, category: &str, extra: Value) -> Value {
    let mut station = json!({
        "id": id,
        "name": format!("Station {id}"),
        "location_id": "loc",
        "category": category,
        "level": 1,
        "crew_size": 10,
        "free_space": 0
    });
    if let (Some(fields), Some(extra)) = (station.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            fields.insert(key.clone(), value.clone());
        }
    }
    station
}

fn crew(id: &str, quals: &[&str], assigned_to: Option<&str>) -> Value {
    json!({"id": id, "qualifications": quals, "assigned_to": assigned_to, "state": "available"})
}

fn facilities(provider: &SnapshotProvider) -> Vec<Facility> {
    provider
        .world()
        .facilities
        .iter()
        .map(|entry| entry.facility.clone())
        .collect()
}

fn run_with<P: StateProvider>(
    schema: &TargetSchema,
    options: RunOptions,
    provider: P,
    facilities: &[Facility],
) -> (RunReport, RecordingSink) {
    let mut reconciler = Reconciler::new(schema, options, provider, RecordingSink::new());
    let report = reconciler.run("loc", FacilityCategory::Jrg, facilities);
    let (_, sink) = reconciler.into_parts();
    (report, sink)
}

fn kinds(provider: &SnapshotProvider) -> Vec<&'static str> {
    provider.performed().iter().map(Action::kind).collect()
}

fn assign(vehicle_id: &str, crew_id: &str) -> Action {
    Action::AssignCrew {
        vehicle_id: vehicle_id.to_string(),
        crew_id: crew_id.to_string(),
    }
}

fn buy(facility_id: &str, class: &str) -> Action {
    Action::BuyVehicle {
        facility_id: facility_id.to_string(),
        class: class.to_string(),
    }
}

/// Fails every observation of one facility.
struct Unreachable<P> {
    inner: P,
    facility_id: String,
}

impl<P: StateProvider> StateProvider for Unreachable<P> {
    fn list_facilities(
        &mut self,
        location_id: &str,
        category: FacilityCategory,
    ) -> Result<Vec<Facility>, ProviderError> {
        self.inner.list_facilities(location_id, category)
    }

    fn observe_facility(
        &mut self,
        facility_id: &str,
    ) -> Result<FacilityObservation, ProviderError> {
        if facility_id == self.facility_id {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }
        self.inner.observe_facility(facility_id)
    }

    fn observe_crew(&mut self, facility_id: &str) -> Result<Vec<CrewMember>, ProviderError> {
        self.inner.observe_crew(facility_id)
    }

    fn perform(&mut self, action: &Action) -> Result<(), ProviderError> {
        self.inner.perform(action)
    }
}

/// Keeps returning the first crew listing it saw for each facility.
struct FrozenCrew<P> {
    inner: P,
    frozen: BTreeMap<String, Vec<CrewMember>>,
}

impl<P: StateProvider> StateProvider for FrozenCrew<P> {
    fn list_facilities(
        &mut self,
        location_id: &str,
        category: FacilityCategory,
    ) -> Result<Vec<Facility>, ProviderError> {
        self.inner.list_facilities(location_id, category)
    }

    fn observe_facility(
        &mut self,
        facility_id: &str,
    ) -> Result<FacilityObservation, ProviderError> {
        self.inner.observe_facility(facility_id)
    }

    fn observe_crew(&mut self, facility_id: &str) -> Result<Vec<CrewMember>, ProviderError> {
        if let Some(crew) = self.frozen.get(facility_id) {
            return Ok(crew.clone());
        }
        let crew = self.inner.observe_crew(facility_id)?;
        self.frozen.insert(facility_id.to_string(), crew.clone());
        Ok(crew)
    }

    fn perform(&mut self, action: &Action) -> Result<(), ProviderError> {
        self.inner.perform(action)
    }
}

/// Records the calls it forwards and lets a test change the world right
/// after an action lands, the way other players or timers would.
struct Scripted<'a> {
    inner: &'a mut SnapshotProvider,
    react: fn(&Action, &mut WorldSnapshot),
    calls: Vec<&'static str>,
}

impl<'a> Scripted<'a> {
    fn new(inner: &'a mut SnapshotProvider, react: fn(&Action, &mut WorldSnapshot)) -> Self {
        Scripted {
            inner,
            react,
            calls: Vec::new(),
        }
    }

    /// Calls in order, keeping only the named ones.
    fn trace(&self, names: &[&str]) -> Vec<&'static str> {
        self.calls
            .iter()
            .copied()
            .filter(|call| names.contains(call))
            .collect()
    }
}

impl StateProvider for Scripted<'_> {
    fn list_facilities(
        &mut self,
        location_id: &str,
        category: FacilityCategory,
    ) -> Result<Vec<Facility>, ProviderError> {
        self.inner.list_facilities(location_id, category)
    }

    fn observe_facility(
        &mut self,
        facility_id: &str,
    ) -> Result<FacilityObservation, ProviderError> {
        self.calls.push("observe_facility");
        self.inner.observe_facility(facility_id)
    }

    fn observe_crew(&mut self, facility_id: &str) -> Result<Vec<CrewMember>, ProviderError> {
        self.calls.push("observe_crew");
        self.inner.observe_crew(facility_id)
    }

    fn perform(&mut self, action: &Action) -> Result<(), ProviderError> {
        self.calls.push(action.kind());
        self.inner.perform(action)?;
        (self.react)(action, self.inner.world_mut());
        Ok(())
    }
}

fn untouched(_: &Action, _: &mut WorldSnapshot) {}

#[test]
fn tops_up_a_partially_crewed_vehicle_with_one_assignment() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Truck":{"count":1,"crew":2}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "vehicles": [{"id": "v1", "class": "Truck"}],
        "crew": [crew("c1", &[], Some("v1")), crew("c2", &[], None)]
    }))]})));
    let list = facilities(&provider);

    let (report, _) = run_with(&schema, RunOptions::default(), &mut provider, &list);

    assert_eq!(provider.performed().to_vec(), vec![assign("v1", "c2")]);
    let facility = &report.facilities[0];
    assert!(!facility.failed());
    assert_eq!(facility.assignments.len(), 1);
    assert!(facility.shortfalls.is_empty());
}

#[test]
fn buys_missing_vehicle_then_crews_it_after_reobserving() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Truck":{"count":2,"crew":2}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "free_space": 5,
        "vehicles": [{"id": "v1", "class": "Truck"}],
        "crew": [
            crew("c1", &[], Some("v1")),
            crew("c2", &[], Some("v1")),
            crew("c3", &[], None),
            crew("c4", &[], None)
        ]
    }))]})));
    let list = facilities(&provider);

    let (report, _) = run_with(&schema, RunOptions::default(), &mut provider, &list);

    assert_eq!(
        provider.performed().to_vec(),
        vec![buy("f1", "Truck"), assign("f1-v2", "c3"), assign("f1-v2", "c4")]
    );
    let facility = &report.facilities[0];
    assert_eq!(facility.missing, BTreeMap::from([("Truck".to_string(), 1)]));
    assert_eq!(facility.bought, BTreeMap::from([("Truck".to_string(), 1)]));
}

#[test]
fn defers_classes_whose_qualification_key_lacks_crew() {
    let schema = schema(
        r#"{"schema_version":1,"vehicles":{
            "Truck":{"count":1,"crew":1},
            "Medic":{"count":1,"crew":3,"qualifications":["EMT"]}
        }}"#,
    );
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "free_space": 5,
        "crew": [crew("c1", &[], None)]
    }))]})));
    let list = facilities(&provider);

    let (report, sink) = run_with(&schema, RunOptions::default(), &mut provider, &list);

    assert_eq!(
        provider.performed().to_vec(),
        vec![buy("f1", "Truck"), assign("f1-v1", "c1")]
    );
    let plan = report.facilities[0].purchase.as_ref().expect("purchase plan");
    assert_eq!(plan.deferred, BTreeMap::from([("Medic".to_string(), 1)]));

    let deferred = sink.named("purchases_deferred");
    assert_eq!(deferred.len(), 1);
    let emt = vec![QualificationKey::from_tags(["EMT"])];
    assert!(matches!(
        deferred[0],
        Event::PurchasesDeferred { blocking_keys, abandoned: false, .. } if blocking_keys == &emt
    ));
}

#[test]
fn expands_reserved_facility_before_buying() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Patrol car":{"count":2}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("p1", "OPI", json!({
        "free_space": 2
    }))]})));
    let list = facilities(&provider);

    let (report, _) = run_with(&schema, RunOptions::default(), &mut provider, &list);

    assert_eq!(
        kinds(&provider),
        vec![
            "expand_capacity",
            "expand_capacity",
            "expand_capacity",
            "buy_vehicle",
            "buy_vehicle"
        ]
    );
    let facility = &report.facilities[0];
    let verdict = facility.capacity.expect("capacity verdict");
    assert_eq!(verdict.adjusted_free_space(), -1);
    assert_eq!(facility.expanded_units, 3);
    assert_eq!(provider.world().facilities[0].free_space, 3);
}

#[test]
fn failed_expansion_skips_buying_for_the_pass() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Patrol car":{"count":2}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({
        "facilities": [station("p1", "OPI", json!({"free_space": 2}))],
        "reject_actions": ["expand_capacity"]
    })));
    let list = facilities(&provider);

    let (report, sink) = run_with(&schema, RunOptions::default(), &mut provider, &list);

    assert!(provider.performed().is_empty());
    let facility = &report.facilities[0];
    assert!(!facility.failed());
    assert_eq!(facility.failed_actions.len(), 1);
    assert_eq!(facility.expanded_units, 0);
    assert_eq!(
        facility.unbought,
        BTreeMap::from([("Patrol car".to_string(), 2)])
    );
    assert!(facility.bought.is_empty());
    assert_eq!(sink.named("action_failed").len(), 1);
}

#[test]
fn failed_buy_stops_that_class_and_reports_the_remainder() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Truck":{"count":3}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({
        "facilities": [station("f1", "JRG", json!({"free_space": 5}))],
        "reject_actions": ["buy_vehicle"]
    })));
    let list = facilities(&provider);

    let (report, _) = run_with(&schema, RunOptions::default(), &mut provider, &list);

    let facility = &report.facilities[0];
    assert_eq!(facility.failed_actions.len(), 1);
    assert_eq!(facility.unbought, BTreeMap::from([("Truck".to_string(), 3)]));
    assert!(provider.world().facilities[0].vehicles.is_empty());
}

#[test]
fn reports_assignment_shortfall_and_keeps_partial_progress() {
    let schema = schema(
        r#"{"schema_version":1,"vehicles":{"Medic":{"count":1,"crew":3,"qualifications":["EMT"]}}}"#,
    );
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "vehicles": [{"id": "v1", "class": "Medic"}],
        "crew": [
            crew("c1", &[], None),
            crew("e1", &["EMT"], None),
            crew("e2", &["EMT", "HAZMAT"], None)
        ]
    }))]})));
    let list = facilities(&provider);

    let (report, sink) = run_with(&schema, RunOptions::default(), &mut provider, &list);

    assert_eq!(provider.performed().to_vec(), vec![assign("v1", "e1")]);
    let facility = &report.facilities[0];
    assert_eq!(facility.shortfalls, BTreeMap::from([("v1".to_string(), 2)]));
    let shortfalls = sink.named("assignment_shortfall");
    assert!(matches!(
        shortfalls[0],
        Event::AssignmentShortfall { shortfall: 2, .. }
    ));
}

#[test]
fn stale_crew_listing_never_over_assigns() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Truck":{"count":1,"crew":2}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "vehicles": [{"id": "v1", "class": "Truck"}],
        "crew": [crew("c1", &[], None), crew("c2", &[], None), crew("c3", &[], None)]
    }))]})));
    let list = facilities(&provider);

    let frozen = FrozenCrew {
        inner: &mut provider,
        frozen: BTreeMap::new(),
    };
    let (report, _) = run_with(&schema, RunOptions::default(), frozen, &list);

    assert_eq!(
        provider.performed().to_vec(),
        vec![assign("v1", "c1"), assign("v1", "c2")]
    );
    assert!(report.facilities[0].shortfalls.is_empty());
}

#[test]
fn failing_facility_is_isolated_and_captured() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Truck":{"count":1}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [
        station("f1", "JRG", json!({"free_space": 1, "crew": [crew("c1", &[], None)]})),
        station("f2", "JRG", json!({"free_space": 1}))
    ]})));
    let list = facilities(&provider);

    let unreachable = Unreachable {
        inner: &mut provider,
        facility_id: "f1".to_string(),
    };
    let (report, sink) = run_with(&schema, RunOptions::default(), unreachable, &list);

    assert_eq!(report.failed(), 1);
    assert_eq!(report.completed(), 1);
    let PassOutcome::Failed { error } = &report.facilities[0].outcome else {
        panic!("first facility should fail");
    };
    assert!(error.contains("observe facility f1"));
    assert!(error.contains("connection reset"));
    assert_eq!(
        report.facilities[1].bought,
        BTreeMap::from([("Truck".to_string(), 1)])
    );

    assert_eq!(sink.failures.len(), 1);
    let failure = &sink.failures[0];
    assert_eq!(failure.facility.id, "f1");
    assert_eq!(failure.last_crew.len(), 1);
    assert!(failure.last_observation.is_none());
    assert_eq!(provider.performed().to_vec(), vec![buy("f2", "Truck")]);
}

#[test]
fn dry_run_reports_the_full_plan_without_acting() {
    let schema = schema(
        r#"{"schema_version":1,
            "vehicles":{"Patrol car":{"count":2,"crew":1}},
            "expansions":{"OPI":{"rsd":1}}}"#,
    );
    let original = world(json!({"facilities": [station("p1", "OPI", json!({
        "free_space": 2,
        "vehicles": [{"id": "v1", "class": "Patrol car"}],
        "crew": [crew("c1", &[], None), crew("c2", &[], None)],
        "expansion_slots": [{"id": "s1", "kind": "rsd", "status": "to_build"}]
    }))]}));
    let mut provider = SnapshotProvider::new(original.clone());
    let list = facilities(&provider);
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };

    let (report, sink) = run_with(&schema, options, &mut provider, &list);

    assert!(provider.performed().is_empty());
    assert_eq!(provider.world(), &original);
    let facility = &report.facilities[0];
    assert!(report.dry_run);
    assert_eq!(facility.expanded_units, 2);
    assert_eq!(
        facility.bought,
        BTreeMap::from([("Patrol car".to_string(), 1)])
    );
    assert_eq!(facility.assignments.len(), 1);
    assert_eq!(facility.expansions_queued, vec!["s1".to_string()]);
    assert!(sink.named("vehicle_bought").iter().all(|event| matches!(
        event,
        Event::VehicleBought { applied: false, .. }
    )));
}

#[test]
fn second_apply_is_a_no_op() {
    let schema = schema(
        r#"{"schema_version":1,
            "vehicles":{"Truck":{"count":2,"crew":1}},
            "expansions":{"JRG":{"rsd":1}},
            "recruitment":{"duration":3,"target_crew":20}}"#,
    );
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "free_space": 3,
        "crew": [crew("c1", &[], None), crew("c2", &[], None)],
        "expansion_slots": [
            {"id": "s1", "kind": "rsd", "status": "to_build"},
            {"id": "s2", "kind": "rsd", "status": "to_build"}
        ]
    }))]})));

    let list = facilities(&provider);
    let (first, _) = run_with(&schema, RunOptions::default(), &mut provider, &list);
    assert_eq!(
        kinds(&provider),
        vec![
            "set_recruitment",
            "set_crew_target",
            "buy_vehicle",
            "buy_vehicle",
            "assign_crew",
            "assign_crew",
            "queue_expansion"
        ]
    );
    assert_eq!(first.facilities[0].expansions_queued, vec!["s1".to_string()]);

    let performed = provider.performed().len();
    let list = facilities(&provider);
    let (second, _) = run_with(&schema, RunOptions::default(), &mut provider, &list);
    assert_eq!(provider.performed().len(), performed);
    let facility = &second.facilities[0];
    assert!(facility.recruitment.is_empty());
    assert!(facility.missing.is_empty());
    assert!(facility.assignments.is_empty());
    assert!(facility.expansions_queued.is_empty());
    assert!(facility.expansions_unmet.is_empty());
}

#[test]
fn failed_queue_leaves_expansion_unmet() {
    let schema = schema(r#"{"schema_version":1,"expansions":{"JRG":{"rsd":1}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({
        "facilities": [station("f1", "JRG", json!({
            "expansion_slots": [{"id": "s1", "kind": "rsd", "status": "to_build"}]
        }))],
        "reject_actions": ["queue_expansion"]
    })));
    let list = facilities(&provider);

    let (report, _) = run_with(&schema, RunOptions::default(), &mut provider, &list);

    let facility = &report.facilities[0];
    assert_eq!(
        facility.expansions_unmet,
        BTreeMap::from([("rsd".to_string(), 1)])
    );
    assert_eq!(facility.failed_actions.len(), 1);
}

#[test]
fn skip_toggles_disable_their_phases() {
    let schema = schema(
        r#"{"schema_version":1,
            "vehicles":{"Truck":{"count":1,"crew":1}},
            "expansions":{"JRG":{"rsd":1}},
            "recruitment":{"target_crew":20}}"#,
    );
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "free_space": 3,
        "vehicles": [{"id": "v1", "class": "Truck"}, {"id": "v2", "class": "Truck"}],
        "crew": [crew("c1", &[], None)],
        "expansion_slots": [{"id": "s1", "kind": "rsd", "status": "to_build"}]
    }))]})));
    let list = facilities(&provider);
    let options = RunOptions {
        skip_buy: true,
        skip_assign: true,
        skip_expansions: true,
        skip_recruitment: true,
        ..RunOptions::default()
    };

    let (_, sink) = run_with(&schema, options, &mut provider, &list);

    assert!(provider.performed().is_empty());
    let phases: Vec<Phase> = sink
        .events
        .iter()
        .filter_map(|event| match event {
            Event::PhaseSkipped { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            Phase::Recruitment,
            Phase::Buy,
            Phase::Assign,
            Phase::Expansions
        ]
    );
}

#[test]
fn crew_is_reobserved_after_every_assignment() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Truck":{"count":1,"crew":2}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "vehicles": [{"id": "v1", "class": "Truck"}],
        "crew": [crew("c1", &[], None), crew("c2", &[], None)]
    }))]})));
    let list = facilities(&provider);
    let mut scripted = Scripted::new(&mut provider, untouched);

    run_with(&schema, RunOptions::default(), &mut scripted, &list);

    assert_eq!(
        scripted.trace(&["observe_crew", "assign_crew"]),
        vec![
            "observe_crew",
            "assign_crew",
            "observe_crew",
            "assign_crew",
            "observe_crew"
        ]
    );
}

#[test]
fn crew_placed_elsewhere_ends_assignment_early() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Truck":{"count":1,"crew":3}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "vehicles": [{"id": "v1", "class": "Truck"}],
        "crew": [crew("c1", &[], None), crew("c2", &[], None), crew("c3", &[], None)]
    }))]})));
    let list = facilities(&provider);
    let fill_the_truck = |action: &Action, world: &mut WorldSnapshot| {
        if matches!(action, Action::AssignCrew { crew_id, .. } if crew_id == "c1") {
            for member in world.facilities[0].crew.iter_mut() {
                if member.id != "c1" {
                    member.assigned_to = Some("v1".to_string());
                }
            }
        }
    };
    let mut scripted = Scripted::new(&mut provider, fill_the_truck);

    let (report, _) = run_with(&schema, RunOptions::default(), &mut scripted, &list);

    assert_eq!(
        scripted.trace(&["observe_crew", "assign_crew"]),
        vec!["observe_crew", "assign_crew", "observe_crew"]
    );
    assert_eq!(provider.performed().to_vec(), vec![assign("v1", "c1")]);
    let facility = &report.facilities[0];
    assert!(facility.shortfalls.is_empty());
    assert!(facility.failed_actions.is_empty());
}

#[test]
fn expansions_queue_from_the_refreshed_slot_listing() {
    let schema = schema(r#"{"schema_version":1,"expansions":{"JRG":{"rsd":2}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("f1", "JRG", json!({
        "expansion_slots": [
            {"id": "s1", "kind": "rsd", "status": "to_build"},
            {"id": "s2", "kind": "rsd", "status": "waiting_other"}
        ]
    }))]})));
    let list = facilities(&provider);
    let unlock_second_slot = |action: &Action, world: &mut WorldSnapshot| {
        if matches!(action, Action::QueueExpansion { slot_id, .. } if slot_id == "s1") {
            for slot in world.facilities[0].expansion_slots.iter_mut() {
                if slot.id == "s2" {
                    slot.status = SlotStatus::ToBuild;
                }
            }
        }
    };
    let mut scripted = Scripted::new(&mut provider, unlock_second_slot);

    let (report, _) = run_with(&schema, RunOptions::default(), &mut scripted, &list);

    let trace = scripted.trace(&["observe_facility", "queue_expansion"]);
    assert!(trace.ends_with(&[
        "queue_expansion",
        "observe_facility",
        "queue_expansion",
        "observe_facility"
    ]));
    let facility = &report.facilities[0];
    assert_eq!(
        facility.expansions_queued,
        vec!["s1".to_string(), "s2".to_string()]
    );
    assert!(facility.expansions_unmet.is_empty());
    assert!(provider.world().facilities[0]
        .expansion_slots
        .iter()
        .all(|slot| slot.status == SlotStatus::InProgress));
}

#[test]
fn buy_waits_when_expanded_space_has_not_appeared() {
    let schema = schema(r#"{"schema_version":1,"vehicles":{"Patrol car":{"count":2}}}"#);
    let mut provider = SnapshotProvider::new(world(json!({"facilities": [station("p1", "OPI", json!({
        "free_space": 2
    }))]})));
    let list = facilities(&provider);
    let expansion_not_settled = |action: &Action, world: &mut WorldSnapshot| {
        if matches!(action, Action::ExpandCapacity { .. }) {
            world.facilities[0].free_space -= 1;
        }
    };
    let mut scripted = Scripted::new(&mut provider, expansion_not_settled);

    let (report, sink) = run_with(&schema, RunOptions::default(), &mut scripted, &list);

    let trace = scripted.trace(&["observe_facility", "expand_capacity", "buy_vehicle"]);
    assert_eq!(
        &trace[..5],
        &[
            "observe_facility",
            "expand_capacity",
            "expand_capacity",
            "expand_capacity",
            "observe_facility"
        ]
    );
    assert!(!trace.contains(&"buy_vehicle"));
    let facility = &report.facilities[0];
    assert_eq!(facility.expanded_units, 3);
    assert_eq!(
        facility.unbought,
        BTreeMap::from([("Patrol car".to_string(), 2)])
    );
    assert!(facility.bought.is_empty());
    assert!(facility.failed_actions.is_empty());
    assert_eq!(sink.named("capacity_still_short").len(), 1);
}
