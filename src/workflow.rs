use crate::cli::{RunArgs, ValidateArgs};
use crate::diagnostics::{FailureDumper, FanoutSink, JsonlSink, TracingSink};
use crate::filter::FacilityFilter;
use crate::model::FacilityCategory;
use crate::provider::{
    HttpProvider, HttpProviderConfig, RetryPolicy, SnapshotProvider, StateProvider,
    WorldSnapshot,
};
use crate::reconcile::{FacilityReport, PassOutcome, Reconciler, RunOptions, RunReport};
use crate::schema::{default_schema_path, load_schema, TargetSchema};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn run_validate(args: ValidateArgs) -> Result<()> {
    let path = resolve_schema_path(args.schema.as_deref())?;
    let schema = load_schema(&path)?;
    let crewed = schema
        .vehicles
        .values()
        .filter(|target| target.needs_crew())
        .count();
    println!("schema ok: {}", path.display());
    println!(
        "  vehicle classes: {} ({} crewed)",
        schema.vehicles.len(),
        crewed
    );
    for (category, kinds) in &schema.expansions {
        let wanted: u32 = kinds.values().sum();
        println!("  expansions {category}: {wanted} across {} kinds", kinds.len());
    }
    if let Some(recruitment) = schema.recruitment.as_ref() {
        println!(
            "  recruitment: duration {}, crew target {}",
            recruitment.duration, recruitment.target_crew
        );
    }
    tracing::debug!(path = %path.display(), "schema validated");
    Ok(())
}

pub fn run_plan(args: RunArgs) -> Result<()> {
    run_reconcile(args, true)
}

pub fn run_apply(args: RunArgs) -> Result<()> {
    run_reconcile(args, false)
}

fn run_reconcile(args: RunArgs, dry_run: bool) -> Result<()> {
    let schema_path = resolve_schema_path(args.schema.as_deref())?;
    let schema = load_schema(&schema_path)?;
    let options = RunOptions {
        dry_run,
        skip_buy: args.skip_buy,
        skip_assign: args.skip_assign,
        skip_expansions: args.skip_expansions,
        skip_recruitment: args.skip_recruitment,
    };
    let filter = FacilityFilter {
        crew: args.crew_range.unwrap_or_default(),
        level: args.level_range.unwrap_or_default(),
        start: args.start,
        limit: args.limit,
    };
    let scope = RunScope {
        schema: &schema,
        options,
        filter: &filter,
        location_id: &args.location,
        category: args.category,
    };
    let sink = build_sink(&args)?;

    let report = if let Some(endpoint) = args.provider.endpoint.as_deref() {
        let mut config = HttpProviderConfig::new(endpoint);
        config.token = args.token.clone();
        config.retry = RetryPolicy::new(args.retries, args.backoff, args.retry_delay_ms);
        let (report, _) = scope.reconcile(HttpProvider::new(config), sink)?;
        report
    } else if let Some(snapshot_path) = args.provider.snapshot.as_deref() {
        let world = WorldSnapshot::load(snapshot_path)?;
        let provider = SnapshotProvider::new(world).with_space_exempt(schema.space_exempt_classes());
        let (report, provider) = scope.reconcile(provider, sink)?;
        if let Some(out) = args.snapshot_out.as_deref() {
            provider.world().write(out)?;
            tracing::info!(
                path = %out.display(),
                actions = provider.performed().len(),
                "snapshot written"
            );
        }
        report
    } else {
        return Err(anyhow!("provide --endpoint or --snapshot"));
    };

    if let Some(path) = args.report.as_deref() {
        write_report(path, &report)?;
    }
    print_summary(&report);
    if report.failed() > 0 {
        return Err(anyhow!(
            "{} of {} facility passes failed",
            report.failed(),
            report.facilities.len()
        ));
    }
    Ok(())
}

/// Everything a run needs besides the provider and sink.
struct RunScope<'a> {
    schema: &'a TargetSchema,
    options: RunOptions,
    filter: &'a FacilityFilter,
    location_id: &'a str,
    category: FacilityCategory,
}

impl RunScope<'_> {
    fn reconcile<P: StateProvider>(
        &self,
        mut provider: P,
        sink: FanoutSink,
    ) -> Result<(RunReport, P)> {
        let listed = provider
            .list_facilities(self.location_id, self.category)
            .with_context(|| {
                format!(
                    "list {} facilities at location {}",
                    self.category, self.location_id
                )
            })?;
        let listed_count = listed.len();
        let facilities = self.filter.apply(listed);
        tracing::info!(
            listed = listed_count,
            selected = facilities.len(),
            "facilities selected"
        );
        let mut reconciler = Reconciler::new(self.schema, self.options, provider, sink);
        let report = reconciler.run(self.location_id, self.category, &facilities);
        let (provider, _) = reconciler.into_parts();
        Ok((report, provider))
    }
}

fn resolve_schema_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_schema_path()
            .ok_or_else(|| anyhow!("no per-user config dir; pass --schema")),
    }
}

fn build_sink(args: &RunArgs) -> Result<FanoutSink> {
    let mut sink = FanoutSink::new();
    sink.push(Box::new(TracingSink));
    if let Some(path) = args.events.as_deref() {
        sink.push(Box::new(JsonlSink::open(path)?));
    }
    if let Some(dir) = args.diagnostics_dir.as_deref() {
        sink.push(Box::new(FailureDumper::new(dir)));
    }
    Ok(sink)
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(report).context("serialize run report")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn print_summary(report: &RunReport) {
    let mode = if report.dry_run { "plan" } else { "apply" };
    for facility in &report.facilities {
        println!("{}", summary_line(facility));
    }
    println!(
        "{mode}: {} completed, {} failed",
        report.completed(),
        report.failed()
    );
}

fn summary_line(report: &FacilityReport) -> String {
    let facility = &report.facility;
    let mut line = format!(
        "{} {}: bought {}, expanded {}, assigned {}, unfilled {}, expansions {}",
        facility.id,
        facility.name,
        report.bought_total(),
        report.expanded_units,
        report.assignments.len(),
        report.seats_unfilled(),
        report.expansions_queued.len()
    );
    if let Some(plan) = report.purchase.as_ref() {
        if !plan.deferred.is_empty() {
            let keys: Vec<String> = plan.blocking_keys().iter().map(ToString::to_string).collect();
            line.push_str(&format!(", deferred for crew [{}]", keys.join(", ")));
        }
    }
    if !report.failed_actions.is_empty() {
        line.push_str(&format!(", {} actions failed", report.failed_actions.len()));
    }
    if let PassOutcome::Failed { error } = &report.outcome {
        line.push_str(&format!(", FAILED: {error}"));
    }
    line
}
