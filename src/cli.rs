//! CLI argument parsing for the reconciler.
//!
//! Flags only describe the run; every decision about what to buy, assign, or
//! queue lives in the reconcile engine.
use crate::filter::{parse_bounds, Bounds};
use crate::model::FacilityCategory;
use crate::provider::BackoffStrategy;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "sbuild",
    version,
    about = "Bring facility fleets, crew, and expansions in line with a target schema",
    after_help = "Commands:\n  validate --schema <file>                               Check a target schema\n  plan --location <id> --category <cat> --snapshot <f>  Report what would change\n  apply --location <id> --category <cat> --endpoint <u> Reconcile every facility\n\nExamples:\n  sbuild validate --schema schema.json\n  sbuild plan --location 42 --category JRG --snapshot world.json\n  sbuild apply --location 42 --category OPI --endpoint http://localhost:8080/api --report run.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Validate(ValidateArgs),
    /// Report what a reconcile would change without acting
    Plan(RunArgs),
    /// Reconcile facilities against the target schema
    Apply(RunArgs),
}

/// Validate command inputs.
#[derive(Parser, Debug)]
#[command(about = "Load and validate a target schema")]
pub struct ValidateArgs {
    /// Target schema (defaults to the per-user config dir)
    #[arg(long, value_name = "PATH")]
    pub schema: Option<PathBuf>,
}

/// Where facility state comes from and where actions go.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ProviderArgs {
    /// Base URL of the JSON state API
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// World snapshot file used instead of a live API
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,
}

/// Plan and apply command inputs.
#[derive(Parser, Debug)]
#[command(about = "Reconcile facilities of one category at a location")]
pub struct RunArgs {
    /// Location whose facilities are reconciled
    #[arg(long, value_name = "ID")]
    pub location: String,

    /// Facility category (OPI, MEDIC, MEDIC_HELI, OPI_HELI, OPP, SM, JRG)
    #[arg(long, value_name = "CAT", value_parser = parse_category, default_value = "JRG")]
    pub category: FacilityCategory,

    /// Target schema (defaults to the per-user config dir)
    #[arg(long, value_name = "PATH")]
    pub schema: Option<PathBuf>,

    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Bearer token for the state API
    #[arg(long, value_name = "TOKEN", requires = "endpoint")]
    pub token: Option<String>,

    /// Retries for an observation that is briefly unavailable
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub retries: u32,

    /// Delay growth between retries (fixed, linear, exponential)
    #[arg(long, value_name = "STRATEGY", value_parser = parse_backoff, default_value = "exponential")]
    pub backoff: BackoffStrategy,

    /// Base delay between retries
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub retry_delay_ms: u64,

    /// Write the mutated snapshot here after the run
    #[arg(long, value_name = "PATH", requires = "snapshot")]
    pub snapshot_out: Option<PathBuf>,

    /// Do not buy vehicles
    #[arg(long)]
    pub skip_buy: bool,

    /// Do not assign crew
    #[arg(long)]
    pub skip_assign: bool,

    /// Do not queue expansions
    #[arg(long)]
    pub skip_expansions: bool,

    /// Do not touch recruitment settings
    #[arg(long)]
    pub skip_recruitment: bool,

    /// Only facilities whose crew size is in MIN-MAX (k = x1000)
    #[arg(long, value_name = "MIN-MAX", value_parser = parse_bounds)]
    pub crew_range: Option<Bounds>,

    /// Only facilities whose level is in MIN-MAX
    #[arg(long, value_name = "MIN-MAX", value_parser = parse_bounds)]
    pub level_range: Option<Bounds>,

    /// Skip this many facilities from the start of the listing
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub start: usize,

    /// Reconcile at most this many facilities
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Write the JSON run report here
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Append engine events to this JSONL log
    #[arg(long, value_name = "PATH")]
    pub events: Option<PathBuf>,

    /// Directory for failure snapshots
    #[arg(long, value_name = "DIR")]
    pub diagnostics_dir: Option<PathBuf>,
}

fn parse_category(value: &str) -> Result<FacilityCategory, String> {
    FacilityCategory::parse(value).ok_or_else(|| {
        let known: Vec<&str> = FacilityCategory::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown category {value:?} (expected one of {})", known.join(", "))
    })
}

fn parse_backoff(value: &str) -> Result<BackoffStrategy, String> {
    BackoffStrategy::parse(value).ok_or_else(|| {
        let known: Vec<&str> = BackoffStrategy::ALL.iter().map(|s| s.as_str()).collect();
        format!("unknown backoff {value:?} (expected one of {})", known.join(", "))
    })
}
