//! Facility fleet, crew, and expansion reconciler.
//!
//! Loads a target schema, observes each facility through a state provider,
//! and issues the buy, assign, expand, and queue actions that close the gap.
mod cli;
mod diagnostics;
mod filter;
mod logging;
mod model;
mod provider;
mod reconcile;
mod schema;
mod workflow;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::RootArgs::parse();
    logging::init(args.verbose);
    match args.command {
        cli::Command::Validate(args) => workflow::run_validate(args),
        cli::Command::Plan(args) => workflow::run_plan(args),
        cli::Command::Apply(args) => workflow::run_apply(args),
    }
}
